//! In-memory accessibility back-end.
//!
//! Holds a mutable tree of nodes and routes synthetic input to an [`InputHandler`] that rewrites
//! the tree, the way the real target redraws after a click or key press. Replacing a subtree
//! assigns fresh node ids, so handles taken before a redraw go stale exactly like real
//! AXUIElementRefs do.

use crate::element::{attr, AttributeValue, UIElement, UIElementImpl};
use crate::errors::AutomationError;
use crate::input::{Key, Modifiers};
use crate::platforms::AccessibilityEngine;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

pub type NodeId = u64;

/// Declarative description of a subtree.
#[derive(Debug, Clone, Default)]
pub struct NodeSpec {
    role: String,
    attributes: Vec<(String, AttributeValue)>,
    children: Vec<NodeSpec>,
}

impl NodeSpec {
    pub fn new(role: &str) -> Self {
        Self {
            role: role.to_string(),
            ..Default::default()
        }
    }

    pub fn attr(mut self, name: &str, value: impl Into<AttributeValue>) -> Self {
        self.attributes.push((name.to_string(), value.into()));
        self
    }

    pub fn identifier(self, id: &str) -> Self {
        self.attr(attr::IDENTIFIER, id)
    }

    pub fn title(self, title: &str) -> Self {
        self.attr(attr::TITLE, title)
    }

    pub fn description(self, description: &str) -> Self {
        self.attr(attr::DESCRIPTION, description)
    }

    pub fn value(self, value: &str) -> Self {
        self.attr(attr::VALUE, value)
    }

    pub fn selected(self, selected: bool) -> Self {
        self.attr(attr::SELECTED, selected)
    }

    pub fn focused(self, focused: bool) -> Self {
        self.attr(attr::FOCUSED, focused)
    }

    pub fn child(mut self, child: NodeSpec) -> Self {
        self.children.push(child);
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = NodeSpec>) -> Self {
        self.children.extend(children);
        self
    }
}

#[derive(Debug)]
struct MemoryNode {
    role: String,
    attributes: HashMap<String, AttributeValue>,
    children: Vec<NodeId>,
}

/// The mutable node store behind a [`MemoryEngine`].
#[derive(Debug, Default)]
pub struct MemoryTree {
    nodes: HashMap<NodeId, MemoryNode>,
    root: Option<NodeId>,
    next_id: NodeId,
}

impl MemoryTree {
    /// Drop the whole tree and build a new one from `spec`.
    pub fn replace(&mut self, spec: NodeSpec) {
        self.nodes.clear();
        let root = self.insert(spec);
        self.root = Some(root);
    }

    fn insert(&mut self, spec: NodeSpec) -> NodeId {
        self.next_id += 1;
        let id = self.next_id;
        let children = spec
            .children
            .into_iter()
            .map(|child| self.insert(child))
            .collect();
        self.nodes.insert(
            id,
            MemoryNode {
                role: spec.role,
                attributes: spec.attributes.into_iter().collect(),
                children,
            },
        );
        id
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn role(&self, id: NodeId) -> Option<&str> {
        self.nodes.get(&id).map(|n| n.role.as_str())
    }

    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&AttributeValue> {
        self.nodes.get(&id).and_then(|n| n.attributes.get(name))
    }

    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: impl Into<AttributeValue>) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.attributes.insert(name.to_string(), value.into());
        }
    }

    pub fn children_of(&self, id: NodeId) -> Vec<NodeId> {
        self.nodes
            .get(&id)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    pub fn identifier(&self, id: NodeId) -> Option<&str> {
        self.attribute(id, attr::IDENTIFIER).and_then(|v| v.as_str())
    }

    /// Depth-first search for the first node with the given identifier.
    pub fn find_by_identifier(&self, identifier: &str) -> Option<NodeId> {
        let mut stack: Vec<NodeId> = self.root.into_iter().collect();
        while let Some(id) = stack.pop() {
            if self.identifier(id) == Some(identifier) {
                return Some(id);
            }
            let mut children = self.children_of(id);
            children.reverse();
            stack.extend(children);
        }
        None
    }

    /// Position of `id` among its parent's children.
    pub fn index_in_parent(&self, id: NodeId) -> Option<usize> {
        self.nodes
            .values()
            .find_map(|n| n.children.iter().position(|c| *c == id))
    }

    fn focused(&self) -> Option<NodeId> {
        self.nodes
            .iter()
            .filter(|(_, n)| {
                n.attributes
                    .get(attr::FOCUSED)
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false)
            })
            .map(|(id, _)| *id)
            .min()
    }
}

/// Synthetic input delivered to the in-memory target.
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    Click { node: NodeId },
    Focus { node: NodeId },
    Key { key: Key, modifiers: Modifiers },
    Text(String),
}

/// Reacts to input and reads the way the target application would.
pub trait InputHandler: Send + Sync {
    fn handle(&self, tree: &mut MemoryTree, event: &InputEvent);

    /// Called before every read; lets a handler apply deferred redraws.
    fn before_read(&self, _tree: &mut MemoryTree) {}
}

struct Shared {
    tree: Mutex<MemoryTree>,
    handler: RwLock<Option<Arc<dyn InputHandler>>>,
    available: AtomicBool,
    pid: AtomicU32,
    events: Mutex<Vec<InputEvent>>,
}

impl Shared {
    fn lock_tree(&self) -> MutexGuard<'_, MemoryTree> {
        self.tree.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn handler(&self) -> Option<Arc<dyn InputHandler>> {
        self.handler
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn check_available(&self) -> Result<(), AutomationError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(AutomationError::AccessibilityUnavailable(
                "target application is not running".to_string(),
            ))
        }
    }

    /// Lock the tree for a read, letting the handler apply pending redraws first.
    fn read_tree(&self) -> Result<MutexGuard<'_, MemoryTree>, AutomationError> {
        self.check_available()?;
        let handler = self.handler();
        let mut tree = self.lock_tree();
        if let Some(handler) = handler {
            handler.before_read(&mut tree);
        }
        Ok(tree)
    }

    fn deliver(&self, event: InputEvent) -> Result<(), AutomationError> {
        self.check_available()?;
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event.clone());
        let handler = self.handler();
        let mut tree = self.lock_tree();
        match handler {
            Some(handler) => handler.handle(&mut tree, &event),
            None => {
                if let InputEvent::Focus { node } = event {
                    tree.set_attribute(node, attr::FOCUSED, true);
                }
            }
        }
        Ok(())
    }
}

#[derive(Clone)]
struct MemoryElement {
    shared: Arc<Shared>,
    id: NodeId,
}

impl fmt::Debug for MemoryElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryElement").field("id", &self.id).finish()
    }
}

impl MemoryElement {
    fn wrap(shared: &Arc<Shared>, id: NodeId) -> UIElement {
        UIElement::new(Arc::new(MemoryElement {
            shared: shared.clone(),
            id,
        }))
    }

    fn stale(&self) -> AutomationError {
        AutomationError::ElementNotFound(format!("node {} is no longer in the tree", self.id))
    }
}

impl UIElementImpl for MemoryElement {
    fn object_id(&self) -> u64 {
        self.id
    }

    fn role(&self) -> Result<String, AutomationError> {
        let tree = self.shared.read_tree()?;
        tree.role(self.id)
            .map(str::to_string)
            .ok_or_else(|| self.stale())
    }

    fn attribute(&self, name: &str) -> Result<Option<AttributeValue>, AutomationError> {
        let tree = self.shared.read_tree()?;
        if !tree.contains(self.id) {
            return Err(self.stale());
        }
        if name == attr::ROLE {
            return Ok(tree.role(self.id).map(AttributeValue::from));
        }
        Ok(tree.attribute(self.id, name).cloned())
    }

    fn children(&self) -> Result<Vec<UIElement>, AutomationError> {
        let tree = self.shared.read_tree()?;
        if !tree.contains(self.id) {
            return Err(self.stale());
        }
        Ok(tree
            .children_of(self.id)
            .into_iter()
            .map(|id| MemoryElement::wrap(&self.shared, id))
            .collect())
    }

    fn click(&self) -> Result<(), AutomationError> {
        if !self.shared.read_tree()?.contains(self.id) {
            return Err(self.stale());
        }
        self.shared.deliver(InputEvent::Click { node: self.id })
    }

    fn focus(&self) -> Result<(), AutomationError> {
        if !self.shared.read_tree()?.contains(self.id) {
            return Err(self.stale());
        }
        self.shared.deliver(InputEvent::Focus { node: self.id })
    }
}

/// [`AccessibilityEngine`] over a [`MemoryTree`].
#[derive(Clone)]
pub struct MemoryEngine {
    shared: Arc<Shared>,
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                tree: Mutex::new(MemoryTree::default()),
                handler: RwLock::new(None),
                available: AtomicBool::new(true),
                pid: AtomicU32::new(4242),
                events: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn with_tree(spec: NodeSpec) -> Self {
        let engine = Self::new();
        engine.shared.lock_tree().replace(spec);
        engine
    }

    pub fn set_handler(&self, handler: Arc<dyn InputHandler>) {
        *self.shared.handler.write().unwrap_or_else(|e| e.into_inner()) = Some(handler);
    }

    pub fn set_available(&self, available: bool) {
        self.shared.available.store(available, Ordering::SeqCst);
    }

    /// Simulate the target restarting under a new pid.
    pub fn set_pid(&self, pid: u32) {
        self.shared.pid.store(pid, Ordering::SeqCst);
    }

    /// Run `f` against the tree without triggering deferred redraws.
    pub fn with_tree_mut<R>(&self, f: impl FnOnce(&mut MemoryTree) -> R) -> R {
        f(&mut self.shared.lock_tree())
    }

    /// Input delivered so far, oldest first.
    pub fn events(&self) -> Vec<InputEvent> {
        self.shared
            .events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl AccessibilityEngine for MemoryEngine {
    fn is_app_available(&self) -> bool {
        self.shared.available.load(Ordering::SeqCst)
    }

    fn process_id(&self) -> Option<u32> {
        self.is_app_available()
            .then(|| self.shared.pid.load(Ordering::SeqCst))
    }

    fn activate_app(&self) -> bool {
        self.is_app_available()
    }

    fn ensure_visible(&self) -> bool {
        self.is_app_available()
    }

    fn main_window(&self) -> Result<UIElement, AutomationError> {
        let tree = self.shared.read_tree()?;
        let root = tree
            .root()
            .ok_or_else(|| AutomationError::ElementNotFound("application".to_string()))?;
        let window = tree
            .children_of(root)
            .into_iter()
            .find(|id| tree.role(*id) == Some(crate::element::role::WINDOW))
            .ok_or_else(|| AutomationError::ElementNotFound("main window".to_string()))?;
        Ok(MemoryElement::wrap(&self.shared, window))
    }

    fn focused_element(&self) -> Result<UIElement, AutomationError> {
        let tree = self.shared.read_tree()?;
        let focused = tree
            .focused()
            .ok_or_else(|| AutomationError::ElementNotFound("focused element".to_string()))?;
        Ok(MemoryElement::wrap(&self.shared, focused))
    }

    fn dispatch_key(&self, key: Key, modifiers: Modifiers) -> Result<(), AutomationError> {
        self.shared.deliver(InputEvent::Key { key, modifiers })
    }

    fn dispatch_text(&self, text: &str) -> Result<(), AutomationError> {
        self.shared.deliver(InputEvent::Text(text.to_string()))
    }

    fn invalidate_process(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::role;

    fn sample() -> NodeSpec {
        NodeSpec::new(role::APPLICATION).child(
            NodeSpec::new(role::WINDOW).title("WhatsApp").child(
                NodeSpec::new(role::BUTTON)
                    .identifier("Send")
                    .description("Send"),
            ),
        )
    }

    #[test]
    fn test_main_window_and_children() {
        let engine = MemoryEngine::with_tree(sample());
        let window = engine.main_window().unwrap();
        assert_eq!(window.title().unwrap().as_deref(), Some("WhatsApp"));
        let children = window.children().unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].identifier().unwrap().as_deref(), Some("Send"));
        assert_eq!(children[0].role().unwrap(), role::BUTTON);
    }

    #[test]
    fn test_handles_go_stale_after_replace() {
        let engine = MemoryEngine::with_tree(sample());
        let window = engine.main_window().unwrap();
        engine.with_tree_mut(|tree| tree.replace(sample()));
        assert!(matches!(
            window.children(),
            Err(AutomationError::ElementNotFound(_))
        ));
        assert!(engine.main_window().is_ok());
    }

    #[test]
    fn test_unavailable_target() {
        let engine = MemoryEngine::with_tree(sample());
        engine.set_available(false);
        assert!(matches!(
            engine.main_window(),
            Err(AutomationError::AccessibilityUnavailable(_))
        ));
        assert_eq!(engine.process_id(), None);
    }

    #[test]
    fn test_input_is_recorded() {
        let engine = MemoryEngine::with_tree(sample());
        engine.dispatch_text("hi").unwrap();
        engine.dispatch_key(Key::Return, Modifiers::NONE).unwrap();
        assert_eq!(
            engine.events(),
            vec![
                InputEvent::Text("hi".to_string()),
                InputEvent::Key {
                    key: Key::Return,
                    modifiers: Modifiers::NONE
                }
            ]
        );
    }

    #[test]
    fn test_default_focus_handling() {
        let engine = MemoryEngine::with_tree(sample());
        let button = engine.main_window().unwrap().children().unwrap().remove(0);
        button.focus().unwrap();
        assert_eq!(engine.focused_element().unwrap(), button);
    }
}
