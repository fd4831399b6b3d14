use std::collections::VecDeque;

use tracing::trace;

use crate::element::UIElement;
use crate::errors::AutomationError;
use crate::selector::Selector;

/// Default traversal depth below the locator root.
pub const DEFAULT_MAX_DEPTH: usize = 12;

/// Finds elements matching a [`Selector`] below a root element.
///
/// Traversal is breadth-first and bounded by `max_depth`, so the nearest match wins. Nodes
/// that vanish mid-walk are skipped; only hard failures abort the search.
#[derive(Clone)]
pub struct Locator {
    root: UIElement,
    selector: Selector,
    max_depth: usize,
}

impl Locator {
    pub fn new(root: UIElement, selector: impl Into<Selector>) -> Self {
        Self {
            root,
            selector: selector.into(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Nearest match, or `None` when nothing matches.
    pub fn try_first(&self) -> Result<Option<UIElement>, AutomationError> {
        let found = search(&self.root, &self.selector, self.max_depth, Some(1))?;
        if found.is_empty() {
            trace!("selector {} matched nothing", self.selector);
        }
        Ok(found.into_iter().next())
    }

    /// Every match in breadth-first order.
    #[cfg(test)]
    fn all(&self) -> Result<Vec<UIElement>, AutomationError> {
        search(&self.root, &self.selector, self.max_depth, None)
    }
}

fn search(
    root: &UIElement,
    selector: &Selector,
    max_depth: usize,
    limit: Option<usize>,
) -> Result<Vec<UIElement>, AutomationError> {
    if let Selector::Invalid(reason) = selector {
        return Err(AutomationError::InvalidArgument(format!(
            "invalid selector: {reason}"
        )));
    }

    let mut matches = Vec::new();
    let mut queue: VecDeque<(UIElement, usize)> = VecDeque::new();
    queue.push_back((root.clone(), 0));

    while let Some((element, depth)) = queue.pop_front() {
        if depth >= max_depth {
            continue;
        }
        let children = match element.children() {
            Ok(children) => children,
            Err(e) if e.is_hard_failure() => return Err(e),
            Err(_) => continue,
        };
        for child in children {
            match matches_selector(&child, selector) {
                Ok(true) => {
                    matches.push(child.clone());
                    if limit.is_some_and(|l| matches.len() >= l) {
                        return Ok(matches);
                    }
                }
                Ok(false) => {}
                Err(e) if e.is_hard_failure() => return Err(e),
                Err(_) => continue,
            }
            queue.push_back((child, depth + 1));
        }
    }
    Ok(matches)
}

/// Whether `element` itself satisfies `selector`.
pub fn matches_selector(element: &UIElement, selector: &Selector) -> Result<bool, AutomationError> {
    match selector {
        Selector::Id(id) => Ok(element.identifier()?.as_deref() == Some(id.as_str())),
        Selector::Role(role) => Ok(element.role()? == *role),
        Selector::Invalid(_) => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::role;
    use crate::platforms::memory::{MemoryEngine, NodeSpec};
    use crate::platforms::AccessibilityEngine;

    fn engine() -> MemoryEngine {
        MemoryEngine::with_tree(
            NodeSpec::new(role::APPLICATION).child(
                NodeSpec::new(role::WINDOW).children([
                    NodeSpec::new(role::GROUP).identifier("Sidebar").children([
                        NodeSpec::new(role::BUTTON).title("New chat"),
                        NodeSpec::new(role::GROUP)
                            .child(NodeSpec::new(role::BUTTON).identifier("Deep").title("Deep")),
                    ]),
                    NodeSpec::new(role::BUTTON).title("Send"),
                ]),
            ),
        )
    }

    #[test]
    fn test_breadth_first_order() {
        let engine = engine();
        let window = engine.main_window().unwrap();
        let buttons = Locator::new(window, Selector::role(role::BUTTON)).all().unwrap();
        let titles: Vec<_> = buttons.iter().map(|b| b.title().unwrap().unwrap()).collect();
        assert_eq!(titles, vec!["Send", "New chat", "Deep"]);
    }

    #[test]
    fn test_depth_bound() {
        let engine = engine();
        let window = engine.main_window().unwrap();
        let shallow = Locator::new(window.clone(), Selector::id("Deep")).max_depth(2);
        assert!(shallow.try_first().unwrap().is_none());
        let deep = Locator::new(window, Selector::id("Deep")).max_depth(3);
        assert!(deep.try_first().unwrap().is_some());
    }

    #[test]
    fn test_identifier_lookup() {
        let engine = engine();
        let window = engine.main_window().unwrap();
        let found = Locator::new(window.clone(), "#Sidebar")
            .try_first()
            .unwrap()
            .unwrap();
        assert_eq!(found.identifier().unwrap().as_deref(), Some("Sidebar"));
        assert!(Locator::new(window.clone(), "id:Missing")
            .try_first()
            .unwrap()
            .is_none());

        let err = Locator::new(window, "role:").try_first().unwrap_err();
        assert!(matches!(err, AutomationError::InvalidArgument(_)));
    }

    #[test]
    fn test_unavailable_target_is_a_hard_failure() {
        let engine = engine();
        let window = engine.main_window().unwrap();
        engine.set_available(false);
        let err = Locator::new(window, "id:Deep").all().unwrap_err();
        assert!(err.is_hard_failure());
    }
}
