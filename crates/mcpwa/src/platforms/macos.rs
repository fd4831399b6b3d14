//! macOS back-end: AXUIElement queries plus CGEvent synthetic input.
//!
//! Every call here is a synchronous cross-process round-trip into the target app and blocks
//! until it answers or the messaging timeout expires. Callers serialize access on a single
//! worker thread.

use crate::element::{attr, AttributeValue, UIElement, UIElementImpl};
use crate::errors::AutomationError;
use crate::input::{Key, Modifiers};
use crate::platforms::{AccessibilityEngine, ProcessCache, TargetApp};
use accessibility_sys::{
    kAXErrorAPIDisabled, kAXErrorActionUnsupported, kAXErrorAttributeUnsupported,
    kAXErrorCannotComplete, kAXErrorInvalidUIElement, kAXErrorNoValue, kAXErrorSuccess,
    kAXValueTypeCGPoint, kAXValueTypeCGSize, AXError, AXIsProcessTrusted,
    AXUIElementCopyAttributeValue, AXUIElementCreateApplication, AXUIElementPerformAction,
    AXUIElementRef, AXUIElementSetAttributeValue, AXUIElementSetMessagingTimeout,
    AXValueGetValue, AXValueRef,
};
use core_foundation::array::{CFArray, CFArrayRef};
use core_foundation::base::{CFRelease, CFRetain, CFType, CFTypeRef, TCFType};
use core_foundation::boolean::CFBoolean;
use core_foundation::number::CFNumber;
use core_foundation::string::CFString;
use core_graphics::event::{
    CGEvent, CGEventFlags, CGEventTapLocation, CGEventType, CGKeyCode, CGMouseButton,
};
use core_graphics::event_source::{CGEventSource, CGEventSourceStateID};
use core_graphics::geometry::{CGPoint, CGSize};
use std::ffi::c_void;
use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// Seconds the target may take to answer a single accessibility request.
const MESSAGING_TIMEOUT_SECS: f32 = 5.0;
/// CGEventKeyboardSetUnicodeString accepts at most 20 UTF-16 units per event.
const TEXT_CHUNK_CHARS: usize = 10;
const KEY_EVENT_GAP: Duration = Duration::from_millis(8);

/// Owned, retained AXUIElementRef.
struct AxRef(AXUIElementRef);

// AXUIElementRef is a CFType; the API is callable from any thread and we only ever use it
// from the automation worker.
unsafe impl Send for AxRef {}
unsafe impl Sync for AxRef {}

impl AxRef {
    /// Take ownership of a +1 reference.
    fn from_create(raw: AXUIElementRef) -> Option<Self> {
        if raw.is_null() {
            None
        } else {
            Some(AxRef(raw))
        }
    }

    /// Retain a borrowed reference.
    fn from_get(raw: AXUIElementRef) -> Option<Self> {
        if raw.is_null() {
            return None;
        }
        unsafe { CFRetain(raw as CFTypeRef) };
        Some(AxRef(raw))
    }

    fn copy_attribute(&self, name: &str) -> Result<Option<CFType>, AutomationError> {
        let cf_name = CFString::new(name);
        let mut value: CFTypeRef = std::ptr::null();
        let err = unsafe {
            AXUIElementCopyAttributeValue(self.0, cf_name.as_concrete_TypeRef(), &mut value)
        };
        match err {
            e if e == kAXErrorSuccess => {
                if value.is_null() {
                    Ok(None)
                } else {
                    Ok(Some(unsafe { CFType::wrap_under_create_rule(value) }))
                }
            }
            e if e == kAXErrorNoValue || e == kAXErrorAttributeUnsupported => Ok(None),
            e => Err(map_ax_error(e, name)),
        }
    }

    fn set_attribute(&self, name: &str, value: CFTypeRef) -> Result<(), AutomationError> {
        let cf_name = CFString::new(name);
        let err = unsafe { AXUIElementSetAttributeValue(self.0, cf_name.as_concrete_TypeRef(), value) };
        if err == kAXErrorSuccess {
            Ok(())
        } else {
            Err(map_ax_error(err, name))
        }
    }

    fn perform(&self, action: &str) -> Result<(), AutomationError> {
        let cf_action = CFString::new(action);
        let err = unsafe { AXUIElementPerformAction(self.0, cf_action.as_concrete_TypeRef()) };
        if err == kAXErrorSuccess {
            Ok(())
        } else {
            Err(map_ax_error(err, action))
        }
    }

    fn element_attribute(&self, name: &str) -> Result<Option<AxRef>, AutomationError> {
        Ok(self
            .copy_attribute(name)?
            .and_then(|v| AxRef::from_get(v.as_CFTypeRef() as AXUIElementRef)))
    }

    fn element_list(&self, name: &str) -> Result<Vec<AxRef>, AutomationError> {
        let Some(value) = self.copy_attribute(name)? else {
            return Ok(Vec::new());
        };
        if value.type_of() != CFArray::<CFType>::type_id() {
            return Ok(Vec::new());
        }
        let array: CFArray<CFType> =
            unsafe { CFArray::wrap_under_get_rule(value.as_CFTypeRef() as CFArrayRef) };
        Ok(array
            .iter()
            .filter_map(|item| AxRef::from_get(item.as_CFTypeRef() as AXUIElementRef))
            .collect())
    }

    fn point_attribute(&self, name: &str) -> Result<Option<CGPoint>, AutomationError> {
        let Some(value) = self.copy_attribute(name)? else {
            return Ok(None);
        };
        let mut point = CGPoint::new(0.0, 0.0);
        let ok = unsafe {
            AXValueGetValue(
                value.as_CFTypeRef() as AXValueRef,
                kAXValueTypeCGPoint,
                &mut point as *mut CGPoint as *mut c_void,
            )
        };
        Ok(ok.then_some(point))
    }

    fn size_attribute(&self, name: &str) -> Result<Option<CGSize>, AutomationError> {
        let Some(value) = self.copy_attribute(name)? else {
            return Ok(None);
        };
        let mut size = CGSize::new(0.0, 0.0);
        let ok = unsafe {
            AXValueGetValue(
                value.as_CFTypeRef() as AXValueRef,
                kAXValueTypeCGSize,
                &mut size as *mut CGSize as *mut c_void,
            )
        };
        Ok(ok.then_some(size))
    }
}

impl Clone for AxRef {
    fn clone(&self) -> Self {
        unsafe { CFRetain(self.0 as CFTypeRef) };
        AxRef(self.0)
    }
}

impl Drop for AxRef {
    fn drop(&mut self) {
        unsafe { CFRelease(self.0 as CFTypeRef) };
    }
}

fn map_ax_error(err: AXError, context: &str) -> AutomationError {
    match err {
        e if e == kAXErrorInvalidUIElement => {
            AutomationError::ElementNotFound(format!("element went away while reading {context}"))
        }
        e if e == kAXErrorAPIDisabled => AutomationError::AccessibilityUnavailable(
            "accessibility access has not been granted to this process".to_string(),
        ),
        e if e == kAXErrorCannotComplete => AutomationError::AccessibilityUnavailable(format!(
            "target did not answer the {context} request"
        )),
        e if e == kAXErrorActionUnsupported => {
            AutomationError::PlatformError(format!("{context} is not supported by the element"))
        }
        e => AutomationError::PlatformError(format!("AX error {e} on {context}")),
    }
}

fn to_attribute_value(value: CFType) -> Option<AttributeValue> {
    if let Some(s) = value.downcast::<CFString>() {
        return Some(AttributeValue::String(s.to_string()));
    }
    if let Some(b) = value.downcast::<CFBoolean>() {
        return Some(AttributeValue::Bool(b.into()));
    }
    if let Some(n) = value.downcast::<CFNumber>() {
        return n.to_f64().map(AttributeValue::Number);
    }
    None
}

/// Element backed by a live AXUIElementRef.
struct MacOSElement {
    element: AxRef,
    pid: i32,
}

impl fmt::Debug for MacOSElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MacOSElement")
            .field("ref", &(self.element.0 as usize))
            .field("pid", &self.pid)
            .finish()
    }
}

impl MacOSElement {
    fn wrap(element: AxRef, pid: i32) -> UIElement {
        UIElement::new(Arc::new(MacOSElement { element, pid }))
    }

    fn click_at_centre(&self) -> Result<(), AutomationError> {
        let position = self.element.point_attribute("AXPosition")?;
        let size = self.element.size_attribute("AXSize")?;
        let (Some(position), Some(size)) = (position, size) else {
            return Err(AutomationError::PlatformError(
                "element has no on-screen frame to click".to_string(),
            ));
        };
        let centre = CGPoint::new(
            position.x + size.width / 2.0,
            position.y + size.height / 2.0,
        );
        let source = event_source()?;
        for event_type in [CGEventType::LeftMouseDown, CGEventType::LeftMouseUp] {
            let event =
                CGEvent::new_mouse_event(source.clone(), event_type, centre, CGMouseButton::Left)
                    .map_err(|_| {
                        AutomationError::PlatformError("failed to create mouse event".to_string())
                    })?;
            event.post(CGEventTapLocation::HID);
            thread::sleep(KEY_EVENT_GAP);
        }
        Ok(())
    }
}

impl UIElementImpl for MacOSElement {
    fn object_id(&self) -> u64 {
        self.element.0 as usize as u64
    }

    fn role(&self) -> Result<String, AutomationError> {
        Ok(self
            .element
            .copy_attribute(attr::ROLE)?
            .and_then(|v| v.downcast::<CFString>())
            .map(|s| s.to_string())
            .unwrap_or_default())
    }

    fn attribute(&self, name: &str) -> Result<Option<AttributeValue>, AutomationError> {
        Ok(self.element.copy_attribute(name)?.and_then(to_attribute_value))
    }

    fn children(&self) -> Result<Vec<UIElement>, AutomationError> {
        Ok(self
            .element
            .element_list(attr::CHILDREN)?
            .into_iter()
            .map(|child| MacOSElement::wrap(child, self.pid))
            .collect())
    }

    fn click(&self) -> Result<(), AutomationError> {
        match self.element.perform("AXPress") {
            Ok(()) => Ok(()),
            Err(AutomationError::PlatformError(reason)) => {
                debug!("AXPress unavailable ({reason}), falling back to mouse click");
                self.click_at_centre()
            }
            Err(e) => Err(e),
        }
    }

    fn focus(&self) -> Result<(), AutomationError> {
        self.element
            .set_attribute(attr::FOCUSED, CFBoolean::true_value().as_CFTypeRef())
    }
}

fn event_source() -> Result<CGEventSource, AutomationError> {
    CGEventSource::new(CGEventSourceStateID::HIDSystemState)
        .map_err(|_| AutomationError::PlatformError("failed to create CGEventSource".to_string()))
}

fn event_flags(modifiers: Modifiers) -> CGEventFlags {
    let mut flags = CGEventFlags::CGEventFlagNull;
    if modifiers.contains(Modifiers::COMMAND) {
        flags |= CGEventFlags::CGEventFlagCommand;
    }
    if modifiers.contains(Modifiers::SHIFT) {
        flags |= CGEventFlags::CGEventFlagShift;
    }
    if modifiers.contains(Modifiers::OPTION) {
        flags |= CGEventFlags::CGEventFlagAlternate;
    }
    if modifiers.contains(Modifiers::CONTROL) {
        flags |= CGEventFlags::CGEventFlagControl;
    }
    flags
}

/// Accessibility engine attached to one application by process name.
pub struct MacOSEngine {
    target: TargetApp,
    process: ProcessCache,
}

impl MacOSEngine {
    pub fn new(target: TargetApp) -> Self {
        let process = ProcessCache::new(target.process_name.clone());
        Self { target, process }
    }

    fn require_pid(&self) -> Result<i32, AutomationError> {
        if !unsafe { AXIsProcessTrusted() } {
            return Err(AutomationError::AccessibilityUnavailable(
                "grant Accessibility access in System Settings > Privacy & Security".to_string(),
            ));
        }
        self.process
            .pid()
            .map(|pid| pid as i32)
            .ok_or_else(|| {
                AutomationError::AccessibilityUnavailable(format!(
                    "{} ({}) is not running",
                    self.target.process_name, self.target.bundle_id
                ))
            })
    }

    fn app_ref(&self) -> Result<(AxRef, i32), AutomationError> {
        let pid = self.require_pid()?;
        let app = AxRef::from_create(unsafe { AXUIElementCreateApplication(pid) }).ok_or_else(
            || AutomationError::AccessibilityUnavailable(format!("no AX application for pid {pid}")),
        )?;
        unsafe { AXUIElementSetMessagingTimeout(app.0, MESSAGING_TIMEOUT_SECS) };
        Ok((app, pid))
    }

    fn post_key(
        &self,
        source: &CGEventSource,
        pid: i32,
        code: CGKeyCode,
        flags: CGEventFlags,
        text: Option<&str>,
    ) -> Result<(), AutomationError> {
        for down in [true, false] {
            let event = CGEvent::new_keyboard_event(source.clone(), code, down).map_err(|_| {
                AutomationError::PlatformError("failed to create keyboard event".to_string())
            })?;
            event.set_flags(flags);
            if let Some(text) = text {
                event.set_string(text);
            }
            event.post_to_pid(pid);
            thread::sleep(KEY_EVENT_GAP);
        }
        Ok(())
    }
}

impl AccessibilityEngine for MacOSEngine {
    fn is_app_available(&self) -> bool {
        self.app_ref().is_ok()
    }

    fn process_id(&self) -> Option<u32> {
        self.process.pid()
    }

    fn activate_app(&self) -> bool {
        match self.app_ref() {
            Ok((app, _)) => app
                .set_attribute("AXFrontmost", CFBoolean::true_value().as_CFTypeRef())
                .map_err(|e| warn!("Failed to activate {}: {e}", self.target.process_name))
                .is_ok(),
            Err(_) => false,
        }
    }

    fn ensure_visible(&self) -> bool {
        let Ok((app, _)) = self.app_ref() else {
            return false;
        };
        if let Err(e) = app.set_attribute("AXHidden", CFBoolean::false_value().as_CFTypeRef()) {
            debug!("Could not un-hide application: {e}");
        }
        match app.element_list("AXWindows") {
            Ok(windows) => {
                for window in &windows {
                    let minimized = window
                        .copy_attribute(attr::MINIMIZED)
                        .ok()
                        .flatten()
                        .and_then(to_attribute_value)
                        .and_then(|v| v.as_bool())
                        .unwrap_or(false);
                    if minimized {
                        debug!("Restoring minimized window");
                        let _ = window.set_attribute(
                            attr::MINIMIZED,
                            CFBoolean::false_value().as_CFTypeRef(),
                        );
                    }
                }
                !windows.is_empty()
            }
            Err(e) => {
                warn!("Failed to enumerate windows: {e}");
                false
            }
        }
    }

    fn main_window(&self) -> Result<UIElement, AutomationError> {
        let (app, pid) = self.app_ref()?;
        for name in ["AXMainWindow", "AXFocusedWindow"] {
            if let Some(window) = app.element_attribute(name)? {
                return Ok(MacOSElement::wrap(window, pid));
            }
        }
        app.element_list("AXWindows")?
            .into_iter()
            .next()
            .map(|w| MacOSElement::wrap(w, pid))
            .ok_or_else(|| AutomationError::ElementNotFound("main window".to_string()))
    }

    fn focused_element(&self) -> Result<UIElement, AutomationError> {
        let (app, pid) = self.app_ref()?;
        app.element_attribute("AXFocusedUIElement")?
            .map(|e| MacOSElement::wrap(e, pid))
            .ok_or_else(|| AutomationError::ElementNotFound("focused element".to_string()))
    }

    fn dispatch_key(&self, key: Key, modifiers: Modifiers) -> Result<(), AutomationError> {
        let pid = self.require_pid()?;
        debug!(%key, %modifiers, pid, "Posting key event");
        let source = event_source()?;
        self.post_key(&source, pid, key.virtual_code(), event_flags(modifiers), None)
    }

    fn dispatch_text(&self, text: &str) -> Result<(), AutomationError> {
        let pid = self.require_pid()?;
        let source = event_source()?;
        let chars: Vec<char> = text.chars().collect();
        for chunk in chars.chunks(TEXT_CHUNK_CHARS) {
            let piece: String = chunk.iter().collect();
            self.post_key(&source, pid, 0, CGEventFlags::CGEventFlagNull, Some(&piece))?;
        }
        Ok(())
    }

    fn invalidate_process(&self) {
        self.process.invalidate();
    }
}
