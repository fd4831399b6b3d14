use crate::platforms::AccessibilityEngine;
use crate::simulator::{sample_chats, WhatsAppSimulator};
use crate::types::Tab;
use crate::AutomationError;

#[test]
fn test_start_session_reports_pid() {
    let sim = WhatsAppSimulator::new(sample_chats());
    let whatsapp = sim.whatsapp();
    assert!(whatsapp.is_available());
    assert_eq!(whatsapp.start_session().unwrap(), Some(4242));
}

#[test]
fn test_start_session_without_client() {
    let sim = WhatsAppSimulator::new(sample_chats());
    sim.set_available(false);
    let whatsapp = sim.whatsapp();

    assert!(!whatsapp.is_available());
    assert_eq!(whatsapp.process_id(), None);
    let err = whatsapp.start_session().unwrap_err();
    assert!(err.is_hard_failure());
}

#[test]
fn test_stop_session_leaves_search_mode() {
    let sim = WhatsAppSimulator::new(sample_chats());
    sim.type_search("bob");
    let whatsapp = sim.whatsapp();

    whatsapp.stop_session().unwrap();
    assert_eq!(sim.query(), "");
}

#[test]
fn test_stop_session_tolerates_missing_client() {
    let sim = WhatsAppSimulator::new(sample_chats());
    sim.set_available(false);
    assert!(sim.whatsapp().stop_session().is_ok());
}

#[test]
fn test_navigate_between_tabs() {
    let sim = WhatsAppSimulator::new(sample_chats());
    let whatsapp = sim.whatsapp();

    assert!(whatsapp.navigate_to(Tab::Settings).unwrap());
    assert_eq!(sim.tab(), Tab::Settings);
    // Already there.
    assert!(whatsapp.navigate_to(Tab::Settings).unwrap());
    assert!(whatsapp.navigate_to(Tab::Chats).unwrap());
    assert_eq!(sim.tab(), Tab::Chats);
}

#[test]
fn test_stale_handles_fail_softly() {
    let sim = WhatsAppSimulator::new(sample_chats());
    let whatsapp = sim.whatsapp();
    let window = whatsapp.engine().main_window().unwrap();

    sim.type_search("x");
    let err = window.children().unwrap_err();
    assert!(matches!(err, AutomationError::ElementNotFound(_)));
    assert!(!err.is_hard_failure());
}
