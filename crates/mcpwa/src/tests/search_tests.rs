use crate::simulator::{sample_chats, WhatsAppSimulator};
use crate::types::{AttachmentKind, ChatListSource, SearchResultKind};
use crate::AutomationError;

#[test]
fn test_search_splits_chat_and_message_matches() {
    let sim = WhatsAppSimulator::new(sample_chats());
    let results = sim.whatsapp().global_search("deploy").unwrap().unwrap();

    assert_eq!(results.query, "deploy");
    assert!(results.chat_matches.is_empty());
    assert_eq!(results.message_matches.len(), 1);

    let hit = &results.message_matches[0];
    assert_eq!(hit.kind, SearchResultKind::Message);
    assert_eq!(hit.chat_name.as_deref(), Some("Team"));
    assert_eq!(hit.sender.as_deref(), Some("Carol"));
    assert_eq!(hit.snippet.as_deref(), Some("deploy is done"));
    assert_eq!(hit.date.as_deref(), Some("09:15"));
    assert!(!hit.is_outgoing);
    assert_eq!(hit.attachment.kind, AttachmentKind::None);
}

#[test]
fn test_chat_name_matches() {
    let sim = WhatsAppSimulator::new(sample_chats());
    let results = sim.whatsapp().global_search("tea").unwrap().unwrap();

    assert_eq!(results.chat_matches.len(), 1);
    let chat = &results.chat_matches[0];
    assert_eq!(chat.name, "Team");
    assert_eq!(chat.source, ChatListSource::SearchResults);
    assert_eq!(chat.list_position, 0);
}

#[test]
fn test_outgoing_match() {
    let sim = WhatsAppSimulator::new(sample_chats());
    let results = sim.whatsapp().global_search("12:30").unwrap().unwrap();

    assert_eq!(results.message_matches.len(), 1);
    let hit = &results.message_matches[0];
    assert!(hit.is_outgoing);
    assert_eq!(hit.sender, None);
    assert_eq!(hit.chat_name.as_deref(), Some("Alice"));
}

#[test]
fn test_photo_and_link_results_carry_attachments() {
    let sim = WhatsAppSimulator::new(sample_chats());
    let whatsapp = sim.whatsapp();

    let photos = whatsapp.global_search("photo").unwrap().unwrap();
    let photo = &photos.message_matches[0];
    assert_eq!(photo.kind, SearchResultKind::Photo);
    assert_eq!(photo.attachment.kind, AttachmentKind::Image);
    assert_eq!(photo.attachment.description.as_deref(), Some("beach.jpg"));

    let links = whatsapp.global_search("example.com").unwrap().unwrap();
    let link = &links.message_matches[0];
    assert_eq!(link.kind, SearchResultKind::Link);
    assert_eq!(link.attachment.kind, AttachmentKind::Link);

    // The panel accessor sees the same rows.
    let rows = whatsapp.search_results().unwrap();
    assert_eq!(rows, links.message_matches);
}

#[test]
fn test_search_mode_and_clear() {
    let sim = WhatsAppSimulator::new(sample_chats());
    let whatsapp = sim.whatsapp();
    assert!(!whatsapp.is_in_search_mode().unwrap());

    whatsapp.global_search("team").unwrap().unwrap();
    assert!(whatsapp.is_in_search_mode().unwrap());

    assert!(whatsapp.clear_search().unwrap());
    assert!(!whatsapp.is_in_search_mode().unwrap());
    assert_eq!(sim.query(), "");
    assert!(whatsapp.search_results().unwrap().is_empty());

    // Nothing to clear.
    assert!(whatsapp.clear_search().unwrap());
}

#[test]
fn test_new_search_replaces_previous_query() {
    let sim = WhatsAppSimulator::new(sample_chats());
    let whatsapp = sim.whatsapp();
    whatsapp.global_search("lunch").unwrap().unwrap();
    let results = whatsapp.global_search("standup").unwrap().unwrap();

    assert_eq!(sim.query(), "standup");
    assert_eq!(results.message_matches.len(), 1);
    assert_eq!(results.message_matches[0].sender.as_deref(), Some("Bob"));
}

#[test]
fn test_open_search_result() {
    let sim = WhatsAppSimulator::new(sample_chats());
    let whatsapp = sim.whatsapp();
    let results = whatsapp.global_search("deploy").unwrap().unwrap();
    let position = results.message_matches[0].list_position;

    assert!(whatsapp.open_search_result(position).unwrap());
    assert_eq!(sim.open_chat_name().as_deref(), Some("Team"));
    // The panel stays up after opening a result.
    assert!(whatsapp.is_in_search_mode().unwrap());
}

#[test]
fn test_open_search_result_out_of_range() {
    let sim = WhatsAppSimulator::new(sample_chats());
    let whatsapp = sim.whatsapp();
    whatsapp.global_search("deploy").unwrap().unwrap();

    assert!(!whatsapp.open_search_result(7).unwrap());
    assert_eq!(sim.open_chat_name(), None);
}

#[test]
fn test_blank_query_is_rejected() {
    let sim = WhatsAppSimulator::new(sample_chats());
    let err = sim.whatsapp().global_search("  ").unwrap_err();
    assert!(matches!(err, AutomationError::InvalidArgument(_)));
}

#[test]
fn test_search_field_focus_is_read_from_the_client() {
    use crate::platforms::AccessibilityEngine;

    let sim = WhatsAppSimulator::new(sample_chats());
    sim.type_search("team");

    let focused = sim.engine().focused_element().unwrap();
    assert_eq!(
        focused.identifier().unwrap().as_deref(),
        Some(crate::automation::ids::SEARCH_FIELD)
    );
    assert!(sim.whatsapp().is_in_search_mode().unwrap());
}
