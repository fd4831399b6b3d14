//! Literal tokens of WhatsApp's accessibility description strings.
//!
//! These strings are not a documented format; they were read off the running client. When a
//! client update changes the wording, this module is the only place that needs to follow.

use once_cell::sync::Lazy;
use regex::Regex;

/// Separates top-level segments of every description.
pub const SEGMENT_SEP: &str = ", ";
/// Separates a sender from the text it wrote (`"Alice: hi"`).
pub const SENDER_SEP: &str = ": ";
/// Sender label the client uses for the local user.
pub const SELF_SENDER: &str = "You";

// Chat list row flags, trailing segments in any order.
pub const FLAG_PINNED: &str = "Pinned";
pub const FLAG_UNREAD: &str = "Unread";
pub const FLAG_MUTED: &str = "Muted";
pub const FLAG_GROUP: &str = "Group";
pub const UNREAD_COUNT_ONE: &str = " unread message";
pub const UNREAD_COUNT_MANY: &str = " unread messages";

// Message bubble prefixes, always the first segment.
pub const OUTGOING_PREFIX: &str = "Your message";
pub const INCOMING_PREFIX: &str = "Message";
pub const INCOMING_FROM_PREFIX: &str = "Message from ";
pub const SYSTEM_PREFIX: &str = "System message";

/// Leads the quoted-reply segment: `Replying to Alice: "original text"`.
pub const REPLY_PREFIX: &str = "Replying to ";
/// Leads the reactions segment: `Reactions: 👍 ❤️`.
pub const REACTIONS_PREFIX: &str = "Reactions: ";

pub const RECEIPT_SENT: &str = "Sent";
pub const RECEIPT_DELIVERED: &str = "Delivered";
pub const RECEIPT_READ: &str = "Read";

/// Quote pairs that protect embedded separators inside a segment.
pub const QUOTE_PAIRS: &[(char, char)] = &[('"', '"'), ('\u{201C}', '\u{201D}')];

/// Snippets shown for photo search hits.
pub const PHOTO_SNIPPETS: &[&str] = &["Photo", "\u{1F4F7} Photo", "Image"];
pub const URL_MARKERS: &[&str] = &["http://", "https://", "www."];

/// Identifier of the attachment child button on an image result.
pub const VISUAL_MEDIA_ID: &str = "VisualMedia";
/// Identifier of the attachment child button on a link or document result.
pub const NONVISUAL_MEDIA_ID: &str = "NonvisualMedia";

/// Header subtitles that carry no presence information.
pub const HEADER_NOISE: &[&str] = &[
    "click here for contact info",
    "click here for group info",
    "tap here for contact info",
];

pub const RELATIVE_DAYS: &[&str] = &["Today", "Yesterday"];
pub const WEEKDAYS: &[&str] = &[
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

/// `18:52`, `6:52 PM`, `6:52\u{202F}pm`.
pub static TIME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{1,2}:\d{2}(?:[\s\u{202F}]?[AaPp]\.?[Mm]\.?)?$").expect("valid time regex")
});

/// `14/03/2025`, `3.14.25`, `2025-03-14`.
pub static DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:\d{1,2}[./-]\d{1,2}[./-]\d{2,4}|\d{4}-\d{2}-\d{2})$").expect("valid date regex")
});

/// The remains of a time or date cut off mid-way: `18:`, `18:5`, `14.`, `14/03`, `14/03/2`.
/// Plain numbers such as `42` or `3.50` are ordinary text.
pub static TIMESTAMP_FRAGMENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:\d{1,2}:\d?|\d{1,2}(?:[./-]\d{1,2})*[./-]|\d{1,2}/\d{2}(?:/\d{0,3})?)$")
        .expect("valid fragment regex")
});
