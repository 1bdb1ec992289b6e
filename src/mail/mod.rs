//! Mail transport abstraction.
//!
//! The polling pass only talks to a mailbox through [`MailTransport`] and
//! [`Mailbox`]. `imap` is the production implementation; `memory` keeps
//! everything in process for tests and dry runs.

pub mod imap;
pub mod memory;
pub mod parse;

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::TransportError;

pub use imap::ImapTransport;
pub use memory::MemoryTransport;

/// Transport-native message handle (an IMAP UID).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageId(pub u32);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the scan step needs to know about a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHeader {
    pub id: MessageId,
    pub subject: String,
    /// Calendar date of the `Date:` header, as written by the sender.
    pub sent_date: Option<NaiveDate>,
    /// Already flagged `\Deleted`, waiting for an expunge.
    pub flagged_deleted: bool,
}

/// A single attachment part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: Option<String>,
    pub data: Vec<u8>,
}

/// Full content of a message, reduced to its attachments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageContent {
    pub attachments: Vec<Attachment>,
}

/// Opens connections to a mail store.
pub trait MailTransport {
    type Mailbox: Mailbox;

    /// Connect and authenticate.
    fn connect(&self) -> Result<Self::Mailbox, TransportError>;
}

/// An open, authenticated mail store connection.
///
/// All operations apply to the folder selected by `open_folder`.
pub trait Mailbox {
    /// Select a folder for read-write access.
    fn open_folder(&mut self, path: &str) -> Result<(), TransportError>;

    /// Enumerate every message in the selected folder.
    fn list_messages(&mut self) -> Result<Vec<MessageHeader>, TransportError>;

    /// Read a message's attachments.
    fn fetch_content(&mut self, id: MessageId) -> Result<MessageContent, TransportError>;

    /// Copy messages into another folder.
    fn copy_messages(&mut self, ids: &[MessageId], dest: &str) -> Result<(), TransportError>;

    /// Flag messages for deletion.
    fn flag_deleted(&mut self, ids: &[MessageId]) -> Result<(), TransportError>;

    /// Permanently remove flagged messages from the selected folder.
    fn expunge(&mut self) -> Result<(), TransportError>;

    /// Release the connection. Safe to call more than once.
    fn close(&mut self) -> Result<(), TransportError>;
}

/// Translate a configured `a/b/c` folder path to the server's hierarchy
/// delimiter.
pub fn folder_path(path: &str, delimiter: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join(delimiter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folder_path_keeps_slash_delimiter() {
        assert_eq!(folder_path("INBOX/Daybreak", "/"), "INBOX/Daybreak");
    }

    #[test]
    fn folder_path_translates_delimiter() {
        assert_eq!(folder_path("INBOX/Daybreak/Processed", "."), "INBOX.Daybreak.Processed");
    }

    #[test]
    fn folder_path_drops_empty_segments() {
        assert_eq!(folder_path("/INBOX//Processed/", "."), "INBOX.Processed");
        assert_eq!(folder_path("INBOX", "."), "INBOX");
    }

    #[test]
    fn message_id_display() {
        assert_eq!(MessageId(42).to_string(), "42");
    }
}
