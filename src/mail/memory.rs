//! In-process mail store.
//!
//! Shares its state behind an `Arc<Mutex<_>>` so a test can hand the
//! transport to a service and still inspect folders, flags and call counts
//! afterwards. Failures can be injected per operation.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::NaiveDate;

use crate::error::TransportError;
use crate::mail::{Attachment, MailTransport, Mailbox, MessageContent, MessageHeader, MessageId};

/// A stored message.
#[derive(Debug, Clone)]
pub struct MemoryMessage {
    pub id: MessageId,
    pub subject: String,
    pub sent_date: Option<NaiveDate>,
    pub attachments: Vec<Attachment>,
    pub deleted: bool,
}

/// Operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FailOn {
    Connect,
    OpenFolder,
    List,
    Fetch,
    Copy,
    Flag,
    Expunge,
}

#[derive(Debug, Default)]
struct MemoryState {
    folders: BTreeMap<String, Vec<MemoryMessage>>,
    next_uid: u32,
    failures: BTreeSet<FailOn>,
    failing_fetches: BTreeSet<MessageId>,
    connects: usize,
    closes: usize,
    copy_calls: usize,
}

/// Mail transport backed by in-memory folders.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create an empty folder.
    pub fn create_folder(&self, path: &str) {
        self.lock().folders.entry(path.to_string()).or_default();
    }

    /// Deliver a message into a folder, creating the folder if needed.
    pub fn deliver(
        &self,
        folder: &str,
        subject: &str,
        sent_date: Option<NaiveDate>,
        attachments: Vec<Attachment>,
    ) -> MessageId {
        let mut state = self.lock();
        state.next_uid += 1;
        let id = MessageId(state.next_uid);
        state
            .folders
            .entry(folder.to_string())
            .or_default()
            .push(MemoryMessage {
                id,
                subject: subject.to_string(),
                sent_date,
                attachments,
                deleted: false,
            });
        id
    }

    pub fn fail_on(&self, op: FailOn) {
        self.lock().failures.insert(op);
    }

    pub fn fail_fetch(&self, id: MessageId) {
        self.lock().failing_fetches.insert(id);
    }

    /// Messages currently in a folder.
    pub fn messages(&self, folder: &str) -> Vec<MemoryMessage> {
        self.lock().folders.get(folder).cloned().unwrap_or_default()
    }

    pub fn message_ids(&self, folder: &str) -> Vec<MessageId> {
        self.messages(folder).iter().map(|m| m.id).collect()
    }

    pub fn connects(&self) -> usize {
        self.lock().connects
    }

    pub fn closes(&self) -> usize {
        self.lock().closes
    }

    pub fn copy_calls(&self) -> usize {
        self.lock().copy_calls
    }
}

impl MailTransport for MemoryTransport {
    type Mailbox = MemoryMailbox;

    fn connect(&self) -> Result<MemoryMailbox, TransportError> {
        let mut state = self.lock();
        if state.failures.contains(&FailOn::Connect) {
            return Err(TransportError::Connect {
                host: "memory".into(),
                reason: "injected failure".into(),
            });
        }
        state.connects += 1;
        Ok(MemoryMailbox {
            transport: self.clone(),
            selected: None,
            closed: false,
        })
    }
}

/// A "connection" to a [`MemoryTransport`].
#[derive(Debug)]
pub struct MemoryMailbox {
    transport: MemoryTransport,
    selected: Option<String>,
    closed: bool,
}

impl MemoryMailbox {
    fn check(&self, state: &MemoryState, op: FailOn) -> Result<String, TransportError> {
        if self.closed {
            return Err(TransportError::Protocol("connection closed".into()));
        }
        if state.failures.contains(&op) {
            return Err(TransportError::CommandFailed {
                command: format!("{op:?}"),
                response: "injected failure".into(),
            });
        }
        self.selected.clone().ok_or(TransportError::NoFolderSelected)
    }
}

impl Mailbox for MemoryMailbox {
    fn open_folder(&mut self, path: &str) -> Result<(), TransportError> {
        let state = self.transport.lock();
        if state.failures.contains(&FailOn::OpenFolder) {
            return Err(TransportError::FolderNotFound(path.to_string()));
        }
        if !state.folders.contains_key(path) {
            return Err(TransportError::FolderNotFound(path.to_string()));
        }
        drop(state);
        self.selected = Some(path.to_string());
        Ok(())
    }

    fn list_messages(&mut self) -> Result<Vec<MessageHeader>, TransportError> {
        let state = self.transport.lock();
        let folder = self.check(&state, FailOn::List)?;
        Ok(state
            .folders
            .get(&folder)
            .map(|msgs| {
                msgs.iter()
                    .map(|m| MessageHeader {
                        id: m.id,
                        subject: m.subject.clone(),
                        sent_date: m.sent_date,
                        flagged_deleted: m.deleted,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    fn fetch_content(&mut self, id: MessageId) -> Result<MessageContent, TransportError> {
        let state = self.transport.lock();
        let folder = self.check(&state, FailOn::Fetch)?;
        if state.failing_fetches.contains(&id) {
            return Err(TransportError::Protocol(format!("injected fetch failure for {id}")));
        }
        state
            .folders
            .get(&folder)
            .and_then(|msgs| msgs.iter().find(|m| m.id == id))
            .map(|m| MessageContent {
                attachments: m.attachments.clone(),
            })
            .ok_or(TransportError::MessageNotFound(id))
    }

    fn copy_messages(&mut self, ids: &[MessageId], dest: &str) -> Result<(), TransportError> {
        let mut state = self.transport.lock();
        let folder = self.check(&state, FailOn::Copy)?;
        state.copy_calls += 1;
        if !state.folders.contains_key(dest) {
            return Err(TransportError::FolderNotFound(dest.to_string()));
        }
        let copies: Vec<MemoryMessage> = state
            .folders
            .get(&folder)
            .map(|msgs| msgs.iter().filter(|m| ids.contains(&m.id)).cloned().collect())
            .unwrap_or_default();
        if copies.len() != ids.len() {
            return Err(TransportError::CommandFailed {
                command: "COPY".into(),
                response: "unknown message in set".into(),
            });
        }
        state.folders.entry(dest.to_string()).or_default().extend(copies);
        Ok(())
    }

    fn flag_deleted(&mut self, ids: &[MessageId]) -> Result<(), TransportError> {
        let mut state = self.transport.lock();
        let folder = self.check(&state, FailOn::Flag)?;
        if let Some(msgs) = state.folders.get_mut(&folder) {
            for msg in msgs.iter_mut().filter(|m| ids.contains(&m.id)) {
                msg.deleted = true;
            }
        }
        Ok(())
    }

    fn expunge(&mut self) -> Result<(), TransportError> {
        let mut state = self.transport.lock();
        let folder = self.check(&state, FailOn::Expunge)?;
        if let Some(msgs) = state.folders.get_mut(&folder) {
            msgs.retain(|m| !m.deleted);
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if !self.closed {
            self.closed = true;
            self.transport.lock().closes += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_flag_expunge_moves_messages() {
        let transport = MemoryTransport::new();
        transport.create_folder("Processed");
        let a = transport.deliver("INBOX", "Page File", None, vec![]);
        let b = transport.deliver("INBOX", "other", None, vec![]);

        let mut mailbox = transport.connect().unwrap();
        mailbox.open_folder("INBOX").unwrap();
        mailbox.copy_messages(&[a], "Processed").unwrap();
        mailbox.flag_deleted(&[a]).unwrap();
        assert!(mailbox.list_messages().unwrap()[0].flagged_deleted);
        mailbox.expunge().unwrap();
        mailbox.close().unwrap();

        assert_eq!(transport.message_ids("INBOX"), vec![b]);
        assert_eq!(transport.message_ids("Processed"), vec![a]);
        assert_eq!(transport.closes(), 1);
    }

    #[test]
    fn operations_need_a_selected_folder() {
        let transport = MemoryTransport::new();
        let mut mailbox = transport.connect().unwrap();
        assert!(matches!(
            mailbox.list_messages(),
            Err(TransportError::NoFolderSelected)
        ));
    }

    #[test]
    fn missing_folder_is_an_error() {
        let transport = MemoryTransport::new();
        let mut mailbox = transport.connect().unwrap();
        assert!(matches!(
            mailbox.open_folder("Nope"),
            Err(TransportError::FolderNotFound(_))
        ));
    }

    #[test]
    fn injected_connect_failure() {
        let transport = MemoryTransport::new();
        transport.fail_on(FailOn::Connect);
        assert!(transport.connect().is_err());
        assert_eq!(transport.connects(), 0);
    }

    #[test]
    fn injected_failures_stay_on_their_operation() {
        let transport = MemoryTransport::new();
        let id = transport.deliver("INBOX", "Page File", None, vec![]);
        transport.fail_on(FailOn::List);

        let mut mailbox = transport.connect().unwrap();
        mailbox.open_folder("INBOX").unwrap();
        assert!(mailbox.list_messages().is_err());
        assert!(mailbox.fetch_content(id).is_ok());

        transport.fail_on(FailOn::Fetch);
        assert!(matches!(
            mailbox.fetch_content(id),
            Err(TransportError::CommandFailed { .. })
        ));
    }

    #[test]
    fn injected_open_failure() {
        let transport = MemoryTransport::new();
        transport.create_folder("INBOX");
        transport.fail_on(FailOn::OpenFolder);
        let mut mailbox = transport.connect().unwrap();
        assert!(matches!(
            mailbox.open_folder("INBOX"),
            Err(TransportError::FolderNotFound(_))
        ));
    }

    #[test]
    fn close_is_idempotent() {
        let transport = MemoryTransport::new();
        let mut mailbox = transport.connect().unwrap();
        mailbox.close().unwrap();
        mailbox.close().unwrap();
        assert_eq!(transport.closes(), 1);
    }
}
