//! Archival of complete daybreak reports.
//!
//! Each document of a complete report is staged on its own; a write
//! failure is recorded and the rest carry on. A failure to fetch content
//! from the mail store aborts archival before anything is moved. The
//! messages that were staged are then moved to the processed folder in one
//! batch for the whole pass. Staged files are never rolled back, so a
//! failed fetch or move means the next pass may stage the same files again.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::PathBuf;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{info, warn};

use crate::daybreak::{DaybreakDocType, DaybreakMessage, Report};
use crate::error::{ArchivalError, StagingError, TransportError};
use crate::mail::{Mailbox, MessageContent, MessageId};
use crate::staging::StagingSink;

/// Builds `<date prefix><type suffix>` filenames.
#[derive(Debug, Clone)]
pub struct FileNaming {
    date_pattern: String,
}

impl FileNaming {
    /// `date_pattern` is a chrono format string, validated by the config.
    pub fn new(date_pattern: impl Into<String>) -> Self {
        Self {
            date_pattern: date_pattern.into(),
        }
    }

    pub fn prefix(&self, date: NaiveDate) -> Result<String, StagingError> {
        let mut prefix = String::new();
        write!(prefix, "{}", date.format(&self.date_pattern))
            .map_err(|_| StagingError::InvalidFilename(self.date_pattern.clone()))?;
        Ok(prefix)
    }

    pub fn filename(&self, date: NaiveDate, doc_type: DaybreakDocType) -> Result<String, StagingError> {
        Ok(format!("{}{}", self.prefix(date)?, doc_type.suffix()))
    }
}

/// A document written to staging.
#[derive(Debug, Clone, Serialize)]
pub struct StagedDocument {
    pub report_date: NaiveDate,
    pub doc_type: DaybreakDocType,
    pub message_id: MessageId,
    pub path: PathBuf,
}

/// A document that could not be staged.
#[derive(Debug)]
pub struct StagingFailure {
    pub report_date: NaiveDate,
    pub doc_type: DaybreakDocType,
    pub message_id: MessageId,
    pub error: StagingError,
}

/// Outcome of archiving a pass's complete reports.
#[derive(Debug, Default)]
pub struct ArchivalResult {
    pub staged: Vec<StagedDocument>,
    pub failures: Vec<StagingFailure>,
    /// Messages moved to the processed folder.
    pub archived: Vec<MessageId>,
    /// Set when the batch move failed after staging.
    pub move_error: Option<ArchivalError>,
}

/// Stages documents and moves their messages.
pub struct Archiver<'a, S: StagingSink + ?Sized> {
    naming: &'a FileNaming,
    sink: &'a S,
}

impl<'a, S: StagingSink + ?Sized> Archiver<'a, S> {
    pub fn new(naming: &'a FileNaming, sink: &'a S) -> Self {
        Self { naming, sink }
    }

    /// Stage every document of every report, then move the staged
    /// messages from the selected folder to `archive_folder`.
    ///
    /// A content fetch failure is returned as-is and nothing is moved.
    pub fn archive<M: Mailbox + ?Sized>(
        &self,
        mailbox: &mut M,
        reports: &BTreeMap<NaiveDate, Report<DaybreakMessage>>,
        archive_folder: &str,
    ) -> Result<ArchivalResult, TransportError> {
        let mut result = ArchivalResult::default();

        for (date, report) in reports {
            for (doc_type, doc) in report.docs() {
                let content = mailbox.fetch_content(doc.message_id).inspect_err(|e| {
                    warn!(
                        date = %date,
                        doc_type = %doc_type,
                        message = %doc.message_id,
                        "Failed to fetch daybreak message: {e}"
                    );
                })?;
                match self.stage(*date, doc_type, doc, &content) {
                    Ok(path) => {
                        info!(
                            date = %date,
                            doc_type = %doc_type,
                            path = %path.display(),
                            "Saved daybreak file"
                        );
                        result.staged.push(StagedDocument {
                            report_date: *date,
                            doc_type,
                            message_id: doc.message_id,
                            path,
                        });
                    }
                    Err(error) => {
                        warn!(
                            date = %date,
                            doc_type = %doc_type,
                            message = %doc.message_id,
                            "Failed to stage daybreak file: {error}"
                        );
                        result.failures.push(StagingFailure {
                            report_date: *date,
                            doc_type,
                            message_id: doc.message_id,
                            error,
                        });
                    }
                }
            }
        }

        let batch: Vec<MessageId> = result.staged.iter().map(|s| s.message_id).collect();
        if batch.is_empty() {
            return Ok(result);
        }

        match move_batch(mailbox, &batch, archive_folder) {
            Ok(()) => result.archived = batch,
            Err(source) => {
                result.move_error = Some(ArchivalError::Move {
                    count: batch.len(),
                    folder: archive_folder.to_string(),
                    source,
                });
            }
        }
        Ok(result)
    }

    /// Write one document's attachments under its filename.
    ///
    /// Several attachments are written in order to the same name, so the
    /// last one is what remains on disk.
    fn stage(
        &self,
        date: NaiveDate,
        doc_type: DaybreakDocType,
        doc: &DaybreakMessage,
        content: &MessageContent,
    ) -> Result<PathBuf, StagingError> {
        let filename = self.naming.filename(date, doc_type)?;

        let mut staged = None;
        for attachment in &content.attachments {
            tracing::debug!(
                attachment = attachment.filename.as_deref().unwrap_or("(unnamed)"),
                filename = %filename,
                "Saving attachment"
            );
            staged = Some(self.sink.write(&filename, &attachment.data)?);
        }
        staged.ok_or(StagingError::MissingAttachment(doc.message_id))
    }
}

/// Copy to the archive folder, flag deleted, expunge.
fn move_batch<M: Mailbox + ?Sized>(
    mailbox: &mut M,
    batch: &[MessageId],
    archive_folder: &str,
) -> Result<(), TransportError> {
    mailbox.copy_messages(batch, archive_folder)?;
    mailbox.flag_deleted(batch)?;
    mailbox.expunge()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Mutex;

    use super::*;
    use crate::daybreak::ReportSet;
    use crate::mail::memory::FailOn;
    use crate::mail::{Attachment, MailTransport, MemoryTransport};

    /// Records writes in memory; names listed in `fail` are refused.
    #[derive(Default)]
    struct RecordingSink {
        files: Mutex<BTreeMap<String, Vec<u8>>>,
        fail: BTreeSet<String>,
    }

    impl StagingSink for RecordingSink {
        fn write(&self, filename: &str, data: &[u8]) -> Result<PathBuf, StagingError> {
            if self.fail.contains(filename) {
                return Err(StagingError::Io {
                    path: PathBuf::from(filename),
                    source: std::io::Error::other("disk full"),
                });
            }
            self.files
                .lock()
                .unwrap()
                .insert(filename.to_string(), data.to_vec());
            Ok(PathBuf::from(filename))
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn attachment(text: &str) -> Vec<Attachment> {
        vec![Attachment {
            filename: Some("daybreak.html".into()),
            data: text.as_bytes().to_vec(),
        }]
    }

    fn three_types() -> BTreeSet<DaybreakDocType> {
        [
            DaybreakDocType::PageFile,
            DaybreakDocType::SenateLow,
            DaybreakDocType::SenateHigh,
        ]
        .into()
    }

    /// Deliver a full three-document report for `date` and return the reports.
    fn setup(
        transport: &MemoryTransport,
        dates: &[NaiveDate],
    ) -> BTreeMap<NaiveDate, Report<DaybreakMessage>> {
        transport.create_folder("Processed");
        let mut docs = Vec::new();
        for date in dates {
            for (doc_type, subject) in [
                (DaybreakDocType::PageFile, "Page File"),
                (DaybreakDocType::SenateLow, "Senate Low"),
                (DaybreakDocType::SenateHigh, "Senate High"),
            ] {
                let id = transport.deliver("INBOX", subject, Some(*date), attachment(subject));
                docs.push(DaybreakMessage {
                    doc_type,
                    report_date: *date,
                    message_id: id,
                    subject: subject.into(),
                });
            }
        }
        let (complete, _) = ReportSet::ingest(docs, &three_types()).into_parts();
        complete
    }

    #[test]
    fn naming_uses_pattern_and_suffix() {
        let naming = FileNaming::new("%Y%m%d");
        assert_eq!(
            naming.filename(day(5), DaybreakDocType::PageFile).unwrap(),
            "20240105.page_file.txt"
        );
        let dashed = FileNaming::new("%Y-%m-%d");
        assert_eq!(
            dashed.filename(day(5), DaybreakDocType::AssemblyHigh).unwrap(),
            "2024-01-05.assembly.high.html"
        );
    }

    #[test]
    fn stages_and_moves_in_one_batch() {
        let transport = MemoryTransport::new();
        let reports = setup(&transport, &[day(5), day(6)]);
        let naming = FileNaming::new("%Y%m%d");
        let sink = RecordingSink::default();

        let mut mailbox = transport.connect().unwrap();
        mailbox.open_folder("INBOX").unwrap();
        let result = Archiver::new(&naming, &sink)
            .archive(&mut mailbox, &reports, "Processed")
            .unwrap();

        assert!(result.failures.is_empty());
        assert!(result.move_error.is_none());
        assert_eq!(result.staged.len(), 6);
        assert_eq!(result.archived.len(), 6);
        assert_eq!(transport.copy_calls(), 1);
        assert!(transport.messages("INBOX").is_empty());
        assert_eq!(transport.messages("Processed").len(), 6);

        let files = sink.files.lock().unwrap();
        assert_eq!(files["20240105.senate.low.html"], b"Senate Low");
        assert!(files.contains_key("20240106.page_file.txt"));
    }

    #[test]
    fn write_failure_does_not_stop_siblings() {
        let transport = MemoryTransport::new();
        let reports = setup(&transport, &[day(5)]);
        let naming = FileNaming::new("%Y%m%d");
        let sink = RecordingSink {
            fail: ["20240105.senate.high.html".to_string()].into(),
            ..Default::default()
        };

        let mut mailbox = transport.connect().unwrap();
        mailbox.open_folder("INBOX").unwrap();
        let result = Archiver::new(&naming, &sink)
            .archive(&mut mailbox, &reports, "Processed")
            .unwrap();

        assert_eq!(result.staged.len(), 2);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].doc_type, DaybreakDocType::SenateHigh);
        assert_eq!(result.archived.len(), 2);

        // the failed document's message stays put
        let remaining = transport.messages("INBOX");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].subject, "Senate High");
    }

    #[test]
    fn missing_attachment_is_a_failure() {
        let transport = MemoryTransport::new();
        transport.create_folder("Processed");
        let id = transport.deliver("INBOX", "Page File", Some(day(5)), vec![]);
        let docs = vec![DaybreakMessage {
            doc_type: DaybreakDocType::PageFile,
            report_date: day(5),
            message_id: id,
            subject: "Page File".into(),
        }];
        let required = [DaybreakDocType::PageFile].into();
        let (complete, _) = ReportSet::ingest(docs, &required).into_parts();

        let naming = FileNaming::new("%Y%m%d");
        let sink = RecordingSink::default();
        let mut mailbox = transport.connect().unwrap();
        mailbox.open_folder("INBOX").unwrap();
        let result = Archiver::new(&naming, &sink)
            .archive(&mut mailbox, &complete, "Processed")
            .unwrap();

        assert!(matches!(
            result.failures[0].error,
            StagingError::MissingAttachment(m) if m == id
        ));
        assert!(result.archived.is_empty());
        assert_eq!(transport.copy_calls(), 0);
    }

    #[test]
    fn last_attachment_wins() {
        let transport = MemoryTransport::new();
        transport.create_folder("Processed");
        let id = transport.deliver(
            "INBOX",
            "Page File",
            Some(day(5)),
            vec![
                Attachment { filename: None, data: b"one".to_vec() },
                Attachment { filename: None, data: b"two".to_vec() },
            ],
        );
        let docs = vec![DaybreakMessage {
            doc_type: DaybreakDocType::PageFile,
            report_date: day(5),
            message_id: id,
            subject: "Page File".into(),
        }];
        let (complete, _) =
            ReportSet::ingest(docs, &[DaybreakDocType::PageFile].into()).into_parts();

        let naming = FileNaming::new("%Y%m%d");
        let sink = RecordingSink::default();
        let mut mailbox = transport.connect().unwrap();
        mailbox.open_folder("INBOX").unwrap();
        Archiver::new(&naming, &sink)
            .archive(&mut mailbox, &complete, "Processed")
            .unwrap();

        assert_eq!(sink.files.lock().unwrap()["20240105.page_file.txt"], b"two");
    }

    #[test]
    fn move_failure_keeps_staged_files() {
        let transport = MemoryTransport::new();
        let reports = setup(&transport, &[day(5)]);
        transport.fail_on(FailOn::Copy);
        let naming = FileNaming::new("%Y%m%d");
        let sink = RecordingSink::default();

        let mut mailbox = transport.connect().unwrap();
        mailbox.open_folder("INBOX").unwrap();
        let result = Archiver::new(&naming, &sink)
            .archive(&mut mailbox, &reports, "Processed")
            .unwrap();

        assert_eq!(result.staged.len(), 3);
        assert!(result.archived.is_empty());
        assert!(matches!(result.move_error, Some(ArchivalError::Move { count: 3, .. })));
        assert_eq!(sink.files.lock().unwrap().len(), 3);
        assert_eq!(transport.messages("INBOX").len(), 3);
        assert!(transport.messages("INBOX").iter().all(|m| !m.deleted));
    }

    #[test]
    fn restaging_overwrites_same_names() {
        let transport = MemoryTransport::new();
        let reports = setup(&transport, &[day(5)]);
        transport.fail_on(FailOn::Copy);
        let naming = FileNaming::new("%Y%m%d");
        let sink = RecordingSink::default();

        let mut mailbox = transport.connect().unwrap();
        mailbox.open_folder("INBOX").unwrap();
        let archiver = Archiver::new(&naming, &sink);
        archiver.archive(&mut mailbox, &reports, "Processed").unwrap();
        let again = archiver.archive(&mut mailbox, &reports, "Processed").unwrap();

        assert_eq!(again.staged.len(), 3);
        assert_eq!(sink.files.lock().unwrap().len(), 3);
    }

    #[test]
    fn fetch_failure_aborts_before_move() {
        let transport = MemoryTransport::new();
        let reports = setup(&transport, &[day(5)]);
        let low = transport.message_ids("INBOX")[1];
        transport.fail_fetch(low);
        let naming = FileNaming::new("%Y%m%d");
        let sink = RecordingSink::default();

        let mut mailbox = transport.connect().unwrap();
        mailbox.open_folder("INBOX").unwrap();
        let err = Archiver::new(&naming, &sink)
            .archive(&mut mailbox, &reports, "Processed")
            .unwrap_err();

        assert!(matches!(err, TransportError::Protocol(_)));
        assert_eq!(transport.copy_calls(), 0);
        assert_eq!(transport.messages("INBOX").len(), 3);
        assert!(transport.messages("INBOX").iter().all(|m| !m.deleted));
    }
}
