//! The daybreak mail check: one polling pass over the receiving folder.
//!
//! A pass walks `Idle → Connecting → Scanning → Aggregating → Deciding`,
//! enters `Archiving` only when a complete report exists, and always ends
//! back in `Idle` with the connection closed.

use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::archive::{ArchivalResult, Archiver, FileNaming};
use crate::config::CheckMailConfig;
use crate::daybreak::{DaybreakDocType, DaybreakMessage, ReportSet};
use crate::error::{ArchivalError, Error, TransportError};
use crate::mail::{MailTransport, Mailbox, MessageId};
use crate::staging::StagingSink;

/// Where a polling pass currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassState {
    Idle,
    Connecting,
    Scanning,
    Aggregating,
    Deciding,
    Archiving,
}

impl fmt::Display for PassState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Scanning => "scanning",
            Self::Aggregating => "aggregating",
            Self::Deciding => "deciding",
            Self::Archiving => "archiving",
        };
        f.write_str(s)
    }
}

/// A staging failure as reported in the pass summary.
#[derive(Debug, Clone, Serialize)]
pub struct FailureSummary {
    pub report_date: NaiveDate,
    pub doc_type: DaybreakDocType,
    pub message_id: MessageId,
    pub error: String,
}

/// What a pass found and did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PassSummary {
    pub messages_scanned: usize,
    pub daybreak_messages: usize,
    pub complete_reports: usize,
    pub partial_reports: usize,
    pub files_saved: usize,
    pub messages_archived: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub staging_failures: Vec<FailureSummary>,
}

/// Runs polling passes against one mailbox.
pub struct CheckMailService<T, S> {
    config: CheckMailConfig,
    transport: T,
    sink: S,
    naming: FileNaming,
}

impl<T, S> CheckMailService<T, S>
where
    T: MailTransport,
    S: StagingSink,
{
    pub fn new(config: CheckMailConfig, transport: T, sink: S) -> Self {
        let naming = FileNaming::new(config.report_date_pattern.clone());
        Self {
            config,
            transport,
            sink,
            naming,
        }
    }

    pub fn config(&self) -> &CheckMailConfig {
        &self.config
    }

    /// Run one full pass: connect, scan, aggregate, decide, archive.
    ///
    /// The connection is closed on every path. Staging write failures are
    /// reported in the summary; transport failures (including a content
    /// fetch while archiving) and batch-move failures are returned as
    /// errors.
    pub fn check_mail(&self) -> Result<PassSummary, Error> {
        info!("Checking for daybreak emails...");
        enter(PassState::Connecting);
        let mut mailbox = self.transport.connect().inspect_err(|e| {
            error!("CheckMail connect failed: {e}");
            enter(PassState::Idle);
        })?;

        let result = self.run(&mut mailbox);

        if let Err(e) = mailbox.close() {
            debug!("Error closing mail connection: {e}");
        }
        enter(PassState::Idle);

        match &result {
            Ok(summary) => info!(
                scanned = summary.messages_scanned,
                daybreak = summary.daybreak_messages,
                complete = summary.complete_reports,
                partial = summary.partial_reports,
                files_saved = summary.files_saved,
                archived = summary.messages_archived,
                "CheckMail pass finished"
            ),
            Err(e) => error!("CheckMail error: {e}"),
        }
        result
    }

    fn run(&self, mailbox: &mut T::Mailbox) -> Result<PassSummary, Error> {
        enter(PassState::Scanning);
        let source = self.config.receiving_path();
        mailbox.open_folder(&source)?;
        let (scanned, documents) = scan(mailbox)?;

        enter(PassState::Aggregating);
        let mut summary = PassSummary {
            messages_scanned: scanned,
            daybreak_messages: documents.len(),
            ..Default::default()
        };
        let reports = ReportSet::ingest(documents, &self.config.required_types);
        summary.complete_reports = reports.complete().len();
        summary.partial_reports = reports.partial().len();

        enter(PassState::Deciding);
        if summary.complete_reports == 0 {
            if summary.partial_reports > 0 {
                for (date, report) in reports.partial() {
                    debug!(date = %date, present = ?report.doc_types(), "Partial daybreak report");
                }
                info!("{} partial daybreak reports found.", summary.partial_reports);
            } else {
                info!("No daybreak reports found");
            }
            return Ok(summary);
        }

        enter(PassState::Archiving);
        info!(
            "{} complete daybreak reports found. Saving...",
            summary.complete_reports
        );
        let archive_folder = self.config.processed_path();
        let result = Archiver::new(&self.naming, &self.sink).archive(
            mailbox,
            reports.complete(),
            &archive_folder,
        )?;
        let move_error = record(&mut summary, result);

        info!(
            files_saved = summary.files_saved,
            archived = summary.messages_archived,
            failures = summary.staging_failures.len(),
            "Daybreak files saved."
        );
        match move_error {
            Some(e) => Err(e.into()),
            None => Ok(summary),
        }
    }
}

/// List the selected folder and keep the messages that classify.
fn scan<M: Mailbox + ?Sized>(
    mailbox: &mut M,
) -> Result<(usize, Vec<DaybreakMessage>), TransportError> {
    let headers = mailbox.list_messages()?;
    let scanned = headers.len();
    let documents = headers
        .iter()
        .filter(|h| {
            if h.flagged_deleted {
                debug!(id = %h.id, "Skipping message already flagged for deletion");
            }
            !h.flagged_deleted
        })
        .filter_map(|h| {
            let doc = DaybreakMessage::classify(h);
            if doc.is_none() {
                debug!(id = %h.id, subject = %h.subject, "Not a daybreak message");
            }
            doc
        })
        .collect();
    Ok((scanned, documents))
}

/// Fold an archival result into the summary, handing back any move error.
fn record(summary: &mut PassSummary, result: ArchivalResult) -> Option<ArchivalError> {
    summary.files_saved = result.staged.len();
    summary.messages_archived = result.archived.len();
    summary.staging_failures = result
        .failures
        .into_iter()
        .map(|f| FailureSummary {
            report_date: f.report_date,
            doc_type: f.doc_type,
            message_id: f.message_id,
            error: f.error.to_string(),
        })
        .collect();
    if let Some(e) = &result.move_error {
        warn!("Staged files were kept but messages were not archived: {e}");
    }
    result.move_error
}

fn enter(state: PassState) {
    debug!(state = %state, "CheckMail pass state");
}
