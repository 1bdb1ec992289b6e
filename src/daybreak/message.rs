//! Classified daybreak messages.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::daybreak::DaybreakDocType;
use crate::mail::{MessageHeader, MessageId};

/// Anything that can be placed into a daybreak report.
pub trait DaybreakDocument {
    fn doc_type(&self) -> DaybreakDocType;
    fn report_date(&self) -> NaiveDate;
}

/// A mailbox message recognized as a daybreak document.
///
/// The payload is not held here. It is fetched through the transport by
/// `message_id` only when the report turns out to be complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaybreakMessage {
    pub doc_type: DaybreakDocType,
    pub report_date: NaiveDate,
    pub message_id: MessageId,
    pub subject: String,
}

impl DaybreakMessage {
    /// Classify a listed message.
    ///
    /// Returns `None` when the subject is not a daybreak subject or the
    /// message carries no usable date.
    pub fn classify(header: &MessageHeader) -> Option<Self> {
        let doc_type = DaybreakDocType::from_subject(&header.subject)?;
        let Some(report_date) = header.sent_date else {
            tracing::warn!(
                id = %header.id,
                subject = %header.subject,
                "Daybreak message has no date, skipping"
            );
            return None;
        };
        Some(Self {
            doc_type,
            report_date,
            message_id: header.id,
            subject: header.subject.clone(),
        })
    }
}

impl DaybreakDocument for DaybreakMessage {
    fn doc_type(&self) -> DaybreakDocType {
        self.doc_type
    }

    fn report_date(&self) -> NaiveDate {
        self.report_date
    }
}
