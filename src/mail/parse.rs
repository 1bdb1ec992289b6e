//! RFC 822 parsing helpers built on `mail_parser`.

use chrono::NaiveDate;
use mail_parser::{MessageParser, MimeHeaders};

use crate::error::TransportError;
use crate::mail::{Attachment, MessageContent, MessageHeader, MessageId};

/// Build a [`MessageHeader`] from raw header (or full message) bytes.
pub fn parse_header(
    id: MessageId,
    raw: &[u8],
    flagged_deleted: bool,
) -> Result<MessageHeader, TransportError> {
    let parsed = MessageParser::default()
        .parse(raw)
        .ok_or_else(|| TransportError::Parse {
            id,
            reason: "unparseable headers".into(),
        })?;

    Ok(MessageHeader {
        id,
        subject: parsed.subject().unwrap_or_default().to_string(),
        sent_date: parsed.date().and_then(sent_date),
        flagged_deleted,
    })
}

/// Extract the attachment parts of a full message.
///
/// Only parts whose Content-Disposition is `attachment` count; body text
/// and inline parts are ignored.
pub fn parse_content(id: MessageId, raw: &[u8]) -> Result<MessageContent, TransportError> {
    let parsed = MessageParser::default()
        .parse(raw)
        .ok_or_else(|| TransportError::Parse {
            id,
            reason: "unparseable message".into(),
        })?;

    let attachments = parsed
        .attachments()
        .filter(|part| {
            MimeHeaders::content_disposition(*part)
                .is_some_and(|d| d.ctype().eq_ignore_ascii_case("attachment"))
        })
        .map(|part| Attachment {
            filename: MimeHeaders::attachment_name(part).map(str::to_string),
            data: part.contents().to_vec(),
        })
        .collect();

    Ok(MessageContent { attachments })
}

/// Calendar date of a parsed `Date:` header in the sender's own offset.
fn sent_date(date: &mail_parser::DateTime) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(
        i32::from(date.year),
        u32::from(date.month),
        u32::from(date.day),
    )
}
