//! Daybreak report domain: classification, aggregation and completeness.

pub mod doc_type;
pub mod message;
pub mod report;

pub use doc_type::DaybreakDocType;
pub use message::{DaybreakDocument, DaybreakMessage};
pub use report::{Completeness, Report, ReportSet, assess};
