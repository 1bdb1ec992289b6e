//! Daybreak document types and subject-line classification.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// One of the documents that make up a daybreak report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DaybreakDocType {
    PageFile,
    SenateLow,
    SenateHigh,
    AssemblyLow,
    AssemblyHigh,
}

/// Compiled subject patterns, checked in order.
static SUBJECT_PATTERNS: LazyLock<Vec<(DaybreakDocType, Regex)>> = LazyLock::new(|| {
    vec![
        (DaybreakDocType::PageFile, Regex::new(r"(?i)\bpage\s+file\b").unwrap()),
        (DaybreakDocType::SenateLow, Regex::new(r"(?i)\bsenate\s+low\b").unwrap()),
        (DaybreakDocType::SenateHigh, Regex::new(r"(?i)\bsenate\s+high\b").unwrap()),
        (DaybreakDocType::AssemblyLow, Regex::new(r"(?i)\bassembly\s+low\b").unwrap()),
        (DaybreakDocType::AssemblyHigh, Regex::new(r"(?i)\bassembly\s+high\b").unwrap()),
    ]
});

impl DaybreakDocType {
    /// Every document type, in filename order.
    pub const ALL: [DaybreakDocType; 5] = [
        Self::PageFile,
        Self::SenateLow,
        Self::SenateHigh,
        Self::AssemblyLow,
        Self::AssemblyHigh,
    ];

    /// Classify a message by its subject line.
    ///
    /// Returns `None` for anything that is not a daybreak document.
    pub fn from_subject(subject: &str) -> Option<Self> {
        SUBJECT_PATTERNS
            .iter()
            .find(|(_, re)| re.is_match(subject))
            .map(|(doc_type, _)| *doc_type)
    }

    /// Local filename suffix appended to the report date prefix.
    pub fn suffix(self) -> &'static str {
        match self {
            Self::PageFile => ".page_file.txt",
            Self::SenateLow => ".senate.low.html",
            Self::SenateHigh => ".senate.high.html",
            Self::AssemblyLow => ".assembly.low.html",
            Self::AssemblyHigh => ".assembly.high.html",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::PageFile => "page_file",
            Self::SenateLow => "senate_low",
            Self::SenateHigh => "senate_high",
            Self::AssemblyLow => "assembly_low",
            Self::AssemblyHigh => "assembly_high",
        }
    }
}

impl fmt::Display for DaybreakDocType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DaybreakDocType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| format!("unknown daybreak document type: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_known_subjects() {
        assert_eq!(
            DaybreakDocType::from_subject("DAYBREAK - Page File"),
            Some(DaybreakDocType::PageFile)
        );
        assert_eq!(
            DaybreakDocType::from_subject("Senate Low Number Bills"),
            Some(DaybreakDocType::SenateLow)
        );
        assert_eq!(
            DaybreakDocType::from_subject("Fwd: senate high"),
            Some(DaybreakDocType::SenateHigh)
        );
        assert_eq!(
            DaybreakDocType::from_subject("Assembly Low Number Bills"),
            Some(DaybreakDocType::AssemblyLow)
        );
        assert_eq!(
            DaybreakDocType::from_subject("ASSEMBLY HIGH NUMBER BILLS"),
            Some(DaybreakDocType::AssemblyHigh)
        );
    }

    #[test]
    fn unrecognized_subjects_are_none() {
        assert_eq!(DaybreakDocType::from_subject("Lunch on Friday?"), None);
        assert_eq!(DaybreakDocType::from_subject(""), None);
        assert_eq!(DaybreakDocType::from_subject("Senate lowdown"), None);
        assert_eq!(DaybreakDocType::from_subject("pagefile"), None);
    }

    #[test]
    fn classification_is_stable() {
        let subject = "Daybreak Assembly High";
        let first = DaybreakDocType::from_subject(subject);
        let second = DaybreakDocType::from_subject(subject);
        assert_eq!(first, second);
    }

    #[test]
    fn suffixes_are_distinct() {
        let mut suffixes: Vec<&str> = DaybreakDocType::ALL.iter().map(|t| t.suffix()).collect();
        suffixes.sort_unstable();
        suffixes.dedup();
        assert_eq!(suffixes.len(), DaybreakDocType::ALL.len());
    }

    #[test]
    fn parse_from_config_names() {
        assert_eq!("page_file".parse(), Ok(DaybreakDocType::PageFile));
        assert_eq!("Senate-Low".parse(), Ok(DaybreakDocType::SenateLow));
        assert_eq!(" assembly high ".parse(), Ok(DaybreakDocType::AssemblyHigh));
        assert!("house_low".parse::<DaybreakDocType>().is_err());
    }

    #[test]
    fn display_matches_config_name() {
        for doc_type in DaybreakDocType::ALL {
            assert_eq!(doc_type.to_string().parse(), Ok(doc_type));
        }
    }
}
