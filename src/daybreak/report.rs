//! Report aggregation and the completeness policy.
//!
//! Reports live for a single polling pass. Every pass re-reads the whole
//! receiving folder and rebuilds its `ReportSet` from scratch.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::Serialize;
use tracing::warn;

use crate::daybreak::{DaybreakDocType, DaybreakDocument};

/// Whether a report has everything it needs to be archived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Completeness {
    /// Every required type is present.
    Complete,
    /// Something is present, but not every required type.
    Partial,
}

/// Assess a set of present types against the required set.
///
/// Complete when `present` is a superset of `required`: types outside the
/// required set neither add to nor block completeness.
pub fn assess<K: Ord>(present: &BTreeSet<K>, required: &BTreeSet<K>) -> Completeness {
    if !present.is_empty() && required.is_subset(present) {
        Completeness::Complete
    } else {
        Completeness::Partial
    }
}

/// All documents seen for one report date, one per document type.
#[derive(Debug, Clone)]
pub struct Report<D> {
    date: NaiveDate,
    docs: BTreeMap<DaybreakDocType, D>,
}

impl<D: DaybreakDocument> Report<D> {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            docs: BTreeMap::new(),
        }
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    /// Put a document into its type slot, returning whatever it displaced.
    pub fn insert(&mut self, doc: D) -> Option<D> {
        self.docs.insert(doc.doc_type(), doc)
    }

    pub fn get(&self, doc_type: DaybreakDocType) -> Option<&D> {
        self.docs.get(&doc_type)
    }

    /// Documents in document-type order.
    pub fn docs(&self) -> impl Iterator<Item = (DaybreakDocType, &D)> {
        self.docs.iter().map(|(t, d)| (*t, d))
    }

    pub fn doc_types(&self) -> BTreeSet<DaybreakDocType> {
        self.docs.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn completeness(&self, required: &BTreeSet<DaybreakDocType>) -> Completeness {
        assess(&self.doc_types(), required)
    }
}

/// The reports produced by one pass, split by completeness.
#[derive(Debug, Clone)]
pub struct ReportSet<D> {
    complete: BTreeMap<NaiveDate, Report<D>>,
    partial: BTreeMap<NaiveDate, Report<D>>,
}

impl<D: DaybreakDocument> ReportSet<D> {
    /// Group documents by report date and partition the resulting reports.
    ///
    /// A second document with the same date and type replaces the first.
    pub fn ingest<I>(documents: I, required: &BTreeSet<DaybreakDocType>) -> Self
    where
        I: IntoIterator<Item = D>,
    {
        let mut reports: BTreeMap<NaiveDate, Report<D>> = BTreeMap::new();
        for doc in documents {
            let date = doc.report_date();
            let doc_type = doc.doc_type();
            let report = reports.entry(date).or_insert_with(|| Report::new(date));
            if report.insert(doc).is_some() {
                // Ambiguous input; the older message stays in the folder.
                warn!(%date, %doc_type, "Duplicate daybreak document, keeping the latest");
            }
        }

        let mut complete = BTreeMap::new();
        let mut partial = BTreeMap::new();
        for (date, report) in reports {
            match report.completeness(required) {
                Completeness::Complete => {
                    complete.insert(date, report);
                }
                Completeness::Partial => {
                    partial.insert(date, report);
                }
            }
        }

        Self { complete, partial }
    }

    pub fn complete(&self) -> &BTreeMap<NaiveDate, Report<D>> {
        &self.complete
    }

    pub fn partial(&self) -> &BTreeMap<NaiveDate, Report<D>> {
        &self.partial
    }

    pub fn is_empty(&self) -> bool {
        self.complete.is_empty() && self.partial.is_empty()
    }

    pub fn into_parts(self) -> (BTreeMap<NaiveDate, Report<D>>, BTreeMap<NaiveDate, Report<D>>) {
        (self.complete, self.partial)
    }
}
