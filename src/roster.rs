//! Author roster table and the record upsert engine.
//!
//! This module owns the merge semantics of the tool: given a fresh
//! [`AuthorSnapshot`] and the current [`AuthorTable`], [`upsert`] recomputes
//! the derived metrics and inserts or replaces the row keyed by author id.
//! Curated fields (position, groups, PhD year, comment) are only written on
//! `Add`; an `Update` re-reads them from the stored row. The module performs
//! no I/O itself: the snapshot, the table, today's date, and the co-author
//! listing collaborator are all injected.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, RosterError};
use crate::retry;

/// Sentinel for a PhD year the operator did not provide.
pub const PHD_YEAR_UNKNOWN: i32 = -1;

/// Point-in-time author attributes fetched from Scopus.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthorSnapshot {
    pub author_id: u64,
    pub given_name: String,
    pub surname: String,
    pub document_count: u32,
    pub citation_count: u64,
    pub h_index: u32,
    pub coauthor_count: u32,
    /// First and last publication year, when Scopus reports them.
    pub publication_range: Option<(i32, i32)>,
}

/// Fields only a human operator sets. Written on `Add`, preserved on `Update`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CuratedFields {
    pub position: String,
    pub group: String,
    pub group2: String,
    pub phd_year: i32,
    pub comment: String,
}

impl Default for CuratedFields {
    fn default() -> Self {
        Self {
            position: String::new(),
            group: String::new(),
            group2: String::new(),
            phd_year: PHD_YEAR_UNKNOWN,
            comment: String::new(),
        }
    }
}

/// One co-author entry from the listing collaborator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Coauthor {
    pub country: String,
    pub affiliation: String,
}

/// Collaborator that lists an author's co-authors.
///
/// Only consulted under the deep-refresh flag; implemented by the Scopus
/// client in production and by fixtures in tests.
#[async_trait]
pub trait CoauthorSource: Send + Sync {
    async fn coauthors(&self, author_id: u64) -> Result<Vec<Coauthor>>;
}

/// State of an expensive co-author diversity metric.
///
/// `Unset` (CSV code -1) means the metric was never computed for this row;
/// `Unavailable` (-2) means a deep refresh was attempted and all fetch
/// attempts failed. Zero is a valid count and must stay distinguishable
/// from both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoauthorStat {
    Known(u32),
    Unset,
    Unavailable,
}

impl CoauthorStat {
    /// Integer code used in the persisted table.
    pub const fn as_code(self) -> i64 {
        match self {
            Self::Known(n) => n as i64,
            Self::Unset => -1,
            Self::Unavailable => -2,
        }
    }

    /// Inverse of [`as_code`](Self::as_code).
    pub fn from_code(code: i64) -> Result<Self> {
        match code {
            -1 => Ok(Self::Unset),
            -2 => Ok(Self::Unavailable),
            n if n >= 0 => u32::try_from(n)
                .map(Self::Known)
                .map_err(|_| RosterError::Validation(format!("co-author count {n} out of range"))),
            n => Err(RosterError::Validation(format!(
                "invalid co-author metric code {n}"
            ))),
        }
    }
}

/// One row of the persisted table, keyed by `author_id`.
///
/// Field order matches the persisted column order.
#[derive(Debug, Clone)]
pub struct AuthorRecord {
    pub given_name: String,
    pub surname: String,
    pub position: String,
    pub group: String,
    pub group2: String,
    pub phd_year: i32,
    pub h_index: u32,
    pub docs: u32,
    pub cites: u64,
    pub docs_per_year: f64,
    pub cites_per_doc: f64,
    pub coauthors: u32,
    pub coa_countries: CoauthorStat,
    pub coa_affiliations: CoauthorStat,
    pub author_id: u64,
    pub updated: NaiveDate,
    pub comment: String,
}

/// Sortable column keys, in persisted order.
pub const COLUMNS: &[&str] = &[
    "given_name",
    "surname",
    "position",
    "group",
    "group2",
    "phd_year",
    "h_index",
    "docs",
    "cites",
    "docs_per_year",
    "cites_per_doc",
    "coauthors",
    "coa_countries",
    "coa_affiliations",
    "author_id",
    "updated",
    "comment",
];

impl AuthorRecord {
    /// Extract the human-curated fields of this row.
    pub fn curated(&self) -> CuratedFields {
        CuratedFields {
            position: self.position.clone(),
            group: self.group.clone(),
            group2: self.group2.clone(),
            phd_year: self.phd_year,
            comment: self.comment.clone(),
        }
    }

    /// Check the residual integer-field invariants the type system cannot.
    ///
    /// Coercion failures (non-numeric PhD year strings, fractional counts)
    /// are rejected earlier, at prompt parsing and CSV decoding; this checks
    /// the value ranges that remain representable.
    pub fn validate(&self) -> Result<()> {
        if self.author_id == 0 {
            return Err(RosterError::Validation(
                "author_id must be a positive integer".to_string(),
            ));
        }
        if self.phd_year < PHD_YEAR_UNKNOWN || self.phd_year > 9999 {
            return Err(RosterError::Validation(format!(
                "PhD year {} is neither a calendar year nor the unknown sentinel",
                self.phd_year
            )));
        }
        Ok(())
    }
}

/// Documents per active year since the PhD award.
///
/// NaN when the PhD year is unknown/negative or not strictly before
/// `current_year`; never a division by zero.
pub fn docs_per_year(document_count: u32, phd_year: i32, current_year: i32) -> f64 {
    if phd_year < 0 || current_year <= phd_year {
        return f64::NAN;
    }
    round3(f64::from(document_count) / f64::from(current_year - phd_year))
}

/// Citations per document. NaN when the author has no documents.
pub fn cites_per_doc(citation_count: u64, document_count: u32) -> f64 {
    if document_count == 0 {
        return f64::NAN;
    }
    round3(citation_count as f64 / f64::from(document_count))
}

fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}

/// Count distinct co-author countries and affiliation names.
///
/// Entries with an empty string share one "unknown" bucket, matching how the
/// original roster counted missing values as a single key.
pub fn diversity_counts(coauthors: &[Coauthor]) -> (u32, u32) {
    let countries: HashSet<&str> = coauthors.iter().map(|c| c.country.as_str()).collect();
    let affiliations: HashSet<&str> = coauthors.iter().map(|c| c.affiliation.as_str()).collect();
    (countries.len() as u32, affiliations.len() as u32)
}

/// Whether an upsert writes or preserves the curated fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertMode {
    /// Create a row or fully overwrite one, curated fields included.
    Add,
    /// Refresh derived fields of a known row; curated fields untouched.
    Update,
}

/// The full in-memory table, ordered as persisted.
#[derive(Debug, Clone, Default)]
pub struct AuthorTable {
    records: Vec<AuthorRecord>,
}

impl AuthorTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<AuthorRecord>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[AuthorRecord] {
        &self.records
    }

    pub fn get(&self, author_id: u64) -> Option<&AuthorRecord> {
        self.records.iter().find(|r| r.author_id == author_id)
    }

    /// Stored author ids, in row order.
    pub fn author_ids(&self) -> Vec<u64> {
        self.records.iter().map(|r| r.author_id).collect()
    }

    /// Replace the row with the same author id in place, or append.
    /// Returns true when an existing row was replaced.
    pub fn put(&mut self, record: AuthorRecord) -> bool {
        match self.records.iter_mut().find(|r| r.author_id == record.author_id) {
            Some(slot) => {
                *slot = record;
                true
            }
            None => {
                self.records.push(record);
                false
            }
        }
    }

    /// Remove the row for `author_id`, returning it.
    /// An unknown id is a reported error and leaves the table unchanged.
    pub fn remove(&mut self, author_id: u64) -> Result<AuthorRecord> {
        let idx = self
            .records
            .iter()
            .position(|r| r.author_id == author_id)
            .ok_or(RosterError::MissingAuthor(author_id))?;
        Ok(self.records.remove(idx))
    }

    /// Sort rows descending by the named column.
    pub fn sort_desc(&mut self, column: &str) -> Result<()> {
        match column {
            "given_name" => self.records.sort_by(|a, b| b.given_name.cmp(&a.given_name)),
            "surname" => self.records.sort_by(|a, b| b.surname.cmp(&a.surname)),
            "position" => self.records.sort_by(|a, b| b.position.cmp(&a.position)),
            "group" => self.records.sort_by(|a, b| b.group.cmp(&a.group)),
            "group2" => self.records.sort_by(|a, b| b.group2.cmp(&a.group2)),
            "phd_year" => self.records.sort_by_key(|r| std::cmp::Reverse(r.phd_year)),
            "h_index" => self.records.sort_by_key(|r| std::cmp::Reverse(r.h_index)),
            "docs" => self.records.sort_by_key(|r| std::cmp::Reverse(r.docs)),
            "cites" => self.records.sort_by_key(|r| std::cmp::Reverse(r.cites)),
            "docs_per_year" => self
                .records
                .sort_by(|a, b| b.docs_per_year.total_cmp(&a.docs_per_year)),
            "cites_per_doc" => self
                .records
                .sort_by(|a, b| b.cites_per_doc.total_cmp(&a.cites_per_doc)),
            "coauthors" => self.records.sort_by_key(|r| std::cmp::Reverse(r.coauthors)),
            "coa_countries" => self
                .records
                .sort_by_key(|r| std::cmp::Reverse(r.coa_countries.as_code())),
            "coa_affiliations" => self
                .records
                .sort_by_key(|r| std::cmp::Reverse(r.coa_affiliations.as_code())),
            "author_id" => self.records.sort_by_key(|r| std::cmp::Reverse(r.author_id)),
            "updated" => self.records.sort_by_key(|r| std::cmp::Reverse(r.updated)),
            "comment" => self.records.sort_by(|a, b| b.comment.cmp(&a.comment)),
            other => {
                return Err(RosterError::Validation(format!(
                    "unknown column '{}', expected one of: {}",
                    other,
                    COLUMNS.join(", ")
                )))
            }
        }
        Ok(())
    }
}

/// Insert or replace the row for `snapshot.author_id`.
///
/// `Update` requires an existing row (curated fields are sourced from it);
/// `Add` writes `curated_input` and overwrites any existing row wholesale.
/// Expensive co-author metrics are carried forward unless `deep_refresh` is
/// set, in which case they are recomputed via `coauthor_source` behind the
/// shared retry cap; exhausted retries record [`CoauthorStat::Unavailable`].
///
/// Returns the effective record for display. The table is untouched on error.
pub async fn upsert(
    mode: UpsertMode,
    snapshot: &AuthorSnapshot,
    curated_input: CuratedFields,
    deep_refresh: bool,
    table: &mut AuthorTable,
    coauthor_source: &dyn CoauthorSource,
    today: NaiveDate,
) -> Result<AuthorRecord> {
    let existing = table.get(snapshot.author_id).cloned();

    let curated = match mode {
        UpsertMode::Update => existing
            .as_ref()
            .map(AuthorRecord::curated)
            .ok_or(RosterError::MissingAuthor(snapshot.author_id))?,
        UpsertMode::Add => curated_input,
    };

    let (coa_countries, coa_affiliations) = if deep_refresh {
        match retry::with_attempts("coauthor-listing", retry::MAX_ATTEMPTS, || {
            coauthor_source.coauthors(snapshot.author_id)
        })
        .await
        {
            Ok(list) => {
                let (countries, affiliations) = diversity_counts(&list);
                debug!(
                    author_id = snapshot.author_id,
                    coauthors = list.len(),
                    countries = countries,
                    affiliations = affiliations,
                    "Deep refresh complete"
                );
                (
                    CoauthorStat::Known(countries),
                    CoauthorStat::Known(affiliations),
                )
            }
            Err(e) => {
                warn!(
                    author_id = snapshot.author_id,
                    error = %e,
                    "Co-author listing unavailable, recording sentinel"
                );
                (CoauthorStat::Unavailable, CoauthorStat::Unavailable)
            }
        }
    } else {
        existing
            .as_ref()
            .map(|r| (r.coa_countries, r.coa_affiliations))
            .unwrap_or((CoauthorStat::Unset, CoauthorStat::Unset))
    };

    let record = AuthorRecord {
        given_name: snapshot.given_name.clone(),
        surname: snapshot.surname.clone(),
        position: curated.position,
        group: curated.group,
        group2: curated.group2,
        phd_year: curated.phd_year,
        h_index: snapshot.h_index,
        docs: snapshot.document_count,
        cites: snapshot.citation_count,
        docs_per_year: docs_per_year(snapshot.document_count, curated.phd_year, today.year()),
        cites_per_doc: cites_per_doc(snapshot.citation_count, snapshot.document_count),
        coauthors: snapshot.coauthor_count,
        coa_countries,
        coa_affiliations,
        author_id: snapshot.author_id,
        updated: today,
        comment: curated.comment,
    };
    record.validate()?;

    let replaced = table.put(record.clone());
    debug!(
        author_id = record.author_id,
        replaced = replaced,
        mode = ?mode,
        "Row written"
    );

    Ok(record)
}
