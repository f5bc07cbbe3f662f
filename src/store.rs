//! Persistence for the author table.
//!
//! The table lives behind the [`RecordStore`] trait so the on-disk format can
//! change without touching the upsert logic. The shipped implementation is a
//! single CSV file with a leading row-index column followed by the columns in
//! [`COLUMNS`] order.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use tracing::info;

use crate::error::{Result, RosterError};
use crate::roster::{AuthorRecord, AuthorTable, CoauthorStat, COLUMNS};

/// Load/save seam between the CLI and the upsert engine.
pub trait RecordStore {
    /// Whether a persisted table already exists.
    fn exists(&self) -> bool;

    /// Read the full table. Fails with `TableNotFound` when no file exists;
    /// callers decide whether that is fatal (update/view/remove) or the
    /// start of a fresh table (add).
    fn load(&self) -> Result<AuthorTable>;

    /// Write the full table, replacing any previous contents.
    fn save(&self, table: &AuthorTable) -> Result<()>;
}

/// CSV-file implementation of [`RecordStore`].
pub struct CsvStore {
    path: PathBuf,
}

impl CsvStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordStore for CsvStore {
    fn exists(&self) -> bool {
        self.path.exists()
    }

    fn load(&self) -> Result<AuthorTable> {
        if !self.exists() {
            return Err(RosterError::TableNotFound(self.path.clone()));
        }

        let mut reader = ReaderBuilder::new().has_headers(true).from_path(&self.path)?;
        let mut records = Vec::new();
        for (line, row) in reader.records().enumerate() {
            let row = row?;
            records.push(parse_row(&row, line + 2)?);
        }

        info!(rows = records.len(), path = %self.path.display(), "Loaded table");
        Ok(AuthorTable::from_records(records))
    }

    fn save(&self, table: &AuthorTable) -> Result<()> {
        let mut writer = WriterBuilder::new().has_headers(false).from_path(&self.path)?;

        let mut header: Vec<&str> = vec!["idx"];
        header.extend_from_slice(COLUMNS);
        writer.write_record(&header)?;

        for (idx, record) in table.records().iter().enumerate() {
            write_row(&mut writer, idx, record)?;
        }

        writer.flush()?;
        info!(rows = table.len(), path = %self.path.display(), "Saved table");
        Ok(())
    }
}

fn write_row<W: std::io::Write>(
    writer: &mut csv::Writer<W>,
    idx: usize,
    r: &AuthorRecord,
) -> Result<()> {
    writer.write_record(&[
        idx.to_string(),
        r.given_name.clone(),
        r.surname.clone(),
        r.position.clone(),
        r.group.clone(),
        r.group2.clone(),
        r.phd_year.to_string(),
        r.h_index.to_string(),
        r.docs.to_string(),
        r.cites.to_string(),
        r.docs_per_year.to_string(),
        r.cites_per_doc.to_string(),
        r.coauthors.to_string(),
        r.coa_countries.as_code().to_string(),
        r.coa_affiliations.as_code().to_string(),
        r.author_id.to_string(),
        r.updated.to_string(),
        r.comment.clone(),
    ])?;
    Ok(())
}

fn parse_row(row: &StringRecord, line: usize) -> Result<AuthorRecord> {
    // idx column + the 17 data columns
    if row.len() != COLUMNS.len() + 1 {
        return Err(RosterError::Parse(format!(
            "line {line}: expected {} columns, found {}",
            COLUMNS.len() + 1,
            row.len()
        )));
    }
    let field = |i: usize| row.get(i + 1).unwrap_or("").trim();

    Ok(AuthorRecord {
        given_name: field(0).to_string(),
        surname: field(1).to_string(),
        position: field(2).to_string(),
        group: field(3).to_string(),
        group2: field(4).to_string(),
        phd_year: parse_int(field(5), "phd_year", line)?,
        h_index: parse_int(field(6), "h_index", line)?,
        docs: parse_int(field(7), "docs", line)?,
        cites: parse_int(field(8), "cites", line)?,
        docs_per_year: parse_float(field(9), "docs_per_year", line)?,
        cites_per_doc: parse_float(field(10), "cites_per_doc", line)?,
        coauthors: parse_int(field(11), "coauthors", line)?,
        coa_countries: CoauthorStat::from_code(parse_int(field(12), "coa_countries", line)?)?,
        coa_affiliations: CoauthorStat::from_code(parse_int(
            field(13),
            "coa_affiliations",
            line,
        )?)?,
        author_id: parse_int(field(14), "author_id", line)?,
        updated: parse_date(field(15), "updated", line)?,
        comment: field(16).to_string(),
    })
}

fn parse_int<T: FromStr>(value: &str, column: &str, line: usize) -> Result<T> {
    value.parse().map_err(|_| {
        RosterError::Validation(format!(
            "line {line}: column '{column}' holds non-integer value '{value}'"
        ))
    })
}

fn parse_float(value: &str, column: &str, line: usize) -> Result<f64> {
    if value.is_empty() {
        return Ok(f64::NAN);
    }
    value.parse().map_err(|_| {
        RosterError::Validation(format!(
            "line {line}: column '{column}' holds non-numeric value '{value}'"
        ))
    })
}

fn parse_date(value: &str, column: &str, line: usize) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| {
        RosterError::Validation(format!(
            "line {line}: column '{column}' holds invalid date '{value}'"
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(author_id: u64, h_index: u32) -> AuthorRecord {
        AuthorRecord {
            given_name: "Ada".to_string(),
            surname: "Lovelace".to_string(),
            position: "Professor".to_string(),
            group: "Thermo-Fluids".to_string(),
            group2: String::new(),
            phd_year: 2010,
            h_index,
            docs: 50,
            cites: 500,
            docs_per_year: 3.571,
            cites_per_doc: 10.0,
            coauthors: 40,
            coa_countries: CoauthorStat::Known(8),
            coa_affiliations: CoauthorStat::Unavailable,
            author_id,
            updated: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            comment: "has, comma".to_string(),
        }
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = CsvStore::new(dir.path().join("authors.csv"));

        let mut table = AuthorTable::new();
        table.put(record(12345, 12));
        table.put(record(67890, 30));
        store.save(&table).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.author_ids(), vec![12345, 67890]);

        let first = loaded.get(12345).unwrap();
        assert_eq!(first.surname, "Lovelace");
        assert_eq!(first.phd_year, 2010);
        assert_eq!(first.docs_per_year, 3.571);
        assert_eq!(first.coa_countries, CoauthorStat::Known(8));
        assert_eq!(first.coa_affiliations, CoauthorStat::Unavailable);
        assert_eq!(first.updated, NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
        assert_eq!(first.comment, "has, comma");
    }

    #[test]
    fn nan_ratio_survives_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = CsvStore::new(dir.path().join("authors.csv"));

        let mut rec = record(1, 5);
        rec.docs_per_year = f64::NAN;
        let mut table = AuthorTable::new();
        table.put(rec);
        store.save(&table).unwrap();

        let loaded = store.load().unwrap();
        assert!(loaded.get(1).unwrap().docs_per_year.is_nan());
    }

    #[test]
    fn load_missing_file_is_table_not_found() {
        let dir = TempDir::new().unwrap();
        let store = CsvStore::new(dir.path().join("absent.csv"));
        assert!(!store.exists());
        assert!(matches!(store.load(), Err(RosterError::TableNotFound(_))));
    }

    #[test]
    fn non_integer_column_is_validation_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("authors.csv");
        let header = "idx,given_name,surname,position,group,group2,phd_year,h_index,docs,cites,docs_per_year,cites_per_doc,coauthors,coa_countries,coa_affiliations,author_id,updated,comment";
        let row = "0,Ada,Lovelace,Professor,TF,,2010.5,12,50,500,3.571,10,40,8,20,12345,2024-06-01,";
        std::fs::write(&path, format!("{header}\n{row}\n")).unwrap();

        let store = CsvStore::new(path);
        assert!(matches!(store.load(), Err(RosterError::Validation(_))));
    }
}
