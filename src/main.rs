//! scopus-roster - lab author roster backed by the Scopus API
//!
//! Maintains a CSV table of authors with their bibliometric numbers
//! (documents, citations, h-index, co-author diversity) plus hand-curated
//! fields (position, groups, PhD year, comment).
//!
//! ## Usage
//!
//! ```bash
//! scopus-roster add              # interactive: fetch + curated fields
//! scopus-roster update           # refresh one author, curated fields kept
//! scopus-roster update-all --deep
//! scopus-roster view --sort cites
//! ```

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, Color, Table};
use scopus_roster::roster::{
    upsert, AuthorRecord, AuthorSnapshot, AuthorTable, CuratedFields, UpsertMode, COLUMNS,
    PHD_YEAR_UNKNOWN,
};
use scopus_roster::scopus::{AuthorCandidate, ScopusClient};
use scopus_roster::store::{CsvStore, RecordStore};
use scopus_roster::RosterError;
use tracing::Level;
use tracing_subscriber::{fmt, EnvFilter};

// ============================================================================
// CLI Definition
// ============================================================================

/// Scopus author roster - bibliometrics for a lab author list
#[derive(Parser)]
#[command(name = "scopus-roster")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Table file
    #[arg(long, global = true, default_value = "./authors.csv")]
    file: PathBuf,

    /// Scopus API key (https://dev.elsevier.com/)
    #[arg(long, global = true, env = "SCOPUS_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Reuse cached author snapshots younger than this many days (0 disables)
    #[arg(long, global = true, default_value = "10")]
    cache_days: u32,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Look up an author by id, or search candidates by name
    Search,

    /// Add a new author, or overwrite an existing one (curated fields included)
    Add {
        /// Also recompute co-author country/affiliation counts (slow)
        #[arg(short = 'c', long)]
        deep: bool,
    },

    /// Refresh Scopus data for one author; curated fields are kept
    Update {
        /// Also recompute co-author country/affiliation counts (slow)
        #[arg(short = 'c', long)]
        deep: bool,
    },

    /// Refresh Scopus data for every stored author
    UpdateAll {
        /// Also recompute co-author country/affiliation counts (slow)
        #[arg(short = 'c', long)]
        deep: bool,

        /// First index into the stored id list
        #[arg(long, default_value = "0")]
        start: usize,

        /// Last index into the stored id list (0 = through the end)
        #[arg(long, default_value = "0")]
        end: usize,
    },

    /// Print the table, sorted descending by a column
    View {
        /// Column to sort by
        #[arg(short, long, default_value = "h_index")]
        sort: String,
    },

    /// Remove an author from the table
    Remove,
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug { Level::DEBUG } else { Level::INFO };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .init();

    let Cli {
        file,
        api_key,
        cache_days,
        command,
        ..
    } = cli;
    let store = CsvStore::new(file);
    let client = || -> Result<ScopusClient> {
        Ok(ScopusClient::new(
            api_key.clone().unwrap_or_default(),
            cache_days,
        )?)
    };

    match command {
        Commands::Search => run_search(&client()?).await,
        Commands::Add { deep } => run_add(&client()?, &store, deep).await,
        Commands::Update { deep } => run_update(&client()?, &store, deep).await,
        Commands::UpdateAll { deep, start, end } => {
            run_update_all(&client()?, &store, deep, start, end).await
        }
        Commands::View { sort } => run_view(&store, &sort),
        Commands::Remove => run_remove(&store),
    }
}

// ============================================================================
// Modes
// ============================================================================

async fn run_search(client: &ScopusClient) -> Result<()> {
    bar();
    let input = prompt("Enter Author ID if known (otherwise just press Enter): ")?;

    if input.is_empty() {
        let first_name = prompt("Enter first name: ")?;
        let last_name = prompt("Enter last name: ")?;
        let candidates = client.search_authors(&last_name, &first_name).await?;
        if candidates.is_empty() {
            println!("No matching authors found.");
        } else {
            print_candidates(&candidates);
        }
    } else {
        let author_id = parse_author_id(&input)?;
        let snapshot = client.fetch_author(author_id).await?;
        bar();
        print_snapshot(&snapshot);
    }

    Ok(())
}

async fn run_add(client: &ScopusClient, store: &CsvStore, deep: bool) -> Result<()> {
    let author_id = parse_author_id(&prompt("Enter Author ID: ")?)?;
    let snapshot = client.fetch_author(author_id).await?;

    bar();
    print_snapshot(&snapshot);

    let curated = prompt_curated()?;

    let existed = store.exists();
    let mut table = if existed { store.load()? } else { AuthorTable::new() };
    let known = table.get(author_id).is_some();

    let record = upsert(
        UpsertMode::Add,
        &snapshot,
        curated,
        deep,
        &mut table,
        client,
        Local::now().date_naive(),
    )
    .await?;
    store.save(&table)?;

    let message = if !existed {
        "Table is created as follows:"
    } else if known {
        "The author information is overwritten as follows:"
    } else {
        "The author is added as follows:"
    };
    println!("{message}");
    print_records(&[record]);
    Ok(())
}

async fn run_update(client: &ScopusClient, store: &CsvStore, deep: bool) -> Result<()> {
    let author_id = parse_author_id(&prompt("Enter Author ID: ")?)?;
    let mut table = store.load()?;

    let snapshot = client.fetch_author(author_id).await?;
    bar();
    print_snapshot_brief(&snapshot);

    let record = upsert(
        UpsertMode::Update,
        &snapshot,
        CuratedFields::default(),
        deep,
        &mut table,
        client,
        Local::now().date_naive(),
    )
    .await?;
    store.save(&table)?;

    println!("The author information is updated as follows:");
    print_records(&[record]);
    Ok(())
}

async fn run_update_all(
    client: &ScopusClient,
    store: &CsvStore,
    deep: bool,
    start: usize,
    end: usize,
) -> Result<()> {
    let table = store.load()?;
    let ids = slice_ids(&table.author_ids(), start, end);
    println!("Updating {} authors...", ids.len());

    for author_id in ids {
        // reload so each author's save sees the previous one's row
        let mut table = store.load()?;
        let snapshot = client.fetch_author(author_id).await?;
        bar();
        print_snapshot_brief(&snapshot);

        upsert(
            UpsertMode::Update,
            &snapshot,
            CuratedFields::default(),
            deep,
            &mut table,
            client,
            Local::now().date_naive(),
        )
        .await?;
        store.save(&table)?;
    }

    println!("Update complete.");
    Ok(())
}

fn run_view(store: &CsvStore, sort: &str) -> Result<()> {
    let mut table = store.load()?;
    table.sort_desc(sort)?;
    print_records(table.records());
    Ok(())
}

fn run_remove(store: &CsvStore) -> Result<()> {
    let author_id = parse_author_id(&prompt("Enter Author ID: ")?)?;
    let mut table = store.load()?;
    let removed = table.remove(author_id)?;
    store.save(&table)?;

    println!("Following author is removed from the table:");
    print_records(&[removed]);
    Ok(())
}

/// Select the stored id range for update-all. `end` 0 means through the end;
/// otherwise the range is inclusive of `end`, clamped to the list.
fn slice_ids(ids: &[u64], start: usize, end: usize) -> Vec<u64> {
    let start = start.min(ids.len());
    let stop = if end == 0 { ids.len() } else { (end + 1).min(ids.len()) };
    ids[start..stop.max(start)].to_vec()
}

// ============================================================================
// Interactive Prompts
// ============================================================================

fn prompt(message: &str) -> Result<String> {
    print!("{message}");
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

fn parse_author_id(input: &str) -> Result<u64> {
    input
        .parse()
        .map_err(|_| RosterError::Validation(format!("author id '{input}' is not an integer")))
        .context("Invalid author id")
}

/// Collect the human-curated fields for an `add` operation.
fn prompt_curated() -> Result<CuratedFields> {
    bar();
    let phd_input = prompt("Enter the year of award of PhD (optional): ")?;
    let phd_year = if phd_input.is_empty() {
        PHD_YEAR_UNKNOWN
    } else {
        phd_input.parse().map_err(|_| {
            RosterError::Validation(format!("PhD year '{phd_input}' is not an integer"))
        })?
    };

    bar();
    let position_input = prompt(&format!(
        "Enter ID for author's position. For special-appointment, add '-sp'. Eg. 0-sp\n\
         \x20 0: {}\n\x20 1: {}\n\x20 2: {}\n\x20 3: {}\nPosition ID: ",
        position_name(0, false),
        position_name(1, false),
        position_name(2, false),
        position_name(3, false),
    ))?;
    let position = parse_position(&position_input)?;

    bar();
    let group = prompt_group("Enter ID for author's 1st departmental group")?;
    bar();
    let group2 = prompt_group("Enter ID for author's 2nd departmental group")?;

    bar();
    let comment = prompt("Enter additional comment (optional): ")?;

    Ok(CuratedFields {
        position,
        group,
        group2,
        phd_year,
        comment,
    })
}

fn prompt_group(message: &str) -> Result<String> {
    let input = prompt(&format!(
        "{message}\n\x20 0: {}\n\x20 1: {}\n\x20 2: {}\n\x20 3: {}\n\x20 4: {}\nGroup ID: ",
        group_name(0),
        group_name(1),
        group_name(2),
        group_name(3),
        group_name(4),
    ))?;
    if input.is_empty() {
        return Ok(String::new());
    }
    let group_id: u32 = input
        .parse()
        .map_err(|_| RosterError::Validation(format!("group id '{input}' is not an integer")))?;
    Ok(group_name(group_id).to_string())
}

/// Parse a position prompt answer like "1" or "0-sp". Empty defaults to
/// position 0 without the special-appointment suffix.
fn parse_position(input: &str) -> Result<String> {
    if input.is_empty() {
        return Ok(position_name(0, false));
    }
    let mut parts = input.splitn(2, '-');
    let id_part = parts.next().unwrap_or_default();
    let is_special = matches!(parts.next(), Some("sp"));
    let position_id: u32 = id_part.parse().map_err(|_| {
        RosterError::Validation(format!("position id '{id_part}' is not an integer"))
    })?;
    Ok(position_name(position_id, is_special))
}

fn position_name(position_id: u32, is_special: bool) -> String {
    let base = match position_id {
        0 => "Professor",
        1 => "Assoc-Prof",
        2 => "Lecturer",
        3 => "Assist-Prof",
        _ => "Other",
    };
    if is_special {
        format!("{base} (sp)")
    } else {
        base.to_string()
    }
}

fn group_name(group_id: u32) -> &'static str {
    match group_id {
        0 => "Thermo-Fluids",
        1 => "Material/Process",
        2 => "Mech-Systems",
        3 => "Mech-Frontier",
        4 => "Intelligence-Sys",
        _ => "Other",
    }
}

// ============================================================================
// Display
// ============================================================================

fn bar() {
    println!("------------------------------------------------------");
}

fn print_snapshot(snapshot: &AuthorSnapshot) {
    println!(
        "{:>15} {} {}",
        "Name: ", snapshot.given_name, snapshot.surname
    );
    let range = snapshot
        .publication_range
        .map(|(start, end)| format!("{start}-{end}"))
        .unwrap_or_else(|| "unknown".to_string());
    println!("{:>15} {}", "Year range: ", range);
    println!("{:>15} {}", "#Documents: ", snapshot.document_count);
    println!("{:>15} {}", "#Citations: ", snapshot.citation_count);
    println!("{:>15} {}", "h-Index: ", snapshot.h_index);
    println!("{:>15} {}", "#Co-authors: ", snapshot.coauthor_count);
}

fn print_snapshot_brief(snapshot: &AuthorSnapshot) {
    println!(
        "{:>15} {} {}",
        "Name: ", snapshot.given_name, snapshot.surname
    );
    println!("{:>15} {}", "#Documents: ", snapshot.document_count);
    println!("{:>15} {}", "#Citations: ", snapshot.citation_count);
    println!("{:>15} {}", "h-Index: ", snapshot.h_index);
}

fn print_candidates(candidates: &[AuthorCandidate]) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Author ID").fg(Color::Cyan),
            Cell::new("Name").fg(Color::Cyan),
            Cell::new("Affiliation").fg(Color::Cyan),
            Cell::new("City").fg(Color::Cyan),
            Cell::new("Country").fg(Color::Cyan),
            Cell::new("#Docs").fg(Color::Cyan),
        ]);

    for c in candidates {
        table.add_row(vec![
            c.author_id.to_string(),
            format!("{} {}", c.given_name, c.surname),
            c.affiliation.clone(),
            c.city.clone(),
            c.country.clone(),
            c.documents.to_string(),
        ]);
    }

    println!("{table}");
}

fn print_records(records: &[AuthorRecord]) {
    let mut table = Table::new();
    let mut header = vec![Cell::new("idx").fg(Color::Cyan)];
    header.extend(COLUMNS.iter().map(|c| Cell::new(*c).fg(Color::Cyan)));
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(header);

    for (idx, r) in records.iter().enumerate() {
        table.add_row(vec![
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
        ]);
    }

    println!("{table}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_ids() {
        let ids = vec![10u64, 20, 30, 40];
        assert_eq!(slice_ids(&ids, 0, 0), vec![10, 20, 30, 40]);
        assert_eq!(slice_ids(&ids, 1, 2), vec![20, 30]);
        assert_eq!(slice_ids(&ids, 2, 0), vec![30, 40]);
        assert_eq!(slice_ids(&ids, 0, 99), vec![10, 20, 30, 40]);
        assert!(slice_ids(&ids, 9, 0).is_empty());
    }

    #[test]
    fn test_parse_position() {
        assert_eq!(parse_position("").unwrap(), "Professor");
        assert_eq!(parse_position("1").unwrap(), "Assoc-Prof");
        assert_eq!(parse_position("0-sp").unwrap(), "Professor (sp)");
        assert_eq!(parse_position("7").unwrap(), "Other");
        assert!(parse_position("x-sp").is_err());
    }

    #[test]
    fn test_catalogs() {
        assert_eq!(group_name(0), "Thermo-Fluids");
        assert_eq!(group_name(4), "Intelligence-Sys");
        assert_eq!(group_name(9), "Other");
        assert_eq!(position_name(3, false), "Assist-Prof");
        assert_eq!(position_name(2, true), "Lecturer (sp)");
    }

    #[test]
    fn test_parse_author_id_prompt() {
        assert_eq!(parse_author_id("7005289117").unwrap(), 7005289117);
        assert!(parse_author_id("seven").is_err());
    }
}
