//! Scopus API client.
//!
//! Wraps the three Elsevier endpoints the roster needs: author search (for
//! human disambiguation), author retrieval (the metric snapshot), and the
//! co-author listing used for the deep-refresh diversity counts.
//!
//! API details:
//! - All requests carry the `X-ELS-APIKey` header (key from https://dev.elsevier.com/)
//! - Numeric fields arrive as JSON strings and are parsed here
//! - Search endpoints page with `start`/`count`, max 200 entries per page
//!
//! Fetched snapshots are cached on disk as JSON with their fetch date; a
//! freshness window in days decides whether a cached entry is reused, so
//! repeated operations on the same author within the window cost nothing.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{OptionExt, Result, RosterError};
use crate::retry;
use crate::roster::{AuthorSnapshot, Coauthor, CoauthorSource};

/// Scopus API base URL
const SCOPUS_API_BASE: &str = "https://api.elsevier.com/content";

/// Maximum entries per search page (Scopus limit)
const PAGE_SIZE: usize = 200;

/// Cap on co-author pages fetched per author (200 entries each)
const MAX_COAUTHOR_PAGES: usize = 40;

/// One candidate from an author search, for operator disambiguation.
#[derive(Debug, Clone, Default)]
pub struct AuthorCandidate {
    pub author_id: u64,
    pub given_name: String,
    pub surname: String,
    pub affiliation: String,
    pub city: String,
    pub country: String,
    pub documents: u64,
}

/// Scopus API client with an on-disk snapshot cache.
pub struct ScopusClient {
    client: reqwest::Client,
    api_key: String,
    cache_dir: Option<PathBuf>,
    cache_days: u32,
}

impl ScopusClient {
    /// Create a client. `cache_days` is the snapshot freshness window;
    /// 0 disables the cache entirely.
    pub fn new(api_key: String, cache_days: u32) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(RosterError::Config(
                "Scopus API key is empty; set SCOPUS_API_KEY or pass --api-key".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("scopus-roster/0.1")
            .build()
            .map_err(|e| RosterError::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            cache_dir: default_cache_dir(),
            cache_days,
        })
    }

    /// Override the cache directory (None disables caching).
    pub fn with_cache_dir(mut self, cache_dir: Option<PathBuf>) -> Self {
        self.cache_dir = cache_dir;
        self
    }

    /// Search authors by surname and first name.
    pub async fn search_authors(
        &self,
        last_name: &str,
        first_name: &str,
    ) -> Result<Vec<AuthorCandidate>> {
        let query = format!("AUTHLAST({last_name}) AND AUTHFIRST({first_name})");
        let url = author_search_url(&query, 0);

        info!(last = last_name, first = first_name, "Searching Scopus authors");
        let response: SearchResponse =
            retry::with_attempts("author-search", retry::MAX_ATTEMPTS, || self.get_json(&url))
                .await?;

        let candidates: Vec<AuthorCandidate> = response
            .results
            .entries()
            .iter()
            .filter_map(parse_candidate)
            .collect();

        info!(found = candidates.len(), "Author search complete");
        Ok(candidates)
    }

    /// Fetch the metric snapshot for one author, via the cache when fresh.
    pub async fn fetch_author(&self, author_id: u64) -> Result<AuthorSnapshot> {
        if let Some(snapshot) = self.cached(author_id) {
            info!(author_id = author_id, "Using cached snapshot");
            return Ok(snapshot);
        }

        let url = format!("{SCOPUS_API_BASE}/author/author_id/{author_id}?view=ENHANCED");
        debug!(url = %url, "Fetching author snapshot");

        let response: RetrievalResponse =
            retry::with_attempts("author-retrieval", retry::MAX_ATTEMPTS, || self.get_json(&url))
                .await?;
        let snapshot = parse_retrieval(author_id, response)?;

        self.cache_write(author_id, &snapshot);
        Ok(snapshot)
    }

    /// Internal JSON GET with API key header and status mapping.
    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self
            .client
            .get(url)
            .header("X-ELS-APIKey", &self.api_key)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RosterError::Api {
                code: i32::from(status.as_u16()),
                message: format!("Scopus API error: {status} - {body}"),
            });
        }

        response
            .json()
            .await
            .map_err(|e| RosterError::Parse(format!("Failed to parse Scopus response: {e}")))
    }

    /// Read a cached snapshot if one exists inside the freshness window.
    ///
    /// Unreadable cache entries count as misses, not errors.
    fn cached(&self, author_id: u64) -> Option<AuthorSnapshot> {
        if self.cache_days == 0 {
            return None;
        }
        let path = self.cache_dir.as_ref()?.join(format!("{author_id}.json"));
        if !path.exists() {
            return None;
        }

        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read cache entry");
                return None;
            }
        };
        let entry: CachedSnapshot = match serde_json::from_str(&content) {
            Ok(e) => e,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to parse cache entry");
                return None;
            }
        };

        let age = (Local::now().date_naive() - entry.fetched).num_days();
        if age >= i64::from(self.cache_days) {
            debug!(author_id = author_id, age_days = age, "Cache entry stale");
            return None;
        }
        Some(entry.snapshot)
    }

    /// Best-effort cache write; failures are logged, never fatal.
    fn cache_write(&self, author_id: u64, snapshot: &AuthorSnapshot) {
        let Some(dir) = self.cache_dir.as_ref() else {
            return;
        };
        if self.cache_days == 0 {
            return;
        }

        let entry = CachedSnapshot {
            fetched: Local::now().date_naive(),
            snapshot: snapshot.clone(),
        };
        if let Err(e) = write_cache_entry(dir, author_id, &entry) {
            warn!(author_id = author_id, error = %e, "Failed to write snapshot cache");
        }
    }
}

fn write_cache_entry(dir: &std::path::Path, author_id: u64, entry: &CachedSnapshot) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    let content = serde_json::to_string_pretty(entry)?;
    std::fs::write(dir.join(format!("{author_id}.json")), content)?;
    Ok(())
}

#[async_trait]
impl CoauthorSource for ScopusClient {
    /// List all co-authors of an author, paging through the search API.
    ///
    /// Not retried here: the upsert engine owns the retry cap for this call.
    async fn coauthors(&self, author_id: u64) -> Result<Vec<Coauthor>> {
        let query = format!("co-author({author_id})");
        let mut all = Vec::new();
        let mut start = 0usize;

        for page in 0..MAX_COAUTHOR_PAGES {
            let url = author_search_url(&query, start);
            debug!(author_id = author_id, page = page, "Fetching co-author page");

            let response: SearchResponse = self.get_json(&url).await?;
            let total = response.results.total();
            let entries = response.results.entries();
            if entries.is_empty() {
                break;
            }

            all.extend(entries.iter().filter_map(|e| {
                e.identifier.as_ref()?;
                let affiliation = e.affiliation.as_ref();
                Some(Coauthor {
                    country: affiliation
                        .and_then(|a| a.country.clone())
                        .unwrap_or_default(),
                    affiliation: affiliation.and_then(|a| a.name.clone()).unwrap_or_default(),
                })
            }));

            start += entries.len();
            if start >= total {
                break;
            }
        }

        info!(author_id = author_id, coauthors = all.len(), "Co-author listing complete");
        Ok(all)
    }
}

/// Default snapshot cache directory: `~/.scopus-roster/cache`
fn default_cache_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|p| p.join(".scopus-roster").join("cache"))
}

/// Build an author search URL for one page.
fn author_search_url(query: &str, start: usize) -> String {
    format!(
        "{SCOPUS_API_BASE}/search/author?query={}&count={PAGE_SIZE}&start={start}",
        urlencoding::encode(query)
    )
}

/// Cached snapshot with its fetch date.
#[derive(Debug, Serialize, Deserialize)]
struct CachedSnapshot {
    fetched: NaiveDate,
    snapshot: AuthorSnapshot,
}

// === Scopus API response types ===

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(rename = "search-results")]
    results: SearchResults,
}

#[derive(Debug, Deserialize)]
struct SearchResults {
    #[serde(rename = "opensearch:totalResults")]
    total_results: Option<String>,
    #[serde(default)]
    entry: Option<Vec<SearchEntry>>,
}

impl SearchResults {
    fn entries(&self) -> &[SearchEntry] {
        self.entry.as_deref().unwrap_or_default()
    }

    fn total(&self) -> usize {
        self.total_results
            .as_deref()
            .and_then(|t| t.parse().ok())
            .unwrap_or(0)
    }
}

#[derive(Debug, Deserialize)]
struct SearchEntry {
    #[serde(rename = "dc:identifier")]
    identifier: Option<String>,
    #[serde(rename = "preferred-name")]
    preferred_name: Option<PreferredName>,
    #[serde(rename = "affiliation-current")]
    affiliation: Option<AffiliationCurrent>,
    #[serde(rename = "document-count")]
    document_count: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PreferredName {
    #[serde(rename = "given-name")]
    given_name: Option<String>,
    surname: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AffiliationCurrent {
    #[serde(rename = "affiliation-name")]
    name: Option<String>,
    #[serde(rename = "affiliation-city")]
    city: Option<String>,
    #[serde(rename = "affiliation-country")]
    country: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RetrievalResponse {
    #[serde(rename = "author-retrieval-response")]
    responses: Vec<RetrievalEntry>,
}

#[derive(Debug, Deserialize)]
struct RetrievalEntry {
    coredata: Option<Coredata>,
    #[serde(rename = "h-index")]
    h_index: Option<String>,
    #[serde(rename = "coauthor-count")]
    coauthor_count: Option<String>,
    #[serde(rename = "author-profile")]
    profile: Option<AuthorProfile>,
}

#[derive(Debug, Deserialize)]
struct Coredata {
    #[serde(rename = "document-count")]
    document_count: Option<String>,
    #[serde(rename = "citation-count")]
    citation_count: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AuthorProfile {
    #[serde(rename = "preferred-name")]
    preferred_name: Option<PreferredName>,
    #[serde(rename = "publication-range")]
    publication_range: Option<PublicationRange>,
}

#[derive(Debug, Deserialize)]
struct PublicationRange {
    #[serde(rename = "@start")]
    start: Option<String>,
    #[serde(rename = "@end")]
    end: Option<String>,
}

/// Map one search entry to a candidate; entries without an identifier
/// (e.g. the "result set was empty" placeholder) are skipped.
fn parse_candidate(entry: &SearchEntry) -> Option<AuthorCandidate> {
    let author_id = parse_author_id(entry.identifier.as_deref()?).ok()?;
    let name = entry.preferred_name.as_ref();
    let affiliation = entry.affiliation.as_ref();

    Some(AuthorCandidate {
        author_id,
        given_name: name.and_then(|n| n.given_name.clone()).unwrap_or_default(),
        surname: name.and_then(|n| n.surname.clone()).unwrap_or_default(),
        affiliation: affiliation.and_then(|a| a.name.clone()).unwrap_or_default(),
        city: affiliation.and_then(|a| a.city.clone()).unwrap_or_default(),
        country: affiliation.and_then(|a| a.country.clone()).unwrap_or_default(),
        documents: entry
            .document_count
            .as_deref()
            .and_then(|c| c.parse().ok())
            .unwrap_or(0),
    })
}

/// Extract the numeric id from a `AUTHOR_ID:nnn` identifier.
fn parse_author_id(identifier: &str) -> Result<u64> {
    let digits = identifier.rsplit(':').next().unwrap_or(identifier);
    digits
        .parse()
        .map_err(|_| RosterError::Parse(format!("invalid author identifier '{identifier}'")))
}

/// Assemble a snapshot from the retrieval response.
fn parse_retrieval(author_id: u64, response: RetrievalResponse) -> Result<AuthorSnapshot> {
    let entry = response
        .responses
        .into_iter()
        .next()
        .ok_or_parse("empty author retrieval response")?;

    let coredata = entry.coredata.ok_or_parse("author retrieval without coredata")?;
    let name = entry
        .profile
        .as_ref()
        .and_then(|p| p.preferred_name.as_ref());

    let publication_range = entry
        .profile
        .as_ref()
        .and_then(|p| p.publication_range.as_ref())
        .and_then(|r| {
            let start = r.start.as_deref()?.parse().ok()?;
            let end = r.end.as_deref()?.parse().ok()?;
            Some((start, end))
        });

    Ok(AuthorSnapshot {
        author_id,
        given_name: name.and_then(|n| n.given_name.clone()).unwrap_or_default(),
        surname: name.and_then(|n| n.surname.clone()).unwrap_or_default(),
        document_count: parse_count(coredata.document_count.as_deref(), "document-count")?,
        citation_count: parse_count(coredata.citation_count.as_deref(), "citation-count")?,
        h_index: parse_count(entry.h_index.as_deref(), "h-index")?,
        coauthor_count: parse_count(entry.coauthor_count.as_deref(), "coauthor-count")?,
        publication_range,
    })
}

/// Parse a Scopus numeric-string field. Absent fields default to zero;
/// present but non-numeric values are parse errors.
fn parse_count<T: FromStr + Default>(value: Option<&str>, field: &str) -> Result<T> {
    match value {
        None => Ok(T::default()),
        Some(s) => s.trim().parse().map_err(|_| {
            RosterError::Parse(format!("field '{field}' holds non-numeric value '{s}'"))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_author_id() {
        assert_eq!(parse_author_id("AUTHOR_ID:7005289117").unwrap(), 7005289117);
        assert_eq!(parse_author_id("7005289117").unwrap(), 7005289117);
        assert!(parse_author_id("AUTHOR_ID:abc").is_err());
    }

    #[test]
    fn test_author_search_url() {
        let url = author_search_url("AUTHLAST(Doe) AND AUTHFIRST(Jane)", 200);
        assert!(url.contains("/search/author?query=AUTHLAST%28Doe%29"));
        assert!(url.contains("count=200"));
        assert!(url.contains("start=200"));
    }

    #[test]
    fn test_parse_retrieval_response() {
        let json = r#"{
            "author-retrieval-response": [{
                "coredata": {
                    "document-count": "50",
                    "citation-count": "500"
                },
                "h-index": "12",
                "coauthor-count": "40",
                "author-profile": {
                    "preferred-name": {"given-name": "Ada", "surname": "Lovelace"},
                    "publication-range": {"@start": "1996", "@end": "2024"}
                }
            }]
        }"#;
        let response: RetrievalResponse = serde_json::from_str(json).unwrap();
        let snapshot = parse_retrieval(12345, response).unwrap();

        assert_eq!(snapshot.author_id, 12345);
        assert_eq!(snapshot.given_name, "Ada");
        assert_eq!(snapshot.surname, "Lovelace");
        assert_eq!(snapshot.document_count, 50);
        assert_eq!(snapshot.citation_count, 500);
        assert_eq!(snapshot.h_index, 12);
        assert_eq!(snapshot.coauthor_count, 40);
        assert_eq!(snapshot.publication_range, Some((1996, 2024)));
    }

    #[test]
    fn test_parse_retrieval_non_numeric_field_errors() {
        let json = r#"{
            "author-retrieval-response": [{
                "coredata": {"document-count": "fifty", "citation-count": "500"}
            }]
        }"#;
        let response: RetrievalResponse = serde_json::from_str(json).unwrap();
        assert!(matches!(
            parse_retrieval(1, response),
            Err(RosterError::Parse(_))
        ));
    }

    #[test]
    fn test_parse_search_entries() {
        let json = r#"{
            "search-results": {
                "opensearch:totalResults": "2",
                "entry": [
                    {
                        "dc:identifier": "AUTHOR_ID:111",
                        "preferred-name": {"given-name": "Jane", "surname": "Doe"},
                        "affiliation-current": {
                            "affiliation-name": "Univ A",
                            "affiliation-city": "Kyoto",
                            "affiliation-country": "Japan"
                        },
                        "document-count": "120"
                    },
                    {"error": "Result set was empty"}
                ]
            }
        }"#;
        let response: SearchResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.results.total(), 2);

        let candidates: Vec<AuthorCandidate> = response
            .results
            .entries()
            .iter()
            .filter_map(parse_candidate)
            .collect();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].author_id, 111);
        assert_eq!(candidates[0].surname, "Doe");
        assert_eq!(candidates[0].country, "Japan");
        assert_eq!(candidates[0].documents, 120);
    }

    #[test]
    fn test_snapshot_cache_roundtrip() {
        let dir = tempfile::TempDir::new().unwrap();
        let client = ScopusClient::new("test-key".to_string(), 10)
            .unwrap()
            .with_cache_dir(Some(dir.path().to_path_buf()));

        let snapshot = AuthorSnapshot {
            author_id: 12345,
            given_name: "Ada".to_string(),
            surname: "Lovelace".to_string(),
            document_count: 50,
            citation_count: 500,
            h_index: 12,
            coauthor_count: 40,
            publication_range: Some((1996, 2024)),
        };

        assert!(client.cached(12345).is_none());
        client.cache_write(12345, &snapshot);

        let hit = client.cached(12345).expect("fresh entry should hit");
        assert_eq!(hit.document_count, 50);
        assert_eq!(hit.surname, "Lovelace");
    }

    #[test]
    fn test_cache_disabled_with_zero_days() {
        let dir = tempfile::TempDir::new().unwrap();
        let client = ScopusClient::new("test-key".to_string(), 0)
            .unwrap()
            .with_cache_dir(Some(dir.path().to_path_buf()));

        let snapshot = AuthorSnapshot {
            author_id: 1,
            ..Default::default()
        };
        client.cache_write(1, &snapshot);
        assert!(client.cached(1).is_none());
    }

    #[test]
    fn test_empty_api_key_rejected() {
        assert!(matches!(
            ScopusClient::new("  ".to_string(), 10),
            Err(RosterError::Config(_))
        ));
    }
}
