//! # scopus-roster
//!
//! Lab author roster backed by the Scopus API and a CSV table.
//!
//! ## Modules
//!
//! - [`roster`] - Author records, derived metrics, and the upsert engine
//! - [`scopus`] - Scopus API client (search, snapshot fetch, co-author listing)
//! - [`store`] - Pluggable table persistence (CSV implementation)
//! - [`retry`] - Bounded retry for external fetches
//! - [`error`] - Custom error types
//!
//! ## Usage
//!
//! ```rust,no_run
//! use scopus_roster::scopus::ScopusClient;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = ScopusClient::new("api-key".to_string(), 10)?;
//!     let snapshot = client.fetch_author(7005289117).await?;
//!     println!("{} {}: h-index {}", snapshot.given_name, snapshot.surname, snapshot.h_index);
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod retry;
pub mod roster;
pub mod scopus;
pub mod store;

pub use error::{Result, RosterError};
