//! Trade Journal - persistence and import core
//!
//! Local storage engine for a trading-journal application:
//! - Embedded SQLite store for trades and daily psychology logs
//! - Additive, idempotent schema migration for existing journal files
//! - Broker-terminal import with idempotent merge keyed on the ticket id
//!
//! The UI shell is a separate collaborator; the public functions here are
//! the whole application-facing surface.
//!
//! # Example
//!
//! ```no_run
//! use trade_journal::{import_file, Database, TradeInput};
//!
//! // Open the journal
//! let mut db = Database::open("data/journal.sqlite").unwrap();
//! db.init_schema().unwrap();
//!
//! // Log a trade by hand
//! let trade = db.add_trade(&TradeInput {
//!     symbol: "BTC/USD".to_string(),
//!     trade_type: "Buy".to_string(),
//!     volume: 0.05,
//!     pnl: 25.0,
//!     entry_date: "2025-01-01T10:00:00Z".to_string(),
//!     exit_date: "2025-01-01T11:00:00Z".to_string(),
//!     ..Default::default()
//! }).unwrap();
//! println!("saved trade {}", trade.id);
//!
//! // Merge a broker-terminal export, then shut down
//! let all = import_file(&mut db, "history.sqlite").unwrap();
//! println!("{} trades in the journal", all.len());
//! db.close().unwrap();
//! ```

pub mod db;
pub mod error;
pub mod import;
pub mod models;

// Re-exports for convenience
pub use db::{default_db_path, Database};
pub use error::{JournalError, Result};
pub use import::{import_file, read_foreign_trades, IMPORTED_STRATEGY};
pub use models::{Checklist, DailyLog, ForeignTrade, Trade, TradeField, TradeInput};
