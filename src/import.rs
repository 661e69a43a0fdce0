//! Broker-terminal import: reads a user-selected, read-only database file in
//! one of two known table shapes and merges its trades into the journal.
//!
//! Shape detection is adapter-based: each adapter knows how to recognize and
//! read one source layout, and adapters are tried in priority order. A third
//! broker format means one more adapter, nothing else changes.

use std::path::Path;

use chrono::{DateTime, SecondsFormat};
use rusqlite::{params, Connection, OpenFlags, Result as SqliteResult, Row};

use crate::db::Database;
use crate::error::{JournalError, Result};
use crate::models::{ForeignTrade, Trade};

/// Strategy label stamped on every imported trade; broker files carry no
/// strategy concept.
pub const IMPORTED_STRATEGY: &str = "Imported";

/// One recognizable source-file layout.
trait SourceAdapter {
    fn name(&self) -> &'static str;
    fn detect(&self, conn: &Connection) -> Result<bool>;
    fn read(&self, conn: &Connection) -> Result<Vec<ForeignTrade>>;
}

/// A `TRADES` table already holding one row per round-trip trade.
struct TradesTableAdapter;

impl SourceAdapter for TradesTableAdapter {
    fn name(&self) -> &'static str {
        "TRADES"
    }

    fn detect(&self, conn: &Connection) -> Result<bool> {
        table_exists(conn, "TRADES")
    }

    fn read(&self, conn: &Connection) -> Result<Vec<ForeignTrade>> {
        let mut stmt = conn.prepare(
            "SELECT TICKET, SYMBOL, TYPE, VOLUME, PROFIT,
                    TIME_IN, TIME_OUT, COMMISSION, SWAP, PRICE_IN, PRICE_OUT
             FROM TRADES",
        )?;

        let trades = stmt
            .query_map([], foreign_trade_from_row)?
            .collect::<SqliteResult<Vec<_>>>()?;

        Ok(trades)
    }
}

/// A `DEALS` table of individual fills. Round-trip trades are reconstructed
/// by pairing each opening deal (ENTRY = 0) with its closing deal (ENTRY = 1)
/// on the shared position id; profit, exit time, exit price and swap come
/// from the closing leg, commission is the sum of both legs.
struct DealsTableAdapter;

impl SourceAdapter for DealsTableAdapter {
    fn name(&self) -> &'static str {
        "DEALS"
    }

    fn detect(&self, conn: &Connection) -> Result<bool> {
        table_exists(conn, "DEALS")
    }

    fn read(&self, conn: &Connection) -> Result<Vec<ForeignTrade>> {
        let mut stmt = conn.prepare(
            "SELECT d1.POSITION_ID AS TICKET, d1.SYMBOL, d1.TYPE, d1.VOLUME, d2.PROFIT,
                    d1.TIME AS TIME_IN, d2.TIME AS TIME_OUT,
                    d1.COMMISSION + d2.COMMISSION AS COMMISSION, d2.SWAP,
                    d1.PRICE AS PRICE_IN, d2.PRICE AS PRICE_OUT
             FROM DEALS d1
             INNER JOIN DEALS d2 ON d1.POSITION_ID = d2.POSITION_ID
             WHERE d1.ENTRY = 0 AND d2.ENTRY = 1",
        )?;

        let trades = stmt
            .query_map([], foreign_trade_from_row)?
            .collect::<SqliteResult<Vec<_>>>()?;

        Ok(trades)
    }
}

/// Read a broker-terminal database and normalize its trades.
///
/// The file is opened strictly read-only and its handle is released on every
/// path. Adapters are tried in priority order; a file matching neither shape
/// is a `Format` error, never a silent empty result. Any row-level read
/// failure aborts the whole read with the underlying database message so a
/// malformed file can be diagnosed.
pub fn read_foreign_trades<P: AsRef<Path>>(path: P) -> Result<Vec<ForeignTrade>> {
    let conn = Connection::open_with_flags(path.as_ref(), OpenFlags::SQLITE_OPEN_READ_ONLY)?;

    let adapters: [&dyn SourceAdapter; 2] = [&TradesTableAdapter, &DealsTableAdapter];
    for adapter in adapters {
        if adapter.detect(&conn)? {
            log::info!(
                "[IMPORT] {} table found in {}",
                adapter.name(),
                path.as_ref().display()
            );
            return adapter.read(&conn);
        }
    }

    Err(JournalError::Format(
        "neither TRADES nor DEALS table found in the source file".to_string(),
    ))
}

/// Read a broker file and reconcile it into the journal in one step,
/// returning the full trade set after the merge. Importing the same file
/// twice produces no observable change the second time.
pub fn import_file<P: AsRef<Path>>(db: &mut Database, path: P) -> Result<Vec<Trade>> {
    let foreign = read_foreign_trades(path)?;
    log::info!("[IMPORT] Merging {} trades into the journal", foreign.len());
    db.bulk_upsert_trades(&foreign)
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        params![table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Normalize one source row (in the shared TICKET..PRICE_OUT column order)
/// into the canonical trade shape: side code 0/1 becomes Buy/Sell, epoch
/// seconds become ISO-8601 instants.
fn foreign_trade_from_row(row: &Row<'_>) -> SqliteResult<ForeignTrade> {
    let side: i64 = row.get(2)?;
    let time_in: i64 = row.get(5)?;
    let time_out: i64 = row.get(6)?;

    Ok(ForeignTrade {
        id: row.get(0)?,
        symbol: row.get(1)?,
        trade_type: if side == 0 { "Buy" } else { "Sell" }.to_string(),
        volume: row.get(3)?,
        pnl: row.get(4)?,
        entry_date: iso_from_epoch(time_in),
        exit_date: iso_from_epoch(time_out),
        commission: row.get::<_, Option<f64>>(7)?.unwrap_or(0.0),
        swap: row.get::<_, Option<f64>>(8)?.unwrap_or(0.0),
        entry_price: row.get(9)?,
        exit_price: row.get(10)?,
        strategy: IMPORTED_STRATEGY.to_string(),
    })
}

fn iso_from_epoch(secs: i64) -> String {
    DateTime::from_timestamp(secs, 0)
        .unwrap_or(DateTime::UNIX_EPOCH)
        .to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    // 2025-01-01T10:00:00Z / 11:00:00Z
    const T_IN: i64 = 1_735_725_600;
    const T_OUT: i64 = 1_735_729_200;

    fn shape_a_fixture(dir: &Path) -> PathBuf {
        let path = dir.join("terminal_a.sqlite");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE TRADES (
                TICKET INTEGER PRIMARY KEY,
                SYMBOL TEXT, TYPE INTEGER, VOLUME REAL, PROFIT REAL,
                TIME_IN INTEGER, TIME_OUT INTEGER,
                COMMISSION REAL, SWAP REAL, PRICE_IN REAL, PRICE_OUT REAL
            );",
        )
        .unwrap();
        conn.execute(
            "INSERT INTO TRADES VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                9001, "EURUSD", 0, 0.5, 25.0, T_IN, T_OUT, -1.0, -0.2, 1.0841, 1.0891
            ],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO TRADES VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                9002, "XAUUSD", 1, 0.1, -14.0, T_IN, T_OUT, -0.8, 0.0, 2355.0, 2362.0
            ],
        )
        .unwrap();
        path
    }

    /// Semantic twin of the shape A fixture, expressed as matched
    /// entry/exit deals. Commissions are split across the two legs.
    fn shape_b_fixture(dir: &Path) -> PathBuf {
        let path = dir.join("terminal_b.sqlite");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE DEALS (
                POSITION_ID INTEGER,
                SYMBOL TEXT, TYPE INTEGER, VOLUME REAL, PROFIT REAL,
                TIME INTEGER, COMMISSION REAL, SWAP REAL, PRICE REAL,
                ENTRY INTEGER
            );",
        )
        .unwrap();
        let deals: [(i64, &str, i64, f64, f64, i64, f64, f64, f64, i64); 4] = [
            (9001, "EURUSD", 0, 0.5, 0.0, T_IN, -0.5, 0.0, 1.0841, 0),
            (9001, "EURUSD", 0, 0.5, 25.0, T_OUT, -0.5, -0.2, 1.0891, 1),
            (9002, "XAUUSD", 1, 0.1, 0.0, T_IN, -0.4, 0.0, 2355.0, 0),
            (9002, "XAUUSD", 1, 0.1, -14.0, T_OUT, -0.4, 0.0, 2362.0, 1),
        ];
        for d in deals {
            conn.execute(
                "INSERT INTO DEALS VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![d.0, d.1, d.2, d.3, d.4, d.5, d.6, d.7, d.8, d.9],
            )
            .unwrap();
        }
        path
    }

    #[test]
    fn epoch_seconds_normalize_to_iso_instants() {
        assert_eq!(iso_from_epoch(T_IN), "2025-01-01T10:00:00Z");
        assert_eq!(iso_from_epoch(0), "1970-01-01T00:00:00Z");
    }

    #[test]
    fn reads_direct_trades_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = shape_a_fixture(dir.path());

        let trades = read_foreign_trades(&path).unwrap();
        assert_eq!(trades.len(), 2);

        let first = &trades[0];
        assert_eq!(first.id, 9001);
        assert_eq!(first.symbol, "EURUSD");
        assert_eq!(first.trade_type, "Buy");
        assert_eq!(first.entry_date, "2025-01-01T10:00:00Z");
        assert_eq!(first.exit_date, "2025-01-01T11:00:00Z");
        assert_eq!(first.strategy, IMPORTED_STRATEGY);

        assert_eq!(trades[1].trade_type, "Sell");
    }

    #[test]
    fn reconstructs_trades_from_deal_pairs() {
        let dir = tempfile::tempdir().unwrap();
        let path = shape_b_fixture(dir.path());

        let trades = read_foreign_trades(&path).unwrap();
        assert_eq!(trades.len(), 2);

        let first = &trades[0];
        assert_eq!(first.id, 9001);
        assert_eq!(first.pnl, 25.0);
        assert_eq!(first.commission, -1.0); // both legs summed
        assert_eq!(first.swap, -0.2); // from the closing leg
        assert_eq!(first.entry_price, 1.0841);
        assert_eq!(first.exit_price, 1.0891);
    }

    #[test]
    fn both_shapes_normalize_identically() {
        let dir = tempfile::tempdir().unwrap();
        let mut from_a = read_foreign_trades(shape_a_fixture(dir.path())).unwrap();
        let mut from_b = read_foreign_trades(shape_b_fixture(dir.path())).unwrap();
        from_a.sort_by_key(|t| t.id);
        from_b.sort_by_key(|t| t.id);

        assert_eq!(from_a, from_b);
    }

    #[test]
    fn unknown_layout_is_a_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("unrelated.sqlite");
        Connection::open(&path)
            .unwrap()
            .execute_batch("CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT);")
            .unwrap();

        let err = read_foreign_trades(&path).unwrap_err();
        assert!(matches!(err, JournalError::Format(_)));
    }

    #[test]
    fn source_file_is_never_mutated() {
        let dir = tempfile::tempdir().unwrap();
        let path = shape_a_fixture(dir.path());
        let before = std::fs::read(&path).unwrap();

        read_foreign_trades(&path).unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    #[test]
    fn import_file_merges_into_journal_idempotently() {
        let dir = tempfile::tempdir().unwrap();
        let path = shape_a_fixture(dir.path());

        let mut db = Database::open_in_memory().unwrap();
        db.init_schema().unwrap();

        let first = import_file(&mut db, &path).unwrap();
        assert_eq!(first.len(), 2);
        let mut ids: Vec<i64> = first.iter().map(|t| t.id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![9001, 9002]);
        assert!(first
            .iter()
            .all(|t| t.strategy.as_deref() == Some(IMPORTED_STRATEGY)));

        let second = import_file(&mut db, &path).unwrap();
        assert_eq!(first, second);
    }
}
