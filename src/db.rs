//! SQLite persistence layer for the trade journal
//!
//! One `Database` value owns the process-wide connection: the journal store
//! is single-process, single-writer, and every repository call goes through
//! this handle. `close` is explicit and idempotent so the application can
//! shut the store down exactly once without racing a second shutdown path.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row};

use crate::error::{JournalError, Result};
use crate::models::{Checklist, DailyLog, ForeignTrade, Trade, TradeField, TradeInput};

/// Current logical schema. `CREATE TABLE IF NOT EXISTS` covers fresh files;
/// older files are brought current by `run_migrations`.
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS trades (
    id INTEGER PRIMARY KEY,
    symbol TEXT NOT NULL,
    type TEXT NOT NULL,
    volume REAL NOT NULL,
    pnl REAL NOT NULL,
    entryDate TEXT NOT NULL,
    exitDate TEXT NOT NULL,
    strategy TEXT,
    checklist TEXT,
    tags TEXT,
    attachments TEXT,
    chartLinks TEXT,
    commission REAL,
    swap REAL,
    entryPrice REAL,
    exitPrice REAL,
    riskRewardRatio TEXT,
    timeframe TEXT,
    accountType TEXT,
    outcome TEXT
);

CREATE TABLE IF NOT EXISTS daily_log (
    date TEXT PRIMARY KEY,
    pre_market_focus INTEGER,
    pre_market_preparation INTEGER,
    mindfulness_state TEXT,
    adherence_to_rules INTEGER,
    impulsive_trades_count INTEGER,
    hesitation_on_entry INTEGER,
    premature_exit_count INTEGER,
    post_market_review_quality INTEGER,
    emotional_state_after TEXT,
    daily_lesson_learned TEXT
);
"#;

/// Columns added since the first shipped schema. Every entry must be
/// nullable so `ALTER TABLE ADD COLUMN` works on populated tables.
const TRADE_MIGRATIONS: &[(&str, &str)] = &[
    ("strategy", "TEXT"),
    ("checklist", "TEXT"),
    ("tags", "TEXT"),
    ("attachments", "TEXT"),
    ("chartLinks", "TEXT"),
    ("commission", "REAL"),
    ("swap", "REAL"),
    ("entryPrice", "REAL"),
    ("exitPrice", "REAL"),
    ("riskRewardRatio", "TEXT"),
    ("timeframe", "TEXT"),
    ("accountType", "TEXT"),
    ("outcome", "TEXT"),
];

/// Column list shared by every trade SELECT so positional reads stay in sync.
const TRADE_COLUMNS: &str = "id, symbol, type, volume, pnl, entryDate, exitDate, \
     strategy, checklist, tags, attachments, chartLinks, \
     commission, swap, entryPrice, exitPrice, \
     riskRewardRatio, timeframe, accountType, outcome";

/// Resolve the journal database location.
///
/// Uses the `TRADE_JOURNAL_DATA_DIR` environment variable when set, otherwise
/// a `data` directory relative to the working directory.
pub fn default_db_path() -> PathBuf {
    let base = std::env::var("TRADE_JOURNAL_DATA_DIR").unwrap_or_else(|_| "data".to_string());
    Path::new(&base).join("journal.sqlite")
}

/// Journal store: trades and daily psychology logs.
pub struct Database {
    conn: Option<Connection>,
}

impl Database {
    /// Open or create the journal database at the given path, with WAL
    /// journaling for read/write safety within the process.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        // journal_mode returns the resulting mode as a row
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| {
            row.get::<_, String>(0)
        })?;

        Ok(Self { conn: Some(conn) })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn: Some(conn) })
    }

    /// Close the underlying connection. Safe to call more than once; any
    /// repository call after the first close fails with `ConnectionClosed`.
    pub fn close(&mut self) -> Result<()> {
        if let Some(conn) = self.conn.take() {
            conn.close().map_err(|(_, e)| JournalError::from(e))?;
            log::info!("[DB] Database connection closed");
        }
        Ok(())
    }

    fn conn(&self) -> Result<&Connection> {
        self.conn.as_ref().ok_or(JournalError::ConnectionClosed)
    }

    fn conn_mut(&mut self) -> Result<&mut Connection> {
        self.conn.as_mut().ok_or(JournalError::ConnectionClosed)
    }

    /// Initialize or migrate the schema.
    ///
    /// Creates the trades and daily_log tables when absent, then adds any
    /// column the current logical schema has that the physical table lacks.
    /// Idempotent: running against a current database is a no-op, and no
    /// existing row is ever touched.
    pub fn init_schema(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(SCHEMA_SQL)?;
        self.run_migrations()?;
        log::info!("[OK] Journal schema initialized");
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn()?;
        let columns: Vec<String> = conn
            .prepare("PRAGMA table_info(trades)")?
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<SqliteResult<Vec<_>>>()?;

        for (name, col_type) in TRADE_MIGRATIONS {
            if !columns.iter().any(|c| c == name) {
                conn.execute(
                    &format!("ALTER TABLE trades ADD COLUMN {} {}", name, col_type),
                    [],
                )?;
                log::info!("[MIGRATION] Added {} column to trades table", name);
            }
        }

        Ok(())
    }

    // ========================================================================
    // Trade repository
    // ========================================================================

    /// Load every trade, most recent entry first.
    pub fn load_trades(&self) -> Result<Vec<Trade>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM trades ORDER BY entryDate DESC",
            TRADE_COLUMNS
        ))?;

        let trades = stmt
            .query_map([], read_trade)?
            .collect::<SqliteResult<Vec<_>>>()?;

        Ok(trades)
    }

    /// Load one trade by id.
    pub fn get_trade(&self, id: i64) -> Result<Option<Trade>> {
        let conn = self.conn()?;
        let trade = conn
            .query_row(
                &format!("SELECT {} FROM trades WHERE id = ?1", TRADE_COLUMNS),
                params![id],
                read_trade,
            )
            .optional()?;

        Ok(trade)
    }

    /// Insert a manually entered trade and return it as persisted, including
    /// the assigned id and defaulted fields.
    pub fn add_trade(&self, input: &TradeInput) -> Result<Trade> {
        validate_input(input)?;

        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO trades
            (symbol, type, volume, pnl, entryDate, exitDate,
             strategy, checklist, tags, attachments, chartLinks,
             commission, swap, entryPrice, exitPrice,
             riskRewardRatio, timeframe, accountType, outcome)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)
            "#,
            params![
                input.symbol,
                input.trade_type,
                input.volume,
                input.pnl,
                input.entry_date,
                input.exit_date,
                input.strategy,
                serde_json::to_string(&input.checklist)?,
                serde_json::to_string(&input.tags)?,
                serde_json::to_string(&input.attachments)?,
                serde_json::to_string(&input.chart_links)?,
                input.commission,
                input.swap,
                input.entry_price,
                input.exit_price,
                input.risk_reward_ratio,
                input.timeframe,
                input.account_type,
                input.outcome,
            ],
        )?;

        let id = conn.last_insert_rowid();
        log::info!("[DB] Added trade {} ({})", id, input.symbol);
        self.get_trade(id)?.ok_or(JournalError::NotFound(id))
    }

    /// Full replace of all mutable columns for the trade's id, returning the
    /// row re-read after the update. An absent id is an error, never a
    /// silent success.
    pub fn update_trade(&self, trade: &Trade) -> Result<Trade> {
        validate_checklist(trade.checklist.as_ref())?;

        let conn = self.conn()?;
        let changed = conn.execute(
            r#"
            UPDATE trades SET
                symbol = ?1, type = ?2, volume = ?3, pnl = ?4,
                entryDate = ?5, exitDate = ?6,
                strategy = ?7, checklist = ?8, tags = ?9, attachments = ?10, chartLinks = ?11,
                commission = ?12, swap = ?13, entryPrice = ?14, exitPrice = ?15,
                riskRewardRatio = ?16, timeframe = ?17, accountType = ?18, outcome = ?19
            WHERE id = ?20
            "#,
            params![
                trade.symbol,
                trade.trade_type,
                trade.volume,
                trade.pnl,
                trade.entry_date,
                trade.exit_date,
                trade.strategy,
                serde_json::to_string(&trade.checklist)?,
                serde_json::to_string(&trade.tags)?,
                serde_json::to_string(&trade.attachments)?,
                serde_json::to_string(&trade.chart_links)?,
                trade.commission,
                trade.swap,
                trade.entry_price,
                trade.exit_price,
                trade.risk_reward_ratio,
                trade.timeframe,
                trade.account_type,
                trade.outcome,
                trade.id,
            ],
        )?;

        if changed == 0 {
            return Err(JournalError::NotFound(trade.id));
        }

        self.get_trade(trade.id)?
            .ok_or(JournalError::NotFound(trade.id))
    }

    /// Partial update touching only the review columns (checklist, tags,
    /// strategy). Every other field is left exactly as stored.
    pub fn update_review(
        &self,
        id: i64,
        checklist: Option<&Checklist>,
        tags: &[String],
        strategy: Option<&str>,
    ) -> Result<()> {
        validate_checklist(checklist)?;

        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE trades SET checklist = ?1, tags = ?2, strategy = ?3 WHERE id = ?4",
            params![
                serde_json::to_string(&checklist)?,
                serde_json::to_string(&tags)?,
                strategy,
                id,
            ],
        )?;

        if changed == 0 {
            return Err(JournalError::NotFound(id));
        }

        log::info!("[DB] Updated review for trade {}", id);
        Ok(())
    }

    /// Delete a trade. Deleting an id that does not exist is a no-op.
    pub fn delete_trade(&self, id: i64) -> Result<()> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM trades WHERE id = ?1", params![id])?;
        log::info!("[DB] Deleted {} trade rows for id {}", deleted, id);
        Ok(())
    }

    /// Append one attachment reference to a trade's attachments array.
    ///
    /// Done as a single JSON1 update statement so two concurrent appends to
    /// the same trade cannot lose each other, which a read-modify-write from
    /// application code could.
    pub fn add_attachment(&self, id: i64, attachment: &str) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE trades
             SET attachments = json_insert(COALESCE(attachments, '[]'), '$[#]', ?1)
             WHERE id = ?2",
            params![attachment, id],
        )?;

        if changed == 0 {
            return Err(JournalError::NotFound(id));
        }

        Ok(())
    }

    /// Merge externally-read trades into the journal, keyed by the broker
    /// ticket id, as one atomic batch.
    ///
    /// New tickets are inserted. Existing tickets refresh only the fields a
    /// re-import of the same ticket can legitimately change (pnl, exitDate,
    /// commission, swap); user enrichment — strategy, checklist, tags,
    /// attachments — survives untouched, so re-importing the same file twice
    /// changes nothing the second time. Returns the full reloaded trade set.
    pub fn bulk_upsert_trades(&mut self, trades: &[ForeignTrade]) -> Result<Vec<Trade>> {
        let tx = self.conn_mut()?.transaction()?;

        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO trades
                (id, symbol, type, volume, pnl, entryDate, exitDate,
                 strategy, tags, attachments, chartLinks,
                 commission, swap, entryPrice, exitPrice)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
                ON CONFLICT(id) DO UPDATE SET
                    pnl = excluded.pnl,
                    exitDate = excluded.exitDate,
                    commission = excluded.commission,
                    swap = excluded.swap
                "#,
            )?;

            for trade in trades {
                stmt.execute(params![
                    trade.id,
                    trade.symbol,
                    trade.trade_type,
                    trade.volume,
                    trade.pnl,
                    trade.entry_date,
                    trade.exit_date,
                    trade.strategy,
                    "[]",
                    "[]",
                    "[]",
                    trade.commission,
                    trade.swap,
                    trade.entry_price,
                    trade.exit_price,
                ])?;
            }
        }

        tx.commit()?;
        log::info!("[DB] Bulk upsert applied for {} trades", trades.len());

        self.load_trades()
    }

    /// Distinct non-null, non-empty values of one whitelisted column, sorted.
    /// Powers field autocomplete in the entry forms.
    pub fn distinct_values(&self, field: TradeField) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let col = field.column();
        let mut stmt = conn.prepare(&format!(
            "SELECT DISTINCT {col} FROM trades WHERE {col} IS NOT NULL AND {col} != '' ORDER BY {col}",
            col = col
        ))?;

        let values = stmt
            .query_map([], |row| row.get(0))?
            .collect::<SqliteResult<Vec<_>>>()?;

        Ok(values)
    }

    /// Union of every stored tag, sorted. A row whose tag column holds
    /// unparsable JSON is skipped rather than failing the whole scan, so one
    /// bad historical row never blocks tag autocomplete.
    pub fn distinct_tags(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT id, tags FROM trades WHERE tags IS NOT NULL AND tags != ''")?;

        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<SqliteResult<Vec<_>>>()?;

        let mut tags = BTreeSet::new();
        for (id, raw) in rows {
            match serde_json::from_str::<Vec<String>>(&raw) {
                Ok(parsed) => tags.extend(parsed),
                Err(e) => log::warn!("[DB] Skipping unparsable tags on trade {}: {}", id, e),
            }
        }

        Ok(tags.into_iter().collect())
    }

    // ========================================================================
    // Daily log repository
    // ========================================================================

    /// Upsert a daily psychology log by its date key. Saving the same date
    /// again replaces every field; there is no partial-field variant.
    pub fn save_daily_log(&self, entry: &DailyLog) -> Result<()> {
        validate_daily_log(entry)?;

        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO daily_log
            (date, pre_market_focus, pre_market_preparation, mindfulness_state,
             adherence_to_rules, impulsive_trades_count, hesitation_on_entry,
             premature_exit_count, post_market_review_quality,
             emotional_state_after, daily_lesson_learned)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                entry.date,
                entry.pre_market_focus,
                entry.pre_market_preparation,
                entry.mindfulness_state,
                entry.adherence_to_rules,
                entry.impulsive_trades_count,
                entry.hesitation_on_entry,
                entry.premature_exit_count,
                entry.post_market_review_quality,
                entry.emotional_state_after,
                entry.daily_lesson_learned,
            ],
        )?;

        log::info!("[DB] Saved daily log for {}", entry.date);
        Ok(())
    }

    /// Load the daily log for one date, if recorded.
    pub fn get_daily_log(&self, date: &str) -> Result<Option<DailyLog>> {
        let conn = self.conn()?;
        let entry = conn
            .query_row(
                "SELECT date, pre_market_focus, pre_market_preparation, mindfulness_state,
                        adherence_to_rules, impulsive_trades_count, hesitation_on_entry,
                        premature_exit_count, post_market_review_quality,
                        emotional_state_after, daily_lesson_learned
                 FROM daily_log WHERE date = ?1",
                params![date],
                read_daily_log,
            )
            .optional()?;

        Ok(entry)
    }

    /// Load all daily logs, most recent date first.
    pub fn load_daily_logs(&self) -> Result<Vec<DailyLog>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT date, pre_market_focus, pre_market_preparation, mindfulness_state,
                    adherence_to_rules, impulsive_trades_count, hesitation_on_entry,
                    premature_exit_count, post_market_review_quality,
                    emotional_state_after, daily_lesson_learned
             FROM daily_log ORDER BY date DESC",
        )?;

        let logs = stmt
            .query_map([], read_daily_log)?
            .collect::<SqliteResult<Vec<_>>>()?;

        Ok(logs)
    }
}

/// Map a trades row (in `TRADE_COLUMNS` order) to a `Trade`, deserializing
/// the JSON-typed columns. Null array columns normalize to empty vectors.
fn read_trade(row: &Row<'_>) -> SqliteResult<Trade> {
    Ok(Trade {
        id: row.get(0)?,
        symbol: row.get(1)?,
        trade_type: row.get(2)?,
        volume: row.get(3)?,
        pnl: row.get(4)?,
        entry_date: row.get(5)?,
        exit_date: row.get(6)?,
        strategy: row.get(7)?,
        checklist: read_json_column(row, 8)?,
        tags: read_json_column::<Vec<String>>(row, 9)?.unwrap_or_default(),
        attachments: read_json_column::<Vec<String>>(row, 10)?.unwrap_or_default(),
        chart_links: read_json_column::<Vec<String>>(row, 11)?.unwrap_or_default(),
        commission: row.get::<_, Option<f64>>(12)?.unwrap_or(0.0),
        swap: row.get::<_, Option<f64>>(13)?.unwrap_or(0.0),
        entry_price: row.get::<_, Option<f64>>(14)?.unwrap_or(0.0),
        exit_price: row.get::<_, Option<f64>>(15)?.unwrap_or(0.0),
        risk_reward_ratio: row.get(16)?,
        timeframe: row.get(17)?,
        account_type: row.get(18)?,
        outcome: row.get(19)?,
    })
}

/// Read a nullable TEXT column holding JSON. Both SQL NULL and a stored JSON
/// `null` map to `None`.
fn read_json_column<T: serde::de::DeserializeOwned>(
    row: &Row<'_>,
    idx: usize,
) -> SqliteResult<Option<T>> {
    let raw: Option<String> = row.get(idx)?;
    match raw {
        Some(text) => serde_json::from_str::<Option<T>>(&text).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        }),
        None => Ok(None),
    }
}

fn read_daily_log(row: &Row<'_>) -> SqliteResult<DailyLog> {
    Ok(DailyLog {
        date: row.get(0)?,
        pre_market_focus: row.get(1)?,
        pre_market_preparation: row.get(2)?,
        mindfulness_state: row.get(3)?,
        adherence_to_rules: row.get(4)?,
        impulsive_trades_count: row.get(5)?,
        hesitation_on_entry: row.get(6)?,
        premature_exit_count: row.get(7)?,
        post_market_review_quality: row.get(8)?,
        emotional_state_after: row.get(9)?,
        daily_lesson_learned: row.get(10)?,
    })
}

fn validate_input(input: &TradeInput) -> Result<()> {
    if input.symbol.trim().is_empty() {
        return constraint("symbol", "must not be empty");
    }
    if input.trade_type.trim().is_empty() {
        return constraint("type", "must not be empty");
    }
    if input.volume < 0.0 {
        return constraint("volume", "must be non-negative");
    }
    if input.entry_date.trim().is_empty() {
        return constraint("entryDate", "must not be empty");
    }
    if input.exit_date.trim().is_empty() {
        return constraint("exitDate", "must not be empty");
    }
    validate_checklist(input.checklist.as_ref())
}

fn validate_checklist(checklist: Option<&Checklist>) -> Result<()> {
    if let Some(checklist) = checklist {
        if !(1..=5).contains(&checklist.execution_score) {
            return constraint("checklist.executionScore", "must be between 1 and 5");
        }
    }
    Ok(())
}

fn validate_daily_log(entry: &DailyLog) -> Result<()> {
    if entry.date.trim().is_empty() {
        return constraint("date", "must not be empty");
    }
    let scores = [
        ("pre_market_focus", entry.pre_market_focus),
        ("pre_market_preparation", entry.pre_market_preparation),
        ("adherence_to_rules", entry.adherence_to_rules),
        ("hesitation_on_entry", entry.hesitation_on_entry),
        ("post_market_review_quality", entry.post_market_review_quality),
    ];
    for (field, score) in scores {
        if !(1..=5).contains(&score) {
            return constraint(field, "must be between 1 and 5");
        }
    }
    if entry.impulsive_trades_count < 0 {
        return constraint("impulsive_trades_count", "must be non-negative");
    }
    if entry.premature_exit_count < 0 {
        return constraint("premature_exit_count", "must be non-negative");
    }
    Ok(())
}

fn constraint(field: &'static str, reason: &str) -> Result<()> {
    Err(JournalError::Constraint {
        field,
        reason: reason.to_string(),
    })
}
