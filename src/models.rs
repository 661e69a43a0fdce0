//! Data models for the trade journal

use serde::{Deserialize, Serialize};

use crate::error::JournalError;

/// Post-trade psychological review attached to a trade.
///
/// Serialized as a JSON object into the `checklist` column; field names match
/// the UI payload (camelCase).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checklist {
    pub emotion: String,
    /// Execution quality self-score, 1 (poor) to 5 (flawless).
    pub execution_score: i64,
    pub notes: Option<String>,
}

/// One round-trip position with realized P&L, as persisted in the journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    pub id: i64,
    pub symbol: String,
    /// Trade side, "Buy" or "Sell" by convention (stored permissively).
    #[serde(rename = "type")]
    pub trade_type: String,
    pub volume: f64,
    pub pnl: f64,
    /// ISO-8601 instant text, e.g. "2025-01-01T10:00:00Z".
    pub entry_date: String,
    pub exit_date: String,
    pub strategy: Option<String>,
    pub checklist: Option<Checklist>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub attachments: Vec<String>,
    #[serde(default)]
    pub chart_links: Vec<String>,
    pub commission: f64,
    pub swap: f64,
    pub entry_price: f64,
    pub exit_price: f64,
    /// Free text, e.g. "1:2.5".
    pub risk_reward_ratio: Option<String>,
    pub timeframe: Option<String>,
    pub account_type: Option<String>,
    pub outcome: Option<String>,
}

/// Client-supplied fields for a manual trade entry; the id is assigned by the
/// store on insert.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeInput {
    pub symbol: String,
    #[serde(rename = "type")]
    pub trade_type: String,
    pub volume: f64,
    pub pnl: f64,
    pub entry_date: String,
    pub exit_date: String,
    pub strategy: Option<String>,
    pub checklist: Option<Checklist>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub attachments: Vec<String>,
    #[serde(default)]
    pub chart_links: Vec<String>,
    #[serde(default)]
    pub commission: f64,
    #[serde(default)]
    pub swap: f64,
    #[serde(default)]
    pub entry_price: f64,
    #[serde(default)]
    pub exit_price: f64,
    pub risk_reward_ratio: Option<String>,
    pub timeframe: Option<String>,
    pub account_type: Option<String>,
    pub outcome: Option<String>,
}

/// One per-calendar-day psychology/discipline record, keyed by date
/// ('YYYY-MM-DD'). Saving an existing date replaces every field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyLog {
    pub date: String,
    pub pre_market_focus: i64,
    pub pre_market_preparation: i64,
    pub mindfulness_state: String,
    pub adherence_to_rules: i64,
    pub impulsive_trades_count: i64,
    pub hesitation_on_entry: i64,
    pub premature_exit_count: i64,
    pub post_market_review_quality: i64,
    pub emotional_state_after: String,
    pub daily_lesson_learned: String,
}

/// Trade record normalized from a broker-terminal database, not yet merged
/// into the journal. The id is the broker's ticket and serves as the merge
/// key; checklist/tags/attachments are always empty on fresh import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForeignTrade {
    pub id: i64,
    pub symbol: String,
    #[serde(rename = "type")]
    pub trade_type: String,
    pub volume: f64,
    pub pnl: f64,
    pub entry_date: String,
    pub exit_date: String,
    pub commission: f64,
    pub swap: f64,
    pub entry_price: f64,
    pub exit_price: f64,
    pub strategy: String,
}

/// Columns that may be queried for distinct autocomplete values.
///
/// The column name is interpolated into query text, so the permitted set is a
/// closed enum rather than a string; anything else fails to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeField {
    Symbol,
    Strategy,
    Timeframe,
    AccountType,
    Outcome,
    RiskRewardRatio,
}

impl TradeField {
    pub fn column(&self) -> &'static str {
        match self {
            Self::Symbol => "symbol",
            Self::Strategy => "strategy",
            Self::Timeframe => "timeframe",
            Self::AccountType => "accountType",
            Self::Outcome => "outcome",
            Self::RiskRewardRatio => "riskRewardRatio",
        }
    }
}

impl std::str::FromStr for TradeField {
    type Err = JournalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "symbol" => Ok(Self::Symbol),
            "strategy" => Ok(Self::Strategy),
            "timeframe" => Ok(Self::Timeframe),
            "accountType" => Ok(Self::AccountType),
            "outcome" => Ok(Self::Outcome),
            "riskRewardRatio" => Ok(Self::RiskRewardRatio),
            other => Err(JournalError::InvalidArgument(format!(
                "not a queryable trade field: {:?}",
                other
            ))),
        }
    }
}
