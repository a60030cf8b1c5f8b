//! Market data tools: quotes, order book and candles

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use super::registry::Tool;
use super::schema::{ParamSpec, ParamType};
use super::types::{flatten_decimals, into_object, non_empty, take_array};
use crate::transport::{ApiRequest, ApiTransport};
use crate::{Error, Result};

pub const DEFAULT_ORDERBOOK_DEPTH: u32 = 10;
pub const MAX_ORDERBOOK_DEPTH: u32 = 50;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct QuoteInput {
    /// Instrument symbol in `TICKER@MIC` form, e.g. "SBER@MISX"
    pub symbol: String,
}

/// Latest price and volume snapshot
pub struct GetQuotesTool {
    transport: Arc<ApiTransport>,
}

impl GetQuotesTool {
    pub fn new(transport: Arc<ApiTransport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl Tool for GetQuotesTool {
    const NAME: &'static str = super::TOOL_GET_QUOTES;
    type Input = QuoteInput;

    fn description(&self) -> &'static str {
        "Get the latest quote (last, bid, ask, volume) for one instrument"
    }

    fn params(&self) -> Vec<ParamSpec> {
        vec![ParamSpec::required("symbol", ParamType::String)]
    }

    async fn execute(&self, input: QuoteInput) -> Result<Value> {
        let symbol = non_empty("symbol", &input.symbol)?;
        let mut raw = self
            .transport
            .call_json(&ApiRequest::get(&[
                "v1",
                "instruments",
                symbol.as_str(),
                "quotes",
                "latest",
            ]))
            .await?;

        let quote = if raw.get("quote").is_some_and(Value::is_object) {
            raw["quote"].take()
        } else {
            raw
        };
        let mut data = into_object(flatten_decimals(quote));
        data.entry("symbol").or_insert_with(|| Value::String(symbol));
        Ok(Value::Object(data))
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct OrderbookInput {
    /// Instrument symbol in `TICKER@MIC` form
    pub symbol: String,
    /// Price levels per side, 1 to 50
    #[serde(default = "default_depth")]
    pub depth: u32,
}

fn default_depth() -> u32 {
    DEFAULT_ORDERBOOK_DEPTH
}

/// Bid and ask ladders
pub struct GetOrderbookTool {
    transport: Arc<ApiTransport>,
}

impl GetOrderbookTool {
    pub fn new(transport: Arc<ApiTransport>) -> Self {
        Self { transport }
    }
}

fn price_of(level: &Value) -> f64 {
    level
        .get("price")
        .and_then(Value::as_str)
        .and_then(|p| p.parse::<f64>().ok())
        .unwrap_or(0.0)
}

#[async_trait]
impl Tool for GetOrderbookTool {
    const NAME: &'static str = super::TOOL_GET_ORDERBOOK;
    type Input = OrderbookInput;

    fn description(&self) -> &'static str {
        "Get the order book (bid and ask price levels) for one instrument"
    }

    fn params(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::required("symbol", ParamType::String),
            ParamSpec::optional("depth", ParamType::Integer, json!(DEFAULT_ORDERBOOK_DEPTH)),
        ]
    }

    async fn execute(&self, input: OrderbookInput) -> Result<Value> {
        let symbol = non_empty("symbol", &input.symbol)?;
        if !(1..=MAX_ORDERBOOK_DEPTH).contains(&input.depth) {
            return Err(Error::Validation(vec![format!(
                "parameter `depth` must be between 1 and {}, got {}",
                MAX_ORDERBOOK_DEPTH, input.depth
            )]));
        }
        let depth = input.depth as usize;

        let raw = self
            .transport
            .call_json(&ApiRequest::get(&[
                "v1",
                "instruments",
                symbol.as_str(),
                "orderbook",
            ]))
            .await?;
        let mut book = flatten_decimals(raw);
        let rows = if book.get("orderbook").is_some() {
            take_array(&mut book["orderbook"], "rows")
        } else {
            take_array(&mut book, "rows")
        };

        let mut bids = Vec::new();
        let mut asks = Vec::new();
        for row in rows {
            let price = row.get("price").cloned().unwrap_or(Value::Null);
            if let Some(size) = row.get("buy_size") {
                bids.push(json!({"price": price, "size": size}));
            } else if let Some(size) = row.get("sell_size") {
                asks.push(json!({"price": price, "size": size}));
            }
        }
        // Best prices first on each side
        bids.sort_by(|a, b| price_of(b).total_cmp(&price_of(a)));
        asks.sort_by(|a, b| price_of(a).total_cmp(&price_of(b)));
        bids.truncate(depth);
        asks.truncate(depth);

        Ok(json!({
            "symbol": symbol,
            "depth": depth,
            "bids": bids,
            "asks": asks,
        }))
    }
}

/// Candle interval accepted by the bars endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeframe {
    M1,
    M5,
    M15,
    M30,
    H1,
    H4,
    D,
    W,
    MN,
}

impl Timeframe {
    pub const ALL: [Timeframe; 9] = [
        Timeframe::M1,
        Timeframe::M5,
        Timeframe::M15,
        Timeframe::M30,
        Timeframe::H1,
        Timeframe::H4,
        Timeframe::D,
        Timeframe::W,
        Timeframe::MN,
    ];

    pub fn short_name(&self) -> &'static str {
        match self {
            Timeframe::M1 => "M1",
            Timeframe::M5 => "M5",
            Timeframe::M15 => "M15",
            Timeframe::M30 => "M30",
            Timeframe::H1 => "H1",
            Timeframe::H4 => "H4",
            Timeframe::D => "D",
            Timeframe::W => "W",
            Timeframe::MN => "MN",
        }
    }

    /// Wire name, e.g. `TIME_FRAME_H1`
    pub fn api_name(&self) -> String {
        format!("TIME_FRAME_{}", self.short_name())
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        let short = upper.strip_prefix("TIME_FRAME_").unwrap_or(&upper);
        Timeframe::ALL
            .into_iter()
            .find(|tf| tf.short_name() == short)
            .ok_or_else(|| {
                let known: Vec<_> = Timeframe::ALL.iter().map(Timeframe::short_name).collect();
                format!(
                    "parameter `timeframe` must be one of {}, got '{}'",
                    known.join(", "),
                    s
                )
            })
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CandlesInput {
    /// Instrument symbol in `TICKER@MIC` form
    pub symbol: String,
    /// One of M1, M5, M15, M30, H1, H4, D, W, MN (or the full TIME_FRAME_* name)
    pub timeframe: String,
    /// Interval start, RFC 3339
    pub from: String,
    /// Interval end, RFC 3339, after `from`
    pub to: String,
}

fn parse_instant(name: &str, value: &str) -> std::result::Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("parameter `{}` must be an RFC 3339 timestamp: {}", name, e))
}

/// Historical OHLCV bars
pub struct GetCandlesTool {
    transport: Arc<ApiTransport>,
}

impl GetCandlesTool {
    pub fn new(transport: Arc<ApiTransport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl Tool for GetCandlesTool {
    const NAME: &'static str = super::TOOL_GET_CANDLES;
    type Input = CandlesInput;

    fn description(&self) -> &'static str {
        "Get historical OHLCV candles for one instrument over a time interval"
    }

    fn params(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::required("symbol", ParamType::String),
            ParamSpec::required("timeframe", ParamType::String),
            ParamSpec::required("from", ParamType::String),
            ParamSpec::required("to", ParamType::String),
        ]
    }

    async fn execute(&self, input: CandlesInput) -> Result<Value> {
        let symbol = non_empty("symbol", &input.symbol)?;

        let timeframe = input.timeframe.parse::<Timeframe>();
        let from = parse_instant("from", &input.from);
        let to = parse_instant("to", &input.to);
        let (timeframe, from, to) = match (timeframe, from, to) {
            (Ok(tf), Ok(from), Ok(to)) if from < to => (tf, from, to),
            (Ok(_), Ok(_), Ok(_)) => {
                return Err(Error::Validation(vec![
                    "parameter `from` must be earlier than `to`".to_string(),
                ]))
            }
            (tf, from, to) => {
                let violations = [tf.err(), from.err(), to.err()]
                    .into_iter()
                    .flatten()
                    .collect();
                return Err(Error::Validation(violations));
            }
        };

        let raw = self
            .transport
            .call_json(
                &ApiRequest::get(&["v1", "instruments", symbol.as_str(), "bars"])
                    .query("timeframe", timeframe.api_name())
                    .query(
                        "interval.start_time",
                        from.to_rfc3339_opts(SecondsFormat::Secs, true),
                    )
                    .query(
                        "interval.end_time",
                        to.to_rfc3339_opts(SecondsFormat::Secs, true),
                    ),
            )
            .await?;

        let mut candles = take_array(&mut flatten_decimals(raw), "bars");
        candles.sort_by_key(|bar| {
            bar.get("timestamp")
                .and_then(Value::as_str)
                .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
                .map(|dt| dt.with_timezone(&Utc))
        });

        Ok(json!({
            "symbol": symbol,
            "timeframe": timeframe.short_name(),
            "from": from,
            "to": to,
            "count": candles.len(),
            "candles": candles,
        }))
    }
}
