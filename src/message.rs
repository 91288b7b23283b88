//! Typed representations of upstream WebSocket payloads (SPEC_FULL.md §4.1).
//!
//! Grounded on the original `dto.py` pydantic schema and the teacher's
//! envelope-deserialization style in `ws_client.rs`. Numeric coercion is
//! hand-rolled rather than derived, since the leniency rules differ between
//! stats fields (null-on-unparsable) and book levels (error-on-unparsable).

use serde_json::Value;

use crate::errors::{Error, Result};

/// A parsed upstream frame.
#[derive(Debug, Clone)]
pub enum WsMessage {
    MarketStats(MarketStatsMsg),
    OrderBook(OrderBookMsg),
}

#[derive(Debug, Clone)]
pub struct MarketStatsMsg {
    pub channel: String,
    pub market_stats: MarketStatsBody,
}

#[derive(Debug, Clone, Default)]
pub struct MarketStatsBody {
    pub market_id: i32,
    pub index_price: Option<f64>,
    pub mark_price: Option<f64>,
    pub open_interest: Option<f64>,
    pub last_trade_price: Option<f64>,
    pub current_funding_rate: Option<f64>,
    pub funding_rate: Option<f64>,
    pub daily_base_token_volume: Option<f64>,
    pub daily_quote_token_volume: Option<f64>,
}

impl MarketStatsBody {
    /// `current_funding_rate` preferred, `funding_rate` fallback (§4.1).
    pub fn effective_funding_rate(&self) -> Option<f64> {
        self.current_funding_rate.or(self.funding_rate)
    }

    /// `daily_quote_token_volume` preferred, `daily_base_token_volume` fallback.
    pub fn effective_daily_volume(&self) -> Option<f64> {
        self.daily_quote_token_volume.or(self.daily_base_token_volume)
    }

    fn from_value(value: &Value) -> Result<Self> {
        let market_id = value
            .get("market_id")
            .and_then(Value::as_i64)
            .ok_or_else(|| Error::InvalidValue("market_stats missing market_id".to_string()))?
            as i32;

        Ok(Self {
            market_id,
            index_price: coerce_lenient(value.get("index_price")),
            mark_price: coerce_lenient(value.get("mark_price")),
            open_interest: coerce_lenient(value.get("open_interest")),
            last_trade_price: coerce_lenient(value.get("last_trade_price")),
            current_funding_rate: coerce_lenient(value.get("current_funding_rate")),
            funding_rate: coerce_lenient(value.get("funding_rate")),
            daily_base_token_volume: coerce_lenient(value.get("daily_base_token_volume")),
            daily_quote_token_volume: coerce_lenient(value.get("daily_quote_token_volume")),
        })
    }
}

#[derive(Debug, Clone)]
pub struct OrderBookMsg {
    pub channel: String,
    pub order_book: OrderBookPayload,
}

#[derive(Debug, Clone, Default)]
pub struct OrderBookPayload {
    pub asks: Vec<OrderBookLevel>,
    pub bids: Vec<OrderBookLevel>,
}

#[derive(Debug, Clone, Copy)]
pub struct OrderBookLevel {
    pub price: f64,
    pub size: f64,
}

/// Parse a top-level frame already known to be a single (non-batched)
/// `update/market_stats` or `update/order_book` message. Callers are
/// expected to have already peeled off the batched `market_stats` shape
/// (see `is_batched_market_stats`) before reaching here.
pub fn parse_ws_message(value: &Value) -> Result<WsMessage> {
    let msg_type = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::UnsupportedMessageType("<missing type>".to_string()))?;

    match msg_type {
        "update/market_stats" => Ok(WsMessage::MarketStats(parse_market_stats(value)?)),
        "update/order_book" => Ok(WsMessage::OrderBook(parse_order_book(value)?)),
        other => Err(Error::UnsupportedMessageType(other.to_string())),
    }
}

/// True when `value` is an `update/market_stats` frame whose `market_stats`
/// field is a container keyed by market id rather than a single record
/// (the "all" channel's batched form, §4.1).
pub fn is_batched_market_stats(value: &Value) -> bool {
    if value.get("type").and_then(Value::as_str) != Some("update/market_stats") {
        return false;
    }
    match value.get("market_stats") {
        Some(Value::Object(map)) => !map.contains_key("market_id"),
        _ => false,
    }
}

/// Parse a single market-stats record from a batch entry (§4.5: "invalid
/// entries are skipped with a debug log").
pub fn parse_market_stats_entry(channel: &str, value: &Value) -> Result<MarketStatsMsg> {
    Ok(MarketStatsMsg {
        channel: channel.to_string(),
        market_stats: MarketStatsBody::from_value(value)?,
    })
}

fn parse_market_stats(value: &Value) -> Result<MarketStatsMsg> {
    let channel = value
        .get("channel")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::InvalidValue("missing channel".to_string()))?
        .to_string();
    let stats = value
        .get("market_stats")
        .ok_or_else(|| Error::InvalidValue("missing market_stats".to_string()))?;
    Ok(MarketStatsMsg {
        channel,
        market_stats: MarketStatsBody::from_value(stats)?,
    })
}

fn parse_order_book(value: &Value) -> Result<OrderBookMsg> {
    let channel = value
        .get("channel")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::InvalidValue("missing channel".to_string()))?
        .to_string();
    let book = value
        .get("order_book")
        .ok_or_else(|| Error::InvalidValue("missing order_book".to_string()))?;

    let asks = parse_levels(book.get("asks"))?;
    let bids = parse_levels(book.get("bids"))?;

    Ok(OrderBookMsg {
        channel,
        order_book: OrderBookPayload { asks, bids },
    })
}

fn parse_levels(value: Option<&Value>) -> Result<Vec<OrderBookLevel>> {
    let Some(Value::Array(items)) = value else {
        return Ok(Vec::new());
    };
    items.iter().map(parse_level).collect()
}

fn parse_level(value: &Value) -> Result<OrderBookLevel> {
    let price = coerce_strict(value.get("price"))?;
    let size = coerce_strict(value.get("size"))?;
    Ok(OrderBookLevel { price, size })
}

/// Number or decimal string; missing/null/empty-string/unparsable all
/// become `None` (stats fields are lenient, §4.1).
fn coerce_lenient(value: Option<&Value>) -> Option<f64> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                trimmed.parse::<f64>().ok()
            }
        }
        _ => None,
    }
}

/// Number or decimal string; missing/null/empty/unparsable is an error
/// (book levels are strict, §4.1).
fn coerce_strict(value: Option<&Value>) -> Result<f64> {
    match value {
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| Error::InvalidValue("non-finite numeric value".to_string())),
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Err(Error::InvalidValue("empty numeric string".to_string()));
            }
            trimmed
                .parse::<f64>()
                .map_err(|_| Error::InvalidValue(format!("invalid numeric string: {s}")))
        }
        _ => Err(Error::InvalidValue("missing numeric field".to_string())),
    }
}
