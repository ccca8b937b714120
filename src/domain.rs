// ===============================
// src/domain.rs
// ===============================
use serde::{Deserialize, Serialize};

/// Arah trade relatif ke token A: `Buy` mengambil A dari pool, `Sell` menyetor A.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side { Buy, Sell }
impl Side {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buy" => Some(Side::Buy),
            "sell" => Some(Side::Sell),
            _ => None,
        }
    }
    pub fn as_str(&self) -> &'static str { match self { Side::Buy => "buy", Side::Sell => "sell" } }
}

/// Who submitted a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin { Api, Peg, Noise }
impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self { Origin::Api => "api", Origin::Peg => "peg", Origin::Noise => "noise" }
    }
}

/// OHLCV bucket. `time` is the bucket start in epoch seconds, aligned to the bucket width.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    #[serde(rename = "time")]
    pub bucket_start: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Point-in-time view of the whole market. Keys follow the chart front end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    #[serde(rename = "current_price")]
    pub price: f64,
    #[serde(rename = "token_a_reserve")]
    pub reserve_a: f64,
    #[serde(rename = "token_b_reserve")]
    pub reserve_b: f64,
    #[serde(rename = "k_constant")]
    pub k: f64,
    #[serde(rename = "current_candle")]
    pub open_candle: Option<Candle>,
    #[serde(rename = "price_history")]
    pub history: Vec<Candle>,
    #[serde(rename = "target_price")]
    pub peg_target: Option<f64>,
    #[serde(rename = "auto_trading")]
    pub peg_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeFill { pub ts: i64, pub origin: Origin, pub side: Side, pub amount: f64, pub price: f64, pub reserve_a: f64, pub reserve_b: f64 }
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LiquidityKind { Add, Remove }
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidityChange { pub ts: i64, pub kind: LiquidityKind, pub reserve_a: f64, pub reserve_b: f64, pub k: f64 }
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PegChange { Armed { target: f64 }, Disarmed }

/// Journal entries (lihat recorder.rs).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event { Trade(TradeFill), Liquidity(LiquidityChange), CandleSealed(Candle), Peg(PegChange) }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_parse_is_case_insensitive() {
        assert_eq!(Side::parse(" BUY "), Some(Side::Buy));
        assert_eq!(Side::parse("sell"), Some(Side::Sell));
        assert_eq!(Side::parse("hold"), None);
    }

    #[test]
    fn candle_serializes_with_chart_keys() {
        let c = Candle { bucket_start: 1_700_000_040, open: 1.0, high: 1.2, low: 0.9, close: 1.1, volume: 5.0 };
        let v = serde_json::to_value(c).unwrap();
        assert_eq!(v["time"], 1_700_000_040);
        assert_eq!(v["close"], 1.1);
        assert!(v.get("bucket_start").is_none());
    }
}
