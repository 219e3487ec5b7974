/// Wire model for the Binance klines endpoint.
///
/// The exchange returns each kline as a positional 12-tuple; we decode it
/// into a typed record at the boundary and reject malformed tuples rather
/// than threading `serde_json::Value` deeper into the pipeline.
use serde::Deserialize;
use serde_json::Value;

use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct Kline {
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub close_time: i64,
    pub quote_asset_volume: f64,
    pub number_of_trades: i64,
    pub taker_buy_base_volume: f64,
    pub taker_buy_quote_volume: f64,
}

/// Decode the raw `[[...], [...]]` response body into typed klines,
/// ordered ascending (the exchange already returns them that way).
pub fn parse_klines(body: &[u8]) -> Result<Vec<Kline>> {
    let raw: Vec<Value> = serde_json::from_slice(body)
        .map_err(|e| PipelineError::PermanentHttp {
            status: 200,
            body: format!("response is not a JSON array: {e}"),
        })?;

    raw.iter().map(parse_one).collect()
}

fn parse_one(row: &Value) -> Result<Kline> {
    let arr = row.as_array().ok_or_else(|| PipelineError::PermanentHttp {
        status: 200,
        body: "kline row is not an array".into(),
    })?;

    if arr.len() < 11 {
        return Err(PipelineError::PermanentHttp {
            status: 200,
            body: format!("kline row has {} fields, expected >= 11", arr.len()),
        });
    }

    Ok(Kline {
        open_time: as_i64(&arr[0])?,
        open: as_f64(&arr[1])?,
        high: as_f64(&arr[2])?,
        low: as_f64(&arr[3])?,
        close: as_f64(&arr[4])?,
        volume: as_f64(&arr[5])?,
        close_time: as_i64(&arr[6])?,
        quote_asset_volume: as_f64(&arr[7])?,
        number_of_trades: as_i64(&arr[8])?,
        taker_buy_base_volume: as_f64(&arr[9])?,
        taker_buy_quote_volume: as_f64(&arr[10])?,
    })
}

fn as_f64(v: &Value) -> Result<f64> {
    if let Some(s) = v.as_str() {
        return s.parse::<f64>().map_err(|e| PipelineError::PermanentHttp {
            status: 200,
            body: format!("cannot parse numeric field {s:?}: {e}"),
        });
    }
    v.as_f64().ok_or_else(|| PipelineError::PermanentHttp {
        status: 200,
        body: format!("expected numeric field, got {v}"),
    })
}

fn as_i64(v: &Value) -> Result<i64> {
    v.as_i64().ok_or_else(|| PipelineError::PermanentHttp {
        status: 200,
        body: format!("expected integer field, got {v}"),
    })
}

/// Deserialization target kept only so callers that want serde-native
/// decoding (e.g. tests fixturing a response body) have a typed path too.
#[derive(Debug, Deserialize)]
#[serde(try_from = "Vec<Value>")]
pub struct KlineRow(pub Kline);

impl TryFrom<Vec<Value>> for KlineRow {
    type Error = String;

    fn try_from(arr: Vec<Value>) -> std::result::Result<Self, Self::Error> {
        parse_one(&Value::Array(arr))
            .map(KlineRow)
            .map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_response() {
        let body = br#"[
            [1700000000000, "100.0", "101.0", "99.0", "100.5", "10.0",
             1700003599999, "1005.0", 42, "5.0", "502.5", "0"]
        ]"#;
        let klines = parse_klines(body).unwrap();
        assert_eq!(klines.len(), 1);
        assert_eq!(klines[0].open_time, 1700000000000);
        assert!((klines[0].close - 100.5).abs() < 1e-9);
        assert_eq!(klines[0].number_of_trades, 42);
    }

    #[test]
    fn rejects_short_tuples() {
        let body = br#"[[1700000000000, "100.0"]]"#;
        assert!(parse_klines(body).is_err());
    }

    #[test]
    fn rejects_non_array_body() {
        let body = br#"{"code": -1121, "msg": "Invalid symbol."}"#;
        assert!(parse_klines(body).is_err());
    }
}
