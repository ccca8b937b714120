// ===============================
// src/api.rs (JSON adapter)
// ===============================
//
// Endpoint (sama dengan front end chart):
//   GET  /api/market_data        -> snapshot
//   POST /api/execute_trade      {"direction":"buy"|"sell","amount":n}
//   POST /api/set_target_price   {"price":n}
//   POST /api/stop_auto_trading
//   POST /api/add_liquidity      {"amount_a":n,"amount_b":n}
//   POST /api/remove_liquidity   {"percentage":n}
//   GET  /healthz
// Angka boleh number atau string numerik. Gagal validasi core -> 200 {"success":false,"error":code}.
// Body > 64 KiB -> 413. Setiap request dihitung di api_requests_total (path tak dikenal -> "unknown").
//
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use hyper::body::{Bytes, HttpBody};
use hyper::header::CONTENT_LENGTH;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::domain::{Origin, Side};
use crate::ledger::ExecError;
use crate::market::Market;
use crate::metrics::API_REQUESTS;

pub const MAX_BODY_BYTES: usize = 64 * 1024;

const ROUTES: [&str; 7] = [
    "/api/market_data",
    "/api/execute_trade",
    "/api/set_target_price",
    "/api/stop_auto_trading",
    "/api/add_liquidity",
    "/api/remove_liquidity",
    "/healthz",
];

// bounded label set for the request counter
fn route_label(path: &str) -> &'static str {
    ROUTES.iter().copied().find(|r| *r == path).unwrap_or("unknown")
}

#[derive(Debug, Error, PartialEq)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found")]
    NotFound,
    #[error("body exceeds 64 KiB")]
    PayloadTooLarge,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Num {
    Number(f64),
    Text(String),
}

impl Num {
    fn value(&self, field: &str) -> Result<f64, ApiError> {
        match self {
            Num::Number(x) => Ok(*x),
            Num::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| ApiError::BadRequest(format!("{field} is not a number"))),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TradeReq { direction: String, amount: Num }
#[derive(Debug, Deserialize)]
struct TargetReq { price: Num }
#[derive(Debug, Deserialize)]
struct AddLiquidityReq { amount_a: Num, amount_b: Num }
#[derive(Debug, Deserialize)]
struct RemoveLiquidityReq { percentage: Num }

fn parse<'a, T: Deserialize<'a>>(body: &'a [u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(e.to_string()))
}

fn outcome(route: &str, res: Result<(), ExecError>) -> Value {
    match res {
        Ok(()) => json!({ "success": true }),
        Err(e) => {
            warn!(route, code = e.code(), "request rejected");
            json!({ "success": false, "error": e.code() })
        }
    }
}

/// Dispatches one request against the market. Transport-free for tests.
pub fn route(market: &Market, method: &Method, path: &str, body: &[u8]) -> Result<Value, ApiError> {
    let value = match (method, path) {
        (&Method::GET, "/api/market_data") => {
            serde_json::to_value(market.snapshot()).map_err(|e| ApiError::BadRequest(e.to_string()))?
        }
        (&Method::POST, "/api/execute_trade") => {
            let req: TradeReq = parse(body)?;
            let side = Side::parse(&req.direction)
                .ok_or_else(|| ApiError::BadRequest(format!("unknown direction {:?}", req.direction)))?;
            let amount = req.amount.value("amount")?;
            outcome(path, market.execute_trade(side, amount, Origin::Api).map(|_| ()))
        }
        (&Method::POST, "/api/set_target_price") => {
            let req: TargetReq = parse(body)?;
            outcome(path, market.set_target(req.price.value("price")?))
        }
        (&Method::POST, "/api/stop_auto_trading") => {
            market.clear_target();
            json!({ "success": true })
        }
        (&Method::POST, "/api/add_liquidity") => {
            let req: AddLiquidityReq = parse(body)?;
            let (a, b) = (req.amount_a.value("amount_a")?, req.amount_b.value("amount_b")?);
            outcome(path, market.add_liquidity(a, b))
        }
        (&Method::POST, "/api/remove_liquidity") => {
            let req: RemoveLiquidityReq = parse(body)?;
            outcome(path, market.remove_liquidity(req.percentage.value("percentage")?))
        }
        (&Method::GET, "/healthz") => json!("ok"),
        _ => return Err(ApiError::NotFound),
    };
    Ok(value)
}

fn json_response(status: StatusCode, v: &Value) -> Response<Body> {
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Body::from(v.to_string()))
        .unwrap_or_else(|_| Response::new(Body::empty()))
}

// Reads at most MAX_BODY_BYTES; declared Content-Length is checked before reading.
async fn read_body(headers: &hyper::HeaderMap, mut body: Body) -> Result<Bytes, ApiError> {
    let declared = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    if declared.map_or(false, |n| n > MAX_BODY_BYTES as u64) {
        return Err(ApiError::PayloadTooLarge);
    }

    let mut buf = Vec::new();
    while let Some(chunk) = body.data().await {
        match chunk {
            Ok(c) => {
                if buf.len() + c.len() > MAX_BODY_BYTES {
                    return Err(ApiError::PayloadTooLarge);
                }
                buf.extend_from_slice(&c);
            }
            Err(e) => {
                warn!(?e, "api: body read failed");
                break;
            }
        }
    }
    Ok(Bytes::from(buf))
}

async fn handle(market: Arc<Market>, req: Request<Body>) -> Result<Response<Body>, Infallible> {
    let (parts, body) = req.into_parts();
    let path = parts.uri.path();
    API_REQUESTS.with_label_values(&[route_label(path)]).inc();

    let result = match read_body(&parts.headers, body).await {
        Ok(bytes) => route(&market, &parts.method, path, &bytes),
        Err(e) => Err(e),
    };
    let resp = match result {
        Ok(v) => json_response(StatusCode::OK, &v),
        Err(e) => json_response(e.status(), &json!({ "success": false, "error": e.to_string() })),
    };
    Ok(resp)
}

pub async fn serve(market: Arc<Market>, port: u16, mut shutdown: watch::Receiver<bool>) {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let make_svc = make_service_fn(move |_conn| {
        let market = Arc::clone(&market);
        async move {
            Ok::<_, Infallible>(service_fn(move |req| handle(Arc::clone(&market), req)))
        }
    });
    let server = match Server::try_bind(&addr) {
        Ok(b) => b.serve(make_svc),
        Err(e) => {
            error!(?e, %addr, "api bind failed");
            return;
        }
    };
    info!(%addr, "api listening");
    let graceful = server.with_graceful_shutdown(async move {
        let _ = shutdown.wait_for(|stop| *stop).await;
    });
    if let Err(e) = graceful.await {
        error!(?e, "api server error");
    }
}
