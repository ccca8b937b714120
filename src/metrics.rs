// ===============================
// src/metrics.rs
// ===============================
use std::convert::Infallible;
use std::net::SocketAddr;

use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server};
use once_cell::sync::Lazy;
use prometheus::{
    Encoder, Gauge, GaugeVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use tokio::sync::watch;
use tracing::{error, info};

use crate::ledger::ReserveState;
use crate::peg::PegConfig;

// Single custom registry (we register everything here)
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

// -------- Pool --------
pub static TRADES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("trades_total", "committed swaps (labels: side, origin)"),
        &["side", "origin"],
    )
    .unwrap()
});

pub static TRADE_REJECTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("trade_rejects_total", "rejected swaps (labels: reason, origin)"),
        &["reason", "origin"],
    )
    .unwrap()
});

pub static LIQUIDITY_OPS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(Opts::new("liquidity_ops_total", "liquidity changes"), &["kind"]).unwrap()
});

pub static POOL_PRICE: Lazy<Gauge> =
    Lazy::new(|| Gauge::new("pool_price", "reserve_b / reserve_a").unwrap());

pub static POOL_RESERVE: Lazy<GaugeVec> = Lazy::new(|| {
    GaugeVec::new(Opts::new("pool_reserve", "reserve per token"), &["token"]).unwrap()
});

pub static POOL_K: Lazy<Gauge> =
    Lazy::new(|| Gauge::new("pool_k", "constant product").unwrap());

// -------- Candles --------
pub static CANDLES_SEALED: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("candles_sealed_total", "sealed OHLCV buckets").unwrap());

pub static CANDLE_HISTORY_LEN: Lazy<IntGauge> =
    Lazy::new(|| IntGauge::new("candle_history_len", "sealed candles kept in memory").unwrap());

// -------- Peg --------
pub static PEG_ARMED: Lazy<IntGauge> =
    Lazy::new(|| IntGauge::new("peg_armed", "1 if a target price is set").unwrap());

pub static PEG_TARGET: Lazy<Gauge> =
    Lazy::new(|| Gauge::new("peg_target_price", "target price (0 when disarmed)").unwrap());

pub static PEG_ADJUSTMENTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(Opts::new("peg_adjustments_total", "controller trades"), &["side"]).unwrap()
});

// -------- Adapters --------
pub static API_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(Opts::new("api_requests_total", "HTTP API requests"), &["route"]).unwrap()
});

pub static NOISE_TRADES: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("noise_trades_total", "simulated external trades").unwrap());

// ---- Config visibility ----
pub static CONFIG_TICK_MS: Lazy<IntGauge> =
    Lazy::new(|| IntGauge::new("config_tick_interval_ms", "tick driver period").unwrap());

pub static CONFIG_CANDLE_SECS: Lazy<IntGauge> =
    Lazy::new(|| IntGauge::new("config_candle_interval_secs", "candle bucket width").unwrap());

pub static CONFIG_PEG: Lazy<GaugeVec> = Lazy::new(|| {
    GaugeVec::new(Opts::new("config_peg", "controller tuning (label: param)"), &["param"]).unwrap()
});

pub fn init() {
    for m in [
        REGISTRY.register(Box::new(TRADES.clone())),
        REGISTRY.register(Box::new(TRADE_REJECTS.clone())),
        REGISTRY.register(Box::new(LIQUIDITY_OPS.clone())),
        REGISTRY.register(Box::new(POOL_PRICE.clone())),
        REGISTRY.register(Box::new(POOL_RESERVE.clone())),
        REGISTRY.register(Box::new(POOL_K.clone())),
        REGISTRY.register(Box::new(CANDLES_SEALED.clone())),
        REGISTRY.register(Box::new(CANDLE_HISTORY_LEN.clone())),
        REGISTRY.register(Box::new(PEG_ARMED.clone())),
        REGISTRY.register(Box::new(PEG_TARGET.clone())),
        REGISTRY.register(Box::new(PEG_ADJUSTMENTS.clone())),
        REGISTRY.register(Box::new(API_REQUESTS.clone())),
        REGISTRY.register(Box::new(NOISE_TRADES.clone())),
        REGISTRY.register(Box::new(CONFIG_TICK_MS.clone())),
        REGISTRY.register(Box::new(CONFIG_CANDLE_SECS.clone())),
        REGISTRY.register(Box::new(CONFIG_PEG.clone())),
    ] {
        // double init (tests) only reports AlreadyReg
        let _ = m;
    }
}

pub fn observe_pool(r: &ReserveState) {
    POOL_PRICE.set(r.price());
    POOL_RESERVE.with_label_values(&["a"]).set(r.reserve_a());
    POOL_RESERVE.with_label_values(&["b"]).set(r.reserve_b());
    POOL_K.set(r.k());
}

// (armed, target); target 0 when disarmed
fn peg_gauge_values(peg: &PegConfig) -> (i64, f64) {
    match peg.target() {
        Some(t) => (1, t),
        None => (0, 0.0),
    }
}

pub fn observe_peg(peg: &PegConfig) {
    let (armed, target) = peg_gauge_values(peg);
    PEG_ARMED.set(armed);
    PEG_TARGET.set(target);
}

// Encode all metrics in Prometheus text format
pub fn encode_metrics() -> Vec<u8> {
    let encoder = TextEncoder::new();
    let families = REGISTRY.gather();
    let mut buf = Vec::new();
    if encoder.encode(&families, &mut buf).is_err() || buf.is_empty() {
        buf.extend_from_slice(b"# no metrics\n");
    }
    buf
}

async fn handle(_req: Request<Body>) -> Result<Response<Body>, Infallible> {
    let resp = Response::builder()
        .header("Content-Type", "text/plain; version=0.0.4; charset=utf-8")
        .body(Body::from(encode_metrics()))
        .unwrap_or_else(|_| Response::new(Body::empty()));
    Ok(resp)
}

/// Serves every path (`/`, `/metrics`) with the registry dump until shutdown flips.
pub async fn serve_metrics(port: u16, mut shutdown: watch::Receiver<bool>) {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let server = match Server::try_bind(&addr) {
        Ok(b) => b.serve(make_service_fn(|_| async { Ok::<_, Infallible>(service_fn(handle)) })),
        Err(e) => {
            error!(?e, %addr, "metrics bind failed");
            return;
        }
    };
    info!(%addr, "metrics listening (/ and /metrics)");
    let graceful = server.with_graceful_shutdown(async move {
        let _ = shutdown.wait_for(|stop| *stop).await;
    });
    if let Err(e) = graceful.await {
        error!(?e, "metrics server error");
    }
}
