// ===============================
// src/config.rs
// ===============================
/*
=============================================================================
Project : amm_sim_rust — constant-product AMM simulator in Rust
Module  : <module_name>.rs
Version : 0.1.0
Author  : Kukuh Tripamungkas Wicaksono (Kukuh TW)
Email   : kukuhtw@gmail.com
WhatsApp: https://wa.me/628129893706
LinkedIn: https://id.linkedin.com/in/kukuhtw
License : MIT (see LICENSE)

Summary : Simulates a single-pair x*y=k pool, folds trades into 1-minute
          OHLCV candles, pegs the price to an operator target with a
          proportional controller, exposes a JSON API + Prometheus metrics,
          and optionally records JSONL events.

(c) 2025 Kukuh TW. All rights reserved where applicable.
=============================================================================
*/
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use clap::Parser;

/// Command-line flags. Semua parameter lain dibaca dari ENV / .env.
#[derive(Parser, Debug, Clone)]
#[command(name = "amm_sim_rust", version, about = "Constant-product AMM simulator")]
pub struct Cli {
    /// Path ke file .env (default: ./.env kalau ada)
    #[arg(long)]
    pub env_file: Option<PathBuf>,

    /// tracing filter directive, RUST_LOG menang kalau di-set
    #[arg(long, default_value = "info")]
    pub log: String,
}

#[derive(Clone, Debug)]
pub struct Args {
    // ports
    pub api_port: u16,
    pub metrics_port: u16,

    // pool
    pub seed_reserve_a: f64,
    pub seed_reserve_b: f64,

    // driver / candles
    pub tick_interval_ms: u64,
    pub candle_interval_secs: i64,
    pub history_limit: usize,

    // files
    pub record_file: Option<String>,

    // simulated external flow
    pub noise: Option<NoiseCfg>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PegParams {
    pub gain: f64,
    pub epsilon: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NoiseCfg {
    pub interval_ms: u64,
    pub max_fraction: f64,
}

fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|s| s.trim().parse().ok()).unwrap_or(default)
}

fn flag(key: &str) -> bool {
    matches!(
        env::var(key).unwrap_or_default().trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Loads `.env` (explicit path or default lookup) then reads every setting.
pub fn load(cli: &Cli) -> (Args, PegParams) {
    // .env tidak wajib ada
    let _ = match &cli.env_file {
        Some(path) => dotenvy::from_path(path),
        None => dotenvy::dotenv().map(|_| ()),
    };
    from_env()
}

// batas atas history candle yang disimpan di memori
pub const MAX_HISTORY_LIMIT: usize = 10_000;

pub fn from_env() -> (Args, PegParams) {
    let api_port = parse_or("API_PORT", 5000);
    let metrics_port = parse_or("METRICS_PORT", 9898);

    let seed_reserve_a = parse_or("SEED_RESERVE_A", 1_000_000.0);
    let seed_reserve_b = parse_or("SEED_RESERVE_B", 1_000_000.0);

    let tick_interval_ms = parse_or("TICK_INTERVAL_MS", 1000u64).max(1);
    let candle_interval_secs = parse_or("CANDLE_INTERVAL_SECS", 60i64).max(1);
    let history_limit = parse_or("HISTORY_LIMIT", 100usize).clamp(1, MAX_HISTORY_LIMIT);

    let record_file = env::var("RECORD_FILE").ok().filter(|s| !s.trim().is_empty());

    let noise = flag("NOISE_TRADER").then(|| NoiseCfg {
        interval_ms: parse_or("NOISE_INTERVAL_MS", 500u64).max(1),
        max_fraction: parse_or("NOISE_MAX_FRACTION", 0.002f64).clamp(0.0, 0.5),
    });

    let args = Args {
        api_port,
        metrics_port,
        seed_reserve_a,
        seed_reserve_b,
        tick_interval_ms,
        candle_interval_secs,
        history_limit,
        record_file,
        noise,
    };

    // ===== Peg tuning =====
    let gain = parse_or("PEG_GAIN", 0.01f64);
    let epsilon = parse_or("PEG_EPSILON", 1e-4f64);
    let peg = PegParams {
        gain: if gain.is_finite() && gain > 0.0 { gain } else { 0.01 },
        epsilon: if epsilon.is_finite() && epsilon >= 0.0 { epsilon } else { 1e-4 },
    };

    (args, peg)
}
