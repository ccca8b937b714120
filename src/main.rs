// ===============================
// src/main.rs
// ===============================
/*
 cd /home/kukuhtw/rust/amm_sim_rust

# snapshot pool
curl -s localhost:5000/api/market_data | jq '{current_price, token_a_reserve, token_b_reserve}'

# trade & peg
curl -s -XPOST localhost:5000/api/execute_trade -d '{"direction":"buy","amount":10000}'
curl -s -XPOST localhost:5000/api/set_target_price -d '{"price":1.05}'

# metrics
curl -s localhost:9898/metrics | egrep '^(pool_price|peg_armed|trades_total)'

*/
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
mod domain;
mod config;
mod metrics;
mod recorder;
mod ledger;     // reserves + x*y=k
mod candles;    // OHLCV bucket aggregation
mod peg;        // proportional target-price controller
mod market;     // shared state + trade executor
mod driver;     // 1 Hz tick loop
mod noise;      // optional simulated external flow
mod api;        // JSON HTTP adapter

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::{
    select,
    sync::{mpsc, watch},
    time::{interval, Duration},
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::domain::Event;
use crate::market::Market;
use crate::peg::PegController;

const HEARTBEAT_SECS: u64 = 10;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = config::Cli::parse();

    // ---- Load config (.env dulu supaya RUST_LOG dari .env ikut terbaca) ----
    let (args, peg_params) = config::load(&cli);

    // ---- Logging ----
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // ---- Metrics ----
    metrics::init();
    metrics::CONFIG_TICK_MS.set(args.tick_interval_ms as i64);
    metrics::CONFIG_CANDLE_SECS.set(args.candle_interval_secs);
    metrics::CONFIG_PEG.with_label_values(&["gain"]).set(peg_params.gain);
    metrics::CONFIG_PEG.with_label_values(&["epsilon"]).set(peg_params.epsilon);

    info!(
        api_port = args.api_port,
        metrics_port = args.metrics_port,
        seed_a = args.seed_reserve_a,
        seed_b = args.seed_reserve_b,
        tick_ms = args.tick_interval_ms,
        candle_secs = args.candle_interval_secs,
        history_limit = args.history_limit,
        peg_gain = peg_params.gain,
        peg_epsilon = peg_params.epsilon,
        record_file = ?args.record_file,
        noise = ?args.noise,
        "startup config"
    );

    // ---- Market (satu-satunya pemilik state) ----
    let controller = PegController::new(peg_params.gain, peg_params.epsilon);
    let market = match Market::new(
        args.seed_reserve_a,
        args.seed_reserve_b,
        args.candle_interval_secs,
        args.history_limit,
        controller,
    ) {
        Ok(m) => m,
        Err(e) => {
            error!(error = %e, seed_a = args.seed_reserve_a, seed_b = args.seed_reserve_b, "invalid seed reserves");
            return ExitCode::FAILURE;
        }
    };

    // ---- Recorder (optional) ----
    let mut recorder_task = None;
    let market = match args.record_file.clone() {
        Some(path) => {
            let (rec_tx, rec_rx) = mpsc::channel::<Event>(8192);
            recorder_task = Some(tokio::spawn(recorder::run(rec_rx, path)));
            market.with_journal(rec_tx)
        }
        None => market,
    };
    let market = Arc::new(market);

    // ---- Shutdown signal ----
    let (stop_tx, stop_rx) = watch::channel(false);

    let metrics_task = tokio::spawn(metrics::serve_metrics(args.metrics_port, stop_rx.clone()));
    let api_task = tokio::spawn(api::serve(Arc::clone(&market), args.api_port, stop_rx.clone()));
    let driver_task = tokio::spawn(driver::run(
        Arc::clone(&market),
        Duration::from_millis(args.tick_interval_ms),
        stop_rx.clone(),
    ));
    let noise_task = args
        .noise
        .clone()
        .map(|cfg| tokio::spawn(noise::run(Arc::clone(&market), cfg, stop_rx.clone())));

    // ---- Heartbeat sampai Ctrl-C ----
    let mut heartbeat = interval(Duration::from_secs(HEARTBEAT_SECS));
    loop {
        select! {
            _ = heartbeat.tick() => {
                let snap = market.snapshot();
                info!(
                    price = snap.price,
                    reserve_a = snap.reserve_a,
                    reserve_b = snap.reserve_b,
                    candles = snap.history.len(),
                    peg_target = ?snap.peg_target,
                    "heartbeat"
                );
            }
            res = tokio::signal::ctrl_c() => {
                if let Err(e) = res {
                    error!(?e, "ctrl_c listener failed, shutting down");
                }
                break;
            }
        }
    }

    info!("shutdown requested");
    let _ = stop_tx.send(true);
    let _ = driver_task.await;
    if let Some(t) = noise_task {
        let _ = t.await;
    }
    let _ = api_task.await;
    let _ = metrics_task.await;

    // journal sender terakhir ada di Market; drop supaya recorder flush & selesai
    drop(market);
    if let Some(t) = recorder_task {
        let _ = tokio::time::timeout(Duration::from_secs(2), t).await;
    }
    info!("bye");
    ExitCode::SUCCESS
}
