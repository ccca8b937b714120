// ===============================
// src/noise.rs
// ===============================
//
// Simulated external order flow: random buy/sell every `interval_ms`, size
// uniform in (0, max_fraction * reserve_a]. Goes through the same executor
// path as API trades, so it interleaves with the peg controller.
//
use std::sync::Arc;

use rand::Rng;
use tokio::{
    sync::watch,
    time::{interval, Duration, MissedTickBehavior},
};
use tracing::{debug, info};

use crate::config::NoiseCfg;
use crate::domain::{Origin, Side};
use crate::market::Market;
use crate::metrics::NOISE_TRADES;

/// Draws one random trade against the current reserve of A.
pub fn draw<R: Rng>(rng: &mut R, reserve_a: f64, max_fraction: f64) -> Option<(Side, f64)> {
    if max_fraction.is_nan() || max_fraction <= 0.0 {
        return None;
    }
    let side = if rng.gen_bool(0.5) { Side::Buy } else { Side::Sell };
    let frac: f64 = rng.gen_range(0.0..max_fraction);
    let amount = reserve_a * frac;
    (amount > 0.0).then_some((side, amount))
}

pub async fn run(market: Arc<Market>, cfg: NoiseCfg, mut shutdown: watch::Receiver<bool>) {
    info!(interval_ms = cfg.interval_ms, max_fraction = cfg.max_fraction, "noise trader: started");
    let mut tick = interval(Duration::from_millis(cfg.interval_ms));
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = tick.tick() => {
                let reserve_a = market.reserves().reserve_a();
                // jangan simpan ThreadRng melewati .await
                let drawn = {
                    let mut rng = rand::thread_rng();
                    draw(&mut rng, reserve_a, cfg.max_fraction)
                };
                let Some((side, amount)) = drawn else { continue };
                match market.execute_trade(side, amount, Origin::Noise) {
                    Ok(price) => {
                        NOISE_TRADES.inc();
                        debug!(side = side.as_str(), amount, price, "noise trade");
                    }
                    Err(e) => debug!(error = %e, "noise trade rejected"),
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("noise trader: stopped");
                    break;
                }
            }
        }
    }
}
