// ===============================
// src/driver.rs (tick driver)
// ===============================
//
// Loop periodik (~1 Hz) untuk seluruh umur proses. Setiap siklus, berurutan:
//   1) rollover candle
//   2) satu langkah peg controller
// Berhenti saat `shutdown` bernilai true; tidak ada state yang perlu di-flush.
//
use std::sync::Arc;

use tokio::{
    sync::watch,
    time::{interval, Duration, MissedTickBehavior},
};
use tracing::{debug, info, trace, warn};

use crate::market::{now_secs, Market};
use crate::peg::PegOutcome;

/// Runs one driver cycle at `now`.
pub fn cycle(market: &Market, now: i64) -> PegOutcome {
    market.on_tick_at(now);
    let outcome = market.peg_tick_at(now);
    match outcome {
        PegOutcome::Adjusted { side, amount, price } => {
            debug!(side = side.as_str(), amount, price, "peg adjusted");
        }
        // ditelan di sini: peg tetap armed, dicoba lagi tick berikutnya
        PegOutcome::Failed { side, amount, error } => {
            warn!(side = side.as_str(), amount, code = error.code(), "peg step failed, retry next tick");
        }
        PegOutcome::Settled { diff } => trace!(diff, "peg inside dead band"),
        PegOutcome::Disarmed => {}
    }
    outcome
}

pub async fn run(market: Arc<Market>, period: Duration, mut shutdown: watch::Receiver<bool>) {
    info!(period_ms = period.as_millis() as u64, "tick driver: started");
    let mut tick = interval(period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = tick.tick() => {
                cycle(&market, now_secs());
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("tick driver: stopped");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Origin, Side};
    use crate::peg::PegController;

    const T0: i64 = 1_700_000_040;

    fn market() -> Market {
        Market::new(1_000_000.0, 1_000_000.0, 60, 100, PegController::default()).unwrap()
    }

    #[test]
    fn cycle_rolls_candles_before_peg_step() {
        let m = market();
        m.execute_trade_at(Side::Sell, 5_000.0, Origin::Api, T0).unwrap();
        m.set_target(1.0).unwrap();
        let outcome = cycle(&m, T0 + 60);
        assert!(matches!(outcome, PegOutcome::Adjusted { side: Side::Buy, .. }));
        let snap = m.snapshot();
        assert_eq!(snap.history.len(), 1);
        assert_eq!(snap.history[0].volume, 5_000.0);
        // peg trade landed in the fresh bucket
        let open = snap.open_candle.unwrap();
        assert_eq!(open.bucket_start, T0 + 60);
        assert!(open.volume > 0.0);
    }

    #[test]
    fn failed_peg_step_does_not_stop_cycles() {
        let m = Market::new(10.0, 10.0, 60, 100, PegController::new(1.0, 1e-4)).unwrap();
        m.set_target(100.0).unwrap();
        for i in 0..3 {
            assert!(matches!(cycle(&m, T0 + i), PegOutcome::Failed { .. }));
        }
        assert!(m.snapshot().peg_enabled);
    }

    #[tokio::test]
    async fn run_drives_peg_and_stops_on_shutdown() {
        let m = Arc::new(market());
        m.set_target(1.02).unwrap();
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(run(Arc::clone(&m), Duration::from_millis(5), rx));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(m.snapshot().price > 1.0);

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
    }
}
