// ===============================
// src/market.rs (shared state + trade executor)
// ===============================
//
// Semua state (reserves, candle open + history, peg config) ada di satu Mutex.
// Setiap operasi: validasi -> mutasi -> gauge (masih di dalam lock, supaya
// urutan gauge = urutan commit) -> lepas lock -> counter/journal.
// Operasi gagal tidak mengubah apa pun (all-or-nothing).
//
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::candles::CandleBook;
use crate::domain::{
    Candle, Event, LiquidityChange, LiquidityKind, MarketSnapshot, Origin, PegChange, Side, TradeFill,
};
use crate::ledger::{ExecError, ReserveState};
use crate::metrics;
use crate::peg::{PegConfig, PegController, PegOutcome};

pub fn now_secs() -> i64 {
    Utc::now().timestamp()
}

struct MarketState {
    reserves: ReserveState,
    candles: CandleBook,
    peg: PegConfig,
}

pub struct Market {
    state: Mutex<MarketState>,
    controller: PegController,
    journal: Option<mpsc::Sender<Event>>,
}

impl Market {
    pub fn new(
        seed_a: f64,
        seed_b: f64,
        candle_interval_secs: i64,
        history_limit: usize,
        controller: PegController,
    ) -> Result<Self, ExecError> {
        let reserves = ReserveState::new(seed_a, seed_b)?;
        metrics::observe_pool(&reserves);
        Ok(Self {
            state: Mutex::new(MarketState {
                reserves,
                candles: CandleBook::new(candle_interval_secs, history_limit),
                peg: PegConfig::default(),
            }),
            controller,
            journal: None,
        })
    }

    pub fn with_journal(mut self, tx: mpsc::Sender<Event>) -> Self {
        self.journal = Some(tx);
        self
    }

    // commits are plain field assignments, so a poisoned guard still holds a consistent state
    fn lock(&self) -> MutexGuard<'_, MarketState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, ev: Event) {
        if let Some(tx) = &self.journal {
            let _ = tx.try_send(ev);
        }
    }

    pub fn reserves(&self) -> ReserveState {
        self.lock().reserves
    }

    pub fn snapshot(&self) -> MarketSnapshot {
        let st = self.lock();
        MarketSnapshot {
            price: st.reserves.price(),
            reserve_a: st.reserves.reserve_a(),
            reserve_b: st.reserves.reserve_b(),
            k: st.reserves.k(),
            open_candle: st.candles.open_candle().copied(),
            history: st.candles.history().copied().collect(),
            peg_target: st.peg.target(),
            peg_enabled: st.peg.enabled(),
        }
    }

    pub fn execute_trade(&self, side: Side, amount: f64, origin: Origin) -> Result<f64, ExecError> {
        self.execute_trade_at(side, amount, origin, now_secs())
    }

    /// Swap under the constant-product rule, then fold `(price, amount)` into the open candle.
    pub fn execute_trade_at(
        &self,
        side: Side,
        amount: f64,
        origin: Origin,
        now: i64,
    ) -> Result<f64, ExecError> {
        let mut st = self.lock();
        let result = apply_trade(&mut st, side, amount, now);
        let reserves = st.reserves;
        drop(st);
        self.finish_trade(result, side, amount, origin, now, &reserves)
    }

    fn finish_trade(
        &self,
        result: Result<(f64, Vec<Candle>), ExecError>,
        side: Side,
        amount: f64,
        origin: Origin,
        now: i64,
        reserves: &ReserveState,
    ) -> Result<f64, ExecError> {
        let (price, sealed) = match result {
            Ok(r) => r,
            Err(e) => {
                metrics::TRADE_REJECTS.with_label_values(&[e.code(), origin.as_str()]).inc();
                return Err(e);
            }
        };
        self.publish_sealed(&sealed);
        metrics::TRADES.with_label_values(&[side.as_str(), origin.as_str()]).inc();
        debug!(side = side.as_str(), origin = origin.as_str(), amount, price, "trade executed");
        self.record(Event::Trade(TradeFill {
            ts: now,
            origin,
            side,
            amount,
            price,
            reserve_a: reserves.reserve_a(),
            reserve_b: reserves.reserve_b(),
        }));
        Ok(price)
    }

    /// Deposits both assets. Price moves only if the deposit is not proportional.
    pub fn add_liquidity(&self, delta_a: f64, delta_b: f64) -> Result<(), ExecError> {
        let valid = |x: f64| x.is_finite() && x >= 0.0;
        if !valid(delta_a) || !valid(delta_b) || (delta_a == 0.0 && delta_b == 0.0) {
            return Err(ExecError::InvalidAmount);
        }
        self.rescale(LiquidityKind::Add, |r| (r.reserve_a() + delta_a, r.reserve_b() + delta_b))
    }

    /// Withdraws `pct` percent of both reserves.
    pub fn remove_liquidity(&self, pct: f64) -> Result<(), ExecError> {
        if !(pct > 0.0 && pct <= 100.0) {
            return Err(ExecError::InvalidPercentage);
        }
        let frac = pct / 100.0;
        self.rescale(LiquidityKind::Remove, |r| {
            (r.reserve_a() - r.reserve_a() * frac, r.reserve_b() - r.reserve_b() * frac)
        })
    }

    // liquidity changes leave the open candle alone
    fn rescale(
        &self,
        kind: LiquidityKind,
        f: impl FnOnce(&ReserveState) -> (f64, f64),
    ) -> Result<(), ExecError> {
        let mut st = self.lock();
        let (a, b) = f(&st.reserves);
        st.reserves.set_reserves(a, b)?;
        metrics::observe_pool(&st.reserves);
        let reserves = st.reserves;
        drop(st);

        let kind_str = match kind { LiquidityKind::Add => "add", LiquidityKind::Remove => "remove" };
        metrics::LIQUIDITY_OPS.with_label_values(&[kind_str]).inc();
        info!(kind = kind_str, reserve_a = a, reserve_b = b, k = reserves.k(), "liquidity changed");
        self.record(Event::Liquidity(LiquidityChange {
            ts: now_secs(),
            kind,
            reserve_a: a,
            reserve_b: b,
            k: reserves.k(),
        }));
        Ok(())
    }

    pub fn set_target(&self, target: f64) -> Result<(), ExecError> {
        let mut st = self.lock();
        st.peg.arm(target)?;
        metrics::observe_peg(&st.peg);
        drop(st);
        info!(target, "peg armed");
        self.record(Event::Peg(PegChange::Armed { target }));
        Ok(())
    }

    pub fn clear_target(&self) {
        let mut st = self.lock();
        st.peg.disarm();
        metrics::observe_peg(&st.peg);
        drop(st);
        info!("peg disarmed");
        self.record(Event::Peg(PegChange::Disarmed));
    }

    /// Candle rollover for the tick driver.
    pub fn on_tick_at(&self, now: i64) -> Vec<Candle> {
        let mut st = self.lock();
        let price = st.reserves.price();
        let sealed = st.candles.on_tick(now, price);
        if !sealed.is_empty() {
            metrics::CANDLE_HISTORY_LEN.set(st.candles.history_len() as i64);
        }
        drop(st);

        self.publish_sealed(&sealed);
        sealed
    }

    fn publish_sealed(&self, sealed: &[Candle]) {
        if sealed.is_empty() {
            return;
        }
        metrics::CANDLES_SEALED.inc_by(sealed.len() as u64);
        for c in sealed {
            debug!(time = c.bucket_start, open = c.open, close = c.close, volume = c.volume, "candle sealed");
            self.record(Event::CandleSealed(*c));
        }
    }

    /// One controller step. Plans against the live price and trades under the same lock.
    pub fn peg_tick_at(&self, now: i64) -> PegOutcome {
        let mut st = self.lock();
        let Some(target) = st.peg.target() else {
            return PegOutcome::Disarmed;
        };
        let price = st.reserves.price();
        let Some((side, amount)) = self.controller.plan(target, price, st.reserves.reserve_a()) else {
            return PegOutcome::Settled { diff: target - price };
        };
        let result = apply_trade(&mut st, side, amount, now);
        let reserves = st.reserves;
        drop(st);

        match self.finish_trade(result, side, amount, Origin::Peg, now, &reserves) {
            Ok(price) => {
                metrics::PEG_ADJUSTMENTS.with_label_values(&[side.as_str()]).inc();
                PegOutcome::Adjusted { side, amount, price }
            }
            Err(error) => PegOutcome::Failed { side, amount, error },
        }
    }
}

// swap + candle fold; also rolls the candle if `now` is past its bucket.
// Pool/history gauges are set here so they follow commit order.
fn apply_trade(
    st: &mut MarketState,
    side: Side,
    amount: f64,
    now: i64,
) -> Result<(f64, Vec<Candle>), ExecError> {
    let before = st.reserves.price();
    let price = st.reserves.swap(side, amount)?;
    debug_assert!(st.reserves.invariant_holds());
    let sealed = st.candles.on_sample(now, before, price, amount);
    metrics::observe_pool(&st.reserves);
    if !sealed.is_empty() {
        metrics::CANDLE_HISTORY_LEN.set(st.candles.history_len() as i64);
    }
    Ok((price, sealed))
}
