// ===============================
// src/candles.rs (OHLCV aggregation)
// ===============================
//
// Satu candle "open" yang bisa dimutasi + history candle yang sudah di-seal.
// - on_sample : fold trade (price, volume) ke candle open (buat baru kalau belum ada);
//               trade di bucket yang lebih baru me-roll candle lama dulu
// - on_tick   : seal candle kalau bucket-nya sudah lewat, lalu buka bucket baru
//               di harga sekarang dengan volume 0 (walau tidak ada trade)
// - history dibatasi `limit` candle terakhir, yang tertua dibuang duluan (FIFO)
//
use std::collections::VecDeque;

use crate::domain::Candle;

// preallocation cap; larger limits grow on demand
const PREALLOC_CANDLES: usize = 1024;

pub struct CandleBook {
    interval_secs: i64,
    limit: usize,
    open: Option<Candle>,
    history: VecDeque<Candle>,
}

impl Candle {
    fn flat(bucket_start: i64, price: f64) -> Self {
        Self { bucket_start, open: price, high: price, low: price, close: price, volume: 0.0 }
    }

    fn fold(&mut self, price: f64, volume: f64) {
        self.high = self.high.max(price);
        self.low = self.low.min(price);
        self.close = price;
        self.volume += volume;
    }
}

impl CandleBook {
    pub fn new(interval_secs: i64, limit: usize) -> Self {
        Self {
            interval_secs: interval_secs.max(1),
            limit: limit.max(1),
            open: None,
            history: VecDeque::with_capacity(limit.clamp(1, PREALLOC_CANDLES)),
        }
    }

    /// Start of the bucket containing `ts` (epoch seconds).
    pub fn bucket_of(&self, ts: i64) -> i64 {
        ts - ts.rem_euclid(self.interval_secs)
    }

    pub fn open_candle(&self) -> Option<&Candle> { self.open.as_ref() }

    /// Sealed candles, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &Candle> + '_ { self.history.iter() }

    pub fn history_len(&self) -> usize { self.history.len() }

    /// Folds one trade into the bucket of `now`. If that bucket is newer than
    /// the open candle, the open candle is rolled over first at `prev_price`
    /// (the price before this trade). Returns the candles sealed by the rollover.
    pub fn on_sample(&mut self, now: i64, prev_price: f64, price: f64, volume: f64) -> Vec<Candle> {
        let bucket = self.bucket_of(now);
        let sealed = match self.open {
            Some(open) if bucket > open.bucket_start => self.on_tick(now, prev_price),
            _ => Vec::new(),
        };
        let candle = self.open.get_or_insert_with(|| Candle::flat(bucket, price));
        candle.fold(price, volume);
        sealed
    }

    /// Rolls the open candle over once its bucket has elapsed. Returns the
    /// candles sealed by this call, oldest first. Buckets skipped entirely
    /// (no tick landed in them) are sealed as flat zero-volume candles.
    pub fn on_tick(&mut self, now: i64, price: f64) -> Vec<Candle> {
        let Some(open) = self.open else { return Vec::new() };
        if now - open.bucket_start < self.interval_secs {
            return Vec::new();
        }

        let mut sealed = vec![open];
        let current = self.bucket_of(now);
        let first_gap = open.bucket_start + self.interval_secs;
        // older gap buckets would be evicted right away
        let span = i64::try_from(self.limit).unwrap_or(i64::MAX).saturating_mul(self.interval_secs);
        let earliest_kept = current.saturating_sub(span);
        let mut bucket = first_gap.max(earliest_kept);
        while bucket < current {
            sealed.push(Candle::flat(bucket, price));
            bucket += self.interval_secs;
        }

        for c in &sealed {
            self.seal(*c);
        }
        self.open = Some(Candle::flat(current, price));
        sealed
    }

    fn seal(&mut self, candle: Candle) {
        self.history.push_back(candle);
        while self.history.len() > self.limit {
            self.history.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: i64 = 1_700_000_040; // minute aligned

    fn bounded(c: &Candle) -> bool {
        c.low <= c.open && c.low <= c.close && c.high >= c.open && c.high >= c.close
    }

    #[test]
    fn first_sample_opens_candle_at_bucket_start() {
        let mut book = CandleBook::new(60, 100);
        assert!(book.open_candle().is_none());
        book.on_sample(T0 + 17, 1.5, 1.5, 10.0);
        let c = book.open_candle().unwrap();
        assert_eq!(c.bucket_start, T0);
        assert_eq!((c.open, c.high, c.low, c.close, c.volume), (1.5, 1.5, 1.5, 1.5, 10.0));
    }

    #[test]
    fn samples_keep_ohlc_bounds_and_accumulate_volume() {
        let mut book = CandleBook::new(60, 100);
        let prices = [1.0, 1.3, 0.7, 1.1, 0.95, 1.4, 1.2];
        let mut last_volume = 0.0;
        for (i, px) in prices.iter().enumerate() {
            book.on_sample(T0 + i as i64, *px, *px, 2.0);
            let c = book.open_candle().unwrap();
            assert!(bounded(c), "{c:?}");
            assert!(c.volume >= last_volume);
            last_volume = c.volume;
        }
        let c = book.open_candle().unwrap();
        assert_eq!(c.open, 1.0);
        assert_eq!(c.high, 1.4);
        assert_eq!(c.low, 0.7);
        assert_eq!(c.close, 1.2);
        assert_eq!(c.volume, 14.0);
    }

    #[test]
    fn tick_without_open_candle_is_noop() {
        let mut book = CandleBook::new(60, 100);
        assert!(book.on_tick(T0 + 600, 1.0).is_empty());
        assert!(book.open_candle().is_none());
        assert_eq!(book.history_len(), 0);
    }

    #[test]
    fn tick_inside_bucket_does_not_seal() {
        let mut book = CandleBook::new(60, 100);
        book.on_sample(T0 + 5, 1.0, 1.0, 1.0);
        assert!(book.on_tick(T0 + 59, 1.0).is_empty());
        assert_eq!(book.history_len(), 0);
    }

    #[test]
    fn rollover_seals_and_seeds_next_bucket_at_current_price() {
        let mut book = CandleBook::new(60, 100);
        book.on_sample(T0 + 5, 1.0, 1.0, 3.0);
        book.on_sample(T0 + 30, 1.2, 1.2, 4.0);
        let sealed = book.on_tick(T0 + 61, 1.25);
        assert_eq!(sealed.len(), 1);
        assert_eq!(sealed[0].close, 1.2);
        assert_eq!(sealed[0].volume, 7.0);

        let next = book.open_candle().unwrap();
        assert_eq!(next.bucket_start, T0 + 60);
        assert_eq!((next.open, next.close, next.volume), (1.25, 1.25, 0.0));

        // a quiet minute still produces exactly one sealed candle
        let sealed = book.on_tick(T0 + 120, 1.25);
        assert_eq!(sealed.len(), 1);
        assert_eq!(sealed[0].volume, 0.0);
        assert!(book.on_tick(T0 + 121, 1.25).is_empty());
        assert_eq!(book.history_len(), 2);
    }

    #[test]
    fn skipped_buckets_are_filled_flat() {
        let mut book = CandleBook::new(60, 100);
        book.on_sample(T0, 2.0, 2.0, 1.0);
        let sealed = book.on_tick(T0 + 60 * 4 + 10, 2.5);
        let starts: Vec<i64> = sealed.iter().map(|c| c.bucket_start).collect();
        assert_eq!(starts, vec![T0, T0 + 60, T0 + 120, T0 + 180]);
        assert!(sealed[1..].iter().all(|c| c.volume == 0.0 && c.open == 2.5));
        assert_eq!(book.open_candle().unwrap().bucket_start, T0 + 240);
    }

    #[test]
    fn history_keeps_most_recent_limit_in_order() {
        let mut book = CandleBook::new(60, 100);
        book.on_sample(T0, 1.0, 1.0, 1.0);
        for i in 1..=130 {
            book.on_sample(T0 + i * 60 - 1, 1.0 + i as f64 / 1000.0, 1.0 + i as f64 / 1000.0, 1.0);
            book.on_tick(T0 + i * 60, 1.0);
        }
        assert_eq!(book.history_len(), 100);
        let starts: Vec<i64> = book.history().map(|c| c.bucket_start).collect();
        let expected: Vec<i64> = (30..130).map(|i| T0 + i * 60).collect();
        assert_eq!(starts, expected);
    }

    #[test]
    fn sample_in_newer_bucket_rolls_over_first() {
        let mut book = CandleBook::new(60, 100);
        book.on_sample(T0 + 5, 1.0, 1.1, 1_000.0);
        // no tick between the two trades
        let sealed = book.on_sample(T0 + 60, 1.1, 1.3, 2_000.0);
        assert_eq!(sealed.len(), 1);
        assert_eq!(sealed[0].bucket_start, T0);
        assert_eq!(sealed[0].volume, 1_000.0);
        assert_eq!(sealed[0].close, 1.1);

        let open = book.open_candle().unwrap();
        assert_eq!(open.bucket_start, T0 + 60);
        assert_eq!((open.open, open.low, open.high, open.close), (1.1, 1.1, 1.3, 1.3));
        assert_eq!(open.volume, 2_000.0);

        // the driver tick for that minute has nothing left to seal
        assert!(book.on_tick(T0 + 61, 1.3).is_empty());
        assert_eq!(book.history_len(), 1);
    }

    #[test]
    fn huge_limit_does_not_overflow() {
        let mut book = CandleBook::new(60, usize::MAX);
        book.on_sample(T0, 1.0, 1.0, 1.0);
        let sealed = book.on_tick(T0 + 600, 1.0);
        assert_eq!(sealed.len(), 10);
        assert_eq!(book.history_len(), 10);
    }

    #[test]
    fn long_gap_is_capped_by_limit() {
        let mut book = CandleBook::new(60, 5);
        book.on_sample(T0, 1.0, 1.0, 1.0);
        book.on_tick(T0 + 60 * 1_000, 1.0);
        assert_eq!(book.history_len(), 5);
        let last = book.history().last().unwrap().bucket_start;
        assert_eq!(last, T0 + 60 * 999);
    }
}
