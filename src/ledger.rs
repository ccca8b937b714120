// ===============================
// src/ledger.rs (constant-product reserves)
// ===============================
use thiserror::Error;

use crate::domain::Side;

/// Relative tolerance for `reserve_a * reserve_b == k`.
pub const INVARIANT_TOLERANCE: f64 = 1e-9;

/// Validation errors for every pool mutation. All are raised before state is touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ExecError {
    #[error("amount must be positive and keep reserves positive")]
    InvalidAmount,
    #[error("percentage must be within (0, 100]")]
    InvalidPercentage,
    #[error("operation would divide by a non-positive reserve")]
    DivisionHazard,
}

impl ExecError {
    pub fn code(&self) -> &'static str {
        match self {
            ExecError::InvalidAmount => "invalid_amount",
            ExecError::InvalidPercentage => "invalid_percentage",
            ExecError::DivisionHazard => "division_hazard",
        }
    }
}

/// Pool reserves and the product constant. Single source of truth for price.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReserveState {
    reserve_a: f64,
    reserve_b: f64,
    k: f64,
}

fn positive(x: f64) -> bool { x.is_finite() && x > 0.0 }

impl ReserveState {
    pub fn new(reserve_a: f64, reserve_b: f64) -> Result<Self, ExecError> {
        if !positive(reserve_a) || !positive(reserve_b) {
            return Err(ExecError::DivisionHazard);
        }
        let k = reserve_a * reserve_b;
        if !positive(k) {
            return Err(ExecError::DivisionHazard);
        }
        Ok(Self { reserve_a, reserve_b, k })
    }

    pub fn reserve_a(&self) -> f64 { self.reserve_a }
    pub fn reserve_b(&self) -> f64 { self.reserve_b }
    pub fn k(&self) -> f64 { self.k }

    /// Marginal price of A in B.
    pub fn price(&self) -> f64 { self.reserve_b / self.reserve_a }

    pub fn invariant_holds(&self) -> bool {
        (self.reserve_a * self.reserve_b - self.k).abs() <= INVARIANT_TOLERANCE * self.k
    }

    /// Reserves after swapping `amount` of A, without committing anything.
    pub fn quote(&self, side: Side, amount: f64) -> Result<(f64, f64), ExecError> {
        if !positive(amount) {
            return Err(ExecError::InvalidAmount);
        }
        let new_a = match side {
            // buy tidak boleh menghabiskan reserve A
            Side::Buy => {
                if amount >= self.reserve_a {
                    return Err(ExecError::InvalidAmount);
                }
                self.reserve_a - amount
            }
            Side::Sell => self.reserve_a + amount,
        };
        // float rounding can still land on zero/inf for extreme inputs
        if !positive(new_a) {
            return Err(ExecError::InvalidAmount);
        }
        let new_b = self.k / new_a;
        // price underflow to 0 / overflow to inf would poison candles
        if !positive(new_b) || !positive(new_b / new_a) {
            return Err(ExecError::InvalidAmount);
        }
        Ok((new_a, new_b))
    }

    /// Applies a swap. `k` is preserved.
    pub fn swap(&mut self, side: Side, amount: f64) -> Result<f64, ExecError> {
        let (a, b) = self.quote(side, amount)?;
        self.reserve_a = a;
        self.reserve_b = b;
        Ok(self.price())
    }

    /// Liquidity-only path: replaces both reserves and recomputes `k`.
    pub fn set_reserves(&mut self, reserve_a: f64, reserve_b: f64) -> Result<(), ExecError> {
        *self = Self::new(reserve_a, reserve_b)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool { (a - b).abs() <= 1e-9 * a.abs().max(b.abs()).max(1.0) }

    #[test]
    fn seed_price_is_one() {
        let r = ReserveState::new(1_000_000.0, 1_000_000.0).unwrap();
        assert_eq!(r.price(), 1.0);
        assert_eq!(r.k(), 1e12);
    }

    #[test]
    fn rejects_non_positive_seed() {
        assert_eq!(ReserveState::new(0.0, 10.0), Err(ExecError::DivisionHazard));
        assert_eq!(ReserveState::new(10.0, -1.0), Err(ExecError::DivisionHazard));
        assert_eq!(ReserveState::new(f64::NAN, 1.0), Err(ExecError::DivisionHazard));
    }

    #[test]
    fn buy_scenario_matches_closed_form() {
        let mut r = ReserveState::new(1_000_000.0, 1_000_000.0).unwrap();
        let px = r.swap(Side::Buy, 10_000.0).unwrap();
        assert_eq!(r.reserve_a(), 990_000.0);
        assert!(close(r.reserve_b(), 1e12 / 990_000.0));
        assert!(close(px, 1e12 / 990_000.0 / 990_000.0));
        assert!((px - 1.020304).abs() < 1e-6);
        assert!(r.invariant_holds());

        // with k held fixed and no fee, selling the same A back returns to the seed
        let px2 = r.swap(Side::Sell, 10_000.0).unwrap();
        assert_eq!(r.reserve_a(), 1_000_000.0);
        assert!(close(r.reserve_b(), 1_000_000.0));
        assert!(close(px2, 1.0));
        assert!(r.invariant_holds());
    }

    #[test]
    fn swap_direction_moves_reserves_monotonically() {
        let mut r = ReserveState::new(500.0, 2_000.0).unwrap();
        let before = r;
        r.swap(Side::Buy, 7.5).unwrap();
        assert!(r.reserve_a() < before.reserve_a());
        assert!(r.reserve_b() > before.reserve_b());

        let before = r;
        r.swap(Side::Sell, 40.0).unwrap();
        assert!(r.reserve_a() > before.reserve_a());
        assert!(r.reserve_b() < before.reserve_b());
    }

    #[test]
    fn invariant_survives_many_swaps() {
        let mut r = ReserveState::new(1_000_000.0, 3_000_000.0).unwrap();
        let amounts = [1.0, 250.0, 12_345.6, 0.001, 99_999.0, 3.3];
        for (i, amt) in amounts.iter().cycle().take(200).enumerate() {
            let side = if i % 2 == 0 { Side::Sell } else { Side::Buy };
            r.swap(side, *amt).unwrap();
            assert!(r.invariant_holds(), "step {i}: {r:?}");
        }
    }

    #[test]
    fn buy_exhausting_reserve_is_rejected_without_mutation() {
        let mut r = ReserveState::new(1_000.0, 1_000.0).unwrap();
        let before = r;
        assert_eq!(r.swap(Side::Buy, 1_000.0), Err(ExecError::InvalidAmount));
        assert_eq!(r.swap(Side::Buy, 5_000.0), Err(ExecError::InvalidAmount));
        assert_eq!(r, before);
    }

    #[test]
    fn non_positive_amounts_are_rejected() {
        let r = ReserveState::new(1_000.0, 1_000.0).unwrap();
        for amt in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert_eq!(r.quote(Side::Sell, amt), Err(ExecError::InvalidAmount));
            assert_eq!(r.quote(Side::Buy, amt), Err(ExecError::InvalidAmount));
        }
    }

    #[test]
    fn extreme_sell_that_collapses_price_is_rejected() {
        let mut r = ReserveState::new(1_000_000.0, 1_000_000.0).unwrap();
        let before = r;
        assert_eq!(r.swap(Side::Sell, 1e300), Err(ExecError::InvalidAmount));
        assert_eq!(r, before);
        assert!(r.price() > 0.0);
    }

    #[test]
    fn set_reserves_recomputes_k() {
        let mut r = ReserveState::new(1_000_000.0, 1_000_000.0).unwrap();
        r.set_reserves(1_500_000.0, 1_500_000.0).unwrap();
        assert_eq!(r.k(), 2.25e12);
        assert_eq!(r.price(), 1.0);
        assert_eq!(r.set_reserves(0.0, 1.0), Err(ExecError::DivisionHazard));
        assert_eq!(r.reserve_a(), 1_500_000.0);
    }

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(ExecError::InvalidAmount.code(), "invalid_amount");
        assert_eq!(ExecError::InvalidPercentage.code(), "invalid_percentage");
        assert_eq!(ExecError::DivisionHazard.code(), "division_hazard");
    }
}
