// ===============================
// src/peg.rs (target-price controller)
// ===============================
//
// Kontroler proporsional: tiap tick baca harga live, hitung selisih ke target,
// lalu kirim satu trade kecil ke arah target.
//   diff   = target - price
//   amount = |diff| * reserve_a * gain
//   diff > 0 -> Buy (harga naik), diff < 0 -> Sell (harga turun)
// |diff| <= epsilon -> diam (dead band, cegah osilasi karena noise float).
//
use crate::domain::Side;
use crate::ledger::ExecError;

/// Operator setting. Armed iff a target is present.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PegConfig {
    target: Option<f64>,
}

impl PegConfig {
    pub fn target(&self) -> Option<f64> { self.target }
    pub fn enabled(&self) -> bool { self.target.is_some() }

    pub fn arm(&mut self, target: f64) -> Result<(), ExecError> {
        if !(target.is_finite() && target > 0.0) {
            return Err(ExecError::InvalidAmount);
        }
        self.target = Some(target);
        Ok(())
    }

    pub fn disarm(&mut self) { self.target = None; }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PegController {
    pub gain: f64,
    pub epsilon: f64,
}

impl Default for PegController {
    fn default() -> Self { Self { gain: 0.01, epsilon: 1e-4 } }
}

impl PegController {
    pub fn new(gain: f64, epsilon: f64) -> Self { Self { gain, epsilon } }

    /// Corrective trade for the current state, `None` inside the dead band.
    pub fn plan(&self, target: f64, price: f64, reserve_a: f64) -> Option<(Side, f64)> {
        let diff = target - price;
        if diff.abs() <= self.epsilon {
            return None;
        }
        let amount = diff.abs() * reserve_a * self.gain;
        let side = if diff > 0.0 { Side::Buy } else { Side::Sell };
        Some((side, amount))
    }
}

/// Result of one controller tick. Failures are reported, never propagated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PegOutcome {
    Disarmed,
    Settled { diff: f64 },
    Adjusted { side: Side, amount: f64, price: f64 },
    Failed { side: Side, amount: f64, error: ExecError },
}
