//! Vectorscope peak filters
//!
//! One-pole per-sample envelope, balance and phase meters feeding the
//! vector view overlay. Each meter runs at two speeds; the slow variant is
//! a constant factor slower than the configured coefficient. These metrics
//! never enter the frame queue.

use vz_core::Sample;

/// Meter speed selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeterSpeed {
    Slow = 0,
    Fast = 1,
}

/// The slow variants move at this fraction of the configured speed.
pub const SECOND_FILTER_SPEED: f32 = 0.25;

/// Envelope/balance/phase meter bank for the vectorscope overlay.
#[derive(Debug, Clone)]
pub struct VectorScopeMeters {
    /// Peak envelope per speed.
    envelope: [f32; 2],
    /// Per-channel envelopes per speed: `balance[speed][channel]`.
    balance: [[f32; 2]; 2],
    /// Sign-agreement mean per speed.
    phase: [f32; 2],

    envelope_coeff: f32,
    stereo_coeff: f32,
}

impl VectorScopeMeters {
    pub fn new(envelope_coeff: f32, stereo_coeff: f32) -> Self {
        Self {
            envelope: [0.0; 2],
            balance: [[0.0; 2]; 2],
            phase: [0.0; 2],
            envelope_coeff,
            stereo_coeff,
        }
    }

    /// Change the filter speeds without resetting meter state.
    pub fn set_coefficients(&mut self, envelope_coeff: f32, stereo_coeff: f32) {
        self.envelope_coeff = envelope_coeff.clamp(0.0, 1.0);
        self.stereo_coeff = stereo_coeff.clamp(0.0, 1.0);
    }

    pub fn reset(&mut self) {
        self.envelope = [0.0; 2];
        self.balance = [[0.0; 2]; 2];
        self.phase = [0.0; 2];
    }

    /// Advance all meters over one stereo block.
    pub fn process_block(&mut self, left: &[Sample], right: &[Sample]) {
        let coeffs = [
            [
                slowed(self.envelope_coeff),
                slowed(self.stereo_coeff),
            ],
            [self.envelope_coeff, self.stereo_coeff],
        ];

        for (&l, &r) in left.iter().zip(right.iter()) {
            let peak = l.abs().max(r.abs());
            let agreement = sign_agreement(l, r);

            for speed in 0..2 {
                let [env_c, stereo_c] = coeffs[speed];

                self.envelope[speed] = self.envelope[speed] * env_c + peak * (1.0 - env_c);
                self.balance[speed][0] =
                    self.balance[speed][0] * stereo_c + l.abs() * (1.0 - stereo_c);
                self.balance[speed][1] =
                    self.balance[speed][1] * stereo_c + r.abs() * (1.0 - stereo_c);
                self.phase[speed] = self.phase[speed] * stereo_c + agreement * (1.0 - stereo_c);
            }
        }
    }

    /// Current peak envelope.
    #[inline]
    pub fn envelope(&self, speed: MeterSpeed) -> f32 {
        self.envelope[speed as usize]
    }

    /// Left/right balance in [0, 1]: 0 is fully left, 1 fully right,
    /// 0.5 centred (also reported for silence).
    pub fn balance(&self, speed: MeterSpeed) -> f32 {
        let [l, r] = self.balance[speed as usize];
        let sum = l + r;
        if sum > 0.0 {
            r / sum
        } else {
            0.5
        }
    }

    /// Running sign-agreement in [-1, 1]: +1 fully correlated, -1 fully
    /// anti-phase.
    #[inline]
    pub fn phase(&self, speed: MeterSpeed) -> f32 {
        self.phase[speed as usize]
    }
}

#[inline]
fn slowed(coeff: f32) -> f32 {
    1.0 - SECOND_FILTER_SPEED * (1.0 - coeff)
}

#[inline]
fn sign_agreement(l: Sample, r: Sample) -> f32 {
    let product = l * r;
    if product > 0.0 {
        1.0
    } else if product < 0.0 {
        -1.0
    } else {
        0.0
    }
}
