//! Complex resonator bank
//!
//! One sharply tuned recursive resonator per axis point, producing complex
//! amplitude estimates continuously in time. Each filter runs three
//! phase-locked sub-oscillators at centre and centre ± one bandwidth step,
//! so a cosine-sum window can be applied in the frequency domain when the
//! state is snapshotted.
//!
//! Thread discipline: `match_spec` at construction/reconfiguration time,
//! `resonate_*` on the audio thread only; snapshot reads from the renderer
//! take the short internal lock.

use parking_lot::Mutex;
use rustfft::num_complex::Complex;

use vz_core::{FftFloat, Sample, WindowFunction};

use crate::simd::{detect_simd_width, SimdWidth};

/// Sub-oscillators per filter: centre and centre ± one bandwidth step.
const SUB_FILTERS: usize = 3;

/// Tuning description of the bank, derived from the axis mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct ResonatorSpec {
    pub sample_rate: f64,
    /// Centre frequency per filter, Hz.
    pub centers: Vec<f64>,
    /// 3 dB bandwidth per filter, Hz.
    pub bandwidths: Vec<f64>,
}

impl Default for ResonatorSpec {
    fn default() -> Self {
        Self {
            sample_rate: 48_000.0,
            centers: Vec::new(),
            bandwidths: Vec::new(),
        }
    }
}

impl ResonatorSpec {
    /// One resonator per axis point: centre at the mapped frequency,
    /// bandwidth from the neighbouring point spacing with a floor at the
    /// window's native resolution.
    pub fn from_axis(mapped_frequencies: &[f64], sample_rate: f64, window_size: usize) -> Self {
        let count = mapped_frequencies.len();
        let min_bandwidth = sample_rate / window_size.max(1) as f64;
        let mut centers = Vec::with_capacity(count);
        let mut bandwidths = Vec::with_capacity(count);

        for i in 0..count {
            let below = if i > 0 {
                mapped_frequencies[i] - mapped_frequencies[i - 1]
            } else if count > 1 {
                mapped_frequencies[1] - mapped_frequencies[0]
            } else {
                min_bandwidth
            };
            let above = if i + 1 < count {
                mapped_frequencies[i + 1] - mapped_frequencies[i]
            } else {
                below
            };

            centers.push(mapped_frequencies[i].clamp(0.0, sample_rate));
            bandwidths.push((0.5 * (below + above)).max(min_bandwidth));
        }

        Self {
            sample_rate,
            centers,
            bandwidths,
        }
    }

    #[inline]
    pub fn num_filters(&self) -> usize {
        self.centers.len()
    }
}

#[derive(Default)]
struct BankInner {
    poles: Vec<[Complex<FftFloat>; SUB_FILTERS]>,
    /// Steady-state normalisation per filter (`1 - r`).
    scales: Vec<FftFloat>,
    /// Per channel, per filter sub-oscillator state.
    state: [Vec<[Complex<FftFloat>; SUB_FILTERS]>; 2],
}

/// The live resonator bank.
#[derive(Default)]
pub struct ResonatorBank {
    inner: Mutex<BankInner>,
}

impl ResonatorBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reconfigure frequencies and bandwidths without resetting state.
    /// State vectors are preserved where the filter count is unchanged and
    /// zero-filled where the bank grows.
    pub fn match_spec(&self, spec: &ResonatorSpec) {
        let mut inner = self.inner.lock();
        let count = spec.num_filters();

        inner.poles.clear();
        inner.scales.clear();

        for i in 0..count {
            let omega = 2.0 * std::f64::consts::PI * spec.centers[i] / spec.sample_rate;
            let delta = 2.0 * std::f64::consts::PI * spec.bandwidths[i] / spec.sample_rate;
            let radius = (-std::f64::consts::PI * spec.bandwidths[i] / spec.sample_rate).exp();

            let mut poles = [Complex::new(0.0, 0.0); SUB_FILTERS];
            for (m, pole) in poles.iter_mut().enumerate() {
                let angle = omega + (m as f64 - 1.0) * delta;
                *pole = Complex::from_polar(radius, angle);
            }
            inner.poles.push(poles);
            inner.scales.push(1.0 - radius);
        }

        for channel in &mut inner.state {
            channel.resize(count, [Complex::new(0.0, 0.0); SUB_FILTERS]);
        }

        log::debug!("resonator bank retuned to {count} filters");
    }

    /// Zero all live state.
    pub fn reset_state(&self) {
        let mut inner = self.inner.lock();
        for channel in &mut inner.state {
            channel.fill([Complex::new(0.0, 0.0); SUB_FILTERS]);
        }
    }

    pub fn num_filters(&self) -> usize {
        self.inner.lock().poles.len()
    }

    /// Advance the bank by `channels[c].len()` samples of real input for
    /// each of `channels.len()` analysis channels (1 or 2).
    pub fn resonate_real(&self, channels: &[&[Sample]]) {
        let mut inner = self.inner.lock();
        let inner = &mut *inner;
        for (index, input) in channels.iter().enumerate().take(2) {
            let states = &mut inner.state[index];
            match detect_simd_width() {
                SimdWidth::Octa => advance_real::<8>(states, &inner.poles, input),
                SimdWidth::Quad => advance_real::<4>(states, &inner.poles, input),
                SimdWidth::Scalar => advance_real::<1>(states, &inner.poles, input),
            }
        }
    }

    /// Advance the bank by complex input `left + j·right`.
    pub fn resonate_complex(&self, left: &[Sample], right: &[Sample]) {
        let mut inner = self.inner.lock();
        let inner = &mut *inner;
        let states = &mut inner.state[0];
        match detect_simd_width() {
            SimdWidth::Octa => advance_complex::<8>(states, &inner.poles, left, right),
            SimdWidth::Quad => advance_complex::<4>(states, &inner.poles, left, right),
            SimdWidth::Scalar => advance_complex::<1>(states, &inner.poles, left, right),
        }
    }

    /// Snapshot the current complex amplitudes, window-compensated.
    /// `out` is channel-major: `out[c * num_filters + i]`.
    pub fn whole_windowed_state(
        &self,
        window: WindowFunction,
        out: &mut [Complex<FftFloat>],
        out_channels: usize,
        num_filters: usize,
    ) {
        let inner = self.inner.lock();
        let available = inner.poles.len();

        for channel in 0..out_channels.min(2) {
            for filter in 0..num_filters {
                out[channel * num_filters + filter] = if filter < available {
                    let combined = window_combine(window, &inner.state[channel][filter]);
                    combined * inner.scales[filter]
                } else {
                    Complex::new(0.0, 0.0)
                };
            }
        }
    }
}

/// Frequency-domain window application over the three sub-oscillators,
/// compensated for the window's coherent gain. Windows without a three-term
/// cosine decomposition fall back to the Hann combination.
#[inline]
fn window_combine(
    window: WindowFunction,
    state: &[Complex<FftFloat>; SUB_FILTERS],
) -> Complex<FftFloat> {
    match window {
        WindowFunction::Rectangular => state[1],
        WindowFunction::Hamming => {
            (state[1] * 0.54 - (state[0] + state[2]) * 0.23) * (1.0 / 0.54)
        }
        _ => state[1] - (state[0] + state[2]) * 0.5,
    }
}

/// Width-blocked real-input advance. `LANES` selects the block the inner
/// loop is unrolled over; all widths compute the identical recurrence.
pub(crate) fn advance_real<const LANES: usize>(
    states: &mut [[Complex<FftFloat>; SUB_FILTERS]],
    poles: &[[Complex<FftFloat>; SUB_FILTERS]],
    input: &[Sample],
) {
    let blocked = states.len() - states.len() % LANES;

    for &sample in input {
        let x = sample as FftFloat;

        let mut filter = 0;
        while filter < blocked {
            for lane in 0..LANES {
                let state = &mut states[filter + lane];
                let pole = &poles[filter + lane];
                for m in 0..SUB_FILTERS {
                    state[m] = state[m] * pole[m] + x;
                }
            }
            filter += LANES;
        }

        for (state, pole) in states[blocked..].iter_mut().zip(&poles[blocked..]) {
            for m in 0..SUB_FILTERS {
                state[m] = state[m] * pole[m] + x;
            }
        }
    }
}

/// Width-blocked complex-input advance over `left + j·right`.
pub(crate) fn advance_complex<const LANES: usize>(
    states: &mut [[Complex<FftFloat>; SUB_FILTERS]],
    poles: &[[Complex<FftFloat>; SUB_FILTERS]],
    left: &[Sample],
    right: &[Sample],
) {
    let blocked = states.len() - states.len() % LANES;

    for (&l, &r) in left.iter().zip(right.iter()) {
        let x = Complex::new(l as FftFloat, r as FftFloat);

        let mut filter = 0;
        while filter < blocked {
            for lane in 0..LANES {
                let state = &mut states[filter + lane];
                let pole = &poles[filter + lane];
                for m in 0..SUB_FILTERS {
                    state[m] = state[m] * pole[m] + x;
                }
            }
            filter += LANES;
        }

        for (state, pole) in states[blocked..].iter_mut().zip(&poles[blocked..]) {
            for m in 0..SUB_FILTERS {
                state[m] = state[m] * pole[m] + x;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_filter_spec(center: f64, bandwidth: f64) -> ResonatorSpec {
        ResonatorSpec {
            sample_rate: 48_000.0,
            centers: vec![center],
            bandwidths: vec![bandwidth],
        }
    }

    fn sine(freq: f64, sample_rate: f64, count: usize) -> Vec<Sample> {
        (0..count)
            .map(|i| (2.0 * std::f64::consts::PI * freq * i as f64 / sample_rate).sin() as f32)
            .collect()
    }

    #[test]
    fn test_on_frequency_magnitude() {
        let spec = single_filter_spec(1000.0, 50.0);
        let bank = ResonatorBank::new();
        bank.match_spec(&spec);

        let input = sine(1000.0, spec.sample_rate, 48_000);
        bank.resonate_real(&[&input]);

        let mut out = [Complex::new(0.0f64, 0.0)];
        bank.whole_windowed_state(WindowFunction::Rectangular, &mut out, 1, 1);
        // a real unit sine carries half its amplitude at +f
        let magnitude = out[0].norm();
        assert!(
            (magnitude - 0.5).abs() < 0.08,
            "expected ~0.5, got {magnitude}"
        );
    }

    #[test]
    fn test_off_frequency_rejection() {
        let spec = single_filter_spec(1000.0, 50.0);
        let bank = ResonatorBank::new();
        bank.match_spec(&spec);

        let input = sine(4000.0, spec.sample_rate, 48_000);
        bank.resonate_real(&[&input]);

        let mut out = [Complex::new(0.0f64, 0.0)];
        bank.whole_windowed_state(WindowFunction::Rectangular, &mut out, 1, 1);
        assert!(out[0].norm() < 0.05);
    }

    #[test]
    fn test_complex_drive() {
        let spec = single_filter_spec(1000.0, 50.0);
        let bank = ResonatorBank::new();
        bank.match_spec(&spec);

        let n = 48_000;
        let left: Vec<Sample> = (0..n)
            .map(|i| {
                (2.0 * std::f64::consts::PI * 1000.0 * i as f64 / spec.sample_rate).cos() as f32
            })
            .collect();
        let right = sine(1000.0, spec.sample_rate, n);
        bank.resonate_complex(&left, &right);

        let mut out = [Complex::new(0.0f64, 0.0)];
        bank.whole_windowed_state(WindowFunction::Rectangular, &mut out, 1, 1);
        // the analytic signal concentrates its full amplitude at +f
        let magnitude = out[0].norm();
        assert!(
            (magnitude - 1.0).abs() < 0.15,
            "expected ~1.0, got {magnitude}"
        );
    }

    #[test]
    fn test_match_preserves_state() {
        let spec = single_filter_spec(500.0, 40.0);
        let bank = ResonatorBank::new();
        bank.match_spec(&spec);

        let input = sine(500.0, spec.sample_rate, 10_000);
        bank.resonate_real(&[&input]);

        bank.match_spec(&spec);
        let mut out = [Complex::new(0.0f64, 0.0)];
        bank.whole_windowed_state(WindowFunction::Rectangular, &mut out, 1, 1);
        assert!(out[0].norm() > 0.1, "state was lost by match_spec");

        bank.reset_state();
        bank.whole_windowed_state(WindowFunction::Rectangular, &mut out, 1, 1);
        assert_eq!(out[0].norm(), 0.0);
    }

    #[test]
    fn test_blocked_widths_agree() {
        let spec = ResonatorSpec {
            sample_rate: 48_000.0,
            centers: (0..13).map(|i| 100.0 + 300.0 * i as f64).collect(),
            bandwidths: vec![40.0; 13],
        };
        let bank = ResonatorBank::new();
        bank.match_spec(&spec);
        let poles = bank.inner.lock().poles.clone();

        let input = sine(700.0, spec.sample_rate, 2048);

        let zero = [Complex::new(0.0, 0.0); SUB_FILTERS];
        let mut scalar = vec![zero; 13];
        let mut quad = vec![zero; 13];
        let mut octa = vec![zero; 13];

        advance_real::<1>(&mut scalar, &poles, &input);
        advance_real::<4>(&mut quad, &poles, &input);
        advance_real::<8>(&mut octa, &poles, &input);

        for i in 0..13 {
            for m in 0..SUB_FILTERS {
                assert!((scalar[i][m] - quad[i][m]).norm() < 1e-9);
                assert!((scalar[i][m] - octa[i][m]).norm() < 1e-9);
            }
        }
    }

    #[test]
    fn test_spec_from_axis_floors_bandwidth() {
        let mapped = vec![100.0, 101.0, 102.0, 103.0];
        let spec = ResonatorSpec::from_axis(&mapped, 48_000.0, 1024);
        let min_bw = 48_000.0 / 1024.0;
        assert!(spec.bandwidths.iter().all(|&bw| bw >= min_bw));
        assert_eq!(spec.num_filters(), 4);
    }
}
