//! Forward FFT driver
//!
//! A thin wrapper over a cached complex forward plan. The transform is
//! complex (not real-to-complex) because dual channel modes pack two real
//! channels into one complex input and decode them afterwards. Plans are
//! built at configuration boundaries, never on the per-sample path.

use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use vz_core::FftFloat;

/// In-place forward DFT of a fixed power-of-two length.
pub struct ForwardFft {
    size: usize,
    plan: Arc<dyn Fft<FftFloat>>,
}

impl ForwardFft {
    /// Plan a forward transform. `size` must be a power of two of at least
    /// 16; earlier configuration stages guarantee this.
    pub fn new(size: usize) -> Self {
        debug_assert!(size.is_power_of_two() && size >= 16);
        let mut planner = FftPlanner::new();
        Self {
            size,
            plan: planner.plan_fft_forward(size),
        }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Transform `scratch[..size]` in place. No error path; sizes were
    /// validated when the configuration was built.
    #[inline]
    pub fn process(&self, scratch: &mut [Complex<FftFloat>]) {
        self.plan.process(&mut scratch[..self.size]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dc_input() {
        let fft = ForwardFft::new(16);
        let mut scratch = vec![Complex::new(1.0, 0.0); 16];
        fft.process(&mut scratch);
        assert!((scratch[0].re - 16.0).abs() < 1e-9);
        for bin in &scratch[1..] {
            assert!(bin.norm() < 1e-9);
        }
    }

    #[test]
    fn test_single_tone() {
        let n = 64;
        let fft = ForwardFft::new(n);
        let mut scratch: Vec<Complex<FftFloat>> = (0..n)
            .map(|i| {
                let phase = 2.0 * std::f64::consts::PI * 4.0 * i as f64 / n as f64;
                Complex::new(phase.sin(), 0.0)
            })
            .collect();
        fft.process(&mut scratch);
        // energy concentrated at bins 4 and n-4, each of magnitude n/2
        assert!((scratch[4].norm() - n as f64 / 2.0).abs() < 1e-6);
        assert!((scratch[n - 4].norm() - n as f64 / 2.0).abs() < 1e-6);
        assert!(scratch[8].norm() < 1e-6);
    }

    /// The packed complex transform of a single real channel must agree
    /// with a dedicated real-to-complex transform over the shared bins.
    #[test]
    fn test_matches_real_transform() {
        use realfft::RealFftPlanner;

        let n = 128;
        let signal: Vec<f64> = (0..n)
            .map(|i| (i as f64 * 0.37).sin() + 0.25 * (i as f64 * 1.1).cos())
            .collect();

        let fft = ForwardFft::new(n);
        let mut packed: Vec<Complex<FftFloat>> =
            signal.iter().map(|&s| Complex::new(s, 0.0)).collect();
        fft.process(&mut packed);

        let mut planner = RealFftPlanner::<f64>::new();
        let r2c = planner.plan_fft_forward(n);
        let mut input = signal.clone();
        let mut reference = r2c.make_output_vec();
        r2c.process(&mut input, &mut reference).unwrap();

        for (k, expected) in reference.iter().enumerate() {
            assert!(
                (packed[k] - expected).norm() < 1e-9,
                "bin {} diverged",
                k
            );
        }
    }
}
