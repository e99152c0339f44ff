//! Window kernel generation
//!
//! A window kernel is precomputed per configuration: `window_size` shaped
//! entries followed by a zero tail up to the transform size. The returned
//! scale is the reciprocal-normalised sum that makes unit-amplitude input
//! produce unit output magnitude, so the absolute amplitude of a window's
//! closed form is immaterial.

use std::f64::consts::PI;

use vz_core::{FftFloat, WindowDesigner, WindowFunction};

/// Fill `kernel` with the designed window over `window_size` entries and
/// zero the tail. Returns the amplitude scale `window_size / Σk[i]`.
///
/// Deterministic and idempotent: regenerating with the same designer and
/// sizes produces identical kernels and scale.
pub fn regenerate_window_kernel(
    designer: WindowDesigner,
    kernel: &mut [FftFloat],
    window_size: usize,
) -> FftFloat {
    let window_size = window_size.min(kernel.len());
    debug_assert!(window_size > 0);

    if window_size == 1 {
        // degenerate case: every window collapses to a unit impulse
        kernel[0] = 1.0;
    } else {
        let last = (window_size - 1) as f64;
        match designer.function {
            WindowFunction::Rectangular => {
                kernel[..window_size].fill(1.0);
            }
            WindowFunction::Hann => {
                for (i, k) in kernel[..window_size].iter_mut().enumerate() {
                    *k = 1.0 - (2.0 * PI * i as f64 / last).cos();
                }
            }
            WindowFunction::Hamming => {
                for (i, k) in kernel[..window_size].iter_mut().enumerate() {
                    *k = 0.54 - 0.46 * (2.0 * PI * i as f64 / last).cos();
                }
            }
            WindowFunction::Blackman => {
                for (i, k) in kernel[..window_size].iter_mut().enumerate() {
                    let phase = 2.0 * PI * i as f64 / last;
                    *k = 0.42 - 0.5 * phase.cos() + 0.08 * (2.0 * phase).cos();
                }
            }
            WindowFunction::Kaiser => {
                let denominator = bessel_i0(designer.beta);
                for (i, k) in kernel[..window_size].iter_mut().enumerate() {
                    let t = 2.0 * i as f64 / last - 1.0;
                    *k = bessel_i0(designer.beta * (1.0 - t * t).max(0.0).sqrt()) / denominator;
                }
            }
        }
    }

    kernel[window_size..].fill(0.0);

    let sum: f64 = kernel[..window_size].iter().sum();
    debug_assert!(sum > 0.0, "window must integrate to a positive value");
    window_size as f64 / sum
}

/// Zeroth-order modified Bessel function of the first kind, by series
/// expansion. Converges quickly for the beta range used by Kaiser windows.
fn bessel_i0(x: f64) -> f64 {
    let half = x * 0.5;
    let mut sum = 1.0;
    let mut term = 1.0;
    let mut k = 1.0;
    loop {
        term *= (half / k) * (half / k);
        sum += term;
        if term < 1e-12 * sum {
            return sum;
        }
        k += 1.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn designer(function: WindowFunction) -> WindowDesigner {
        WindowDesigner {
            function,
            beta: 8.0,
        }
    }

    #[test]
    fn test_rectangular_is_unit() {
        let mut kernel = vec![0.0; 32];
        let scale = regenerate_window_kernel(designer(WindowFunction::Rectangular), &mut kernel, 16);
        assert!(kernel[..16].iter().all(|&k| k == 1.0));
        assert!(kernel[16..].iter().all(|&k| k == 0.0));
        assert!((scale - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_hann_form() {
        let mut kernel = vec![0.0; 16];
        regenerate_window_kernel(designer(WindowFunction::Hann), &mut kernel, 16);
        // symmetric, zero at both ends, peak of 2 in the middle
        assert!(kernel[0].abs() < 1e-12);
        assert!(kernel[15].abs() < 1e-9);
        for i in 0..8 {
            assert!((kernel[i] - kernel[15 - i]).abs() < 1e-9);
        }
        let peak = kernel.iter().cloned().fold(0.0, f64::max);
        assert!((peak - 2.0).abs() < 0.1);
    }

    #[test]
    fn test_idempotent_regeneration() {
        for function in [
            WindowFunction::Rectangular,
            WindowFunction::Hann,
            WindowFunction::Hamming,
            WindowFunction::Blackman,
            WindowFunction::Kaiser,
        ] {
            let mut first = vec![0.0; 64];
            let mut second = vec![0.0; 64];
            let s1 = regenerate_window_kernel(designer(function), &mut first, 48);
            let s2 = regenerate_window_kernel(designer(function), &mut second, 48);
            assert_eq!(first, second);
            assert_eq!(s1, s2);
        }
    }

    #[test]
    fn test_scale_normalises_sum() {
        for function in [
            WindowFunction::Hann,
            WindowFunction::Hamming,
            WindowFunction::Blackman,
            WindowFunction::Kaiser,
        ] {
            let mut kernel = vec![0.0; 128];
            let scale = regenerate_window_kernel(designer(function), &mut kernel, 128);
            let sum: f64 = kernel.iter().sum();
            assert!((scale * sum / 128.0 - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_single_sample_window() {
        let mut kernel = vec![0.0; 16];
        let scale = regenerate_window_kernel(designer(WindowFunction::Hann), &mut kernel, 1);
        assert_eq!(kernel[0], 1.0);
        assert!((scale - 1.0).abs() < 1e-12);
    }
}
