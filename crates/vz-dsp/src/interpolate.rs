//! Fractional-bin readout of complex transform arrays
//!
//! The mapper reads the transform at fractional bin positions. Three
//! methods are supported: nearest bin (handled inline by the mapper),
//! two-tap linear, and a radius-5 windowed sinc (Lanczos). Positions
//! outside `[0, size)` contribute zero.

use rustfft::num_complex::Complex;

use vz_core::FftFloat;

/// Radius of the Lanczos readout used throughout the mapper.
pub const LANCZOS_RADIUS: i64 = 5;

/// Two-tap linear interpolation of `data[..size]` at fractional `position`.
#[inline]
pub fn linear_filter(data: &[Complex<FftFloat>], size: usize, position: f64) -> Complex<FftFloat> {
    if size == 0 || position < 0.0 {
        return Complex::new(0.0, 0.0);
    }
    let base = position.floor() as usize;
    if base >= size {
        return Complex::new(0.0, 0.0);
    }
    let frac = position - base as f64;
    let c0 = data[base];
    let c1 = if base + 1 < size { data[base + 1] } else { c0 };
    c0 + (c1 - c0) * frac
}

/// Windowed-sinc interpolation of `data[..size]` at fractional `position`
/// with the given radius (taps cover `floor(position) - radius + 1 ..=
/// floor(position) + radius`).
pub fn lanczos_filter(
    data: &[Complex<FftFloat>],
    size: usize,
    position: f64,
    radius: i64,
) -> Complex<FftFloat> {
    if size == 0 || !position.is_finite() {
        return Complex::new(0.0, 0.0);
    }
    let base = position.floor() as i64;
    let mut accumulator = Complex::new(0.0, 0.0);

    for tap in (base - radius + 1)..=(base + radius) {
        if tap < 0 || tap >= size as i64 {
            continue;
        }
        let weight = lanczos_kernel(position - tap as f64, radius);
        accumulator += data[tap as usize] * weight;
    }

    accumulator
}

#[inline]
fn lanczos_kernel(x: f64, radius: i64) -> f64 {
    if x.abs() >= radius as f64 {
        0.0
    } else {
        sinc(x) * sinc(x / radius as f64)
    }
}

#[inline]
fn sinc(x: f64) -> f64 {
    if x.abs() < 1e-12 {
        1.0
    } else {
        let px = std::f64::consts::PI * x;
        px.sin() / px
    }
}
