//! Linear-space mapping of transform bins to logical display points
//!
//! Turns the transform output of length `N` into `axis_points` complex
//! display values (double that in dual channel modes). Points whose
//! per-line bandwidth is finer than the transform resolution are read by
//! interpolation at fractional bin positions; once the line bandwidth
//! exceeds the transform resolution the remaining points fall back to a
//! max-pick over every bin the line spans. Every output index is written
//! exactly once.

use rustfft::num_complex::Complex;

use vz_core::{Algorithm, BinInterpolation, ChannelMode, FftFloat};

use crate::constant::TransformConstant;
use crate::interpolate::{lanczos_filter, linear_filter, LANCZOS_RADIUS};
use crate::stream::StreamState;

impl StreamState {
    /// Map the current transform output (or resonator snapshot) onto the
    /// display axis, writing into the working memory. Complexity is
    /// `O(axis_points + transform_size)`.
    pub fn map_to_linear_space(&mut self, constant: &TransformConstant) {
        match constant.algorithm {
            Algorithm::Fft => {
                if constant.transform_size < 3 || constant.sample_rate < 1.0 {
                    return;
                }
                let csf = &mut self.audio;
                let csp = &mut self.working;
                match constant.configuration {
                    ChannelMode::Left
                    | ChannelMode::Right
                    | ChannelMode::Mid
                    | ChannelMode::Merge
                    | ChannelMode::Side => map_mono(constant, csf, csp),
                    ChannelMode::Phase => map_phase(constant, csf, csp),
                    ChannelMode::Separate | ChannelMode::MidSide => {
                        map_separate(constant, csf, csp)
                    }
                    ChannelMode::Complex => map_complex(constant, csf, csp),
                }
            }
            Algorithm::Resonator => self.map_resonator_state(constant),
        }
    }

    fn map_resonator_state(&mut self, constant: &TransformConstant) {
        let channels = constant.channels_out();
        let filters = constant.axis_points;

        self.resonators.whole_windowed_state(
            constant.dsp_window.function,
            &mut self.working,
            channels,
            filters,
        );

        if constant.configuration == ChannelMode::Phase {
            for x in 0..filters {
                let left = self.working[x];
                let right = self.working[filters + x];
                let mid = left.norm() + right.norm();
                let cancellation = if mid > 0.0 {
                    (left + right).norm() / mid
                } else {
                    0.0
                };
                self.working[x] = Complex::new(mid, 1.0 - cancellation);
            }
        }
    }
}

/// Shared derived quantities of one mapping pass.
struct MapAxis<'a> {
    points: usize,
    freqs: &'a [f64],
    top_frequency: f64,
    freq_to_bin: f64,
    inv_size: f64,
}

impl<'a> MapAxis<'a> {
    fn new(constant: &'a TransformConstant) -> Self {
        let num_bins = constant.transform_size >> 1;
        let top_frequency = constant.sample_rate * 0.5;
        Self {
            points: constant.axis_points,
            freqs: &constant.mapped_frequencies,
            top_frequency,
            freq_to_bin: num_bins as f64 / top_frequency,
            // scaling stays correct regardless of zero-padding; the 0.5
            // halves the reciprocal because exact-bin matches of a size-N
            // transform come out at N/2
            inv_size: constant.window_kernel_scale / (constant.window_size as f64 * 0.5),
        }
    }

    #[inline]
    fn bandwidth_for_line(&self, x: usize) -> f64 {
        (self.freqs[x + 1] - self.freqs[x]) / self.top_frequency
    }

    #[inline]
    fn bin_position(&self, x: usize) -> f64 {
        self.freqs[x] * self.freq_to_bin
    }
}

/// Max-pick over all integer bins in `(old_bin, bin]` (inclusive read of
/// `old_bin` itself when the span is empty); returns the bin with the
/// largest squared magnitude.
#[inline]
fn max_pick(csf: &[Complex<FftFloat>], old_bin: usize, bin: usize) -> usize {
    let mut max_bin = bin;
    let mut max_mag = 0.0;
    let mut counter = usize::from(bin > old_bin);
    loop {
        let offset = old_bin + counter;
        let magnitude = csf[offset].norm_sqr();
        if magnitude > max_mag {
            max_mag = magnitude;
            max_bin = offset;
        }
        if offset >= bin {
            break;
        }
        counter += 1;
    }
    max_bin
}

fn map_mono(
    constant: &TransformConstant,
    csf: &mut [Complex<FftFloat>],
    csp: &mut [Complex<FftFloat>],
) {
    let n = constant.transform_size;
    let num_bins = n >> 1;
    let axis = MapAxis::new(constant);
    let fft_bandwidth = 1.0 / num_bins as f64;

    // the DC and nyquist bins are not Hermitian-doubled, so halve them
    csf[0] *= 0.5;
    csf[num_bins] *= 0.5;

    for bin in csf[..num_bins].iter_mut() {
        *bin = Complex::new(bin.norm(), 0.0);
    }

    let mut x = 0;
    while x + 1 < axis.points {
        if axis.bandwidth_for_line(x) > fft_bandwidth {
            break;
        }
        let position = axis.bin_position(x);
        csp[x] = match constant.bin_polation {
            BinInterpolation::None => csf[((position + 0.5) as usize).min(num_bins)],
            BinInterpolation::Linear => linear_filter(csf, n, position),
            BinInterpolation::Lanczos => lanczos_filter(csf, n, position, LANCZOS_RADIUS),
        } * axis.inv_size;
        x += 1;
    }

    let mut old_bin = (axis.bin_position(x) as usize).min(num_bins);
    while x < axis.points {
        let bin = (axis.bin_position(x) as usize).min(num_bins);
        debug_assert!(bin < constant.transform_size);
        let picked = max_pick(csf, old_bin, bin);
        csp[x] = csf[picked] * axis.inv_size;
        old_bin = bin;
        x += 1;
    }
}

/// Decode the two real transforms packed into one complex transform: after
/// this pass the first channel occupies bins `0..N/2` and the second is
/// mirrored into `N-k`, with the DC terms split by the caller.
pub(crate) fn separate_transforms_ipl(csf: &mut [Complex<FftFloat>], n: usize) {
    for k in 1..n / 2 {
        let z1 = csf[k];
        let z2 = csf[n - k];
        csf[k] = (z1 + z2.conj()) * 0.5;
        csf[n - k] = Complex::new((z1.im + z2.im) * 0.5, (z2.re - z1.re) * 0.5);
    }
}

/// Split the packed DC/nyquist terms after [`separate_transforms_ipl`].
#[inline]
fn fix_up_separated_edges(csf: &mut [Complex<FftFloat>], n: usize) {
    let num_bins = n >> 1;
    let dc = csf[0];
    csf[n] = Complex::new(dc.im * 0.5, 0.0);
    csf[0] = Complex::new(dc.re * 0.5, 0.0);
    csf[num_bins] *= 0.5;
    csf[num_bins - 1] *= 0.5;
}

fn map_phase(
    constant: &TransformConstant,
    csf: &mut [Complex<FftFloat>],
    csp: &mut [Complex<FftFloat>],
) {
    let n = constant.transform_size;
    let num_bins = n >> 1;
    let axis = MapAxis::new(constant);
    let fft_bandwidth = 1.0 / num_bins as f64;

    separate_transforms_ipl(csf, n);
    fix_up_separated_edges(csf, n);

    // Magnitude interpolation is meaningless on phase-rotating vectors, so
    // interpolated points are produced in two passes: the cancellation
    // metric first, on intact vectors, then magnitudes after the touched
    // bins have been normalised in place. The break point keeps the
    // normalisation out of the bins the max-pick tail still reads as
    // vectors.
    let mut x = 0;

    match constant.bin_polation {
        BinInterpolation::None => {
            while x + 1 < axis.points {
                if axis.bandwidth_for_line(x) > fft_bandwidth {
                    break;
                }
                let index = ((axis.bin_position(x) + 0.5) as usize).min(num_bins - 1);
                let left = csf[index];
                let right = csf[n - index];
                let interference = axis.inv_size * (left + right).norm();
                let mid = axis.inv_size * (left.norm() + right.norm());
                csp[x] = Complex::new(mid, cancellation_metric(interference, mid));
                x += 1;
            }
        }
        BinInterpolation::Linear | BinInterpolation::Lanczos => {
            let radius = match constant.bin_polation {
                BinInterpolation::Linear => 1usize,
                _ => LANCZOS_RADIUS as usize,
            };

            // cancellation pass over intact vectors
            let mut breaking = axis.points;
            while x < axis.points {
                if x + 1 < axis.points && axis.bandwidth_for_line(x) > fft_bandwidth {
                    breaking = x;
                    break;
                }
                let position = axis.bin_position(x);
                let left = read_pair(csf, n, position, constant.bin_polation);
                let right = read_pair(csf, n, n as f64 - position, constant.bin_polation);
                let interference = axis.inv_size * (left + right).norm();
                let mid = axis.inv_size * (left.norm() + right.norm());
                csp[x].im = cancellation_metric(interference, mid);
                x += 1;
            }

            // magnitude pass; normalisation advances per source bin,
            // bounded ahead by the interpolation radius and stopped at the
            // break point's bin
            let tail_guard = if breaking < axis.points {
                (axis.bin_position(breaking) as usize).min(num_bins)
            } else {
                num_bins + 1
            };
            let mut cursor = 0usize;
            for xi in 0..breaking {
                let position = axis.bin_position(xi);
                while (position + radius as f64) > cursor as f64
                    && cursor < tail_guard
                    && cursor <= num_bins
                {
                    csf[cursor] = Complex::new(csf[cursor].norm(), 0.0);
                    csf[n - cursor] = Complex::new(csf[n - cursor].norm(), 0.0);
                    cursor += 1;
                }
                let left = read_pair(csf, n, position, constant.bin_polation);
                let right = read_pair(csf, n, n as f64 - position, constant.bin_polation);
                csp[xi].re = axis.inv_size * (left.norm() + right.norm());
            }
            x = breaking;
        }
    }

    if x < axis.points {
        let mut old_bin = (axis.bin_position(x) as usize).min(num_bins);
        while x < axis.points {
            let bin = (axis.bin_position(x) as usize).min(num_bins);

            let mut max_bin = bin;
            let mut max_mag = 0.0;
            let mut counter = usize::from(bin > old_bin);
            loop {
                let offset = old_bin + counter;
                let magnitude = csf[offset].norm_sqr().max(csf[n - offset].norm_sqr());
                if magnitude > max_mag {
                    max_mag = magnitude;
                    max_bin = offset;
                }
                if offset >= bin {
                    break;
                }
                counter += 1;
            }

            let left = csf[max_bin];
            let right = csf[n - max_bin];
            let interference = axis.inv_size * (left + right).norm();
            let mid = axis.inv_size * (left.norm() + right.norm());
            csp[x] = Complex::new(mid, cancellation_metric(interference, mid));

            old_bin = bin;
            x += 1;
        }
    }
}

fn map_separate(
    constant: &TransformConstant,
    csf: &mut [Complex<FftFloat>],
    csp: &mut [Complex<FftFloat>],
) {
    let n = constant.transform_size;
    let num_bins = n >> 1;
    let axis = MapAxis::new(constant);
    let fft_bandwidth = 1.0 / num_bins as f64;

    separate_transforms_ipl(csf, n);
    fix_up_separated_edges(csf, n);

    // both lanes are read as magnitudes only
    for bin in csf[1..n].iter_mut() {
        *bin = Complex::new(bin.norm(), 0.0);
    }

    let mut x = 0;
    while x + 1 < axis.points {
        if axis.bandwidth_for_line(x) > fft_bandwidth {
            break;
        }
        let position = axis.bin_position(x);
        let (left, right) = match constant.bin_polation {
            BinInterpolation::None => {
                let index = ((position + 0.5) as usize).min(num_bins);
                (csf[index], csf[n - index])
            }
            _ => (
                read_pair(csf, n, position, constant.bin_polation),
                read_pair(csf, n, n as f64 - position, constant.bin_polation),
            ),
        };
        csp[x] = left * axis.inv_size;
        csp[axis.points + x] = right * axis.inv_size;
        x += 1;
    }

    let mut old_bin = (axis.bin_position(x) as usize).min(num_bins);
    while x < axis.points {
        let bin = (axis.bin_position(x) as usize).min(num_bins);

        let mut max_left_bin = bin;
        let mut max_right_bin = bin;
        let (mut max_left, mut max_right) = (0.0, 0.0);
        let mut counter = usize::from(bin > old_bin);
        loop {
            let offset = old_bin + counter;
            let left = csf[offset].norm_sqr();
            let right = csf[n - offset].norm_sqr();
            if left > max_left {
                max_left = left;
                max_left_bin = offset;
            }
            if right > max_right {
                max_right = right;
                max_right_bin = n - offset;
            }
            if offset >= bin {
                break;
            }
            counter += 1;
        }

        csp[x] = csf[max_left_bin] * axis.inv_size;
        csp[axis.points + x] = csf[max_right_bin] * axis.inv_size;
        old_bin = bin;
        x += 1;
    }
}

fn map_complex(
    constant: &TransformConstant,
    csf: &mut [Complex<FftFloat>],
    csp: &mut [Complex<FftFloat>],
) {
    let n = constant.transform_size;
    let axis = MapAxis::new(constant);
    // the full circle of bins is displayed, so the native resolution is
    // twice as fine relative to the (doubled) frequency span
    let fft_bandwidth = 1.0 / n as f64;

    csf[0] *= 0.5;
    for bin in csf[1..n].iter_mut() {
        *bin = Complex::new(bin.norm(), 0.0);
    }

    let mut x = 0;
    let mut old_bin = 0usize;
    while x < axis.points {
        // interpolation segment
        while x < axis.points {
            if x + 1 < axis.points && axis.bandwidth_for_line(x) > fft_bandwidth {
                break;
            }
            let position = axis.bin_position(x);
            csp[x] = match constant.bin_polation {
                BinInterpolation::None => csf[((position + 0.5) as usize).min(n)],
                BinInterpolation::Linear => linear_filter(csf, n + 1, position),
                BinInterpolation::Lanczos => {
                    lanczos_filter(csf, n + 1, position, LANCZOS_RADIUS)
                }
            } * axis.inv_size;
            x += 1;
        }

        if x >= axis.points {
            break;
        }
        old_bin = (axis.bin_position(x) as usize).min(n);

        // max-pick segment; drops back to interpolation when lines become
        // finer than the transform again
        while x < axis.points {
            let bin = (axis.bin_position(x) as usize).min(n);
            if x + 1 < axis.points && axis.bandwidth_for_line(x) < fft_bandwidth {
                break;
            }
            let picked = max_pick(csf, old_bin, bin);
            csp[x] = csf[picked] * axis.inv_size;
            old_bin = bin;
            x += 1;
        }
    }
}

#[inline]
fn cancellation_metric(interference: f64, mid: f64) -> f64 {
    1.0 - if mid > 0.0 { interference / mid } else { 0.0 }
}

#[inline]
fn read_pair(
    csf: &[Complex<FftFloat>],
    n: usize,
    position: f64,
    interpolation: BinInterpolation,
) -> Complex<FftFloat> {
    match interpolation {
        BinInterpolation::Linear => linear_filter(csf, n + 1, position),
        _ => lanczos_filter(csf, n + 1, position, LANCZOS_RADIUS),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fft::ForwardFft;
    use crate::stream::StreamState;
    use vz_core::{AudioView, SpectrumParams, ViewScaling, WindowFunction};

    fn build_constant(mutate: impl FnOnce(&mut SpectrumParams)) -> TransformConstant {
        let mut params = SpectrumParams::default();
        params.dsp_window.function = WindowFunction::Rectangular;
        params.view_scale = ViewScaling::Linear;
        mutate(&mut params);
        TransformConstant::build(&params, 48_000.0).unwrap()
    }

    #[test]
    fn test_separate_transforms_matches_individual_ffts() {
        let n = 32;
        let a: Vec<f64> = (0..n).map(|i| (i as f64 * 0.7).sin()).collect();
        let b: Vec<f64> = (0..n).map(|i| (i as f64 * 1.3).cos()).collect();

        // packed transform of (a + jb)
        let fft = ForwardFft::new(n);
        let mut packed: Vec<Complex<f64>> = a
            .iter()
            .zip(&b)
            .map(|(&x, &y)| Complex::new(x, y))
            .collect();
        packed.push(Complex::new(0.0, 0.0));
        fft.process(&mut packed);
        separate_transforms_ipl(&mut packed, n);

        // reference transforms of each channel alone
        let mut ref_a: Vec<Complex<f64>> = a.iter().map(|&x| Complex::new(x, 0.0)).collect();
        let mut ref_b: Vec<Complex<f64>> = b.iter().map(|&x| Complex::new(x, 0.0)).collect();
        fft.process(&mut ref_a);
        fft.process(&mut ref_b);

        for k in 1..n / 2 {
            assert!(
                (packed[k] - ref_a[k]).norm() < 1e-9,
                "first channel bin {k} diverged"
            );
            assert!(
                (packed[n - k] - ref_b[k]).norm() < 1e-9,
                "second channel bin {k} diverged"
            );
        }
    }

    #[test]
    fn test_dc_input_maps_to_unit_amplitude() {
        let constant = build_constant(|p| {
            p.configuration = ChannelMode::Left;
            p.window_size = 16;
            p.axis_points = 9;
        });
        assert_eq!(constant.transform_size, 16);
        assert!((constant.window_kernel_scale - 1.0).abs() < 1e-12);

        let ones = vec![1.0f32; 16];
        let zeros = vec![0.0f32; 16];
        let views = [AudioView::new(&ones, &[]), AudioView::new(&zeros, &[])];

        let mut state = StreamState::new();
        state.set_storage(&constant);
        assert!(state.prepare_transform(&constant, &views));
        state.do_transform(&constant);
        state.map_to_linear_space(&constant);

        let out = state.working_memory();
        assert!(
            (out[0].norm() - 1.0).abs() < 1e-9,
            "unit DC input must map to unit display amplitude, got {}",
            out[0].norm()
        );
        for x in 1..9 {
            assert!(out[x].norm() < 1e-9, "bin {x} leaked: {}", out[x].norm());
        }
    }

    #[test]
    fn test_two_axis_points_still_written() {
        let constant = build_constant(|p| {
            p.window_size = 64;
            p.axis_points = 2;
        });

        let tone: Vec<f32> = (0..64)
            .map(|i| (2.0 * std::f64::consts::PI * 8.0 * i as f64 / 64.0).sin() as f32)
            .collect();
        let views = [AudioView::new(&tone, &[]), AudioView::new(&tone, &[])];

        let mut state = StreamState::new();
        state.set_storage(&constant);
        state.working[0] = Complex::new(f64::NAN, 0.0);
        state.working[1] = Complex::new(f64::NAN, 0.0);
        assert!(state.prepare_transform(&constant, &views));
        state.do_transform(&constant);
        state.map_to_linear_space(&constant);

        assert!(state.working_memory()[0].re.is_finite());
        assert!(state.working_memory()[1].re.is_finite());
    }

    #[test]
    fn test_degenerate_sizes_leave_output_untouched() {
        let constant = build_constant(|p| {
            p.window_size = 64;
            p.axis_points = 8;
        });
        let mut tiny = constant.clone();
        tiny.sample_rate = 0.5;

        let mut state = StreamState::new();
        state.set_storage(&tiny);
        let sentinel = Complex::new(42.0, 0.0);
        state.working.fill(sentinel);
        state.map_to_linear_space(&tiny);
        assert!(state.working_memory().iter().all(|&c| c == sentinel));
    }

    #[test]
    fn test_max_pick_selects_largest_bin() {
        let mut data = vec![Complex::new(0.0, 0.0); 16];
        data[3] = Complex::new(2.0, 0.0);
        data[5] = Complex::new(7.0, 0.0);
        data[6] = Complex::new(1.0, 0.0);
        assert_eq!(max_pick(&data, 2, 6), 5);
        assert_eq!(max_pick(&data, 3, 3), 3);
    }

    #[test]
    fn test_mono_tone_peak_position() {
        // coarse axis: few points across the whole range forces max-pick
        let constant = build_constant(|p| {
            p.window_size = 256;
            p.axis_points = 8;
            p.configuration = ChannelMode::Left;
        });

        let tone: Vec<f32> = (0..256)
            .map(|i| (2.0 * std::f64::consts::PI * 100.0 * i as f64 / 256.0).sin() as f32)
            .collect();
        let silent = vec![0.0f32; 256];
        let views = [AudioView::new(&tone, &[]), AudioView::new(&silent, &[])];

        let mut state = StreamState::new();
        state.set_storage(&constant);
        assert!(state.prepare_transform(&constant, &views));
        state.do_transform(&constant);
        state.map_to_linear_space(&constant);

        // bin 100 of 128 lies in the 7th of 8 coarse lines
        let out = state.working_memory();
        let loudest = (0..8).max_by(|&a, &b| out[a].norm().total_cmp(&out[b].norm()));
        assert_eq!(loudest, Some(6));
        assert!((out[6].norm() - 1.0).abs() < 0.05);
    }
}
