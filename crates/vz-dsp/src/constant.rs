//! Immutable per-configuration derived state
//!
//! A [`TransformConstant`] is built by the audio thread at a block boundary
//! whenever it observes a parameter version bump, then treated as immutable
//! for the lifetime of the block. It collects everything the hot path needs
//! that is expensive to derive: the window kernel and its scale, the
//! bin-to-axis-point frequency map, the transform length and the resonator
//! tuning.

use vz_core::{
    next_pow2, Algorithm, BinInterpolation, ChannelMode, DisplayMode, PowerSlope, SpectrumParams,
    ViewRect, ViewScaling, VzError, VzResult, WindowDesigner,
};

use crate::resonator::ResonatorSpec;
use crate::window::regenerate_window_kernel;

/// Smallest transform the engine will run.
pub const MIN_TRANSFORM_SIZE: usize = 16;

/// Smallest number of samples a blob may span regardless of the configured
/// milliseconds.
pub const MIN_BLOB_SAMPLES: usize = 10;

/// Immutable snapshot of a transform configuration.
#[derive(Debug, Clone)]
pub struct TransformConstant {
    pub configuration: ChannelMode,
    pub algorithm: Algorithm,
    pub bin_polation: BinInterpolation,
    pub dsp_window: WindowDesigner,
    pub display_mode: DisplayMode,
    pub sample_rate: f64,

    pub axis_points: usize,
    pub window_size: usize,
    pub transform_size: usize,

    /// Per axis point, the frequency of the corresponding logical display
    /// pixel unit. Monotone non-decreasing in both scaling modes.
    pub mapped_frequencies: Vec<f64>,

    /// Time-domain window applied to transform input, zero-padded from
    /// `window_size` to `transform_size`.
    pub window_kernel: Vec<f64>,
    pub window_kernel_scale: f64,

    /// Tuning of the resonator bank for this axis mapping.
    pub resonator: ResonatorSpec,

    /// Samples per produced frame.
    pub blob_samples: usize,
}

impl TransformConstant {
    /// Derive the full constant from the parameter surface. Fails without
    /// side effects when the combination cannot be materialised; the caller
    /// keeps its previous constant in that case.
    pub fn build(params: &SpectrumParams, sample_rate: f64) -> VzResult<Self> {
        params.validate()?;
        if !(sample_rate > 0.0) || !sample_rate.is_finite() {
            return Err(VzError::InvalidSampleRate(sample_rate));
        }

        let mut constant = Self {
            configuration: params.configuration,
            algorithm: params.algorithm,
            bin_polation: params.bin_polation,
            dsp_window: params.dsp_window,
            display_mode: params.display_mode,
            sample_rate,
            axis_points: 0,
            window_size: 0,
            transform_size: 0,
            mapped_frequencies: Vec::new(),
            window_kernel: Vec::new(),
            window_kernel_scale: 1.0,
            resonator: ResonatorSpec::default(),
            blob_samples: MIN_BLOB_SAMPLES,
        };

        constant.set_storage(params.axis_points, params.window_size)?;
        constant.window_kernel_scale = regenerate_window_kernel(
            params.dsp_window,
            &mut constant.window_kernel,
            constant.window_size,
        );
        constant.remap_frequencies(params.view_rect, params.view_scale, params.min_freq);
        constant.resonator = ResonatorSpec::from_axis(
            &constant.mapped_frequencies,
            sample_rate,
            constant.window_size,
        );
        constant.blob_samples = MIN_BLOB_SAMPLES
            .max((params.blob_size_ms * 0.001 * sample_rate) as usize);

        Ok(constant)
    }

    /// Fix all sizes and (re)allocate the kernel and frequency map.
    /// The transform length is `max(16, nextPow2(window_size))`.
    pub fn set_storage(
        &mut self,
        axis_points: usize,
        effective_window_size: usize,
    ) -> VzResult<usize> {
        if axis_points < 2 {
            return Err(VzError::Config(format!(
                "axis_points must be at least 2, got {axis_points}"
            )));
        }
        if effective_window_size == 0 {
            return Err(VzError::Config("window_size must be non-zero".into()));
        }

        self.window_size = effective_window_size;
        self.transform_size = MIN_TRANSFORM_SIZE.max(next_pow2(effective_window_size));
        self.axis_points = axis_points;
        self.window_kernel.resize(self.transform_size, 0.0);
        self.mapped_frequencies.resize(axis_points, 0.0);

        Ok(self.transform_size)
    }

    /// Fill `mapped_frequencies` from the view window. In the Complex
    /// channel mode the upper half of a logarithmic view folds around
    /// nyquist (mirror about 0.5 of the normalised argument).
    pub fn remap_frequencies(&mut self, view: ViewRect, scaling: ViewScaling, min_freq: f64) {
        debug_assert!(self.axis_points > 1);

        let view_size = view.size();
        let half_rate = self.sample_rate * 0.5;
        let steps = (self.axis_points - 1) as f64;

        match scaling {
            ViewScaling::Linear => {
                let complex_factor = if self.configuration == ChannelMode::Complex {
                    2.0
                } else {
                    1.0
                };
                let freq_per_point = half_rate / steps;

                for (i, f) in self.mapped_frequencies.iter_mut().enumerate() {
                    *f = (complex_factor * view.left * half_rate
                        + complex_factor * view_size * i as f64 * freq_per_point)
                        .max(0.0);
                }
            }
            ViewScaling::Logarithmic => {
                let end = half_rate;
                if self.configuration != ChannelMode::Complex {
                    for (i, f) in self.mapped_frequencies.iter_mut().enumerate() {
                        let arg = view.left + view_size * (i as f64 / steps);
                        *f = (min_freq * (end / min_freq).powf(arg)).max(0.0);
                    }
                } else {
                    for (i, f) in self.mapped_frequencies.iter_mut().enumerate() {
                        let arg = view.left + view_size * (i as f64 / steps);
                        *f = if arg < 0.5 {
                            min_freq * (end / min_freq).powf(arg * 2.0)
                        } else {
                            let mirrored = min_freq * (end / min_freq).powf(1.0 - (arg - 0.5) * 2.0);
                            end + (end - mirrored)
                        }
                        .max(0.0);
                    }
                }
            }
        }

        debug_assert!(
            self.mapped_frequencies.windows(2).all(|w| w[0] <= w[1]),
            "frequency map must be monotone non-decreasing"
        );
    }

    /// Write the power-law tilt `b * f^a` per axis point.
    pub fn generate_slope_map(&self, out: &mut [f32], slope: PowerSlope) {
        debug_assert_eq!(out.len(), self.axis_points);
        for (value, &freq) in out.iter_mut().zip(&self.mapped_frequencies) {
            *value = (slope.b * freq.powf(slope.a)) as f32;
        }
    }

    #[inline]
    pub fn map_frequency(&self, axis_point: usize) -> f64 {
        self.mapped_frequencies[axis_point]
    }

    /// Number of analysis channels produced per axis point (1 or 2).
    #[inline]
    pub fn channels_out(&self) -> usize {
        self.configuration.channels_out()
    }
}
