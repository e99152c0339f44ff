//! Parameter surface for the spectrum core
//!
//! Everything the control thread can change is collected in
//! [`SpectrumParams`]. The audio thread never reads these directly; it
//! observes a version-stamped snapshot through [`crate::SharedParams`] and
//! derives its immutable per-block state from it.

use serde::{Deserialize, Serialize};

use crate::{VzError, VzResult};

/// How the incoming stereo pair is folded into the analyser's input.
///
/// The first five variants produce one analysis channel, the rest two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ChannelMode {
    Left = 0,
    Right = 1,
    Mid = 2,
    Side = 3,
    Merge = 4,
    MidSide = 5,
    Separate = 6,
    Phase = 7,
    Complex = 8,
}

/// Highest ordinal that still denotes a single-channel analysis.
pub const OFFSET_FOR_MONO: u8 = ChannelMode::Merge as u8;

impl ChannelMode {
    /// Number of analysis channels this mode produces (1 or 2).
    #[inline]
    pub fn channels_out(self) -> usize {
        if self.is_mono() {
            1
        } else {
            2
        }
    }

    #[inline]
    pub fn is_mono(self) -> bool {
        (self as u8) <= OFFSET_FOR_MONO
    }
}

impl Default for ChannelMode {
    fn default() -> Self {
        Self::Merge
    }
}

/// Frequency analysis algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Algorithm {
    /// Windowed FFT over the most recent window of samples.
    Fft,
    /// Bank of complex resonators advanced continuously in time.
    Resonator,
}

impl Default for Algorithm {
    fn default() -> Self {
        Self::Fft
    }
}

/// How fractional bin positions are read out of the transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinInterpolation {
    /// Nearest bin with 0.5 rounding.
    None,
    /// Two-tap linear interpolation.
    Linear,
    /// Windowed sinc, radius 5.
    Lanczos,
}

impl Default for BinInterpolation {
    fn default() -> Self {
        Self::Lanczos
    }
}

/// Frequency-axis scaling of the display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViewScaling {
    Linear,
    Logarithmic,
}

impl Default for ViewScaling {
    fn default() -> Self {
        Self::Logarithmic
    }
}

/// Display mode of the spectrum view. The scheduler produces queued frames
/// on the blob cadence; in line-graph mode resonator state can additionally
/// be pulled on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisplayMode {
    LineGraph,
    ColourSpectrum,
}

impl Default for DisplayMode {
    fn default() -> Self {
        Self::LineGraph
    }
}

/// Window function selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WindowFunction {
    Rectangular,
    Hann,
    Hamming,
    Blackman,
    Kaiser,
}

impl Default for WindowFunction {
    fn default() -> Self {
        Self::Hann
    }
}

/// A window function together with its shape parameter (used by Kaiser,
/// ignored by the fixed windows).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowDesigner {
    pub function: WindowFunction,
    pub beta: f64,
}

impl Default for WindowDesigner {
    fn default() -> Self {
        Self {
            function: WindowFunction::Hann,
            beta: 8.0,
        }
    }
}

/// The smoothed line graphs computed in parallel by the post-filter. Each
/// graph owns an independent decay pole over the same input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(usize)]
pub enum LineGraph {
    /// Unsmoothed transform output.
    Transform = 0,
    /// Slow peak decay.
    Slow = 1,
    /// Fast peak decay.
    Fast = 2,
}

/// Number of parallel line graphs.
pub const LINE_GRAPH_COUNT: usize = 3;

impl Default for LineGraph {
    fn default() -> Self {
        Self::Transform
    }
}

/// Horizontal view window in normalised axis units. `left == 0.0` and
/// `right == 1.0` shows the full frequency range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewRect {
    pub left: f64,
    pub right: f64,
}

impl ViewRect {
    #[inline]
    pub fn size(&self) -> f64 {
        self.right - self.left
    }
}

impl Default for ViewRect {
    fn default() -> Self {
        Self {
            left: 0.0,
            right: 1.0,
        }
    }
}

/// Power-law tilt `b * f^a` applied per axis point by the post-filter,
/// expressing arbitrary dB/octave slopes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerSlope {
    pub a: f64,
    pub b: f64,
}

impl Default for PowerSlope {
    fn default() -> Self {
        // flat response
        Self { a: 0.0, b: 1.0 }
    }
}

/// Complete parameter surface recognised by the spectrum core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectrumParams {
    pub algorithm: Algorithm,
    pub configuration: ChannelMode,
    pub dsp_window: WindowDesigner,
    pub bin_polation: BinInterpolation,
    /// Logical frequency-axis resolution, at least 2.
    pub axis_points: usize,
    /// Effective analysis window in samples, at least 1.
    pub window_size: usize,
    /// Frame cadence in milliseconds; the sample count floor is 10.
    pub blob_size_ms: f64,
    pub low_dbs: f64,
    pub high_dbs: f64,
    pub view_scale: ViewScaling,
    pub view_rect: ViewRect,
    pub min_freq: f64,
    pub slope: PowerSlope,
    pub display_mode: DisplayMode,
    /// Which smoothing graph drives cursor/frequency tracking.
    pub frequency_tracking_graph: LineGraph,
    /// Decay poles for the slow and fast graphs; the transform graph is
    /// always unsmoothed.
    pub slow_pole: f32,
    pub fast_pole: f32,
}

impl Default for SpectrumParams {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::default(),
            configuration: ChannelMode::default(),
            dsp_window: WindowDesigner::default(),
            bin_polation: BinInterpolation::default(),
            axis_points: 256,
            window_size: 2048,
            blob_size_ms: 50.0,
            low_dbs: -120.0,
            high_dbs: 0.0,
            view_scale: ViewScaling::default(),
            view_rect: ViewRect::default(),
            min_freq: 10.0,
            slope: PowerSlope::default(),
            display_mode: DisplayMode::default(),
            frequency_tracking_graph: LineGraph::default(),
            slow_pole: 0.99,
            fast_pole: 0.90,
        }
    }
}

impl SpectrumParams {
    /// Check that this combination can be materialised at all. The per-block
    /// derived state performs the same checks; validating here lets the
    /// control thread reject a change before publishing it.
    pub fn validate(&self) -> VzResult<()> {
        if self.axis_points < 2 {
            return Err(VzError::Config(format!(
                "axis_points must be at least 2, got {}",
                self.axis_points
            )));
        }
        if self.window_size == 0 {
            return Err(VzError::Config("window_size must be non-zero".into()));
        }
        if !(self.low_dbs < self.high_dbs) {
            return Err(VzError::Config(format!(
                "dB range is empty: [{}, {}]",
                self.low_dbs, self.high_dbs
            )));
        }
        if self.min_freq <= 0.0 {
            return Err(VzError::Config(format!(
                "min_freq must be positive, got {}",
                self.min_freq
            )));
        }
        Ok(())
    }
}
