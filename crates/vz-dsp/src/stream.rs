//! Mutable per-stream working state
//!
//! [`StreamState`] owns the audio-thread scratch: the windowed transform
//! input, the transform/working buffers, the relay buffers used by channel
//! fan-in, the live resonator bank and the finished frames awaiting queue
//! handoff. Resizing happens only at the configuration-swap boundary.

use std::sync::Arc;

use rustfft::num_complex::Complex;

use vz_core::{Algorithm, AudioView, ChannelMode, FftFloat, Sample};

use crate::constant::TransformConstant;
use crate::fft::ForwardFft;
use crate::resonator::ResonatorBank;

/// One finished slice of display-ready axis-point values. Dual channel
/// modes carry `2 * axis_points` entries, channel-major.
pub type Frame = Vec<Complex<f32>>;

/// Per-stream working buffers and live analysis state.
pub struct StreamState {
    /// Transform scratch, `transform_size + 1` complex entries. The extra
    /// slot holds the separated second-channel DC term.
    pub(crate) audio: Vec<Complex<FftFloat>>,
    /// Mapper output, `2 * axis_points` complex entries.
    pub(crate) working: Vec<Complex<FftFloat>>,
    /// Fan-in relay storage for derived channels (mid/side).
    relay: Vec<Sample>,
    /// Shared with the renderer for on-demand snapshots; the bank's
    /// internal lock keeps those reads short.
    pub resonators: Arc<ResonatorBank>,
    fft: Option<ForwardFft>,
    /// Finished frames awaiting handoff to the queue.
    pub frame_buffer: Vec<Frame>,
}

impl Default for StreamState {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamState {
    pub fn new() -> Self {
        Self {
            audio: Vec::new(),
            working: Vec::new(),
            relay: Vec::new(),
            resonators: Arc::new(ResonatorBank::new()),
            fft: None,
            frame_buffer: Vec::new(),
        }
    }

    /// Size all scratch for `constant` and retune the resonator bank.
    /// Runs at the configuration-swap boundary only.
    pub fn set_storage(&mut self, constant: &TransformConstant) {
        self.audio
            .resize(constant.transform_size + 1, Complex::new(0.0, 0.0));
        self.working
            .resize(constant.axis_points * 2, Complex::new(0.0, 0.0));

        if self.fft.as_ref().map(ForwardFft::size) != Some(constant.transform_size) {
            self.fft = Some(ForwardFft::new(constant.transform_size));
        }

        self.resonators.match_spec(&constant.resonator);
    }

    /// Zero every live buffer and the resonator state.
    pub fn clear_audio_state(&mut self) {
        self.audio.fill(Complex::new(0.0, 0.0));
        self.working.fill(Complex::new(0.0, 0.0));
        self.resonators.reset_state();
        self.frame_buffer.clear();
    }

    /// Transform scratch, read-only.
    #[inline]
    pub fn audio_memory(&self) -> &[Complex<FftFloat>] {
        &self.audio
    }

    /// Mapper output, read-only.
    #[inline]
    pub fn working_memory(&self) -> &[Complex<FftFloat>] {
        &self.working
    }

    /// Pull the last `window_size` samples out of the channel views, apply
    /// the window kernel and store into the transform scratch per the
    /// configured channel mode, zero-padding up to the transform size.
    ///
    /// Returns `false` without touching the scratch when the views differ
    /// in length or are shorter than the window; the caller skips one frame
    /// and retries on the next.
    pub fn prepare_transform(
        &mut self,
        constant: &TransformConstant,
        views: &[AudioView<'_>; 2],
    ) -> bool {
        if views[0].len() != views[1].len() || views[0].len() < constant.window_size {
            return false;
        }

        let offset = views[0].len() - constant.window_size;
        self.fill_windowed(constant, views, offset, constant.window_size);
        self.zero_pad(constant, constant.window_size);
        true
    }

    /// Variant of [`Self::prepare_transform`] that splices in audio already
    /// observed by the caller but not yet ingested by the ring buffer. The
    /// preliminary samples are the newest and land at the end of the
    /// windowed scratch; the older tail is drawn from the views. When more
    /// preliminary audio than one window is supplied, only its newest
    /// `window_size` samples are used.
    pub fn prepare_transform_with(
        &mut self,
        constant: &TransformConstant,
        views: &[AudioView<'_>; 2],
        preliminary: [&[Sample]; 2],
    ) -> bool {
        if views[0].len() != views[1].len() || views[0].len() < constant.window_size {
            return false;
        }

        let supplied = preliminary[0].len().min(preliminary[1].len());
        let stop = supplied.min(constant.window_size);
        let from_view = constant.window_size - stop;
        let offset = views[0].len() - from_view;

        self.fill_windowed(constant, views, offset, from_view);

        let mode = constant.configuration;
        let newest = supplied - stop;
        for k in 0..stop {
            let i = from_view + k;
            let kernel = constant.window_kernel[i];
            let l = preliminary[0][newest + k] as FftFloat;
            let r = preliminary[1][newest + k] as FftFloat;
            self.audio[i] = windowed_value(mode, l, r, kernel);
        }

        self.zero_pad(constant, constant.window_size);
        true
    }

    fn fill_windowed(
        &mut self,
        constant: &TransformConstant,
        views: &[AudioView<'_>; 2],
        skip: usize,
        count: usize,
    ) {
        let mode = constant.configuration;
        let pairs = views[0]
            .iter()
            .skip(skip)
            .zip(views[1].iter().skip(skip))
            .take(count);

        for (i, (l, r)) in pairs.enumerate() {
            let kernel = constant.window_kernel[i];
            self.audio[i] = windowed_value(mode, l as FftFloat, r as FftFloat, kernel);
        }
    }

    fn zero_pad(&mut self, constant: &TransformConstant, from: usize) {
        self.audio[from..=constant.transform_size].fill(Complex::new(0.0, 0.0));
    }

    /// In-place forward DFT over the scratch. Earlier stages validated the
    /// length; there is no error path here.
    pub fn do_transform(&mut self, constant: &TransformConstant) {
        debug_assert_eq!(
            self.fft.as_ref().map(ForwardFft::size),
            Some(constant.transform_size)
        );
        if let Some(fft) = &self.fft {
            fft.process(&mut self.audio);
        }
    }

    /// Advance the resonator bank over one block, fanning the stereo pair
    /// into the configured analysis channels.
    pub fn resonate_block(
        &mut self,
        constant: &TransformConstant,
        left: &[Sample],
        right: &[Sample],
    ) {
        debug_assert_eq!(constant.algorithm, Algorithm::Resonator);
        let n = left.len().min(right.len());
        let (left, right) = (&left[..n], &right[..n]);

        match constant.configuration {
            ChannelMode::Left => self.resonators.resonate_real(&[left]),
            ChannelMode::Right => self.resonators.resonate_real(&[right]),
            ChannelMode::Mid | ChannelMode::Merge => {
                self.relay.resize(n, 0.0);
                for i in 0..n {
                    self.relay[i] = 0.5 * (left[i] + right[i]);
                }
                self.resonators.resonate_real(&[&self.relay[..n]]);
            }
            ChannelMode::Side => {
                self.relay.resize(n, 0.0);
                for i in 0..n {
                    self.relay[i] = 0.5 * (left[i] - right[i]);
                }
                self.resonators.resonate_real(&[&self.relay[..n]]);
            }
            ChannelMode::MidSide => {
                self.relay.resize(n * 2, 0.0);
                for i in 0..n {
                    self.relay[i] = left[i] + right[i];
                    self.relay[n + i] = left[i] - right[i];
                }
                let (mid, side) = self.relay.split_at(n);
                self.resonators.resonate_real(&[mid, &side[..n]]);
            }
            ChannelMode::Separate | ChannelMode::Phase => {
                self.resonators.resonate_real(&[left, right]);
            }
            ChannelMode::Complex => self.resonators.resonate_complex(left, right),
        }
    }

    /// Map the current transform (or resonator state) to display points and
    /// append the finished frame to the handoff buffer.
    pub fn add_audio_frame(&mut self, constant: &TransformConstant) {
        self.map_to_linear_space(constant);

        let points = constant.axis_points * constant.channels_out();
        let frame: Frame = self.working[..points]
            .iter()
            .map(|c| Complex::new(c.re as f32, c.im as f32))
            .collect();
        self.frame_buffer.push(frame);
    }
}

/// Channel fan-in: how one windowed stereo pair lands in the transform
/// scratch for each channel mode.
#[inline]
fn windowed_value(
    mode: ChannelMode,
    l: FftFloat,
    r: FftFloat,
    kernel: FftFloat,
) -> Complex<FftFloat> {
    match mode {
        ChannelMode::Left => Complex::new(l * kernel, 0.0),
        ChannelMode::Right => Complex::new(r * kernel, 0.0),
        ChannelMode::Mid | ChannelMode::Merge => Complex::new(0.5 * (l + r) * kernel, 0.0),
        ChannelMode::Side => Complex::new(0.5 * (l - r) * kernel, 0.0),
        ChannelMode::MidSide => {
            Complex::new(0.5 * (l + r) * kernel, 0.5 * (l - r) * kernel)
        }
        ChannelMode::Separate | ChannelMode::Phase | ChannelMode::Complex => {
            Complex::new(l * kernel, r * kernel)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vz_core::{SpectrumParams, WindowFunction};

    fn constant_with(mode: ChannelMode, window_size: usize) -> TransformConstant {
        let mut params = SpectrumParams::default();
        params.configuration = mode;
        params.window_size = window_size;
        params.axis_points = 16;
        params.dsp_window.function = WindowFunction::Rectangular;
        TransformConstant::build(&params, 48_000.0).unwrap()
    }

    fn views<'a>(l: &'a [Sample], r: &'a [Sample]) -> [AudioView<'a>; 2] {
        [AudioView::new(l, &[]), AudioView::new(r, &[])]
    }

    #[test]
    fn test_zero_pad_region() {
        let constant = constant_with(ChannelMode::Left, 20);
        assert_eq!(constant.transform_size, 32);

        let l = vec![1.0; 20];
        let r = vec![1.0; 20];
        let mut state = StreamState::new();
        state.set_storage(&constant);
        assert!(state.prepare_transform(&constant, &views(&l, &r)));

        for i in 20..32 {
            assert_eq!(state.audio_memory()[i], Complex::new(0.0, 0.0));
        }
    }

    #[test]
    fn test_fan_in_modes() {
        let l = vec![0.8f32; 16];
        let r = vec![0.2f32; 16];
        let mut state = StreamState::new();

        let cases = [
            (ChannelMode::Left, Complex::new(0.8, 0.0)),
            (ChannelMode::Right, Complex::new(0.2, 0.0)),
            (ChannelMode::Merge, Complex::new(0.5, 0.0)),
            (ChannelMode::Side, Complex::new(0.3, 0.0)),
            (ChannelMode::MidSide, Complex::new(0.5, 0.3)),
            (ChannelMode::Separate, Complex::new(0.8, 0.2)),
        ];

        for (mode, expected) in cases {
            let constant = constant_with(mode, 16);
            state.set_storage(&constant);
            assert!(state.prepare_transform(&constant, &views(&l, &r)));
            let got = state.audio_memory()[3];
            assert!(
                (got.re - expected.re).abs() < 1e-6 && (got.im - expected.im).abs() < 1e-6,
                "{mode:?}: got {got}, expected {expected}"
            );
        }
    }

    #[test]
    fn test_inconsistent_views_are_skipped() {
        let constant = constant_with(ChannelMode::Left, 16);
        let mut state = StreamState::new();
        state.set_storage(&constant);

        let l = vec![1.0; 16];
        let short = vec![1.0; 8];
        assert!(!state.prepare_transform(&constant, &views(&l, &short)));
        assert!(!state.prepare_transform(&constant, &views(&short, &short)));
    }

    #[test]
    fn test_oversized_view_uses_newest_tail() {
        let constant = constant_with(ChannelMode::Left, 16);
        let mut state = StreamState::new();
        state.set_storage(&constant);

        // 32 samples, ramp; the newest 16 are 16..32
        let l: Vec<Sample> = (0..32).map(|i| i as f32).collect();
        let r = vec![0.0; 32];
        assert!(state.prepare_transform(&constant, &views(&l, &r)));
        assert_eq!(state.audio_memory()[0].re, 16.0);
        assert_eq!(state.audio_memory()[15].re, 31.0);
    }

    #[test]
    fn test_preliminary_lands_at_end() {
        let constant = constant_with(ChannelMode::Left, 16);
        let mut state = StreamState::new();
        state.set_storage(&constant);

        let ring_l = vec![1.0f32; 16];
        let ring_r = vec![0.0f32; 16];
        let fresh_l = [2.0f32; 4];
        let fresh_r = [0.0f32; 4];

        assert!(state.prepare_transform_with(
            &constant,
            &views(&ring_l, &ring_r),
            [&fresh_l, &fresh_r],
        ));

        // 12 ring samples followed by the 4 preliminary ones
        for i in 0..12 {
            assert_eq!(state.audio_memory()[i].re, 1.0);
        }
        for i in 12..16 {
            assert_eq!(state.audio_memory()[i].re, 2.0);
        }
    }

    #[test]
    fn test_oversized_preliminary_keeps_newest() {
        let constant = constant_with(ChannelMode::Left, 16);
        let mut state = StreamState::new();
        state.set_storage(&constant);

        let ring = vec![0.0f32; 16];
        let fresh: Vec<Sample> = (0..24).map(|i| i as f32).collect();

        assert!(state.prepare_transform_with(
            &constant,
            &views(&ring, &ring),
            [&fresh, &fresh],
        ));

        // only the newest 16 preliminary samples (8..24) are used
        assert_eq!(state.audio_memory()[0].re, 8.0);
        assert_eq!(state.audio_memory()[15].re, 23.0);
    }

    #[test]
    fn test_single_sample_window_transform() {
        let constant = constant_with(ChannelMode::Left, 1);
        assert_eq!(constant.transform_size, 16);

        let l = vec![0.75f32];
        let r = vec![0.0f32];
        let mut state = StreamState::new();
        state.set_storage(&constant);
        assert!(state.prepare_transform(&constant, &views(&l, &r)));
        state.do_transform(&constant);

        // a single weighted sample spreads flat across all bins
        for bin in 0..16 {
            assert!((state.audio_memory()[bin].norm() - 0.75).abs() < 1e-9);
        }
    }
}
