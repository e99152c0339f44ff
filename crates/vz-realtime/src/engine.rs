//! Spectrum engine: stream callbacks, blob scheduling and frame fan-out
//!
//! [`SpectrumProcessor`] lives on the audio thread. Each callback it
//! observes the shared parameter version, rebuilds its derived constants at
//! the block boundary when needed, advances the analysis over blob-sized
//! sub-chunks and hands finished frames to the queue without ever
//! blocking. [`SpectrumConsumer`] is the renderer half: it polls frames,
//! resamples stale sizes and runs the display post-filter.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, warn};
use rustfft::num_complex::Complex;

use vz_core::{Algorithm, DiagSnapshot, Diagnostics, DisplayMode, FftFloat, LineGraph, SharedParams};
use vz_dsp::{DisplayPipeline, FilterPoint, Frame, ResonatorBank, StreamState, TransformConstant};

use crate::queue::{frame_queue, FrameConsumer, FrameProducer};
use crate::ring::StereoHistory;

/// Default queue depth between producer and renderer.
pub const DEFAULT_QUEUE_CAPACITY: usize = 16;

/// Extra history beyond one analysis window, so oversized callbacks do not
/// starve the view.
const HISTORY_SLACK: usize = 2;

/// Create a connected processor/consumer pair over the shared parameters.
pub fn spectrum_engine(
    shared: Arc<SharedParams>,
    queue_capacity: usize,
) -> (SpectrumProcessor, SpectrumConsumer) {
    let (producer, consumer) = frame_queue(queue_capacity);
    let diag = Arc::new(Diagnostics::default());
    let suspended = Arc::new(AtomicBool::new(false));
    let stream = StreamState::new();
    let resonators = Arc::clone(&stream.resonators);

    let processor = SpectrumProcessor {
        shared: Arc::clone(&shared),
        diag: Arc::clone(&diag),
        suspended: Arc::clone(&suspended),
        constant: None,
        observed_version: 0,
        sample_rate: 48_000.0,
        stream,
        history: StereoHistory::new(1),
        counter: 0,
        producer,
    };

    let consumer = SpectrumConsumer {
        shared,
        diag,
        suspended,
        consumer,
        resonators,
        display: DisplayPipeline::new(),
        display_constant: None,
        tracking_graph: LineGraph::Transform,
        observed_version: 0,
        sample_rate: 48_000.0,
    };

    (processor, consumer)
}

/// Audio-thread half of the engine.
pub struct SpectrumProcessor {
    shared: Arc<SharedParams>,
    diag: Arc<Diagnostics>,
    suspended: Arc<AtomicBool>,

    constant: Option<TransformConstant>,
    observed_version: u64,
    sample_rate: f64,

    stream: StreamState,
    history: StereoHistory,
    /// Samples accumulated towards the current blob.
    counter: usize,

    producer: FrameProducer,
}

impl SpectrumProcessor {
    /// Stream audio callback. Requires exactly two channels; anything else
    /// returns immediately. Never blocks, never allocates outside the
    /// configuration-swap boundary.
    pub fn on_stream_audio(&mut self, buffers: &[&[f32]]) {
        if self.suspended.load(Ordering::Relaxed) {
            return;
        }
        if buffers.len() != 2 {
            return;
        }
        let samples = buffers[0].len().min(buffers[1].len());
        let left = &buffers[0][..samples];
        let right = &buffers[1][..samples];

        self.maybe_rebuild();
        let constant = match &self.constant {
            Some(constant) => constant,
            None => {
                // nothing valid to run yet; remember the audio anyway
                self.history.write(left, right);
                return;
            }
        };

        let scheduled = constant.display_mode == DisplayMode::ColourSpectrum
            || constant.algorithm == Algorithm::Fft;

        if scheduled {
            let blob = constant.blob_samples;
            let mut offset = 0;
            let mut remaining = samples;

            while remaining > 0 {
                let room = blob.saturating_sub(self.counter);
                let take = remaining.min(room);

                if constant.algorithm == Algorithm::Resonator && take > 0 {
                    self.stream.resonate_block(
                        constant,
                        &left[offset..offset + take],
                        &right[offset..offset + take],
                    );
                }

                self.counter += take;

                if self.counter >= blob {
                    match constant.algorithm {
                        Algorithm::Fft => {
                            // the timeline is the ring history followed by
                            // the part of this callback consumed so far
                            let views = self.history.views();
                            let preliminary =
                                [&left[..offset + take], &right[..offset + take]];
                            if self.stream.prepare_transform_with(
                                constant,
                                &views,
                                preliminary,
                            ) {
                                self.stream.do_transform(constant);
                                self.stream.add_audio_frame(constant);
                            } else {
                                self.diag.count_skipped();
                            }
                        }
                        Algorithm::Resonator => self.stream.add_audio_frame(constant),
                    }
                    self.counter = 0;
                }

                offset += take;
                remaining -= take;
            }
        } else {
            // resonator line-graph mode: advance continuously, state is
            // pulled on demand
            self.stream.resonate_block(constant, left, right);
        }

        for frame in self.stream.frame_buffer.drain(..) {
            if self.producer.push(frame) {
                self.diag.count_produced();
            } else {
                self.diag.count_dropped();
            }
        }

        self.history.write(left, right);
    }

    /// Stream property callback: adopt the new sample rate and force a
    /// constant rebuild at the next block boundary.
    pub fn on_stream_properties_changed(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.observed_version = 0;
    }

    /// Direct snapshot of the resonator state, for on-demand line-graph
    /// rendering. Takes the bank's short lock.
    pub fn stream(&self) -> &StreamState {
        &self.stream
    }

    pub fn diagnostics(&self) -> DiagSnapshot {
        self.diag.snapshot()
    }

    fn maybe_rebuild(&mut self) {
        let version = self.shared.version();
        if version == self.observed_version && self.constant.is_some() {
            return;
        }

        let (params, seen) = self.shared.snapshot();
        self.observed_version = seen;

        match TransformConstant::build(&params, self.sample_rate) {
            Ok(constant) => {
                let needed = constant.window_size * HISTORY_SLACK;
                if self.history.capacity() < needed {
                    self.history.resize(needed);
                }

                let invalidates_state = match &self.constant {
                    Some(previous) => {
                        previous.configuration != constant.configuration
                            || previous.algorithm != constant.algorithm
                            || previous.transform_size != constant.transform_size
                            || previous.axis_points != constant.axis_points
                    }
                    None => true,
                };

                self.stream.set_storage(&constant);
                if invalidates_state {
                    self.stream.clear_audio_state();
                }
                // an in-progress blob must not mix configurations
                self.counter = 0;

                debug!(
                    "rebuilt transform constants: {} points, window {}, transform {}",
                    constant.axis_points, constant.window_size, constant.transform_size
                );
                self.diag.count_rebuild();
                self.constant = Some(constant);
            }
            Err(error) => {
                // keep the previous valid configuration active
                warn!("configuration rejected: {error}");
            }
        }
    }
}

/// Renderer-thread half of the engine.
pub struct SpectrumConsumer {
    shared: Arc<SharedParams>,
    diag: Arc<Diagnostics>,
    suspended: Arc<AtomicBool>,

    consumer: FrameConsumer,
    resonators: Arc<ResonatorBank>,
    display: DisplayPipeline,
    display_constant: Option<TransformConstant>,
    tracking_graph: LineGraph,
    observed_version: u64,
    sample_rate: f64,
}

impl SpectrumConsumer {
    /// Destructively take the oldest finished frame.
    #[inline]
    pub fn poll_frame(&mut self) -> Option<Frame> {
        self.consumer.pop()
    }

    /// Racy number of frames currently queued.
    #[inline]
    pub fn approximate_stored_frames(&self) -> usize {
        self.consumer.approx_len()
    }

    /// Pop one frame and run it through the post-filter stack. Returns
    /// `false` when no frame was available. Frames whose size no longer
    /// matches the current axis are linearly resampled before filtering.
    pub fn process_next_frame(&mut self) -> bool {
        self.maybe_reconfigure();

        let frame = match self.consumer.pop() {
            Some(frame) => frame,
            None => return false,
        };
        if frame.is_empty() {
            return true;
        }

        let channels = self
            .display_constant
            .as_ref()
            .map_or(1, TransformConstant::channels_out);
        let expected = self.display.axis_points() * channels;

        if frame.len() == expected {
            self.display.process(&frame);
        } else {
            let resampled = resample_linear(&frame, expected);
            self.display.process(&resampled);
        }
        true
    }

    /// Mapped display output of one smoothing graph.
    pub fn results(&self, graph: LineGraph) -> &[FilterPoint] {
        self.display.results(graph)
    }

    /// Raw peak-decay state of one smoothing graph.
    pub fn states(&self, graph: LineGraph) -> &[FilterPoint] {
        self.display.states(graph)
    }

    /// Display output of the graph configured to drive cursor and
    /// frequency tracking.
    pub fn tracking_results(&self) -> &[FilterPoint] {
        self.display.results(self.tracking_graph)
    }

    /// On-demand snapshot of the resonator amplitudes, for instantaneous
    /// line-graph rendering. Takes the bank's short lock. `out` must hold
    /// `channels_out * axis_points` entries; returns `false` until a
    /// configuration has been observed.
    pub fn resonator_snapshot(&self, out: &mut [Complex<FftFloat>]) -> bool {
        let constant = match &self.display_constant {
            Some(constant) => constant,
            None => return false,
        };
        self.resonators.whole_windowed_state(
            constant.dsp_window.function,
            out,
            constant.channels_out(),
            constant.axis_points,
        );
        true
    }

    /// Suspend or resume the audio side. While suspended the callback
    /// early-returns; frames already queued remain poppable.
    pub fn set_suspended(&self, suspended: bool) {
        self.suspended.store(suspended, Ordering::Relaxed);
    }

    /// The consumer must learn rate changes out of band to keep its slope
    /// map consistent with the producer.
    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.observed_version = 0;
    }

    pub fn diagnostics(&self) -> DiagSnapshot {
        self.diag.snapshot()
    }

    fn maybe_reconfigure(&mut self) {
        let version = self.shared.version();
        if version == self.observed_version && self.display_constant.is_some() {
            return;
        }

        let (params, seen) = self.shared.snapshot();
        self.observed_version = seen;

        if let Ok(constant) = TransformConstant::build(&params, self.sample_rate) {
            self.display.configure(
                &constant,
                params.slope,
                params.low_dbs,
                params.high_dbs,
                params.slow_pole,
                params.fast_pole,
            );
            self.tracking_graph = params.frequency_tracking_graph;
            self.display_constant = Some(constant);
        }
    }
}

/// Linear resampling of a frame onto a different point count. Used when a
/// frame was produced under an older axis resolution than the consumer
/// currently displays.
fn resample_linear(frame: &[Complex<f32>], target: usize) -> Frame {
    if frame.len() < 2 || target == 0 {
        return vec![Complex::new(0.0, 0.0); target];
    }

    let step = (frame.len() - 1) as f32 / target.max(1) as f32;
    (0..target)
        .map(|i| {
            let position = i as f32 * step;
            let base = position as usize;
            let frac = position - base as f32;
            let a = frame[base];
            let b = frame[(base + 1).min(frame.len() - 1)];
            a + (b - a) * frac
        })
        .collect()
}
