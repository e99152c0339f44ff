//! Magnitude post-filter and log-fraction display mapping
//!
//! Each finished frame runs through a stack of parallel line graphs. Every
//! graph applies an independent per-point peak-decay filter to the same
//! input and maps the result into log-fractional display coordinates over
//! the configured dB range, clipped at the bottom of the display.

use rustfft::num_complex::Complex;

use vz_core::{db_to_fraction, ChannelMode, LineGraph, PowerSlope, LINE_GRAPH_COUNT};

use crate::constant::TransformConstant;

/// Per-axis-point filter state. Mono modes use `magnitude`/`phase`; dual
/// modes store the left lane in `magnitude` and the right lane in `phase`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FilterPoint {
    pub magnitude: f32,
    pub phase: f32,
}

/// One smoothing graph: a decay pole plus its running state and the last
/// mapped display results.
#[derive(Debug, Default)]
pub struct LineGraphState {
    pub pole: f32,
    states: Vec<FilterPoint>,
    results: Vec<FilterPoint>,
}

/// The post-filter stack. Owned by the frame consumer.
pub struct DisplayPipeline {
    graphs: [LineGraphState; LINE_GRAPH_COUNT],
    slope_map: Vec<f32>,
    configuration: ChannelMode,
    axis_points: usize,
    low_dbs: f64,
    high_dbs: f64,
    /// Display value emitted for silent points.
    clip: f32,
}

impl Default for DisplayPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplayPipeline {
    pub fn new() -> Self {
        Self {
            graphs: Default::default(),
            slope_map: Vec::new(),
            configuration: ChannelMode::Merge,
            axis_points: 0,
            low_dbs: -120.0,
            high_dbs: 0.0,
            clip: 0.0,
        }
    }

    /// Rebuild for a configuration. Graph state is preserved where the
    /// axis size is unchanged and zeroed where it grows or shrinks.
    pub fn configure(
        &mut self,
        constant: &TransformConstant,
        slope: PowerSlope,
        low_dbs: f64,
        high_dbs: f64,
        slow_pole: f32,
        fast_pole: f32,
    ) {
        self.configuration = constant.configuration;
        self.axis_points = constant.axis_points;
        self.low_dbs = low_dbs;
        self.high_dbs = high_dbs;

        self.slope_map.resize(constant.axis_points, 0.0);
        constant.generate_slope_map(&mut self.slope_map, slope);

        // the transform graph is always unsmoothed
        let poles = [0.0, slow_pole, fast_pole];
        for (graph, pole) in self.graphs.iter_mut().zip(poles) {
            graph.pole = pole;
            if graph.states.len() != constant.axis_points {
                graph.states = vec![FilterPoint::default(); constant.axis_points];
                graph.results = vec![FilterPoint::default(); constant.axis_points];
            }
        }
    }

    #[inline]
    pub fn axis_points(&self) -> usize {
        self.axis_points
    }

    /// The mapped display results of one graph.
    pub fn results(&self, graph: LineGraph) -> &[FilterPoint] {
        &self.graphs[graph as usize].results
    }

    /// The raw peak-decay states of one graph.
    pub fn states(&self, graph: LineGraph) -> &[FilterPoint] {
        &self.graphs[graph as usize].states
    }

    /// Run the peak-decay filters and display mapping over one frame.
    /// `values` is the mapper's output: `axis_points` entries for mono
    /// modes, `2 * axis_points` channel-major for dual modes.
    pub fn process(&mut self, values: &[Complex<f32>]) {
        let size = self.axis_points;
        if size == 0 || values.len() < size * self.configuration.channels_out() {
            return;
        }

        let lower = db_to_fraction(self.low_dbs);
        let upper = db_to_fraction(self.high_dbs);
        let delta_y_recip = (1.0 / (upper / lower).ln()) as f32;
        let min_frac_recip = (1.0 / lower) as f32;
        let clip = self.clip;

        match self.configuration {
            ChannelMode::Left
            | ChannelMode::Right
            | ChannelMode::Mid
            | ChannelMode::Merge
            | ChannelMode::Side
            | ChannelMode::Complex => {
                for i in 0..size {
                    let magnitude = values[i].norm();
                    let slope = self.slope_map[i];

                    for graph in &mut self.graphs {
                        let state = &mut graph.states[i];
                        state.magnitude = magnitude.max(state.magnitude * graph.pole);

                        let d = slope * state.magnitude * min_frac_recip;
                        graph.results[i].magnitude =
                            if d > 0.0 { d.ln() * delta_y_recip } else { clip };
                        graph.results[i].phase = 0.0;
                    }
                }
            }
            ChannelMode::Separate | ChannelMode::MidSide => {
                for i in 0..size {
                    let left = values[i].norm();
                    let right = values[size + i].norm();
                    let slope = self.slope_map[i];

                    for graph in &mut self.graphs {
                        let state = &mut graph.states[i];
                        state.magnitude = left.max(state.magnitude * graph.pole);
                        state.phase = right.max(state.phase * graph.pole);

                        let d_left = slope * state.magnitude * min_frac_recip;
                        let d_right = slope * state.phase * min_frac_recip;
                        graph.results[i].magnitude = if d_left > 0.0 {
                            d_left.ln() * delta_y_recip
                        } else {
                            clip
                        };
                        graph.results[i].phase = if d_right > 0.0 {
                            d_right.ln() * delta_y_recip
                        } else {
                            clip
                        };
                    }
                }
            }
            ChannelMode::Phase => {
                let mut phase_poles = [0.0f32; LINE_GRAPH_COUNT];
                for (pole, graph) in phase_poles.iter_mut().zip(&self.graphs) {
                    *pole = graph.pole.powf(0.3);
                }

                for i in 0..size {
                    // lane 0 carries |L| + |R|, halved to per-channel scale
                    let magnitude = values[i].re * 0.5;
                    let cancellation = values[i].im * magnitude;
                    let slope = self.slope_map[i];

                    for (graph, &phase_pole) in self.graphs.iter_mut().zip(&phase_poles) {
                        let state = &mut graph.states[i];
                        state.magnitude = magnitude.max(state.magnitude * graph.pole);
                        state.phase = cancellation + phase_pole * (state.phase - cancellation);

                        let d = slope * state.magnitude * min_frac_recip;
                        let d_phase = slope * state.phase * min_frac_recip;
                        graph.results[i].magnitude =
                            if d > 0.0 { d.ln() * delta_y_recip } else { clip };
                        graph.results[i].phase = if d_phase > 0.0 {
                            d_phase.ln() * delta_y_recip
                        } else {
                            clip
                        };
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vz_core::{SpectrumParams, ViewScaling};

    fn pipeline(mutate: impl FnOnce(&mut SpectrumParams)) -> DisplayPipeline {
        let mut params = SpectrumParams::default();
        params.axis_points = 4;
        params.view_scale = ViewScaling::Linear;
        mutate(&mut params);
        let constant = TransformConstant::build(&params, 48_000.0).unwrap();

        let mut display = DisplayPipeline::new();
        display.configure(
            &constant,
            PowerSlope::default(),
            params.low_dbs,
            params.high_dbs,
            params.slow_pole,
            params.fast_pole,
        );
        display
    }

    fn frame(values: &[f32]) -> Vec<Complex<f32>> {
        values.iter().map(|&v| Complex::new(v, 0.0)).collect()
    }

    #[test]
    fn test_peak_decay_sequence() {
        let mut display = pipeline(|p| p.slow_pole = 0.5);

        let mut observed = Vec::new();
        for input in [1.0, 0.0, 0.0, 0.0, 0.0] {
            display.process(&frame(&[input, 0.0, 0.0, 0.0]));
            observed.push(display.states(LineGraph::Slow)[0].magnitude);
        }
        assert_eq!(observed, vec![1.0, 0.5, 0.25, 0.125, 0.0625]);
    }

    #[test]
    fn test_peak_decay_monotone_floor() {
        let mut display = pipeline(|p| p.fast_pole = 0.7);

        let mut previous = 0.0f32;
        for input in [0.3, 0.9, 0.1, 0.0, 0.5, 0.0] {
            display.process(&frame(&[input, 0.0, 0.0, 0.0]));
            let state = display.states(LineGraph::Fast)[0].magnitude;
            assert!(state >= previous * 0.7 - 1e-9);
            previous = state;
        }
    }

    #[test]
    fn test_transform_graph_tracks_input() {
        let mut display = pipeline(|_| {});
        display.process(&frame(&[0.8, 0.0, 0.0, 0.0]));
        display.process(&frame(&[0.2, 0.0, 0.0, 0.0]));
        // pole 0 means the state is always the latest magnitude
        assert!((display.states(LineGraph::Transform)[0].magnitude - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_display_range_endpoints() {
        let mut display = pipeline(|p| {
            p.low_dbs = -60.0;
            p.high_dbs = 0.0;
        });

        let bottom = db_to_fraction(-60.0) as f32;
        display.process(&frame(&[1.0, bottom, 0.0, 0.0]));
        let results = display.results(LineGraph::Transform);

        assert!((results[0].magnitude - 1.0).abs() < 1e-5);
        assert!(results[1].magnitude.abs() < 1e-5);
        assert_eq!(results[2].magnitude, 0.0);
    }

    #[test]
    fn test_dual_mode_lanes_are_independent() {
        let mut display = pipeline(|p| {
            p.configuration = ChannelMode::Separate;
        });

        let values: Vec<Complex<f32>> = [1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.5]
            .iter()
            .map(|&v| Complex::new(v, 0.0))
            .collect();
        display.process(&values);

        let states = display.states(LineGraph::Transform);
        assert!((states[0].magnitude - 1.0).abs() < 1e-9);
        assert_eq!(states[0].phase, 0.0);
        assert!((states[3].phase - 0.5).abs() < 1e-9);
    }
}
