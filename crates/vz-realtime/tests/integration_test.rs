//! End-to-end pipeline scenarios: frame-drop accounting under an absent
//! consumer, and configuration switches mid-blob.

use std::sync::Arc;

use vz_core::{ChannelMode, SharedParams, SpectrumParams, ViewScaling, WindowFunction};
use vz_realtime::{spectrum_engine, SpectrumConsumer, SpectrumProcessor};

fn engine(
    mutate: impl FnOnce(&mut SpectrumParams),
    queue_capacity: usize,
) -> (SpectrumProcessor, SpectrumConsumer, Arc<SharedParams>) {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut params = SpectrumParams::default();
    params.window_size = 16;
    params.axis_points = 9;
    params.blob_size_ms = 0.0; // clamps to the 10-sample floor
    params.view_scale = ViewScaling::Linear;
    params.dsp_window.function = WindowFunction::Rectangular;
    mutate(&mut params);

    let shared = Arc::new(SharedParams::new(params));
    let (processor, consumer) = spectrum_engine(Arc::clone(&shared), queue_capacity);
    (processor, consumer, shared)
}

fn noise(len: usize, seed: u32) -> Vec<f32> {
    let mut state = seed.max(1);
    (0..len)
        .map(|_| {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            (state >> 9) as f32 / (1 << 23) as f32 - 1.0
        })
        .collect()
}

#[test]
fn test_frame_drop_accounting_with_absent_consumer() {
    let (mut processor, consumer, _shared) = engine(|_| {}, 4);

    // first callback only fills the history (views were empty: one skip)
    let l = noise(16, 21);
    let r = noise(16, 22);
    processor.on_stream_audio(&[&l, &r]);
    assert_eq!(processor.diagnostics().produced_frames, 0);

    // 100 further samples: blob counter fires exactly 10 times, the
    // consumer never polls, so the 4-deep queue keeps 4 and drops 6
    let l = noise(100, 23);
    let r = noise(100, 24);
    processor.on_stream_audio(&[&l, &r]);

    let diag = processor.diagnostics();
    assert_eq!(diag.produced_frames + diag.dropped_frames, 10);
    assert_eq!(diag.produced_frames, 4);
    assert_eq!(diag.dropped_frames, 6);
    assert_eq!(consumer.approximate_stored_frames(), 4);
}

#[test]
fn test_channel_switch_mid_blob_emits_no_mixed_frame() {
    let (mut processor, mut consumer, shared) = engine(
        |p| {
            p.configuration = ChannelMode::Left;
        },
        64,
    );

    // identical channels: Left analysis sees signal, Side analysis silence
    let signal = noise(256, 5);

    processor.on_stream_audio(&[&signal, &signal]);
    processor.on_stream_audio(&[&signal, &signal]);

    // park the counter mid-blob, then switch the configuration
    let half_blob = noise(5, 6);
    processor.on_stream_audio(&[&half_blob, &half_blob]);

    while consumer.poll_frame().is_some() {}
    shared
        .update(|p| p.configuration = ChannelMode::Side)
        .unwrap();

    processor.on_stream_audio(&[&signal, &signal]);

    // every frame emitted after the switch uses Side math only: with
    // identical channels that is digital silence at every point
    let mut seen = 0;
    while let Some(frame) = consumer.poll_frame() {
        seen += 1;
        for (i, value) in frame.iter().enumerate() {
            assert!(
                value.norm() < 1e-6,
                "mixed-configuration energy at point {i}: {}",
                value.norm()
            );
        }
    }
    assert!(seen > 0, "the switch must not stall frame production");
}

#[test]
fn test_sample_rate_change_rebuilds_constants() {
    let (mut processor, _consumer, _shared) = engine(|_| {}, 8);
    let l = noise(64, 9);
    let r = noise(64, 10);

    processor.on_stream_audio(&[&l, &r]);
    let rebuilds = processor.diagnostics().constant_rebuilds;
    assert_eq!(rebuilds, 1);

    processor.on_stream_properties_changed(96_000.0);
    processor.on_stream_audio(&[&l, &r]);
    assert_eq!(processor.diagnostics().constant_rebuilds, rebuilds + 1);
}

#[test]
fn test_resonator_line_graph_snapshot_on_demand() {
    use rustfft::num_complex::Complex;
    use vz_core::Algorithm;

    let (mut processor, mut consumer, _shared) = engine(
        |p| {
            p.algorithm = Algorithm::Resonator;
            p.window_size = 512;
            p.axis_points = 16;
        },
        8,
    );

    // line-graph resonator mode produces no queued frames; state is
    // pulled on demand instead
    let tone: Vec<f32> = (0..48_000)
        .map(|i| (2.0 * std::f64::consts::PI * 6_000.0 * i as f64 / 48_000.0).sin() as f32)
        .collect();
    processor.on_stream_audio(&[&tone, &tone]);
    assert_eq!(processor.diagnostics().produced_frames, 0);

    // the consumer learns the configuration on its polling path
    assert!(!consumer.process_next_frame());

    let mut out = vec![Complex::new(0.0f64, 0.0); 16];
    assert!(consumer.resonator_snapshot(&mut out));
    assert!(out.iter().any(|value| value.norm() > 0.05));
}

#[test]
fn test_queued_frames_survive_suspension() {
    let (mut processor, mut consumer, _shared) = engine(|_| {}, 32);
    let l = noise(128, 13);
    let r = noise(128, 14);
    processor.on_stream_audio(&[&l, &r]);
    processor.on_stream_audio(&[&l, &r]);

    let stored = consumer.approximate_stored_frames();
    assert!(stored > 0);

    consumer.set_suspended(true);
    // in-flight frames remain poppable while suspended
    assert!(consumer.poll_frame().is_some());
}
