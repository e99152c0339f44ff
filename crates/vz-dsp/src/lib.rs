//! vz-dsp: Frequency analysis engine for the Vizor analyser
//!
//! Implements the two interchangeable analysis algorithms (windowed FFT and
//! a bank of complex resonators), the per-configuration derived constants,
//! the channel fan-in, the bin-to-axis-point mapper, the magnitude
//! post-filter and the vectorscope meters.

mod constant;
mod display;
mod fft;
mod interpolate;
mod mapper;
mod resonator;
mod scope;
mod simd;
mod stream;
mod window;

pub use constant::*;
pub use display::*;
pub use fft::*;
pub use interpolate::*;
pub use resonator::*;
pub use scope::*;
pub use simd::*;
pub use stream::*;
pub use window::*;
