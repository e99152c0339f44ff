//! Runtime SIMD capability lookup
//!
//! Detection happens once at startup; the audio entry points dispatch to a
//! width-blocked inner loop based on the detected class. The scalar path is
//! the reference implementation; wider paths must agree with it within
//! accumulated rounding tolerance.

use std::sync::OnceLock;

/// Detected vector width class, in f64 lanes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SimdWidth {
    Scalar,
    Quad,
    Octa,
}

impl SimdWidth {
    /// Number of lanes processed per block iteration.
    #[inline]
    pub const fn lanes(self) -> usize {
        match self {
            SimdWidth::Scalar => 1,
            SimdWidth::Quad => 4,
            SimdWidth::Octa => 8,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            SimdWidth::Scalar => "scalar",
            SimdWidth::Quad => "4-lane",
            SimdWidth::Octa => "8-lane",
        }
    }
}

static DETECTED_WIDTH: OnceLock<SimdWidth> = OnceLock::new();

/// Best available vector width for this process. Computed once.
pub fn detect_simd_width() -> SimdWidth {
    *DETECTED_WIDTH.get_or_init(|| {
        #[cfg(target_arch = "x86_64")]
        {
            if is_x86_feature_detected!("avx512f") {
                return SimdWidth::Octa;
            }
            if is_x86_feature_detected!("avx2") {
                return SimdWidth::Quad;
            }
            SimdWidth::Scalar
        }

        #[cfg(target_arch = "aarch64")]
        {
            // NEON is baseline on aarch64
            SimdWidth::Quad
        }

        #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
        {
            SimdWidth::Scalar
        }
    })
}
