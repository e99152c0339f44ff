//! vz-realtime: The audio-to-frame pipeline of the Vizor analyser
//!
//! Owns the stereo history ring, the bounded lock-free frame queue, and the
//! blob scheduler that decides when a transform is produced. The audio
//! thread side never blocks and never allocates outside configuration
//! boundaries; the renderer side polls frames and runs the post-filter.

mod engine;
mod queue;
mod ring;

pub use engine::*;
pub use queue::*;
pub use ring::*;
