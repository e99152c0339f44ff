//! vz-graph: Live and serialisable representation of the running analyser
//! instances connected in the host graph.
//!
//! A process-wide registry tracks every live node; serialised routing
//! references between instances are resolved on load and re-bound
//! automatically as instances come and go.

mod graph;
mod layout;

pub use graph::*;
pub use layout::*;
