//! Persisted host-graph layout records

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use vz_core::{VzError, VzResult};

/// Format version of [`GraphLayout`].
pub const LAYOUT_VERSION: u32 = 1;

/// One serialised routing edge: the stable id of the peer the input comes
/// from, plus the directed port pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub peer: Uuid,
    pub source_port: i16,
    pub dest_port: i16,
}

/// The versioned on-disk record of one node: its name, its optional stable
/// identity and every serialised input edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphLayout {
    pub version: u32,
    pub name: String,
    pub id: Option<Uuid>,
    pub edges: Vec<EdgeRecord>,
}

impl GraphLayout {
    /// Encode for persistence.
    pub fn to_json(&self) -> VzResult<String> {
        serde_json::to_string(self).map_err(|e| VzError::Serialization(e.to_string()))
    }

    /// Decode a persisted record. Unknown versions are rejected before any
    /// state is touched.
    pub fn from_json(text: &str) -> VzResult<Self> {
        let layout: Self =
            serde_json::from_str(text).map_err(|e| VzError::Serialization(e.to_string()))?;
        if layout.version != LAYOUT_VERSION {
            return Err(VzError::Serialization(format!(
                "unsupported layout version {}",
                layout.version
            )));
        }
        Ok(layout)
    }
}
