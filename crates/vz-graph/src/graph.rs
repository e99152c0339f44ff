//! Process-wide host-graph topology manager
//!
//! Every live analyser instance registers a node in a registry domain
//! (normally the process-global one). Nodes own a serialisable topology:
//! a mapping from stable peer identities to recorded input edges. Edges to
//! peers that are not currently alive are tolerated and stored; when a
//! node carrying the referenced identity appears (or is re-identified by
//! deserialisation), the edge is re-bound and replayed to the stream-mix
//! primitive automatically.
//!
//! All graph observation and mutation serialises on the domain's single
//! lock; broadcasts happen while it is held.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, OnceLock};

use log::warn;
use parking_lot::Mutex;
use uuid::Uuid;

use vz_core::{VzError, VzResult};

use crate::layout::{EdgeRecord, GraphLayout, LAYOUT_VERSION};

/// Port index type. `-1` is the invalid sentinel.
pub type PinInt = i16;

/// Sentinel for "no port".
pub const INVALID_PIN: PinInt = -1;

/// An edge descriptor between channel ports of two instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct PortPair {
    pub source: PinInt,
    pub dest: PinInt,
}

impl PortPair {
    pub fn new(source: PinInt, dest: PinInt) -> Self {
        Self { source, dest }
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.source != INVALID_PIN && self.dest != INVALID_PIN
    }
}

/// Stable 128-bit node identity. Compared bitwise, ordered
/// lexicographically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeUid(Uuid);

impl NodeUid {
    /// Mint a fresh random identity.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    #[inline]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl From<Uuid> for NodeUid {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

/// Process-local handle of a live node. Never reused within a domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeHandle(u64);

/// The stream-mix primitive live edges are submitted to.
pub trait StreamMix: Send {
    fn connect(&mut self, source: NodeHandle, pair: PortPair);
    fn disconnect(&mut self, source: NodeHandle, pair: PortPair);
    /// Number of ports this node exposes to the model view.
    fn port_count(&self) -> usize {
        2
    }
}

/// Mix event recorded by [`RecordingMix`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MixEvent {
    Connect(NodeHandle, PortPair),
    Disconnect(NodeHandle, PortPair),
}

/// Recording mix used by tests and headless hosts: remembers the event log
/// and the currently live edge set.
#[derive(Default, Clone)]
pub struct RecordingMix {
    events: Arc<Mutex<Vec<MixEvent>>>,
    live: Arc<Mutex<BTreeSet<(NodeHandle, PortPair)>>>,
}

impl RecordingMix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<MixEvent> {
        self.events.lock().clone()
    }

    pub fn live_connections(&self) -> Vec<(NodeHandle, PortPair)> {
        self.live.lock().iter().copied().collect()
    }
}

impl StreamMix for RecordingMix {
    fn connect(&mut self, source: NodeHandle, pair: PortPair) {
        self.events.lock().push(MixEvent::Connect(source, pair));
        self.live.lock().insert((source, pair));
    }

    fn disconnect(&mut self, source: NodeHandle, pair: PortPair) {
        self.events.lock().push(MixEvent::Disconnect(source, pair));
        self.live.lock().remove(&(source, pair));
    }
}

/// What changed about a node, for observer notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DetailChange {
    Rename,
    Reidentified,
}

/// Recorded relation towards one serialised peer.
#[derive(Default)]
struct Relation {
    live: Option<NodeHandle>,
    inputs: BTreeSet<PortPair>,
}

struct NodeState {
    name: String,
    uid: Option<NodeUid>,
    topology: BTreeMap<NodeUid, Relation>,
    expected_resurrections: usize,
    version: u64,
    mix: Box<dyn StreamMix>,
}

#[derive(Default)]
struct Registry {
    nodes: BTreeMap<NodeHandle, NodeState>,
    next_handle: u64,
    global_version: u64,
}

/// A registry domain. The process normally uses [`GraphDomain::global`];
/// tests may create isolated domains.
#[derive(Clone, Default)]
pub struct GraphDomain {
    registry: Arc<Mutex<Registry>>,
}

static GLOBAL_DOMAIN: OnceLock<GraphDomain> = OnceLock::new();

impl GraphDomain {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide domain shared by every plug-in instance.
    pub fn global() -> Self {
        GLOBAL_DOMAIN.get_or_init(GraphDomain::new).clone()
    }

    /// Number of currently live nodes.
    pub fn node_count(&self) -> usize {
        self.registry.lock().nodes.len()
    }
}

/// Per-node view of the model, with the node's slice of the connection
/// list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeView {
    pub id: NodeUid,
    pub name: String,
    pub connection_offset: usize,
    pub connection_count: usize,
    pub port_count: usize,
    pub version: u64,
}

/// Snapshot of the whole graph from one host node's perspective.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphModel {
    pub nodes: Vec<NodeView>,
    pub connections: Vec<PortPair>,
    pub host_index: usize,
    pub version: u64,
    /// Global version observed at the time of the previous read; lets the
    /// caller diff consecutive models.
    pub previous_version: u64,
}

impl GraphModel {
    pub fn did_change(&self, view: &NodeView) -> bool {
        view.version >= self.previous_version
    }
}

/// A live node of the host graph. Registers itself on construction and
/// de-registers (disconnecting all incident live edges) on drop.
pub struct HostGraphNode {
    domain: GraphDomain,
    handle: NodeHandle,
}

impl HostGraphNode {
    pub fn new(domain: &GraphDomain, name: &str, mix: Box<dyn StreamMix>) -> Self {
        let mut registry = domain.registry.lock();
        let handle = NodeHandle(registry.next_handle);
        registry.next_handle += 1;

        registry.nodes.insert(
            handle,
            NodeState {
                name: name.to_string(),
                uid: None,
                topology: BTreeMap::new(),
                expected_resurrections: 0,
                version: 0,
                mix,
            },
        );

        broadcast_created(&mut registry, handle);

        Self {
            domain: domain.clone(),
            handle,
        }
    }

    #[inline]
    pub fn handle(&self) -> NodeHandle {
        self.handle
    }

    pub fn name(&self) -> String {
        self.domain.registry.lock().nodes[&self.handle].name.clone()
    }

    pub fn set_name(&self, name: &str) {
        let mut registry = self.domain.registry.lock();
        if let Some(state) = registry.nodes.get_mut(&self.handle) {
            if state.name != name {
                state.name = name.to_string();
                broadcast_detail_change(&mut registry, self.handle, DetailChange::Rename);
            }
        }
    }

    /// The stable identity, generated lazily the first time it is needed.
    pub fn uid(&self) -> NodeUid {
        let mut registry = self.domain.registry.lock();
        ensure_uid(&mut registry, self.handle)
    }

    /// Record an input edge from `peer`. If the peer is currently live the
    /// edge is also submitted to the mix; otherwise it is stored and
    /// replayed when a node carrying that identity appears. Returns
    /// `false` when the exact edge was already recorded.
    pub fn connect(&self, peer: NodeUid, pair: PortPair) -> bool {
        let mut registry = self.domain.registry.lock();
        let registry = &mut *registry;

        let resolved = resolve_uid(&registry.nodes, peer);
        let node = registry
            .nodes
            .get_mut(&self.handle)
            .expect("node alive while handle exists");

        let known = node.topology.contains_key(&peer);
        let relation = node.topology.entry(peer).or_default();
        if !relation.inputs.insert(pair) {
            return false;
        }

        if let Some(peer_handle) = resolved {
            relation.live = Some(peer_handle);
            node.mix.connect(peer_handle, pair);
        } else if !known {
            // only expect this once per peer
            node.expected_resurrections += 1;
        }

        true
    }

    /// Remove a recorded input edge. Returns `false` when the edge was not
    /// recorded.
    pub fn disconnect(&self, peer: NodeUid, pair: PortPair) -> bool {
        let mut registry = self.domain.registry.lock();
        let registry = &mut *registry;

        let resolved = resolve_uid(&registry.nodes, peer);
        let node = registry
            .nodes
            .get_mut(&self.handle)
            .expect("node alive while handle exists");

        let known = node.topology.contains_key(&peer);
        let relation = node.topology.entry(peer).or_default();
        if !relation.inputs.remove(&pair) {
            return false;
        }

        if let Some(peer_handle) = resolved {
            node.mix.disconnect(peer_handle, pair);
        } else if !known {
            node.expected_resurrections += 1;
        }

        true
    }

    /// Diagnostic count of serialised peers still awaiting a live node.
    pub fn expected_resurrections(&self) -> usize {
        self.domain.registry.lock().nodes[&self.handle].expected_resurrections
    }

    /// Emit the persistable record of this node: name, identity (generated
    /// now if the node had none) and every serialised edge.
    pub fn serialize_layout(&self) -> GraphLayout {
        let mut registry = self.domain.registry.lock();
        let uid = ensure_uid(&mut registry, self.handle);
        let node = &registry.nodes[&self.handle];

        let mut edges = Vec::new();
        for (peer, relation) in &node.topology {
            for pair in &relation.inputs {
                edges.push(EdgeRecord {
                    peer: peer.as_uuid(),
                    source_port: pair.source,
                    dest_port: pair.dest,
                });
            }
        }

        GraphLayout {
            version: LAYOUT_VERSION,
            name: node.name.clone(),
            id: Some(uid.as_uuid()),
            edges,
        }
    }

    /// Load a persisted record: clear the topology, re-read the edges,
    /// rebind against every currently live peer, then apply the identity
    /// transition. An unsupported record leaves the node untouched.
    pub fn deserialize_layout(&self, layout: &GraphLayout) -> VzResult<()> {
        if layout.version != LAYOUT_VERSION {
            return Err(VzError::Serialization(format!(
                "unsupported layout version {}",
                layout.version
            )));
        }

        let mut registry = self.domain.registry.lock();
        let registry = &mut *registry;

        clear_topology(registry, self.handle);

        let node = registry
            .nodes
            .get_mut(&self.handle)
            .expect("node alive while handle exists");
        let old_name = std::mem::replace(&mut node.name, layout.name.clone());
        let had_uid = node.uid;

        for edge in &layout.edges {
            node.topology
                .entry(NodeUid::from(edge.peer))
                .or_default()
                .inputs
                .insert(PortPair::new(edge.source_port, edge.dest_port));
        }
        node.expected_resurrections = node.topology.len();

        if !node.topology.is_empty() {
            let candidates: Vec<NodeHandle> = registry
                .nodes
                .iter()
                .filter(|(_, state)| state.uid.is_some())
                .map(|(handle, _)| *handle)
                .collect();
            for other in candidates {
                try_rebuild_topology(registry, self.handle, other);
            }
        }

        // identity transitions:
        //   none -> none: silent
        //   *    -> some: adopt and announce the re-identification
        //   some -> none: the node becomes nameless; announce as a
        //                 destruction followed by a creation
        let incoming = layout.id.map(NodeUid::from);
        match (had_uid, incoming) {
            (None, None) => {}
            (_, Some(uid)) => {
                if let Some(state) = registry.nodes.get_mut(&self.handle) {
                    state.uid = Some(uid);
                }
                broadcast_detail_change(registry, self.handle, DetailChange::Reidentified);
            }
            (Some(_), None) => {
                broadcast_destroyed(registry, self.handle);
                if let Some(state) = registry.nodes.get_mut(&self.handle) {
                    state.uid = None;
                }
                broadcast_created(registry, self.handle);
            }
        }

        let renamed = registry
            .nodes
            .get(&self.handle)
            .is_some_and(|state| state.name != old_name);
        if renamed {
            broadcast_detail_change(registry, self.handle, DetailChange::Rename);
        }

        Ok(())
    }

    /// Persist to JSON.
    pub fn serialize(&self) -> VzResult<String> {
        self.serialize_layout().to_json()
    }

    /// Restore from JSON. A malformed record poisons nothing: the previous
    /// state stays untouched.
    pub fn deserialize(&self, text: &str) -> VzResult<()> {
        let layout = GraphLayout::from_json(text)?;
        self.deserialize_layout(&layout)
    }

    /// Snapshot the graph from this node's perspective.
    pub fn model(&self) -> GraphModel {
        let mut model = GraphModel::default();
        self.update_model(&mut model);
        model
    }

    /// Refresh `model` in place, recording the global version observed at
    /// the previous read for diffing.
    pub fn update_model(&self, model: &mut GraphModel) {
        let mut registry = self.domain.registry.lock();
        let previous = registry.global_version;
        *model = model_of(&mut registry, self.handle);
        model.previous_version = previous;
    }
}

impl Drop for HostGraphNode {
    fn drop(&mut self) {
        let mut registry = self.domain.registry.lock();
        broadcast_destroyed(&mut registry, self.handle);
        registry.nodes.remove(&self.handle);
    }
}

// ───────────────────────────────────────────────────────────────────────────
// registry internals (all run under the domain lock)
// ───────────────────────────────────────────────────────────────────────────

fn resolve_uid(nodes: &BTreeMap<NodeHandle, NodeState>, uid: NodeUid) -> Option<NodeHandle> {
    nodes
        .iter()
        .find(|(_, state)| state.uid == Some(uid))
        .map(|(handle, _)| *handle)
}

fn ensure_uid(registry: &mut Registry, handle: NodeHandle) -> NodeUid {
    let state = registry
        .nodes
        .get_mut(&handle)
        .expect("node alive while handle exists");
    *state.uid.get_or_insert_with(NodeUid::generate)
}

/// Re-bind the observer's serialised relation to `other` if the observer
/// is waiting for that identity, replaying every recorded edge to the mix.
fn try_rebuild_topology(registry: &mut Registry, observer: NodeHandle, other: NodeHandle) {
    let Some(other_uid) = registry.nodes.get(&other).and_then(|state| state.uid) else {
        return;
    };
    let Some(state) = registry.nodes.get_mut(&observer) else {
        return;
    };

    let Some(relation) = state.topology.get_mut(&other_uid) else {
        return;
    };
    if relation.live.is_some() {
        return;
    }

    if state.expected_resurrections == 0 {
        // the accounting invariant failed; skip the rebinding
        debug_assert!(false, "rebinding with no expected resurrections");
        warn!("host graph: rebinding skipped, resurrection accounting is off");
        return;
    }

    relation.live = Some(other);
    state.expected_resurrections -= 1;
    let pairs: Vec<PortPair> = relation.inputs.iter().copied().collect();
    for pair in pairs {
        state.mix.connect(other, pair);
    }
}

/// Drop the live binding of the observer's relation to `uid`, submitting
/// disconnects with the still-valid handle first. With `erase` the whole
/// serialised record goes too; otherwise the node is expected to return.
fn reset_instanced_topology_for(
    registry: &mut Registry,
    observer: NodeHandle,
    uid: NodeUid,
    erase: bool,
) -> bool {
    let Some(state) = registry.nodes.get_mut(&observer) else {
        return false;
    };

    let (live, pairs) = match state.topology.get_mut(&uid) {
        Some(relation) => (
            relation.live.take(),
            relation.inputs.iter().copied().collect::<Vec<_>>(),
        ),
        None => return false,
    };

    if let Some(live) = live {
        for pair in pairs {
            state.mix.disconnect(live, pair);
        }
        if !erase {
            state.expected_resurrections += 1;
        }
    }

    if erase {
        state.topology.remove(&uid);
    }

    true
}

fn clear_topology(registry: &mut Registry, observer: NodeHandle) {
    let peers: Vec<NodeUid> = registry
        .nodes
        .get(&observer)
        .map(|state| state.topology.keys().copied().collect())
        .unwrap_or_default();
    for uid in peers {
        reset_instanced_topology_for(registry, observer, uid, true);
    }
    if let Some(state) = registry.nodes.get_mut(&observer) {
        state.topology.clear();
        state.expected_resurrections = 0;
    }
}

fn broadcast_created(registry: &mut Registry, created: NodeHandle) {
    let observers: Vec<NodeHandle> = registry
        .nodes
        .keys()
        .copied()
        .filter(|handle| *handle != created)
        .collect();
    for observer in observers {
        on_node_created(registry, observer, created);
    }
}

fn broadcast_destroyed(registry: &mut Registry, destroyed: NodeHandle) {
    let observers: Vec<NodeHandle> = registry.nodes.keys().copied().collect();
    for observer in observers {
        on_node_destroyed(registry, observer, destroyed);
    }
}

fn broadcast_detail_change(registry: &mut Registry, subject: NodeHandle, change: DetailChange) {
    let version = registry.global_version;
    registry.global_version += 1;
    if let Some(state) = registry.nodes.get_mut(&subject) {
        state.version = version;
    }

    let observers: Vec<NodeHandle> = registry.nodes.keys().copied().collect();
    for observer in observers {
        on_detail_change(registry, observer, subject, change);
    }
}

fn on_node_created(registry: &mut Registry, observer: NodeHandle, created: NodeHandle) {
    let waiting = registry
        .nodes
        .get(&observer)
        .is_some_and(|state| state.expected_resurrections > 0);
    if !waiting {
        return;
    }
    if registry.nodes.get(&created).and_then(|s| s.uid).is_none() {
        return;
    }
    try_rebuild_topology(registry, observer, created);
}

fn on_detail_change(
    registry: &mut Registry,
    observer: NodeHandle,
    subject: NodeHandle,
    change: DetailChange,
) {
    if change != DetailChange::Reidentified {
        return;
    }
    let waiting = registry
        .nodes
        .get(&observer)
        .is_some_and(|state| state.expected_resurrections > 0);
    if !waiting {
        return;
    }
    if registry.nodes.get(&subject).and_then(|s| s.uid).is_none() {
        return;
    }
    try_rebuild_topology(registry, observer, subject);
}

fn on_node_destroyed(registry: &mut Registry, observer: NodeHandle, destroyed: NodeHandle) {
    let Some(uid) = registry.nodes.get(&destroyed).and_then(|state| state.uid) else {
        return;
    };
    reset_instanced_topology_for(registry, observer, uid, false);
}

fn model_of(registry: &mut Registry, host: NodeHandle) -> GraphModel {
    let mut model = GraphModel::default();
    let handles: Vec<NodeHandle> = registry.nodes.keys().copied().collect();

    for handle in handles {
        let uid = ensure_uid(registry, handle);
        let offset = model.connections.len();

        if let Some(relation) = registry.nodes[&host].topology.get(&uid) {
            model.connections.extend(relation.inputs.iter().copied());
        }

        let state = &registry.nodes[&handle];
        model.nodes.push(NodeView {
            id: uid,
            name: state.name.clone(),
            connection_offset: offset,
            connection_count: model.connections.len() - offset,
            port_count: state.mix.port_count(),
            version: state.version,
        });

        if handle == host {
            model.host_index = model.nodes.len() - 1;
        }
    }

    model.version = registry.global_version;
    model
}
