//! The flattened network: nodes, driver records and primitive instances.
//!
//! All cross-references are plain indices into the network's vectors, so the
//! graph can be walked and mutated without shared ownership.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::library::Builtin;
use crate::logic::{Operand, Operator, Signal, Strength};
use crate::template::Timing;
use crate::types::{DriverId, NodeId, PrimitiveId, Priority, SimTime};

/// A primitive that must be re-evaluated when a node changes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub primitive: PrimitiveId,
}

/// One electrical net after flattening.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    /// Canonical hierarchical name
    pub name: String,
    /// Other hierarchical names bound to the same net
    pub aliases: Vec<String>,
    /// Value after arbitration
    pub settled: Signal,
    /// Value forced by stimuli
    pub forced: Signal,
    /// Driver records targeting this node
    pub drivers: Vec<DriverId>,
    /// Primitives reading this node
    pub dependents: Vec<DependencyEdge>,
    /// Sum of the load weights of every pin on this net
    pub load: f64,
    pub last_change: SimTime,
    /// Record every settled change in the observer trace
    pub observed: bool,
    /// Log firing and arbitration on this node
    pub traced: bool,
}

impl Node {
    fn new(id: NodeId, name: String) -> Self {
        Self {
            id,
            name,
            aliases: Vec::new(),
            settled: Signal::floating(),
            forced: Signal::floating(),
            drivers: Vec::new(),
            dependents: Vec::new(),
            load: 0.0,
            last_change: 0.0,
            observed: false,
            traced: false,
        }
    }
}

/// The request currently queued on a driver record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledDrive {
    pub op: Operator,
    pub operand: Operand<NodeId>,
    pub strength: Strength,
}

/// One primitive's contribution to one node.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Driver {
    pub id: DriverId,
    pub primitive: PrimitiveId,
    pub node: NodeId,
    /// Value this primitive currently asserts on the node
    pub pending: Signal,
    /// Latest queued request; older queued requests are stale
    pub scheduled: Option<ScheduledDrive>,
}

/// A flattened input condition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FlatCondition {
    pub node: NodeId,
    pub op: Operator,
    pub operand: Operand<NodeId>,
}

/// A flattened output assignment, bound to its driver record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FlatAssignment {
    pub node: NodeId,
    pub driver: DriverId,
    pub op: Operator,
    pub operand: Operand<NodeId>,
    pub strength: Strength,
}

/// A truth-table row with nets resolved to node ids.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FlatRow {
    pub inputs: Vec<FlatCondition>,
    pub outputs: Vec<FlatAssignment>,
    pub timing: Timing,
}

/// A function port bound to its node and, for outputs, its driver record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionPort {
    pub node: NodeId,
    pub driver: Option<DriverId>,
}

/// A function primitive bound to its built-in procedure.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FunctionInstance {
    pub builtin: Builtin,
    pub ports: Vec<FunctionPort>,
    pub timing: Timing,
}

/// Behavior of a primitive.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum PrimitiveKind {
    Gate { rows: Vec<FlatRow> },
    Function(FunctionInstance),
}

/// One flattened gate or function instance.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Primitive {
    pub id: PrimitiveId,
    /// Hierarchical instance path
    pub path: String,
    /// Name of the template it was created from
    pub template: String,
    pub kind: PrimitiveKind,
    pub fanout: bool,
    pub priority: Priority,
}

/// The flat simulation graph.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Network {
    pub nodes: Vec<Node>,
    pub drivers: Vec<Driver>,
    pub primitives: Vec<Primitive>,
    names: HashMap<String, NodeId>,
}

impl Network {
    /// Creates an empty network.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a new node with the given canonical name.
    pub fn add_node(&mut self, name: impl Into<String>) -> NodeId {
        let id = self.nodes.len();
        let name = name.into();
        self.names.insert(name.clone(), id);
        self.nodes.push(Node::new(id, name));
        id
    }

    /// Binds an extra hierarchical name to an existing node.
    pub fn add_alias(&mut self, node: NodeId, alias: impl Into<String>) {
        let alias = alias.into();
        if self.names.contains_key(&alias) {
            return;
        }
        self.names.insert(alias.clone(), node);
        if let Some(n) = self.nodes.get_mut(node) {
            n.aliases.push(alias);
        }
    }

    /// Returns the driver record of `primitive` on `node`, creating it if needed.
    pub fn add_driver(&mut self, primitive: PrimitiveId, node: NodeId) -> DriverId {
        if let Some(existing) = self.nodes[node]
            .drivers
            .iter()
            .copied()
            .find(|&d| self.drivers[d].primitive == primitive)
        {
            return existing;
        }
        let id = self.drivers.len();
        self.drivers.push(Driver {
            id,
            primitive,
            node,
            pending: Signal::floating(),
            scheduled: None,
        });
        self.nodes[node].drivers.push(id);
        id
    }

    /// Records that `primitive` reads `node`. Duplicate edges are ignored.
    pub fn add_dependent(&mut self, node: NodeId, primitive: PrimitiveId) {
        let edge = DependencyEdge { primitive };
        let dependents = &mut self.nodes[node].dependents;
        if !dependents.contains(&edge) {
            dependents.push(edge);
        }
    }

    /// Adds a primitive, assigning its id.
    pub fn add_primitive(&mut self, mut primitive: Primitive) -> PrimitiveId {
        let id = self.primitives.len();
        primitive.id = id;
        self.primitives.push(primitive);
        id
    }

    /// Looks up a node by canonical name or alias.
    pub fn find_node(&self, name: &str) -> Option<NodeId> {
        self.names.get(name).copied()
    }

    /// Returns a node by id.
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Returns a mutable node by id.
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    /// Returns a driver record by id.
    pub fn driver(&self, id: DriverId) -> Option<&Driver> {
        self.drivers.get(id)
    }

    /// Returns a primitive by id.
    pub fn primitive(&self, id: PrimitiveId) -> Option<&Primitive> {
        self.primitives.get(id)
    }

    /// Returns the number of nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Returns the number of driver records.
    pub fn driver_count(&self) -> usize {
        self.drivers.len()
    }

    /// Returns the number of primitives.
    pub fn primitive_count(&self) -> usize {
        self.primitives.len()
    }

    /// Clears all run-time state: node values, driver records and built-in
    /// history. Structure, loads and observer flags are kept.
    pub fn reset(&mut self) {
        for node in &mut self.nodes {
            node.settled = Signal::floating();
            node.forced = Signal::floating();
            node.last_change = 0.0;
        }
        for driver in &mut self.drivers {
            driver.pending = Signal::floating();
            driver.scheduled = None;
        }
        for primitive in &mut self.primitives {
            if let PrimitiveKind::Function(func) = &mut primitive.kind {
                func.builtin.reset();
            }
        }
    }
}
