//! Event definitions for the simulator.
//!
//! An event is a scheduled future change: a forced value on a node, a drive
//! request on a driver record, or the re-arming of a clock stimulus.

use serde::{Deserialize, Serialize};

use crate::logic::{Operand, Operator, State, Strength};
use crate::types::{DriverId, NodeId, Priority, SimTime};

/// Represents a scheduled event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// The simulation time at which this event fires
    pub time: SimTime,
    /// Firing priority among events at the same time
    pub priority: Priority,
    /// What the event does when it fires
    pub action: EventAction,
}

impl Event {
    /// Creates a new event.
    pub fn new(time: SimTime, priority: Priority, action: EventAction) -> Self {
        Self {
            time,
            priority,
            action,
        }
    }

    /// Creates a stimulus event forcing a node.
    pub fn force(time: SimTime, priority: Priority, node: NodeId, state: State, strength: Strength) -> Self {
        Self::new(
            time,
            priority,
            EventAction::Force {
                node,
                state,
                strength,
            },
        )
    }

    /// Creates a drive event on a driver record.
    pub fn drive(
        time: SimTime,
        priority: Priority,
        driver: DriverId,
        op: Operator,
        operand: Operand<NodeId>,
        strength: Strength,
    ) -> Self {
        Self::new(
            time,
            priority,
            EventAction::Drive {
                driver,
                op,
                operand,
                strength,
            },
        )
    }

    /// Creates a clock re-arm event.
    pub fn clock(time: SimTime, priority: Priority, clock: usize, remaining: u32) -> Self {
        Self::new(time, priority, EventAction::Clock { clock, remaining })
    }
}

/// The action performed by an event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum EventAction {
    /// Overwrite a node's forced value.
    Force {
        node: NodeId,
        state: State,
        strength: Strength,
    },

    /// Apply a primitive's output request to its driver record.
    Drive {
        driver: DriverId,
        op: Operator,
        operand: Operand<NodeId>,
        strength: Strength,
    },

    /// Expand one cycle of a clock stimulus.
    ///
    /// `remaining` counts the cycles left including this one; zero repeats
    /// forever.
    Clock { clock: usize, remaining: u32 },
}

impl EventAction {
    /// Returns the node this action targets directly, if any.
    pub fn target_node(&self) -> Option<NodeId> {
        match self {
            EventAction::Force { node, .. } => Some(*node),
            EventAction::Drive { .. } | EventAction::Clock { .. } => None,
        }
    }

    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            EventAction::Force { .. } => "force",
            EventAction::Drive { .. } => "drive",
            EventAction::Clock { .. } => "clock",
        }
    }
}
