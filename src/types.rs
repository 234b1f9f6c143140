//! Core type definitions for the simulator.
//!
//! This module defines the fundamental identifiers and scalar types used
//! throughout the flattener, the event queue and the simulation driver.

/// Simulation time (seconds, or whatever unit the netlist delays are written in).
///
/// Delays carry fractional random and fanout-scaled components, so time is a
/// real number. The event queue orders it with `f64::total_cmp`.
pub type SimTime = f64;

/// Index of a flattened electrical net in the network.
pub type NodeId = usize;

/// Index of a flattened gate or function instance in the network.
pub type PrimitiveId = usize;

/// Index of a driver record (one primitive's contribution to one node).
pub type DriverId = usize;

/// Firing priority of an event. Among events at the same time, the
/// numerically higher priority fires first.
pub type Priority = i32;

/// Priority given to primitives that declare none, and to clock vectors.
pub const DEFAULT_PRIORITY: Priority = 1;

/// Priority given to forced stimuli and to templates whose timing has a
/// random-dominance component.
pub const DEFERRED_PRIORITY: Priority = 0;

/// Priority forced onto an event when its row wins the random-dominance draw.
pub const OVERRIDE_PRIORITY: Priority = Priority::MAX;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_aliases() {
        let time: SimTime = 1.5e-9;
        let node: NodeId = 42;
        let prim: PrimitiveId = 7;
        let driver: DriverId = 3;

        assert_eq!(time, 1.5e-9);
        assert_eq!(node, 42);
        assert_eq!(prim, 7);
        assert_eq!(driver, 3);
    }

    #[test]
    fn test_priority_ordering() {
        assert!(OVERRIDE_PRIORITY > DEFAULT_PRIORITY);
        assert!(DEFAULT_PRIORITY > DEFERRED_PRIORITY);
    }
}
