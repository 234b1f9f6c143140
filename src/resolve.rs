//! Multi-driver strength arbitration.

use tracing::{info, trace};

use crate::logic::{Signal, State, Strength};
use crate::network::Network;
use crate::types::{NodeId, SimTime};

/// Folds driven values into `start`.
///
/// A stronger value replaces the running one; an equally strong value with a
/// different state makes the result `UNKNOWN`.
pub fn arbitrate(start: Signal, values: impl IntoIterator<Item = Signal>) -> Signal {
    values.into_iter().fold(start, |acc, value| {
        if value.strength > acc.strength {
            value
        } else if value.strength == acc.strength && value.state != acc.state {
            Signal::new(State::UNKNOWN, acc.strength)
        } else {
            acc
        }
    })
}

/// Recomputes a node's settled value from its forced value and drivers.
///
/// An undriven node keeps its previous state at `NODE` strength. Returns
/// `Some(node)` if the settled value changed, so that the caller can
/// re-evaluate the node's dependents.
pub fn resolve(network: &mut Network, node: NodeId, now: SimTime) -> Option<NodeId> {
    let target = network.nodes.get(node)?;
    let pending = target.drivers.iter().map(|&d| network.drivers[d].pending);
    let mut value = arbitrate(target.forced, pending);

    if value.strength == Strength::OFF {
        value = Signal::new(target.settled.state, Strength::NODE);
    }

    if target.traced {
        info!(
            node = %target.name,
            time = now,
            forced = %target.forced,
            drivers = target.drivers.len(),
            result = %value,
            "arbitration"
        );
    }

    if value == target.settled {
        trace!(node, %value, "node unchanged");
        return None;
    }

    let target = &mut network.nodes[node];
    trace!(node, from = %target.settled, to = %value, time = now, "node changed");
    target.settled = value;
    target.last_change = now;
    Some(node)
}
