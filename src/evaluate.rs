//! Primitive evaluation and drive scheduling.
//!
//! When a node settles to a new value every primitive that reads it is
//! re-evaluated. Gates select the first truth-table row whose conditions all
//! hold and schedule its outputs after the row delay; functions run their
//! built-in procedure. Requests land on driver records, and a request equal
//! to the one already queued on a record is dropped.

use rand::Rng;
use rand_xoshiro::Xoshiro256StarStar;
use tracing::{debug, info, trace, warn};

use crate::engine::SimError;
use crate::event::Event;
use crate::library::{DriveRequest, EvalContext};
use crate::logic::{Operand, Operator, Signal, State, Strength};
use crate::network::{FlatRow, FunctionInstance, Network, Node, PrimitiveKind, ScheduledDrive};
use crate::queue::EventQueue;
use crate::resolve::resolve;
use crate::stats::RunStats;
use crate::types::{DriverId, NodeId, PrimitiveId, Priority, SimTime, DEFAULT_PRIORITY, OVERRIDE_PRIORITY};

/// Random number generator used for delay jitter and random dominance.
pub type SimRng = Xoshiro256StarStar;

/// Result of firing a drive event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriveOutcome {
    /// A newer request replaced this one; nothing happened.
    Stale,
    /// The computed value equals the record's pending value.
    Unchanged,
    /// The pending value changed; carries the node if its settled value changed.
    Applied(Option<NodeId>),
}

/// Returns the state an operand stands for.
pub fn operand_state(nodes: &[Node], operand: &Operand<NodeId>) -> Result<State, SimError> {
    match operand {
        Operand::Const(state) => Ok(*state),
        Operand::Net(node) => nodes
            .get(*node)
            .map(|n| n.settled.state)
            .ok_or_else(|| SimError::UnknownNode(node.to_string())),
    }
}

/// Tests every input condition of a row against settled node values.
pub fn row_matches(nodes: &[Node], row: &FlatRow) -> Result<bool, SimError> {
    for cond in &row.inputs {
        let lhs = nodes[cond.node].settled.state;
        let rhs = operand_state(nodes, &cond.operand)?;
        if !cond.op.compare(lhs, rhs)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Applies a dequeued drive request to its driver record.
///
/// Node operands are read now, at fire time. If the record's pending value
/// changes, the driven node is re-arbitrated.
pub fn fire_drive(
    network: &mut Network,
    driver: DriverId,
    op: Operator,
    operand: Operand<NodeId>,
    strength: Strength,
    now: SimTime,
) -> Result<DriveOutcome, SimError> {
    let record = network
        .drivers
        .get(driver)
        .ok_or(SimError::UnknownDriver(driver))?;
    let request = ScheduledDrive {
        op,
        operand,
        strength,
    };
    if record.scheduled.as_ref() != Some(&request) {
        trace!(driver, "stale drive discarded");
        return Ok(DriveOutcome::Stale);
    }

    let node = record.node;
    let current = network.nodes[node].settled.state;
    let state = op.apply(current, operand_state(&network.nodes, &request.operand)?)?;
    let value = Signal::new(state, strength);

    let record = &mut network.drivers[driver];
    record.scheduled = None;
    if record.pending == value {
        return Ok(DriveOutcome::Unchanged);
    }
    record.pending = value;

    let target = &network.nodes[node];
    if target.traced {
        info!(
            node = %target.name,
            time = now,
            primitive = %network.primitives[record.primitive].path,
            value = %value,
            "driver fired"
        );
    }

    Ok(DriveOutcome::Applied(resolve(network, node, now)))
}

/// Schedules the consequences of a node change.
pub struct Scheduler<'a> {
    pub queue: &'a mut EventQueue,
    pub rng: &'a mut SimRng,
    pub stats: &'a mut RunStats,
    pub now: SimTime,
}

impl<'a> Scheduler<'a> {
    /// Pushes an event and updates queue statistics.
    pub fn push(&mut self, event: Event) {
        self.queue.push(event);
        self.stats.events_scheduled += 1;
        self.stats.peak_queue_size = self.stats.peak_queue_size.max(self.queue.len());
    }

    /// Re-evaluates every primitive that reads `changed`.
    pub fn evaluate_dependents(&mut self, network: &mut Network, changed: NodeId) -> Result<(), SimError> {
        let count = network.nodes[changed].dependents.len();
        for i in 0..count {
            let primitive = network.nodes[changed].dependents[i].primitive;
            self.evaluate_primitive(network, primitive, changed)?;
        }
        Ok(())
    }

    /// Evaluates a single primitive.
    pub fn evaluate_primitive(
        &mut self,
        network: &mut Network,
        primitive: PrimitiveId,
        changed: NodeId,
    ) -> Result<(), SimError> {
        self.stats.primitive_evaluations += 1;
        if matches!(network.primitives[primitive].kind, PrimitiveKind::Gate { .. }) {
            self.evaluate_gate(network, primitive)
        } else {
            self.evaluate_function(network, primitive, changed)
        }
    }

    fn evaluate_gate(&mut self, network: &mut Network, primitive: PrimitiveId) -> Result<(), SimError> {
        let prim = &network.primitives[primitive];
        let PrimitiveKind::Gate { rows } = &prim.kind else {
            return Ok(());
        };

        let mut selected = None;
        for row in rows {
            if row_matches(&network.nodes, row)? {
                selected = Some(row);
                break;
            }
        }
        let Some(row) = selected else {
            trace!(primitive = %prim.path, "no row matched");
            return Ok(());
        };

        let timing = row.timing;
        let mut priority = prim.priority;
        let mut delay = timing.delta + timing.absolute;
        if timing.linear > 0.0 {
            delay += 2.0 * self.rng.gen::<f64>() * timing.linear;
        }
        if timing.random > 0.0 && self.rng.gen::<f64>() <= timing.random {
            priority = OVERRIDE_PRIORITY;
        }
        if prim.fanout {
            if let Some(first) = row.outputs.first() {
                delay *= network.nodes[first.node].load;
            }
        }
        let time = self.now + delay;

        debug!(primitive = %prim.path, time, priority, outputs = row.outputs.len(), "row selected");
        let outputs = row.outputs.clone();
        for out in outputs {
            self.schedule_drive(network, out.driver, out.op, out.operand, out.strength, time, priority)?;
        }
        Ok(())
    }

    /// Built-in requests are always queued at `DEFAULT_PRIORITY`; a
    /// function template's own priority does not apply to them.
    fn evaluate_function(
        &mut self,
        network: &mut Network,
        primitive: PrimitiveId,
        changed: NodeId,
    ) -> Result<(), SimError> {
        let nodes = &network.nodes;
        let drivers = &network.drivers;
        let prim = &mut network.primitives[primitive];
        let PrimitiveKind::Function(FunctionInstance {
            builtin,
            ports,
            timing,
        }) = &mut prim.kind
        else {
            return Ok(());
        };

        let ctx = EvalContext {
            nodes,
            drivers,
            ports: ports.as_slice(),
            primitive,
            changed,
            now: self.now,
            delay: timing.delta,
        };
        let requests: Vec<(Option<DriverId>, DriveRequest)> = builtin
            .evaluate(&ctx)
            .into_iter()
            .map(|r| (ports[r.port].driver, r))
            .collect();
        trace!(primitive = %prim.path, builtin = %builtin, requests = requests.len(), "function evaluated");

        for (driver, request) in requests {
            match driver {
                Some(driver) => self.schedule_drive(
                    network,
                    driver,
                    Operator::Eq,
                    Operand::Const(request.state),
                    request.strength,
                    request.time,
                    DEFAULT_PRIORITY,
                )?,
                None => warn!(primitive, port = request.port, "function drove a port with no driver record"),
            }
        }
        Ok(())
    }

    /// Queues a request on a driver record unless an identical request is
    /// already queued there.
    #[allow(clippy::too_many_arguments)]
    pub fn schedule_drive(
        &mut self,
        network: &mut Network,
        driver: DriverId,
        op: Operator,
        operand: Operand<NodeId>,
        strength: Strength,
        time: SimTime,
        priority: Priority,
    ) -> Result<(), SimError> {
        let record = network
            .drivers
            .get_mut(driver)
            .ok_or(SimError::UnknownDriver(driver))?;
        let request = ScheduledDrive {
            op,
            operand,
            strength,
        };
        if record.scheduled.as_ref() == Some(&request) {
            self.stats.duplicates_suppressed += 1;
            trace!(driver, "duplicate drive suppressed");
            return Ok(());
        }

        debug!(driver, node = record.node, time, priority, op = %op, operand = %request.operand, %strength, "drive scheduled");
        let event = Event::drive(time, priority, driver, op, request.operand.clone(), strength);
        record.scheduled = Some(request);
        self.push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{FlatAssignment, FlatCondition, FunctionPort, Primitive};
    use crate::template::Timing;
    use rand::SeedableRng;

    /// `y = a & b` with one row for H/H and a catch-all L row.
    fn and_network(delay: SimTime) -> (Network, [NodeId; 3], DriverId) {
        let mut net = Network::new();
        let a = net.add_node("top.a");
        let b = net.add_node("top.b");
        let y = net.add_node("top.y");
        let p = net.add_primitive(Primitive {
            id: 0,
            path: "top.g".to_string(),
            template: "and2".to_string(),
            kind: PrimitiveKind::Gate { rows: Vec::new() },
            fanout: false,
            priority: 1,
        });
        let d = net.add_driver(p, y);
        let out = |state| FlatAssignment {
            node: y,
            driver: d,
            op: Operator::Eq,
            operand: Operand::Const(state),
            strength: Strength::GATE,
        };
        let cond = |node| FlatCondition {
            node,
            op: Operator::Eq,
            operand: Operand::Const(State::HIGH),
        };
        let rows = vec![
            FlatRow {
                inputs: vec![cond(a), cond(b)],
                outputs: vec![out(State::HIGH)],
                timing: Timing::fixed(delay),
            },
            FlatRow {
                inputs: Vec::new(),
                outputs: vec![out(State::LOW)],
                timing: Timing::fixed(delay),
            },
        ];
        net.primitives[p].kind = PrimitiveKind::Gate { rows };
        net.add_dependent(a, p);
        net.add_dependent(b, p);
        (net, [a, b, y], d)
    }

    fn drain(queue: &mut EventQueue) -> Vec<Event> {
        std::iter::from_fn(|| queue.pop()).collect()
    }

    #[test]
    fn test_first_matching_row_wins() {
        let (mut net, [a, b, _], d) = and_network(5.0);
        net.nodes[a].settled.state = State::HIGH;
        net.nodes[b].settled.state = State::HIGH;

        let mut queue = EventQueue::new();
        let mut rng = SimRng::seed_from_u64(1);
        let mut stats = RunStats::default();
        let mut sched = Scheduler {
            queue: &mut queue,
            rng: &mut rng,
            stats: &mut stats,
            now: 1.0,
        };
        sched.evaluate_dependents(&mut net, a).unwrap();

        let events = drain(&mut queue);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].time, 6.0);
        assert_eq!(
            events[0],
            Event::drive(6.0, 1, d, Operator::Eq, Operand::Const(State::HIGH), Strength::GATE)
        );
    }

    #[test]
    fn test_duplicate_requests_suppressed() {
        let (mut net, [a, _, _], _) = and_network(5.0);
        let mut queue = EventQueue::new();
        let mut rng = SimRng::seed_from_u64(1);
        let mut stats = RunStats::default();
        let mut sched = Scheduler {
            queue: &mut queue,
            rng: &mut rng,
            stats: &mut stats,
            now: 0.0,
        };
        sched.evaluate_dependents(&mut net, a).unwrap();
        sched.evaluate_dependents(&mut net, a).unwrap();

        assert_eq!(stats.primitive_evaluations, 2);
        assert_eq!(stats.events_scheduled, 1);
        assert_eq!(stats.duplicates_suppressed, 1);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_fire_drive_discards_stale() {
        let (mut net, [a, b, y], d) = and_network(5.0);
        let mut queue = EventQueue::new();
        let mut rng = SimRng::seed_from_u64(1);
        let mut stats = RunStats::default();
        let mut sched = Scheduler {
            queue: &mut queue,
            rng: &mut rng,
            stats: &mut stats,
            now: 0.0,
        };
        // L request, then superseded by an H request
        sched.evaluate_dependents(&mut net, a).unwrap();
        net.nodes[a].settled.state = State::HIGH;
        net.nodes[b].settled.state = State::HIGH;
        sched.evaluate_dependents(&mut net, a).unwrap();

        let outcomes: Vec<DriveOutcome> = drain(&mut queue)
            .into_iter()
            .map(|e| match e.action {
                crate::event::EventAction::Drive {
                    driver,
                    op,
                    operand,
                    strength,
                } => fire_drive(&mut net, driver, op, operand, strength, e.time).unwrap(),
                _ => panic!("Expected Drive action"),
            })
            .collect();

        assert_eq!(outcomes, vec![DriveOutcome::Stale, DriveOutcome::Applied(Some(y))]);
        assert_eq!(net.drivers[d].pending, Signal::new(State::HIGH, Strength::GATE));
        assert!(net.drivers[d].scheduled.is_none());
        assert_eq!(net.nodes[y].settled.state, State::HIGH);
    }

    #[test]
    fn test_fire_drive_arithmetic() {
        let (mut net, [_, _, y], d) = and_network(0.0);
        net.nodes[y].settled.state = State(5);
        let operand = Operand::Const(State(3));
        net.drivers[d].scheduled = Some(ScheduledDrive {
            op: Operator::Add,
            operand: operand.clone(),
            strength: Strength::GATE,
        });

        let outcome = fire_drive(&mut net, d, Operator::Add, operand, Strength::GATE, 0.0).unwrap();
        assert_eq!(outcome, DriveOutcome::Applied(Some(y)));
        assert_eq!(net.nodes[y].settled.state, State(8));
    }

    #[test]
    fn test_fire_drive_division_by_zero() {
        let (mut net, _, d) = and_network(0.0);
        let operand = Operand::Const(State(0));
        net.drivers[d].scheduled = Some(ScheduledDrive {
            op: Operator::Div,
            operand: operand.clone(),
            strength: Strength::GATE,
        });

        let result = fire_drive(&mut net, d, Operator::Div, operand, Strength::GATE, 0.0);
        assert!(matches!(result, Err(SimError::DivisionByZero('/'))));
    }

    #[test]
    fn test_invalid_relational_operator() {
        let (mut net, [a, _, _], _) = and_network(1.0);
        if let PrimitiveKind::Gate { rows } = &mut net.primitives[0].kind {
            rows[0].inputs[0].op = Operator::Mul;
        }
        let mut queue = EventQueue::new();
        let mut rng = SimRng::seed_from_u64(1);
        let mut stats = RunStats::default();
        let mut sched = Scheduler {
            queue: &mut queue,
            rng: &mut rng,
            stats: &mut stats,
            now: 0.0,
        };
        let result = sched.evaluate_dependents(&mut net, a);
        assert!(matches!(result, Err(SimError::InvalidRelationalOperator('*'))));
    }

    #[test]
    fn test_random_dominance_override() {
        let (mut net, [a, _, _], _) = and_network(2.0);
        if let PrimitiveKind::Gate { rows } = &mut net.primitives[0].kind {
            for row in rows.iter_mut() {
                row.timing = Timing::fixed(2.0).with_random(1.0).with_linear(0.5);
            }
        }
        let mut queue = EventQueue::new();
        let mut rng = SimRng::seed_from_u64(9);
        let mut stats = RunStats::default();
        let mut sched = Scheduler {
            queue: &mut queue,
            rng: &mut rng,
            stats: &mut stats,
            now: 0.0,
        };
        sched.evaluate_dependents(&mut net, a).unwrap();

        let event = queue.pop().unwrap();
        assert_eq!(event.priority, OVERRIDE_PRIORITY);
        assert!(event.time >= 2.0 && event.time < 3.0);
    }

    #[test]
    fn test_function_requests_use_default_priority() {
        let mut net = Network::new();
        let bits: Vec<NodeId> = (0..8).map(|i| net.add_node(format!("top.b{}", i))).collect();
        let out = net.add_node("top.out");
        let p = net.add_primitive(Primitive {
            id: 0,
            path: "top.pack".to_string(),
            template: "bus_to_state".to_string(),
            kind: PrimitiveKind::Gate { rows: Vec::new() },
            fanout: false,
            priority: 7,
        });
        let d = net.add_driver(p, out);
        let mut ports: Vec<FunctionPort> = bits
            .iter()
            .map(|&node| FunctionPort { node, driver: None })
            .collect();
        ports.push(FunctionPort {
            node: out,
            driver: Some(d),
        });
        net.primitives[p].kind = PrimitiveKind::Function(FunctionInstance {
            builtin: crate::library::Builtin::BusToState,
            ports,
            timing: Timing::fixed(2.0),
        });
        net.nodes[bits[0]].settled.state = State::HIGH;

        let mut queue = EventQueue::new();
        let mut rng = SimRng::seed_from_u64(1);
        let mut stats = RunStats::default();
        let mut sched = Scheduler {
            queue: &mut queue,
            rng: &mut rng,
            stats: &mut stats,
            now: 3.0,
        };
        sched.evaluate_primitive(&mut net, p, bits[0]).unwrap();

        let event = queue.pop().unwrap();
        assert_eq!(event.priority, DEFAULT_PRIORITY);
        assert_eq!(
            event,
            Event::drive(5.0, DEFAULT_PRIORITY, d, Operator::Eq, Operand::Const(State(128)), Strength::VDD)
        );
    }
}
