//! Integration tests for the built-in function procedures.

use alsim::{flatten, parse_netlist, ClockStimulus, Signal, Simulator, State, Strength};

fn build(netlist: &str, root: &str) -> Simulator {
    let registry = parse_netlist(netlist).unwrap();
    Simulator::from_flattened(flatten(&registry, root).unwrap())
}

fn states_and_times(sim: &Simulator, node: usize) -> Vec<(f64, State)> {
    sim.trace(node)
        .unwrap()
        .iter()
        .map(|t| (t.time, t.value.state))
        .collect()
}

const SWITCH: &str = "
function nmostran (ctl, a, b)
model sw (ctl, a, b)
  t1 nmostran (ctl, a, b)
";

#[test]
fn test_switch_passes_value_without_feedback() {
    let mut sim = build(SWITCH, "sw");
    let a = sim.observe_by_name("sw.a").unwrap();
    let b = sim.observe_by_name("sw.b").unwrap();
    sim.apply_stimulus_by_name("sw.ctl", State::HIGH, Strength::VDD, 0.0).unwrap();
    sim.apply_stimulus(a, State::HIGH, Strength::VDD, 1.0).unwrap();
    sim.initialize(20.0).unwrap();

    // b takes a's value, clamped to gate strength
    assert_eq!(sim.settled(b), Some(Signal::new(State::HIGH, Strength::GATE)));
    assert_eq!(sim.settled(a), Some(Signal::new(State::HIGH, Strength::VDD)));

    // the switch never drove a's own value back onto a
    let network = sim.network();
    for &driver in &network.node(a).unwrap().drivers {
        assert_eq!(network.driver(driver).unwrap().pending.strength, Strength::OFF);
    }
    assert_eq!(sim.trace(a).unwrap().len(), 1);
}

#[test]
fn test_switch_off_leaves_charge() {
    let mut sim = build(SWITCH, "sw");
    let b = sim.observe_by_name("sw.b").unwrap();
    sim.apply_stimulus_by_name("sw.ctl", State::HIGH, Strength::VDD, 0.0).unwrap();
    sim.apply_stimulus_by_name("sw.a", State::HIGH, Strength::VDD, 1.0).unwrap();
    sim.apply_stimulus_by_name("sw.ctl", State::LOW, Strength::VDD, 5.0).unwrap();
    sim.initialize(20.0).unwrap();

    assert_eq!(sim.settled(b), Some(Signal::new(State::HIGH, Strength::NODE)));
    assert_eq!(states_and_times(&sim, b), vec![(1.0, State::HIGH), (5.0, State::HIGH)]);
}

#[test]
fn test_d_flip_flop_samples_on_falling_clock() {
    let netlist = "
function dfflop (d, ck, q)
  i ck
  t delta=1
model reg (d, ck, q)
  r1 dfflop (d, ck, q)
";
    let mut sim = build(netlist, "reg");
    let ck = sim.find_node("reg.ck").unwrap();
    let q = sim.observe_by_name("reg.q").unwrap();
    sim.add_clock(ClockStimulus::square(ck, 10.0, Strength::VDD).with_cycles(3))
        .unwrap();
    sim.apply_stimulus_by_name("reg.d", State::HIGH, Strength::VDD, 2.0).unwrap();
    sim.apply_stimulus_by_name("reg.d", State::LOW, Strength::VDD, 12.0).unwrap();
    sim.initialize(100.0).unwrap();

    assert_eq!(states_and_times(&sim, q), vec![(6.0, State::HIGH), (16.0, State::LOW)]);
    assert_eq!(sim.settled(q), Some(Signal::new(State::LOW, Strength::GATE)));
}

#[test]
fn test_jk_flip_flop_toggles() {
    let netlist = "
function jkfflop (ck, j, k, q, qbar)
  i ck
  t delta=1
model jk (ck, j, k, q, qbar)
  ff jkfflop (ck, j, k, q, qbar)
";
    let mut sim = build(netlist, "jk");
    let ck = sim.find_node("jk.ck").unwrap();
    let q = sim.observe_by_name("jk.q").unwrap();
    sim.add_clock(ClockStimulus::square(ck, 10.0, Strength::VDD).with_cycles(3))
        .unwrap();
    sim.apply_stimulus_by_name("jk.j", State::HIGH, Strength::VDD, 0.0).unwrap();
    sim.apply_stimulus_by_name("jk.k", State::HIGH, Strength::VDD, 0.0).unwrap();
    sim.initialize(100.0).unwrap();

    assert_eq!(
        states_and_times(&sim, q),
        vec![(6.0, State::HIGH), (16.0, State::LOW), (26.0, State::HIGH)]
    );
    assert_eq!(sim.settled_by_name("jk.qbar").unwrap().state, State::LOW);
}

#[test]
fn test_bus_round_trip() {
    let netlist = "
function state_to_bus (in, b7, b6, b5, b4, b3, b2, b1, b0)
  i in
function bus_to_state (b7, b6, b5, b4, b3, b2, b1, b0, out)
  i b7 b6 b5 b4 b3 b2 b1 b0
model pack (in, out)
  s state_to_bus (in, b7, b6, b5, b4, b3, b2, b1, b0)
  p bus_to_state (b7, b6, b5, b4, b3, b2, b1, b0, out)
";
    let mut sim = build(netlist, "pack");
    let out = sim.observe_by_name("pack.out").unwrap();
    sim.apply_stimulus_by_name("pack.in", State(0b1010_0101), Strength::VDD, 0.0).unwrap();
    sim.initialize(10.0).unwrap();

    assert_eq!(sim.settled_by_name("pack.b7").unwrap().state, State::HIGH);
    assert_eq!(sim.settled_by_name("pack.b6").unwrap().state, State::LOW);
    assert_eq!(sim.settled_by_name("pack.b0").unwrap().state, State::HIGH);
    assert_eq!(sim.settled(out), Some(Signal::new(State(165), Strength::VDD)));
}
