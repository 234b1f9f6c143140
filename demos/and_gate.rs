//! Two-input AND gate driven from a netlist.
//!
//! Input `a` rises at t=0 and `b` at t=1. The gate's only row that can match
//! after `b` rises carries a 5 unit delay, so `out` goes high at t=6. The
//! stepping loop prints every change on the observed nodes as it happens.

use alsim::{flatten, parse_netlist, Simulator, State, Strength};

const NETLIST: &str = "
gate and2 (a, b, out)
  I a=H & b=H T D=5 O out=H
  I a=L O out=L@default

model top (a, b, out)
  g1 and2 (a, b, out)
";

const HORIZON: f64 = 20.0;

fn build() -> Result<Simulator, Box<dyn std::error::Error>> {
    let registry = parse_netlist(NETLIST)?;
    let mut sim = Simulator::from_flattened(flatten(&registry, "top")?);
    sim.apply_stimulus_by_name("top.a", State::HIGH, Strength::VDD, 0.0)?;
    sim.apply_stimulus_by_name("top.b", State::HIGH, Strength::VDD, 1.0)?;
    for name in ["top.a", "top.b", "top.out"] {
        sim.observe_by_name(name)?;
    }
    sim.set_horizon(HORIZON);
    Ok(sim)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    alsim::init_logging("warn");

    let mut sim = build()?;
    sim.reset();

    let mut last = sim.observed_states();
    while sim.step()? {
        let now = sim.observed_states();
        for ((name, before), (_, after)) in last.iter().zip(&now) {
            if before != after {
                println!("t={:>5.1}  {:<8} {} -> {}", sim.current_time(), name, before, after);
            }
        }
        last = now;
    }

    let stats = sim.export_stats();
    println!("\nSimulator stopped at time {}", stats["simulator"]["current_time"]);
    println!("Events fired: {}", stats["simulator"]["events_fired"].as_u64().unwrap_or(0));
    Ok(())
}
