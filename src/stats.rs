//! Statistics collection and export for simulation runs.
//!
//! The simulator keeps a [`RunStats`] block of counters while it runs. A
//! [`StatsCollector`] wraps a run with wall-clock timing and turns the
//! simulator's JSON export into a [`SimulationStats`] report that can be
//! written as JSON, CSV or a plain-text summary.

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

use crate::types::SimTime;

/// Aggregate statistics for a simulation run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SimulationStats {
    /// Simulation metadata
    pub metadata: SimulationMetadata,

    /// Counters maintained by the simulator
    pub run: RunStats,

    /// Timing statistics
    pub timing: TimingStats,
}

/// Metadata about the simulation run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SimulationMetadata {
    /// Simulation name/description
    pub name: String,

    /// Start time (wall clock)
    pub start_time: Option<String>,

    /// End time (wall clock)
    pub end_time: Option<String>,

    /// RNG seed of the run
    pub seed: u64,
}

/// Counters maintained by the simulator while events fire.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    /// Events popped from the queue and acted on
    pub events_fired: u64,

    /// Drive events discarded because a newer request superseded them
    pub stale_events: u64,

    /// Settled-value changes across all nodes
    pub node_changes: u64,

    /// Gate and function evaluations
    pub primitive_evaluations: u64,

    /// Events pushed onto the queue
    pub events_scheduled: u64,

    /// Drive requests dropped because an identical one was already queued
    pub duplicates_suppressed: u64,

    /// Largest queue size observed
    pub peak_queue_size: usize,

    /// Time of the last fired event
    pub final_time: SimTime,
}

/// Timing/performance statistics.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TimingStats {
    /// Total wall-clock time in milliseconds
    pub total_wall_time_ms: f64,

    /// Events fired per second
    pub events_per_second: f64,
}

impl SimulationStats {
    /// Creates a new empty statistics container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the simulation name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.metadata.name = name.into();
        self
    }

    /// Records the start time.
    pub fn record_start(&mut self) {
        self.metadata.start_time = Some(unix_now());
    }

    /// Records the end time.
    pub fn record_end(&mut self) {
        self.metadata.end_time = Some(unix_now());
    }

    /// Updates timing statistics based on wall clock time.
    pub fn compute_timing(&mut self, wall_time_ms: f64) {
        self.timing.total_wall_time_ms = wall_time_ms;

        if wall_time_ms > 0.0 {
            let seconds = wall_time_ms / 1000.0;
            self.timing.events_per_second = self.run.events_fired as f64 / seconds;
        }
    }

    /// Exports statistics to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Exports statistics to JSON file.
    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let json = self
            .to_json()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)
    }

    /// Exports summary statistics to CSV.
    pub fn to_csv(&self) -> String {
        let run = &self.run;
        let mut csv = String::from("metric,value\n");

        csv.push_str(&format!("final_time,{}\n", run.final_time));
        csv.push_str(&format!("events_fired,{}\n", run.events_fired));
        csv.push_str(&format!("stale_events,{}\n", run.stale_events));
        csv.push_str(&format!("node_changes,{}\n", run.node_changes));
        csv.push_str(&format!("primitive_evaluations,{}\n", run.primitive_evaluations));
        csv.push_str(&format!("events_scheduled,{}\n", run.events_scheduled));
        csv.push_str(&format!("duplicates_suppressed,{}\n", run.duplicates_suppressed));
        csv.push_str(&format!("peak_queue_size,{}\n", run.peak_queue_size));

        csv.push_str(&format!("wall_time_ms,{:.2}\n", self.timing.total_wall_time_ms));
        csv.push_str(&format!("events_per_second,{:.2}\n", self.timing.events_per_second));

        csv
    }

    /// Exports summary statistics to CSV file.
    pub fn to_csv_file<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        std::fs::write(path, self.to_csv())
    }

    /// Writes a human-readable summary to a writer.
    pub fn write_summary<W: Write>(&self, mut w: W) -> std::io::Result<()> {
        writeln!(w, "=== Simulation Statistics ===")?;
        writeln!(w)?;

        if !self.metadata.name.is_empty() {
            writeln!(w, "Name: {}", self.metadata.name)?;
        }
        writeln!(w, "Seed: {}", self.metadata.seed)?;
        writeln!(w)?;

        let run = &self.run;
        writeln!(w, "--- Run ---")?;
        writeln!(w, "Final simulation time: {}", run.final_time)?;
        writeln!(w, "Events fired: {}", run.events_fired)?;
        writeln!(w, "Stale events: {}", run.stale_events)?;
        writeln!(w, "Node changes: {}", run.node_changes)?;
        writeln!(w, "Primitive evaluations: {}", run.primitive_evaluations)?;
        writeln!(
            w,
            "Events scheduled: {} ({} duplicates suppressed)",
            run.events_scheduled, run.duplicates_suppressed
        )?;
        writeln!(w, "Peak queue size: {}", run.peak_queue_size)?;
        writeln!(w)?;

        writeln!(w, "--- Timing ---")?;
        writeln!(w, "Wall time: {:.2} ms", self.timing.total_wall_time_ms)?;
        writeln!(w, "Events/sec: {:.2}", self.timing.events_per_second)?;

        Ok(())
    }

    /// Returns a summary string.
    pub fn summary(&self) -> String {
        let mut buf = Vec::new();
        // writing into a Vec cannot fail
        let _ = self.write_summary(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    }
}

/// A simple timer for measuring wall-clock time.
#[derive(Debug)]
pub struct Timer {
    start: std::time::Instant,
}

impl Timer {
    /// Starts a new timer.
    pub fn start() -> Self {
        Self {
            start: std::time::Instant::now(),
        }
    }

    /// Returns elapsed time in milliseconds.
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// Returns elapsed time in seconds.
    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::start()
    }
}

fn unix_now() -> String {
    let duration = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    format!("{}s", duration.as_secs())
}

/// Statistics collector wrapped around a run.
#[derive(Debug, Default)]
pub struct StatsCollector {
    stats: SimulationStats,
    timer: Option<Timer>,
}

impl StatsCollector {
    /// Creates a new collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the simulation name.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.stats.metadata.name = name.into();
    }

    /// Starts timing.
    pub fn start(&mut self) {
        self.timer = Some(Timer::start());
        self.stats.record_start();
    }

    /// Stops timing and computes final statistics.
    pub fn stop(&mut self) {
        self.stats.record_end();
        if let Some(ref timer) = self.timer {
            self.stats.compute_timing(timer.elapsed_ms());
        }
    }

    /// Copies the counters of a `Simulator::export_stats` document.
    pub fn update_from_json(&mut self, json: &serde_json::Value) {
        if let Some(sim) = json.get("simulator") {
            let count = |key: &str| sim[key].as_u64().unwrap_or(0);
            let run = &mut self.stats.run;
            run.final_time = sim["current_time"].as_f64().unwrap_or(0.0);
            run.events_fired = count("events_fired");
            run.stale_events = count("stale_events");
            run.node_changes = count("node_changes");
            run.primitive_evaluations = count("primitive_evaluations");
            run.events_scheduled = count("events_scheduled");
            run.duplicates_suppressed = count("duplicates_suppressed");
            run.peak_queue_size = count("peak_queue_size") as usize;
            self.stats.metadata.seed = count("seed");
        }
    }

    /// Returns the collected statistics.
    pub fn stats(&self) -> &SimulationStats {
        &self.stats
    }

    /// Consumes the collector and returns the statistics.
    pub fn into_stats(self) -> SimulationStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_creation() {
        let stats = SimulationStats::new().with_name("Test Simulation");

        assert_eq!(stats.metadata.name, "Test Simulation");
        assert_eq!(stats.run, RunStats::default());
    }

    #[test]
    fn test_stats_json_export() {
        let mut stats = SimulationStats::new();
        stats.run.final_time = 1000.0;
        stats.run.events_fired = 123;

        let json = stats.to_json().unwrap();
        assert!(json.contains("1000"));
        assert!(json.contains("123"));
    }

    #[test]
    fn test_stats_csv_export() {
        let mut stats = SimulationStats::new();
        stats.run.final_time = 6.0;
        stats.run.events_fired = 500;
        stats.run.duplicates_suppressed = 7;

        let csv = stats.to_csv();
        assert!(csv.starts_with("metric,value\n"));
        assert!(csv.contains("final_time,6\n"));
        assert!(csv.contains("events_fired,500"));
        assert!(csv.contains("duplicates_suppressed,7"));
    }

    #[test]
    fn test_timer() {
        let timer = Timer::start();
        std::thread::sleep(std::time::Duration::from_millis(10));
        let elapsed = timer.elapsed_ms();
        assert!(elapsed >= 10.0);
    }

    #[test]
    fn test_stats_collector() {
        let mut collector = StatsCollector::new();
        collector.set_name("Test");
        collector.start();

        std::thread::sleep(std::time::Duration::from_millis(5));

        collector.stop();

        let stats = collector.stats();
        assert_eq!(stats.metadata.name, "Test");
        assert!(stats.metadata.end_time.is_some());
        assert!(stats.timing.total_wall_time_ms >= 5.0);
    }

    #[test]
    fn test_stats_collector_from_json() {
        let mut collector = StatsCollector::new();

        let json = serde_json::json!({
            "simulator": {
                "current_time": 12.5,
                "seed": 42,
                "events_fired": 100,
                "stale_events": 3,
                "node_changes": 40,
                "primitive_evaluations": 55,
                "events_scheduled": 90,
                "duplicates_suppressed": 8,
                "peak_queue_size": 15
            }
        });

        collector.update_from_json(&json);

        let stats = collector.into_stats();
        assert_eq!(stats.run.final_time, 12.5);
        assert_eq!(stats.run.events_fired, 100);
        assert_eq!(stats.run.stale_events, 3);
        assert_eq!(stats.run.peak_queue_size, 15);
        assert_eq!(stats.metadata.seed, 42);
    }

    #[test]
    fn test_summary_output() {
        let mut stats = SimulationStats::new().with_name("Summary Test");
        stats.run.events_fired = 1000;

        let summary = stats.summary();
        assert!(summary.contains("Summary Test"));
        assert!(summary.contains("Events fired: 1000"));
    }
}
