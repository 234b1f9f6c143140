//! Hierarchical template model.
//!
//! A netlist is a collection of named templates. Gates are truth tables,
//! functions bind a built-in procedure, and models compose other templates
//! through instances. Templates are read-only once ingested; the flattener
//! turns a root model into a flat [`Network`](crate::network::Network).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::logic::{Operand, Operator, State, Strength};
use crate::types::{Priority, SimTime, DEFAULT_PRIORITY, DEFERRED_PRIORITY};

/// Delay parameters of a truth-table row or function.
///
/// The scheduled delay is `delta + absolute + 2·u·linear` where `u` is a
/// uniform draw in `[0, 1)`. `random` is the probability that the event wins
/// the random-dominance draw and jumps ahead of everything at its time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Timing {
    /// Fixed delay (`D=`)
    #[serde(default)]
    pub delta: SimTime,
    /// Half-width of the uniform jitter (`L=`)
    #[serde(default)]
    pub linear: SimTime,
    /// Mean of an exponential component (`E=`); parsed and kept, not applied
    #[serde(default)]
    pub exponential: SimTime,
    /// Random-dominance probability (`R=`)
    #[serde(default)]
    pub random: f64,
    /// Absolute offset (`A=`)
    #[serde(default)]
    pub absolute: SimTime,
}

impl Timing {
    /// A fixed delay with no other components.
    pub fn fixed(delta: SimTime) -> Self {
        Self {
            delta,
            ..Self::default()
        }
    }

    /// Sets the uniform jitter component.
    pub fn with_linear(mut self, linear: SimTime) -> Self {
        self.linear = linear;
        self
    }

    /// Sets the random-dominance probability.
    pub fn with_random(mut self, random: f64) -> Self {
        self.random = random;
        self
    }

    /// Sets the absolute offset.
    pub fn with_absolute(mut self, absolute: SimTime) -> Self {
        self.absolute = absolute;
        self
    }

    /// Sets the exponential component.
    pub fn with_exponential(mut self, exponential: SimTime) -> Self {
        self.exponential = exponential;
        self
    }
}

/// One endpoint of a delay-transition tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Level {
    Low,
    High,
    Unknown,
    Float,
}

impl Level {
    fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            '0' => Some(Level::Low),
            '1' => Some(Level::High),
            'X' => Some(Level::Unknown),
            'Z' => Some(Level::Float),
            _ => None,
        }
    }

    fn as_char(self) -> char {
        match self {
            Level::Low => '0',
            Level::High => '1',
            Level::Unknown => 'X',
            Level::Float => 'Z',
        }
    }
}

/// A delay-transition tag (`D 01`, `D 1Z`, ...) attached to a row.
///
/// The tag is kept with the template as written. Flattening drops it and
/// delays do not depend on it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Transition {
    pub from: Level,
    pub to: Level,
}

impl FromStr for Transition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        let parsed = match (chars.next(), chars.next(), chars.next()) {
            (Some(a), Some(b), None) => Level::from_char(a).zip(Level::from_char(b)),
            _ => None,
        };
        match parsed {
            Some((from, to)) if from != to => Ok(Transition { from, to }),
            _ => Err(format!("invalid delay transition '{}'", s)),
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.from.as_char(), self.to.as_char())
    }
}

/// An input condition `net <op> operand`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub net: String,
    pub op: Operator,
    pub operand: Operand<String>,
}

/// An output assignment `net <op> operand @strength`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub net: String,
    pub op: Operator,
    pub operand: Operand<String>,
    pub strength: Strength,
}

/// One truth-table row: all conditions must hold for the outputs to fire.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub inputs: Vec<Condition>,
    pub outputs: Vec<Assignment>,
    pub timing: Timing,
    pub transition: Option<Transition>,
}

impl Row {
    /// Creates an empty row with no delay.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an input condition.
    pub fn when(
        mut self,
        net: impl Into<String>,
        op: Operator,
        operand: impl Into<Operand<String>>,
    ) -> Self {
        self.inputs.push(Condition {
            net: net.into(),
            op,
            operand: operand.into(),
        });
        self
    }

    /// Adds an output assignment.
    pub fn drive(
        mut self,
        net: impl Into<String>,
        op: Operator,
        operand: impl Into<Operand<String>>,
        strength: Strength,
    ) -> Self {
        self.outputs.push(Assignment {
            net: net.into(),
            op,
            operand: operand.into(),
            strength,
        });
        self
    }

    /// Shorthand for `drive(net, Operator::Eq, state, Strength::GATE)`.
    pub fn set(self, net: impl Into<String>, state: State) -> Self {
        self.drive(net, Operator::Eq, state, Strength::GATE)
    }

    /// Sets the row timing.
    pub fn with_timing(mut self, timing: Timing) -> Self {
        self.timing = timing;
        self
    }

    /// Sets the delay-transition tag.
    pub fn with_transition(mut self, transition: Transition) -> Self {
        self.transition = Some(transition);
        self
    }
}

/// A `SET net=state@strength` statement, applied at time zero.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SetStatement {
    pub net: String,
    pub state: State,
    pub strength: Strength,
}

/// One placement of a template inside a model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InstanceDecl {
    /// Instance name, unique within the enclosing model
    pub name: String,
    /// Name of the instantiated template
    pub template: String,
    /// Actual nets, positionally bound to the template's ports
    pub nets: Vec<String>,
}

/// Body of a function template.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunctionSpec {
    /// Built-in procedure name
    pub procedure: String,
    /// Ports whose changes re-evaluate the function (all ports when empty)
    pub inputs: Vec<String>,
    /// Ports the function drives, in addition to the built-in's own outputs
    pub outputs: Vec<String>,
    pub timing: Timing,
}

/// The three template kinds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum TemplateKind {
    Gate { rows: Vec<Row> },
    Function(FunctionSpec),
    Model { instances: Vec<InstanceDecl> },
}

impl TemplateKind {
    /// Short keyword used in the netlist and in error messages.
    pub fn keyword(&self) -> &'static str {
        match self {
            TemplateKind::Gate { .. } => "gate",
            TemplateKind::Function(_) => "function",
            TemplateKind::Model { .. } => "model",
        }
    }
}

/// A named gate, function or model definition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub name: String,
    pub ports: Vec<String>,
    pub kind: TemplateKind,
    /// Declared per-pin load weights
    pub loads: HashMap<String, f64>,
    pub priority: Priority,
    /// Scale delays by the load of the first driven node
    pub fanout: bool,
    pub sets: Vec<SetStatement>,
}

impl Template {
    fn with_kind(name: impl Into<String>, ports: &[&str], kind: TemplateKind) -> Self {
        Self {
            name: name.into(),
            ports: ports.iter().map(|p| p.to_string()).collect(),
            kind,
            loads: HashMap::new(),
            priority: DEFAULT_PRIORITY,
            fanout: false,
            sets: Vec::new(),
        }
    }

    /// Creates an empty gate. Gates are fanout-sensitive by default.
    pub fn gate(name: impl Into<String>, ports: &[&str]) -> Self {
        let mut template = Self::with_kind(name, ports, TemplateKind::Gate { rows: Vec::new() });
        template.fanout = true;
        template
    }

    /// Creates a function whose procedure is the template name.
    pub fn function(name: impl Into<String>, ports: &[&str]) -> Self {
        let name = name.into();
        let spec = FunctionSpec {
            procedure: name.clone(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            timing: Timing::default(),
        };
        Self::with_kind(name, ports, TemplateKind::Function(spec))
    }

    /// Creates an empty model.
    pub fn model(name: impl Into<String>, ports: &[&str]) -> Self {
        Self::with_kind(name, ports, TemplateKind::Model { instances: Vec::new() })
    }

    /// Appends a truth-table row. A row with a random-dominance component
    /// lowers the template's priority.
    ///
    /// Has no effect on non-gate templates.
    pub fn push_row(&mut self, row: Row) {
        if let TemplateKind::Gate { rows } = &mut self.kind {
            if row.timing.random > 0.0 {
                self.priority = DEFERRED_PRIORITY;
            }
            rows.push(row);
        }
    }

    /// Builder form of [`push_row`](Self::push_row).
    pub fn with_row(mut self, row: Row) -> Self {
        self.push_row(row);
        self
    }

    /// Adds a child instance. Has no effect on non-model templates.
    pub fn with_instance(mut self, name: impl Into<String>, template: impl Into<String>, nets: &[&str]) -> Self {
        if let TemplateKind::Model { instances } = &mut self.kind {
            instances.push(InstanceDecl {
                name: name.into(),
                template: template.into(),
                nets: nets.iter().map(|n| n.to_string()).collect(),
            });
        }
        self
    }

    /// Sets a function's event-driving input ports.
    pub fn with_inputs(mut self, inputs: &[&str]) -> Self {
        if let TemplateKind::Function(spec) = &mut self.kind {
            spec.inputs = inputs.iter().map(|p| p.to_string()).collect();
        }
        self
    }

    /// Sets a function's declared output ports.
    pub fn with_outputs(mut self, outputs: &[&str]) -> Self {
        if let TemplateKind::Function(spec) = &mut self.kind {
            spec.outputs = outputs.iter().map(|p| p.to_string()).collect();
        }
        self
    }

    /// Sets a function's timing.
    pub fn with_timing(mut self, timing: Timing) -> Self {
        if let TemplateKind::Function(spec) = &mut self.kind {
            spec.timing = timing;
        }
        self
    }

    /// Declares the load weight of a pin.
    pub fn with_load(mut self, pin: impl Into<String>, load: f64) -> Self {
        self.loads.insert(pin.into(), load);
        self
    }

    /// Sets the firing priority.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Enables or disables fanout-scaled delays.
    pub fn with_fanout(mut self, fanout: bool) -> Self {
        self.fanout = fanout;
        self
    }

    /// Adds a time-zero `SET` statement.
    pub fn with_set(mut self, net: impl Into<String>, state: State, strength: Strength) -> Self {
        self.sets.push(SetStatement {
            net: net.into(),
            state,
            strength,
        });
        self
    }

    /// Returns the truth-table rows of a gate.
    pub fn rows(&self) -> &[Row] {
        match &self.kind {
            TemplateKind::Gate { rows } => rows,
            _ => &[],
        }
    }

    /// Returns the child instances of a model.
    pub fn instances(&self) -> &[InstanceDecl] {
        match &self.kind {
            TemplateKind::Model { instances } => instances,
            _ => &[],
        }
    }

    /// Returns the first port name that appears more than once.
    pub fn duplicate_port(&self) -> Option<&str> {
        self.ports
            .iter()
            .enumerate()
            .find(|(i, p)| self.ports[..*i].contains(p))
            .map(|(_, p)| p.as_str())
    }
}

/// Collection of templates by name.
#[derive(Clone, Debug, Default)]
pub struct TemplateRegistry {
    templates: HashMap<String, Template>,
}

impl TemplateRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a template, returning the definition it replaced.
    pub fn register(&mut self, template: Template) -> Option<Template> {
        self.templates.insert(template.name.clone(), template)
    }

    /// Builder form of [`register`](Self::register).
    pub fn with(mut self, template: Template) -> Self {
        self.register(template);
        self
    }

    /// Looks up a template by name.
    pub fn get(&self, name: &str) -> Option<&Template> {
        self.templates.get(name)
    }

    /// Returns true if a template is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    /// Returns the number of registered templates.
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    /// Returns true if no templates are registered.
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Returns an iterator over registered template names.
    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.templates.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn and2() -> Template {
        Template::gate("and2", &["a", "b", "y"])
            .with_row(
                Row::new()
                    .when("a", Operator::Eq, State::HIGH)
                    .when("b", Operator::Eq, State::HIGH)
                    .set("y", State::HIGH)
                    .with_timing(Timing::fixed(5.0)),
            )
            .with_row(Row::new().set("y", State::LOW).with_timing(Timing::fixed(5.0)))
    }

    #[test]
    fn test_gate_builder() {
        let gate = and2();
        assert_eq!(gate.ports, vec!["a", "b", "y"]);
        assert_eq!(gate.rows().len(), 2);
        assert_eq!(gate.rows()[0].inputs.len(), 2);
        assert_eq!(gate.rows()[0].outputs[0].strength, Strength::GATE);
        assert_eq!(gate.priority, DEFAULT_PRIORITY);
        assert!(gate.fanout);
        assert!(gate.instances().is_empty());
    }

    #[test]
    fn test_random_row_defers_priority() {
        let gate = Template::gate("rnd", &["a", "y"])
            .with_row(Row::new().set("y", State::HIGH).with_timing(Timing::fixed(1.0).with_random(0.5)));
        assert_eq!(gate.priority, DEFERRED_PRIORITY);
    }

    #[test]
    fn test_function_defaults() {
        let func = Template::function("DFFLOP", &["d", "ck", "q"]).with_inputs(&["ck"]);
        match &func.kind {
            TemplateKind::Function(spec) => {
                assert_eq!(spec.procedure, "DFFLOP");
                assert_eq!(spec.inputs, vec!["ck"]);
                assert!(spec.outputs.is_empty());
            }
            other => panic!("Expected function, got {}", other.keyword()),
        }
        assert!(!func.fanout);
    }

    #[test]
    fn test_model_instances() {
        let model = Template::model("top", &["a", "b", "out"])
            .with_instance("g1", "and2", &["a", "b", "out"]);
        assert_eq!(model.instances().len(), 1);
        assert_eq!(model.instances()[0].template, "and2");
        assert!(model.rows().is_empty());
    }

    #[test]
    fn test_duplicate_port() {
        let gate = Template::gate("bad", &["a", "b", "a"]);
        assert_eq!(gate.duplicate_port(), Some("a"));
        assert_eq!(and2().duplicate_port(), None);
    }

    #[test]
    fn test_transition_parse() {
        let t: Transition = "01".parse().unwrap();
        assert_eq!(t.from, Level::Low);
        assert_eq!(t.to, Level::High);
        assert_eq!("xz".parse::<Transition>().unwrap().to_string(), "XZ");
        assert!("00".parse::<Transition>().is_err());
        assert!("012".parse::<Transition>().is_err());
    }

    #[test]
    fn test_registry() {
        let mut registry = TemplateRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.register(and2()).is_none());
        assert!(registry.register(and2()).is_some());
        assert_eq!(registry.len(), 1);
        assert!(registry.contains("and2"));
        assert!(registry.get("or2").is_none());
    }
}
