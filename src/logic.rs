//! Logic values: states, drive strengths and the operators used by truth tables.
//!
//! A node's value is a `(State, Strength)` pair. States are small integers so
//! that bus packers and arithmetic outputs can carry numeric values; the three
//! logic levels are the distinguished values `LOW`, `UNKNOWN` and `HIGH`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::engine::SimError;

/// The logic level (or integer value) carried by a node.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct State(pub i32);

impl State {
    /// Logic low.
    pub const LOW: State = State(0);
    /// Undefined level, produced by equal-strength conflicts.
    pub const UNKNOWN: State = State(1);
    /// Logic high.
    pub const HIGH: State = State(2);

    /// Returns the raw integer value.
    pub fn value(self) -> i32 {
        self.0
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            State::LOW => write!(f, "L"),
            State::UNKNOWN => write!(f, "X"),
            State::HIGH => write!(f, "H"),
            State(v) => write!(f, "{}", v),
        }
    }
}

impl FromStr for State {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "L" => Ok(State::LOW),
            "X" => Ok(State::UNKNOWN),
            "H" => Ok(State::HIGH),
            other => other
                .parse::<i32>()
                .map(State)
                .map_err(|_| format!("invalid logic state '{}'", s)),
        }
    }
}

/// Drive strength of a value. Higher strengths win arbitration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Strength(pub u8);

impl Strength {
    /// Not driving (floating).
    pub const OFF: Strength = Strength(0);
    /// Charge retained on an undriven net; also the weak transistor strength.
    pub const NODE: Strength = Strength(4);
    /// Ordinary gate output strength.
    pub const GATE: Strength = Strength(8);
    /// Supply strength.
    pub const VDD: Strength = Strength(12);

    /// Converts a netlist strength index (0..=6) into a strength.
    pub fn from_index(index: u8) -> Self {
        Strength(index.saturating_mul(2))
    }

    /// Returns the netlist strength index of this strength.
    pub fn index(self) -> u8 {
        self.0 / 2
    }

    /// Returns true if this strength asserts a value.
    pub fn is_driving(self) -> bool {
        self > Strength::OFF
    }
}

impl fmt::Display for Strength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Strength::OFF => write!(f, "off"),
            Strength::NODE => write!(f, "node"),
            Strength::GATE => write!(f, "gate"),
            Strength::VDD => write!(f, "vdd"),
            Strength(v) => write!(f, "s{}", v),
        }
    }
}

impl FromStr for Strength {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(Strength::OFF),
            "node" | "weak" => Ok(Strength::NODE),
            "gate" | "default" => Ok(Strength::GATE),
            "vdd" | "strong" => Ok(Strength::VDD),
            other => match other.parse::<u8>() {
                Ok(index) if index <= 6 => Ok(Strength::from_index(index)),
                _ => Err(format!("invalid strength '{}'", s)),
            },
        }
    }
}

/// A `(state, strength)` pair.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signal {
    pub state: State,
    pub strength: Strength,
}

impl Signal {
    /// Creates a new signal value.
    pub const fn new(state: State, strength: Strength) -> Self {
        Self { state, strength }
    }

    /// The value every node and driver record holds before simulation starts.
    pub const fn floating() -> Self {
        Self::new(State::LOW, Strength::OFF)
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.state, self.strength)
    }
}

/// Operators allowed in truth-table entries.
///
/// The relational operators test input conditions; `=` and the arithmetic
/// operators compute output values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Gt,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl Operator {
    /// Parses the single-character netlist symbol.
    pub fn from_symbol(c: char) -> Option<Self> {
        match c {
            '=' => Some(Operator::Eq),
            '!' => Some(Operator::Ne),
            '<' => Some(Operator::Lt),
            '>' => Some(Operator::Gt),
            '+' => Some(Operator::Add),
            '-' => Some(Operator::Sub),
            '*' => Some(Operator::Mul),
            '/' => Some(Operator::Div),
            '%' => Some(Operator::Rem),
            _ => None,
        }
    }

    /// Returns the netlist symbol.
    pub fn symbol(self) -> char {
        match self {
            Operator::Eq => '=',
            Operator::Ne => '!',
            Operator::Lt => '<',
            Operator::Gt => '>',
            Operator::Add => '+',
            Operator::Sub => '-',
            Operator::Mul => '*',
            Operator::Div => '/',
            Operator::Rem => '%',
        }
    }

    /// Tests an input condition `lhs <op> rhs`.
    pub fn compare(self, lhs: State, rhs: State) -> Result<bool, SimError> {
        match self {
            Operator::Eq => Ok(lhs == rhs),
            Operator::Ne => Ok(lhs != rhs),
            Operator::Lt => Ok(lhs < rhs),
            Operator::Gt => Ok(lhs > rhs),
            other => Err(SimError::InvalidRelationalOperator(other.symbol())),
        }
    }

    /// Computes the state an output takes when this operator fires.
    ///
    /// `current` is the settled state of the driven node.
    pub fn apply(self, current: State, operand: State) -> Result<State, SimError> {
        let (a, b) = (current.0, operand.0);
        let value = match self {
            Operator::Eq => b,
            Operator::Add => a.wrapping_add(b),
            Operator::Sub => a.wrapping_sub(b),
            Operator::Mul => a.wrapping_mul(b),
            Operator::Div | Operator::Rem if b == 0 => {
                return Err(SimError::DivisionByZero(self.symbol()))
            }
            Operator::Div => a.wrapping_div(b),
            Operator::Rem => a.wrapping_rem(b),
            other => return Err(SimError::InvalidArithmeticOperator(other.symbol())),
        };
        Ok(State(value))
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// Right-hand side of a truth-table entry: a constant or another net.
///
/// Templates use `Operand<String>` (local net names); the flattened network
/// uses `Operand<NodeId>`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operand<N> {
    Const(State),
    Net(N),
}

impl<N> Operand<N> {
    /// Maps the net reference, keeping constants unchanged.
    pub fn map_net<M, E>(&self, f: impl FnOnce(&N) -> Result<M, E>) -> Result<Operand<M>, E> {
        match self {
            Operand::Const(s) => Ok(Operand::Const(*s)),
            Operand::Net(n) => f(n).map(Operand::Net),
        }
    }
}

impl<N> From<State> for Operand<N> {
    fn from(state: State) -> Self {
        Operand::Const(state)
    }
}

impl From<&str> for Operand<String> {
    fn from(net: &str) -> Self {
        Operand::Net(net.to_string())
    }
}

impl<N: fmt::Display> fmt::Display for Operand<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Const(s) => write!(f, "{}", s),
            Operand::Net(n) => write!(f, "{}", n),
        }
    }
}
