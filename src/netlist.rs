//! Textual netlist reader.
//!
//! A netlist is a sequence of `GATE`, `FUNCTION` and `MODEL` blocks. The text
//! is read as a stream of tokens; line breaks carry no meaning beyond error
//! reporting. Keywords and level letters are case-insensitive, names keep
//! their case.
//!
//! ```text
//! gate and2 (a, b, y)
//!   t: delta=5
//!   i: a=H b=H   o: y=H
//!   i:           o: y=L
//! model top (a, b, out)
//!   g1 and2 (a, b, out)
//! ```

use thiserror::Error;

use crate::logic::{Operand, Operator, State, Strength};
use crate::template::{
    Assignment, Condition, FunctionSpec, InstanceDecl, Row, SetStatement, Template, TemplateKind,
    TemplateRegistry, Timing, Transition,
};
use crate::types::DEFERRED_PRIORITY;

const SINGLE_CHAR_TOKENS: &str = "()[]{}=!><+-*/%@;&";
const OPERATOR_SYMBOLS: &str = "=!<>+-*/%";

const GATE_KEYWORDS: &[&str] = &[
    "GATE", "FUNCTION", "MODEL", "I", "O", "T", "D", "FANOUT", "LOAD", "PRIORITY", "SET",
];
const FUNCTION_KEYWORDS: &[&str] = &[
    "GATE", "FUNCTION", "MODEL", "I", "O", "T", "LOAD", "PRIORITY", "SET",
];
const MODEL_KEYWORDS: &[&str] = &["GATE", "FUNCTION", "MODEL", "SET"];

/// Errors raised while reading a netlist.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NetlistError {
    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("unexpected end of netlist: expected {0}")]
    UnexpectedEof(&'static str),

    #[error("line {line}: template '{name}' is defined more than once")]
    DuplicateTemplate { line: usize, name: String },
}

/// Result type for netlist reading.
pub type NetlistResult<T> = Result<T, NetlistError>;

#[derive(Clone, Debug, PartialEq)]
struct Token {
    text: String,
    line: usize,
}

fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    for (index, line) in text.lines().enumerate() {
        let line_no = index + 1;
        let mut word = String::new();
        for c in line.chars() {
            if c == '#' {
                break;
            }
            if c.is_whitespace() || c == ',' || c == ':' || SINGLE_CHAR_TOKENS.contains(c) {
                if !word.is_empty() {
                    tokens.push(Token {
                        text: std::mem::take(&mut word),
                        line: line_no,
                    });
                }
                if SINGLE_CHAR_TOKENS.contains(c) {
                    tokens.push(Token {
                        text: c.to_string(),
                        line: line_no,
                    });
                }
            } else {
                word.push(c);
            }
        }
        if !word.is_empty() {
            tokens.push(Token {
                text: word,
                line: line_no,
            });
        }
    }
    tokens
}

fn is_operator(text: &str) -> bool {
    text.len() == 1 && OPERATOR_SYMBOLS.contains(text)
}

/// Parses netlist text into a template registry.
pub fn parse_netlist(text: &str) -> NetlistResult<TemplateRegistry> {
    let mut registry = TemplateRegistry::new();
    parse_into(text, &mut registry)?;
    Ok(registry)
}

/// Parses netlist text, adding its templates to an existing registry.
///
/// A name already present in the registry is reported as a duplicate.
pub fn parse_into(text: &str, registry: &mut TemplateRegistry) -> NetlistResult<usize> {
    let mut parser = Parser {
        tokens: tokenize(text),
        pos: 0,
    };
    let mut count = 0;
    while let Some(token) = parser.next() {
        let keyword = token.text.to_ascii_uppercase();
        let template = match keyword.as_str() {
            "GATE" => parser.gate()?,
            "FUNCTION" => parser.function()?,
            "MODEL" => parser.model()?,
            _ => {
                return Err(parser.error(
                    &token,
                    format!("'{}' is invalid here (expecting gate, function or model)", token.text),
                ))
            }
        };
        if registry.contains(&template.name) {
            return Err(NetlistError::DuplicateTemplate {
                line: token.line,
                name: template.name,
            });
        }
        registry.register(template);
        count += 1;
    }
    Ok(count)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, what: &'static str) -> NetlistResult<Token> {
        self.next().ok_or(NetlistError::UnexpectedEof(what))
    }

    fn expect_symbol(&mut self, symbol: &'static str) -> NetlistResult<Token> {
        let token = self.expect(symbol)?;
        if token.text != symbol {
            return Err(self.error(&token, format!("expecting '{}' in place of '{}'", symbol, token.text)));
        }
        Ok(token)
    }

    fn error(&self, token: &Token, message: String) -> NetlistError {
        NetlistError::Syntax {
            line: token.line,
            message,
        }
    }

    fn skip_if(&mut self, symbols: &[&str]) -> bool {
        match self.peek() {
            Some(t) if symbols.contains(&t.text.as_str()) => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    /// True if the next token opens a new statement. A keyword followed by
    /// an operator is a net name (`d = H`), except `FANOUT = ON`.
    fn at_statement(&self, keywords: &[&str]) -> bool {
        let Some(token) = self.peek() else {
            return true;
        };
        let upper = token.text.to_ascii_uppercase();
        if !keywords.contains(&upper.as_str()) {
            return false;
        }
        if matches!(upper.as_str(), "GATE" | "FUNCTION" | "MODEL" | "FANOUT") {
            return true;
        }
        !self.peek_at(1).is_some_and(|t| is_operator(&t.text))
    }

    /// True if the next tokens read `SET net op ...` or `SET net[...`; an
    /// instance named `set` is followed by its template name instead.
    fn at_set(&self) -> bool {
        self.peek().is_some_and(|t| t.text.eq_ignore_ascii_case("SET"))
            && self
                .peek_at(2)
                .is_some_and(|t| is_operator(&t.text) || t.text == "[")
    }

    fn at_block_end(&self) -> bool {
        match self.peek() {
            None => true,
            Some(t) => matches!(t.text.to_ascii_uppercase().as_str(), "GATE" | "FUNCTION" | "MODEL"),
        }
    }

    /// Reads a name, splicing an array subscript: `a [ 3 ]` reads as `a[3]`.
    fn name(&mut self, what: &'static str) -> NetlistResult<String> {
        let token = self.expect(what)?;
        if token.text.len() == 1 && SINGLE_CHAR_TOKENS.contains(token.text.as_str()) {
            return Err(self.error(&token, format!("expecting {} in place of '{}'", what, token.text)));
        }
        let mut name = token.text;
        if self.skip_if(&["["]) {
            name.push('[');
            loop {
                let part = self.expect("']'")?;
                if part.text == "]" {
                    break;
                }
                name.push_str(&part.text);
            }
            name.push(']');
        }
        Ok(name)
    }

    /// Reads a number that may carry a sign and an exponent split by the
    /// tokenizer (`- 5e - 9`).
    fn number_text(&mut self, what: &'static str) -> NetlistResult<(String, Token)> {
        let first = self.expect(what)?;
        let mut text = first.text.clone();
        if text == "+" || text == "-" {
            text.push_str(&self.expect(what)?.text);
        }
        let numeric = text.starts_with(|c: char| c.is_ascii_digit() || matches!(c, '+' | '-' | '.'));
        if numeric && text.ends_with(['e', 'E']) {
            let exp = self.expect(what)?;
            text.push_str(&exp.text);
            if exp.text == "+" || exp.text == "-" {
                text.push_str(&self.expect(what)?.text);
            }
        }
        Ok((text, first))
    }

    fn float(&mut self, what: &'static str) -> NetlistResult<f64> {
        let (text, token) = self.number_text(what)?;
        text.parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
            .ok_or_else(|| self.error(&token, format!("invalid number '{}'", text)))
    }

    fn integer(&mut self, what: &'static str) -> NetlistResult<i32> {
        let first = self.expect(what)?;
        let mut text = first.text.clone();
        if text == "+" || text == "-" {
            text.push_str(&self.expect(what)?.text);
        }
        text.parse::<i32>()
            .map_err(|_| self.error(&first, format!("invalid integer '{}'", text)))
    }

    fn header(&mut self, keyword: &'static str) -> NetlistResult<(String, Vec<String>)> {
        let name = self.name(keyword)?;
        self.expect_symbol("(")?;
        let mut ports = Vec::new();
        loop {
            if self.skip_if(&[")"]) {
                break;
            }
            ports.push(self.name("port name")?);
        }
        Ok((name, ports))
    }

    fn operator(&mut self) -> NetlistResult<Operator> {
        let token = self.expect("operator")?;
        token
            .text
            .chars()
            .next()
            .filter(|_| token.text.len() == 1)
            .and_then(Operator::from_symbol)
            .ok_or_else(|| self.error(&token, format!("invalid operator '{}'", token.text)))
    }

    fn operand(&mut self) -> NetlistResult<Operand<String>> {
        let token = self.peek().cloned().ok_or(NetlistError::UnexpectedEof("operand"))?;
        let upper = token.text.to_ascii_uppercase();
        if matches!(upper.as_str(), "L" | "X" | "H") {
            self.pos += 1;
            let state = upper.parse::<State>().map_err(|e| self.error(&token, e))?;
            return Ok(Operand::Const(state));
        }
        if token.text == "+" || token.text == "-" || token.text.starts_with(|c: char| c.is_ascii_digit()) {
            return Ok(Operand::Const(State(self.integer("integer operand")?)));
        }
        Ok(Operand::Net(self.name("operand")?))
    }

    fn strength(&mut self) -> NetlistResult<Option<Strength>> {
        if !self.skip_if(&["@"]) {
            return Ok(None);
        }
        let token = self.expect("strength")?;
        token
            .text
            .parse::<Strength>()
            .map(Some)
            .map_err(|e| self.error(&token, e))
    }

    /// Reads `net op operand [@strength]` entries until the next statement.
    fn entries(&mut self, keywords: &[&str]) -> NetlistResult<Vec<(String, Operator, Operand<String>, Option<Strength>)>> {
        let mut entries = Vec::new();
        loop {
            while self.skip_if(&["&", ";"]) {}
            if self.at_statement(keywords) || !self.peek_at(1).is_some_and(|t| is_operator(&t.text) || t.text == "[") {
                break;
            }
            let net = self.name("net name")?;
            let op = self.operator()?;
            let operand = self.operand()?;
            let strength = self.strength()?;
            entries.push((net, op, operand, strength));
        }
        Ok(entries)
    }

    /// Reads `net = state [@strength]` entries.
    fn sets(&mut self, keywords: &[&str]) -> NetlistResult<Vec<SetStatement>> {
        let start = self.peek().cloned();
        let mut sets = Vec::new();
        for (net, op, operand, strength) in self.entries(keywords)? {
            let state = match (op, operand) {
                (Operator::Eq, Operand::Const(state)) => state,
                _ => {
                    let line = start.as_ref().map_or(0, |t| t.line);
                    return Err(NetlistError::Syntax {
                        line,
                        message: format!("SET on '{}' must assign a constant with '='", net),
                    });
                }
            };
            sets.push(SetStatement {
                net,
                state,
                strength: strength.unwrap_or(Strength::GATE),
            });
        }
        Ok(sets)
    }

    /// Reads `name = value` load declarations.
    fn loads(&mut self, template: &mut Template, keywords: &[&str]) -> NetlistResult<()> {
        while !self.at_statement(keywords) {
            let pin = self.name("pin name")?;
            self.expect_symbol("=")?;
            let load = self.float("load value")?;
            template.loads.insert(pin, load);
        }
        Ok(())
    }

    /// Reads `D=v [+ L=v] ...`. Each `T` statement starts from zero.
    fn timing(&mut self, template: &mut Template) -> NetlistResult<Timing> {
        let mut timing = Timing::default();
        loop {
            let key = self.expect("timing parameter")?;
            self.expect_symbol("=")?;
            let value = self.float("timing value")?;
            match key.text.chars().next().map(|c| c.to_ascii_uppercase()) {
                Some('A') => timing.absolute = value,
                Some('D') => timing.delta = value,
                Some('E') => timing.exponential = value,
                Some('L') => timing.linear = value,
                Some('R') => {
                    timing.random = value;
                    if value > 0.0 {
                        template.priority = DEFERRED_PRIORITY;
                    }
                }
                _ => return Err(self.error(&key, format!("invalid timing mode '{}'", key.text))),
            }
            if !self.skip_if(&["+"]) {
                break;
            }
        }
        Ok(timing)
    }

    fn priority(&mut self, template: &mut Template) -> NetlistResult<()> {
        template.priority = self.integer("priority")?;
        Ok(())
    }

    fn gate(&mut self) -> NetlistResult<Template> {
        let (name, ports) = self.header("gate name")?;
        let ports: Vec<&str> = ports.iter().map(String::as_str).collect();
        let mut template = Template::gate(name, &ports);
        let mut rows: Vec<Row> = Vec::new();
        let mut timing = Timing::default();
        let mut transition: Option<Transition> = None;

        while !self.at_block_end() {
            let token = self.expect("gate statement")?;
            match token.text.to_ascii_uppercase().as_str() {
                "I" => {
                    let mut row = Row::new().with_timing(timing);
                    row.transition = transition.take();
                    for (net, op, operand, _) in self.entries(GATE_KEYWORDS)? {
                        row.inputs.push(Condition { net, op, operand });
                    }
                    rows.push(row);
                }
                "O" => {
                    let entries = self.entries(GATE_KEYWORDS)?;
                    let Some(row) = rows.last_mut() else {
                        return Err(self.error(&token, "output entries before any input row".to_string()));
                    };
                    for (net, op, operand, strength) in entries {
                        row.outputs.push(Assignment {
                            net,
                            op,
                            operand,
                            strength: strength.unwrap_or(Strength::GATE),
                        });
                    }
                }
                "T" => {
                    timing = self.timing(&mut template)?;
                    // a T between a row's I and O entries also times that row
                    if let Some(row) = rows.last_mut().filter(|r| r.outputs.is_empty()) {
                        row.timing = timing;
                    }
                }
                "D" => {
                    let tag = self.expect("delay transition")?;
                    transition = Some(tag.text.parse().map_err(|e| self.error(&tag, e))?);
                }
                "FANOUT" => {
                    self.expect_symbol("=")?;
                    let option = self.expect("ON or OFF")?;
                    template.fanout = match option.text.to_ascii_uppercase().as_str() {
                        "ON" => true,
                        "OFF" => false,
                        _ => return Err(self.error(&option, format!("invalid fanout option '{}'", option.text))),
                    };
                }
                "LOAD" => self.loads(&mut template, GATE_KEYWORDS)?,
                "PRIORITY" => self.priority(&mut template)?,
                "SET" => {
                    let sets = self.sets(GATE_KEYWORDS)?;
                    template.sets.extend(sets);
                }
                _ => {
                    return Err(self.error(
                        &token,
                        format!("'{}' is invalid in gate '{}'", token.text, template.name),
                    ))
                }
            }
        }

        if let TemplateKind::Gate { rows: table } = &mut template.kind {
            *table = rows;
        }
        Ok(template)
    }

    fn port_list(&mut self, keywords: &[&str]) -> NetlistResult<Vec<String>> {
        let mut names = Vec::new();
        while !self.at_statement(keywords) {
            names.push(self.name("port name")?);
        }
        Ok(names)
    }

    fn function(&mut self) -> NetlistResult<Template> {
        let (name, ports) = self.header("function name")?;
        let port_refs: Vec<&str> = ports.iter().map(String::as_str).collect();
        let mut template = Template::function(name, &port_refs);
        let mut spec = FunctionSpec {
            procedure: template.name.clone(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            timing: Timing::default(),
        };

        while !self.at_block_end() {
            let token = self.expect("function statement")?;
            match token.text.to_ascii_uppercase().as_str() {
                "I" => {
                    let inputs = self.port_list(FUNCTION_KEYWORDS)?;
                    spec.inputs.extend(inputs);
                }
                "O" => {
                    for output in self.port_list(FUNCTION_KEYWORDS)? {
                        if !ports.contains(&output) {
                            return Err(self.error(
                                &token,
                                format!("output '{}' is not in the port list of '{}'", output, template.name),
                            ));
                        }
                        spec.outputs.push(output);
                    }
                }
                "T" => spec.timing = self.timing(&mut template)?,
                "LOAD" => self.loads(&mut template, FUNCTION_KEYWORDS)?,
                "PRIORITY" => self.priority(&mut template)?,
                "SET" => {
                    let sets = self.sets(FUNCTION_KEYWORDS)?;
                    template.sets.extend(sets);
                }
                _ => {
                    return Err(self.error(
                        &token,
                        format!("'{}' is invalid in function '{}'", token.text, template.name),
                    ))
                }
            }
        }

        template.kind = TemplateKind::Function(spec);
        Ok(template)
    }

    fn model(&mut self) -> NetlistResult<Template> {
        let (name, ports) = self.header("model name")?;
        let port_refs: Vec<&str> = ports.iter().map(String::as_str).collect();
        let mut template = Template::model(name, &port_refs);
        let mut instances = Vec::new();

        while !self.at_block_end() {
            if self.skip_if(&["{", "}", ";"]) {
                continue;
            }
            if self.at_set() {
                self.pos += 1;
                let sets = self.sets(MODEL_KEYWORDS)?;
                template.sets.extend(sets);
                continue;
            }
            let instance = self.name("instance name")?;
            let child = self.name("template name")?;
            self.expect_symbol("(")?;
            let mut nets = Vec::new();
            loop {
                if self.skip_if(&[")"]) {
                    break;
                }
                nets.push(self.name("net name")?);
            }
            instances.push(InstanceDecl {
                name: instance,
                template: child,
                nets,
            });
        }

        template.kind = TemplateKind::Model { instances };
        Ok(template)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize() {
        let tokens = tokenize("gate and2(a,b:y) # comment\n  i: a=H@3");
        let texts: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["gate", "and2", "(", "a", "b", "y", ")", "i", "a", "=", "H", "@", "3"]);
        assert_eq!(tokens[7].line, 2);
    }

    #[test]
    fn test_parse_gate() {
        let text = "
            GATE and2 (a, b, y)
              T D=5
              I a=H b=H  O y=H@3
              I          O y=L
        ";
        let registry = parse_netlist(text).unwrap();
        let gate = registry.get("and2").unwrap();

        assert_eq!(gate.ports, vec!["a", "b", "y"]);
        assert!(gate.fanout);
        let rows = gate.rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].inputs.len(), 2);
        assert_eq!(rows[0].inputs[1].net, "b");
        assert_eq!(rows[0].outputs[0].operand, Operand::Const(State::HIGH));
        assert_eq!(rows[0].outputs[0].strength, Strength(6));
        assert_eq!(rows[0].timing.delta, 5.0);
        assert!(rows[1].inputs.is_empty());
        assert_eq!(rows[1].outputs[0].strength, Strength::GATE);
    }

    #[test]
    fn test_timing_applies_to_later_rows() {
        let text = "
            gate g (a, y)
              i a=L  o y=H
              t delta=2 + linear=0.5 + abs=1e-1
              i      o y=L
        ";
        let registry = parse_netlist(text).unwrap();
        let rows = registry.get("g").unwrap().rows();
        assert_eq!(rows[0].timing, Timing::default());
        assert_eq!(rows[1].timing.delta, 2.0);
        assert_eq!(rows[1].timing.linear, 0.5);
        assert!((rows[1].timing.absolute - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_timing_inside_row() {
        let text = "
            gate and2 (a, b, out)
              I a=H & b=H T D=5 O out=H
              I a=L O out=L@default
        ";
        let registry = parse_netlist(text).unwrap();
        let rows = registry.get("and2").unwrap().rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].inputs.len(), 2);
        assert_eq!(rows[0].timing.delta, 5.0);
        assert_eq!(rows[0].outputs[0].net, "out");
        // still the default for the rows that follow
        assert_eq!(rows[1].timing.delta, 5.0);
        assert_eq!(rows[1].outputs[0].strength, Strength::GATE);
    }

    #[test]
    fn test_non_finite_numbers_rejected() {
        for text in [
            "gate g (a, y)\n t d=nan\n i a=H o y=H",
            "gate g (a, y)\n t d=inf\n i a=H o y=H",
            "gate g (a, y)\n load a=NaN",
        ] {
            assert!(
                matches!(parse_netlist(text), Err(NetlistError::Syntax { line: 2, .. })),
                "accepted {:?}",
                text
            );
        }
    }

    #[test]
    fn test_instance_named_set() {
        let text = "
            model top (d, ck, q)
              set dff (d, ck, q)
              SET q=L
              set[0] dff (d, ck, q)
        ";
        let registry = parse_netlist(text).unwrap();
        let model = registry.get("top").unwrap();
        let names: Vec<&str> = model.instances().iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["set", "set[0]"]);
        assert_eq!(model.instances()[0].template, "dff");
        assert_eq!(model.sets.len(), 1);
        assert_eq!(model.sets[0].net, "q");
    }

    #[test]
    fn test_exponent_and_sign() {
        let text = "gate g (a, y)\n t d=5e-9 + a=-2\n i a<-1 o y=H";
        let registry = parse_netlist(text).unwrap();
        let row = &registry.get("g").unwrap().rows()[0];
        assert!((row.timing.delta - 5e-9).abs() < 1e-20);
        assert_eq!(row.timing.absolute, -2.0);
        assert_eq!(row.inputs[0].op, Operator::Lt);
        assert_eq!(row.inputs[0].operand, Operand::Const(State(-1)));
    }

    #[test]
    fn test_random_timing_lowers_priority() {
        let text = "gate g (a, y)\n t d=1 + r=0.5\n i o y=H";
        let registry = parse_netlist(text).unwrap();
        assert_eq!(registry.get("g").unwrap().priority, DEFERRED_PRIORITY);
    }

    #[test]
    fn test_gate_options() {
        let text = "
            gate g (d, q)
              fanout = off
              load d=2.5 q=0.5
              priority 3
              set q=H@vdd
              D 01
              i d=H & o q=d
        ";
        let registry = parse_netlist(text).unwrap();
        let gate = registry.get("g").unwrap();
        assert!(!gate.fanout);
        assert_eq!(gate.loads["d"], 2.5);
        assert_eq!(gate.priority, 3);
        assert_eq!(gate.sets[0].state, State::HIGH);
        assert_eq!(gate.sets[0].strength, Strength::VDD);

        let row = &gate.rows()[0];
        assert_eq!(row.transition, Some("01".parse().unwrap()));
        assert_eq!(row.inputs[0].net, "d");
        assert_eq!(row.outputs[0].operand, Operand::Net("d".to_string()));
    }

    #[test]
    fn test_parse_function() {
        let text = "
            function DFFLOP (d, ck, q)
              i ck
              o q
              t delta=2
              load d=1
        ";
        let registry = parse_netlist(text).unwrap();
        let function = registry.get("DFFLOP").unwrap();
        assert!(!function.fanout);
        match &function.kind {
            TemplateKind::Function(spec) => {
                assert_eq!(spec.procedure, "DFFLOP");
                assert_eq!(spec.inputs, vec!["ck"]);
                assert_eq!(spec.outputs, vec!["q"]);
                assert_eq!(spec.timing.delta, 2.0);
            }
            other => panic!("Expected function, got {}", other.keyword()),
        }
    }

    #[test]
    fn test_function_output_must_be_port() {
        let err = parse_netlist("function f (a, b)\n o c").unwrap_err();
        assert!(matches!(err, NetlistError::Syntax { line: 2, .. }));
    }

    #[test]
    fn test_parse_model() {
        let text = "
            model top (a, b, out)
              g1 and2 (a, b, mid)
              g2 inv (mid, out)
              set mid=L
              bus dff (x[0], x[1])
        ";
        let registry = parse_netlist(text).unwrap();
        let model = registry.get("top").unwrap();
        let instances = model.instances();
        assert_eq!(instances.len(), 3);
        assert_eq!(instances[0].name, "g1");
        assert_eq!(instances[0].template, "and2");
        assert_eq!(instances[0].nets, vec!["a", "b", "mid"]);
        assert_eq!(instances[2].nets, vec!["x[0]", "x[1]"]);
        assert_eq!(model.sets.len(), 1);
        assert_eq!(model.sets[0].net, "mid");
    }

    #[test]
    fn test_keywords_case_insensitive() {
        let registry = parse_netlist("Gate g (A, Y)\n I A=h O Y=l\nMODEL Top (A, Y)\n U g (A, Y)").unwrap();
        assert!(registry.contains("g"));
        assert!(registry.contains("Top"));
        assert_eq!(registry.get("g").unwrap().rows()[0].outputs[0].operand, Operand::Const(State::LOW));
    }

    #[test]
    fn test_duplicate_template() {
        let err = parse_netlist("gate g (a)\n\ngate g (a)").unwrap_err();
        assert_eq!(
            err,
            NetlistError::DuplicateTemplate {
                line: 3,
                name: "g".to_string()
            }
        );
    }

    #[test]
    fn test_syntax_errors() {
        assert!(matches!(
            parse_netlist("wire x"),
            Err(NetlistError::Syntax { line: 1, .. })
        ));
        assert!(matches!(
            parse_netlist("gate g (a, y)\n i a ? H"),
            Err(NetlistError::Syntax { line: 2, .. })
        ));
        assert!(matches!(
            parse_netlist("gate g (a, y)\n o y=H"),
            Err(NetlistError::Syntax { line: 2, .. })
        ));
        assert!(matches!(
            parse_netlist("gate g (a, y)\n d 00"),
            Err(NetlistError::Syntax { line: 2, .. })
        ));
        assert!(matches!(
            parse_netlist("gate g (a, y"),
            Err(NetlistError::UnexpectedEof(_))
        ));
    }
}
