//! Hierarchy flattening.
//!
//! Expands a root model into a flat [`Network`]. The walk is depth first and
//! carries a per-scope table from local net names to node ids, seeded from
//! the parent's port bindings. Internal nets are allocated on first
//! reference and named `<scope>.<net>`; every port binding also registers
//! `<instance path>.<port>` as an alias of the bound node.

use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::engine::Stimulus;
use crate::library::Builtin;
use crate::logic::Operand;
use crate::network::{
    FlatAssignment, FlatCondition, FlatRow, FunctionInstance, FunctionPort, Network, Primitive,
    PrimitiveKind,
};
use crate::template::{SetStatement, Template, TemplateKind, TemplateRegistry, Timing};
use crate::types::{NodeId, PrimitiveId, DEFERRED_PRIORITY};

/// Default load of a gate pin.
pub const GATE_PIN_LOAD: f64 = 1.0;

/// Default load of a function pin.
pub const FUNCTION_PIN_LOAD: f64 = 0.0;

/// Structural errors found while flattening. No network is produced.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FlattenError {
    #[error("unknown template '{0}'")]
    UnknownTemplate(String),

    #[error("root template '{name}' is a {kind}, not a model")]
    RootNotModel { name: String, kind: &'static str },

    #[error("instance '{instance}' binds {found} nets to the {expected} ports of '{template}'")]
    PortCountMismatch {
        instance: String,
        template: String,
        expected: usize,
        found: usize,
    },

    #[error("duplicate instance name '{instance}' in '{scope}'")]
    DuplicateInstance { scope: String, instance: String },

    #[error("duplicate port '{port}' in template '{template}'")]
    DuplicatePort { template: String, port: String },

    #[error("'{port}' is not a port of function '{template}'")]
    UnknownPort { template: String, port: String },

    #[error("function '{template}' names unknown built-in procedure '{procedure}'")]
    UnknownProcedure { template: String, procedure: String },

    #[error("built-in '{procedure}' takes {expected} ports but '{template}' declares {found}")]
    BuiltinArity {
        template: String,
        procedure: String,
        expected: usize,
        found: usize,
    },

    #[error("template '{0}' instantiates itself")]
    RecursiveInstantiation(String),
}

/// Result type for flattening.
pub type FlattenResult<T> = Result<T, FlattenError>;

/// A flattened design: the network plus the time-zero stimuli produced by
/// `SET` statements.
#[derive(Clone, Debug)]
pub struct Flattened {
    pub network: Network,
    pub stimuli: Vec<Stimulus>,
}

/// Flattens the model `root` from `registry`.
pub fn flatten(registry: &TemplateRegistry, root: &str) -> FlattenResult<Flattened> {
    let template = registry
        .get(root)
        .ok_or_else(|| FlattenError::UnknownTemplate(root.to_string()))?;
    if !matches!(template.kind, TemplateKind::Model { .. }) {
        return Err(FlattenError::RootNotModel {
            name: root.to_string(),
            kind: template.kind.keyword(),
        });
    }
    check_ports(template)?;

    let mut flattener = Flattener {
        registry,
        network: Network::new(),
        stimuli: Vec::new(),
        stack: Vec::new(),
    };
    let mut scope = HashMap::new();
    for port in &template.ports {
        let node = flattener.network.add_node(format!("{}.{}", root, port));
        scope.insert(port.clone(), node);
    }
    flattener.expand_model(template, root, &mut scope)?;

    let Flattener {
        network, stimuli, ..
    } = flattener;
    info!(
        root,
        nodes = network.node_count(),
        primitives = network.primitive_count(),
        drivers = network.driver_count(),
        stimuli = stimuli.len(),
        "netlist flattened"
    );
    Ok(Flattened { network, stimuli })
}

fn check_ports(template: &Template) -> FlattenResult<()> {
    match template.duplicate_port() {
        Some(port) => Err(FlattenError::DuplicatePort {
            template: template.name.clone(),
            port: port.to_string(),
        }),
        None => Ok(()),
    }
}

type Scope = HashMap<String, NodeId>;

struct Flattener<'a> {
    registry: &'a TemplateRegistry,
    network: Network,
    stimuli: Vec<Stimulus>,
    /// Models currently being expanded
    stack: Vec<String>,
}

impl<'a> Flattener<'a> {
    /// Returns the node bound to `net` in this scope, allocating it if needed.
    fn net(&mut self, path: &str, scope: &mut Scope, net: &str) -> NodeId {
        if let Some(&node) = scope.get(net) {
            return node;
        }
        let node = self.network.add_node(format!("{}.{}", path, net));
        scope.insert(net.to_string(), node);
        node
    }

    fn expand_model(&mut self, template: &'a Template, path: &str, scope: &mut Scope) -> FlattenResult<()> {
        self.stack.push(template.name.clone());

        let mut seen = HashSet::new();
        for inst in template.instances() {
            if !seen.insert(inst.name.as_str()) {
                return Err(FlattenError::DuplicateInstance {
                    scope: path.to_string(),
                    instance: inst.name.clone(),
                });
            }

            let child = self
                .registry
                .get(&inst.template)
                .ok_or_else(|| FlattenError::UnknownTemplate(inst.template.clone()))?;
            check_ports(child)?;
            if inst.nets.len() != child.ports.len() {
                return Err(FlattenError::PortCountMismatch {
                    instance: format!("{}.{}", path, inst.name),
                    template: child.name.clone(),
                    expected: child.ports.len(),
                    found: inst.nets.len(),
                });
            }

            let child_path = format!("{}.{}", path, inst.name);
            let mut child_scope = Scope::new();
            for (port, net) in child.ports.iter().zip(&inst.nets) {
                let node = self.net(path, scope, net);
                self.network.add_alias(node, format!("{}.{}", child_path, port));
                child_scope.insert(port.clone(), node);
            }

            match &child.kind {
                TemplateKind::Model { .. } => {
                    if self.stack.contains(&child.name) {
                        return Err(FlattenError::RecursiveInstantiation(child.name.clone()));
                    }
                    self.expand_model(child, &child_path, &mut child_scope)?;
                }
                TemplateKind::Gate { .. } => self.add_gate(child, &child_path, &mut child_scope),
                TemplateKind::Function(_) => self.add_function(child, &child_path, &child_scope)?,
            }
        }

        self.add_sets(&template.sets, path, scope);
        self.stack.pop();
        Ok(())
    }

    fn add_sets(&mut self, sets: &[SetStatement], path: &str, scope: &mut Scope) {
        for set in sets {
            let node = self.net(path, scope, &set.net);
            self.stimuli
                .push(Stimulus::new(node, set.state, set.strength, 0.0).with_priority(DEFERRED_PRIORITY));
        }
    }

    fn new_primitive(&mut self, template: &Template, path: &str, kind: PrimitiveKind) -> PrimitiveId {
        self.network.add_primitive(Primitive {
            id: 0,
            path: path.to_string(),
            template: template.name.clone(),
            kind,
            fanout: template.fanout,
            priority: template.priority,
        })
    }

    fn add_load(&mut self, node: NodeId, template: &Template, local: &str, default: f64) {
        let load = template.loads.get(local).copied().unwrap_or(default);
        self.network.nodes[node].load += load;
    }

    fn add_gate(&mut self, template: &Template, path: &str, scope: &mut Scope) {
        let prim = self.new_primitive(template, path, PrimitiveKind::Gate { rows: Vec::new() });

        let mut locals: Vec<&str> = template.ports.iter().map(String::as_str).collect();
        let mut rows = Vec::with_capacity(template.rows().len());
        for row in template.rows() {
            warn_exponential(path, &row.timing);

            let mut inputs = Vec::with_capacity(row.inputs.len());
            for cond in &row.inputs {
                let node = self.net(path, scope, &cond.net);
                self.network.add_dependent(node, prim);
                locals.push(&cond.net);
                let operand = self.operand(path, scope, &cond.operand);
                if let (Operand::Net(other), Operand::Net(name)) = (&operand, &cond.operand) {
                    self.network.add_dependent(*other, prim);
                    locals.push(name);
                }
                inputs.push(FlatCondition {
                    node,
                    op: cond.op,
                    operand,
                });
            }

            let mut outputs = Vec::with_capacity(row.outputs.len());
            for out in &row.outputs {
                let node = self.net(path, scope, &out.net);
                locals.push(&out.net);
                if let Operand::Net(name) = &out.operand {
                    locals.push(name);
                }
                outputs.push(FlatAssignment {
                    node,
                    driver: self.network.add_driver(prim, node),
                    op: out.op,
                    operand: self.operand(path, scope, &out.operand),
                    strength: out.strength,
                });
            }

            rows.push(FlatRow {
                inputs,
                outputs,
                timing: row.timing,
            });
        }

        let mut counted = HashSet::new();
        for local in locals {
            if counted.insert(local) {
                let node = self.net(path, scope, local);
                self.add_load(node, template, local, GATE_PIN_LOAD);
            }
        }

        debug!(primitive = prim, path, rows = rows.len(), "gate flattened");
        self.network.primitives[prim].kind = PrimitiveKind::Gate { rows };
        self.add_sets(&template.sets, path, scope);
    }

    fn operand(&mut self, path: &str, scope: &mut Scope, operand: &Operand<String>) -> Operand<NodeId> {
        match operand {
            Operand::Const(state) => Operand::Const(*state),
            Operand::Net(name) => Operand::Net(self.net(path, scope, name)),
        }
    }

    fn port_index(template: &Template, port: &str) -> FlattenResult<usize> {
        template
            .ports
            .iter()
            .position(|p| p == port)
            .ok_or_else(|| FlattenError::UnknownPort {
                template: template.name.clone(),
                port: port.to_string(),
            })
    }

    fn add_function(&mut self, template: &Template, path: &str, scope: &Scope) -> FlattenResult<()> {
        let TemplateKind::Function(spec) = &template.kind else {
            return Ok(());
        };
        let builtin: Builtin = spec
            .procedure
            .parse()
            .map_err(|_| FlattenError::UnknownProcedure {
                template: template.name.clone(),
                procedure: spec.procedure.clone(),
            })?;
        if builtin.arity() != template.ports.len() {
            return Err(FlattenError::BuiltinArity {
                template: template.name.clone(),
                procedure: builtin.name().to_string(),
                expected: builtin.arity(),
                found: template.ports.len(),
            });
        }
        warn_exponential(path, &spec.timing);

        // Ports are always bound by the instantiating scope.
        let mut ports: Vec<FunctionPort> = template
            .ports
            .iter()
            .map(|p| FunctionPort {
                node: scope[p],
                driver: None,
            })
            .collect();

        let inputs: Vec<usize> = if spec.inputs.is_empty() {
            (0..ports.len()).collect()
        } else {
            spec.inputs
                .iter()
                .map(|p| Self::port_index(template, p))
                .collect::<FlattenResult<_>>()?
        };
        let mut outputs = builtin.output_ports();
        for port in &spec.outputs {
            outputs.push(Self::port_index(template, port)?);
        }

        let prim = self.new_primitive(template, path, PrimitiveKind::Gate { rows: Vec::new() });
        for index in inputs {
            self.network.add_dependent(ports[index].node, prim);
        }
        for index in outputs {
            ports[index].driver = Some(self.network.add_driver(prim, ports[index].node));
        }
        for (port, name) in ports.iter().zip(&template.ports) {
            self.add_load(port.node, template, name, FUNCTION_PIN_LOAD);
        }

        debug!(primitive = prim, path, builtin = %builtin, "function flattened");
        self.network.primitives[prim].kind = PrimitiveKind::Function(FunctionInstance {
            builtin,
            ports,
            timing: spec.timing,
        });

        let mut local = scope.clone();
        self.add_sets(&template.sets, path, &mut local);
        Ok(())
    }
}

fn warn_exponential(path: &str, timing: &Timing) {
    if timing.exponential > 0.0 {
        warn!(path, mean = timing.exponential, "exponential delay component is not applied");
    }
}
