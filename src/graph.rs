//! Live Signal Graph
//!
//! This module provides the runtime graph that voice chains are built into.
//! It owns every node, tracks the cables between ports, orders execution
//! topologically, and propagates signals one sample at a time.

use crate::port::{GraphModule, ParamId, PortId, PortSpec, PortValues};
use serde::{Deserialize, Serialize};
use slotmap::{DefaultKey, SlotMap};
use std::collections::{HashMap, VecDeque};
use thiserror::Error;
use tracing::warn;

/// Unique identifier for a node in the graph
pub type NodeId = DefaultKey;

/// Reference to a specific port on a specific node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortRef {
    pub node: NodeId,
    pub port: PortId,
}

/// A cable connecting an output port to an input port
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cable {
    pub from: PortRef,
    pub to: PortRef,
}

/// Internal node representation
struct Node {
    module: Box<dyn GraphModule>,
    name: String,
}

/// Compiled wiring of one input port
struct InputPlan {
    port: PortId,
    default: f64,
    /// Signal slots summed into this input
    sources: Vec<usize>,
}

/// Compiled per-node work for one tick
struct Step {
    node: NodeId,
    inputs: Vec<InputPlan>,
    /// Output port and the signal slot it writes
    outputs: Vec<(PortId, usize)>,
}

/// Error types for graph operations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphError {
    #[error("Invalid node")]
    InvalidNode,

    #[error("Invalid port")]
    InvalidPort,

    #[error("Cycle detected involving {} nodes", nodes.len())]
    CycleDetected { nodes: Vec<NodeId> },
}

/// Handle to a node for ergonomic port references
#[derive(Clone)]
pub struct NodeHandle {
    id: NodeId,
    spec: PortSpec,
}

impl NodeHandle {
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Reference an output port by name
    pub fn out(&self, name: &str) -> Result<PortRef, GraphError> {
        let port = self
            .spec
            .output_by_name(name)
            .ok_or(GraphError::InvalidPort)?;
        Ok(PortRef {
            node: self.id,
            port: port.id,
        })
    }

    /// Reference an input port by name
    pub fn in_(&self, name: &str) -> Result<PortRef, GraphError> {
        let port = self
            .spec
            .input_by_name(name)
            .ok_or(GraphError::InvalidPort)?;
        Ok(PortRef {
            node: self.id,
            port: port.id,
        })
    }
}

/// The signal graph containing nodes and connections
pub struct Graph {
    nodes: SlotMap<NodeId, Node>,
    cables: Vec<Cable>,

    // Execution state, rebuilt by compile()
    execution_order: Vec<NodeId>,
    plan: Vec<Step>,
    signals: Vec<f64>,
    slots: HashMap<PortRef, usize>,
    output_slots: Option<(usize, Option<usize>)>,
    dirty: bool,

    // Scratch port values reused across ticks
    scratch_in: PortValues,
    scratch_out: PortValues,

    // Configuration
    sample_rate: f64,

    // Output node
    output_node: Option<NodeId>,
}

impl Graph {
    /// Create a new empty graph
    pub fn new(sample_rate: f64) -> Self {
        Self {
            nodes: SlotMap::new(),
            cables: Vec::new(),
            execution_order: Vec::new(),
            plan: Vec::new(),
            signals: Vec::new(),
            slots: HashMap::new(),
            output_slots: None,
            dirty: true,
            scratch_in: PortValues::new(),
            scratch_out: PortValues::new(),
            sample_rate,
            output_node: None,
        }
    }

    /// Get the sample rate
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Add a node to the graph
    pub fn add<M: GraphModule + 'static>(
        &mut self,
        name: impl Into<String>,
        module: M,
    ) -> NodeHandle {
        self.add_boxed(name, Box::new(module))
    }

    /// Add a boxed node to the graph
    pub fn add_boxed(
        &mut self,
        name: impl Into<String>,
        mut module: Box<dyn GraphModule>,
    ) -> NodeHandle {
        module.set_sample_rate(self.sample_rate);
        let spec = module.port_spec().clone();
        let id = self.nodes.insert(Node {
            module,
            name: name.into(),
        });
        self.invalidate();
        NodeHandle { id, spec }
    }

    /// Remove a node from the graph, along with every cable touching it
    pub fn remove(&mut self, node: NodeId) -> Result<(), GraphError> {
        if self.nodes.remove(node).is_none() {
            return Err(GraphError::InvalidNode);
        }

        self.cables
            .retain(|cable| cable.from.node != node && cable.to.node != node);

        if self.output_node == Some(node) {
            self.output_node = None;
        }

        self.invalidate();
        Ok(())
    }

    /// Connect an output port to an input port
    pub fn connect(&mut self, from: PortRef, to: PortRef) -> Result<(), GraphError> {
        self.validate_output_port(from)?;
        self.validate_input_port(to)?;

        self.cables.push(Cable { from, to });
        self.invalidate();
        Ok(())
    }

    /// Disconnect every cable leaving `node`, returning how many were removed
    pub fn disconnect_outputs(&mut self, node: NodeId) -> Result<usize, GraphError> {
        if !self.nodes.contains_key(node) {
            return Err(GraphError::InvalidNode);
        }
        let before = self.cables.len();
        self.cables.retain(|cable| cable.from.node != node);
        let removed = before - self.cables.len();
        if removed > 0 {
            self.invalidate();
        }
        Ok(removed)
    }

    /// Set the output node for the graph
    pub fn set_output(&mut self, node: NodeId) {
        self.output_node = Some(node);
        self.invalidate();
    }

    /// Set a parameter on a node
    pub fn set_param(&mut self, node: NodeId, param: ParamId, value: f64) -> Result<(), GraphError> {
        let n = self.nodes.get_mut(node).ok_or(GraphError::InvalidNode)?;
        n.module.set_param(param, value);
        Ok(())
    }

    /// Get a parameter value from a node
    pub fn get_param(&self, node: NodeId, param: ParamId) -> Option<f64> {
        self.nodes.get(node).and_then(|n| n.module.get_param(param))
    }

    /// Start a scheduled source node
    pub fn start(&mut self, node: NodeId) -> Result<(), GraphError> {
        let n = self.nodes.get_mut(node).ok_or(GraphError::InvalidNode)?;
        n.module.start();
        Ok(())
    }

    /// Stop a scheduled source node
    pub fn stop(&mut self, node: NodeId) -> Result<(), GraphError> {
        let n = self.nodes.get_mut(node).ok_or(GraphError::InvalidNode)?;
        n.module.stop();
        Ok(())
    }

    /// Whether a node exists and is producing output
    pub fn is_playing(&self, node: NodeId) -> bool {
        self.nodes
            .get(node)
            .map(|n| n.module.is_playing())
            .unwrap_or(false)
    }

    /// Whether a node is still part of the graph
    pub fn contains(&self, node: NodeId) -> bool {
        self.nodes.contains_key(node)
    }

    /// Get node name
    pub fn get_name(&self, node: NodeId) -> Option<&str> {
        self.nodes.get(node).map(|n| n.name.as_str())
    }

    /// Get the type identifier of a node
    pub fn type_of(&self, node: NodeId) -> Option<&'static str> {
        self.nodes.get(node).map(|n| n.module.type_id())
    }

    /// Get number of nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Get number of cables
    pub fn cable_count(&self) -> usize {
        self.cables.len()
    }

    /// Get all cables
    pub fn cables(&self) -> &[Cable] {
        &self.cables
    }

    /// Cables whose destination is `node`
    pub fn cables_into(&self, node: NodeId) -> impl Iterator<Item = &Cable> {
        self.cables.iter().filter(move |c| c.to.node == node)
    }

    /// Get execution order (after compile)
    pub fn execution_order(&self) -> &[NodeId] {
        &self.execution_order
    }

    /// Signal reads one tick performs across all inputs (after compile).
    /// Each cable is read exactly once, so this equals `cable_count`.
    pub fn routed_inputs(&self) -> usize {
        self.plan
            .iter()
            .flat_map(|step| &step.inputs)
            .map(|input| input.sources.len())
            .sum()
    }

    fn invalidate(&mut self) {
        self.dirty = true;
    }

    fn validate_output_port(&self, port_ref: PortRef) -> Result<(), GraphError> {
        let node = self.nodes.get(port_ref.node).ok_or(GraphError::InvalidNode)?;
        node.module
            .port_spec()
            .output_by_id(port_ref.port)
            .ok_or(GraphError::InvalidPort)?;
        Ok(())
    }

    fn validate_input_port(&self, port_ref: PortRef) -> Result<(), GraphError> {
        let node = self.nodes.get(port_ref.node).ok_or(GraphError::InvalidNode)?;
        node.module
            .port_spec()
            .input_by_id(port_ref.port)
            .ok_or(GraphError::InvalidPort)?;
        Ok(())
    }

    /// Compile the graph into an executable plan.
    ///
    /// Every output port gets a dense signal slot and every input a list of
    /// the slots feeding it, so a tick costs O(nodes + cables).
    pub fn compile(&mut self) -> Result<(), GraphError> {
        let order = self.topological_sort()?;

        // Assign output slots, keeping values of surviving ports
        let mut slots = HashMap::new();
        let mut signals = Vec::new();
        for &id in &order {
            let Some(node) = self.nodes.get(id) else {
                continue;
            };
            for output in &node.module.port_spec().outputs {
                let port_ref = PortRef {
                    node: id,
                    port: output.id,
                };
                let previous = self
                    .slots
                    .get(&port_ref)
                    .and_then(|&slot| self.signals.get(slot))
                    .copied()
                    .unwrap_or(0.0);
                slots.insert(port_ref, signals.len());
                signals.push(previous);
            }
        }

        let mut plan = Vec::with_capacity(order.len());
        let mut step_of: HashMap<NodeId, usize> = HashMap::with_capacity(order.len());
        for &id in &order {
            let Some(node) = self.nodes.get(id) else {
                continue;
            };
            let spec = node.module.port_spec();
            let inputs = spec
                .inputs
                .iter()
                .map(|input| InputPlan {
                    port: input.id,
                    default: input.default,
                    sources: Vec::new(),
                })
                .collect();
            let outputs = spec
                .outputs
                .iter()
                .filter_map(|output| {
                    slots
                        .get(&PortRef {
                            node: id,
                            port: output.id,
                        })
                        .map(|&slot| (output.id, slot))
                })
                .collect();
            step_of.insert(id, plan.len());
            plan.push(Step {
                node: id,
                inputs,
                outputs,
            });
        }

        for cable in &self.cables {
            let (Some(&source), Some(&step)) = (slots.get(&cable.from), step_of.get(&cable.to.node))
            else {
                continue;
            };
            if let Some(input) = plan[step]
                .inputs
                .iter_mut()
                .find(|input| input.port == cable.to.port)
            {
                input.sources.push(source);
            }
        }

        self.output_slots = self.output_node.and_then(|node| {
            let left = slots.get(&PortRef { node, port: 0 }).copied()?;
            let right = slots.get(&PortRef { node, port: 1 }).copied();
            Some((left, right))
        });

        self.execution_order = order;
        self.plan = plan;
        self.signals = signals;
        self.slots = slots;
        self.dirty = false;
        Ok(())
    }

    fn topological_sort(&self) -> Result<Vec<NodeId>, GraphError> {
        let mut in_degree: HashMap<NodeId, usize> = self.nodes.keys().map(|k| (k, 0)).collect();
        let mut successors: HashMap<NodeId, Vec<NodeId>> =
            self.nodes.keys().map(|k| (k, vec![])).collect();

        for cable in &self.cables {
            *in_degree.entry(cable.to.node).or_insert(0) += 1;
            successors
                .entry(cable.from.node)
                .or_default()
                .push(cable.to.node);
        }

        // Kahn's algorithm
        let mut queue: VecDeque<NodeId> = in_degree
            .iter()
            .filter(|(_, &deg)| deg == 0)
            .map(|(&id, _)| id)
            .collect();

        let mut result = Vec::with_capacity(self.nodes.len());

        while let Some(node) = queue.pop_front() {
            result.push(node);
            if let Some(succs) = successors.get(&node) {
                for succ in succs {
                    if let Some(deg) = in_degree.get_mut(succ) {
                        *deg -= 1;
                        if *deg == 0 {
                            queue.push_back(*succ);
                        }
                    }
                }
            }
        }

        if result.len() != self.nodes.len() {
            let in_cycle: Vec<NodeId> = in_degree
                .into_iter()
                .filter(|(_, deg)| *deg > 0)
                .map(|(id, _)| id)
                .collect();
            return Err(GraphError::CycleDetected { nodes: in_cycle });
        }

        Ok(result)
    }

    /// Process a single sample, returning stereo output
    pub fn tick(&mut self) -> (f64, f64) {
        if self.dirty {
            if let Err(e) = self.compile() {
                warn!(error = %e, "signal graph failed to compile, rendering silence");
                return (0.0, 0.0);
            }
        }

        for step in &self.plan {
            // Unconnected inputs read their default, connected ones sum
            self.scratch_in.clear();
            for input in &step.inputs {
                let value = if input.sources.is_empty() {
                    input.default
                } else {
                    input.sources.iter().map(|&slot| self.signals[slot]).sum()
                };
                self.scratch_in.set(input.port, value);
            }

            self.scratch_out.clear();
            if let Some(node) = self.nodes.get_mut(step.node) {
                node.module.tick(&self.scratch_in, &mut self.scratch_out);
            }

            for &(port, slot) in &step.outputs {
                if let Some(value) = self.scratch_out.get(port) {
                    self.signals[slot] = value;
                }
            }
        }

        self.read_output()
    }

    fn read_output(&self) -> (f64, f64) {
        let Some((left, right)) = self.output_slots else {
            return (0.0, 0.0);
        };
        let left = self.signals[left];
        let right = right.map(|slot| self.signals[slot]).unwrap_or(left);
        (left, right)
    }

    /// Reset every node and zero all signals
    pub fn reset(&mut self) {
        for (_, node) in &mut self.nodes {
            node.module.reset();
        }
        self.signals.fill(0.0);
    }

    /// Iterate over all nodes
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &str, &dyn GraphModule)> {
        self.nodes
            .iter()
            .map(|(id, node)| (id, node.name.as_str(), node.module.as_ref()))
    }
}
