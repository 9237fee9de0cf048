//! Task graph: DAG construction, structural validation, and the scheduler.
//!
//! `TaskGraph` is the builder; `compile()` validates the structure (unique
//! ids, known edge endpoints, no self-loops, no cycles) and produces a
//! `CompiledTaskGraph` whose `run()` executes nodes in dependency order.
//!
//! Scheduling is cooperative: every eligible node runs as its own tokio
//! task; a node becomes eligible the instant all direct predecessors have
//! completed. Failure propagation is fail-fast — the first failure stops
//! scheduling new nodes, already-running siblings finish and their outputs
//! are retained, and never-started nodes are reported as skipped.

mod dag;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::EngineConfig;
use crate::context::{Context, CTX_INPUT, CTX_PARENT, CTX_PARENT_OUTPUTS};
use crate::error::NodeError;
use crate::event::{Event, EventBus};
use crate::generation::GenerationPort;
use crate::memory::ConversationMemory;
use crate::node::{execute_node, NodeServices, TaskNode, TaskOutput};
use crate::subtask::truncate;

/// Structural problem found at graph-build time, before any execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructuralError {
    #[error("duplicate node id: {0}")]
    DuplicateNodeId(String),
    #[error("edge references unknown node id: {0}")]
    UnknownNodeId(String),
    #[error("node {0} cannot depend on itself")]
    SelfLoop(String),
    #[error("graph contains a dependency cycle")]
    Cycle,
}

/// Graph builder: nodes, edges, and shared collaborators.
pub struct TaskGraph {
    nodes: Vec<TaskNode>,
    edges: Vec<(String, String)>,
    generation: Arc<dyn GenerationPort>,
    config: EngineConfig,
    bus: Arc<EventBus>,
    memory: Option<Arc<dyn ConversationMemory>>,
}

impl TaskGraph {
    /// Starts a graph using `generation` as the default port for all nodes.
    pub fn new(generation: Arc<dyn GenerationPort>) -> Self {
        Self {
            nodes: Vec::new(),
            edges: Vec::new(),
            generation,
            config: EngineConfig::default(),
            bus: Arc::new(EventBus::new()),
            memory: None,
        }
    }

    /// Adds a node. Insertion order breaks scheduling ties.
    pub fn add_node(mut self, node: TaskNode) -> Self {
        self.nodes.push(node);
        self
    }

    /// Declares a dependency edge: `from` must complete before `to` starts.
    pub fn add_edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.edges.push((from.into(), to.into()));
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Attaches a shared event bus; by default the graph owns a fresh one.
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = bus;
        self
    }

    /// Attaches conversation memory for nodes carrying a memory alias.
    pub fn with_memory(mut self, memory: Arc<dyn ConversationMemory>) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Validates the structure and produces a runnable graph.
    pub fn compile(self) -> Result<CompiledTaskGraph, StructuralError> {
        let mut ids = Vec::with_capacity(self.nodes.len());
        let mut seen = HashSet::new();
        for node in &self.nodes {
            if !seen.insert(node.id().to_string()) {
                return Err(StructuralError::DuplicateNodeId(node.id().to_string()));
            }
            ids.push(node.id().to_string());
        }
        for (from, to) in &self.edges {
            if !seen.contains(from) {
                return Err(StructuralError::UnknownNodeId(from.clone()));
            }
            if !seen.contains(to) {
                return Err(StructuralError::UnknownNodeId(to.clone()));
            }
            if from == to {
                return Err(StructuralError::SelfLoop(from.clone()));
            }
        }
        let order =
            dag::topological_order(&ids, &self.edges).ok_or(StructuralError::Cycle)?;

        let mut preds = HashMap::with_capacity(ids.len());
        for id in &ids {
            let mut unique = HashSet::new();
            let direct: Vec<String> = dag::predecessors(&self.edges, id)
                .into_iter()
                .filter(|p| unique.insert(p.clone()))
                .collect();
            preds.insert(id.clone(), direct);
        }

        let nodes = self
            .nodes
            .into_iter()
            .map(|n| (n.id().to_string(), Arc::new(n)))
            .collect();

        Ok(CompiledTaskGraph {
            nodes,
            order,
            preds,
            edges: self.edges,
            generation: self.generation,
            config: self.config,
            bus: self.bus,
            memory: self.memory,
        })
    }
}

/// Why a node never started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// A (possibly transitive) predecessor failed; `root` names it.
    DependencyFailed { root: String },
    /// An unrelated node failed and fail-fast halted scheduling.
    RunAborted,
    /// The run's cancellation token fired before this node started.
    Cancelled,
}

/// Per-node outcome of a graph run.
#[derive(Debug, Clone)]
pub enum NodeRecord {
    /// The node produced its output.
    Completed(TaskOutput),
    /// The node started and failed with this error.
    Failed(NodeError),
    /// The node never started.
    Skipped(SkipReason),
}

/// Overall outcome of a graph run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Every node completed.
    Completed,
    /// At least one node failed; dependents were skipped.
    Failed,
    /// The run was cancelled before every node could start.
    Cancelled,
}

/// Full result of a graph run: status plus a record for every node.
///
/// Either fully successful or a structured failure report — never a
/// partial silent success.
#[derive(Debug)]
pub struct RunReport {
    status: RunStatus,
    records: Vec<(String, NodeRecord)>,
    first_failure: Option<String>,
    terminal: Option<String>,
}

impl RunReport {
    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Completed
    }

    /// The record for one node, in case-sensitive id lookup.
    pub fn record(&self, id: &str) -> Option<&NodeRecord> {
        self.records
            .iter()
            .find(|(record_id, _)| record_id == id)
            .map(|(_, record)| record)
    }

    /// The output of a completed node.
    pub fn output(&self, id: &str) -> Option<&TaskOutput> {
        match self.record(id) {
            Some(NodeRecord::Completed(output)) => Some(output),
            _ => None,
        }
    }

    /// All completed outputs, in topological order.
    pub fn outputs(&self) -> impl Iterator<Item = (&str, &TaskOutput)> {
        self.records.iter().filter_map(|(id, record)| match record {
            NodeRecord::Completed(output) => Some((id.as_str(), output)),
            _ => None,
        })
    }

    /// The first root-cause failure, by completion time.
    pub fn first_failure(&self) -> Option<(&str, &NodeError)> {
        let id = self.first_failure.as_deref()?;
        match self.record(id) {
            Some(NodeRecord::Failed(error)) => Some((id, error)),
            _ => None,
        }
    }

    /// Nodes that never started, with the reason.
    pub fn skipped(&self) -> impl Iterator<Item = (&str, &SkipReason)> {
        self.records.iter().filter_map(|(id, record)| match record {
            NodeRecord::Skipped(reason) => Some((id.as_str(), reason)),
            _ => None,
        })
    }

    /// The terminal node's output: the completed sink latest in topological
    /// order, falling back to the latest completed node.
    pub fn final_output(&self) -> Option<&TaskOutput> {
        self.terminal.as_deref().and_then(|id| self.output(id))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Pending,
    Running,
    Complete,
    Failed,
}

/// A validated, runnable task graph.
pub struct CompiledTaskGraph {
    nodes: HashMap<String, Arc<TaskNode>>,
    order: Vec<String>,
    preds: HashMap<String, Vec<String>>,
    edges: Vec<(String, String)>,
    generation: Arc<dyn GenerationPort>,
    config: EngineConfig,
    bus: Arc<EventBus>,
    memory: Option<Arc<dyn ConversationMemory>>,
}

impl CompiledTaskGraph {
    /// The bus this graph publishes lifecycle and chunk events to.
    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Stable topological order of node ids.
    pub fn order(&self) -> &[String] {
        &self.order
    }

    /// Runs the graph to completion.
    pub async fn run(&self, initial_input: impl Into<Value>) -> RunReport {
        self.run_with_cancellation(initial_input, CancellationToken::new())
            .await
    }

    /// Runs the graph with a cancellation token. Cancelling lets
    /// already-dispatched nodes finish but prevents further nodes from
    /// starting; the report then carries `RunStatus::Cancelled`.
    pub async fn run_with_cancellation(
        &self,
        initial_input: impl Into<Value>,
        cancel: CancellationToken,
    ) -> RunReport {
        let initial: Value = initial_input.into();
        debug!(nodes = self.order.len(), "graph run starting");

        let outputs: Arc<DashMap<String, TaskOutput>> = Arc::new(DashMap::new());
        let mut slots: HashMap<String, Slot> = self
            .order
            .iter()
            .map(|id| (id.clone(), Slot::Pending))
            .collect();
        let mut failures: Vec<(String, NodeError)> = Vec::new();
        let (done_tx, mut done_rx) =
            mpsc::channel::<(String, Result<TaskOutput, NodeError>)>(self.order.len().max(1));
        let mut running = 0usize;
        let mut cancelled = false;

        loop {
            if !cancelled && cancel.is_cancelled() {
                cancelled = true;
            }
            if failures.is_empty() && !cancelled {
                let mut eligible = Vec::new();
                for id in &self.order {
                    if slots.get(id) != Some(&Slot::Pending) {
                        continue;
                    }
                    let preds = self.preds.get(id).map(Vec::as_slice).unwrap_or(&[]);
                    if preds.iter().all(|p| slots.get(p) == Some(&Slot::Complete)) {
                        eligible.push(id.clone());
                    }
                }
                for id in eligible {
                    slots.insert(id.clone(), Slot::Running);
                    running += 1;
                    self.spawn_node(&id, &initial, &outputs, done_tx.clone());
                }
            }
            if running == 0 {
                break;
            }
            let Some((id, result)) = done_rx.recv().await else {
                break;
            };
            running -= 1;
            match result {
                Ok(output) => {
                    outputs.insert(id.clone(), output);
                    slots.insert(id, Slot::Complete);
                }
                Err(error) => {
                    debug!(node = %id, error = %error, "node failed, halting scheduling");
                    slots.insert(id.clone(), Slot::Failed);
                    failures.push((id, error));
                }
            }
        }

        self.build_report(slots, failures, &outputs, cancelled)
    }

    fn spawn_node(
        &self,
        id: &str,
        initial: &Value,
        outputs: &Arc<DashMap<String, TaskOutput>>,
        done_tx: mpsc::Sender<(String, Result<TaskOutput, NodeError>)>,
    ) {
        let Some(node) = self.nodes.get(id).map(Arc::clone) else {
            return;
        };
        let resolved = self.resolve_context(&node, initial, outputs);
        let services = NodeServices {
            generation: Arc::clone(&self.generation),
            bus: Arc::clone(&self.bus),
            memory: self.memory.clone(),
            config: self.config.clone(),
        };
        let bus = Arc::clone(&self.bus);

        tokio::spawn(async move {
            let node_id = node.id().to_string();
            bus.publish(&Event::NodeStart {
                node_id: node_id.clone(),
            });
            let result = execute_node(&node, &resolved, &services).await;
            let summary = match &result {
                Ok(output) => Ok(truncate(&output.as_text(), 200)),
                Err(error) => Err(error.to_string()),
            };
            bus.publish(&Event::NodeFinish {
                node_id: node_id.clone(),
                result: summary,
            });
            let _ = done_tx.send((node_id, result)).await;
        });
    }

    /// Resolves a node's context exactly once, immediately before spawn, so
    /// predecessor outputs are final and immutable when read.
    fn resolve_context(
        &self,
        node: &TaskNode,
        initial: &Value,
        outputs: &DashMap<String, TaskOutput>,
    ) -> Context {
        let mut ctx = Context::new();
        ctx.insert(CTX_INPUT, initial.clone());
        for (name, value) in node.static_context().iter() {
            ctx.insert(name, value.clone());
        }

        let preds = self
            .preds
            .get(node.id())
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        let mut aggregate = serde_json::Map::new();
        for pred in preds {
            if let Some(output) = outputs.get(pred) {
                let value = output.to_value();
                ctx.insert(pred.clone(), value.clone());
                aggregate.insert(pred.clone(), value);
            }
        }
        if preds.len() == 1 {
            if let Some(value) = aggregate.values().next() {
                ctx.insert(CTX_PARENT, value.clone());
            }
        }
        ctx.insert(CTX_PARENT_OUTPUTS, Value::Object(aggregate));
        ctx
    }

    fn build_report(
        &self,
        slots: HashMap<String, Slot>,
        failures: Vec<(String, NodeError)>,
        outputs: &DashMap<String, TaskOutput>,
        cancelled: bool,
    ) -> RunReport {
        let mut poisoned: HashMap<String, String> = HashMap::new();
        for (root, _) in &failures {
            for dependent in dag::transitive_dependents(&self.edges, root) {
                poisoned.entry(dependent).or_insert_with(|| root.clone());
            }
        }
        let first_failure = failures.first().map(|(id, _)| id.clone());
        let mut failed: HashMap<String, NodeError> = failures.into_iter().collect();

        let mut records = Vec::with_capacity(self.order.len());
        for id in &self.order {
            let record = match slots.get(id) {
                Some(Slot::Complete) => match outputs.get(id) {
                    Some(output) => NodeRecord::Completed(output.value().clone()),
                    None => NodeRecord::Skipped(SkipReason::RunAborted),
                },
                Some(Slot::Failed) => match failed.remove(id) {
                    Some(error) => NodeRecord::Failed(error),
                    None => NodeRecord::Skipped(SkipReason::RunAborted),
                },
                _ => {
                    if let Some(root) = poisoned.get(id) {
                        NodeRecord::Skipped(SkipReason::DependencyFailed {
                            root: root.clone(),
                        })
                    } else if cancelled {
                        NodeRecord::Skipped(SkipReason::Cancelled)
                    } else {
                        NodeRecord::Skipped(SkipReason::RunAborted)
                    }
                }
            };
            records.push((id.clone(), record));
        }

        let any_skipped = records
            .iter()
            .any(|(_, r)| matches!(r, NodeRecord::Skipped(_)));
        let status = if first_failure.is_some() {
            RunStatus::Failed
        } else if any_skipped {
            RunStatus::Cancelled
        } else {
            RunStatus::Completed
        };
        debug!(?status, "graph run finished");

        let completed: HashSet<&str> = records
            .iter()
            .filter(|(_, r)| matches!(r, NodeRecord::Completed(_)))
            .map(|(id, _)| id.as_str())
            .collect();
        let sources: HashSet<&str> = self.edges.iter().map(|(from, _)| from.as_str()).collect();
        let terminal = self
            .order
            .iter()
            .rev()
            .find(|id| completed.contains(id.as_str()) && !sources.contains(id.as_str()))
            .or_else(|| {
                self.order
                    .iter()
                    .rev()
                    .find(|id| completed.contains(id.as_str()))
            })
            .cloned();

        RunReport {
            status,
            records,
            first_failure,
            terminal,
        }
    }
}

impl std::fmt::Debug for CompiledTaskGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledTaskGraph")
            .field("order", &self.order)
            .field("edges", &self.edges)
            .finish()
    }
}
