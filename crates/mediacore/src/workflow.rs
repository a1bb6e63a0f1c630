use crate::node::{Node, NodeId, NodeStatus, NodeUpdate};
use crate::{validator, Value, WorkflowError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use uuid::Uuid;

pub type WorkflowId = Uuid;
pub type EdgeId = String;

/// Complete workflow graph: nodes plus the edges between them.
///
/// Edge order matters. Inputs arriving on the same port are aggregated in
/// the order their edges appear in `edges`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: WorkflowId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl Workflow {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: None,
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    /// Parse a workflow from JSON. Edges are taken as written, without
    /// re-running the connection rules.
    pub fn from_json(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a workflow JSON file.
    pub fn load(path: impl AsRef<Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn add_node(&mut self, node: Node) -> Result<NodeId, WorkflowError> {
        if self.node(&node.id).is_some() {
            return Err(WorkflowError::DuplicateNode(node.id));
        }
        let id = node.id.clone();
        self.nodes.push(node);
        Ok(id)
    }

    /// Admit a new edge if it passes the connection rules.
    pub fn add_edge(&mut self, connection: Connection) -> Result<EdgeId, WorkflowError> {
        validator::validate_connection(self, &connection)?;

        let duplicate = self.edges.iter().any(|e| {
            e.source == connection.source
                && e.target == connection.target
                && e.target_port == connection.target_port
        });
        if duplicate {
            return Err(WorkflowError::DuplicateEdge {
                from: connection.source,
                to: connection.target,
            });
        }

        let id = format!("e-{}", Uuid::new_v4().simple());
        self.edges.push(Edge {
            id: id.clone(),
            source: connection.source,
            target: connection.target,
            target_port: connection.target_port,
        });
        Ok(id)
    }

    /// Shorthand for [`Workflow::add_edge`].
    pub fn connect(
        &mut self,
        source: impl Into<NodeId>,
        target: impl Into<NodeId>,
        target_port: Option<TargetPort>,
    ) -> Result<EdgeId, WorkflowError> {
        self.add_edge(Connection {
            source: source.into(),
            target: target.into(),
            target_port,
        })
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    /// Edges whose target is `node_id`, in edge-list order.
    pub fn incoming_edges<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| e.target == node_id)
    }

    pub fn outgoing_edges<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| e.source == node_id)
    }

    /// Nodes that feed nothing: the outputs of the workflow.
    pub fn terminal_nodes(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|n| !self.edges.iter().any(|e| e.source == n.id))
            .map(|n| n.id.clone())
            .collect()
    }

    pub fn update_node(&mut self, id: &str, update: NodeUpdate) -> Result<&Node, WorkflowError> {
        let node = self
            .node_mut(id)
            .ok_or_else(|| WorkflowError::NodeNotFound(id.to_string()))?;
        node.apply(update);
        Ok(node)
    }

    /// Remove a node together with every edge touching it.
    pub fn remove_node(&mut self, id: &str) -> Result<Node, WorkflowError> {
        let index = self
            .nodes
            .iter()
            .position(|n| n.id == id)
            .ok_or_else(|| WorkflowError::NodeNotFound(id.to_string()))?;
        self.edges.retain(|e| e.source != id && e.target != id);
        Ok(self.nodes.remove(index))
    }

    pub fn remove_edge(&mut self, id: &str) -> Result<Edge, WorkflowError> {
        let index = self
            .edges
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| WorkflowError::EdgeNotFound(id.to_string()))?;
        Ok(self.edges.remove(index))
    }

    pub fn mark_running(&mut self, id: &str) {
        if let Some(node) = self.node_mut(id) {
            node.set_running();
        }
    }

    pub fn mark_success(&mut self, id: &str, output: Value) {
        if let Some(node) = self.node_mut(id) {
            node.status = NodeStatus::Success;
            node.output = Some(output);
        }
    }

    pub fn mark_error(&mut self, id: &str, message: impl Into<String>) {
        if let Some(node) = self.node_mut(id) {
            node.status = NodeStatus::Error;
            node.error_message = Some(message.into());
        }
    }

    /// Return every node to `idle` and clear error messages. Outputs and
    /// values are kept so earlier results stay inspectable.
    pub fn reset(&mut self) {
        for node in &mut self.nodes {
            node.status = NodeStatus::Idle;
            node.error_message = None;
        }
    }
}

/// Named input port on a target node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetPort {
    Text,
    Image,
}

impl fmt::Display for TargetPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetPort::Text => f.write_str("text"),
            TargetPort::Image => f.write_str("image"),
        }
    }
}

/// Directed data dependency: `source` feeds `target`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Edge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_port: Option<TargetPort>,
}

/// Candidate edge, before it has been admitted to a workflow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Connection {
    pub source: NodeId,
    pub target: NodeId,
    #[serde(default)]
    pub target_port: Option<TargetPort>,
}

/// Retry policy for capability calls
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl RetryPolicy {
    /// A single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            delay_ms: 0,
            backoff_multiplier: 1.0,
        }
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> std::time::Duration {
        let factor = self.backoff_multiplier.max(1.0).powi(attempt.saturating_sub(1) as i32);
        std::time::Duration::from_millis((self.delay_ms as f64 * factor) as u64)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_ms: 1000,
            backoff_multiplier: 2.0,
        }
    }
}
