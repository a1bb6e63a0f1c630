use mediacore::{validate_connection, Connection, NodeId, TargetPort, Value, Workflow, WorkflowError};
use petgraph::algo::{is_cyclic_directed, tarjan_scc};
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// The chain of nodes currently being resolved above a node.
///
/// Immutable and cheap to clone: extending it shares the parent chain, so
/// sibling branches each carry their own path and never see each other's
/// nodes. Only a node reappearing on its own chain is a cycle.
#[derive(Debug, Clone, Default)]
pub struct AncestorPath(Option<Arc<Link>>);

#[derive(Debug)]
struct Link {
    node_id: NodeId,
    parent: AncestorPath,
}

impl AncestorPath {
    pub fn root() -> Self {
        Self(None)
    }

    pub fn extend(&self, node_id: impl Into<NodeId>) -> Self {
        Self(Some(Arc::new(Link {
            node_id: node_id.into(),
            parent: self.clone(),
        })))
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.iter().any(|id| id == node_id)
    }

    pub fn depth(&self) -> usize {
        self.iter().count()
    }

    /// Innermost node first.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        let mut current = self.0.as_deref();
        std::iter::from_fn(move || {
            let link = current?;
            current = link.parent.0.as_deref();
            Some(link.node_id.as_str())
        })
    }
}

/// Upstream results for one node, bucketed by the port they arrived on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedInputs {
    pub text: Vec<Value>,
    pub image: Vec<Value>,
    pub generic: Vec<Value>,
}

impl ResolvedInputs {
    pub fn push(&mut self, port: Option<TargetPort>, value: Value) {
        match port {
            Some(TargetPort::Text) => self.text.push(value),
            Some(TargetPort::Image) => self.image.push(value),
            None => self.generic.push(value),
        }
    }

    /// First generic input, when it carries something.
    pub fn first_generic(&self) -> Option<&Value> {
        self.generic.first().filter(|v| v.is_truthy())
    }
}

/// Dependency graph over the workflow, edges pointing from source to target.
/// Edges naming unknown nodes are left out.
pub fn dependency_graph(workflow: &Workflow) -> (DiGraph<NodeId, ()>, HashMap<NodeId, NodeIndex>) {
    let mut graph = DiGraph::new();
    let mut node_to_index = HashMap::new();

    for node in &workflow.nodes {
        let idx = graph.add_node(node.id.clone());
        node_to_index.insert(node.id.clone(), idx);
    }

    for edge in &workflow.edges {
        if let (Some(from), Some(to)) = (node_to_index.get(&edge.source), node_to_index.get(&edge.target)) {
            graph.add_edge(*from, *to, ());
        }
    }

    (graph, node_to_index)
}

/// Whether everything upstream of `targets` (targets included) is free of cycles.
pub fn upstream_is_acyclic(workflow: &Workflow, targets: &[NodeId]) -> bool {
    let mut upstream: HashSet<&str> = HashSet::new();
    let mut stack: Vec<&str> = targets.iter().map(String::as_str).collect();
    while let Some(id) = stack.pop() {
        if !upstream.insert(id) {
            continue;
        }
        stack.extend(workflow.incoming_edges(id).map(|e| e.source.as_str()));
    }

    let mut graph = DiGraph::<&str, ()>::new();
    let mut indices = HashMap::new();
    for id in &upstream {
        indices.insert(*id, graph.add_node(*id));
    }
    for edge in &workflow.edges {
        if let (Some(from), Some(to)) = (
            indices.get(edge.source.as_str()),
            indices.get(edge.target.as_str()),
        ) {
            graph.add_edge(*from, *to, ());
        }
    }

    !is_cyclic_directed(&graph)
}

/// Every cycle in the workflow, one node list per strongly connected component.
pub fn find_cycles(workflow: &Workflow) -> Vec<Vec<NodeId>> {
    let (graph, _) = dependency_graph(workflow);

    tarjan_scc(&graph)
        .into_iter()
        .filter(|component| {
            component.len() > 1 || graph.contains_edge(component[0], component[0])
        })
        .map(|component| {
            let mut ids: Vec<NodeId> = component.into_iter().map(|idx| graph[idx].clone()).collect();
            ids.sort();
            ids
        })
        .collect()
}

/// Every edge the connection rules would reject, then every cycle.
///
/// Edges are only checked when added, so a graph loaded from disk can carry
/// either kind of problem.
pub fn workflow_problems(workflow: &Workflow) -> Vec<WorkflowError> {
    let invalid = workflow.edges.iter().filter_map(|edge| {
        let connection = Connection {
            source: edge.source.clone(),
            target: edge.target.clone(),
            target_port: edge.target_port,
        };
        validate_connection(workflow, &connection).err()
    });

    invalid
        .chain(find_cycles(workflow).into_iter().map(WorkflowError::CyclicDependency))
        .collect()
}
