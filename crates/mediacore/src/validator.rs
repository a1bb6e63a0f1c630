//! Port-type rules checked before an edge enters the graph.
//!
//! Edges are only checked on creation. Execution never re-validates, so a
//! workflow loaded from disk runs with whatever edges it carries.

use crate::node::{NodeKind, PortClass};
use crate::workflow::{Connection, TargetPort, Workflow};
use crate::WorkflowError;

/// Whether `candidate` may be added to `workflow`.
pub fn is_valid_connection(workflow: &Workflow, candidate: &Connection) -> bool {
    validate_connection(workflow, candidate).is_ok()
}

/// Same verdict as [`is_valid_connection`], with the reason on rejection.
pub fn validate_connection(workflow: &Workflow, candidate: &Connection) -> Result<(), WorkflowError> {
    let source = workflow
        .node(&candidate.source)
        .ok_or_else(|| WorkflowError::NodeNotFound(candidate.source.clone()))?;
    let target = workflow
        .node(&candidate.target)
        .ok_or_else(|| WorkflowError::NodeNotFound(candidate.target.clone()))?;

    let source_class = source.kind.port_class();
    let admitted = match target.kind {
        NodeKind::RunLlm => match candidate.target_port {
            Some(TargetPort::Image) => source_class == PortClass::Image,
            Some(TargetPort::Text) => source_class == PortClass::Text,
            None => false,
        },
        NodeKind::CropImage => source_class == PortClass::Image,
        NodeKind::ExtractFrame => source.kind == NodeKind::UploadVideo,
        NodeKind::Text | NodeKind::UploadImage | NodeKind::UploadVideo => true,
    };

    if admitted {
        return Ok(());
    }

    let port = candidate
        .target_port
        .map(|p| format!(" port '{p}'"))
        .unwrap_or_default();
    Err(WorkflowError::InvalidConnection(format!(
        "{} ({}) cannot feed {} ({}){}",
        source.id, source.kind, target.id, target.kind, port
    )))
}
