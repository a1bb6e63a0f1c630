use crate::{NodeId, Value};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use uuid::Uuid;

pub type RunId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Failed,
    Running,
}

/// Which part of the graph a run targeted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunScope {
    Full,
    Partial,
    Single,
}

/// Summary of one run, immutable once recorded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionRun {
    pub id: RunId,
    pub timestamp: DateTime<Utc>,
    pub status: RunStatus,
    pub duration_ms: u64,
    pub scope: RunScope,
    #[serde(default)]
    pub results: HashMap<NodeId, Value>,
}

/// Append-only run log, most recent first.
#[derive(Debug, Default, Clone)]
pub struct History {
    runs: VecDeque<ExecutionRun>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, run: ExecutionRun) {
        self.runs.push_front(run);
    }

    pub fn runs(&self) -> impl Iterator<Item = &ExecutionRun> {
        self.runs.iter()
    }

    pub fn latest(&self) -> Option<&ExecutionRun> {
        self.runs.front()
    }

    pub fn get(&self, id: RunId) -> Option<&ExecutionRun> {
        self.runs.iter().find(|r| r.id == id)
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}
