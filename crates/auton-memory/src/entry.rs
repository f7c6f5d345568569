use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Retention class of a memory entry. Callers pick the kind at write time;
/// there is no automatic promotion between them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    ShortTerm,
    LongTerm,
}

/// A stored fact used to build execution context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// Caller-assigned id, used as the upsert key.
    pub id: String,
    pub kind: MemoryKind,
    pub content: String,
    /// Free-text tag for human inspection (e.g. "task_execution").
    /// Never used for querying.
    pub context: String,
    pub timestamp: DateTime<Utc>,
    /// 1-10 scale; higher importance surfaces first among timestamp ties.
    pub importance: u8,
}

impl MemoryEntry {
    pub fn new(
        id: impl Into<String>,
        kind: MemoryKind,
        content: impl Into<String>,
        context: impl Into<String>,
        importance: u8,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            content: content.into(),
            context: context.into(),
            timestamp: Utc::now(),
            importance: importance.clamp(1, 10),
        }
    }
}

/// Append-only accounting entry tying token usage to a model and an
/// optional task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostRecord {
    pub model: String,
    pub tokens_used: u64,
    pub estimated_cost: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Per-model aggregate produced by [`crate::MemoryStore::cost_summary`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ModelUsage {
    pub total_tokens: u64,
    pub total_cost: f64,
    pub call_count: u64,
}
