use std::collections::{BTreeMap, HashMap};
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;

use auton_core::types::{Task, TaskStatus};

use crate::entry::{CostRecord, MemoryEntry, MemoryKind, ModelUsage};

const MEMORIES_FILE_NAME: &str = "memories.jsonl";
const TASKS_FILE_NAME: &str = "tasks.jsonl";
const COSTS_FILE_NAME: &str = "costs.jsonl";
const APP_NAME: &str = "auton";

/// File-backed store with three JSONL logs: memory entries, tasks, and cost
/// records.
///
/// Memory and task logs are latest-wins: an upsert appends a full new record
/// and readers keep the last occurrence per id. Every write is a single
/// flushed append, so rows stay atomic without any cross-record coordination.
/// The cost log is pure append; aggregation happens at read time.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    base_dir: PathBuf,
    memories_path: PathBuf,
    tasks_path: PathBuf,
    costs_path: PathBuf,
}

impl MemoryStore {
    pub fn new(base_dir: PathBuf) -> Self {
        let base_dir = if base_dir.as_os_str().is_empty() {
            default_state_dir()
        } else {
            base_dir
        };
        Self {
            memories_path: base_dir.join(MEMORIES_FILE_NAME),
            tasks_path: base_dir.join(TASKS_FILE_NAME),
            costs_path: base_dir.join(COSTS_FILE_NAME),
            base_dir,
        }
    }

    /// Upsert a memory entry by id (whole-record replace).
    pub fn put(&self, entry: &MemoryEntry) -> Result<()> {
        self.append_record(&self.memories_path, entry)
    }

    /// Return up to `limit` entries, optionally filtered by kind, ordered by
    /// `(timestamp DESC, importance DESC)`.
    pub fn query(&self, kind: Option<MemoryKind>, limit: usize) -> Result<Vec<MemoryEntry>> {
        let mut entries = self.load_memories()?;
        if let Some(kind) = kind {
            entries.retain(|entry| entry.kind == kind);
        }
        entries.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then(b.importance.cmp(&a.importance))
        });
        entries.truncate(limit);
        Ok(entries)
    }

    /// Upsert a task by id (whole-record replace).
    pub fn put_task(&self, task: &Task) -> Result<()> {
        self.append_record(&self.tasks_path, task)
    }

    /// Look up a task by id. `None` when no such task was ever stored.
    pub fn get_task(&self, id: &str) -> Result<Option<Task>> {
        let mut found = None;
        // Last matching line wins, same as the bulk loaders.
        for task in self.load_records::<Task>(&self.tasks_path)? {
            if task.id == id {
                found = Some(task);
            }
        }
        Ok(found)
    }

    pub fn append_cost(&self, record: &CostRecord) -> Result<()> {
        self.append_record(&self.costs_path, record)
    }

    /// Aggregate all cost records, grouped by model.
    pub fn cost_summary(&self) -> Result<BTreeMap<String, ModelUsage>> {
        let mut summary: BTreeMap<String, ModelUsage> = BTreeMap::new();
        for record in self.load_records::<CostRecord>(&self.costs_path)? {
            let usage = summary.entry(record.model).or_default();
            usage.total_tokens += record.tokens_used;
            usage.total_cost += record.estimated_cost;
            usage.call_count += 1;
        }
        Ok(summary)
    }

    /// Count of stored tasks in each lifecycle state.
    pub fn task_status_counts(&self) -> Result<BTreeMap<TaskStatus, u64>> {
        let mut counts: BTreeMap<TaskStatus, u64> = BTreeMap::new();
        for task in self.load_tasks()? {
            *counts.entry(task.status).or_default() += 1;
        }
        Ok(counts)
    }

    pub fn memory_count(&self) -> Result<usize> {
        Ok(self.load_memories()?.len())
    }

    /// Rewrite the memory and task logs to their deduplicated snapshots.
    ///
    /// Superseded record versions accumulate in the latest-wins logs; this
    /// drops them via temp-file + atomic rename. The visible store state is
    /// unchanged. The cost log is append-only and is left alone.
    pub fn compact(&self) -> Result<()> {
        let mut memories = self.load_memories()?;
        memories.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        self.rewrite_log(&self.memories_path, &memories)?;

        let mut tasks = self.load_tasks()?;
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        self.rewrite_log(&self.tasks_path, &tasks)?;
        Ok(())
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn load_memories(&self) -> Result<Vec<MemoryEntry>> {
        let mut by_id: HashMap<String, MemoryEntry> = HashMap::new();
        for entry in self.load_records::<MemoryEntry>(&self.memories_path)? {
            by_id.insert(entry.id.clone(), entry);
        }
        Ok(by_id.into_values().collect())
    }

    fn load_tasks(&self) -> Result<Vec<Task>> {
        let mut by_id: HashMap<String, Task> = HashMap::new();
        for task in self.load_records::<Task>(&self.tasks_path)? {
            by_id.insert(task.id.clone(), task);
        }
        Ok(by_id.into_values().collect())
    }

    fn append_record<T: Serialize>(&self, path: &Path, record: &T) -> Result<()> {
        self.ensure_storage_dir()?;

        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(path)
            .with_context(|| format!("failed to open store file: {}", path.display()))?;

        set_file_mode_600(path)?;

        let line = serde_json::to_string(record).context("failed to serialize store record")?;
        writeln!(file, "{line}")
            .with_context(|| format!("failed to append to {}", path.display()))?;
        file.flush()
            .with_context(|| format!("failed to flush append to {}", path.display()))?;

        Ok(())
    }

    fn load_records<T: DeserializeOwned>(&self, path: &Path) -> Result<Vec<T>> {
        if !path.exists() {
            return Ok(Vec::new());
        }

        let file = OpenOptions::new()
            .read(true)
            .open(path)
            .with_context(|| format!("failed to read store file: {}", path.display()))?;
        let reader = BufReader::new(file);

        let mut records = Vec::new();
        for (idx, line_result) in reader.lines().enumerate() {
            let line = line_result.with_context(|| {
                format!("failed to read line {} from {}", idx + 1, path.display())
            })?;

            if line.trim().is_empty() {
                continue;
            }

            match serde_json::from_str::<T>(&line) {
                Ok(record) => records.push(record),
                Err(error) => {
                    warn!(
                        path = %path.display(),
                        line_number = idx + 1,
                        %error,
                        "skipping corrupt store jsonl line"
                    );
                }
            }
        }

        Ok(records)
    }

    fn rewrite_log<T: Serialize>(&self, path: &Path, records: &[T]) -> Result<()> {
        self.ensure_storage_dir()?;

        let tmp_path = path.with_extension("jsonl.tmp");
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)
            .with_context(|| format!("failed to open temp store file: {}", tmp_path.display()))?;
        set_file_mode_600(&tmp_path)?;

        let mut writer = BufWriter::new(file);
        for record in records {
            let line = serde_json::to_string(record).context("failed to serialize store record")?;
            writeln!(writer, "{line}").context("failed to write store record")?;
        }
        writer.flush().context("failed to flush rewritten store file")?;

        fs::rename(&tmp_path, path).with_context(|| {
            format!("failed to atomically replace store file {}", path.display())
        })?;
        Ok(())
    }

    fn ensure_storage_dir(&self) -> Result<()> {
        let dir_exists = self.base_dir.exists();
        fs::create_dir_all(&self.base_dir)
            .with_context(|| format!("failed to create store dir: {}", self.base_dir.display()))?;

        if !dir_exists {
            set_dir_mode_700(&self.base_dir)?;
        }

        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(PathBuf::new())
    }
}

fn default_state_dir() -> PathBuf {
    if let Some(project_dirs) = directories::ProjectDirs::from("", "", APP_NAME) {
        return project_dirs
            .state_dir()
            .unwrap_or_else(|| project_dirs.data_local_dir())
            .join("store");
    }

    if let Some(base_dirs) = directories::BaseDirs::new() {
        return base_dirs
            .home_dir()
            .join(".local")
            .join("state")
            .join(APP_NAME)
            .join("store");
    }

    std::env::temp_dir()
        .join(format!("{APP_NAME}-state"))
        .join("store")
}

#[cfg(unix)]
fn set_dir_mode_700(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o700))
        .with_context(|| format!("failed to chmod 700: {}", path.display()))
}

#[cfg(not(unix))]
fn set_dir_mode_700(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(unix)]
fn set_file_mode_600(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
        .with_context(|| format!("failed to chmod 600: {}", path.display()))
}

#[cfg(not(unix))]
fn set_file_mode_600(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use tempfile::TempDir;

    fn make_test_store() -> (TempDir, MemoryStore) {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new(dir.path().join("store"));
        (dir, store)
    }

    fn make_entry(id: &str, kind: MemoryKind, content: &str, importance: u8) -> MemoryEntry {
        MemoryEntry::new(id, kind, content, "test", importance)
    }

    #[test]
    fn test_put_and_query() {
        let (_dir, store) = make_test_store();

        store
            .put(&make_entry("m1", MemoryKind::ShortTerm, "first", 5))
            .unwrap();
        store
            .put(&make_entry("m2", MemoryKind::LongTerm, "second", 5))
            .unwrap();

        let all = store.query(None, 10).unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().any(|entry| entry.content == "first"));
        assert!(all.iter().any(|entry| entry.content == "second"));
    }

    #[test]
    fn test_query_kind_filter() {
        let (_dir, store) = make_test_store();

        store
            .put(&make_entry("m1", MemoryKind::ShortTerm, "transient", 5))
            .unwrap();
        store
            .put(&make_entry("m2", MemoryKind::LongTerm, "durable", 5))
            .unwrap();

        let long_term = store.query(Some(MemoryKind::LongTerm), 10).unwrap();
        assert_eq!(long_term.len(), 1);
        assert_eq!(long_term[0].content, "durable");
    }

    #[test]
    fn test_query_orders_newest_first() {
        let (_dir, store) = make_test_store();

        let mut older = make_entry("old", MemoryKind::ShortTerm, "older", 5);
        older.timestamp = Utc::now() - Duration::minutes(10);
        let newer = make_entry("new", MemoryKind::ShortTerm, "newer", 5);

        store.put(&older).unwrap();
        store.put(&newer).unwrap();

        let entries = store.query(None, 10).unwrap();
        assert_eq!(entries[0].content, "newer");
        assert_eq!(entries[1].content, "older");
    }

    #[test]
    fn test_query_importance_breaks_timestamp_ties() {
        let (_dir, store) = make_test_store();

        let ts = Utc::now();
        let mut low = make_entry("low", MemoryKind::ShortTerm, "low", 3);
        low.timestamp = ts;
        let mut high = make_entry("high", MemoryKind::ShortTerm, "high", 9);
        high.timestamp = ts;

        store.put(&low).unwrap();
        store.put(&high).unwrap();

        let entries = store.query(None, 10).unwrap();
        assert_eq!(entries[0].content, "high");
    }

    #[test]
    fn test_query_limit() {
        let (_dir, store) = make_test_store();
        for i in 0..8 {
            store
                .put(&make_entry(
                    &format!("m{i}"),
                    MemoryKind::ShortTerm,
                    "c",
                    5,
                ))
                .unwrap();
        }
        assert_eq!(store.query(None, 5).unwrap().len(), 5);
    }

    #[test]
    fn test_put_is_idempotent_upsert() {
        let (_dir, store) = make_test_store();

        let entry = make_entry("same-id", MemoryKind::ShortTerm, "v1", 5);
        store.put(&entry).unwrap();
        store.put(&entry).unwrap();
        assert_eq!(store.memory_count().unwrap(), 1);

        // A replacement under the same id fully supersedes the old version.
        let replacement = make_entry("same-id", MemoryKind::LongTerm, "v2", 8);
        store.put(&replacement).unwrap();

        let entries = store.query(None, 10).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].content, "v2");
        assert_eq!(entries[0].kind, MemoryKind::LongTerm);
    }

    #[test]
    fn test_put_task_and_get_task() {
        let (_dir, store) = make_test_store();

        let mut task = Task::new("do something", 5, 3);
        store.put_task(&task).unwrap();

        task.begin_attempt().unwrap();
        store.put_task(&task).unwrap();

        let loaded = store.get_task(&task.id).unwrap().unwrap();
        assert_eq!(loaded.status, TaskStatus::InProgress);
        assert_eq!(loaded.attempts, 1);
    }

    #[test]
    fn test_get_task_missing() {
        let (_dir, store) = make_test_store();
        assert!(store.get_task("task_nope").unwrap().is_none());
    }

    #[test]
    fn test_cost_summary_aggregates_by_model() {
        let (_dir, store) = make_test_store();

        for (tokens, cost) in [(100, 0.003), (250, 0.0075)] {
            store
                .append_cost(&CostRecord {
                    model: "openai:gpt-4".into(),
                    tokens_used: tokens,
                    estimated_cost: cost,
                    task_id: Some("task_a".into()),
                    timestamp: Utc::now(),
                })
                .unwrap();
        }
        store
            .append_cost(&CostRecord {
                model: "ollama:llama3".into(),
                tokens_used: 900,
                estimated_cost: 0.0,
                task_id: None,
                timestamp: Utc::now(),
            })
            .unwrap();

        let summary = store.cost_summary().unwrap();
        let gpt4 = &summary["openai:gpt-4"];
        assert_eq!(gpt4.total_tokens, 350);
        assert!((gpt4.total_cost - 0.0105).abs() < 1e-9);
        assert_eq!(gpt4.call_count, 2);

        let llama = &summary["ollama:llama3"];
        assert_eq!(llama.total_tokens, 900);
        assert_eq!(llama.total_cost, 0.0);
        assert_eq!(llama.call_count, 1);
    }

    #[test]
    fn test_task_status_counts() {
        let (_dir, store) = make_test_store();

        let pending = Task::new("a", 5, 3);
        store.put_task(&pending).unwrap();

        let mut completed = Task::new("b", 5, 3);
        completed.begin_attempt().unwrap();
        completed.complete("ok").unwrap();
        store.put_task(&completed).unwrap();

        // Re-storing the same task must not double count it.
        store.put_task(&completed).unwrap();

        let counts = store.task_status_counts().unwrap();
        assert_eq!(counts[&TaskStatus::Pending], 1);
        assert_eq!(counts[&TaskStatus::Completed], 1);
        assert_eq!(counts.values().sum::<u64>(), 2);
    }

    #[test]
    fn test_corrupt_line_tolerance() {
        let (_dir, store) = make_test_store();

        store
            .put(&make_entry("ok-1", MemoryKind::ShortTerm, "valid-one", 5))
            .unwrap();
        {
            let mut file = OpenOptions::new()
                .append(true)
                .open(&store.memories_path)
                .unwrap();
            writeln!(file, "{{ this is not valid json").unwrap();
        }
        store
            .put(&make_entry("ok-2", MemoryKind::ShortTerm, "valid-two", 5))
            .unwrap();

        let entries = store.query(None, 10).unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn test_missing_files_read_as_empty() {
        let (_dir, store) = make_test_store();
        assert_eq!(store.memory_count().unwrap(), 0);
        assert!(store.cost_summary().unwrap().is_empty());
        assert!(store.task_status_counts().unwrap().is_empty());
    }

    #[test]
    fn test_compact_drops_superseded_versions() {
        let (_dir, store) = make_test_store();

        for version in 0..5 {
            store
                .put(&make_entry(
                    "churned",
                    MemoryKind::ShortTerm,
                    &format!("v{version}"),
                    5,
                ))
                .unwrap();
        }
        let mut task = Task::new("t", 5, 3);
        store.put_task(&task).unwrap();
        task.begin_attempt().unwrap();
        store.put_task(&task).unwrap();

        store.compact().unwrap();

        let memory_lines = fs::read_to_string(&store.memories_path)
            .unwrap()
            .lines()
            .count();
        assert_eq!(memory_lines, 1);
        let task_lines = fs::read_to_string(&store.tasks_path)
            .unwrap()
            .lines()
            .count();
        assert_eq!(task_lines, 1);

        // Visible state is unchanged after compaction.
        let entries = store.query(None, 10).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].content, "v4");
        let loaded = store.get_task(&task.id).unwrap().unwrap();
        assert_eq!(loaded.attempts, 1);
    }
}
