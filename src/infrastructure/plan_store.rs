//! `PlanStore` (C1): file-backed JSON implementation.
//!
//! The sole authoritative `PlanStore` backend: one `plan-state.json` per
//! project directory, markdown bodies as sibling `<filename>` files,
//! serialized writes via one `tokio::sync::Mutex` stripe per project (the
//! per-resource interior-mutability convention from
//! `application/resource_monitor.rs`, generalized to "one stripe per
//! project" instead of one global lock).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tracing::instrument;

use crate::domain::errors::{KasmosError, KasmosResult};
use crate::domain::models::{Plan, PlanPatch, PlanStatus, Topic};
use crate::domain::ports::plan_store::PlanStore as PlanStorePort;

const STATE_FILE: &str = "plan-state.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedPlan {
    description: String,
    branch: String,
    #[serde(default)]
    topic: Option<String>,
    status: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedTopic {
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct WrappedState {
    #[serde(default)]
    topics: HashMap<String, PersistedTopic>,
    #[serde(default)]
    plans: HashMap<String, PersistedPlan>,
}

#[derive(Debug, Default)]
struct ProjectState {
    topics: HashMap<String, Topic>,
    /// `content` is always empty here; bodies live in sibling files and are
    /// read/written lazily via `get_content`/`put_content`.
    plans: HashMap<String, Plan>,
}

/// File-backed `PlanStore`. Roots one subdirectory per project under
/// `base_dir`.
pub struct JsonPlanStore {
    base_dir: PathBuf,
    projects: RwLock<HashMap<String, Arc<Mutex<ProjectState>>>>,
}

impl JsonPlanStore {
    /// Construct a store rooted at `base_dir`.
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            projects: RwLock::new(HashMap::new()),
        }
    }

    fn project_dir(&self, project: &str) -> PathBuf {
        self.base_dir.join(project)
    }

    async fn project_slot(&self, project: &str) -> KasmosResult<Arc<Mutex<ProjectState>>> {
        if let Some(slot) = self.projects.read().await.get(project) {
            return Ok(Arc::clone(slot));
        }
        let mut guard = self.projects.write().await;
        if let Some(slot) = guard.get(project) {
            return Ok(Arc::clone(slot));
        }
        let state = load_project(&self.project_dir(project)).await?;
        let slot = Arc::new(Mutex::new(state));
        guard.insert(project.to_string(), Arc::clone(&slot));
        Ok(slot)
    }

    async fn persist(&self, project: &str, state: &ProjectState) -> KasmosResult<()> {
        save_project(&self.project_dir(project), state).await
    }

    fn content_path(&self, project: &str, filename: &str) -> PathBuf {
        self.project_dir(project).join(filename)
    }
}

fn is_legacy_token(token: &str) -> bool {
    matches!(token, "in_progress" | "completed" | "finished")
}

/// Detects the wrapped-vs-legacy-flat on-disk shape.
fn detect_and_parse(value: Value) -> KasmosResult<WrappedState> {
    let Value::Object(map) = value else {
        return Err(KasmosError::ParseError("plan-state.json root is not an object".to_string()));
    };

    let looks_flat = !map.contains_key("plans") && map.keys().any(|k| k.ends_with(".md"));

    if looks_flat {
        let mut plans = HashMap::new();
        for (filename, v) in map {
            let parsed: PersistedPlan = serde_json::from_value(v).map_err(KasmosError::from)?;
            plans.insert(filename, parsed);
        }
        return Ok(WrappedState { topics: HashMap::new(), plans });
    }

    serde_json::from_value(Value::Object(map)).map_err(KasmosError::from)
}

/// The kebab portion of a `YYYY-MM-DD-<kebab>.md` filename, used as the glob
/// suffix for filename reconciliation against updated descriptions.
fn extract_slug(filename: &str) -> &str {
    let stem = filename.strip_suffix(".md").unwrap_or(filename);
    let bytes = stem.as_bytes();
    if stem.len() > 11 && bytes.get(4) == Some(&b'-') && bytes.get(7) == Some(&b'-') {
        &stem[11..]
    } else {
        stem
    }
}

async fn reconcile_filenames(dir: &Path, plans: &mut HashMap<String, Plan>) -> bool {
    let mut changed = false;
    let keys: Vec<String> = plans.keys().cloned().collect();

    for filename in keys {
        if tokio::fs::try_exists(dir.join(&filename)).await.unwrap_or(false) {
            continue;
        }

        let suffix = format!("-{}.md", extract_slug(&filename));
        let Ok(mut read_dir) = tokio::fs::read_dir(dir).await else {
            continue;
        };

        let mut candidates = Vec::new();
        while let Ok(Some(entry)) = read_dir.next_entry().await {
            if let Some(name) = entry.file_name().to_str() {
                if name.ends_with(&suffix) {
                    candidates.push(name.to_string());
                }
            }
        }
        if candidates.is_empty() {
            continue;
        }
        candidates.sort();
        // "the lexicographically last one when several"
        let chosen = candidates.pop().expect("checked non-empty above");

        if chosen == filename || plans.contains_key(&chosen) {
            continue;
        }
        if let Some(mut plan) = plans.remove(&filename) {
            plan.filename.clone_from(&chosen);
            plans.insert(chosen, plan);
            changed = true;
        }
    }

    changed
}

async fn load_project(dir: &Path) -> KasmosResult<ProjectState> {
    tokio::fs::create_dir_all(dir).await?;
    let state_path = dir.join(STATE_FILE);

    let raw = match tokio::fs::read_to_string(&state_path).await {
        Ok(s) => s,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(ProjectState::default()),
        Err(err) => return Err(err.into()),
    };

    let value: Value = serde_json::from_str(&raw).map_err(|e| KasmosError::ParseError(format!("{}: {e}", state_path.display())))?;
    let wrapped = detect_and_parse(value)?;
    let had_legacy_tokens = wrapped.plans.values().any(|p| is_legacy_token(&p.status));

    let topics = wrapped
        .topics
        .into_iter()
        .map(|(name, t)| (name.clone(), Topic { project: String::new(), name, created_at: t.created_at }))
        .collect();

    let mut plans = HashMap::new();
    for (filename, p) in wrapped.plans {
        let status = PlanStatus::parse_legacy(&p.status)
            .ok_or_else(|| KasmosError::ParseError(format!("unrecognized plan status {:?} for {filename}", p.status)))?;
        plans.insert(
            filename.clone(),
            Plan {
                filename,
                description: p.description,
                branch: p.branch,
                topic: p.topic,
                content: String::new(),
                status,
                created_at: p.created_at,
            },
        );
    }

    let rekeyed = reconcile_filenames(dir, &mut plans).await;
    let state = ProjectState { topics, plans };

    if had_legacy_tokens || rekeyed {
        save_project(dir, &state).await?;
    }

    Ok(state)
}

async fn save_project(dir: &Path, state: &ProjectState) -> KasmosResult<()> {
    tokio::fs::create_dir_all(dir).await?;

    let wrapped = WrappedState {
        topics: state
            .topics
            .iter()
            .map(|(name, t)| (name.clone(), PersistedTopic { created_at: t.created_at }))
            .collect(),
        plans: state
            .plans
            .iter()
            .map(|(filename, p)| {
                (
                    filename.clone(),
                    PersistedPlan {
                        description: p.description.clone(),
                        branch: p.branch.clone(),
                        topic: p.topic.clone(),
                        status: p.status.as_str().to_string(),
                        created_at: p.created_at,
                    },
                )
            })
            .collect(),
    };

    let json = serde_json::to_string_pretty(&wrapped)?;
    let tmp_path = dir.join(format!("{STATE_FILE}.tmp"));
    tokio::fs::write(&tmp_path, json).await?;
    tokio::fs::rename(&tmp_path, dir.join(STATE_FILE)).await?;
    Ok(())
}

#[async_trait]
impl PlanStorePort for JsonPlanStore {
    #[instrument(skip(self, plan), fields(filename = %plan.filename))]
    async fn create(&self, project: &str, plan: Plan) -> KasmosResult<()> {
        let slot = self.project_slot(project).await?;
        let mut state = slot.lock().await;
        if state.plans.contains_key(&plan.filename) {
            return Err(KasmosError::AlreadyExists(plan.filename));
        }
        let filename = plan.filename.clone();
        let content = plan.content.clone();
        let mut stored = plan;
        stored.content = String::new();
        state.plans.insert(filename.clone(), stored);
        if let Some(topic) = &state.plans[&filename].topic {
            state.topics.entry(topic.clone()).or_insert_with(|| Topic::new(project, topic));
        }
        self.persist(project, &state).await?;
        drop(state);
        if !content.is_empty() {
            self.put_content(project, &filename, &content).await?;
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get(&self, project: &str, filename: &str) -> KasmosResult<Plan> {
        let slot = self.project_slot(project).await?;
        let state = slot.lock().await;
        state.plans.get(filename).cloned().ok_or_else(|| KasmosError::NotFound(filename.to_string()))
    }

    #[instrument(skip(self))]
    async fn list(&self, project: &str) -> KasmosResult<Vec<Plan>> {
        let slot = self.project_slot(project).await?;
        let state = slot.lock().await;
        Ok(state.plans.values().cloned().collect())
    }

    #[instrument(skip(self, patch))]
    async fn update(&self, project: &str, filename: &str, patch: PlanPatch) -> KasmosResult<Plan> {
        let slot = self.project_slot(project).await?;
        let mut state = slot.lock().await;

        {
            let plan = state.plans.get_mut(filename).ok_or_else(|| KasmosError::NotFound(filename.to_string()))?;
            if let Some(status) = patch.status {
                plan.status = status;
            }
            if let Some(description) = patch.description {
                plan.description = description;
            }
            if let Some(branch) = patch.branch {
                plan.branch = branch;
            }
            if let Some(topic) = patch.topic {
                plan.topic = topic;
            }
            if let Some(content) = &patch.content {
                plan.content = content.clone();
            }
        }

        if let Some(topic) = state.plans[filename].topic.clone() {
            state.topics.entry(topic.clone()).or_insert_with(|| Topic::new(project, &topic));
        }

        self.persist(project, &state).await?;

        let content_patch = patch.content;
        let updated = state.plans[filename].clone();
        drop(state);
        if let Some(content) = content_patch {
            self.put_content(project, filename, &content).await?;
        }
        Ok(updated)
    }

    #[instrument(skip(self))]
    async fn rename(&self, project: &str, old_filename: &str, new_slug: &str) -> KasmosResult<String> {
        let slot = self.project_slot(project).await?;
        let mut state = slot.lock().await;

        let mut plan = state.plans.remove(old_filename).ok_or_else(|| KasmosError::NotFound(old_filename.to_string()))?;
        let date_prefix = &plan.filename[..plan.filename.len().min(10)];
        let new_filename = format!("{date_prefix}-{new_slug}.md");

        if new_filename != old_filename && state.plans.contains_key(&new_filename) {
            state.plans.insert(old_filename.to_string(), plan);
            return Err(KasmosError::AlreadyExists(new_filename));
        }

        plan.filename.clone_from(&new_filename);
        state.plans.insert(new_filename.clone(), plan);
        self.persist(project, &state).await?;
        drop(state);

        if new_filename != old_filename {
            let old_path = self.content_path(project, old_filename);
            let new_path = self.content_path(project, &new_filename);
            if tokio::fs::try_exists(&old_path).await.unwrap_or(false) {
                tokio::fs::rename(&old_path, &new_path).await?;
            }
        }

        Ok(new_filename)
    }

    #[instrument(skip(self))]
    async fn create_topic(&self, project: &str, name: &str) -> KasmosResult<Topic> {
        let slot = self.project_slot(project).await?;
        let mut state = slot.lock().await;
        if let Some(existing) = state.topics.get(name) {
            return Ok(existing.clone());
        }
        let topic = Topic::new(project, name);
        state.topics.insert(name.to_string(), topic.clone());
        self.persist(project, &state).await?;
        Ok(topic)
    }

    #[instrument(skip(self))]
    async fn list_topics(&self, project: &str) -> KasmosResult<Vec<Topic>> {
        let slot = self.project_slot(project).await?;
        let state = slot.lock().await;
        Ok(state.topics.values().cloned().collect())
    }

    #[instrument(skip(self))]
    async fn delete_topic_if_unused(&self, project: &str, name: &str) -> KasmosResult<bool> {
        let slot = self.project_slot(project).await?;
        let mut state = slot.lock().await;

        if !state.topics.contains_key(name) {
            return Ok(false);
        }
        let referenced = state.plans.values().any(|p| p.topic.as_deref() == Some(name));
        if referenced {
            return Ok(false);
        }
        state.topics.remove(name);
        self.persist(project, &state).await?;
        Ok(true)
    }

    #[instrument(skip(self))]
    async fn get_content(&self, project: &str, filename: &str) -> KasmosResult<String> {
        let path = self.content_path(project, filename);
        match tokio::fs::read_to_string(&path).await {
            Ok(s) => Ok(s),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(KasmosError::NotFound(filename.to_string())),
            Err(err) => Err(err.into()),
        }
    }

    #[instrument(skip(self, content))]
    async fn put_content(&self, project: &str, filename: &str, content: &str) -> KasmosResult<()> {
        let path = self.content_path(project, filename);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, content).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_plan(filename: &str) -> Plan {
        Plan::new(filename, "do the thing", "main")
    }

    #[tokio::test]
    async fn round_trip_create_and_get() {
        let dir = tempdir().unwrap();
        let store = JsonPlanStore::new(dir.path());
        let plan = sample_plan("2026-02-21-alpha.md");
        store.create("proj", plan.clone()).await.unwrap();

        let fetched = store.get("proj", "2026-02-21-alpha.md").await.unwrap();
        assert_eq!(fetched.description, plan.description);
        assert_eq!(fetched.status, PlanStatus::Ready);
    }

    #[tokio::test]
    async fn create_rejects_duplicate() {
        let dir = tempdir().unwrap();
        let store = JsonPlanStore::new(dir.path());
        store.create("proj", sample_plan("2026-02-21-alpha.md")).await.unwrap();
        let err = store.create("proj", sample_plan("2026-02-21-alpha.md")).await.unwrap_err();
        assert!(matches!(err, KasmosError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn update_missing_plan_is_not_found() {
        let dir = tempdir().unwrap();
        let store = JsonPlanStore::new(dir.path());
        let err = store.update("proj", "missing.md", PlanPatch::default()).await.unwrap_err();
        assert!(matches!(err, KasmosError::NotFound(_)));
    }

    #[tokio::test]
    async fn legacy_flat_form_migrates_status_tokens() {
        let dir = tempdir().unwrap();
        let project_dir = dir.path().join("proj");
        tokio::fs::create_dir_all(&project_dir).await.unwrap();
        tokio::fs::write(
            project_dir.join(STATE_FILE),
            r#"{"2026-02-20-x.md":{"description":"d","branch":"b","status":"in_progress","created_at":"2026-02-20T00:00:00Z"},
                "2026-02-20-y.md":{"description":"d2","branch":"b2","status":"completed","created_at":"2026-02-20T00:00:00Z"}}"#,
        )
        .await
        .unwrap();

        let store = JsonPlanStore::new(dir.path());
        let x = store.get("proj", "2026-02-20-x.md").await.unwrap();
        let y = store.get("proj", "2026-02-20-y.md").await.unwrap();
        assert_eq!(x.status, PlanStatus::Implementing);
        assert_eq!(y.status, PlanStatus::Done);

        let raw = tokio::fs::read_to_string(project_dir.join(STATE_FILE)).await.unwrap();
        assert!(raw.contains("\"plans\""));
        assert!(!raw.contains("in_progress"));
    }

    #[tokio::test]
    async fn legacy_load_is_idempotent() {
        let dir = tempdir().unwrap();
        let project_dir = dir.path().join("proj");
        tokio::fs::create_dir_all(&project_dir).await.unwrap();
        tokio::fs::write(
            project_dir.join(STATE_FILE),
            r#"{"2026-02-20-x.md":{"description":"d","branch":"b","status":"completed","created_at":"2026-02-20T00:00:00Z"}}"#,
        )
        .await
        .unwrap();

        let first = JsonPlanStore::new(dir.path());
        let a = first.list("proj").await.unwrap();

        let second = JsonPlanStore::new(dir.path());
        let b = second.list("proj").await.unwrap();

        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 1);
        assert_eq!(a[0].status, b[0].status);
    }

    #[tokio::test]
    async fn filename_reconciliation_rekeys_to_disk_file() {
        let dir = tempdir().unwrap();
        let project_dir = dir.path().join("proj");
        tokio::fs::create_dir_all(&project_dir).await.unwrap();
        tokio::fs::write(
            project_dir.join(STATE_FILE),
            r#"{"plans":{"2026-02-20-auth.md":{"description":"d","branch":"b","status":"ready","created_at":"2026-02-20T00:00:00Z"}}}"#,
        )
        .await
        .unwrap();
        tokio::fs::write(project_dir.join("2026-02-21-auth.md"), "body").await.unwrap();

        let store = JsonPlanStore::new(dir.path());
        let plans = store.list("proj").await.unwrap();
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].filename, "2026-02-21-auth.md");
        assert!(store.get("proj", "2026-02-20-auth.md").await.is_err());

        // Second load reads the new key unchanged, no duplication.
        let store2 = JsonPlanStore::new(dir.path());
        let plans2 = store2.list("proj").await.unwrap();
        assert_eq!(plans2.len(), 1);
        assert_eq!(plans2[0].filename, "2026-02-21-auth.md");
    }

    #[tokio::test]
    async fn topic_is_unused_until_a_plan_references_it() {
        let dir = tempdir().unwrap();
        let store = JsonPlanStore::new(dir.path());
        store.create_topic("proj", "ui").await.unwrap();
        assert!(store.delete_topic_if_unused("proj", "ui").await.unwrap());

        store.create_topic("proj", "ui").await.unwrap();
        store.create("proj", sample_plan("2026-02-21-alpha.md")).await.unwrap();
        store
            .update(
                "proj",
                "2026-02-21-alpha.md",
                PlanPatch { topic: Some(Some("ui".to_string())), ..PlanPatch::default() },
            )
            .await
            .unwrap();
        assert!(!store.delete_topic_if_unused("proj", "ui").await.unwrap());
    }

    #[tokio::test]
    async fn content_round_trips_through_sibling_file() {
        let dir = tempdir().unwrap();
        let store = JsonPlanStore::new(dir.path());
        store.create("proj", sample_plan("2026-02-21-alpha.md")).await.unwrap();
        store.put_content("proj", "2026-02-21-alpha.md", "# Alpha plan").await.unwrap();
        let content = store.get_content("proj", "2026-02-21-alpha.md").await.unwrap();
        assert_eq!(content, "# Alpha plan");
    }
}
