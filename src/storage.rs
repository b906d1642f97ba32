//! Per-meeting artifact storage
//!
//! This module provides:
//! - `RunStore`, the root of all meeting run directories
//! - `MeetingRun`, one meeting's directory with its `manifest.json`
//! - JSON and Markdown artifacts tracked in the manifest
//! - `PromptAudit`, the append-only log of generation calls

use crate::config::StorageSettings;
use crate::error::{Error, Result};
use crate::json::Object;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Manifest file name inside a run directory
pub const MANIFEST_FILE: &str = "manifest.json";

/// Prompt audit log file name inside a run directory
pub const PROMPT_AUDIT_FILE: &str = "prompt_runs.jsonl";

/// On-disk format of an artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactFormat {
    /// Pretty-printed JSON (`.json`)
    Json,
    /// Markdown text (`.md`)
    Markdown,
}

impl ArtifactFormat {
    fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Markdown => "md",
        }
    }
}

/// Manifest record of one written artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactEntry {
    /// Path relative to the parent of the runs directory
    pub path: String,
    /// Last write time
    pub updated_at: DateTime<Utc>,
    /// File size in bytes
    pub bytes: u64,
    /// Small metadata (kind, crisis_mode, prompt identities, report_month)
    #[serde(default)]
    pub meta: Object,
}

/// Contents of `manifest.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Meeting identifier
    pub meeting_id: String,
    /// Creation time of the run directory
    pub created_at: DateTime<Utc>,
    /// Last manifest write
    pub updated_at: DateTime<Utc>,
    /// Run-level context (crisis mode, report months, roles)
    #[serde(default)]
    pub context: Object,
    /// Artifacts by name
    #[serde(default)]
    pub artifacts: BTreeMap<String, ArtifactEntry>,
}

impl Manifest {
    fn new(meeting_id: &str) -> Self {
        let now = Utc::now();
        Self {
            meeting_id: meeting_id.to_string(),
            created_at: now,
            updated_at: now,
            context: Object::new(),
            artifacts: BTreeMap::new(),
        }
    }
}

/// Root of all meeting run directories
#[derive(Debug, Clone)]
pub struct RunStore {
    root: PathBuf,
    // serialises manifest read-modify-write cycles
    manifest_lock: Arc<Mutex<()>>,
}

impl RunStore {
    /// Create a store rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            manifest_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Create a store from storage settings
    pub fn from_settings(settings: &StorageSettings) -> Self {
        Self::new(&settings.runs_dir)
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Open (creating if needed) the run directory for a meeting
    pub async fn ensure_run(&self, meeting_id: &str) -> Result<MeetingRun> {
        validate_meeting_id(meeting_id)?;

        let dir = self.root.join(meeting_id);
        tokio::fs::create_dir_all(&dir).await?;

        let run = MeetingRun {
            meeting_id: meeting_id.to_string(),
            manifest_path: dir.join(MANIFEST_FILE),
            dir,
            base: self.root.parent().map(Path::to_path_buf).unwrap_or_default(),
            manifest_lock: self.manifest_lock.clone(),
        };

        let guard = run.manifest_lock.lock().await;
        if !tokio::fs::try_exists(&run.manifest_path).await? {
            run.save_manifest(Manifest::new(meeting_id)).await?;
            tracing::debug!("created run directory {}", run.dir.display());
        }
        drop(guard);

        Ok(run)
    }

    /// Meeting ids that have a run directory
    pub async fn list_runs(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ids),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            if entry.path().join(MANIFEST_FILE).is_file() {
                if let Some(name) = entry.file_name().to_str() {
                    ids.push(name.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}

fn validate_meeting_id(meeting_id: &str) -> Result<()> {
    let trimmed = meeting_id.trim();
    if trimmed.is_empty()
        || trimmed != meeting_id
        || meeting_id == "."
        || meeting_id == ".."
        || meeting_id.contains(['/', '\\', ':'])
    {
        return Err(Error::invalid_input(format!("invalid meeting id: {:?}", meeting_id)));
    }
    Ok(())
}

/// Keep `[a-z0-9_-]` from a lowercased artifact name
fn sanitize_name(name: &str) -> Result<String> {
    let safe: String = name
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    if safe.is_empty() {
        return Err(Error::invalid_input(format!("invalid artifact name: {:?}", name)));
    }
    Ok(safe)
}

/// One meeting's run directory
#[derive(Debug, Clone)]
pub struct MeetingRun {
    meeting_id: String,
    dir: PathBuf,
    manifest_path: PathBuf,
    base: PathBuf,
    manifest_lock: Arc<Mutex<()>>,
}

impl MeetingRun {
    /// Meeting identifier
    pub fn meeting_id(&self) -> &str {
        &self.meeting_id
    }

    /// Run directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Load the manifest
    pub async fn manifest(&self) -> Result<Manifest> {
        let raw = tokio::fs::read_to_string(&self.manifest_path).await?;
        serde_json::from_str(&raw).map_err(|e| {
            Error::storage(format!("corrupt manifest {}: {}", self.manifest_path.display(), e))
        })
    }

    async fn save_manifest(&self, mut manifest: Manifest) -> Result<Manifest> {
        manifest.updated_at = Utc::now();
        let json = serde_json::to_string_pretty(&manifest)?;
        tokio::fs::write(&self.manifest_path, json).await?;
        Ok(manifest)
    }

    /// Path of an artifact file
    pub fn artifact_path(&self, name: &str, format: ArtifactFormat) -> Result<PathBuf> {
        Ok(self.dir.join(format!("{}.{}", sanitize_name(name)?, format.extension())))
    }

    /// Whether an artifact is recorded in the manifest and present on disk
    pub async fn has(&self, name: &str, format: ArtifactFormat) -> Result<bool> {
        let manifest = self.manifest().await?;
        if !manifest.artifacts.contains_key(name) {
            return Ok(false);
        }
        Ok(tokio::fs::try_exists(self.artifact_path(name, format)?).await?)
    }

    /// Manifest entry for an artifact
    pub async fn entry(&self, name: &str) -> Result<Option<ArtifactEntry>> {
        Ok(self.manifest().await?.artifacts.get(name).cloned())
    }

    /// Read a Markdown artifact
    pub async fn read_text(&self, name: &str) -> Result<Option<String>> {
        let path = self.artifact_path(name, ArtifactFormat::Markdown)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Read and deserialise a JSON artifact
    pub async fn read_json<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        let path = self.artifact_path(name, ArtifactFormat::Json)?;
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| Error::storage(format!("corrupt artifact {}: {}", path.display(), e)))
    }

    /// Write a Markdown artifact and record it
    pub async fn write_text(&self, name: &str, text: &str, meta: Object) -> Result<ArtifactEntry> {
        self.write(name, ArtifactFormat::Markdown, text.as_bytes(), meta).await
    }

    /// Serialise and write a JSON artifact and record it
    pub async fn write_json<T: Serialize + ?Sized>(
        &self,
        name: &str,
        payload: &T,
        meta: Object,
    ) -> Result<ArtifactEntry> {
        let json = serde_json::to_string_pretty(payload)?;
        self.write(name, ArtifactFormat::Json, json.as_bytes(), meta).await
    }

    async fn write(
        &self,
        name: &str,
        format: ArtifactFormat,
        bytes: &[u8],
        meta: Object,
    ) -> Result<ArtifactEntry> {
        let path = self.artifact_path(name, format)?;

        let _guard = self.manifest_lock.lock().await;
        tokio::fs::write(&path, bytes).await?;

        let entry = ArtifactEntry {
            path: path
                .strip_prefix(&self.base)
                .unwrap_or(&path)
                .display()
                .to_string(),
            updated_at: Utc::now(),
            bytes: tokio::fs::metadata(&path).await?.len(),
            meta,
        };

        let mut manifest = self.manifest().await?;
        manifest.artifacts.insert(name.to_string(), entry.clone());
        self.save_manifest(manifest).await?;

        tracing::info!(
            "[{}] wrote {} ({} bytes)",
            self.meeting_id,
            entry.path,
            entry.bytes
        );
        Ok(entry)
    }

    /// Replace the run context
    pub async fn set_context(&self, context: Object) -> Result<Manifest> {
        let _guard = self.manifest_lock.lock().await;
        let mut manifest = self.manifest().await?;
        manifest.context = context;
        self.save_manifest(manifest).await
    }

    /// Prompt audit log for this run
    pub fn audit(&self) -> PromptAudit {
        PromptAudit {
            path: self.dir.join(PROMPT_AUDIT_FILE),
        }
    }
}

/// One generation call as recorded in the audit log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptRunRecord {
    /// Meeting identifier
    pub meeting_id: String,
    /// Template identifier
    pub prompt_id: String,
    /// Template version
    pub prompt_version: String,
    /// Agent call that used the template (e.g. `vote`)
    pub agent_role: String,
    /// Model identifier
    pub model: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Token limit
    pub max_tokens: u32,
    /// Call time
    pub timestamp: DateTime<Utc>,
    /// Generation calls made, including corrective retries
    pub attempts: usize,
    /// Rendered user prompt length in characters
    pub prompt_chars: usize,
    /// Output length in characters
    pub output_chars: usize,
    /// System message
    pub system_prompt: String,
    /// Rendered user message
    pub user_prompt: String,
    /// Raw output that parsed
    pub output_text: String,
}

/// Append-only JSONL log of generation calls
#[derive(Debug, Clone)]
pub struct PromptAudit {
    path: PathBuf,
}

impl PromptAudit {
    /// Log at an explicit path
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Log file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record
    pub async fn record(&self, record: &PromptRunRecord) -> Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}
