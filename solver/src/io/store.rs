//! Durable storage for sessions, attempts, and improvement logs.
//!
//! The solver needs only create/read/update of session records and
//! append-only inserts of attempts and improvement entries, keyed by session
//! id. [`JsonStore`] keeps one directory per session; attempt ordinals are
//! assigned by refusing to overwrite an existing ordinal file, which makes
//! assignment atomic per session without any cross-session locking.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::core::types::{Attempt, ImprovementEntry, Session};

/// Storage seam for the orchestrator.
pub trait Store {
    fn create_session(&self, session: &Session) -> Result<()>;
    fn load_session(&self, session_id: &str) -> Result<Option<Session>>;
    fn update_session(&self, session: &Session) -> Result<()>;
    /// Append one attempt. Fails on a duplicate or out-of-order ordinal.
    fn append_attempt(&self, attempt: &Attempt) -> Result<()>;
    /// All attempts of a session in ascending ordinal order.
    fn load_attempts(&self, session_id: &str) -> Result<Vec<Attempt>>;
    fn append_improvement(&self, session_id: &str, entry: &ImprovementEntry) -> Result<()>;
    fn load_improvements(&self, session_id: &str) -> Result<Vec<ImprovementEntry>>;
}

/// Filesystem-backed store.
///
/// Layout under the root:
/// `sessions/<id>/session.json`, `sessions/<id>/attempts/<n>.json`,
/// `sessions/<id>/improvements.json`.
pub struct JsonStore {
    root: PathBuf,
}

impl JsonStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn session_dir(&self, session_id: &str) -> PathBuf {
        self.root.join("sessions").join(session_id)
    }

    fn session_path(&self, session_id: &str) -> PathBuf {
        self.session_dir(session_id).join("session.json")
    }

    fn attempts_dir(&self, session_id: &str) -> PathBuf {
        self.session_dir(session_id).join("attempts")
    }

    fn improvements_path(&self, session_id: &str) -> PathBuf {
        self.session_dir(session_id).join("improvements.json")
    }
}

impl Store for JsonStore {
    fn create_session(&self, session: &Session) -> Result<()> {
        let path = self.session_path(&session.id);
        if path.exists() {
            return Err(anyhow!("session '{}' already exists", session.id));
        }
        debug!(session_id = %session.id, "creating session record");
        write_json_atomic(&path, session)
    }

    fn load_session(&self, session_id: &str) -> Result<Option<Session>> {
        let path = self.session_path(session_id);
        if !path.exists() {
            return Ok(None);
        }
        read_json(&path).map(Some)
    }

    fn update_session(&self, session: &Session) -> Result<()> {
        let path = self.session_path(&session.id);
        if !path.exists() {
            return Err(anyhow!("session '{}' does not exist", session.id));
        }
        write_json_atomic(&path, session)
    }

    fn append_attempt(&self, attempt: &Attempt) -> Result<()> {
        let dir = self.attempts_dir(&attempt.session_id);
        let path = dir.join(format!("{}.json", attempt.number));
        if path.exists() {
            return Err(anyhow!(
                "attempt {} already recorded for session '{}'",
                attempt.number,
                attempt.session_id
            ));
        }
        let expected = count_attempts(&dir)? as u32 + 1;
        if attempt.number != expected {
            return Err(anyhow!(
                "attempt ordinal {} out of order for session '{}' (expected {})",
                attempt.number,
                attempt.session_id,
                expected
            ));
        }
        debug!(session_id = %attempt.session_id, number = attempt.number, "appending attempt");
        write_json_atomic(&path, attempt)
    }

    fn load_attempts(&self, session_id: &str) -> Result<Vec<Attempt>> {
        let dir = self.attempts_dir(session_id);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut attempts: Vec<Attempt> = Vec::new();
        for entry in fs::read_dir(&dir).with_context(|| format!("read {}", dir.display()))? {
            let entry = entry.context("read attempt entry")?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            attempts.push(read_json(&path)?);
        }
        attempts.sort_by_key(|attempt| attempt.number);
        Ok(attempts)
    }

    fn append_improvement(&self, session_id: &str, entry: &ImprovementEntry) -> Result<()> {
        let path = self.improvements_path(session_id);
        let mut entries = self.load_improvements(session_id)?;
        entries.push(entry.clone());
        write_json_atomic(&path, &entries)
    }

    fn load_improvements(&self, session_id: &str) -> Result<Vec<ImprovementEntry>> {
        let path = self.improvements_path(session_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        read_json(&path)
    }
}

fn count_attempts(dir: &Path) -> Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }
    let mut count = 0;
    for entry in fs::read_dir(dir).with_context(|| format!("read {}", dir.display()))? {
        let entry = entry.context("read attempt entry")?;
        if entry.path().extension().and_then(|ext| ext.to_str()) == Some("json") {
            count += 1;
        }
    }
    Ok(count)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))
}

/// Serialize to pretty-printed JSON with trailing newline, temp file + rename.
fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let mut buf = serde_json::to_string_pretty(value)?;
    buf.push('\n');
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, buf).with_context(|| format!("write temp {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}
