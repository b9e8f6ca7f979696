//! Per-project record of recordings already posted to the shared channel.
//!
//! Each project has one file. The current format is an append-only JSON
//! Lines log, one [`IndexEntry`] per posted message. Older files are a single
//! JSON object mapping display keys to message ids; those are still read, and
//! are rewritten as a log the first time something is recorded.
//!
//! Reading never fails: a missing or unreadable file, or malformed content,
//! is treated as "nothing delivered yet".

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::delivery::MessageRef;
use crate::lock::KeyedLocks;
use crate::meeting::MeetingDescriptor;
use crate::project::Project;

#[cfg(test)]
mod tests;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Display key at the time of delivery, `<start time> - <topic>`.
    pub key: String,
    /// Zoom recording file id; absent for entries migrated from the old format.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recording_id: Option<String>,
    pub message_id: MessageRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recorded_at: Option<DateTime<Utc>>,
}

impl IndexEntry {
    fn matches(&self, meeting: &MeetingDescriptor, key: &str) -> bool {
        match &self.recording_id {
            Some(id) => *id == meeting.recording_id,
            None => self.key == key,
        }
    }
}

#[derive(Debug, PartialEq)]
enum StoredIndex {
    Log(Vec<IndexEntry>),
    Legacy(Vec<IndexEntry>),
}

impl StoredIndex {
    fn entries(&self) -> &[IndexEntry] {
        match self {
            Self::Log(entries) | Self::Legacy(entries) => entries,
        }
    }

    fn into_entries(self) -> Vec<IndexEntry> {
        match self {
            Self::Log(entries) | Self::Legacy(entries) => entries,
        }
    }
}

pub struct DeliveryIndex {
    tz: Tz,
    locks: KeyedLocks<PathBuf>,
}

impl DeliveryIndex {
    /// `tz` is the zone display keys are formatted in.
    pub fn new(tz: Tz) -> Self {
        Self {
            tz,
            locks: KeyedLocks::new(),
        }
    }

    pub fn display_key(&self, meeting: &MeetingDescriptor) -> String {
        meeting.display_key(self.tz)
    }

    /// All entries for the project, in file order.
    pub async fn entries(&self, project: &Project) -> Vec<IndexEntry> {
        read_index(&project.index_file).await.into_entries()
    }

    /// Message ids recorded under `display_key`, empty when unknown.
    pub async fn lookup(&self, project: &Project, display_key: &str) -> Vec<MessageRef> {
        let stored = read_index(&project.index_file).await;
        collect_refs(stored.entries().iter().filter(|e| e.key == display_key))
    }

    /// Message ids posted for `meeting`.
    ///
    /// Entries carrying a recording id match on that id alone; older entries
    /// without one fall back to the display key.
    pub async fn lookup_meeting(
        &self,
        project: &Project,
        meeting: &MeetingDescriptor,
    ) -> Vec<MessageRef> {
        let key = self.display_key(meeting);
        let stored = read_index(&project.index_file).await;
        let refs = collect_refs(stored.entries().iter().filter(|e| e.matches(meeting, &key)));
        debug!(
            "Index lookup for '{}' in {}: {} reference(s)",
            key,
            project.name,
            refs.len()
        );
        refs
    }

    /// Appends a delivered message for `meeting`.
    ///
    /// Returns `false` when the message was already recorded for it. Writers
    /// for the same file are serialized in-process and across processes.
    pub async fn record(
        &self,
        project: &Project,
        meeting: &MeetingDescriptor,
        message_id: MessageRef,
    ) -> Result<bool> {
        let entry = IndexEntry {
            key: self.display_key(meeting),
            recording_id: Some(meeting.recording_id.clone()),
            message_id,
            recorded_at: Some(Utc::now()),
        };

        let _guard = self.locks.lock(project.index_file.clone()).await;

        let path = project.index_file.clone();
        let appended = tokio::task::spawn_blocking(move || append_entry(&path, entry))
            .await
            .context("Index writer task failed")??;

        if appended {
            info!(
                "Recorded message {} for recording {} in {:?}",
                message_id, meeting.recording_id, project.index_file
            );
        } else {
            debug!(
                "Message {} already recorded for recording {}",
                message_id, meeting.recording_id
            );
        }
        Ok(appended)
    }
}

fn collect_refs<'a>(entries: impl Iterator<Item = &'a IndexEntry>) -> Vec<MessageRef> {
    let mut refs: Vec<MessageRef> = Vec::new();
    for entry in entries {
        if !refs.contains(&entry.message_id) {
            refs.push(entry.message_id);
        }
    }
    refs
}

async fn read_index(path: &Path) -> StoredIndex {
    match fs::read_to_string(path).await {
        Ok(content) => parse_index(&content, path),
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to read delivery index {:?}: {}", path, e);
            }
            StoredIndex::Log(Vec::new())
        }
    }
}

fn parse_index(content: &str, path: &Path) -> StoredIndex {
    if content.trim().is_empty() {
        return StoredIndex::Log(Vec::new());
    }

    if let Ok(legacy) = serde_json::from_str::<BTreeMap<String, Vec<MessageRef>>>(content) {
        let entries = legacy
            .into_iter()
            .flat_map(|(key, ids)| {
                ids.into_iter().map(move |message_id| IndexEntry {
                    key: key.clone(),
                    recording_id: None,
                    message_id,
                    recorded_at: None,
                })
            })
            .collect();
        return StoredIndex::Legacy(entries);
    }

    let mut entries = Vec::new();
    for (line_no, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<IndexEntry>(line) {
            Ok(entry) => entries.push(entry),
            Err(e) => warn!(
                "Skipping malformed line {} in delivery index {:?}: {}",
                line_no + 1,
                path,
                e
            ),
        }
    }
    StoredIndex::Log(entries)
}

fn lock_path(index_file: &Path) -> PathBuf {
    let mut name = index_file.file_name().unwrap_or_default().to_os_string();
    name.push(".lock");
    index_file.with_file_name(name)
}

struct IndexLock {
    file: File,
}

impl IndexLock {
    fn acquire(index_file: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(lock_path(index_file))?;
        file.lock_exclusive()
            .with_context(|| format!("Failed to lock delivery index {:?}", index_file))?;
        Ok(Self { file })
    }
}

impl Drop for IndexLock {
    fn drop(&mut self) {
        if let Err(err) = self.file.unlock() {
            debug!("Failed to release index lock: {err:?}");
        }
    }
}

fn append_entry(path: &Path, entry: IndexEntry) -> Result<bool> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create index directory")?;
    }
    let _lock = IndexLock::acquire(path)?;

    let stored = match std::fs::read_to_string(path) {
        Ok(content) => parse_index(&content, path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoredIndex::Log(Vec::new()),
        Err(e) => return Err(e).with_context(|| format!("Failed to read {:?}", path)),
    };

    let duplicate = stored.entries().iter().any(|existing| {
        existing.message_id == entry.message_id
            && (existing.recording_id == entry.recording_id || existing.key == entry.key)
    });
    if duplicate {
        return Ok(false);
    }

    if let StoredIndex::Legacy(entries) = stored {
        info!(
            "Migrating delivery index {:?} ({} entries) to the log format",
            path,
            entries.len()
        );
        rewrite_log(path, &entries)?;
    }

    let mut line = serde_json::to_string(&entry).context("Failed to serialize index entry")?;
    line.push('\n');

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open {:?}", path))?;
    file.write_all(line.as_bytes())?;
    file.sync_data()?;

    Ok(true)
}

fn rewrite_log(path: &Path, entries: &[IndexEntry]) -> Result<()> {
    let mut content = String::new();
    for entry in entries {
        content.push_str(&serde_json::to_string(entry)?);
        content.push('\n');
    }

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    std::fs::write(&tmp_path, content)
        .with_context(|| format!("Failed to write {:?}", tmp_path))?;
    std::fs::rename(&tmp_path, path).with_context(|| format!("Failed to replace {:?}", path))?;
    Ok(())
}
