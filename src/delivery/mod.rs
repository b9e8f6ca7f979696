//! Getting a recording to a requester.
//!
//! Delivery first consults the project's [`DeliveryIndex`]. Recordings already
//! posted to the project channel are copied from there. Otherwise the
//! recording is uploaded from the local downloads directory, downloading it
//! from Zoom first when it is not on disk yet. Fresh uploads go to the
//! project channel and are recorded in the index, so the next request for
//! the same recording is a plain copy.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::index::DeliveryIndex;
use crate::lock::KeyedLocks;
use crate::meeting::MeetingDescriptor;
use crate::project::Project;
use crate::zoom::ZoomError;

mod error;

pub use error::DeliveryError;

/// Telegram message id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageRef(pub i32);

impl fmt::Display for MessageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A chat, optionally narrowed to a forum topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChatRef {
    pub chat_id: i64,
    pub thread_id: Option<i32>,
}

impl ChatRef {
    pub fn chat(chat_id: i64) -> Self {
        Self {
            chat_id,
            thread_id: None,
        }
    }
}

/// Outbound side of the chat platform.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send_text(&self, to: &ChatRef, text: &str) -> anyhow::Result<()>;

    async fn send_document(
        &self,
        to: &ChatRef,
        path: &Path,
        caption: Option<&str>,
    ) -> anyhow::Result<MessageRef>;

    async fn copy_message(
        &self,
        from: &ChatRef,
        message: MessageRef,
        to: &ChatRef,
    ) -> anyhow::Result<MessageRef>;
}

/// Where recording media comes from.
#[async_trait]
pub trait RecordingSource: Send + Sync {
    /// Downloads the recording to `target`, returning the byte count.
    async fn fetch(
        &self,
        project: &Project,
        meeting: &MeetingDescriptor,
        target: &Path,
    ) -> Result<u64, ZoomError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactOrigin {
    /// The file was already on disk.
    Local,
    Downloaded { bytes: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Earlier posts were copied from the project channel.
    Forwarded { forwarded: usize, failed: usize },
    /// The destination is the project channel and it already has the recording.
    AlreadyPosted { messages: Vec<MessageRef> },
    Uploaded {
        origin: ArtifactOrigin,
        file_name: String,
        /// Message in the project channel now recorded in the index.
        archived: Option<MessageRef>,
    },
}

pub const DOWNLOAD_STARTED_TEXT: &str =
    "This recording hasn't been posted yet. Downloading it now, this can take a while ⏳";

pub struct Deliverer {
    messenger: Arc<dyn Messenger>,
    source: Arc<dyn RecordingSource>,
    index: Arc<DeliveryIndex>,
    downloads_dir: PathBuf,
    /// Keyed by project slug and recording id.
    recording_locks: KeyedLocks<(String, String)>,
}

impl Deliverer {
    pub fn new(
        messenger: Arc<dyn Messenger>,
        source: Arc<dyn RecordingSource>,
        index: Arc<DeliveryIndex>,
        downloads_dir: PathBuf,
    ) -> Self {
        Self {
            messenger,
            source,
            index,
            downloads_dir,
            recording_locks: KeyedLocks::new(),
        }
    }

    pub fn index(&self) -> &DeliveryIndex {
        &self.index
    }

    pub fn artifact_path(&self, meeting: &MeetingDescriptor) -> PathBuf {
        self.downloads_dir.join(meeting.artifact_file_name())
    }

    /// Delivers `meeting` from `project` to `destination`.
    ///
    /// `requester` receives progress notices; those sends are best-effort.
    pub async fn deliver(
        &self,
        requester: &ChatRef,
        project: &Project,
        meeting: &MeetingDescriptor,
        destination: &ChatRef,
    ) -> Result<DeliveryOutcome, DeliveryError> {
        let refs = self.index.lookup_meeting(project, meeting).await;
        if let Some(outcome) = self.forward_existing(project, &refs, destination).await {
            return Ok(outcome);
        }

        // One upload per recording at a time, so concurrent requests for the
        // same recording produce one post and one index entry.
        let _guard = self
            .recording_locks
            .lock((project.slug.clone(), meeting.recording_id.clone()))
            .await;

        let refs = self.index.lookup_meeting(project, meeting).await;
        if let Some(outcome) = self.forward_existing(project, &refs, destination).await {
            return Ok(outcome);
        }

        let path = self.artifact_path(meeting);
        let file_name = meeting.artifact_file_name();

        let origin = if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            info!("Recording {:?} already downloaded, re-uploading", path);
            ArtifactOrigin::Local
        } else {
            self.notify(requester, DOWNLOAD_STARTED_TEXT).await;
            let bytes = self
                .source
                .fetch(project, meeting, &path)
                .await
                .map_err(DeliveryError::Download)?;
            ArtifactOrigin::Downloaded { bytes }
        };

        let caption = self.index.display_key(meeting);
        let archived = self
            .upload(project, meeting, &path, &caption, destination)
            .await?;

        Ok(DeliveryOutcome::Uploaded {
            origin,
            file_name,
            archived,
        })
    }

    /// Copies indexed posts to `destination`.
    ///
    /// Returns `None` when there is nothing usable to copy, which sends the
    /// caller down the upload path.
    async fn forward_existing(
        &self,
        project: &Project,
        refs: &[MessageRef],
        destination: &ChatRef,
    ) -> Option<DeliveryOutcome> {
        if refs.is_empty() {
            return None;
        }

        if *destination == project.channel {
            return Some(DeliveryOutcome::AlreadyPosted {
                messages: refs.to_vec(),
            });
        }

        let mut forwarded = 0;
        let mut failed = 0;
        for message in refs {
            match self
                .messenger
                .copy_message(&project.channel, *message, destination)
                .await
            {
                Ok(_) => forwarded += 1,
                Err(e) => {
                    failed += 1;
                    warn!(
                        "Failed to forward message {} from {}: {:#}",
                        message, project.name, e
                    );
                }
            }
        }

        if forwarded == 0 {
            warn!(
                "None of the {} indexed message(s) for {} could be forwarded, treating the entry as stale",
                refs.len(),
                project.name
            );
            return None;
        }

        info!(
            "Forwarded {} message(s) from {} ({} failed)",
            forwarded, project.name, failed
        );
        Some(DeliveryOutcome::Forwarded { forwarded, failed })
    }

    /// Posts the file to the project channel, records it, then copies it to
    /// `destination`. Falls back to uploading straight to `destination` when
    /// the channel post fails.
    async fn upload(
        &self,
        project: &Project,
        meeting: &MeetingDescriptor,
        path: &Path,
        caption: &str,
        destination: &ChatRef,
    ) -> Result<Option<MessageRef>, DeliveryError> {
        let archived = match self
            .messenger
            .send_document(&project.channel, path, Some(caption))
            .await
        {
            Ok(message) => {
                if let Err(e) = self.index.record(project, meeting, message).await {
                    error!(
                        "Uploaded recording {} as message {} but failed to record it: {:#}",
                        meeting.recording_id, message, e
                    );
                }
                Some(message)
            }
            Err(e) => {
                warn!(
                    "Failed to post recording {} to the {} channel: {:#}",
                    meeting.recording_id, project.name, e
                );
                None
            }
        };

        if *destination == project.channel {
            return match archived {
                Some(message) => Ok(Some(message)),
                None => Err(DeliveryError::Upload {
                    file: path.to_path_buf(),
                    message: "posting to the project channel failed".to_string(),
                }),
            };
        }

        if let Some(message) = archived {
            match self
                .messenger
                .copy_message(&project.channel, message, destination)
                .await
            {
                Ok(_) => return Ok(archived),
                Err(e) => warn!(
                    "Failed to copy message {} to the requester, uploading directly: {:#}",
                    message, e
                ),
            }
        }

        self.messenger
            .send_document(destination, path, Some(caption))
            .await
            .map_err(|e| DeliveryError::Upload {
                file: path.to_path_buf(),
                message: format!("{:#}", e),
            })?;

        Ok(archived)
    }

    async fn notify(&self, to: &ChatRef, text: &str) {
        if let Err(e) = self.messenger.send_text(to, text).await {
            warn!("Failed to notify chat {}: {:#}", to.chat_id, e);
        }
    }
}
