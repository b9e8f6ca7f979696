//! Per-chat browsing state between `/recs` and a meeting selection.
//!
//! Sessions live in memory only. The store is bounded: the least recently
//! used session is evicted past `max_sessions`, and sessions idle for longer
//! than the TTL are dropped.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

use crate::config::SessionConfig;
use crate::delivery::ChatRef;
use crate::meeting::MeetingDescriptor;
use crate::project::Project;

/// Where a selected recording is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// Into the requester's own chat.
    Direct,
    /// Into the project channel.
    Channel,
}

impl DeliveryMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Channel => "channel",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "direct" => Some(Self::Direct),
            "channel" => Some(Self::Channel),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConversationState {
    pub project: String,
    pub meetings: Vec<MeetingDescriptor>,
    pub channel: ChatRef,
    pub index_file: PathBuf,
    /// Distinguishes this listing from earlier ones for the same chat.
    pub generation: u64,
    pub delivery_mode: Option<DeliveryMode>,
    last_access: Instant,
}

/// A resolved selection.
#[derive(Debug, Clone)]
pub struct Selection {
    pub project: String,
    pub meeting: MeetingDescriptor,
    pub delivery_mode: DeliveryMode,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectionError {
    #[error("no recordings listed for this chat")]
    NoSession,
    #[error("selection belongs to an older listing")]
    Stale,
    #[error("recording {index} is out of range (listing has {len})")]
    OutOfRange { index: usize, len: usize },
}

pub struct SessionStore {
    sessions: Mutex<Sessions>,
    max_sessions: usize,
    ttl: Duration,
}

struct Sessions {
    by_chat: HashMap<i64, ConversationState>,
    next_generation: u64,
}

impl SessionStore {
    pub fn new(max_sessions: usize, ttl: Duration) -> Self {
        Self {
            sessions: Mutex::new(Sessions {
                by_chat: HashMap::new(),
                next_generation: 1,
            }),
            max_sessions: max_sessions.max(1),
            ttl,
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.max_sessions, Duration::from_secs(config.ttl_secs))
    }

    /// Replaces the requester's session with a fresh listing.
    pub fn begin_browsing(
        &self,
        requester: i64,
        project: &Project,
        meetings: Vec<MeetingDescriptor>,
    ) -> ConversationState {
        self.begin_browsing_at(requester, project, meetings, Instant::now())
    }

    fn begin_browsing_at(
        &self,
        requester: i64,
        project: &Project,
        meetings: Vec<MeetingDescriptor>,
        now: Instant,
    ) -> ConversationState {
        let mut sessions = self.lock();
        self.expire(&mut sessions, now);

        let generation = sessions.next_generation;
        sessions.next_generation += 1;

        let state = ConversationState {
            project: project.name.clone(),
            meetings,
            channel: project.channel,
            index_file: project.index_file.clone(),
            generation,
            delivery_mode: None,
            last_access: now,
        };
        sessions.by_chat.insert(requester, state.clone());

        while sessions.by_chat.len() > self.max_sessions {
            let oldest = sessions
                .by_chat
                .iter()
                .min_by_key(|(_, s)| s.last_access)
                .map(|(chat, _)| *chat);
            match oldest {
                Some(chat) => {
                    debug!("Evicting browsing session for chat {}", chat);
                    sessions.by_chat.remove(&chat);
                }
                None => break,
            }
        }

        state
    }

    /// The `index`-th (zero-based) meeting of the requester's current listing.
    pub fn get_meeting(
        &self,
        requester: i64,
        index: usize,
    ) -> Result<MeetingDescriptor, SelectionError> {
        let mut sessions = self.lock();
        let state = self.touch(&mut sessions, requester, Instant::now())?;
        pick(state, index).cloned()
    }

    /// Records the delivery mode for the listing identified by `generation`.
    pub fn set_delivery_mode(
        &self,
        requester: i64,
        generation: u64,
        mode: DeliveryMode,
    ) -> Result<ConversationState, SelectionError> {
        let mut sessions = self.lock();
        let state = self.touch(&mut sessions, requester, Instant::now())?;
        if state.generation != generation {
            return Err(SelectionError::Stale);
        }
        state.delivery_mode = Some(mode);
        Ok(state.clone())
    }

    /// Resolves a keyboard selection made against listing `generation`.
    ///
    /// A chat that never picked a mode gets direct delivery.
    pub fn select(
        &self,
        requester: i64,
        generation: u64,
        index: usize,
    ) -> Result<Selection, SelectionError> {
        self.select_at(requester, generation, index, Instant::now())
    }

    fn select_at(
        &self,
        requester: i64,
        generation: u64,
        index: usize,
        now: Instant,
    ) -> Result<Selection, SelectionError> {
        let mut sessions = self.lock();
        let state = self.touch(&mut sessions, requester, now)?;
        if state.generation != generation {
            return Err(SelectionError::Stale);
        }
        let meeting = pick(state, index)?.clone();
        Ok(Selection {
            project: state.project.clone(),
            meeting,
            delivery_mode: state.delivery_mode.unwrap_or(DeliveryMode::Direct),
        })
    }

    pub fn len(&self) -> usize {
        self.lock().by_chat.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Sessions> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn touch<'a>(
        &self,
        sessions: &'a mut Sessions,
        requester: i64,
        now: Instant,
    ) -> Result<&'a mut ConversationState, SelectionError> {
        self.expire(sessions, now);
        let state = sessions
            .by_chat
            .get_mut(&requester)
            .ok_or(SelectionError::NoSession)?;
        state.last_access = now;
        Ok(state)
    }

    fn expire(&self, sessions: &mut Sessions, now: Instant) {
        let ttl = self.ttl;
        sessions
            .by_chat
            .retain(|_, s| now.saturating_duration_since(s.last_access) <= ttl);
    }
}

fn pick(state: &ConversationState, index: usize) -> Result<&MeetingDescriptor, SelectionError> {
    state.meetings.get(index).ok_or(SelectionError::OutOfRange {
        index,
        len: state.meetings.len(),
    })
}
