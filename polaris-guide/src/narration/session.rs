//! Narration session state machine
//!
//! ```text
//! Idle ──reveal──▶ RevealingScripted ──done/stop──▶ Idle
//! Idle ──stream──▶ StreamingAnswer   ──done/fail/stop──▶ Idle
//! ```
//!
//! All transitions happen under one lock. Every operation that starts or
//! cancels work bumps `generation`; the reveal and stream tasks carry the
//! generation they were started with and their writes are dropped once it is
//! stale, so text arriving after a cancellation never reaches the transcript.
//!
//! Lock order: session state, then the audio controller.

use super::transcript::Conversation;
use super::{reveal, stream};
use crate::audio::AudioController;
use crate::error::{Error, Result};
use crate::services::{ChatRequest, ChatService};
use chrono::Utc;
use polaris_common::config::NarrationConfig;
use polaris_common::{EventBus, Landmark, NarrationPhase, PolarisEvent, TranscriptEntry};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Tunables for reveal speed and the failure text
#[derive(Debug, Clone)]
pub struct NarrationSettings {
    /// Interval between revealed characters
    pub reveal_tick: Duration,
    /// Written into the narrator entry when an answer cannot be fetched
    pub error_message: String,
}

impl From<&NarrationConfig> for NarrationSettings {
    fn from(config: &NarrationConfig) -> Self {
        Self {
            reveal_tick: Duration::from_millis(config.reveal_tick_ms.max(1)),
            error_message: config.error_message.clone(),
        }
    }
}

impl Default for NarrationSettings {
    fn default() -> Self {
        Self::from(&NarrationConfig::default())
    }
}

/// Result of [`NarrationSession::open`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum OpenOutcome {
    /// Session started; `resumed` when earlier history was restored
    Opened { resumed: bool },
    /// The landmark is already the open subject; nothing changed
    AlreadyOpen,
}

/// How a question was routed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Dispatch {
    /// Canned answer revealed locally
    Scripted,
    /// Sent to the chat service
    Streaming,
    /// Narration still running; the question was dropped
    Rejected,
}

/// Point-in-time view of the session
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub landmark: Option<String>,
    pub phase: NarrationPhase,
    pub transcript: Vec<TranscriptEntry>,
    pub available_follow_ups: Vec<String>,
    pub asked_follow_ups: Vec<String>,
}

struct SessionState {
    subject: Option<Arc<Landmark>>,
    /// History per landmark name, kept across close/re-open
    conversations: HashMap<String, Conversation>,
    phase: NarrationPhase,
    generation: u64,
    /// Token of the single outstanding operation
    cancel: Option<CancellationToken>,
}

pub(crate) struct SessionInner {
    state: Mutex<SessionState>,
    pub(crate) chat: Arc<dyn ChatService>,
    audio: AudioController,
    events: EventBus,
    pub(crate) settings: NarrationSettings,
}

/// Handle to the narration session; clones share the same session
#[derive(Clone)]
pub struct NarrationSession {
    inner: Arc<SessionInner>,
}

impl NarrationSession {
    pub fn new(
        chat: Arc<dyn ChatService>,
        audio: AudioController,
        events: EventBus,
        settings: NarrationSettings,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                state: Mutex::new(SessionState {
                    subject: None,
                    conversations: HashMap::new(),
                    phase: NarrationPhase::Idle,
                    generation: 0,
                    cancel: None,
                }),
                chat,
                audio,
                events,
                settings,
            }),
        }
    }

    /// Make `landmark` the subject
    ///
    /// A different open subject is torn down first. First-time subjects get
    /// their description revealed; a subject with history is restored as is.
    pub fn open(&self, landmark: Arc<Landmark>) -> OpenOutcome {
        let inner = &self.inner;
        let mut state = inner.lock();

        match state.subject.as_ref().map(|l| l.name == landmark.name) {
            Some(true) => {
                debug!(landmark = %landmark.name, "Landmark already open");
                return OpenOutcome::AlreadyOpen;
            }
            Some(false) => inner.teardown_locked(&mut state),
            None => {}
        }

        let resumed = state
            .conversations
            .get(&landmark.name)
            .is_some_and(|c| !c.is_empty());
        state
            .conversations
            .entry(landmark.name.clone())
            .or_default();
        state.subject = Some(Arc::clone(&landmark));

        info!(landmark = %landmark.name, resumed, "Narration session opened");
        inner.events.emit_lossy(PolarisEvent::SessionOpened {
            landmark: landmark.name.clone(),
            resumed,
            timestamp: Utc::now(),
        });

        if !resumed {
            inner.start_reveal_locked(&mut state, landmark.description.clone());
        }

        OpenOutcome::Opened { resumed }
    }

    /// Ask a question offered as a quick reply
    ///
    /// Exact matches of a canned follow-up reveal the scripted answer; any
    /// other text goes to the chat service.
    pub fn ask_follow_up(&self, question: &str) -> Result<Dispatch> {
        self.dispatch(question, true)
    }

    /// Ask a free-form question; always answered by the chat service
    pub fn send_freeform(&self, text: &str) -> Result<Dispatch> {
        self.dispatch(text, false)
    }

    fn dispatch(&self, question: &str, allow_canned: bool) -> Result<Dispatch> {
        let question = question.trim();
        if question.is_empty() {
            return Err(Error::Common(polaris_common::Error::InvalidInput(
                "question is empty".to_string(),
            )));
        }

        let inner = &self.inner;
        let mut state = inner.lock();
        let landmark = state.subject.clone().ok_or(Error::NoActiveSession)?;

        if !state.phase.is_idle() {
            debug!(landmark = %landmark.name, phase = ?state.phase, "Question rejected while narrating");
            return Ok(Dispatch::Rejected);
        }

        if let Some(conversation) = state.conversations.get_mut(&landmark.name) {
            conversation.mark_asked(question);
        }

        let canned = if allow_canned {
            landmark.canned_answer(question).map(str::to_string)
        } else {
            None
        };

        match canned {
            Some(answer) => {
                inner.push_entry_locked(&mut state, TranscriptEntry::user(question));
                inner.start_reveal_locked(&mut state, answer);
                Ok(Dispatch::Scripted)
            }
            None => {
                inner.start_stream_locked(&mut state, &landmark, question);
                Ok(Dispatch::Streaming)
            }
        }
    }

    /// Cancel the running reveal/stream and any audio; idempotent
    pub fn stop(&self) {
        let inner = &self.inner;
        let mut state = inner.lock();
        inner.cancel_locked(&mut state);
        inner.audio.stop();
    }

    /// Tear the session down; returns false when nothing was open
    pub fn close(&self) -> bool {
        let inner = &self.inner;
        let mut state = inner.lock();
        if state.subject.is_none() {
            return false;
        }
        inner.teardown_locked(&mut state);
        true
    }

    pub fn phase(&self) -> NarrationPhase {
        self.inner.lock().phase
    }

    /// Name of the open landmark
    pub fn subject(&self) -> Option<String> {
        self.inner.lock().subject.as_ref().map(|l| l.name.clone())
    }

    /// Canned follow-ups of the open landmark not yet asked
    pub fn available_follow_ups(&self) -> Vec<String> {
        let state = self.inner.lock();
        match &state.subject {
            Some(landmark) => state
                .conversations
                .get(&landmark.name)
                .map(|c| c.available_follow_ups(landmark))
                .unwrap_or_else(|| {
                    landmark
                        .follow_ups
                        .iter()
                        .map(|f| f.question.clone())
                        .collect()
                }),
            None => Vec::new(),
        }
    }

    /// History of any landmark opened during this run
    pub fn transcript_for(&self, landmark: &str) -> Option<Vec<TranscriptEntry>> {
        self.inner
            .lock()
            .conversations
            .get(landmark)
            .map(|c| c.entries().to_vec())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.inner.lock();
        let conversation = state
            .subject
            .as_ref()
            .and_then(|l| state.conversations.get(&l.name).map(|c| (l, c)));

        match conversation {
            Some((landmark, conversation)) => SessionSnapshot {
                landmark: Some(landmark.name.clone()),
                phase: state.phase,
                transcript: conversation.entries().to_vec(),
                available_follow_ups: conversation.available_follow_ups(landmark),
                asked_follow_ups: conversation.asked(),
            },
            None => SessionSnapshot {
                landmark: None,
                phase: state.phase,
                transcript: Vec::new(),
                available_follow_ups: Vec::new(),
                asked_follow_ups: Vec::new(),
            },
        }
    }
}

impl SessionInner {
    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn subject_name(state: &SessionState) -> String {
        state
            .subject
            .as_ref()
            .map(|l| l.name.clone())
            .unwrap_or_default()
    }

    fn set_phase_locked(&self, state: &mut SessionState, phase: NarrationPhase) {
        if state.phase == phase {
            return;
        }
        state.phase = phase;
        self.events.emit_lossy(PolarisEvent::PhaseChanged {
            landmark: Self::subject_name(state),
            phase,
            timestamp: Utc::now(),
        });
    }

    /// Invalidate the outstanding operation and return to Idle
    fn cancel_locked(&self, state: &mut SessionState) {
        if let Some(token) = state.cancel.take() {
            token.cancel();
        }
        state.generation += 1;
        if !state.phase.is_idle() {
            debug!(landmark = %Self::subject_name(state), "Narration stopped");
        }
        self.set_phase_locked(state, NarrationPhase::Idle);
    }

    /// Full teardown of the open subject: work, audio, then the subject itself
    fn teardown_locked(&self, state: &mut SessionState) {
        self.cancel_locked(state);
        self.audio.stop();
        if let Some(landmark) = state.subject.take() {
            info!(landmark = %landmark.name, "Narration session closed");
            self.events.emit_lossy(PolarisEvent::SessionClosed {
                landmark: landmark.name.clone(),
                timestamp: Utc::now(),
            });
        }
    }

    /// Start a new operation: fresh token and generation, phase set
    fn begin_locked(
        &self,
        state: &mut SessionState,
        phase: NarrationPhase,
    ) -> (u64, CancellationToken) {
        if let Some(token) = state.cancel.take() {
            token.cancel();
        }
        state.generation += 1;
        let token = CancellationToken::new();
        state.cancel = Some(token.clone());
        self.set_phase_locked(state, phase);
        (state.generation, token)
    }

    fn push_entry_locked(&self, state: &mut SessionState, entry: TranscriptEntry) -> usize {
        let name = Self::subject_name(state);
        let conversation = state.conversations.entry(name.clone()).or_default();
        let index = conversation.push(entry.clone());
        self.events.emit_lossy(PolarisEvent::TranscriptEntryAdded {
            landmark: name,
            index,
            entry,
            timestamp: Utc::now(),
        });
        index
    }

    fn start_reveal_locked(self: &Arc<Self>, state: &mut SessionState, text: String) {
        let (generation, token) = self.begin_locked(state, NarrationPhase::RevealingScripted);
        let index = self.push_entry_locked(state, TranscriptEntry::narrator(""));

        // Audio for the whole block starts alongside the reveal
        if text.trim().is_empty() {
            self.audio.stop();
        } else {
            self.audio.play(&text);
        }

        let start = Instant::now() + self.settings.reveal_tick;
        tokio::spawn(reveal::run(
            Arc::clone(self),
            generation,
            token,
            index,
            text,
            start,
        ));
    }

    fn start_stream_locked(
        self: &Arc<Self>,
        state: &mut SessionState,
        landmark: &Landmark,
        question: &str,
    ) {
        let prior_transcript = state
            .conversations
            .get(&landmark.name)
            .map(|c| c.entries().to_vec())
            .unwrap_or_default();

        let (generation, token) = self.begin_locked(state, NarrationPhase::StreamingAnswer);
        self.push_entry_locked(state, TranscriptEntry::user(question));
        let index = self.push_entry_locked(state, TranscriptEntry::narrator(""));

        // Previous audio must not overlap the new answer
        self.audio.stop();

        let request = ChatRequest {
            subject_name: landmark.name.clone(),
            question: question.to_string(),
            prior_transcript,
        };
        tokio::spawn(stream::run(
            Arc::clone(self),
            generation,
            token,
            index,
            request,
        ));
    }

    /// Append text for operation `generation`; false once it is stale
    pub(crate) fn append_delta(&self, generation: u64, index: usize, delta: &str) -> bool {
        let mut state = self.lock();
        if state.generation != generation {
            return false;
        }
        let name = Self::subject_name(&state);
        let appended = state
            .conversations
            .get_mut(&name)
            .is_some_and(|c| c.append(index, delta));
        if appended {
            self.events.emit_lossy(PolarisEvent::TranscriptDelta {
                landmark: name,
                index,
                delta: delta.to_string(),
                timestamp: Utc::now(),
            });
        }
        appended
    }

    /// Finish operation `generation`, optionally speaking its text
    pub(crate) fn complete(&self, generation: u64, speak: Option<&str>) -> bool {
        let mut state = self.lock();
        if state.generation != generation {
            return false;
        }
        state.cancel = None;
        self.set_phase_locked(&mut state, NarrationPhase::Idle);

        if let Some(text) = speak.filter(|t| !t.trim().is_empty()) {
            self.audio.play(text);
        }
        true
    }

    /// Replace the answer with the error text and return to Idle
    pub(crate) fn fail_answer(&self, generation: u64, index: usize, error: &Error) {
        let mut state = self.lock();
        if state.generation != generation {
            debug!("Ignoring failure of a superseded answer: {}", error);
            return;
        }

        let name = Self::subject_name(&state);
        warn!(landmark = %name, "Answer failed: {}", error);

        let message = self.settings.error_message.clone();
        let replaced = state
            .conversations
            .get_mut(&name)
            .is_some_and(|c| c.replace(index, &message));
        if replaced {
            self.events.emit_lossy(PolarisEvent::TranscriptEntryReplaced {
                landmark: name,
                index,
                text: message,
                timestamp: Utc::now(),
            });
        }

        state.cancel = None;
        self.set_phase_locked(&mut state, NarrationPhase::Idle);
    }
}
