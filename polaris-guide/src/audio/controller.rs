//! Audio playback controller
//!
//! Speaks one block of text at a time. At most one clip is authoritative;
//! every `play()` synchronously stops the previous clip, releases its
//! resource and cancels a fetch that has not produced a clip yet. Each
//! materialized resource is released exactly once, on whichever happens
//! first of: superseded, natural end, playback error, stop/teardown.
//! Materializing and starting a clip run on the blocking pool without the
//! state lock held; the generation is checked again before a clip is adopted.

use crate::audio::output::{AudioOutput, PlaybackControl, PlaybackHandle, PlaybackOutcome};
use crate::audio::resource::{AudioResource, ResourceStore};
use crate::services::{SpeechClip, SpeechService};
use chrono::Utc;
use polaris_common::{AudioEndReason, EventBus, PolarisEvent};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// The authoritative clip
struct ActiveClip {
    generation: u64,
    resource: AudioResource,
    control: Box<dyn PlaybackControl>,
}

#[derive(Default)]
struct AudioState {
    /// Bumped by every play/stop; async work for older generations is discarded
    generation: u64,
    /// Fetch in flight for the current generation
    pending: Option<CancellationToken>,
    current: Option<ActiveClip>,
    muted: bool,
}

struct AudioShared {
    state: Mutex<AudioState>,
    speech: Arc<dyn SpeechService>,
    store: Arc<dyn ResourceStore>,
    output: Arc<dyn AudioOutput>,
    events: EventBus,
}

/// Outcome of the blocking half of a clip
enum Prepared {
    Playing(AudioResource, PlaybackHandle),
    Superseded,
    Failed,
}

/// Cheap to clone; all clones drive the same playback slot
#[derive(Clone)]
pub struct AudioController {
    shared: Arc<AudioShared>,
}

impl AudioController {
    pub fn new(
        speech: Arc<dyn SpeechService>,
        store: Arc<dyn ResourceStore>,
        output: Arc<dyn AudioOutput>,
        events: EventBus,
        muted: bool,
    ) -> Self {
        Self {
            shared: Arc::new(AudioShared {
                state: Mutex::new(AudioState {
                    muted,
                    ..AudioState::default()
                }),
                speech,
                store,
                output,
                events,
            }),
        }
    }

    /// Speak `text`, replacing whatever is playing or being fetched
    ///
    /// The previous clip is stopped and released before this returns. The
    /// returned task finishes once the new clip ends, fails or is superseded.
    pub fn play(&self, text: &str) -> JoinHandle<()> {
        let (generation, token) = {
            let mut state = self.shared.lock();
            self.shared.stop_locked(&mut state, AudioEndReason::Superseded);
            state.generation += 1;
            let token = CancellationToken::new();
            state.pending = Some(token.clone());
            (state.generation, token)
        };

        debug!(generation, chars = text.len(), "Audio requested");

        let shared = Arc::clone(&self.shared);
        let text = text.to_string();
        tokio::spawn(async move { shared.run_clip(generation, token, text).await })
    }

    /// Stop playback and abandon any pending fetch; idempotent
    pub fn stop(&self) {
        let mut state = self.shared.lock();
        self.shared.stop_locked(&mut state, AudioEndReason::Stopped);
        state.generation += 1;
    }

    /// Apply the mute flag to the playing clip in place and to future clips
    pub fn set_muted(&self, muted: bool) {
        let mut state = self.shared.lock();
        state.muted = muted;
        if let Some(active) = &state.current {
            active.control.set_muted(muted);
        }
    }

    pub fn is_muted(&self) -> bool {
        self.shared.lock().muted
    }

    /// A clip is materialized and playing
    pub fn is_playing(&self) -> bool {
        self.shared.lock().current.is_some()
    }

    /// A fetch is in flight for the latest request
    pub fn is_pending(&self) -> bool {
        self.shared.lock().pending.is_some()
    }

    /// Generation of the authoritative clip, if any
    pub fn current_generation(&self) -> Option<u64> {
        self.shared.lock().current.as_ref().map(|c| c.generation)
    }

    /// Release everything before the controller goes away
    pub fn shutdown(&self) {
        info!("Audio controller shutting down");
        self.stop();
    }
}

impl AudioShared {
    fn lock(&self) -> MutexGuard<'_, AudioState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cancel the pending fetch and stop/release the authoritative clip
    fn stop_locked(&self, state: &mut AudioState, reason: AudioEndReason) {
        if let Some(token) = state.pending.take() {
            token.cancel();
        }
        if let Some(active) = state.current.take() {
            active.control.stop();
            self.store.release(active.resource);
            debug!(generation = active.generation, ?reason, "Audio clip released");
            self.events.emit_lossy(PolarisEvent::AudioFinished {
                generation: active.generation,
                reason,
                timestamp: Utc::now(),
            });
        }
    }

    fn is_current(&self, state: &AudioState, generation: u64) -> bool {
        state.generation == generation
    }

    /// Materialize `clip` and start it; runs on the blocking pool
    ///
    /// The state lock is only taken between the two steps, so a stop() or a
    /// newer play() never waits on disk I/O.
    fn prepare(&self, generation: u64, clip: &SpeechClip, muted: bool) -> Prepared {
        let resource = match self.store.materialize(&clip.bytes, &clip.content_type) {
            Ok(resource) => resource,
            Err(e) => {
                warn!(generation, "Failed to materialize audio: {}", e);
                return Prepared::Failed;
            }
        };

        if !self.is_current(&self.lock(), generation) {
            self.store.release(resource);
            debug!(generation, "Clip superseded while it was being spooled");
            return Prepared::Superseded;
        }

        match self.output.start(&resource, muted) {
            Ok(handle) => Prepared::Playing(resource, handle),
            Err(e) => {
                warn!(generation, "Playback failed to start: {}", e);
                self.store.release(resource);
                self.events.emit_lossy(PolarisEvent::AudioFinished {
                    generation,
                    reason: AudioEndReason::Failed,
                    timestamp: Utc::now(),
                });
                Prepared::Failed
            }
        }
    }

    async fn run_clip(self: Arc<Self>, generation: u64, token: CancellationToken, text: String) {
        let fetched = tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!(generation, "Audio fetch canceled");
                return;
            }
            result = self.speech.synthesize(&text) => result,
        };

        let clip = match fetched {
            Ok(clip) => clip,
            Err(e) => {
                // Narration continues as text only
                warn!(generation, "Speech synthesis failed: {}", e);
                let mut state = self.lock();
                if self.is_current(&state, generation) {
                    state.pending = None;
                }
                return;
            }
        };

        let muted = {
            let state = self.lock();
            if !self.is_current(&state, generation) || token.is_cancelled() {
                debug!(generation, "Discarding audio for superseded request");
                return;
            }
            state.muted
        };

        let cache_hit = clip.cache_hit;
        // Spooling and probing touch the disk; keep them off the async workers
        let prepared = {
            let shared = Arc::clone(&self);
            tokio::task::spawn_blocking(move || shared.prepare(generation, &clip, muted)).await
        };

        let (resource, handle) = match prepared {
            Ok(Prepared::Playing(resource, handle)) => (resource, handle),
            Ok(Prepared::Superseded) => return,
            Ok(Prepared::Failed) => {
                let mut state = self.lock();
                if self.is_current(&state, generation) {
                    state.pending = None;
                }
                return;
            }
            Err(e) => {
                warn!(generation, "Audio preparation task failed: {}", e);
                let mut state = self.lock();
                if self.is_current(&state, generation) {
                    state.pending = None;
                }
                return;
            }
        };

        let finished = {
            let mut state = self.lock();
            if !self.is_current(&state, generation) {
                // Superseded while the clip was being prepared
                drop(state);
                handle.control.stop();
                self.store.release(resource);
                debug!(generation, "Clip superseded before it became authoritative");
                return;
            }

            if state.muted != muted {
                handle.control.set_muted(state.muted);
            }
            state.pending = None;
            state.current = Some(ActiveClip {
                generation,
                resource,
                control: handle.control,
            });
            self.events.emit_lossy(PolarisEvent::AudioStarted {
                generation,
                cache_hit,
                muted: state.muted,
                timestamp: Utc::now(),
            });
            handle.finished
        };

        info!(generation, cache_hit, "Audio playback started");

        let reason = match finished.await {
            Ok(PlaybackOutcome::Ended) => AudioEndReason::Ended,
            Ok(PlaybackOutcome::Failed(e)) => {
                warn!(generation, "Playback error: {}", e);
                AudioEndReason::Failed
            }
            // Sender dropped: stopped by us, or the backend went away
            Err(_) => AudioEndReason::Failed,
        };

        let mut state = self.lock();
        let still_current = state
            .current
            .as_ref()
            .is_some_and(|active| active.generation == generation);
        if still_current {
            if let Some(active) = state.current.take() {
                self.store.release(active.resource);
                debug!(generation, ?reason, "Audio clip finished");
                self.events.emit_lossy(PolarisEvent::AudioFinished {
                    generation,
                    reason,
                    timestamp: Utc::now(),
                });
            }
        }
    }
}

impl Drop for AudioShared {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(token) = state.pending.take() {
            token.cancel();
        }
        if let Some(active) = state.current.take() {
            active.control.stop();
            self.store.release(active.resource);
        }
    }
}
