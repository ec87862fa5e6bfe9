//! Test doubles for the external seams of the guide
//!
//! Each integration test file pulls this in with `mod helpers;` and uses
//! only part of it.
#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use polaris_common::{Coordinate, EventBus, FollowUp, Landmark, PolarisEvent};
use polaris_guide::audio::{
    AudioController, AudioOutput, AudioResource, PlaybackControl, PlaybackHandle,
    PlaybackOutcome, ResourceStore,
};
use polaris_guide::error::{Error, Result};
use polaris_guide::narration::{NarrationSession, NarrationSettings};
use polaris_guide::services::{ChatFragment, ChatRequest, ChatService, ChatStream, SpeechClip, SpeechService};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_stream::wrappers::UnboundedReceiverStream;
use uuid::Uuid;

pub const REVEAL_TICK: Duration = Duration::from_millis(30);
pub const ERROR_MESSAGE: &str = "Sorry, I encountered an error. Please try again.";

// ============================================================================
// Landmarks
// ============================================================================

pub fn widener() -> Landmark {
    Landmark {
        name: "Widener Library".to_string(),
        coordinate: Coordinate { lat: 42.3734, lng: -71.1147 },
        description: "Harvard's flagship library.".to_string(),
        follow_ups: [
            FollowUp {
                question: "How many books does it hold?".to_string(),
                answer: "About 3.5 million.".to_string(),
            },
            FollowUp {
                question: "Who is it named after?".to_string(),
                answer: "Harry Elkins Widener.".to_string(),
            },
        ],
        image: Some("widener.jpg".to_string()),
    }
}

pub fn memorial_church() -> Landmark {
    Landmark {
        name: "Memorial Church".to_string(),
        coordinate: Coordinate { lat: 42.3757, lng: -71.1159 },
        description: "Built in 1932.".to_string(),
        follow_ups: [
            FollowUp {
                question: "Who does it honor?".to_string(),
                answer: "Harvard's war dead.".to_string(),
            },
            FollowUp {
                question: "Can I go inside?".to_string(),
                answer: "Usually, yes.".to_string(),
            },
        ],
        image: None,
    }
}

// ============================================================================
// Chat
// ============================================================================

enum Script {
    Stream(mpsc::UnboundedReceiver<Result<ChatFragment>>),
    Fail(String),
}

/// Chat service answering from scripted streams, in request order
#[derive(Default)]
pub struct FakeChat {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl FakeChat {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue a streamed answer; fragments are fed through the returned sender
    pub fn push_stream(&self) -> mpsc::UnboundedSender<Result<ChatFragment>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.scripts.lock().unwrap().push_back(Script::Stream(rx));
        tx
    }

    /// Queue an answer whose request is refused
    pub fn push_failure(&self, message: &str) {
        self.scripts
            .lock()
            .unwrap()
            .push_back(Script::Fail(message.to_string()));
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatService for FakeChat {
    async fn open_stream(&self, request: ChatRequest) -> Result<ChatStream> {
        self.requests.lock().unwrap().push(request);
        let script = self.scripts.lock().unwrap().pop_front();
        match script {
            Some(Script::Stream(rx)) => Ok(Box::pin(UnboundedReceiverStream::new(rx))),
            Some(Script::Fail(message)) => Err(Error::ChatService(message)),
            None => Err(Error::ChatService("no scripted answer".to_string())),
        }
    }
}

pub fn delta(text: &str) -> Result<ChatFragment> {
    Ok(ChatFragment::Delta(text.to_string()))
}

// ============================================================================
// Speech
// ============================================================================

/// Speech service recording every synthesized text
#[derive(Default)]
pub struct FakeSpeech {
    texts: Mutex<Vec<String>>,
    fail: AtomicBool,
}

impl FakeSpeech {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpeechService for FakeSpeech {
    async fn synthesize(&self, text: &str) -> Result<SpeechClip> {
        self.texts.lock().unwrap().push(text.to_string());
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::SpeechService("synthesis unavailable".to_string()));
        }
        Ok(SpeechClip {
            bytes: Bytes::from(text.as_bytes().to_vec()),
            content_type: "audio/mpeg".to_string(),
            cache_hit: false,
        })
    }
}

// ============================================================================
// Resources
// ============================================================================

/// Resource store tracking acquisitions and releases by id
#[derive(Default)]
pub struct CountingStore {
    materialized: Mutex<Vec<Uuid>>,
    released: Mutex<Vec<Uuid>>,
    gate: Mutex<Option<std::sync::mpsc::Receiver<()>>>,
}

impl CountingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make the next materialize block, after recording its id, until the
    /// returned sender fires or is dropped
    pub fn hold_next(&self) -> std::sync::mpsc::Sender<()> {
        let (tx, rx) = std::sync::mpsc::channel();
        *self.gate.lock().unwrap() = Some(rx);
        tx
    }

    pub fn materialized(&self) -> Vec<Uuid> {
        self.materialized.lock().unwrap().clone()
    }

    pub fn released(&self) -> Vec<Uuid> {
        self.released.lock().unwrap().clone()
    }

    /// Materialized and not yet released
    pub fn live(&self) -> usize {
        self.materialized().len() - self.released().len()
    }

    /// Every materialized resource was released exactly once
    pub fn assert_released_exactly_once(&self) {
        let materialized = self.materialized();
        let released = self.released();
        for id in &materialized {
            let count = released.iter().filter(|r| *r == id).count();
            assert_eq!(count, 1, "resource {} released {} times", id, count);
        }
        assert_eq!(released.len(), materialized.len());
    }
}

impl ResourceStore for CountingStore {
    fn materialize(&self, bytes: &[u8], _content_type: &str) -> Result<AudioResource> {
        let id = Uuid::new_v4();
        self.materialized.lock().unwrap().push(id);
        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            let _ = gate.recv();
        }
        Ok(AudioResource::new(
            id,
            PathBuf::from(format!("/fake/{}.mp3", id)),
            bytes.len(),
        ))
    }

    fn release(&self, resource: AudioResource) {
        self.released.lock().unwrap().push(resource.id());
    }
}

// ============================================================================
// Output
// ============================================================================

/// Observable state of one fake playback
#[derive(Default)]
pub struct FakePlayback {
    pub resource: Mutex<Option<Uuid>>,
    pub muted: AtomicBool,
    pub stopped: AtomicBool,
    finish: Mutex<Option<oneshot::Sender<PlaybackOutcome>>>,
}

impl FakePlayback {
    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn resource(&self) -> Option<Uuid> {
        *self.resource.lock().unwrap()
    }

    /// Report how playback ended
    pub fn finish(&self, outcome: PlaybackOutcome) {
        if let Some(tx) = self.finish.lock().unwrap().take() {
            let _ = tx.send(outcome);
        }
    }
}

struct FakeControl(Arc<FakePlayback>);

impl PlaybackControl for FakeControl {
    fn set_muted(&self, muted: bool) {
        self.0.muted.store(muted, Ordering::SeqCst);
    }

    fn stop(&self) {
        self.0.stopped.store(true, Ordering::SeqCst);
        self.0.finish.lock().unwrap().take();
    }
}

/// Output that plays until the test finishes the clip
#[derive(Default)]
pub struct FakeOutput {
    playbacks: Mutex<Vec<Arc<FakePlayback>>>,
    fail_start: AtomicBool,
}

impl FakeOutput {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_fail_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::SeqCst);
    }

    pub fn started(&self) -> usize {
        self.playbacks.lock().unwrap().len()
    }

    pub fn playback(&self, index: usize) -> Arc<FakePlayback> {
        Arc::clone(&self.playbacks.lock().unwrap()[index])
    }

    pub fn last(&self) -> Arc<FakePlayback> {
        let playbacks = self.playbacks.lock().unwrap();
        Arc::clone(playbacks.last().expect("nothing started"))
    }
}

impl AudioOutput for FakeOutput {
    fn start(&self, resource: &AudioResource, muted: bool) -> Result<PlaybackHandle> {
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(Error::Audio("device unavailable".to_string()));
        }
        let (tx, rx) = oneshot::channel();
        let playback = Arc::new(FakePlayback {
            resource: Mutex::new(Some(resource.id())),
            muted: AtomicBool::new(muted),
            stopped: AtomicBool::new(false),
            finish: Mutex::new(Some(tx)),
        });
        self.playbacks.lock().unwrap().push(Arc::clone(&playback));
        Ok(PlaybackHandle {
            control: Box::new(FakeControl(playback)),
            finished: rx,
        })
    }
}

// ============================================================================
// Assembly
// ============================================================================

pub struct Harness {
    pub chat: Arc<FakeChat>,
    pub speech: Arc<FakeSpeech>,
    pub store: Arc<CountingStore>,
    pub output: Arc<FakeOutput>,
    pub events: EventBus,
    pub audio: AudioController,
    pub session: NarrationSession,
}

impl Harness {
    pub fn new() -> Self {
        let chat = FakeChat::new();
        let speech = FakeSpeech::new();
        let store = CountingStore::new();
        let output = FakeOutput::new();
        let events = EventBus::new(1024);

        let audio = AudioController::new(
            speech.clone(),
            store.clone(),
            output.clone(),
            events.clone(),
            false,
        );
        let session = NarrationSession::new(
            chat.clone(),
            audio.clone(),
            events.clone(),
            NarrationSettings {
                reveal_tick: REVEAL_TICK,
                error_message: ERROR_MESSAGE.to_string(),
            },
        );

        Self {
            chat,
            speech,
            store,
            output,
            events,
            audio,
            session,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PolarisEvent> {
        self.events.subscribe()
    }
}

/// Let spawned tasks, and the blocking-pool work they wait on, run until they block
pub async fn settle() {
    for i in 0..20 {
        tokio::task::yield_now().await;
        if i % 5 == 4 {
            std::thread::sleep(Duration::from_millis(1));
        }
    }
}

/// Settle repeatedly until `condition` holds; panics after about a second
pub async fn wait_for(condition: impl Fn() -> bool) {
    for _ in 0..250 {
        if condition() {
            return;
        }
        settle().await;
    }
    panic!("condition not reached");
}

/// Advance paused time in reveal ticks, letting tasks run between ticks
pub async fn advance_ticks(ticks: u32) {
    for _ in 0..ticks {
        tokio::time::advance(REVEAL_TICK).await;
        settle().await;
    }
}

/// Drain every event currently buffered in `rx`
pub fn drain(rx: &mut broadcast::Receiver<PolarisEvent>) -> Vec<PolarisEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
