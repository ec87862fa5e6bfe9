//! Audio output backends
//!
//! An [`AudioOutput`] starts playback of a materialized resource and hands
//! back a [`PlaybackHandle`]: a control for mute/stop plus a one-shot
//! channel reporting how playback ended. The default [`ClockOutput`] is
//! headless and only keeps time; `SpeakerOutput` (feature `speaker`) plays
//! through the sound card.

use crate::audio::decode;
use crate::audio::resource::AudioResource;
use crate::error::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// How playback of a clip ended on its own
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackOutcome {
    Ended,
    Failed(String),
}

/// Live controls of a playing clip
pub trait PlaybackControl: Send + Sync {
    /// Silence or restore output without interrupting playback
    fn set_muted(&self, muted: bool);

    /// Stop playback; no outcome is reported afterwards
    fn stop(&self);
}

pub struct PlaybackHandle {
    pub control: Box<dyn PlaybackControl>,
    /// Resolves when playback ends by itself; dropped without a value after `stop`
    pub finished: oneshot::Receiver<PlaybackOutcome>,
}

pub trait AudioOutput: Send + Sync {
    /// Begin playing `resource`; the resource must outlive the playback
    fn start(&self, resource: &AudioResource, muted: bool) -> Result<PlaybackHandle>;
}

/// Control shared by the built-in backends
pub(crate) struct FlagControl {
    pub(crate) muted: Arc<AtomicBool>,
    pub(crate) cancel: CancellationToken,
}

impl PlaybackControl for FlagControl {
    fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::SeqCst);
    }

    fn stop(&self) {
        self.cancel.cancel();
    }
}

/// Headless output: reports natural end once the clip's duration has elapsed
#[derive(Debug, Default)]
pub struct ClockOutput;

impl ClockOutput {
    pub fn new() -> Self {
        Self
    }
}

impl AudioOutput for ClockOutput {
    fn start(&self, resource: &AudioResource, muted: bool) -> Result<PlaybackHandle> {
        let duration = decode::clip_duration(resource.path())?;
        let cancel = CancellationToken::new();
        let (tx, rx) = oneshot::channel();

        debug!(id = %resource.id(), ?duration, "Clock playback started");

        let token = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(duration) => {
                    let _ = tx.send(PlaybackOutcome::Ended);
                }
            }
        });

        Ok(PlaybackHandle {
            control: Box::new(FlagControl {
                muted: Arc::new(AtomicBool::new(muted)),
                cancel,
            }),
            finished: rx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::decode::tests::wav_bytes;
    use crate::audio::resource::{ResourceStore, SpoolDir};
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_clock_output_ends_after_duration() {
        let dir = tempfile::tempdir().unwrap();
        let spool = SpoolDir::open(dir.path()).unwrap();
        let resource = spool.materialize(&wav_bytes(8000, 8000), "audio/wav").unwrap();

        let handle = ClockOutput::new().start(&resource, false).unwrap();
        let started = tokio::time::Instant::now();
        assert_eq!(handle.finished.await.unwrap(), PlaybackOutcome::Ended);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(1), "{:?}", elapsed);
        assert!(elapsed < Duration::from_millis(1010), "{:?}", elapsed);

        spool.release(resource);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clock_output_stop_reports_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let spool = SpoolDir::open(dir.path()).unwrap();
        let resource = spool.materialize(&wav_bytes(8000, 8000), "audio/wav").unwrap();

        let handle = ClockOutput::new().start(&resource, true).unwrap();
        handle.control.stop();
        assert!(handle.finished.await.is_err());

        spool.release(resource);
    }

    #[tokio::test]
    async fn test_clock_output_rejects_undecodable_clip() {
        let dir = tempfile::tempdir().unwrap();
        let spool = SpoolDir::open(dir.path()).unwrap();
        let resource = spool.materialize(b"noise", "audio/mpeg").unwrap();

        assert!(ClockOutput::new().start(&resource, false).is_err());
        spool.release(resource);
    }
}
