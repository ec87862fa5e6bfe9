//! Character-by-character reveal of scripted text

use super::session::SessionInner;
use std::sync::Arc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Append `text` to entry `index` one character per tick
///
/// Stops silently when `cancel` fires or the session moves past
/// `generation`; whatever was revealed so far stays in the transcript.
pub(crate) async fn run(
    session: Arc<SessionInner>,
    generation: u64,
    cancel: CancellationToken,
    index: usize,
    text: String,
    start: Instant,
) {
    let mut ticker = interval_at(start, session.settings.reveal_tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut buf = [0u8; 4];
    for ch in text.chars() {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(generation, "Reveal canceled");
                return;
            }
            _ = ticker.tick() => {}
        }

        if !session.append_delta(generation, index, ch.encode_utf8(&mut buf)) {
            debug!(generation, "Reveal superseded");
            return;
        }
    }

    session.complete(generation, None);
}
