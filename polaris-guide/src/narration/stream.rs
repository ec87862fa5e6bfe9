//! Consumption of a streamed chat answer

use super::session::SessionInner;
use crate::services::{ChatFragment, ChatRequest};
use futures::StreamExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Feed a chat answer into entry `index`
///
/// Fragments are appended in arrival order. On completion the accumulated
/// answer is spoken; on failure the entry is replaced with the configured
/// error text. Cancellation keeps the partial answer without audio.
pub(crate) async fn run(
    session: Arc<SessionInner>,
    generation: u64,
    cancel: CancellationToken,
    index: usize,
    request: ChatRequest,
) {
    let subject = request.subject_name.clone();

    let opened = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            debug!(generation, "Answer canceled before the stream opened");
            return;
        }
        result = session.chat.open_stream(request) => result,
    };

    let mut stream = match opened {
        Ok(stream) => stream,
        Err(e) => {
            session.fail_answer(generation, index, &e);
            return;
        }
    };

    let mut answer = String::new();
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(generation, chars = answer.len(), "Answer canceled mid-stream");
                return;
            }
            next = stream.next() => next,
        };

        match next {
            Some(Ok(ChatFragment::Delta(delta))) => {
                if delta.is_empty() {
                    continue;
                }
                if !session.append_delta(generation, index, &delta) {
                    debug!(generation, "Answer superseded");
                    return;
                }
                answer.push_str(&delta);
            }
            Some(Ok(ChatFragment::Done)) | None => break,
            Some(Err(e)) => {
                session.fail_answer(generation, index, &e);
                return;
            }
        }
    }

    // An empty answer finishes without audio
    if session.complete(generation, Some(&answer)) {
        info!(landmark = %subject, chars = answer.len(), "Answer complete");
    }
}
