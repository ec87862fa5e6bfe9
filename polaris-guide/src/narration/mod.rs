//! Narration of the open landmark
//!
//! One session at a time owns the "currently narrated" landmark. Transcript
//! text comes either from the reveal driver (scripted text on a timer) or from
//! the stream consumer (a chat answer as it arrives); the two never run at
//! once, and both are cancelled through the session's token.

mod reveal;
pub mod session;
mod stream;
pub mod transcript;

pub use session::{Dispatch, NarrationSession, NarrationSettings, OpenOutcome, SessionSnapshot};
pub use transcript::Conversation;
