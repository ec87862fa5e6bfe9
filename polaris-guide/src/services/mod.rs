//! External service clients
//!
//! Chat completion and speech synthesis sit behind traits so the narration
//! core can be driven by fakes in tests.

pub mod chat;
pub mod speech;
pub mod speech_cache;

pub use chat::{ChatFragment, ChatRequest, ChatService, ChatStream, OpenAiChat};
pub use speech::{OpenAiSpeech, SpeechClip, SpeechService};
pub use speech_cache::CachedSpeech;
