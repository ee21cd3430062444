pub mod attachment;
pub mod mention;
pub mod openai;
pub mod pipeline;
pub mod prompt;
pub mod provider;
pub mod segment;
pub mod stream;
pub mod transcript;

pub use provider::{ChatRequest, LlmProvider, Message, ProviderError, Role};
pub use segment::{Segment, StreamSegmenter};
