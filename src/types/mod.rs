//! Public types for the Portunus API.

mod message;
mod request;
mod response;

pub use message::{ChatMessage, Role};
pub use request::{GenerationInput, GenerationMethod, GenerationRequest};
pub use response::{BackendKind, Completion, GenerationResult, TokenCounts};
