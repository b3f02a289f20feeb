//! These models represent the objects passed between the dispatch loop, the
//! registry and the model service.
//!
//! Wire formats are converted to and from these structs at the provider
//! boundary (see `providers::utils`), so nothing outside `providers` needs to
//! know what the chat-completions JSON looks like.
pub mod content;
pub mod message;
pub mod objectid;
pub mod tool;
