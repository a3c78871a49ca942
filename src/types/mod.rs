//! Core value types shared by every Turnstile component.

pub mod message;
pub mod stream;
pub mod timestamp;
pub mod usage;

pub use message::*;
pub use stream::*;
pub use usage::*;
