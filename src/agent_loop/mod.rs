//! Turn loop primitives (runs, pauses, policies, executors, events).

pub mod approvals;
pub mod codec;
pub mod continuation;
pub mod events;
pub mod executor;
pub mod runner;
pub mod trace;
pub mod types;

pub use approvals::*;
pub use codec::*;
pub use continuation::*;
pub use events::*;
pub use executor::*;
pub use runner::*;
pub use trace::*;
pub use types::*;
