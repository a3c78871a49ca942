//! Turnstile: a resumable, tool-calling turn loop for LLM runs.
//!
//! A [`Runner`](agent_loop::Runner) alternates model calls with tool calls
//! until the model answers, a turn budget runs out, or the run has to wait
//! on something outside the process. Waiting runs come back as a
//! [`Continuation`](agent_loop::Continuation) that can be persisted with the
//! [`ContinuationCodec`](agent_loop::ContinuationCodec) and resumed later.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use turnstile::prelude::*;
//!
//! # async fn example(provider: Arc<dyn Provider>) -> turnstile::error::Result<()> {
//! let tools = ToolSet::new().with_tool(Arc::new(AgentTool::new(
//!     "clock",
//!     "Current UTC time",
//!     AgentToolParameters::empty(),
//!     |_args, _ctx| async { Ok(ToolResult::text(chrono::Utc::now().to_rfc3339())) },
//! )));
//! let runner = Runner::new(provider, Arc::new(tools));
//! let outcome = runner
//!     .run(RunRequest::new("my-model", vec![Message::user("What time is it?")]))
//!     .await?;
//! if let RunOutcome::Completed(result) = outcome {
//!     println!("{}", result.final_message.text());
//! }
//! # Ok(())
//! # }
//! ```

pub mod agent_loop;
pub mod config;
pub mod error;
pub mod instrument;
pub mod prelude;
pub mod provider;
pub mod tools;
pub mod types;
