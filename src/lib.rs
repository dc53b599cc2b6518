//! paiprog: a pair-programming assistant client for the OpenAI Assistants API.
//!
//! A turn posts the user's message to a thread, starts a run and reconciles
//! its state until it settles. Tool calls requested by the run are executed
//! locally through the [`tools::ToolRegistry`] and their outputs submitted
//! back. Progress is exposed as a stream of [`run::TurnEvent`]s.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use futures::StreamExt;
//! use paiprog::openai::OpenAiClient;
//! use paiprog::run::{DriverContext, RunDriver, StreamingTransport};
//! use paiprog::tools::{builtin, ToolRegistry};
//!
//! # async fn example() -> paiprog::error::Result<()> {
//! let client = OpenAiClient::new("sk-...", None);
//! let thread = client.create_thread().await?;
//! let driver = RunDriver::new(DriverContext {
//!     transport: Arc::new(StreamingTransport::new(client)),
//!     thread_id: thread.id,
//!     assistant_id: "asst_...".to_string(),
//!     registry: Arc::new(ToolRegistry::new(builtin::all_tools())?),
//! });
//!
//! let mut turn = driver.send_message("List the files in this repo")?;
//! while let Some(event) = turn.next().await {
//!     println!("{:?}", event?.event);
//! }
//! # Ok(())
//! # }
//! ```

pub mod assistant;
pub mod config;
pub mod error;
pub mod openai;
pub mod run;
pub mod tools;
pub mod util;

#[cfg(feature = "cli")]
pub mod cli;
