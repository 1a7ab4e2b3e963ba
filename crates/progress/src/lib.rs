//! Generation-progress polling client.
//!
//! Polls the backend progress endpoint for one job at a time per
//! session, renders progress and live previews into caller-supplied
//! sinks, retries transient failures with bounded backoff and ends the
//! session once the job is done, abandoned or unreachable.

pub mod api;
pub mod config;
pub mod outcome;
pub mod poller;
pub mod render;
pub mod retry;
pub mod sink;
pub mod snapshot;
pub mod source;
