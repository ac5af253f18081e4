//! Native adapters implementing the `notebook-core` port traits.
//!
//! - [`acp`]: the agent backend, one `<cli> acp` child process per session
//! - [`workspace`]: document listing and text extraction under the workspace root
//! - [`history`]: saved transcripts, on disk or in memory

pub mod acp;
pub mod history;
pub mod workspace;

#[cfg(test)]
mod tests;
