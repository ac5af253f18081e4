//! Session / context / streaming core of the document notebook.
//!
//! Everything here is platform-free: backends are reached through the
//! traits in [`ports`], and state lives in one owned container
//! ([`store::NotebookState`]) shared by the lifecycle manager and the
//! prompt runner.

pub mod context;
pub mod event_bus;
pub mod lifecycle;
pub mod persistence;
pub mod ports;
pub mod runner;
pub mod store;
