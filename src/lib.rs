//! # itemflow
//!
//! Event-log consistency and trigger matching for multi-step digitization
//! workflows.
//!
//! Each item carries an append-mostly log of step events in an authoritative
//! repository. Writers rewrite that log under optimistic compare-and-swap
//! ([`eventlog`]); schedulers find items ready for their step through a
//! lagging search index, re-checked against the repository ([`trigger`]);
//! workers wrap components so every run leaves exactly one event
//! ([`engine`]).

pub mod client;
pub mod component;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod eventlog;
pub mod index;
pub mod model;
pub mod repository;
pub mod telemetry;
pub mod trigger;

pub use client::{ClientSettings, EventClient, EventRecord};
pub use error::{Error, Result};
