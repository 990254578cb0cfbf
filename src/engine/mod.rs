//! Work execution: the worker decorator, command-backed components and
//! the dispatch loop.

pub mod command;
pub mod control;
pub mod worker;

pub use command::CommandComponent;
pub use control::{DispatchConfig, Dispatcher, RunState, WorkerControl};
pub use worker::{Persistence, WorkReport, Worker};
