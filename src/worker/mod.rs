//! Reference processor implementations.
//!
//! [`ShellProcessor`] runs a job's command through `sh -c`, capturing
//! stdout/stderr. A non-zero exit status or a spawn failure becomes a
//! `Failed` outcome via [`DispatchError::Execution`](crate::error::DispatchError).
//!
//! Commands run unsandboxed with the privileges of the host process.

pub mod executor;

pub use executor::{ExecutionResult, ShellProcessor};
