//! Tasks are the computational stages of the descriptor workflow.
//!
//! Each submodule implements one stage as a standalone `run` function so the
//! workflow layer stays a thin sequencing of tasks. The engine fan-out is
//! the only concurrent stage; everything downstream of it is pure.

pub mod run_jobs;
