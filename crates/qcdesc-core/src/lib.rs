//! # qcdesc Core Library
//!
//! A library for computing molecule-level quantum-chemical descriptors from
//! conformer ensembles: each conformer is run through an external QM engine,
//! the per-conformer results are combined with Boltzmann population weights
//! derived from relative conformer energies, and spectroscopic descriptors
//! can be recalibrated against experimental scales.
//!
//! ## Architectural Philosophy
//!
//! The library is designed with a strict three-layer architecture to ensure
//! a clear separation of concerns, making it modular, testable, and
//! extensible.
//!
//! - **[`core`]: The Foundation.** Contains stateless data models
//!   (ensembles, descriptor records), pure statistics (Boltzmann weighting,
//!   weighted aggregation), calibration math, and I/O utilities.
//!
//! - **[`engine`]: The Logic Core.** This stateful layer drives the external
//!   QM engine with a bounded worker pool, classifies per-conformer
//!   failures, and tracks batch lifecycle state.
//!
//! - **[`workflows`]: The Public API.** The highest-level, user-facing
//!   layer. It ties the `engine` and `core` together to execute the complete
//!   descriptor pipeline with progress reporting and an itemized failure
//!   manifest.

pub mod core;
pub mod engine;
pub mod workflows;
