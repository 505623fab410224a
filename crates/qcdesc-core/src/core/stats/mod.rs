//! Statistical combination of per-conformer results.
//!
//! This module holds the pure numerical pieces of the pipeline: Boltzmann
//! population weights derived from relative conformer energies, and the
//! weighted aggregation of heterogeneous descriptor values into a single
//! representative record per molecule.

pub mod aggregate;
pub mod boltzmann;
