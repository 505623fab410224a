//! Shared lookup tables and helpers used across the core layer.

pub mod elements;
