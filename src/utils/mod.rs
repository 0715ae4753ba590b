//! The `utils` module provides a collection of utility functions and common
//! definitions used across the `membus` crate.
//!
//! This module aims to centralize reusable components, such as logging setup,
//! to promote code consistency and reduce duplication.

pub mod logging;
