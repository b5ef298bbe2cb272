//! Underwriting decision engine for leasing applications.
//!
//! The engine derives affordability ratios from raw case input, classifies delinquency history,
//! applies a configurable rule table to produce a recommendation, and cross-references cases for
//! duplicates. Everything lives under [`workflows::underwriting`]; the remaining modules carry the
//! configuration, logging, and error plumbing shared with the service binary.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
