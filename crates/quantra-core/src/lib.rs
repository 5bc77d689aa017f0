//! # Quantra Core
//!
//! Core types, traits, and error definitions for the Quantra backtest
//! orchestration service. This crate provides the foundational abstractions
//! used across all layers: the unified error type, typed identifiers, the
//! job/sweep/result domain entities, and validation helpers.

pub mod domain;
pub mod error;
pub mod id;
pub mod result;
pub mod validation;

pub use domain::*;
pub use error::*;
pub use id::*;
pub use result::*;
pub use validation::*;

// Re-export shaku for dependency injection
pub use shaku::{module, HasComponent, Interface};
