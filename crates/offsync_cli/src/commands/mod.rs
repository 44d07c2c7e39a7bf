//! CLI command implementations.

pub mod clear;
pub mod inspect;
pub mod resolve;
