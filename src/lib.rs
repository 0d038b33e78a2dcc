//! Metascope - container and codec metadata straight from file bytes
//!
//! This library crate exposes the front-end pieces for integration testing.

pub mod config;
pub mod render;
