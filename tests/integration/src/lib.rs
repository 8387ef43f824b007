//! Integration test utilities for the chat client
//!
//! This crate provides an in-process fake gateway server, REST mock helpers
//! and a sample cached entity for end-to-end tests.

pub mod fixtures;
pub mod helpers;

pub use fixtures::*;
pub use helpers::*;
