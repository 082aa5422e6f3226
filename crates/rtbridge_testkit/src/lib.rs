//! # rtbridge Testkit
//!
//! Test utilities for rtbridge.
//!
//! This crate provides:
//! - `MemoryDatabase`, an in-memory realtime database that implements both
//!   the admin and the client SDK shapes
//! - Property-based generators for paths and constraint sets

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod generators;
mod memory;
mod ordering;

pub use memory::MemoryDatabase;
