//! Core type definitions used across the bridge workspace.

pub mod id;

pub use id::*;
