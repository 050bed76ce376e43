//! Integration tests for privstash
//!
//! These tests exercise multiple components together: codec against the
//! in-memory engines, the repository merge path, the restore coordinator,
//! and backup import/export.

#[path = "../common/mod.rs"]
pub mod common;

pub mod backup_flow;
pub mod restore_flow;
pub mod roundtrip;
pub mod size_limits;
