// ABOUTME: Library root for stackroll - deployment orchestration with compensating rollback.
// ABOUTME: The main binary is in main.rs.

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod lock;
pub mod orchestrator;
pub mod output;
pub mod provider;
pub mod registry;
pub mod rollback;
pub mod state;
pub mod trigger;
pub mod types;
