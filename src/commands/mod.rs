// ABOUTME: Command module aggregator for the stackroll CLI.
// ABOUTME: Re-exports the deploy, rollback, stack, and snapshot command handlers.

mod context;
mod deploy;
mod rollback;
mod snapshot;
mod stack;

pub use deploy::deploy;
pub use rollback::rollback;
pub use snapshot::{snapshot_cleanup, snapshot_create, snapshot_list, snapshot_restore};
pub use stack::{abort, signal, status};
