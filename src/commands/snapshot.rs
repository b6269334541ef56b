// ABOUTME: Snapshot management commands.
// ABOUTME: Create, list, restore, and sweep snapshots of the state document.

use super::context::{open_store, stack_name};
use stackroll::config::Config;
use stackroll::error::Result;
use stackroll::output::Output;
use stackroll::state::SnapshotKind;
use stackroll::types::{SnapshotId, StackName};

fn optional_stack(raw: Option<&str>) -> Result<Option<StackName>> {
    raw.map(stack_name).transpose()
}

pub async fn snapshot_create(config: Config, stack: Option<&str>, output: Output) -> Result<()> {
    let stack = optional_stack(stack)?;
    let store = open_store(&config).await?;
    let id = store.snapshot(stack.as_ref(), SnapshotKind::Backup).await?;
    output.success(&format!("Created snapshot {id}"));
    Ok(())
}

pub async fn snapshot_list(config: Config, stack: Option<&str>, output: Output) -> Result<()> {
    let stack = optional_stack(stack)?;
    let store = open_store(&config).await?;
    let snapshots = store.snapshots().list(stack.as_ref()).await?;

    output.document(&snapshots);
    for snapshot in &snapshots {
        let scope = snapshot
            .stack
            .as_ref()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "*".to_string());
        output.progress(&format!(
            "{}  {:<14} {:<20} {}",
            snapshot.created.format("%Y-%m-%d %H:%M:%S"),
            snapshot.kind.to_string(),
            scope,
            snapshot.id
        ));
    }
    output.success(&format!("{} snapshot(s)", snapshots.len()));
    Ok(())
}

pub async fn snapshot_restore(
    config: Config,
    id: &str,
    stack: Option<&str>,
    output: Output,
) -> Result<()> {
    let stack = optional_stack(stack)?;
    let store = open_store(&config).await?;
    let id = SnapshotId::new(id);
    store.restore(&id, stack.as_ref()).await?;
    output.success(&format!("Restored snapshot {id}"));
    Ok(())
}

pub async fn snapshot_cleanup(config: Config, days: Option<u32>, output: Output) -> Result<()> {
    let days = days.unwrap_or(config.snapshots.retention_days);
    let store = open_store(&config).await?;
    let removed = store.snapshots().cleanup(days).await?;
    output.success(&format!("Removed {removed} snapshot(s) older than {days} day(s)"));
    Ok(())
}
