// ABOUTME: Compile-fail test verifying snapshot ids cannot stand in for resource ids.
// ABOUTME: This test should fail to compile, validating phantom type safety.

use stackroll::types::{ResourceId, SnapshotId};

fn deprovision(_id: &ResourceId) {}

fn main() {
    let snapshot = SnapshotId::new("web-prod_pre_rollback_20260101T000000Z");
    // ERROR: expected ResourceId, found SnapshotId
    deprovision(&snapshot);
}
