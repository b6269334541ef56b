// ABOUTME: Compile-fail test verifying rollback cannot be called on Completed.
// ABOUTME: This test should fail to compile, validating state machine safety.

use stackroll::orchestrator::{Completed, Deployment};
use stackroll::rollback::{RollbackEngine, RollbackMode};

async fn try_invalid_rollback(deployment: Deployment<Completed>, engine: &RollbackEngine) {
    // ERROR: rollback() only exists on Deployment<Interrupted>
    let _ = deployment.rollback(engine, RollbackMode::Full).await;
}

fn main() {}
