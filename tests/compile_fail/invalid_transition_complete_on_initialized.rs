// ABOUTME: Compile-fail test verifying a deployment cannot complete before provisioning.
// ABOUTME: This test should fail to compile, validating state machine safety.

use stackroll::orchestrator::{Deployment, Initialized, Orchestrator};

async fn try_skip_phases(deployment: Deployment<Initialized>, ctx: &Orchestrator) {
    // ERROR: complete() only exists on Deployment<Provisioned>
    let _ = deployment.complete(ctx).await;
}

fn main() {}
