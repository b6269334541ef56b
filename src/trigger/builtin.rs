// ABOUTME: The built-in rollback triggers and their priorities.
// ABOUTME: Each predicate reads only signals external monitors write into the store.

use super::{Predicate, TriggerContext};
use crate::state;
use std::sync::Arc;

pub const USER_ABORT: &str = "user_abort";
pub const HEALTH_FAILURE: &str = "health_failure";
pub const DEPLOYMENT_TIMEOUT: &str = "deployment_timeout";
pub const RESOURCE_QUOTA: &str = "resource_quota";
pub const COST_THRESHOLD: &str = "cost_threshold";
pub const VALIDATION_FAILURE: &str = "validation_failure";

pub(super) fn definitions() -> Vec<(&'static str, u32, Predicate)> {
    vec![
        (USER_ABORT, 5, Arc::new(user_abort) as Predicate),
        (HEALTH_FAILURE, 10, Arc::new(health_failure) as Predicate),
        (DEPLOYMENT_TIMEOUT, 20, Arc::new(deployment_timeout) as Predicate),
        (RESOURCE_QUOTA, 30, Arc::new(resource_quota) as Predicate),
        (COST_THRESHOLD, 40, Arc::new(cost_threshold) as Predicate),
        (VALIDATION_FAILURE, 50, Arc::new(validation_failure) as Predicate),
    ]
}

fn user_abort(ctx: &TriggerContext) -> bool {
    ctx.flag(state::USER_ABORT)
}

fn health_failure(ctx: &TriggerContext) -> bool {
    matches!(
        ctx.str(state::HEALTH_STATUS),
        Some("UNHEALTHY") | Some("CRITICAL")
    )
}

/// Elapsed time since `DEPLOYMENT_START_TIME` exceeds `DEPLOYMENT_TIMEOUT`.
/// A deployment without a recorded start time cannot time out.
fn deployment_timeout(ctx: &TriggerContext) -> bool {
    let Some(started) = ctx.i64(state::DEPLOYMENT_START_TIME) else {
        return false;
    };
    let timeout = ctx
        .i64(state::DEPLOYMENT_TIMEOUT)
        .unwrap_or(state::DEFAULT_DEPLOYMENT_TIMEOUT_SECS);
    ctx.now.timestamp() - started > timeout
}

fn resource_quota(ctx: &TriggerContext) -> bool {
    ctx.str(state::QUOTA_STATUS) == Some("EXCEEDED")
}

/// Only fires when a cost limit has actually been set.
fn cost_threshold(ctx: &TriggerContext) -> bool {
    match (ctx.f64(state::DEPLOYMENT_COST), ctx.f64(state::COST_LIMIT)) {
        (Some(cost), Some(limit)) => cost > limit,
        _ => false,
    }
}

fn validation_failure(ctx: &TriggerContext) -> bool {
    ctx.str(state::VALIDATION_STATUS) == Some("FAILED")
}
