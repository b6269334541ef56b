// ABOUTME: Deployment types and the ordered phases each one runs.
// ABOUTME: spot, alb, cdn, and full deployments map to fixed phase sequences.

use nonempty::{NonEmpty, nonempty};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::resource_kind::Component;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid deployment type '{0}' (expected spot, alb, cdn, or full)")]
pub struct ParseDeploymentTypeError(pub String);

/// What kind of stack is being deployed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentType {
    /// Spot instance behind a plain VPC.
    Spot,
    /// Instance fronted by an application load balancer.
    Alb,
    /// CDN distribution only.
    Cdn,
    /// Everything: network, load balancer, compute, CDN.
    Full,
}

impl DeploymentType {
    pub const ALL: [DeploymentType; 4] = [
        DeploymentType::Spot,
        DeploymentType::Alb,
        DeploymentType::Cdn,
        DeploymentType::Full,
    ];

    /// Phases in execution order.
    pub fn phases(&self) -> NonEmpty<Phase> {
        match self {
            DeploymentType::Spot => nonempty![Phase::Infrastructure, Phase::Compute],
            DeploymentType::Alb => nonempty![Phase::Infrastructure, Phase::Alb, Phase::Compute],
            DeploymentType::Cdn => nonempty![Phase::Cdn],
            DeploymentType::Full => nonempty![
                Phase::Infrastructure,
                Phase::Alb,
                Phase::Compute,
                Phase::Cdn
            ],
        }
    }

    /// Whether compute runs on spot capacity.
    pub fn uses_spot(&self) -> bool {
        matches!(self, DeploymentType::Spot)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentType::Spot => "spot",
            DeploymentType::Alb => "alb",
            DeploymentType::Cdn => "cdn",
            DeploymentType::Full => "full",
        }
    }
}

impl fmt::Display for DeploymentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeploymentType {
    type Err = ParseDeploymentTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "spot" => Ok(DeploymentType::Spot),
            "alb" => Ok(DeploymentType::Alb),
            "cdn" => Ok(DeploymentType::Cdn),
            "full" => Ok(DeploymentType::Full),
            _ => Err(ParseDeploymentTypeError(s.to_string())),
        }
    }
}

/// An ordered provisioning stage within a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Infrastructure,
    Alb,
    Compute,
    Cdn,
}

impl Phase {
    /// Components provisioned by this phase, in creation order.
    pub fn components(&self) -> &'static [Component] {
        match self {
            Phase::Infrastructure => &[
                Component::Vpc,
                Component::SecurityGroups,
                Component::Iam,
                Component::Efs,
            ],
            Phase::Alb => &[Component::LoadBalancer],
            Phase::Compute => &[Component::Instances],
            Phase::Cdn => &[Component::Cdn],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Infrastructure => "infrastructure",
            Phase::Alb => "alb",
            Phase::Compute => "compute",
            Phase::Cdn => "cdn",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "infrastructure" => Ok(Phase::Infrastructure),
            "alb" => Ok(Phase::Alb),
            "compute" => Ok(Phase::Compute),
            "cdn" => Ok(Phase::Cdn),
            other => Err(format!("unknown phase: {other}")),
        }
    }
}
