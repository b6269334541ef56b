// ABOUTME: Catalog of provider resource kinds and the components grouping them.
// ABOUTME: Declaration order of ResourceKind is teardown order, deepest dependency first.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown resource kind: {0}")]
pub struct ParseResourceKindError(pub String);

/// Every kind of resource a stack can own.
///
/// Variants are declared in teardown order, so sorting kinds ascending yields
/// a safe deletion sequence: CDN before the load balancer it fronts, mount
/// targets before their file system, NAT gateways before the subnets hosting
/// them, the VPC last.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Cloudfront,
    Alb,
    TargetGroup,
    EfsMountTarget,
    Efs,
    Ec2Instance,
    IamRole,
    SecurityGroup,
    NatGateway,
    Subnet,
    InternetGateway,
    Vpc,
}

/// How a deletion is confirmed after the provider accepts it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settle {
    /// Deletion is synchronous on the provider side.
    Immediate,
    /// Poll `describe` until the resource reports gone.
    AwaitGone,
}

impl ResourceKind {
    pub const TEARDOWN_ORDER: [ResourceKind; 12] = [
        ResourceKind::Cloudfront,
        ResourceKind::Alb,
        ResourceKind::TargetGroup,
        ResourceKind::EfsMountTarget,
        ResourceKind::Efs,
        ResourceKind::Ec2Instance,
        ResourceKind::IamRole,
        ResourceKind::SecurityGroup,
        ResourceKind::NatGateway,
        ResourceKind::Subnet,
        ResourceKind::InternetGateway,
        ResourceKind::Vpc,
    ];

    /// Kinds that legitimately hold several ids per stack.
    pub fn is_multi_valued(&self) -> bool {
        matches!(
            self,
            ResourceKind::Subnet | ResourceKind::NatGateway | ResourceKind::EfsMountTarget
        )
    }

    /// How deletion of this kind settles.
    pub fn settle(&self) -> Settle {
        match self {
            ResourceKind::Cloudfront
            | ResourceKind::Alb
            | ResourceKind::EfsMountTarget
            | ResourceKind::Ec2Instance
            | ResourceKind::NatGateway => Settle::AwaitGone,
            ResourceKind::TargetGroup
            | ResourceKind::Efs
            | ResourceKind::IamRole
            | ResourceKind::SecurityGroup
            | ResourceKind::Subnet
            | ResourceKind::InternetGateway
            | ResourceKind::Vpc => Settle::Immediate,
        }
    }

    /// The component this kind belongs to.
    pub fn component(&self) -> Component {
        match self {
            ResourceKind::Vpc
            | ResourceKind::Subnet
            | ResourceKind::InternetGateway
            | ResourceKind::NatGateway => Component::Vpc,
            ResourceKind::SecurityGroup => Component::SecurityGroups,
            ResourceKind::IamRole => Component::Iam,
            ResourceKind::Efs | ResourceKind::EfsMountTarget => Component::Efs,
            ResourceKind::Ec2Instance => Component::Instances,
            ResourceKind::Alb | ResourceKind::TargetGroup => Component::LoadBalancer,
            ResourceKind::Cloudfront => Component::Cdn,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Cloudfront => "cloudfront",
            ResourceKind::Alb => "alb",
            ResourceKind::TargetGroup => "target_group",
            ResourceKind::EfsMountTarget => "efs_mount_target",
            ResourceKind::Efs => "efs",
            ResourceKind::Ec2Instance => "ec2_instance",
            ResourceKind::IamRole => "iam_role",
            ResourceKind::SecurityGroup => "security_group",
            ResourceKind::NatGateway => "nat_gateway",
            ResourceKind::Subnet => "subnet",
            ResourceKind::InternetGateway => "internet_gateway",
            ResourceKind::Vpc => "vpc",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = ParseResourceKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceKind::TEARDOWN_ORDER
            .into_iter()
            .find(|kind| kind.as_str() == s.trim())
            .ok_or_else(|| ParseResourceKindError(s.to_string()))
    }
}

/// A named group of resource kinds, the unit of partial and incremental rollback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    Vpc,
    SecurityGroups,
    Iam,
    Efs,
    Instances,
    LoadBalancer,
    Cdn,
}

impl Component {
    /// Resource kinds owned by this component, in teardown order.
    pub fn kinds(&self) -> Vec<ResourceKind> {
        ResourceKind::TEARDOWN_ORDER
            .into_iter()
            .filter(|kind| kind.component() == *self)
            .collect()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Component::Vpc => "vpc",
            Component::SecurityGroups => "security_groups",
            Component::Iam => "iam",
            Component::Efs => "efs",
            Component::Instances => "instances",
            Component::LoadBalancer => "alb",
            Component::Cdn => "cloudfront",
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Component {
    type Err = ParseResourceKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "vpc" | "network" => Ok(Component::Vpc),
            "security_groups" | "security_group" => Ok(Component::SecurityGroups),
            "iam" | "iam_role" => Ok(Component::Iam),
            "efs" => Ok(Component::Efs),
            "instances" | "instance" | "ec2" | "compute" => Ok(Component::Instances),
            "alb" | "load_balancer" => Ok(Component::LoadBalancer),
            "cloudfront" | "cdn" => Ok(Component::Cdn),
            _ => Err(ParseResourceKindError(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn teardown_order_matches_declaration_order() {
        let mut sorted = ResourceKind::TEARDOWN_ORDER.to_vec();
        sorted.sort();
        assert_eq!(sorted, ResourceKind::TEARDOWN_ORDER.to_vec());
        assert_eq!(ResourceKind::TEARDOWN_ORDER[0], ResourceKind::Cloudfront);
        assert_eq!(ResourceKind::TEARDOWN_ORDER[11], ResourceKind::Vpc);
    }

    #[test]
    fn kind_names_round_trip() {
        for kind in ResourceKind::TEARDOWN_ORDER {
            assert_eq!(kind.as_str().parse::<ResourceKind>(), Ok(kind));
        }
    }

    #[test]
    fn every_kind_belongs_to_its_component() {
        for kind in ResourceKind::TEARDOWN_ORDER {
            assert!(kind.component().kinds().contains(&kind));
        }
    }

    #[test]
    fn vpc_component_tears_down_gateways_before_vpc() {
        assert_eq!(
            Component::Vpc.kinds(),
            vec![
                ResourceKind::NatGateway,
                ResourceKind::Subnet,
                ResourceKind::InternetGateway,
                ResourceKind::Vpc,
            ]
        );
    }

    #[test]
    fn component_aliases_parse() {
        assert_eq!("security_groups".parse(), Ok(Component::SecurityGroups));
        assert_eq!("cdn".parse(), Ok(Component::Cdn));
        assert!("database".parse::<Component>().is_err());
    }
}
