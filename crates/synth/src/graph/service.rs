//! Managed service builder.
//!
//! A desired-state reconciler keeping exactly one task running on the
//! cluster and registered behind the routing layer. Minimum healthy percent
//! is 0: with a single expensive machine there is no headroom for a second
//! task during deployments, so the service is allowed to go briefly dark
//! rather than double the fleet.

use serde_json::json;
use tracing::info;

use crate::error::Result;
use crate::graph::access::AccessBoundary;
use crate::graph::network::Network;
use crate::graph::orchestration::Orchestration;
use crate::graph::routing::Routing;
use crate::graph::{APP_PORT, CONTAINER_NAME};
use crate::template::{LogicalId, Template};

/// Number of task copies the service keeps running.
pub const DESIRED_COUNT: u32 = 1;

/// Seconds the orchestrator ignores health checks after task start.
pub const HEALTH_CHECK_GRACE_SECONDS: u32 = 30;

/// Typed handle to the service tier.
#[derive(Debug, Clone)]
pub struct Service {
    /// The reconciling service.
    pub service: LogicalId,
}

/// Build the service tier.
///
/// # Errors
///
/// Returns an error only on duplicate logical IDs.
pub fn build(
    template: &mut Template,
    network: &Network,
    access: &AccessBoundary,
    orchestration: &Orchestration,
    routing: &Routing,
) -> Result<Service> {
    info!(desired = DESIRED_COUNT, "building managed service");

    let private_subnet_refs: Vec<_> = network.private_subnets.iter().map(LogicalId::r#ref).collect();
    let service = template.add(
        "AppService",
        "AWS::ECS::Service",
        json!({
            "ServiceName": "nimbus-app",
            "Cluster": orchestration.cluster.r#ref(),
            "TaskDefinition": orchestration.task_definition.r#ref(),
            "DesiredCount": DESIRED_COUNT,
            "CapacityProviderStrategy": [{
                "CapacityProvider": orchestration.capacity_provider.r#ref(),
                "Weight": 1,
            }],
            "DeploymentConfiguration": { "MinimumHealthyPercent": 0 },
            "HealthCheckGracePeriodSeconds": HEALTH_CHECK_GRACE_SECONDS,
            "NetworkConfiguration": {
                "AwsvpcConfiguration": {
                    "Subnets": private_subnet_refs,
                    "SecurityGroups": [access.service_security_group.get_att("GroupId")],
                },
            },
            "LoadBalancers": [{
                "ContainerName": CONTAINER_NAME,
                "ContainerPort": APP_PORT,
                "TargetGroupArn": routing.target_group.r#ref(),
            }],
        }),
    )?;
    // Targets cannot register until the listener exists.
    template.add_depends_on(&service, std::slice::from_ref(&routing.listener))?;

    Ok(Service { service })
}
