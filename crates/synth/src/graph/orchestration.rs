//! Container orchestration builder: cluster, capacity provider, and task.
//!
//! The capacity provider binds the pool to the cluster at 100% target
//! capacity with managed scaling disabled — the CPU-idle policy is the only
//! thing that resizes the pool, never the orchestrator. The task pins one
//! GPU, mounts a shared autoprovisioned network volume so model state
//! survives instance replacement, and probes its own status endpoint; the
//! orchestrator replaces the task once the retry budget is spent.

use serde_json::json;
use tracing::info;

use crate::error::Result;
use crate::graph::access::AccessBoundary;
use crate::graph::capacity::CapacityPool;
use crate::graph::{APP_PORT, CLUSTER_NAME, CONTAINER_NAME, HEALTH_PATH, IMAGE_REPOSITORY};
use crate::template::intrinsics::sub;
use crate::template::{DeletionPolicy, LogicalId, Template};

/// GPU units reserved for the container.
pub const GPU_COUNT: u32 = 1;

/// Memory reservation in MiB.
pub const MEMORY_RESERVATION_MIB: u32 = 30_720;

/// CPU shares reserved for the container.
pub const CPU_SHARES: u32 = 7_680;

/// Name of the task's persistent volume.
pub const VOLUME_NAME: &str = "nimbus-data";

/// Container path the persistent volume mounts at.
pub const DATA_PATH: &str = "/opt/app/data";

/// Size of the persistent volume in GiB.
pub const VOLUME_GIB: u32 = 250;

/// Typed handles to the orchestration tier.
#[derive(Debug, Clone)]
pub struct Orchestration {
    /// The cluster grouping the capacity pool.
    pub cluster: LogicalId,
    /// The capacity provider; its `Ref` is the provider name used by the
    /// service's strategy.
    pub capacity_provider: LogicalId,
    /// The task definition.
    pub task_definition: LogicalId,
    /// Log group receiving the container's stdout/stderr.
    pub log_group: LogicalId,
}

/// Build the orchestration tier on top of the capacity pool.
///
/// # Errors
///
/// Returns an error only on duplicate logical IDs.
pub fn build(
    template: &mut Template,
    pool: &CapacityPool,
    access: &AccessBoundary,
) -> Result<Orchestration> {
    info!(cluster = CLUSTER_NAME, "building orchestration cluster");

    let cluster = template.add(
        "Cluster",
        "AWS::ECS::Cluster",
        json!({
            "ClusterName": CLUSTER_NAME,
            "ClusterSettings": [{ "Name": "containerInsights", "Value": "enabled" }],
        }),
    )?;

    let capacity_provider = template.add(
        "PoolCapacityProvider",
        "AWS::ECS::CapacityProvider",
        json!({
            "AutoScalingGroupProvider": {
                "AutoScalingGroupArn": pool.auto_scaling_group.r#ref(),
                "ManagedScaling": { "Status": "DISABLED", "TargetCapacity": 100 },
                "ManagedTerminationProtection": "DISABLED",
            },
        }),
    )?;
    template.add(
        "ClusterCapacityProviderAssociations",
        "AWS::ECS::ClusterCapacityProviderAssociations",
        json!({
            "Cluster": cluster.r#ref(),
            "CapacityProviders": [capacity_provider.r#ref()],
            "DefaultCapacityProviderStrategy": [],
        }),
    )?;

    let log_group = template.add(
        "AppLogGroup",
        "AWS::Logs::LogGroup",
        json!({ "LogGroupName": format!("/ecs/{IMAGE_REPOSITORY}") }),
    )?;
    template.set_deletion_policy(&log_group, DeletionPolicy::Delete)?;

    let task_definition = template.add(
        "TaskDefinition",
        "AWS::ECS::TaskDefinition",
        json!({
            "Family": IMAGE_REPOSITORY,
            "NetworkMode": "awsvpc",
            "RequiresCompatibilities": ["EC2"],
            "TaskRoleArn": access.task_execution_role.get_att("Arn"),
            "ExecutionRoleArn": access.task_execution_role.get_att("Arn"),
            "Volumes": [{
                "Name": VOLUME_NAME,
                "DockerVolumeConfiguration": {
                    "Scope": "shared",
                    "Autoprovision": true,
                    "Driver": "rexray/ebs",
                    "DriverOptions": { "volumetype": "gp3", "size": VOLUME_GIB.to_string() },
                },
            }],
            "ContainerDefinitions": [container_definition(&log_group)],
        }),
    )?;

    Ok(Orchestration {
        cluster,
        capacity_provider,
        task_definition,
        log_group,
    })
}

fn container_definition(log_group: &LogicalId) -> serde_json::Value {
    json!({
        "Name": CONTAINER_NAME,
        "Image": sub(&format!(
            "${{AWS::AccountId}}.dkr.ecr.${{AWS::Region}}.amazonaws.com/{IMAGE_REPOSITORY}:latest"
        )),
        "Essential": true,
        "Cpu": CPU_SHARES,
        "MemoryReservation": MEMORY_RESERVATION_MIB,
        "ResourceRequirements": [{ "Type": "GPU", "Value": GPU_COUNT.to_string() }],
        "PortMappings": [{
            "Name": format!("{CONTAINER_NAME}-{APP_PORT}"),
            "ContainerPort": APP_PORT,
            "HostPort": APP_PORT,
            "Protocol": "tcp",
            "AppProtocol": "http",
        }],
        "MountPoints": [{
            "ContainerPath": DATA_PATH,
            "SourceVolume": VOLUME_NAME,
            "ReadOnly": false,
        }],
        "LogConfiguration": {
            "LogDriver": "awslogs",
            "Options": {
                "awslogs-group": log_group.r#ref(),
                "awslogs-region": sub("${AWS::Region}"),
                "awslogs-stream-prefix": IMAGE_REPOSITORY,
            },
        },
        "HealthCheck": {
            "Command": [
                "CMD-SHELL",
                format!("curl -f http://localhost:{APP_PORT}{HEALTH_PATH} || exit 1"),
            ],
            "Interval": 15,
            "Timeout": 10,
            "Retries": 8,
            "StartPeriod": 30,
        },
    })
}
