//! Access boundary builder.
//!
//! Three network-ingress rule sets and two execution identities. The load
//! balancer is the only thing reachable from the internet; the service
//! accepts the application port solely from the load balancer's group, and
//! the compute pool accepts nothing inbound at all.

use serde_json::json;
use tracing::info;

use crate::error::Result;
use crate::graph::{network::Network, APP_PORT, LISTENER_PORT};
use crate::template::intrinsics::sub;
use crate::template::{LogicalId, Template};

/// Typed handles to the access tier.
#[derive(Debug, Clone)]
pub struct AccessBoundary {
    /// Ingress rules for the public entry point.
    pub alb_security_group: LogicalId,
    /// Ingress rules for the compute pool (none inbound).
    pub pool_security_group: LogicalId,
    /// Ingress rules for the managed service.
    pub service_security_group: LogicalId,
    /// Identity assumed by pool instances.
    pub instance_role: LogicalId,
    /// Instance profile wrapping the instance role.
    pub instance_profile: LogicalId,
    /// Identity assumed by the orchestration service for the task.
    pub task_execution_role: LogicalId,
}

/// Build the access tier.
///
/// The instance role carries intentionally broad infrastructure
/// self-management permissions; the suppression post-pass documents this as
/// an accepted tradeoff rather than tightening it here.
///
/// # Errors
///
/// Returns an error only on duplicate logical IDs.
pub fn build(template: &mut Template, network: &Network) -> Result<AccessBoundary> {
    info!("building access boundary");

    let alb_security_group = template.add(
        "AlbSecurityGroup",
        "AWS::EC2::SecurityGroup",
        json!({
            "GroupDescription": "Security group for the public load balancer",
            "VpcId": network.vpc.r#ref(),
            "SecurityGroupIngress": [{
                "CidrIp": "0.0.0.0/0",
                "IpProtocol": "tcp",
                "FromPort": LISTENER_PORT,
                "ToPort": LISTENER_PORT,
                "Description": format!("Allow inbound traffic on port {LISTENER_PORT}"),
            }],
            "SecurityGroupEgress": [all_egress()],
        }),
    )?;

    let pool_security_group = template.add(
        "PoolSecurityGroup",
        "AWS::EC2::SecurityGroup",
        json!({
            "GroupDescription": "Security group for the GPU capacity pool",
            "VpcId": network.vpc.r#ref(),
            "SecurityGroupEgress": [all_egress()],
        }),
    )?;

    let service_security_group = template.add(
        "ServiceSecurityGroup",
        "AWS::EC2::SecurityGroup",
        json!({
            "GroupDescription": "Security group for the container service",
            "VpcId": network.vpc.r#ref(),
            "SecurityGroupIngress": [{
                "SourceSecurityGroupId": alb_security_group.get_att("GroupId"),
                "IpProtocol": "tcp",
                "FromPort": APP_PORT,
                "ToPort": APP_PORT,
                "Description": format!("Allow inbound traffic on port {APP_PORT} from the load balancer"),
            }],
            "SecurityGroupEgress": [all_egress()],
        }),
    )?;

    let instance_role = template.add(
        "InstanceRole",
        "AWS::IAM::Role",
        json!({
            "AssumeRolePolicyDocument": assume_role_document("ec2.amazonaws.com"),
            "ManagedPolicyArns": [
                // Pool instances self-manage volumes via the rexray plugin.
                managed_policy("AmazonEC2FullAccess"),
                managed_policy("AmazonSSMManagedEC2InstanceDefaultPolicy"),
            ],
        }),
    )?;
    let instance_profile = template.add(
        "InstanceProfile",
        "AWS::IAM::InstanceProfile",
        json!({ "Roles": [instance_role.r#ref()] }),
    )?;

    let task_execution_role = template.add(
        "TaskExecutionRole",
        "AWS::IAM::Role",
        json!({
            "AssumeRolePolicyDocument": assume_role_document("ecs-tasks.amazonaws.com"),
            "ManagedPolicyArns": [
                managed_policy("service-role/AmazonECSTaskExecutionRolePolicy"),
            ],
        }),
    )?;

    Ok(AccessBoundary {
        alb_security_group,
        pool_security_group,
        service_security_group,
        instance_role,
        instance_profile,
        task_execution_role,
    })
}

fn all_egress() -> serde_json::Value {
    json!({
        "CidrIp": "0.0.0.0/0",
        "IpProtocol": "-1",
        "Description": "Allow all outbound traffic",
    })
}

fn assume_role_document(service: &str) -> serde_json::Value {
    json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Effect": "Allow",
            "Principal": { "Service": service },
            "Action": "sts:AssumeRole",
        }],
    })
}

fn managed_policy(name: &str) -> serde_json::Value {
    sub(&format!("arn:${{AWS::Partition}}:iam::aws:policy/{name}"))
}
