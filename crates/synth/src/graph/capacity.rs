//! Capacity pool builder.
//!
//! A bounded elastic fleet of GPU machines launched from a single template.
//! The pool participates in mixed on-demand allocation across several
//! instance-type fallbacks so a stockout of the primary shape does not block
//! scale-up, but it is hard-capped at one running machine: the maximum
//! bounds the cost blast radius of the expensive GPU shapes no matter what
//! the context says.

use serde_json::json;
use tracing::info;

use crate::error::Result;
use crate::graph::{access::AccessBoundary, network::Network, CLUSTER_NAME};
use crate::template::intrinsics::base64;
use crate::template::{DeletionPolicy, LogicalId, Template};

/// Primary GPU machine shape, first in the fallback order.
pub const PRIMARY_INSTANCE_TYPE: &str = "g4dn.2xlarge";

/// Instance-type fallbacks for mixed on-demand allocation, best first.
pub const INSTANCE_TYPE_OVERRIDES: [&str; 3] = ["g4dn.2xlarge", "g5.2xlarge", "g6.2xlarge"];

/// Hard cap on running machines, regardless of context inputs.
pub const MAX_CAPACITY: u32 = 1;

/// Root volume size in GiB.
pub const ROOT_VOLUME_GIB: u32 = 50;

/// SSM public parameter resolving to the ECS GPU-optimized AMI.
const GPU_AMI_PARAMETER: &str =
    "{{resolve:ssm:/aws/service/ecs/optimized-ami/amazon-linux-2/gpu/recommended/image_id}}";

/// Typed handles to the capacity tier.
#[derive(Debug, Clone)]
pub struct CapacityPool {
    /// The launch template machines boot from.
    pub launch_template: LogicalId,
    /// The auto scaling group. Its `Ref` is the group name, which the
    /// scale-down alarm uses as its metric dimension.
    pub auto_scaling_group: LogicalId,
}

/// Build the capacity tier.
///
/// # Errors
///
/// Returns an error only on duplicate logical IDs.
pub fn build(
    template: &mut Template,
    network: &Network,
    access: &AccessBoundary,
) -> Result<CapacityPool> {
    info!(max = MAX_CAPACITY, "building capacity pool");

    // Joins the cluster and enables the rexray/ebs plugin so the task's
    // persistent volume can attach on whichever instance comes up.
    let boot_script = format!(
        "#!/bin/bash\n\
         echo ECS_CLUSTER={CLUSTER_NAME} >> /etc/ecs/ecs.config\n\
         REGION=$(curl -s http://169.254.169.254/latest/meta-data/placement/region)\n\
         docker plugin install rexray/ebs --grant-all-permissions REXRAY_PREEMPT=true EBS_REGION=$REGION\n\
         systemctl restart docker\n"
    );

    let launch_template = template.add(
        "GpuLaunchTemplate",
        "AWS::EC2::LaunchTemplate",
        json!({
            "LaunchTemplateName": "nimbus-gpu-host",
            "LaunchTemplateData": {
                "InstanceType": PRIMARY_INSTANCE_TYPE,
                "ImageId": GPU_AMI_PARAMETER,
                "IamInstanceProfile": { "Arn": access.instance_profile.get_att("Arn") },
                "SecurityGroupIds": [access.pool_security_group.get_att("GroupId")],
                "UserData": base64(json!(boot_script)),
                "BlockDeviceMappings": [{
                    "DeviceName": "/dev/xvda",
                    "Ebs": { "VolumeSize": ROOT_VOLUME_GIB, "Encrypted": true },
                }],
            },
        }),
    )?;

    let overrides: Vec<_> = INSTANCE_TYPE_OVERRIDES
        .iter()
        .map(|shape| json!({ "InstanceType": shape }))
        .collect();
    let private_subnet_refs: Vec<_> = network.private_subnets.iter().map(LogicalId::r#ref).collect();

    let auto_scaling_group = template.add(
        "GpuPool",
        "AWS::AutoScaling::AutoScalingGroup",
        json!({
            "AutoScalingGroupName": "nimbus-gpu-pool",
            "MinSize": "0",
            "MaxSize": MAX_CAPACITY.to_string(),
            "DesiredCapacity": "1",
            "MixedInstancesPolicy": {
                "InstancesDistribution": {
                    "OnDemandPercentageAboveBaseCapacity": 100,
                    "OnDemandAllocationStrategy": "lowest-price",
                },
                "LaunchTemplate": {
                    "LaunchTemplateSpecification": {
                        "LaunchTemplateId": launch_template.r#ref(),
                        "Version": launch_template.get_att("LatestVersionNumber"),
                    },
                    "Overrides": overrides,
                },
            },
            "NewInstancesProtectedFromScaleIn": false,
            "VPCZoneIdentifier": private_subnet_refs,
        }),
    )?;
    template.set_deletion_policy(&auto_scaling_group, DeletionPolicy::Delete)?;

    Ok(CapacityPool {
        launch_template,
        auto_scaling_group,
    })
}
