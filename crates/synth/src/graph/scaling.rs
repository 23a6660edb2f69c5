//! Idle scale-down policy.
//!
//! The one dynamic behavior this graph specifies: when the pool's 1-minute
//! average CPU utilization stays below 1% for 60 consecutive periods, a
//! step-scaling action removes exactly one machine, taking the pool from
//! `SCALED_UP` (1 running) to `SCALED_DOWN` (0 running). Scale-up back to 1
//! is an external demand signal, outside this graph. The provider's control
//! loop executes the transition; this module only states it.
//!
//! The alarm requires every datapoint in the window: evaluation periods and
//! datapoints-to-alarm are the same constant. An alarm that tolerated
//! missing datapoints would treat metric-delivery gaps as idleness and
//! scale down prematurely.

use serde_json::json;
use tracing::info;

use crate::error::Result;
use crate::graph::capacity::CapacityPool;
use crate::template::{LogicalId, Template};

/// Utilization threshold in percent. Below this the pool counts as idle.
pub const IDLE_THRESHOLD_PERCENT: u32 = 1;

/// Number of 1-minute periods the signal must stay under the threshold,
/// and equally the number of datapoints required to alarm.
pub const EVALUATION_PERIODS: u32 = 60;

/// Seconds before the capacity adjustment may repeat.
pub const COOLDOWN_SECONDS: u32 = 120;

/// Typed handles to the scale-down tier.
#[derive(Debug, Clone)]
pub struct ScaleDownPolicy {
    /// The utilization alarm.
    pub alarm: LogicalId,
    /// The step-scaling action the alarm triggers.
    pub scaling_policy: LogicalId,
}

/// Build the idle scale-down policy against the given pool.
///
/// The caller gates this on the `autoScaleDown` context flag; when the flag
/// is off neither resource exists and the pool never self-reduces below its
/// desired count.
///
/// # Errors
///
/// Returns an error only on duplicate logical IDs.
pub fn build(template: &mut Template, pool: &CapacityPool) -> Result<ScaleDownPolicy> {
    info!(
        threshold = IDLE_THRESHOLD_PERCENT,
        periods = EVALUATION_PERIODS,
        "building idle scale-down policy"
    );

    let scaling_policy = template.add(
        "ScaleDownPolicy",
        "AWS::AutoScaling::ScalingPolicy",
        json!({
            "AutoScalingGroupName": pool.auto_scaling_group.r#ref(),
            "PolicyType": "StepScaling",
            "AdjustmentType": "ChangeInCapacity",
            "Cooldown": COOLDOWN_SECONDS.to_string(),
            "StepAdjustments": [
                // Below the threshold: remove one machine.
                {
                    "ScalingAdjustment": -1,
                    "MetricIntervalUpperBound": IDLE_THRESHOLD_PERCENT,
                },
                // At or above it: explicitly no change, so a single alarm
                // covering both bands cannot oscillate.
                {
                    "ScalingAdjustment": 0,
                    "MetricIntervalLowerBound": IDLE_THRESHOLD_PERCENT,
                },
            ],
        }),
    )?;

    let alarm = template.add(
        "CpuIdleAlarm",
        "AWS::CloudWatch::Alarm",
        json!({
            "Namespace": "AWS/EC2",
            "MetricName": "CPUUtilization",
            // Dimensional binding to exactly the pool this policy governs.
            "Dimensions": [{
                "Name": "AutoScalingGroupName",
                "Value": pool.auto_scaling_group.r#ref(),
            }],
            "Statistic": "Average",
            "Period": 60,
            "Threshold": IDLE_THRESHOLD_PERCENT,
            "ComparisonOperator": "LessThanThreshold",
            "EvaluationPeriods": EVALUATION_PERIODS,
            "DatapointsToAlarm": EVALUATION_PERIODS,
            "AlarmActions": [scaling_policy.r#ref()],
        }),
    )?;

    Ok(ScaleDownPolicy {
        alarm,
        scaling_policy,
    })
}
