//! Routing layer builder.
//!
//! An internet-facing application load balancer terminating plain HTTP on
//! the listener port and forwarding to the service's registered IP targets
//! on the application port. The target group carries its own health check
//! against the same status endpoint the container probes.

use serde_json::json;
use tracing::info;

use crate::error::Result;
use crate::graph::access::AccessBoundary;
use crate::graph::network::Network;
use crate::graph::{APP_PORT, HEALTH_PATH, LISTENER_PORT};
use crate::template::{LogicalId, Template};

/// Typed handles to the routing tier.
#[derive(Debug, Clone)]
pub struct Routing {
    /// The public load balancer; its `DNSName` attribute is the stack
    /// output.
    pub load_balancer: LogicalId,
    /// Target group the service registers into.
    pub target_group: LogicalId,
    /// The HTTP listener. The service depends on it so targets can attach
    /// before the first task starts.
    pub listener: LogicalId,
}

/// Build the routing tier.
///
/// # Errors
///
/// Returns an error only on duplicate logical IDs.
pub fn build(
    template: &mut Template,
    network: &Network,
    access: &AccessBoundary,
) -> Result<Routing> {
    info!(port = LISTENER_PORT, "building routing layer");

    let public_subnet_refs: Vec<_> = network.public_subnets.iter().map(LogicalId::r#ref).collect();
    let load_balancer = template.add(
        "LoadBalancer",
        "AWS::ElasticLoadBalancingV2::LoadBalancer",
        json!({
            "Name": "nimbus-alb",
            "Type": "application",
            "Scheme": "internet-facing",
            "Subnets": public_subnet_refs,
            "SecurityGroups": [access.alb_security_group.get_att("GroupId")],
        }),
    )?;

    let target_group = template.add(
        "AppTargetGroup",
        "AWS::ElasticLoadBalancingV2::TargetGroup",
        json!({
            "VpcId": network.vpc.r#ref(),
            "Port": APP_PORT,
            "Protocol": "HTTP",
            "TargetType": "ip",
            "HealthCheckEnabled": true,
            "HealthCheckPath": HEALTH_PATH,
            "HealthCheckPort": APP_PORT.to_string(),
            "HealthCheckProtocol": "HTTP",
            "Matcher": { "HttpCode": "200" },
            "HealthCheckIntervalSeconds": 30,
            "HealthCheckTimeoutSeconds": 5,
            "UnhealthyThresholdCount": 3,
            "HealthyThresholdCount": 2,
        }),
    )?;

    let listener = template.add(
        "HttpListener",
        "AWS::ElasticLoadBalancingV2::Listener",
        json!({
            "LoadBalancerArn": load_balancer.r#ref(),
            "Port": LISTENER_PORT,
            "Protocol": "HTTP",
            "DefaultActions": [{
                "Type": "forward",
                "TargetGroupArn": target_group.r#ref(),
            }],
        }),
    )?;

    Ok(Routing {
        load_balancer,
        target_group,
        listener,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SynthContext;
    use crate::graph::{access, network};

    fn synth() -> (Template, Routing) {
        let ctx = SynthContext::default();
        let mut template = Template::new("test");
        let net = network::build(&mut template, &ctx).unwrap();
        let bounds = access::build(&mut template, &net).unwrap();
        let routing = build(&mut template, &net, &bounds).unwrap();
        (template, routing)
    }

    #[test]
    fn test_target_group_matches_the_app_port() {
        let (template, routing) = synth();
        let tg = template.resource(routing.target_group.as_str()).unwrap();
        assert_eq!(tg.properties["Port"], APP_PORT);
        assert_eq!(tg.properties["HealthCheckPort"], APP_PORT.to_string());
        assert_eq!(tg.properties["TargetType"], "ip");
    }

    #[test]
    fn test_health_check_accepts_only_200() {
        let (template, routing) = synth();
        let tg = template.resource(routing.target_group.as_str()).unwrap();
        assert_eq!(tg.properties["HealthCheckPath"], HEALTH_PATH);
        assert_eq!(tg.properties["Matcher"]["HttpCode"], "200");
        assert_eq!(tg.properties["HealthCheckIntervalSeconds"], 30);
        assert_eq!(tg.properties["UnhealthyThresholdCount"], 3);
        assert_eq!(tg.properties["HealthyThresholdCount"], 2);
    }

    #[test]
    fn test_listener_terminates_http_80() {
        let (template, routing) = synth();
        let listener = template.resource(routing.listener.as_str()).unwrap();
        assert_eq!(listener.properties["Port"], LISTENER_PORT);
        assert_eq!(listener.properties["Protocol"], "HTTP");
        assert_eq!(
            listener.properties["DefaultActions"][0]["TargetGroupArn"],
            routing.target_group.r#ref()
        );
    }

    #[test]
    fn test_balancer_is_public() {
        let (template, routing) = synth();
        let alb = template.resource(routing.load_balancer.as_str()).unwrap();
        assert_eq!(alb.properties["Scheme"], "internet-facing");
        let subnets = alb.properties["Subnets"].as_array().unwrap();
        assert_eq!(subnets[0], json!({ "Ref": "PublicSubnet1" }));
    }
}
