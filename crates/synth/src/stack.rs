//! Dependency-ordered stack assembly.
//!
//! Runs every builder once, synchronously, threading the resolved context
//! and the typed handles forward, then applies the compliance annotations
//! and surfaces the public DNS name as the stack output.

use tracing::info;

use crate::context::SynthContext;
use crate::error::Result;
use crate::graph::{access, capacity, network, orchestration, routing, scaling, service};
use crate::nag::Suppressions;
use crate::template::{Output, Template};

/// Stack description carried in the emitted document.
const DESCRIPTION: &str =
    "GPU-backed container service behind a load balancer with scale-to-zero on idleness";

/// Name of the stack output carrying the entry point's DNS name.
pub const DNS_OUTPUT: &str = "LoadBalancerDnsName";

/// Build the full resource graph for the given context.
///
/// # Errors
///
/// Returns an error on duplicate logical IDs or stale handles, both of
/// which indicate an assembly bug rather than bad input; context validation
/// happens before this is called.
pub fn synthesize(ctx: &SynthContext) -> Result<Template> {
    info!(
        auto_scale_down = ctx.auto_scale_down,
        cheap_vpc = ctx.cheap_vpc,
        "synthesizing stack"
    );
    let mut template = Template::new(DESCRIPTION);

    let net = network::build(&mut template, ctx)?;
    let bounds = access::build(&mut template, &net)?;
    let pool = capacity::build(&mut template, &net, &bounds)?;
    if ctx.auto_scale_down {
        scaling::build(&mut template, &pool)?;
    }
    let cluster = orchestration::build(&mut template, &pool, &bounds)?;
    let routes = routing::build(&mut template, &net, &bounds)?;
    service::build(&mut template, &net, &bounds, &cluster, &routes)?;

    // Schedule-driven scaling (scheduleAutoScaling, scheduleScaleUp,
    // scheduleScaleDown, timezone) is accepted in the context but has no
    // builder yet; it would slot in here, next to the idle policy.

    apply_suppressions(&mut template, &net, &bounds, &cluster, &routes)?;

    template.add_output(
        DNS_OUTPUT,
        Output {
            value: routes.load_balancer.get_att("DNSName"),
            description: Some("Public DNS name of the service entry point".to_string()),
        },
    )?;

    info!(resources = template.len(), "stack synthesized");
    Ok(template)
}

fn apply_suppressions(
    template: &mut Template,
    net: &network::Network,
    bounds: &access::AccessBoundary,
    cluster: &orchestration::Orchestration,
    routes: &routing::Routing,
) -> Result<()> {
    let mut suppressions = Suppressions::new();

    suppressions.suppress_all(
        &[
            &bounds.alb_security_group,
            &bounds.pool_security_group,
            &bounds.service_security_group,
            &routes.load_balancer,
        ],
        "AwsSolutions-EC23",
        "The load balancer is the public entry point and must accept 0.0.0.0/0 inbound; \
         everything behind it only admits the load balancer's own security group.",
    );
    suppressions.suppress(
        &routes.load_balancer,
        "AwsSolutions-ELB2",
        "Access logs need a dedicated S3 bucket; omitted for this single-service stack.",
    );
    suppressions.suppress(
        &cluster.task_definition,
        "AwsSolutions-ECS2",
        "The orchestrator injects region environment variables implicitly; none are secrets.",
    );
    suppressions.suppress(
        &bounds.instance_role,
        "AwsSolutions-IAM4",
        "Pool instances self-manage EBS volumes through the rexray plugin, which needs \
         broad EC2 access; accepted tradeoff for a single-instance pool.",
    );
    if let Some(nat) = &net.nat_instance {
        suppressions.suppress(
            nat,
            "AwsSolutions-EC28",
            "The NAT instance does not require detailed monitoring.",
        );
        suppressions.suppress(
            nat,
            "AwsSolutions-EC29",
            "The NAT instance does not require an autoscaling group.",
        );
    }

    suppressions.apply(template)
}
