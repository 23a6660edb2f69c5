//! End-to-end properties of the synthesized template.

use serde_json::Value;

use nimbus_synth::{stack, SynthContext};

fn synth_value(pairs: &[&str]) -> Value {
    let ctx = SynthContext::from_pairs(pairs).expect("context");
    let template = stack::synthesize(&ctx).expect("synthesize");
    template.to_value()
}

fn resources_of_type<'a>(doc: &'a Value, kind: &str) -> Vec<(&'a String, &'a Value)> {
    doc["Resources"]
        .as_object()
        .expect("resources object")
        .iter()
        .filter(|(_, body)| body["Type"] == kind)
        .collect()
}

#[test]
fn missing_context_keys_resolve_to_defaults() {
    let ctx = SynthContext::from_pairs::<_, &str>([]).unwrap();
    assert!(ctx.auto_scale_down);
    assert!(!ctx.cheap_vpc);
    assert!(!ctx.schedule_auto_scaling);
    assert_eq!(ctx.timezone, "UTC");
    assert_eq!(ctx.schedule_scale_up, "0 9 * * 1-5");
    assert_eq!(ctx.schedule_scale_down, "0 18 * * *");
}

#[test]
fn alarm_evaluation_always_equals_datapoints() {
    for pairs in [&[][..], &["cheapVpc=true"][..]] {
        let doc = synth_value(pairs);
        for (_, alarm) in resources_of_type(&doc, "AWS::CloudWatch::Alarm") {
            assert_eq!(
                alarm["Properties"]["EvaluationPeriods"],
                alarm["Properties"]["DatapointsToAlarm"]
            );
        }
    }
}

#[test]
fn pool_maximum_is_one_for_every_context() {
    let contexts: [&[&str]; 4] = [
        &[],
        &["cheapVpc=true"],
        &["autoScaleDown=false"],
        &["autoScaleDown=false", "cheapVpc=true", "scheduleAutoScaling=true"],
    ];
    for pairs in contexts {
        let doc = synth_value(pairs);
        let pools = resources_of_type(&doc, "AWS::AutoScaling::AutoScalingGroup");
        assert_eq!(pools.len(), 1, "context {pairs:?}");
        assert_eq!(pools[0].1["Properties"]["MaxSize"], "1", "context {pairs:?}");
    }
}

#[test]
fn ports_agree_across_the_graph() {
    let doc = synth_value(&[]);

    let tasks = resources_of_type(&doc, "AWS::ECS::TaskDefinition");
    let container = &tasks[0].1["Properties"]["ContainerDefinitions"][0];
    assert_eq!(container["PortMappings"][0]["ContainerPort"], 8181);
    assert!(container["HealthCheck"]["Command"][1]
        .as_str()
        .unwrap()
        .contains(":8181"));

    let groups = resources_of_type(&doc, "AWS::ElasticLoadBalancingV2::TargetGroup");
    assert_eq!(groups[0].1["Properties"]["Port"], 8181);
    assert_eq!(groups[0].1["Properties"]["HealthCheckPort"], "8181");

    let services = resources_of_type(&doc, "AWS::ECS::Service");
    assert_eq!(
        services[0].1["Properties"]["LoadBalancers"][0]["ContainerPort"],
        8181
    );
}

#[test]
fn cheap_vpc_swaps_gateways_for_one_instance() {
    let doc = synth_value(&["cheapVpc=true"]);
    assert!(resources_of_type(&doc, "AWS::EC2::NatGateway").is_empty());

    let instances = resources_of_type(&doc, "AWS::EC2::Instance");
    assert_eq!(instances.len(), 1);
    let nat = instances[0].1;
    assert_eq!(nat["Properties"]["InstanceType"], "t4g.nano");
    assert_eq!(nat["Properties"]["SourceDestCheck"], false);

    // Its security group admits the whole network block.
    let sg = &doc["Resources"]["NatInstanceSecurityGroup"];
    let ingress = &sg["Properties"]["SecurityGroupIngress"][0];
    assert_eq!(ingress["CidrIp"], "10.0.0.0/16");
    assert_eq!(ingress["IpProtocol"], "-1");
}

#[test]
fn normal_mode_uses_managed_gateways() {
    let doc = synth_value(&[]);
    assert_eq!(resources_of_type(&doc, "AWS::EC2::NatGateway").len(), 2);
    assert!(resources_of_type(&doc, "AWS::EC2::Instance").is_empty());
}

#[test]
fn disabling_scale_down_removes_alarm_and_action() {
    let doc = synth_value(&["autoScaleDown=false"]);
    assert!(resources_of_type(&doc, "AWS::CloudWatch::Alarm").is_empty());
    assert!(resources_of_type(&doc, "AWS::AutoScaling::ScalingPolicy").is_empty());
}

#[test]
fn default_scenario_scale_down_wiring() {
    let doc = synth_value(&["autoScaleDown=true", "cheapVpc=false"]);

    let alarms = resources_of_type(&doc, "AWS::CloudWatch::Alarm");
    assert_eq!(alarms.len(), 1);
    let alarm = &alarms[0].1["Properties"];
    assert_eq!(alarm["Threshold"], 1);
    assert_eq!(alarm["EvaluationPeriods"], 60);
    assert_eq!(alarm["DatapointsToAlarm"], 60);
    assert_eq!(alarm["ComparisonOperator"], "LessThanThreshold");
    assert_eq!(alarm["Period"], 60);
    assert_eq!(alarm["Statistic"], "Average");

    let policies = resources_of_type(&doc, "AWS::AutoScaling::ScalingPolicy");
    assert_eq!(policies.len(), 1);
    let policy = &policies[0].1["Properties"];
    assert_eq!(policy["Cooldown"], "120");
    let steps = policy["StepAdjustments"].as_array().unwrap();
    assert_eq!(steps[0]["ScalingAdjustment"], -1);
    assert_eq!(steps[0]["MetricIntervalUpperBound"], 1);
    assert_eq!(steps[1]["ScalingAdjustment"], 0);
    assert_eq!(steps[1]["MetricIntervalLowerBound"], 1);
}

#[test]
fn dns_name_is_surfaced_as_an_output() {
    let doc = synth_value(&[]);
    assert_eq!(
        doc["Outputs"]["LoadBalancerDnsName"]["Value"],
        serde_json::json!({ "Fn::GetAtt": ["LoadBalancer", "DNSName"] })
    );
}

#[test]
fn suppressions_are_metadata_only() {
    let doc = synth_value(&["cheapVpc=true"]);

    let alb_sg = &doc["Resources"]["AlbSecurityGroup"];
    assert_eq!(
        alb_sg["Metadata"]["cdk_nag"]["rules_to_suppress"][0]["id"],
        "AwsSolutions-EC23"
    );
    assert!(alb_sg["Properties"].get("Metadata").is_none());

    let nat = &doc["Resources"]["NatInstance"];
    let rules = nat["Metadata"]["cdk_nag"]["rules_to_suppress"]
        .as_array()
        .unwrap();
    let ids: Vec<_> = rules.iter().map(|r| r["id"].as_str().unwrap()).collect();
    assert!(ids.contains(&"AwsSolutions-EC28"));
    assert!(ids.contains(&"AwsSolutions-EC29"));

    // Without the NAT instance there is nothing to suppress those rules on.
    let normal = synth_value(&[]);
    for (_, body) in normal["Resources"].as_object().unwrap() {
        if let Some(rules) = body
            .get("Metadata")
            .and_then(|m| m.get("cdk_nag"))
            .and_then(|n| n.get("rules_to_suppress"))
            .and_then(Value::as_array)
        {
            for rule in rules {
                assert_ne!(rule["id"], "AwsSolutions-EC28");
            }
        }
    }
}

#[test]
fn json_and_yaml_renderings_agree() {
    let ctx = SynthContext::default();
    let template = stack::synthesize(&ctx).unwrap();
    let from_json: Value = serde_json::from_str(&template.to_json().unwrap()).unwrap();
    let from_yaml: Value = serde_yaml::from_str(&template.to_yaml().unwrap()).unwrap();
    assert_eq!(from_json, from_yaml);
}

#[test]
fn schedule_context_is_accepted_but_unwired() {
    let doc = synth_value(&[
        "scheduleAutoScaling=true",
        "timezone=Europe/Berlin",
        "scheduleScaleUp=0 8 * * 1-5",
    ]);
    // No scheduled action exists yet; the context must not change the graph.
    assert!(resources_of_type(&doc, "AWS::AutoScaling::ScheduledAction").is_empty());
    assert_eq!(doc, synth_value(&[]));
}
