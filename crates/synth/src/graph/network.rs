//! Network topology builder.
//!
//! Lays out an isolated virtual network with two subnet tiers per
//! availability zone: public subnets that route to an internet gateway and
//! private-with-egress subnets that route outbound through NAT. An S3
//! gateway endpoint is bound to every route table so image layers never
//! transit the internet.
//!
//! Egress comes in two flavors. Normal mode provisions one managed NAT
//! gateway per zone. Cheap mode provisions a single `t4g.nano` NAT instance
//! instead, with source/dest check disabled and a security group that admits
//! all traffic from inside the network; the tradeoff is a single point of
//! egress failure against roughly an order of magnitude in monthly cost.

use serde_json::json;
use tracing::info;

use crate::context::SynthContext;
use crate::error::Result;
use crate::template::intrinsics::{base64, select_az, sub};
use crate::template::{LogicalId, Template};

/// Address block of the virtual network.
pub const VPC_CIDR: &str = "10.0.0.0/16";

/// Number of availability zones the topology spans.
pub const MAX_AZS: usize = 2;

/// Machine shape of the cost-mode NAT instance.
pub const NAT_INSTANCE_TYPE: &str = "t4g.nano";

/// Typed handles to the network tier.
#[derive(Debug, Clone)]
pub struct Network {
    /// The VPC itself.
    pub vpc: LogicalId,
    /// Public subnets, one per zone, in zone order.
    pub public_subnets: Vec<LogicalId>,
    /// Private-with-egress subnets, one per zone, in zone order.
    pub private_subnets: Vec<LogicalId>,
    /// The NAT instance, present only in cheap mode.
    pub nat_instance: Option<LogicalId>,
}

/// Build the network tier.
///
/// Zone count is fixed at [`MAX_AZS`]; if the deployment region has fewer
/// zones the control plane rejects the template at deployment time, not
/// here.
///
/// # Errors
///
/// Returns an error only on duplicate logical IDs, which would indicate a
/// bug in the assembly order.
#[allow(clippy::too_many_lines)]
pub fn build(template: &mut Template, ctx: &SynthContext) -> Result<Network> {
    info!(cheap_vpc = ctx.cheap_vpc, "building network topology");

    let vpc = template.add(
        "Vpc",
        "AWS::EC2::VPC",
        json!({
            "CidrBlock": VPC_CIDR,
            "EnableDnsSupport": true,
            "EnableDnsHostnames": true,
        }),
    )?;

    let igw = template.add("InternetGateway", "AWS::EC2::InternetGateway", json!({}))?;
    let igw_attachment = template.add(
        "VpcGatewayAttachment",
        "AWS::EC2::VPCGatewayAttachment",
        json!({
            "VpcId": vpc.r#ref(),
            "InternetGatewayId": igw.r#ref(),
        }),
    )?;

    // /24 slices carved out of the /16: public first, then private.
    let mut public_subnets = Vec::with_capacity(MAX_AZS);
    let mut private_subnets = Vec::with_capacity(MAX_AZS);
    let mut route_tables = Vec::new();

    for az in 0..MAX_AZS {
        let subnet = template.add(
            &format!("PublicSubnet{}", az + 1),
            "AWS::EC2::Subnet",
            json!({
                "VpcId": vpc.r#ref(),
                "CidrBlock": format!("10.0.{az}.0/24"),
                "AvailabilityZone": select_az(az),
                "MapPublicIpOnLaunch": true,
            }),
        )?;
        public_subnets.push(subnet);
    }
    for az in 0..MAX_AZS {
        let subnet = template.add(
            &format!("PrivateSubnet{}", az + 1),
            "AWS::EC2::Subnet",
            json!({
                "VpcId": vpc.r#ref(),
                "CidrBlock": format!("10.0.{}.0/24", MAX_AZS + az),
                "AvailabilityZone": select_az(az),
                "MapPublicIpOnLaunch": false,
            }),
        )?;
        private_subnets.push(subnet);
    }

    // One shared public route table: default route to the internet gateway.
    let public_rt = template.add(
        "PublicRouteTable",
        "AWS::EC2::RouteTable",
        json!({ "VpcId": vpc.r#ref() }),
    )?;
    route_tables.push(public_rt.clone());
    let default_route = template.add(
        "PublicDefaultRoute",
        "AWS::EC2::Route",
        json!({
            "RouteTableId": public_rt.r#ref(),
            "DestinationCidrBlock": "0.0.0.0/0",
            "GatewayId": igw.r#ref(),
        }),
    )?;
    template.add_depends_on(&default_route, &[igw_attachment])?;
    for (az, subnet) in public_subnets.iter().enumerate() {
        template.add(
            &format!("PublicSubnet{}RouteTableAssociation", az + 1),
            "AWS::EC2::SubnetRouteTableAssociation",
            json!({
                "SubnetId": subnet.r#ref(),
                "RouteTableId": public_rt.r#ref(),
            }),
        )?;
    }

    let nat_instance = if ctx.cheap_vpc {
        Some(build_nat_instance(template, &vpc, &public_subnets[0])?)
    } else {
        None
    };

    // Private route tables, one per zone, defaulting out through NAT.
    for (az, subnet) in private_subnets.iter().enumerate() {
        let rt = template.add(
            &format!("PrivateRouteTable{}", az + 1),
            "AWS::EC2::RouteTable",
            json!({ "VpcId": vpc.r#ref() }),
        )?;
        route_tables.push(rt.clone());

        if let Some(nat) = &nat_instance {
            template.add(
                &format!("PrivateDefaultRoute{}", az + 1),
                "AWS::EC2::Route",
                json!({
                    "RouteTableId": rt.r#ref(),
                    "DestinationCidrBlock": "0.0.0.0/0",
                    "InstanceId": nat.r#ref(),
                }),
            )?;
        } else {
            let eip = template.add(
                &format!("NatEip{}", az + 1),
                "AWS::EC2::EIP",
                json!({ "Domain": "vpc" }),
            )?;
            let gateway = template.add(
                &format!("NatGateway{}", az + 1),
                "AWS::EC2::NatGateway",
                json!({
                    "SubnetId": public_subnets[az].r#ref(),
                    "AllocationId": eip.get_att("AllocationId"),
                }),
            )?;
            template.add(
                &format!("PrivateDefaultRoute{}", az + 1),
                "AWS::EC2::Route",
                json!({
                    "RouteTableId": rt.r#ref(),
                    "DestinationCidrBlock": "0.0.0.0/0",
                    "NatGatewayId": gateway.r#ref(),
                }),
            )?;
        }

        template.add(
            &format!("PrivateSubnet{}RouteTableAssociation", az + 1),
            "AWS::EC2::SubnetRouteTableAssociation",
            json!({
                "SubnetId": subnet.r#ref(),
                "RouteTableId": rt.r#ref(),
            }),
        )?;
    }

    // Image layers are pulled from S3; keep that traffic off the NAT path.
    let route_table_refs: Vec<_> = route_tables.iter().map(LogicalId::r#ref).collect();
    template.add(
        "S3GatewayEndpoint",
        "AWS::EC2::VPCEndpoint",
        json!({
            "VpcId": vpc.r#ref(),
            "ServiceName": sub("com.amazonaws.${AWS::Region}.s3"),
            "VpcEndpointType": "Gateway",
            "RouteTableIds": route_table_refs,
        }),
    )?;

    Ok(Network {
        vpc,
        public_subnets,
        private_subnets,
        nat_instance,
    })
}

/// One low-cost address-translation instance in the first public subnet.
fn build_nat_instance(
    template: &mut Template,
    vpc: &LogicalId,
    public_subnet: &LogicalId,
) -> Result<LogicalId> {
    let sg = template.add(
        "NatInstanceSecurityGroup",
        "AWS::EC2::SecurityGroup",
        json!({
            "GroupDescription": "Security group for the NAT instance",
            "VpcId": vpc.r#ref(),
            // Outbound-only default traffic; the sole ingress is the VPC
            // itself, which must be able to reach the instance to egress.
            "SecurityGroupIngress": [{
                "CidrIp": VPC_CIDR,
                "IpProtocol": "-1",
                "Description": "Allow NAT traffic from inside the VPC",
            }],
            "SecurityGroupEgress": [{
                "CidrIp": "0.0.0.0/0",
                "IpProtocol": "-1",
                "Description": "Allow all outbound traffic",
            }],
        }),
    )?;

    let user_data = "#!/bin/bash\n\
        sysctl -w net.ipv4.ip_forward=1\n\
        /usr/sbin/iptables -t nat -A POSTROUTING -o $(ip route show default | awk '{print $5}') -j MASQUERADE\n";

    template.add(
        "NatInstance",
        "AWS::EC2::Instance",
        json!({
            "InstanceType": NAT_INSTANCE_TYPE,
            "ImageId": "{{resolve:ssm:/aws/service/ami-amazon-linux-latest/al2023-ami-kernel-default-arm64}}",
            "SubnetId": public_subnet.r#ref(),
            "SecurityGroupIds": [sg.get_att("GroupId")],
            // Forwarded packets carry other hosts' addresses.
            "SourceDestCheck": false,
            "UserData": base64(json!(user_data)),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synth(cheap_vpc: bool) -> (Template, Network) {
        let ctx = SynthContext {
            cheap_vpc,
            ..SynthContext::default()
        };
        let mut template = Template::new("test");
        let network = build(&mut template, &ctx).unwrap();
        (template, network)
    }

    #[test]
    fn test_two_subnet_tiers_per_zone() {
        let (_, network) = synth(false);
        assert_eq!(network.public_subnets.len(), MAX_AZS);
        assert_eq!(network.private_subnets.len(), MAX_AZS);
    }

    #[test]
    fn test_managed_nat_by_default() {
        let (template, network) = synth(false);
        assert!(network.nat_instance.is_none());
        assert!(template.resource("NatGateway1").is_some());
        assert!(template.resource("NatGateway2").is_some());
        assert!(template.resource("NatInstance").is_none());
    }

    #[test]
    fn test_cheap_mode_uses_a_single_instance() {
        let (template, network) = synth(true);
        let nat = network.nat_instance.expect("nat instance handle");
        let resource = template.resource(nat.as_str()).unwrap();
        assert_eq!(resource.properties["InstanceType"], NAT_INSTANCE_TYPE);
        assert_eq!(resource.properties["SourceDestCheck"], false);
        assert!(template.resource("NatGateway1").is_none());

        // Private subnets route through the instance.
        let route = template.resource("PrivateDefaultRoute1").unwrap();
        assert_eq!(route.properties["InstanceId"], nat.r#ref());
    }

    #[test]
    fn test_nat_instance_admits_the_vpc_block() {
        let (template, _) = synth(true);
        let sg = template.resource("NatInstanceSecurityGroup").unwrap();
        let ingress = &sg.properties["SecurityGroupIngress"][0];
        assert_eq!(ingress["CidrIp"], VPC_CIDR);
        assert_eq!(ingress["IpProtocol"], "-1");
    }

    #[test]
    fn test_s3_endpoint_reaches_every_route_table() {
        let (template, _) = synth(false);
        let endpoint = template.resource("S3GatewayEndpoint").unwrap();
        let tables = endpoint.properties["RouteTableIds"].as_array().unwrap();
        // One public table plus one private table per zone.
        assert_eq!(tables.len(), 1 + MAX_AZS);
    }
}
