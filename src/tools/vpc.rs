use crate::tools::{error_envelope, ToolContext};
use serde_json::{json, Value};

/// Get VPC CIDR and state.
pub async fn get_vpc_config(ctx: &ToolContext, vpc_id: &str) -> String {
    match ctx
        .call("ec2", "describe-vpcs", json!({"VpcIds": [vpc_id]}))
        .await
    {
        Ok(response) => {
            match response
                .get("Vpcs")
                .and_then(Value::as_array)
                .and_then(|v| v.first())
            {
                Some(vpc) => json!({
                    "vpc_id": vpc_id,
                    "cidr_block": vpc.get("CidrBlock").cloned().unwrap_or(Value::Null),
                    "state": vpc.get("State").cloned().unwrap_or(Value::Null),
                    "is_default": vpc.get("IsDefault").cloned().unwrap_or(json!(false)),
                })
                .to_string(),
                None => error_envelope("VPC not found", &[("vpc_id", vpc_id)]),
            }
        }
        Err(e) => error_envelope(e, &[("vpc_id", vpc_id)]),
    }
}

/// Get subnet addressing and availability-zone placement.
pub async fn get_subnet_config(ctx: &ToolContext, subnet_id: &str) -> String {
    match ctx
        .call("ec2", "describe-subnets", json!({"SubnetIds": [subnet_id]}))
        .await
    {
        Ok(response) => {
            match response
                .get("Subnets")
                .and_then(Value::as_array)
                .and_then(|s| s.first())
            {
                Some(subnet) => json!({
                    "subnet_id": subnet_id,
                    "vpc_id": subnet.get("VpcId").cloned().unwrap_or(Value::Null),
                    "cidr_block": subnet.get("CidrBlock").cloned().unwrap_or(Value::Null),
                    "availability_zone": subnet
                        .get("AvailabilityZone")
                        .cloned()
                        .unwrap_or(Value::Null),
                    "available_ip_count": subnet
                        .get("AvailableIpAddressCount")
                        .cloned()
                        .unwrap_or(Value::Null),
                })
                .to_string(),
                None => error_envelope("Subnet not found", &[("subnet_id", subnet_id)]),
            }
        }
        Err(e) => error_envelope(e, &[("subnet_id", subnet_id)]),
    }
}

/// Get security group rule summary, flagging world-open ingress.
pub async fn get_security_group_config(ctx: &ToolContext, group_id: &str) -> String {
    match ctx
        .call(
            "ec2",
            "describe-security-groups",
            json!({"GroupIds": [group_id]}),
        )
        .await
    {
        Ok(response) => {
            match response
                .get("SecurityGroups")
                .and_then(Value::as_array)
                .and_then(|g| g.first())
            {
                Some(group) => {
                    let ingress = group
                        .get("IpPermissions")
                        .and_then(Value::as_array)
                        .cloned()
                        .unwrap_or_default();
                    let open_to_world = ingress.iter().any(|rule| {
                        rule.get("IpRanges")
                            .and_then(Value::as_array)
                            .map(|ranges| {
                                ranges.iter().any(|r| {
                                    r.get("CidrIp").and_then(Value::as_str) == Some("0.0.0.0/0")
                                })
                            })
                            .unwrap_or(false)
                    });
                    json!({
                        "group_id": group_id,
                        "group_name": group.get("GroupName").cloned().unwrap_or(Value::Null),
                        "ingress_rule_count": ingress.len(),
                        "egress_rule_count": group
                            .get("IpPermissionsEgress")
                            .and_then(Value::as_array)
                            .map(|e| e.len())
                            .unwrap_or(0),
                        "open_to_world": open_to_world,
                    })
                    .to_string()
                }
                None => error_envelope("Security group not found", &[("group_id", group_id)]),
            }
        }
        Err(e) => error_envelope(e, &[("group_id", group_id)]),
    }
}

/// Get NAT gateways in one VPC.
pub async fn get_nat_gateway_config(ctx: &ToolContext, vpc_id: &str) -> String {
    match ctx
        .call(
            "ec2",
            "describe-nat-gateways",
            json!({"Filter": [{"Name": "vpc-id", "Values": [vpc_id]}]}),
        )
        .await
    {
        Ok(response) => {
            let gateways: Vec<Value> = response
                .get("NatGateways")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .map(|g| {
                    json!({
                        "nat_gateway_id": g.get("NatGatewayId").cloned().unwrap_or(Value::Null),
                        "state": g.get("State").cloned().unwrap_or(Value::Null),
                        "subnet_id": g.get("SubnetId").cloned().unwrap_or(Value::Null),
                    })
                })
                .collect();
            json!({
                "vpc_id": vpc_id,
                "nat_gateway_count": gateways.len(),
                "nat_gateways": gateways,
            })
            .to_string()
        }
        Err(e) => error_envelope(e, &[("vpc_id", vpc_id)]),
    }
}
