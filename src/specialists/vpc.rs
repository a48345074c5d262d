use crate::models::{Fact, Resource};
use crate::specialists::{
    parse_tool_document, ErrorFactGuard, Specialist, SpecialistContext, MAX_FACTS_PER_RESOURCE,
};
use crate::tools::vpc as vpc_tools;
use async_trait::async_trait;
use serde_json::Value;

/// Analyzes network resources; the resource name selects the routine
/// (`vpc-`, `subnet-` or `sg-` prefixes).
pub struct VpcSpecialist;

#[async_trait]
impl Specialist for VpcSpecialist {
    async fn analyze(&self, resource: &Resource, ctx: &SpecialistContext) -> Vec<Fact> {
        let mut facts = Vec::new();
        let mut errors = ErrorFactGuard::new();
        let name = resource.name.as_str();

        if name.starts_with("sg-") {
            let raw = vpc_tools::get_security_group_config(&ctx.tools, name).await;
            match parse_tool_document(&raw) {
                Ok(config) => {
                    let open = config
                        .get("open_to_world")
                        .and_then(Value::as_bool)
                        .unwrap_or(false);
                    facts.push(Fact::new(
                        "security_group_config",
                        format!(
                            "Security group {name} has {} ingress rules",
                            config.get("ingress_rule_count").and_then(Value::as_u64).unwrap_or(0)
                        ),
                        0.8,
                    ));
                    if open {
                        facts.push(Fact::new(
                            "security_group_config",
                            format!("Security group {name} allows ingress from 0.0.0.0/0"),
                            0.9,
                        ));
                    }
                }
                Err(error) => errors.report(
                    &mut facts,
                    "security_group_config",
                    format!("Could not load security group {name}: {error}"),
                ),
            }
        } else if name.starts_with("subnet-") {
            let raw = vpc_tools::get_subnet_config(&ctx.tools, name).await;
            match parse_tool_document(&raw) {
                Ok(config) => {
                    let available = config
                        .get("available_ip_count")
                        .and_then(Value::as_u64)
                        .unwrap_or(0);
                    facts.push(Fact::new(
                        "subnet_config",
                        format!("Subnet {name} has {available} available IP addresses"),
                        0.8,
                    ));
                    if available < 10 {
                        facts.push(Fact::new(
                            "subnet_config",
                            format!("Subnet {name} is nearly out of IP addresses ({available} left)"),
                            0.9,
                        ));
                    }
                }
                Err(error) => errors.report(
                    &mut facts,
                    "subnet_config",
                    format!("Could not load subnet {name}: {error}"),
                ),
            }
        } else {
            let raw = vpc_tools::get_vpc_config(&ctx.tools, name).await;
            match parse_tool_document(&raw) {
                Ok(config) => {
                    let state = config
                        .get("state")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown");
                    facts.push(Fact::new(
                        "vpc_config",
                        format!("VPC {name} is {state}"),
                        0.8,
                    ));
                }
                Err(error) => errors.report(
                    &mut facts,
                    "vpc_config",
                    format!("Could not load VPC {name}: {error}"),
                ),
            }

            let raw = vpc_tools::get_nat_gateway_config(&ctx.tools, name).await;
            if let Ok(config) = parse_tool_document(&raw) {
                let unavailable: Vec<String> = config
                    .get("nat_gateways")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default()
                    .iter()
                    .filter(|g| g.get("state").and_then(Value::as_str) != Some("available"))
                    .filter_map(|g| {
                        g.get("nat_gateway_id").and_then(Value::as_str).map(String::from)
                    })
                    .collect();
                if !unavailable.is_empty() {
                    facts.push(Fact::new(
                        "nat_gateway_config",
                        format!("NAT gateways not available in {name}: {}", unavailable.join(", ")),
                        0.9,
                    ));
                }
            }
        }

        facts.truncate(MAX_FACTS_PER_RESOURCE);
        facts
    }

    fn resource_types(&self) -> &'static [&'static str] {
        &["vpc"]
    }

    fn name(&self) -> &'static str {
        "vpc"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{tool_context, MockBackend};
    use serde_json::json;
    use std::sync::Arc;

    async fn context(backend: Arc<MockBackend>) -> SpecialistContext {
        SpecialistContext {
            tools: tool_context(backend).await,
            trace_ids: vec![],
        }
    }

    #[tokio::test]
    async fn world_open_security_group_is_flagged() {
        let backend = Arc::new(MockBackend::new().with_response(
            "ec2",
            "describe-security-groups",
            json!({"SecurityGroups": [{
                "GroupName": "api-sg",
                "IpPermissions": [
                    {"IpRanges": [{"CidrIp": "0.0.0.0/0"}], "FromPort": 22, "ToPort": 22}
                ],
                "IpPermissionsEgress": []
            }]}),
        ));
        let ctx = context(backend).await;
        let resource = Resource::new("vpc", "sg-0abc123", "eu-west-1");

        let facts = VpcSpecialist.analyze(&resource, &ctx).await;
        assert!(facts
            .iter()
            .any(|f| f.source == "security_group_config"
                && f.content.contains("1 ingress rules")));
        assert!(facts
            .iter()
            .any(|f| f.content.contains("allows ingress from 0.0.0.0/0")
                && f.confidence == 0.9));
    }

    #[tokio::test]
    async fn subnet_ip_exhaustion_is_flagged() {
        let backend = Arc::new(MockBackend::new().with_response(
            "ec2",
            "describe-subnets",
            json!({"Subnets": [{
                "VpcId": "vpc-1",
                "CidrBlock": "10.0.1.0/28",
                "AvailabilityZone": "eu-west-1a",
                "AvailableIpAddressCount": 3
            }]}),
        ));
        let ctx = context(backend).await;
        let resource = Resource::new("vpc", "subnet-0def456", "eu-west-1");

        let facts = VpcSpecialist.analyze(&resource, &ctx).await;
        assert!(facts
            .iter()
            .any(|f| f.content.contains("nearly out of IP addresses (3 left)")
                && f.confidence == 0.9));
    }

    #[tokio::test]
    async fn unavailable_nat_gateways_are_listed() {
        let backend = Arc::new(
            MockBackend::new()
                .with_response(
                    "ec2",
                    "describe-vpcs",
                    json!({"Vpcs": [{"CidrBlock": "10.0.0.0/16", "State": "available"}]}),
                )
                .with_response(
                    "ec2",
                    "describe-nat-gateways",
                    json!({"NatGateways": [
                        {"NatGatewayId": "nat-1", "State": "failed", "SubnetId": "subnet-a"},
                        {"NatGatewayId": "nat-2", "State": "available", "SubnetId": "subnet-b"}
                    ]}),
                ),
        );
        let ctx = context(backend).await;
        let resource = Resource::new("vpc", "vpc-0ghi789", "eu-west-1");

        let facts = VpcSpecialist.analyze(&resource, &ctx).await;
        assert!(facts
            .iter()
            .any(|f| f.source == "vpc_config" && f.content.contains("is available")));
        assert!(facts
            .iter()
            .any(|f| f.source == "nat_gateway_config"
                && f.content.contains("nat-1")
                && !f.content.contains("nat-2")));
    }
}
