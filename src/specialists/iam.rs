use crate::models::{Fact, Resource};
use crate::specialists::{
    parse_tool_document, ErrorFactGuard, Specialist, SpecialistContext, MAX_FACTS_PER_RESOURCE,
};
use crate::tools::iam as iam_tools;
use async_trait::async_trait;
use serde_json::Value;

/// Analyzes identity roles: policy attachments and explicit denies.
pub struct IamSpecialist;

#[async_trait]
impl Specialist for IamSpecialist {
    async fn analyze(&self, resource: &Resource, ctx: &SpecialistContext) -> Vec<Fact> {
        let mut facts = Vec::new();
        let mut errors = ErrorFactGuard::new();
        let role_name = resource.name.as_str();

        let raw = iam_tools::get_iam_role_config(&ctx.tools, role_name).await;
        match parse_tool_document(&raw) {
            Ok(role) => {
                let attached = role
                    .get("attached_policies")
                    .and_then(Value::as_array)
                    .map(|p| p.len())
                    .unwrap_or(0);
                let inline = role
                    .get("inline_policies")
                    .and_then(Value::as_array)
                    .map(|p| p.len())
                    .unwrap_or(0);
                facts.push(Fact::new(
                    "iam_role_config",
                    format!(
                        "Role {role_name} has {attached} attached and {inline} inline policies"
                    ),
                    0.85,
                ));

                // Substring scan only; condition blocks and NotAction make
                // this a hint, not a verdict.
                let serialized = serde_json::to_string(&role).unwrap_or_default();
                if serialized.contains("\"Deny\"") {
                    facts.push(Fact::new(
                        "iam_analysis",
                        format!("Role {role_name} carries at least one explicit Deny statement"),
                        0.9,
                    ));
                }
                if attached == 0 && inline == 0 {
                    facts.push(Fact::new(
                        "iam_analysis",
                        format!("Role {role_name} has no policies attached"),
                        0.95,
                    ));
                }
            }
            Err(error) => errors.report(
                &mut facts,
                "iam_role_config",
                format!("Could not load role {role_name}: {error}"),
            ),
        }

        facts.truncate(MAX_FACTS_PER_RESOURCE);
        facts
    }

    fn resource_types(&self) -> &'static [&'static str] {
        &["iam"]
    }

    fn name(&self) -> &'static str {
        "iam"
    }
}
