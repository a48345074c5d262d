use crate::tools::{error_envelope, ToolContext};
use serde_json::{json, Value};

/// Get role metadata, attached policies and inline policy documents.
///
/// Inline documents are fetched eagerly so permission analysis can scan them
/// without further calls.
pub async fn get_iam_role_config(ctx: &ToolContext, role_name: &str) -> String {
    let role = match ctx
        .call("iam", "get-role", json!({"RoleName": role_name}))
        .await
    {
        Ok(response) => response.get("Role").cloned().unwrap_or(json!({})),
        Err(e) => return error_envelope(e, &[("role_name", role_name)]),
    };

    let attached: Vec<Value> = ctx
        .call(
            "iam",
            "list-attached-role-policies",
            json!({"RoleName": role_name}),
        )
        .await
        .ok()
        .and_then(|r| r.get("AttachedPolicies").and_then(Value::as_array).cloned())
        .unwrap_or_default()
        .into_iter()
        .map(|p| {
            json!({
                "policy_name": p.get("PolicyName").cloned().unwrap_or(Value::Null),
                "policy_arn": p.get("PolicyArn").cloned().unwrap_or(Value::Null),
            })
        })
        .collect();

    let inline_names: Vec<String> = ctx
        .call("iam", "list-role-policies", json!({"RoleName": role_name}))
        .await
        .ok()
        .and_then(|r| r.get("PolicyNames").and_then(Value::as_array).cloned())
        .unwrap_or_default()
        .into_iter()
        .filter_map(|v| v.as_str().map(|s| s.to_string()))
        .collect();

    let mut inline_policies: Vec<Value> = Vec::new();
    for policy_name in &inline_names {
        if let Ok(response) = ctx
            .call(
                "iam",
                "get-role-policy",
                json!({"RoleName": role_name, "PolicyName": policy_name}),
            )
            .await
        {
            inline_policies.push(json!({
                "policy_name": policy_name,
                "policy_document": response.get("PolicyDocument").cloned().unwrap_or(Value::Null),
            }));
        }
    }

    json!({
        "role_name": role_name,
        "arn": role.get("Arn").cloned().unwrap_or(Value::Null),
        "create_date": role.get("CreateDate").cloned().unwrap_or(Value::Null),
        "attached_policies": attached,
        "inline_policies": inline_policies,
    })
    .to_string()
}

/// Get the default version document of a managed policy.
pub async fn get_iam_policy_document(ctx: &ToolContext, policy_arn: &str) -> String {
    let default_version = match ctx
        .call("iam", "get-policy", json!({"PolicyArn": policy_arn}))
        .await
    {
        Ok(response) => response
            .get("Policy")
            .and_then(|p| p.get("DefaultVersionId"))
            .and_then(Value::as_str)
            .map(|s| s.to_string()),
        Err(e) => return error_envelope(e, &[("policy_arn", policy_arn)]),
    };

    let Some(version_id) = default_version else {
        return error_envelope("Policy has no default version", &[("policy_arn", policy_arn)]);
    };

    match ctx
        .call(
            "iam",
            "get-policy-version",
            json!({"PolicyArn": policy_arn, "VersionId": version_id}),
        )
        .await
    {
        Ok(response) => json!({
            "policy_arn": policy_arn,
            "version_id": version_id,
            "document": response
                .get("PolicyVersion")
                .and_then(|v| v.get("Document"))
                .cloned()
                .unwrap_or(Value::Null),
        })
        .to_string(),
        Err(e) => error_envelope(e, &[("policy_arn", policy_arn)]),
    }
}

/// Ask the policy simulator whether a principal may perform an action.
/// Authoritative where available; permission findings from substring scans
/// should defer to this result.
pub async fn simulate_iam_policy(
    ctx: &ToolContext,
    policy_source_arn: &str,
    action: &str,
    resource_arn: &str,
) -> String {
    match ctx
        .call(
            "iam",
            "simulate-principal-policy",
            json!({
                "PolicySourceArn": policy_source_arn,
                "ActionNames": [action],
                "ResourceArns": [resource_arn],
            }),
        )
        .await
    {
        Ok(response) => {
            let results: Vec<Value> = response
                .get("EvaluationResults")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .map(|r| {
                    json!({
                        "action": r.get("EvalActionName").cloned().unwrap_or(Value::Null),
                        "decision": r.get("EvalDecision").cloned().unwrap_or(Value::Null),
                    })
                })
                .collect();
            json!({
                "policy_source_arn": policy_source_arn,
                "action": action,
                "resource_arn": resource_arn,
                "evaluation_results": results,
            })
            .to_string()
        }
        Err(e) => error_envelope(
            e,
            &[("policy_source_arn", policy_source_arn), ("action", action)],
        ),
    }
}
