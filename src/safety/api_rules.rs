// SPDX-License-Identifier: Apache-2.0

//! Risk rules for management API requests and auth-admin SDK calls.
//!
//! API paths are matched against templates whose `{placeholders}` match one
//! path segment. The most dangerous matching rule wins.

use std::sync::OnceLock;

use gate_core::{EngineError, EngineResult, RiskTier};
use regex::Regex;

/// (tier, method, path templates)
const PATH_RULES: &[(RiskTier, &str, &[&str])] = &[
    // Deleting the project is irreversible.
    (RiskTier::Blocked, "DELETE", &["/v1/projects/{ref}"]),
    (
        RiskTier::Destructive,
        "DELETE",
        &[
            "/v1/projects/{ref}/branches/{branch_id}",
            "/v1/projects/{ref}/branches",
            "/v1/projects/{ref}/custom-hostname",
            "/v1/projects/{ref}/vanity-subdomain",
            "/v1/projects/{ref}/network-bans",
            "/v1/projects/{ref}/secrets",
            "/v1/projects/{ref}/functions/{function_slug}",
            "/v1/projects/{ref}/api-keys/{id}",
            "/v1/projects/{ref}/config/auth/sso/providers/{provider_id}",
            "/v1/projects/{ref}/config/auth/signing-keys/{id}",
        ],
    ),
    (
        RiskTier::Destructive,
        "POST",
        &[
            "/v1/projects/{ref}/pause",
            "/v1/projects/{ref}/restore",
            "/v1/projects/{ref}/restore/cancel",
            "/v1/projects/{ref}/upgrade",
            "/v1/projects/{ref}/read-replicas/remove",
            "/v1/projects/{ref}/readonly/temporary-disable",
            "/v1/projects/{ref}/database/backups/restore-pitr",
            "/v1/projects/{ref}/branches/{branch_id}/reset",
            // Arbitrary SQL that never passes through the statement classifier
            "/v1/projects/{ref}/database/query",
        ],
    ),
    (
        RiskTier::Destructive,
        "PUT",
        &["/v1/projects/{ref}/pgsodium"],
    ),
];

const READ_METHODS: &[&str] = &["GET", "HEAD", "OPTIONS"];
const WRITE_METHODS: &[&str] = &["POST", "PUT", "PATCH", "DELETE"];

struct CompiledRule {
    tier: RiskTier,
    method: &'static str,
    pattern: Regex,
}

/// Regex for a path template: literal segments escaped, placeholders match
/// one segment, optional trailing slash.
pub fn template_to_regex(template: &str) -> String {
    let body = template
        .trim_end_matches('/')
        .split('/')
        .map(|segment| {
            if segment.starts_with('{') && segment.ends_with('}') {
                "[^/]+".to_string()
            } else {
                regex::escape(segment)
            }
        })
        .collect::<Vec<_>>()
        .join("/");
    format!("^{body}/?$")
}

fn compiled_rules() -> &'static [CompiledRule] {
    static RULES: OnceLock<Vec<CompiledRule>> = OnceLock::new();
    RULES.get_or_init(|| {
        PATH_RULES
            .iter()
            .flat_map(|(tier, method, templates)| {
                templates.iter().filter_map(move |template| {
                    Regex::new(&template_to_regex(template)).ok().map(|pattern| CompiledRule {
                        tier: *tier,
                        method: *method,
                        pattern,
                    })
                })
            })
            .collect()
    })
}

/// Risk tier of a management API request.
pub fn classify_request(method: &str, path: &str) -> EngineResult<RiskTier> {
    let method = method.trim().to_ascii_uppercase();
    if !READ_METHODS.contains(&method.as_str()) && !WRITE_METHODS.contains(&method.as_str()) {
        return Err(EngineError::validation(format!("Unsupported HTTP method '{method}'")));
    }
    let path = path.split('?').next().unwrap_or_default();
    if !path.starts_with('/') {
        return Err(EngineError::validation(format!("API path must start with '/', got '{path}'")));
    }

    let matched = compiled_rules()
        .iter()
        .filter(|rule| rule.method == method && rule.pattern.is_match(path))
        .map(|rule| rule.tier)
        .max();

    Ok(match matched {
        Some(tier) => tier,
        None if READ_METHODS.contains(&method.as_str()) => RiskTier::Safe,
        None => RiskTier::Write,
    })
}

/// Risk tier of an auth-admin SDK method.
pub fn classify_sdk_method(name: &str) -> EngineResult<RiskTier> {
    match name {
        "get_user_by_id" | "list_users" => Ok(RiskTier::Safe),
        "create_user" | "invite_user_by_email" | "generate_link" | "update_user_by_id" => Ok(RiskTier::Write),
        "delete_user" | "delete_factor" => Ok(RiskTier::Destructive),
        other => Err(EngineError::validation(format!("Unknown auth admin method '{other}'"))),
    }
}
