//! HTTP handlers for the policy admin endpoints.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/acl` | Current rules, default policy, and version |
//! | `GET` | `/acl/stats` | Manager statistics |
//! | `POST` | `/acl/rules` | Add a rule (optional index) |
//! | `PUT` | `/acl/rules/{index}` | Replace a rule |
//! | `DELETE` | `/acl/rules/{index}` | Delete a rule |
//! | `PUT` | `/acl/default-policy` | Set the default policy |
//! | `POST` | `/acl/validate` | Validate a policy document without mutating |
//! | `POST` | `/acl/reload` | Re-read the policy file |
//!
//! In cluster mode, mutations on a non-leader answer
//! `503 {"error": "not_leader", "leader": "<addr>"}` so the front end can
//! forward to the leader; there is no transparent internal forward. The
//! validate endpoint always answers `200` with `{valid, errors[]}`.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::replication::ReplicatedPolicy;
use crate::rule::{DefaultPolicy, Rights, Rule, Scope};
use crate::{Error, Result};

// ── Request / Response types ───────────────────────────────────────────

/// A rule as submitted over the wire: rights and scope arrive as the same
/// string atoms the policy file uses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleDraft {
    /// DN the rule applies to, or `*`.
    pub target: String,
    /// Subject token or literal DN.
    pub subject: String,
    /// Scope atom; empty means `subtree`.
    #[serde(default)]
    pub scope: String,
    /// Right atoms; must resolve to a non-empty set.
    #[serde(default)]
    pub rights: Vec<String>,
    /// Attribute names; empty means any.
    #[serde(default)]
    pub attributes: Vec<String>,
    /// Deny instead of allow.
    #[serde(default)]
    pub deny: bool,
}

impl RuleDraft {
    /// Resolve atoms and validate into a [`Rule`]. `index` is carried into
    /// validation errors.
    pub fn build(&self, index: usize) -> Result<Rule> {
        let rule = Rule {
            target: self.target.clone(),
            subject: self.subject.clone(),
            scope: Scope::parse(&self.scope)?,
            rights: Rights::from_names(&self.rights)?,
            attributes: self.attributes.clone(),
            deny: self.deny,
        };
        rule.validate(index)?;
        Ok(rule)
    }
}

/// Body of `POST /acl/rules`.
#[derive(Debug, Deserialize)]
pub struct AddRuleRequest {
    /// The rule to insert.
    pub rule: RuleDraft,
    /// Insertion position; omitted or past-the-end appends.
    #[serde(default)]
    pub index: Option<usize>,
}

/// Body of `PUT /acl/default-policy`.
#[derive(Debug, Deserialize)]
pub struct SetDefaultPolicyRequest {
    /// `allow` or `deny` (case-insensitive).
    pub policy: String,
}

/// Body of `POST /acl/validate`: a full policy document draft.
#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    /// Default policy to validate; empty or omitted is accepted.
    #[serde(default, rename = "defaultPolicy")]
    pub default_policy: Option<String>,
    /// Rules to validate.
    #[serde(default)]
    pub rules: Vec<RuleDraft>,
}

/// Answer of `POST /acl/validate`.
#[derive(Debug, Serialize)]
pub struct ValidateResponse {
    /// Whether every part of the document validated.
    pub valid: bool,
    /// One message per rejected part.
    pub errors: Vec<String>,
}

/// Error envelope for failed admin calls.
#[derive(Debug, Serialize)]
struct ErrorBody {
    /// Stable machine-readable code (e.g. `not_leader`).
    error: &'static str,
    /// Human-readable description.
    message: String,
    /// Leader address, present on `not_leader` answers when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    leader: Option<String>,
}

fn error_response(err: &Error) -> Response {
    let leader = match err {
        Error::NotLeader { leader } => leader.clone(),
        _ => None,
    };
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        Json(ErrorBody {
            error: err.code(),
            message: err.to_string(),
            leader,
        }),
    )
        .into_response()
}

// ── Route builder ─────────────────────────────────────────────────────

/// Build the admin routes, mounted at `/acl`.
///
/// The caller is expected to wrap these in its own authentication layer;
/// policy administration is never anonymous in a deployed server.
pub fn admin_routes(policy: Arc<ReplicatedPolicy>) -> Router {
    Router::new()
        .route("/acl", get(get_policy))
        .route("/acl/stats", get(get_stats))
        .route("/acl/rules", post(add_rule))
        .route("/acl/rules/{index}", put(update_rule).delete(delete_rule))
        .route("/acl/default-policy", put(set_default_policy))
        .route("/acl/validate", post(validate))
        .route("/acl/reload", post(reload))
        .with_state(policy)
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn get_policy(State(policy): State<Arc<ReplicatedPolicy>>) -> Response {
    let store = policy.manager().store();
    Json(&*store).into_response()
}

async fn get_stats(State(policy): State<Arc<ReplicatedPolicy>>) -> Response {
    Json(policy.manager().stats()).into_response()
}

async fn add_rule(
    State(policy): State<Arc<ReplicatedPolicy>>,
    Json(req): Json<AddRuleRequest>,
) -> Response {
    let index_hint = req
        .index
        .unwrap_or_else(|| policy.manager().store().rule_count());
    let rule = match req.rule.build(index_hint) {
        Ok(rule) => rule,
        Err(e) => return error_response(&e),
    };
    match policy.add_rule(rule, req.index).await {
        Ok(()) => (StatusCode::CREATED, Json(json!({ "status": "ok" }))).into_response(),
        Err(e) => error_response(&e),
    }
}

async fn update_rule(
    State(policy): State<Arc<ReplicatedPolicy>>,
    Path(index): Path<usize>,
    Json(draft): Json<RuleDraft>,
) -> Response {
    let rule = match draft.build(index) {
        Ok(rule) => rule,
        Err(e) => return error_response(&e),
    };
    match policy.update_rule(index, rule).await {
        Ok(()) => Json(json!({ "status": "ok" })).into_response(),
        Err(e) => error_response(&e),
    }
}

async fn delete_rule(
    State(policy): State<Arc<ReplicatedPolicy>>,
    Path(index): Path<usize>,
) -> Response {
    match policy.delete_rule(index).await {
        Ok(()) => Json(json!({ "status": "ok" })).into_response(),
        Err(e) => error_response(&e),
    }
}

async fn set_default_policy(
    State(policy): State<Arc<ReplicatedPolicy>>,
    Json(req): Json<SetDefaultPolicyRequest>,
) -> Response {
    match policy.set_default_policy(&req.policy).await {
        Ok(()) => Json(json!({ "status": "ok" })).into_response(),
        Err(e) => error_response(&e),
    }
}

async fn validate(Json(req): Json<ValidateRequest>) -> Response {
    let mut errors = Vec::new();

    if let Some(policy) = req.default_policy.as_deref()
        && !policy.is_empty()
        && let Err(e) = DefaultPolicy::parse(policy)
    {
        errors.push(e.to_string());
    }

    for (index, draft) in req.rules.iter().enumerate() {
        if let Err(e) = draft.build(index) {
            errors.push(e.to_string());
        }
    }

    Json(ValidateResponse {
        valid: errors.is_empty(),
        errors,
    })
    .into_response()
}

async fn reload(State(policy): State<Arc<ReplicatedPolicy>>) -> Response {
    match policy.manager().reload() {
        Ok(()) => Json(json!({
            "status": "ok",
            "version": policy.manager().version(),
        }))
        .into_response(),
        Err(e) => error_response(&e),
    }
}
