//! POST /hook/:id ingress (§4.K, §6.3).
//!
//! Auth -> lookup -> parse -> validate -> screen -> template -> dispatch,
//! each stage able to reject before the next runs.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use tracing::{info, warn};
use warden_budget::BudgetStore;
use warden_core::clock::Clock;
use warden_prompt::assemble::webhook_prompt;
use warden_schedule::store::ScheduleStore;

use crate::auth::verify_bearer;
use crate::dispatch::WebhookDispatcher;
use crate::screen::screen_fields;
use crate::validate::validate_payload;

pub struct WebhookState {
    pub schedule: ScheduleStore,
    pub secret: String,
    pub budget: BudgetStore,
    pub dispatcher: Arc<dyn WebhookDispatcher>,
    pub clock: Arc<dyn Clock>,
}

pub fn router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route("/hook/{id}", post(handle_webhook))
        .with_state(state)
}

/// Replace every `{field}` placeholder in `template` with its matching
/// value from `fields`. Placeholders with no matching field are left
/// untouched verbatim.
fn render_template(template: &str, fields: &[(String, String)]) -> String {
    let mut out = template.to_string();
    for (key, value) in fields {
        out = out.replace(&format!("{{{key}}}"), value);
    }
    out
}

async fn handle_webhook(
    State(state): State<Arc<WebhookState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), (StatusCode, Json<Value>)> {
    let auth_header = headers.get("authorization").and_then(|v| v.to_str().ok());
    if !verify_bearer(auth_header, &state.secret) {
        warn!(webhook = %id, "webhook rejected: bad or missing bearer token");
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "unauthorized"})),
        ));
    }

    let spec = state
        .schedule
        .find_webhook(&id)
        .map_err(|e| internal_error(&id, &e.to_string()))?
        .ok_or_else(|| {
            warn!(webhook = %id, "unknown webhook id");
            (StatusCode::NOT_FOUND, Json(json!({"error": "unknown webhook"})))
        })?;

    let payload: Value = serde_json::from_slice(&body).map_err(|e| {
        warn!(webhook = %id, error = %e, "invalid JSON body");
        (StatusCode::BAD_REQUEST, Json(json!({"error": "invalid JSON body"})))
    })?;

    let mut fields = validate_payload(&spec, &payload).map_err(|errors| {
        warn!(webhook = %id, errors = ?errors, "webhook payload failed validation");
        let joined = errors.join("; ");
        (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": format!("validation failed: {joined}")})),
        )
    })?;

    let redacted = screen_fields(&mut fields);
    if redacted > 0 {
        warn!(webhook = %id, redacted, "redacted probable prompt injection in webhook fields");
    }

    let rendered_message = render_template(&spec.message, &fields);

    let now = state.clock.now();
    let budget = state.budget.load(now).unwrap_or_else(|e| {
        warn!(webhook = %id, error = %e, "failed to load ping budget, using fresh budget");
        warden_budget::PingBudget::new(now)
    });

    let prompt = webhook_prompt(&id, &fields, &rendered_message, &spec.policy, false, &budget, now);

    state
        .dispatcher
        .dispatch(&id, prompt)
        .await
        .map_err(|e| internal_error(&id, &e.to_string()))?;

    info!(webhook = %id, "webhook accepted");
    Ok((StatusCode::ACCEPTED, Json(json!({"status": "accepted"}))))
}

fn internal_error(id: &str, reason: &str) -> (StatusCode, Json<Value>) {
    warn!(webhook = %id, reason = %reason, "webhook processing failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": "internal error"})),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_template_substitutes_present_fields() {
        let fields = vec![("repo".to_string(), "ollim-bot".to_string())];
        assert_eq!(render_template("Check {repo} build.", &fields), "Check ollim-bot build.");
    }

    #[test]
    fn render_template_leaves_unmatched_placeholders() {
        let fields = vec![("repo".to_string(), "ollim-bot".to_string())];
        assert_eq!(render_template("{repo} / {branch}", &fields), "ollim-bot / {branch}");
    }
}
