use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use checkpoint_domain::id::RegistrantId;

use crate::error::RegistryError;
use crate::state::AppState;
use crate::usecase::registration::{
    RemoveRegistrantUseCase, UpsertRegistrantInput, UpsertRegistrantUseCase, parse_role_codes,
};

/// Value of `isAdultOrOSU` that marks a registrant as ineligible.
const INELIGIBLE_AGE_ANSWER: i64 = 2;

// ── POST /registrants ────────────────────────────────────────────────────────

/// Registration form webhook body. Form tools send scalars as either JSON
/// numbers, booleans or strings, so the loose fields stay untyped.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationPayload {
    pub email: String,
    #[serde(default)]
    pub roles: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub is_capstone: Option<Value>,
    #[serde(default, rename = "isAdultOrOSU")]
    pub is_adult_or_osu: Option<Value>,
}

#[derive(Serialize)]
pub struct RegistrationResponse {
    pub id: RegistrantId,
}

fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_i64().is_some_and(|n| n != 0),
        Value::String(s) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "y"
        ),
        _ => false,
    }
}

pub async fn upsert_registrant(
    State(state): State<AppState>,
    Json(body): Json<RegistrationPayload>,
) -> Result<Json<RegistrationResponse>, RegistryError> {
    if body.is_adult_or_osu.as_ref().and_then(as_integer) == Some(INELIGIBLE_AGE_ANSWER) {
        return Err(RegistryError::Validation(
            "registrant is not eligible to participate".to_owned(),
        ));
    }

    let usecase = UpsertRegistrantUseCase {
        registrants: state.registrant_repo(),
    };
    let id = usecase
        .execute(UpsertRegistrantInput {
            email: body.email,
            first_name: body.first_name,
            last_name: body.last_name,
            roles: parse_role_codes(body.roles.as_deref().unwrap_or_default()),
            is_capstone: body.is_capstone.as_ref().is_some_and(is_truthy),
        })
        .await?;
    Ok(Json(RegistrationResponse { id }))
}

// ── DELETE /registrants/{email} ──────────────────────────────────────────────

pub async fn remove_registrant(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<StatusCode, RegistryError> {
    let usecase = RemoveRegistrantUseCase {
        registrants: state.registrant_repo(),
        accounts: state.account_repo(),
        teams: state.team_repo(),
        platform: state.platform(),
        roles: state.roles.clone(),
    };
    usecase.execute(&email).await?;
    Ok(StatusCode::NO_CONTENT)
}
