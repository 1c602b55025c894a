use axum::{Json, extract::State};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use checkpoint_domain::id::Email;
use checkpoint_domain::role::{EventRole, RoleFlags};

use crate::domain::types::VerifiedAccount;
use crate::error::RegistryError;
use crate::handlers::external_id;
use crate::state::AppState;
use crate::usecase::verification::{
    AdminVerifyInput, AdminVerifyUseCase, RedeemCodeInput, RedeemCodeUseCase, RequestCodeInput,
    RequestCodeUseCase, ResyncRolesUseCase, RoleSync, VerifiedOutput, VerifyTarget,
};

// ── Response types ───────────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VerifyResponse {
    CodeSent {
        email: Email,
        #[serde(serialize_with = "checkpoint_core::serde::to_rfc3339_ms")]
        expires_at: DateTime<Utc>,
    },
    Verified {
        account: VerifiedAccount,
        roles: Vec<EventRole>,
    },
}

impl From<VerifiedOutput> for VerifyResponse {
    fn from(output: VerifiedOutput) -> Self {
        Self::Verified {
            account: output.account,
            roles: output.roles.roles(),
        }
    }
}

// ── POST /verify ─────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct VerifyRequest {
    pub external_id: String,
    pub display_name: String,
    /// Digits redeem a code; anything else requests one by email.
    pub email_or_code: String,
}

pub async fn verify(
    State(state): State<AppState>,
    Json(body): Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>, RegistryError> {
    let external_id = external_id(&body.external_id)?;
    match VerifyTarget::classify(&body.email_or_code)? {
        VerifyTarget::Email(email) => {
            let usecase = RequestCodeUseCase {
                registrants: state.registrant_repo(),
                accounts: state.account_repo(),
                codes: state.code_repo(),
                mailer: state.mailer(),
                policy: state.code_policy,
                organizer_email: state.organizer_email.clone(),
            };
            let sent = usecase
                .execute(RequestCodeInput {
                    external_id,
                    display_name: body.display_name,
                    email,
                })
                .await?;
            Ok(Json(VerifyResponse::CodeSent {
                email: sent.email,
                expires_at: sent.expires_at,
            }))
        }
        VerifyTarget::Code(code) => {
            let usecase = RedeemCodeUseCase {
                registrants: state.registrant_repo(),
                accounts: state.account_repo(),
                codes: state.code_repo(),
                platform: state.platform(),
                roles: state.roles.clone(),
            };
            let output = usecase
                .execute(RedeemCodeInput {
                    external_id,
                    display_name: body.display_name,
                    code,
                })
                .await?;
            Ok(Json(output.into()))
        }
    }
}

// ── POST /verify/admin ───────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct AdminVerifyRequest {
    pub external_id: String,
    pub display_name: String,
    pub email: String,
    pub roles: Vec<EventRole>,
}

pub async fn admin_verify(
    State(state): State<AppState>,
    Json(body): Json<AdminVerifyRequest>,
) -> Result<Json<VerifyResponse>, RegistryError> {
    let usecase = AdminVerifyUseCase {
        registrants: state.registrant_repo(),
        accounts: state.account_repo(),
        platform: state.platform(),
        roles: state.roles.clone(),
    };
    let output = usecase
        .execute(AdminVerifyInput {
            external_id: external_id(&body.external_id)?,
            display_name: body.display_name,
            email: body.email,
            roles: RoleFlags::from_roles(body.roles),
        })
        .await?;
    Ok(Json(output.into()))
}

// ── POST /verify/resync ──────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct ResyncRequest {
    pub external_id: String,
}

pub async fn resync_roles(
    State(state): State<AppState>,
    Json(body): Json<ResyncRequest>,
) -> Result<Json<RoleSync>, RegistryError> {
    let usecase = ResyncRolesUseCase {
        registrants: state.registrant_repo(),
        accounts: state.account_repo(),
        teams: state.team_repo(),
        platform: state.platform(),
        roles: state.roles.clone(),
    };
    let sync = usecase.execute(&external_id(&body.external_id)?).await?;
    Ok(Json(sync))
}
