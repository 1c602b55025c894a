use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::domain::types::{IneligibleReason, RejectedInvitee};

/// Coarse outcome class callers can branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    NotFound,
    Conflict,
    ExpiredOrInvalid,
    ExternalFailure,
    Internal,
}

/// Registry service domain error variants.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("{0}")]
    Validation(String),
    #[error("registrant not found")]
    NotRegistered,
    #[error("account is not verified")]
    NotVerified,
    #[error("team not found")]
    TeamNotFound,
    #[error("account is not on the team")]
    NotOnTeam,
    #[error("account is already verified")]
    AlreadyVerified,
    #[error("registrant already has a verified account")]
    DuplicateAccount,
    #[error("account is already on a team")]
    AlreadyOnTeam,
    #[error("team is full")]
    TeamFull,
    #[error("team name is taken")]
    NameTaken,
    #[error("account is not eligible: {0}")]
    NotEligible(IneligibleReason),
    #[error("no valid teammates")]
    NoValidTeammates(Vec<RejectedInvitee>),
    #[error("only the team lead can do this")]
    NotTeamLead,
    #[error("verification code is invalid or expired")]
    CodeNotFound,
    #[error("verification code was issued to another account")]
    CodeMismatch,
    #[error("external service failure")]
    External(#[source] anyhow::Error),
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl RegistryError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION",
            Self::NotRegistered => "NOT_REGISTERED",
            Self::NotVerified => "NOT_VERIFIED",
            Self::TeamNotFound => "TEAM_NOT_FOUND",
            Self::NotOnTeam => "NOT_ON_TEAM",
            Self::AlreadyVerified => "ALREADY_VERIFIED",
            Self::DuplicateAccount => "DUPLICATE_ACCOUNT",
            Self::AlreadyOnTeam => "ALREADY_ON_TEAM",
            Self::TeamFull => "TEAM_FULL",
            Self::NameTaken => "NAME_TAKEN",
            Self::NotEligible(_) => "NOT_ELIGIBLE",
            Self::NoValidTeammates(_) => "NO_VALID_TEAMMATES",
            Self::NotTeamLead => "NOT_TEAM_LEAD",
            Self::CodeNotFound => "CODE_NOT_FOUND",
            Self::CodeMismatch => "CODE_MISMATCH",
            Self::External(_) => "EXTERNAL_FAILURE",
            Self::Internal(_) => "INTERNAL",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation(_)
            | Self::NotEligible(_)
            | Self::NoValidTeammates(_)
            | Self::NotTeamLead => ErrorCategory::Validation,
            Self::NotRegistered | Self::NotVerified | Self::TeamNotFound | Self::NotOnTeam => {
                ErrorCategory::NotFound
            }
            Self::AlreadyVerified
            | Self::DuplicateAccount
            | Self::AlreadyOnTeam
            | Self::TeamFull
            | Self::NameTaken => ErrorCategory::Conflict,
            Self::CodeNotFound | Self::CodeMismatch => ErrorCategory::ExpiredOrInvalid,
            Self::External(_) => ErrorCategory::ExternalFailure,
            Self::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// Wraps a collaborator failure.
    pub fn external(error: impl Into<anyhow::Error>) -> Self {
        Self::External(error.into())
    }
}

impl IntoResponse for RegistryError {
    fn into_response(self) -> Response {
        let status = match self.category() {
            ErrorCategory::Validation => StatusCode::BAD_REQUEST,
            ErrorCategory::NotFound => StatusCode::NOT_FOUND,
            ErrorCategory::Conflict => StatusCode::CONFLICT,
            ErrorCategory::ExpiredOrInvalid => StatusCode::UNAUTHORIZED,
            ErrorCategory::ExternalFailure => StatusCode::BAD_GATEWAY,
            ErrorCategory::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        // 4xx are expected outcomes and TraceLayer already records them.
        match &self {
            Self::Internal(e) => tracing::error!(error = ?e, kind = "INTERNAL", "internal error"),
            Self::External(e) => {
                tracing::error!(error = ?e, kind = "EXTERNAL_FAILURE", "external failure")
            }
            _ => {}
        }
        let mut body = serde_json::json!({
            "kind": self.kind(),
            "message": self.to_string(),
        });
        if let Self::NoValidTeammates(rejected) = &self {
            body["rejected"] = serde_json::json!(rejected);
        }
        (status, axum::Json(body)).into_response()
    }
}
