use sea_orm::DatabaseConnection;

use checkpoint_core::middleware::ApiKey;

use crate::domain::types::{CodePolicy, RoleMap, TeamPolicy};
use crate::infra::db::{
    DbAccountRepository, DbRegistrantRepository, DbTeamRepository, DbVerificationCodeRepository,
};
use crate::infra::mailer::BrevoMailer;
use crate::infra::platform::DiscordPlatform;

/// Shared application state passed to every handler via axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub mailer: BrevoMailer,
    pub platform: DiscordPlatform,
    pub api_key: ApiKey,
    pub code_policy: CodePolicy,
    pub team_policy: TeamPolicy,
    pub roles: RoleMap,
    pub organizer_email: Option<String>,
}

impl AppState {
    pub fn registrant_repo(&self) -> DbRegistrantRepository {
        DbRegistrantRepository {
            db: self.db.clone(),
        }
    }

    pub fn account_repo(&self) -> DbAccountRepository {
        DbAccountRepository {
            db: self.db.clone(),
        }
    }

    pub fn code_repo(&self) -> DbVerificationCodeRepository {
        DbVerificationCodeRepository {
            db: self.db.clone(),
        }
    }

    pub fn team_repo(&self) -> DbTeamRepository {
        DbTeamRepository {
            db: self.db.clone(),
            capacity: self.team_policy.capacity,
        }
    }

    pub fn mailer(&self) -> BrevoMailer {
        self.mailer.clone()
    }

    pub fn platform(&self) -> DiscordPlatform {
        self.platform.clone()
    }
}
