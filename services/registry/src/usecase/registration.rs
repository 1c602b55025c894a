use checkpoint_domain::id::{Email, RegistrantId};
use checkpoint_domain::role::{EventRole, RoleFlags};

use crate::domain::repository::{
    AccountRepository, PlatformPort, RegistrantRepository, TeamRepository,
};
use crate::domain::types::{NewRegistrant, RoleMap};
use crate::error::RegistryError;
use crate::usecase::team::process_departure;

/// Map registration-form role codes (`"1"` judge, `"2"` mentor, comma
/// separated) to flags. Unknown codes are ignored; no known code means
/// participant.
pub fn parse_role_codes(raw: &str) -> RoleFlags {
    let flags = raw
        .split(',')
        .filter_map(|code| match code.trim() {
            "1" => Some(EventRole::Judge),
            "2" => Some(EventRole::Mentor),
            _ => None,
        })
        .fold(RoleFlags::default(), RoleFlags::with);
    if flags.is_empty() {
        RoleFlags::default().with(EventRole::Participant)
    } else {
        flags
    }
}

// ── Upsert registrant ────────────────────────────────────────────────────────

pub struct UpsertRegistrantInput {
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub roles: RoleFlags,
    pub is_capstone: bool,
}

pub struct UpsertRegistrantUseCase<R>
where
    R: RegistrantRepository,
{
    pub registrants: R,
}

impl<R> UpsertRegistrantUseCase<R>
where
    R: RegistrantRepository,
{
    pub async fn execute(
        &self,
        input: UpsertRegistrantInput,
    ) -> Result<RegistrantId, RegistryError> {
        let email =
            Email::parse(&input.email).map_err(|e| RegistryError::Validation(e.to_string()))?;
        let registrant = NewRegistrant {
            email,
            first_name: input.first_name.unwrap_or_default().trim().to_owned(),
            last_name: input.last_name.unwrap_or_default().trim().to_owned(),
            roles: input.roles,
            is_capstone: input.is_capstone,
        };
        let id = self.registrants.upsert(&registrant).await?;
        tracing::info!(
            registrant_id = %id,
            email = %registrant.email,
            roles = ?registrant.roles.roles(),
            "registrant upserted"
        );
        Ok(id)
    }
}

// ── Remove registrant ────────────────────────────────────────────────────────

pub struct RemoveRegistrantUseCase<R, A, T, P>
where
    R: RegistrantRepository,
    A: AccountRepository,
    T: TeamRepository,
    P: PlatformPort,
{
    pub registrants: R,
    pub accounts: A,
    pub teams: T,
    pub platform: P,
    pub roles: RoleMap,
}

impl<R, A, T, P> RemoveRegistrantUseCase<R, A, T, P>
where
    R: RegistrantRepository,
    A: AccountRepository,
    T: TeamRepository,
    P: PlatformPort,
{
    /// Delete the registrant with its account and codes. A team the account
    /// belonged to sees a normal departure first.
    pub async fn execute(&self, email: &str) -> Result<(), RegistryError> {
        let email = Email::parse(email).map_err(|e| RegistryError::Validation(e.to_string()))?;
        self.registrants
            .find_by_email(&email)
            .await?
            .ok_or(RegistryError::NotRegistered)?;

        if let Some(account) = self.accounts.find_by_email(&email).await? {
            if account.team_id.is_some() {
                process_departure(&self.teams, &self.platform, &self.roles, &account.external_id)
                    .await?;
            }
            let managed = [
                self.roles.participant.as_str(),
                self.roles.judge.as_str(),
                self.roles.mentor.as_str(),
                self.roles.verified.as_str(),
            ];
            for role_id in managed {
                if let Err(e) = self.platform.revoke_role(&account.external_id, role_id).await {
                    tracing::warn!(
                        external_id = %account.external_id,
                        role_id,
                        error = %e,
                        "failed to revoke role from removed registrant"
                    );
                }
            }
        }

        self.registrants.delete(&email).await?;
        tracing::info!(email = %email, "registrant removed");
        Ok(())
    }
}
