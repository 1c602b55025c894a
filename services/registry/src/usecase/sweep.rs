use chrono::{DateTime, Utc};

use crate::domain::repository::{PlatformPort, TeamRepository, VerificationCodeRepository};
use crate::domain::types::RoleMap;
use crate::error::RegistryError;
use crate::usecase::team::release_deleted_team;

pub struct SweepExpiredCodesUseCase<C>
where
    C: VerificationCodeRepository,
{
    pub codes: C,
}

impl<C> SweepExpiredCodesUseCase<C>
where
    C: VerificationCodeRepository,
{
    pub async fn execute(&self, now: DateTime<Utc>) -> Result<u64, RegistryError> {
        let removed = self.codes.delete_expired(now).await?;
        if removed > 0 {
            tracing::info!(removed, "expired verification codes swept");
        }
        Ok(removed)
    }
}

pub struct FormationTimeoutSweepUseCase<T, P>
where
    T: TeamRepository,
    P: PlatformPort,
{
    pub teams: T,
    pub platform: P,
    pub roles: RoleMap,
}

impl<T, P> FormationTimeoutSweepUseCase<T, P>
where
    T: TeamRepository,
    P: PlatformPort,
{
    /// Delete forming teams past their deadline that are still undersized.
    /// Each team is re-checked under lock; a failure on one team is logged
    /// and the sweep moves on. Returns the number of teams deleted.
    pub async fn execute(&self, now: DateTime<Utc>) -> Result<usize, RegistryError> {
        let expired = self.teams.list_expired_forming(now).await?;
        let mut deleted = 0;
        for team in expired {
            match self.teams.delete_if_still_forming(team.id, now).await {
                Ok(Some(gone)) => {
                    release_deleted_team(&self.platform, &self.roles, &gone).await;
                    tracing::info!(
                        team_id = %team.id,
                        name = %team.name,
                        released = gone.released.len(),
                        "forming team timed out"
                    );
                    deleted += 1;
                }
                Ok(None) => {
                    tracing::debug!(team_id = %team.id, "team no longer eligible for timeout");
                }
                Err(e) => {
                    tracing::warn!(team_id = %team.id, error = %e, "formation timeout failed");
                }
            }
        }
        Ok(deleted)
    }
}
