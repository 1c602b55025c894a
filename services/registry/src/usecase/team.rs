use chrono::Utc;
use serde::Serialize;

use checkpoint_domain::id::{ExternalId, TeamId};

use crate::domain::repository::{
    AccountRepository, PlatformPort, RegistrantRepository, TeamRepository,
};
use crate::domain::types::{
    DeletedTeam, Departure, FoundedTeam, IneligibleReason, NewTeam, Registrant, RejectedInvitee,
    RoleMap, TEAM_NAME_MAX_LEN, Team, TeamPolicy, TeamRoster, VerifiedAccount,
};
use crate::error::RegistryError;

pub fn validate_team_name(raw: &str) -> Result<String, RegistryError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(RegistryError::Validation("team name is empty".to_owned()));
    }
    if name.chars().count() > TEAM_NAME_MAX_LEN {
        return Err(RegistryError::Validation(format!(
            "team name is longer than {TEAM_NAME_MAX_LEN} characters"
        )));
    }
    Ok(name.to_owned())
}

/// Whether an account may join a team of the given category.
pub fn check_eligibility(
    account: Option<&VerifiedAccount>,
    registrant: Option<&Registrant>,
    team_is_capstone: bool,
) -> Result<(), IneligibleReason> {
    let (Some(account), Some(registrant)) = (account, registrant) else {
        return Err(IneligibleReason::NotVerified);
    };
    if !registrant.roles.participant {
        return Err(IneligibleReason::NotParticipant);
    }
    if account.team_id.is_some() {
        return Err(IneligibleReason::AlreadyOnTeam);
    }
    if registrant.is_capstone != team_is_capstone {
        return Err(IneligibleReason::CapstoneMismatch);
    }
    Ok(())
}

async fn eligibility<R, A>(
    registrants: &R,
    accounts: &A,
    external_id: &ExternalId,
    team_is_capstone: bool,
) -> Result<Result<(), IneligibleReason>, RegistryError>
where
    R: RegistrantRepository,
    A: AccountRepository,
{
    let account = accounts.find_by_external_id(external_id).await?;
    let registrant = match &account {
        Some(account) => registrants.find_by_email(&account.registrant_email).await?,
        None => None,
    };
    Ok(check_eligibility(
        account.as_ref(),
        registrant.as_ref(),
        team_is_capstone,
    ))
}

/// Grant the team role and the team-assigned role. Failures are logged:
/// membership is already committed and a resync repairs the roles.
async fn grant_team_roles<P>(platform: &P, roles: &RoleMap, team: &Team, member: &ExternalId)
where
    P: PlatformPort,
{
    for role_id in [team.resources.role_id.as_str(), roles.team_assigned.as_str()] {
        if let Err(e) = platform.grant_role(member, role_id).await {
            tracing::warn!(
                team_id = %team.id,
                external_id = %member,
                role_id,
                error = %e,
                "failed to grant team role"
            );
        }
    }
}

async fn revoke_team_roles<P>(platform: &P, roles: &RoleMap, team: &Team, member: &ExternalId)
where
    P: PlatformPort,
{
    for role_id in [team.resources.role_id.as_str(), roles.team_assigned.as_str()] {
        if let Err(e) = platform.revoke_role(member, role_id).await {
            tracing::warn!(
                team_id = %team.id,
                external_id = %member,
                role_id,
                error = %e,
                "failed to revoke team role"
            );
        }
    }
}

/// Remove an account from its team and apply the platform side effects.
pub async fn process_departure<T, P>(
    teams: &T,
    platform: &P,
    roles: &RoleMap,
    external_id: &ExternalId,
) -> Result<Departure, RegistryError>
where
    T: TeamRepository,
    P: PlatformPort,
{
    let departure = teams.remove_member(external_id).await?;
    revoke_team_roles(platform, roles, &departure.team, external_id).await;

    if departure.team_deleted {
        if let Err(e) = platform
            .delete_team_resources(&departure.team.resources)
            .await
        {
            tracing::warn!(team_id = %departure.team.id, error = %e, "failed to delete team resources");
        }
        tracing::info!(team_id = %departure.team.id, "team deleted after last member left");
    } else if let Some(lead) = &departure.new_lead {
        tracing::info!(team_id = %departure.team.id, new_lead = %lead, "team lead reassigned");
    }
    tracing::info!(
        team_id = %departure.team.id,
        external_id = %external_id,
        remaining = departure.remaining,
        "member left team"
    );
    Ok(departure)
}

/// Strip roles from every released member and delete the team's resources.
pub async fn release_deleted_team<P>(platform: &P, roles: &RoleMap, deleted: &DeletedTeam)
where
    P: PlatformPort,
{
    for member in &deleted.released {
        revoke_team_roles(platform, roles, &deleted.team, member).await;
    }
    if let Err(e) = platform
        .delete_team_resources(&deleted.team.resources)
        .await
    {
        tracing::warn!(team_id = %deleted.team.id, error = %e, "failed to delete team resources");
    }
}

// ── Create team ──────────────────────────────────────────────────────────────

pub struct CreateTeamInput {
    pub requester: ExternalId,
    pub name: String,
    pub invitees: Vec<ExternalId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatedTeam {
    pub team: Team,
    pub members: Vec<ExternalId>,
    pub rejected: Vec<RejectedInvitee>,
}

pub struct CreateTeamUseCase<R, A, T, P>
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
    pub policy: TeamPolicy,
    pub roles: RoleMap,
}

impl<R, A, T, P> CreateTeamUseCase<R, A, T, P>
where
    R: RegistrantRepository,
    A: AccountRepository,
    T: TeamRepository,
    P: PlatformPort,
{
    /// Invitees are checked one by one before anything is created, and again
    /// by the store under lock; either check only rejects that invitee. An
    /// empty invitee list founds a forming team of one; a non-empty list with
    /// no valid entry fails with `NoValidTeammates`.
    pub async fn execute(&self, input: CreateTeamInput) -> Result<CreatedTeam, RegistryError> {
        let name = validate_team_name(&input.name)?;

        let requester = self
            .accounts
            .find_by_external_id(&input.requester)
            .await?
            .ok_or(RegistryError::NotVerified)?;
        if requester.team_id.is_some() {
            return Err(RegistryError::AlreadyOnTeam);
        }
        let requester_registrant = self
            .registrants
            .find_by_email(&requester.registrant_email)
            .await?
            .ok_or(RegistryError::NotRegistered)?;
        if self.teams.find_by_name(&name).await?.is_some() {
            return Err(RegistryError::NameTaken);
        }

        let is_capstone = requester_registrant.is_capstone;
        let capacity = self.policy.capacity.for_team(is_capstone);
        let mut members = vec![input.requester.clone()];
        let mut rejected: Vec<RejectedInvitee> = Vec::new();
        for invitee in &input.invitees {
            let verdict = if *invitee == input.requester {
                Err(IneligibleReason::IsRequester)
            } else if members.contains(invitee)
                || rejected.iter().any(|r| r.external_id == *invitee)
            {
                Err(IneligibleReason::Duplicate)
            } else {
                eligibility(&self.registrants, &self.accounts, invitee, is_capstone).await?
            };
            match verdict {
                Ok(()) if members.len() < capacity => members.push(invitee.clone()),
                Ok(()) => rejected.push(RejectedInvitee {
                    external_id: invitee.clone(),
                    reason: IneligibleReason::TeamFull,
                }),
                Err(reason) => rejected.push(RejectedInvitee {
                    external_id: invitee.clone(),
                    reason,
                }),
            }
        }
        if !input.invitees.is_empty() && members.len() == 1 {
            return Err(RegistryError::NoValidTeammates(rejected));
        }

        let id = self.teams.reserve_id().await?;
        let resources = self
            .platform
            .create_team_resources(id, &name, is_capstone)
            .await?;

        let now = Utc::now();
        let new_team = NewTeam {
            id,
            name,
            is_capstone,
            members,
            resources,
            formation_deadline: now + self.policy.formation_grace,
            created_at: now,
        };
        let founded = match self.teams.create(&new_team).await {
            Ok(founded) => founded,
            Err(e) => {
                if let Err(cleanup) = self
                    .platform
                    .delete_team_resources(&new_team.resources)
                    .await
                {
                    tracing::warn!(
                        team_id = %id,
                        error = %cleanup,
                        "failed to roll back team resources"
                    );
                }
                return Err(match e {
                    RegistryError::NoValidTeammates(dropped) => {
                        rejected.extend(dropped);
                        RegistryError::NoValidTeammates(rejected)
                    }
                    other => other,
                });
            }
        };
        let FoundedTeam {
            team,
            members,
            dropped,
        } = founded;
        rejected.extend(dropped);

        for member in &members {
            grant_team_roles(&self.platform, &self.roles, &team, member).await;
        }
        tracing::info!(
            team_id = %team.id,
            name = %team.name,
            members = members.len(),
            rejected = rejected.len(),
            forming = team.is_forming(),
            "team created"
        );
        Ok(CreatedTeam {
            team,
            members,
            rejected,
        })
    }
}

// ── Add member ───────────────────────────────────────────────────────────────

pub struct AddMemberInput {
    pub requester: ExternalId,
    pub team_id: TeamId,
    pub member: ExternalId,
}

pub struct AddMemberUseCase<R, A, T, P>
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

impl<R, A, T, P> AddMemberUseCase<R, A, T, P>
where
    R: RegistrantRepository,
    A: AccountRepository,
    T: TeamRepository,
    P: PlatformPort,
{
    /// Any member may add; capacity is re-checked by the store.
    pub async fn execute(&self, input: AddMemberInput) -> Result<Team, RegistryError> {
        let requester = self
            .accounts
            .find_by_external_id(&input.requester)
            .await?
            .ok_or(RegistryError::NotVerified)?;
        if requester.team_id != Some(input.team_id) {
            return Err(RegistryError::NotOnTeam);
        }
        let team = self
            .teams
            .find_by_id(input.team_id)
            .await?
            .ok_or(RegistryError::TeamNotFound)?;

        match eligibility(
            &self.registrants,
            &self.accounts,
            &input.member,
            team.is_capstone,
        )
        .await?
        {
            Ok(()) => {}
            Err(IneligibleReason::AlreadyOnTeam) => return Err(RegistryError::AlreadyOnTeam),
            Err(IneligibleReason::NotVerified) => return Err(RegistryError::NotVerified),
            Err(reason) => return Err(RegistryError::NotEligible(reason)),
        }

        let team = self
            .teams
            .add_member(input.team_id, &input.member, Utc::now())
            .await?;
        grant_team_roles(&self.platform, &self.roles, &team, &input.member).await;
        tracing::info!(
            team_id = %team.id,
            external_id = %input.member,
            added_by = %input.requester,
            "member added to team"
        );
        Ok(team)
    }
}

// ── Remove member (lead only) ────────────────────────────────────────────────

pub struct RemoveMemberInput {
    pub requester: ExternalId,
    pub team_id: TeamId,
    pub member: ExternalId,
}

pub struct RemoveMemberUseCase<A, T, P>
where
    A: AccountRepository,
    T: TeamRepository,
    P: PlatformPort,
{
    pub accounts: A,
    pub teams: T,
    pub platform: P,
    pub roles: RoleMap,
}

impl<A, T, P> RemoveMemberUseCase<A, T, P>
where
    A: AccountRepository,
    T: TeamRepository,
    P: PlatformPort,
{
    pub async fn execute(&self, input: RemoveMemberInput) -> Result<Departure, RegistryError> {
        let team = self
            .teams
            .find_by_id(input.team_id)
            .await?
            .ok_or(RegistryError::TeamNotFound)?;
        if !team.is_lead(&input.requester) {
            return Err(RegistryError::NotTeamLead);
        }
        let member = self
            .accounts
            .find_by_external_id(&input.member)
            .await?
            .ok_or(RegistryError::NotVerified)?;
        if member.team_id != Some(input.team_id) {
            return Err(RegistryError::NotOnTeam);
        }
        process_departure(&self.teams, &self.platform, &self.roles, &input.member).await
    }
}

// ── Leave team ───────────────────────────────────────────────────────────────

pub struct LeaveTeamUseCase<T, P>
where
    T: TeamRepository,
    P: PlatformPort,
{
    pub teams: T,
    pub platform: P,
    pub roles: RoleMap,
}

impl<T, P> LeaveTeamUseCase<T, P>
where
    T: TeamRepository,
    P: PlatformPort,
{
    pub async fn execute(&self, external_id: &ExternalId) -> Result<Departure, RegistryError> {
        process_departure(&self.teams, &self.platform, &self.roles, external_id).await
    }
}

// ── Transfer lead ────────────────────────────────────────────────────────────

pub struct TransferLeadInput {
    pub requester: ExternalId,
    pub team_id: TeamId,
    pub new_lead: ExternalId,
}

pub struct TransferLeadUseCase<T>
where
    T: TeamRepository,
{
    pub teams: T,
}

impl<T> TransferLeadUseCase<T>
where
    T: TeamRepository,
{
    pub async fn execute(&self, input: TransferLeadInput) -> Result<Team, RegistryError> {
        let team = self
            .teams
            .find_by_id(input.team_id)
            .await?
            .ok_or(RegistryError::TeamNotFound)?;
        if !team.is_lead(&input.requester) {
            return Err(RegistryError::NotTeamLead);
        }
        let team = self.teams.set_lead(input.team_id, &input.new_lead).await?;
        tracing::info!(team_id = %team.id, new_lead = %input.new_lead, "team lead transferred");
        Ok(team)
    }
}

// ── Delete team (administrative) ─────────────────────────────────────────────

pub struct DeleteTeamUseCase<T, P>
where
    T: TeamRepository,
    P: PlatformPort,
{
    pub teams: T,
    pub platform: P,
    pub roles: RoleMap,
}

impl<T, P> DeleteTeamUseCase<T, P>
where
    T: TeamRepository,
    P: PlatformPort,
{
    /// Idempotent: deleting a team that is already gone is not an error.
    pub async fn execute(&self, team_id: TeamId) -> Result<Option<DeletedTeam>, RegistryError> {
        let Some(deleted) = self.teams.delete(team_id).await? else {
            return Ok(None);
        };
        release_deleted_team(&self.platform, &self.roles, &deleted).await;
        tracing::info!(
            team_id = %team_id,
            released = deleted.released.len(),
            "team deleted by administrator"
        );
        Ok(Some(deleted))
    }
}

// ── Queries ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeamDetails {
    pub team: Team,
    pub members: Vec<VerifiedAccount>,
}

pub struct GetTeamUseCase<T>
where
    T: TeamRepository,
{
    pub teams: T,
}

impl<T> GetTeamUseCase<T>
where
    T: TeamRepository,
{
    pub async fn execute(&self, team_id: TeamId) -> Result<TeamDetails, RegistryError> {
        let team = self
            .teams
            .find_by_id(team_id)
            .await?
            .ok_or(RegistryError::TeamNotFound)?;
        let members = self.teams.members_of(team_id).await?;
        Ok(TeamDetails { team, members })
    }
}

/// Export of every team with its members' registration emails.
pub struct ListTeamsUseCase<T>
where
    T: TeamRepository,
{
    pub teams: T,
}

impl<T> ListTeamsUseCase<T>
where
    T: TeamRepository,
{
    pub async fn execute(&self) -> Result<Vec<TeamRoster>, RegistryError> {
        let teams = self.teams.list_with_members().await?;
        Ok(teams
            .into_iter()
            .map(|(team, members)| TeamRoster {
                id: team.id,
                name: team.name,
                is_capstone: team.is_capstone,
                lead: team.lead,
                member_emails: members.into_iter().map(|m| m.registrant_email).collect(),
            })
            .collect())
    }
}

pub struct NextTeamIdUseCase<T>
where
    T: TeamRepository,
{
    pub teams: T,
}

impl<T> NextTeamIdUseCase<T>
where
    T: TeamRepository,
{
    pub async fn execute(&self) -> Result<TeamId, RegistryError> {
        self.teams.peek_next_id().await
    }
}
