#![allow(async_fn_in_trait)]

use chrono::{DateTime, Utc};

use checkpoint_domain::id::{Email, ExternalId, RegistrantId, TeamId};

use crate::domain::types::{
    DeletedTeam, Departure, FoundedTeam, NewRegistrant, NewTeam, Registrant, Team,
    TeamResources, VerificationCode, VerificationEmail, VerifiedAccount,
};
use crate::error::RegistryError;

/// Registrant records keyed by email.
pub trait RegistrantRepository: Send + Sync {
    async fn find_by_email(&self, email: &Email) -> Result<Option<Registrant>, RegistryError>;

    /// Insert or replace names, role flags and capstone status for `registrant.email`.
    /// Fails with `AlreadyVerified` once the email is bound to an account.
    async fn upsert(&self, registrant: &NewRegistrant) -> Result<RegistrantId, RegistryError>;

    /// Create the registrant if absent, otherwise union `registrant.roles` into
    /// the stored flags. Names and capstone status of an existing row are kept.
    async fn merge_roles(&self, registrant: &NewRegistrant) -> Result<Registrant, RegistryError>;

    /// Delete the registrant; its account and codes go with it.
    /// Returns `true` if deleted, `false` if not found.
    async fn delete(&self, email: &Email) -> Result<bool, RegistryError>;
}

/// Verified accounts, unique per registrant email and per external id.
pub trait AccountRepository: Send + Sync {
    async fn find_by_external_id(
        &self,
        external_id: &ExternalId,
    ) -> Result<Option<VerifiedAccount>, RegistryError>;

    async fn find_by_email(&self, email: &Email) -> Result<Option<VerifiedAccount>, RegistryError>;

    /// Fails with `DuplicateAccount` if either key is already bound.
    async fn create(&self, account: &VerifiedAccount) -> Result<(), RegistryError>;

    /// Returns `true` if deleted, `false` if not found.
    async fn delete(&self, external_id: &ExternalId) -> Result<bool, RegistryError>;
}

/// Outstanding one-time verification codes.
pub trait VerificationCodeRepository: Send + Sync {
    /// Store `code`, dropping any code outstanding for the same email or
    /// external id. Returns `false` without writing if the code string is
    /// already outstanding.
    async fn issue(&self, code: &VerificationCode) -> Result<bool, RegistryError>;

    /// Consume `code` on behalf of `external_id` and create the verified
    /// account it proves, in one transaction.
    ///
    /// Absent, consumed and expired codes all yield `CodeNotFound`; a code
    /// bound to another external id yields `CodeMismatch` and stays valid.
    async fn redeem(
        &self,
        code: &str,
        external_id: &ExternalId,
        display_name: &str,
        now: DateTime<Utc>,
    ) -> Result<VerifiedAccount, RegistryError>;

    /// Returns `true` if the code was still outstanding.
    async fn invalidate(&self, code: &str) -> Result<bool, RegistryError>;

    /// Delete every code with `expires_at <= now`. Returns the number removed.
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, RegistryError>;
}

/// Teams and their membership. Capacity is enforced by the store.
pub trait TeamRepository: Send + Sync {
    /// Id the next reservation will most likely receive. Display only.
    async fn peek_next_id(&self) -> Result<TeamId, RegistryError>;

    /// Take the next id from the sequence. Reserved ids are never reused.
    async fn reserve_id(&self) -> Result<TeamId, RegistryError>;

    /// Persist the team and assign its members in one transaction.
    ///
    /// The first member is the requester: if it is unverified or already on a
    /// team the call fails with `NotVerified` or `AlreadyOnTeam`. Invitees that
    /// no longer qualify under lock are dropped and reported in
    /// `FoundedTeam::dropped`. If invitees were given and every one was
    /// dropped, the call fails with `NoValidTeammates` and writes nothing.
    /// Also fails with `NameTaken` or `TeamFull`.
    async fn create(&self, team: &NewTeam) -> Result<FoundedTeam, RegistryError>;

    async fn find_by_id(&self, id: TeamId) -> Result<Option<Team>, RegistryError>;

    async fn find_by_name(&self, name: &str) -> Result<Option<Team>, RegistryError>;

    async fn members_of(&self, id: TeamId) -> Result<Vec<VerifiedAccount>, RegistryError>;

    /// Every team in id order, each with its members.
    async fn list_with_members(&self) -> Result<Vec<(Team, Vec<VerifiedAccount>)>, RegistryError>;

    async fn team_size(&self, id: TeamId) -> Result<usize, RegistryError>;

    /// Assign the account to the team, re-checking capacity under the team
    /// row lock. Reaching two members activates a forming team.
    async fn add_member(
        &self,
        id: TeamId,
        external_id: &ExternalId,
        now: DateTime<Utc>,
    ) -> Result<Team, RegistryError>;

    /// Clear the account's team. The last member leaving deletes the team;
    /// the lead leaving hands the lead to a random remaining member.
    async fn remove_member(&self, external_id: &ExternalId) -> Result<Departure, RegistryError>;

    /// Fails with `NotOnTeam` unless `lead` is a member of the team.
    async fn set_lead(&self, id: TeamId, lead: &ExternalId) -> Result<Team, RegistryError>;

    /// Release all members and delete the row. `None` if already gone.
    async fn delete(&self, id: TeamId) -> Result<Option<DeletedTeam>, RegistryError>;

    /// Forming teams whose formation deadline is at or before `now`.
    async fn list_expired_forming(&self, now: DateTime<Utc>) -> Result<Vec<Team>, RegistryError>;

    /// Delete the team only if it is still forming, past its deadline and has
    /// at most one member. `None` if any of that no longer holds.
    async fn delete_if_still_forming(
        &self,
        id: TeamId,
        now: DateTime<Utc>,
    ) -> Result<Option<DeletedTeam>, RegistryError>;
}

/// Port for delivering verification emails.
pub trait MailPort: Send + Sync {
    async fn send_verification_email(&self, email: &VerificationEmail)
    -> Result<(), RegistryError>;
}

/// Port for the chat platform. Grants and revokes are idempotent.
pub trait PlatformPort: Send + Sync {
    async fn grant_role(&self, account: &ExternalId, role_id: &str) -> Result<(), RegistryError>;

    async fn revoke_role(&self, account: &ExternalId, role_id: &str) -> Result<(), RegistryError>;

    async fn create_team_resources(
        &self,
        team_id: TeamId,
        team_name: &str,
        is_capstone: bool,
    ) -> Result<TeamResources, RegistryError>;

    async fn delete_team_resources(&self, resources: &TeamResources) -> Result<(), RegistryError>;
}
