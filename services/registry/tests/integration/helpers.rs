use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use checkpoint_domain::id::{Email, ExternalId, RegistrantId, TeamId};
use checkpoint_domain::role::{EventRole, RoleFlags};

use checkpoint_registry::domain::repository::{
    AccountRepository, MailPort, PlatformPort, RegistrantRepository, TeamRepository,
    VerificationCodeRepository,
};
use checkpoint_registry::domain::types::{
    DeletedTeam, Departure, FoundedTeam, IneligibleReason, MIN_ACTIVE_TEAM_SIZE, NewRegistrant,
    NewTeam, Registrant, RejectedInvitee, RoleMap, Team, TeamCapacity, TeamPolicy, TeamResources,
    VerificationCode, VerificationEmail, VerifiedAccount,
};
use checkpoint_registry::error::RegistryError;

// ── Fixtures ─────────────────────────────────────────────────────────────────

pub fn ext(raw: &str) -> ExternalId {
    ExternalId::parse(raw).unwrap()
}

pub fn email(raw: &str) -> Email {
    Email::parse(raw).unwrap()
}

pub fn participant() -> RoleFlags {
    RoleFlags::from_roles([EventRole::Participant])
}

pub fn role_map() -> RoleMap {
    RoleMap {
        participant: "role-participant".to_owned(),
        judge: "role-judge".to_owned(),
        mentor: "role-mentor".to_owned(),
        verified: "role-verified".to_owned(),
        team_assigned: "role-team-assigned".to_owned(),
    }
}

pub fn team_policy() -> TeamPolicy {
    TeamPolicy::default()
}

// ── MemoryStore ──────────────────────────────────────────────────────────────

#[derive(Default)]
struct Tables {
    registrants: Vec<Registrant>,
    accounts: Vec<VerifiedAccount>,
    codes: Vec<VerificationCode>,
    teams: Vec<Team>,
    last_team_id: i64,
    /// Applied at the start of the next team creation.
    pending_join: Option<(ExternalId, TeamId)>,
    fail_team_create: bool,
}

impl Tables {
    fn account_mut(&mut self, external_id: &ExternalId) -> Option<&mut VerifiedAccount> {
        self.accounts
            .iter_mut()
            .find(|a| a.external_id == *external_id)
    }

    fn team_mut(&mut self, id: TeamId) -> Option<&mut Team> {
        self.teams.iter_mut().find(|t| t.id == id)
    }

    fn member_ids(&self, id: TeamId) -> Vec<ExternalId> {
        self.accounts
            .iter()
            .filter(|a| a.team_id == Some(id))
            .map(|a| a.external_id.clone())
            .collect()
    }

    fn remove_team(&mut self, id: TeamId) -> Option<DeletedTeam> {
        let index = self.teams.iter().position(|t| t.id == id)?;
        let team = self.teams.remove(index);
        let released = self.member_ids(id);
        for account in self.accounts.iter_mut().filter(|a| a.team_id == Some(id)) {
            account.team_id = None;
        }
        Some(DeletedTeam { team, released })
    }
}

/// In-memory stand-in for the Postgres store. Clones share the same tables,
/// so one instance can back every repository a use case needs.
#[derive(Clone)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    capacity: TeamCapacity,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: Arc::new(Mutex::new(Tables::default())),
            capacity: TeamCapacity::default(),
        }
    }

    /// Seed a registrant directly.
    pub fn register(&self, address: &str, roles: RoleFlags, is_capstone: bool) {
        let now = Utc::now();
        self.tables.lock().unwrap().registrants.push(Registrant {
            id: RegistrantId(Uuid::now_v7()),
            email: email(address),
            first_name: "Ada".to_owned(),
            last_name: "Lovelace".to_owned(),
            roles,
            is_capstone,
            created_at: now,
            updated_at: now,
        });
    }

    /// Seed a verified account bound to an existing registrant.
    pub fn bind(&self, address: &str, external_id: &str) {
        self.tables.lock().unwrap().accounts.push(VerifiedAccount {
            registrant_email: email(address),
            external_id: ext(external_id),
            display_name: format!("user-{external_id}"),
            team_id: None,
            verified_at: Utc::now(),
        });
    }

    /// Register and bind in one step.
    pub fn verified(&self, external_id: &str, is_capstone: bool) {
        let address = format!("{external_id}@example.com");
        self.register(&address, participant(), is_capstone);
        self.bind(&address, external_id);
    }

    pub fn registrant(&self, address: &str) -> Option<Registrant> {
        let address = email(address);
        self.tables
            .lock()
            .unwrap()
            .registrants
            .iter()
            .find(|r| r.email == address)
            .cloned()
    }

    pub fn account(&self, external_id: &str) -> Option<VerifiedAccount> {
        let external_id = ext(external_id);
        self.tables
            .lock()
            .unwrap()
            .accounts
            .iter()
            .find(|a| a.external_id == external_id)
            .cloned()
    }

    pub fn codes(&self) -> Vec<VerificationCode> {
        self.tables.lock().unwrap().codes.clone()
    }

    pub fn push_code(&self, code: VerificationCode) {
        self.tables.lock().unwrap().codes.push(code);
    }

    pub fn teams(&self) -> Vec<Team> {
        self.tables.lock().unwrap().teams.clone()
    }

    pub fn team(&self, id: TeamId) -> Option<Team> {
        self.tables
            .lock()
            .unwrap()
            .teams
            .iter()
            .find(|t| t.id == id)
            .cloned()
    }

    pub fn members(&self, id: TeamId) -> Vec<ExternalId> {
        self.tables.lock().unwrap().member_ids(id)
    }

    /// Assign `external_id` to `team_id` right before the next team creation
    /// reaches the store, as a concurrent join would.
    pub fn join_before_create(&self, external_id: &str, team_id: TeamId) {
        self.tables.lock().unwrap().pending_join = Some((ext(external_id), team_id));
    }

    /// Make every later team creation fail with a store error.
    pub fn fail_team_create(&self) {
        self.tables.lock().unwrap().fail_team_create = true;
    }

    /// Move a team's formation deadline, e.g. into the past.
    pub fn set_deadline(&self, id: TeamId, deadline: DateTime<Utc>) {
        if let Some(team) = self.tables.lock().unwrap().team_mut(id) {
            team.formation_deadline = deadline;
        }
    }
}

impl RegistrantRepository for MemoryStore {
    async fn find_by_email(&self, email: &Email) -> Result<Option<Registrant>, RegistryError> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .registrants
            .iter()
            .find(|r| r.email == *email)
            .cloned())
    }

    async fn upsert(&self, registrant: &NewRegistrant) -> Result<RegistrantId, RegistryError> {
        let mut tables = self.tables.lock().unwrap();
        if tables
            .accounts
            .iter()
            .any(|a| a.registrant_email == registrant.email)
        {
            return Err(RegistryError::AlreadyVerified);
        }
        let now = Utc::now();
        if let Some(row) = tables
            .registrants
            .iter_mut()
            .find(|r| r.email == registrant.email)
        {
            row.first_name = registrant.first_name.clone();
            row.last_name = registrant.last_name.clone();
            row.roles = registrant.roles;
            row.is_capstone = registrant.is_capstone;
            row.updated_at = now;
            return Ok(row.id);
        }
        let id = RegistrantId(Uuid::now_v7());
        tables.registrants.push(Registrant {
            id,
            email: registrant.email.clone(),
            first_name: registrant.first_name.clone(),
            last_name: registrant.last_name.clone(),
            roles: registrant.roles,
            is_capstone: registrant.is_capstone,
            created_at: now,
            updated_at: now,
        });
        Ok(id)
    }

    async fn merge_roles(&self, registrant: &NewRegistrant) -> Result<Registrant, RegistryError> {
        let mut tables = self.tables.lock().unwrap();
        let now = Utc::now();
        if let Some(row) = tables
            .registrants
            .iter_mut()
            .find(|r| r.email == registrant.email)
        {
            row.roles = row.roles.union(registrant.roles);
            row.updated_at = now;
            return Ok(row.clone());
        }
        let row = Registrant {
            id: RegistrantId(Uuid::now_v7()),
            email: registrant.email.clone(),
            first_name: registrant.first_name.clone(),
            last_name: registrant.last_name.clone(),
            roles: registrant.roles,
            is_capstone: registrant.is_capstone,
            created_at: now,
            updated_at: now,
        };
        tables.registrants.push(row.clone());
        Ok(row)
    }

    async fn delete(&self, email: &Email) -> Result<bool, RegistryError> {
        let mut tables = self.tables.lock().unwrap();
        let before = tables.registrants.len();
        tables.registrants.retain(|r| r.email != *email);
        tables.accounts.retain(|a| a.registrant_email != *email);
        tables.codes.retain(|c| c.registrant_email != *email);
        Ok(tables.registrants.len() < before)
    }
}

impl AccountRepository for MemoryStore {
    async fn find_by_external_id(
        &self,
        external_id: &ExternalId,
    ) -> Result<Option<VerifiedAccount>, RegistryError> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .accounts
            .iter()
            .find(|a| a.external_id == *external_id)
            .cloned())
    }

    async fn find_by_email(&self, email: &Email) -> Result<Option<VerifiedAccount>, RegistryError> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .accounts
            .iter()
            .find(|a| a.registrant_email == *email)
            .cloned())
    }

    async fn create(&self, account: &VerifiedAccount) -> Result<(), RegistryError> {
        let mut tables = self.tables.lock().unwrap();
        if tables.accounts.iter().any(|a| {
            a.external_id == account.external_id || a.registrant_email == account.registrant_email
        }) {
            return Err(RegistryError::DuplicateAccount);
        }
        tables.accounts.push(account.clone());
        Ok(())
    }

    async fn delete(&self, external_id: &ExternalId) -> Result<bool, RegistryError> {
        let mut tables = self.tables.lock().unwrap();
        let before = tables.accounts.len();
        tables.accounts.retain(|a| a.external_id != *external_id);
        Ok(tables.accounts.len() < before)
    }
}

impl VerificationCodeRepository for MemoryStore {
    async fn issue(&self, code: &VerificationCode) -> Result<bool, RegistryError> {
        let mut tables = self.tables.lock().unwrap();
        if tables.codes.iter().any(|c| c.code == code.code) {
            return Ok(false);
        }
        tables.codes.retain(|c| {
            c.external_id != code.external_id && c.registrant_email != code.registrant_email
        });
        tables.codes.push(code.clone());
        Ok(true)
    }

    async fn redeem(
        &self,
        code: &str,
        external_id: &ExternalId,
        display_name: &str,
        now: DateTime<Utc>,
    ) -> Result<VerifiedAccount, RegistryError> {
        let mut tables = self.tables.lock().unwrap();
        let index = tables
            .codes
            .iter()
            .position(|c| c.code == code)
            .ok_or(RegistryError::CodeNotFound)?;
        let stored = &tables.codes[index];
        if stored.is_expired(now) {
            return Err(RegistryError::CodeNotFound);
        }
        if stored.external_id != *external_id {
            return Err(RegistryError::CodeMismatch);
        }
        let taken = tables.accounts.iter().any(|a| {
            a.external_id == *external_id || a.registrant_email == stored.registrant_email
        });
        if taken {
            return Err(RegistryError::DuplicateAccount);
        }
        let stored = tables.codes.remove(index);
        let account = VerifiedAccount {
            registrant_email: stored.registrant_email,
            external_id: external_id.clone(),
            display_name: display_name.to_owned(),
            team_id: None,
            verified_at: now,
        };
        tables.accounts.push(account.clone());
        Ok(account)
    }

    async fn invalidate(&self, code: &str) -> Result<bool, RegistryError> {
        let mut tables = self.tables.lock().unwrap();
        let before = tables.codes.len();
        tables.codes.retain(|c| c.code != code);
        Ok(tables.codes.len() < before)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, RegistryError> {
        let mut tables = self.tables.lock().unwrap();
        let before = tables.codes.len();
        tables.codes.retain(|c| !c.is_expired(now));
        Ok((before - tables.codes.len()) as u64)
    }
}

impl TeamRepository for MemoryStore {
    async fn peek_next_id(&self) -> Result<TeamId, RegistryError> {
        Ok(TeamId(self.tables.lock().unwrap().last_team_id + 1))
    }

    async fn reserve_id(&self) -> Result<TeamId, RegistryError> {
        let mut tables = self.tables.lock().unwrap();
        tables.last_team_id += 1;
        Ok(TeamId(tables.last_team_id))
    }

    async fn create(&self, team: &NewTeam) -> Result<FoundedTeam, RegistryError> {
        let mut tables = self.tables.lock().unwrap();
        if let Some((external_id, team_id)) = tables.pending_join.take() {
            if let Some(account) = tables.account_mut(&external_id) {
                account.team_id = Some(team_id);
            }
        }
        if tables.fail_team_create {
            return Err(RegistryError::Internal(anyhow::anyhow!("connection reset")));
        }
        if tables.teams.iter().any(|t| t.name == team.name) {
            return Err(RegistryError::NameTaken);
        }
        let (requester, invitees) = team.members.split_first().unwrap();
        let team_of = |id: &ExternalId| {
            tables
                .accounts
                .iter()
                .find(|a| a.external_id == *id)
                .map(|a| a.team_id)
        };
        match team_of(requester) {
            None => return Err(RegistryError::NotVerified),
            Some(Some(_)) => return Err(RegistryError::AlreadyOnTeam),
            Some(None) => {}
        }
        let mut members = vec![requester.clone()];
        let mut dropped = Vec::new();
        for invitee in invitees {
            let reason = match team_of(invitee) {
                None => IneligibleReason::NotVerified,
                Some(Some(_)) => IneligibleReason::AlreadyOnTeam,
                Some(None) => {
                    members.push(invitee.clone());
                    continue;
                }
            };
            dropped.push(RejectedInvitee {
                external_id: invitee.clone(),
                reason,
            });
        }
        if !invitees.is_empty() && members.len() == 1 {
            return Err(RegistryError::NoValidTeammates(dropped));
        }
        if members.len() > self.capacity.for_team(team.is_capstone) {
            return Err(RegistryError::TeamFull);
        }
        let created = Team {
            id: team.id,
            name: team.name.clone(),
            is_capstone: team.is_capstone,
            lead: Some(requester.clone()),
            resources: team.resources.clone(),
            formation_deadline: team.formation_deadline,
            activated_at: (members.len() >= MIN_ACTIVE_TEAM_SIZE).then_some(team.created_at),
            created_at: team.created_at,
        };
        for member in &members {
            if let Some(account) = tables.account_mut(member) {
                account.team_id = Some(team.id);
            }
        }
        tables.teams.push(created.clone());
        Ok(FoundedTeam {
            team: created,
            members,
            dropped,
        })
    }

    async fn find_by_id(&self, id: TeamId) -> Result<Option<Team>, RegistryError> {
        Ok(self.team(id))
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Team>, RegistryError> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .teams
            .iter()
            .find(|t| t.name == name)
            .cloned())
    }

    async fn members_of(&self, id: TeamId) -> Result<Vec<VerifiedAccount>, RegistryError> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .accounts
            .iter()
            .filter(|a| a.team_id == Some(id))
            .cloned()
            .collect())
    }

    async fn list_with_members(&self) -> Result<Vec<(Team, Vec<VerifiedAccount>)>, RegistryError> {
        let tables = self.tables.lock().unwrap();
        let mut teams = tables.teams.clone();
        teams.sort_by_key(|t| t.id.0);
        Ok(teams
            .into_iter()
            .map(|team| {
                let members = tables
                    .accounts
                    .iter()
                    .filter(|a| a.team_id == Some(team.id))
                    .cloned()
                    .collect();
                (team, members)
            })
            .collect())
    }

    async fn team_size(&self, id: TeamId) -> Result<usize, RegistryError> {
        Ok(self.members(id).len())
    }

    async fn add_member(
        &self,
        id: TeamId,
        external_id: &ExternalId,
        now: DateTime<Utc>,
    ) -> Result<Team, RegistryError> {
        let mut tables = self.tables.lock().unwrap();
        let is_capstone = tables
            .teams
            .iter()
            .find(|t| t.id == id)
            .ok_or(RegistryError::TeamNotFound)?
            .is_capstone;
        let size = tables.member_ids(id).len();
        let account = tables
            .account_mut(external_id)
            .ok_or(RegistryError::NotVerified)?;
        if account.team_id.is_some() {
            return Err(RegistryError::AlreadyOnTeam);
        }
        if size >= self.capacity.for_team(is_capstone) {
            return Err(RegistryError::TeamFull);
        }
        account.team_id = Some(id);
        let team = tables.team_mut(id).ok_or(RegistryError::TeamNotFound)?;
        if team.activated_at.is_none() && size + 1 >= MIN_ACTIVE_TEAM_SIZE {
            team.activated_at = Some(now);
        }
        Ok(team.clone())
    }

    async fn remove_member(&self, external_id: &ExternalId) -> Result<Departure, RegistryError> {
        let mut tables = self.tables.lock().unwrap();
        let account = tables
            .account_mut(external_id)
            .ok_or(RegistryError::NotVerified)?;
        let team_id = account.team_id.take().ok_or(RegistryError::NotOnTeam)?;
        let team = tables
            .teams
            .iter()
            .find(|t| t.id == team_id)
            .cloned()
            .ok_or(RegistryError::NotOnTeam)?;

        let remaining = tables.member_ids(team_id);
        let mut new_lead = None;
        if remaining.is_empty() {
            tables.teams.retain(|t| t.id != team_id);
        } else if team.is_lead(external_id) {
            new_lead = remaining.first().cloned();
            if let Some(row) = tables.team_mut(team_id) {
                row.lead = new_lead.clone();
            }
        }
        Ok(Departure {
            team,
            external_id: external_id.clone(),
            remaining: remaining.len(),
            new_lead,
            team_deleted: remaining.is_empty(),
        })
    }

    async fn set_lead(&self, id: TeamId, lead: &ExternalId) -> Result<Team, RegistryError> {
        let mut tables = self.tables.lock().unwrap();
        if !tables.member_ids(id).contains(lead) {
            return Err(RegistryError::NotOnTeam);
        }
        let team = tables.team_mut(id).ok_or(RegistryError::TeamNotFound)?;
        team.lead = Some(lead.clone());
        Ok(team.clone())
    }

    async fn delete(&self, id: TeamId) -> Result<Option<DeletedTeam>, RegistryError> {
        Ok(self.tables.lock().unwrap().remove_team(id))
    }

    async fn list_expired_forming(&self, now: DateTime<Utc>) -> Result<Vec<Team>, RegistryError> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .teams
            .iter()
            .filter(|t| t.is_forming() && t.formation_deadline <= now)
            .cloned()
            .collect())
    }

    async fn delete_if_still_forming(
        &self,
        id: TeamId,
        now: DateTime<Utc>,
    ) -> Result<Option<DeletedTeam>, RegistryError> {
        let mut tables = self.tables.lock().unwrap();
        let Some(team) = tables.teams.iter().find(|t| t.id == id) else {
            return Ok(None);
        };
        if !team.is_forming() || team.formation_deadline > now {
            return Ok(None);
        }
        if tables.member_ids(id).len() >= MIN_ACTIVE_TEAM_SIZE {
            return Ok(None);
        }
        Ok(tables.remove_team(id))
    }
}

// ── MockPlatform ─────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct PlatformLog {
    /// `(external id, role id)` pairs currently held.
    pub held: BTreeSet<(String, String)>,
    pub grants: Vec<(String, String)>,
    pub revokes: Vec<(String, String)>,
    pub created: Vec<TeamId>,
    pub deleted: Vec<TeamResources>,
}

#[derive(Clone, Default)]
pub struct MockPlatform {
    pub log: Arc<Mutex<PlatformLog>>,
    pub fail_grants: bool,
    /// Fail only grants of this role id.
    pub fail_grant_of: Option<String>,
    pub fail_create: bool,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_grants() -> Self {
        Self {
            fail_grants: true,
            ..Self::default()
        }
    }

    pub fn failing_grant_of(role_id: &str) -> Self {
        Self {
            fail_grant_of: Some(role_id.to_owned()),
            ..Self::default()
        }
    }

    pub fn failing_create() -> Self {
        Self {
            fail_create: true,
            ..Self::default()
        }
    }

    pub fn holds(&self, external_id: &str, role_id: &str) -> bool {
        self.log
            .lock()
            .unwrap()
            .held
            .contains(&(external_id.to_owned(), role_id.to_owned()))
    }

    /// Role ids currently held by the account, sorted.
    pub fn roles_of(&self, external_id: &str) -> Vec<String> {
        self.log
            .lock()
            .unwrap()
            .held
            .iter()
            .filter(|(account, _)| account == external_id)
            .map(|(_, role)| role.clone())
            .collect()
    }

    pub fn created(&self) -> Vec<TeamId> {
        self.log.lock().unwrap().created.clone()
    }

    pub fn deleted(&self) -> Vec<TeamResources> {
        self.log.lock().unwrap().deleted.clone()
    }
}

impl PlatformPort for MockPlatform {
    async fn grant_role(&self, account: &ExternalId, role_id: &str) -> Result<(), RegistryError> {
        if self.fail_grants || self.fail_grant_of.as_deref() == Some(role_id) {
            return Err(RegistryError::external(anyhow::anyhow!("platform unavailable")));
        }
        let mut log = self.log.lock().unwrap();
        let entry = (account.as_str().to_owned(), role_id.to_owned());
        log.grants.push(entry.clone());
        log.held.insert(entry);
        Ok(())
    }

    async fn revoke_role(&self, account: &ExternalId, role_id: &str) -> Result<(), RegistryError> {
        let mut log = self.log.lock().unwrap();
        let entry = (account.as_str().to_owned(), role_id.to_owned());
        log.held.remove(&entry);
        log.revokes.push(entry);
        Ok(())
    }

    async fn create_team_resources(
        &self,
        team_id: TeamId,
        _team_name: &str,
        _is_capstone: bool,
    ) -> Result<TeamResources, RegistryError> {
        if self.fail_create {
            return Err(RegistryError::external(anyhow::anyhow!("channel limit reached")));
        }
        self.log.lock().unwrap().created.push(team_id);
        Ok(team_resources(team_id))
    }

    async fn delete_team_resources(&self, resources: &TeamResources) -> Result<(), RegistryError> {
        self.log.lock().unwrap().deleted.push(resources.clone());
        Ok(())
    }
}

pub fn team_resources(team_id: TeamId) -> TeamResources {
    TeamResources {
        role_id: format!("team-role-{team_id}"),
        category_id: format!("category-{team_id}"),
        text_id: format!("text-{team_id}"),
        voice_id: Some(format!("voice-{team_id}")),
    }
}

// ── MockMailer ───────────────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct MockMailer {
    pub sent: Arc<Mutex<Vec<VerificationEmail>>>,
    pub fail: bool,
}

impl MockMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<VerificationEmail> {
        self.sent.lock().unwrap().clone()
    }
}

impl MailPort for MockMailer {
    async fn send_verification_email(
        &self,
        email: &VerificationEmail,
    ) -> Result<(), RegistryError> {
        if self.fail {
            return Err(RegistryError::external(anyhow::anyhow!("mail provider rejected")));
        }
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}
