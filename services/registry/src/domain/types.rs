use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use checkpoint_domain::id::{Email, ExternalId, RegistrantId, TeamId};
use checkpoint_domain::role::{EventRole, RoleFlags};

/// Members needed before a team leaves the forming state.
pub const MIN_ACTIVE_TEAM_SIZE: usize = 2;

/// Maximum length of a team name after trimming.
pub const TEAM_NAME_MAX_LEN: usize = 100;

/// Greeting used in emails when the registrant gave no first name.
pub const FALLBACK_FIRST_NAME: &str = "Hackathon Registrant";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registrant {
    pub id: RegistrantId,
    pub email: Email,
    pub first_name: String,
    pub last_name: String,
    pub roles: RoleFlags,
    pub is_capstone: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Registrant {
    pub fn greeting_name(&self) -> &str {
        let name = self.first_name.trim();
        if name.is_empty() {
            FALLBACK_FIRST_NAME
        } else {
            name
        }
    }
}

/// Registration data as received from the registration form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRegistrant {
    pub email: Email,
    pub first_name: String,
    pub last_name: String,
    pub roles: RoleFlags,
    pub is_capstone: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifiedAccount {
    pub registrant_email: Email,
    pub external_id: ExternalId,
    pub display_name: String,
    pub team_id: Option<TeamId>,
    #[serde(serialize_with = "checkpoint_core::serde::to_rfc3339_ms")]
    pub verified_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationCode {
    pub code: String,
    pub external_id: ExternalId,
    pub registrant_email: Email,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl VerificationCode {
    /// A code is dead at `expires_at`, not after it.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Chat-platform handles created for a team, kept only for cleanup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeamResources {
    pub role_id: String,
    pub category_id: String,
    pub text_id: String,
    pub voice_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Team {
    pub id: TeamId,
    pub name: String,
    pub is_capstone: bool,
    pub lead: Option<ExternalId>,
    pub resources: TeamResources,
    #[serde(serialize_with = "checkpoint_core::serde::to_rfc3339_ms")]
    pub formation_deadline: DateTime<Utc>,
    #[serde(serialize_with = "checkpoint_core::serde::opt_to_rfc3339_ms")]
    pub activated_at: Option<DateTime<Utc>>,
    #[serde(serialize_with = "checkpoint_core::serde::to_rfc3339_ms")]
    pub created_at: DateTime<Utc>,
}

impl Team {
    /// Forming teams may still be removed by the formation sweep.
    pub fn is_forming(&self) -> bool {
        self.activated_at.is_none()
    }

    pub fn is_lead(&self, external_id: &ExternalId) -> bool {
        self.lead.as_ref() == Some(external_id)
    }
}

/// Everything the store needs to persist a team in one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTeam {
    pub id: TeamId,
    pub name: String,
    pub is_capstone: bool,
    /// First entry is the lead.
    pub members: Vec<ExternalId>,
    pub resources: TeamResources,
    pub formation_deadline: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// A persisted team together with the founding members the store accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundedTeam {
    pub team: Team,
    /// Lead first.
    pub members: Vec<ExternalId>,
    /// Invitees that stopped qualifying before the team row was written.
    pub dropped: Vec<RejectedInvitee>,
}

/// One line of the team export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeamRoster {
    pub id: TeamId,
    pub name: String,
    pub is_capstone: bool,
    pub lead: Option<ExternalId>,
    pub member_emails: Vec<Email>,
}

/// A team row that was deleted together with the accounts it released.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeletedTeam {
    pub team: Team,
    pub released: Vec<ExternalId>,
}

/// Result of one account leaving its team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Departure {
    /// Team state before the departure.
    pub team: Team,
    pub external_id: ExternalId,
    pub remaining: usize,
    /// Set when the departing account was the lead and someone is left.
    pub new_lead: Option<ExternalId>,
    pub team_deleted: bool,
}

/// Member caps per team category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeamCapacity {
    pub regular: usize,
    pub capstone: usize,
}

impl TeamCapacity {
    pub fn for_team(&self, is_capstone: bool) -> usize {
        if is_capstone {
            self.capstone
        } else {
            self.regular
        }
    }
}

impl Default for TeamCapacity {
    fn default() -> Self {
        Self {
            regular: 4,
            capstone: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeamPolicy {
    pub capacity: TeamCapacity,
    pub formation_grace: Duration,
}

impl Default for TeamPolicy {
    fn default() -> Self {
        Self {
            capacity: TeamCapacity::default(),
            formation_grace: Duration::seconds(120),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodePolicy {
    pub length: usize,
    pub ttl: Duration,
}

impl Default for CodePolicy {
    fn default() -> Self {
        Self {
            length: 6,
            ttl: Duration::minutes(15),
        }
    }
}

/// Chat-platform role ids managed by the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleMap {
    pub participant: String,
    pub judge: String,
    pub mentor: String,
    pub verified: String,
    pub team_assigned: String,
}

impl RoleMap {
    pub fn for_role(&self, role: EventRole) -> &str {
        match role {
            EventRole::Participant => &self.participant,
            EventRole::Judge => &self.judge,
            EventRole::Mentor => &self.mentor,
        }
    }

    /// Roles a verified account holding `flags` should have, `verified` last.
    pub fn entitled(&self, flags: RoleFlags) -> Vec<&str> {
        let mut roles: Vec<&str> = flags.roles().into_iter().map(|r| self.for_role(r)).collect();
        roles.push(&self.verified);
        roles
    }

    /// Event roles the account holds on the platform but is no longer entitled to.
    pub fn revoked(&self, flags: RoleFlags) -> Vec<&str> {
        EventRole::ALL
            .into_iter()
            .filter(|role| !flags.contains(*role))
            .map(|role| self.for_role(role))
            .collect()
    }
}

/// Why an invitee or new member cannot join a team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IneligibleReason {
    NotVerified,
    NotParticipant,
    AlreadyOnTeam,
    CapstoneMismatch,
    IsRequester,
    Duplicate,
    TeamFull,
}

impl IneligibleReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotVerified => "not verified",
            Self::NotParticipant => "not a participant",
            Self::AlreadyOnTeam => "already on a team",
            Self::CapstoneMismatch => "capstone status differs",
            Self::IsRequester => "cannot invite yourself",
            Self::Duplicate => "invited more than once",
            Self::TeamFull => "team is full",
        }
    }
}

impl fmt::Display for IneligibleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedInvitee {
    pub external_id: ExternalId,
    pub reason: IneligibleReason,
}

/// Outbound verification email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationEmail {
    pub to: Email,
    pub recipient_name: String,
    pub display_name: String,
    pub code: String,
    pub expires_in_minutes: i64,
    pub organizer_email: Option<String>,
}
