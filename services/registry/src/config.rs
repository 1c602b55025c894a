use anyhow::{Context as _, bail};
use chrono::Duration;

use crate::domain::types::{CodePolicy, RoleMap, TeamCapacity, TeamPolicy};

const DEFAULT_MAIL_API_URL: &str = "https://api.brevo.com/v3/smtp/email";
const DEFAULT_DISCORD_API_BASE: &str = "https://discord.com/api/v10";

/// Registry service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// PostgreSQL connection URL. Env var: `DATABASE_URL`.
    pub database_url: String,
    /// Shared secret trusted callers send in the `Api-Key` header. Env var: `REGISTRY_API_KEY`.
    pub api_key: String,
    /// TCP port to listen on (default 3114). Env var: `REGISTRY_PORT`.
    pub registry_port: u16,
    /// Digits per verification code (default 6). Env var: `CODE_LENGTH`.
    pub code_length: usize,
    /// Verification code lifetime in seconds (default 900). Env var: `CODE_TTL_SECS`.
    pub code_ttl_secs: i64,
    /// Grace period before an undersized team is removed (default 120). Env var: `FORMATION_GRACE_SECS`.
    pub formation_grace_secs: i64,
    /// Seconds between sweeps (default 60). Env var: `SWEEP_INTERVAL_SECS`.
    pub sweep_interval_secs: u64,
    /// Env var: `TEAM_CAPACITY` (default 4).
    pub team_capacity: usize,
    /// Env var: `CAPSTONE_TEAM_CAPACITY` (default 5).
    pub capstone_team_capacity: usize,
    /// Transactional email endpoint. Env var: `MAIL_API_URL`.
    pub mail_api_url: String,
    /// Env var: `MAIL_API_KEY`.
    pub mail_api_key: String,
    /// Env var: `MAIL_SENDER_EMAIL`.
    pub mail_sender_email: String,
    /// Env var: `MAIL_SENDER_NAME` (optional).
    pub mail_sender_name: Option<String>,
    /// Contact address quoted in verification emails. Env var: `ORGANIZER_EMAIL` (optional).
    pub organizer_email: Option<String>,
    /// Env var: `DISCORD_API_BASE`.
    pub discord_api_base: String,
    /// Env var: `DISCORD_BOT_TOKEN`.
    pub discord_bot_token: String,
    /// Env var: `DISCORD_GUILD_ID`.
    pub discord_guild_id: String,
    /// Env var: `PARTICIPANT_ROLE_ID`.
    pub participant_role_id: String,
    /// Env var: `JUDGE_ROLE_ID`.
    pub judge_role_id: String,
    /// Env var: `MENTOR_ROLE_ID`.
    pub mentor_role_id: String,
    /// Env var: `VERIFIED_ROLE_ID`.
    pub verified_role_id: String,
    /// Held by every account that is on a team. Env var: `TEAM_ASSIGNED_ROLE_ID`.
    pub team_assigned_role_id: String,
    /// Role that can see every team channel. Env var: `ALL_ACCESS_ROLE_ID` (optional).
    pub all_access_role_id: Option<String>,
}

impl RegistryConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty())
        };
        let required = |key: &str| get(key).with_context(|| format!("{key} must be set"));
        let parsed = |key: &str| -> anyhow::Result<Option<i64>> {
            get(key)
                .map(|v| v.parse::<i64>().with_context(|| format!("{key} must be an integer")))
                .transpose()
        };

        let config = Self {
            database_url: required("DATABASE_URL")?,
            api_key: required("REGISTRY_API_KEY")?,
            registry_port: get("REGISTRY_PORT")
                .map(|v| v.parse().context("REGISTRY_PORT must be a port number"))
                .transpose()?
                .unwrap_or(3114),
            code_length: parsed("CODE_LENGTH")?.unwrap_or(6).try_into().unwrap_or(0),
            code_ttl_secs: parsed("CODE_TTL_SECS")?.unwrap_or(900),
            formation_grace_secs: parsed("FORMATION_GRACE_SECS")?.unwrap_or(120),
            sweep_interval_secs: parsed("SWEEP_INTERVAL_SECS")?
                .unwrap_or(60)
                .try_into()
                .unwrap_or(0),
            team_capacity: parsed("TEAM_CAPACITY")?.unwrap_or(4).try_into().unwrap_or(0),
            capstone_team_capacity: parsed("CAPSTONE_TEAM_CAPACITY")?
                .unwrap_or(5)
                .try_into()
                .unwrap_or(0),
            mail_api_url: get("MAIL_API_URL").unwrap_or_else(|| DEFAULT_MAIL_API_URL.to_owned()),
            mail_api_key: required("MAIL_API_KEY")?,
            mail_sender_email: required("MAIL_SENDER_EMAIL")?,
            mail_sender_name: get("MAIL_SENDER_NAME"),
            organizer_email: get("ORGANIZER_EMAIL"),
            discord_api_base: get("DISCORD_API_BASE")
                .unwrap_or_else(|| DEFAULT_DISCORD_API_BASE.to_owned()),
            discord_bot_token: required("DISCORD_BOT_TOKEN")?,
            discord_guild_id: required("DISCORD_GUILD_ID")?,
            participant_role_id: required("PARTICIPANT_ROLE_ID")?,
            judge_role_id: required("JUDGE_ROLE_ID")?,
            mentor_role_id: required("MENTOR_ROLE_ID")?,
            verified_role_id: required("VERIFIED_ROLE_ID")?,
            team_assigned_role_id: required("TEAM_ASSIGNED_ROLE_ID")?,
            all_access_role_id: get("ALL_ACCESS_ROLE_ID"),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if !(4..=10).contains(&self.code_length) {
            bail!("CODE_LENGTH must be between 4 and 10");
        }
        if self.code_ttl_secs <= 0 {
            bail!("CODE_TTL_SECS must be positive");
        }
        if self.formation_grace_secs <= 0 {
            bail!("FORMATION_GRACE_SECS must be positive");
        }
        if self.sweep_interval_secs == 0 {
            bail!("SWEEP_INTERVAL_SECS must be positive");
        }
        if self.team_capacity < 2 {
            bail!("TEAM_CAPACITY must be at least 2");
        }
        if self.capstone_team_capacity < self.team_capacity {
            bail!("CAPSTONE_TEAM_CAPACITY must not be below TEAM_CAPACITY");
        }
        Ok(())
    }

    pub fn code_policy(&self) -> CodePolicy {
        CodePolicy {
            length: self.code_length,
            ttl: Duration::seconds(self.code_ttl_secs),
        }
    }

    pub fn team_policy(&self) -> TeamPolicy {
        TeamPolicy {
            capacity: TeamCapacity {
                regular: self.team_capacity,
                capstone: self.capstone_team_capacity,
            },
            formation_grace: Duration::seconds(self.formation_grace_secs),
        }
    }

    pub fn role_map(&self) -> RoleMap {
        RoleMap {
            participant: self.participant_role_id.clone(),
            judge: self.judge_role_id.clone(),
            mentor: self.mentor_role_id.clone(),
            verified: self.verified_role_id.clone(),
            team_assigned: self.team_assigned_role_id.clone(),
        }
    }
}
