use chrono::{DateTime, Utc};
use rand::RngExt;

use checkpoint_domain::id::{Email, ExternalId};
use checkpoint_domain::role::RoleFlags;

use crate::domain::repository::{
    AccountRepository, MailPort, PlatformPort, RegistrantRepository, TeamRepository,
    VerificationCodeRepository,
};
use crate::domain::types::{
    CodePolicy, NewRegistrant, RoleMap, VerificationCode, VerificationEmail, VerifiedAccount,
};
use crate::error::RegistryError;

/// Draws before giving up on finding a code that is not outstanding.
const MAX_CODE_ATTEMPTS: usize = 8;

const DIGITS: &[u8] = b"0123456789";

pub fn generate_code(length: usize) -> String {
    let mut rng = rand::rng();
    (0..length)
        .map(|_| DIGITS[rng.random_range(0..DIGITS.len())] as char)
        .collect()
}

/// Digit-only input is a code; anything else is an email.
pub fn is_code_input(raw: &str) -> bool {
    let raw = raw.trim();
    !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyTarget {
    Code(String),
    Email(Email),
}

impl VerifyTarget {
    pub fn classify(raw: &str) -> Result<Self, RegistryError> {
        if is_code_input(raw) {
            return Ok(Self::Code(raw.trim().to_owned()));
        }
        Email::parse(raw)
            .map(Self::Email)
            .map_err(|e| RegistryError::Validation(e.to_string()))
    }
}

/// Outcome of a full role synchronisation.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct RoleSync {
    pub granted: Vec<String>,
    pub revoked: Vec<String>,
}

/// Grant every role `flags` entitles the account to plus `verified`, and
/// revoke managed event roles it no longer holds. Safe to repeat.
pub async fn sync_roles<P>(
    platform: &P,
    roles: &RoleMap,
    external_id: &ExternalId,
    flags: RoleFlags,
) -> Result<RoleSync, RegistryError>
where
    P: PlatformPort,
{
    let mut sync = RoleSync::default();
    apply_roles(platform, roles, external_id, flags, &mut sync).await?;
    Ok(sync)
}

async fn apply_roles<P>(
    platform: &P,
    roles: &RoleMap,
    external_id: &ExternalId,
    flags: RoleFlags,
    sync: &mut RoleSync,
) -> Result<(), RegistryError>
where
    P: PlatformPort,
{
    for role_id in roles.entitled(flags) {
        platform.grant_role(external_id, role_id).await?;
        sync.granted.push(role_id.to_owned());
    }
    for role_id in roles.revoked(flags) {
        platform.revoke_role(external_id, role_id).await?;
        sync.revoked.push(role_id.to_owned());
    }
    Ok(())
}

/// First sync for an account that was just created. If it fails, the roles
/// it already granted are revoked again before the error is returned.
async fn sync_new_account<P>(
    platform: &P,
    roles: &RoleMap,
    external_id: &ExternalId,
    flags: RoleFlags,
) -> Result<RoleSync, RegistryError>
where
    P: PlatformPort,
{
    let mut sync = RoleSync::default();
    if let Err(e) = apply_roles(platform, roles, external_id, flags, &mut sync).await {
        for role_id in &sync.granted {
            if let Err(revoke) = platform.revoke_role(external_id, role_id).await {
                tracing::warn!(
                    external_id = %external_id,
                    role_id = %role_id,
                    error = %revoke,
                    "failed to revoke role after sync failure"
                );
            }
        }
        return Err(e);
    }
    Ok(sync)
}

/// Account state returned once verification succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedOutput {
    pub account: VerifiedAccount,
    pub roles: RoleFlags,
}

// ── Request code (self-serve by email) ───────────────────────────────────────

pub struct RequestCodeInput {
    pub external_id: ExternalId,
    pub display_name: String,
    pub email: Email,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeSent {
    pub email: Email,
    pub expires_at: DateTime<Utc>,
}

pub struct RequestCodeUseCase<R, A, C, M>
where
    R: RegistrantRepository,
    A: AccountRepository,
    C: VerificationCodeRepository,
    M: MailPort,
{
    pub registrants: R,
    pub accounts: A,
    pub codes: C,
    pub mailer: M,
    pub policy: CodePolicy,
    pub organizer_email: Option<String>,
}

impl<R, A, C, M> RequestCodeUseCase<R, A, C, M>
where
    R: RegistrantRepository,
    A: AccountRepository,
    C: VerificationCodeRepository,
    M: MailPort,
{
    pub async fn execute(&self, input: RequestCodeInput) -> Result<CodeSent, RegistryError> {
        if self
            .accounts
            .find_by_external_id(&input.external_id)
            .await?
            .is_some()
        {
            return Err(RegistryError::AlreadyVerified);
        }
        if self.accounts.find_by_email(&input.email).await?.is_some() {
            return Err(RegistryError::DuplicateAccount);
        }
        let registrant = self
            .registrants
            .find_by_email(&input.email)
            .await?
            .ok_or(RegistryError::NotRegistered)?;

        let issued_at = Utc::now();
        let mut issued = None;
        for _ in 0..MAX_CODE_ATTEMPTS {
            let code = VerificationCode {
                code: generate_code(self.policy.length),
                external_id: input.external_id.clone(),
                registrant_email: input.email.clone(),
                issued_at,
                expires_at: issued_at + self.policy.ttl,
            };
            if self.codes.issue(&code).await? {
                issued = Some(code);
                break;
            }
        }
        let code = issued.ok_or_else(|| {
            RegistryError::Internal(anyhow::anyhow!(
                "no free verification code after {MAX_CODE_ATTEMPTS} attempts"
            ))
        })?;

        let email = VerificationEmail {
            to: input.email.clone(),
            recipient_name: registrant.greeting_name().to_owned(),
            display_name: input.display_name,
            code: code.code.clone(),
            expires_in_minutes: self.policy.ttl.num_minutes(),
            organizer_email: self.organizer_email.clone(),
        };
        if let Err(e) = self.mailer.send_verification_email(&email).await {
            // An undelivered code must not stay redeemable.
            if let Err(cleanup) = self.codes.invalidate(&code.code).await {
                tracing::warn!(error = %cleanup, "failed to invalidate undelivered code");
            }
            return Err(e);
        }

        tracing::info!(
            external_id = %input.external_id,
            email = %input.email,
            "verification code issued"
        );
        Ok(CodeSent {
            email: input.email,
            expires_at: code.expires_at,
        })
    }
}

// ── Redeem code (self-serve by code) ─────────────────────────────────────────

pub struct RedeemCodeInput {
    pub external_id: ExternalId,
    pub display_name: String,
    pub code: String,
}

pub struct RedeemCodeUseCase<R, A, C, P>
where
    R: RegistrantRepository,
    A: AccountRepository,
    C: VerificationCodeRepository,
    P: PlatformPort,
{
    pub registrants: R,
    pub accounts: A,
    pub codes: C,
    pub platform: P,
    pub roles: RoleMap,
}

impl<R, A, C, P> RedeemCodeUseCase<R, A, C, P>
where
    R: RegistrantRepository,
    A: AccountRepository,
    C: VerificationCodeRepository,
    P: PlatformPort,
{
    pub async fn execute(&self, input: RedeemCodeInput) -> Result<VerifiedOutput, RegistryError> {
        if !is_code_input(&input.code) {
            return Err(RegistryError::CodeNotFound);
        }
        let account = self
            .codes
            .redeem(
                input.code.trim(),
                &input.external_id,
                input.display_name.trim(),
                Utc::now(),
            )
            .await?;

        match self.finish(&account).await {
            Ok(roles) => {
                tracing::info!(
                    external_id = %account.external_id,
                    email = %account.registrant_email,
                    "account verified"
                );
                Ok(VerifiedOutput { account, roles })
            }
            Err(e) => {
                // Undo the account so the registrant can verify again.
                if let Err(cleanup) = self.accounts.delete(&account.external_id).await {
                    tracing::warn!(
                        external_id = %account.external_id,
                        error = %cleanup,
                        "failed to roll back account after role sync failure"
                    );
                }
                Err(e)
            }
        }
    }

    async fn finish(&self, account: &VerifiedAccount) -> Result<RoleFlags, RegistryError> {
        let registrant = self
            .registrants
            .find_by_email(&account.registrant_email)
            .await?
            .ok_or(RegistryError::NotRegistered)?;
        sync_new_account(
            &self.platform,
            &self.roles,
            &account.external_id,
            registrant.roles,
        )
        .await?;
        Ok(registrant.roles)
    }
}

// ── Administrative override ──────────────────────────────────────────────────

pub struct AdminVerifyInput {
    pub external_id: ExternalId,
    pub display_name: String,
    pub email: String,
    pub roles: RoleFlags,
}

pub struct AdminVerifyUseCase<R, A, P>
where
    R: RegistrantRepository,
    A: AccountRepository,
    P: PlatformPort,
{
    pub registrants: R,
    pub accounts: A,
    pub platform: P,
    pub roles: RoleMap,
}

impl<R, A, P> AdminVerifyUseCase<R, A, P>
where
    R: RegistrantRepository,
    A: AccountRepository,
    P: PlatformPort,
{
    /// Bind without a code. An already verified account gets the roles
    /// unioned into its registrant instead of an error.
    pub async fn execute(&self, input: AdminVerifyInput) -> Result<VerifiedOutput, RegistryError> {
        if input.roles.is_empty() {
            return Err(RegistryError::Validation(
                "at least one role is required".to_owned(),
            ));
        }
        let display_name = input.display_name.trim().to_owned();

        if let Some(account) = self.accounts.find_by_external_id(&input.external_id).await? {
            let registrant = self
                .registrants
                .merge_roles(&NewRegistrant {
                    email: account.registrant_email.clone(),
                    first_name: display_name,
                    last_name: String::new(),
                    roles: input.roles,
                    is_capstone: false,
                })
                .await?;
            sync_roles(
                &self.platform,
                &self.roles,
                &account.external_id,
                registrant.roles,
            )
            .await?;
            tracing::info!(
                external_id = %account.external_id,
                roles = ?registrant.roles.roles(),
                "roles merged into verified account"
            );
            return Ok(VerifiedOutput {
                account,
                roles: registrant.roles,
            });
        }

        let email =
            Email::parse(&input.email).map_err(|e| RegistryError::Validation(e.to_string()))?;
        if self.accounts.find_by_email(&email).await?.is_some() {
            return Err(RegistryError::DuplicateAccount);
        }
        let registrant = self
            .registrants
            .merge_roles(&NewRegistrant {
                email: email.clone(),
                first_name: display_name.clone(),
                last_name: String::new(),
                roles: input.roles,
                is_capstone: false,
            })
            .await?;

        let account = VerifiedAccount {
            registrant_email: email,
            external_id: input.external_id,
            display_name,
            team_id: None,
            verified_at: Utc::now(),
        };
        self.accounts.create(&account).await?;

        if let Err(e) = sync_new_account(
            &self.platform,
            &self.roles,
            &account.external_id,
            registrant.roles,
        )
        .await
        {
            if let Err(cleanup) = self.accounts.delete(&account.external_id).await {
                tracing::warn!(
                    external_id = %account.external_id,
                    error = %cleanup,
                    "failed to roll back account after role sync failure"
                );
            }
            return Err(e);
        }

        tracing::info!(
            external_id = %account.external_id,
            email = %account.registrant_email,
            "account verified by administrator"
        );
        Ok(VerifiedOutput {
            account,
            roles: registrant.roles,
        })
    }
}

// ── Role resync ──────────────────────────────────────────────────────────────

pub struct ResyncRolesUseCase<R, A, T, P>
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

impl<R, A, T, P> ResyncRolesUseCase<R, A, T, P>
where
    R: RegistrantRepository,
    A: AccountRepository,
    T: TeamRepository,
    P: PlatformPort,
{
    pub async fn execute(&self, external_id: &ExternalId) -> Result<RoleSync, RegistryError> {
        let account = self
            .accounts
            .find_by_external_id(external_id)
            .await?
            .ok_or(RegistryError::NotVerified)?;
        let registrant = self
            .registrants
            .find_by_email(&account.registrant_email)
            .await?
            .ok_or(RegistryError::NotRegistered)?;

        let mut sync = sync_roles(&self.platform, &self.roles, external_id, registrant.roles).await?;

        let team = match account.team_id {
            Some(team_id) => self.teams.find_by_id(team_id).await?,
            None => None,
        };
        match team {
            Some(team) => {
                for role_id in [team.resources.role_id.as_str(), self.roles.team_assigned.as_str()] {
                    self.platform.grant_role(external_id, role_id).await?;
                    sync.granted.push(role_id.to_owned());
                }
            }
            None => {
                self.platform
                    .revoke_role(external_id, &self.roles.team_assigned)
                    .await?;
                sync.revoked.push(self.roles.team_assigned.clone());
            }
        }

        tracing::info!(external_id = %external_id, "roles resynced");
        Ok(sync)
    }
}
