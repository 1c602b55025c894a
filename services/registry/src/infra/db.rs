use std::collections::HashMap;

use anyhow::Context as _;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, ConnectionTrait,
    DatabaseConnection, DatabaseTransaction, DbErr, EntityTrait, FromQueryResult, Order,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, SqlErr, Statement, TransactionTrait,
    sea_query::{Expr, Func, OnConflict, SimpleExpr},
};
use uuid::Uuid;

use checkpoint_domain::id::{Email, ExternalId, RegistrantId, TeamId};
use checkpoint_domain::role::RoleFlags;
use checkpoint_registry_schema::{registrants, teams, verification_codes, verified_accounts};

use crate::domain::repository::{
    AccountRepository, RegistrantRepository, TeamRepository, VerificationCodeRepository,
};
use crate::domain::types::{
    DeletedTeam, Departure, FoundedTeam, IneligibleReason, MIN_ACTIVE_TEAM_SIZE, NewRegistrant,
    NewTeam, Registrant, RejectedInvitee, Team, TeamCapacity, TeamResources, VerificationCode,
    VerifiedAccount,
};
use crate::error::RegistryError;

/// Sequence behind the `teams.id` BIGSERIAL column.
const TEAM_ID_SEQUENCE: &str = "teams_id_seq";

/// `RANDOM()`, used to pick an arbitrary row.
fn random_order() -> SimpleExpr {
    SimpleExpr::FunctionCall(Func::random())
}

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

// ── Registrant repository ────────────────────────────────────────────────────

#[derive(Clone)]
pub struct DbRegistrantRepository {
    pub db: DatabaseConnection,
}

impl RegistrantRepository for DbRegistrantRepository {
    async fn find_by_email(&self, email: &Email) -> Result<Option<Registrant>, RegistryError> {
        let model = registrants::Entity::find()
            .filter(registrants::Column::Email.eq(email.as_str()))
            .one(&self.db)
            .await
            .context("find registrant by email")?;
        Ok(model.map(registrant_from_model).transpose()?)
    }

    async fn upsert(&self, registrant: &NewRegistrant) -> Result<RegistrantId, RegistryError> {
        let txn = self.db.begin().await.context("begin upsert registrant")?;

        let verified = verified_accounts::Entity::find_by_id(registrant.email.as_str().to_owned())
            .one(&txn)
            .await
            .context("check verified account for registrant")?;
        if verified.is_some() {
            return Err(RegistryError::AlreadyVerified);
        }

        let now = Utc::now();
        let model = registrants::Entity::insert(new_registrant_model(registrant, now))
            .on_conflict(
                OnConflict::column(registrants::Column::Email)
                    .update_columns([
                        registrants::Column::FirstName,
                        registrants::Column::LastName,
                        registrants::Column::IsParticipant,
                        registrants::Column::IsJudge,
                        registrants::Column::IsMentor,
                        registrants::Column::IsCapstone,
                        registrants::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_with_returning(&txn)
            .await
            .context("upsert registrant")?;

        txn.commit().await.context("commit upsert registrant")?;
        Ok(RegistrantId(model.id))
    }

    async fn merge_roles(&self, registrant: &NewRegistrant) -> Result<Registrant, RegistryError> {
        let txn = self.db.begin().await.context("begin merge registrant roles")?;
        let now = Utc::now();

        registrants::Entity::insert(new_registrant_model(registrant, now))
            .on_conflict(
                OnConflict::column(registrants::Column::Email)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&txn)
            .await
            .context("insert registrant if absent")?;

        let model = registrants::Entity::find()
            .filter(registrants::Column::Email.eq(registrant.email.as_str()))
            .lock_exclusive()
            .one(&txn)
            .await
            .context("lock registrant")?
            .context("registrant missing after insert")?;

        let stored = flags_from_model(&model);
        let merged = stored.union(registrant.roles);
        let model = if merged == stored {
            model
        } else {
            registrants::ActiveModel {
                id: Set(model.id),
                is_participant: Set(merged.participant),
                is_judge: Set(merged.judge),
                is_mentor: Set(merged.mentor),
                updated_at: Set(now),
                ..Default::default()
            }
            .update(&txn)
            .await
            .context("union registrant roles")?
        };

        txn.commit().await.context("commit merge registrant roles")?;
        Ok(registrant_from_model(model)?)
    }

    async fn delete(&self, email: &Email) -> Result<bool, RegistryError> {
        let result = registrants::Entity::delete_many()
            .filter(registrants::Column::Email.eq(email.as_str()))
            .exec(&self.db)
            .await
            .context("delete registrant")?;
        Ok(result.rows_affected > 0)
    }
}

fn new_registrant_model(registrant: &NewRegistrant, now: DateTime<Utc>) -> registrants::ActiveModel {
    registrants::ActiveModel {
        id: Set(Uuid::now_v7()),
        email: Set(registrant.email.as_str().to_owned()),
        first_name: Set(registrant.first_name.clone()),
        last_name: Set(registrant.last_name.clone()),
        is_participant: Set(registrant.roles.participant),
        is_judge: Set(registrant.roles.judge),
        is_mentor: Set(registrant.roles.mentor),
        is_capstone: Set(registrant.is_capstone),
        created_at: Set(now),
        updated_at: Set(now),
    }
}

fn flags_from_model(model: &registrants::Model) -> RoleFlags {
    RoleFlags {
        participant: model.is_participant,
        judge: model.is_judge,
        mentor: model.is_mentor,
    }
}

fn registrant_from_model(model: registrants::Model) -> anyhow::Result<Registrant> {
    Ok(Registrant {
        id: RegistrantId(model.id),
        roles: flags_from_model(&model),
        email: Email::parse(&model.email).context("stored registrant email is invalid")?,
        first_name: model.first_name,
        last_name: model.last_name,
        is_capstone: model.is_capstone,
        created_at: model.created_at,
        updated_at: model.updated_at,
    })
}

// ── Account repository ───────────────────────────────────────────────────────

#[derive(Clone)]
pub struct DbAccountRepository {
    pub db: DatabaseConnection,
}

impl AccountRepository for DbAccountRepository {
    async fn find_by_external_id(
        &self,
        external_id: &ExternalId,
    ) -> Result<Option<VerifiedAccount>, RegistryError> {
        let model = verified_accounts::Entity::find()
            .filter(verified_accounts::Column::ExternalId.eq(external_id.as_str()))
            .one(&self.db)
            .await
            .context("find account by external id")?;
        Ok(model.map(account_from_model).transpose()?)
    }

    async fn find_by_email(&self, email: &Email) -> Result<Option<VerifiedAccount>, RegistryError> {
        let model = verified_accounts::Entity::find_by_id(email.as_str().to_owned())
            .one(&self.db)
            .await
            .context("find account by email")?;
        Ok(model.map(account_from_model).transpose()?)
    }

    async fn create(&self, account: &VerifiedAccount) -> Result<(), RegistryError> {
        insert_account(&self.db, account).await
    }

    async fn delete(&self, external_id: &ExternalId) -> Result<bool, RegistryError> {
        let result = verified_accounts::Entity::delete_many()
            .filter(verified_accounts::Column::ExternalId.eq(external_id.as_str()))
            .exec(&self.db)
            .await
            .context("delete account")?;
        Ok(result.rows_affected > 0)
    }
}

async fn insert_account<C>(conn: &C, account: &VerifiedAccount) -> Result<(), RegistryError>
where
    C: ConnectionTrait,
{
    let existing = verified_accounts::Entity::find()
        .filter(
            Condition::any()
                .add(verified_accounts::Column::RegistrantEmail.eq(account.registrant_email.as_str()))
                .add(verified_accounts::Column::ExternalId.eq(account.external_id.as_str())),
        )
        .one(conn)
        .await
        .context("check existing account")?;
    if existing.is_some() {
        return Err(RegistryError::DuplicateAccount);
    }

    verified_accounts::ActiveModel {
        registrant_email: Set(account.registrant_email.as_str().to_owned()),
        external_id: Set(account.external_id.as_str().to_owned()),
        display_name: Set(account.display_name.clone()),
        team_id: Set(account.team_id.map(|id| id.0)),
        verified_at: Set(account.verified_at),
    }
    .insert(conn)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            RegistryError::DuplicateAccount
        } else {
            anyhow::Error::new(e).context("insert account").into()
        }
    })?;
    Ok(())
}

fn account_from_model(model: verified_accounts::Model) -> anyhow::Result<VerifiedAccount> {
    Ok(VerifiedAccount {
        registrant_email: Email::parse(&model.registrant_email)
            .context("stored account email is invalid")?,
        external_id: ExternalId::parse(&model.external_id)
            .context("stored external id is invalid")?,
        display_name: model.display_name,
        team_id: model.team_id.map(TeamId),
        verified_at: model.verified_at,
    })
}

// ── Verification code repository ─────────────────────────────────────────────

#[derive(Clone)]
pub struct DbVerificationCodeRepository {
    pub db: DatabaseConnection,
}

impl VerificationCodeRepository for DbVerificationCodeRepository {
    async fn issue(&self, code: &VerificationCode) -> Result<bool, RegistryError> {
        let txn = self.db.begin().await.context("begin issue code")?;

        let clash = verification_codes::Entity::find_by_id(code.code.clone())
            .one(&txn)
            .await
            .context("check outstanding code")?;
        if clash.is_some() {
            return Ok(false);
        }

        verification_codes::Entity::delete_many()
            .filter(
                Condition::any()
                    .add(verification_codes::Column::ExternalId.eq(code.external_id.as_str()))
                    .add(
                        verification_codes::Column::RegistrantEmail
                            .eq(code.registrant_email.as_str()),
                    ),
            )
            .exec(&txn)
            .await
            .context("replace prior codes")?;

        let inserted = verification_codes::ActiveModel {
            code: Set(code.code.clone()),
            external_id: Set(code.external_id.as_str().to_owned()),
            registrant_email: Set(code.registrant_email.as_str().to_owned()),
            issued_at: Set(code.issued_at),
            expires_at: Set(code.expires_at),
        }
        .insert(&txn)
        .await;
        match inserted {
            Ok(_) => {}
            // Lost a race for the same code string; the caller draws again.
            Err(e) if is_unique_violation(&e) => return Ok(false),
            Err(e) => return Err(anyhow::Error::new(e).context("insert code").into()),
        }

        txn.commit().await.context("commit issue code")?;
        Ok(true)
    }

    async fn redeem(
        &self,
        code: &str,
        external_id: &ExternalId,
        display_name: &str,
        now: DateTime<Utc>,
    ) -> Result<VerifiedAccount, RegistryError> {
        let txn = self.db.begin().await.context("begin redeem code")?;

        let model = verification_codes::Entity::find_by_id(code.to_owned())
            .lock_exclusive()
            .one(&txn)
            .await
            .context("lock verification code")?
            .ok_or(RegistryError::CodeNotFound)?;
        if model.expires_at <= now {
            return Err(RegistryError::CodeNotFound);
        }
        if model.external_id != external_id.as_str() {
            return Err(RegistryError::CodeMismatch);
        }

        // The sweep deletes the same row; only one delete can win.
        let deleted = verification_codes::Entity::delete_by_id(model.code.clone())
            .exec(&txn)
            .await
            .context("consume verification code")?;
        if deleted.rows_affected == 0 {
            return Err(RegistryError::CodeNotFound);
        }

        let account = VerifiedAccount {
            registrant_email: Email::parse(&model.registrant_email)
                .context("stored code email is invalid")?,
            external_id: external_id.clone(),
            display_name: display_name.to_owned(),
            team_id: None,
            verified_at: now,
        };
        insert_account(&txn, &account).await?;

        txn.commit().await.context("commit redeem code")?;
        Ok(account)
    }

    async fn invalidate(&self, code: &str) -> Result<bool, RegistryError> {
        let result = verification_codes::Entity::delete_by_id(code.to_owned())
            .exec(&self.db)
            .await
            .context("invalidate code")?;
        Ok(result.rows_affected > 0)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, RegistryError> {
        let result = verification_codes::Entity::delete_many()
            .filter(verification_codes::Column::ExpiresAt.lte(now))
            .exec(&self.db)
            .await
            .context("delete expired codes")?;
        Ok(result.rows_affected)
    }
}

// ── Team repository ──────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct DbTeamRepository {
    pub db: DatabaseConnection,
    pub capacity: TeamCapacity,
}

#[derive(Debug, FromQueryResult)]
struct SequenceState {
    last_value: i64,
    is_called: bool,
}

#[derive(Debug, FromQueryResult)]
struct NextId {
    id: i64,
}

impl TeamRepository for DbTeamRepository {
    async fn peek_next_id(&self) -> Result<TeamId, RegistryError> {
        let state = SequenceState::find_by_statement(Statement::from_string(
            self.db.get_database_backend(),
            format!("SELECT last_value, is_called FROM {TEAM_ID_SEQUENCE}"),
        ))
        .one(&self.db)
        .await
        .context("read team id sequence")?
        .context("team id sequence is missing")?;
        let next = if state.is_called {
            state.last_value + 1
        } else {
            state.last_value
        };
        Ok(TeamId(next))
    }

    async fn reserve_id(&self) -> Result<TeamId, RegistryError> {
        let next = NextId::find_by_statement(Statement::from_string(
            self.db.get_database_backend(),
            format!("SELECT nextval('{TEAM_ID_SEQUENCE}') AS id"),
        ))
        .one(&self.db)
        .await
        .context("reserve team id")?
        .context("nextval returned no row")?;
        Ok(TeamId(next.id))
    }

    async fn create(&self, team: &NewTeam) -> Result<FoundedTeam, RegistryError> {
        let Some((requester, invitees)) = team.members.split_first() else {
            return Err(RegistryError::Validation("team has no members".to_owned()));
        };
        let txn = self.db.begin().await.context("begin create team")?;

        let taken = teams::Entity::find()
            .filter(teams::Column::Name.eq(team.name.as_str()))
            .one(&txn)
            .await
            .context("check team name")?;
        if taken.is_some() {
            return Err(RegistryError::NameTaken);
        }

        let member_ids: Vec<&str> = team.members.iter().map(ExternalId::as_str).collect();
        let accounts = verified_accounts::Entity::find()
            .filter(verified_accounts::Column::ExternalId.is_in(member_ids))
            .lock_exclusive()
            .all(&txn)
            .await
            .context("lock founding members")?;
        let locked = |id: &ExternalId| accounts.iter().find(|a| a.external_id == id.as_str());

        match locked(requester) {
            None => return Err(RegistryError::NotVerified),
            Some(account) if account.team_id.is_some() => {
                return Err(RegistryError::AlreadyOnTeam);
            }
            Some(_) => {}
        }

        let mut members = vec![requester.clone()];
        let mut dropped = Vec::new();
        for invitee in invitees {
            let reason = match locked(invitee) {
                None => IneligibleReason::NotVerified,
                Some(account) if account.team_id.is_some() => IneligibleReason::AlreadyOnTeam,
                Some(_) => {
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

        let activated_at = (members.len() >= MIN_ACTIVE_TEAM_SIZE).then_some(team.created_at);
        let model = teams::ActiveModel {
            id: Set(team.id.0),
            name: Set(team.name.clone()),
            is_capstone: Set(team.is_capstone),
            lead_external_id: Set(Some(requester.as_str().to_owned())),
            role_id: Set(team.resources.role_id.clone()),
            category_id: Set(team.resources.category_id.clone()),
            text_id: Set(team.resources.text_id.clone()),
            voice_id: Set(team.resources.voice_id.clone()),
            formation_deadline: Set(team.formation_deadline),
            activated_at: Set(activated_at),
            created_at: Set(team.created_at),
        }
        .insert(&txn)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                RegistryError::NameTaken
            } else {
                anyhow::Error::new(e).context("insert team").into()
            }
        })?;

        let assigned: Vec<&str> = members.iter().map(ExternalId::as_str).collect();
        verified_accounts::Entity::update_many()
            .col_expr(verified_accounts::Column::TeamId, Expr::value(team.id.0))
            .filter(verified_accounts::Column::ExternalId.is_in(assigned))
            .exec(&txn)
            .await
            .context("assign founding members")?;

        txn.commit().await.context("commit create team")?;
        if !dropped.is_empty() {
            tracing::info!(
                team_id = %team.id,
                dropped = dropped.len(),
                "invitees dropped at creation"
            );
        }
        Ok(FoundedTeam {
            team: team_from_model(model)?,
            members,
            dropped,
        })
    }

    async fn find_by_id(&self, id: TeamId) -> Result<Option<Team>, RegistryError> {
        let model = teams::Entity::find_by_id(id.0)
            .one(&self.db)
            .await
            .context("find team by id")?;
        Ok(model.map(team_from_model).transpose()?)
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Team>, RegistryError> {
        let model = teams::Entity::find()
            .filter(teams::Column::Name.eq(name))
            .one(&self.db)
            .await
            .context("find team by name")?;
        Ok(model.map(team_from_model).transpose()?)
    }

    async fn members_of(&self, id: TeamId) -> Result<Vec<VerifiedAccount>, RegistryError> {
        let models = verified_accounts::Entity::find()
            .filter(verified_accounts::Column::TeamId.eq(id.0))
            .order_by_asc(verified_accounts::Column::VerifiedAt)
            .all(&self.db)
            .await
            .context("list team members")?;
        Ok(models
            .into_iter()
            .map(account_from_model)
            .collect::<anyhow::Result<Vec<_>>>()?)
    }

    async fn list_with_members(&self) -> Result<Vec<(Team, Vec<VerifiedAccount>)>, RegistryError> {
        let models = teams::Entity::find()
            .order_by_asc(teams::Column::Id)
            .all(&self.db)
            .await
            .context("list teams")?;
        let accounts = verified_accounts::Entity::find()
            .filter(verified_accounts::Column::TeamId.is_not_null())
            .order_by_asc(verified_accounts::Column::VerifiedAt)
            .all(&self.db)
            .await
            .context("list team members")?;

        let mut by_team: HashMap<i64, Vec<VerifiedAccount>> = HashMap::new();
        for model in accounts {
            if let Some(team_id) = model.team_id {
                by_team
                    .entry(team_id)
                    .or_default()
                    .push(account_from_model(model)?);
            }
        }
        models
            .into_iter()
            .map(|model| -> Result<_, RegistryError> {
                let members = by_team.remove(&model.id).unwrap_or_default();
                Ok((team_from_model(model)?, members))
            })
            .collect()
    }

    async fn team_size(&self, id: TeamId) -> Result<usize, RegistryError> {
        Ok(count_members(&self.db, id.0).await?)
    }

    async fn add_member(
        &self,
        id: TeamId,
        external_id: &ExternalId,
        now: DateTime<Utc>,
    ) -> Result<Team, RegistryError> {
        let txn = self.db.begin().await.context("begin add member")?;

        // Team row first, then account row: the lock order every writer uses.
        let team = lock_team(&txn, id.0)
            .await?
            .ok_or(RegistryError::TeamNotFound)?;
        let account = lock_account(&txn, external_id)
            .await?
            .ok_or(RegistryError::NotVerified)?;
        if account.team_id.is_some() {
            return Err(RegistryError::AlreadyOnTeam);
        }

        let size = count_members(&txn, id.0).await?;
        if size >= self.capacity.for_team(team.is_capstone) {
            return Err(RegistryError::TeamFull);
        }

        verified_accounts::ActiveModel {
            registrant_email: Set(account.registrant_email),
            team_id: Set(Some(id.0)),
            ..Default::default()
        }
        .update(&txn)
        .await
        .context("assign member")?;

        let team = if team.activated_at.is_none() && size + 1 >= MIN_ACTIVE_TEAM_SIZE {
            teams::ActiveModel {
                id: Set(team.id),
                activated_at: Set(Some(now)),
                ..Default::default()
            }
            .update(&txn)
            .await
            .context("activate team")?
        } else {
            team
        };

        txn.commit().await.context("commit add member")?;
        Ok(team_from_model(team)?)
    }

    async fn remove_member(&self, external_id: &ExternalId) -> Result<Departure, RegistryError> {
        let account = self
            .find_account(external_id)
            .await?
            .ok_or(RegistryError::NotVerified)?;
        let team_id = account.team_id.ok_or(RegistryError::NotOnTeam)?;

        let txn = self.db.begin().await.context("begin remove member")?;
        let team = lock_team(&txn, team_id)
            .await?
            .ok_or(RegistryError::NotOnTeam)?;
        let account = lock_account(&txn, external_id)
            .await?
            .ok_or(RegistryError::NotVerified)?;
        if account.team_id != Some(team_id) {
            return Err(RegistryError::NotOnTeam);
        }

        verified_accounts::ActiveModel {
            registrant_email: Set(account.registrant_email),
            team_id: Set(None),
            ..Default::default()
        }
        .update(&txn)
        .await
        .context("release member")?;

        let remaining = count_members(&txn, team_id).await?;
        let was_lead = team.lead_external_id.as_deref() == Some(external_id.as_str());
        let mut new_lead = None;
        if remaining == 0 {
            teams::Entity::delete_by_id(team_id)
                .exec(&txn)
                .await
                .context("delete empty team")?;
        } else if was_lead {
            let successor = verified_accounts::Entity::find()
                .filter(verified_accounts::Column::TeamId.eq(team_id))
                .order_by(random_order(), Order::Asc)
                .one(&txn)
                .await
                .context("pick new team lead")?
                .context("team has members but none found")?;
            teams::ActiveModel {
                id: Set(team_id),
                lead_external_id: Set(Some(successor.external_id.clone())),
                ..Default::default()
            }
            .update(&txn)
            .await
            .context("reassign team lead")?;
            new_lead = Some(
                ExternalId::parse(&successor.external_id)
                    .context("stored external id is invalid")?,
            );
        }

        txn.commit().await.context("commit remove member")?;
        Ok(Departure {
            team: team_from_model(team)?,
            external_id: external_id.clone(),
            remaining,
            new_lead,
            team_deleted: remaining == 0,
        })
    }

    async fn set_lead(&self, id: TeamId, lead: &ExternalId) -> Result<Team, RegistryError> {
        let txn = self.db.begin().await.context("begin set lead")?;
        lock_team(&txn, id.0)
            .await?
            .ok_or(RegistryError::TeamNotFound)?;

        let member = verified_accounts::Entity::find()
            .filter(verified_accounts::Column::ExternalId.eq(lead.as_str()))
            .filter(verified_accounts::Column::TeamId.eq(id.0))
            .one(&txn)
            .await
            .context("check lead membership")?;
        if member.is_none() {
            return Err(RegistryError::NotOnTeam);
        }

        let model = teams::ActiveModel {
            id: Set(id.0),
            lead_external_id: Set(Some(lead.as_str().to_owned())),
            ..Default::default()
        }
        .update(&txn)
        .await
        .context("set team lead")?;

        txn.commit().await.context("commit set lead")?;
        Ok(team_from_model(model)?)
    }

    async fn delete(&self, id: TeamId) -> Result<Option<DeletedTeam>, RegistryError> {
        let txn = self.db.begin().await.context("begin delete team")?;
        let Some(team) = lock_team(&txn, id.0).await? else {
            return Ok(None);
        };
        let deleted = delete_team_in(&txn, team).await?;
        txn.commit().await.context("commit delete team")?;
        Ok(Some(deleted))
    }

    async fn list_expired_forming(&self, now: DateTime<Utc>) -> Result<Vec<Team>, RegistryError> {
        let models = teams::Entity::find()
            .filter(teams::Column::ActivatedAt.is_null())
            .filter(teams::Column::FormationDeadline.lte(now))
            .order_by_asc(teams::Column::Id)
            .all(&self.db)
            .await
            .context("list expired forming teams")?;
        Ok(models
            .into_iter()
            .map(team_from_model)
            .collect::<anyhow::Result<Vec<_>>>()?)
    }

    async fn delete_if_still_forming(
        &self,
        id: TeamId,
        now: DateTime<Utc>,
    ) -> Result<Option<DeletedTeam>, RegistryError> {
        let txn = self.db.begin().await.context("begin formation timeout")?;
        let Some(team) = lock_team(&txn, id.0).await? else {
            return Ok(None);
        };
        if team.activated_at.is_some() || team.formation_deadline > now {
            return Ok(None);
        }
        if count_members(&txn, id.0).await? >= MIN_ACTIVE_TEAM_SIZE {
            return Ok(None);
        }
        let deleted = delete_team_in(&txn, team).await?;
        txn.commit().await.context("commit formation timeout")?;
        Ok(Some(deleted))
    }
}

impl DbTeamRepository {
    async fn find_account(
        &self,
        external_id: &ExternalId,
    ) -> Result<Option<verified_accounts::Model>, RegistryError> {
        Ok(verified_accounts::Entity::find()
            .filter(verified_accounts::Column::ExternalId.eq(external_id.as_str()))
            .one(&self.db)
            .await
            .context("find account")?)
    }
}

async fn lock_team(
    txn: &DatabaseTransaction,
    id: i64,
) -> Result<Option<teams::Model>, RegistryError> {
    Ok(teams::Entity::find_by_id(id)
        .lock_exclusive()
        .one(txn)
        .await
        .context("lock team")?)
}

async fn lock_account(
    txn: &DatabaseTransaction,
    external_id: &ExternalId,
) -> Result<Option<verified_accounts::Model>, RegistryError> {
    Ok(verified_accounts::Entity::find()
        .filter(verified_accounts::Column::ExternalId.eq(external_id.as_str()))
        .lock_exclusive()
        .one(txn)
        .await
        .context("lock account")?)
}

async fn count_members<C>(conn: &C, team_id: i64) -> anyhow::Result<usize>
where
    C: ConnectionTrait,
{
    let count = verified_accounts::Entity::find()
        .filter(verified_accounts::Column::TeamId.eq(team_id))
        .count(conn)
        .await
        .context("count team members")?;
    Ok(usize::try_from(count)?)
}

/// Release every member of a locked team and delete its row.
async fn delete_team_in(
    txn: &DatabaseTransaction,
    team: teams::Model,
) -> Result<DeletedTeam, RegistryError> {
    let members = verified_accounts::Entity::find()
        .filter(verified_accounts::Column::TeamId.eq(team.id))
        .all(txn)
        .await
        .context("list members of deleted team")?;

    verified_accounts::Entity::update_many()
        .col_expr(
            verified_accounts::Column::TeamId,
            Expr::value(Option::<i64>::None),
        )
        .filter(verified_accounts::Column::TeamId.eq(team.id))
        .exec(txn)
        .await
        .context("release team members")?;

    teams::Entity::delete_by_id(team.id)
        .exec(txn)
        .await
        .context("delete team")?;

    let released = members
        .iter()
        .map(|m| ExternalId::parse(&m.external_id))
        .collect::<Result<Vec<_>, _>>()
        .context("stored external id is invalid")?;
    Ok(DeletedTeam {
        team: team_from_model(team)?,
        released,
    })
}

fn team_from_model(model: teams::Model) -> anyhow::Result<Team> {
    let lead = model
        .lead_external_id
        .as_deref()
        .map(ExternalId::parse)
        .transpose()
        .context("stored team lead is invalid")?;
    Ok(Team {
        id: TeamId(model.id),
        name: model.name,
        is_capstone: model.is_capstone,
        lead,
        resources: TeamResources {
            role_id: model.role_id,
            category_id: model.category_id,
            text_id: model.text_id,
            voice_id: model.voice_id,
        },
        formation_deadline: model.formation_deadline,
        activated_at: model.activated_at,
        created_at: model.created_at,
    })
}
