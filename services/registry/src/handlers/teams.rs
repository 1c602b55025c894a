use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};

use checkpoint_domain::id::TeamId;

use crate::domain::types::{Departure, Team, TeamRoster};
use crate::error::RegistryError;
use crate::handlers::external_id;
use crate::state::AppState;
use crate::usecase::team::{
    AddMemberInput, AddMemberUseCase, CreateTeamInput, CreateTeamUseCase, CreatedTeam,
    DeleteTeamUseCase, GetTeamUseCase, LeaveTeamUseCase, ListTeamsUseCase, NextTeamIdUseCase,
    RemoveMemberInput, RemoveMemberUseCase, TeamDetails, TransferLeadInput, TransferLeadUseCase,
};

// ── POST /teams ──────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct CreateTeamRequest {
    pub requester: String,
    pub name: String,
    #[serde(default)]
    pub invitees: Vec<String>,
}

pub async fn create_team(
    State(state): State<AppState>,
    Json(body): Json<CreateTeamRequest>,
) -> Result<(StatusCode, Json<CreatedTeam>), RegistryError> {
    let invitees = body
        .invitees
        .iter()
        .map(|raw| external_id(raw))
        .collect::<Result<Vec<_>, _>>()?;
    let usecase = CreateTeamUseCase {
        registrants: state.registrant_repo(),
        accounts: state.account_repo(),
        teams: state.team_repo(),
        platform: state.platform(),
        policy: state.team_policy,
        roles: state.roles.clone(),
    };
    let created = usecase
        .execute(CreateTeamInput {
            requester: external_id(&body.requester)?,
            name: body.name,
            invitees,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

// ── GET /teams ───────────────────────────────────────────────────────────────

pub async fn list_teams(
    State(state): State<AppState>,
) -> Result<Json<Vec<TeamRoster>>, RegistryError> {
    let usecase = ListTeamsUseCase {
        teams: state.team_repo(),
    };
    Ok(Json(usecase.execute().await?))
}

// ── GET /teams/next-id ───────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct NextTeamIdResponse {
    pub next_id: TeamId,
}

pub async fn next_team_id(
    State(state): State<AppState>,
) -> Result<Json<NextTeamIdResponse>, RegistryError> {
    let usecase = NextTeamIdUseCase {
        teams: state.team_repo(),
    };
    let next_id = usecase.execute().await?;
    Ok(Json(NextTeamIdResponse { next_id }))
}

// ── GET /teams/{id} ──────────────────────────────────────────────────────────

pub async fn get_team(
    State(state): State<AppState>,
    Path(team_id): Path<i64>,
) -> Result<Json<TeamDetails>, RegistryError> {
    let usecase = GetTeamUseCase {
        teams: state.team_repo(),
    };
    Ok(Json(usecase.execute(TeamId(team_id)).await?))
}

// ── DELETE /teams/{id} ───────────────────────────────────────────────────────

pub async fn delete_team(
    State(state): State<AppState>,
    Path(team_id): Path<i64>,
) -> Result<StatusCode, RegistryError> {
    let usecase = DeleteTeamUseCase {
        teams: state.team_repo(),
        platform: state.platform(),
        roles: state.roles.clone(),
    };
    usecase.execute(TeamId(team_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── POST /teams/{id}/members ─────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct MemberRequest {
    pub requester: String,
    pub member: String,
}

pub async fn add_member(
    State(state): State<AppState>,
    Path(team_id): Path<i64>,
    Json(body): Json<MemberRequest>,
) -> Result<Json<Team>, RegistryError> {
    let usecase = AddMemberUseCase {
        registrants: state.registrant_repo(),
        accounts: state.account_repo(),
        teams: state.team_repo(),
        platform: state.platform(),
        roles: state.roles.clone(),
    };
    let team = usecase
        .execute(AddMemberInput {
            requester: external_id(&body.requester)?,
            team_id: TeamId(team_id),
            member: external_id(&body.member)?,
        })
        .await?;
    Ok(Json(team))
}

// ── POST /teams/{id}/members/remove ──────────────────────────────────────────

pub async fn remove_member(
    State(state): State<AppState>,
    Path(team_id): Path<i64>,
    Json(body): Json<MemberRequest>,
) -> Result<Json<Departure>, RegistryError> {
    let usecase = RemoveMemberUseCase {
        accounts: state.account_repo(),
        teams: state.team_repo(),
        platform: state.platform(),
        roles: state.roles.clone(),
    };
    let departure = usecase
        .execute(RemoveMemberInput {
            requester: external_id(&body.requester)?,
            team_id: TeamId(team_id),
            member: external_id(&body.member)?,
        })
        .await?;
    Ok(Json(departure))
}

// ── POST /teams/leave ────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct LeaveTeamRequest {
    pub external_id: String,
}

pub async fn leave_team(
    State(state): State<AppState>,
    Json(body): Json<LeaveTeamRequest>,
) -> Result<Json<Departure>, RegistryError> {
    let usecase = LeaveTeamUseCase {
        teams: state.team_repo(),
        platform: state.platform(),
        roles: state.roles.clone(),
    };
    let departure = usecase.execute(&external_id(&body.external_id)?).await?;
    Ok(Json(departure))
}

// ── POST /teams/{id}/lead ────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct TransferLeadRequest {
    pub requester: String,
    pub new_lead: String,
}

pub async fn transfer_lead(
    State(state): State<AppState>,
    Path(team_id): Path<i64>,
    Json(body): Json<TransferLeadRequest>,
) -> Result<Json<Team>, RegistryError> {
    let usecase = TransferLeadUseCase {
        teams: state.team_repo(),
    };
    let team = usecase
        .execute(TransferLeadInput {
            requester: external_id(&body.requester)?,
            team_id: TeamId(team_id),
            new_lead: external_id(&body.new_lead)?,
        })
        .await?;
    Ok(Json(team))
}
