use axum::{
    Router,
    http::HeaderName,
    middleware::from_fn_with_state,
    routing::{delete, get, post},
};
use tower_http::{request_id::PropagateRequestIdLayer, trace::TraceLayer};

use checkpoint_core::health::healthz;
use checkpoint_core::middleware::{request_id_layer, require_api_key};

use crate::handlers::{
    health::readyz,
    registrants::{remove_registrant, upsert_registrant},
    teams::{
        add_member, create_team, delete_team, get_team, leave_team, list_teams, next_team_id,
        remove_member, transfer_lead,
    },
    verify::{admin_verify, resync_roles, verify},
};
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        // Registrants
        .route("/registrants", post(upsert_registrant))
        .route("/registrants/{email}", delete(remove_registrant))
        // Verification
        .route("/verify", post(verify))
        .route("/verify/admin", post(admin_verify))
        .route("/verify/resync", post(resync_roles))
        // Teams
        .route("/teams", get(list_teams).post(create_team))
        .route("/teams/next-id", get(next_team_id))
        .route("/teams/leave", post(leave_team))
        .route("/teams/{id}", get(get_team).delete(delete_team))
        .route("/teams/{id}/members", post(add_member))
        .route("/teams/{id}/members/remove", post(remove_member))
        .route("/teams/{id}/lead", post(transfer_lead))
        .route_layer(from_fn_with_state(state.api_key.clone(), require_api_key));

    Router::new()
        // Health
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
            "x-request-id",
        )))
        .layer(request_id_layer())
        .with_state(state)
}
