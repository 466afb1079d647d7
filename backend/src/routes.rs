use rocket::{State, get, post, http::Status, serde::json::Json};
use tracing::{debug, error, instrument};
use shared::{
    identity::{IdentityResolver, RequestOrigin},
    models::*,
};
use crate::{
    admin::{AdminCapability, AdminSecret},
    error::ApiError,
    rate_limiter::RateLimiter,
    service::VotingService,
};

const ADMIN_MAX_FAILED_ATTEMPTS: u32 = 5;
const ADMIN_WINDOW_MINUTES: i64 = 15;

pub struct AppState {
    pub service: VotingService,
    pub identity: Box<dyn IdentityResolver>,
    pub admin_secret: AdminSecret,
    pub admin_limiter: RateLimiter,
}

impl AppState {
    pub fn new(
        service: VotingService,
        identity: Box<dyn IdentityResolver>,
        admin_secret: Option<&str>,
    ) -> Self {
        Self {
            service,
            identity,
            admin_secret: AdminSecret::new(admin_secret),
            admin_limiter: RateLimiter::new(ADMIN_MAX_FAILED_ATTEMPTS, ADMIN_WINDOW_MINUTES),
        }
    }
}

#[get("/votes")]
pub async fn get_votes(state: &State<AppState>) -> Result<Json<Tallies>, ApiError> {
    Ok(Json(state.service.get_tallies().await?))
}

#[derive(Debug, rocket::FromForm)]
pub struct StatusQuery {
    #[field(name = "voterId")]
    voter_id: Option<String>,
}

#[instrument(skip(state, origin))]
#[get("/voter-status?<query..>")]
pub async fn voter_status(
    state: &State<AppState>,
    query: StatusQuery,
    origin: RequestOrigin,
) -> Result<Json<VoterStatus>, ApiError> {
    let voter_id = state.identity.resolve(query.voter_id.as_deref(), &origin);
    let votes_used = state.service.get_voter_status(voter_id.as_deref()).await?;
    Ok(Json(VoterStatus { votes_used }))
}

#[instrument(skip(state, request, origin))]
#[post("/vote", format = "json", data = "<request>")]
pub async fn cast_vote(
    state: &State<AppState>,
    request: Json<VoteRequest>,
    origin: RequestOrigin,
) -> Result<Json<VoteResponse>, ApiError> {
    let request = request.into_inner();
    let voter_id = state.identity.resolve(request.voter_id.as_deref(), &origin);

    let receipt = state.service
        .cast_vote(voter_id.as_deref(), request.character_id.as_deref())
        .await
        .map_err(|e| {
            if e.is_client_error() {
                debug!("Vote rejected: {}", e);
            } else {
                error!("Vote failed: {}", e);
            }
            e
        })?;

    Ok(Json(receipt.into()))
}

#[post("/citadel-reset-secret-99")]
pub async fn admin_reset(
    state: &State<AppState>,
    _admin: AdminCapability,
) -> Result<Json<ResetResponse>, ApiError> {
    state.service.admin_reset().await?;
    Ok(Json(ResetResponse {
        message: "The realm has been reset. All votes are cleared.".into(),
    }))
}

#[rocket::options("/<_..>")]
pub async fn all_options() -> Status {
    Status::Ok
}
