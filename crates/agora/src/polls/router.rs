use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Path, Query, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use super::demographics::ProfileUpdate;
use super::domain::{NewPoll, PollFilter, PollId, PollOptionId, PollUpdate, UserId};
use super::repository::{PollStore, RepositoryError};
use super::service::{PollService, PollServiceError};
use super::session::{Identity, Role, Session};
use super::validation::ValidationError;

/// Header carrying the authenticated user id, set by the auth gateway.
pub const USER_ID_HEADER: &str = "x-user-id";
/// Header carrying the caller's role (`admin` or `user`).
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// Router builder exposing the poll, vote, results, and profile endpoints.
pub fn poll_router<S>(service: Arc<PollService<S>>) -> Router
where
    S: PollStore,
{
    Router::new()
        .route(
            "/api/v1/polls",
            get(list_handler::<S>).post(create_handler::<S>),
        )
        .route(
            "/api/v1/polls/:poll_id",
            get(detail_handler::<S>)
                .patch(update_handler::<S>)
                .delete(delete_handler::<S>),
        )
        .route(
            "/api/v1/polls/:poll_id/votes",
            axum::routing::post(vote_handler::<S>),
        )
        .route("/api/v1/polls/:poll_id/votes/me", get(my_vote_handler::<S>))
        .route(
            "/api/v1/polls/:poll_id/eligibility",
            get(eligibility_handler::<S>),
        )
        .route("/api/v1/polls/:poll_id/results", get(results_handler::<S>))
        .route(
            "/api/v1/polls/:poll_id/results.csv",
            get(results_csv_handler::<S>),
        )
        .route(
            "/api/v1/profile",
            get(profile_handler::<S>).put(update_profile_handler::<S>),
        )
        .with_state(service)
}

/// Caller identity resolved from the gateway headers.
#[derive(Debug, Clone, Copy)]
pub struct Caller(pub Identity);

#[async_trait]
impl<St> FromRequestParts<St> for Caller
where
    St: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &St) -> Result<Self, Self::Rejection> {
        identity_from_headers(&parts.headers).map(Caller)
    }
}

pub(crate) fn identity_from_headers(headers: &HeaderMap) -> Result<Identity, Response> {
    let Some(raw_id) = headers.get(USER_ID_HEADER) else {
        return Ok(Identity::Anonymous);
    };

    let user_id = raw_id
        .to_str()
        .ok()
        .and_then(|value| Uuid::parse_str(value.trim()).ok())
        .map(UserId)
        .ok_or_else(|| {
            error_body(StatusCode::UNAUTHORIZED, "malformed user identity header")
        })?;

    let role = match headers
        .get(USER_ROLE_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_ascii_lowercase())
        .as_deref()
    {
        Some("admin") => Role::Admin,
        _ => Role::User,
    };

    Ok(Identity::Authenticated(Session { user_id, role }))
}

#[derive(Debug, Deserialize)]
pub(crate) struct VoteRequest {
    pub(crate) option_ids: Vec<PollOptionId>,
}

pub(crate) async fn list_handler<S: PollStore>(
    State(service): State<Arc<PollService<S>>>,
    Caller(identity): Caller,
    Query(filter): Query<PollFilter>,
) -> Response {
    match service.list_polls(&identity, filter).await {
        Ok(polls) => (StatusCode::OK, Json(polls)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn create_handler<S: PollStore>(
    State(service): State<Arc<PollService<S>>>,
    Caller(identity): Caller,
    Json(input): Json<NewPoll>,
) -> Response {
    match service.create_poll(&identity, input).await {
        Ok(detail) => (StatusCode::CREATED, Json(detail)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn detail_handler<S: PollStore>(
    State(service): State<Arc<PollService<S>>>,
    Caller(identity): Caller,
    Path(poll_id): Path<PollId>,
) -> Response {
    match service.get_poll(&identity, poll_id).await {
        Ok(detail) => (StatusCode::OK, Json(detail)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn update_handler<S: PollStore>(
    State(service): State<Arc<PollService<S>>>,
    Caller(identity): Caller,
    Path(poll_id): Path<PollId>,
    Json(update): Json<PollUpdate>,
) -> Response {
    match service.update_poll(&identity, poll_id, update).await {
        Ok(poll) => (StatusCode::OK, Json(poll)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn delete_handler<S: PollStore>(
    State(service): State<Arc<PollService<S>>>,
    Caller(identity): Caller,
    Path(poll_id): Path<PollId>,
) -> Response {
    match service.delete_poll(&identity, poll_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn vote_handler<S: PollStore>(
    State(service): State<Arc<PollService<S>>>,
    Caller(identity): Caller,
    Path(poll_id): Path<PollId>,
    Json(request): Json<VoteRequest>,
) -> Response {
    match service
        .submit_vote(&identity, poll_id, request.option_ids)
        .await
    {
        Ok(vote) => (StatusCode::CREATED, Json(vote)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn my_vote_handler<S: PollStore>(
    State(service): State<Arc<PollService<S>>>,
    Caller(identity): Caller,
    Path(poll_id): Path<PollId>,
) -> Response {
    match service.user_vote(&identity, poll_id).await {
        Ok(Some(ballot)) => (StatusCode::OK, Json(ballot)).into_response(),
        Ok(None) => error_body(StatusCode::NOT_FOUND, "no vote recorded for this poll"),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn eligibility_handler<S: PollStore>(
    State(service): State<Arc<PollService<S>>>,
    Caller(identity): Caller,
    Path(poll_id): Path<PollId>,
) -> Response {
    match service.eligibility(&identity, poll_id).await {
        Ok(eligibility) => (StatusCode::OK, Json(eligibility)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn results_handler<S: PollStore>(
    State(service): State<Arc<PollService<S>>>,
    Caller(identity): Caller,
    Path(poll_id): Path<PollId>,
) -> Response {
    match service.results_view(&identity, poll_id).await {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn results_csv_handler<S: PollStore>(
    State(service): State<Arc<PollService<S>>>,
    Caller(identity): Caller,
    Path(poll_id): Path<PollId>,
) -> Response {
    match service.results_csv(&identity, poll_id).await {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/csv; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn profile_handler<S: PollStore>(
    State(service): State<Arc<PollService<S>>>,
    Caller(identity): Caller,
) -> Response {
    match service.profile(&identity).await {
        Ok(Some(profile)) => (StatusCode::OK, Json(profile)).into_response(),
        Ok(None) => error_body(StatusCode::NOT_FOUND, "profile not created yet"),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn update_profile_handler<S: PollStore>(
    State(service): State<Arc<PollService<S>>>,
    Caller(identity): Caller,
    Json(update): Json<ProfileUpdate>,
) -> Response {
    match service.update_profile(&identity, update).await {
        Ok(profile) => (StatusCode::OK, Json(profile)).into_response(),
        Err(err) => err.into_response(),
    }
}

fn error_body(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

impl IntoResponse for PollServiceError {
    fn into_response(self) -> Response {
        let status = match &self {
            PollServiceError::Unauthenticated => StatusCode::UNAUTHORIZED,
            PollServiceError::Forbidden => StatusCode::FORBIDDEN,
            PollServiceError::AlreadyVoted
            | PollServiceError::StaleUpdate
            | PollServiceError::Storage(RepositoryError::Conflict) => StatusCode::CONFLICT,
            PollServiceError::NotFound(_) | PollServiceError::Storage(RepositoryError::NotFound) => {
                StatusCode::NOT_FOUND
            }
            PollServiceError::Validation(_)
            | PollServiceError::Storage(RepositoryError::PollNotActive(_)) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            PollServiceError::Storage(RepositoryError::Unavailable(_)) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            PollServiceError::Export(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let payload = match &self {
            PollServiceError::Validation(ValidationError::MissingDemographics(fields)) => json!({
                "error": self.to_string(),
                "missing_fields": fields,
            }),
            _ => json!({ "error": self.to_string() }),
        };

        (status, Json(payload)).into_response()
    }
}
