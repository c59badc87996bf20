use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use super::dto::{AuthResponse, LoginRequest, LogoutAllResponse, MessageResponse, PublicUser, RegisterRequest};
use super::extractors::RequestContext;
use super::services;
use crate::error::AppError;
use crate::extract::ApiJson;
use crate::state::AppState;

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/logout-all", post(logout_all))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/auth/me", get(get_me))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (user, issued) = services::register(&state, payload).await?;
    Ok((
        StatusCode::CREATED,
        issued.cookie,
        Json(AuthResponse {
            success: true,
            user: PublicUser::from(user),
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (user, issued) = services::login(&state, payload).await?;
    Ok((
        issued.cookie,
        Json(AuthResponse {
            success: true,
            user: PublicUser::from(user),
        }),
    ))
}

#[instrument(skip(state, ctx))]
pub async fn logout(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<impl IntoResponse, AppError> {
    let cookie = services::logout(&state, &ctx).await?;
    Ok((cookie, Json(MessageResponse::ok("Logged out"))))
}

#[instrument(skip(state, ctx))]
pub async fn logout_all(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<impl IntoResponse, AppError> {
    let (revoked, cookie) = services::logout_all(&state, &ctx).await?;
    Ok((
        cookie,
        Json(LogoutAllResponse {
            success: true,
            revoked,
        }),
    ))
}

#[instrument(skip(ctx))]
pub async fn get_me(ctx: RequestContext) -> Result<Json<PublicUser>, AppError> {
    let user = services::me(&ctx)?;
    Ok(Json(PublicUser::from(user.clone())))
}
