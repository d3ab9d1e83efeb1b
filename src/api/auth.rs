// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Local account endpoints: registration and password login.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::{info, warn};

use crate::application::validation::EMAIL_ADDRESS_FIELD;
use crate::application::FieldError;
use crate::error::ApiError;
use crate::identity::{IdentityError, SignInResult};
use crate::models::{CommandResult, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse};
use crate::state::AppState;

const PASSWORD_FIELD: &str = "Password";

/// Create a local account.
#[utoipa::path(
    post,
    path = "/v1/auth/register",
    tag = "Auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = RegisterResponse),
        (status = 400, description = "Invalid email or password", body = CommandResult),
        (status = 409, description = "Email already registered"),
    )
)]
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<Response, ApiError> {
    let users = state.users.clone();
    let RegisterRequest {
        email_address,
        password,
    } = request;
    // argon2 hashing is CPU-bound
    let created = tokio::task::spawn_blocking(move || users.create(&email_address, &password))
        .await
        .map_err(ApiError::internal)?;

    match created {
        Ok(user) => {
            info!(user_id = %user.id, "User registered");
            let body = RegisterResponse {
                user_id: user.id,
                email_address: user.email_address,
            };
            Ok((StatusCode::CREATED, Json(body)).into_response())
        }
        Err(IdentityError::InvalidEmail(email)) => Ok(validation_failed(vec![
            FieldError::invalid_email_address(EMAIL_ADDRESS_FIELD, &email),
        ])),
        Err(IdentityError::PasswordPolicy(messages)) => Ok(validation_failed(
            messages
                .into_iter()
                .map(|m| FieldError::required_field_missing(PASSWORD_FIELD, m))
                .collect(),
        )),
        Err(e) => Err(e.into()),
    }
}

fn validation_failed(errors: Vec<FieldError>) -> Response {
    (StatusCode::BAD_REQUEST, Json(CommandResult::failed(errors))).into_response()
}

/// Exchange a username and password for an access token.
#[utoipa::path(
    post,
    path = "/v1/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in", body = LoginResponse),
        (status = 401, description = "Invalid credentials or account locked"),
        (status = 503, description = "Local sign-in is not configured"),
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let tokens = state
        .tokens
        .as_ref()
        .ok_or_else(|| ApiError::service_unavailable("Local sign-in is not configured"))?;

    let sign_in = state.sign_in.clone();
    let LoginRequest { username, password } = request;
    let outcome = tokio::task::spawn_blocking(move || {
        sign_in.password_sign_in(&username, &password, true)
    })
    .await
    .map_err(ApiError::internal)??;

    let user = match outcome {
        SignInResult::Succeeded(user) => user,
        failed => {
            warn!(outcome = ?failed, "Sign-in rejected");
            let message = failed.error_message().unwrap_or_default();
            return Err(ApiError::unauthorized(message));
        }
    };

    let roles = state.users.roles(&user)?;
    let claims = state.users.claims(&user)?;
    let token = tokens.generate(&user, &roles, &claims)?;
    info!(user_id = %user.id, "User signed in");

    Ok(Json(LoginResponse {
        access_token: token.token,
        token_type: "Bearer".to_string(),
        expires_in: token.expires_in,
    }))
}
