// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Subscription endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::application::{
    CanViewSubscription, CommandResponse, GetSubscriptionByEmailQuery, SubscribeCommand,
    UnsubscribeByTokenCommand, UnsubscribeCommand,
};
use crate::auth::Authorized;
use crate::error::ApiError;
use crate::models::{CommandResult, SubscriptionLookup, SubscriptionRequest};
use crate::state::AppState;
use crate::storage::Subscription;

/// Maps a command outcome to the response envelope.
fn command_result<T>(response: CommandResponse<T>, success: StatusCode) -> (StatusCode, Json<CommandResult>) {
    if response.is_success() {
        (success, Json(CommandResult::succeeded()))
    } else {
        (
            StatusCode::BAD_REQUEST,
            Json(CommandResult::failed(response.errors)),
        )
    }
}

/// Subscribe an email address to the mailing list.
#[utoipa::path(
    post,
    path = "/v1/subscribe",
    tag = "Subscribe",
    request_body = SubscriptionRequest,
    responses(
        (status = 201, description = "Address subscribed", body = CommandResult),
        (status = 400, description = "Validation failed", body = CommandResult),
    )
)]
pub async fn subscribe(
    State(state): State<AppState>,
    Json(request): Json<SubscriptionRequest>,
) -> Result<(StatusCode, Json<CommandResult>), ApiError> {
    let response = state
        .mediator
        .send(SubscribeCommand {
            email_address: request.email_address,
        })
        .await?;
    Ok(command_result(response, StatusCode::CREATED))
}

/// Unsubscribe an email address.
///
/// Unknown addresses succeed so the endpoint does not reveal who is subscribed.
#[utoipa::path(
    post,
    path = "/v1/unsubscribe",
    tag = "Unsubscribe",
    request_body = SubscriptionRequest,
    responses(
        (status = 201, description = "Address unsubscribed", body = CommandResult),
        (status = 400, description = "Validation failed", body = CommandResult),
    )
)]
pub async fn unsubscribe(
    State(state): State<AppState>,
    Json(request): Json<SubscriptionRequest>,
) -> Result<(StatusCode, Json<CommandResult>), ApiError> {
    let response = state
        .mediator
        .send(UnsubscribeCommand {
            email_address: request.email_address,
        })
        .await?;
    Ok(command_result(response, StatusCode::CREATED))
}

/// Unsubscribe through the link sent in the confirmation email.
#[utoipa::path(
    get,
    path = "/v1/unsubscribe/{token}",
    tag = "Unsubscribe",
    params(("token" = String, Path, description = "Protected unsubscribe token")),
    responses(
        (status = 200, description = "Address unsubscribed", body = CommandResult),
        (status = 400, description = "Invalid or expired link", body = CommandResult),
    )
)]
pub async fn unsubscribe_by_token(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<(StatusCode, Json<CommandResult>), ApiError> {
    let response = state
        .mediator
        .send(UnsubscribeByTokenCommand { token })
        .await?;
    Ok(command_result(response, StatusCode::OK))
}

/// Look up the subscription for an email address.
#[utoipa::path(
    get,
    path = "/v1/subscriptions",
    tag = "Subscriptions",
    params(SubscriptionLookup),
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Subscription found", body = Subscription),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Caller lacks CanViewSubscription"),
        (status = 404, description = "No subscription for this address"),
    )
)]
pub async fn get_subscription(
    State(state): State<AppState>,
    Authorized(_user, _): Authorized<CanViewSubscription>,
    Query(lookup): Query<SubscriptionLookup>,
) -> Result<Json<Subscription>, ApiError> {
    state
        .mediator
        .send(GetSubscriptionByEmailQuery {
            email_address: lookup.email_address,
        })
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Subscription not found"))
}
