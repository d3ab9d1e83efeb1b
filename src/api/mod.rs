// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};
use tracing::warn;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    application::FieldError,
    models::{CommandResult, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse, SubscriptionRequest},
    rate_limit::rate_limit,
    state::AppState,
    storage::{Subscription, SubscriptionStatus},
};

pub mod auth;
pub mod health;
pub mod subscription;
pub mod users;

const HSTS_VALUE: &str = "max-age=86400; includeSubDomains; preload";

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        .route("/subscribe", post(subscription::subscribe))
        .route("/unsubscribe", post(subscription::unsubscribe))
        .route(
            "/unsubscribe/{token}",
            get(subscription::unsubscribe_by_token),
        )
        .route("/subscriptions", get(subscription::get_subscription))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/users/me", get(users::get_current_user));

    let mut app = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .nest("/v1", v1_routes);

    if state.environment.shows_api_docs() {
        app = app.merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()));
    }

    // Innermost first: rate limiting runs after CORS and the header layers.
    let mut app = app
        .layer(from_fn_with_state(state.rate_limiter.clone(), rate_limit))
        .layer(security_header(HeaderName::from_static("x-content-type-options"), "nosniff"))
        .layer(security_header(HeaderName::from_static("x-xss-protection"), "1; mode=block"))
        .layer(security_header(header::X_FRAME_OPTIONS, "SAMEORIGIN"))
        .layer(security_header(header::REFERRER_POLICY, "no-referrer-when-downgrade"))
        .layer(security_header(
            HeaderName::from_static("feature-policy"),
            "geolocation 'none'; midi 'none';",
        ));
    if state.environment.uses_hsts() {
        app = app.layer(security_header(header::STRICT_TRANSPORT_SECURITY, HSTS_VALUE));
    }

    app.layer(cors_layer(&state.cors_origins))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}

fn security_header(name: HeaderName, value: &'static str) -> SetResponseHeaderLayer<HeaderValue> {
    SetResponseHeaderLayer::if_not_present(name, HeaderValue::from_static(value))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::OPTIONS,
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
        .allow_credentials(true)
}

/// Registers the bearer scheme referenced by secured operations.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Communications API",
        description = "Mailing-list subscriptions with templated confirmation email."
    ),
    paths(
        subscription::subscribe,
        subscription::unsubscribe,
        subscription::unsubscribe_by_token,
        subscription::get_subscription,
        auth::register,
        auth::login,
        users::get_current_user,
        health::health,
        health::liveness,
        health::readiness
    ),
    components(
        schemas(
            SubscriptionRequest,
            CommandResult,
            FieldError,
            Subscription,
            SubscriptionStatus,
            RegisterRequest,
            RegisterResponse,
            LoginRequest,
            LoginResponse,
            users::UserMeResponse,
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Subscribe", description = "Mailing-list subscription"),
        (name = "Unsubscribe", description = "Mailing-list removal"),
        (name = "Subscriptions", description = "Subscription lookup"),
        (name = "Auth", description = "Local accounts"),
        (name = "Users", description = "Authenticated principal"),
        (name = "Health", description = "Liveness and readiness checks")
    )
)]
struct ApiDoc;
