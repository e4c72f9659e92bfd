/// Application state and router builder
///
/// This module defines the shared application state, the declared route
/// table and the function building the Axum router from them.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use modest_api::{app::{build_router, AppState}, config::Config};
/// use modest_shared::{mail::LogMailer, oauth::IdentityProviders, store::Stores};
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::load()?;
/// let state = AppState::new(
///     config,
///     Stores::memory(),
///     Arc::new(LogMailer::new("noreply@localhost")),
///     IdentityProviders::new(),
///     None,
/// );
/// state.validate_routes()?;
/// let app = build_router(state);
/// # Ok(())
/// # }
/// ```

use crate::{
    config::Config,
    error::{ApiError, ApiResult},
    middleware::{authz, security::SecurityHeadersLayer, session},
};
use axum::{
    http::{header, HeaderValue, Method},
    routing::{delete, get, post, put},
    Router,
};
use modest_shared::{
    auth::{
        authorization::Gate,
        rbac::{RoleTable, RouteGuard, RouteSpec},
    },
    billing::BillingGateway,
    lifecycle::AccountService,
    mail::Mailer,
    models::plan::Plan,
    oauth::IdentityProviders,
    store::Stores,
};
use std::{sync::Arc, time::Duration};
use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use RouteGuard::{Authenticated, Permission, Public};

/// Every route mounted by [`build_router`], with its guard
///
/// Permission-guarded routes must be granted by the role table; startup
/// fails otherwise (see [`AppState::validate_routes`]).
pub const ROUTES: &[RouteSpec] = &[
    RouteSpec::new("POST", "/signup", Public),
    RouteSpec::new("GET", "/confirm/{token}", Public),
    RouteSpec::new("POST", "/login", Public),
    RouteSpec::new("GET", "/magic-login/{otp}", Public),
    RouteSpec::new("GET", "/auth", Public),
    RouteSpec::new("GET", "/auth/callback", Public),
    RouteSpec::new("GET", "/logout", Public),
    RouteSpec::new("POST", "/forgot", Public),
    RouteSpec::new("POST", "/reset/{token}", Public),
    RouteSpec::new("GET", "/change/{token}", Public),
    RouteSpec::new("POST", "/webhook/{source}", Public),
    RouteSpec::new("GET", "/account", Authenticated),
    RouteSpec::new("POST", "/account", Authenticated),
    RouteSpec::new("POST", "/account/delete", Authenticated),
    RouteSpec::new("POST", "/account/checkout", Authenticated),
    RouteSpec::new("GET", "/account/checkout/success", Authenticated),
    RouteSpec::new("GET", "/account/checkout/cancel", Authenticated),
    RouteSpec::new("GET", "/account/subscription/manage", Authenticated),
    RouteSpec::new("GET", "/app", Authenticated),
    RouteSpec::new("POST", "/app/tasks/new", Authenticated),
    RouteSpec::new("POST", "/app/tasks/{id}/edit", Authenticated),
    RouteSpec::new("POST", "/app/tasks/{id}/delete", Authenticated),
    RouteSpec::new("GET", "/api/tasks", Permission),
    RouteSpec::new("POST", "/api/tasks", Permission),
    RouteSpec::new("PUT", "/api/tasks/{id}/status", Permission),
    RouteSpec::new("PUT", "/api/tasks/{id}/text", Permission),
    RouteSpec::new("DELETE", "/api/tasks/{id}", Permission),
];

/// Shared application state
///
/// This is cloned for each request handler via Axum's `State` extractor.
/// Everything inside is behind `Arc`s, so clones are shallow.
#[derive(Clone)]
pub struct AppState {
    /// Account lifecycle, also the entry point to the stores
    pub accounts: AccountService,

    /// Authorization gate for permission-guarded routes
    pub gate: Gate,

    /// Payment gateway; `None` when billing is not configured
    pub billing: Option<Arc<dyn BillingGateway>>,

    pub plans: Arc<Vec<Plan>>,

    pub config: Arc<Config>,
}

impl AppState {
    /// Wires the services together with the shipped role table
    pub fn new(
        config: Config,
        stores: Stores,
        mailer: Arc<dyn Mailer>,
        providers: IdentityProviders,
        billing: Option<Arc<dyn BillingGateway>>,
    ) -> Self {
        let roles = Arc::new(RoleTable::default_roles());
        let gate = Gate::new(roles.clone(), stores.tasks.clone());
        let plans = Arc::new(config.load_plans());
        let accounts = AccountService::new(
            stores,
            mailer,
            providers,
            roles,
            config.lifecycle_settings(),
        );

        Self {
            accounts,
            gate,
            billing,
            plans,
            config: Arc::new(config),
        }
    }

    pub fn stores(&self) -> &Stores {
        self.accounts.stores()
    }

    /// The payment gateway, or 503 when billing is not configured
    pub fn billing(&self) -> ApiResult<&Arc<dyn BillingGateway>> {
        self.billing
            .as_ref()
            .ok_or_else(|| ApiError::ServiceUnavailable("billing is not configured".to_string()))
    }

    /// Checks the role table against [`ROUTES`]
    pub fn validate_routes(&self) -> anyhow::Result<()> {
        self.gate.roles().validate_routes(ROUTES).map_err(|errors| {
            let details: Vec<String> = errors.iter().map(ToString::to_string).collect();
            anyhow::anyhow!("route/permission table is invalid: {}", details.join("; "))
        })
    }
}

/// Builds the complete Axum router with all routes and middleware
///
/// # Architecture
///
/// ```text
/// /
/// ├── public                    # signup, login, links, webhook, health
/// ├── /account, /app            # require a principal
/// └── /api/tasks                # require a principal and a granting rule
/// ```
///
/// # Middleware Stack
///
/// Applied in order (outermost first):
/// 1. Security headers
/// 2. CORS
/// 3. Request timeout
/// 4. Compression
/// 5. Logging (tower-http TraceLayer)
/// 6. Principal resolution (session cookie or bearer token)
/// 7. Per-group guards (`require_auth`, `authorize`)
pub fn build_router(state: AppState) -> Router {
    use crate::routes;

    let public_routes = Router::new()
        .route("/signup", post(routes::auth::signup))
        .route("/confirm/:token", get(routes::auth::confirm_email))
        .route("/login", post(routes::auth::login))
        .route("/magic-login/:otp", get(routes::auth::magic_login))
        .route("/auth", get(routes::auth::provider_login))
        .route("/auth/callback", get(routes::auth::provider_callback))
        .route("/logout", get(routes::auth::logout))
        .route("/forgot", post(routes::auth::forgot))
        .route("/reset/:token", post(routes::auth::reset_password))
        .route("/change/:token", get(routes::auth::confirm_email_change))
        .route("/webhook/:source", post(routes::webhook::handle_webhook))
        .route(
            &state.config.api.health_path,
            get(routes::health::health_check),
        );

    let page_routes = Router::new()
        .route(
            "/account",
            get(routes::account::account_page).post(routes::account::account_submit),
        )
        .route("/account/delete", post(routes::account::delete_account))
        .route("/account/checkout", post(routes::billing::checkout))
        .route("/account/checkout/success", get(routes::billing::checkout_success))
        .route("/account/checkout/cancel", get(routes::billing::checkout_cancel))
        .route(
            "/account/subscription/manage",
            get(routes::billing::manage_subscription),
        )
        .route("/app", get(routes::pages::app_page))
        .route("/app/tasks/new", post(routes::pages::create_task))
        .route("/app/tasks/:id/edit", post(routes::pages::edit_task))
        .route("/app/tasks/:id/delete", post(routes::pages::delete_task))
        .route_layer(axum::middleware::from_fn(session::require_auth));

    let api_routes = Router::new()
        .route(
            "/api/tasks",
            get(routes::tasks::list_tasks).post(routes::tasks::create_task),
        )
        .route("/api/tasks/:id/status", put(routes::tasks::update_status))
        .route("/api/tasks/:id/text", put(routes::tasks::update_text))
        .route("/api/tasks/:id", delete(routes::tasks::delete_task))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            authz::authorize,
        ));

    // Configure CORS based on environment
    let cors = if state.config.api.cors_origins.contains(&"*".to_string()) {
        // Development mode: permissive CORS
        CorsLayer::permissive()
    } else {
        let origins: Vec<HeaderValue> = state
            .config
            .api
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .allow_credentials(true)
            .max_age(Duration::from_secs(3600))
    };

    Router::new()
        .merge(public_routes)
        .merge(page_routes)
        .merge(api_routes)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            session::resolve_principal,
        ))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(Duration::from_secs(
            state.config.api.request_timeout_secs,
        )))
        .layer(cors)
        .layer(SecurityHeadersLayer::new(state.config.api.production))
        .with_state(state)
}
