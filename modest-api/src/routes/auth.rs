/// Authentication endpoints
///
/// Form-based endpoints behind the login and signup pages, plus the targets
/// of the links sent by mail.
///
/// # Endpoints
///
/// - `POST /signup` - Create an account, mail a confirmation link
/// - `GET /confirm/:token` - Confirm the account
/// - `POST /login` - Password login, or request a magic link (`magic=magic`)
/// - `GET /magic-login/:otp` - Log in with a magic link
/// - `GET /auth?provider=&from=` - Start a provider login
/// - `GET /auth/callback?provider=&code=&state=` - Finish a provider login
/// - `GET /logout` - End the session
/// - `POST /forgot` - Mail a password reset link
/// - `POST /reset/:token` - Set a new password
/// - `GET /change/:token` - Confirm an email change

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    middleware::session::{expired_session_cookie, new_session_cookie, session_cookie},
};
use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Redirect, Response},
    Form, Json,
};
use axum_extra::extract::cookie::CookieJar;
use modest_shared::lifecycle::{safe_redirect, LoggedIn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use validator::Validate;

/// Signup form
#[derive(Debug, Deserialize, Validate)]
pub struct SignupForm {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,

    /// Optional display name
    pub name: Option<String>,
}

/// Login form
#[derive(Debug, Deserialize, Validate)]
pub struct LoginForm {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[serde(default)]
    pub password: String,

    /// `"magic"` requests a magic link instead of checking the password
    pub magic: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FromQuery {
    pub from: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ProviderQuery {
    pub provider: String,
    pub from: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub provider: String,
    pub code: Option<String>,
    pub state: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct EmailForm {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PasswordForm {
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

/// Response of `POST /forgot`
#[derive(Debug, Serialize, Deserialize)]
pub struct RecoveryResponse {
    pub recovery_sent: bool,
}

/// Sets the session cookie and redirects
fn start_session(state: &AppState, login: &LoggedIn, target: &str) -> ApiResult<Response> {
    let jar = CookieJar::new().add(new_session_cookie(state, &login.session.id));
    Ok((jar, Redirect::to(target)).into_response())
}

/// Create an account
///
/// # Endpoint
///
/// ```text
/// POST /signup
/// Content-Type: application/x-www-form-urlencoded
///
/// email=a@x.com&password=pw1&name=Ada
/// ```
///
/// Redirects to `/login?confirmation_sent=true`.
///
/// # Errors
///
/// - `422 Unprocessable Entity`: Validation failed
/// - `409 Conflict`: Email already registered
pub async fn signup(
    State(state): State<AppState>,
    Form(form): Form<SignupForm>,
) -> ApiResult<Redirect> {
    form.validate()?;

    let mut metadata = BTreeMap::new();
    if let Some(name) = form.name.filter(|n| !n.trim().is_empty()) {
        metadata.insert("name".to_string(), name);
    }

    state
        .accounts
        .signup(&form.email, &form.password, metadata)
        .await?;

    Ok(Redirect::to("/login?confirmation_sent=true"))
}

pub async fn confirm_email(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> ApiResult<Redirect> {
    state.accounts.confirm_email(&token).await?;
    Ok(Redirect::to("/login?confirmed=true"))
}

/// Password login or magic link request
///
/// With `magic=magic` a magic link is mailed (silently skipped for unknown
/// emails) and the browser goes to `/magic-link-sent`. Otherwise the
/// password is checked and the browser goes to `from` (same-site paths
/// only) or `/app`.
///
/// # Errors
///
/// - `401 Unauthorized`: Invalid email or password
/// - `403 Forbidden`: Account not confirmed
pub async fn login(
    State(state): State<AppState>,
    Query(query): Query<FromQuery>,
    Form(form): Form<LoginForm>,
) -> ApiResult<Response> {
    form.validate()?;

    if form.magic.as_deref() == Some("magic") {
        state.accounts.request_passwordless(&form.email).await?;
        return Ok(Redirect::to("/magic-link-sent").into_response());
    }

    let login = state.accounts.login(&form.email, &form.password).await?;
    let target = query
        .from
        .as_deref()
        .and_then(safe_redirect)
        .unwrap_or_else(|| "/app".to_string());

    start_session(&state, &login, &target)
}

pub async fn magic_login(
    State(state): State<AppState>,
    Path(otp): Path<String>,
) -> ApiResult<Response> {
    let login = state.accounts.login_with_passwordless(&otp).await?;
    start_session(&state, &login, "/app")
}

/// Redirects to the provider's consent page
pub async fn provider_login(
    State(state): State<AppState>,
    Query(query): Query<ProviderQuery>,
) -> ApiResult<Redirect> {
    let url = state
        .accounts
        .begin_provider_login(&query.provider, query.from.as_deref())
        .await?;

    Ok(Redirect::to(&url))
}

pub async fn provider_callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> ApiResult<Response> {
    let (Some(code), Some(oauth_state)) = (query.code, query.state) else {
        return Err(ApiError::BadRequest("link invalid or expired".to_string()));
    };

    let login = state
        .accounts
        .provider_callback(&query.provider, &code, &oauth_state)
        .await?;
    let target = login.from.clone().unwrap_or_else(|| "/app".to_string());

    start_session(&state, &login, &target)
}

/// Ends the session; calling it without a session is fine
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> ApiResult<Response> {
    if let Some(session_id) = session_cookie(&jar, &state.config.session.cookie_name) {
        state.accounts.logout(&session_id).await?;
    }

    let jar = jar.add(expired_session_cookie(&state));
    Ok((jar, Redirect::to("/")).into_response())
}

/// Mail a password reset link
///
/// Always reports success, whether or not the email is registered.
pub async fn forgot(
    State(state): State<AppState>,
    Form(form): Form<EmailForm>,
) -> ApiResult<Json<RecoveryResponse>> {
    form.validate()?;
    state.accounts.request_recovery(&form.email).await?;

    Ok(Json(RecoveryResponse {
        recovery_sent: true,
    }))
}

pub async fn reset_password(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Form(form): Form<PasswordForm>,
) -> ApiResult<Redirect> {
    form.validate()?;
    state.accounts.confirm_recovery(&token, &form.password).await?;

    Ok(Redirect::to("/login"))
}

pub async fn confirm_email_change(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> ApiResult<Redirect> {
    state.accounts.confirm_email_change(&token).await?;
    Ok(Redirect::to("/account?email_changed=true"))
}
