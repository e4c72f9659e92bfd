/// Account page
///
/// # Endpoints
///
/// - `GET /account` - Account view with a fresh form token
/// - `POST /account` - Update name, request an email change, or reset the
///   API token
/// - `POST /account/delete` - Delete the account and everything it owns
///
/// The API token reset is guarded by the single-use form token issued with
/// the view. A second submission of the same token changes nothing and
/// returns the current view.

use crate::{
    app::AppState,
    error::ApiResult,
    middleware::session::{expired_session_cookie, session_id},
};
use axum::{
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
    Extension, Form, Json,
};
use axum_extra::extract::cookie::CookieJar;
use modest_shared::{
    auth::principal::Principal,
    lifecycle::ApiKeyReset,
    models::{
        account::{normalize_email, Account},
        plan::{mark_current, Plan},
        session::Session,
    },
};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Account page view model
#[derive(Debug, Serialize, Deserialize)]
pub struct AccountView {
    pub email: String,
    pub name: Option<String>,

    /// Whether an API key has been issued
    pub api_token_set: bool,

    /// The new bearer token, only right after a reset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,

    /// Token to submit with the API token reset form
    pub form_token: String,

    pub plans: Vec<Plan>,
    pub current_plan: Option<Plan>,

    pub stripe_publishable_key: Option<String>,

    pub email_changed: bool,

    /// True after an email change was requested by this submission
    pub email_change_requested: bool,

    /// `success` or `cancel` after returning from checkout
    pub checkout: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AccountQuery {
    pub email_changed: Option<bool>,
    pub checkout: Option<String>,
}

/// Account form
///
/// Only the submitted fields are acted on.
#[derive(Debug, Default, Deserialize)]
pub struct AccountForm {
    pub name: Option<String>,
    pub email: Option<String>,

    /// Any non-empty value requests an API token reset
    pub reset_api_token: Option<String>,

    pub form_token: Option<String>,
}

/// Price id of the active subscription, cached in the session
async fn current_price_id(state: &AppState, account: &Account, session: Option<&Session>) -> Option<String> {
    if let Some(price) = session.and_then(|s| s.values.current_price_id.clone()) {
        return Some(price);
    }

    let billing = state.billing.as_ref()?;
    let customer = account.billing_id.as_deref()?;

    match billing.active_price_id(customer).await {
        Ok(price) => {
            if let (Some(session), Some(price)) = (session, price.as_ref()) {
                if let Err(e) = state
                    .stores()
                    .sessions
                    .set_current_price_id(&session.id, Some(price.clone()))
                    .await
                {
                    warn!(error = %e, "Failed to cache current price");
                }
            }
            price
        }
        Err(e) => {
            warn!(account_id = %account.id, error = %e, "Failed to fetch active subscription");
            None
        }
    }
}

async fn render(
    state: &AppState,
    principal: &Principal,
    session: Option<&Session>,
    query: AccountQuery,
) -> ApiResult<AccountView> {
    let session_id = session_id(principal)?;
    let account = state.accounts.account(principal.account_id).await?;
    let form_token = state.accounts.issue_form_token(session_id).await?;

    let current = current_price_id(state, &account, session).await;
    let plans = mark_current(&state.plans, current.as_deref());
    let current_plan = plans.iter().find(|p| p.current).cloned();

    let publishable = &state.config.billing.stripe_publishable_key;

    Ok(AccountView {
        email: account.email,
        name: account.attributes.name,
        api_token_set: account.attributes.api_key.is_some(),
        api_token: None,
        form_token,
        plans,
        current_plan,
        stripe_publishable_key: (!publishable.is_empty()).then(|| publishable.clone()),
        email_changed: query.email_changed.unwrap_or(false),
        email_change_requested: false,
        checkout: query.checkout,
    })
}

/// Account view
///
/// # Endpoint
///
/// ```text
/// GET /account?email_changed=true&checkout=success
/// ```
pub async fn account_page(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    session: Option<Extension<Session>>,
    Query(query): Query<AccountQuery>,
) -> ApiResult<Json<AccountView>> {
    let session = session.map(|Extension(s)| s);
    Ok(Json(render(&state, &principal, session.as_ref(), query).await?))
}

/// Account form submission
///
/// With `reset_api_token` set, only the token reset runs. Otherwise the name
/// is updated and, when the submitted email differs from the current one,
/// an email change is requested.
///
/// # Errors
///
/// - `409 Conflict`: The new email belongs to another account
/// - `422 Unprocessable Entity`: Invalid name or email
pub async fn account_submit(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    session: Option<Extension<Session>>,
    Form(form): Form<AccountForm>,
) -> ApiResult<Json<AccountView>> {
    let session = session.map(|Extension(s)| s);
    let session_id = session_id(&principal)?.to_string();

    let mut api_token = None;
    let mut email_change_requested = false;

    if form.reset_api_token.as_deref().is_some_and(|v| !v.is_empty()) {
        let form_token = form.form_token.unwrap_or_default();
        if let ApiKeyReset::Issued { token } = state
            .accounts
            .reset_api_key(principal.account_id, &session_id, &form_token)
            .await?
        {
            api_token = Some(token);
        }
    } else {
        if let Some(name) = form.name.as_deref() {
            state.accounts.update_profile(principal.account_id, name).await?;
        }

        if let Some(email) = form.email.as_deref().filter(|e| !e.trim().is_empty()) {
            let account = state.accounts.account(principal.account_id).await?;
            if normalize_email(email) != normalize_email(&account.email) {
                state
                    .accounts
                    .request_email_change(principal.account_id, email)
                    .await?;
                email_change_requested = true;
            }
        }
    }

    let mut view = render(&state, &principal, session.as_ref(), AccountQuery::default()).await?;
    view.api_token = api_token;
    view.email_change_requested = email_change_requested;

    Ok(Json(view))
}

/// Deletes the account with its tasks and sessions, then goes home
pub async fn delete_account(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<Response> {
    state.accounts.delete_account(principal.account_id).await?;

    let jar = CookieJar::new().add(expired_session_cookie(&state));
    Ok((jar, Redirect::to("/")).into_response())
}
