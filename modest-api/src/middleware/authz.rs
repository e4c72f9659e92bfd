/// Authorization guard for permission-guarded routes
///
/// Runs as a route layer, so the route is already matched and its `id`
/// parameter (when present) is passed to the gate as the target. Requests
/// without a principal get 401; every gate denial stops the request before
/// the handler runs.

use axum::{
    extract::{Path, Request, State},
    middleware::Next,
    response::Response,
};
use modest_shared::auth::principal::Principal;
use std::collections::HashMap;
use tracing::debug;

use crate::{app::AppState, error::ApiError};

pub async fn authorize(
    State(state): State<AppState>,
    params: Option<Path<HashMap<String, String>>>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let principal = req
        .extensions()
        .get::<Principal>()
        .ok_or_else(ApiError::unauthenticated)?;

    let target = params.and_then(|Path(mut params)| params.remove("id"));

    state
        .gate
        .authorize(principal, req.method().as_str(), req.uri().path(), target.as_deref())
        .await
        .map_err(|e| {
            debug!(
                account_id = %principal.account_id,
                method = %req.method(),
                path = %req.uri().path(),
                error = %e,
                "Request denied"
            );
            ApiError::from(e)
        })?;

    Ok(next.run(req).await)
}
