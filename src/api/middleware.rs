use axum::{
    extract::{Extension, Request},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use sea_orm::DatabaseConnection;
use tower_cookies::{Cookies, Key};

use super::auth::{self, CurrentUser};
use crate::error::ClinicError;

async fn resolve(
    db: &DatabaseConnection,
    key: &Key,
    cookies: &Cookies,
) -> Result<CurrentUser, ClinicError> {
    let user = auth::session_user(db, key, cookies)
        .await?
        .ok_or(ClinicError::Unauthorized)?;

    tracing::Span::current().record("user_id", user.id);
    Ok(CurrentUser::from(&user))
}

/// JSON routes: 401 without a valid session.
pub async fn require_user(
    Extension(db): Extension<DatabaseConnection>,
    Extension(key): Extension<Key>,
    cookies: Cookies,
    mut request: Request,
    next: Next,
) -> Response {
    match resolve(&db, &key, &cookies).await {
        Ok(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

/// HTML routes: redirect to the login form without a valid session.
pub async fn require_page_user(
    Extension(db): Extension<DatabaseConnection>,
    Extension(key): Extension<Key>,
    cookies: Cookies,
    mut request: Request,
    next: Next,
) -> Response {
    match resolve(&db, &key, &cookies).await {
        Ok(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(ClinicError::Unauthorized) => Redirect::to("/login").into_response(),
        Err(e) => e.into_response(),
    }
}
