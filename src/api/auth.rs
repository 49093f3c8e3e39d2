use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    extract::{Extension, Json},
    http::StatusCode,
    response::IntoResponse,
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, Set, SqlErr, TransactionTrait,
};
use serde::Deserialize;
use serde_json::json;
use tower_cookies::{Cookie, Cookies, Key};

use super::record_action;
use crate::clinic::validation;
use crate::entities::user::{self, Role};
use crate::error::{ClinicError, ClinicResult};

pub const SESSION_COOKIE: &str = "vetclinic_user";

/// Authenticated caller, inserted into request extensions by the auth
/// middleware.
#[derive(Clone, Copy, Debug)]
pub struct CurrentUser {
    pub id: i32,
    pub role: Role,
}

impl CurrentUser {
    pub fn require_admin(&self, what: &'static str) -> ClinicResult<()> {
        match self.role {
            Role::Admin => Ok(()),
            Role::Staff => Err(ClinicError::Forbidden(what)),
        }
    }
}

impl From<&user::Model> for CurrentUser {
    fn from(user: &user::Model) -> Self {
        Self {
            id: user.id,
            role: user.role,
        }
    }
}

/// Cookie signing key. Needs at least 64 bytes of secret; anything shorter
/// gets a random per-process key, which logs everybody out on restart.
pub fn signing_key(secret: Option<&str>) -> Key {
    match secret.map(|s| Key::try_from(s.as_bytes())) {
        Some(Ok(key)) => key,
        Some(Err(_)) => {
            tracing::warn!("⚠️ SECRET_KEY is shorter than 64 bytes, using a random session key");
            Key::generate()
        }
        None => {
            tracing::warn!("⚠️ SECRET_KEY not set, using a random session key");
            Key::generate()
        }
    }
}

/// User behind the signed session cookie, if it is valid.
pub async fn session_user<C: ConnectionTrait>(
    db: &C,
    key: &Key,
    cookies: &Cookies,
) -> ClinicResult<Option<user::Model>> {
    let Some(cookie) = cookies.signed(key).get(SESSION_COOKIE) else {
        return Ok(None);
    };
    let Ok(user_id) = cookie.value().parse::<i32>() else {
        return Ok(None);
    };

    Ok(user::Entity::find_by_id(user_id).one(db).await?)
}

pub fn start_session(key: &Key, cookies: &Cookies, user: &user::Model) {
    let mut cookie = Cookie::new(SESSION_COOKIE, user.id.to_string());
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookies.signed(key).add(cookie);
}

fn hash_password(password: &str) -> ClinicResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| ClinicError::Internal("failed to hash password"))
}

/// Checks credentials; unknown email and wrong password are indistinguishable.
pub async fn authenticate(
    db: &DatabaseConnection,
    email: &str,
    password: &str,
) -> ClinicResult<user::Model> {
    let user = user::Entity::find()
        .filter(user::Column::Email.eq(email.trim().to_lowercase()))
        .one(db)
        .await?
        .ok_or(ClinicError::Unauthorized)?;

    let parsed_hash = PasswordHash::new(&user.password_hash)
        .map_err(|_| ClinicError::Internal("invalid password hash in database"))?;

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| ClinicError::Unauthorized)?;

    Ok(user)
}

#[derive(Deserialize)]
pub struct RegisterRequest {
    email: String,
    password: String,
    name: String,
}

/// The first account becomes the admin. Every later account is staff and
/// can only be created from an admin session.
pub async fn register(
    Extension(db): Extension<DatabaseConnection>,
    Extension(key): Extension<Key>,
    cookies: Cookies,
    Json(payload): Json<RegisterRequest>,
) -> ClinicResult<impl IntoResponse> {
    let email = validation::email(Some(payload.email))?
        .ok_or_else(|| ClinicError::validation("email is required"))?
        .to_lowercase();
    let name = validation::required("name", payload.name)?;
    if payload.password.chars().count() < 8 {
        return Err(ClinicError::validation("password must be at least 8 characters"));
    }
    let password_hash = hash_password(&payload.password)?;

    let txn = db.begin().await?;
    let role = if user::Entity::find().count(&txn).await? == 0 {
        Role::Admin
    } else {
        match session_user(&txn, &key, &cookies).await? {
            Some(admin) if admin.role == Role::Admin => Role::Staff,
            Some(_) => return Err(ClinicError::Forbidden("only admins can register users")),
            None => return Err(ClinicError::Unauthorized),
        }
    };

    let now = chrono::Utc::now().naive_utc();
    let new_user = user::ActiveModel {
        email: Set(email),
        password_hash: Set(password_hash),
        name: Set(name),
        role: Set(role),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };

    let user = match new_user.insert(&txn).await {
        Ok(user) => user,
        Err(e) => {
            if let Some(SqlErr::UniqueConstraintViolation(_)) = e.sql_err() {
                return Err(ClinicError::Conflict("Email already exists".to_string()));
            }
            return Err(e.into());
        }
    };
    txn.commit().await?;

    record_action("users", "register_user", Some(user.id), "User registered successfully");
    tracing::Span::current().record("user_id", user.id);
    tracing::info!("Registered {:?} user {}", user.role, user.id);

    Ok((StatusCode::CREATED, Json(user)))
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

pub async fn login(
    Extension(db): Extension<DatabaseConnection>,
    Extension(key): Extension<Key>,
    cookies: Cookies,
    Json(payload): Json<LoginRequest>,
) -> ClinicResult<impl IntoResponse> {
    let user = match authenticate(&db, &payload.email, &payload.password).await {
        Ok(user) => user,
        Err(e) => {
            record_action("users", "login_user_failed", None, "Invalid credentials");
            return Err(e);
        }
    };

    start_session(&key, &cookies, &user);

    record_action("users", "login_user", Some(user.id), "User logged in successfully");
    tracing::Span::current().record("user_id", user.id);

    Ok(Json(json!({"message": "Login successful", "user": user})))
}

pub async fn logout(Extension(key): Extension<Key>, cookies: Cookies) -> impl IntoResponse {
    let mut cookie = Cookie::from(SESSION_COOKIE);
    cookie.set_path("/");
    cookies.signed(&key).remove(cookie);

    record_action("users", "logout_user", None, "User logged out");
    Json(json!({"message": "Logged out"}))
}
