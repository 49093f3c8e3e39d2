mod common;

use std::sync::Arc;

use anyhow::Result;
use axum::{
    body::Body,
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use chrono::Duration;
use common::setup_db;
use serde_json::{json, Value};
use tower::ServiceExt;
use tower_cookies::Key;
use vetclinic_server::api;
use vetclinic_server::clinic::validation;
use vetclinic_server::mirror::Synchronizer;
use vetclinic_server::views::Views;

struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: String,
}

impl Reply {
    fn json(&self) -> Result<Value> {
        Ok(serde_json::from_str(&self.body)?)
    }

    /// `name=value` of the session cookie set by this response.
    fn session_cookie(&self) -> Option<String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find(|v| v.starts_with("vetclinic_user="))
            .and_then(|v| v.split(';').next())
            .map(str::to_string)
    }
}

async fn app() -> Result<Router> {
    let db = setup_db().await?;
    let views = Arc::new(Views::new()?);
    Ok(api::router(
        db,
        Synchronizer::disabled(),
        views,
        Key::generate(),
        "http://localhost:3000",
    ))
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    cookie: Option<&str>,
    body: Option<Value>,
) -> Result<Reply> {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        request = request.header(header::COOKIE, cookie);
    }
    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))?,
        None => request.body(Body::empty())?,
    };

    dispatch(app, request).await
}

/// Posts an HTML form the way a browser does.
async fn submit(app: &Router, uri: &str, cookie: &str, form: &str) -> Result<Reply> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::COOKIE, cookie)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(form.to_string()))?;

    dispatch(app, request).await
}

async fn dispatch(app: &Router, request: Request<Body>) -> Result<Reply> {
    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;

    Ok(Reply {
        status,
        headers,
        body: String::from_utf8(bytes.to_vec())?,
    })
}

fn location(reply: &Reply) -> Option<&str> {
    reply.headers.get(header::LOCATION).and_then(|v| v.to_str().ok())
}

async fn register(app: &Router, cookie: Option<&str>, email: &str) -> Result<Reply> {
    send(
        app,
        Method::POST,
        "/api/auth/register",
        cookie,
        Some(json!({"email": email, "password": "correct horse", "name": "Front Desk"})),
    )
    .await
}

async fn login(app: &Router, email: &str) -> Result<String> {
    let reply = send(
        app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({"email": email, "password": "correct horse"})),
    )
    .await?;
    assert_eq!(reply.status, StatusCode::OK);
    reply
        .session_cookie()
        .ok_or_else(|| anyhow::anyhow!("login did not set a session cookie"))
}

/// Registers the first account and logs it in.
async fn admin_session(app: &Router) -> Result<String> {
    let reply = register(app, None, "admin@clinic.test").await?;
    assert_eq!(reply.status, StatusCode::CREATED);
    login(app, "admin@clinic.test").await
}

#[tokio::test]
async fn health_is_public() -> Result<()> {
    let app = app().await?;
    let reply = send(&app, Method::GET, "/health", None, None).await?;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body, "OK");
    Ok(())
}

#[tokio::test]
async fn api_requires_a_session() -> Result<()> {
    let app = app().await?;

    let reply = send(&app, Method::GET, "/api/owners", None, None).await?;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);

    let forged = send(&app, Method::GET, "/api/owners", Some("vetclinic_user=1"), None).await?;
    assert_eq!(forged.status, StatusCode::UNAUTHORIZED);

    Ok(())
}

#[tokio::test]
async fn first_account_is_admin_and_later_ones_need_an_admin() -> Result<()> {
    let app = app().await?;

    let first = register(&app, None, "Admin@Clinic.test").await?;
    assert_eq!(first.status, StatusCode::CREATED);
    let user = first.json()?;
    assert_eq!(user["role"], "admin");
    assert_eq!(user["email"], "admin@clinic.test");
    assert!(user.get("password_hash").is_none());

    let anonymous = register(&app, None, "staff@clinic.test").await?;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);

    let admin = login(&app, "admin@clinic.test").await?;
    let staff = register(&app, Some(&admin), "staff@clinic.test").await?;
    assert_eq!(staff.status, StatusCode::CREATED);
    assert_eq!(staff.json()?["role"], "staff");

    let duplicate = register(&app, Some(&admin), "staff@clinic.test").await?;
    assert_eq!(duplicate.status, StatusCode::CONFLICT);

    let wrong = send(
        &app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({"email": "staff@clinic.test", "password": "wrong password"})),
    )
    .await?;
    assert_eq!(wrong.status, StatusCode::UNAUTHORIZED);
    assert!(wrong.session_cookie().is_none());

    Ok(())
}

#[tokio::test]
async fn owner_lifecycle_over_http() -> Result<()> {
    let app = app().await?;
    let admin = admin_session(&app).await?;
    let cookie = Some(admin.as_str());

    let created = send(
        &app,
        Method::POST,
        "/api/owners",
        cookie,
        Some(json!({"name": "Ana", "phone": "555-0101"})),
    )
    .await?;
    assert_eq!(created.status, StatusCode::CREATED);
    let ana_id = created.json()?["id"].as_i64().unwrap_or_default();

    let fido = send(
        &app,
        Method::POST,
        "/api/pets",
        cookie,
        Some(json!({"owner_id": ana_id, "name": "Fido", "species": "dog"})),
    )
    .await?;
    assert_eq!(fido.status, StatusCode::CREATED);
    let fido_id = fido.json()?["id"].as_i64().unwrap_or_default();

    let ana_url = format!("/api/owners/{}", ana_id);
    let blocked = send(&app, Method::DELETE, &ana_url, cookie, None).await?;
    assert_eq!(blocked.status, StatusCode::CONFLICT);
    assert!(blocked.json()?["error"].as_str().unwrap_or_default().contains("active pet"));

    let gone = send(&app, Method::DELETE, &format!("/api/pets/{}", fido_id), cookie, None).await?;
    assert_eq!(gone.status, StatusCode::OK);
    assert_eq!(gone.json()?["active"], false);

    let deleted = send(&app, Method::DELETE, &ana_url, cookie, None).await?;
    assert_eq!(deleted.status, StatusCode::OK);

    let active = send(&app, Method::GET, "/api/owners", cookie, None).await?;
    assert_eq!(active.json()?, json!([]));
    let inactive = send(&app, Method::GET, "/api/owners?view=inactive", cookie, None).await?;
    assert_eq!(inactive.json()?[0]["name"], "Ana");

    let hidden = send(&app, Method::GET, &ana_url, cookie, None).await?;
    assert_eq!(hidden.status, StatusCode::NOT_FOUND);

    let restored = send(
        &app,
        Method::POST,
        &format!("/api/owners/{}/restore", ana_id),
        cookie,
        None,
    )
    .await?;
    assert_eq!(restored.status, StatusCode::OK);
    assert_eq!(restored.json()?["active"], true);

    let summary = send(&app, Method::GET, "/api/summary", cookie, None).await?;
    let summary = summary.json()?;
    assert_eq!(summary["mirror_enabled"], false);

    Ok(())
}

#[tokio::test]
async fn only_admins_restore_veterinarians() -> Result<()> {
    let app = app().await?;
    let admin = admin_session(&app).await?;
    register(&app, Some(&admin), "staff@clinic.test").await?;
    let staff = login(&app, "staff@clinic.test").await?;

    let vet = send(
        &app,
        Method::POST,
        "/api/veterinarians",
        Some(&staff),
        Some(json!({"name": "Dr. House", "specialty": "diagnostics"})),
    )
    .await?;
    assert_eq!(vet.status, StatusCode::CREATED);
    let vet_id = vet.json()?["id"].as_i64().unwrap_or_default();

    let deleted = send(
        &app,
        Method::DELETE,
        &format!("/api/veterinarians/{}", vet_id),
        Some(&staff),
        None,
    )
    .await?;
    assert_eq!(deleted.status, StatusCode::OK);

    let restore = format!("/api/veterinarians/{}/restore", vet_id);
    let forbidden = send(&app, Method::POST, &restore, Some(&staff), None).await?;
    assert_eq!(forbidden.status, StatusCode::FORBIDDEN);

    let restored = send(&app, Method::POST, &restore, Some(&admin), None).await?;
    assert_eq!(restored.status, StatusCode::OK);
    assert_eq!(restored.json()?["active"], true);

    Ok(())
}

#[tokio::test]
async fn purge_is_admin_only() -> Result<()> {
    let app = app().await?;
    let admin = admin_session(&app).await?;
    register(&app, Some(&admin), "staff@clinic.test").await?;
    let staff = login(&app, "staff@clinic.test").await?;

    let created = send(
        &app,
        Method::POST,
        "/api/owners",
        Some(&admin),
        Some(json!({"name": "Ana"})),
    )
    .await?;
    let ana_id = created.json()?["id"].as_i64().unwrap_or_default();
    let purge = format!("/api/admin/owners/{}", ana_id);

    let forbidden = send(&app, Method::DELETE, &purge, Some(&staff), None).await?;
    assert_eq!(forbidden.status, StatusCode::FORBIDDEN);

    let unknown = send(&app, Method::DELETE, "/api/admin/dueno/1", Some(&admin), None).await?;
    assert_eq!(unknown.status, StatusCode::UNPROCESSABLE_ENTITY);

    let purged = send(&app, Method::DELETE, &purge, Some(&admin), None).await?;
    assert_eq!(purged.status, StatusCode::NO_CONTENT);

    let all = send(&app, Method::GET, "/api/owners?view=all", Some(&admin), None).await?;
    assert_eq!(all.json()?, json!([]));

    Ok(())
}

#[tokio::test]
async fn future_birth_date_is_unprocessable() -> Result<()> {
    let app = app().await?;
    let admin = admin_session(&app).await?;

    let ana = send(
        &app,
        Method::POST,
        "/api/owners",
        Some(&admin),
        Some(json!({"name": "Ana"})),
    )
    .await?;
    let ana_id = ana.json()?["id"].as_i64().unwrap_or_default();

    let tomorrow = validation::today() + Duration::days(1);
    let reply = send(
        &app,
        Method::POST,
        "/api/pets",
        Some(&admin),
        Some(json!({"owner_id": ana_id, "name": "Fido", "birth_date": tomorrow.to_string()})),
    )
    .await?;
    assert_eq!(reply.status, StatusCode::UNPROCESSABLE_ENTITY);

    let pets = send(&app, Method::GET, "/api/pets?view=all", Some(&admin), None).await?;
    assert_eq!(pets.json()?, json!([]));

    Ok(())
}

#[tokio::test]
async fn pages_redirect_to_login_without_a_session() -> Result<()> {
    let app = app().await?;

    let reply = send(&app, Method::GET, "/owners", None, None).await?;
    assert_eq!(reply.status, StatusCode::SEE_OTHER);
    assert_eq!(location(&reply), Some("/login"));

    let form = send(&app, Method::GET, "/login", None, None).await?;
    assert_eq!(form.status, StatusCode::OK);
    assert!(form.body.contains("<form"));

    Ok(())
}

#[tokio::test]
async fn listing_page_shows_records_of_the_selected_view() -> Result<()> {
    let app = app().await?;
    let admin = admin_session(&app).await?;

    for name in ["Ana", "Bea"] {
        send(
            &app,
            Method::POST,
            "/api/owners",
            Some(&admin),
            Some(json!({"name": name})),
        )
        .await?;
    }

    let page = send(&app, Method::GET, "/owners", Some(&admin), None).await?;
    assert_eq!(page.status, StatusCode::OK);
    assert!(page.body.contains("Ana"));
    assert!(page.body.contains("Bea"));

    let inactive = send(&app, Method::GET, "/owners?view=inactive", Some(&admin), None).await?;
    assert!(inactive.body.contains("No inactive owners."));

    let unknown = send(&app, Method::GET, "/dueno", Some(&admin), None).await?;
    assert_eq!(unknown.status, StatusCode::NOT_FOUND);

    let dashboard = send(&app, Method::GET, "/", Some(&admin), None).await?;
    assert_eq!(dashboard.status, StatusCode::OK);

    Ok(())
}

#[tokio::test]
async fn listing_forms_delete_and_restore_owners() -> Result<()> {
    let app = app().await?;
    let admin = admin_session(&app).await?;

    let created = submit(&app, "/owners", &admin, "name=Ana&phone=555-0101&email=&address=").await?;
    assert_eq!(created.status, StatusCode::SEE_OTHER);
    assert_eq!(location(&created), Some("/owners"));

    let owners = send(&app, Method::GET, "/api/owners", Some(&admin), None).await?;
    let ana_id = owners.json()?[0]["id"].as_i64().unwrap_or_default();
    let fido = send(
        &app,
        Method::POST,
        "/api/pets",
        Some(&admin),
        Some(json!({"owner_id": ana_id, "name": "Fido"})),
    )
    .await?;
    let fido_id = fido.json()?["id"].as_i64().unwrap_or_default();

    let page = send(&app, Method::GET, "/owners", Some(&admin), None).await?;
    let delete_ana = format!("/owners/{}/delete", ana_id);
    assert!(page.body.contains(&format!("action=\"{}\"", delete_ana)));

    let blocked = submit(&app, &delete_ana, &admin, "").await?;
    assert_eq!(blocked.status, StatusCode::CONFLICT);
    assert!(blocked.body.contains("class=\"error\""));
    assert!(blocked.body.contains("active pet"));
    assert!(blocked.body.contains("Ana"));

    let fido_gone = submit(&app, &format!("/pets/{}/delete", fido_id), &admin, "").await?;
    assert_eq!(fido_gone.status, StatusCode::SEE_OTHER);
    assert_eq!(location(&fido_gone), Some("/pets?view=active"));

    let deleted = submit(&app, &delete_ana, &admin, "").await?;
    assert_eq!(deleted.status, StatusCode::SEE_OTHER);
    assert_eq!(location(&deleted), Some("/owners?view=active"));

    let inactive = send(&app, Method::GET, "/owners?view=inactive", Some(&admin), None).await?;
    let restore_ana = format!("/owners/{}/restore", ana_id);
    assert!(inactive.body.contains(&restore_ana));

    let missing = submit(&app, "/owners/9999/restore", &admin, "").await?;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
    assert!(missing.body.contains("not found"));

    let restored = submit(&app, &restore_ana, &admin, "").await?;
    assert_eq!(restored.status, StatusCode::SEE_OTHER);
    assert_eq!(location(&restored), Some("/owners?view=inactive"));

    let ana_url = format!("/api/owners/{}", ana_id);
    let ana = send(&app, Method::GET, &ana_url, Some(&admin), None).await?;
    assert_eq!(ana.json()?["active"], true);

    Ok(())
}

#[tokio::test]
async fn listing_form_keeps_veterinarian_restore_for_admins() -> Result<()> {
    let app = app().await?;
    let admin = admin_session(&app).await?;
    register(&app, Some(&admin), "staff@clinic.test").await?;
    let staff = login(&app, "staff@clinic.test").await?;

    let vet = send(
        &app,
        Method::POST,
        "/api/veterinarians",
        Some(&staff),
        Some(json!({"name": "Dr. House"})),
    )
    .await?;
    let vet_id = vet.json()?["id"].as_i64().unwrap_or_default();

    let deleted = submit(&app, &format!("/veterinarians/{}/delete", vet_id), &staff, "").await?;
    assert_eq!(deleted.status, StatusCode::SEE_OTHER);

    let restore = format!("/veterinarians/{}/restore", vet_id);
    let forbidden = submit(&app, &restore, &staff, "").await?;
    assert_eq!(forbidden.status, StatusCode::FORBIDDEN);
    assert!(forbidden.body.contains("requires the admin role"));

    let restored = submit(&app, &restore, &admin, "").await?;
    assert_eq!(restored.status, StatusCode::SEE_OTHER);
    assert_eq!(location(&restored), Some("/veterinarians?view=inactive"));

    Ok(())
}

#[tokio::test]
async fn owner_form_reports_invalid_input_on_the_page() -> Result<()> {
    let app = app().await?;
    let admin = admin_session(&app).await?;

    let blank = submit(&app, "/owners", &admin, "name=+&phone=").await?;
    assert_eq!(blank.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(blank.body.contains("name is required"));

    let long_phone = "5".repeat(validation::PHONE_MAX + 1);
    let wide = submit(&app, "/owners", &admin, &format!("name=Ana&phone={}", long_phone)).await?;
    assert_eq!(wide.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(wide.body.contains("phone must be at most"));

    let pets = submit(&app, "/pets", &admin, "name=Fido").await?;
    assert_eq!(pets.status, StatusCode::NOT_FOUND);

    let owners = send(&app, Method::GET, "/api/owners?view=all", Some(&admin), None).await?;
    assert_eq!(owners.json()?, json!([]));

    Ok(())
}

#[tokio::test]
async fn page_forms_require_a_session() -> Result<()> {
    let app = app().await?;

    let request = Request::builder()
        .method(Method::POST)
        .uri("/owners/1/delete")
        .body(Body::empty())?;
    let reply = dispatch(&app, request).await?;
    assert_eq!(reply.status, StatusCode::SEE_OTHER);
    assert_eq!(location(&reply), Some("/login"));

    Ok(())
}
