use std::sync::Arc;

use axum::{
    extract::{Extension, Form, Path, Query},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_cookies::{Cookies, Key};

use super::auth::{self, CurrentUser};
use super::{record_action, ViewQuery};
use crate::clinic::owners::NewOwner;
use crate::clinic::{self, owners, payments, pets, validation, veterinarians, visits};
use crate::error::{ClinicError, ClinicResult};
use crate::lifecycle::{RecordKind, RecordView};
use crate::mirror::Synchronizer;
use crate::views::Views;

#[derive(Serialize)]
struct ViewLink {
    name: &'static str,
    selected: bool,
}

/// One listed record; `active` picks the delete or the restore form.
#[derive(Serialize)]
struct Row {
    table: &'static str,
    id: i32,
    active: bool,
    cells: Vec<String>,
}

impl Row {
    fn new(kind: RecordKind, id: i32, active: bool, cells: Vec<String>) -> Self {
        Self {
            table: kind.table(),
            id,
            active,
            cells,
        }
    }
}

#[derive(Serialize)]
struct Listing {
    title: String,
    table: &'static str,
    view: &'static str,
    views: Vec<ViewLink>,
    columns: Vec<&'static str>,
    rows: Vec<Row>,
    message: Option<String>,
    owner_form: bool,
}

fn text(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

fn state(active: bool) -> String {
    if active { "active" } else { "inactive" }.to_string()
}

async fn table_rows(
    db: &DatabaseConnection,
    kind: RecordKind,
    view: RecordView,
) -> ClinicResult<(Vec<&'static str>, Vec<Row>)> {
    let listing = match kind {
        RecordKind::Owner => (
            vec!["#", "Name", "Phone", "Email", "Address", "Registered", "State"],
            owners::list(db, view)
                .await?
                .into_iter()
                .map(|o| {
                    let cells = vec![
                        o.id.to_string(),
                        o.name,
                        text(&o.phone),
                        text(&o.email),
                        text(&o.address),
                        o.registered_at.format("%Y-%m-%d").to_string(),
                        state(o.active),
                    ];
                    Row::new(kind, o.id, o.active, cells)
                })
                .collect(),
        ),
        RecordKind::Veterinarian => (
            vec!["#", "Name", "Specialty", "Phone", "Email", "State"],
            veterinarians::list(db, view)
                .await?
                .into_iter()
                .map(|v| {
                    let cells = vec![
                        v.id.to_string(),
                        v.name,
                        text(&v.specialty),
                        text(&v.phone),
                        text(&v.email),
                        state(v.active),
                    ];
                    Row::new(kind, v.id, v.active, cells)
                })
                .collect(),
        ),
        RecordKind::Pet => (
            vec!["#", "Name", "Species", "Breed", "Born", "Owner #", "State"],
            pets::list(db, view)
                .await?
                .into_iter()
                .map(|p| {
                    let cells = vec![
                        p.id.to_string(),
                        p.name,
                        text(&p.species),
                        text(&p.breed),
                        p.birth_date.map(|d| d.to_string()).unwrap_or_default(),
                        p.owner_id.to_string(),
                        state(p.active),
                    ];
                    Row::new(kind, p.id, p.active, cells)
                })
                .collect(),
        ),
        RecordKind::Visit => (
            vec!["#", "Date", "Pet #", "Vet #", "Reason", "Diagnosis", "Cost", "State"],
            visits::list(db, view)
                .await?
                .into_iter()
                .map(|v| {
                    let cells = vec![
                        v.id.to_string(),
                        v.visited_at.format("%Y-%m-%d %H:%M").to_string(),
                        v.pet_id.to_string(),
                        v.veterinarian_id.map(|id| id.to_string()).unwrap_or_default(),
                        v.reason,
                        text(&v.diagnosis),
                        validation::from_cents(v.cost_cents).to_string(),
                        state(v.active),
                    ];
                    Row::new(kind, v.id, v.active, cells)
                })
                .collect(),
        ),
        RecordKind::Payment => (
            vec!["#", "Date", "Visit #", "Amount", "Method", "Status", "State"],
            payments::list(db, view)
                .await?
                .into_iter()
                .map(|p| {
                    let cells = vec![
                        p.id.to_string(),
                        p.paid_at.format("%Y-%m-%d %H:%M").to_string(),
                        p.visit_id.to_string(),
                        validation::from_cents(p.amount_cents).to_string(),
                        p.method.as_str().to_string(),
                        p.status,
                        state(p.active),
                    ];
                    Row::new(kind, p.id, p.active, cells)
                })
                .collect(),
        ),
    };

    Ok(listing)
}

fn title(kind: RecordKind, view: RecordView) -> String {
    let table = kind.table();
    let mut name = table[..1].to_uppercase();
    name.push_str(&table[1..]);
    match view {
        RecordView::Active => name,
        RecordView::Inactive => format!("Inactive {}", table),
        RecordView::All => format!("All {}", table),
    }
}

pub async fn dashboard(
    Extension(db): Extension<DatabaseConnection>,
    Extension(mirror): Extension<Synchronizer>,
    Extension(views): Extension<Arc<Views>>,
) -> ClinicResult<Html<String>> {
    let summary = clinic::summary(&db, &mirror).await?;
    views.render("dashboard", &json!({ "title": "Dashboard", "summary": summary }))
}

async fn render_listing(
    db: &DatabaseConnection,
    views: &Views,
    kind: RecordKind,
    view: RecordView,
    message: Option<String>,
    status: StatusCode,
) -> Result<Response, ClinicError> {
    let (columns, rows) = table_rows(db, kind, view).await?;

    let page = Listing {
        title: title(kind, view),
        table: kind.table(),
        view: view.as_str(),
        views: [RecordView::Active, RecordView::Inactive, RecordView::All]
            .into_iter()
            .map(|v| ViewLink {
                name: v.as_str(),
                selected: v == view,
            })
            .collect(),
        columns,
        rows,
        message,
        owner_form: kind == RecordKind::Owner,
    };

    Ok((status, views.render("listing", &page)?).into_response())
}

fn page_not_found() -> Response {
    (StatusCode::NOT_FOUND, Html("Not found")).into_response()
}

/// Failures shown on the listing page instead of an error response.
fn shown_on_page(e: &ClinicError) -> bool {
    e.is_guard()
        || matches!(
            e,
            ClinicError::NotFound { .. } | ClinicError::Forbidden(_) | ClinicError::Validation(_)
        )
}

pub async fn listing(
    Extension(db): Extension<DatabaseConnection>,
    Extension(views): Extension<Arc<Views>>,
    Path(table): Path<String>,
    Query(query): Query<ViewQuery>,
) -> Result<Response, ClinicError> {
    let Some(kind) = RecordKind::from_table(&table) else {
        return Ok(page_not_found());
    };

    record_action(kind.table(), "list_page", None, query.view.as_str());
    render_listing(&db, &views, kind, query.view, None, StatusCode::OK).await
}

/// Create form; only the owners listing carries one.
pub async fn create_record(
    Extension(db): Extension<DatabaseConnection>,
    Extension(mirror): Extension<Synchronizer>,
    Extension(views): Extension<Arc<Views>>,
    Path(table): Path<String>,
    Form(form): Form<NewOwner>,
) -> Result<Response, ClinicError> {
    if RecordKind::from_table(&table) != Some(RecordKind::Owner) {
        return Ok(page_not_found());
    }

    match owners::create(&db, &mirror, form).await {
        Ok(owner) => {
            record_action("owners", "create_owner", Some(owner.id), "Owner created from form");
            Ok(Redirect::to("/owners").into_response())
        }
        Err(e) if shown_on_page(&e) => {
            let status = e.status();
            let message = Some(e.to_string());
            render_listing(&db, &views, RecordKind::Owner, RecordView::Active, message, status)
                .await
        }
        Err(e) => Err(e),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Transition {
    Deactivate,
    Reactivate,
}

impl Transition {
    fn action(self) -> &'static str {
        match self {
            Transition::Deactivate => "soft_delete_page",
            Transition::Reactivate => "restore_page",
        }
    }

    /// Listing the form was posted from.
    fn origin(self) -> RecordView {
        match self {
            Transition::Deactivate => RecordView::Active,
            Transition::Reactivate => RecordView::Inactive,
        }
    }
}

async fn apply_transition(
    db: &DatabaseConnection,
    mirror: &Synchronizer,
    user: &CurrentUser,
    kind: RecordKind,
    id: i32,
    transition: Transition,
) -> ClinicResult<()> {
    match (kind, transition) {
        (RecordKind::Owner, Transition::Deactivate) => {
            owners::soft_delete(db, mirror, id).await?;
        }
        (RecordKind::Owner, Transition::Reactivate) => {
            owners::restore(db, mirror, id).await?;
        }
        (RecordKind::Veterinarian, Transition::Deactivate) => {
            veterinarians::soft_delete(db, mirror, id).await?;
        }
        (RecordKind::Veterinarian, Transition::Reactivate) => {
            user.require_admin("restoring a veterinarian requires the admin role")?;
            veterinarians::restore(db, mirror, id).await?;
        }
        (RecordKind::Pet, Transition::Deactivate) => {
            pets::soft_delete(db, mirror, id).await?;
        }
        (RecordKind::Pet, Transition::Reactivate) => {
            pets::restore(db, mirror, id).await?;
        }
        (RecordKind::Visit, Transition::Deactivate) => {
            visits::soft_delete(db, mirror, id).await?;
        }
        (RecordKind::Visit, Transition::Reactivate) => {
            visits::restore(db, mirror, id).await?;
        }
        (RecordKind::Payment, Transition::Deactivate) => {
            payments::soft_delete(db, mirror, id).await?;
        }
        (RecordKind::Payment, Transition::Reactivate) => {
            payments::restore(db, mirror, id).await?;
        }
    }
    Ok(())
}

async fn change_state(
    db: DatabaseConnection,
    mirror: Synchronizer,
    views: Arc<Views>,
    user: CurrentUser,
    table: String,
    id: i32,
    transition: Transition,
) -> Result<Response, ClinicError> {
    let Some(kind) = RecordKind::from_table(&table) else {
        return Ok(page_not_found());
    };
    let origin = transition.origin();

    match apply_transition(&db, &mirror, &user, kind, id, transition).await {
        Ok(()) => {
            record_action(kind.table(), transition.action(), Some(id), "Record state changed");
            let back = format!("/{}?view={}", kind.table(), origin.as_str());
            Ok(Redirect::to(&back).into_response())
        }
        Err(e) if shown_on_page(&e) => {
            let message = e.to_string();
            record_action(kind.table(), transition.action(), Some(id), &message);
            render_listing(&db, &views, kind, origin, Some(message), e.status()).await
        }
        Err(e) => Err(e),
    }
}

pub async fn delete_record(
    Extension(db): Extension<DatabaseConnection>,
    Extension(mirror): Extension<Synchronizer>,
    Extension(views): Extension<Arc<Views>>,
    Extension(user): Extension<CurrentUser>,
    Path((table, id)): Path<(String, i32)>,
) -> Result<Response, ClinicError> {
    change_state(db, mirror, views, user, table, id, Transition::Deactivate).await
}

pub async fn restore_record(
    Extension(db): Extension<DatabaseConnection>,
    Extension(mirror): Extension<Synchronizer>,
    Extension(views): Extension<Arc<Views>>,
    Extension(user): Extension<CurrentUser>,
    Path((table, id)): Path<(String, i32)>,
) -> Result<Response, ClinicError> {
    change_state(db, mirror, views, user, table, id, Transition::Reactivate).await
}

pub async fn login_form(Extension(views): Extension<Arc<Views>>) -> ClinicResult<Html<String>> {
    views.render("login", &json!({ "title": "Sign in" }))
}

#[derive(Deserialize)]
pub struct LoginForm {
    email: String,
    password: String,
}

pub async fn login_submit(
    Extension(db): Extension<DatabaseConnection>,
    Extension(views): Extension<Arc<Views>>,
    Extension(key): Extension<Key>,
    cookies: Cookies,
    Form(form): Form<LoginForm>,
) -> Result<Response, ClinicError> {
    match auth::authenticate(&db, &form.email, &form.password).await {
        Ok(user) => {
            auth::start_session(&key, &cookies, &user);
            record_action("users", "login_user", Some(user.id), "User logged in from form");
            Ok(Redirect::to("/").into_response())
        }
        Err(ClinicError::Unauthorized) => {
            record_action("users", "login_user_failed", None, "Invalid credentials");
            let page = views.render(
                "login",
                &json!({
                    "title": "Sign in",
                    "error": "Invalid email or password",
                    "email": form.email,
                }),
            )?;
            Ok((StatusCode::UNAUTHORIZED, page).into_response())
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn titles_follow_the_view() {
        assert_eq!(title(RecordKind::Owner, RecordView::Active), "Owners");
        assert_eq!(title(RecordKind::Owner, RecordView::Inactive), "Inactive owners");
        assert_eq!(title(RecordKind::Payment, RecordView::All), "All payments");
    }

    #[test]
    fn forms_return_to_the_listing_they_came_from() {
        assert_eq!(Transition::Deactivate.origin(), RecordView::Active);
        assert_eq!(Transition::Reactivate.origin(), RecordView::Inactive);
    }

    #[test]
    fn lifecycle_failures_become_page_messages() {
        let blocked = ClinicError::Forbidden("restoring a veterinarian requires the admin role");
        assert!(shown_on_page(&blocked));
        assert!(shown_on_page(&ClinicError::validation("name is required")));
        assert!(!shown_on_page(&ClinicError::Internal("session")));
        assert!(!shown_on_page(&ClinicError::Unauthorized));
    }
}
