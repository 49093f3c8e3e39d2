//! `RestTableClient` against a small in-process PostgREST lookalike.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use axum::{
    extract::{Extension, Json, Path, Query},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde_json::{json, Map, Value};
use vetclinic_server::lifecycle::RecordKind;
use vetclinic_server::mirror::{
    apply, remote_id, MirrorError, MirrorEvent, Outcome, ParentRef, RemoteTable, RestTableClient,
};

const KEY: &str = "service-key";

#[derive(Default)]
struct Store {
    tables: HashMap<String, Vec<Map<String, Value>>>,
    next_id: i64,
    broken: bool,
}

type Shared = Arc<Mutex<Store>>;

fn authorized(headers: &HeaderMap) -> bool {
    let apikey = headers.get("apikey").and_then(|v| v.to_str().ok());
    let bearer = headers.get("authorization").and_then(|v| v.to_str().ok());
    apikey == Some(KEY) && bearer == Some(&format!("Bearer {}", KEY))
}

/// `column=eq.value` filters from the query string.
fn filters(params: &HashMap<String, String>) -> Vec<(String, String)> {
    params
        .iter()
        .filter_map(|(k, v)| v.strip_prefix("eq.").map(|v| (k.clone(), v.to_string())))
        .collect()
}

fn matches(row: &Map<String, Value>, filters: &[(String, String)]) -> bool {
    filters.iter().all(|(column, value)| match row.get(column) {
        Some(Value::String(s)) => s == value,
        Some(other) => &other.to_string() == value,
        None => false,
    })
}

fn guard(store: &Store, headers: &HeaderMap) -> Option<Response> {
    if store.broken {
        return Some((StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response());
    }
    if !authorized(headers) {
        let body = Json(json!({"message": "bad key"}));
        return Some((StatusCode::UNAUTHORIZED, body).into_response());
    }
    None
}

async fn select_rows(
    Extension(store): Extension<Shared>,
    Path(table): Path<String>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let store = store.lock().unwrap();
    if let Some(rejection) = guard(&store, &headers) {
        return rejection;
    }

    let wanted: Vec<String> = params
        .get("select")
        .map(|s| s.split(',').map(str::to_string).collect())
        .unwrap_or_else(|| vec!["*".to_string()]);
    let limit = params
        .get("limit")
        .and_then(|l| l.parse::<usize>().ok())
        .unwrap_or(usize::MAX);
    let filters = filters(&params);

    let rows: Vec<Value> = store
        .tables
        .get(&table)
        .map(|rows| {
            rows.iter()
                .filter(|row| matches(row, &filters))
                .take(limit)
                .map(|row| {
                    Value::Object(
                        row.iter()
                            .filter(|(k, _)| wanted.iter().any(|w| w == "*" || w == *k))
                            .map(|(k, v)| (k.clone(), v.clone()))
                            .collect(),
                    )
                })
                .collect()
        })
        .unwrap_or_default();

    Json(rows).into_response()
}

async fn insert_row(
    Extension(store): Extension<Shared>,
    Path(table): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut store = store.lock().unwrap();
    if let Some(rejection) = guard(&store, &headers) {
        return rejection;
    }

    let Some(mut row) = body.as_object().cloned() else {
        return (StatusCode::BAD_REQUEST, "expected object").into_response();
    };
    store.next_id += 1;
    row.insert("id".to_string(), Value::from(store.next_id));
    store.tables.entry(table).or_default().push(row);

    StatusCode::CREATED.into_response()
}

async fn patch_rows(
    Extension(store): Extension<Shared>,
    Path(table): Path<String>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
    Json(patch): Json<Value>,
) -> Response {
    let mut store = store.lock().unwrap();
    if let Some(rejection) = guard(&store, &headers) {
        return rejection;
    }

    let filters = filters(&params);
    let mut updated = Vec::new();
    if let Some(rows) = store.tables.get_mut(&table) {
        for row in rows.iter_mut().filter(|row| matches(row, &filters)) {
            if let Some(fields) = patch.as_object() {
                for (k, v) in fields {
                    row.insert(k.clone(), v.clone());
                }
            }
            updated.push(Value::Object(row.clone()));
        }
    }

    Json(updated).into_response()
}

async fn serve() -> Result<(String, Shared)> {
    let store: Shared = Arc::new(Mutex::new(Store::default()));
    let app = Router::new()
        .route(
            "/rest/v1/:table",
            get(select_rows).post(insert_row).patch(patch_rows),
        )
        .layer(Extension(store.clone()));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    Ok((format!("http://{}/", addr), store))
}

#[tokio::test]
async fn insert_select_and_update_round_trip() -> Result<()> {
    let (url, _store) = serve().await?;
    let client = RestTableClient::new(&url, KEY)?;

    client.ping("owners").await?;
    client
        .insert("owners", &json!({"mirror_id": "k-ana", "name": "Ana", "active": true}))
        .await?;

    let rows = client.select("owners", "mirror_id", "k-ana", "id,name").await?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["name"], "Ana");
    assert!(rows[0].get("active").is_none());

    let matched = client
        .update("owners", "mirror_id", "k-ana", &json!({"active": false}))
        .await?;
    assert_eq!(matched, 1);
    let missing = client
        .update("owners", "mirror_id", "k-nobody", &json!({"active": false}))
        .await?;
    assert_eq!(missing, 0);

    Ok(())
}

#[tokio::test]
async fn wrong_key_is_rejected_and_not_retried() -> Result<()> {
    let (url, _store) = serve().await?;
    let client = RestTableClient::new(&url, "wrong")?;

    match client.ping("owners").await {
        Err(e @ MirrorError::Rejected { status: 401, .. }) => assert!(!e.is_transient()),
        other => panic!("expected 401 rejection, got {:?}", other),
    }

    Ok(())
}

#[tokio::test]
async fn server_errors_are_transient() -> Result<()> {
    let (url, store) = serve().await?;
    store.lock().unwrap().broken = true;
    let client = RestTableClient::new(&url, KEY)?;

    let err = client
        .insert("owners", &json!({"mirror_id": "k"}))
        .await
        .unwrap_err();
    assert!(err.is_transient());

    Ok(())
}

#[tokio::test]
async fn unreachable_remote_is_transient() -> Result<()> {
    let client = RestTableClient::new("http://127.0.0.1:9", KEY)?;
    let err = client.ping("owners").await.unwrap_err();
    assert!(matches!(err, MirrorError::Unavailable(_)));
    assert!(err.is_transient());

    Ok(())
}

#[tokio::test]
async fn create_event_resolves_parent_over_http() -> Result<()> {
    let (url, store) = serve().await?;
    let client = RestTableClient::new(&url, KEY)?;

    let owner = MirrorEvent::Create {
        kind: RecordKind::Owner,
        key: "k-ana".to_string(),
        row: json!({"name": "Ana", "active": true}),
        parents: Vec::new(),
    };
    assert_eq!(apply(&client, &owner).await?, Outcome::Written);

    let pet = MirrorEvent::Create {
        kind: RecordKind::Pet,
        key: "k-fido".to_string(),
        row: json!({"name": "Fido", "active": true}),
        parents: vec![ParentRef {
            column: "owner_id",
            kind: RecordKind::Owner,
            key: "k-ana".to_string(),
            required: true,
        }],
    };
    assert_eq!(apply(&client, &pet).await?, Outcome::Written);

    let owner_id = remote_id(&client, RecordKind::Owner, "k-ana").await?;
    let store = store.lock().unwrap();
    let fido = &store.tables["pets"][0];
    assert_eq!(fido.get("owner_id").cloned(), owner_id);
    assert_eq!(fido["mirror_id"], "k-fido");

    Ok(())
}
