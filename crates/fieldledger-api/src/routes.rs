use std::hash::{Hash, Hasher};
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use chrono::Utc;
use fieldledger_core::ingest::{BatchReport, SyncStatus};
use fieldledger_core::models::Entity;
use fieldledger_core::services::{ClientWithAccounts, Ledger, RecordService};
use fieldledger_core::{Account, Client, RecordId, Transaction, VersionToken, Versioned};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::{extract_bearer_token, AuthenticatedUser, JwtVerifier};
use crate::config::AppConfig;
use crate::error::AppError;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    ledger: Arc<Ledger>,
    jwt_verifier: Arc<JwtVerifier>,
}

impl AppState {
    pub fn new(config: Arc<AppConfig>, ledger: Ledger) -> Self {
        Self {
            jwt_verifier: Arc::new(JwtVerifier::new(&config.jwt_secret, config.auth_clock_skew)),
            ledger: Arc::new(ledger),
            config,
        }
    }
}

/// Entity exposed as a REST collection
trait Resource: Entity + Serialize + DeserializeOwned {
    /// Endpoint label used in logs
    const ENDPOINT: &'static str;

    fn service(ledger: &Ledger) -> &RecordService<Self>;
}

impl Resource for Client {
    const ENDPOINT: &'static str = "clientes";

    fn service(ledger: &Ledger) -> &RecordService<Self> {
        &ledger.clients
    }
}

impl Resource for Account {
    const ENDPOINT: &'static str = "cuentas";

    fn service(ledger: &Ledger) -> &RecordService<Self> {
        &ledger.accounts
    }
}

impl Resource for Transaction {
    const ENDPOINT: &'static str = "transacciones";

    fn service(ledger: &Ledger) -> &RecordService<Self> {
        &ledger.transactions
    }
}

pub fn app_router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/clientes", get(list_clients).post(create_record::<Client>))
        .route(
            "/clientes/{id}",
            get(fetch_client)
                .put(update_record::<Client>)
                .delete(delete_record::<Client>),
        )
        .route(
            "/cuentas",
            get(list_records::<Account>).post(create_record::<Account>),
        )
        .route(
            "/cuentas/{id}",
            get(fetch_record::<Account>)
                .put(update_record::<Account>)
                .delete(delete_record::<Account>),
        )
        .route(
            "/transacciones",
            get(list_records::<Transaction>).post(sync_transactions),
        )
        .route("/transacciones/sincronizar", post(sync_transactions))
        .route(
            "/transacciones/{id}",
            get(fetch_record::<Transaction>)
                .put(update_record::<Transaction>)
                .delete(delete_record::<Transaction>),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/healthz", get(healthz))
        .nest("/api", protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any)
                .expose_headers([header::ETAG]),
        )
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: i64,
    store: &'static str,
}

async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().timestamp(),
        store: state.ledger.store_kind().label(),
    })
}

async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_bearer_token(request.headers())?;
    let user = state.jwt_verifier.verify_access_token(token)?;
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

async fn list_clients(
    State(state): State<AppState>,
) -> Result<Json<Vec<ClientWithAccounts>>, AppError> {
    Ok(Json(state.ledger.clients_with_accounts().await?))
}

async fn fetch_client(
    State(state): State<AppState>,
    Path(id): Path<RecordId>,
) -> Result<Response, AppError> {
    let view = state.ledger.client_with_accounts(id).await?;
    let tag = etag(&view.client.version);
    Ok(([(header::ETAG, tag)], Json(view)).into_response())
}

async fn list_records<R: Resource>(
    State(state): State<AppState>,
) -> Result<Json<Vec<Versioned<R>>>, AppError> {
    Ok(Json(R::service(&state.ledger).list().await?))
}

async fn fetch_record<R: Resource>(
    State(state): State<AppState>,
    Path(id): Path<RecordId>,
) -> Result<Response, AppError> {
    let record = R::service(&state.ledger).get(id).await?;
    let tag = etag(&record.version);
    Ok(([(header::ETAG, tag)], Json(record)).into_response())
}

async fn create_record<R: Resource>(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    payload: Result<Json<R>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(fields) = payload?;
    let record = R::service(&state.ledger)
        .create(&user.actor(), fields)
        .await?;
    tracing::info!(
        endpoint = R::ENDPOINT,
        user = user_fingerprint(&user.user_id),
        id = %record.id,
        "Created record"
    );
    let tag = etag(&record.version);
    Ok((StatusCode::CREATED, [(header::ETAG, tag)], Json(record)).into_response())
}

async fn update_record<R: Resource>(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<RecordId>,
    headers: HeaderMap,
    payload: Result<Json<R>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(fields) = payload?;
    let expected = if_match(&headers)?;
    let committed = R::service(&state.ledger)
        .update(&user.actor(), id, expected, fields)
        .await?;
    tracing::info!(
        endpoint = R::ENDPOINT,
        user = user_fingerprint(&user.user_id),
        %id,
        attempts = committed.attempts,
        conflicts = committed.conflicts.len(),
        "Updated record"
    );
    let tag = etag(&committed.applied);
    Ok((StatusCode::NO_CONTENT, [(header::ETAG, tag)]).into_response())
}

async fn delete_record<R: Resource>(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<RecordId>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    let expected = if_match(&headers)?;
    let committed = R::service(&state.ledger).delete(id, expected).await?;
    tracing::info!(
        endpoint = R::ENDPOINT,
        user = user_fingerprint(&user.user_id),
        %id,
        attempts = committed.attempts,
        "Deleted record"
    );
    Ok(StatusCode::NO_CONTENT)
}

async fn sync_transactions(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    payload: Result<Json<Vec<serde_json::Value>>, JsonRejection>,
) -> Result<(StatusCode, Json<BatchReport>), AppError> {
    let Json(batch) = payload?;
    let items = batch.len();
    let report = state.ledger.sync.ingest_json(&user.actor(), batch).await?;
    tracing::info!(
        endpoint = "transacciones_sincronizar",
        user = user_fingerprint(&user.user_id),
        items,
        accepted = report.accepted,
        "Synchronized transactions"
    );
    let status = match report.status {
        SyncStatus::FullySynced => StatusCode::CREATED,
        SyncStatus::PartiallySynced | SyncStatus::NotSynced => StatusCode::OK,
    };
    Ok((status, Json(report)))
}

fn etag(version: &VersionToken) -> String {
    format!("\"{}\"", version.encode())
}

/// Expected version from `If-Match`; `None` when absent or `*`
fn if_match(headers: &HeaderMap) -> Result<Option<VersionToken>, AppError> {
    let Some(value) = headers.get(header::IF_MATCH) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .map_err(|_| AppError::bad_request("If-Match header is not valid UTF-8"))?
        .trim();
    if value == "*" {
        return Ok(None);
    }
    let tag = value.strip_prefix("W/").unwrap_or(value).trim_matches('"');
    Ok(Some(VersionToken::decode(tag)?))
}

fn user_fingerprint(user_id: &str) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    user_id.hash(&mut hasher);
    hasher.finish()
}
