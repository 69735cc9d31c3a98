//! rootara-traitd: HTTP API over the trait repository.
//!
//! **Traits:**
//! - `POST /api/traits/info`: all traits, or one by `id`; genotypes resolved for `report_id`
//! - `POST /api/traits/add`: add a user trait (`traitData`)
//! - `POST /api/traits/delete`: delete a user trait (`traits_id`)
//! - `POST /api/traits/import`: import an interchange document (`input_data`)
//! - `POST /api/traits/export`: download user traits as JSON
//! - `POST /api/traits/evaluate`: score an ad-hoc formula
//!
//! **Health:**
//! - `GET  /health`: server status
//!
//! Build and run: `cargo run --features server --bin rootara-traitd`

use std::sync::Arc;

use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use rootara_traits::backend::{self, BackendClient, GenotypeSource, StaticGenotypes};
use rootara_traits::config::{GenotypeMode, RootaraConfig, RootaraPaths};
use rootara_traits::error::{StoreError, TraitsError};
use rootara_traits::formula;
use rootara_traits::interchange::{self, InterchangeError};
use rootara_traits::model::Trait;
use rootara_traits::store::{ImportReport, TraitRepository};
use rootara_traits::thresholds::ScoreThresholds;

type ApiError = (StatusCode, String);

// ── Server state ──────────────────────────────────────────────────────────

struct ServerState {
    repo: TraitRepository,
    genotypes: Option<Arc<dyn GenotypeSource + Send + Sync>>,
}

fn store_error(e: StoreError) -> ApiError {
    let status = match &e {
        StoreError::NotFound { .. } => StatusCode::NOT_FOUND,
        StoreError::Duplicate { .. }
        | StoreError::BuiltIn { .. }
        | StoreError::InvalidTrait { .. }
        | StoreError::InvalidFormula { .. }
        | StoreError::InvalidImport { .. } => StatusCode::BAD_REQUEST,
        StoreError::Io { .. } | StoreError::Redb { .. } | StoreError::Serialization { .. } => {
            tracing::error!("storage failure: {e}");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, e.to_string())
}

fn interchange_error(e: InterchangeError) -> ApiError {
    let status = match &e {
        InterchangeError::Encode { .. } | InterchangeError::Io { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        _ => StatusCode::BAD_REQUEST,
    };
    (status, e.to_string())
}

fn traits_error(e: TraitsError) -> ApiError {
    match e {
        TraitsError::Store(e) => store_error(e),
        TraitsError::Interchange(e) => interchange_error(e),
        other => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
    }
}

fn missing(field: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, format!("{field} is required"))
}

// ── Handlers ──────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    built_in_traits: usize,
    user_traits: usize,
}

async fn health(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<HealthResponse>, ApiError> {
    let user = state.repo.user_traits().map_err(store_error)?;
    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        built_in_traits: state.repo.catalog().len(),
        user_traits: user.len(),
    }))
}

#[derive(Deserialize)]
struct InfoReq {
    id: Option<String>,
    report_id: Option<String>,
}

async fn traits_info(
    State(state): State<Arc<ServerState>>,
    Json(req): Json<InfoReq>,
) -> Result<Json<Vec<Trait>>, ApiError> {
    let traits = match req.id.as_deref() {
        Some(id) => vec![state.repo.get(id).map_err(store_error)?],
        None => state.repo.list_all().map_err(store_error)?,
    };

    let (Some(report_id), Some(source)) = (req.report_id, state.genotypes.clone()) else {
        return Ok(Json(traits));
    };

    // The backend client blocks.
    let resolved = tokio::task::spawn_blocking(move || {
        traits
            .into_iter()
            .map(|mut t| {
                backend::resolve_genotypes(&mut t, source.as_ref(), &report_id);
                t
            })
            .collect::<Vec<_>>()
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("{e}")))?;
    Ok(Json(resolved))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddReq {
    trait_data: Option<Trait>,
}

async fn traits_add(
    State(state): State<Arc<ServerState>>,
    Json(req): Json<AddReq>,
) -> Result<Json<Trait>, ApiError> {
    let record = req.trait_data.ok_or_else(|| missing("traitData"))?;
    let stored = state.repo.add(record).map_err(store_error)?;
    Ok(Json(stored))
}

#[derive(Deserialize)]
struct DeleteReq {
    traits_id: Option<String>,
}

#[derive(Serialize)]
struct DeleteResponse {
    id: String,
    deleted: bool,
}

async fn traits_delete(
    State(state): State<Arc<ServerState>>,
    Json(req): Json<DeleteReq>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let id = req
        .traits_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| missing("traits_id"))?;
    let removed = state.repo.remove(&id).map_err(store_error)?;
    Ok(Json(DeleteResponse {
        id: removed.id,
        deleted: true,
    }))
}

#[derive(Deserialize)]
struct ImportReq {
    input_data: Option<String>,
}

async fn traits_import(
    State(state): State<Arc<ServerState>>,
    Json(req): Json<ImportReq>,
) -> Result<Json<ImportReport>, ApiError> {
    let input = req.input_data.ok_or_else(|| missing("input_data"))?;
    let report = interchange::import_into(&state.repo, &input).map_err(traits_error)?;
    Ok(Json(report))
}

async fn traits_export(
    State(state): State<Arc<ServerState>>,
) -> Result<impl IntoResponse, ApiError> {
    let document = interchange::export_from(&state.repo).map_err(traits_error)?;
    let file_name = interchange::export_file_name(chrono::Utc::now().date_naive());
    Ok((
        [
            (header::CONTENT_TYPE, "application/json".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{file_name}\""),
            ),
        ],
        document,
    ))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EvaluateReq {
    formula: Option<String>,
    #[serde(default)]
    rsids: Vec<String>,
    #[serde(default)]
    your_genotypes: Vec<String>,
    #[serde(default)]
    score_thresholds: ScoreThresholds,
}

#[derive(Serialize)]
struct EvaluateResponse {
    score: i64,
    result: Option<String>,
}

async fn traits_evaluate(Json(req): Json<EvaluateReq>) -> Result<Json<EvaluateResponse>, ApiError> {
    let formula = req.formula.ok_or_else(|| missing("formula"))?;
    let score = formula::evaluate(&formula, &req.rsids, &req.your_genotypes);
    Ok(Json(EvaluateResponse {
        score,
        result: req.score_thresholds.derive(score).map(String::from),
    }))
}

// ── Main ──────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let paths = RootaraPaths::resolve().unwrap_or_else(|e| {
        tracing::error!("failed to resolve XDG paths: {e}");
        std::process::exit(1);
    });
    let mut config = RootaraConfig::load_or_default(&paths.config_file()).unwrap_or_else(|e| {
        tracing::error!("failed to load config: {e}");
        std::process::exit(1);
    });
    if let Err(e) = config.apply_env() {
        tracing::error!("{e}");
        std::process::exit(1);
    }
    let paths = paths.clone().with_data_dir(config.data_dir(&paths));
    if let Err(e) = paths.ensure_dirs() {
        tracing::error!("failed to create data directories: {e}");
        std::process::exit(1);
    }

    let repo = TraitRepository::open(&paths, config.store.persistent).unwrap_or_else(|e| {
        tracing::error!("failed to open trait store: {e}");
        std::process::exit(1);
    });
    let genotypes: Option<Arc<dyn GenotypeSource + Send + Sync>> = match config.server.genotypes {
        GenotypeMode::Stored => None,
        GenotypeMode::Demo => Some(Arc::new(StaticGenotypes::demo())),
        GenotypeMode::Backend => Some(Arc::new(BackendClient::new(&config.backend))),
    };

    tracing::info!(
        built_in = repo.catalog().len(),
        genotypes = ?config.server.genotypes,
        "rootara-traitd initialized"
    );

    let state = Arc::new(ServerState { repo, genotypes });

    let app = Router::new()
        .route("/health", get(health))
        .route("/api/traits/info", post(traits_info))
        .route("/api/traits/add", post(traits_add))
        .route("/api/traits/delete", post(traits_delete))
        .route("/api/traits/import", post(traits_import))
        .route("/api/traits/export", post(traits_export))
        .route("/api/traits/evaluate", post(traits_evaluate))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = config.server.address();
    tracing::info!("rootara-traitd listening on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("rootara-traitd shutting down");
        })
        .await
        .expect("server error");
}
