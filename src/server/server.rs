use anyhow::{Context, Result};
use std::{
    future::Future,
    io::ErrorKind,
    path::PathBuf,
    sync::Arc,
    time::{Duration, Instant},
};

use tracing::{debug, error, info, warn};

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;

use super::metrics::{metrics_handler, record_error};
use super::raw_files::{serve_asset_file, serve_data_file};
use super::{log_requests, state::*, ServerConfig};
use crate::augment::{DocumentAugmentor, UrlResolver};
use crate::catalog::AssetCatalog;
use crate::host::{is_valid_authority, rewrite_placeholders, HostContext, HostResolver};
use crate::waveform::WaveformService;

/// Resource whose document is synthesized from the files on disk when absent.
const AUDIO_RESOURCE: &str = "audio";

const X_FORWARDED_HOST: &str = "x-forwarded-host";

#[derive(Serialize)]
struct ServerStats {
    pub uptime: String,
    pub hash: String,
    pub cached_waveforms: usize,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
struct ListeningSession {
    pub scene_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preset_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Serialize)]
struct ListeningSessionReceipt {
    status: &'static str,
    session: ListeningSession,
}

async fn home(State(state): State<ServerState>) -> impl IntoResponse {
    let stats = ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        hash: state.hash.clone(),
        cached_waveforms: state.waveforms.cache().len(),
    };
    Json(stats)
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

fn internal_error() -> Response {
    error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
}

/// Strips `.json` and rejects names that could leave the data directory.
fn resource_name(raw: &str) -> Option<&str> {
    let name = raw.strip_suffix(".json").unwrap_or(raw);
    if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
        return None;
    }
    Some(name)
}

/// The host the caller addressed, preferring the one a proxy forwarded.
fn declared_host(headers: &HeaderMap) -> Option<&str> {
    [X_FORWARDED_HOST, header::HOST.as_str()]
        .into_iter()
        .filter_map(|name| headers.get(name))
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| value.split(',').next())
        .map(str::trim)
        .find(|value| is_valid_authority(value))
}

enum DocumentSource {
    File(Value),
    Missing,
}

async fn read_document(path: PathBuf) -> Result<DocumentSource> {
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(DocumentSource::Missing),
        Err(err) => return Err(err).with_context(|| format!("Failed to read {:?}", path)),
    };
    let document = serde_json::from_slice(&bytes)
        .with_context(|| format!("Failed to parse {:?}", path))?;
    Ok(DocumentSource::File(document))
}

async fn get_document(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Path(resource): Path<String>,
) -> Response {
    let name = match resource_name(&resource) {
        Some(name) => name,
        None => {
            debug!("Rejected resource name {:?}", resource);
            return error_response(StatusCode::BAD_REQUEST, "invalid resource name");
        }
    };

    let host = state.host_resolver.resolve(&HostContext {
        declared_host: declared_host(&headers),
    });

    let path = state.config.data_dir.join(format!("{}.json", name));
    let mut document = match read_document(path).await {
        Ok(DocumentSource::File(document)) => document,
        Ok(DocumentSource::Missing) if name == AUDIO_RESOURCE => {
            match state.asset_catalog.listing(&host, &state.waveforms).await {
                Ok(items) => match serde_json::to_value(items) {
                    Ok(document) => document,
                    Err(err) => {
                        error!("Failed to serialize audio listing: {}", err);
                        record_error("serialize", "documents");
                        return internal_error();
                    }
                },
                Err(err) => {
                    error!("Failed to list audio assets: {}", err);
                    record_error("listing", "documents");
                    return internal_error();
                }
            }
        }
        Ok(DocumentSource::Missing) => {
            return error_response(
                StatusCode::NOT_FOUND,
                format!("resource '{}' not found", name),
            )
        }
        Err(err) => {
            error!("Failed to load resource {}: {:#}", name, err);
            record_error("load", "documents");
            return internal_error();
        }
    };

    let augmented = state.augmentor.augment(&mut document).await;
    debug!("Augmented {} entries of resource {}", augmented, name);

    let body = match serde_json::to_string(&document) {
        Ok(body) => body,
        Err(err) => {
            error!("Failed to serialize resource {}: {}", name, err);
            record_error("serialize", "documents");
            return internal_error();
        }
    };

    (
        [(header::CONTENT_TYPE, "application/json")],
        rewrite_placeholders(&body, &host),
    )
        .into_response()
}

async fn post_listening_session(Json(session): Json<ListeningSession>) -> Response {
    info!(
        "Listening session for scene {} (preset {:?}, {:?} minutes)",
        session.scene_id, session.preset_id, session.duration_minutes
    );
    (
        StatusCode::ACCEPTED,
        Json(ListeningSessionReceipt {
            status: "recorded",
            session,
        }),
    )
        .into_response()
}

pub fn make_app(
    config: ServerConfig,
    waveforms: Arc<WaveformService>,
    host_resolver: HostResolver,
) -> Router {
    let resolver = UrlResolver::with_defaults(config.data_dir.clone(), config.assets_dir.clone());
    let augmentor = DocumentAugmentor::new(waveforms.clone(), resolver, &config.audio_extensions);
    let asset_catalog =
        AssetCatalog::with_defaults(&config.data_dir, &config.assets_dir, &config.audio_extensions);

    let state = ServerState {
        config,
        start_time: Instant::now(),
        hash: env!("GIT_HASH").to_owned(),
        waveforms,
        augmentor: Arc::new(augmentor),
        asset_catalog: Arc::new(asset_catalog),
        host_resolver: Arc::new(host_resolver),
    };

    let api_routes: Router = Router::new()
        .route("/listening-session", post(post_listening_session))
        .route("/{resource}", get(get_document))
        .with_state(state.clone());

    let file_routes: Router = Router::new()
        .route("/data/{*path}", get(serve_data_file))
        .route("/assets/{*path}", get(serve_asset_file))
        .with_state(state.clone());

    let app: Router = Router::new()
        .route("/", get(home))
        .with_state(state.clone())
        .nest("/api/v1", api_routes)
        .merge(file_routes);

    app.layer(middleware::from_fn_with_state(state.clone(), log_requests))
        .layer(CorsLayer::permissive())
}

pub fn make_metrics_app() -> Router {
    Router::new().route("/metrics", get(metrics_handler))
}

pub async fn run_server<F>(
    config: ServerConfig,
    waveforms: Arc<WaveformService>,
    host_resolver: HostResolver,
    metrics_port: u16,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let port = config.port;
    let app = make_app(config, waveforms, host_resolver);

    let metrics_listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", metrics_port))
        .await
        .with_context(|| format!("Failed to bind metrics port {}", metrics_port))?;
    info!("Metrics available on port {}", metrics_port);
    let metrics_server = tokio::spawn(async move {
        if let Err(err) = axum::serve(metrics_listener, make_metrics_app()).await {
            warn!("Metrics server stopped: {}", err);
        }
    });

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .with_context(|| format!("Failed to bind port {}", port))?;
    info!("Listening on port {}", port);

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await;
    metrics_server.abort();
    Ok(result?)
}
