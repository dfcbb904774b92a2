//! HTTP front-end over the acquisition and mining cores.
//!
//! Exposes health, status and calibration views plus mining triggers. Mining
//! requests read one batch from the acquisition core and run the search on the
//! blocking pool so the async runtime stays responsive.

use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
};
use serde::Serialize;

use neuropow_core::{
    AcquisitionError, AcquisitionStats, CalibrationState, ConnectionStatus, MiningError,
    MiningResult, MiningStats, SignalAcquisition, SignalMiner,
};

/// Shared server state.
struct AppState {
    acquisition: Arc<SignalAcquisition>,
    miner: Arc<SignalMiner>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    connection: ConnectionStatus,
    is_mining: bool,
    version: &'static str,
}

#[derive(Serialize)]
struct AcquisitionStatus {
    status: ConnectionStatus,
    continuous: bool,
    calibration_factor: f64,
    signal_quality: f64,
    stats: AcquisitionStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_error: Option<String>,
}

#[derive(Serialize)]
struct StatusResponse {
    acquisition: AcquisitionStatus,
    mining: MiningStats,
}

#[derive(Serialize)]
struct MineResponse {
    success: bool,
    result: MiningResult,
    /// Error message if the request failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl MineResponse {
    fn failed(status: StatusCode, error: String) -> (StatusCode, Json<MineResponse>) {
        (
            status,
            Json(MineResponse {
                success: false,
                result: MiningResult::idle(),
                error: Some(error),
            }),
        )
    }
}

#[derive(Serialize)]
struct JobResponse {
    accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
struct StopResponse {
    stopped: bool,
}

/// Why a mining request produced no result.
enum MineFailure {
    Acquisition(AcquisitionError),
    Mining(MiningError),
}

impl MineFailure {
    fn status(&self) -> StatusCode {
        match self {
            Self::Acquisition(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Mining(MiningError::AlreadyMining) => StatusCode::CONFLICT,
            Self::Mining(MiningError::Cancelled) => StatusCode::ACCEPTED,
            Self::Mining(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            Self::Acquisition(e) => e.to_string(),
            Self::Mining(e) => e.to_string(),
        }
    }
}

async fn handle_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let connection = state.acquisition.status();
    Json(HealthResponse {
        status: if connection == ConnectionStatus::Connected {
            "healthy".to_string()
        } else {
            "degraded".to_string()
        },
        connection,
        is_mining: state.miner.is_mining(),
        version: neuropow_core::VERSION,
    })
}

async fn handle_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let acq = &state.acquisition;
    Json(StatusResponse {
        acquisition: AcquisitionStatus {
            status: acq.status(),
            continuous: acq.is_continuous(),
            calibration_factor: acq.calibration_factor(),
            signal_quality: acq.signal_quality(),
            stats: acq.stats(),
            last_error: acq.last_error(),
        },
        mining: state.miner.stats(),
    })
}

async fn handle_calibration(State(state): State<Arc<AppState>>) -> Json<CalibrationState> {
    Json(state.acquisition.calibration())
}

async fn handle_mine(State(state): State<Arc<AppState>>) -> (StatusCode, Json<MineResponse>) {
    let acquisition = Arc::clone(&state.acquisition);
    let miner = Arc::clone(&state.miner);
    let joined = tokio::task::spawn_blocking(move || {
        let batch = acquisition
            .read_signals()
            .map_err(MineFailure::Acquisition)?;
        miner.mine(&batch).map_err(MineFailure::Mining)
    })
    .await;

    match joined {
        Ok(Ok(result)) => (
            StatusCode::OK,
            Json(MineResponse {
                success: result.success,
                result,
                error: None,
            }),
        ),
        Ok(Err(failure)) => MineResponse::failed(failure.status(), failure.message()),
        Err(e) => {
            log::error!("mining task panicked: {e}");
            MineResponse::failed(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

async fn handle_mine_async(State(state): State<Arc<AppState>>) -> (StatusCode, Json<JobResponse>) {
    let started = state
        .acquisition
        .read_signals()
        .map_err(MineFailure::Acquisition)
        .and_then(|batch| {
            state
                .miner
                .start_mining_async(batch)
                .map_err(MineFailure::Mining)
        });
    match started {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(JobResponse {
                accepted: true,
                error: None,
            }),
        ),
        Err(failure) => (
            failure.status(),
            Json(JobResponse {
                accepted: false,
                error: Some(failure.message()),
            }),
        ),
    }
}

async fn handle_mine_stop(State(state): State<Arc<AppState>>) -> Json<StopResponse> {
    let miner = Arc::clone(&state.miner);
    let stopped = tokio::task::spawn_blocking(move || miner.stop_mining())
        .await
        .unwrap_or(false);
    Json(StopResponse { stopped })
}

async fn handle_index() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": "NeuroPoW Server",
        "version": neuropow_core::VERSION,
        "endpoints": {
            "/": "This API index",
            "/health": "Health check",
            "/status": "Acquisition and mining status",
            "/calibration": "Current calibration state",
            "/mine": {
                "method": "POST",
                "description": "Read one batch and mine it; blocks until the search ends",
            },
            "/mine/async": {
                "method": "POST",
                "description": "Read one batch and mine it in the background",
            },
            "/mine/stop": {
                "method": "POST",
                "description": "Cancel the running mining job",
            },
        },
    }))
}

/// Build the axum router.
fn build_router(acquisition: Arc<SignalAcquisition>, miner: Arc<SignalMiner>) -> Router {
    let state = Arc::new(AppState { acquisition, miner });

    Router::new()
        .route("/", get(handle_index))
        .route("/health", get(handle_health))
        .route("/status", get(handle_status))
        .route("/calibration", get(handle_calibration))
        .route("/mine", post(handle_mine))
        .route("/mine/async", post(handle_mine_async))
        .route("/mine/stop", post(handle_mine_stop))
        .with_state(state)
}

/// Serve the HTTP front-end until the listener fails.
pub async fn run_server(
    acquisition: Arc<SignalAcquisition>,
    miner: Arc<SignalMiner>,
    host: &str,
    port: u16,
) -> std::io::Result<()> {
    let app = build_router(acquisition, miner);
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    log::info!("listening on http://{addr}");
    axum::serve(listener, app).await
}
