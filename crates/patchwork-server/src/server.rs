//! Axum web server for triggered calculations

use crate::gate::AdmissionGate;
use crate::{trigger, ServerConfig};
use axum::{
    extract::State,
    http::{Method, StatusCode},
    routing::any,
    Router,
};
use patchwork_agent::{resolve_token, CoordinatorClient};
use patchwork_core::{fail_open, CalcError, Result};
use patchwork_orchestrator::{run_calculation, CalculationJob};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, error, info, info_span, Instrument};
use uuid::Uuid;

/// Shared application state
pub struct AppState {
    pub config: ServerConfig,
    pub gate: AdmissionGate,
}

pub type SharedState = Arc<AppState>;

/// Build the service router
///
/// `/` accepts POST triggers; every other method or path answers 404.
pub fn router(config: ServerConfig) -> Router {
    let gate = AdmissionGate::new(config.agent.concurrency);
    let app_state = Arc::new(AppState { config, gate });

    Router::new()
        .route("/", any(trigger_handler))
        .fallback(not_found)
        .with_state(app_state)
}

/// Serve triggers on an already bound listener
pub async fn serve(listener: TcpListener, config: ServerConfig) -> anyhow::Result<()> {
    axum::serve(listener, router(config)).await?;
    Ok(())
}

/// POST / - run one calculation named by the body
///
/// The job runs on its own task holding an admission slot, so it completes
/// and uploads even if the triggering client goes away.
async fn trigger_handler(
    State(app): State<SharedState>,
    method: Method,
    body: String,
) -> StatusCode {
    if method != Method::POST {
        return StatusCode::NOT_FOUND;
    }

    let permit = match app.gate.admit().await {
        Ok(permit) => permit,
        Err(e) => {
            error!("{}", e);
            return StatusCode::INTERNAL_SERVER_ERROR;
        }
    };
    debug!(
        "Admitted request ({} of {} slots free)",
        app.gate.available(),
        app.gate.capacity()
    );

    let job_id = Uuid::new_v4();
    let span = info_span!("job", %job_id);
    let job = tokio::spawn(
        async move {
            let _permit = permit;
            handle_job(&app.config, &body).await
        }
        .instrument(span),
    );

    match job.await {
        Ok(Ok(())) => StatusCode::OK,
        Ok(Err(e)) => {
            error!(%job_id, "Calculation failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
        Err(e) => {
            error!(%job_id, "Calculation task aborted: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}

/// Run a job in a fresh scratch directory that is removed afterwards
async fn handle_job(config: &ServerConfig, body: &str) -> Result<()> {
    let dir = tempfile::Builder::new()
        .prefix("calc")
        .tempdir_in(&config.work_dir)?;
    debug!("Created working directory {}", dir.path().display());

    let result = match trigger::resolve(body, config.agent.host(), config.agent.token.as_deref())
    {
        Ok(trigger) => {
            info!("Triggered calculation {} on {}", trigger.calculation, trigger.host);
            let client =
                CoordinatorClient::new(&trigger.host, resolve_token(trigger.token.as_deref()));
            let job = CalculationJob::new(&config.agent.command, &trigger.calculation, dir.path())
                .with_timeout(Duration::from_secs(config.agent.timeout_secs))
                .with_submit_logs(config.agent.submit_logs);
            run_calculation(&client, &job).await.map(|_| ())
        }
        Err(e) => Err(e),
    };

    fail_open("working directory cleanup", || async move {
        dir.close().map_err(CalcError::from)
    })
    .await;

    result
}
