use crate::cli::ServeArgs;
use crate::infra::{AppState, InMemoryAssessmentRepository, LoggingPublisher};
use crate::routes::with_deviation_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use income_deviation::config::AppConfig;
use income_deviation::deviation::DeviationService;
use income_deviation::error::AppError;
use income_deviation::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let policy = config.deviation.policy();
    let service = Arc::new(DeviationService::new(
        Arc::new(InMemoryAssessmentRepository::default()),
        Arc::new(LoggingPublisher::default()),
        policy,
    ));

    let app = with_deviation_routes(service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        maximum_allowed_deviation_percent = policy.maximum_allowed_percent,
        "income deviation service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
