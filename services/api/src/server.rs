use crate::cli::ServeArgs;
use crate::infra::{
    load_risk_grade_table, load_rule_table, AppState, InMemoryCaseRepository,
    LoggingNotificationSink,
};
use crate::routes::with_underwriting_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;
use underwriter::config::AppConfig;
use underwriter::error::AppError;
use underwriter::telemetry;
use underwriter::workflows::underwriting::UnderwritingService;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let rules = Arc::new(load_rule_table(&config.underwriting)?);
    let grades = Arc::new(load_risk_grade_table(&config.underwriting)?);

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
        rules: rules.clone(),
    };

    let repository = Arc::new(InMemoryCaseRepository::default());
    let notifications = Arc::new(LoggingNotificationSink::default());
    let underwriting_service = Arc::new(UnderwritingService::new(
        repository,
        notifications,
        rules,
        grades,
    ));

    let app = with_underwriting_routes(underwriting_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "underwriting service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
