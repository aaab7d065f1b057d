use axum::extract::State;
use axum::http::header;
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use axum::Router;
use ping_exporter::{
    render_metrics, Args, Config, GenericError, IcmpProber, ListenAddr, Probe, ProbeRunner, Resolve, ResultPublisher,
    SweepCoordinator, SystemResolver,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

#[derive(Clone)]
struct AppState {
    publisher: Arc<ResultPublisher>,
    namespace: Arc<str>,
    metrics_path: Arc<str>,
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.publisher.snapshot();
    ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], render_metrics(&snapshot, &state.namespace))
}

async fn index(State(state): State<AppState>) -> Html<String> {
    Html(format!(
        "<html>
<head><title>Ping Exporter</title></head>
<body>
<h1>Ping Exporter</h1>
<p><a href='{}'>Metrics</a></p>
</body>
</html>
",
        state.metrics_path
    ))
}

fn router(state: AppState) -> Router {
    let metrics_path = state.metrics_path.clone();
    Router::new().route(&metrics_path, get(metrics)).route("/", get(index)).with_state(state)
}

// Every tick hands a cycle to the blocking pool without waiting for it. A cycle that is
// still running turns the next trigger into a no-op.
async fn schedule<P, R>(coordinator: Arc<SweepCoordinator<P, R>>, period: Duration)
where
    P: Probe + 'static,
    R: Resolve + 'static,
{
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        let coordinator = coordinator.clone();
        tokio::task::spawn_blocking(move || coordinator.trigger());
    }
}

async fn serve(listen: &ListenAddr, app: Router) -> Result<(), GenericError> {
    match listen {
        ListenAddr::Tcp(addr) => {
            let listener = tokio::net::TcpListener::bind(addr).await?;
            tracing::info!("serving metrics on {}", listen);
            axum::serve(listener, app).await?;
        }
        ListenAddr::Unix(path) => {
            match std::fs::remove_file(path) {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(e.into()),
                _ => {}
            }
            let listener = tokio::net::UnixListener::bind(path)?;
            tracing::info!("serving metrics on {}", listen);
            axum::serve(listener, app).await?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), GenericError> {
    let args: Args = argh::from_env();

    let subscriber = tracing_subscriber::FmtSubscriber::builder().with_max_level(args.log_level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = Config::try_from(args)?;
    tracing::info!(
        "{} destinations, {} rounds per cycle, every {:?}, {:?} socket",
        config.destinations.len(),
        config.runner.rounds,
        config.cycle_interval,
        config.socket_type
    );

    let publisher = Arc::new(ResultPublisher::new());
    let runner = ProbeRunner::new(IcmpProber::new(config.socket_type, config.probe), config.runner);
    let coordinator = Arc::new(
        SweepCoordinator::new(runner, SystemResolver, config.destinations.clone(), publisher.clone())
            .with_max_concurrency(config.max_concurrency),
    );
    tokio::spawn(schedule(coordinator, config.cycle_interval));

    let app = router(AppState {
        publisher,
        namespace: Arc::from(config.namespace.as_str()),
        metrics_path: Arc::from(config.metrics_path.as_str()),
    });
    if let Err(e) = serve(&config.listen, app).await {
        tracing::error!("metrics server failed: {}", e);
        return Err(e);
    }
    Ok(())
}
