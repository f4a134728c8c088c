use cardlink::config::CardlinkConfig;
use cardlink::emitter::TapEmitter;
use cardlink::http::{app, AppState};
use cardlink::policy::Destinations;
use cardlink::router::RedirectRouter;
use cardlink::shutdown::ShutdownSignal;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Initialize Logging
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cardlink=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Load Configuration
    let config = CardlinkConfig::load()?;

    // 3. Long-lived clients, shared by every request
    let services = config.build_services()?;
    let (emitter, worker) =
        TapEmitter::spawn(services.sink, config.emitter.emitter_config());

    let router = RedirectRouter::new(
        services.store,
        Arc::new(emitter.clone()),
        Destinations::new(&config.redirect.base_url),
    )
    .with_route_tag(&config.redirect.route_tag)
    .with_lookup_timeout(config.store.lookup_timeout());

    let state = Arc::new(AppState::new(router).with_emitter(emitter));

    // 4. Start Server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(
        addr = %addr,
        base_url = %config.redirect.base_url,
        "cardlink listening"
    );

    let shutdown = ShutdownSignal::with_timeout(config.emitter.drain_timeout());
    let server_shutdown = shutdown.clone();
    axum::serve(
        listener,
        app(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { server_shutdown.wait().await })
    .await?;

    // 5. The app (and every emitter handle it held) is gone; flush taps
    worker.drain(shutdown.timeout()).await;

    info!("Shutdown complete");
    Ok(())
}
