use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::filter::LevelFilter;

use domainlock::config::init_config;
use domainlock::server::database::Database;
use domainlock::server::notify::PiracyNotifier;
use domainlock::server::routes::build_router;
use domainlock::server::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration first so a broken config fails fast.
    let config = init_config()?;

    tracing_subscriber::fmt()
        .with_max_level(LevelFilter::from_str(&config.logging.level).unwrap_or(LevelFilter::INFO))
        .init();

    // Database + schema
    let db = Database::new().await?;
    db.migrate().await?;

    // Piracy alert channel
    let notifier = PiracyNotifier::from_config()?;
    if notifier.is_disabled() {
        info!("Piracy alert delivery is disabled (no webhook URL configured)");
    }

    let state = AppState {
        db,
        notifier: Arc::new(notifier),
    };

    let app = build_router(state);

    let addr = SocketAddr::new(config.server.host.parse()?, config.server.port);
    info!("Listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
