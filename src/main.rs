use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use csvsearch::census::{CensusSource, Lookup};
use csvsearch::server::{AppState, router};
use csvsearch::settings::Settings;
use csvsearch::source::CsvSource;

#[tokio::main]
async fn main() {
    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&settings.log_level)),
        )
        .init();
    if let Err(e) = run(settings).await {
        error!(error = %e, "server stopped");
        std::process::exit(1);
    }
}

async fn run(settings: Settings) -> csvsearch::Result<()> {
    let census = CensusSource::new(&settings.census_base_url)?;
    let state = AppState::new(
        CsvSource::new(&settings.data_dir),
        Lookup::new(census, settings.cache_max_entries, settings.cache_ttl()),
    );
    let listener = tokio::net::TcpListener::bind(settings.bind_address()).await?;
    info!(
        address = %settings.bind_address(),
        data_dir = %settings.data_dir.display(),
        "Server started"
    );
    axum::serve(listener, router(state)).await?;
    Ok(())
}
