use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use toolgate::{config, repl, server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();

    let cwd = std::env::current_dir()?;
    let config_path = config::find_config_path(&cwd)?;
    let config = config::load_config(&config_path)?;
    tracing::info!(path = %config_path.display(), "configuration loaded");

    match std::env::args().nth(1).as_deref() {
        Some("repl") => repl::run(config).await,
        Some("serve") | None => server::serve(config).await,
        Some(other) => {
            anyhow::bail!("unknown mode '{other}' (expected 'serve' or 'repl')")
        }
    }
}
