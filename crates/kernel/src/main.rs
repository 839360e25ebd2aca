//! Ossatura server binary and plugin CLI.

use std::time::Duration;

use anyhow::{Context, Result};
use axum::http::HeaderValue;
use axum::Router;
use clap::{Parser, Subcommand};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ossatura_kernel::middleware::{apm, auth};
use ossatura_kernel::{jobs, routes, AppState, Config};

/// Request timeout for HTTP handlers.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "ossatura", about = "Modular CMS kernel", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default).
    Serve,

    /// Manage plugins from the command line.
    Plugin {
        #[command(subcommand)]
        action: PluginAction,
    },
}

#[derive(Subcommand)]
enum PluginAction {
    /// List discovered and installed plugins.
    List,

    /// Record a discovered plugin as installed.
    Install { slug: String },

    /// Activate an installed plugin, running its migrations.
    Activate { slug: String },

    /// Deactivate a plugin, rolling back its migrations.
    Deactivate { slug: String },

    /// Delete a plugin.
    Delete {
        slug: String,

        /// Keep the plugin's files on disk.
        #[arg(long)]
        keep_files: bool,
    },

    /// Check for and apply an available update.
    Update { slug: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        None | Some(Command::Serve) => serve(config).await,
        Some(Command::Plugin { action }) => run_plugin_command(config, action).await,
    }
}

async fn serve(config: Config) -> Result<()> {
    let port = config.port;
    let cors = build_cors(&config)?;
    let state = AppState::new(config).await?;

    jobs::spawn_email_worker(state.clone());
    jobs::spawn_retention_worker(state.clone());

    let api = routes::api_router().layer(axum::middleware::from_fn_with_state(
        state.clone(),
        auth::require_bearer_auth,
    ));

    let app = Router::new()
        .merge(routes::health::router())
        .nest("/api", api)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            apm::track_request,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(cors)
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("failed to bind port {port}"))?;

    info!(port, "ossatura listening");

    axum::serve(listener, app)
        .await
        .context("server exited with error")?;

    Ok(())
}

fn build_cors(config: &Config) -> Result<CorsLayer> {
    let cors = if config.cors_allowed_origins.iter().any(|o| o == "*") {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> = config
            .cors_allowed_origins
            .iter()
            .map(|o| o.parse().context("invalid CORS origin"))
            .collect::<Result<_>>()?;
        CorsLayer::new().allow_origin(AllowOrigin::list(origins))
    };

    Ok(cors
        .allow_methods(Any)
        .allow_headers(Any))
}

async fn run_plugin_command(config: Config, action: PluginAction) -> Result<()> {
    let state = AppState::new(config).await?;

    match action {
        PluginAction::List => {
            let discovered = state.plugins().discover().await?;
            let active = state.plugins().active_slugs();
            for (slug, manifest) in &discovered {
                let marker = if active.contains(slug) {
                    "active"
                } else {
                    "inactive"
                };
                println!("{slug}\t{}\t{marker}", manifest.version);
            }
        }
        PluginAction::Install { slug } => {
            let record = state.plugins().install(&slug).await?;
            println!("installed {} {}", record.slug, record.version);
        }
        PluginAction::Activate { slug } => {
            let applied = state.plugins().activate(&slug).await?;
            println!("activated {slug} ({} migrations applied)", applied.len());
        }
        PluginAction::Deactivate { slug } => {
            let report = state.plugins().deactivate(&slug).await?;
            println!(
                "deactivated {slug} ({} rolled back)",
                report.rolled_back.len()
            );
            for err in report.rollback_errors {
                eprintln!("rollback error: {err}");
            }
        }
        PluginAction::Delete { slug, keep_files } => {
            state.plugins().delete(&slug, !keep_files).await?;
            println!("deleted {slug}");
        }
        PluginAction::Update { slug } => {
            if state.updates().update(&slug).await? {
                println!("updated {slug}");
            } else {
                println!("{slug} is already up to date");
            }
        }
    }

    Ok(())
}
