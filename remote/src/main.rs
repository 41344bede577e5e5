use std::net::{IpAddr, SocketAddr};

use axum::Router;
use clap::Parser;
use cogniz_core::config::{ConfigLayer, ConfigSources, CredentialMode, ResolvedConfig, resolve};
use cogniz_mcp_runtime::transport::API_PREFIX;
use cogniz_mcp_runtime::{Dispatcher, McpServer, REMOTE_PLATFORM, RuntimeDefaults, to_pretty_json};
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod middleware;
mod routes;
mod state;

use state::{AppState, Tenancy};

#[derive(Parser, Debug)]
#[command(
    name = "cogniz-remote",
    version,
    about = "Cogniz memory MCP server over streamable HTTP"
)]
struct Cli {
    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 3000)]
    port: u16,

    /// Address to bind
    #[arg(long, env = "COGNIZ_BIND", default_value = "0.0.0.0")]
    bind: IpAddr,

    /// Use the process API key for every request and ignore request credentials
    #[arg(long, env = "COGNIZ_SINGLE_TENANT")]
    single_tenant: bool,

    /// Process API key; a per-request fallback unless --single-tenant is set
    #[arg(long)]
    api_key: Option<String>,

    /// Platform base URL (overrides COGNIZ_BASE_URL)
    #[arg(long)]
    base_url: Option<String>,

    /// Default project for stores and searches (overrides COGNIZ_PROJECT_ID)
    #[arg(long)]
    project_id: Option<String>,
}

impl Cli {
    fn tenancy(&self) -> Tenancy {
        if self.single_tenant {
            Tenancy::Single
        } else {
            Tenancy::Multi
        }
    }

    fn sources(&self, env: ConfigLayer) -> ConfigSources {
        ConfigSources {
            explicit: ConfigLayer {
                api_key: self.api_key.clone(),
                base_url: self.base_url.clone(),
                project_id: self.project_id.clone(),
            },
            env,
            file: None,
            file_path: None,
        }
    }

    fn credential_mode(&self) -> CredentialMode {
        match self.tenancy() {
            Tenancy::Single => CredentialMode::Required,
            Tenancy::Multi => CredentialMode::Optional,
        }
    }
}

pub(crate) fn app(state: AppState) -> Router {
    Router::new()
        .merge(routes::health::router())
        .merge(routes::mcp_http::router())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::cors::build_cors_layer()),
        )
        .with_state(state)
}

fn build_state(config: &ResolvedConfig, tenancy: Tenancy) -> AppState {
    let dispatcher = Dispatcher::new(RuntimeDefaults::from_config(config, REMOTE_PLATFORM));
    AppState::new(McpServer::new(dispatcher), tenancy, config.credential.clone())
}

#[tokio::main]
async fn main() {
    // Load .env if present (dev only)
    let _ = dotenvy::dotenv();

    // Structured JSON logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "cogniz_remote=info,cogniz_mcp_runtime=info,tower_http=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let cli = Cli::parse();
    std::process::exit(run(cli).await);
}

async fn run(cli: Cli) -> i32 {
    let config = match resolve(&cli.sources(ConfigLayer::from_env()), cli.credential_mode()) {
        Ok(config) => config,
        Err(err) => {
            report_fatal("config_error", &err.to_string());
            return 1;
        }
    };

    let tenancy = cli.tenancy();
    let app = app(build_state(&config, tenancy));

    let addr = SocketAddr::new(cli.bind, cli.port);
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            report_fatal("bind_error", &format!("Could not bind {addr}: {err}"));
            return 1;
        }
    };

    tracing::info!(
        event = "remote_server_listening",
        addr = %addr,
        tenancy = tenancy.as_str(),
        api_base = %format!("{}{API_PREFIX}", config.endpoint_display()),
        default_project = %config.default_project_id,
        fallback_key = config.credential.is_some(),
        "Cogniz MCP server listening"
    );

    match axum::serve(listener, app).await {
        Ok(()) => 0,
        Err(err) => {
            report_fatal("server_error", &err.to_string());
            1
        }
    }
}

fn report_fatal(code: &str, message: &str) {
    let payload = json!({
        "error": code,
        "message": message,
    });
    eprintln!("{}", to_pretty_json(&payload));
}
