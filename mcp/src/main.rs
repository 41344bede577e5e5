use std::path::PathBuf;

use clap::{Parser, Subcommand};
use cogniz_core::config::{
    ConfigError, ConfigLayer, ConfigSources, CredentialMode, ResolvedConfig, default_config_path,
    load_config_file, resolve,
};
use cogniz_mcp_runtime::transport::API_PREFIX;
use cogniz_mcp_runtime::{
    Dispatcher, McpServer, RuntimeDefaults, STDIO_PLATFORM, operations, serve_stdio,
    to_pretty_json,
};
use serde_json::json;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(
    name = "cogniz-mcp",
    version,
    about = "Cogniz memory MCP server over stdio"
)]
struct Cli {
    /// Config file with api_key, base_url and project_id
    #[arg(long, env = "COGNIZ_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// API key (overrides COGNIZ_API_KEY and the config file)
    #[arg(long, global = true)]
    api_key: Option<String>,

    /// Platform base URL (overrides COGNIZ_BASE_URL and the config file)
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Default project for stores and searches (overrides COGNIZ_PROJECT_ID)
    #[arg(long, global = true)]
    project_id: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Commands {
    /// Serve MCP over stdin/stdout (default)
    Serve,
    /// Print the resolved configuration with the API key redacted
    ShowConfig,
}

impl Cli {
    fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(default_config_path)
    }

    /// A broken config file is only fatal when nothing else supplies the key.
    fn sources(&self, env: ConfigLayer) -> Result<ConfigSources, ConfigError> {
        let file_path = self.config_path();
        let explicit = ConfigLayer {
            api_key: self.api_key.clone(),
            base_url: self.base_url.clone(),
            project_id: self.project_id.clone(),
        };
        let key_elsewhere = [&explicit.api_key, &env.api_key]
            .into_iter()
            .flatten()
            .any(|key| !key.trim().is_empty());
        let file = match load_config_file(&file_path) {
            Ok(file) => file,
            Err(err) if key_elsewhere => {
                tracing::warn!(event = "config_file_ignored", error = %err, "Ignoring unreadable config file");
                None
            }
            Err(err) => return Err(err),
        };
        Ok(ConfigSources {
            explicit,
            env,
            file,
            file_path: Some(file_path),
        })
    }
}

#[tokio::main]
async fn main() {
    // Load .env if present (dev only)
    let _ = dotenvy::dotenv();

    // stdout carries the protocol; logs go to stderr
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cogniz_mcp=info,cogniz_mcp_runtime=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false),
        )
        .init();

    let cli = Cli::parse();
    let code = run(cli).await;
    std::process::exit(code);
}

async fn run(cli: Cli) -> i32 {
    let config = match cli
        .sources(ConfigLayer::from_env())
        .and_then(|sources| resolve(&sources, CredentialMode::Required))
    {
        Ok(config) => config,
        Err(err) => {
            report_fatal("config_error", &err.to_string());
            return 1;
        }
    };

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::ShowConfig => {
            println!("{}", to_pretty_json(&config_summary(&config, &cli.config_path())));
            0
        }
        Commands::Serve => {
            // Required mode guarantees a credential
            let Some(credential) = config.credential.clone() else {
                report_fatal("config_error", "No Cogniz API key configured");
                return 1;
            };
            let tools: Vec<&str> = operations::tool_names().collect();
            tracing::info!(
                event = "mcp_server_starting",
                api_base = %format!("{}{API_PREFIX}", config.endpoint_display()),
                config_path = %cli.config_path().display(),
                default_project = %config.default_project_id,
                tools = %tools.join(", "),
                "Starting Cogniz MCP server on stdio"
            );

            let dispatcher = Dispatcher::new(RuntimeDefaults::from_config(&config, STDIO_PLATFORM));
            match serve_stdio(McpServer::new(dispatcher), credential).await {
                Ok(()) => {
                    tracing::info!(event = "mcp_server_stopped", "stdin closed");
                    0
                }
                Err(err) => {
                    report_fatal("mcp_server_error", &err);
                    1
                }
            }
        }
    }
}

fn config_summary(config: &ResolvedConfig, config_path: &std::path::Path) -> serde_json::Value {
    json!({
        "base_url": config.endpoint_display(),
        "api_root": format!("{}{API_PREFIX}", config.endpoint_display()),
        "default_project_id": config.default_project_id,
        "api_key_configured": config.credential.is_some(),
        "config_path": config_path.display().to_string(),
    })
}

fn report_fatal(code: &str, message: &str) {
    let payload = json!({
        "error": code,
        "message": message,
    });
    eprintln!("{}", to_pretty_json(&payload));
}
