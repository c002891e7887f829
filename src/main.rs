use anyhow::Context;
use clap::{Parser, Subcommand};
use gql_telemetry::complexity::ComplexityEstimator;
use gql_telemetry::config::{Config, TelemetryConfig};
use gql_telemetry::graphql::create_schema;
use gql_telemetry::metrics::{self, RecorderSink};
use gql_telemetry::observer::ExecutionObserver;
use gql_telemetry::signature::compute_signature;
use gql_telemetry::tags::{CollatedTagsProvider, NoopTagsProvider, TagsProvider};
use gql_telemetry::{document, logging, server};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "gql-telemetry")]
#[command(about = "GraphQL execution telemetry: demo server and query inspection tools")]
#[command(version)]
struct Cli {
    /// TOML configuration file with a [telemetry] table
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the instrumented demo schema with a /metrics endpoint
    Serve {
        #[arg(long, default_value_t = 8080)]
        port: u16,
        #[arg(long, default_value = "logs")]
        log_dir: PathBuf,
    },
    /// Print the query signature and its hash
    Signature {
        /// File containing the GraphQL document
        query_file: PathBuf,
        #[arg(long)]
        operation_name: Option<String>,
    },
    /// Print the complexity score and bucket
    Complexity {
        /// File containing the GraphQL document
        query_file: PathBuf,
        #[arg(long)]
        operation_name: Option<String>,
        /// Variables as a JSON object, used by @skip/@include
        #[arg(long)]
        variables: Option<String>,
    },
}

fn load_config(path: Option<&Path>) -> anyhow::Result<TelemetryConfig> {
    match path {
        Some(path) => Ok(Config::load(path)?.telemetry),
        None => Ok(TelemetryConfig::default()),
    }
}

fn read_query(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read query file '{}'", path.display()))
}

fn build_observer(config: &TelemetryConfig) -> Arc<ExecutionObserver> {
    let tags_provider: Arc<dyn TagsProvider> = if config.outcome_tags {
        Arc::new(CollatedTagsProvider::new().with_outcome_tags())
    } else {
        Arc::new(NoopTagsProvider)
    };
    Arc::new(
        ExecutionObserver::builder(Arc::new(RecorderSink::new()))
            .config(config)
            .tags_provider(tags_provider)
            .build(),
    )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { port, log_dir } => {
            let _guard = logging::init_logging(&log_dir, "gql-telemetry.log")?;

            let observer = if config.enabled {
                if let Err(e) = metrics::install_prometheus_recorder() {
                    warn!(error = %e, "Continuing without a Prometheus recorder");
                }
                Some(build_observer(&config))
            } else {
                info!("Telemetry disabled by configuration");
                None
            };

            let schema = create_schema(observer, &config);
            server::start_server(schema, port).await?;
        }
        Commands::Signature {
            query_file,
            operation_name,
        } => {
            let query = read_query(&query_file)?;
            let doc = document::parse(&query)?;
            let signature = compute_signature(&doc, operation_name.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&signature)?);
        }
        Commands::Complexity {
            query_file,
            operation_name,
            variables,
        } => {
            let query = read_query(&query_file)?;
            let doc = document::parse(&query)?;
            let variables = match variables {
                Some(raw) => match serde_json::from_str(&raw)? {
                    serde_json::Value::Object(map) => Some(map),
                    _ => anyhow::bail!("--variables must be a JSON object"),
                },
                None => None,
            };

            let estimator = ComplexityEstimator::new(config.complexity_buckets.clone());
            let score = estimator.score(&doc, operation_name.as_deref(), variables.as_ref())?;
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "score": score,
                    "bucket": estimator.bucket(score),
                }))?
            );
        }
    }

    Ok(())
}
