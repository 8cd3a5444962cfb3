//! Semantic Search Backend CLI
//!
//! Command-line interface for running the search API and managing the index.

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use metrics_exporter_prometheus::PrometheusBuilder;
use semantic_search_backend::embedding::Embedder;
use semantic_search_backend::types::DocumentInput;
use semantic_search_backend::{
    api::HealthResponse, ApiConfig, ApiGatewayNotifier, ApiServer, AppState, BackendConfig,
    BedrockControl, BedrockEmbedder, BedrockRuntime, BedrockTextGenerator, ConfigurationSummary,
    CredentialSource, Error, NotificationSender, OpenSearchClient, Result, SearchNotifyFlow,
    SearchPipeline, Summarizer, TaskPool, TaskRegistry,
};

#[derive(Parser)]
#[command(name = "semantic-search")]
#[command(author, version, about = "Semantic search backend", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Output path for configuration file
        #[arg(short, long, default_value = "config.toml")]
        output: String,
    },

    /// Start the HTTP API
    Start {
        /// HTTP API listen address (overrides the config file)
        #[arg(long)]
        api_addr: Option<String>,
    },

    /// Check a running server's health
    Health {
        /// API endpoint to check
        #[arg(long, default_value = "http://localhost:8080")]
        endpoint: String,
    },

    /// Create the k-NN index
    CreateIndex,

    /// Print index stats and mapping
    IndexInfo,

    /// Check OpenSearch connectivity
    CheckOpensearch,

    /// Check Bedrock model access
    CheckBedrock,

    /// Embed and bulk-upload documents from a JSON Lines file
    Ingest {
        /// One document per line: {"title", "content", ...}
        path: String,
    },

    /// Summarize search results for a query
    Summarize {
        query: String,

        /// Number of hits fed to the model
        #[arg(short, long)]
        k: Option<usize>,
    },
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

/// File (when present), then environment.
fn load_config(path: &str) -> Result<BackendConfig> {
    let mut config = if Path::new(path).exists() {
        info!("Loading configuration from: {}", path);
        BackendConfig::load(path)?
    } else {
        info!("Using default configuration");
        BackendConfig::default()
    };
    config.apply_env()?;
    config.validate()?;
    Ok(config)
}

/// Outbound clients built once from configuration.
struct Clients {
    opensearch: OpenSearchClient,
    runtime: BedrockRuntime,
    control: BedrockControl,
    notifier: NotificationSender,
}

impl Clients {
    fn new(config: &BackendConfig) -> Self {
        let http = reqwest::Client::new();
        let credentials = CredentialSource::Environment;
        let region = config.aws.region.as_str();

        let opensearch = OpenSearchClient::new(
            http.clone(),
            credentials.clone(),
            region,
            config.opensearch.endpoint.as_deref(),
            config.opensearch.index_name.clone(),
        );
        let runtime = BedrockRuntime::new(
            http.clone(),
            credentials.clone(),
            region,
            &config.bedrock.runtime_url(region),
        );
        let control = BedrockControl::new(
            http.clone(),
            credentials.clone(),
            region,
            &config.bedrock.control_url(region),
        );
        let notifier = match config.websocket.endpoint.as_deref() {
            Some(endpoint) => NotificationSender::new(Arc::new(ApiGatewayNotifier::new(
                http, credentials, region, endpoint,
            ))),
            None => NotificationSender::disabled(),
        };

        Self {
            opensearch,
            runtime,
            control,
            notifier,
        }
    }

    fn embedder(&self, config: &BackendConfig) -> BedrockEmbedder {
        BedrockEmbedder::new(self.runtime.clone(), config.bedrock.embedding_model_id.clone())
    }

    fn summarizer(&self, config: &BackendConfig) -> Summarizer {
        Summarizer::new(
            Arc::new(self.embedder(config)),
            Arc::new(self.opensearch.clone()),
            Arc::new(BedrockTextGenerator::new(
                self.runtime.clone(),
                config.bedrock.text_model_id.clone(),
                config.bedrock.request_style,
            )),
        )
    }
}

fn install_metrics_exporter(address: &str) -> Result<()> {
    let addr: SocketAddr = address
        .parse()
        .map_err(|e| Error::Config(format!("invalid metrics address {}: {}", address, e)))?;
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| Error::Config(format!("failed to start metrics exporter: {}", e)))?;
    info!("Prometheus metrics on {}", addr);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_logging(cli.verbose);

    match cli.command {
        Commands::Init { output } => {
            info!("Initializing new configuration at: {}", output);
            let config = BackendConfig::default();
            config.save(&output)?;
            info!("Configuration saved successfully");
        }

        Commands::Start { api_addr } => {
            info!("Starting semantic search backend...");

            let mut config = load_config(&cli.config)?;
            if let Some(addr) = api_addr {
                config.server.listen_address = addr;
            }
            if !config.opensearch_configured() {
                warn!("OPENSEARCH_ENDPOINT not set, searches will fail");
            }
            if !config.websocket_configured() {
                warn!("WEBSOCKET_API_ENDPOINT not set, push notifications are disabled");
            }
            if config.metrics.enabled {
                install_metrics_exporter(&config.metrics.listen_address)?;
            }

            let clients = Clients::new(&config);
            let pipeline = SearchPipeline::new(
                Arc::new(clients.embedder(&config)),
                Arc::new(clients.opensearch.clone()),
                config.opensearch.search_k,
            );
            let flow = SearchNotifyFlow::new(pipeline.clone(), clients.notifier.clone());
            let registry = Arc::new(TaskRegistry::new(config.tasks.max_retained));
            let tasks = Arc::new(TaskPool::start(flow, registry, config.tasks.workers));

            let state = AppState {
                pipeline,
                notifier: clients.notifier.clone(),
                tasks: Arc::clone(&tasks),
                summarizer: clients.summarizer(&config),
                summary_k: config.bedrock.summary_k,
                configuration: ConfigurationSummary::from(&config),
            };
            let server = ApiServer::new(ApiConfig::from(&config.server), state);

            info!("Press Ctrl+C to stop");
            server
                .run_until(async {
                    if let Err(e) = signal::ctrl_c().await {
                        error!("Failed to listen for shutdown signal: {}", e);
                    }
                    info!("Received shutdown signal");
                })
                .await?;

            tasks.shutdown().await;
            info!("Server stopped");
        }

        Commands::Health { endpoint } => {
            info!("Checking server health at: {}", endpoint);
            let health_url = format!("{}/health", endpoint.trim_end_matches('/'));

            match tokio::time::timeout(Duration::from_secs(5), check_health(&health_url)).await {
                Ok(Ok(response)) => {
                    info!("Status: {}", response.status);
                    info!("Service: {}", response.service);
                    let c = &response.configuration;
                    info!("OpenSearch configured: {}", c.opensearch_configured);
                    info!("WebSocket configured: {}", c.websocket_configured);
                    info!("Embedding model: {}", c.bedrock_model);
                    info!("Region: {} / index: {}", c.aws_region, c.index_name);
                }
                Ok(Err(e)) => {
                    error!("Health check failed: {}", e);
                    std::process::exit(1);
                }
                Err(_) => {
                    error!("Health check timed out");
                    std::process::exit(1);
                }
            }
        }

        Commands::CreateIndex => {
            let config = load_config(&cli.config)?;
            let clients = Clients::new(&config);
            clients.opensearch.create_index().await?;
            info!(
                "Index '{}' created successfully",
                clients.opensearch.index_name()
            );
        }

        Commands::IndexInfo => {
            let config = load_config(&cli.config)?;
            let clients = Clients::new(&config);
            let info = clients.opensearch.index_info().await?;
            println!("Index: {}", info.index_name);
            if let Some(count) = info.doc_count() {
                println!("Documents: {}", count);
            }
            if let Some(bytes) = info.store_size_bytes() {
                println!("Store size: {} bytes", bytes);
            }
            println!("Stats:\n{}", serde_json::to_string_pretty(&info.stats)?);
            println!("Mapping:\n{}", serde_json::to_string_pretty(&info.mapping)?);
        }

        Commands::CheckOpensearch => {
            let config = load_config(&cli.config)?;
            let clients = Clients::new(&config);
            match clients.opensearch.cluster_health().await {
                Ok(health) => {
                    info!("Cluster status: {}", health.status);
                    info!("Nodes: {}", health.number_of_nodes);
                }
                Err(e) => {
                    error!("OpenSearch connection failed: {}", e);
                    std::process::exit(1);
                }
            }
            match clients.opensearch.index_info().await {
                Ok(info) => match info.doc_count() {
                    Some(count) => info!("Index '{}' holds {} documents", info.index_name, count),
                    None => warn!("Index '{}' is not available: {}", info.index_name, info.stats),
                },
                Err(e) => warn!("Could not read index stats: {}", e),
            }
        }

        Commands::CheckBedrock => {
            let config = load_config(&cli.config)?;
            let clients = Clients::new(&config);
            match clients.control.list_embedding_models().await {
                Ok(models) => {
                    info!("Available embedding models: {}", models.len());
                    for model in models {
                        info!(
                            "  {} ({})",
                            model.model_id,
                            model.model_name.as_deref().unwrap_or("unnamed")
                        );
                    }
                }
                Err(e) => warn!("Could not list foundation models: {}", e),
            }
            match clients.embedder(&config).test_connection().await {
                Ok(report) => info!(
                    "Embedding model {} in {} returned {} dimensions",
                    report.model_id, report.region, report.dimensions
                ),
                Err(e) => {
                    error!("Bedrock embedding failed: {}", e);
                    std::process::exit(1);
                }
            }
        }

        Commands::Ingest { path } => {
            let config = load_config(&cli.config)?;
            let clients = Clients::new(&config);
            let inputs = read_documents(&path)?;
            info!("Read {} documents from {}", inputs.len(), path);

            let embedder = clients.embedder(&config);
            let texts: Vec<String> = inputs.iter().map(|doc| doc.content.clone()).collect();
            let embeddings = embedder.embed_batch(&texts).await;

            let documents: Vec<_> = inputs
                .into_iter()
                .zip(embeddings)
                .filter_map(|(input, embedding)| match embedding {
                    Some(embedding) => Some(input.into_document(embedding)),
                    None => {
                        warn!("Skipping '{}': no embedding", input.title);
                        None
                    }
                })
                .collect();

            let report = clients.opensearch.bulk_add(&documents).await?;
            info!(
                "Uploaded {} documents ({} failed)",
                report.submitted, report.failed
            );
            if !report.is_success() {
                std::process::exit(1);
            }
        }

        Commands::Summarize { query, k } => {
            let config = load_config(&cli.config)?;
            let clients = Clients::new(&config);
            let k = k.unwrap_or(config.bedrock.summary_k);
            let summary = clients.summarizer(&config).summarize(&query, k).await?;
            println!("{}", summary);
        }
    }

    Ok(())
}

/// Parse a JSON Lines file, skipping blank lines.
fn read_documents(path: &str) -> Result<Vec<DocumentInput>> {
    let content = std::fs::read_to_string(path)?;
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(number, line)| {
            serde_json::from_str(line)
                .map_err(|e| Error::Config(format!("{}:{}: {}", path, number + 1, e)))
        })
        .collect()
}

/// Fetch `/health` from a running server.
async fn check_health(url: &str) -> Result<HealthResponse> {
    let response = reqwest::get(url).await?.error_for_status()?;
    Ok(response.json().await?)
}
