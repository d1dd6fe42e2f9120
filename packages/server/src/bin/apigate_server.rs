//! `apigate-server`: serves the API over HTTP(S) with in-memory storage.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use apigate_server::network::{NetworkConfig, NetworkModule, TlsConfig};
use apigate_server::service::domain::register_default_routes;
use apigate_server::service::{
    ApiRegistry, Collaborators, DispatchPipeline, FanoutLogSink, FeatureFlags, JsonLinesSink,
    LogSink, ServerConfig, TracingLogSink,
};
use apigate_server::storage::{Fixtures, InMemoryStore};
use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "apigate-server")]
#[command(version, about, long_about = None)]
struct Args {
    #[arg(long, env = "APIGATE_HOST", default_value = "0.0.0.0")]
    host: String,

    #[arg(long, env = "APIGATE_PORT", default_value_t = 8080)]
    port: u16,

    /// PEM certificate; enables TLS together with `--tls-key`.
    #[arg(long, env = "APIGATE_TLS_CERT", requires = "tls_key")]
    tls_cert: Option<PathBuf>,

    #[arg(long, env = "APIGATE_TLS_KEY", requires = "tls_cert")]
    tls_key: Option<PathBuf>,

    /// `tracing` filter directive, e.g. `info,apigate::api=info`.
    #[arg(long, env = "APIGATE_LOG", default_value = "info")]
    log_level: String,

    #[arg(long, env = "APIGATE_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Also append one JSON line per API request to this file.
    #[arg(long, env = "APIGATE_API_LOG")]
    api_log: Option<PathBuf>,

    /// JSON file with users, projects, groups and tokens to load at startup.
    #[arg(long, env = "APIGATE_FIXTURES")]
    fixtures: Option<PathBuf>,

    #[arg(long, env = "APIGATE_API_PREFIX", default_value = "/api")]
    api_prefix: String,

    #[arg(long, env = "APIGATE_API_VERSIONS", value_delimiter = ',', default_value = "v4")]
    api_versions: Vec<String>,

    #[arg(long, env = "APIGATE_HANDLER_TIMEOUT_SECS", default_value_t = 60)]
    handler_timeout_secs: u64,

    #[arg(long, env = "APIGATE_REQUEST_TIMEOUT_SECS", default_value_t = 90)]
    request_timeout_secs: u64,

    #[arg(long, env = "APIGATE_MAX_CONCURRENT", default_value_t = 1000)]
    max_concurrent_handlers: u32,

    /// Feature flags to switch off, comma separated.
    #[arg(long, env = "APIGATE_DISABLED_FLAGS", value_delimiter = ',')]
    disable_flag: Vec<String>,
}

fn init_tracing(args: &Args) {
    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    match args.log_format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
    }
}

fn server_config(args: &Args) -> anyhow::Result<ServerConfig> {
    let mut config = ServerConfig {
        api_prefix: args.api_prefix.clone(),
        api_versions: args.api_versions.clone(),
        handler_timeout: Duration::from_secs(args.handler_timeout_secs),
        max_concurrent_handlers: args.max_concurrent_handlers,
        ..ServerConfig::default()
    };
    for flag in &args.disable_flag {
        config.feature_flags.insert(flag.clone(), false);
    }
    config.validate().context("invalid server configuration")?;
    Ok(config)
}

fn log_sink(args: &Args) -> anyhow::Result<Arc<dyn LogSink>> {
    let mut sinks = FanoutLogSink::new(vec![Arc::new(TracingLogSink)]);
    if let Some(path) = &args.api_log {
        let file = JsonLinesSink::open(path)
            .with_context(|| format!("failed to open api log {}", path.display()))?;
        sinks.add(Arc::new(file));
    }
    Ok(Arc::new(sinks))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&args);

    let mut config = server_config(&args)?;
    let store = Arc::new(InMemoryStore::new());
    if let Some(path) = &args.fixtures {
        let fixtures = Fixtures::from_path(path)?;
        fixtures.seed(&store);
        for (flag, enabled) in &fixtures.feature_flags {
            config.feature_flags.entry(flag.clone()).or_insert(*enabled);
        }
    }
    let features = Arc::new(FeatureFlags::new(config.feature_flags.clone()));

    let mut registry = ApiRegistry::new(&config);
    register_default_routes(&mut registry, &store);
    info!(routes = registry.len(), "api routes registered");

    let pipeline = DispatchPipeline::new(
        config,
        registry,
        Collaborators::in_memory(&store, features),
        log_sink(&args)?,
    );

    let network = NetworkConfig {
        host: args.host.clone(),
        port: args.port,
        tls: args
            .tls_cert
            .clone()
            .zip(args.tls_key.clone())
            .map(|(cert_path, key_path)| TlsConfig {
                cert_path,
                key_path,
            }),
        request_timeout: Duration::from_secs(args.request_timeout_secs),
        ..NetworkConfig::default()
    };

    let mut module = NetworkModule::new(network, pipeline);
    let port = module.start().await?;
    info!(port, "apigate-server started");

    module
        .serve(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
}
