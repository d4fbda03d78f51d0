//! ClickHouse operator - converges ClickHouseInstallation resources

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use kube::{Api, Client, CustomResourceExt};
use tokio_util::sync::CancellationToken;

use clickhouse_operator::clickhouse::{ConnectionPool, SqlClusterAdmin};
use clickhouse_operator::config::OperatorConfig;
use clickhouse_operator::controller::{
    KubeEventPublisher, KubeStatusWriter, ObjectStores, Runner, Worker,
};
use clickhouse_operator::crd::ClickHouseInstallation;
use clickhouse_operator::generator::{files_generator, FilesGeneratorKind};
use clickhouse_operator::telemetry::init_tracing;
use clickhouse_operator::FIELD_MANAGER;

/// ClickHouse operator - converges ClickHouseInstallation resources
#[derive(Parser, Debug)]
#[command(name = "clickhouse-operator", version, about, long_about = None)]
struct Cli {
    /// Print the CRD manifest and exit
    #[arg(long)]
    crd: bool,

    /// Operator configuration file (YAML)
    #[arg(long, env = "CHOP_CONFIG")]
    config: Option<PathBuf>,

    /// Namespace to watch; repeat for several, omit for all namespaces
    #[arg(long = "watch-namespace", env = "WATCH_NAMESPACES", value_delimiter = ',')]
    watch_namespaces: Vec<String>,

    /// Number of reconcile workers
    #[arg(long)]
    workers: Option<usize>,

    /// Emit JSON logs
    #[arg(long)]
    log_json: bool,
}

impl Cli {
    fn load_config(&self) -> anyhow::Result<OperatorConfig> {
        let mut config = match &self.config {
            Some(path) => OperatorConfig::from_file(path)?,
            None => OperatorConfig::default(),
        };
        if !self.watch_namespaces.is_empty() {
            config.watch_namespaces = self.watch_namespaces.clone();
        }
        if let Some(workers) = self.workers {
            config.reconcile.workers = workers;
        }
        config.log_json |= self.log_json;
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        eprintln!("CRITICAL: failed to install crypto provider: {e:?}");
        std::process::exit(1);
    }

    let cli = Cli::parse();

    if cli.crd {
        let crd = serde_yaml::to_string(&ClickHouseInstallation::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        println!("{crd}");
        return Ok(());
    }

    let config = cli.load_config()?;
    init_tracing(config.log_json);

    run_controller(config).await
}

/// The operator installs its own CRD on startup using server-side apply so
/// the schema always matches the binary.
async fn ensure_crd_installed(client: &Client) -> anyhow::Result<()> {
    use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1 as apiext;
    use kube::api::{Patch, PatchParams};

    let crds: Api<apiext::CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(FIELD_MANAGER).force();

    tracing::info!("Installing ClickHouseInstallation CRD...");
    crds.patch(
        "clickhouseinstallations.clickhouse.altinity.com",
        &params,
        &Patch::Apply(&ClickHouseInstallation::crd()),
    )
    .await
    .map_err(|e| anyhow::anyhow!("Failed to install ClickHouseInstallation CRD: {}", e))?;
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "cannot listen for SIGTERM");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

async fn run_controller(config: OperatorConfig) -> anyhow::Result<()> {
    tracing::info!(
        workers = config.reconcile.workers,
        namespaces = ?config.watch_namespaces,
        "ClickHouse operator starting..."
    );

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    ensure_crd_installed(&client).await?;

    let admin = SqlClusterAdmin::new(Arc::new(ConnectionPool::new()), config.clickhouse.clone());
    let worker = Worker::new(
        ObjectStores::kube(client.clone(), config.reconcile.call_timeout()),
        Arc::new(KubeStatusWriter::new(client.clone())),
        Arc::new(KubeEventPublisher::new(client.clone(), FIELD_MANAGER)),
        Arc::new(admin),
        Arc::from(files_generator(FilesGeneratorKind::ClickHouse)),
        config.defaults.clone(),
    );
    let runner = Runner::new(worker, config.reconcile.clone(), config.watch_namespaces.clone());

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("shutdown signal received");
        trigger.cancel();
    });

    runner.run(client, shutdown).await;

    tracing::info!("ClickHouse operator shutting down");
    Ok(())
}
