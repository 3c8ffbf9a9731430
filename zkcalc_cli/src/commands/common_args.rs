use anyhow::Context;
use clap::Args;
use std::{path::PathBuf, sync::Arc};
use zkcalc_host::{BackendConfig, ZkCalc, ZkCalcConfig};

/// Options shared by every subcommand that touches the core.
#[derive(Clone, Args)]
pub struct CoreOptions {
    /// JSON configuration file. Missing fields keep their defaults.
    #[arg(long, env = "ZKCALC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Project root the default layout is derived from.
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Directory proof artifacts are written to.
    #[arg(long)]
    pub artifact_dir: Option<PathBuf>,

    /// Prove with an external host prover binary instead of dev mode.
    #[arg(long)]
    pub prover: Option<PathBuf>,

    /// Passphrase unlocking the signing keys.
    #[arg(long, env = "ZKCALC_PASSPHRASE", hide_env_values = true)]
    pub passphrase: Option<String>,

    /// Profiling granularity.
    /// Setting any value restricts logs to profiling information
    #[arg(long)]
    pub profiling: Option<usize>,
}

impl CoreOptions {
    /// Try set up the logger based on the verbosity level
    pub fn try_setup_logger(&self) {
        use tracing_forest::ForestLayer;
        use tracing_subscriber::{
            filter::{filter_fn, LevelFilter},
            fmt,
            layer::SubscriberExt,
            util::SubscriberInitExt,
            EnvFilter, Registry,
        };

        let default_filter = EnvFilter::builder()
            .with_default_directive(LevelFilter::INFO.into())
            .from_env_lossy();

        // spans with level i contain the field "profiling_{i}"
        let profiling_level = self.profiling.unwrap_or(1);
        let filter_by_profiling_level = filter_fn(move |metadata| {
            (1..=profiling_level)
                .map(|i| format!("profiling_{i}"))
                .any(|field| metadata.fields().field(&field).is_some())
        });

        let fmt_layer = fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_thread_ids(false)
            .with_thread_names(false)
            .without_time();

        Registry::default()
            .with(self.profiling.is_some().then_some(ForestLayer::default()))
            .with(fmt_layer)
            .with(
                self.profiling
                    .is_some()
                    .then_some(filter_by_profiling_level),
            )
            .with(self.profiling.is_none().then_some(default_filter))
            .try_init()
            .ok();
    }

    pub fn load_config(&self) -> anyhow::Result<ZkCalcConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .context(format!("failed to read {}", path.display()))?;
                serde_json::from_str(&text)
                    .context(format!("failed to parse config {}", path.display()))?
            }
            None => match &self.root {
                Some(root) => ZkCalcConfig::with_root(root),
                None => ZkCalcConfig::default(),
            },
        };
        if let Some(dir) = &self.artifact_dir {
            config.artifact_dir = dir.clone();
        }
        if let Some(program) = &self.prover {
            config.backend = BackendConfig::External {
                program: program.clone(),
                args: vec![],
            };
        }
        if self.passphrase.is_some() {
            config.passphrase = self.passphrase.clone();
        }
        Ok(config)
    }

    /// Sets up logging and wires the core from the resolved configuration.
    pub fn init(&self) -> anyhow::Result<ZkCalc> {
        self.try_setup_logger();
        let config = self.load_config()?;
        tracing::debug!(backend = ?config.backend, "loaded configuration");
        Ok(ZkCalc::new(Arc::new(config)))
    }
}
