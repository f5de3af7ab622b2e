use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use mrk_config::{Config, LoadedConfig};
use mrk_engine::PromotionRequest;
use mrk_registry::RegistryStore;

#[derive(Parser)]
#[command(name = "mrk")]
#[command(about = "Model registry: promote the best candidate to production", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Select the best candidate by the primary metric and promote it
    Promote {
        /// Layered config paths in merge order (later overrides earlier)
        #[arg(long = "config")]
        config_paths: Vec<PathBuf>,

        #[arg(long)]
        models_dir: Option<PathBuf>,

        #[arg(long)]
        metrics_dir: Option<PathBuf>,

        #[arg(long)]
        registry_dir: Option<PathBuf>,

        /// Metric used to rank candidates (default from config, e.g. pr_auc)
        #[arg(long)]
        primary_metric: Option<String>,

        /// Candidate name to consider; repeat for several. Overrides config.
        #[arg(long = "candidate")]
        candidates: Vec<String>,

        /// Production alias file name inside the models dir
        #[arg(long)]
        alias: Option<String>,
    },

    /// Registry inspection
    Registry {
        #[command(subcommand)]
        cmd: RegistryCmd,
    },

    /// Audit trail utilities
    Audit {
        #[command(subcommand)]
        cmd: AuditCmd,
    },

    /// Compute layered config hash
    ConfigHash {
        /// Paths in merge order (base -> overrides)
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
}

#[derive(Subcommand)]
enum RegistryCmd {
    /// Print the current production entry
    Status {
        #[arg(long)]
        registry_dir: Option<PathBuf>,

        #[arg(long = "config")]
        config_paths: Vec<PathBuf>,
    },

    /// Print the promotion history in promotion order
    History {
        #[arg(long)]
        registry_dir: Option<PathBuf>,

        #[arg(long = "config")]
        config_paths: Vec<PathBuf>,
    },
}

#[derive(Subcommand)]
enum AuditCmd {
    /// Verify the registry audit log hash chain
    Verify {
        #[arg(long)]
        registry_dir: Option<PathBuf>,

        #[arg(long = "config")]
        config_paths: Vec<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Promote {
            config_paths,
            models_dir,
            metrics_dir,
            registry_dir,
            primary_metric,
            candidates,
            alias,
        } => {
            let cfg = load_config(&config_paths)?;
            let mut req = PromotionRequest::from_config(&cfg.config);

            if let Some(d) = models_dir {
                req.models_dir = d;
            }
            if let Some(d) = metrics_dir {
                req.metrics_dir = d;
            }
            if let Some(d) = registry_dir {
                req.registry_dir = d;
            }
            if let Some(m) = primary_metric {
                req.primary_metric = m;
            }
            if !candidates.is_empty() {
                req.candidate_names = candidates;
            }
            if let Some(a) = alias {
                req.alias_name = a;
            }

            info!(
                primary_metric = %req.primary_metric,
                candidates = ?req.candidate_names,
                "promoting best model"
            );

            let promotion = mrk_engine::run(&req)?;

            info!(
                winner = %promotion.entry.name,
                score = promotion.entry.primary_score,
                promotion_id = %promotion.promotion_id,
                "production alias updated -> {}",
                promotion.alias_path.display()
            );
            println!("{}", promotion.alias_path.display());
        }

        Commands::Registry { cmd } => match cmd {
            RegistryCmd::Status {
                registry_dir,
                config_paths,
            } => {
                let store = open_store(registry_dir, &config_paths)?;
                let state = store.load()?;
                match state.production {
                    Some(entry) => println!("{}", serde_json::to_string_pretty(&entry)?),
                    None => println!("no production model promoted yet"),
                }
            }
            RegistryCmd::History {
                registry_dir,
                config_paths,
            } => {
                let store = open_store(registry_dir, &config_paths)?;
                let state = store.load()?;
                for (i, e) in state.models.iter().enumerate() {
                    println!(
                        "{} {} {}={} promoted_at={} artifact={}",
                        i, e.name, e.primary_metric, e.primary_score, e.promoted_at_utc, e.artifact
                    );
                }
                println!("total={}", state.models.len());
            }
        },

        Commands::Audit { cmd } => match cmd {
            AuditCmd::Verify {
                registry_dir,
                config_paths,
            } => {
                let dir = resolve_registry_dir(registry_dir, &config_paths)?;
                let log_path = dir.join(mrk_audit::AUDIT_LOG_FILE);
                match mrk_audit::verify_hash_chain(&log_path)? {
                    mrk_audit::VerifyResult::Valid { events } => {
                        println!("audit_chain=valid events={events}");
                    }
                    mrk_audit::VerifyResult::Broken { line, reason } => {
                        bail!("audit chain broken at line {line}: {reason}");
                    }
                }
            }
        },

        Commands::ConfigHash { paths } => {
            let loaded = mrk_config::load_layered(&paths)?;
            println!("config_hash={}", loaded.config_hash);
        }
    }

    Ok(())
}

/// Merge config layers; no layers means built-in defaults.
fn load_config(paths: &[PathBuf]) -> Result<LoadedConfig> {
    mrk_config::load_layered(paths)
}

fn resolve_registry_dir(explicit: Option<PathBuf>, config_paths: &[PathBuf]) -> Result<PathBuf> {
    if let Some(dir) = explicit {
        return Ok(dir);
    }
    let cfg: Config = load_config(config_paths)?.config;
    Ok(cfg.paths.registry_dir())
}

fn open_store(explicit: Option<PathBuf>, config_paths: &[PathBuf]) -> Result<RegistryStore> {
    Ok(RegistryStore::open(resolve_registry_dir(
        explicit,
        config_paths,
    )?))
}
