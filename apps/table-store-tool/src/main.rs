//! CLI for the structured-table storage layer.
//!
//! Provides commands for:
//! - Validating a store configuration and the backend it selects
//! - Exercising the transaction runner with concurrent conflicting writers

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use rand::Rng;
use table_store_core::{
    row, FieldType, StorageBackendKind, StorageProviders, StoreConfig, StoreError, TableSchema,
    TransactionRunnerExt, Value,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct ConfigArgs {
    /// TOML configuration file; defaults are used when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Overrides `storage_implementation` (nosql or sql)
    #[arg(short, long)]
    storage: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the configuration and wire the selected backend
    Check {
        #[command(flatten)]
        config: ConfigArgs,
    },

    /// Run concurrent counter increments and verify no update was lost
    Exercise {
        #[command(flatten)]
        config: ConfigArgs,

        /// Number of worker threads
        #[arg(short, long, default_value_t = 4)]
        threads: usize,

        /// Committed transactions per thread
        #[arg(long, default_value_t = 100)]
        transactions: usize,

        /// Number of distinct counters; fewer counters means more conflicts
        #[arg(short, long, default_value_t = 8)]
        keys: usize,

        /// Attempts per transaction before giving up
        #[arg(long, default_value_t = 50)]
        max_attempts: usize,
    },
}

fn load_config(args: &ConfigArgs) -> anyhow::Result<StoreConfig> {
    let mut config = match &args.config {
        Some(path) => StoreConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => StoreConfig::new(),
    };
    config.apply_env_overrides()?;
    if let Some(storage) = &args.storage {
        config.storage_implementation = Some(storage.clone());
    }
    Ok(config)
}

fn run_check(args: &ConfigArgs) -> anyhow::Result<()> {
    let config = load_config(args)?;
    let providers = StorageProviders::from_config(&config)?;

    println!("Configuration OK");
    println!("  Storage implementation: {}", providers.kind());
    if providers.kind() == StorageBackendKind::NoSql {
        println!("  Coordinator client provider: {}", config.client_provider_kind()?);
        println!("  Client pool size: {}", config.tx_client_pool_size);
    } else {
        println!("  Connection string: {}", config.sql_connection_string);
    }
    println!(
        "  Registered tables: {}",
        providers.registry().table_names()?.len()
    );
    Ok(())
}

fn counters_schema() -> Result<TableSchema, StoreError> {
    TableSchema::builder("counters")
        .column("name", FieldType::String)
        .column("value", FieldType::Long)
        .primary_key(["name"])
        .build()
}

fn increment(providers: &StorageProviders, key: &str) -> table_store_core::Result<()> {
    providers.runner().run(|ctx| {
        let mut counters = ctx.table("counters")?;
        let current = counters
            .read(&[Value::from(key)])?
            .and_then(|row| row.get("value").and_then(Value::as_i64))
            .unwrap_or(0);
        counters.upsert(row([
            ("name", Value::from(key)),
            ("value", Value::Long(current + 1)),
        ]))
    })
}

fn run_exercise(
    args: &ConfigArgs,
    threads: usize,
    transactions: usize,
    keys: usize,
    max_attempts: usize,
) -> anyhow::Result<()> {
    if threads == 0 || keys == 0 || max_attempts == 0 {
        bail!("threads, keys and max_attempts must be greater than 0");
    }
    let config = load_config(args)?;
    let providers = StorageProviders::from_config(&config)?;
    providers.admin().create_table(&counters_schema()?)?;

    println!(
        "Running {} threads x {} transactions over {} counters ({})",
        threads,
        transactions,
        keys,
        providers.kind()
    );

    let aborts = AtomicUsize::new(0);
    let timeouts = AtomicUsize::new(0);
    let start = Instant::now();

    let results: Vec<anyhow::Result<()>> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..threads)
            .map(|worker| {
                let providers = &providers;
                let (aborts, timeouts) = (&aborts, &timeouts);
                s.spawn(move || -> anyhow::Result<()> {
                    let mut rng = rand::thread_rng();
                    for _ in 0..transactions {
                        let key = format!("counter-{}", rng.gen_range(0..keys));
                        let mut attempt = 0;
                        loop {
                            attempt += 1;
                            match increment(providers, &key) {
                                Ok(()) => break,
                                Err(e) if e.is_retryable() && attempt < max_attempts => {
                                    tracing::debug!("Worker {} retrying {}: {}", worker, key, e);
                                    match e {
                                        StoreError::PoolTimeout { .. } => timeouts,
                                        _ => aborts,
                                    }
                                    .fetch_add(1, Ordering::Relaxed);
                                }
                                Err(e) => {
                                    return Err(e).with_context(|| {
                                        format!("worker {} gave up on {}", worker, key)
                                    })
                                }
                            }
                        }
                    }
                    Ok(())
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| match h.join() {
                Ok(result) => result,
                Err(_) => Err(anyhow::anyhow!("worker thread panicked")),
            })
            .collect()
    });
    let elapsed = start.elapsed();
    for result in results {
        result?;
    }

    let rows = providers.runner().run(|ctx| ctx.table("counters")?.scan())?;
    let total: i64 = rows
        .iter()
        .filter_map(|row| row.get("value").and_then(Value::as_i64))
        .sum();
    providers.admin().drop_table("counters")?;
    let expected = (threads * transactions) as i64;

    println!("Results:");
    println!("  Total time: {:?}", elapsed);
    println!("  Committed: {}", expected);
    println!("  Aborted and retried: {}", aborts.load(Ordering::Relaxed));
    println!("  Timed out and retried: {}", timeouts.load(Ordering::Relaxed));
    println!("  Rows: {}", rows.len());
    println!("  Counter total: {}", total);

    // Only the coordinator-backed runner rejects conflicting read-modify-writes
    let detects_conflicts =
        providers.kind() == StorageBackendKind::NoSql && !config.use_noop_tx_client;
    if !detects_conflicts {
        println!("  Lost update check skipped: backend does not detect write conflicts");
    } else if total != expected {
        bail!("lost updates: counters sum to {}, expected {}", total, expected);
    } else {
        println!("  PASS: no lost updates");
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Check { config } => run_check(&config),
        Commands::Exercise {
            config,
            threads,
            transactions,
            keys,
            max_attempts,
        } => run_exercise(&config, threads, transactions, keys, max_attempts),
    }
}
