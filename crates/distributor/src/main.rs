// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Distributor demonstration CLI.
//!
//! The HTTP/RPC server that would host the write/read coordinators in
//! production is out of scope for this crate. This binary instead wires
//! `DistributorConfig` to an in-memory ring and a scripted ingester client,
//! issues one synthetic write and one synthetic read, and prints the
//! result — a sanity harness for the config/logging/CLI stack, not a server.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use distributor::clock::SystemClock;
use distributor::config::DistributorConfig;
use distributor::error::DistributorError;
use distributor::limiter::RateLimiterRegistry;
use distributor::maintenance::MaintenanceLoop;
use distributor::metrics::DistributorMetrics;
use distributor::pool::{ClientFactory, ClientPool};
use distributor::read::ReadCoordinator;
use distributor::ring::StaticRing;
use distributor::rpc::{IngesterRpc, Matcher, QueryRequest, UserStats};
use distributor::tenant::{FixedTenant, RequestContext, TenantId};
use distributor::types::{IngesterDescriptor, LabelPair, Matrix, Sample, SampleStream, TimeSeries, WriteRequest};
use distributor::write::WriteCoordinator;

/// Distributor demonstration CLI.
#[derive(Parser, Debug)]
#[command(name = "distributor")]
#[command(about = "Write/read router for a sharded, multi-tenant time-series store")]
#[command(version)]
struct Args {
    /// Configuration file path.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of synthetic ingesters to simulate.
    #[arg(long, default_value = "3")]
    ingesters: usize,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate an example configuration file.
    GenConfig {
        #[arg(short, long, default_value = "distributor.toml")]
        output: PathBuf,
    },
    /// Validate a configuration file.
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    if let Some(cmd) = args.command {
        return match cmd {
            Commands::GenConfig { output } => cmd_gen_config(output),
            Commands::Validate { config } => cmd_validate(config),
        };
    }

    let config = match &args.config {
        Some(path) => DistributorConfig::from_file(path)?,
        None => DistributorConfig::default(),
    };

    println!("Distributor demonstration harness v{}", env!("CARGO_PKG_VERSION"));
    println!("===================================================");
    println!();
    println!(
        "replication_factor={} heartbeat_timeout={:?}",
        config.replication_factor,
        config.heartbeat_timeout()
    );

    let members: Vec<IngesterDescriptor> = (0..args.ingesters)
        .map(|i| IngesterDescriptor::new(format!("ingester-{i}:9095"), 0))
        .collect();
    let ring = Arc::new(StaticRing::new(members));

    let mut scripts = HashMap::new();
    scripts.insert(
        "ingester-0:9095".to_string(),
        vec![SampleStream {
            fingerprint: 0,
            labels: vec![LabelPair::new("__name__", "demo_requests_total")],
            samples: vec![Sample {
                timestamp_ms: 1_000,
                value: 1.0,
            }],
        }],
    );
    let factory = ScriptedFactory {
        scripts: Arc::new(scripts),
    };
    let pool = Arc::new(ClientPool::new(factory, config.remote_timeout()));
    let limiter = Arc::new(RateLimiterRegistry::new(
        config.ingestion_rate_limit,
        config.ingestion_burst_size,
    ));
    let registry = prometheus::Registry::new();
    let metrics = Arc::new(DistributorMetrics::register(&registry)?);

    let write = WriteCoordinator::new(
        config.clone(),
        ring.clone(),
        pool.clone(),
        limiter,
        metrics.clone(),
        Arc::new(SystemClock),
    );
    let read = ReadCoordinator::new(config.clone(), ring.clone(), pool.clone(), metrics.clone());

    let ctx = RequestContext::fixed(Arc::new(FixedTenant(TenantId("demo-tenant".into()))));

    let write_request = WriteRequest {
        timeseries: vec![TimeSeries {
            labels: vec![LabelPair::new("__name__", "demo_requests_total")],
            samples: vec![Sample {
                timestamp_ms: 1_000,
                value: 1.0,
            }],
        }],
    };

    println!();
    print!("Issuing synthetic write... ");
    match write.push(&ctx, write_request).await {
        Ok(()) => println!("ok"),
        Err(e) => println!("failed: {e}"),
    }

    print!("Issuing synthetic read... ");
    let matchers = vec![Matcher::equal("__name__", "demo_requests_total")];
    match read.query(&ctx, 0, 2_000, matchers).await {
        Ok(matrix) => println!("ok, {} stream(s) merged", matrix.streams.len()),
        Err(e) => println!("failed: {e}"),
    }

    let maintenance = MaintenanceLoop::new(pool, ring, metrics, config.client_cleanup_period());
    let handle = maintenance.start();
    handle.stop().await;
    println!();
    println!("Maintenance loop exercised one tick and stopped cleanly.");

    Ok(())
}

/// A scripted ingester client for the demonstration harness: every query
/// returns whatever was pre-loaded for its address, everything else
/// succeeds trivially.
struct ScriptedClient {
    address: String,
    scripts: Arc<HashMap<String, Vec<SampleStream>>>,
}

#[async_trait]
impl IngesterRpc for ScriptedClient {
    async fn push(&self, _request: WriteRequest) -> Result<(), DistributorError> {
        Ok(())
    }

    async fn query(&self, _request: QueryRequest) -> Result<Matrix, DistributorError> {
        Ok(Matrix {
            streams: self.scripts.get(&self.address).cloned().unwrap_or_default(),
        })
    }

    async fn label_values(&self, _label_name: &str) -> Result<Vec<String>, DistributorError> {
        Ok(Vec::new())
    }

    async fn metrics_for_label_matchers(
        &self,
        request: QueryRequest,
    ) -> Result<Matrix, DistributorError> {
        self.query(request).await
    }

    async fn user_stats(&self) -> Result<UserStats, DistributorError> {
        Ok(UserStats::default())
    }
}

struct ScriptedFactory {
    scripts: Arc<HashMap<String, Vec<SampleStream>>>,
}

#[async_trait]
impl ClientFactory for ScriptedFactory {
    async fn dial(
        &self,
        address: &str,
        _remote_timeout: Duration,
    ) -> Result<Arc<dyn IngesterRpc>, DistributorError> {
        Ok(Arc::new(ScriptedClient {
            address: address.to_string(),
            scripts: self.scripts.clone(),
        }))
    }
}

fn cmd_gen_config(output: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let config = DistributorConfig::default();
    let toml_str = toml::to_string_pretty(&config)?;
    let content = format!("# Distributor configuration\n# Generated by `distributor gen-config`\n\n{toml_str}");
    std::fs::write(&output, content)?;
    println!("Generated configuration file: {}", output.display());
    Ok(())
}

fn cmd_validate(config_path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    match DistributorConfig::from_file(&config_path) {
        Ok(config) => {
            println!("Configuration valid!");
            println!("replication_factor: {}", config.replication_factor);
            println!("heartbeat_timeout_secs: {}", config.heartbeat_timeout_secs);
            Ok(())
        }
        Err(e) => {
            eprintln!("Configuration invalid: {e}");
            std::process::exit(1);
        }
    }
}
