use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;

use norn_routed::{
    Event, MemReplicaStore, PerformPutHintedHandoff, PerformSerialPut, Pipeline, PutPipelineData,
};
use norn_slop::{ClusterHandoff, MemSlopStore, NodeIdOrder};
use norn_types::{Key, Node, NodeId, StoreError, SystemClock, WallClock};
use norn_versioning::{VectorClock, Versioned};

#[derive(clap::Parser, Debug)]
#[command(name = "norn-node", about = "Norn quorum-write demo node")]
struct Cli {
    #[arg(long, default_value = "demo")]
    store: String,
    #[arg(long)]
    key: String,
    #[arg(long)]
    value: String,
    /// Node ids to mark unreachable, repeatable
    #[arg(long = "down")]
    down: Vec<NodeId>,
    #[arg(long)]
    config: Option<std::path::PathBuf>,
}

#[derive(Debug, Deserialize)]
struct ClusterConfig {
    replicas: u64,
    required_writes: usize,
}

#[derive(Debug, Deserialize)]
struct HandoffConfig {
    timeout_ms: u64,
}

#[derive(Debug, Deserialize)]
struct ObservabilityConfig {
    log_level: String,
    log_format: String,
}

#[derive(Debug, Deserialize)]
struct Config {
    cluster: ClusterConfig,
    handoff: HandoffConfig,
    observability: ObservabilityConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use clap::Parser;
    let cli = Cli::parse();

    let mut figment =
        Figment::new().merge(Toml::string(include_str!("../../../config/default.toml")));

    if let Some(ref config_path) = cli.config {
        figment = figment.merge(Toml::file_exact(config_path));
    }

    let config: Config = figment
        .merge(Env::prefixed("NORN_").split("__"))
        .extract()
        .context("failed to load configuration")?;

    match config.observability.log_format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(&config.observability.log_level)
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .pretty()
                .with_env_filter(&config.observability.log_level)
                .init();
        }
    }

    if config.cluster.replicas == 0 {
        anyhow::bail!("cluster.replicas must be at least 1");
    }

    let nodes: Vec<Node> = (1..=config.cluster.replicas)
        .map(|id| Node::new(id, format!("node{id}.local"), 0))
        .collect();
    tracing::info!(
        replicas = nodes.len(),
        required = config.cluster.required_writes,
        down = ?cli.down,
        "cluster assembled"
    );

    let replicas: Vec<Arc<MemReplicaStore>> = nodes
        .iter()
        .map(|n| {
            let store = Arc::new(MemReplicaStore::new(n.id));
            store.set_down(cli.down.contains(&n.id));
            store
        })
        .collect();

    let mut handoff = ClusterHandoff::new(
        NodeIdOrder::new(nodes.clone()),
        Duration::from_millis(config.handoff.timeout_ms),
    );
    let slop_stores: Vec<(NodeId, Arc<MemSlopStore>)> = nodes
        .iter()
        .filter(|n| !cli.down.contains(&n.id))
        .map(|n| (n.id, Arc::new(MemSlopStore::new())))
        .collect();
    for (id, store) in &slop_stores {
        handoff.register(*id, store.clone());
    }

    let clock = Arc::new(SystemClock);
    let key = Key::from(cli.key.as_str());
    let version = VectorClock::new().incremented(nodes[0].id, clock.now_ms())?;
    let versioned = Versioned::new(cli.value.into_bytes(), version);

    let preference_list: Vec<(Node, Arc<MemReplicaStore>)> =
        nodes.iter().cloned().zip(replicas.iter().cloned()).collect();

    let mut pipeline = Pipeline::new();
    pipeline.register(
        Event::Started,
        Box::new(PerformSerialPut::new(
            preference_list,
            key.clone(),
            versioned.clone(),
            config.cluster.required_writes,
            Event::Applied,
        )),
    );
    pipeline.register(
        Event::Applied,
        Box::new(PerformPutHintedHandoff::new(
            key,
            versioned,
            Arc::new(handoff),
            clock,
            Event::Completed,
        )),
    );

    let mut ctx = PutPipelineData::new(cli.store);
    pipeline.run(Event::Started, &mut ctx).await?;

    for outcome in ctx.hint_outcomes() {
        tracing::info!(node = outcome.node, queued = outcome.queued, "hint outcome");
    }
    let mut stashed = 0usize;
    for (_, store) in &slop_stores {
        stashed += store.len().await;
    }

    match ctx.take_fatal_error() {
        None => {
            tracing::info!(stashed, "put succeeded");
            Ok(())
        }
        Some(err @ StoreError::UnreachableButQueued { .. }) => {
            tracing::warn!(%err, stashed, "put degraded: queued for eventual delivery");
            Ok(())
        }
        Some(err) => {
            tracing::error!(%err, "put failed");
            Err(anyhow::Error::new(err))
        }
    }
}
