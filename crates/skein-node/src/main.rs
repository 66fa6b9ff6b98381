use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::Context;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;

use skein_consensus::{
    bootstrap, BootstrapOptions, Bootstrapped, Encoding, Gatekeeper, LocalLog, NetworkPolicy,
    StateMachine,
};
use skein_policy::{filter_graph, peers_for, with_deadline};
use skein_storage::{codec, FjallStore, Snapshot};
use skein_types::{Command, Edge, MeshNode, NodeId, Prefix};

#[derive(clap::Parser, Debug)]
#[command(name = "skein-node", about = "Skein mesh control-plane node")]
struct Cli {
    #[arg(long)]
    config: Option<PathBuf>,
    /// Overrides `storage.data_dir`.
    #[arg(long)]
    data_dir: Option<PathBuf>,
    /// Identity to act as; overrides `node.id`.
    #[arg(long = "as")]
    caller: Option<String>,
    #[command(subcommand)]
    command: Cmd,
}

#[derive(clap::Subcommand, Debug)]
enum Cmd {
    /// Seed the mesh, or report the existing one.
    Bootstrap {
        #[arg(long)]
        domain: Option<String>,
        #[arg(long)]
        ipv4_network: Option<Prefix>,
        #[arg(long)]
        admin: Option<String>,
        #[arg(long, value_parser = parse_policy)]
        default_network_policy: Option<NetworkPolicy>,
        /// Repeatable.
        #[arg(long = "bootstrap-node")]
        bootstrap_nodes: Vec<NodeId>,
        /// Repeatable.
        #[arg(long = "voter")]
        voters: Vec<NodeId>,
        #[arg(long)]
        disable_rbac: bool,
    },
    /// Register a node record, optionally with edges to existing nodes.
    Join {
        #[arg(long)]
        id: NodeId,
        #[arg(long)]
        public_key: String,
        #[arg(long)]
        ipv6: Prefix,
        #[arg(long)]
        ipv4: Option<Prefix>,
        #[arg(long, default_value = "")]
        primary_endpoint: String,
        /// `host:port`, repeatable.
        #[arg(long = "endpoint")]
        endpoints: Vec<String>,
        #[arg(long, default_value = "")]
        zone: String,
        /// Repeatable.
        #[arg(long = "peer")]
        peers: Vec<NodeId>,
    },
    /// Print the tunnel peers of a node.
    Peers {
        #[arg(long)]
        node: NodeId,
    },
    /// Print the ACL-filtered adjacency seen from a node.
    Adjacency {
        #[arg(long)]
        node: NodeId,
    },
    /// Write a snapshot of the local state to a file.
    Snapshot {
        #[arg(long)]
        out: PathBuf,
    },
    /// Replace the local state with a snapshot file.
    Restore {
        #[arg(long = "in")]
        input: PathBuf,
    },
}

fn parse_policy(s: &str) -> Result<NetworkPolicy, String> {
    match s {
        "accept" => Ok(NetworkPolicy::Accept),
        "deny" => Ok(NetworkPolicy::Deny),
        other => Err(format!("unknown network policy {other:?}")),
    }
}

#[derive(Debug, Deserialize)]
struct NodeConfig {
    id: String,
}

#[derive(Debug, Deserialize)]
struct StorageConfig {
    data_dir: PathBuf,
}

#[derive(Debug, Deserialize)]
struct LogConfig {
    encoding: Encoding,
    term: u64,
}

#[derive(Debug, Deserialize)]
struct ReadConfig {
    timeout_ms: u64,
}

#[derive(Debug, Deserialize)]
struct ObservabilityConfig {
    log_level: String,
    log_format: String,
}

#[derive(Debug, Deserialize)]
struct Config {
    node: NodeConfig,
    storage: StorageConfig,
    log: LogConfig,
    mesh: BootstrapOptions,
    read: ReadConfig,
    observability: ObservabilityConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use clap::Parser;
    let cli = Cli::parse();

    let mut figment = Figment::new().merge(Toml::string(include_str!("../../../config/default.toml")));

    if let Some(ref config_path) = cli.config {
        figment = figment.merge(Toml::file_exact(config_path));
    }

    let config: Config = figment
        .merge(Env::prefixed("SKEIN_").split("__"))
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

    let data_dir = cli.data_dir.clone().unwrap_or_else(|| config.storage.data_dir.clone());
    let caller = cli.caller.clone().unwrap_or_else(|| config.node.id.clone());
    let read_timeout = Duration::from_millis(config.read.timeout_ms);
    tracing::info!(data_dir = %data_dir.display(), %caller, "node starting");

    let store = FjallStore::open(&data_dir)
        .with_context(|| format!("failed to open store at {}", data_dir.display()))?;
    let fsm = Arc::new(StateMachine::new(store));

    match cli.command {
        Cmd::Bootstrap {
            domain,
            ipv4_network,
            admin,
            default_network_policy,
            bootstrap_nodes,
            voters,
            disable_rbac,
        } => {
            let mut opts = config.mesh;
            if let Some(domain) = domain {
                opts.mesh_domain = domain;
            }
            if let Some(net) = ipv4_network {
                opts.ipv4_network = net;
            }
            if let Some(admin) = admin {
                opts.admin = admin;
            }
            if let Some(policy) = default_network_policy {
                opts.default_network_policy = policy;
            }
            opts.bootstrap_nodes.extend(bootstrap_nodes);
            opts.voters.extend(voters);
            opts.disable_rbac |= disable_rbac;

            let log = LocalLog::open(fsm.clone(), config.log.term, config.log.encoding)
                .await
                .context("failed to open log")?;
            let outcome = bootstrap(&fsm, &log, &opts).await.context("bootstrap failed")?;
            let r = outcome.results();
            let how = match outcome {
                Bootstrapped::Fresh(_) => "bootstrapped",
                Bootstrapped::Existing(_) => "already bootstrapped",
            };
            println!("{how}: domain={} ipv4={} ipv6={}", r.mesh_domain, r.network_v4, r.network_v6);
        }
        Cmd::Join { id, public_key, ipv6, ipv4, primary_endpoint, endpoints, zone, peers } => {
            let mut node = MeshNode::new(id.clone(), public_key, ipv6);
            node.private_ipv4 = ipv4;
            node.primary_endpoint = primary_endpoint;
            node.wireguard_endpoints = endpoints;
            node.zone_awareness_id = zone;
            node.joined_at = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs() as i64)
                .unwrap_or_default();

            let mut cmds = vec![Command::PutNode(node)];
            cmds.extend(peers.iter().map(|p| Command::PutEdge(Edge::new(id.clone(), p.clone()))));

            let log = LocalLog::open(fsm.clone(), config.log.term, config.log.encoding)
                .await
                .context("failed to open log")?;
            let gate = Gatekeeper::new(fsm.clone(), log);
            let result = gate
                .submit(&caller, Command::Batch(cmds))
                .await
                .with_context(|| format!("join of {id} refused"))?;
            if let Some(reason) = result.error {
                anyhow::bail!("join of {id} rejected: {reason}");
            }
            println!("joined {id} with {} edge(s) in {:?}", peers.len(), result.elapsed);
        }
        Cmd::Peers { node } => {
            let view = with_deadline(read_timeout, fsm.mesh_view()).await.context("failed to read mesh")?;
            let peers = peers_for(&view, &node).with_context(|| format!("cannot resolve peers of {node}"))?;
            for p in peers {
                println!(
                    "{} key={} endpoint={} allowed_ips=[{}] allowed_routes=[{}]",
                    p.id,
                    p.public_key,
                    p.primary_endpoint.as_deref().unwrap_or("-"),
                    join(&p.allowed_ips),
                    join(&p.allowed_routes),
                );
            }
        }
        Cmd::Adjacency { node } => {
            let view = with_deadline(read_timeout, fsm.mesh_view()).await.context("failed to read mesh")?;
            let graph = view.graph();
            let adjacency = filter_graph(&graph, &view.network_acls(), &node);
            for (id, neighbours) in adjacency {
                let list: Vec<_> = neighbours.into_iter().collect();
                println!("{id}: {}", list.join(" "));
            }
        }
        Cmd::Snapshot { out } => {
            let snapshot = fsm.snapshot().await.context("snapshot failed")?;
            let bytes = codec::encode(&snapshot).context("failed to encode snapshot")?;
            std::fs::write(&out, bytes).with_context(|| format!("failed to write {}", out.display()))?;
            println!(
                "snapshot {} at term {} index {} written to {}",
                snapshot.meta.snapshot_id,
                snapshot.meta.last_log_term,
                snapshot.meta.last_log_index,
                out.display()
            );
        }
        Cmd::Restore { input } => {
            let bytes = std::fs::read(&input).with_context(|| format!("failed to read {}", input.display()))?;
            let snapshot: Snapshot = codec::decode(&bytes).context("failed to decode snapshot")?;
            let id = snapshot.meta.snapshot_id.clone();
            fsm.restore(snapshot).await.context("restore failed")?;
            println!("restored snapshot {id}");
        }
    }

    Ok(())
}

fn join(prefixes: &[Prefix]) -> String {
    prefixes.iter().map(Prefix::to_string).collect::<Vec<_>>().join(",")
}
