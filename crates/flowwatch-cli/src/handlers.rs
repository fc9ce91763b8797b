//! Command handlers.

use anyhow::{Context, bail};
use flowwatch_api::AppState;
use flowwatch_core::ports::CiClient;
use flowwatch_engine::{CausalityResolver, Classification, ServerConfig, WatchConfig, Watcher};
use flowwatch_jenkins::{JenkinsClient, JenkinsConfig};
use flowwatch_nats::{NatsMessageSource, NatsSourceConfig};
use flowwatch_topology::{Loader, RenderMap, Topology};
use std::fmt::Write as _;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Run a watcher per configured server plus the status API, until Ctrl-C.
pub async fn serve(config_path: &Path, listen: Option<String>) -> anyhow::Result<()> {
    let config = WatchConfig::from_file(config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    let mut watchers = Vec::new();
    for server in &config.servers {
        match build_watcher(server, config.max_concurrent_events) {
            Ok(watcher) => watchers.push(Arc::new(watcher)),
            Err(e) => error!(server = %server.name, error = %e, "Skipping server"),
        }
    }
    if watchers.is_empty() {
        bail!("no configured server could be started");
    }

    let mut running = JoinSet::new();
    for watcher in &watchers {
        let watcher = Arc::clone(watcher);
        running.spawn(async move {
            let name = watcher.info().name.clone();
            (name, watcher.run().await)
        });
    }

    let addr: SocketAddr = listen
        .unwrap_or(config.listen)
        .parse()
        .context("invalid listen address")?;
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let api = tokio::spawn(flowwatch_api::serve(
        addr,
        Arc::new(AppState::new(watchers.clone())),
        async move {
            let _ = shutdown_rx.wait_for(|stop| *stop).await;
        },
    ));

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("listening for Ctrl-C")?;
                info!("Shutting down");
                break;
            }
            Some(done) = running.join_next() => report_watcher_exit(done),
        }
    }

    for watcher in &watchers {
        watcher.stop();
    }
    while let Some(done) = running.join_next().await {
        report_watcher_exit(done);
    }
    let _ = shutdown_tx.send(true);
    api.await?.context("status API")?;
    Ok(())
}

fn report_watcher_exit(
    done: Result<(String, flowwatch_core::Result<()>), tokio::task::JoinError>,
) {
    match done {
        Ok((name, Ok(()))) => info!(server = %name, "Watcher finished"),
        Ok((name, Err(e))) => error!(server = %name, error = %e, "Watcher failed"),
        Err(e) => error!(error = %e, "Watcher task aborted"),
    }
}

fn jenkins_client(server: &ServerConfig) -> anyhow::Result<JenkinsClient> {
    let info = server.info()?;
    let mut config = JenkinsConfig::new(info.url);
    if let Some(username) = &server.username {
        config = config.with_credentials(username, server.password());
    }
    Ok(JenkinsClient::new(config)?)
}

fn build_watcher(server: &ServerConfig, max_concurrent_events: usize) -> anyhow::Result<Watcher> {
    let info = server.info()?;
    let topology = server.load_topology()?;
    for (flow, reason) in &topology.unresolved {
        warn!(server = %info.name, flow = %flow, reason = %reason, "Flow left unresolved");
    }

    let client = jenkins_client(server)?;
    let source = NatsMessageSource::new(
        NatsSourceConfig::new(server.transport.clone()).with_subject(server.subject.clone()),
    );

    Ok(Watcher::new(
        info,
        topology,
        Arc::new(client),
        Arc::new(source),
        max_concurrent_events,
    ))
}

/// Load a definition file and print what resolved.
pub fn validate(path: &Path) -> anyhow::Result<()> {
    let topology = Loader::from_file(path)?.load();
    print!("{}", describe_topology(&topology));
    if !topology.unresolved.is_empty() {
        bail!("{} flow(s) could not be resolved", topology.unresolved.len());
    }
    Ok(())
}

fn describe_topology(topology: &Topology) -> String {
    let mut out = String::new();
    for (name, flow) in &topology.flows {
        match &flow.jobs {
            Some(root) => {
                let _ = writeln!(out, "✓ {} ({} jobs)", name, root.jobs().len());
            }
            None => {
                let reason = topology.unresolved.get(name).map(String::as_str).unwrap_or("");
                let _ = writeln!(out, "✗ {}: {}", name, reason);
            }
        }
    }
    out
}

/// Print one flow's render map in topological order.
pub fn map(path: &Path, flow: &str) -> anyhow::Result<()> {
    let topology = Loader::from_file(path)?.load();
    let Some(map) = topology.maps.get(flow) else {
        match topology.unresolved.get(flow) {
            Some(reason) => bail!("flow {} is unresolved: {}", flow, reason),
            None => bail!("flow {} not found", flow),
        }
    };
    print!("{}", describe_map(map)?);
    Ok(())
}

fn describe_map(map: &RenderMap) -> anyhow::Result<String> {
    let mut out = String::new();
    for node in map.topological_order()? {
        let previous: Vec<&str> = node.previous.iter().map(String::as_str).collect();
        let _ = write!(out, "{}", node.key);
        if let Some(label) = &node.labeled_by {
            let _ = write!(out, " [{}]", label);
        }
        if previous.is_empty() {
            let _ = writeln!(out);
        } else {
            let _ = writeln!(out, " <- {}", previous.join(", "));
        }
    }
    Ok(out)
}

/// Classify a build against the live CI server.
pub async fn inspect(config_path: &Path, server: &str, job: &str, build: u64) -> anyhow::Result<()> {
    let config = WatchConfig::from_file(config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    let server = config
        .server(server)
        .with_context(|| format!("server {} is not configured", server))?;

    let client: Arc<dyn CiClient> = Arc::new(jenkins_client(server)?);
    let resolver = CausalityResolver::new(client);
    let classification = resolver.classify(job, build).await?;
    print!("{}", describe_classification(job, build, &classification));
    Ok(())
}

fn describe_classification(job: &str, build: u64, classification: &Classification) -> String {
    let kind = match classification {
        Classification::RootFlow => "root flow",
        Classification::Subflow(_) => "subflow",
        Classification::Job(_) => "job",
        Classification::Untracked => "untracked job",
    };
    let mut out = format!("{}/{}: {}\n", job, build, kind);
    for (depth, cause) in classification.causes().iter().enumerate() {
        let _ = writeln!(out, "{}{}", "  ".repeat(depth + 1), cause);
    }
    out
}
