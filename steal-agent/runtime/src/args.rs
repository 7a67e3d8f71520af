use crate::{
    admission::{Admission, Config},
    core::{steal::DEFAULT_NODE_ID, NamespacePolicy, Pod},
    metrics::Metrics,
    notify::Nats,
    watch::PodWatch,
};
use anyhow::{bail, Result};
use clap::Parser;
use futures::prelude::*;
use kube::api::Api;
use prometheus_client::registry::Registry;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{info, info_span, Instrument};

#[derive(Debug, Parser)]
#[clap(
    name = "workload-steal-agent",
    about = "Redirects eligible pods to stolen nodes and announces them on NATS"
)]
pub struct Args {
    #[clap(
        long,
        default_value = "workload_steal=info,warn",
        env = "WORKLOAD_STEAL_AGENT_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    server: kubert::ServerArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// Disables the admission controller server.
    #[clap(long)]
    admission_controller_disabled: bool,

    /// Disables the cluster-wide pod watch.
    #[clap(long)]
    pod_watch_disabled: bool,

    /// Reopens the pod watch once after it closes instead of exiting.
    #[clap(long)]
    pod_watch_reconnect: bool,

    /// Label that opts a workload out of stealing.
    #[clap(long, env = "NO_WORKLOAD_STEAL_LABEL", default_value = "no-steal")]
    marker_label: String,

    /// Comma-separated namespaces whose workloads are never stolen, in
    /// addition to the built-in system namespaces.
    #[clap(long, env = "IGNORE_NAMESPACES", default_value = "")]
    ignore_namespaces: NamespacePolicy,

    #[clap(long, env = "NATS_URL")]
    nats_url: String,

    #[clap(long, env = "NATS_SUBJECT")]
    nats_subject: String,

    /// Node that stolen pods are redirected to.
    #[clap(long, env = "STEAL_NODE_ID", default_value = DEFAULT_NODE_ID)]
    steal_node_id: String,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            log_level,
            log_format,
            client,
            server,
            admin,
            admission_controller_disabled,
            pod_watch_disabled,
            pod_watch_reconnect,
            marker_label,
            ignore_namespaces,
            nats_url,
            nats_subject,
            steal_node_id,
        } = self;

        let server = if admission_controller_disabled {
            None
        } else {
            Some(server)
        };

        let mut prom = <Registry>::default();
        let metrics = Metrics::register(prom.sub_registry_with_prefix("workload_steal"));
        let rt_metrics = kubert::RuntimeMetrics::register(prom.sub_registry_with_prefix("kube"));

        let runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_metrics(rt_metrics)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .with_optional_server(server)
            .build()
            .await?;

        let namespaces = Arc::new(ignore_namespaces);
        let publisher = Nats::new(nats_url, nats_subject);
        info!(
            label = %marker_label,
            subject = %publisher.subject(),
            ignored = ?namespaces.ignored().collect::<Vec<_>>(),
            "Configured workload stealing"
        );

        // Spawn the pod watch. It runs until its stream closes and then
        // signals completion so that the process exits.
        let watch_done = if pod_watch_disabled {
            info!("Pod watch disabled");
            None
        } else {
            let (done_tx, done_rx) = oneshot::channel();
            let watch = PodWatch::new(namespaces.clone(), publisher.clone(), metrics.clone());
            tokio::spawn(
                watch
                    .run(Api::<Pod>::all(runtime.client()), pod_watch_reconnect, done_tx)
                    .instrument(info_span!("pods")),
            );
            Some(done_rx)
        };

        let config = Config {
            marker_label,
            namespaces,
            node_id: steal_node_id,
        };
        let admission = Admission::new(config, publisher, metrics);
        let runtime = runtime.spawn_server(move || admission);

        let watch_done = async move {
            match watch_done {
                Some(rx) => {
                    let _ = rx.await;
                }
                None => future::pending::<()>().await,
            }
        };

        // Block the main thread on the shutdown signal or the end of the pod
        // watch, whichever comes first.
        tokio::select! {
            res = runtime.run() => {
                if res.is_err() {
                    bail!("Aborted");
                }
            }
            () = watch_done => bail!("Pod watch terminated"),
        }

        Ok(())
    }
}
