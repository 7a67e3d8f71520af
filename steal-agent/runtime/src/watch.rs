use crate::{
    core::{NamespacePolicy, Pod},
    metrics::Metrics,
    notify::{self, Publish},
};
use futures::{prelude::*, stream::BoxStream};
use kube::{
    api::{Api, WatchEvent, WatchParams},
    ResourceExt,
};
use std::sync::Arc;
use tokio::{sync::oneshot, time};
use tracing::{debug, info, info_span, warn, Instrument};

const RECONNECT_DELAY: time::Duration = time::Duration::from_secs(1);

pub type Events<'a> = BoxStream<'a, kube::Result<WatchEvent<Pod>>>;

/// Opens a stream of pod events.
#[async_trait::async_trait]
pub trait OpenWatch: Send + Sync {
    async fn open(&self) -> kube::Result<Events<'_>>;
}

/// Republishes cluster-wide pod creations to the message bus.
#[derive(Clone, Debug)]
pub struct PodWatch<P> {
    namespaces: Arc<NamespacePolicy>,
    publisher: P,
    metrics: Metrics,
}

// === impl PodWatch ===

impl<P: Publish> PodWatch<P> {
    pub fn new(namespaces: Arc<NamespacePolicy>, publisher: P, metrics: Metrics) -> Self {
        Self {
            namespaces,
            publisher,
            metrics,
        }
    }

    /// Watches all pods until the stream closes, then signals `done`.
    ///
    /// When `reconnect` is set the watch is reopened once before giving up.
    /// Restarting the process beyond that is left to its supervisor.
    pub async fn run<W>(self, watches: W, reconnect: bool, done: oneshot::Sender<()>)
    where
        W: OpenWatch,
    {
        let mut reconnects = u8::from(reconnect);
        loop {
            match watches.open().await {
                Ok(events) => {
                    info!("Listening for pod creation events");
                    self.process(events).await;
                    info!("Pod watch stream closed");
                }
                Err(error) => warn!(%error, "Failed to watch pods"),
            }

            if reconnects == 0 {
                break;
            }
            reconnects -= 1;
            time::sleep(RECONNECT_DELAY).await;
            info!("Restarting pod watch");
        }

        // The receiver may already be gone if the process is shutting down.
        let _ = done.send(());
    }

    /// Handles events until `events` ends.
    pub async fn process<S>(&self, events: S)
    where
        S: Stream<Item = kube::Result<WatchEvent<Pod>>>,
    {
        tokio::pin!(events);
        while let Some(event) = events.next().await {
            match event {
                Ok(WatchEvent::Added(pod)) => {
                    self.metrics.watch_event("added");
                    self.added(pod).await;
                }
                Ok(WatchEvent::Modified(_)) => self.metrics.watch_event("modified"),
                Ok(WatchEvent::Deleted(_)) => self.metrics.watch_event("deleted"),
                Ok(WatchEvent::Bookmark(_)) => self.metrics.watch_event("bookmark"),
                Ok(WatchEvent::Error(error)) => {
                    self.metrics.watch_event("error");
                    warn!(?error, "Pod watch error");
                }
                Err(error) => {
                    self.metrics.watch_event("error");
                    warn!(%error, "Pod watch failed");
                }
            }
        }
    }

    async fn added(&self, pod: Pod) {
        let ns = pod.namespace().unwrap_or_default();
        let name = pod.name_any();
        if self.namespaces.is_excluded(&ns) {
            debug!(%ns, %name, "Ignoring pod in excluded namespace");
            return;
        }

        let span = info_span!("notify", %ns, %name);
        async {
            info!("Pod created");
            notify::publish(&self.publisher, &pod, "watch", &self.metrics).await;
        }
        .instrument(span)
        .await
    }
}

#[async_trait::async_trait]
impl<W: OpenWatch> OpenWatch for &W {
    async fn open(&self) -> kube::Result<Events<'_>> {
        (**self).open().await
    }
}

#[async_trait::async_trait]
impl OpenWatch for Api<Pod> {
    async fn open(&self) -> kube::Result<Events<'_>> {
        let events = self.watch(&WatchParams::default(), "0").await?;
        Ok(events.boxed())
    }
}
