use crate::{core::Pod, metrics::Metrics};
use kube::ResourceExt;
use thiserror::Error;
use tracing::{debug, info, info_span, warn, Instrument};

/// Publishes workload snapshots to the message bus.
#[async_trait::async_trait]
pub trait Publish: Clone + Send + Sync + 'static {
    async fn publish(&self, pod: &Pod) -> Result<(), Error>;
}

/// Publishes to a NATS subject, connecting once per message.
#[derive(Clone, Debug)]
pub struct Nats {
    url: String,
    subject: String,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to connect to NATS server: {0}")]
    Connect(#[source] async_nats::ConnectError),

    #[error("failed to serialize pod: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to publish message: {0}")]
    Publish(#[source] async_nats::PublishError),

    #[error("failed to flush NATS connection: {0}")]
    Flush(#[source] async_nats::client::FlushError),
}

// === impl Nats ===

impl Nats {
    pub fn new(url: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            subject: subject.into(),
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }
}

#[async_trait::async_trait]
impl Publish for Nats {
    async fn publish(&self, pod: &Pod) -> Result<(), Error> {
        // The client is dropped, closing the connection, on every return path.
        let client = async_nats::connect(self.url.as_str())
            .await
            .map_err(Error::Connect)?;
        debug!(url = %self.url, "Connected to NATS server");

        let payload = serde_json::to_vec(pod)?;
        client
            .publish(self.subject.clone(), payload.into())
            .await
            .map_err(Error::Publish)?;
        client.flush().await.map_err(Error::Flush)?;
        Ok(())
    }
}

// === impl Error ===

impl Error {
    /// Names the publish stage that failed.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Connect(_) => "connect",
            Self::Serialize(_) => "serialize",
            Self::Publish(_) => "publish",
            Self::Flush(_) => "flush",
        }
    }
}

/// Publishes `pod` and records the outcome. Failures are logged and never
/// returned.
pub(crate) async fn publish<P: Publish>(
    publisher: &P,
    pod: &Pod,
    source: &'static str,
    metrics: &Metrics,
) {
    match publisher.publish(pod).await {
        Ok(()) => {
            metrics.notification(source, "published");
            info!("Published pod");
        }
        Err(error) => {
            metrics.notification(source, error.stage());
            warn!(%error, stage = error.stage(), "Failed to publish pod");
        }
    }
}

/// Publishes `pod` on a detached task so that the caller never waits on the
/// message bus.
pub(crate) fn spawn<P: Publish>(publisher: P, pod: Pod, source: &'static str, metrics: Metrics) {
    let span = info_span!(
        "notify",
        ns = %pod.namespace().unwrap_or_default(),
        name = %pod.name_any(),
    );
    tokio::spawn(
        async move {
            publish(&publisher, &pod, source, &metrics).await;
        }
        .instrument(span),
    );
}
