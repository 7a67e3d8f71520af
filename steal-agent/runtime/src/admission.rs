use crate::{
    core::{labels, patch, steal, Deployment, NamespacePolicy, Patch, Pod},
    metrics::Metrics,
    notify::{self, Publish},
};
use anyhow::{anyhow, Result};
use futures::future;
use http_body_util::BodyExt;
use hyper::{http, Request, Response};
use kube::{
    core::{admission::Operation, DynamicObject},
    Resource, ResourceExt,
};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, trace, warn};


/// Serves the mutating and validating webhooks.
#[derive(Clone)]
pub struct Admission<P> {
    mutate: Mutate<P>,
    validate: Validate,
}

/// Redirects eligible pods to the steal target and notifies the message bus.
#[derive(Clone, Debug)]
pub struct Mutate<P> {
    config: Arc<Config>,
    publisher: P,
    metrics: Metrics,
}

/// Rejects workloads that carry the marker label.
///
/// This inverts the marker's meaning relative to [`Mutate`], where a marked
/// workload is admitted unchanged.
#[derive(Clone, Debug)]
pub struct Validate {
    config: Arc<Config>,
    metrics: Metrics,
}

#[derive(Clone, Debug)]
pub struct Config {
    /// Label that opts a workload out of stealing.
    pub marker_label: String,
    pub namespaces: Arc<NamespacePolicy>,
    /// Node that stolen pods are redirected to.
    pub node_id: String,
}

/// The outcome of a single admission decision.
#[derive(Debug)]
pub enum Verdict {
    /// The request is not ours to judge; it is admitted unchanged.
    NoOpinion,
    Allow,
    Mutate(Patch),
    Deny(String),
    /// The decision could not be computed.
    Error(String),
}

pub trait Policy {
    fn decide(&self, req: &AdmissionRequest) -> Verdict;
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read request body: {0}")]
    Request(#[from] hyper::Error),

    #[error("failed to encode json response: {0}")]
    Json(#[from] serde_json::Error),
}

pub type AdmissionRequest = kube::core::admission::AdmissionRequest<DynamicObject>;
type AdmissionResponse = kube::core::admission::AdmissionResponse;
type AdmissionReview = kube::core::admission::AdmissionReview<DynamicObject>;

type Body = http_body_util::Full<bytes::Bytes>;

/// The webhook a request is addressed to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Webhook {
    Mutate,
    Validate,
}

// === impl Admission ===

impl<P: Publish> tower::Service<Request<hyper::body::Incoming>> for Admission<P> {
    type Response = Response<Body>;
    type Error = Error;
    type Future = future::BoxFuture<'static, Result<Response<Body>, Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::result::Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<hyper::body::Incoming>) -> Self::Future {
        trace!(?req);
        let Some(webhook) = route(req.method(), req.uri().path()) else {
            return Box::pin(future::ok(
                Response::builder()
                    .status(http::StatusCode::NOT_FOUND)
                    .body(Body::default())
                    .expect("not found response must be valid"),
            ));
        };

        let admission = self.clone();
        Box::pin(async move {
            let bytes = req.into_body().collect().await?.to_bytes();
            json_response(admission.review(webhook, &bytes))
        })
    }
}

impl<P: Publish> Admission<P> {
    pub fn new(config: Config, publisher: P, metrics: Metrics) -> Self {
        let config = Arc::new(config);
        Self {
            mutate: Mutate {
                config: config.clone(),
                publisher,
                metrics: metrics.clone(),
            },
            validate: Validate { config, metrics },
        }
    }

    /// Decodes an admission review from `body` and answers it with the
    /// `webhook` policy.
    fn review(&self, webhook: Webhook, body: &[u8]) -> AdmissionReview {
        let review: AdmissionReview = match serde_json::from_slice(body) {
            Ok(review) => review,
            Err(error) => {
                warn!(%error, "Failed to parse request body");
                return AdmissionResponse::invalid(error).into_review();
            }
        };
        trace!(?review);

        let req: AdmissionRequest = match review.try_into() {
            Ok(req) => req,
            Err(error) => {
                warn!(%error, "Invalid admission request");
                return AdmissionResponse::invalid(error).into_review();
            }
        };
        debug!(?req);

        if req.uid.is_empty() {
            warn!("Admission request missing uid");
            return AdmissionResponse::invalid("admission request missing uid").into_review();
        }

        let verdict = match webhook {
            Webhook::Mutate => self.mutate.decide(&req),
            Webhook::Validate => self.validate.decide(&req),
        };
        debug!(?verdict);

        let rsp = verdict.into_response(&req);
        debug!(?rsp);
        rsp.into_review()
    }
}

// === impl Mutate ===

impl<P: Publish> Policy for Mutate<P> {
    fn decide(&self, req: &AdmissionRequest) -> Verdict {
        let verdict = self.decide_pod(req);
        self.metrics.verdict("mutate", verdict.name());
        verdict
    }
}

impl<P: Publish> Mutate<P> {
    fn decide_pod(&self, req: &AdmissionRequest) -> Verdict {
        if !is_kind::<Pod>(req) {
            info!(kind = %req.kind.kind, "Ignoring unexpected resource kind");
            return Verdict::NoOpinion;
        }
        if req.operation != Operation::Create {
            info!(operation = ?req.operation, "Ignoring unexpected operation");
            return Verdict::NoOpinion;
        }

        let pod = match parse_object::<Pod>(req) {
            Ok(pod) => pod,
            Err(error) => {
                info!(%error, "Failed to decode pod");
                return Verdict::Deny(error.to_string());
            }
        };

        // Pods created by controllers may not carry a namespace until they are
        // persisted, so fall back to the request's namespace.
        let ns = pod
            .namespace()
            .or_else(|| req.namespace.clone())
            .unwrap_or_default();
        let name = pod.name_any();

        if labels::is_marked(pod.labels(), &self.config.marker_label) {
            info!(%ns, %name, label = %self.config.marker_label, "Pod opted out of stealing");
            return Verdict::Allow;
        }

        if self.config.namespaces.is_excluded(&ns) {
            info!(%ns, %name, "Ignoring pod in excluded namespace");
            return Verdict::NoOpinion;
        }

        let stolen = steal::steal(&pod, &self.config.node_id);
        let verdict = match patch::diff(&pod, &stolen) {
            Ok(patch) => {
                info!(%ns, %name, node = %self.config.node_id, "Stealing pod");
                Verdict::Mutate(patch)
            }
            Err(error) => {
                warn!(%error, %ns, %name, "Failed to compute pod patch");
                Verdict::Error(format!("failed to create patch: {error:#}"))
            }
        };

        notify::spawn(self.publisher.clone(), pod, "admission", self.metrics.clone());

        verdict
    }
}

// === impl Validate ===

impl Policy for Validate {
    fn decide(&self, req: &AdmissionRequest) -> Verdict {
        let verdict = self.decide_workload(req);
        self.metrics.verdict("validate", verdict.name());
        verdict
    }
}

impl Validate {
    fn decide_workload(&self, req: &AdmissionRequest) -> Verdict {
        let parsed = if is_kind::<Pod>(req) {
            parse_object::<Pod>(req).map(|pod| pod.metadata)
        } else if is_kind::<Deployment>(req) {
            parse_object::<Deployment>(req).map(|deploy| deploy.metadata)
        } else {
            info!(kind = %req.kind.kind, "Ignoring unexpected resource kind");
            return Verdict::NoOpinion;
        };

        let metadata = match parsed {
            Ok(metadata) => metadata,
            Err(error) => {
                info!(%error, kind = %req.kind.kind, "Failed to decode workload");
                return Verdict::Deny(error.to_string());
            }
        };

        let label = &self.config.marker_label;
        let marked = metadata
            .labels
            .as_ref()
            .is_some_and(|labels| labels::is_marked(labels, label));
        if marked {
            let name = metadata.name.unwrap_or_default();
            info!(%name, kind = %req.kind.kind, %label, "Denied");
            return Verdict::Deny(format!(
                "{} {name} carries the {label} label and is not eligible for stealing",
                req.kind.kind
            ));
        }

        Verdict::Allow
    }
}

// === impl Verdict ===

impl Verdict {
    fn name(&self) -> &'static str {
        match self {
            Self::NoOpinion => "no_opinion",
            Self::Allow => "allow",
            Self::Mutate(_) => "mutate",
            Self::Deny(_) => "deny",
            Self::Error(_) => "error",
        }
    }

    /// Builds the response to `req`, which always carries the request's UID.
    pub fn into_response(self, req: &AdmissionRequest) -> AdmissionResponse {
        let rsp = AdmissionResponse::from(req);
        match self {
            Self::NoOpinion | Self::Allow => rsp,
            Self::Mutate(patch) => match rsp.with_patch(patch) {
                Ok(rsp) => rsp,
                Err(error) => {
                    warn!(%error, "Failed to serialize patch");
                    internal_error(req, format!("failed to serialize patch: {error}"))
                }
            },
            Self::Deny(message) => rsp.deny(message),
            Self::Error(message) => internal_error(req, message),
        }
    }
}

fn internal_error(req: &AdmissionRequest, message: String) -> AdmissionResponse {
    let mut rsp = AdmissionResponse::from(req).deny(message);
    rsp.result.code = http::StatusCode::INTERNAL_SERVER_ERROR.as_u16();
    rsp
}

/// Only `POST /mutate` and `POST /validate` are served.
fn route(method: &http::Method, path: &str) -> Option<Webhook> {
    if *method != http::Method::POST {
        return None;
    }
    match path {
        "/mutate" => Some(Webhook::Mutate),
        "/validate" => Some(Webhook::Validate),
        _ => None,
    }
}

fn is_kind<T>(req: &AdmissionRequest) -> bool
where
    T: Resource,
    T::DynamicType: Default,
{
    let dt = Default::default();
    req.kind.group.eq_ignore_ascii_case(&T::group(&dt))
        && req.kind.kind.eq_ignore_ascii_case(&T::kind(&dt))
}

fn json_response(rsp: AdmissionReview) -> Result<Response<Body>, Error> {
    let bytes = serde_json::to_vec(&rsp)?;
    Ok(Response::builder()
        .status(http::StatusCode::OK)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(Body::from(bytes))
        .expect("admission review response must be valid"))
}

fn parse_object<T: DeserializeOwned>(req: &AdmissionRequest) -> Result<T> {
    let obj = req
        .object
        .as_ref()
        .ok_or_else(|| anyhow!("admission request missing 'object'"))?;
    let value = serde_json::to_value(obj)?;
    Ok(serde_json::from_value(value)?)
}
