use crate::Pod;
use std::collections::BTreeMap;

/// Label set on pods that have been redirected.
pub const STOLEN_LABEL: &str = "pod-stolen";

/// Node selector key that matches nodes accepting stolen workloads.
pub const NODE_STOLEN_KEY: &str = "node-stolen";

/// Node selector key that pins a stolen workload to a specific node.
pub const NODE_ID_KEY: &str = "node-id";

pub const DEFAULT_NODE_ID: &str = "7388q9y8989qwyehadsbdf";

/// Returns a copy of `pod` whose scheduling constraints are redirected to the
/// node identified by `node_id`.
///
/// Any existing node selector is overwritten and the [`STOLEN_LABEL`] is set.
/// `pod` itself is left untouched.
pub fn steal(pod: &Pod, node_id: &str) -> Pod {
    let mut stolen = pod.clone();

    stolen.spec.get_or_insert_with(Default::default).node_selector = Some(BTreeMap::from([
        (NODE_STOLEN_KEY.to_string(), "true".to_string()),
        (NODE_ID_KEY.to_string(), node_id.to_string()),
    ]));

    stolen
        .metadata
        .labels
        .get_or_insert_with(Default::default)
        .insert(STOLEN_LABEL.to_string(), "true".to_string());

    stolen
}
