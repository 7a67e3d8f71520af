use ahash::AHashSet as HashSet;
use std::{convert::Infallible, str::FromStr};

/// Namespaces that are never eligible for stealing, regardless of
/// configuration.
pub const PROTECTED_NAMESPACES: [&str; 9] = [
    "default",
    "kube-system",
    "kube-public",
    "kube-node-lease",
    "kube-admission",
    "kube-proxy",
    "kube-controller-manager",
    "kube-scheduler",
    "kube-dns",
];

/// Decides whether a workload's namespace excludes it from stealing.
///
/// A namespace is excluded when it is either one of the
/// [`PROTECTED_NAMESPACES`] or on the configured ignore list.
#[derive(Clone, Debug, Default)]
pub struct NamespacePolicy {
    ignored: HashSet<String>,
}

// === impl NamespacePolicy ===

impl NamespacePolicy {
    pub fn new<I, S>(ignored: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ignored.into_iter().collect()
    }

    pub fn is_excluded(&self, ns: &str) -> bool {
        PROTECTED_NAMESPACES.contains(&ns) || self.ignored.contains(ns)
    }

    /// Iterates over the configured ignore list (protected namespaces are not
    /// included).
    pub fn ignored(&self) -> impl Iterator<Item = &str> + '_ {
        self.ignored.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for NamespacePolicy {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self {
            ignored: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// Parses a comma-separated list of namespaces. Blank entries are dropped so
/// that an empty list never excludes the empty namespace.
impl FromStr for NamespacePolicy {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(s.split(',')
            .map(str::trim)
            .filter(|ns| !ns.is_empty())
            .collect())
    }
}
