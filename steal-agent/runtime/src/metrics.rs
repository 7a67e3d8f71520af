use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family},
    registry::Registry,
};

#[derive(Clone, Debug, Default)]
pub struct Metrics {
    verdicts: Family<VerdictLabels, Counter>,
    notifications: Family<NotifyLabels, Counter>,
    watch_events: Family<EventLabels, Counter>,
}

#[derive(Clone, Hash, PartialEq, Eq, EncodeLabelSet, Debug)]
struct VerdictLabels {
    webhook: &'static str,
    verdict: &'static str,
}

#[derive(Clone, Hash, PartialEq, Eq, EncodeLabelSet, Debug)]
struct NotifyLabels {
    source: &'static str,
    result: &'static str,
}

#[derive(Clone, Hash, PartialEq, Eq, EncodeLabelSet, Debug)]
struct EventLabels {
    event: &'static str,
}

// === impl Metrics ===

impl Metrics {
    pub fn register(reg: &mut Registry) -> Self {
        let metrics = Self::default();

        reg.register(
            "admission_verdicts",
            "Total number of admission verdicts by webhook and outcome",
            metrics.verdicts.clone(),
        );

        reg.register(
            "notifications",
            "Total number of workload notifications by source and result",
            metrics.notifications.clone(),
        );

        reg.register(
            "watch_events",
            "Total number of pod watch events received",
            metrics.watch_events.clone(),
        );

        metrics
    }

    pub(crate) fn verdict(&self, webhook: &'static str, verdict: &'static str) {
        self.verdicts
            .get_or_create(&VerdictLabels { webhook, verdict })
            .inc();
    }

    /// Records the outcome of a publish. `result` is either `published` or the
    /// stage that failed.
    pub(crate) fn notification(&self, source: &'static str, result: &'static str) {
        self.notifications
            .get_or_create(&NotifyLabels { source, result })
            .inc();
    }

    pub(crate) fn watch_event(&self, event: &'static str) {
        self.watch_events.get_or_create(&EventLabels { event }).inc();
    }

    #[cfg(test)]
    pub(crate) fn verdict_count(&self, webhook: &'static str, verdict: &'static str) -> u64 {
        self.verdicts
            .get_or_create(&VerdictLabels { webhook, verdict })
            .get()
    }

    #[cfg(test)]
    pub(crate) fn notification_count(&self, source: &'static str, result: &'static str) -> u64 {
        self.notifications
            .get_or_create(&NotifyLabels { source, result })
            .get()
    }

    #[cfg(test)]
    pub(crate) fn watch_event_count(&self, event: &'static str) -> u64 {
        self.watch_events.get_or_create(&EventLabels { event }).get()
    }
}
