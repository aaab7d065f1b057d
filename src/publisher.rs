use crate::ResultSet;
use std::fmt::Write;
use std::sync::{Arc, RwLock};

pub const DEFAULT_NAMESPACE: &str = "ping";

/// Holds the latest complete `ResultSet`.
///
/// Each publish replaces the whole snapshot. Readers keep the `Arc` they got and never
/// see a cycle that is still being assembled.
#[derive(Debug, Default)]
pub struct ResultPublisher {
    latest: RwLock<Arc<ResultSet>>,
}

impl ResultPublisher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, result_set: ResultSet) -> Arc<ResultSet> {
        let snapshot = Arc::new(result_set);
        // A poisoned lock still holds a complete snapshot, so it is safe to replace.
        let mut latest = self.latest.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        *latest = snapshot.clone();
        snapshot
    }

    #[must_use]
    pub fn snapshot(&self) -> Arc<ResultSet> {
        self.latest.read().unwrap_or_else(std::sync::PoisonError::into_inner).clone()
    }
}

/// Renders one line per identity and field:
/// `<namespace>_<field>{domain="<name>",addr="<address>"} <value>`.
#[must_use]
pub fn render_metrics(result_set: &ResultSet, namespace: &str) -> String {
    let mut out = String::new();
    for (id, stat) in result_set.iter() {
        let labels = format!("domain=\"{}\",addr=\"{}\"", escape_label(&id.name), id.addr);
        // writing to a String cannot fail
        let _ = writeln!(out, "{namespace}_max_delay{{{labels}}} {}", stat.max_delay_ms);
        let _ = writeln!(out, "{namespace}_min_delay{{{labels}}} {}", stat.min_delay_ms);
        let _ = writeln!(out, "{namespace}_avg_delay{{{labels}}} {}", stat.avg_delay_ms);
        let _ = writeln!(out, "{namespace}_send{{{labels}}} {}", stat.sent);
        let _ = writeln!(out, "{namespace}_lost{{{labels}}} {}", stat.lost());
    }
    out
}

fn escape_label(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}
