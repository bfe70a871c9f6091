//! Structured logging utilities.
//!
//! Provides tracing initialization and a node timer used by the graph
//! orchestrator to emit one structured record per node transition.

use std::time::Instant;

/// Initialize the global tracing subscriber.
///
/// Respects `RUST_LOG`; falls back to the configured level. Safe to call
/// more than once (subsequent calls are no-ops).
pub fn init_tracing(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Timer for a single graph node execution.
///
/// Logs the start at debug level on creation; [`NodeTimer::finish`] emits
/// one info/error record with the node name and elapsed milliseconds.
#[derive(Debug)]
pub struct NodeTimer {
    node: &'static str,
    start: Instant,
}

impl NodeTimer {
    /// Start timing a node.
    #[must_use]
    pub fn new(node: &'static str) -> Self {
        tracing::debug!(node = node, "node started");
        Self {
            node,
            start: Instant::now(),
        }
    }

    /// Finish the timer, logging success or the error label.
    pub fn finish(self, error: Option<&str>) {
        let elapsed_ms = self.start.elapsed().as_millis() as u64;
        match error {
            None => {
                tracing::info!(node = self.node, elapsed_ms, "node completed");
            }
            Some(e) => {
                tracing::error!(node = self.node, elapsed_ms, error = %e, "node failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_timer_finish_ok() {
        let timer = NodeTimer::new("route_query");
        timer.finish(None);
    }

    #[test]
    fn test_node_timer_finish_err() {
        let timer = NodeTimer::new("generate_sql");
        timer.finish(Some("generation_failed"));
    }
}
