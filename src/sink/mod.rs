use serde::Serialize;
use tracing::warn;

use crate::top::stats::ConnStats;

/// Host-supplied publish callback; receives one serialized document per tick.
pub type PublishFn = Box<dyn Fn(String) + Send + Sync>;

/// The wire event emitted once per tick: the ordered, truncated snapshot.
#[derive(Debug, Serialize)]
pub struct TopEvent {
    pub stats: Vec<ConnStats>,
}

/// Serializes snapshots and pushes them through the host's publish callback.
///
/// A serialization failure is logged and that tick's event dropped; it must
/// never take down the sampler or block later ticks.
pub struct StreamSink {
    publish: PublishFn,
}

impl StreamSink {
    pub fn new(publish: PublishFn) -> Self {
        Self { publish }
    }

    /// A sink that writes one JSON document per line to stdout.
    pub fn stdout() -> Self {
        Self::new(Box::new(|doc| println!("{doc}")))
    }

    /// Serialize and publish one snapshot event.
    pub fn emit(&self, event: &TopEvent) {
        match serde_json::to_string(event) {
            Ok(doc) => (self.publish)(doc),
            Err(e) => {
                warn!(error = %e, rows = event.stats.len(), "failed to serialize snapshot, skipping tick");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::{Arc, Mutex};

    use crate::tracer::IpFamily;

    use super::*;

    fn row(pid: u32, sent: u64) -> ConnStats {
        ConnStats {
            pid,
            comm: "curl".to_string(),
            uid: 1000,
            gid: 1000,
            user_name: "alice".to_string(),
            group_name: "staff".to_string(),
            saddr: IpAddr::V4(Ipv4Addr::new(192, 168, 0, 2)),
            daddr: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            sport: 40000,
            dport: 443,
            family: IpFamily::V4,
            sent,
            received: 0,
            seq: 0,
        }
    }

    fn capture_sink() -> (StreamSink, Arc<Mutex<Vec<String>>>) {
        let published = Arc::new(Mutex::new(Vec::new()));
        let store = Arc::clone(&published);
        let sink = StreamSink::new(Box::new(move |doc| {
            store.lock().expect("lock").push(doc);
        }));
        (sink, published)
    }

    #[test]
    fn test_emit_publishes_once_per_event() {
        let (sink, published) = capture_sink();

        sink.emit(&TopEvent {
            stats: vec![row(1, 100), row(2, 50)],
        });
        sink.emit(&TopEvent { stats: vec![] });

        let docs = published.lock().expect("lock");
        assert_eq!(docs.len(), 2);
    }

    #[test]
    fn test_emit_produces_ordered_json_rows() {
        let (sink, published) = capture_sink();

        sink.emit(&TopEvent {
            stats: vec![row(3, 900), row(1, 500)],
        });

        let docs = published.lock().expect("lock");
        let value: serde_json::Value = serde_json::from_str(&docs[0]).expect("valid json");

        let stats = value["stats"].as_array().expect("stats array");
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0]["pid"], 3);
        assert_eq!(stats[0]["sent"], 900);
        assert_eq!(stats[0]["user"], "alice");
        assert_eq!(stats[1]["pid"], 1);
    }

    #[test]
    fn test_emit_empty_snapshot_is_valid_event() {
        let (sink, published) = capture_sink();

        sink.emit(&TopEvent { stats: vec![] });

        let docs = published.lock().expect("lock");
        assert_eq!(docs[0], r#"{"stats":[]}"#);
    }
}
