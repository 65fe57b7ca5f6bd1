use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;

use crate::resolver::enrich::{Enrichable, ResolvableGroup, ResolvableUser};
use crate::tracer::{Direction, IpFamily, TrafficSample};

/// Identity key of one live-table row: the connection 4-tuple plus the
/// owning process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnKey {
    pub pid: u32,
    pub saddr: IpAddr,
    pub daddr: IpAddr,
    pub sport: u16,
    pub dport: u16,
    pub family: IpFamily,
}

impl ConnKey {
    fn from_sample(sample: &TrafficSample) -> Self {
        Self {
            pid: sample.pid,
            saddr: sample.saddr,
            daddr: sample.daddr,
            sport: sample.sport,
            dport: sample.dport,
            family: sample.family,
        }
    }
}

/// Accumulating value of one live-table row.
#[derive(Debug)]
struct ConnRow {
    comm: String,
    uid: u32,
    gid: u32,
    sent: u64,
    received: u64,
    /// Insertion order within this table's lifetime; deterministic sort
    /// fallback.
    seq: u64,
}

/// One snapshot row: the serialized wire form of a counter entry.
///
/// `user_name`/`group_name` start empty and are filled in by the enricher;
/// uid/gid are carried through raw either way.
#[derive(Debug, Clone, Serialize)]
pub struct ConnStats {
    pub pid: u32,
    pub comm: String,
    pub uid: u32,
    pub gid: u32,
    #[serde(rename = "user")]
    pub user_name: String,
    #[serde(rename = "group")]
    pub group_name: String,
    pub saddr: IpAddr,
    pub daddr: IpAddr,
    pub sport: u16,
    pub dport: u16,
    pub family: IpFamily,
    pub sent: u64,
    pub received: u64,
    #[serde(skip)]
    pub seq: u64,
}

impl ResolvableUser for ConnStats {
    fn uid(&self) -> u32 {
        self.uid
    }

    fn set_user_name(&mut self, name: String) {
        self.user_name = name;
    }
}

impl ResolvableGroup for ConnStats {
    fn gid(&self) -> u32 {
        self.gid
    }

    fn set_group_name(&mut self, name: String) {
        self.group_name = name;
    }
}

impl Enrichable for ConnStats {
    fn as_user_resolvable(&mut self) -> Option<&mut dyn ResolvableUser> {
        Some(self)
    }

    fn as_group_resolvable(&mut self) -> Option<&mut dyn ResolvableGroup> {
        Some(self)
    }
}

/// Live per-connection counter table for one sampling interval.
///
/// `DashMap` gives writers independent per-entry locking; the table itself
/// is swapped out wholesale by the sampler, so no global writer/reader lock
/// is needed.
pub struct LiveTable {
    rows: DashMap<ConnKey, ConnRow>,
    next_seq: AtomicU64,
}

impl LiveTable {
    pub fn new() -> Self {
        Self {
            rows: DashMap::with_capacity(64),
            next_seq: AtomicU64::new(0),
        }
    }

    /// Accumulate one traffic sample into its connection's row.
    pub fn record(&self, sample: &TrafficSample) {
        let key = ConnKey::from_sample(sample);

        let mut row = self.rows.entry(key).or_insert_with(|| ConnRow {
            comm: sample.comm.clone(),
            uid: sample.uid,
            gid: sample.gid,
            sent: 0,
            received: 0,
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
        });

        match sample.direction {
            Direction::Tx => row.sent = row.sent.saturating_add(sample.bytes),
            Direction::Rx => row.received = row.received.saturating_add(sample.bytes),
        }
    }

    /// Number of live rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Copy all rows into snapshot form.
    ///
    /// Taken by reference because a writer that loaded the table just
    /// before a rotation may still hold the Arc briefly.
    pub fn to_stats(&self) -> Vec<ConnStats> {
        let mut stats = Vec::with_capacity(self.rows.len());

        for entry in self.rows.iter() {
            let (key, row) = entry.pair();
            stats.push(ConnStats {
                pid: key.pid,
                comm: row.comm.clone(),
                uid: row.uid,
                gid: row.gid,
                user_name: String::new(),
                group_name: String::new(),
                saddr: key.saddr,
                daddr: key.daddr,
                sport: key.sport,
                dport: key.dport,
                family: key.family,
                sent: row.sent,
                received: row.received,
                seq: row.seq,
            });
        }

        stats
    }

    /// Drain all rows into snapshot form. Consumes the table.
    pub fn into_stats(self) -> Vec<ConnStats> {
        self.to_stats()
    }
}

impl Default for LiveTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Atomic live-table holder with lock-free swap.
///
/// Writers `load()` the current table on the hot path; the sampler swaps a
/// fresh table in at each tick so a snapshot observes one consistent point
/// in time and the non-cumulative reset is a single pointer exchange.
pub struct AtomicTable {
    inner: arc_swap::ArcSwapOption<LiveTable>,
}

impl AtomicTable {
    pub fn new() -> Self {
        Self {
            inner: arc_swap::ArcSwapOption::new(Some(Arc::new(LiveTable::new()))),
        }
    }

    /// Loads the current table, returning a clone of the Arc.
    pub fn load(&self) -> Option<Arc<LiveTable>> {
        self.inner.load_full()
    }

    /// Swaps in a fresh empty table, returning the outgoing one.
    pub fn rotate(&self) -> Option<Arc<LiveTable>> {
        self.inner.swap(Some(Arc::new(LiveTable::new())))
    }

    /// Takes the table out, leaving None. Used at shutdown.
    pub fn take(&self) -> Option<Arc<LiveTable>> {
        self.inner.swap(None)
    }
}

impl Default for AtomicTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Cloneable writer handle handed to the tracer side.
#[derive(Clone)]
pub struct TableWriter {
    table: Arc<AtomicTable>,
}

impl TableWriter {
    pub fn new(table: Arc<AtomicTable>) -> Self {
        Self { table }
    }

    /// Record one sample into the live table. A no-op after shutdown.
    pub fn record(&self, sample: &TrafficSample) {
        if let Some(table) = self.table.load() {
            table.record(sample);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    fn sample(pid: u32, dport: u16, direction: Direction, bytes: u64) -> TrafficSample {
        TrafficSample {
            pid,
            comm: format!("proc-{pid}"),
            uid: 1000,
            gid: 1000,
            saddr: IpAddr::V4(Ipv4Addr::new(192, 168, 0, 2)),
            daddr: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            sport: 40000,
            dport,
            family: IpFamily::V4,
            direction,
            bytes,
        }
    }

    #[test]
    fn test_record_accumulates_per_connection() {
        let table = LiveTable::new();

        table.record(&sample(1, 443, Direction::Tx, 100));
        table.record(&sample(1, 443, Direction::Tx, 50));
        table.record(&sample(1, 443, Direction::Rx, 7));
        table.record(&sample(1, 80, Direction::Tx, 1));

        assert_eq!(table.len(), 2);

        let stats = table.into_stats();
        let https = stats.iter().find(|s| s.dport == 443).expect("row exists");
        assert_eq!(https.sent, 150);
        assert_eq!(https.received, 7);
        assert_eq!(https.comm, "proc-1");
        assert_eq!(https.uid, 1000);
    }

    #[test]
    fn test_seq_follows_insertion_order() {
        let table = LiveTable::new();

        table.record(&sample(1, 443, Direction::Tx, 1));
        table.record(&sample(2, 443, Direction::Tx, 1));
        table.record(&sample(1, 443, Direction::Tx, 1)); // existing row, no new seq

        let mut stats = table.into_stats();
        stats.sort_by_key(|s| s.seq);

        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].pid, 1);
        assert_eq!(stats[0].seq, 0);
        assert_eq!(stats[1].pid, 2);
        assert_eq!(stats[1].seq, 1);
    }

    #[test]
    fn test_rotate_resets_table() {
        let table = Arc::new(AtomicTable::new());
        let writer = TableWriter::new(Arc::clone(&table));

        writer.record(&sample(1, 443, Direction::Tx, 10));

        let old = table.rotate().expect("table present");
        assert_eq!(old.len(), 1);

        let fresh = table.load().expect("fresh table present");
        assert!(fresh.is_empty());
    }

    #[test]
    fn test_writer_noop_after_take() {
        let table = Arc::new(AtomicTable::new());
        let writer = TableWriter::new(Arc::clone(&table));

        table.take();
        writer.record(&sample(1, 443, Direction::Tx, 10));

        assert!(table.load().is_none());
    }

    #[test]
    fn test_concurrent_writers() {
        use std::thread;

        let table = Arc::new(AtomicTable::new());
        let mut handles = Vec::new();

        for _ in 0..4 {
            let writer = TableWriter::new(Arc::clone(&table));
            handles.push(thread::spawn(move || {
                for _ in 0..1000 {
                    writer.record(&sample(7, 443, Direction::Tx, 1));
                }
            }));
        }

        for h in handles {
            h.join().expect("thread panicked");
        }

        let live = table.take().expect("table present");
        let stats = Arc::into_inner(live).expect("sole owner").into_stats();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].sent, 4000);
    }

    #[test]
    fn test_stats_serialize_shape() {
        let table = LiveTable::new();
        table.record(&sample(42, 443, Direction::Tx, 9));

        let stats = table.into_stats();
        let json = serde_json::to_value(&stats[0]).expect("serialize");

        assert_eq!(json["pid"], 42);
        assert_eq!(json["sent"], 9);
        assert_eq!(json["family"], "v4");
        assert_eq!(json["user"], "");
        // seq is internal only.
        assert!(json.get("seq").is_none());
    }
}
