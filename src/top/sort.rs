use std::cmp::Ordering;

use anyhow::{bail, Result};

use super::stats::ConnStats;

/// Sortable snapshot columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Pid,
    Comm,
    Family,
    Saddr,
    Daddr,
    Sport,
    Dport,
    Sent,
    Received,
}

/// All column tokens accepted by the sort-by parameter.
pub const ALL_COLUMNS: &[Column] = &[
    Column::Pid,
    Column::Comm,
    Column::Family,
    Column::Saddr,
    Column::Daddr,
    Column::Sport,
    Column::Dport,
    Column::Sent,
    Column::Received,
];

impl Column {
    pub fn as_str(self) -> &'static str {
        match self {
            Column::Pid => "pid",
            Column::Comm => "comm",
            Column::Family => "family",
            Column::Saddr => "saddr",
            Column::Daddr => "daddr",
            Column::Sport => "sport",
            Column::Dport => "dport",
            Column::Sent => "sent",
            Column::Received => "received",
        }
    }

    fn parse(token: &str) -> Option<Column> {
        ALL_COLUMNS
            .iter()
            .copied()
            .find(|col| col.as_str() == token)
    }

    /// Ascending comparison of one column across two rows.
    fn cmp_rows(self, a: &ConnStats, b: &ConnStats) -> Ordering {
        match self {
            Column::Pid => a.pid.cmp(&b.pid),
            Column::Comm => a.comm.cmp(&b.comm),
            Column::Family => a.family.as_u8().cmp(&b.family.as_u8()),
            Column::Saddr => a.saddr.cmp(&b.saddr),
            Column::Daddr => a.daddr.cmp(&b.daddr),
            Column::Sport => a.sport.cmp(&b.sport),
            Column::Dport => a.dport.cmp(&b.dport),
            Column::Sent => a.sent.cmp(&b.sent),
            Column::Received => a.received.cmp(&b.received),
        }
    }
}

/// Sort direction for one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// One (column, direction) pair of a sort specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub column: Column,
    pub direction: SortDirection,
}

/// Ordered multi-column sort specification.
///
/// Ties on a key are broken by subsequent keys; the final tie-break is the
/// row's insertion sequence so output is deterministic for unchanged input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    keys: Vec<SortKey>,
}

/// Default sort: highest senders first, received bytes as the tie-break.
pub const SORT_BY_DEFAULT: &str = "-sent,-received";

impl SortSpec {
    /// Parse a comma-separated sort-by parameter. A leading `-` on a token
    /// selects descending order. Unknown columns are rejected here, before
    /// the sampler ever runs.
    pub fn parse(s: &str) -> Result<Self> {
        let mut keys = Vec::new();

        for token in s.split(',') {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }

            let (name, direction) = match token.strip_prefix('-') {
                Some(name) => (name, SortDirection::Descending),
                None => (token, SortDirection::Ascending),
            };

            let Some(column) = Column::parse(name) else {
                let valid: Vec<&str> = ALL_COLUMNS.iter().map(|c| c.as_str()).collect();
                bail!(
                    "unknown sort column {name:?}: valid columns are {}",
                    valid.join(",")
                );
            };

            keys.push(SortKey { column, direction });
        }

        if keys.is_empty() {
            bail!("sort-by must name at least one column");
        }

        Ok(Self { keys })
    }

    pub fn keys(&self) -> &[SortKey] {
        &self.keys
    }

    /// Full multi-key comparison including the deterministic seq fallback.
    pub fn cmp_rows(&self, a: &ConnStats, b: &ConnStats) -> Ordering {
        for key in &self.keys {
            let ord = match key.direction {
                SortDirection::Ascending => key.column.cmp_rows(a, b),
                SortDirection::Descending => key.column.cmp_rows(b, a),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }

        a.seq.cmp(&b.seq)
    }

    /// Sort rows in place per this specification.
    pub fn sort(&self, rows: &mut [ConnStats]) {
        rows.sort_by(|a, b| self.cmp_rows(a, b));
    }
}

impl Default for SortSpec {
    fn default() -> Self {
        Self::parse(SORT_BY_DEFAULT).expect("default sort spec is valid")
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};

    use crate::tracer::IpFamily;

    use super::*;

    fn row(pid: u32, sent: u64, received: u64, seq: u64) -> ConnStats {
        ConnStats {
            pid,
            comm: format!("proc-{pid}"),
            uid: 0,
            gid: 0,
            user_name: String::new(),
            group_name: String::new(),
            saddr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            daddr: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            sport: 40000,
            dport: 443,
            family: IpFamily::V4,
            sent,
            received,
            seq,
        }
    }

    #[test]
    fn test_parse_default() {
        let spec = SortSpec::default();
        assert_eq!(spec.keys().len(), 2);
        assert_eq!(spec.keys()[0].column, Column::Sent);
        assert_eq!(spec.keys()[0].direction, SortDirection::Descending);
        assert_eq!(spec.keys()[1].column, Column::Received);
        assert_eq!(spec.keys()[1].direction, SortDirection::Descending);
    }

    #[test]
    fn test_parse_mixed_directions() {
        let spec = SortSpec::parse("pid,-sent, comm").expect("valid");
        assert_eq!(
            spec.keys(),
            &[
                SortKey {
                    column: Column::Pid,
                    direction: SortDirection::Ascending,
                },
                SortKey {
                    column: Column::Sent,
                    direction: SortDirection::Descending,
                },
                SortKey {
                    column: Column::Comm,
                    direction: SortDirection::Ascending,
                },
            ],
        );
    }

    #[test]
    fn test_parse_rejects_unknown_column() {
        let err = SortSpec::parse("sent,bogus").expect_err("should fail");
        let msg = err.to_string();
        assert!(msg.contains("unknown sort column \"bogus\""));
        assert!(msg.contains("received"));
    }

    #[test]
    fn test_parse_rejects_empty() {
        assert!(SortSpec::parse("").is_err());
        assert!(SortSpec::parse(" , ,").is_err());
    }

    #[test]
    fn test_sort_descending_by_sent() {
        let spec = SortSpec::parse("-sent").expect("valid");
        let mut rows = vec![row(1, 5, 0, 0), row(2, 3, 0, 1), row(3, 9, 0, 2), row(4, 1, 0, 3)];

        spec.sort(&mut rows);

        let sent: Vec<u64> = rows.iter().map(|r| r.sent).collect();
        assert_eq!(sent, vec![9, 5, 3, 1]);
    }

    #[test]
    fn test_tie_broken_by_second_key() {
        let spec = SortSpec::parse("-sent,-received").expect("valid");
        let mut rows = vec![row(1, 10, 3, 0), row(2, 10, 7, 1)];

        spec.sort(&mut rows);

        assert_eq!(rows[0].pid, 2);
        assert_eq!(rows[1].pid, 1);
    }

    #[test]
    fn test_all_equal_falls_back_to_insertion_order() {
        let spec = SortSpec::parse("-sent").expect("valid");
        let mut rows = vec![row(3, 10, 0, 2), row(1, 10, 0, 0), row(2, 10, 0, 1)];

        spec.sort(&mut rows);
        let pids: Vec<u32> = rows.iter().map(|r| r.pid).collect();
        assert_eq!(pids, vec![1, 2, 3]);

        // Repeated sorts of the same input stay stable.
        spec.sort(&mut rows);
        let again: Vec<u32> = rows.iter().map(|r| r.pid).collect();
        assert_eq!(again, pids);
    }

    #[test]
    fn test_sort_ascending_by_pid() {
        let spec = SortSpec::parse("pid").expect("valid");
        let mut rows = vec![row(9, 0, 0, 0), row(2, 0, 0, 1), row(5, 0, 0, 2)];

        spec.sort(&mut rows);
        let pids: Vec<u32> = rows.iter().map(|r| r.pid).collect();
        assert_eq!(pids, vec![2, 5, 9]);
    }
}
