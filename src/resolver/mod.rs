pub mod enrich;
pub mod store;

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use thiserror::Error;
use tracing::{debug, warn};

use self::store::IdentityTable;

/// Default host identity sources.
pub const DEFAULT_PASSWD_PATH: &str = "/etc/passwd";
pub const DEFAULT_GROUP_PATH: &str = "/etc/group";

/// Errors surfaced by cache activation.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Neither identity source could be read; every lookup will fall back
    /// to the numeric form until the next activation cycle.
    #[error("no identity source readable: {user_err}; {group_err}")]
    SourceUnreadable {
        user_err: String,
        group_err: String,
    },
}

/// Refcounted uid/gid -> name resolution cache shared by all concurrently
/// active consumers.
///
/// The identity tables are materialized on the 0->1 `start` transition and
/// released on the 1->0 `stop` transition. The refcount and the populate /
/// teardown steps are guarded by one mutex so population happens exactly
/// once per activation cycle and no consumer observes a partially populated
/// table; lookups read through lock-free `ArcSwap` pointers.
///
/// Lookups never fail: an id missing from its table (or a table whose
/// source was unreadable) resolves to the decimal string of the id.
pub struct ResolverCache {
    passwd_path: PathBuf,
    group_path: PathBuf,

    /// Guards refcount mutation and table population/teardown.
    refcount: parking_lot::Mutex<u32>,

    users: ArcSwapOption<IdentityTable>,
    groups: ArcSwapOption<IdentityTable>,

    /// Number of 0->1 populations performed, observable in tests.
    populations: AtomicU64,
}

impl ResolverCache {
    /// Create an idle cache reading from the given identity files.
    pub fn new(passwd_path: impl Into<PathBuf>, group_path: impl Into<PathBuf>) -> Self {
        Self {
            passwd_path: passwd_path.into(),
            group_path: group_path.into(),
            refcount: parking_lot::Mutex::new(0),
            users: ArcSwapOption::empty(),
            groups: ArcSwapOption::empty(),
            populations: AtomicU64::new(0),
        }
    }

    /// Create an idle cache reading from the standard host paths.
    pub fn with_host_defaults() -> Self {
        Self::new(DEFAULT_PASSWD_PATH, DEFAULT_GROUP_PATH)
    }

    /// Register a consumer. The first consumer of an activation cycle
    /// populates both identity tables from the host files.
    ///
    /// A single unreadable source degrades that resolution kind to numeric
    /// fallback without failing the other; `SourceUnreadable` is returned
    /// only when neither table loaded. The refcount is incremented either
    /// way so `start`/`stop` pairing stays balanced.
    pub fn start(&self) -> Result<(), CacheError> {
        let mut refcount = self.refcount.lock();
        *refcount += 1;

        if *refcount > 1 {
            return Ok(());
        }

        self.populations.fetch_add(1, Ordering::Relaxed);

        let user_result = IdentityTable::load(&self.passwd_path);
        let group_result = IdentityTable::load(&self.group_path);

        let user_err = match user_result {
            Ok(table) => {
                debug!(entries = table.len(), path = %self.passwd_path.display(), "user table loaded");
                self.users.store(Some(Arc::new(table)));
                None
            }
            Err(e) => {
                warn!(error = %e, "user table unreadable, uid resolution degraded to numeric");
                Some(e.to_string())
            }
        };

        let group_err = match group_result {
            Ok(table) => {
                debug!(entries = table.len(), path = %self.group_path.display(), "group table loaded");
                self.groups.store(Some(Arc::new(table)));
                None
            }
            Err(e) => {
                warn!(error = %e, "group table unreadable, gid resolution degraded to numeric");
                Some(e.to_string())
            }
        };

        match (user_err, group_err) {
            (Some(user_err), Some(group_err)) => Err(CacheError::SourceUnreadable {
                user_err,
                group_err,
            }),
            _ => Ok(()),
        }
    }

    /// Deregister a consumer. The last consumer releases both tables.
    /// Never fails.
    pub fn stop(&self) {
        let mut refcount = self.refcount.lock();

        // A 0-refcount stop means an unpaired start/stop somewhere: a logic
        // bug, not a recoverable condition.
        assert!(*refcount > 0, "resolver cache refcount underflow");

        *refcount -= 1;

        if *refcount == 0 {
            self.users.store(None);
            self.groups.store(None);
            debug!("identity tables released");
        }
    }

    /// Resolve a uid to a user name, falling back to the decimal form.
    pub fn resolve_user(&self, uid: u32) -> String {
        resolve(&self.users, uid)
    }

    /// Resolve a gid to a group name, falling back to the decimal form.
    pub fn resolve_group(&self, gid: u32) -> String {
        resolve(&self.groups, gid)
    }

    /// Current number of active consumers.
    pub fn active_consumers(&self) -> u32 {
        *self.refcount.lock()
    }

    /// Number of table populations performed since construction.
    pub fn population_count(&self) -> u64 {
        self.populations.load(Ordering::Relaxed)
    }
}

fn resolve(table: &ArcSwapOption<IdentityTable>, id: u32) -> String {
    match table.load_full() {
        Some(table) => table
            .lookup(id)
            .map(str::to_string)
            .unwrap_or_else(|| id.to_string()),
        None => id.to_string(),
    }
}
