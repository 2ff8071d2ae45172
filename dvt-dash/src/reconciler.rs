//! Run-state reconciliation.
//!
//! Two independent projections are kept in one container: the set of test
//! ids the live channel reports as running, and the last results snapshot
//! pulled from the API. Everything here is synchronous; the caller owns the
//! network reads and hands their outcome back with [`Reconciler::apply_refresh`].

use crate::api::{ApiClient, ApiError};
use chrono::{DateTime, Utc};
use dvt_common::{LiveEvent, RefreshOrdering, RunOutcome, TestCategory, TestId, TestResult};
use std::collections::{BTreeSet, HashSet, VecDeque};
use std::fmt;
use tracing::{debug, info, warn};

/// Terminated ids remembered so a late duplicate `test_started` cannot
/// resurrect a finished run.
const TOMBSTONE_CAPACITY: usize = 4096;

/// Ids the live channel currently reports as running.
#[derive(Debug, Default, Clone)]
pub struct ActiveTestSet {
    ids: BTreeSet<TestId>,
}

impl ActiveTestSet {
    pub fn insert(&mut self, id: TestId) -> bool {
        self.ids.insert(id)
    }

    pub fn remove(&mut self, id: &TestId) -> bool {
        self.ids.remove(id)
    }

    pub fn contains(&self, id: &TestId) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &TestId> {
        self.ids.iter()
    }

    /// Active ids that denote `category`.
    pub fn in_category(&self, category: TestCategory) -> impl Iterator<Item = &TestId> {
        self.ids
            .iter()
            .filter(move |id| TestCategory::for_test_id(id.as_str()) == Some(category))
    }
}

/// The last results snapshot, in server order.
#[derive(Debug, Default, Clone)]
pub struct ResultCache {
    results: Vec<TestResult>,
    fetched_at: Option<DateTime<Utc>>,
}

impl ResultCache {
    pub fn replace(&mut self, results: Vec<TestResult>) {
        self.results = results;
        self.fetched_at = Some(Utc::now());
    }

    pub fn as_slice(&self) -> &[TestResult] {
        &self.results
    }

    pub fn fetched_at(&self) -> Option<DateTime<Utc>> {
        self.fetched_at
    }

    /// Entry of `test_type` with the greatest `start_time`. On a tie the
    /// entry appearing later in the snapshot wins.
    pub fn latest_for(&self, test_type: &str) -> Option<&TestResult> {
        self.results
            .iter()
            .filter(|r| r.test_type == test_type)
            .fold(None, |best: Option<&TestResult>, r| match best {
                Some(b) if b.start_time > r.start_time => Some(b),
                _ => Some(r),
            })
    }

    /// Newest first by `start_time`; ties keep reverse snapshot order.
    pub fn newest_first(&self) -> Vec<&TestResult> {
        let mut rows: Vec<&TestResult> = self.results.iter().rev().collect();
        rows.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        rows
    }

    pub fn find(&self, id: &TestId) -> Option<&TestResult> {
        self.results.iter().find(|r| &r.id == id)
    }
}

/// Sequence number of one results read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RefreshTicket(u64);

impl RefreshTicket {
    pub fn sequence(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RefreshTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What [`Reconciler::apply_refresh`] did with a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshApplied {
    Applied { count: usize },
    /// Older than a snapshot already applied (sequenced ordering only).
    Discarded { newest: RefreshTicket },
    /// The read failed; the cache is untouched.
    Failed { error: String },
}

#[derive(Debug, Default)]
struct Tombstones {
    order: VecDeque<TestId>,
    ids: HashSet<TestId>,
}

impl Tombstones {
    fn insert(&mut self, id: TestId) {
        if self.ids.insert(id.clone()) {
            self.order.push_back(id);
            if self.order.len() > TOMBSTONE_CAPACITY
                && let Some(oldest) = self.order.pop_front()
            {
                self.ids.remove(&oldest);
            }
        }
    }

    fn contains(&self, id: &TestId) -> bool {
        self.ids.contains(id)
    }
}

/// Single owner of run state. Mutated only from the dashboard loop.
#[derive(Debug, Default)]
pub struct Reconciler {
    active: ActiveTestSet,
    results: ResultCache,
    terminated: Tombstones,
    ordering: RefreshOrdering,
    next_ticket: u64,
    newest_applied: Option<RefreshTicket>,
    last_error: Option<String>,
}

impl Reconciler {
    pub fn new(ordering: RefreshOrdering) -> Self {
        Self {
            ordering,
            ..Self::default()
        }
    }

    pub fn ordering(&self) -> RefreshOrdering {
        self.ordering
    }

    pub fn active(&self) -> &ActiveTestSet {
        &self.active
    }

    pub fn results(&self) -> &ResultCache {
        &self.results
    }

    /// Message of the most recent failed refresh, cleared by the next
    /// successful one.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Mark `id` as running. Returns whether the set changed.
    pub fn on_run_started(&mut self, id: TestId) -> bool {
        if self.terminated.contains(&id) {
            debug!(test_id = %id, "ignoring start of an already terminated run");
            return false;
        }
        let inserted = self.active.insert(id.clone());
        if inserted {
            info!(test_id = %id, "run started");
        }
        inserted
    }

    /// Drop `id` from the running set and ask for a fresh snapshot.
    pub fn on_run_terminated(&mut self, id: &TestId, outcome: &RunOutcome) -> RefreshTicket {
        let was_active = self.active.remove(id);
        self.terminated.insert(id.clone());
        match outcome {
            RunOutcome::Completed { .. } => {
                info!(test_id = %id, was_active, "run completed");
            }
            RunOutcome::Failed { error } => {
                info!(test_id = %id, was_active, error = ?error, "run failed");
            }
        }
        self.request_refresh()
    }

    /// Allocate a ticket for a results read the caller is about to start.
    pub fn request_refresh(&mut self) -> RefreshTicket {
        self.next_ticket += 1;
        RefreshTicket(self.next_ticket)
    }

    /// Fold a finished results read into the cache.
    pub fn apply_refresh<E: fmt::Display>(
        &mut self,
        ticket: RefreshTicket,
        outcome: Result<Vec<TestResult>, E>,
    ) -> RefreshApplied {
        let results = match outcome {
            Ok(results) => results,
            Err(err) => {
                let error = err.to_string();
                warn!(%ticket, %error, "results refresh failed, keeping previous snapshot");
                self.last_error = Some(error.clone());
                return RefreshApplied::Failed { error };
            }
        };

        if self.ordering == RefreshOrdering::Sequenced
            && let Some(newest) = self.newest_applied
            && ticket < newest
        {
            debug!(%ticket, %newest, "discarding stale results snapshot");
            return RefreshApplied::Discarded { newest };
        }

        let count = results.len();
        self.results.replace(results);
        self.newest_applied = Some(self.newest_applied.map_or(ticket, |n| n.max(ticket)));
        self.last_error = None;
        debug!(%ticket, count, "results snapshot applied");
        RefreshApplied::Applied { count }
    }

    /// Request, perform and apply one read.
    pub async fn refresh_results(&mut self, api: &ApiClient) -> RefreshApplied {
        let ticket = self.request_refresh();
        let outcome: Result<Vec<TestResult>, ApiError> = api.list_results().await;
        self.apply_refresh(ticket, outcome)
    }

    /// Dispatch a live event. A terminated event yields the ticket of the
    /// refresh the caller must perform.
    pub fn handle_event(&mut self, event: &LiveEvent) -> Option<RefreshTicket> {
        match event {
            LiveEvent::Started { test_id, .. } => {
                self.on_run_started(test_id.clone());
                None
            }
            LiveEvent::Terminated {
                test_id, outcome, ..
            } => Some(self.on_run_terminated(test_id, outcome)),
        }
    }

    /// Forget running ids after the live channel was reopened; the new
    /// connection reports only future transitions.
    pub fn reset_active(&mut self) {
        if !self.active.is_empty() {
            info!(cleared = self.active.len(), "resetting active test set");
        }
        self.active.clear();
    }

    pub fn latest_result_for(&self, test_type: &str) -> Option<&TestResult> {
        self.results.latest_for(test_type)
    }

    /// Whether any active id denotes the category named by `category_id`
    /// (`boot-drive`, `boot_drive`, ...). Unknown names are never running.
    pub fn is_running(&self, category_id: &str) -> bool {
        TestCategory::from_id(category_id).is_some_and(|c| self.category_running(c))
    }

    pub fn category_running(&self, category: TestCategory) -> bool {
        self.active.in_category(category).next().is_some()
    }
}
