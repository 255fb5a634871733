use crate::boxes::NodeId;
use crate::issues::{ParseIssue, Severity};
use serde::Serialize;
use std::collections::HashMap;
use std::ops::Range;
use std::sync::Mutex;

/// Running tallies over everything the store has recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct IssueMetrics {
    pub error_count: usize,
    pub warning_count: usize,
    pub info_count: usize,
    pub deepest_affected_depth: usize,
}

impl IssueMetrics {
    pub fn count(&self, severity: Severity) -> usize {
        match severity {
            Severity::Error => self.error_count,
            Severity::Warning => self.warning_count,
            Severity::Info => self.info_count,
        }
    }

    pub fn total(&self) -> usize {
        self.error_count + self.warning_count + self.info_count
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssueSummary {
    pub metrics: IssueMetrics,
    pub total_count: usize,
}

#[derive(Default)]
struct StoreState {
    issues: Vec<ParseIssue>,
    by_node: HashMap<NodeId, Vec<ParseIssue>>,
    metrics: IssueMetrics,
}

impl StoreState {
    fn append(&mut self, issue: ParseIssue, depth: Option<usize>) {
        for node in &issue.affected_nodes {
            self.by_node.entry(*node).or_default().push(issue.clone());
        }
        match issue.severity {
            Severity::Error => self.metrics.error_count += 1,
            Severity::Warning => self.metrics.warning_count += 1,
            Severity::Info => self.metrics.info_count += 1,
        }
        // Without an explicit depth the affected-node count stands in for it.
        let resolved = depth.unwrap_or(issue.affected_nodes.len());
        self.metrics.deepest_affected_depth = self.metrics.deepest_affected_depth.max(resolved);
        self.issues.push(issue);
    }

    fn clear(&mut self) {
        self.issues.clear();
        self.by_node.clear();
        self.metrics = IssueMetrics::default();
    }
}

/// Single owner of all parse diagnostics, decoupled from the tree so they
/// can be queried while a traversal is still running.
///
/// All mutation funnels through one mutex, giving a total order over
/// recorded issues no matter which thread reports them; readers always see
/// an issue list and metrics that agree with each other.
#[derive(Default)]
pub struct IssueStore {
    state: Mutex<StoreState>,
}

impl IssueStore {
    pub fn new() -> Self {
        IssueStore::default()
    }

    pub fn record(&self, issue: ParseIssue, depth: Option<usize>) {
        self.lock().append(issue, depth);
    }

    pub fn record_all(&self, issues: impl IntoIterator<Item = ParseIssue>) {
        let mut state = self.lock();
        for issue in issues {
            state.append(issue, None);
        }
    }

    pub fn record_all_with(
        &self,
        issues: impl IntoIterator<Item = ParseIssue>,
        depth_resolver: impl Fn(&ParseIssue) -> Option<usize>,
    ) {
        let mut state = self.lock();
        for issue in issues {
            let depth = depth_resolver(&issue);
            state.append(issue, depth);
        }
    }

    /// Clear everything, then re-record `issues` in order. Used when a
    /// parse is restarted over the same store.
    pub fn replace_all(&self, issues: impl IntoIterator<Item = ParseIssue>) {
        log::debug!("issue store replaced");
        let mut state = self.lock();
        state.clear();
        for issue in issues {
            state.append(issue, None);
        }
    }

    pub fn replace_all_with(
        &self,
        issues: impl IntoIterator<Item = ParseIssue>,
        depth_resolver: impl Fn(&ParseIssue) -> Option<usize>,
    ) {
        log::debug!("issue store replaced");
        let mut state = self.lock();
        state.clear();
        for issue in issues {
            let depth = depth_resolver(&issue);
            state.append(issue, depth);
        }
    }

    pub fn reset(&self) {
        log::debug!("issue store reset");
        self.lock().clear();
    }

    /// Point lookup through the per-node index.
    pub fn issues_for_node(&self, node: NodeId) -> Vec<ParseIssue> {
        self.lock().by_node.get(&node).cloned().unwrap_or_default()
    }

    /// Issues whose own byte range half-open-intersects `range`. Issues
    /// without a byte range never match.
    pub fn issues_in_range(&self, range: Range<u64>) -> Vec<ParseIssue> {
        self.lock()
            .issues
            .iter()
            .filter(|issue| {
                issue
                    .byte_range
                    .as_ref()
                    .is_some_and(|r| intersects(r, &range))
            })
            .cloned()
            .collect()
    }

    pub fn issues_snapshot(&self) -> Vec<ParseIssue> {
        self.lock().issues.clone()
    }

    pub fn metrics_snapshot(&self) -> IssueMetrics {
        self.lock().metrics
    }

    pub fn summary(&self) -> IssueSummary {
        let state = self.lock();
        IssueSummary { metrics: state.metrics, total_count: state.issues.len() }
    }

    // A poisoned mutex only means another writer panicked mid-append; the
    // stored issues are still usable, so recover the guard instead of
    // propagating the panic.
    fn lock(&self) -> std::sync::MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn intersects(a: &Range<u64>, b: &Range<u64>) -> bool {
    a.start < b.end && b.start < a.end
}
