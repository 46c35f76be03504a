//! Catalog of watched workflow runs.
//!
//! The tracker owns two disjoint catalogs, active and archived. Each keeps a
//! map from run id to entry plus an explicit newest-first order. A run id lives
//! in exactly one catalog once it has been seen. The tracker is driven by a
//! single owner (the UI loop); fetch results are funneled to it serially.

use crate::model::{RunId, TrackedRun, WorkflowRun};
use crate::source::RunSource;
use std::collections::{HashMap, HashSet};
use time::OffsetDateTime;

/// Result of feeding one record through [`Tracker::upsert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpsertOutcome {
    /// The run appeared in the active view (first sighting or revival from the archive).
    pub is_new: bool,
    /// The stored status differs from the incoming one.
    pub status_changed: bool,
}

/// Owned copy of the full tracker state, suitable for serialization.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TrackerSnapshot {
    pub active: Vec<TrackedRun>,
    pub active_order: Vec<RunId>,
    pub archived: Vec<TrackedRun>,
    pub archived_order: Vec<RunId>,
}

/// Inconsistencies fixed while importing a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImportRepairs {
    /// Entries listed more than once; the last copy wins.
    pub duplicate_entries: usize,
    pub duplicate_order_ids: usize,
    pub dangling_order_ids: usize,
    pub unordered_entries: usize,
    pub cross_catalog_ids: usize,
}

impl ImportRepairs {
    pub fn total(&self) -> usize {
        self.duplicate_entries
            + self.duplicate_order_ids
            + self.dangling_order_ids
            + self.unordered_entries
            + self.cross_catalog_ids
    }
}

/// Map plus display order, kept in sync on every mutation.
#[derive(Debug, Default)]
struct Catalog {
    entries: HashMap<RunId, TrackedRun>,
    order: Vec<RunId>,
}

impl Catalog {
    fn contains(&self, id: RunId) -> bool {
        self.entries.contains_key(&id)
    }

    #[cfg(test)]
    fn get(&self, id: RunId) -> Option<&TrackedRun> {
        self.entries.get(&id)
    }

    fn get_mut(&mut self, id: RunId) -> Option<&mut TrackedRun> {
        self.entries.get_mut(&id)
    }

    /// Insert (or replace) and move to the front of the order.
    fn push_front(&mut self, entry: TrackedRun) {
        let id = entry.id();
        self.order.retain(|existing| *existing != id);
        self.order.insert(0, id);
        self.entries.insert(id, entry);
    }

    fn remove(&mut self, id: RunId) -> Option<TrackedRun> {
        let entry = self.entries.remove(&id)?;
        self.order.retain(|existing| *existing != id);
        Some(entry)
    }

    /// Entries in display order. Order ids without an entry are skipped.
    fn ordered(&self) -> impl Iterator<Item = &TrackedRun> + '_ {
        self.order.iter().filter_map(|id| self.entries.get(id))
    }

    fn len(&self) -> usize {
        self.order.len()
    }

    fn export(&self) -> (Vec<TrackedRun>, Vec<RunId>) {
        (self.ordered().cloned().collect(), self.order.clone())
    }

    /// Rebuild from raw parts, repairing order/map mismatches.
    fn rebuild(entries: Vec<TrackedRun>, order: Vec<RunId>, repairs: &mut ImportRepairs) -> Self {
        let mut map: HashMap<RunId, TrackedRun> = HashMap::with_capacity(entries.len());
        let mut arrival: Vec<RunId> = Vec::with_capacity(entries.len());
        for entry in entries {
            let id = entry.id();
            if map.insert(id, entry).is_some() {
                repairs.duplicate_entries += 1;
            } else {
                arrival.push(id);
            }
        }

        let mut seen = HashSet::with_capacity(order.len());
        let mut clean = Vec::with_capacity(order.len());
        for id in order {
            if !seen.insert(id) {
                repairs.duplicate_order_ids += 1;
                continue;
            }
            if !map.contains_key(&id) {
                repairs.dangling_order_ids += 1;
                continue;
            }
            clean.push(id);
        }
        for id in arrival {
            if !seen.contains(&id) {
                repairs.unordered_entries += 1;
                clean.push(id);
            }
        }

        Catalog {
            entries: map,
            order: clean,
        }
    }
}

/// Active and archived catalogs of tracked runs.
#[derive(Debug, Default)]
pub struct Tracker {
    active: Catalog,
    archived: Catalog,
}

impl Tracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store or refresh a run.
    ///
    /// An active run is updated in place and keeps its position. An archived
    /// run is revived to the front of the active order and reported as new.
    /// An unseen run is inserted at the front. A known source is never
    /// replaced by [`RunSource::Unknown`].
    pub fn upsert(&mut self, run: WorkflowRun, source: RunSource) -> UpsertOutcome {
        let id = run.id;

        if let Some(existing) = self.active.get_mut(id) {
            let status_changed = refresh_entry(existing, run, source);
            return UpsertOutcome {
                is_new: false,
                status_changed,
            };
        }

        if let Some(mut existing) = self.archived.remove(id) {
            let status_changed = refresh_entry(&mut existing, run, source);
            self.active.push_front(existing);
            return UpsertOutcome {
                is_new: true,
                status_changed,
            };
        }

        self.active.push_front(TrackedRun {
            run,
            source,
            added_at: OffsetDateTime::now_utc(),
            archived_at: None,
        });
        UpsertOutcome {
            is_new: true,
            status_changed: false,
        }
    }

    /// Move an active run to the front of the archive. Returns false if `id` is not active.
    pub fn archive(&mut self, id: RunId) -> bool {
        let Some(mut entry) = self.active.remove(id) else {
            return false;
        };
        entry.archived_at = Some(OffsetDateTime::now_utc());
        self.archived.push_front(entry);
        true
    }

    /// Move an archived run back to the front of the active order.
    /// Returns false if `id` is not archived.
    pub fn unarchive(&mut self, id: RunId) -> bool {
        let Some(entry) = self.archived.remove(id) else {
            return false;
        };
        self.active.push_front(entry);
        true
    }

    /// Runs of the chosen catalog in display order.
    pub fn visible_runs(&self, show_archived: bool) -> Vec<&TrackedRun> {
        self.catalog(show_archived).ordered().collect()
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub fn ids(&self, show_archived: bool) -> Vec<RunId> {
        self.catalog(show_archived).order.clone()
    }

    pub fn len_active(&self) -> usize {
        self.active.len()
    }

    pub fn len_archived(&self) -> usize {
        self.archived.len()
    }

    #[cfg(test)]
    pub fn get(&self, id: RunId) -> Option<&TrackedRun> {
        self.active.get(id).or_else(|| self.archived.get(id))
    }

    pub fn is_archived(&self, id: RunId) -> bool {
        self.archived.contains(id)
    }

    /// Owned copy of both catalogs; entries are listed in display order.
    pub fn export_state(&self) -> TrackerSnapshot {
        let (active, active_order) = self.active.export();
        let (archived, archived_order) = self.archived.export();
        TrackerSnapshot {
            active,
            active_order,
            archived,
            archived_order,
        }
    }

    /// Replace both catalogs with `snapshot`.
    ///
    /// Inconsistent input is repaired rather than rejected: duplicate and
    /// dangling order ids are dropped, unordered entries are appended, and an
    /// id present in both catalogs stays active only.
    pub fn import_state(&mut self, snapshot: TrackerSnapshot) -> ImportRepairs {
        let TrackerSnapshot {
            active,
            active_order,
            archived,
            archived_order,
        } = snapshot;

        let mut repairs = ImportRepairs::default();
        let active = Catalog::rebuild(active, active_order, &mut repairs);

        // Active ids found anywhere in the archived half, counted once each.
        let mut shadowed: HashSet<RunId> = HashSet::new();
        let archived: Vec<TrackedRun> = archived
            .into_iter()
            .filter(|entry| {
                let keep = !active.contains(entry.id());
                if !keep {
                    shadowed.insert(entry.id());
                }
                keep
            })
            .collect();
        let archived_order: Vec<RunId> = archived_order
            .into_iter()
            .filter(|id| {
                let keep = !active.contains(*id);
                if !keep {
                    shadowed.insert(*id);
                }
                keep
            })
            .collect();
        repairs.cross_catalog_ids = shadowed.len();
        let archived = Catalog::rebuild(archived, archived_order, &mut repairs);

        if repairs.total() > 0 {
            tracing::warn!(?repairs, "repaired inconsistent tracker state on import");
        }

        self.active = active;
        self.archived = archived;
        repairs
    }

    fn catalog(&self, show_archived: bool) -> &Catalog {
        if show_archived {
            &self.archived
        } else {
            &self.active
        }
    }
}

/// Replace the stored record, merge the source and report a status change.
fn refresh_entry(entry: &mut TrackedRun, run: WorkflowRun, source: RunSource) -> bool {
    let status_changed = entry.run.status != run.status;
    entry.run = run;
    if !entry.source.is_known() && source.is_known() {
        entry.source = source;
    }
    status_changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RunStatus;

    fn run(id: RunId, status: RunStatus) -> WorkflowRun {
        WorkflowRun {
            id,
            name: format!("job {id}"),
            workflow_name: "CI".into(),
            repo_full_name: "owner/repo".into(),
            status,
            ..Default::default()
        }
    }

    fn commit_source() -> RunSource {
        RunSource::Commit {
            owner: "owner".into(),
            repo: "repo".into(),
            sha: "abc1234".into(),
        }
    }

    fn outcome(is_new: bool, status_changed: bool) -> UpsertOutcome {
        UpsertOutcome {
            is_new,
            status_changed,
        }
    }

    #[test]
    fn upsert_archive_unarchive_lifecycle() {
        let mut tracker = Tracker::new();

        let first = tracker.upsert(run(1, RunStatus::Pending), commit_source());
        assert_eq!(first, outcome(true, false));
        assert_eq!(tracker.len_active(), 1);

        let second = tracker.upsert(run(1, RunStatus::Success), commit_source());
        assert_eq!(second, outcome(false, true));

        assert!(tracker.archive(1));
        assert_eq!(tracker.len_active(), 0);
        assert_eq!(tracker.len_archived(), 1);

        assert!(tracker.unarchive(1));
        assert_eq!(tracker.len_active(), 1);
        assert_eq!(tracker.len_archived(), 0);
        assert_eq!(tracker.ids(false), vec![1]);
    }

    #[test]
    fn newest_upsert_is_first() {
        let mut tracker = Tracker::new();
        for id in 1..=3 {
            tracker.upsert(run(id, RunStatus::Pending), RunSource::Unknown);
        }
        assert_eq!(tracker.ids(false), vec![3, 2, 1]);
        assert_eq!(tracker.len_active(), 3);
    }

    #[test]
    fn same_status_refresh_reports_nothing_and_keeps_position() {
        let mut tracker = Tracker::new();
        for id in 1..=3 {
            tracker.upsert(run(id, RunStatus::Pending), RunSource::Unknown);
        }

        let refreshed = tracker.upsert(run(1, RunStatus::Pending), commit_source());
        assert_eq!(refreshed, outcome(false, false));
        assert_eq!(tracker.ids(false), vec![3, 2, 1]);

        let changed = tracker.upsert(run(2, RunStatus::Failed), RunSource::Unknown);
        assert_eq!(changed, outcome(false, true));
        assert_eq!(tracker.ids(false), vec![3, 2, 1]);
    }

    #[test]
    fn upsert_replaces_stored_record() {
        let mut tracker = Tracker::new();
        tracker.upsert(run(7, RunStatus::Pending), RunSource::Unknown);

        let mut updated = run(7, RunStatus::Success);
        updated.name = "renamed".into();
        tracker.upsert(updated, RunSource::Unknown);

        let stored = tracker.get(7).unwrap();
        assert_eq!(stored.run.name, "renamed");
        assert_eq!(stored.run.status, RunStatus::Success);
    }

    #[test]
    fn known_source_is_never_downgraded() {
        let mut tracker = Tracker::new();
        tracker.upsert(run(5, RunStatus::Pending), RunSource::Unknown);
        assert_eq!(tracker.get(5).unwrap().source, RunSource::Unknown);

        tracker.upsert(run(5, RunStatus::Pending), commit_source());
        assert_eq!(tracker.get(5).unwrap().source, commit_source());

        tracker.upsert(run(5, RunStatus::Pending), RunSource::Unknown);
        assert_eq!(tracker.get(5).unwrap().source, commit_source());

        let pr = RunSource::PullRequest {
            owner: "owner".into(),
            repo: "repo".into(),
            number: 9,
        };
        tracker.upsert(run(5, RunStatus::Pending), pr);
        assert_eq!(tracker.get(5).unwrap().source, commit_source());
    }

    #[test]
    fn added_at_survives_updates_and_archive_cycles() {
        let mut tracker = Tracker::new();
        tracker.upsert(run(3, RunStatus::Pending), RunSource::Unknown);
        let added_at = tracker.get(3).unwrap().added_at;

        tracker.upsert(run(3, RunStatus::Success), RunSource::Unknown);
        tracker.archive(3);
        assert!(tracker.get(3).unwrap().archived_at.is_some());
        tracker.unarchive(3);
        tracker.archive(3);
        tracker.upsert(run(3, RunStatus::Failed), RunSource::Unknown);

        assert_eq!(tracker.get(3).unwrap().added_at, added_at);
    }

    #[test]
    fn archive_moves_between_views() {
        let mut tracker = Tracker::new();
        tracker.upsert(run(1, RunStatus::Pending), RunSource::Unknown);
        tracker.upsert(run(2, RunStatus::Pending), RunSource::Unknown);

        assert!(tracker.archive(2));
        let active: Vec<RunId> = tracker.visible_runs(false).iter().map(|r| r.id()).collect();
        let archived: Vec<RunId> = tracker.visible_runs(true).iter().map(|r| r.id()).collect();
        assert_eq!(active, vec![1]);
        assert_eq!(archived, vec![2]);
        assert!(tracker.is_archived(2));

        assert!(tracker.archive(1));
        assert_eq!(tracker.ids(true), vec![1, 2]);
    }

    #[test]
    fn archive_and_unarchive_reject_wrong_catalog() {
        let mut tracker = Tracker::new();
        tracker.upsert(run(1, RunStatus::Pending), RunSource::Unknown);

        assert!(!tracker.archive(99));
        assert!(!tracker.unarchive(1));
        assert_eq!((tracker.len_active(), tracker.len_archived()), (1, 0));

        tracker.archive(1);
        assert!(!tracker.archive(1));
        assert_eq!((tracker.len_active(), tracker.len_archived()), (0, 1));
        assert!(tracker.unarchive(1));
        assert!(!tracker.unarchive(1));
    }

    #[test]
    fn upsert_revives_archived_run_at_front() {
        let mut tracker = Tracker::new();
        tracker.upsert(run(42, RunStatus::Pending), RunSource::Unknown);
        tracker.upsert(run(43, RunStatus::Pending), RunSource::Unknown);
        tracker.archive(42);

        let revived = tracker.upsert(run(42, RunStatus::Success), commit_source());
        assert_eq!(revived, outcome(true, true));
        assert_eq!(tracker.len_active(), 2);
        assert_eq!(tracker.len_archived(), 0);
        assert_eq!(tracker.ids(false), vec![42, 43]);
        assert!(tracker.visible_runs(true).is_empty());
        assert_eq!(tracker.get(42).unwrap().source, commit_source());
    }

    #[test]
    fn revived_run_with_same_status_is_new_without_change() {
        let mut tracker = Tracker::new();
        tracker.upsert(run(42, RunStatus::Pending), RunSource::Unknown);
        tracker.archive(42);
        let revived = tracker.upsert(run(42, RunStatus::Pending), RunSource::Unknown);
        assert_eq!(revived, outcome(true, false));
    }

    #[test]
    fn unarchive_moves_to_front() {
        let mut tracker = Tracker::new();
        for id in 1..=3 {
            tracker.upsert(run(id, RunStatus::Pending), RunSource::Unknown);
        }
        tracker.archive(1);
        tracker.unarchive(1);
        assert_eq!(tracker.ids(false), vec![1, 3, 2]);
    }

    #[test]
    fn export_import_round_trip() {
        let mut tracker = Tracker::new();
        for id in 1..=5 {
            tracker.upsert(run(id, RunStatus::Pending), commit_source());
        }
        tracker.archive(2);
        tracker.archive(4);
        tracker.upsert(run(3, RunStatus::Success), RunSource::Unknown);

        let snapshot = tracker.export_state();
        let mut restored = Tracker::new();
        let repairs = restored.import_state(snapshot.clone());

        assert_eq!(repairs.total(), 0);
        assert_eq!(restored.ids(false), tracker.ids(false));
        assert_eq!(restored.ids(true), tracker.ids(true));
        assert_eq!(restored.visible_runs(false), tracker.visible_runs(false));
        assert_eq!(restored.visible_runs(true), tracker.visible_runs(true));
        assert_eq!(restored.export_state(), snapshot);
    }

    #[test]
    fn exported_snapshot_is_independent() {
        let mut tracker = Tracker::new();
        tracker.upsert(run(1, RunStatus::Pending), RunSource::Unknown);
        tracker.upsert(run(2, RunStatus::Pending), RunSource::Unknown);

        let mut snapshot = tracker.export_state();
        snapshot.active_order.reverse();
        snapshot.active[0].run.status = RunStatus::Failed;

        assert_eq!(tracker.ids(false), vec![2, 1]);
        assert_eq!(tracker.get(2).unwrap().run.status, RunStatus::Pending);
    }

    #[test]
    fn import_replaces_existing_state() {
        let mut tracker = Tracker::new();
        tracker.upsert(run(1, RunStatus::Pending), RunSource::Unknown);

        let mut other = Tracker::new();
        other.upsert(run(10, RunStatus::Success), RunSource::Unknown);
        tracker.import_state(other.export_state());

        assert_eq!(tracker.ids(false), vec![10]);
        assert!(tracker.get(1).is_none());
    }

    #[test]
    fn import_repairs_inconsistent_snapshot() {
        let mut source = Tracker::new();
        for id in 1..=4 {
            source.upsert(run(id, RunStatus::Pending), RunSource::Unknown);
        }
        source.archive(4);
        let mut snapshot = source.export_state();

        // 3 listed twice, 99 has no entry, 1 missing from the order.
        snapshot.active_order = vec![3, 3, 99, 2];
        // 2 is present in both catalogs.
        let duplicate = snapshot.active[1].clone();
        assert_eq!(duplicate.id(), 2);
        snapshot.archived.push(duplicate);
        snapshot.archived_order.push(2);

        let mut tracker = Tracker::new();
        let repairs = tracker.import_state(snapshot);

        assert_eq!(repairs.duplicate_order_ids, 1);
        assert_eq!(repairs.dangling_order_ids, 1);
        assert_eq!(repairs.unordered_entries, 1);
        assert_eq!(repairs.cross_catalog_ids, 1);
        assert_eq!(tracker.ids(false), vec![3, 2, 1]);
        assert_eq!(tracker.ids(true), vec![4]);
        assert_eq!(tracker.len_active(), 3);
        assert_eq!(tracker.len_archived(), 1);
    }

    #[test]
    fn distinct_upserts_count_matches() {
        let mut tracker = Tracker::new();
        let ids = [8, 3, 8, 5, 3, 1];
        for id in ids {
            tracker.upsert(run(id, RunStatus::Pending), RunSource::Unknown);
        }
        assert_eq!(tracker.len_active(), 4);
        assert_eq!(tracker.ids(false), vec![1, 5, 3, 8]);
    }

    #[test]
    fn import_counts_every_repair() {
        let mut source = Tracker::new();
        for id in 1..=3 {
            source.upsert(run(id, RunStatus::Pending), RunSource::Unknown);
        }
        source.archive(3);
        let mut snapshot = source.export_state();

        // 1 listed twice with different records; the later copy is kept.
        let mut newer = snapshot.active[1].clone();
        assert_eq!(newer.id(), 1);
        newer.run.status = RunStatus::Success;
        snapshot.active.push(newer);
        // Active id 2 referenced only by the archived order.
        snapshot.archived_order.push(2);

        let mut tracker = Tracker::new();
        let repairs = tracker.import_state(snapshot);

        assert_eq!(repairs.duplicate_entries, 1);
        assert_eq!(repairs.cross_catalog_ids, 1);
        assert_eq!(repairs.total(), 2);
        assert_eq!(tracker.get(1).unwrap().run.status, RunStatus::Success);
        assert_eq!(tracker.ids(false), vec![2, 1]);
        assert_eq!(tracker.ids(true), vec![3]);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone)]
        enum Op {
            Upsert(RunId, RunStatus, bool),
            Archive(RunId),
            Unarchive(RunId),
        }

        fn arb_status() -> impl Strategy<Value = RunStatus> {
            prop_oneof![
                Just(RunStatus::Pending),
                Just(RunStatus::Success),
                Just(RunStatus::Failed),
            ]
        }

        fn arb_op() -> impl Strategy<Value = Op> {
            // A small id space so archive, unarchive and revival collide often.
            prop_oneof![
                3 => (0u64..12, arb_status(), any::<bool>())
                    .prop_map(|(id, status, known)| Op::Upsert(id, status, known)),
                1 => (0u64..12).prop_map(Op::Archive),
                1 => (0u64..12).prop_map(Op::Unarchive),
            ]
        }

        fn assert_consistent(tracker: &Tracker) {
            for catalog in [&tracker.active, &tracker.archived] {
                let ordered: HashSet<RunId> = catalog.order.iter().copied().collect();
                let mapped: HashSet<RunId> = catalog.entries.keys().copied().collect();
                assert_eq!(ordered.len(), catalog.order.len(), "duplicate order id");
                assert_eq!(ordered, mapped, "order and map disagree");
            }
            for id in tracker.active.entries.keys() {
                assert!(!tracker.archived.contains(*id), "run {id} in both catalogs");
            }
        }

        proptest! {
            /// Every operation keeps the catalogs disjoint and each order in step
            /// with its map, and export then import reproduces the same views.
            #[test]
            fn random_operations_keep_catalogs_consistent(ops in proptest::collection::vec(arb_op(), 0..80)) {
                let mut tracker = Tracker::new();
                for op in ops {
                    match op {
                        Op::Upsert(id, status, known) => {
                            let was_active = tracker.active.contains(id);
                            let previous = tracker.get(id).map(|t| t.run.status);
                            let source = if known { commit_source() } else { RunSource::Unknown };
                            let outcome = tracker.upsert(run(id, status), source);
                            prop_assert_eq!(outcome.is_new, !was_active);
                            prop_assert_eq!(
                                outcome.status_changed,
                                previous.is_some_and(|p| p != status)
                            );
                            if !was_active {
                                prop_assert_eq!(tracker.ids(false).first().copied(), Some(id));
                            }
                        }
                        Op::Archive(id) => {
                            let was_active = tracker.active.contains(id);
                            prop_assert_eq!(tracker.archive(id), was_active);
                        }
                        Op::Unarchive(id) => {
                            let was_archived = tracker.is_archived(id);
                            prop_assert_eq!(tracker.unarchive(id), was_archived);
                        }
                    }
                    assert_consistent(&tracker);
                }

                let mut restored = Tracker::new();
                let repairs = restored.import_state(tracker.export_state());
                prop_assert_eq!(repairs.total(), 0);
                prop_assert_eq!(restored.ids(false), tracker.ids(false));
                prop_assert_eq!(restored.ids(true), tracker.ids(true));
                prop_assert_eq!(restored.visible_runs(false), tracker.visible_runs(false));
                prop_assert_eq!(restored.visible_runs(true), tracker.visible_runs(true));
            }
        }
    }
}
