//! Filtered mutable views over an index.
//!
//! A [`MutableView`] owns a filter bitmap over an index's objects. Removing
//! an object clears its bit and every descendant bit; nothing in the index
//! itself ever changes. Freezing the view clones the filter into a normal
//! reference, so later view mutation cannot disturb anything frozen earlier.
//!
//! Removal during the retain/elide walks is safe because a walk only clears
//! bits at or after its cursor, and the cursor never moves backwards.

use std::sync::Arc;

use crate::bitmap::Bitmap;
use crate::index::{Index, Kind};
use crate::refs::{
    kind, ActivityRef, DataRef, Entity, FacilityRef, ObjId, Ref, ScheduleGroupRef, ScheduleRef,
    TimeRangeRef,
};

/// A logically mutable copy of an index's tree.
pub struct MutableView<'ix> {
    idx: &'ix Index,
    filter: Bitmap<ObjId>,
}

impl<'ix> DataRef<'ix> {
    /// Start a mutable view seeded with this reference's visibility.
    pub fn mutate(&self) -> MutableView<'ix> {
        let filter = match self.filter() {
            Some(f) => Bitmap::clone(f),
            None => {
                let mut all = Bitmap::with_domain(self.index().object_count());
                all.fill_ones();
                all
            }
        };
        MutableView {
            idx: self.index(),
            filter,
        }
    }
}

impl<'ix> MutableView<'ix> {
    /// Freeze the current state into a reference. The filter is cloned, so
    /// further mutation of this view does not affect the result.
    pub fn freeze(&self) -> DataRef<'ix> {
        Ref::new(self.idx, Some(Arc::new(self.filter.clone())), ObjId(0))
    }

    /// Remove one object and its whole subtree. Returns false if the
    /// reference belongs to a different index or is already removed.
    pub fn remove<K: Entity>(&mut self, r: &Ref<'ix, K>) -> bool {
        if !std::ptr::eq(r.index(), self.idx) {
            return false;
        }
        let start = r.object();
        if !self.filter.contains(start) {
            return false;
        }
        self.filter.clear_range(start, r.subtree_end());
        true
    }

    /// Keep the facilities for which `pred` holds; remove the rest.
    /// Returns the number removed.
    pub fn retain_facilities(&mut self, pred: impl FnMut(FacilityRef<'ix>) -> bool) -> usize {
        self.retain::<kind::Facility>(pred)
    }

    /// Keep the schedule groups for which `pred` holds; remove the rest.
    pub fn retain_schedule_groups(
        &mut self,
        pred: impl FnMut(ScheduleGroupRef<'ix>) -> bool,
    ) -> usize {
        self.retain::<kind::ScheduleGroup>(pred)
    }

    /// Keep the schedules for which `pred` holds; remove the rest.
    pub fn retain_schedules(&mut self, pred: impl FnMut(ScheduleRef<'ix>) -> bool) -> usize {
        self.retain::<kind::Schedule>(pred)
    }

    /// Keep the activities for which `pred` holds; remove the rest.
    pub fn retain_activities(&mut self, pred: impl FnMut(ActivityRef<'ix>) -> bool) -> usize {
        self.retain::<kind::Activity>(pred)
    }

    /// Keep the time ranges for which `pred` holds; remove the rest.
    pub fn retain_time_ranges(&mut self, pred: impl FnMut(TimeRangeRef<'ix>) -> bool) -> usize {
        self.retain::<kind::TimeRange>(pred)
    }

    fn retain<K: Entity>(&mut self, mut pred: impl FnMut(Ref<'ix, K>) -> bool) -> usize {
        // predicates see the view as it was when the walk started
        let snapshot = Arc::new(self.filter.clone());
        let mask = self.idx.kind_bitmap(K::KIND);
        let mut cursor = 0u32;
        let mut removed = 0usize;
        loop {
            let (obj, present) = mask.next(ObjId(cursor));
            if !present {
                break;
            }
            cursor = obj.0 + 1;
            if !self.filter.contains(obj) {
                continue;
            }
            let r = Ref::<K>::new(self.idx, Some(Arc::clone(&snapshot)), obj);
            if !pred(r.clone()) {
                if !self.remove(&r) {
                    unreachable!("removing a live object cannot fail");
                }
                removed += 1;
            }
        }
        removed
    }

    /// Remove every object whose filtered child sequence at the next level
    /// down is empty, from the leaves upward. After this, every remaining
    /// facility has at least one time range underneath it.
    pub fn elide(&mut self) {
        self.elide_activities();
        self.elide_schedules();
        self.elide_schedule_groups();
        self.elide_facilities();
    }

    /// Remove facilities with no remaining schedule groups.
    pub fn elide_facilities(&mut self) -> usize {
        self.elide_level::<kind::Facility>(Kind::ScheduleGroup)
    }

    /// Remove schedule groups with no remaining schedules.
    pub fn elide_schedule_groups(&mut self) -> usize {
        self.elide_level::<kind::ScheduleGroup>(Kind::Schedule)
    }

    /// Remove schedules with no remaining activities.
    pub fn elide_schedules(&mut self) -> usize {
        self.elide_level::<kind::Schedule>(Kind::Activity)
    }

    /// Remove activities with no remaining time ranges.
    pub fn elide_activities(&mut self) -> usize {
        self.elide_level::<kind::Activity>(Kind::TimeRange)
    }

    fn elide_level<K: Entity>(&mut self, child: Kind) -> usize {
        let mask = self.idx.kind_bitmap(K::KIND);
        let mut cursor = 0u32;
        let mut removed = 0usize;
        loop {
            let (obj, present) = mask.next(ObjId(cursor));
            if !present {
                break;
            }
            cursor = obj.0 + 1;
            if !self.filter.contains(obj) {
                continue;
            }
            let r = Ref::<K>::new(self.idx, None, obj);
            if !self.has_live_child(&r, child) {
                self.remove(&r);
                removed += 1;
            }
        }
        removed
    }

    fn has_live_child<K: Entity>(&self, r: &Ref<'ix, K>, child: Kind) -> bool {
        let end = r.subtree_end();
        self.idx
            .kind_bitmap(child)
            .range_between(r.object(), end)
            .any(|obj| self.filter.contains(obj))
    }
}

impl<'ix> std::fmt::Debug for MutableView<'ix> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutableView")
            .field("visible", &self.filter.count().min(self.idx.object_count()))
            .field("objects", &self.idx.object_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::Indexer;
    use recsched_core::snapshot::{
        Activity, DayTimes, Facility, Schedule, ScheduleGroup, Snapshot, TimeRange,
    };
    use recsched_core::CoreConfig;

    fn tiny_snapshot() -> Snapshot {
        Snapshot {
            facilities: vec![Facility {
                name: "f".into(),
                schedule_groups: vec![ScheduleGroup {
                    label: "g".into(),
                    schedules: vec![Schedule {
                        caption: "s".into(),
                        days: vec!["Monday".into()],
                        activities: vec![Activity {
                            label: "a".into(),
                            days: vec![DayTimes {
                                times: vec![TimeRange {
                                    label: "t".into(),
                                    ..Default::default()
                                }],
                            }],
                            ..Default::default()
                        }],
                        ..Default::default()
                    }],
                    ..Default::default()
                }],
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    #[should_panic(expected = "filtered-out")]
    fn test_deref_through_masking_filter_panics() {
        let mut indexer = Indexer::new(CoreConfig::new());
        let idx = indexer.load(&tiny_snapshot().encode()).unwrap();
        let data = idx.data();

        let fac = data.facilities().next().unwrap();
        let mut view = data.mutate();
        assert!(view.remove(&fac));
        let frozen = view.freeze();

        // fabricate a ref to the removed object carrying the masking filter:
        // accessing it is equivalent to touching a deleted entity
        let bad: FacilityRef<'_> =
            Ref::new(&idx, frozen.filter().map(Arc::clone), fac.object());
        let _ = bad.name();
    }

    #[test]
    fn test_remove_rejects_foreign_index() {
        let mut a = Indexer::new(CoreConfig::new());
        let idx_a = a.load(&tiny_snapshot().encode()).unwrap();
        let mut b = Indexer::new(CoreConfig::new());
        let mut other = tiny_snapshot();
        other.facilities[0].name = "other".into();
        let idx_b = b.load(&other.encode()).unwrap();

        let mut view = idx_a.data().mutate();
        let foreign = idx_b.data().facilities().next().unwrap();
        assert!(!view.remove(&foreign));
    }
}
