//! Typed references into an index.
//!
//! A reference is `(index, optional filter bitmap, object id)` plus a
//! compile-time entity kind. Getters and iterators are the only way to reach
//! objects, which keeps the underlying array immutable and lets a filter
//! bitmap mask subtrees without copying anything.
//!
//! A filter must never mask out an object while leaving its descendants
//! visible; the view layer maintains that invariant, and everything here
//! relies on it.
//!
//! Dereferencing a reference whose target is masked out by its own filter is
//! a logic bug (morally, access to a deleted object) and panics rather
//! than degrading.

use std::marker::PhantomData;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use recsched_core::snapshot::{ClockRange, PartialDateRange};

use crate::bitmap::{BitId, Bitmap};
use crate::derive;
use crate::index::{Index, Kind};
use crate::node::Node;

/// Index into the flat object array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjId(pub(crate) u32);

impl BitId for ObjId {
    fn to_u32(self) -> u32 {
        self.0
    }
    fn from_u32(v: u32) -> Self {
        ObjId(v)
    }
}

/// Marker types for the six entity kinds.
pub mod kind {
    #[derive(Debug, Clone, Copy)]
    pub struct Data;
    #[derive(Debug, Clone, Copy)]
    pub struct Facility;
    #[derive(Debug, Clone, Copy)]
    pub struct ScheduleGroup;
    #[derive(Debug, Clone, Copy)]
    pub struct Schedule;
    #[derive(Debug, Clone, Copy)]
    pub struct Activity;
    #[derive(Debug, Clone, Copy)]
    pub struct TimeRange;
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::kind::Data {}
    impl Sealed for super::kind::Facility {}
    impl Sealed for super::kind::ScheduleGroup {}
    impl Sealed for super::kind::Schedule {}
    impl Sealed for super::kind::Activity {}
    impl Sealed for super::kind::TimeRange {}
}

/// One of the six entity kinds, at the type level.
pub trait Entity: sealed::Sealed + Copy + 'static {
    const KIND: Kind;
}

impl Entity for kind::Data {
    const KIND: Kind = Kind::Data;
}
impl Entity for kind::Facility {
    const KIND: Kind = Kind::Facility;
}
impl Entity for kind::ScheduleGroup {
    const KIND: Kind = Kind::ScheduleGroup;
}
impl Entity for kind::Schedule {
    const KIND: Kind = Kind::Schedule;
}
impl Entity for kind::Activity {
    const KIND: Kind = Kind::Activity;
}
impl Entity for kind::TimeRange {
    const KIND: Kind = Kind::TimeRange;
}

/// Typed reference to one object in an index.
///
/// Holding a reference borrows the index, so a reference can never outlive
/// the data it points into.
pub struct Ref<'ix, K: Entity> {
    pub(crate) idx: &'ix Index,
    pub(crate) filter: Option<Arc<Bitmap<ObjId>>>,
    pub(crate) obj: ObjId,
    pub(crate) _kind: PhantomData<K>,
}

pub type DataRef<'ix> = Ref<'ix, kind::Data>;
pub type FacilityRef<'ix> = Ref<'ix, kind::Facility>;
pub type ScheduleGroupRef<'ix> = Ref<'ix, kind::ScheduleGroup>;
pub type ScheduleRef<'ix> = Ref<'ix, kind::Schedule>;
pub type ActivityRef<'ix> = Ref<'ix, kind::Activity>;
pub type TimeRangeRef<'ix> = Ref<'ix, kind::TimeRange>;

impl<'ix, K: Entity> Clone for Ref<'ix, K> {
    fn clone(&self) -> Self {
        Ref {
            idx: self.idx,
            filter: self.filter.clone(),
            obj: self.obj,
            _kind: PhantomData,
        }
    }
}

impl<'ix, K: Entity> Ref<'ix, K> {
    pub(crate) fn new(idx: &'ix Index, filter: Option<Arc<Bitmap<ObjId>>>, obj: ObjId) -> Self {
        Ref {
            idx,
            filter,
            obj,
            _kind: PhantomData,
        }
    }

    /// The index this reference points into.
    pub fn index(&self) -> &'ix Index {
        self.idx
    }

    /// The object id.
    pub fn object(&self) -> ObjId {
        self.obj
    }

    pub(crate) fn filter(&self) -> Option<&Arc<Bitmap<ObjId>>> {
        self.filter.as_ref()
    }

    /// Two references are the same when they share an index, an object, and
    /// an identical filter.
    pub fn same_as<U: Entity>(&self, other: &Ref<'ix, U>) -> bool {
        std::ptr::eq(self.idx, other.idx)
            && self.obj == other.obj
            && match (&self.filter, &other.filter) {
                (None, None) => true,
                (Some(a), Some(b)) => a == b,
                _ => false,
            }
    }

    /// A copy of this reference with its own filter bitmap: a clone of the
    /// current one, or all-ones if it had none.
    pub fn with_filter(&self) -> Self {
        let filter = match &self.filter {
            Some(f) => Bitmap::clone(f),
            None => {
                let mut all = Bitmap::with_domain(self.idx.object_count());
                all.fill_ones();
                all
            }
        };
        Ref {
            idx: self.idx,
            filter: Some(Arc::new(filter)),
            obj: self.obj,
            _kind: PhantomData,
        }
    }

    /// Resolve the node this reference points to. Panics if the object is
    /// masked out by the filter or its kind does not match `K`; both are
    /// caller logic bugs, not runtime conditions.
    pub(crate) fn deref_node(&self) -> &'ix Node {
        if let Some(f) = &self.filter {
            if !f.contains(self.obj) {
                panic!("invalid ref: references filtered-out object {:?}", self.obj);
            }
        }
        if !self.idx.kind_bitmap(K::KIND).contains(self.obj) {
            panic!(
                "invalid ref: object {:?} is not of kind {:?}",
                self.obj,
                K::KIND
            );
        }
        self.idx.node(self.obj)
    }

    /// The object id one past this object's last descendant: the next object
    /// at or above kind `K`, or the end of the array.
    pub(crate) fn subtree_end(&self) -> ObjId {
        match self
            .idx
            .not_child_bitmap(K::KIND)
            .next(ObjId(self.obj.0 + 1))
        {
            (v, true) => v,
            (_, false) => ObjId(self.idx.object_count() as u32),
        }
    }

    /// Reference to this object's nearest ancestor of kind `U`. `U` must be
    /// above `K` in the hierarchy; uniqueness follows from depth-first
    /// ordering.
    pub(crate) fn parent<U: Entity>(&self) -> Ref<'ix, U> {
        let _ = self.deref_node();
        let p = self
            .idx
            .kind_bitmap(U::KIND)
            .prev(self.obj)
            .expect("every object has an ancestor of each enclosing kind");
        let r = Ref::<U>::new(self.idx, self.filter.clone(), p);
        let _ = r.deref_node();
        r
    }

    /// Lazy iterator over this object's descendants of kind `U`, in object
    /// order, honoring the filter. The filter is applied per yielded bit; no
    /// intermediate bitmap is materialized.
    pub(crate) fn children<U: Entity>(&self) -> Children<'ix, U> {
        Children {
            idx: self.idx,
            filter: self.filter.clone(),
            cursor: self.obj.0,
            until: self.subtree_end().0,
            _kind: PhantomData,
        }
    }
}

impl<'ix, K: Entity> std::fmt::Debug for Ref<'ix, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Ref<{:?}>({}{})",
            K::KIND,
            self.obj.0,
            if self.filter.is_some() { ", filtered" } else { "" }
        )
    }
}

/// Lazy, restartable iterator over child references of one kind.
pub struct Children<'ix, U: Entity> {
    idx: &'ix Index,
    filter: Option<Arc<Bitmap<ObjId>>>,
    cursor: u32,
    until: u32,
    _kind: PhantomData<U>,
}

impl<'ix, U: Entity> Clone for Children<'ix, U> {
    fn clone(&self) -> Self {
        Children {
            idx: self.idx,
            filter: self.filter.clone(),
            cursor: self.cursor,
            until: self.until,
            _kind: PhantomData,
        }
    }
}

impl<'ix, U: Entity> Children<'ix, U> {
    /// True if the iterator yields nothing from its current position.
    pub fn is_empty(&self) -> bool {
        self.clone().next().is_none()
    }
}

impl<'ix, U: Entity> Iterator for Children<'ix, U> {
    type Item = Ref<'ix, U>;

    fn next(&mut self) -> Option<Ref<'ix, U>> {
        let mask = self.idx.kind_bitmap(U::KIND);
        loop {
            let (v, present) = mask.next(ObjId(self.cursor));
            if !present || v.0 >= self.until {
                return None;
            }
            self.cursor = v.0 + 1;
            if let Some(f) = &self.filter {
                if !f.contains(v) {
                    continue;
                }
            }
            return Some(Ref::new(self.idx, self.filter.clone(), v));
        }
    }
}

/// A reservation link on a schedule group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReservationLink<'a> {
    pub label: &'a str,
    pub url: &'a str,
}

// ============================================================================
// Data
// ============================================================================

impl<'ix> DataRef<'ix> {
    fn data_node(&self) -> &'ix crate::node::DataNode {
        match self.deref_node() {
            Node::Data(n) => n,
            _ => unreachable!("kind bitmap inconsistent with object array"),
        }
    }

    /// Attribution lines.
    pub fn attribution(&self) -> impl Iterator<Item = &'ix str> + '_ {
        let idx = self.idx;
        self.data_node().attribution.iter().map(move |s| idx.str(*s))
    }

    pub fn facilities(&self) -> Children<'ix, kind::Facility> {
        self.children()
    }
    pub fn schedule_groups(&self) -> Children<'ix, kind::ScheduleGroup> {
        self.children()
    }
    pub fn schedules(&self) -> Children<'ix, kind::Schedule> {
        self.children()
    }
    pub fn activities(&self) -> Children<'ix, kind::Activity> {
        self.children()
    }
    pub fn time_ranges(&self) -> Children<'ix, kind::TimeRange> {
        self.children()
    }
}

// ============================================================================
// Facility
// ============================================================================

impl<'ix> FacilityRef<'ix> {
    fn facility_node(&self) -> &'ix crate::node::FacilityNode {
        match self.deref_node() {
            Node::Facility(n) => n,
            _ => unreachable!("kind bitmap inconsistent with object array"),
        }
    }

    pub fn name(&self) -> &'ix str {
        self.idx.str(self.facility_node().name)
    }
    pub fn description(&self) -> &'ix str {
        self.idx.str(self.facility_node().description)
    }
    pub fn source_url(&self) -> &'ix str {
        self.idx.str(self.facility_node().source_url)
    }
    /// When the facility page was scraped.
    pub fn source_date(&self) -> Option<DateTime<Utc>> {
        self.facility_node().source_date
    }
    pub fn address(&self) -> &'ix str {
        self.idx.str(self.facility_node().address)
    }
    /// Geocoded position, if geocoding succeeded.
    pub fn lnglat(&self) -> Option<(f32, f32)> {
        self.facility_node().lnglat
    }
    pub fn notifications_html(&self) -> &'ix str {
        self.idx.str(self.facility_node().notifications_html)
    }
    pub fn special_hours_html(&self) -> &'ix str {
        self.idx.str(self.facility_node().special_hours_html)
    }
    /// Scrape errors for this facility.
    pub fn errors(&self) -> impl Iterator<Item = &'ix str> + '_ {
        let idx = self.idx;
        self.facility_node().errors.iter().map(move |s| idx.str(*s))
    }

    pub fn data(&self) -> DataRef<'ix> {
        self.parent()
    }

    pub fn schedule_groups(&self) -> Children<'ix, kind::ScheduleGroup> {
        self.children()
    }
    pub fn schedules(&self) -> Children<'ix, kind::Schedule> {
        self.children()
    }
    pub fn activities(&self) -> Children<'ix, kind::Activity> {
        self.children()
    }
    pub fn time_ranges(&self) -> Children<'ix, kind::TimeRange> {
        self.children()
    }
}

// ============================================================================
// ScheduleGroup
// ============================================================================

impl<'ix> ScheduleGroupRef<'ix> {
    fn group_node(&self) -> &'ix crate::node::ScheduleGroupNode {
        match self.deref_node() {
            Node::ScheduleGroup(n) => n,
            _ => unreachable!("kind bitmap inconsistent with object array"),
        }
    }

    pub fn label(&self) -> &'ix str {
        self.idx.str(self.group_node().label)
    }
    /// Normalized title, empty if the scraper could not derive one.
    pub fn title(&self) -> &'ix str {
        self.idx.str(self.group_node().title)
    }
    pub fn reservation_links(&self) -> impl Iterator<Item = ReservationLink<'ix>> + '_ {
        let idx = self.idx;
        self.group_node().reservation_links.iter().map(move |l| ReservationLink {
            label: idx.str(l.label),
            url: idx.str(l.url),
        })
    }
    pub fn schedule_changes_html(&self) -> &'ix str {
        self.idx.str(self.group_node().schedule_changes_html)
    }

    pub fn data(&self) -> DataRef<'ix> {
        self.parent()
    }
    pub fn facility(&self) -> FacilityRef<'ix> {
        self.parent()
    }

    pub fn schedules(&self) -> Children<'ix, kind::Schedule> {
        self.children()
    }
    pub fn activities(&self) -> Children<'ix, kind::Activity> {
        self.children()
    }
    pub fn time_ranges(&self) -> Children<'ix, kind::TimeRange> {
        self.children()
    }
}

// ============================================================================
// Schedule
// ============================================================================

impl<'ix> ScheduleRef<'ix> {
    fn schedule_node(&self) -> &'ix crate::node::ScheduleNode {
        match self.deref_node() {
            Node::Schedule(n) => n,
            _ => unreachable!("kind bitmap inconsistent with object array"),
        }
    }

    pub fn caption(&self) -> &'ix str {
        self.idx.str(self.schedule_node().caption)
    }
    /// Normalized name, empty if not derived.
    pub fn name(&self) -> &'ix str {
        self.idx.str(self.schedule_node().name)
    }
    /// Raw date text, empty if not derived.
    pub fn date(&self) -> &'ix str {
        self.idx.str(self.schedule_node().date)
    }
    /// Parsed partial date range, if the scraper derived one.
    pub fn date_range(&self) -> Option<PartialDateRange> {
        self.schedule_node().date_range
    }
    pub fn num_days(&self) -> usize {
        self.schedule_node().days.len()
    }
    /// The day label at `i`. Panics if out of range.
    pub fn day(&self, i: usize) -> &'ix str {
        self.idx.str(self.schedule_node().days[i])
    }

    /// Position of this schedule among all schedules, in object order.
    pub(crate) fn nth(&self) -> usize {
        self.idx.kind_bitmap(Kind::Schedule).rank(self.obj)
    }

    /// The effective concrete date range: the parsed partial range with
    /// missing components filled in from the facility scrape date, in the
    /// index's time zone. Inclusive on both ends. Precomputed at build time.
    pub fn effective_date_range(
        &self,
    ) -> Option<(DateTime<chrono_tz::Tz>, DateTime<chrono_tz::Tz>)> {
        self.idx.schedule_range(self.nth())
    }

    pub fn data(&self) -> DataRef<'ix> {
        self.parent()
    }
    pub fn facility(&self) -> FacilityRef<'ix> {
        self.parent()
    }
    pub fn schedule_group(&self) -> ScheduleGroupRef<'ix> {
        self.parent()
    }

    pub fn activities(&self) -> Children<'ix, kind::Activity> {
        self.children()
    }
    pub fn time_ranges(&self) -> Children<'ix, kind::TimeRange> {
        self.children()
    }
}

// ============================================================================
// Activity
// ============================================================================

impl<'ix> ActivityRef<'ix> {
    fn activity_node(&self) -> &'ix crate::node::ActivityNode {
        match self.deref_node() {
            Node::Activity(n) => n,
            _ => unreachable!("kind bitmap inconsistent with object array"),
        }
    }

    pub fn label(&self) -> &'ix str {
        self.idx.str(self.activity_node().label)
    }
    /// Normalized name, empty if not derived.
    pub fn name(&self) -> &'ix str {
        self.idx.str(self.activity_node().name)
    }
    /// Explicit reservation marker parsed from the label, if present.
    pub fn reservation(&self) -> Option<bool> {
        self.activity_node().reservation
    }

    /// Best-effort reservation requirement: `(required, definite)`.
    /// Precomputed at build time from the activity's explicit marker and its
    /// sibling group context.
    pub fn reservation_requirement(&self) -> (bool, bool) {
        self.idx.reservation_requirement(self.obj)
    }

    pub fn data(&self) -> DataRef<'ix> {
        self.parent()
    }
    pub fn facility(&self) -> FacilityRef<'ix> {
        self.parent()
    }
    pub fn schedule_group(&self) -> ScheduleGroupRef<'ix> {
        self.parent()
    }
    pub fn schedule(&self) -> ScheduleRef<'ix> {
        self.parent()
    }

    pub fn time_ranges(&self) -> Children<'ix, kind::TimeRange> {
        self.children()
    }

    /// Time ranges in this activity tagged with schedule day `i`.
    pub fn day_time_ranges(
        &self,
        i: usize,
    ) -> impl Iterator<Item = TimeRangeRef<'ix>> + '_ {
        self.time_ranges().filter(move |tm| tm.day_index() == i)
    }
}

// ============================================================================
// TimeRange
// ============================================================================

impl<'ix> TimeRangeRef<'ix> {
    fn time_node(&self) -> &'ix crate::node::TimeRangeNode {
        match self.deref_node() {
            Node::TimeRange(n) => n,
            _ => unreachable!("kind bitmap inconsistent with object array"),
        }
    }

    /// Index into the enclosing schedule's day labels.
    pub fn day_index(&self) -> usize {
        self.time_node().day_index as usize
    }
    pub fn label(&self) -> &'ix str {
        self.idx.str(self.time_node().label)
    }
    /// Parsed weekday, if derived.
    pub fn weekday(&self) -> Option<chrono::Weekday> {
        self.time_node().weekday.map(|d| match d {
            0 => chrono::Weekday::Sun,
            1 => chrono::Weekday::Mon,
            2 => chrono::Weekday::Tue,
            3 => chrono::Weekday::Wed,
            4 => chrono::Weekday::Thu,
            5 => chrono::Weekday::Fri,
            _ => chrono::Weekday::Sat,
        })
    }
    /// Parsed clock range, if derived.
    pub fn clock(&self) -> Option<ClockRange> {
        self.time_node().clock
    }

    /// The enclosing schedule's day label for this range.
    pub fn schedule_day(&self) -> &'ix str {
        let day = self.day_index();
        self.schedule().day(day)
    }

    /// When the day label is an explicit calendar date rather than a weekday
    /// name, the resolved date. Takes precedence over [`Self::weekday`].
    pub fn single_date(&self) -> Option<NaiveDate> {
        derive::single_date(self)
    }

    pub fn data(&self) -> DataRef<'ix> {
        self.parent()
    }
    pub fn facility(&self) -> FacilityRef<'ix> {
        self.parent()
    }
    pub fn schedule_group(&self) -> ScheduleGroupRef<'ix> {
        self.parent()
    }
    pub fn schedule(&self) -> ScheduleRef<'ix> {
        self.parent()
    }
    pub fn activity(&self) -> ActivityRef<'ix> {
        self.parent()
    }
}
