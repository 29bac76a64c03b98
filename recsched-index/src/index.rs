//! The in-memory index: flat object array plus per-kind bitmaps.
//!
//! [`Indexer`] holds the memory shared between indexes (string arena, value
//! interners) and a by-hash cache of everything it has loaded. It is
//! single-threaded by contract; the [`Index`] values it produces are
//! immutable and freely shareable. An indexer retains the arenas of every
//! index it ever produced, which suits short-lived export tasks that discard
//! the whole indexer afterwards.
//!
//! Most of the interning is quadratic in the worst case, but real schedule
//! data is highly dedupable and low-cardinality, so the build stays in the
//! low milliseconds while memory drops by orders of magnitude compared to
//! the decoded tree.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;
use recsched_core::error::{Error, Result};
use recsched_core::snapshot::Snapshot;
use recsched_core::{ContentHash, CoreConfig};

use crate::arena::ArenaSnapshot;
use crate::bitmap::Bitmap;
use crate::derive;
use crate::intern::{StringInterner, ValueInterner};
use crate::node::{
    ActivityNode, DataNode, FacilityNode, LinkNode, Node, ScheduleGroupNode, ScheduleNode,
    TimeRangeNode,
};
use crate::refs::{DataRef, ObjId, Ref};

/// One of the six entity kinds, ordered root-first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Kind {
    Data = 0,
    Facility = 1,
    ScheduleGroup = 2,
    Schedule = 3,
    Activity = 4,
    TimeRange = 5,
}

impl Kind {
    pub(crate) const COUNT: usize = 6;

    /// All kinds, root-first.
    pub const ALL: [Kind; Kind::COUNT] = [
        Kind::Data,
        Kind::Facility,
        Kind::ScheduleGroup,
        Kind::Schedule,
        Kind::Activity,
        Kind::TimeRange,
    ];
}

/// Wall-clock durations of the build stages. Debugging only.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildTimings {
    pub scan: Duration,
    pub import: Duration,
    pub precompute: Duration,
}

/// One decoded, indexed snapshot.
pub struct Index {
    hash: ContentHash,
    timezone: Tz,
    arena: ArenaSnapshot,
    nodes: Vec<Node>,

    by_kind: [Bitmap<ObjId>; Kind::COUNT],
    /// `not_child[k]` = OR of the bitmaps of every kind at or above `k`:
    /// the objects that are *not* descendants of a `k`-kind object.
    not_child: [Bitmap<ObjId>; Kind::COUNT],

    resv_required: Bitmap<ObjId>,
    resv_definite: Bitmap<ObjId>,
    sched_ranges: Vec<Option<(DateTime<Tz>, DateTime<Tz>)>>,

    updated: Option<DateTime<Utc>>,
    timings: BuildTimings,
}

impl Index {
    /// Reference to the root object.
    pub fn data(&self) -> DataRef<'_> {
        Ref::new(self, None, ObjId(0))
    }

    /// Content hash of the raw payload this index was built from.
    pub fn hash(&self) -> &ContentHash {
        &self.hash
    }

    /// The most recent facility scrape date.
    pub fn updated(&self) -> Option<DateTime<Utc>> {
        self.updated
    }

    /// The zone civil-date resolution happens in.
    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Number of objects, root included.
    pub fn object_count(&self) -> usize {
        self.nodes.len()
    }

    /// Build stage durations.
    pub fn timings(&self) -> BuildTimings {
        self.timings
    }

    pub(crate) fn kind_bitmap(&self, kind: Kind) -> &Bitmap<ObjId> {
        &self.by_kind[kind as usize]
    }

    pub(crate) fn not_child_bitmap(&self, kind: Kind) -> &Bitmap<ObjId> {
        &self.not_child[kind as usize]
    }

    pub(crate) fn node(&self, obj: ObjId) -> &Node {
        &self.nodes[obj.0 as usize]
    }

    pub(crate) fn str(&self, span: crate::arena::Span) -> &str {
        self.arena.str(span)
    }

    pub(crate) fn reservation_requirement(&self, obj: ObjId) -> (bool, bool) {
        (
            self.resv_required.contains(obj),
            self.resv_definite.contains(obj),
        )
    }

    pub(crate) fn schedule_range(&self, nth: usize) -> Option<(DateTime<Tz>, DateTime<Tz>)> {
        self.sched_ranges[nth]
    }
}

impl std::fmt::Debug for Index {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Index")
            .field("hash", &self.hash.as_str())
            .field("objects", &self.nodes.len())
            .field("updated", &self.updated)
            .field("timings", &self.timings)
            .finish()
    }
}

/// Builds and caches indexes over shared interning memory.
pub struct Indexer {
    config: CoreConfig,
    strings: StringInterner,
    activities: ValueInterner<ActivityNode>,
    times: ValueInterner<TimeRangeNode>,
    loaded: HashMap<ContentHash, Arc<Index>>,
    sanity: bool,
}

impl Indexer {
    pub fn new(config: CoreConfig) -> Self {
        let mut strings = StringInterner::new();
        strings.set_cache(4096);
        Indexer {
            config,
            strings,
            activities: ValueInterner::new(),
            times: ValueInterner::new(),
            loaded: HashMap::new(),
            sanity: false,
        }
    }

    /// Verify the structural invariants after every build. Slow; meant for
    /// tests and debugging.
    pub fn enable_sanity_checks(&mut self) {
        self.sanity = true;
    }

    /// Decode and index a binary snapshot payload. Loading the same payload
    /// twice returns the cached index.
    pub fn load(&mut self, payload: &[u8]) -> Result<Arc<Index>> {
        let hash = ContentHash::of(payload);
        if let Some(idx) = self.loaded.get(&hash) {
            return Ok(Arc::clone(idx));
        }
        let snapshot = Snapshot::decode(payload)?;
        let idx = Arc::new(self.build(hash.clone(), &snapshot)?);
        tracing::debug!(
            hash = %idx.hash(),
            objects = idx.object_count(),
            scan = ?idx.timings().scan,
            import = ?idx.timings().import,
            precompute = ?idx.timings().precompute,
            "indexed snapshot"
        );
        self.loaded.insert(hash, Arc::clone(&idx));
        Ok(idx)
    }

    fn build(&mut self, hash: ContentHash, snap: &Snapshot) -> Result<Index> {
        let mut now = Instant::now();
        let mut timings = BuildTimings::default();

        // first pass: exact sizes, so the array and bitmaps are allocated once
        let mut n = 1usize; // the root
        let mut n_sched = 0usize;
        for fac in &snap.facilities {
            n += 1;
            for grp in &fac.schedule_groups {
                n += 1;
                for sch in &grp.schedules {
                    n += 1;
                    n_sched += 1;
                    for act in &sch.activities {
                        n += 1;
                        for day in &act.days {
                            n += day.times.len();
                        }
                    }
                }
            }
        }

        let mut nodes: Vec<Node> = Vec::with_capacity(n);
        let mut by_kind: [Bitmap<ObjId>; Kind::COUNT] =
            std::array::from_fn(|_| Bitmap::with_domain(n));
        let mut not_child: [Bitmap<ObjId>; Kind::COUNT] =
            std::array::from_fn(|_| Bitmap::with_domain(n));

        timings.scan = now.elapsed();
        now = Instant::now();

        // second pass: append depth-first, setting the kind bit per object
        let push = |nodes: &mut Vec<Node>, by_kind: &mut [Bitmap<ObjId>], node: Node| {
            let obj = ObjId(nodes.len() as u32);
            by_kind[node.kind() as usize].set(obj);
            nodes.push(node);
        };

        push(
            &mut nodes,
            &mut by_kind,
            Node::Data(DataNode {
                attribution: snap
                    .attribution
                    .iter()
                    .map(|s| self.strings.intern_fast(s))
                    .collect(),
            }),
        );
        for fac in &snap.facilities {
            let node = FacilityNode {
                name: self.strings.intern(&fac.name),
                description: self.strings.intern_fast(&fac.description),
                source_url: self.strings.intern_fast(&fac.source_url),
                source_date: fac
                    .source_date
                    .and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
                address: self.strings.intern_fast(&fac.address),
                lnglat: fac.lnglat,
                notifications_html: self.strings.intern_fast(&fac.notifications_html),
                special_hours_html: self.strings.intern_fast(&fac.special_hours_html),
                errors: fac
                    .errors
                    .iter()
                    .map(|s| self.strings.intern_fast(s))
                    .collect(),
            };
            push(&mut nodes, &mut by_kind, Node::Facility(Box::new(node)));
            for grp in &fac.schedule_groups {
                let node = ScheduleGroupNode {
                    label: self.strings.intern(&grp.label),
                    title: self.strings.intern(grp.title.as_deref().unwrap_or("")),
                    reservation_links: grp
                        .reservation_links
                        .iter()
                        .map(|l| LinkNode {
                            label: self.strings.intern_fast(&l.label),
                            url: self.strings.intern_fast(&l.url),
                        })
                        .collect(),
                    schedule_changes_html: self.strings.intern(&grp.schedule_changes_html),
                };
                push(&mut nodes, &mut by_kind, Node::ScheduleGroup(Box::new(node)));
                for sch in &grp.schedules {
                    let node = ScheduleNode {
                        caption: self.strings.intern(&sch.caption),
                        name: self.strings.intern(sch.name.as_deref().unwrap_or("")),
                        date: self.strings.intern(sch.date.as_deref().unwrap_or("")),
                        date_range: sch.date_range,
                        days: sch
                            .days
                            .iter()
                            .map(|s| self.strings.intern_fast(s))
                            .collect(),
                    };
                    push(&mut nodes, &mut by_kind, Node::Schedule(Box::new(node)));
                    for act in &sch.activities {
                        let node = ActivityNode {
                            label: self.strings.intern(&act.label),
                            name: self.strings.intern(act.name.as_deref().unwrap_or("")),
                            reservation: act.reservation,
                        };
                        let shared = self.activities.intern(node);
                        push(&mut nodes, &mut by_kind, Node::Activity(shared));
                        for (day_index, day) in act.days.iter().enumerate() {
                            for tm in &day.times {
                                let node = TimeRangeNode {
                                    day_index: day_index as u32,
                                    label: self.strings.intern(&tm.label),
                                    weekday: tm.weekday,
                                    clock: tm.clock,
                                };
                                let shared = self.times.intern(node);
                                push(&mut nodes, &mut by_kind, Node::TimeRange(shared));
                            }
                        }
                    }
                }
            }
        }

        // not-a-child-of-k: cumulative OR of the kinds at or above k
        for (i, kind) in Kind::ALL.iter().enumerate() {
            let sources: Vec<&Bitmap<ObjId>> = Kind::ALL[..=i]
                .iter()
                .map(|k| &by_kind[*k as usize])
                .collect();
            not_child[*kind as usize].or_in(sources);
        }

        timings.import = now.elapsed();
        now = Instant::now();

        let mut idx = Index {
            hash,
            timezone: self.config.timezone,
            arena: self.strings.publish(),
            nodes,
            by_kind,
            not_child,
            resv_required: Bitmap::with_domain(n),
            resv_definite: Bitmap::with_domain(n),
            sched_ranges: vec![None; n_sched],
            updated: snap.updated(),
            timings,
        };

        // precompute derived facts over the finished structure
        let mut required = Bitmap::with_domain(n);
        let mut definite = Bitmap::with_domain(n);
        for act in idx.data().activities() {
            let (req, def) = derive::reservation_requirement(&act);
            if req {
                required.set(act.object());
            }
            if def {
                definite.set(act.object());
            }
        }
        let mut ranges = vec![None; n_sched];
        for sched in idx.data().schedules() {
            ranges[sched.nth()] = derive::effective_date_range(&sched);
        }
        idx.resv_required = required;
        idx.resv_definite = definite;
        idx.sched_ranges = ranges;

        idx.timings.precompute = now.elapsed();

        if self.sanity {
            sanity_check(&idx, snap, n)?;
        }

        Ok(idx)
    }

    /// Total bytes stored across all string arenas.
    pub fn string_bytes(&self) -> u64 {
        self.strings.bytes_stored()
    }
}

/// Verify the structural invariants of a freshly built index against the
/// snapshot it came from.
fn sanity_check(idx: &Index, snap: &Snapshot, n: usize) -> Result<()> {
    fn ensure(cond: bool, msg: &str) -> Result<()> {
        if cond {
            Ok(())
        } else {
            Err(Error::consistency(msg.to_string()))
        }
    }

    ensure(idx.object_count() == n, "object array has the expected size")?;
    ensure(
        idx.kind_bitmap(Kind::Data).contains(ObjId(0)),
        "the root is the 0th object",
    )?;
    ensure(idx.kind_bitmap(Kind::Data).count() == 1, "exactly one root")?;

    // every object is set in exactly one kind bitmap
    let mut all: Bitmap<ObjId> = Bitmap::with_domain(n);
    let mut total = 0usize;
    for kind in Kind::ALL {
        total += idx.kind_bitmap(kind).count();
        all.or_in([idx.kind_bitmap(kind)]);
    }
    ensure(total == n, "kind bitmap counts sum to the object count")?;
    ensure(all.count() == n, "every object is in exactly one kind bitmap")?;

    // per-kind counts match the snapshot
    let mut counts = [0usize; Kind::COUNT];
    counts[Kind::Data as usize] = 1;
    for fac in &snap.facilities {
        counts[Kind::Facility as usize] += 1;
        for grp in &fac.schedule_groups {
            counts[Kind::ScheduleGroup as usize] += 1;
            for sch in &grp.schedules {
                counts[Kind::Schedule as usize] += 1;
                for act in &sch.activities {
                    counts[Kind::Activity as usize] += 1;
                    for day in &act.days {
                        counts[Kind::TimeRange as usize] += day.times.len();
                    }
                }
            }
        }
    }
    for kind in Kind::ALL {
        ensure(
            idx.kind_bitmap(kind).count() == counts[kind as usize],
            "kind bitmap count matches snapshot",
        )?;
    }

    // skip-level iteration must match nested flattening, and parents must
    // resolve back to the enclosing objects
    let data = idx.data();
    let mut flattened = Vec::new();
    for fac in data.facilities() {
        for grp in fac.schedule_groups() {
            ensure(grp.facility().same_as(&fac), "group parent is facility")?;
            for sch in grp.schedules() {
                ensure(sch.schedule_group().same_as(&grp), "schedule parent is group")?;
                for act in sch.activities() {
                    ensure(act.schedule().same_as(&sch), "activity parent is schedule")?;
                    for tm in act.time_ranges() {
                        ensure(tm.activity().same_as(&act), "time parent is activity")?;
                        ensure(tm.facility().same_as(&fac), "time facility ancestor")?;
                        ensure(tm.data().same_as(&data), "time data ancestor")?;
                        flattened.push(tm.object());
                    }
                }
            }
        }
    }
    let direct: Vec<ObjId> = data.time_ranges().map(|tm| tm.object()).collect();
    ensure(
        direct == flattened,
        "skip-level iteration equals nested flattening",
    )?;

    // cached derived facts match raw recomputation
    for act in data.activities() {
        let cached = act.reservation_requirement();
        let raw = derive::reservation_requirement(&act);
        ensure(cached == raw, "cached reservation requirement matches")?;
    }
    for sched in data.schedules() {
        let cached = sched.effective_date_range();
        let raw = derive::effective_date_range(&sched);
        ensure(cached == raw, "cached effective date range matches")?;
        if let Some((from, to)) = cached {
            ensure(from <= to, "effective date range is ordered")?;
        }
    }

    Ok(())
}
