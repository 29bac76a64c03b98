//! Internal object representation.
//!
//! One [`Node`] per entry in the index's flat object array. Strings are
//! arena spans; activity and time-range records are shared (`Arc`) because
//! the value interner deduplicates them across the whole index.
//!
//! Simple data holders that are returned directly, cannot be navigated from,
//! and have no children (reservation links) are not nodes.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use recsched_core::snapshot::{ClockRange, PartialDateRange};

use crate::arena::Span;
use crate::index::Kind;

pub(crate) struct DataNode {
    pub attribution: Vec<Span>,
}

pub(crate) struct FacilityNode {
    pub name: Span,
    pub description: Span,
    pub source_url: Span,
    pub source_date: Option<DateTime<Utc>>,
    pub address: Span,
    pub lnglat: Option<(f32, f32)>,
    pub notifications_html: Span,
    pub special_hours_html: Span,
    pub errors: Vec<Span>,
}

#[derive(PartialEq, Clone, Copy)]
pub(crate) struct LinkNode {
    pub label: Span,
    pub url: Span,
}

pub(crate) struct ScheduleGroupNode {
    pub label: Span,
    pub title: Span,
    pub reservation_links: Vec<LinkNode>,
    pub schedule_changes_html: Span,
}

pub(crate) struct ScheduleNode {
    pub caption: Span,
    pub name: Span,
    pub date: Span,
    pub date_range: Option<PartialDateRange>,
    pub days: Vec<Span>,
}

#[derive(PartialEq)]
pub(crate) struct ActivityNode {
    pub label: Span,
    pub name: Span,
    pub reservation: Option<bool>,
}

#[derive(PartialEq)]
pub(crate) struct TimeRangeNode {
    /// Index into the enclosing schedule's day labels.
    pub day_index: u32,
    pub label: Span,
    /// 0 = Sunday .. 6 = Saturday.
    pub weekday: Option<u8>,
    pub clock: Option<ClockRange>,
}

pub(crate) enum Node {
    Data(DataNode),
    Facility(Box<FacilityNode>),
    ScheduleGroup(Box<ScheduleGroupNode>),
    Schedule(Box<ScheduleNode>),
    Activity(Arc<ActivityNode>),
    TimeRange(Arc<TimeRangeNode>),
}

impl Node {
    pub fn kind(&self) -> Kind {
        match self {
            Node::Data(_) => Kind::Data,
            Node::Facility(_) => Kind::Facility,
            Node::ScheduleGroup(_) => Kind::ScheduleGroup,
            Node::Schedule(_) => Kind::Schedule,
            Node::Activity(_) => Kind::Activity,
            Node::TimeRange(_) => Kind::TimeRange,
        }
    }
}
