//! High-density in-memory index over schedule snapshots.
//!
//! A snapshot's tree is flattened into one object array in depth-first
//! order, with one membership bitmap per entity kind. Navigation is pure
//! bitmap arithmetic: a parent is the nearest preceding object of the
//! parent's kind, and the children of any object are the objects of the
//! child's kind inside its depth-first interval. Strings and repetitive
//! leaf records are interned, so hundreds of loaded snapshots share most of
//! their memory.
//!
//! ```no_run
//! use recsched_core::CoreConfig;
//! use recsched_index::Indexer;
//!
//! # fn main() -> recsched_core::Result<()> {
//! # let payload: &[u8] = &[];
//! let mut indexer = Indexer::new(CoreConfig::new());
//! let idx = indexer.load(payload)?;
//! for fac in idx.data().facilities() {
//!     for tm in fac.time_ranges() {
//!         let _ = (fac.name(), tm.label());
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod arena;
pub mod bitmap;
pub mod intern;

mod derive;
mod node;

pub mod index;
pub mod refs;
pub mod view;

pub use index::{BuildTimings, Index, Indexer, Kind};
pub use refs::{
    kind, ActivityRef, Children, DataRef, Entity, FacilityRef, ObjId, Ref, ReservationLink,
    ScheduleGroupRef, ScheduleRef, TimeRangeRef,
};
pub use view::MutableView;
