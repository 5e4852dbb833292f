//! Taint abstract domain for the dexflow Android/Java taint-flow analyzer.
//!
//! During the interprocedural dataflow fixpoint, every program location
//! carries an abstract value summarizing what tainted data could flow
//! there, from which sources, along which call chains and with which
//! accumulated metadata. This crate is that value and its algebra.
//!
//! # Structure
//!
//! The taint value is a nested lattice, leaves first:
//!
//! 1. [`Frame`] — one indivisible taint record.
//! 2. [`KindFrames`] — frames of one kind, grouped by
//!    `(callee, callee_port, call_position, canonical_names)`.
//! 3. [`CallPositionFrames`] — a `kind → KindFrames` map sharing one call
//!    position.
//! 4. [`CalleeFrames`] — a `call_position → CallPositionFrames` map sharing
//!    one callee.
//! 5. [`Taint`] — the top-level set of callee groups.
//!
//! The fixpoint driver composes values with `join_with` / `widen_with` /
//! `difference_with`, edits them pointwise between call sites, and lifts
//! callee summaries across call sites with [`Taint::propagate`].
//!
//! # What this crate is not
//!
//! No disk I/O, no scheduling, no rule evaluation and no fixpoint loop.
//! Values are plain data with no interior sharing: copies are independent,
//! operations are synchronous, and the registries in [`Context`] are the
//! only shared state (read-only for the domain, with thread-safe interning).

pub mod access;
pub mod callee_frames;
pub mod call_position_frames;
pub mod canonical;
pub mod context;
pub mod domain;
pub mod error;
pub mod feature;
pub mod frame;
pub mod kind_frames;
pub mod taint;

pub use access::{AccessPath, PathElement, Root};
pub use callee_frames::CalleeFrames;
pub use call_position_frames::CallPositionFrames;
pub use canonical::{CanonicalName, CanonicalNameSet};
pub use context::{
    Context, Features, FeatureId, FieldId, Fields, KindId, Kinds, MethodId, Methods, PositionId,
    Positions, TypeId, Types,
};
pub use domain::{FieldSet, LocalPositionSet, MethodSet, PortSet, SetLattice};
pub use error::{TaintError, TaintResult};
pub use feature::{FeatureMayAlwaysSet, FeatureSet};
pub use frame::{Frame, FrameBuilder};
pub use kind_frames::KindFrames;
pub use taint::{Taint, DEFAULT_MAX_SOURCE_SINK_DISTANCE};
