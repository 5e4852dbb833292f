//! The taint abstract value: a set of callee frame groups.
//!
//! This is the value the interprocedural fixpoint installs at every program
//! location. It answers: what tainted data could flow here, from which
//! sources, along which call chains, and with which accumulated metadata.
//!
//! Structurally it is a grouped set of [`CalleeFrames`] keyed by callee,
//! each of which maps call positions to per-kind grouped frame sets. All
//! editors and lattice operations forward pointwise; [`Taint::propagate`]
//! is the transfer function lifting a callee summary across a call site.

use std::fmt;

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::access::{AccessPath, PathElement};
use crate::callee_frames::CalleeFrames;
use crate::context::{Context, KindId, MethodId, PositionId, TypeId};
use crate::domain::LocalPositionSet;
use crate::feature::FeatureMayAlwaysSet;
use crate::frame::Frame;

/// Default bound on the length of a source-to-sink trace.
pub const DEFAULT_MAX_SOURCE_SINK_DISTANCE: u32 = 100;

/// Abstract taint: the top-level domain value.
#[derive(Debug, Clone, Default)]
pub struct Taint {
    set: FxHashMap<Option<MethodId>, CalleeFrames>,
}

impl Taint {
    /// The bottom (empty) taint.
    #[must_use]
    pub fn bottom() -> Self {
        Self::default()
    }

    /// The domain has no use for a top element; constructing one is a
    /// programmer error.
    #[must_use]
    pub fn top() -> Self {
        unreachable!("Taint has no top element")
    }

    #[must_use]
    pub fn is_bottom(&self) -> bool {
        self.set.is_empty()
    }

    #[must_use]
    pub fn is_top(&self) -> bool {
        false
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    /// Lazy single-pass iteration over every frame. Diagnostics only; not a
    /// hot path.
    pub fn frames(&self) -> impl Iterator<Item = &Frame> {
        self.set.values().flat_map(CalleeFrames::iter)
    }

    /// Number of frames, counted by full iteration. Testing only.
    #[must_use]
    pub fn num_frames(&self) -> usize {
        self.frames().count()
    }

    pub fn clear(&mut self) {
        self.set.clear();
    }

    /// Insert one frame, merging into the matching callee group.
    pub fn add(&mut self, frame: Frame) {
        if frame.is_bottom() {
            return;
        }
        self.set.entry(frame.callee()).or_default().add(frame);
    }

    /// Insert a whole callee group, joining on collision.
    pub fn add_callee_frames(&mut self, frames: CalleeFrames) {
        if frames.is_bottom() {
            return;
        }
        self.set
            .entry(frames.callee())
            .or_default()
            .join_with(&frames);
    }

    #[must_use]
    pub fn leq(&self, other: &Self) -> bool {
        self.set.iter().all(|(callee, frames)| {
            other
                .set
                .get(callee)
                .is_some_and(|other_frames| frames.leq(other_frames))
        })
    }

    #[must_use]
    pub fn equals(&self, other: &Self) -> bool {
        self.set == other.set
    }

    pub fn join_with(&mut self, other: &Self) {
        for (callee, frames) in &other.set {
            self.set.entry(*callee).or_default().join_with(frames);
        }
    }

    pub fn widen_with(&mut self, other: &Self) {
        for (callee, frames) in &other.set {
            self.set.entry(*callee).or_default().widen_with(frames);
        }
    }

    pub fn meet_with(&mut self, other: &Self) {
        self.set.retain(|callee, frames| {
            other.set.get(callee).is_some_and(|other_frames| {
                frames.meet_with(other_frames);
                !frames.is_bottom()
            })
        });
    }

    pub fn narrow_with(&mut self, other: &Self) {
        self.set.retain(|callee, frames| {
            other.set.get(callee).is_some_and(|other_frames| {
                frames.narrow_with(other_frames);
                !frames.is_bottom()
            })
        });
    }

    /// Best-effort lattice subtraction, used for incremental fixpoint
    /// updates. Not commutative.
    pub fn difference_with(&mut self, other: &Self) {
        self.set.retain(|callee, frames| {
            if let Some(other_frames) = other.set.get(callee) {
                frames.difference_with(other_frames);
            }
            !frames.is_bottom()
        });
    }

    fn map(&mut self, f: impl Fn(&mut CalleeFrames)) {
        self.set.retain(|_, frames| {
            f(frames);
            !frames.is_bottom()
        });
    }

    pub fn add_inferred_features(&mut self, features: &FeatureMayAlwaysSet) {
        if features.is_bottom() || features.is_empty() {
            return;
        }
        self.map(|frames| frames.add_inferred_features(features));
    }

    #[must_use]
    pub fn local_positions(&self) -> LocalPositionSet {
        let mut result = LocalPositionSet::bottom();
        for frames in self.set.values() {
            result.join_with(&frames.local_positions());
        }
        result
    }

    pub fn add_local_position(&mut self, position: PositionId) {
        self.map(|frames| frames.add_local_position(position));
    }

    pub fn set_local_positions(&mut self, positions: &LocalPositionSet) {
        self.map(|frames| frames.set_local_positions(positions));
    }

    pub fn add_inferred_features_and_local_position(
        &mut self,
        features: &FeatureMayAlwaysSet,
        position: Option<PositionId>,
    ) {
        let has_features = !features.is_bottom() && !features.is_empty();
        if !has_features && position.is_none() {
            return;
        }
        self.map(|frames| frames.add_inferred_features_and_local_position(features, position));
    }

    /// Propagate the taint from the callee to the caller.
    ///
    /// `extra_features` are folded into the propagated frames as locally
    /// inferred features. Returns bottom if nothing survives the distance
    /// bound.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn propagate(
        &self,
        callee: MethodId,
        callee_port: &AccessPath,
        call_position: PositionId,
        max_distance: u32,
        extra_features: &FeatureMayAlwaysSet,
        context: &Context,
        source_register_types: &[Option<TypeId>],
        source_constant_arguments: &[Option<String>],
    ) -> Self {
        let mut result = Self::bottom();
        for frames in self.set.values() {
            let mut propagated = frames.propagate(
                callee,
                callee_port,
                call_position,
                max_distance,
                context,
                source_register_types,
                source_constant_arguments,
            );
            if propagated.is_bottom() {
                continue;
            }
            propagated.add_inferred_features(extra_features);
            result.add_callee_frames(propagated);
        }
        result
    }

    /// The set of leaf frames re-anchored at the given position.
    #[must_use]
    pub fn attach_position(&self, position: PositionId) -> Self {
        let mut result = Self::bottom();
        for frames in self.set.values() {
            result.add_callee_frames(frames.attach_position(position));
        }
        result
    }

    /// Transform kinds; see
    /// [`CallPositionFrames::transform_kind_with_features`](crate::call_position_frames::CallPositionFrames::transform_kind_with_features).
    ///
    /// When several kinds land on the same target their frames join, so
    /// always-features may demote to may-features.
    #[must_use]
    pub fn transform_kind_with_features(
        &self,
        transform_kind: impl Fn(KindId) -> Vec<KindId>,
        add_features: impl Fn(KindId) -> FeatureMayAlwaysSet,
    ) -> Self {
        let mut result = Self::bottom();
        for frames in self.set.values() {
            result.add_callee_frames(
                frames.transform_kind_with_features(&transform_kind, &add_features),
            );
        }
        result
    }

    /// Append a path element to the callee port of every frame whose kind
    /// passes the filter.
    pub fn append_callee_port(
        &mut self,
        path_element: &PathElement,
        filter: impl Fn(KindId) -> bool,
    ) {
        self.map(|frames| frames.append_callee_port(path_element, &filter));
    }

    /// Update call and local positions of all non-leaf frames.
    ///
    /// `new_call_position` receives the callee, callee port and existing
    /// position; `new_local_positions` receives the existing local
    /// positions. Leaf frames are left untouched.
    pub fn update_non_leaf_positions(
        &mut self,
        new_call_position: impl Fn(MethodId, &AccessPath, Option<PositionId>) -> PositionId,
        new_local_positions: impl Fn(&LocalPositionSet) -> LocalPositionSet,
    ) {
        let mut result = Self::bottom();
        for frames in self.set.values() {
            for frame in frames.iter() {
                let mut frame = frame.clone();
                if let Some(callee) = frame.callee() {
                    let position =
                        new_call_position(callee, frame.callee_port(), frame.call_position());
                    let local_positions = new_local_positions(frame.local_positions());
                    frame.set_call_position(Some(position));
                    frame.set_local_positions(local_positions);
                }
                result.add(frame);
            }
        }
        *self = result;
    }

    /// Drop frames that are considered invalid. `is_valid` receives the
    /// callee (absent for leaves), callee port and kind.
    pub fn filter_invalid_frames(
        &mut self,
        is_valid: impl Fn(Option<MethodId>, &AccessPath, KindId) -> bool,
    ) {
        self.map(|frames| frames.filter_invalid_frames(&is_valid));
    }

    /// True if any frame carries the given kind.
    #[must_use]
    pub fn contains_kind(&self, kind: KindId) -> bool {
        self.set.values().any(|frames| frames.contains_kind(kind))
    }

    /// Bucket the taint by an arbitrary mapping over kinds. Each bucket
    /// contains exactly the frames whose kind maps to it; joining all
    /// buckets reconstructs the original taint.
    pub fn partition_by_kind<T: Eq + std::hash::Hash>(
        &self,
        map_kind: impl Fn(KindId) -> T,
    ) -> FxHashMap<T, Taint> {
        let mut result: FxHashMap<T, Taint> = FxHashMap::default();
        for frames in self.set.values() {
            for (bucket, partitioned) in frames.partition_by_kind(&map_kind) {
                result.entry(bucket).or_default().add_callee_frames(partitioned);
            }
        }
        result
    }

    /// All features of this taint, joined into one may/always set. Used by
    /// issue emission.
    #[must_use]
    pub fn features_joined(&self) -> FeatureMayAlwaysSet {
        let mut features = FeatureMayAlwaysSet::bottom();
        for frame in self.frames() {
            features.join_with(&frame.features());
        }
        features
    }

    /// JSON representation: an array of callee groups, sorted for stable
    /// output.
    #[must_use]
    pub fn to_json(&self, context: &Context) -> Value {
        let mut groups: Vec<Value> = self
            .set
            .values()
            .map(|frames| frames.to_json(context))
            .collect();
        groups.sort_unstable_by_key(|group| group.to_string());
        Value::Array(groups)
    }

    /// Render against the registries that resolve the interned ids.
    #[must_use]
    pub fn display<'a>(&'a self, context: &'a Context) -> TaintDisplay<'a> {
        TaintDisplay {
            taint: self,
            context,
        }
    }
}

impl PartialEq for Taint {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

impl Eq for Taint {}

impl FromIterator<Frame> for Taint {
    fn from_iter<I: IntoIterator<Item = Frame>>(iter: I) -> Self {
        let mut taint = Self::bottom();
        for frame in iter {
            taint.add(frame);
        }
        taint
    }
}

impl<const N: usize> From<[Frame; N]> for Taint {
    fn from(frames: [Frame; N]) -> Self {
        frames.into_iter().collect()
    }
}

/// Display adapter: callee groups sorted by signature, `[]` when bottom.
pub struct TaintDisplay<'a> {
    taint: &'a Taint,
    context: &'a Context,
}

impl fmt::Display for TaintDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut groups: Vec<(String, &CalleeFrames)> = self
            .taint
            .set
            .iter()
            .map(|(callee, frames)| {
                let rendered = match callee {
                    Some(callee) => self.context.methods.signature(*callee).to_string(),
                    None => "leaf".to_string(),
                };
                (rendered, frames)
            })
            .collect();
        groups.sort_unstable_by(|left, right| left.0.cmp(&right.0));

        write!(f, "[")?;
        for (callee, frames) in groups {
            write!(
                f,
                "FramesByCallee(callee={callee}, frames={}),",
                frames.display(self.context)
            )?;
        }
        write!(f, "]")
    }
}
