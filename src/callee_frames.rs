//! Frames attributed to one resolved callee, keyed by call position.

use std::fmt;

use rustc_hash::FxHashMap;
use serde_json::{json, Value};

use crate::access::{AccessPath, PathElement};
use crate::call_position_frames::CallPositionFrames;
use crate::context::{Context, KindId, MethodId, PositionId, TypeId};
use crate::domain::LocalPositionSet;
use crate::feature::FeatureMayAlwaysSet;
use crate::frame::Frame;

/// Mapping `call_position → CallPositionFrames`, all sharing one callee.
///
/// The callee slot is absent when bottom and absent for leaf frames.
#[derive(Debug, Clone, Default)]
pub struct CalleeFrames {
    callee: Option<MethodId>,
    frames: FxHashMap<Option<PositionId>, CallPositionFrames>,
}

impl CalleeFrames {
    #[must_use]
    pub fn bottom() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_bottom(&self) -> bool {
        self.frames.is_empty()
    }

    /// The shared callee; absent when bottom or for leaf frames.
    #[must_use]
    pub fn callee(&self) -> Option<MethodId> {
        self.callee
    }

    pub fn iter(&self) -> impl Iterator<Item = &Frame> {
        self.frames.values().flat_map(CallPositionFrames::iter)
    }

    #[must_use]
    pub fn num_frames(&self) -> usize {
        self.frames.values().map(CallPositionFrames::num_frames).sum()
    }

    /// Insert a frame. The frame's callee must match the slot; the slot is
    /// set by the first insertion.
    pub fn add(&mut self, frame: Frame) {
        if frame.is_bottom() {
            return;
        }
        if self.frames.is_empty() {
            self.callee = frame.callee();
        } else {
            debug_assert_eq!(self.callee, frame.callee());
        }
        self.frames
            .entry(frame.call_position())
            .or_default()
            .add(frame);
    }

    #[must_use]
    pub fn leq(&self, other: &Self) -> bool {
        if self.is_bottom() {
            return true;
        }
        if other.is_bottom() {
            return false;
        }
        debug_assert_eq!(self.callee, other.callee);
        self.frames.iter().all(|(position, frames)| {
            other
                .frames
                .get(position)
                .is_some_and(|other_frames| frames.leq(other_frames))
        })
    }

    #[must_use]
    pub fn equals(&self, other: &Self) -> bool {
        if self.is_bottom() || other.is_bottom() {
            return self.is_bottom() && other.is_bottom();
        }
        self.callee == other.callee && self.frames == other.frames
    }

    /// Join. Joining with bottom adopts the other side's callee.
    pub fn join_with(&mut self, other: &Self) {
        if other.is_bottom() {
            return;
        }
        if self.is_bottom() {
            self.callee = other.callee;
        }
        debug_assert_eq!(self.callee, other.callee);
        for (position, frames) in &other.frames {
            self.frames.entry(*position).or_default().join_with(frames);
        }
    }

    pub fn widen_with(&mut self, other: &Self) {
        self.join_with(other);
    }

    pub fn meet_with(&mut self, other: &Self) {
        if self.is_bottom() {
            return;
        }
        if other.is_bottom() {
            self.frames.clear();
            return;
        }
        debug_assert_eq!(self.callee, other.callee);
        self.frames.retain(|position, frames| {
            other.frames.get(position).is_some_and(|other_frames| {
                frames.meet_with(other_frames);
                !frames.is_bottom()
            })
        });
    }

    pub fn narrow_with(&mut self, other: &Self) {
        if self.is_bottom() {
            return;
        }
        if other.is_bottom() {
            self.frames.clear();
            return;
        }
        debug_assert_eq!(self.callee, other.callee);
        self.frames.retain(|position, frames| {
            other.frames.get(position).is_some_and(|other_frames| {
                frames.narrow_with(other_frames);
                !frames.is_bottom()
            })
        });
    }

    /// Pointwise subtraction on call positions.
    pub fn difference_with(&mut self, other: &Self) {
        if self.is_bottom() || other.is_bottom() {
            return;
        }
        debug_assert_eq!(self.callee, other.callee);
        self.frames.retain(|position, frames| {
            if let Some(other_frames) = other.frames.get(position) {
                frames.difference_with(other_frames);
            }
            !frames.is_bottom()
        });
    }

    /// Apply an editor to every frame.
    pub fn map(&mut self, f: impl Fn(&mut Frame)) {
        self.frames.retain(|_, frames| {
            frames.map(&f);
            !frames.is_bottom()
        });
    }

    pub fn add_inferred_features(&mut self, features: &FeatureMayAlwaysSet) {
        if features.is_bottom() || features.is_empty() {
            return;
        }
        self.map(|frame| frame.add_inferred_features(features));
    }

    #[must_use]
    pub fn local_positions(&self) -> LocalPositionSet {
        let mut result = LocalPositionSet::bottom();
        for frames in self.frames.values() {
            result.join_with(&frames.local_positions());
        }
        result
    }

    pub fn add_local_position(&mut self, position: PositionId) {
        self.map(|frame| frame.add_local_position(position));
    }

    pub fn set_local_positions(&mut self, positions: &LocalPositionSet) {
        self.map(|frame| frame.set_local_positions(positions.clone()));
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
        self.map(|frame| {
            if has_features {
                frame.add_inferred_features(features);
            }
            if let Some(position) = position {
                frame.add_local_position(position);
            }
        });
    }

    pub fn append_callee_port(
        &mut self,
        path_element: &PathElement,
        filter: impl Fn(KindId) -> bool,
    ) {
        for frames in self.frames.values_mut() {
            frames.append_callee_port(path_element, &filter);
        }
    }

    pub fn filter_invalid_frames(
        &mut self,
        is_valid: impl Fn(Option<MethodId>, &AccessPath, KindId) -> bool,
    ) {
        self.frames.retain(|_, frames| {
            frames.filter_invalid_frames(&is_valid);
            !frames.is_bottom()
        });
    }

    #[must_use]
    pub fn contains_kind(&self, kind: KindId) -> bool {
        self.frames.values().any(|frames| frames.contains_kind(kind))
    }

    /// Bucket the contained kinds by an arbitrary mapping.
    pub fn partition_by_kind<T: Eq + std::hash::Hash>(
        &self,
        map_kind: impl Fn(KindId) -> T,
    ) -> FxHashMap<T, CalleeFrames> {
        let mut result: FxHashMap<T, CalleeFrames> = FxHashMap::default();
        for (position, frames) in &self.frames {
            for (bucket, partitioned) in frames.partition_by_kind(&map_kind) {
                let entry = result.entry(bucket).or_default();
                entry.callee = self.callee;
                entry
                    .frames
                    .entry(*position)
                    .or_default()
                    .join_with(&partitioned);
            }
        }
        result
    }

    #[must_use]
    pub fn transform_kind_with_features(
        &self,
        transform_kind: impl Fn(KindId) -> Vec<KindId>,
        add_features: impl Fn(KindId) -> FeatureMayAlwaysSet,
    ) -> Self {
        let mut new_frames: FxHashMap<Option<PositionId>, CallPositionFrames> =
            FxHashMap::default();
        for (position, frames) in &self.frames {
            let transformed = frames.transform_kind_with_features(&transform_kind, &add_features);
            if !transformed.is_bottom() {
                new_frames.insert(*position, transformed);
            }
        }
        let callee = if new_frames.is_empty() {
            None
        } else {
            self.callee
        };
        Self {
            callee,
            frames: new_frames,
        }
    }

    /// Propagate every call position's frames across the call site and fold
    /// the results onto the new position.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn propagate(
        &self,
        callee: MethodId,
        callee_port: &AccessPath,
        call_position: PositionId,
        max_distance: u32,
        context: &Context,
        source_register_types: &[Option<TypeId>],
        source_constant_arguments: &[Option<String>],
    ) -> Self {
        if self.is_bottom() {
            return Self::bottom();
        }

        let mut result = CallPositionFrames::bottom();
        for frames in self.frames.values() {
            result.join_with(&frames.propagate(
                callee,
                callee_port,
                call_position,
                max_distance,
                context,
                source_register_types,
                source_constant_arguments,
            ));
        }
        if result.is_bottom() {
            return Self::bottom();
        }
        debug_assert_eq!(result.position(), Some(call_position));

        let mut frames = FxHashMap::default();
        frames.insert(Some(call_position), result);
        Self {
            callee: Some(callee),
            frames,
        }
    }

    /// Re-anchor leaf frames at the given position; see
    /// [`CallPositionFrames::attach_position`]. The result carries no
    /// callee, since only leaf frames survive.
    #[must_use]
    pub fn attach_position(&self, position: PositionId) -> Self {
        let mut attached = CallPositionFrames::bottom();
        for frames in self.frames.values() {
            attached.join_with(&frames.attach_position(position));
        }
        if attached.is_bottom() {
            return Self::bottom();
        }

        let mut frames = FxHashMap::default();
        frames.insert(Some(position), attached);
        Self {
            callee: None,
            frames,
        }
    }

    /// JSON representation: callee plus per-position arrays, sorted for
    /// stable output.
    #[must_use]
    pub fn to_json(&self, context: &Context) -> Value {
        let mut value = serde_json::Map::new();
        if let Some(callee) = self.callee {
            value.insert(
                "callee".to_string(),
                json!(context.methods.signature(callee)),
            );
        }
        let mut positions: Vec<Value> = self
            .frames
            .values()
            .map(|frames| frames.to_json(context))
            .collect();
        positions.sort_unstable_by_key(|position| position.to_string());
        value.insert("call_positions".to_string(), json!(positions));
        Value::Object(value)
    }

    /// Render against the registries that resolve the interned ids.
    #[must_use]
    pub fn display<'a>(&'a self, context: &'a Context) -> CalleeFramesDisplay<'a> {
        CalleeFramesDisplay {
            frames: self,
            context,
        }
    }
}

impl PartialEq for CalleeFrames {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

impl Eq for CalleeFrames {}

/// Display adapter: `[FramesByPosition(position=..., frames=...), ...]`.
pub struct CalleeFramesDisplay<'a> {
    frames: &'a CalleeFrames,
    context: &'a Context,
}

impl fmt::Display for CalleeFramesDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut positions: Vec<(String, &CallPositionFrames)> = self
            .frames
            .frames
            .iter()
            .map(|(position, frames)| {
                let rendered = match position {
                    Some(position) => self.context.positions.as_str(*position).to_string(),
                    None => "unknown".to_string(),
                };
                (rendered, frames)
            })
            .collect();
        positions.sort_unstable_by(|left, right| left.0.cmp(&right.0));

        write!(f, "[")?;
        for (position, frames) in positions {
            write!(
                f,
                "FramesByPosition(position={position}, frames={}),",
                frames.display(self.context)
            )?;
        }
        write!(f, "]")
    }
}
