//! Frames observed at one call position, keyed by kind.
//!
//! This is the level where propagation happens: frames of each kind are
//! split into cross-repository declarations and ordinary frames, ordinary
//! frames collapse into a single successor frame per kind, and via-* ports
//! materialize into features against the call site's argument types and
//! constants.

use std::fmt;

use rustc_hash::FxHashMap;
use serde_json::{json, Value};
use tracing::warn;

use crate::access::{AccessPath, PathElement};
use crate::canonical::CanonicalNameSet;
use crate::context::{Context, FeatureId, KindId, MethodId, PositionId, TypeId};
use crate::domain::{FieldSet, LocalPositionSet, MethodSet};
use crate::feature::FeatureMayAlwaysSet;
use crate::frame::Frame;
use crate::kind_frames::KindFrames;

/// Mapping `kind → KindFrames`, all sharing one call position.
///
/// The position slot is absent when bottom and also absent for leaf frames
/// that have no call position yet.
#[derive(Debug, Clone, Default)]
pub struct CallPositionFrames {
    position: Option<PositionId>,
    frames: FxHashMap<KindId, KindFrames>,
}

impl CallPositionFrames {
    #[must_use]
    pub fn bottom() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_bottom(&self) -> bool {
        self.frames.is_empty()
    }

    /// The shared call position. Meaningless when bottom.
    #[must_use]
    pub fn position(&self) -> Option<PositionId> {
        self.position
    }

    pub fn iter(&self) -> impl Iterator<Item = &Frame> {
        self.frames.values().flat_map(KindFrames::iter)
    }

    #[must_use]
    pub fn num_frames(&self) -> usize {
        self.frames.values().map(KindFrames::len).sum()
    }

    /// Insert a frame. The frame's call position must match the slot; the
    /// slot is set by the first insertion.
    pub fn add(&mut self, frame: Frame) {
        let Some(kind) = frame.kind() else {
            return;
        };
        if self.frames.is_empty() {
            self.position = frame.call_position();
        } else {
            debug_assert_eq!(self.position, frame.call_position());
        }
        self.frames.entry(kind).or_default().add(frame);
    }

    #[must_use]
    pub fn leq(&self, other: &Self) -> bool {
        if self.is_bottom() {
            return true;
        }
        if other.is_bottom() {
            return false;
        }
        debug_assert_eq!(self.position, other.position);
        self.frames.iter().all(|(kind, frames)| {
            other
                .frames
                .get(kind)
                .is_some_and(|other_frames| frames.leq(other_frames))
        })
    }

    #[must_use]
    pub fn equals(&self, other: &Self) -> bool {
        if self.is_bottom() || other.is_bottom() {
            return self.is_bottom() && other.is_bottom();
        }
        self.position == other.position && self.frames == other.frames
    }

    /// Join. Joining with bottom adopts the other side's position.
    pub fn join_with(&mut self, other: &Self) {
        if other.is_bottom() {
            return;
        }
        if self.is_bottom() {
            self.position = other.position;
        }
        debug_assert_eq!(self.position, other.position);
        for (kind, frames) in &other.frames {
            self.frames.entry(*kind).or_default().join_with(frames);
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
        debug_assert_eq!(self.position, other.position);
        self.frames.retain(|kind, frames| {
            other.frames.get(kind).is_some_and(|other_frames| {
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
        debug_assert_eq!(self.position, other.position);
        self.frames.retain(|kind, frames| {
            other.frames.get(kind).is_some_and(|other_frames| {
                frames.narrow_with(other_frames);
                !frames.is_bottom()
            })
        });
    }

    /// Pointwise subtraction on kinds.
    pub fn difference_with(&mut self, other: &Self) {
        if self.is_bottom() || other.is_bottom() {
            return;
        }
        debug_assert_eq!(self.position, other.position);
        self.frames.retain(|kind, frames| {
            if let Some(other_frames) = other.frames.get(kind) {
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

    /// Union of all contained frames' local positions.
    #[must_use]
    pub fn local_positions(&self) -> LocalPositionSet {
        let mut result = LocalPositionSet::bottom();
        for frame in self.iter() {
            result.join_with(frame.local_positions());
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

    /// Rewrite the callee port of frames whose kind passes the filter.
    pub fn append_callee_port(
        &mut self,
        path_element: &PathElement,
        filter: impl Fn(KindId) -> bool,
    ) {
        for (kind, frames) in &mut self.frames {
            if filter(*kind) {
                frames.map(|frame| frame.callee_port_append(path_element.clone()));
            }
        }
    }

    /// Drop frames the callback rejects; kinds left without frames are
    /// removed.
    pub fn filter_invalid_frames(
        &mut self,
        is_valid: impl Fn(Option<MethodId>, &AccessPath, KindId) -> bool,
    ) {
        self.frames.retain(|kind, frames| {
            frames.filter(|frame| is_valid(frame.callee(), frame.callee_port(), *kind));
            !frames.is_bottom()
        });
    }

    #[must_use]
    pub fn contains_kind(&self, kind: KindId) -> bool {
        self.frames.contains_key(&kind)
    }

    /// Bucket the contained kinds by an arbitrary mapping.
    pub fn partition_by_kind<T: Eq + std::hash::Hash>(
        &self,
        map_kind: impl Fn(KindId) -> T,
    ) -> FxHashMap<T, CallPositionFrames> {
        let mut result: FxHashMap<T, CallPositionFrames> = FxHashMap::default();
        for (kind, frames) in &self.frames {
            let bucket = result.entry(map_kind(*kind)).or_default();
            bucket.position = self.position;
            bucket.frames.insert(*kind, frames.clone());
        }
        result
    }

    /// Transform kinds. An empty target vector drops the kind; `[kind]`
    /// preserves it untouched; anything else clones each frame per target
    /// kind, folding in `add_features(target)`. Distinct source kinds
    /// landing on the same target join, so always-features may demote to
    /// may-features.
    #[must_use]
    pub fn transform_kind_with_features(
        &self,
        transform_kind: impl Fn(KindId) -> Vec<KindId>,
        add_features: impl Fn(KindId) -> FeatureMayAlwaysSet,
    ) -> Self {
        let mut new_frames: FxHashMap<KindId, KindFrames> = FxHashMap::default();
        for (old_kind, frames) in &self.frames {
            let new_kinds = transform_kind(*old_kind);
            if new_kinds.is_empty() {
                continue;
            }
            if new_kinds.len() == 1 && new_kinds[0] == *old_kind {
                new_frames.entry(*old_kind).or_default().join_with(frames);
                continue;
            }
            for new_kind in new_kinds {
                // A transformation occurred even when new_kind == old_kind:
                // the added features still apply.
                let features_to_add = add_features(new_kind);
                let entry = new_frames.entry(new_kind).or_default();
                for frame in frames.iter() {
                    let mut new_frame = frame.with_kind(new_kind);
                    new_frame.add_inferred_features(&features_to_add);
                    entry.add(new_frame);
                }
            }
        }
        Self {
            position: self.position,
            frames: new_frames,
        }
    }

    /// Propagate all frames across a call site into caller frames.
    ///
    /// Ordinary frames of one kind collapse into a single output frame with
    /// distance `min + 1`; cross-repository declarations propagate
    /// one-to-one because their canonical names instantiate per frame.
    /// Returns bottom when every frame exceeds the distance bound.
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

        let mut result = Self::bottom();
        for (kind, kind_frames) in &self.frames {
            let (crtex_frames, non_crtex_frames): (Vec<&Frame>, Vec<&Frame>) = kind_frames
                .iter()
                .partition(|frame| frame.is_crtex_producer_declaration());

            result.join_with(&propagate_crtex_frames(
                *kind,
                &crtex_frames,
                callee,
                callee_port,
                call_position,
                max_distance,
                context,
                source_register_types,
            ));

            let mut via_type_of_features_added = Vec::new();
            let non_crtex_frame = propagate_frames(
                *kind,
                &non_crtex_frames,
                callee,
                callee_port,
                call_position,
                max_distance,
                context,
                source_register_types,
                source_constant_arguments,
                &mut via_type_of_features_added,
            );
            if !non_crtex_frame.is_bottom() {
                result.add(non_crtex_frame);
            }
        }
        result
    }

    /// Re-anchor leaf frames at the given position.
    ///
    /// This functions like a propagation step, not a key rewrite: features
    /// flow into the new frame's inferred set, and user-declared features
    /// are promoted into locally inferred always-features so that leaf
    /// frames surfacing in issues carry them. Non-leaf frames are dropped.
    #[must_use]
    pub fn attach_position(&self, position: PositionId) -> Self {
        let mut result = Self::bottom();
        for frame in self.iter() {
            if !frame.is_leaf() {
                continue;
            }
            let Some(kind) = frame.kind() else {
                continue;
            };
            // Canonical names stay templated here; they instantiate when the
            // frame is eventually propagated.
            let mut builder = Frame::builder(kind)
                .callee_port(frame.callee_port().clone())
                .call_position(position)
                .origins(frame.origins().clone())
                .field_origins(frame.field_origins().clone())
                .inferred_features(frame.features())
                .local_positions(frame.local_positions().clone())
                .canonical_names(frame.canonical_names().clone());
            if !frame.user_features().is_empty() {
                builder = builder.locally_inferred_features(FeatureMayAlwaysSet::make_always(
                    frame.user_features().iter(),
                ));
            }
            result.add(builder.build());
        }
        result
    }

    /// JSON representation: position plus per-kind frame arrays, sorted for
    /// stable output.
    #[must_use]
    pub fn to_json(&self, context: &Context) -> Value {
        let mut value = serde_json::Map::new();
        if let Some(position) = self.position {
            value.insert(
                "call_position".to_string(),
                json!(context.positions.as_str(position)),
            );
        }

        let mut kinds: Vec<(&str, &KindFrames)> = self
            .frames
            .iter()
            .map(|(kind, frames)| (context.kinds.name(*kind), frames))
            .collect();
        kinds.sort_unstable_by_key(|(name, _)| *name);

        let kinds: Vec<Value> = kinds
            .into_iter()
            .map(|(name, frames)| {
                let mut rendered: Vec<Value> = frames
                    .iter()
                    .map(|frame| frame.to_json(context))
                    .collect();
                rendered.sort_unstable_by_key(|frame| frame.to_string());
                json!({ "kind": name, "frames": rendered })
            })
            .collect();
        value.insert("kinds".to_string(), json!(kinds));
        Value::Object(value)
    }

    /// Render against the registries that resolve the interned ids.
    #[must_use]
    pub fn display<'a>(&'a self, context: &'a Context) -> CallPositionFramesDisplay<'a> {
        CallPositionFramesDisplay {
            frames: self,
            context,
        }
    }
}

impl PartialEq for CallPositionFrames {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

impl Eq for CallPositionFrames {}

/// Display adapter: `[FrameByKind(kind=..., frames={...}), ...]`, `[]` when
/// bottom.
pub struct CallPositionFramesDisplay<'a> {
    frames: &'a CallPositionFrames,
    context: &'a Context,
}

impl fmt::Display for CallPositionFramesDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<(&str, &KindFrames)> = self
            .frames
            .frames
            .iter()
            .map(|(kind, frames)| (self.context.kinds.name(*kind), frames))
            .collect();
        kinds.sort_unstable_by_key(|(name, _)| *name);

        write!(f, "[")?;
        for (name, frames) in kinds {
            write!(f, "FrameByKind(kind={name}, frames={{")?;
            let mut rendered: Vec<String> = frames
                .iter()
                .map(|frame| frame.display(self.context).to_string())
                .collect();
            rendered.sort_unstable();
            for (index, frame) in rendered.iter().enumerate() {
                if index > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{frame}")?;
            }
            write!(f, "}}),")?;
        }
        write!(f, "]")
    }
}

/// Collapse same-kind frames into one caller frame.
///
/// Frames at or beyond the distance bound are skipped; if none survive the
/// result is bottom. Via-* ports materialize into always-features against
/// the call site's runtime types and constant arguments, and are consumed
/// in the process.
#[allow(clippy::too_many_arguments)]
fn propagate_frames(
    kind: KindId,
    frames: &[&Frame],
    callee: MethodId,
    callee_port: &AccessPath,
    call_position: PositionId,
    max_distance: u32,
    context: &Context,
    source_register_types: &[Option<TypeId>],
    source_constant_arguments: &[Option<String>],
    via_type_of_features_added: &mut Vec<FeatureId>,
) -> Frame {
    if frames.is_empty() {
        return Frame::bottom();
    }

    let mut distance = u32::MAX;
    let mut origins = MethodSet::bottom();
    let mut field_origins = FieldSet::bottom();
    let mut inferred_features = FeatureMayAlwaysSet::bottom();

    for &frame in frames {
        debug_assert_eq!(frame.kind(), Some(kind));
        if frame.distance() >= max_distance {
            continue;
        }

        distance = distance.min(frame.distance().saturating_add(1));
        origins.join_with(frame.origins());
        field_origins.join_with(frame.field_origins());
        // This merges user features into the successor's inferred features.
        inferred_features.join_with(&frame.features());

        materialize_via_type_of_ports(
            callee,
            context,
            frame,
            source_register_types,
            via_type_of_features_added,
            &mut inferred_features,
        );
        materialize_via_value_of_ports(
            callee,
            context,
            frame,
            source_constant_arguments,
            &mut inferred_features,
        );
    }

    if distance == u32::MAX {
        return Frame::bottom();
    }
    debug_assert!(distance <= max_distance);

    Frame::builder(kind)
        .callee_port(callee_port.clone())
        .callee(callee)
        .call_position(call_position)
        .distance(distance)
        .origins(origins)
        .field_origins(field_origins)
        .inferred_features(inferred_features)
        .build()
}

/// Propagate cross-repository declarations one frame at a time.
///
/// Each output frame stays a leaf (distance 0) and carries its canonical
/// names instantiated against the resolved callee. Frames whose names all
/// fail to instantiate, or that carry none, are skipped.
#[allow(clippy::too_many_arguments)]
fn propagate_crtex_frames(
    kind: KindId,
    frames: &[&Frame],
    callee: MethodId,
    callee_port: &AccessPath,
    call_position: PositionId,
    max_distance: u32,
    context: &Context,
    source_register_types: &[Option<TypeId>],
) -> CallPositionFrames {
    if frames.is_empty() {
        return CallPositionFrames::bottom();
    }

    let mut result = CallPositionFrames::bottom();
    for &frame in frames {
        debug_assert_eq!(frame.kind(), Some(kind));

        let mut via_type_of_features_added = Vec::new();
        let propagated = propagate_frames(
            kind,
            &[frame],
            callee,
            callee_port,
            call_position,
            max_distance,
            context,
            source_register_types,
            // TODO(dexflow#214): support via-value-of for cross-repository frames.
            &[],
            &mut via_type_of_features_added,
        );
        if propagated.is_bottom() {
            continue;
        }

        let canonical_names = frame.canonical_names();
        if canonical_names.is_empty() {
            warn!(
                kind = context.kinds.name(kind),
                callee = context.methods.signature(callee),
                "cross-repository frame without canonical names, skipping"
            );
            continue;
        }

        let feature_names: Vec<&str> = via_type_of_features_added
            .iter()
            .map(|feature| context.features.name(*feature))
            .collect();
        let mut instantiated_names = CanonicalNameSet::bottom();
        for name in canonical_names.iter() {
            if let Some(instantiated) =
                name.instantiate(context.methods.signature(callee), &feature_names)
            {
                instantiated_names.add(instantiated);
            }
        }
        if instantiated_names.is_empty() {
            continue;
        }

        let canonical_port = propagated.callee_port().canonicalize_for_crtex();
        result.add(
            Frame::builder(kind)
                .callee_port(canonical_port)
                .callee(callee)
                .call_position(call_position)
                .origins(propagated.origins().clone())
                .field_origins(propagated.field_origins().clone())
                .inferred_features(propagated.inferred_features().clone())
                .canonical_names(instantiated_names)
                .build(),
        );
    }
    result
}

fn materialize_via_type_of_ports(
    callee: MethodId,
    context: &Context,
    frame: &Frame,
    source_register_types: &[Option<TypeId>],
    via_type_of_features_added: &mut Vec<FeatureId>,
    inferred_features: &mut FeatureMayAlwaysSet,
) {
    if frame.via_type_of_ports().is_empty() {
        return;
    }
    for port in frame.via_type_of_ports().iter() {
        let Some(index) = port
            .parameter_position()
            .map(usize::from)
            .filter(|index| *index < source_register_types.len())
        else {
            warn!(
                port = %port,
                method = context.methods.signature(callee),
                "invalid via-type-of port, skipping"
            );
            continue;
        };
        let ty = source_register_types[index].map(|ty| context.types.name(ty));
        let feature = context.features.get_via_type_of_feature(ty);
        via_type_of_features_added.push(feature);
        inferred_features.add_always(feature);
    }
}

fn materialize_via_value_of_ports(
    callee: MethodId,
    context: &Context,
    frame: &Frame,
    source_constant_arguments: &[Option<String>],
    inferred_features: &mut FeatureMayAlwaysSet,
) {
    if frame.via_value_of_ports().is_empty() {
        return;
    }
    for port in frame.via_value_of_ports().iter() {
        let Some(index) = port
            .parameter_position()
            .map(usize::from)
            .filter(|index| *index < source_constant_arguments.len())
        else {
            warn!(
                port = %port,
                method = context.methods.signature(callee),
                "invalid via-value-of port, skipping"
            );
            continue;
        };
        let value = source_constant_arguments[index].as_deref();
        let feature = context.features.get_via_value_of_feature(value);
        inferred_features.add_always(feature);
    }
}
