//! Grouped set of frames sharing one taint kind.
//!
//! Frames are grouped by `(callee, callee_port, call_position,
//! canonical_names)`. Inserting a frame whose group matches an existing one
//! merges the remaining attributes pointwise: origins and positions union,
//! feature pairs join, distance takes the minimum. The grouping is what
//! keeps the domain finite: precision is kept for the group key and joined
//! away for everything else.

use rustc_hash::FxHashMap;
use std::collections::hash_map::Entry;

use crate::access::AccessPath;
use crate::canonical::CanonicalNameSet;
use crate::context::{KindId, MethodId, PositionId};
use crate::frame::Frame;

/// Attributes for which precision is retained.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct GroupKey {
    callee: Option<MethodId>,
    callee_port: AccessPath,
    call_position: Option<PositionId>,
    canonical_names: CanonicalNameSet,
}

impl GroupKey {
    fn of(frame: &Frame) -> Self {
        Self {
            callee: frame.callee(),
            callee_port: frame.callee_port().clone(),
            call_position: frame.call_position(),
            canonical_names: frame.canonical_names().clone(),
        }
    }
}

/// Set of same-kind frames, grouped and reduced by [`GroupKey`].
#[derive(Debug, Clone, Default)]
pub struct KindFrames {
    kind: Option<KindId>,
    frames: FxHashMap<GroupKey, Frame>,
}

impl KindFrames {
    #[must_use]
    pub fn bottom() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_bottom(&self) -> bool {
        self.frames.is_empty()
    }

    /// The shared kind, absent when bottom.
    #[must_use]
    pub fn kind(&self) -> Option<KindId> {
        self.kind
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Frame> {
        self.frames.values()
    }

    /// Insert a frame, merging into the matching group if one exists.
    ///
    /// All inserted frames must share this set's kind.
    pub fn add(&mut self, frame: Frame) {
        let Some(kind) = frame.kind() else {
            return;
        };
        if self.frames.is_empty() {
            self.kind = Some(kind);
        } else {
            debug_assert_eq!(self.kind, Some(kind));
        }

        match self.frames.entry(GroupKey::of(&frame)) {
            Entry::Occupied(mut entry) => entry.get_mut().join_with(&frame),
            Entry::Vacant(entry) => {
                entry.insert(frame);
            }
        }
    }

    #[must_use]
    pub fn leq(&self, other: &Self) -> bool {
        if self.is_bottom() {
            return true;
        }
        if other.is_bottom() {
            return false;
        }
        self.frames.iter().all(|(key, frame)| {
            other
                .frames
                .get(key)
                .is_some_and(|other_frame| frame.leq(other_frame))
        })
    }

    #[must_use]
    pub fn equals(&self, other: &Self) -> bool {
        if self.is_bottom() || other.is_bottom() {
            return self.is_bottom() && other.is_bottom();
        }
        self.frames == other.frames
    }

    pub fn join_with(&mut self, other: &Self) {
        if other.is_bottom() {
            return;
        }
        if self.is_bottom() {
            self.kind = other.kind;
        }
        for frame in other.frames.values() {
            self.add(frame.clone());
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
        self.frames.retain(|key, frame| {
            other.frames.get(key).is_some_and(|other_frame| {
                frame.meet_with(other_frame);
                !frame.is_bottom()
            })
        });
    }

    pub fn narrow_with(&mut self, other: &Self) {
        self.meet_with(other);
    }

    /// Asymmetric lattice subtraction: drop every group whose merged frame
    /// is subsumed by the matching group on the right.
    pub fn difference_with(&mut self, other: &Self) {
        if self.is_bottom() || other.is_bottom() {
            return;
        }
        self.frames.retain(|key, frame| {
            other
                .frames
                .get(key)
                .is_none_or(|other_frame| !frame.leq(other_frame))
        });
    }

    /// Apply an editor to every frame, regrouping afterwards (the editor may
    /// change group-key attributes such as the callee port).
    pub fn map(&mut self, f: impl Fn(&mut Frame)) {
        let mut regrouped = FxHashMap::default();
        for (_, mut frame) in self.frames.drain() {
            f(&mut frame);
            if frame.is_bottom() {
                continue;
            }
            match regrouped.entry(GroupKey::of(&frame)) {
                Entry::Occupied(mut entry) => {
                    let merged: &mut Frame = entry.get_mut();
                    merged.join_with(&frame);
                }
                Entry::Vacant(entry) => {
                    entry.insert(frame);
                }
            }
        }
        self.frames = regrouped;
    }

    /// Retain only frames matching the predicate.
    pub fn filter(&mut self, predicate: impl Fn(&Frame) -> bool) {
        self.frames.retain(|_, frame| predicate(frame));
    }
}

impl PartialEq for KindFrames {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

impl Eq for KindFrames {}

impl From<Frame> for KindFrames {
    fn from(frame: Frame) -> Self {
        let mut frames = Self::bottom();
        frames.add(frame);
        frames
    }
}
