//! A frame: one indivisible taint record.
//!
//! A frame describes taint of one kind observed at one callee port, together
//! with everything the analyzer learned on the way: the resolved callee (or
//! none for a leaf), the call position, the hop distance from the original
//! source or sink, origin methods and fields, inferred and user-declared
//! features, via-* ports awaiting materialization, locally visited positions
//! and cross-repository canonical names.
//!
//! Frames are immutable values from the caller's point of view: editors
//! return or rebuild frames, container domains regroup them.

use std::fmt;

use serde_json::{json, Value};

use crate::access::{AccessPath, PathElement};
use crate::canonical::{CanonicalName, CanonicalNameSet};
use crate::context::{Context, FieldId, KindId, MethodId, PositionId};
use crate::domain::{FieldSet, LocalPositionSet, MethodSet, PortSet};
use crate::feature::{FeatureMayAlwaysSet, FeatureSet};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Frame {
    kind: Option<KindId>,
    callee_port: AccessPath,
    callee: Option<MethodId>,
    field_callee: Option<FieldId>,
    call_position: Option<PositionId>,
    distance: u32,
    origins: MethodSet,
    field_origins: FieldSet,
    inferred_features: FeatureMayAlwaysSet,
    locally_inferred_features: FeatureMayAlwaysSet,
    user_features: FeatureSet,
    via_type_of_ports: PortSet,
    via_value_of_ports: PortSet,
    local_positions: LocalPositionSet,
    canonical_names: CanonicalNameSet,
}

impl Frame {
    /// The distinguished empty frame.
    #[must_use]
    pub fn bottom() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_bottom(&self) -> bool {
        self.kind.is_none()
    }

    /// Start building a frame of the given kind. All other attributes
    /// default to their bottom values and the port defaults to `Leaf`.
    #[must_use]
    pub fn builder(kind: KindId) -> FrameBuilder {
        FrameBuilder {
            frame: Frame {
                kind: Some(kind),
                ..Frame::default()
            },
        }
    }

    #[must_use]
    pub fn kind(&self) -> Option<KindId> {
        self.kind
    }

    #[must_use]
    pub fn callee_port(&self) -> &AccessPath {
        &self.callee_port
    }

    #[must_use]
    pub fn callee(&self) -> Option<MethodId> {
        self.callee
    }

    #[must_use]
    pub fn field_callee(&self) -> Option<FieldId> {
        self.field_callee
    }

    #[must_use]
    pub fn call_position(&self) -> Option<PositionId> {
        self.call_position
    }

    #[must_use]
    pub fn distance(&self) -> u32 {
        self.distance
    }

    #[must_use]
    pub fn origins(&self) -> &MethodSet {
        &self.origins
    }

    #[must_use]
    pub fn field_origins(&self) -> &FieldSet {
        &self.field_origins
    }

    #[must_use]
    pub fn inferred_features(&self) -> &FeatureMayAlwaysSet {
        &self.inferred_features
    }

    #[must_use]
    pub fn locally_inferred_features(&self) -> &FeatureMayAlwaysSet {
        &self.locally_inferred_features
    }

    #[must_use]
    pub fn user_features(&self) -> &FeatureSet {
        &self.user_features
    }

    #[must_use]
    pub fn via_type_of_ports(&self) -> &PortSet {
        &self.via_type_of_ports
    }

    #[must_use]
    pub fn via_value_of_ports(&self) -> &PortSet {
        &self.via_value_of_ports
    }

    #[must_use]
    pub fn local_positions(&self) -> &LocalPositionSet {
        &self.local_positions
    }

    #[must_use]
    pub fn canonical_names(&self) -> &CanonicalNameSet {
        &self.canonical_names
    }

    /// A leaf frame has no resolved callee; it is an origin endpoint.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.callee.is_none()
    }

    /// True for frames declared with a cross-repository marker root, which
    /// must not be collapsed with ordinary frames of the same kind.
    #[must_use]
    pub fn is_crtex_producer_declaration(&self) -> bool {
        self.callee_port.root().is_crtex_marker()
    }

    /// Clone of this frame with a different kind. Used by kind transforms.
    #[must_use]
    pub fn with_kind(&self, kind: KindId) -> Self {
        let mut frame = self.clone();
        frame.kind = Some(kind);
        frame
    }

    /// Extend the callee port by one path element.
    pub fn callee_port_append(&mut self, element: PathElement) {
        self.callee_port.append(element);
    }

    /// Fold features into the locally inferred set (this hop only).
    pub fn add_inferred_features(&mut self, features: &FeatureMayAlwaysSet) {
        if features.is_bottom() || features.is_empty() {
            return;
        }
        self.locally_inferred_features.add(features);
    }

    pub fn add_local_position(&mut self, position: PositionId) {
        self.local_positions.add(position);
    }

    pub fn set_local_positions(&mut self, positions: LocalPositionSet) {
        self.local_positions = positions;
    }

    pub fn set_call_position(&mut self, position: Option<PositionId>) {
        self.call_position = position;
    }

    /// Combined feature view: inferred + locally inferred, with user
    /// features counted as always present. This is what flows into the next
    /// hop's inferred features during propagation.
    #[must_use]
    pub fn features(&self) -> FeatureMayAlwaysSet {
        let mut features = self.inferred_features.clone();
        features.add(&self.locally_inferred_features);
        features.add_always_set(&self.user_features);
        features
    }

    /// Pointwise order. Frames with different identity attributes (kind,
    /// callee, port, position) are incomparable.
    #[must_use]
    pub fn leq(&self, other: &Self) -> bool {
        if self.is_bottom() {
            return true;
        }
        if other.is_bottom() {
            return false;
        }
        self.kind == other.kind
            && self.callee == other.callee
            && self.callee_port == other.callee_port
            && self.field_callee == other.field_callee
            && self.call_position == other.call_position
            && self.distance >= other.distance
            && self.origins.leq(&other.origins)
            && self.field_origins.leq(&other.field_origins)
            && self.inferred_features.leq(&other.inferred_features)
            && self
                .locally_inferred_features
                .leq(&other.locally_inferred_features)
            && self.user_features.leq(&other.user_features)
            && self.via_type_of_ports.leq(&other.via_type_of_ports)
            && self.via_value_of_ports.leq(&other.via_value_of_ports)
            && self.local_positions.leq(&other.local_positions)
            && self.canonical_names.leq(&other.canonical_names)
    }

    /// Pointwise join. Distance joins by minimum (the shortest trace wins),
    /// everything else by its own lattice. Identity attributes must match.
    pub fn join_with(&mut self, other: &Self) {
        if other.is_bottom() {
            return;
        }
        if self.is_bottom() {
            *self = other.clone();
            return;
        }
        debug_assert_eq!(self.kind, other.kind);
        debug_assert_eq!(self.callee, other.callee);
        debug_assert_eq!(self.callee_port, other.callee_port);
        debug_assert_eq!(self.call_position, other.call_position);

        if self.field_callee.is_none() {
            self.field_callee = other.field_callee;
        }
        self.distance = self.distance.min(other.distance);
        self.origins.join_with(&other.origins);
        self.field_origins.join_with(&other.field_origins);
        self.inferred_features.join_with(&other.inferred_features);
        self.locally_inferred_features
            .join_with(&other.locally_inferred_features);
        self.user_features.join_with(&other.user_features);
        self.via_type_of_ports.join_with(&other.via_type_of_ports);
        self.via_value_of_ports.join_with(&other.via_value_of_ports);
        self.local_positions.join_with(&other.local_positions);
        self.canonical_names.join_with(&other.canonical_names);
    }

    pub fn widen_with(&mut self, other: &Self) {
        self.join_with(other);
    }

    /// Pointwise meet; bottom when identity attributes differ.
    pub fn meet_with(&mut self, other: &Self) {
        if self.is_bottom() {
            return;
        }
        if other.is_bottom()
            || self.kind != other.kind
            || self.callee != other.callee
            || self.callee_port != other.callee_port
            || self.field_callee != other.field_callee
            || self.call_position != other.call_position
        {
            *self = Self::bottom();
            return;
        }
        self.distance = self.distance.max(other.distance);
        self.origins.meet_with(&other.origins);
        self.field_origins.meet_with(&other.field_origins);
        self.inferred_features.meet_with(&other.inferred_features);
        self.locally_inferred_features
            .meet_with(&other.locally_inferred_features);
        self.user_features.meet_with(&other.user_features);
        self.via_type_of_ports.meet_with(&other.via_type_of_ports);
        self.via_value_of_ports.meet_with(&other.via_value_of_ports);
        self.local_positions.meet_with(&other.local_positions);
        self.canonical_names.meet_with(&other.canonical_names);
    }

    pub fn narrow_with(&mut self, other: &Self) {
        self.meet_with(other);
    }

    /// JSON representation. Default-valued attributes are omitted.
    #[must_use]
    pub fn to_json(&self, context: &Context) -> Value {
        let mut value = serde_json::Map::new();
        if let Some(kind) = self.kind {
            value.insert("kind".to_string(), json!(context.kinds.name(kind)));
        }
        if self.callee_port != AccessPath::leaf() {
            value.insert("callee_port".to_string(), json!(self.callee_port.to_string()));
        }
        if let Some(callee) = self.callee {
            value.insert("callee".to_string(), json!(context.methods.signature(callee)));
        }
        if let Some(field_callee) = self.field_callee {
            value.insert(
                "field_callee".to_string(),
                json!(context.fields.name(field_callee)),
            );
        }
        if let Some(position) = self.call_position {
            value.insert(
                "call_position".to_string(),
                json!(context.positions.as_str(position)),
            );
        }
        if self.distance > 0 {
            value.insert("distance".to_string(), json!(self.distance));
        }
        if !self.origins.is_empty() {
            let mut origins: Vec<&str> = self
                .origins
                .iter()
                .map(|method| context.methods.signature(method))
                .collect();
            origins.sort_unstable();
            value.insert("origins".to_string(), json!(origins));
        }
        if !self.field_origins.is_empty() {
            let mut origins: Vec<&str> = self
                .field_origins
                .iter()
                .map(|field| context.fields.name(field))
                .collect();
            origins.sort_unstable();
            value.insert("field_origins".to_string(), json!(origins));
        }

        let features = self.features();
        if !features.is_bottom() && !features.is_empty() {
            let mut may: Vec<&str> = features
                .may()
                .iter()
                .filter(|feature| !features.always().contains(*feature))
                .map(|feature| context.features.name(feature))
                .collect();
            may.sort_unstable();
            if !may.is_empty() {
                value.insert("may_features".to_string(), json!(may));
            }
            let mut always: Vec<&str> = features
                .always()
                .iter()
                .map(|feature| context.features.name(feature))
                .collect();
            always.sort_unstable();
            if !always.is_empty() {
                value.insert("always_features".to_string(), json!(always));
            }
        }

        if !self.local_positions.is_empty() {
            let mut positions: Vec<&str> = self
                .local_positions
                .iter()
                .map(|position| context.positions.as_str(position))
                .collect();
            positions.sort_unstable();
            value.insert("local_positions".to_string(), json!(positions));
        }
        if !self.canonical_names.is_empty() {
            let names: Vec<Value> = self
                .canonical_names
                .iter()
                .map(|name| match name {
                    CanonicalName::Template(template) => json!({ "template": template }),
                    CanonicalName::Instantiated(instantiated) => {
                        json!({ "instantiated": instantiated })
                    }
                })
                .collect();
            value.insert("canonical_names".to_string(), json!(names));
        }
        if !self.via_type_of_ports.is_empty() {
            let mut ports: Vec<String> = self
                .via_type_of_ports
                .iter()
                .map(|port| port.to_string())
                .collect();
            ports.sort_unstable();
            value.insert("via_type_of".to_string(), json!(ports));
        }
        if !self.via_value_of_ports.is_empty() {
            let mut ports: Vec<String> = self
                .via_value_of_ports
                .iter()
                .map(|port| port.to_string())
                .collect();
            ports.sort_unstable();
            value.insert("via_value_of".to_string(), json!(ports));
        }
        Value::Object(value)
    }

    /// Render against the registries that resolve the interned ids.
    #[must_use]
    pub fn display<'a>(&'a self, context: &'a Context) -> FrameDisplay<'a> {
        FrameDisplay {
            frame: self,
            context,
        }
    }
}

/// Builder for sparse frame construction.
#[derive(Debug, Clone)]
pub struct FrameBuilder {
    frame: Frame,
}

impl FrameBuilder {
    #[must_use]
    pub fn callee_port(mut self, callee_port: AccessPath) -> Self {
        self.frame.callee_port = callee_port;
        self
    }

    #[must_use]
    pub fn callee(mut self, callee: MethodId) -> Self {
        self.frame.callee = Some(callee);
        self
    }

    #[must_use]
    pub fn field_callee(mut self, field_callee: FieldId) -> Self {
        self.frame.field_callee = Some(field_callee);
        self
    }

    #[must_use]
    pub fn call_position(mut self, position: PositionId) -> Self {
        self.frame.call_position = Some(position);
        self
    }

    #[must_use]
    pub fn distance(mut self, distance: u32) -> Self {
        self.frame.distance = distance;
        self
    }

    #[must_use]
    pub fn origins(mut self, origins: impl Into<MethodSet>) -> Self {
        self.frame.origins = origins.into();
        self
    }

    #[must_use]
    pub fn field_origins(mut self, field_origins: impl Into<FieldSet>) -> Self {
        self.frame.field_origins = field_origins.into();
        self
    }

    #[must_use]
    pub fn inferred_features(mut self, features: FeatureMayAlwaysSet) -> Self {
        self.frame.inferred_features = features;
        self
    }

    #[must_use]
    pub fn locally_inferred_features(mut self, features: FeatureMayAlwaysSet) -> Self {
        self.frame.locally_inferred_features = features;
        self
    }

    #[must_use]
    pub fn user_features(mut self, features: impl Into<FeatureSet>) -> Self {
        self.frame.user_features = features.into();
        self
    }

    #[must_use]
    pub fn via_type_of_ports(mut self, ports: impl Into<PortSet>) -> Self {
        self.frame.via_type_of_ports = ports.into();
        self
    }

    #[must_use]
    pub fn via_value_of_ports(mut self, ports: impl Into<PortSet>) -> Self {
        self.frame.via_value_of_ports = ports.into();
        self
    }

    #[must_use]
    pub fn local_positions(mut self, positions: impl Into<LocalPositionSet>) -> Self {
        self.frame.local_positions = positions.into();
        self
    }

    #[must_use]
    pub fn canonical_names(mut self, names: CanonicalNameSet) -> Self {
        self.frame.canonical_names = names;
        self
    }

    #[must_use]
    pub fn build(self) -> Frame {
        self.frame
    }
}

/// Display adapter resolving interned ids through a [`Context`].
pub struct FrameDisplay<'a> {
    frame: &'a Frame,
    context: &'a Context,
}

impl fmt::Display for FrameDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let frame = self.frame;
        let context = self.context;
        let Some(kind) = frame.kind else {
            return write!(f, "Frame(bottom)");
        };

        write!(
            f,
            "Frame(kind=`{}`, callee_port={}",
            context.kinds.name(kind),
            frame.callee_port
        )?;
        if let Some(callee) = frame.callee {
            write!(f, ", callee=`{}`", context.methods.signature(callee))?;
        }
        if let Some(field_callee) = frame.field_callee {
            write!(f, ", field_callee=`{}`", context.fields.name(field_callee))?;
        }
        if let Some(position) = frame.call_position {
            write!(f, ", call_position={}", context.positions.as_str(position))?;
        }
        if frame.distance > 0 {
            write!(f, ", distance={}", frame.distance)?;
        }
        if !frame.origins.is_empty() {
            let mut origins: Vec<&str> = frame
                .origins
                .iter()
                .map(|method| context.methods.signature(method))
                .collect();
            origins.sort_unstable();
            write!(f, ", origins={{")?;
            for (index, origin) in origins.iter().enumerate() {
                if index > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "`{origin}`")?;
            }
            write!(f, "}}")?;
        }
        if !frame.canonical_names.is_empty() {
            write!(f, ", canonical_names={{")?;
            for (index, name) in frame.canonical_names.iter().enumerate() {
                if index > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{name}")?;
            }
            write!(f, "}}")?;
        }
        write!(f, ")")
    }
}
