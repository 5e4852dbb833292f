//! Interned identifiers and their registries.
//!
//! Every name-like value in the domain (taint kinds, method and field
//! references, type names, source positions, features) is interned once and
//! referred to by a small copyable id. Ids compare by identity, which is what
//! makes frame grouping and set operations cheap.
//!
//! Registries intern through `&self` so that `propagate` can materialize new
//! features (via-type-of, via-value-of) concurrently from several analysis
//! workers. The domain itself only ever reads.

use lasso::{Spur, ThreadedRodeo};

/// Interned taint kind (e.g. `UserInputSource`, `NetworkSink`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KindId(Spur);

/// Interned method reference, identified by its signature string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodId(Spur);

/// Interned field reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldId(Spur);

/// Interned type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(Spur);

/// Interned source position (`file:line`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PositionId(Spur);

/// Interned feature tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FeatureId(Spur);

/// Registry of taint kinds.
///
/// The `artificial-source` kind is distinguished: the analyzer uses it to
/// track dataflow that is not user-visible taint, and several consumers
/// filter it out before reporting.
#[derive(Debug)]
pub struct Kinds {
    names: ThreadedRodeo,
    artificial_source: Spur,
}

impl Kinds {
    #[must_use]
    pub fn new() -> Self {
        let names = ThreadedRodeo::new();
        let artificial_source = names.get_or_intern_static("artificial-source");
        Self {
            names,
            artificial_source,
        }
    }

    pub fn get(&self, name: &str) -> KindId {
        KindId(self.names.get_or_intern(name))
    }

    #[must_use]
    pub fn name(&self, kind: KindId) -> &str {
        self.names.resolve(&kind.0)
    }

    /// The distinguished kind used for non-reportable dataflow tracking.
    #[must_use]
    pub fn artificial_source(&self) -> KindId {
        KindId(self.artificial_source)
    }
}

impl Default for Kinds {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry of method references, keyed by signature.
#[derive(Debug, Default)]
pub struct Methods {
    signatures: ThreadedRodeo,
}

impl Methods {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, signature: &str) -> MethodId {
        MethodId(self.signatures.get_or_intern(signature))
    }

    #[must_use]
    pub fn signature(&self, method: MethodId) -> &str {
        self.signatures.resolve(&method.0)
    }
}

/// Registry of field references.
#[derive(Debug, Default)]
pub struct Fields {
    names: ThreadedRodeo,
}

impl Fields {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> FieldId {
        FieldId(self.names.get_or_intern(name))
    }

    #[must_use]
    pub fn name(&self, field: FieldId) -> &str {
        self.names.resolve(&field.0)
    }
}

/// Registry of type names.
#[derive(Debug, Default)]
pub struct Types {
    names: ThreadedRodeo,
}

impl Types {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> TypeId {
        TypeId(self.names.get_or_intern(name))
    }

    #[must_use]
    pub fn name(&self, ty: TypeId) -> &str {
        self.names.resolve(&ty.0)
    }
}

/// Registry of source positions.
///
/// A position is a `(file, line)` pair, stored in its rendered `file:line`
/// form. Positions with no known file render as `unknown:line`.
#[derive(Debug, Default)]
pub struct Positions {
    rendered: ThreadedRodeo,
}

impl Positions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: Option<&str>, line: u32) -> PositionId {
        let rendered = format!("{}:{}", path.unwrap_or("unknown"), line);
        PositionId(self.rendered.get_or_intern(rendered))
    }

    #[must_use]
    pub fn as_str(&self, position: PositionId) -> &str {
        self.rendered.resolve(&position.0)
    }
}

/// Registry of feature tags.
///
/// Besides plain user-declared features, the registry derives features
/// materialized during propagation: the runtime type of an argument
/// (`via-type`), a cast target (`via-cast`), a constant argument value
/// (`via-value`) and a shimmed target method (`via-shim`).
#[derive(Debug, Default)]
pub struct Features {
    names: ThreadedRodeo,
}

impl Features {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> FeatureId {
        FeatureId(self.names.get_or_intern(name))
    }

    #[must_use]
    pub fn name(&self, feature: FeatureId) -> &str {
        self.names.resolve(&feature.0)
    }

    pub fn get_via_type_of_feature(&self, ty: Option<&str>) -> FeatureId {
        self.get(&format!("via-type:{}", ty.unwrap_or("unknown")))
    }

    pub fn get_via_cast_feature(&self, ty: Option<&str>) -> FeatureId {
        self.get(&format!("via-cast:{}", ty.unwrap_or("unknown")))
    }

    pub fn get_via_value_of_feature(&self, value: Option<&str>) -> FeatureId {
        self.get(&format!("via-value:{}", value.unwrap_or("unknown")))
    }

    pub fn get_via_shim_feature(&self, method: Option<&str>) -> FeatureId {
        self.get(&format!("via-shim:{}", method.unwrap_or("unknown")))
    }
}

/// Aggregate of all registries the domain reads from.
///
/// Owned by the analyzer driver; the domain borrows it during propagation,
/// serialization and display.
#[derive(Debug)]
pub struct Context {
    pub kinds: Kinds,
    pub methods: Methods,
    pub fields: Fields,
    pub types: Types,
    pub positions: Positions,
    pub features: Features,
}

impl Context {
    #[must_use]
    pub fn new() -> Self {
        Self {
            kinds: Kinds::new(),
            methods: Methods::new(),
            fields: Fields::new(),
            types: Types::new(),
            positions: Positions::new(),
            features: Features::new(),
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
