//! Access paths: where taint enters or leaves a method.
//!
//! An [`AccessPath`] is a port root plus a sequence of field accesses, e.g.
//! `Argument(0).payload.body`. Roots also encode the two cross-repository
//! declaration markers (`Anchor`, `Producer`) whose frames receive special
//! treatment during propagation.
//!
//! The textual form round-trips through [`AccessPath::parse`] and `Display`.

use std::fmt;

use smallvec::SmallVec;

use crate::error::{TaintError, TaintResult};

/// Root of an access path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Root {
    /// The return value of the method.
    Return,
    /// Default port for a frame that is not attached to a method yet.
    Leaf,
    /// Cross-repository export marker.
    Anchor,
    /// Cross-repository producer marker.
    Producer,
    /// The n-th argument (0-indexed, receiver included for instance methods).
    Argument(u16),
}

impl Root {
    #[must_use]
    pub const fn is_argument(self) -> bool {
        matches!(self, Self::Argument(_))
    }

    /// Argument index if this is an argument root.
    #[must_use]
    pub const fn parameter_position(self) -> Option<u16> {
        match self {
            Self::Argument(position) => Some(position),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_anchor(self) -> bool {
        matches!(self, Self::Anchor)
    }

    #[must_use]
    pub const fn is_producer(self) -> bool {
        matches!(self, Self::Producer)
    }

    /// Roots that mark a cross-repository export declaration.
    #[must_use]
    pub const fn is_crtex_marker(self) -> bool {
        matches!(self, Self::Anchor | Self::Producer)
    }

    /// Parse from the textual form (`Return`, `Leaf`, `Anchor`, `Producer`,
    /// `Argument(n)`).
    pub fn parse(value: &str) -> TaintResult<Self> {
        match value {
            "Return" => Ok(Self::Return),
            "Leaf" => Ok(Self::Leaf),
            "Anchor" => Ok(Self::Anchor),
            "Producer" => Ok(Self::Producer),
            _ => {
                let index = value
                    .strip_prefix("Argument(")
                    .and_then(|rest| rest.strip_suffix(')'))
                    .ok_or_else(|| {
                        TaintError::invalid_root(value, "expected `Argument(<index>)`")
                    })?;
                let index = index.parse::<u16>().map_err(|_| {
                    TaintError::invalid_root(value, "argument index is not a small integer")
                })?;
                Ok(Self::Argument(index))
            }
        }
    }
}

impl fmt::Display for Root {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Return => write!(f, "Return"),
            Self::Leaf => write!(f, "Leaf"),
            Self::Anchor => write!(f, "Anchor"),
            Self::Producer => write!(f, "Producer"),
            Self::Argument(position) => write!(f, "Argument({position})"),
        }
    }
}

/// One field access in a path.
///
/// Elements are short owned strings with structural equality. Identity
/// semantics are not load-bearing here the way they are for kinds and
/// methods, so they stay out of the interner.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PathElement(Box<str>);

impl PathElement {
    pub fn new(name: impl Into<Box<str>>) -> Self {
        Self(name.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PathElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PathElement {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// A root plus an ordered sequence of field accesses.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AccessPath {
    root: Root,
    path: SmallVec<[PathElement; 4]>,
}

impl AccessPath {
    #[must_use]
    pub fn new(root: Root) -> Self {
        Self {
            root,
            path: SmallVec::new(),
        }
    }

    #[must_use]
    pub fn with_path(root: Root, path: impl IntoIterator<Item = PathElement>) -> Self {
        Self {
            root,
            path: path.into_iter().collect(),
        }
    }

    /// The default port: a leaf with no field accesses.
    #[must_use]
    pub fn leaf() -> Self {
        Self::new(Root::Leaf)
    }

    #[must_use]
    pub fn argument(position: u16) -> Self {
        Self::new(Root::Argument(position))
    }

    #[must_use]
    pub const fn root(&self) -> Root {
        self.root
    }

    #[must_use]
    pub fn path(&self) -> &[PathElement] {
        &self.path
    }

    /// Extend the path by one field access.
    pub fn append(&mut self, element: PathElement) {
        self.path.push(element);
    }

    /// Canonical cross-repository form of this port.
    ///
    /// Argument and return ports are rewritten to an `Anchor` root carrying
    /// the canonical port marker as the single path element. Argument
    /// indices shift down by one, following the dex convention that the
    /// receiver occupies index 0 (`Argument(0)` becomes
    /// `Anchor.Argument(-1)`). Ports already rooted at a cross-repository
    /// marker are returned unchanged.
    #[must_use]
    pub fn canonicalize_for_crtex(&self) -> Self {
        let element = match self.root {
            Root::Anchor | Root::Producer => return self.clone(),
            Root::Argument(position) => {
                PathElement::new(format!("Argument({})", i32::from(position) - 1))
            }
            Root::Return | Root::Leaf => PathElement::new("Return"),
        };
        Self::with_path(Root::Anchor, [element])
    }

    /// Parse from the textual form, e.g. `Argument(0).payload.body`.
    pub fn parse(value: &str) -> TaintResult<Self> {
        let mut segments = value.split('.');
        let root_text = segments
            .next()
            .filter(|segment| !segment.is_empty())
            .ok_or_else(|| TaintError::invalid_access_path(value, "empty path"))?;
        let root = Root::parse(root_text)
            .map_err(|_| TaintError::invalid_access_path(value, "unrecognized root"))?;

        let mut path = SmallVec::new();
        for segment in segments {
            if segment.is_empty() {
                return Err(TaintError::invalid_access_path(value, "empty path element"));
            }
            path.push(PathElement::new(segment));
        }
        Ok(Self { root, path })
    }
}

impl Default for AccessPath {
    fn default() -> Self {
        Self::leaf()
    }
}

impl fmt::Display for AccessPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root)?;
        for element in &self.path {
            write!(f, ".{element}")?;
        }
        Ok(())
    }
}

impl From<Root> for AccessPath {
    fn from(root: Root) -> Self {
        Self::new(root)
    }
}
