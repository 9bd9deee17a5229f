use std::{fmt, ops::Range};

use serde::{Deserialize, Serialize};

use crate::{source::SourceId, Span};

pub type Located<T> = (T, Loc);

/// A span tied to the source it came from.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Loc {
    pub source: SourceId,
    pub span: Span,
}

impl fmt::Debug for Loc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self { source, span } = self;
        write!(f, "{span} in {source}")
    }
}

impl fmt::Display for Loc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self { source, span } = self;
        write!(f, "{span} in {source}")
    }
}

impl Loc {
    #[inline]
    pub fn new(source: SourceId, span: Span) -> Self {
        Self { source, span }
    }

    #[inline]
    pub fn from_range(source: SourceId, range: Range<usize>) -> Self {
        Self::new(source, Span::from(range))
    }

    #[inline]
    pub fn source(self) -> SourceId {
        self.source
    }

    #[inline]
    pub fn span(self) -> Span {
        self.span
    }

    #[inline]
    pub fn len(self) -> usize {
        self.span.len()
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.span.is_empty()
    }

    /// Returns true if this loc completely contains the other loc
    #[inline]
    pub fn contains(self, other: Self) -> bool {
        debug_assert_eq!(self.source, other.source);

        self.span.contains(&other.span)
    }

    /// Returns the union of two locs (smallest loc that contains both)
    #[inline]
    pub fn union(self, other: Self) -> Self {
        debug_assert_eq!(self.source, other.source);

        Self::new(self.source, self.span.union(&other.span))
    }

    /// Creates a loc that covers all the given locs
    #[inline]
    pub fn covering<I>(locs: I) -> Option<Self>
    where
        I: IntoIterator<Item = Self>,
    {
        locs.into_iter().reduce(Loc::union)
    }
}

impl ariadne::Span for Loc {
    type SourceId = SourceId;

    fn source(&self) -> &Self::SourceId {
        &self.source
    }

    fn start(&self) -> usize {
        self.span.start
    }

    fn end(&self) -> usize {
        self.span.end
    }
}

impl From<Loc> for Range<usize> {
    fn from(value: Loc) -> Self {
        value.span.into()
    }
}
