//! Index-style id newtypes.
//!
//! Every arena in the frontend addresses its slots through a dedicated id
//! type so indices of different tables cannot be mixed up.

/// Defines a `u32`-backed id newtype with the usual conversions.
#[macro_export]
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
            serde::Serialize, serde::Deserialize,
        )]
        pub struct $name(u32);

        impl $name {
            #[inline]
            pub const fn new(raw: u32) -> Self {
                Self(raw)
            }

            #[inline]
            pub fn from_usize(index: usize) -> Self {
                Self(index as u32)
            }

            #[inline]
            pub const fn raw(self) -> u32 {
                self.0
            }

            #[inline]
            pub const fn as_usize(self) -> usize {
                self.0 as usize
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

/// A monotonically increasing id source for tables that allocate ids
/// independently of a backing vector.
#[derive(Debug, Default, Clone)]
pub struct IdSource {
    next: u32,
}

impl IdSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_raw(&mut self) -> u32 {
        let raw = self.next;
        self.next += 1;
        raw
    }
}

#[cfg(test)]
mod tests {
    use super::IdSource;

    crate::define_id!(TestId);

    #[test]
    fn roundtrip() {
        let id = TestId::from_usize(7);
        assert_eq!(id.as_usize(), 7);
        assert_eq!(id, TestId::new(7));
    }

    #[test]
    fn source_is_dense() {
        let mut source = IdSource::new();
        assert_eq!(source.next_raw(), 0);
        assert_eq!(source.next_raw(), 1);
        assert_eq!(source.next_raw(), 2);
    }
}
