//! Unique strings.
//!
//! Identifier values are interned once per context; equality and hashing of
//! [`StrKey`] are integer operations. Keys stay stable across a sweep: the
//! collector tombstones dead slots instead of compacting the table.

use std::collections::HashMap;
use std::fmt;
use std::ops::Index;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StrKey(u32);

impl StrKey {
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for StrKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'s{}", self.0)
    }
}

/// Context-owned string interner with mark/sweep collection.
#[derive(Debug, Clone, Default)]
pub struct StrInterner {
    slots: Vec<Option<Rc<str>>>,
    map: HashMap<Rc<str>, u32>,
}

impl StrInterner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            map: HashMap::with_capacity(capacity),
        }
    }

    /// Interns a string, returning its key. Re-interning an already known
    /// string returns the existing key.
    pub fn intern(&mut self, value: &str) -> StrKey {
        if let Some(&raw) = self.map.get(value) {
            return StrKey(raw);
        }

        let raw = self.slots.len() as u32;
        let shared: Rc<str> = Rc::from(value);
        self.slots.push(Some(shared.clone()));
        self.map.insert(shared, raw);
        StrKey(raw)
    }

    /// Looks a string up without interning it.
    pub fn lookup(&self, value: &str) -> Option<StrKey> {
        self.map.get(value).copied().map(StrKey)
    }

    /// Returns the string for a key, or `None` when the key was swept.
    pub fn get(&self, key: StrKey) -> Option<&str> {
        self.slots
            .get(key.as_usize())
            .and_then(|slot| slot.as_deref())
    }

    pub fn contains(&self, value: &str) -> bool {
        self.map.contains_key(value)
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (StrKey, &str)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.as_deref().map(|value| (StrKey(index as u32), value))
        })
    }

    /// Sweeps every entry for which `is_live` returns false. Surviving keys
    /// keep their value; swept slots become tombstones so key stability is
    /// preserved. Returns the number of entries removed.
    pub fn sweep(&mut self, mut is_live: impl FnMut(StrKey) -> bool) -> usize {
        let mut removed = 0;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            let key = StrKey(index as u32);
            if let Some(value) = slot {
                if !is_live(key) {
                    self.map.remove(value.as_ref() as &str);
                    *slot = None;
                    removed += 1;
                }
            }
        }
        removed
    }
}

impl Index<StrKey> for StrInterner {
    type Output = str;

    fn index(&self, key: StrKey) -> &Self::Output {
        self.get(key).expect("string key swept or out of range")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_is_idempotent() {
        let mut interner = StrInterner::new();
        let a = interner.intern("init");
        let b = interner.intern("init");
        assert_eq!(a, b);
        assert_eq!(&interner[a], "init");
        assert_eq!(interner.len(), 1);
    }

    #[test]
    fn keys_survive_sweep() {
        let mut interner = StrInterner::new();
        let keep = interner.intern("keep");
        let drop = interner.intern("drop");

        let removed = interner.sweep(|key| key == keep);
        assert_eq!(removed, 1);
        assert_eq!(interner.get(drop), None);
        assert_eq!(&interner[keep], "keep");

        // a re-intern after sweeping allocates a fresh slot
        let again = interner.intern("drop");
        assert_ne!(again, drop);
    }
}
