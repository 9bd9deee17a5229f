use std::{collections::HashMap, fmt, sync::Arc};

use camino::{Utf8Path, Utf8PathBuf};

use ariadne::Cache;
use sable_utils::define_id;

define_id!(
    /// Identity of one registered source text.
    SourceId
);

pub type Source = ariadne::Source<Arc<str>>;

/// Registry of the source texts under analysis.
///
/// The frontend never touches the file system; hosts push text in through
/// [`SourceManager::set_text`] and the parse query reads it back. Setting
/// text for an already known path replaces the entry in place and keeps the
/// id stable, which is what lets the incremental engine treat an edit as a
/// changed input rather than a new file.
#[derive(Debug, Clone, Default)]
pub struct SourceManager {
    paths: Vec<Utf8PathBuf>,
    by_path: HashMap<Utf8PathBuf, SourceId>,
    texts: HashMap<SourceId, Arc<str>>,
    sources: HashMap<SourceId, Source>,
}

impl SourceManager {
    pub const EXTENSION: &'static str = "sb";

    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the text for `path`, returning its id.
    pub fn set_text(&mut self, path: impl AsRef<Utf8Path>, text: impl Into<Arc<str>>) -> SourceId {
        let path = path.as_ref();
        let id = match self.by_path.get(path) {
            Some(&id) => id,
            None => {
                let id = SourceId::from_usize(self.paths.len());
                self.paths.push(path.to_owned());
                self.by_path.insert(path.to_owned(), id);
                id
            }
        };

        let text = text.into();
        self.sources.insert(id, Source::from(text.clone()));
        self.texts.insert(id, text);
        id
    }

    pub fn lookup(&self, path: &Utf8Path) -> Option<SourceId> {
        self.by_path.get(path).copied()
    }

    pub fn path(&self, id: SourceId) -> Option<&Utf8Path> {
        self.paths.get(id.as_usize()).map(Utf8PathBuf::as_path)
    }

    pub fn text(&self, id: SourceId) -> Option<&Arc<str>> {
        self.texts.get(&id)
    }

    pub fn get(&self, id: SourceId) -> Option<&Source> {
        self.sources.get(&id)
    }

    pub fn ids(&self) -> impl Iterator<Item = SourceId> + '_ {
        (0..self.paths.len()).map(SourceId::from_usize)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl Cache<SourceId> for &SourceManager {
    type Storage = Arc<str>;

    fn fetch(&mut self, id: &SourceId) -> Result<&Source, impl fmt::Debug> {
        self.sources.get(id).ok_or("source id not registered")
    }

    fn display<'a>(&self, id: &'a SourceId) -> Option<impl fmt::Display + 'a> {
        self.path(*id).map(|path| path.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replacing_text_keeps_the_id() {
        let mut sources = SourceManager::new();
        let a = sources.set_text("lib/main.sb", "var x: int;");
        let b = sources.set_text("lib/main.sb", "var x: int; x;");
        assert_eq!(a, b);
        assert_eq!(sources.text(a).unwrap().as_ref(), "var x: int; x;");
    }
}
