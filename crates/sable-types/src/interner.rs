use std::collections::HashMap;

use sable_utils::{define_id, interner::StrInterner};

use crate::data::TypeData;

define_id!(
    /// Handle of one canonical type. Equal ids are equal types.
    TypeId
);

/// Hash-consing store for [`TypeData`].
///
/// Slots are tombstoned by the sweep pass rather than compacted, so
/// surviving ids stay valid across a collection.
#[derive(Debug, Clone, Default)]
pub struct TypeInterner {
    slots: Vec<Option<TypeData>>,
    map: HashMap<TypeData, TypeId>,
}

impl TypeInterner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, data: TypeData) -> TypeId {
        if let Some(&id) = self.map.get(&data) {
            return id;
        }
        let id = TypeId::from_usize(self.slots.len());
        self.slots.push(Some(data.clone()));
        self.map.insert(data, id);
        id
    }

    pub fn get(&self, id: TypeId) -> &TypeData {
        self.slots[id.as_usize()]
            .as_ref()
            .expect("type id swept or out of range")
    }

    pub fn try_get(&self, id: TypeId) -> Option<&TypeData> {
        self.slots.get(id.as_usize()).and_then(Option::as_ref)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    // common builtins

    pub fn int(&mut self, width: u16) -> TypeId {
        self.intern(TypeData::Int(width))
    }

    pub fn int_default(&mut self) -> TypeId {
        self.int(64)
    }

    pub fn uint(&mut self, width: u16) -> TypeId {
        self.intern(TypeData::Uint(width))
    }

    pub fn real(&mut self, width: u16) -> TypeId {
        self.intern(TypeData::Real(width))
    }

    pub fn bool_(&mut self) -> TypeId {
        self.intern(TypeData::Bool)
    }

    pub fn str_(&mut self) -> TypeId {
        self.intern(TypeData::Str)
    }

    pub fn void(&mut self) -> TypeId {
        self.intern(TypeData::Void)
    }

    pub fn nothing(&mut self) -> TypeId {
        self.intern(TypeData::Nothing)
    }

    pub fn unknown(&mut self) -> TypeId {
        self.intern(TypeData::Unknown)
    }

    pub fn erroneous(&mut self) -> TypeId {
        self.intern(TypeData::Erroneous)
    }

    pub fn any_type(&mut self) -> TypeId {
        self.intern(TypeData::AnyType)
    }

    pub fn any_numeric(&mut self) -> TypeId {
        self.intern(TypeData::AnyNumeric)
    }

    /// Whether `id` transitively contains generic parts.
    pub fn is_generic(&self, id: TypeId) -> bool {
        let data = self.get(id);
        if data.is_generic_shallow() {
            return true;
        }
        data.referenced_types()
            .into_iter()
            .any(|inner| inner != id && self.is_generic(inner))
    }

    /// The fully generic root of an instantiation chain.
    pub fn generic_root(&self, id: TypeId) -> TypeId {
        match self.get(id).as_composite().and_then(|c| c.instantiated_from) {
            Some(from) => self.generic_root(from),
            None => id,
        }
    }

    /// Marks `id` and everything it references into `live`.
    pub fn mark(&self, id: TypeId, live: &mut std::collections::HashSet<TypeId>) {
        if !live.insert(id) {
            return;
        }
        if let Some(data) = self.try_get(id) {
            for inner in data.referenced_types() {
                self.mark(inner, live);
            }
        }
    }

    /// Sweeps every type for which `is_live` returns false; returns the
    /// number of entries removed.
    pub fn sweep(&mut self, mut is_live: impl FnMut(TypeId) -> bool) -> usize {
        let mut removed = 0;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            let id = TypeId::from_usize(index);
            if let Some(data) = slot {
                if !is_live(id) {
                    self.map.remove(data);
                    *slot = None;
                    removed += 1;
                }
            }
        }
        removed
    }

    /// Human-readable rendering, for diagnostics.
    pub fn display(&self, id: TypeId, strings: &StrInterner) -> String {
        use TypeData::*;

        match self.get(id) {
            Int(w) => format!("int({w})"),
            Uint(w) => format!("uint({w})"),
            Real(w) => format!("real({w})"),
            Imag(w) => format!("imag({w})"),
            Complex(w) => format!("complex({w})"),
            Bool => "bool".into(),
            Str => "string".into(),
            Nothing => "nothing".into(),
            Void => "void".into(),
            Unknown => "<unknown>".into(),
            Erroneous => "<erroneous>".into(),
            AnyType => "?".into(),
            AnyNumeric => "numeric".into(),
            TypeVar(v) => strings[v.name].to_owned(),
            Record(c) | Union(c) | BasicClass(c) => strings[c.name].to_owned(),
            Class { basic, decorator } => {
                let management = format!("{}", decorator.management).to_lowercase();
                let suffix = if decorator.is_nilable() { "?" } else { "" };
                format!("{management} {}{suffix}", self.display(*basic, strings))
            }
            Tuple(t) => {
                let elems: Vec<String> = t
                    .elems
                    .iter()
                    .map(|qt| self.display(qt.ty, strings))
                    .collect();
                format!("({})", elems.join(", "))
            }
            Domain { rank } => format!("domain({rank})"),
            Array { elem, domain } => format!(
                "[{}] {}",
                self.display(*domain, strings),
                self.display(*elem, strings)
            ),
            Enum(e) => strings[e.name].to_owned(),
            Function(f) => {
                let formals: Vec<String> = f
                    .formals
                    .iter()
                    .map(|d| self.display(d.qt.ty, strings))
                    .collect();
                format!(
                    "proc({}): {}",
                    formals.join(", "),
                    self.display(f.return_type.ty, strings)
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Decorator, Genericity};
    use crate::CompositeType;
    use sable_tree::AstId;
    use sable_utils::interner::StrInterner;

    #[test]
    fn equal_forms_intern_to_equal_ids() {
        let mut types = TypeInterner::new();
        let a = types.int(64);
        let b = types.intern(TypeData::Int(64));
        assert_eq!(a, b);
        assert_ne!(a, types.int(32));
    }

    #[test]
    fn class_display_shows_decorator() {
        let mut strings = StrInterner::new();
        let mut types = TypeInterner::new();

        let name = strings.intern("Parent");
        let decl = AstId::symbol_root(strings.intern("M.Parent"));
        let basic = types.intern(TypeData::BasicClass(CompositeType::root(
            decl,
            name,
            Genericity::Concrete,
        )));
        let owned = types.intern(TypeData::Class {
            basic,
            decorator: Decorator::owned(),
        });

        assert_eq!(types.display(owned, &strings), "owned Parent");
    }

    #[test]
    fn sweep_keeps_marked_types() {
        let mut types = TypeInterner::new();
        let keep = types.int(64);
        let drop = types.uint(8);

        let mut live = std::collections::HashSet::new();
        types.mark(keep, &mut live);
        let removed = types.sweep(|id| live.contains(&id));

        assert_eq!(removed, 1);
        assert!(types.try_get(drop).is_none());
        assert_eq!(types.get(keep), &TypeData::Int(64));
    }
}
