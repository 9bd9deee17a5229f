use sable_tree::node::{Node, StorageClass};
use sable_tree::AstId;
use sable_types::{QtKind, QualifiedType, TypeId};
use sable_utils::interner::StrKey;
use serde::{Deserialize, Serialize};

use crate::resolve::Ctx;

/// One field of a composite, with inherited fields included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldInfo {
    pub decl: AstId,
    pub name: StrKey,
    pub qt: QualifiedType,
    pub has_default: bool,
}

/// Ordered field list of a composite type, parent-class fields first.
///
/// Substituted fields answer with their concrete types; unsubstituted
/// `type`/`param` fields stay generic unless `use_generic_defaults` asks
/// for their declared defaults.
pub fn fields_for_type_decl(ctx: &mut Ctx<'_>, ty: TypeId, use_generic_defaults: bool) -> Vec<FieldInfo> {
    let Some(composite) = ctx.types.get(ty).as_composite().cloned() else {
        return Vec::new();
    };

    let mut fields = Vec::new();
    if let Some(parent) = composite.parent_class {
        fields.extend(fields_for_type_decl(ctx, parent, use_generic_defaults));
    }

    let Some((ast, node)) = ctx.program.ast_for(ctx.strings, composite.decl) else {
        return fields;
    };
    let ast = ast.clone();
    let Some(decl) = ast.node(node).as_aggregate().cloned() else {
        return fields;
    };

    for &child in &decl.body {
        let Node::Variable(field) = ast.node(child) else {
            continue;
        };
        let field = field.clone();
        let field_id = ast.ast_id(child);

        let qt = match composite.substitution.get(field_id) {
            Some(substituted) => substituted,
            None => ctx.field_type(&ast, child, &field, ty, use_generic_defaults),
        };
        let qt = match field.storage {
            StorageClass::Type => qt.with_kind(QtKind::Type),
            StorageClass::Param => qt.with_kind(QtKind::Param),
            StorageClass::Const => qt.with_kind(QtKind::Const),
            _ => qt.with_kind(QtKind::Var),
        };

        fields.push(FieldInfo {
            decl: field_id,
            name: field.name,
            qt,
            has_default: field.init.is_some(),
        });
    }

    fields
}

/// Whether `name` names a field of the composite behind `ty`.
pub fn is_name_of_field(ctx: &mut Ctx<'_>, ty: TypeId, name: StrKey) -> bool {
    fields_for_type_decl(ctx, ty, false)
        .iter()
        .any(|field| field.name == name)
}

/// Looks a field up by name.
pub fn field_named(ctx: &mut Ctx<'_>, ty: TypeId, name: StrKey) -> Option<FieldInfo> {
    fields_for_type_decl(ctx, ty, false)
        .into_iter()
        .find(|field| field.name == name)
}
