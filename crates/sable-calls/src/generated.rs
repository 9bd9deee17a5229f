use sable_resolver::LookupConfig;
use sable_tree::node::Intent;
use sable_types::{FormalDetail, QtKind, QualifiedType, TypeId, WhereResult};
use sable_utils::interner::StrKey;

use crate::fields::{field_named, fields_for_type_decl, is_name_of_field};
use crate::resolve::Ctx;
use crate::sig::{SigId, SignatureKind, TypedSignature};

/// `init`, `deinit` and `init=` may be synthesized on any composite.
pub fn is_name_of_compiler_generated_method(ctx: &Ctx<'_>, name: StrKey) -> bool {
    // TODO: extend once `hash` and `==` synthesis lands
    matches!(&ctx.strings[name], "init" | "deinit" | "init=")
}

/// Whether a compiler-generated method is needed: the name is one we
/// synthesize (or, parenless, a field accessor) and the receiver type's
/// defining scope declares no user overload.
pub fn need_compiler_generated_method(
    ctx: &mut Ctx<'_>,
    ty: TypeId,
    name: StrKey,
    parenless: bool,
) -> bool {
    if is_name_of_compiler_generated_method(ctx, name) {
        return !overloads_present_in_defining_scope(ctx, ty, name);
    }

    if parenless && is_name_of_field(ctx, ty, name) {
        return !overloads_present_in_defining_scope(ctx, ty, name);
    }

    false
}

fn overloads_present_in_defining_scope(ctx: &Ctx<'_>, ty: TypeId, name: StrKey) -> bool {
    let Some(composite) = ctx.types.get(ty).as_composite() else {
        // no defining scope, nothing can shadow the synthesis
        return false;
    };
    let Some(scope) = ctx.program.scopes.scope_for(composite.decl) else {
        return false;
    };

    // do not look outside the defining module
    let config = LookupConfig::DECLS_PARENTS
        .with_only_methods()
        .with_stop_at_module();
    !ctx.program
        .scopes
        .lookup(scope, name, config, &ctx.program.symbols)
        .is_empty()
}

/// Synthesizes the typed signature of a compiler-generated method on `ty`,
/// or `None` when `name` is not one we generate.
pub fn generated_signature(ctx: &mut Ctx<'_>, ty: TypeId, name: StrKey) -> Option<SigId> {
    let composite = ctx.types.get(ty).as_composite()?.clone();
    let receiver = receiver_formal(ctx, ty);
    let name_text = ctx.strings[name].to_owned();

    let sig = match name_text.as_str() {
        // one formal per field in declaration order; intent mirrors the
        // field's kind, defaults mirror field initializers
        "init" => {
            let fields = fields_for_type_decl(ctx, ty, true);
            let mut formals = vec![receiver];
            let mut needs_instantiation = false;
            for field in &fields {
                let intent = match field.qt.kind {
                    QtKind::Type => Intent::Type,
                    QtKind::Param => Intent::Param,
                    _ => Intent::In,
                };
                let qt = match field.qt.kind {
                    QtKind::Type | QtKind::Param => field.qt,
                    _ => field.qt.with_kind(QtKind::In),
                };
                if ctx.types.is_generic(qt.ty) {
                    needs_instantiation = true;
                }
                formals.push(FormalDetail {
                    name: field.name,
                    intent,
                    qt,
                    has_default: field.has_default,
                });
            }
            TypedSignature {
                untyped: composite.decl,
                name,
                kind: SignatureKind::GeneratedInit,
                is_method: true,
                parenless: false,
                formals,
                return_type: void_qt(ctx),
                where_result: WhereResult::None,
                needs_instantiation,
                instantiation: None,
            }
        }
        "deinit" => TypedSignature {
            untyped: composite.decl,
            name,
            kind: SignatureKind::GeneratedDeinit,
            is_method: true,
            parenless: false,
            formals: vec![receiver],
            return_type: void_qt(ctx),
            where_result: WhereResult::None,
            needs_instantiation: false,
            instantiation: None,
        },
        "init=" => {
            let other = FormalDetail {
                name: ctx.strings.intern("other"),
                intent: Intent::ConstIn,
                qt: QualifiedType::const_in(ty),
                has_default: false,
            };
            TypedSignature {
                untyped: composite.decl,
                name,
                kind: SignatureKind::GeneratedInitEq,
                is_method: true,
                parenless: false,
                formals: vec![receiver, other],
                return_type: void_qt(ctx),
                where_result: WhereResult::None,
                needs_instantiation: false,
                instantiation: None,
            }
        }
        // field accessor: parenless, returns the field type; the result
        // kind tracks receiver const-ness at the call site
        _ => {
            let field = field_named(ctx, ty, name)?;
            TypedSignature {
                untyped: field.decl,
                name,
                kind: SignatureKind::GeneratedAccessor,
                is_method: true,
                parenless: true,
                formals: vec![receiver],
                return_type: field.qt.with_kind(QtKind::ConstRef),
                where_result: WhereResult::None,
                needs_instantiation: false,
                instantiation: None,
            }
        }
    };

    Some(ctx.tables.sigs.intern(sig))
}

fn receiver_formal(ctx: &mut Ctx<'_>, ty: TypeId) -> FormalDetail {
    FormalDetail {
        name: ctx.strings.intern("this"),
        intent: Intent::Ref,
        qt: QualifiedType::reference(ty),
        has_default: false,
    }
}

fn void_qt(ctx: &mut Ctx<'_>) -> QualifiedType {
    QualifiedType::var(ctx.types.void())
}
