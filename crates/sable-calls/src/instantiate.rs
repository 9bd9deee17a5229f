use std::collections::HashMap;

use sable_tree::node::ModuleDecl;
use sable_tree::{clone_subtree, Ast, AstBuilder, AstId, NodeId};
use sable_types::{substitute, QualifiedType, Substitution};

use crate::error::CallError;
use crate::resolve::Ctx;
use crate::sig::{SigId, TypedSignature};

/// A generic function cloned for one substitution.
///
/// The clone carries fresh ids under a synthetic `<inst>#n` module so two
/// instantiations never collide; `id_map` lets resolution results computed
/// on the original body be re-targeted onto the clone.
#[derive(Debug, Clone)]
pub struct InstantiatedFn {
    pub ast: Ast,
    pub root: NodeId,
    pub origin: AstId,
    pub sig: SigId,
    pub subs: Substitution,
    pub id_map: HashMap<NodeId, NodeId>,
}

/// Runs the generic instantiator for `generic` under `subs`.
///
/// Formal and return types are rewritten through the substitution, the
/// declaration subtree is cloned with fresh ids, and the resulting typed
/// signature is interned: equal substitutions share one instantiation.
pub fn instantiate_signature(
    ctx: &mut Ctx<'_>,
    generic: SigId,
    subs: Substitution,
) -> Result<SigId, CallError> {
    let origin = ctx.tables.sigs.get(generic).untyped;

    if let Some(&existing) = ctx.tables.instantiations.get(&(origin, subs.clone())) {
        return Ok(existing);
    }

    // instantiating a signature while it is already being instantiated
    // with the same substitution is a cyclic generic instantiation
    if !ctx.tables.in_progress.insert((origin, subs.clone())) {
        let loc = ctx
            .program
            .ast_for(ctx.strings, origin)
            .map(|(ast, node)| ast.locate(node));
        return Err(CallError::GenericInstantiationFailure {
            name: ctx.strings[ctx.tables.sigs.get(generic).name].to_owned(),
            loc: loc.unwrap_or_else(|| ctx.fallback_loc()),
        });
    }

    let original = ctx.tables.sigs.get(generic).clone();

    let formals = original
        .formals
        .iter()
        .map(|formal| {
            let mut rewritten = *formal;
            rewritten.qt = QualifiedType {
                ty: substitute(ctx.types, formal.qt.ty, &subs),
                ..formal.qt
            };
            // type and param formals take their bound value from the
            // substitution directly
            if let Some(bound) = subs.get(crate::resolve::formal_decl_id(ctx, &original, formal)) {
                rewritten.qt = bound.with_kind(formal.qt.kind);
                if bound.is_param() {
                    rewritten.qt.param = bound.param;
                }
            }
            rewritten
        })
        .collect::<Vec<_>>();

    let return_type = QualifiedType {
        ty: substitute(ctx.types, original.return_type.ty, &subs),
        ..original.return_type
    };

    let instantiated = TypedSignature {
        formals,
        return_type,
        needs_instantiation: false,
        instantiation: Some(subs.clone()),
        ..original
    };
    let sig = ctx.tables.sigs.intern(instantiated);
    ctx.tables
        .instantiations
        .insert((origin, subs.clone()), sig);

    // clone the declaration subtree so the instantiation has an identity of
    // its own; body resolution re-runs on it through id_map
    if let Some((ast, node)) = ctx.program.ast_for(ctx.strings, origin) {
        let ast = ast.clone();
        let mut builder = AstBuilder::new();
        let (new_root, id_map) = clone_subtree(&ast, node, &mut builder);

        let serial = ctx.tables.instantiation_serial;
        ctx.tables.instantiation_serial += 1;
        let wrapper_name = ctx.strings.intern(&format!("<inst>#{serial}"));
        let module = builder.push(
            ModuleDecl {
                name: wrapper_name,
                body: vec![new_root],
            },
            ast.locate(node),
        );
        let clone = builder.finish(module, ctx.strings);

        ctx.tables.pending.push(InstantiatedFn {
            ast: clone,
            root: new_root,
            origin,
            sig,
            subs: subs.clone(),
            id_map,
        });
    }

    ctx.tables.in_progress.remove(&(origin, subs));
    Ok(sig)
}

#[cfg(test)]
mod tests {
    use super::*;

    // instantiate_signature is exercised end-to-end through the driver's
    // generic-call scenarios; the invariant unit-tested here is the memo:
    // equal substitutions must share one signature id.
    #[test]
    fn substitution_key_is_order_independent() {
        use sable_types::QualifiedType;
        use sable_utils::interner::StrInterner;

        let mut strings = StrInterner::new();
        let mut types = sable_types::TypeInterner::new();
        let int = types.int_default();
        let a = AstId::symbol_root(strings.intern("M.f.t"));
        let b = AstId::symbol_root(strings.intern("M.f.u"));

        let mut first = Substitution::new();
        first.insert(a, QualifiedType::type_of(int));
        first.insert(b, QualifiedType::type_of(int));
        let mut second = Substitution::new();
        second.insert(b, QualifiedType::type_of(int));
        second.insert(a, QualifiedType::type_of(int));

        assert_eq!(first, second, "memo keys must not depend on insertion order");
    }
}
