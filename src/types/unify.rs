//! Unification, occurs check, and instantiation (spec §4.1).

use hashbrown::HashMap;
use crate::error::CompileError;
use crate::symbol::Span;
use super::ty::{Constraint, Type, TypeContext, TypeVarId};

fn occurs(ctx: &TypeContext, id: TypeVarId, ty: &Type) -> bool {
  match ctx.prune(ty) {
    Type::Var(other) => other == id,
    Type::Function(ins, out) => ins.iter().any(|t| occurs(ctx, id, t)) || occurs(ctx, id, &out),
    Type::Constructed(_, args) => args.iter().any(|t| occurs(ctx, id, t)),
    Type::Base(_) => false,
  }
}

fn satisfies(ctx: &TypeContext, constraint: Constraint, ty: &Type) -> bool {
  match constraint {
    Constraint::Num => matches!(ctx.prune(ty), Type::Base(name) if name.as_str() == "Int"),
  }
}

/// Unify `a` and `b` in place, following spec §4.1's five cases. Binding an
/// unquantified variable checks both the occurs check and every trait
/// constraint attached to it before rewriting its slot.
pub fn unify(ctx: &mut TypeContext, a: &Type, b: &Type, span: Span) -> Result<(), CompileError> {
  let a = ctx.prune(a);
  let b = ctx.prune(b);
  match (&a, &b) {
    (Type::Base(x), Type::Base(y)) if x == y => Ok(()),

    (Type::Var(x), Type::Var(y)) if x == y => Ok(()),

    (Type::Var(id), _) if !ctx.is_quantified(*id) => bind(ctx, *id, b, span),
    (_, Type::Var(id)) if !ctx.is_quantified(*id) => bind(ctx, *id, a, span),

    (Type::Var(_), Type::Var(_)) => Err(CompileError::type_inference(span,
      "cannot unify two distinct rigid type variables")),
    (Type::Var(_), _) | (_, Type::Var(_)) => Err(CompileError::type_inference(span,
      "cannot bind a rigid type variable to a concrete type")),

    (Type::Function(ains, aout), Type::Function(bins, bout)) => {
      if ains.len() != bins.len() {
        return Err(CompileError::type_inference(span,
          format!("function arity mismatch: {} vs {}", ains.len(), bins.len())));
      }
      for (x, y) in ains.iter().zip(bins.iter()) { unify(ctx, x, y, span)?; }
      unify(ctx, aout, bout, span)
    }

    (Type::Constructed(ac, aargs), Type::Constructed(bc, bargs)) if std::rc::Rc::ptr_eq(ac, bc) => {
      for (x, y) in aargs.iter().zip(bargs.iter()) { unify(ctx, x, y, span)?; }
      Ok(())
    }

    _ => Err(CompileError::type_inference(span, format!("type mismatch: {a:?} vs {b:?}"))),
  }
}

fn bind(ctx: &mut TypeContext, id: TypeVarId, ty: Type, span: Span) -> Result<(), CompileError> {
  if let Type::Var(other) = ty {
    if other == id { return Ok(()) }
  }
  if occurs(ctx, id, &ty) {
    return Err(CompileError::type_inference(span, "occurs check failed: infinite type"));
  }
  for c in ctx.constraints(id).to_vec() {
    if !satisfies(ctx, c, &ty) {
      return Err(CompileError::type_inference(span, format!("type does not satisfy constraint {c:?}")));
    }
  }
  ctx.bind(id, ty);
  Ok(())
}

/// Replace every *quantified* variable reachable from `ty` with a fresh
/// unquantified one, reusing `mapping` so that two occurrences of the same
/// quantified variable within one instantiation call map to the same fresh
/// variable.
pub fn instantiate(ctx: &mut TypeContext, ty: &Type, mapping: &mut HashMap<TypeVarId, Type>) -> Type {
  match ctx.prune(ty) {
    Type::Var(id) if ctx.is_quantified(id) => {
      if let Some(fresh) = mapping.get(&id) { return fresh.clone() }
      let constraints = ctx.constraints(id).to_vec();
      let fresh = ctx.fresh_var(false, constraints);
      mapping.insert(id, fresh.clone());
      fresh
    }
    Type::Var(id) => Type::Var(id),
    Type::Base(name) => Type::Base(name),
    Type::Function(ins, out) => {
      let ins = ins.iter().map(|t| instantiate(ctx, t, mapping)).collect();
      let out = Box::new(instantiate(ctx, &out, mapping));
      Type::Function(ins, out)
    }
    Type::Constructed(tc, args) => {
      let args = args.iter().map(|t| instantiate(ctx, t, mapping)).collect();
      Type::Constructed(tc, args)
    }
  }
}

/// Replace every variable in `ty` that appears as a key in `mapping` with
/// its mapped type, leaving everything else (including other, unrelated
/// variables) untouched. Unlike [`instantiate`], this does not mint fresh
/// variables — it's used to read a generic member type out at a *specific*
/// already-known instantiation (e.g. `Just(a)`'s member type `a` when the
/// scrutinee's concrete type is `Maybe(Int)`).
pub fn substitute(ctx: &TypeContext, ty: &Type, mapping: &HashMap<TypeVarId, Type>) -> Type {
  match ctx.prune(ty) {
    Type::Var(id) => mapping.get(&id).cloned().unwrap_or(Type::Var(id)),
    Type::Base(name) => Type::Base(name),
    Type::Function(ins, out) => {
      let ins = ins.iter().map(|t| substitute(ctx, t, mapping)).collect();
      let out = Box::new(substitute(ctx, &out, mapping));
      Type::Function(ins, out)
    }
    Type::Constructed(tc, args) => {
      let args = args.iter().map(|t| substitute(ctx, t, mapping)).collect();
      Type::Constructed(tc, args)
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::symbol::Span;

  fn sp() -> Span { Span::default() }

  #[test]
  fn unifies_identical_bases() {
    let mut ctx = TypeContext::new();
    assert!(unify(&mut ctx, &ctx.int.clone(), &ctx.int.clone(), sp()).is_ok());
  }

  #[test]
  fn rejects_mismatched_bases() {
    let mut ctx = TypeContext::new();
    assert!(unify(&mut ctx, &ctx.int.clone(), &ctx.bool_.clone(), sp()).is_err());
  }

  #[test]
  fn binds_unquantified_variable() {
    let mut ctx = TypeContext::new();
    let v = ctx.fresh_var(false, vec![]);
    unify(&mut ctx, &v, &ctx.int.clone(), sp()).unwrap();
    assert!(matches!(ctx.prune(&v), Type::Base(_)));
  }

  #[test]
  fn occurs_check_rejects_infinite_type() {
    let mut ctx = TypeContext::new();
    let v = ctx.fresh_var(false, vec![]);
    let fn_ty = Type::Function(vec![v.clone()], Box::new(ctx.int.clone()));
    assert!(unify(&mut ctx, &v, &fn_ty, sp()).is_err());
  }

  #[test]
  fn num_constraint_rejects_non_int() {
    let mut ctx = TypeContext::new();
    let v = ctx.fresh_var(false, vec![Constraint::Num]);
    assert!(unify(&mut ctx, &v, &ctx.bool_.clone(), sp()).is_err());
    let mut ctx2 = TypeContext::new();
    let v2 = ctx2.fresh_var(false, vec![Constraint::Num]);
    assert!(unify(&mut ctx2, &v2, &ctx2.int.clone(), sp()).is_ok());
  }

  #[test]
  fn quantified_variable_refuses_concrete_binding() {
    let mut ctx = TypeContext::new();
    let v = ctx.fresh_var(true, vec![]);
    assert!(unify(&mut ctx, &v, &ctx.int.clone(), sp()).is_err());
  }

  #[test]
  fn instantiate_gives_fresh_unquantified_variables() {
    let mut ctx = TypeContext::new();
    let v = ctx.fresh_var(true, vec![]);
    let scheme = Type::Function(vec![v.clone()], Box::new(v.clone()));
    let mut mapping = HashMap::new();
    let inst = instantiate(&mut ctx, &scheme, &mut mapping);
    let Type::Function(ins, out) = inst else { panic!() };
    let (Type::Var(a), Type::Var(b)) = (&ins[0], out.as_ref()) else { panic!() };
    assert_eq!(a, b);
    assert!(!ctx.is_quantified(*a));
  }
}
