//! Types, type variables, and value constructors (spec §3, §4.1).
//!
//! Type variables live in a flat table inside [`TypeContext`] rather than
//! behind `Rc<RefCell<_>>` handles: a [`TypeVarId`] is just an index, and
//! "assigning a variable rewrites every reference through a shared
//! implementation handle" (spec §3) falls out of every `Type::Var(id)`
//! looking its binding up in the same table, following this crate's
//! arena-ownership convention (see DESIGN.md).

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use hashbrown::HashMap;
use crate::symbol::Symbol;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct TypeVarId(pub u32);

/// The single built-in trait constraint (§4.1 resolved Open Question).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Constraint {
  Num,
}

/// A declared sum/struct type constructor: a name, an arity, and the
/// ordered list of value constructors that build it. `ctors` is filled in
/// after the `TypeConstructor` itself is created (its members may reference
/// the same type, as in a recursive `data List a = Cons a (List a) | Nil`),
/// hence the `RefCell`.
pub struct TypeConstructor {
  pub name: Symbol,
  pub arity: usize,
  /// The quantified variables minted for this type's own declared type
  /// parameters (`data Maybe a = ...` ⇒ one entry for `a`), used to build a
  /// substitution when a member type is read out at a concrete
  /// instantiation site (e.g. typing a `match` arm's bindings).
  pub type_params: Vec<TypeVarId>,
  pub ctors: RefCell<Vec<Rc<ValueConstructor>>>,
}

impl fmt::Debug for TypeConstructor {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "TypeConstructor({})", self.name)
  }
}

/// One arm of a `data` declaration, or the sole implicit constructor of a
/// `struct`. *Invariant (spec §3):* owned by exactly one `TypeConstructor`,
/// referenced here only by name + tag, never by back-pointer, to avoid an
/// ownership cycle.
#[derive(Debug)]
pub struct ValueConstructor {
  pub name: Symbol,
  pub tag: u32,
  pub parent: Symbol,
  /// Member name + declared type, in source (== slot) order.
  pub members: Vec<(Symbol, Type)>,
}

impl ValueConstructor {
  #[must_use] pub fn arity(&self) -> usize { self.members.len() }
}

#[derive(Clone, Debug)]
pub enum Type {
  Base(Symbol),
  Function(Vec<Type>, Box<Type>),
  Constructed(Rc<TypeConstructor>, Vec<Type>),
  Var(TypeVarId),
}

impl Type {
  /// Every non-primitive base, every function, every constructed type, and
  /// every type variable is boxed (spec §3 `isBoxed`); only the primitive
  /// bases `Int`, `Bool`, `Unit` are not.
  #[must_use] pub fn is_boxed(&self, ctx: &TypeContext) -> bool {
    match self {
      Type::Base(name) => !matches!(name.as_str().as_str(), "Int" | "Bool" | "Unit"),
      Type::Function(..) | Type::Constructed(..) => true,
      Type::Var(id) => match ctx.resolve(*id) {
        Some(t) => t.is_boxed(ctx),
        None => true,
      },
    }
  }
}

pub struct TypeVarSlot {
  pub quantified: bool,
  pub constraints: Vec<Constraint>,
  pub binding: Option<Type>,
}

/// Owns every type variable and named type constructor minted during a
/// compilation. Mirrors the TAC `Context` in spirit (one owning arena per
/// compilation run, stable integer handles, no global mutable state).
pub struct TypeContext {
  vars: Vec<TypeVarSlot>,
  constructors: HashMap<Symbol, Rc<TypeConstructor>>,
  pub int: Type,
  pub bool_: Type,
  pub unit: Type,
  pub string: Type,
}

impl TypeContext {
  #[must_use] pub fn new() -> Self {
    Self {
      vars: Vec::new(),
      constructors: HashMap::new(),
      int: Type::Base(crate::symbol::intern("Int")),
      bool_: Type::Base(crate::symbol::intern("Bool")),
      unit: Type::Base(crate::symbol::intern("Unit")),
      string: Type::Base(crate::symbol::intern("String")),
    }
  }

  #[must_use] pub fn fresh_var(&mut self, quantified: bool, constraints: Vec<Constraint>) -> Type {
    let id = TypeVarId(self.vars.len() as u32);
    self.vars.push(TypeVarSlot { quantified, constraints, binding: None });
    Type::Var(id)
  }

  /// Follow `id`'s binding, if any. Does not recurse through chained
  /// bindings beyond one hop since a bound variable is rebound in place by
  /// [`Self::bind`] rather than chained (spec §4.1: "binding rewrites the
  /// shared implementation handle").
  #[must_use] pub fn resolve(&self, id: TypeVarId) -> Option<&Type> {
    self.vars[id.0 as usize].binding.as_ref()
  }

  #[must_use] pub fn is_quantified(&self, id: TypeVarId) -> bool {
    self.vars[id.0 as usize].quantified
  }

  #[must_use] pub fn constraints(&self, id: TypeVarId) -> &[Constraint] {
    &self.vars[id.0 as usize].constraints
  }

  pub fn bind(&mut self, id: TypeVarId, ty: Type) {
    self.vars[id.0 as usize].binding = Some(ty);
  }

  /// Follow a possibly-bound variable all the way down to either an unbound
  /// variable or a non-variable type. Every other part of the type system
  /// should call this instead of matching on `Type::Var` directly.
  #[must_use] pub fn prune(&self, ty: &Type) -> Type {
    match ty {
      Type::Var(id) => match self.resolve(*id) {
        Some(bound) => self.prune(bound),
        None => ty.clone(),
      },
      other => other.clone(),
    }
  }

  pub fn declare_constructor(&mut self, name: Symbol, type_params: Vec<TypeVarId>) -> Rc<TypeConstructor> {
    let tc = Rc::new(TypeConstructor {
      name,
      arity: type_params.len(),
      type_params,
      ctors: RefCell::new(Vec::new()),
    });
    self.constructors.insert(name, Rc::clone(&tc));
    tc
  }

  #[must_use] pub fn lookup_constructor(&self, name: Symbol) -> Option<Rc<TypeConstructor>> {
    self.constructors.get(&name).cloned()
  }
}

impl Default for TypeContext {
  fn default() -> Self { Self::new() }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn primitives_are_unboxed() {
    let ctx = TypeContext::new();
    assert!(!ctx.int.is_boxed(&ctx));
    assert!(!ctx.bool_.is_boxed(&ctx));
    assert!(ctx.string.is_boxed(&ctx));
  }

  #[test]
  fn fresh_var_is_unbound_until_bound() {
    let mut ctx = TypeContext::new();
    let v = ctx.fresh_var(false, vec![]);
    let Type::Var(id) = v else { panic!() };
    assert!(ctx.resolve(id).is_none());
    ctx.bind(id, ctx.int.clone());
    assert!(matches!(ctx.resolve(id), Some(Type::Base(_))));
  }

  #[test]
  fn prune_follows_binding() {
    let mut ctx = TypeContext::new();
    let v = ctx.fresh_var(false, vec![]);
    let Type::Var(id) = v.clone() else { panic!() };
    ctx.bind(id, ctx.int.clone());
    assert!(matches!(ctx.prune(&v), Type::Base(_)));
  }
}
