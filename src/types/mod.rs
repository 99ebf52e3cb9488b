//! Type system: types, type variables, value constructors, and unification
//! (spec §3, §4.1).

pub mod ty;
pub mod unify;

pub use ty::{Constraint, Type, TypeConstructor, TypeContext, TypeVarId, ValueConstructor};
pub use unify::{instantiate, substitute, unify};
