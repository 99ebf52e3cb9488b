//! Typed AST (HIR) produced by the semantic analyzer (spec §4.2). One node
//! per surface-AST node, each now carrying a resolved [`Type`].

use std::rc::Rc;
use crate::front::ast::BinOp;
use crate::symbol::{Span, Symbol};
use crate::types::{Type, TypeConstructor, ValueConstructor};

pub struct Program {
  pub functions: Vec<Function>,
  pub types: Vec<Rc<TypeConstructor>>,
}

pub struct Function {
  pub name: Symbol,
  pub params: Vec<Param>,
  pub ret: Type,
  pub body: Block,
  pub is_external: bool,
  /// Set for constructor bodies synthesized by the TAC code generator
  /// rather than written by the user (spec §4.4 "Constructors").
  pub synthetic_ctor: Option<Rc<ValueConstructor>>,
}

#[derive(Clone)]
pub struct Param {
  pub name: Symbol,
  pub ty: Type,
  pub offset: u32,
}

pub struct Block {
  pub stmts: Vec<Stmt>,
  pub tail: Option<Box<Expr>>,
  pub ty: Type,
  pub span: Span,
}

pub struct Stmt {
  pub kind: StmtKind,
  pub span: Span,
}

pub enum StmtKind {
  Let { name: Symbol, init: Expr },
  LetPattern { ctor: Rc<ValueConstructor>, bindings: Vec<Symbol>, init: Expr },
  Assign { name: Symbol, value: Expr },
  Expr(Expr),
  Return(Option<Expr>),
  Break,
  While { cond: Expr, body: Block },
  Foreach { var: Symbol, iter: Expr, body: Block },
  ForRange { var: Symbol, lo: Expr, hi: Expr, body: Block },
}

pub struct Expr {
  pub kind: ExprKind,
  pub ty: Type,
  pub span: Span,
}

pub struct MatchArm {
  pub ctor: Rc<ValueConstructor>,
  pub bindings: Vec<Symbol>,
  pub body: Expr,
  pub span: Span,
}

pub enum ExprKind {
  Int(i64),
  Bool(bool),
  Str(Symbol),
  Var(Symbol),
  Binary(BinOp, Box<Expr>, Box<Expr>),
  Not(Box<Expr>),
  Neg(Box<Expr>),
  Call(Symbol, Vec<Expr>),
  /// A nullary function referenced without a call: yields a closure value
  /// rather than invoking it (spec §4.2 "Nullary").
  Closure(Symbol),
  MethodCall(Box<Expr>, Symbol, Vec<Expr>),
  Field(Box<Expr>, Symbol, u32),
  Construct(Rc<ValueConstructor>, Vec<Expr>),
  List(Vec<Expr>),
  If(Box<Expr>, Block, Option<Block>),
  Match(Box<Expr>, Vec<MatchArm>),
  Block(Block),
}
