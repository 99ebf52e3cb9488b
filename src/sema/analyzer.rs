//! The semantic analyzer: a single AST walk producing the typed HIR (spec
//! §4.2). Four passes over the top-level declarations so that mutually
//! recursive types and functions resolve correctly:
//!
//! 1. [`Analyzer::declare_types`] — stub out every `data`/`struct` name so
//!    recursive and mutually-referential types can resolve.
//! 2. [`Analyzer::declare_members`] — fill in constructors/fields and
//!    register constructor symbols globally.
//! 3. [`Analyzer::declare_functions`] — register every function's (and
//!    `impl` method's) signature globally, enabling (mutual) recursion.
//! 4. [`Analyzer::check_bodies`] — type-check every function body against
//!    its already-registered signature.

use std::rc::Rc;
use hashbrown::{HashMap, HashSet};
use crate::error::CompileError;
use crate::front::ast;
use crate::symbol::{intern, Span, Symbol};
use crate::types::{instantiate, substitute, unify, Type, TypeConstructor, TypeContext, TypeVarId, ValueConstructor};
use super::hir;
use super::scope::{ScopeStack, SymbolInfo, SymbolKind};

/// A short-lived mapping from a declaration's own type-parameter names to
/// the rigid variables minted for it, threaded explicitly rather than
/// carried on the scope stack (its lifetime is the declaration, not a
/// lexical block).
type TypeEnv = HashMap<Symbol, Type>;

struct FnSig<'a> {
  decl: &'a ast::FnDecl,
  type_env: TypeEnv,
  param_types: Vec<Type>,
  ret: Type,
  mangled: Symbol,
}

pub struct Analyzer {
  ctx: TypeContext,
  scopes: ScopeStack,
  array: Rc<TypeConstructor>,
  ctors: HashMap<Symbol, Rc<ValueConstructor>>,
  loop_depth: u32,
  current_return: Option<Type>,
}

pub fn analyze(program: &ast::Program) -> Result<(hir::Program, TypeContext), CompileError> {
  let mut a = Analyzer::new();
  a.declare_builtins();
  a.declare_types(program)?;
  a.declare_members(program)?;
  let sigs = a.declare_functions(program)?;
  let functions = a.check_bodies(sigs)?;
  let types = program.decls.iter()
    .filter_map(|d| match d {
      ast::Decl::Data(d) => a.ctx.lookup_constructor(d.name),
      ast::Decl::Struct(s) => a.ctx.lookup_constructor(s.name),
      ast::Decl::Fn(_) => None,
    })
    .collect();
  Ok((hir::Program { functions, types }, a.ctx))
}

fn mangled_method(ty: Symbol, method: Symbol) -> Symbol {
  intern(&format!("{}.{}", ty.as_str(), method.as_str()))
}

impl Analyzer {
  fn new() -> Self {
    let mut ctx = TypeContext::new();
    let elem = ctx.fresh_var(true, vec![]);
    let Type::Var(elem_id) = elem else { unreachable!() };
    let array = ctx.declare_constructor(intern("Array"), vec![elem_id]);
    Self {
      ctx,
      scopes: ScopeStack::new(),
      array,
      ctors: HashMap::new(),
      loop_depth: 0,
      current_return: None,
    }
  }

  /// Runtime-provided externals not declared by [`crate::prelude`] source,
  /// since they have no meaningful user-level body (spec §6 runtime ABI).
  fn declare_builtins(&mut self) {
    let print_ty = Type::Function(vec![self.ctx.int.clone()], Box::new(self.ctx.unit.clone()));
    self.scopes.define_global(SymbolInfo::external_function(intern("print"), print_ty));
    let alloc_ty = Type::Function(vec![self.ctx.int.clone()], Box::new(self.ctx.int.clone()));
    self.scopes.define_global(SymbolInfo::external_function(intern("gcAllocate"), alloc_ty));
  }

  fn instantiate_tc(&mut self, tc: &Rc<TypeConstructor>) -> HashMap<TypeVarId, Type> {
    tc.type_params.iter().map(|&id| (id, self.ctx.fresh_var(false, vec![]))).collect()
  }

  fn constructor_scheme(&self, tc: &Rc<TypeConstructor>, vc: &ValueConstructor) -> Type {
    let member_tys = vc.members.iter().map(|(_, t)| t.clone()).collect();
    let out = Type::Constructed(Rc::clone(tc), tc.type_params.iter().map(|&id| Type::Var(id)).collect());
    Type::Function(member_tys, Box::new(out))
  }

  fn resolve_type_expr(&mut self, te: &ast::TypeExpr, env: &TypeEnv) -> Result<Type, CompileError> {
    match &te.kind {
      ast::TypeExprKind::Function(ins, out) => {
        let ins = ins.iter().map(|t| self.resolve_type_expr(t, env)).collect::<Result<_, _>>()?;
        let out = Box::new(self.resolve_type_expr(out, env)?);
        Ok(Type::Function(ins, out))
      }
      ast::TypeExprKind::Named(name, args) => {
        let resolved_args = args.iter().map(|t| self.resolve_type_expr(t, env)).collect::<Result<Vec<_>, _>>()?;
        match name.as_str().as_str() {
          "Int" => Ok(self.ctx.int.clone()),
          "Bool" => Ok(self.ctx.bool_.clone()),
          "Unit" => Ok(self.ctx.unit.clone()),
          "String" => Ok(self.ctx.string.clone()),
          "Array" => {
            if resolved_args.len() != 1 {
              return Err(CompileError::semantic(te.span, "Array takes exactly one type argument"));
            }
            Ok(Type::Constructed(Rc::clone(&self.array), resolved_args))
          }
          _ => {
            if let Some(rigid) = env.get(name) {
              return Ok(rigid.clone());
            }
            if let Some(tc) = self.ctx.lookup_constructor(*name) {
              if tc.arity != resolved_args.len() {
                return Err(CompileError::semantic(te.span,
                  format!("type {name} expects {} argument(s), found {}", tc.arity, resolved_args.len())));
              }
              return Ok(Type::Constructed(tc, resolved_args));
            }
            Err(CompileError::semantic(te.span, format!("unknown type {name}")))
          }
        }
      }
    }
  }

  fn declare_types(&mut self, program: &ast::Program) -> Result<(), CompileError> {
    for decl in &program.decls {
      let (name, arity, span) = match decl {
        ast::Decl::Data(d) => (d.name, d.type_params.len(), d.span),
        ast::Decl::Struct(s) => (s.name, s.type_params.len(), s.span),
        ast::Decl::Fn(_) => continue,
      };
      if self.ctx.lookup_constructor(name).is_some() {
        return Err(CompileError::semantic(span, format!("type {name} redefined")));
      }
      let vars = (0..arity).map(|_| {
        let v = self.ctx.fresh_var(true, vec![]);
        let Type::Var(id) = v else { unreachable!() };
        id
      }).collect();
      self.ctx.declare_constructor(name, vars);
    }
    Ok(())
  }

  fn declare_members(&mut self, program: &ast::Program) -> Result<(), CompileError> {
    for decl in &program.decls {
      match decl {
        ast::Decl::Data(d) => {
          let tc = self.ctx.lookup_constructor(d.name).expect("declared in declare_types");
          let env: TypeEnv = d.type_params.iter().copied().zip(tc.type_params.iter().map(|&id| Type::Var(id))).collect();
          for (tag, cspec) in d.ctors.iter().enumerate() {
            let members = cspec.members.iter().enumerate()
              .map(|(i, te)| Ok((intern(&format!("_{i}")), self.resolve_type_expr(te, &env)?)))
              .collect::<Result<Vec<_>, CompileError>>()?;
            let vc = Rc::new(ValueConstructor { name: cspec.name, tag: tag as u32, parent: d.name, members });
            tc.ctors.borrow_mut().push(Rc::clone(&vc));
            let scheme = self.constructor_scheme(&tc, &vc);
            self.scopes.define_global(SymbolInfo { kind: SymbolKind::Constructor, ..SymbolInfo::variable(cspec.name, scheme) });
            self.ctors.insert(cspec.name, vc);
          }
        }
        ast::Decl::Struct(s) => {
          let tc = self.ctx.lookup_constructor(s.name).expect("declared in declare_types");
          let env: TypeEnv = s.type_params.iter().copied().zip(tc.type_params.iter().map(|&id| Type::Var(id))).collect();
          let members = s.fields.iter()
            .map(|f| Ok((f.name, self.resolve_type_expr(&f.ty, &env)?)))
            .collect::<Result<Vec<_>, CompileError>>()?;
          let vc = Rc::new(ValueConstructor { name: s.name, tag: 0, parent: s.name, members });
          tc.ctors.borrow_mut().push(Rc::clone(&vc));
          let scheme = self.constructor_scheme(&tc, &vc);
          self.scopes.define_global(SymbolInfo { kind: SymbolKind::Constructor, ..SymbolInfo::variable(s.name, scheme) });
          self.ctors.insert(s.name, vc);
        }
        ast::Decl::Fn(_) => {}
      }
    }
    Ok(())
  }

  fn declare_functions<'a>(&mut self, program: &'a ast::Program) -> Result<Vec<FnSig<'a>>, CompileError> {
    let mut sigs = Vec::new();
    for decl in &program.decls {
      let ast::Decl::Fn(f) = decl else { continue };
      let mut env = TypeEnv::new();
      for tp in &f.type_params {
        env.insert(*tp, self.ctx.fresh_var(true, vec![]));
      }
      let param_types = f.params.iter().map(|p| self.resolve_type_expr(&p.ty, &env)).collect::<Result<Vec<_>, _>>()?;
      let ret = match &f.ret {
        Some(te) => self.resolve_type_expr(te, &env)?,
        None => self.ctx.fresh_var(false, vec![]),
      };
      let mangled = match f.impl_for {
        Some(recv) => mangled_method(recv, f.name),
        None => f.name,
      };
      if self.scopes.lookup(mangled).is_some() {
        return Err(CompileError::semantic(f.span, format!("function {} redefined", f.name)));
      }
      let sig_ty = Type::Function(param_types.clone(), Box::new(ret.clone()));
      self.scopes.define_global(SymbolInfo::function(mangled, sig_ty));
      sigs.push(FnSig { decl: f, type_env: env, param_types, ret, mangled });
    }
    Ok(sigs)
  }

  fn check_bodies(&mut self, sigs: Vec<FnSig>) -> Result<Vec<hir::Function>, CompileError> {
    let mut out = Vec::with_capacity(sigs.len());
    for sig in sigs {
      self.scopes.push();
      let mut params = Vec::with_capacity(sig.decl.params.len());
      for (i, (p, ty)) in sig.decl.params.iter().zip(sig.param_types.iter()).enumerate() {
        self.scopes.define(SymbolInfo::param(p.name, ty.clone(), i as u32));
        params.push(hir::Param { name: p.name, ty: ty.clone(), offset: i as u32 });
      }
      self.loop_depth = 0;
      self.current_return = Some(sig.ret.clone());
      let body = self.check_block(&sig.decl.body, &sig.type_env)?;
      // Only a block ending in a tail expression stands for an implicit
      // return and must match the declared type; a body that falls off the
      // end after explicit `return` statements relies on those statements'
      // own unification (see `StmtKind::Return` in `check_stmt`).
      if sig.decl.body.tail.is_some() {
        unify(&mut self.ctx, &body.ty, &sig.ret, sig.decl.span)?;
      }
      self.scopes.pop();
      out.push(hir::Function {
        name: sig.mangled,
        params,
        ret: sig.ret,
        body,
        is_external: false,
        synthetic_ctor: None,
      });
    }
    Ok(out)
  }

  fn check_block(&mut self, b: &ast::Block, env: &TypeEnv) -> Result<hir::Block, CompileError> {
    self.scopes.push();
    let mut stmts = Vec::with_capacity(b.stmts.len());
    for s in &b.stmts {
      stmts.push(self.check_stmt(s, env)?);
    }
    let tail = match &b.tail {
      Some(e) => Some(Box::new(self.check_expr(e, env)?)),
      None => None,
    };
    self.scopes.pop();
    let ty = tail.as_ref().map_or_else(|| self.ctx.unit.clone(), |e| e.ty.clone());
    Ok(hir::Block { stmts, tail, ty, span: b.span })
  }

  fn check_stmt(&mut self, s: &ast::Stmt, env: &TypeEnv) -> Result<hir::Stmt, CompileError> {
    let kind = match &s.kind {
      ast::StmtKind::Let { name, ty, init } => {
        let init = self.check_expr(init, env)?;
        if let Some(te) = ty {
          let declared = self.resolve_type_expr(te, env)?;
          unify(&mut self.ctx, &init.ty, &declared, s.span)?;
        }
        self.scopes.define(SymbolInfo::variable(*name, init.ty.clone()));
        hir::StmtKind::Let { name: *name, init }
      }
      ast::StmtKind::LetPattern { ctor, bindings, init } => {
        let init = self.check_expr(init, env)?;
        let vc = self.ctors.get(ctor).cloned()
          .ok_or_else(|| CompileError::semantic(s.span, format!("unknown constructor {ctor}")))?;
        if vc.members.len() != bindings.len() {
          return Err(CompileError::semantic(s.span,
            format!("constructor {ctor} expects {} binding(s), found {}", vc.members.len(), bindings.len())));
        }
        let tc = self.ctx.lookup_constructor(vc.parent).expect("parent type registered");
        let mapping = self.instantiate_tc(&tc);
        let inst_ty = Type::Constructed(Rc::clone(&tc), tc.type_params.iter().map(|id| mapping[id].clone()).collect());
        unify(&mut self.ctx, &init.ty, &inst_ty, s.span)?;
        for (binding, (_, member_ty)) in bindings.iter().zip(vc.members.iter()) {
          if !binding.is_wildcard() {
            let bound_ty = substitute(&self.ctx, member_ty, &mapping);
            self.scopes.define(SymbolInfo::variable(*binding, bound_ty));
          }
        }
        hir::StmtKind::LetPattern { ctor: vc, bindings: bindings.clone(), init }
      }
      ast::StmtKind::Assign { name, value } => {
        let value = self.check_expr(value, env)?;
        let sym = self.scopes.lookup(*name).cloned()
          .ok_or_else(|| CompileError::semantic(s.span, format!("undefined variable {name}")))?;
        unify(&mut self.ctx, &value.ty, &sym.ty, s.span)?;
        hir::StmtKind::Assign { name: *name, value }
      }
      ast::StmtKind::Expr(e) => hir::StmtKind::Expr(self.check_expr(e, env)?),
      ast::StmtKind::Return(opt) => {
        let ret_ty = self.current_return.clone().expect("return only visited inside a function body");
        let value = match opt {
          Some(e) => {
            let checked = self.check_expr(e, env)?;
            unify(&mut self.ctx, &checked.ty, &ret_ty, s.span)?;
            Some(checked)
          }
          None => {
            let unit = self.ctx.unit.clone();
            unify(&mut self.ctx, &unit, &ret_ty, s.span)?;
            None
          }
        };
        hir::StmtKind::Return(value)
      }
      ast::StmtKind::Break => {
        if self.loop_depth == 0 {
          return Err(CompileError::semantic(s.span, "break outside of a loop"));
        }
        hir::StmtKind::Break
      }
      ast::StmtKind::While { cond, body } => {
        let cond = self.check_expr(cond, env)?;
        let bool_ty = self.ctx.bool_.clone();
        unify(&mut self.ctx, &cond.ty, &bool_ty, s.span)?;
        self.loop_depth += 1;
        let body = self.check_block(body, env)?;
        self.loop_depth -= 1;
        hir::StmtKind::While { cond, body }
      }
      ast::StmtKind::Foreach { var, iter, body } => {
        let iter = self.check_expr(iter, env)?;
        let elem_ty = match self.ctx.prune(&iter.ty) {
          Type::Constructed(tc, args) if Rc::ptr_eq(&tc, &self.array) => args[0].clone(),
          _ => return Err(CompileError::semantic(s.span, "foreach requires an Array value")),
        };
        self.scopes.push();
        self.scopes.define(SymbolInfo::variable(*var, elem_ty));
        self.loop_depth += 1;
        let body = self.check_block(body, env)?;
        self.loop_depth -= 1;
        self.scopes.pop();
        hir::StmtKind::Foreach { var: *var, iter, body }
      }
      ast::StmtKind::ForRange { var, lo, hi, body } => {
        let lo = self.check_expr(lo, env)?;
        let hi = self.check_expr(hi, env)?;
        let int_ty = self.ctx.int.clone();
        unify(&mut self.ctx, &lo.ty, &int_ty, s.span)?;
        unify(&mut self.ctx, &hi.ty, &int_ty, s.span)?;
        self.scopes.push();
        self.scopes.define(SymbolInfo::variable(*var, int_ty));
        self.loop_depth += 1;
        let body = self.check_block(body, env)?;
        self.loop_depth -= 1;
        self.scopes.pop();
        hir::StmtKind::ForRange { var: *var, lo, hi, body }
      }
    };
    Ok(hir::Stmt { kind, span: s.span })
  }

  fn check_expr(&mut self, e: &ast::Expr, env: &TypeEnv) -> Result<hir::Expr, CompileError> {
    let (kind, ty) = match &e.kind {
      ast::ExprKind::Int(n) => (hir::ExprKind::Int(*n), self.ctx.int.clone()),
      ast::ExprKind::Bool(b) => (hir::ExprKind::Bool(*b), self.ctx.bool_.clone()),
      ast::ExprKind::Str(s) => (hir::ExprKind::Str(*s), self.ctx.string.clone()),
      ast::ExprKind::Var(name) => self.check_var(*name, e.span)?,
      ast::ExprKind::Binary(op, l, r) => self.check_binary(*op, l, r, e.span, env)?,
      ast::ExprKind::Not(x) => {
        let x = self.check_expr(x, env)?;
        let bool_ty = self.ctx.bool_.clone();
        unify(&mut self.ctx, &x.ty, &bool_ty, e.span)?;
        (hir::ExprKind::Not(Box::new(x)), bool_ty)
      }
      ast::ExprKind::Neg(x) => {
        let x = self.check_expr(x, env)?;
        let int_ty = self.ctx.int.clone();
        unify(&mut self.ctx, &x.ty, &int_ty, e.span)?;
        (hir::ExprKind::Neg(Box::new(x)), int_ty)
      }
      ast::ExprKind::Call(name, args) => self.check_call(*name, args, e.span, env)?,
      ast::ExprKind::MethodCall(recv, name, args) => self.check_method_call(recv, *name, args, e.span, env)?,
      ast::ExprKind::Field(recv, name) => self.check_field(recv, *name, e.span, env)?,
      ast::ExprKind::Construct(name, args) => self.check_construct(*name, args, e.span, env)?,
      ast::ExprKind::List(items) => {
        let mut checked = Vec::with_capacity(items.len());
        let elem_ty = self.ctx.fresh_var(false, vec![]);
        for item in items {
          let c = self.check_expr(item, env)?;
          unify(&mut self.ctx, &c.ty, &elem_ty, e.span)?;
          checked.push(c);
        }
        let ty = Type::Constructed(Rc::clone(&self.array), vec![elem_ty]);
        (hir::ExprKind::List(checked), ty)
      }
      ast::ExprKind::If(cond, then, els) => {
        let cond = self.check_expr(cond, env)?;
        let bool_ty = self.ctx.bool_.clone();
        unify(&mut self.ctx, &cond.ty, &bool_ty, e.span)?;
        let then_b = self.check_block(then, env)?;
        let (els_b, ty) = match els {
          Some(eb) => {
            let eb_checked = self.check_block(eb, env)?;
            unify(&mut self.ctx, &then_b.ty, &eb_checked.ty, e.span)?;
            let ty = then_b.ty.clone();
            (Some(eb_checked), ty)
          }
          None => {
            let unit = self.ctx.unit.clone();
            unify(&mut self.ctx, &then_b.ty, &unit, e.span)?;
            (None, unit)
          }
        };
        (hir::ExprKind::If(Box::new(cond), then_b, els_b), ty)
      }
      ast::ExprKind::Match(scrut, arms) => self.check_match(scrut, arms, e.span, env)?,
      ast::ExprKind::Block(b) => {
        let b = self.check_block(b, env)?;
        let ty = b.ty.clone();
        (hir::ExprKind::Block(b), ty)
      }
    };
    Ok(hir::Expr { kind, ty, span: e.span })
  }

  fn check_var(&mut self, name: Symbol, span: Span) -> Result<(hir::ExprKind, Type), CompileError> {
    let sym = self.scopes.lookup(name).cloned()
      .ok_or_else(|| CompileError::semantic(span, format!("undefined name {name}")))?;
    match sym.kind {
      SymbolKind::Function => {
        let inst = instantiate(&mut self.ctx, &sym.ty, &mut HashMap::new());
        let Type::Function(ins, out) = inst else { unreachable!("function symbol always has a function type") };
        if ins.is_empty() {
          Ok((hir::ExprKind::Call(name, vec![]), *out))
        } else {
          Ok((hir::ExprKind::Closure(name), Type::Function(ins, out)))
        }
      }
      SymbolKind::Constructor => {
        let vc = self.ctors.get(&name).cloned().expect("constructor symbol always has a ValueConstructor");
        if !vc.members.is_empty() {
          return Err(CompileError::semantic(span, format!("constructor {name} requires arguments")));
        }
        let tc = self.ctx.lookup_constructor(vc.parent).expect("parent type registered");
        let mapping = self.instantiate_tc(&tc);
        let ty = Type::Constructed(Rc::clone(&tc), tc.type_params.iter().map(|id| mapping[id].clone()).collect());
        Ok((hir::ExprKind::Construct(vc, vec![]), ty))
      }
      _ => Ok((hir::ExprKind::Var(name), sym.ty)),
    }
  }

  fn check_binary(&mut self, op: ast::BinOp, l: &ast::Expr, r: &ast::Expr, span: Span, env: &TypeEnv) -> Result<(hir::ExprKind, Type), CompileError> {
    use ast::BinOp::{Add, And, Div, Eq, Ge, Gt, Le, Lt, Mod, Mul, Ne, Or, Sub};
    let l = self.check_expr(l, env)?;
    let r = self.check_expr(r, env)?;
    let ty = match op {
      Add | Sub | Mul | Div | Mod => {
        let int_ty = self.ctx.int.clone();
        unify(&mut self.ctx, &l.ty, &int_ty, span)?;
        unify(&mut self.ctx, &r.ty, &int_ty, span)?;
        int_ty
      }
      Lt | Le | Gt | Ge => {
        let int_ty = self.ctx.int.clone();
        unify(&mut self.ctx, &l.ty, &int_ty, span)?;
        unify(&mut self.ctx, &r.ty, &int_ty, span)?;
        self.ctx.bool_.clone()
      }
      Eq | Ne => {
        unify(&mut self.ctx, &l.ty, &r.ty, span)?;
        self.ctx.bool_.clone()
      }
      And | Or => {
        let bool_ty = self.ctx.bool_.clone();
        unify(&mut self.ctx, &l.ty, &bool_ty, span)?;
        unify(&mut self.ctx, &r.ty, &bool_ty, span)?;
        bool_ty
      }
    };
    Ok((hir::ExprKind::Binary(op, Box::new(l), Box::new(r)), ty))
  }

  fn check_call(&mut self, name: Symbol, args: &[ast::Expr], span: Span, env: &TypeEnv) -> Result<(hir::ExprKind, Type), CompileError> {
    let sym = self.scopes.lookup(name).cloned()
      .ok_or_else(|| CompileError::semantic(span, format!("undefined function {name}")))?;
    if sym.kind != SymbolKind::Function {
      return Err(CompileError::semantic(span, format!("{name} is not callable")));
    }
    let inst = instantiate(&mut self.ctx, &sym.ty, &mut HashMap::new());
    let Type::Function(ins, out) = inst else { unreachable!("function symbol always has a function type") };
    if ins.len() != args.len() {
      return Err(CompileError::semantic(span, format!("{name} expects {} argument(s), found {}", ins.len(), args.len())));
    }
    let mut checked = Vec::with_capacity(args.len());
    for (a, expect) in args.iter().zip(ins.iter()) {
      let c = self.check_expr(a, env)?;
      unify(&mut self.ctx, &c.ty, expect, span)?;
      checked.push(c);
    }
    Ok((hir::ExprKind::Call(name, checked), *out))
  }

  fn check_construct(&mut self, name: Symbol, args: &[ast::Expr], span: Span, env: &TypeEnv) -> Result<(hir::ExprKind, Type), CompileError> {
    let vc = self.ctors.get(&name).cloned()
      .ok_or_else(|| CompileError::semantic(span, format!("undefined constructor {name}")))?;
    if vc.members.len() != args.len() {
      return Err(CompileError::semantic(span,
        format!("constructor {name} expects {} argument(s), found {}", vc.members.len(), args.len())));
    }
    let tc = self.ctx.lookup_constructor(vc.parent).expect("parent type registered");
    let mapping = self.instantiate_tc(&tc);
    let mut checked = Vec::with_capacity(args.len());
    for (a, (_, member_ty)) in args.iter().zip(vc.members.iter()) {
      let expect = substitute(&self.ctx, member_ty, &mapping);
      let c = self.check_expr(a, env)?;
      unify(&mut self.ctx, &c.ty, &expect, span)?;
      checked.push(c);
    }
    let ty = Type::Constructed(Rc::clone(&tc), tc.type_params.iter().map(|id| mapping[id].clone()).collect());
    Ok((hir::ExprKind::Construct(vc, checked), ty))
  }

  fn check_method_call(&mut self, recv: &ast::Expr, name: Symbol, args: &[ast::Expr], span: Span, env: &TypeEnv) -> Result<(hir::ExprKind, Type), CompileError> {
    let recv_c = self.check_expr(recv, env)?;
    let tc_name = match self.ctx.prune(&recv_c.ty) {
      Type::Constructed(tc, _) => tc.name,
      other => return Err(CompileError::semantic(span, format!("{other:?} has no methods"))),
    };
    let mangled = mangled_method(tc_name, name);
    let sym = self.scopes.lookup(mangled).cloned()
      .ok_or_else(|| CompileError::semantic(span, format!("no method {name} on {tc_name}")))?;
    let inst = instantiate(&mut self.ctx, &sym.ty, &mut HashMap::new());
    let Type::Function(ins, out) = inst else { unreachable!("method symbol always has a function type") };
    if ins.is_empty() {
      return Err(CompileError::semantic(span, format!("method {name} takes no receiver parameter")));
    }
    unify(&mut self.ctx, &recv_c.ty, &ins[0], span)?;
    if ins.len() - 1 != args.len() {
      return Err(CompileError::semantic(span, format!("{name} expects {} argument(s), found {}", ins.len() - 1, args.len())));
    }
    let mut checked = Vec::with_capacity(args.len());
    for (a, expect) in args.iter().zip(ins[1..].iter()) {
      let c = self.check_expr(a, env)?;
      unify(&mut self.ctx, &c.ty, expect, span)?;
      checked.push(c);
    }
    Ok((hir::ExprKind::MethodCall(Box::new(recv_c), mangled, checked), *out))
  }

  fn check_field(&mut self, recv: &ast::Expr, name: Symbol, span: Span, env: &TypeEnv) -> Result<(hir::ExprKind, Type), CompileError> {
    let recv_c = self.check_expr(recv, env)?;
    let (tc, targs) = match self.ctx.prune(&recv_c.ty) {
      Type::Constructed(tc, args) => (tc, args),
      other => return Err(CompileError::semantic(span, format!("{other:?} has no fields"))),
    };
    let vc = {
      let ctors = tc.ctors.borrow();
      if ctors.len() != 1 {
        return Err(CompileError::semantic(span,
          format!("field access requires a single-constructor type, {} has {}", tc.name, ctors.len())));
      }
      Rc::clone(&ctors[0])
    };
    let (slot, member_ty) = vc.members.iter().enumerate()
      .find(|(_, (mname, _))| *mname == name)
      .map(|(i, (_, ty))| (i, ty.clone()))
      .ok_or_else(|| CompileError::semantic(span, format!("{} has no field {name}", tc.name)))?;
    let mapping: HashMap<TypeVarId, Type> = tc.type_params.iter().copied().zip(targs).collect();
    let ty = substitute(&self.ctx, &member_ty, &mapping);
    Ok((hir::ExprKind::Field(Box::new(recv_c), name, slot as u32), ty))
  }

  fn check_match(&mut self, scrut: &ast::Expr, arms: &[ast::MatchArm], span: Span, env: &TypeEnv) -> Result<(hir::ExprKind, Type), CompileError> {
    let scrut_c = self.check_expr(scrut, env)?;
    let (tc, targs) = match self.ctx.prune(&scrut_c.ty) {
      Type::Constructed(tc, args) => (tc, args),
      other => return Err(CompileError::semantic(span, format!("cannot match on {other:?}"))),
    };
    let mapping: HashMap<TypeVarId, Type> = tc.type_params.iter().copied().zip(targs).collect();
    let total_ctors = tc.ctors.borrow().len();
    let mut seen = HashSet::new();
    let mut result_ty: Option<Type> = None;
    let mut checked_arms = Vec::with_capacity(arms.len());
    for arm in arms {
      let vc = self.ctors.get(&arm.ctor).cloned()
        .ok_or_else(|| CompileError::semantic(arm.span, format!("unknown constructor {}", arm.ctor)))?;
      if vc.parent != tc.name {
        return Err(CompileError::semantic(arm.span, format!("{} is not a constructor of {}", arm.ctor, tc.name)));
      }
      if !seen.insert(vc.tag) {
        return Err(CompileError::semantic(arm.span, format!("duplicate match arm for {}", arm.ctor)));
      }
      if vc.members.len() != arm.bindings.len() {
        return Err(CompileError::semantic(arm.span,
          format!("{} expects {} binding(s), found {}", arm.ctor, vc.members.len(), arm.bindings.len())));
      }
      self.scopes.push();
      for (binding, (_, member_ty)) in arm.bindings.iter().zip(vc.members.iter()) {
        if !binding.is_wildcard() {
          let bound_ty = substitute(&self.ctx, member_ty, &mapping);
          self.scopes.define(SymbolInfo::variable(*binding, bound_ty));
        }
      }
      let body = self.check_expr(&arm.body, env)?;
      self.scopes.pop();
      match &result_ty {
        Some(t) => unify(&mut self.ctx, &body.ty, t, arm.span)?,
        None => result_ty = Some(body.ty.clone()),
      }
      checked_arms.push(hir::MatchArm { ctor: vc, bindings: arm.bindings.clone(), body, span: arm.span });
    }
    if seen.len() != total_ctors {
      return Err(CompileError::semantic(span, format!("match on {} is not exhaustive", tc.name)));
    }
    let ty = result_ty.unwrap_or_else(|| self.ctx.unit.clone());
    Ok((hir::ExprKind::Match(Box::new(scrut_c), checked_arms), ty))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn analyze_src(src: &str) -> Result<(hir::Program, TypeContext), CompileError> {
    let program = crate::front::parse(src).expect("fixture source should parse");
    analyze(&program)
  }

  #[test]
  fn infers_simple_arithmetic_function() {
    let (prog, _) = analyze_src("fn add(x: Int, y: Int): Int { return x + y; }").unwrap();
    assert_eq!(prog.functions.len(), 1);
  }

  #[test]
  fn rejects_type_mismatch() {
    assert!(analyze_src("fn f(): Int { return true; }").is_err());
  }

  #[test]
  fn rejects_break_outside_loop() {
    assert!(analyze_src("fn f() { break; }").is_err());
  }

  #[test]
  fn checks_match_exhaustiveness() {
    let ok = analyze_src(
      "data Maybe a = Just(a) | None\n\
       fn unwrap_or(m: Maybe(Int), d: Int): Int { match m { Just(x) => x, None => d, } }"
    );
    assert!(ok.is_ok());

    let missing_arm = analyze_src(
      "data Maybe a = Just(a) | None\n\
       fn unwrap_or(m: Maybe(Int), d: Int): Int { match m { Just(x) => x, } }"
    );
    assert!(missing_arm.is_err());
  }

  #[test]
  fn struct_field_access_resolves_member_type() {
    let (_, _) = analyze_src(
      "struct Point { x: Int, y: Int }\n\
       fn sum(p: Point): Int { return p.x + p.y; }"
    ).unwrap();
  }

  #[test]
  fn impl_method_call_resolves_receiver() {
    let (_, _) = analyze_src(
      "struct Point { x: Int, y: Int }\n\
       impl Point { fn magnitude(self: Point): Int { return self.x + self.y; } }\n\
       fn f(p: Point): Int { return p.magnitude(); }"
    ).unwrap();
  }

  #[test]
  fn recursive_function_self_calls() {
    let (_, _) = analyze_src(
      "fn fact(n: Int): Int { if n == 0 { return 1; } return n * fact(n - 1); }"
    ).unwrap();
  }
}
