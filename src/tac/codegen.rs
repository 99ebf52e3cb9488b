//! Typed AST (HIR) → TAC lowering (spec §4.4; `original_source/h/tac_codegen.hpp`,
//! `src/ir/tac_codegen.cpp`).
//!
//! Walks the typed AST emitting instructions into a current block of a
//! current function, maintaining a `names` scope stack (symbol ⇒ the
//! [`ValueId`] that currently holds that variable's value) and a
//! `loop_exit` stack for `break`. Each surface variable gets one stable
//! value slot for its whole lifetime; reassignment re-emits `Assign` into
//! the *same* slot rather than minting a new one, which is exactly the
//! non-SSA shape `ssa::to_ssa`'s dominance-frontier φ-insertion expects as
//! input.

use hashbrown::HashMap;
use smallvec::{smallvec, SmallVec};
use crate::sema::hir;
use crate::symbol::{intern, Symbol};
use crate::types::{Type, TypeConstructor, TypeContext, ValueConstructor};
use super::block::BasicBlock;
use super::context::{FunctionId, TACContext};
use super::instruction::{BinOp, BlockId, Inst, RelOp};
use super::value::{ValueId, ValueKind};

/// Byte size of every heap object's header: a constructor tag word
/// followed by a size-in-words word (spec §4.4 "Constructors").
const HEADER_SIZE: i32 = 16;

fn mangled_method(ty: Symbol, method: Symbol) -> Symbol {
  intern(&format!("{}.{}", ty.as_str(), method.as_str()))
}

struct Codegen<'a> {
  ctx: TACContext,
  types: &'a TypeContext,
  functions: HashMap<Symbol, FunctionId>,
  current_fn: FunctionId,
  current_block: BlockId,
  names: Vec<HashMap<Symbol, ValueId>>,
  loop_exit: Vec<BlockId>,
}

/// Lower a fully type-checked program to TAC, synthesizing a constructor
/// function for every declared `ValueConstructor` after the user's own
/// functions (spec §4.4 "Constructors. Lowered to synthetic functions
/// generated after the main body.").
#[must_use] pub fn lower(program: &hir::Program, types: &TypeContext) -> TACContext {
  log::debug!("tac::codegen: lowering {} functions, {} types", program.functions.len(), program.types.len());
  let mut cg = Codegen::new(types);
  cg.declare_extern("print");
  cg.declare_extern("gcAllocate");

  for f in &program.functions {
    let fid = cg.ctx.make_function(f.name, f.is_external);
    cg.functions.insert(f.name, fid);
  }
  for tc in &program.types {
    for vc in tc.ctors.borrow().iter() {
      let fid = cg.ctx.make_function(vc.name, false);
      cg.functions.insert(vc.name, fid);
    }
  }

  for f in &program.functions {
    if f.is_external { continue }
    cg.lower_function(f);
  }
  for tc in &program.types {
    for vc in tc.ctors.borrow().iter() {
      cg.lower_constructor(vc);
    }
  }
  log::trace!("tac::codegen: emitted {} functions total", cg.ctx.functions.len());
  cg.ctx
}

impl<'a> Codegen<'a> {
  fn new(types: &'a TypeContext) -> Self {
    Self {
      ctx: TACContext::new(),
      types,
      functions: HashMap::new(),
      current_fn: FunctionId(0),
      current_block: BlockId(0),
      names: vec![HashMap::new()],
      loop_exit: Vec::new(),
    }
  }

  fn declare_extern(&mut self, name: &str) {
    let sym = intern(name);
    let fid = self.ctx.make_function(sym, true);
    self.functions.insert(sym, fid);
    self.ctx.make_extern(sym);
  }

  // --- scope stack -------------------------------------------------------

  fn push_scope(&mut self) { self.names.push(HashMap::new()) }
  fn pop_scope(&mut self) { self.names.pop(); }

  fn define(&mut self, name: Symbol, value: ValueId) {
    self.names.last_mut().unwrap().insert(name, value);
  }

  fn lookup(&self, name: Symbol) -> ValueId {
    self.names.iter().rev().find_map(|s| s.get(&name)).copied()
      .unwrap_or_else(|| panic!("tac codegen: unbound name {name}"))
  }

  // --- block/instruction plumbing -----------------------------------------

  fn block(&self, id: BlockId) -> &BasicBlock {
    self.ctx.function(self.current_fn).block(id)
  }

  fn new_block(&mut self) -> BlockId {
    self.ctx.make_block(self.current_fn)
  }

  fn set_block(&mut self, id: BlockId) {
    self.current_block = id;
  }

  fn is_terminated(&self) -> bool {
    self.block(self.current_block).is_terminated()
  }

  fn append(&mut self, inst: Inst) {
    self.ctx.function_mut(self.current_fn).block_mut(self.current_block).append(inst);
  }

  /// Alias for `append` used at call sites that emit a block terminator,
  /// for readability only.
  fn terminate(&mut self, inst: Inst) {
    self.append(inst);
  }

  fn prepend(&mut self, block: BlockId, inst: Inst) {
    self.ctx.function_mut(self.current_fn).block_mut(block).prepend(inst);
  }

  fn connect(&mut self, from: BlockId, to: BlockId) {
    self.ctx.function_mut(self.current_fn).block_mut(from).add_successor(to);
    self.ctx.function_mut(self.current_fn).block_mut(to).add_predecessor(from);
  }

  fn emit_binop(&mut self, op: BinOp, lhs: ValueId, rhs: ValueId) -> ValueId {
    let dest = self.ctx.make_temp();
    self.append(Inst::BinaryOp { dest, lhs, op, rhs });
    dest
  }

  fn emit_call(&mut self, foreign: bool, func: Symbol, args: Vec<ValueId>, ccall: bool) -> ValueId {
    let dest = self.ctx.make_temp();
    self.append(Inst::Call { dest: Some(dest), foreign, func, args, ccall });
    dest
  }

  /// Untag a tagged integer: `v >> 1` (spec §4.4 "Integer representation").
  fn untag(&mut self, v: ValueId) -> ValueId {
    let one = self.ctx.one();
    self.emit_binop(BinOp::Shr, v, one)
  }

  /// Tag a raw integer: `(v << 1) | 1`, computed as `v*2 + 1` since `BinOp`
  /// has no bitwise-or.
  fn tag(&mut self, v: ValueId) -> ValueId {
    let one = self.ctx.one();
    let shifted = self.emit_binop(BinOp::Shl, v, one);
    self.emit_binop(BinOp::Add, shifted, one)
  }

  fn unit_value(&mut self) -> ValueId {
    self.ctx.false_value()
  }

  // --- functions and constructors ----------------------------------------

  fn lower_function(&mut self, f: &hir::Function) {
    log::debug!("tac::codegen: lowering function {}", f.name);
    let fid = self.functions[&f.name];
    self.current_fn = fid;
    self.current_block = self.ctx.function(fid).entry;
    self.push_scope();
    for (i, p) in f.params.iter().enumerate() {
      let arg = self.ctx.make_argument(p.name, i as u32);
      self.ctx.function_mut(fid).params.push(arg);
      self.define(p.name, arg);
    }
    let tail = self.lower_block(&f.body);
    if !self.is_terminated() {
      self.terminate(Inst::Return(tail));
    }
    self.pop_scope();
  }

  /// Synthesize the constructor function for one `ValueConstructor` (spec
  /// §4.4 "Constructors"). A nullary constructor just returns its tagged
  /// tag value; otherwise it allocates a header + one word per member and
  /// stores each argument into its slot.
  fn lower_constructor(&mut self, vc: &ValueConstructor) {
    log::debug!("tac::codegen: synthesizing constructor {}", vc.name);
    let fid = self.functions[&vc.name];
    self.current_fn = fid;
    self.current_block = self.ctx.function(fid).entry;
    self.push_scope();

    if vc.members.is_empty() {
      let tagged = self.ctx.make_constant_int(2 * i64::from(vc.tag) + 1);
      self.terminate(Inst::Return(Some(tagged)));
      self.pop_scope();
      return;
    }

    let mut args = Vec::with_capacity(vc.members.len());
    for (i, _) in vc.members.iter().enumerate() {
      let arg = self.ctx.make_argument(intern(&format!("_{i}")), i as u32);
      self.ctx.function_mut(fid).params.push(arg);
      args.push(arg);
    }

    let size = HEADER_SIZE as i64 + 8 * vc.members.len() as i64;
    let size_val = self.ctx.make_constant_int(size);
    let obj = self.emit_call(true, intern("gcAllocate"), vec![size_val], true);

    let tag_val = self.ctx.make_constant_int(i64::from(vc.tag));
    self.append(Inst::Store { base: obj, offset: 0, value: tag_val });
    let words_val = self.ctx.make_constant_int(vc.members.len() as i64);
    self.append(Inst::Store { base: obj, offset: 8, value: words_val });
    for (i, arg) in args.into_iter().enumerate() {
      self.append(Inst::Store { base: obj, offset: HEADER_SIZE + 8 * i as i32, value: arg });
    }
    self.terminate(Inst::Return(Some(obj)));
    self.pop_scope();
  }

  // --- statements ----------------------------------------------------------

  /// Lower a block's statements, then its tail expression if any. Returns
  /// the tail's value, or `None` if the block has no tail (spec §4.2
  /// "Block. Type = type of last statement, else Unit").
  fn lower_block(&mut self, block: &hir::Block) -> Option<ValueId> {
    self.push_scope();
    for stmt in &block.stmts {
      if self.is_terminated() { break }
      self.lower_stmt(stmt);
    }
    let tail = if self.is_terminated() { None } else { block.tail.as_ref().map(|t| self.lower_expr(t)) };
    self.pop_scope();
    tail
  }

  fn lower_stmt(&mut self, stmt: &hir::Stmt) {
    match &stmt.kind {
      hir::StmtKind::Let { name, init } => {
        let val = self.lower_expr(init);
        let slot = self.ctx.make_local(Some(*name));
        self.append(Inst::Assign { dest: slot, value: val });
        self.define(*name, slot);
      }
      hir::StmtKind::LetPattern { ctor: _, bindings, init } => {
        let val = self.lower_expr(init);
        self.bind_pattern(bindings, val);
      }
      hir::StmtKind::Assign { name, value } => {
        let val = self.lower_expr(value);
        let slot = self.lookup(*name);
        self.append(Inst::Assign { dest: slot, value: val });
      }
      hir::StmtKind::Expr(e) => { self.lower_expr(e); }
      hir::StmtKind::Return(e) => {
        let val = e.as_ref().map(|e| self.lower_expr(e));
        self.terminate(Inst::Return(val));
      }
      hir::StmtKind::Break => {
        let exit = *self.loop_exit.last().expect("break outside a loop (rejected in sema)");
        self.terminate(Inst::Jump(exit));
      }
      hir::StmtKind::While { cond, body } => self.lower_while(cond, body),
      hir::StmtKind::Foreach { var, iter, body } => self.lower_foreach(*var, iter, body),
      hir::StmtKind::ForRange { var, lo, hi, body } => self.lower_for_range(*var, lo, hi, body),
    }
  }

  fn bind_pattern(&mut self, bindings: &[Symbol], scrutinee: ValueId) {
    for (slot, name) in bindings.iter().enumerate() {
      if name.is_wildcard() { continue }
      let dest = self.ctx.make_temp();
      self.append(Inst::Load { dest, base: scrutinee, offset: HEADER_SIZE + 8 * slot as i32, index: None, scale: 1 });
      let local = self.ctx.make_local(Some(*name));
      self.append(Inst::Assign { dest: local, value: dest });
      self.define(*name, local);
    }
  }

  fn lower_while(&mut self, cond: &hir::Expr, body: &hir::Block) {
    let entry = self.current_block;
    let head = self.new_block();
    let body_blk = self.new_block();
    let exit = self.new_block();
    self.terminate(Inst::Jump(head));
    self.connect(entry, head);

    self.set_block(head);
    let cond_v = self.lower_expr(cond);
    let head_end = self.current_block;
    self.terminate(Inst::JumpIf { cond: cond_v, if_true: body_blk, if_false: exit });
    self.connect(head_end, body_blk);
    self.connect(head_end, exit);

    self.set_block(body_blk);
    self.loop_exit.push(exit);
    self.lower_block(body);
    self.loop_exit.pop();
    if !self.is_terminated() {
      self.terminate(Inst::Jump(head));
      self.connect(self.current_block, head);
    }

    self.set_block(exit);
  }

  /// `foreach x in arr { ... }`, special-cased to the built-in `Array`
  /// representation rather than a general `head`/`tail`/`empty` iterator
  /// protocol (see DESIGN.md's "foreach targets" open-question decision,
  /// which the semantic analyzer already applies).
  fn lower_foreach(&mut self, var: Symbol, iter: &hir::Expr, body: &hir::Block) {
    let arr = self.lower_expr(iter);
    let len = self.ctx.make_temp();
    self.append(Inst::Load { dest: len, base: arr, offset: 8, index: None, scale: 1 });
    let idx = self.ctx.make_local(None);
    let zero = self.ctx.zero();
    self.append(Inst::Assign { dest: idx, value: zero });

    let entry = self.current_block;
    let head = self.new_block();
    let body_blk = self.new_block();
    let exit = self.new_block();
    self.terminate(Inst::Jump(head));
    self.connect(entry, head);

    self.set_block(head);
    self.terminate(Inst::ConditionalJump { lhs: idx, op: RelOp::Lt, rhs: len, if_true: body_blk, if_false: exit });
    self.connect(head, body_blk);
    self.connect(head, exit);

    self.set_block(body_blk);
    let elem = self.ctx.make_temp();
    self.append(Inst::Load { dest: elem, base: arr, offset: HEADER_SIZE, index: Some(idx), scale: 8 });
    let var_slot = self.ctx.make_local(Some(var));
    self.append(Inst::Assign { dest: var_slot, value: elem });
    self.push_scope();
    self.define(var, var_slot);
    self.loop_exit.push(exit);
    self.lower_block(body);
    self.loop_exit.pop();
    self.pop_scope();
    if !self.is_terminated() {
      let one = self.ctx.one();
      let next = self.emit_binop(BinOp::Add, idx, one);
      self.append(Inst::Assign { dest: idx, value: next });
      self.terminate(Inst::Jump(head));
      self.connect(self.current_block, head);
    }

    self.set_block(exit);
  }

  /// `for i in lo..hi { ... }`; the induction variable stays tagged and is
  /// incremented by 2 per iteration (spec §4.4 "Loops").
  fn lower_for_range(&mut self, var: Symbol, lo: &hir::Expr, hi: &hir::Expr, body: &hir::Block) {
    let lo_v = self.lower_expr(lo);
    let hi_v = self.lower_expr(hi);
    let var_slot = self.ctx.make_local(Some(var));
    self.append(Inst::Assign { dest: var_slot, value: lo_v });

    let entry = self.current_block;
    let head = self.new_block();
    let body_blk = self.new_block();
    let exit = self.new_block();
    self.terminate(Inst::Jump(head));
    self.connect(entry, head);

    self.set_block(head);
    self.terminate(Inst::ConditionalJump { lhs: var_slot, op: RelOp::Lt, rhs: hi_v, if_true: body_blk, if_false: exit });
    self.connect(head, body_blk);
    self.connect(head, exit);

    self.set_block(body_blk);
    self.push_scope();
    self.define(var, var_slot);
    self.loop_exit.push(exit);
    self.lower_block(body);
    self.loop_exit.pop();
    self.pop_scope();
    if !self.is_terminated() {
      let two = self.ctx.make_constant_int(2);
      let next = self.emit_binop(BinOp::Add, var_slot, two);
      self.append(Inst::Assign { dest: var_slot, value: next });
      self.terminate(Inst::Jump(head));
      self.connect(self.current_block, head);
    }

    self.set_block(exit);
  }

  // --- expressions ---------------------------------------------------------

  fn lower_expr(&mut self, e: &hir::Expr) -> ValueId {
    match &e.kind {
      hir::ExprKind::Int(n) => self.ctx.make_constant_int(2 * n + 1),
      hir::ExprKind::Bool(b) => if *b { self.ctx.true_value() } else { self.ctx.false_value() },
      hir::ExprKind::Str(s) => {
        let name = intern(&format!("str{}", self.ctx.static_strings.len()));
        self.ctx.make_static_string(name, s.as_str())
      }
      hir::ExprKind::Var(name) => self.lookup(*name),
      hir::ExprKind::Binary(op, l, r) => self.lower_binary(*op, l, r),
      hir::ExprKind::Not(x) => {
        let v = self.lower_expr(x);
        let four = self.ctx.make_constant_int(4);
        self.emit_binop(BinOp::Sub, four, v)
      }
      hir::ExprKind::Neg(x) => {
        let v = self.lower_expr(x);
        let raw = self.untag(v);
        let zero = self.ctx.zero();
        let negated = self.emit_binop(BinOp::Sub, zero, raw);
        self.tag(negated)
      }
      hir::ExprKind::Call(name, args) => {
        let arg_vals = args.iter().map(|a| self.lower_expr(a)).collect::<Vec<_>>();
        let fid = self.functions.get(name).copied();
        let foreign = fid.is_some_and(|f| self.ctx.function(f).is_external);
        self.emit_call(foreign, *name, arg_vals, foreign)
      }
      hir::ExprKind::Closure(name) => self.lower_closure(*name),
      hir::ExprKind::MethodCall(recv, method, args) => self.lower_method_call(recv, *method, args),
      hir::ExprKind::Field(recv, _name, slot) => {
        let obj = self.lower_expr(recv);
        let dest = self.ctx.make_temp();
        self.append(Inst::Load { dest, base: obj, offset: HEADER_SIZE + 8 * i32::try_from(*slot).unwrap(), index: None, scale: 1 });
        dest
      }
      hir::ExprKind::Construct(vc, args) => {
        let arg_vals = args.iter().map(|a| self.lower_expr(a)).collect::<Vec<_>>();
        self.emit_call(false, vc.name, arg_vals, false)
      }
      hir::ExprKind::List(elems) => self.lower_list(elems),
      hir::ExprKind::If(cond, then_blk, else_blk) => self.lower_if(cond, then_blk, else_blk.as_ref()),
      hir::ExprKind::Match(scrutinee, arms) => self.lower_match(scrutinee, arms),
      hir::ExprKind::Block(block) => self.lower_block(block).unwrap_or_else(|| self.unit_value()),
    }
  }

  fn lower_binary(&mut self, op: crate::front::ast::BinOp, l: &hir::Expr, r: &hir::Expr) -> ValueId {
    use crate::front::ast::BinOp::*;
    match op {
      And => self.lower_short_circuit(true, l, r),
      Or => self.lower_short_circuit(false, l, r),
      Eq | Ne | Lt | Le | Gt | Ge => self.lower_compare(op, l, r),
      Add | Sub | Mul | Div | Mod => {
        let lv = self.lower_expr(l);
        let rv = self.lower_expr(r);
        let lu = self.untag(lv);
        let ru = self.untag(rv);
        let bop = match op {
          Add => BinOp::Add, Sub => BinOp::Sub, Mul => BinOp::Mul, Div => BinOp::Div, Mod => BinOp::Mod,
          _ => unreachable!(),
        };
        let raw = self.emit_binop(bop, lu, ru);
        self.tag(raw)
      }
    }
  }

  fn lower_short_circuit(&mut self, is_and: bool, l: &hir::Expr, r: &hir::Expr) -> ValueId {
    let lv = self.lower_expr(l);
    let entry = self.current_block;
    let rhs_blk = self.new_block();
    let join = self.new_block();
    let (if_true, if_false) = if is_and { (rhs_blk, join) } else { (join, rhs_blk) };
    self.terminate(Inst::JumpIf { cond: lv, if_true, if_false });
    self.connect(entry, rhs_blk);
    self.connect(entry, join);

    self.set_block(rhs_blk);
    let rv = self.lower_expr(r);
    let rhs_end = self.current_block;
    self.terminate(Inst::Jump(join));
    self.connect(rhs_end, join);

    self.set_block(join);
    let dest = self.ctx.make_temp();
    self.prepend(join, Inst::Phi { dest, incoming: smallvec![(entry, lv), (rhs_end, rv)] });
    dest
  }

  fn lower_compare(&mut self, op: crate::front::ast::BinOp, l: &hir::Expr, r: &hir::Expr) -> ValueId {
    use crate::front::ast::BinOp::*;
    let lv = self.lower_expr(l);
    let rv = self.lower_expr(r);
    let rel = match op { Eq => RelOp::Eq, Ne => RelOp::Ne, Lt => RelOp::Lt, Le => RelOp::Le, Gt => RelOp::Gt, Ge => RelOp::Ge, _ => unreachable!() };
    let entry = self.current_block;
    let true_blk = self.new_block();
    let false_blk = self.new_block();
    let join = self.new_block();
    self.terminate(Inst::ConditionalJump { lhs: lv, op: rel, rhs: rv, if_true: true_blk, if_false: false_blk });
    self.connect(entry, true_blk);
    self.connect(entry, false_blk);

    self.set_block(true_blk);
    let t = self.ctx.true_value();
    self.terminate(Inst::Jump(join));
    self.connect(true_blk, join);

    self.set_block(false_blk);
    let f = self.ctx.false_value();
    self.terminate(Inst::Jump(join));
    self.connect(false_blk, join);

    self.set_block(join);
    let dest = self.ctx.make_temp();
    self.prepend(join, Inst::Phi { dest, incoming: smallvec![(true_blk, t), (false_blk, f)] });
    dest
  }

  /// A bare function reference used as a value becomes a 24-byte object:
  /// `constructorTag=0`, `sizeInWords=0`, then the function's code address
  /// (spec §4.4 "Closures").
  fn lower_closure(&mut self, name: Symbol) -> ValueId {
    let size = self.ctx.make_constant_int(i64::from(HEADER_SIZE) + 8);
    let obj = self.emit_call(true, intern("gcAllocate"), vec![size], true);
    let zero = self.ctx.zero();
    self.append(Inst::Store { base: obj, offset: 0, value: zero });
    self.append(Inst::Store { base: obj, offset: 8, value: zero });
    let code = self.ctx.make_global(name);
    self.append(Inst::Store { base: obj, offset: HEADER_SIZE, value: code });
    obj
  }

  fn lower_method_call(&mut self, recv: &hir::Expr, method: Symbol, args: &[hir::Expr]) -> ValueId {
    let recv_ty = self.types.prune(&recv.ty);
    let Type::Constructed(tc, _) = recv_ty else {
      panic!("tac codegen: method call receiver must have a constructed type");
    };
    let mangled = mangled_method(tc.name, method);
    let recv_val = self.lower_expr(recv);
    let mut arg_vals = vec![recv_val];
    arg_vals.extend(args.iter().map(|a| self.lower_expr(a)));
    self.emit_call(false, mangled, arg_vals, false)
  }

  /// `[e1, e2, ...]` allocates a header + one word per element, matching a
  /// constructor's object layout (§4.4 "Constructors"), since `Array` is
  /// just the built-in single-constructor type with a variable arity.
  fn lower_list(&mut self, elems: &[hir::Expr]) -> ValueId {
    let vals = elems.iter().map(|e| self.lower_expr(e)).collect::<Vec<_>>();
    let size = self.ctx.make_constant_int(i64::from(HEADER_SIZE) + 8 * vals.len() as i64);
    let obj = self.emit_call(true, intern("gcAllocate"), vec![size], true);
    let zero = self.ctx.zero();
    self.append(Inst::Store { base: obj, offset: 0, value: zero });
    let len = self.ctx.make_constant_int(vals.len() as i64);
    self.append(Inst::Store { base: obj, offset: 8, value: len });
    for (i, v) in vals.into_iter().enumerate() {
      self.append(Inst::Store { base: obj, offset: HEADER_SIZE + 8 * i as i32, value: v });
    }
    obj
  }

  fn lower_if(&mut self, cond: &hir::Expr, then_blk: &hir::Block, else_blk: Option<&hir::Block>) -> ValueId {
    let cond_v = self.lower_expr(cond);
    let entry = self.current_block;
    let then_id = self.new_block();
    let else_id = self.new_block();
    let join = self.new_block();
    self.terminate(Inst::JumpIf { cond: cond_v, if_true: then_id, if_false: else_id });
    self.connect(entry, then_id);
    self.connect(entry, else_id);

    self.set_block(then_id);
    let then_val = self.lower_block(then_blk);
    let then_end = self.current_block;
    if !self.is_terminated() {
      self.terminate(Inst::Jump(join));
      self.connect(then_end, join);
    }

    self.set_block(else_id);
    let else_val = match else_blk {
      Some(b) => self.lower_block(b),
      None => None,
    };
    let else_end = self.current_block;
    if !self.is_terminated() {
      self.terminate(Inst::Jump(join));
      self.connect(else_end, join);
    }

    self.set_block(join);
    match (then_val, else_val) {
      (Some(t), Some(e)) => {
        let dest = self.ctx.make_temp();
        self.prepend(join, Inst::Phi { dest, incoming: smallvec![(then_end, t), (else_end, e)] });
        dest
      }
      _ => self.unit_value(),
    }
  }

  /// Match lowering (spec §4.4 "Match"): compute the scrutinee's logical
  /// tag, then test each arm's tag in source order, binding that arm's
  /// members from the scrutinee before lowering its body. The last arm's
  /// fall-through is unreachable because exhaustiveness was already
  /// checked in `sema::analyzer`.
  fn lower_match(&mut self, scrutinee: &hir::Expr, arms: &[hir::MatchArm]) -> ValueId {
    let v = self.lower_expr(scrutinee);
    let parent = arms[0].ctor.parent;
    let tc = self.types.lookup_constructor(parent).expect("match scrutinee type must be registered");
    let tag_val = self.lower_match_tag(v, &tc);

    let join = self.new_block();
    let mut incoming: SmallVec<[(BlockId, ValueId); 4]> = SmallVec::new();
    let mut next_test = self.current_block;

    for (i, arm) in arms.iter().enumerate() {
      self.set_block(next_test);
      let test_block = self.current_block;
      let tag_const = self.ctx.make_constant_int(i64::from(arm.ctor.tag));
      let body_blk = self.new_block();
      let fallthrough = if i + 1 == arms.len() { self.new_block() } else { self.new_block() };
      self.terminate(Inst::ConditionalJump { lhs: tag_val, op: RelOp::Eq, rhs: tag_const, if_true: body_blk, if_false: fallthrough });
      self.connect(test_block, body_blk);
      self.connect(test_block, fallthrough);

      self.set_block(body_blk);
      self.push_scope();
      self.bind_pattern(&arm.bindings, v);
      let body_val = self.lower_expr(&arm.body);
      self.pop_scope();
      let body_end = self.current_block;
      if !self.is_terminated() {
        self.terminate(Inst::Jump(join));
        self.connect(body_end, join);
      }
      incoming.push((body_end, body_val));

      next_test = fallthrough;
    }

    self.set_block(next_test);
    self.terminate(Inst::Unreachable);

    self.set_block(join);
    let dest = self.ctx.make_temp();
    self.prepend(join, Inst::Phi { dest, incoming });
    dest
  }

  /// Extract the scrutinee's logical constructor tag. A type whose arms are
  /// all nullary stores the tag directly in the tagged integer; a type
  /// whose arms are all non-nullary stores it in the heap object's header;
  /// a type with both tests the value's low bit to tell which
  /// representation it's looking at (spec §4.4 "Match").
  fn lower_match_tag(&mut self, v: ValueId, tc: &std::rc::Rc<TypeConstructor>) -> ValueId {
    let (has_nullary, has_nonnullary) = {
      let ctors = tc.ctors.borrow();
      (ctors.iter().any(|c| c.arity() == 0), ctors.iter().any(|c| c.arity() > 0))
    };
    if has_nullary && !has_nonnullary {
      return self.untag(v);
    }
    if has_nonnullary && !has_nullary {
      let dest = self.ctx.make_temp();
      self.append(Inst::Load { dest, base: v, offset: 0, index: None, scale: 1 });
      return dest;
    }

    let one = self.ctx.one();
    let zero = self.ctx.zero();
    let bit = self.emit_binop(BinOp::And, v, one);
    let entry = self.current_block;
    let nullary_blk = self.new_block();
    let object_blk = self.new_block();
    let join = self.new_block();
    self.terminate(Inst::ConditionalJump { lhs: bit, op: RelOp::Ne, rhs: zero, if_true: nullary_blk, if_false: object_blk });
    self.connect(entry, nullary_blk);
    self.connect(entry, object_blk);

    self.set_block(nullary_blk);
    let nullary_tag = self.untag(v);
    self.terminate(Inst::Jump(join));
    self.connect(nullary_blk, join);

    self.set_block(object_blk);
    let object_tag = self.ctx.make_temp();
    self.append(Inst::Load { dest: object_tag, base: v, offset: 0, index: None, scale: 1 });
    self.terminate(Inst::Jump(join));
    self.connect(object_blk, join);

    self.set_block(join);
    let dest = self.ctx.make_temp();
    self.prepend(join, Inst::Phi { dest, incoming: smallvec![(nullary_blk, nullary_tag), (object_blk, object_tag)] });
    dest
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn lower_source(src: &str) -> TACContext {
    let program = crate::front::parse(src).unwrap();
    let (hir, types) = crate::sema::analyze(&program).unwrap();
    lower(&hir, &types)
  }

  #[test]
  fn lowers_a_trivial_return() {
    let ctx = lower_source("fn main(): Int { return 0; }");
    let main = ctx.functions.iter().find(|f| f.name.as_str() == "main").unwrap();
    assert!(main.blocks[0].is_terminated());
  }

  #[test]
  fn tags_integer_literals() {
    let ctx = lower_source("fn main(): Int { return 5; }");
    let main = ctx.functions.iter().find(|f| f.name.as_str() == "main").unwrap();
    let Inst::Return(Some(v)) = main.blocks[0].insts.last().unwrap() else { panic!() };
    assert!(matches!(ctx.value(*v).kind, ValueKind::ConstantInt(11)));
  }

  #[test]
  fn if_expression_joins_with_a_phi() {
    let ctx = lower_source("fn main(): Int { return if true { 1 } else { 2 }; }");
    let main = ctx.functions.iter().find(|f| f.name.as_str() == "main").unwrap();
    let has_phi = main.blocks.iter().any(|b| b.insts.iter().any(|i| matches!(i, Inst::Phi { .. })));
    assert!(has_phi);
  }

  #[test]
  fn data_constructor_gets_a_synthetic_function() {
    let ctx = lower_source("data Maybe a = Just(a) | None\nfn main(): Maybe<Int> { return Just(1); }");
    assert!(ctx.functions.iter().any(|f| f.name.as_str() == "Just"));
    assert!(ctx.functions.iter().any(|f| f.name.as_str() == "None"));
  }

  #[test]
  fn while_loop_forms_head_body_exit_blocks() {
    let ctx = lower_source("fn main(): Int { let i: Int = 0; while i < 10 { i = i + 1; } return i; }");
    let main = ctx.functions.iter().find(|f| f.name.as_str() == "main").unwrap();
    assert!(main.blocks.len() >= 4);
  }
}
