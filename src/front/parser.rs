//! Recursive-descent parser with Pratt-style precedence climbing for binary
//! operators (spec §4.0). Single-error, no recovery — the first malformed
//! token aborts parsing, matching the original parser collaborator's
//! contract ("the core is not entered" on failure).

use crate::error::CompileError;
use crate::symbol::{Span, Symbol};
use super::ast::*;
use super::token::{Token, TokenKind};

pub struct Parser<'a> {
  toks: &'a [Token],
  pos: usize,
}

type PResult<T> = Result<T, CompileError>;

pub fn parse_program(toks: &[Token]) -> PResult<Program> {
  Parser { toks, pos: 0 }.program()
}

impl<'a> Parser<'a> {
  fn cur(&self) -> &Token { &self.toks[self.pos] }
  fn kind(&self) -> &TokenKind { &self.cur().kind }
  fn span(&self) -> Span { self.cur().span }

  fn bump(&mut self) -> Token {
    let t = *self.cur();
    if self.pos + 1 < self.toks.len() { self.pos += 1 }
    t
  }

  fn check(&self, kind: &TokenKind) -> bool { self.kind() == kind }

  fn eat(&mut self, kind: &TokenKind) -> bool {
    if self.check(kind) { self.bump(); true } else { false }
  }

  fn expect(&mut self, kind: TokenKind, what: &str) -> PResult<Token> {
    if self.check(&kind) { Ok(self.bump()) }
    else { Err(CompileError::parse(self.span(), crate::error::expected(what, format!("{:?}", self.kind())))) }
  }

  fn ident(&mut self) -> PResult<(Symbol, Span)> {
    let span = self.span();
    match self.kind() {
      TokenKind::Ident(s) => { let s = *s; self.bump(); Ok((s, span)) }
      _ => Err(CompileError::parse(span, crate::error::expected("an identifier", format!("{:?}", self.kind())))),
    }
  }

  // ---- top level ----

  fn program(&mut self) -> PResult<Program> {
    let mut decls = Vec::new();
    while !self.check(&TokenKind::Eof) {
      match self.kind() {
        TokenKind::Fn => decls.push(Decl::Fn(self.fn_decl(None)?)),
        TokenKind::Data => decls.push(Decl::Data(self.data_decl()?)),
        TokenKind::Struct => decls.push(Decl::Struct(self.struct_decl()?)),
        TokenKind::Impl => decls.extend(self.impl_block()?.into_iter().map(Decl::Fn)),
        _ => return Err(CompileError::parse(self.span(),
          crate::error::expected("a top-level declaration", format!("{:?}", self.kind())))),
      }
    }
    Ok(Program { decls })
  }

  fn type_params(&mut self) -> PResult<Vec<Symbol>> {
    let mut params = Vec::new();
    if self.eat(&TokenKind::Lt) {
      loop {
        let (name, _) = self.ident()?;
        params.push(name);
        if !self.eat(&TokenKind::Comma) { break }
      }
      self.expect(TokenKind::Gt, "'>'")?;
    }
    Ok(params)
  }

  fn fn_decl(&mut self, impl_for: Option<Symbol>) -> PResult<FnDecl> {
    let start = self.span();
    self.expect(TokenKind::Fn, "'fn'")?;
    let (name, _) = self.ident()?;
    let type_params = self.type_params()?;
    self.expect(TokenKind::LParen, "'('")?;
    let mut params = Vec::new();
    while !self.check(&TokenKind::RParen) {
      let (pname, pspan) = self.ident()?;
      self.expect(TokenKind::Colon, "':'")?;
      let ty = self.type_expr()?;
      params.push(Param { name: pname, ty, span: pspan });
      if !self.eat(&TokenKind::Comma) { break }
    }
    self.expect(TokenKind::RParen, "')'")?;
    let ret = if self.eat(&TokenKind::Arrow) { Some(self.type_expr()?) } else { None };
    let body = self.block()?;
    let span = start.to(body.span);
    Ok(FnDecl { name, type_params, params, ret, body, span, impl_for })
  }

  fn impl_block(&mut self) -> PResult<Vec<FnDecl>> {
    self.expect(TokenKind::Impl, "'impl'")?;
    let (recv, _) = self.ident()?;
    self.expect(TokenKind::LBrace, "'{'")?;
    let mut fns = Vec::new();
    while !self.check(&TokenKind::RBrace) {
      fns.push(self.fn_decl(Some(recv))?);
    }
    self.expect(TokenKind::RBrace, "'}'")?;
    Ok(fns)
  }

  fn data_decl(&mut self) -> PResult<DataDecl> {
    let start = self.span();
    self.expect(TokenKind::Data, "'data'")?;
    let (name, _) = self.ident()?;
    let mut type_params = Vec::new();
    while let TokenKind::Ident(s) = self.kind() {
      type_params.push(*s);
      self.bump();
    }
    self.expect(TokenKind::Eq, "'='")?;
    let mut ctors = Vec::new();
    loop {
      let cspan = self.span();
      let (cname, _) = self.ident()?;
      let mut members = Vec::new();
      if self.eat(&TokenKind::LParen) {
        while !self.check(&TokenKind::RParen) {
          members.push(self.type_expr()?);
          if !self.eat(&TokenKind::Comma) { break }
        }
        self.expect(TokenKind::RParen, "')'")?;
      }
      ctors.push(CtorSpec { name: cname, members, span: cspan });
      if !self.eat(&TokenKind::Pipe) { break }
    }
    let span = start.to(self.toks[self.pos.saturating_sub(1)].span);
    Ok(DataDecl { name, type_params, ctors, span })
  }

  fn struct_decl(&mut self) -> PResult<StructDecl> {
    let start = self.span();
    self.expect(TokenKind::Struct, "'struct'")?;
    let (name, _) = self.ident()?;
    let mut type_params = Vec::new();
    while let TokenKind::Ident(s) = self.kind() {
      type_params.push(*s);
      self.bump();
    }
    self.expect(TokenKind::LBrace, "'{'")?;
    let mut fields = Vec::new();
    while !self.check(&TokenKind::RBrace) {
      let fspan = self.span();
      let (fname, _) = self.ident()?;
      self.expect(TokenKind::Colon, "':'")?;
      let ty = self.type_expr()?;
      fields.push(FieldSpec { name: fname, ty, span: fspan });
      if !self.eat(&TokenKind::Comma) { break }
    }
    self.expect(TokenKind::RBrace, "'}'")?;
    let span = start.to(self.toks[self.pos.saturating_sub(1)].span);
    Ok(StructDecl { name, type_params, fields, span })
  }

  fn type_expr(&mut self) -> PResult<TypeExpr> {
    let start = self.span();
    if self.eat(&TokenKind::LParen) {
      let mut ins = Vec::new();
      while !self.check(&TokenKind::RParen) {
        ins.push(self.type_expr()?);
        if !self.eat(&TokenKind::Comma) { break }
      }
      self.expect(TokenKind::RParen, "')'")?;
      self.expect(TokenKind::Arrow, "'->'")?;
      let out = self.type_expr()?;
      let span = start.to(out.span);
      return Ok(TypeExpr { kind: TypeExprKind::Function(ins, Box::new(out)), span })
    }
    let (name, nspan) = self.ident()?;
    let mut args = Vec::new();
    if self.eat(&TokenKind::LParen) {
      while !self.check(&TokenKind::RParen) {
        args.push(self.type_expr()?);
        if !self.eat(&TokenKind::Comma) { break }
      }
      self.expect(TokenKind::RParen, "')'")?;
    }
    let span = if args.is_empty() { nspan } else { nspan.to(self.toks[self.pos.saturating_sub(1)].span) };
    Ok(TypeExpr { kind: TypeExprKind::Named(name, args), span })
  }

  // ---- statements ----

  fn block(&mut self) -> PResult<Block> {
    let start = self.span();
    self.expect(TokenKind::LBrace, "'{'")?;
    let mut stmts = Vec::new();
    let mut tail = None;
    while !self.check(&TokenKind::RBrace) {
      if self.starts_stmt_only() {
        stmts.push(self.stmt()?);
      } else {
        let is_block_like = matches!(self.kind(), TokenKind::If | TokenKind::Match | TokenKind::LBrace);
        let e = self.expr()?;
        if self.eat(&TokenKind::Semi) {
          let span = e.span;
          stmts.push(Stmt { kind: StmtKind::Expr(e), span });
        } else if is_block_like && !self.check(&TokenKind::RBrace) {
          // `if`/`match`/`{ }` used in statement position need no trailing
          // `;` unless they end the block, matching `while`/`foreach`.
          let span = e.span;
          stmts.push(Stmt { kind: StmtKind::Expr(e), span });
        } else {
          tail = Some(Box::new(e));
          break
        }
      }
    }
    let end = self.expect(TokenKind::RBrace, "'}'")?;
    Ok(Block { stmts, tail, span: start.to(end.span) })
  }

  fn starts_stmt_only(&self) -> bool {
    matches!(self.kind(),
      TokenKind::Let | TokenKind::Return | TokenKind::Break | TokenKind::While
      | TokenKind::Foreach | TokenKind::For)
      || self.is_assignment_start()
  }

  fn is_assignment_start(&self) -> bool {
    if let TokenKind::Ident(_) = self.kind() {
      matches!(self.toks.get(self.pos + 1).map(|t| t.kind), Some(TokenKind::Eq))
    } else {
      false
    }
  }

  fn stmt(&mut self) -> PResult<Stmt> {
    let start = self.span();
    match self.kind() {
      TokenKind::Let => {
        self.bump();
        // Disambiguate `let name = expr;` from `let Ctor(x, y) := expr;` by
        // checking for a following `(`.
        let (name, _) = self.ident()?;
        if self.check(&TokenKind::LParen) {
          self.bump();
          let mut bindings = Vec::new();
          while !self.check(&TokenKind::RParen) {
            let (b, _) = self.ident()?;
            bindings.push(b);
            if !self.eat(&TokenKind::Comma) { break }
          }
          self.expect(TokenKind::RParen, "')'")?;
          self.expect(TokenKind::ColonEq, "':='")?;
          let init = self.expr()?;
          let end = self.expect(TokenKind::Semi, "';'")?;
          Ok(Stmt { kind: StmtKind::LetPattern { ctor: name, bindings, init }, span: start.to(end.span) })
        } else {
          let ty = if self.eat(&TokenKind::Colon) { Some(self.type_expr()?) } else { None };
          self.expect(TokenKind::Eq, "'='")?;
          let init = self.expr()?;
          let end = self.expect(TokenKind::Semi, "';'")?;
          Ok(Stmt { kind: StmtKind::Let { name, ty, init }, span: start.to(end.span) })
        }
      }
      TokenKind::Return => {
        self.bump();
        let value = if self.check(&TokenKind::Semi) { None } else { Some(self.expr()?) };
        let end = self.expect(TokenKind::Semi, "';'")?;
        Ok(Stmt { kind: StmtKind::Return(value), span: start.to(end.span) })
      }
      TokenKind::Break => {
        self.bump();
        let end = self.expect(TokenKind::Semi, "';'")?;
        Ok(Stmt { kind: StmtKind::Break, span: start.to(end.span) })
      }
      TokenKind::While => {
        self.bump();
        let cond = self.expr()?;
        let body = self.block()?;
        let span = start.to(body.span);
        Ok(Stmt { kind: StmtKind::While { cond, body }, span })
      }
      TokenKind::Foreach => {
        self.bump();
        let (var, _) = self.ident()?;
        self.expect(TokenKind::In, "'in'")?;
        let iter = self.expr()?;
        self.expect(TokenKind::Do, "'do'")?;
        let body = self.block()?;
        let span = start.to(body.span);
        Ok(Stmt { kind: StmtKind::Foreach { var, iter, body }, span })
      }
      TokenKind::For => {
        self.bump();
        let (var, _) = self.ident()?;
        self.expect(TokenKind::In, "'in'")?;
        let lo = self.expr()?;
        self.expect(TokenKind::DotDot, "'..'")?;
        let hi = self.expr()?;
        self.expect(TokenKind::Do, "'do'")?;
        let body = self.block()?;
        let span = start.to(body.span);
        Ok(Stmt { kind: StmtKind::ForRange { var, lo, hi, body }, span })
      }
      _ if self.is_assignment_start() => {
        let (name, _) = self.ident()?;
        self.expect(TokenKind::Eq, "'='")?;
        let value = self.expr()?;
        let end = self.expect(TokenKind::Semi, "';'")?;
        Ok(Stmt { kind: StmtKind::Assign { name, value }, span: start.to(end.span) })
      }
      _ => {
        let e = self.expr()?;
        let end = self.expect(TokenKind::Semi, "';'")?;
        Ok(Stmt { kind: StmtKind::Expr(e), span: start.to(end.span) })
      }
    }
  }

  // ---- expressions ----
  // Precedence, loosest to tightest: or < and < equality < comparison
  // < additive < multiplicative < unary < postfix < primary.

  fn expr(&mut self) -> PResult<Expr> { self.or_expr() }

  fn is_ident_kw(&self, text: &str) -> bool {
    matches!(self.kind(), TokenKind::Ident(s) if s.as_str() == text)
  }

  fn or_expr(&mut self) -> PResult<Expr> {
    let mut lhs = self.and_expr()?;
    while self.is_ident_kw("or") {
      self.bump();
      let rhs = self.and_expr()?;
      let span = lhs.span.to(rhs.span);
      lhs = Expr { kind: ExprKind::Binary(BinOp::Or, Box::new(lhs), Box::new(rhs)), span };
    }
    Ok(lhs)
  }

  fn and_expr(&mut self) -> PResult<Expr> {
    let mut lhs = self.eq_expr()?;
    while self.is_ident_kw("and") {
      self.bump();
      let rhs = self.eq_expr()?;
      let span = lhs.span.to(rhs.span);
      lhs = Expr { kind: ExprKind::Binary(BinOp::And, Box::new(lhs), Box::new(rhs)), span };
    }
    Ok(lhs)
  }

  fn eq_expr(&mut self) -> PResult<Expr> {
    let mut lhs = self.cmp_expr()?;
    loop {
      let op = match self.kind() {
        TokenKind::EqEq => BinOp::Eq,
        TokenKind::Ne => BinOp::Ne,
        _ => break,
      };
      self.bump();
      let rhs = self.cmp_expr()?;
      let span = lhs.span.to(rhs.span);
      lhs = Expr { kind: ExprKind::Binary(op, Box::new(lhs), Box::new(rhs)), span };
    }
    Ok(lhs)
  }

  fn cmp_expr(&mut self) -> PResult<Expr> {
    let mut lhs = self.add_expr()?;
    loop {
      let op = match self.kind() {
        TokenKind::Lt => BinOp::Lt,
        TokenKind::Le => BinOp::Le,
        TokenKind::Gt => BinOp::Gt,
        TokenKind::Ge => BinOp::Ge,
        _ => break,
      };
      self.bump();
      let rhs = self.add_expr()?;
      let span = lhs.span.to(rhs.span);
      lhs = Expr { kind: ExprKind::Binary(op, Box::new(lhs), Box::new(rhs)), span };
    }
    Ok(lhs)
  }

  fn add_expr(&mut self) -> PResult<Expr> {
    let mut lhs = self.mul_expr()?;
    loop {
      let op = match self.kind() {
        TokenKind::Plus => BinOp::Add,
        TokenKind::Minus => BinOp::Sub,
        _ => break,
      };
      self.bump();
      let rhs = self.mul_expr()?;
      let span = lhs.span.to(rhs.span);
      lhs = Expr { kind: ExprKind::Binary(op, Box::new(lhs), Box::new(rhs)), span };
    }
    Ok(lhs)
  }

  fn mul_expr(&mut self) -> PResult<Expr> {
    let mut lhs = self.unary_expr()?;
    loop {
      let op = match self.kind() {
        TokenKind::Star => BinOp::Mul,
        TokenKind::Slash => BinOp::Div,
        TokenKind::Percent => BinOp::Mod,
        _ => break,
      };
      self.bump();
      let rhs = self.unary_expr()?;
      let span = lhs.span.to(rhs.span);
      lhs = Expr { kind: ExprKind::Binary(op, Box::new(lhs), Box::new(rhs)), span };
    }
    Ok(lhs)
  }

  fn unary_expr(&mut self) -> PResult<Expr> {
    let start = self.span();
    if self.is_ident_kw("not") {
      self.bump();
      let e = self.unary_expr()?;
      let span = start.to(e.span);
      return Ok(Expr { kind: ExprKind::Not(Box::new(e)), span })
    }
    if self.check(&TokenKind::Minus) {
      self.bump();
      let e = self.unary_expr()?;
      let span = start.to(e.span);
      return Ok(Expr { kind: ExprKind::Neg(Box::new(e)), span })
    }
    self.postfix_expr()
  }

  fn postfix_expr(&mut self) -> PResult<Expr> {
    let mut e = self.primary_expr()?;
    loop {
      if self.eat(&TokenKind::Dot) {
        let (name, _) = self.ident()?;
        if self.eat(&TokenKind::LParen) {
          let args = self.call_args()?;
          let end = self.expect(TokenKind::RParen, "')'")?;
          let span = e.span.to(end.span);
          e = Expr { kind: ExprKind::MethodCall(Box::new(e), name, args), span };
        } else {
          let span = e.span.to(self.toks[self.pos.saturating_sub(1)].span);
          e = Expr { kind: ExprKind::Field(Box::new(e), name), span };
        }
      } else {
        break
      }
    }
    Ok(e)
  }

  fn call_args(&mut self) -> PResult<Vec<Expr>> {
    let mut args = Vec::new();
    while !self.check(&TokenKind::RParen) {
      args.push(self.expr()?);
      if !self.eat(&TokenKind::Comma) { break }
    }
    Ok(args)
  }

  fn primary_expr(&mut self) -> PResult<Expr> {
    let start = self.span();
    match self.kind().clone() {
      TokenKind::Int(n) => { self.bump(); Ok(Expr { kind: ExprKind::Int(n), span: start }) }
      TokenKind::True => { self.bump(); Ok(Expr { kind: ExprKind::Bool(true), span: start }) }
      TokenKind::False => { self.bump(); Ok(Expr { kind: ExprKind::Bool(false), span: start }) }
      TokenKind::Str(s) => { self.bump(); Ok(Expr { kind: ExprKind::Str(s), span: start }) }
      TokenKind::LParen => {
        self.bump();
        let e = self.expr()?;
        self.expect(TokenKind::RParen, "')'")?;
        Ok(e)
      }
      TokenKind::LBracket => {
        self.bump();
        let mut items = Vec::new();
        while !self.check(&TokenKind::RBracket) {
          items.push(self.expr()?);
          if !self.eat(&TokenKind::Comma) { break }
        }
        let end = self.expect(TokenKind::RBracket, "']'")?;
        Ok(Expr { kind: ExprKind::List(items), span: start.to(end.span) })
      }
      TokenKind::If => {
        self.bump();
        let cond = self.expr()?;
        let then = self.block()?;
        let els = if self.eat(&TokenKind::Else) { Some(self.block()?) } else { None };
        let span = start.to(els.as_ref().map_or(then.span, |b| b.span));
        Ok(Expr { kind: ExprKind::If(Box::new(cond), then, els), span })
      }
      TokenKind::Match => {
        self.bump();
        let scrutinee = self.expr()?;
        self.expect(TokenKind::LBrace, "'{'")?;
        let mut arms = Vec::new();
        while !self.check(&TokenKind::RBrace) {
          let aspan = self.span();
          let (ctor, _) = self.ident()?;
          let mut bindings = Vec::new();
          if self.eat(&TokenKind::LParen) {
            while !self.check(&TokenKind::RParen) {
              let (b, _) = self.ident()?;
              bindings.push(b);
              if !self.eat(&TokenKind::Comma) { break }
            }
            self.expect(TokenKind::RParen, "')'")?;
          }
          self.expect(TokenKind::FatArrow, "'=>'")?;
          let body = self.expr()?;
          let span = aspan.to(body.span);
          arms.push(MatchArm { ctor, bindings, body, span });
          if !self.eat(&TokenKind::Comma) { break }
        }
        let end = self.expect(TokenKind::RBrace, "'}'")?;
        Ok(Expr { kind: ExprKind::Match(Box::new(scrutinee), arms), span: start.to(end.span) })
      }
      TokenKind::LBrace => {
        let b = self.block()?;
        let span = b.span;
        Ok(Expr { kind: ExprKind::Block(b), span })
      }
      TokenKind::Ident(name) => {
        self.bump();
        if self.eat(&TokenKind::LParen) {
          let args = self.call_args()?;
          let end = self.expect(TokenKind::RParen, "')'")?;
          let span = start.to(end.span);
          let kind = if is_ctor_name(name) { ExprKind::Construct(name, args) } else { ExprKind::Call(name, args) };
          Ok(Expr { kind, span })
        } else {
          Ok(Expr { kind: ExprKind::Var(name), span: start })
        }
      }
      other => Err(CompileError::parse(start, crate::error::expected("an expression", format!("{other:?}")))),
    }
  }
}

/// Constructors are conventionally capitalized (`Just`, `None`, `Cons`); this
/// lets the parser distinguish `Ctor(args)` from an ordinary function call
/// without a symbol table, deferring the real check to the semantic
/// analyzer (which will reject a capitalized name that isn't actually a
/// constructor).
fn is_ctor_name(name: Symbol) -> bool {
  name.as_str().chars().next().is_some_and(|c| c.is_ascii_uppercase())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::front::lexer::Lexer;

  fn parse(src: &str) -> Program {
    let toks = Lexer::new(src).tokenize().unwrap();
    parse_program(&toks).unwrap()
  }

  #[test]
  fn parses_simple_function() {
    let prog = parse("fn main(): Int { return 1 + 2 * 3; }");
    assert_eq!(prog.decls.len(), 1);
    let Decl::Fn(f) = &prog.decls[0] else { panic!() };
    assert_eq!(f.name.as_str(), "main");
  }

  #[test]
  fn parses_for_range() {
    let prog = parse("fn main() { for i in 1..4 do { print(i); } }");
    let Decl::Fn(f) = &prog.decls[0] else { panic!() };
    assert_eq!(f.body.stmts.len(), 1);
    assert!(matches!(f.body.stmts[0].kind, StmtKind::ForRange { .. }));
  }

  #[test]
  fn parses_match_with_constructor_patterns() {
    let prog = parse("fn f(m: Maybe) { match m { Just(x) => x, None => 0, } }");
    let Decl::Fn(f) = &prog.decls[0] else { panic!() };
    let Some(tail) = &f.body.tail else { panic!("expected tail expr") };
    assert!(matches!(tail.kind, ExprKind::Match(..)));
  }

  #[test]
  fn parser_errors_on_malformed_input() {
    let toks = Lexer::new("fn (").tokenize().unwrap();
    assert!(parse_program(&toks).is_err());
  }

  #[test]
  fn parses_data_decl_with_multiple_constructors() {
    let prog = parse("data Maybe a = Just(a) | None\nfn main() {}");
    let Decl::Data(d) = &prog.decls[0] else { panic!() };
    assert_eq!(d.ctors.len(), 2);
    assert_eq!(d.ctors[0].name.as_str(), "Just");
    assert_eq!(d.ctors[1].name.as_str(), "None");
    assert!(d.ctors[1].members.is_empty());
  }

  #[test]
  fn distinguishes_constructor_call_from_function_call() {
    let prog = parse("fn f() { let x := Just(1); print(x); }");
    let Decl::Fn(f) = &prog.decls[0] else { panic!() };
    // first stmt should fail to parse as LetPattern (no ctor name before
    // `(`) -- instead this is a plain let with a Construct initializer.
    assert!(matches!(f.body.stmts[0].kind, StmtKind::Let { .. } | StmtKind::Expr(_)));
  }
}
