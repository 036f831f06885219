// Copyright 2026 Dredge Contributors
// SPDX-License-Identifier: Apache-2.0

//! Recursive-descent parser for DQL.
//!
//! ```text
//! program        := stmt* result
//! stmt           := "LET" ident "=" expr | ns-call | waitfor
//! result         := "RETURN" expr | for-expr
//! for-expr       := "FOR" ident ("," ident)? ("IN" | "WHILE") expr body
//! body           := (stmt | clause)* result
//! clause         := FILTER | SORT | LIMIT | COLLECT …
//! waitfor        := "WAITFOR" "EVENT" postfix "IN" postfix ("TIMEOUT" postfix)?
//! ```
//!
//! Precedence, loosest first: ternary, OR, AND, NOT, comparison, range
//! (`..`), additive, multiplicative, unary sign, postfix (member access),
//! primary. Comparisons do not chain. WAITFOR operands parse at postfix
//! level so `IN` stays the clause separator rather than the membership
//! operator.

use crate::error::SyntaxError;
use crate::syntax::ast::*;
use crate::syntax::lexer::{self, Keyword, Token, TokenKind};

/// Parse a whole program.
pub fn parse(src: &str) -> Result<Ast, SyntaxError> {
    let tokens = lexer::tokenize(src)?;
    Parser { tokens, index: 0 }.program()
}

struct Parser {
    tokens: Vec<Token>,
    index: usize,
}

impl Parser {
    // ── Token cursor ─────────────────────────────────────────────────────

    fn peek(&self) -> &Token {
        &self.tokens[self.index.min(self.tokens.len() - 1)]
    }

    fn peek2_kind(&self) -> &TokenKind {
        match self.tokens.get(self.index + 1) {
            Some(token) => &token.kind,
            None => &TokenKind::Eof,
        }
    }

    fn bump(&mut self) -> Token {
        let token = self.peek().clone();
        if self.index + 1 < self.tokens.len() {
            self.index += 1;
        }
        token
    }

    fn at(&self, kind: &TokenKind) -> bool {
        self.peek().kind == *kind
    }

    fn at_kw(&self, kw: Keyword) -> bool {
        matches!(self.peek().kind, TokenKind::Keyword(k) if k == kw)
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.at(kind) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn eat_kw(&mut self, kw: Keyword) -> bool {
        if self.at_kw(kw) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<Token, SyntaxError> {
        if self.at(&kind) {
            Ok(self.bump())
        } else {
            Err(self.unexpected(what))
        }
    }

    fn expect_kw(&mut self, kw: Keyword, what: &str) -> Result<(), SyntaxError> {
        if self.eat_kw(kw) {
            Ok(())
        } else {
            Err(self.unexpected(what))
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<Ident, SyntaxError> {
        let pos = self.peek().pos;
        match &self.peek().kind {
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.bump();
                Ok(Ident { name, pos })
            }
            _ => Err(self.unexpected(what)),
        }
    }

    fn unexpected(&self, what: &str) -> SyntaxError {
        SyntaxError::new(
            self.peek().pos,
            format!("expected {what}, found '{}'", self.peek().kind),
        )
    }

    /// An identifier starting a qualified call (`name::` or `name(`).
    fn call_follows(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Ident(_))
            && matches!(
                self.peek2_kind(),
                TokenKind::ColonColon | TokenKind::LParen
            )
    }

    // ── Program structure ────────────────────────────────────────────────

    fn program(mut self) -> Result<Ast, SyntaxError> {
        let mut statements = Vec::new();
        let result = loop {
            if self.at_kw(Keyword::Let) {
                statements.push(self.let_stmt()?);
            } else if self.at_kw(Keyword::Waitfor) {
                let waitfor = self.waitfor()?;
                statements.push(Stmt::Expr(Expr::WaitFor(Box::new(waitfor))));
            } else if self.call_follows() {
                let call = self.ns_call()?;
                statements.push(Stmt::Expr(Expr::Call(call)));
            } else if self.at_kw(Keyword::Return) {
                let pos = self.peek().pos;
                self.bump();
                let value = self.expr()?;
                break ResultExpr::Return { value, pos };
            } else if self.at_kw(Keyword::For) {
                break ResultExpr::For(Box::new(self.for_expr()?));
            } else {
                return Err(self.unexpected("a statement, RETURN, or FOR"));
            }
        };
        if !self.at(&TokenKind::Eof) {
            return Err(self.unexpected("end of input"));
        }
        Ok(Ast { statements, result })
    }

    fn let_stmt(&mut self) -> Result<Stmt, SyntaxError> {
        let pos = self.peek().pos;
        self.expect_kw(Keyword::Let, "LET")?;
        let name = self.expect_ident("a variable name")?;
        self.expect(TokenKind::Assign, "'='")?;
        let value = self.expr()?;
        Ok(Stmt::Let { name, value, pos })
    }

    fn for_expr(&mut self) -> Result<ForExpr, SyntaxError> {
        let pos = self.peek().pos;
        self.expect_kw(Keyword::For, "FOR")?;
        let value_var = self.expect_ident("a loop variable")?;
        let key_var = if self.eat(&TokenKind::Comma) {
            Some(self.expect_ident("a key variable")?)
        } else {
            None
        };

        let source = if self.eat_kw(Keyword::In) {
            ForSource::Iterable(self.expr()?)
        } else if self.eat_kw(Keyword::While) {
            ForSource::While(self.expr()?)
        } else {
            return Err(self.unexpected("IN or WHILE"));
        };

        let mut body = Vec::new();
        let mut collect_seen = false;
        let result = loop {
            if self.at_kw(Keyword::Let) {
                body.push(ForItem::Stmt(self.let_stmt()?));
            } else if self.at_kw(Keyword::Waitfor) {
                let waitfor = self.waitfor()?;
                body.push(ForItem::Stmt(Stmt::Expr(Expr::WaitFor(Box::new(waitfor)))));
            } else if self.call_follows() {
                let call = self.ns_call()?;
                body.push(ForItem::Stmt(Stmt::Expr(Expr::Call(call))));
            } else if self.at_kw(Keyword::Filter)
                || self.at_kw(Keyword::Sort)
                || self.at_kw(Keyword::Limit)
                || self.at_kw(Keyword::Collect)
            {
                // COLLECT closes the clause list: it rebinds the scope to
                // group variables, so no further clause can apply.
                if collect_seen {
                    return Err(SyntaxError::new(
                        self.peek().pos,
                        format!("'{}' cannot follow COLLECT", self.peek().kind),
                    ));
                }
                body.push(ForItem::Clause(self.clause(&mut collect_seen)?));
            } else if self.at_kw(Keyword::Return) {
                let pos = self.peek().pos;
                self.bump();
                let value = self.expr()?;
                break ResultExpr::Return { value, pos };
            } else if self.at_kw(Keyword::For) {
                break ResultExpr::For(Box::new(self.for_expr()?));
            } else {
                return Err(self.unexpected("a statement, clause, RETURN, or FOR"));
            }
        };

        Ok(ForExpr {
            value_var,
            key_var,
            source,
            body,
            result,
            pos,
        })
    }

    fn clause(&mut self, collect_seen: &mut bool) -> Result<Clause, SyntaxError> {
        let pos = self.peek().pos;
        if self.eat_kw(Keyword::Filter) {
            return Ok(Clause::Filter {
                cond: self.expr()?,
                pos,
            });
        }
        if self.eat_kw(Keyword::Sort) {
            let mut keys = Vec::new();
            loop {
                let expr = self.expr()?;
                let descending = if self.eat_kw(Keyword::Desc) {
                    true
                } else {
                    self.eat_kw(Keyword::Asc);
                    false
                };
                keys.push(SortKey { expr, descending });
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            return Ok(Clause::Sort { keys, pos });
        }
        if self.eat_kw(Keyword::Limit) {
            let first = self.expr()?;
            let (offset, count) = if self.eat(&TokenKind::Comma) {
                (Some(first), self.expr()?)
            } else {
                (None, first)
            };
            return Ok(Clause::Limit { offset, count, pos });
        }

        self.expect_kw(Keyword::Collect, "a clause")?;
        *collect_seen = true;
        Ok(Clause::Collect(self.collect_spec(pos)?))
    }

    fn collect_spec(&mut self, pos: Pos) -> Result<CollectClause, SyntaxError> {
        let mut clause = CollectClause {
            groups: Vec::new(),
            into: None,
            count_into: None,
            aggregates: Vec::new(),
            pos,
        };

        if self.at_kw(Keyword::With) {
            clause.count_into = Some(self.with_count_into()?);
            return Ok(clause);
        }
        if self.eat_kw(Keyword::Aggregate) {
            clause.aggregates = self.aggregate_list()?;
            return Ok(clause);
        }

        loop {
            let name = self.expect_ident("a group variable")?;
            self.expect(TokenKind::Assign, "'='")?;
            let key = self.expr()?;
            clause.groups.push((name, key));
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }

        if self.eat_kw(Keyword::Aggregate) {
            clause.aggregates = self.aggregate_list()?;
        } else {
            if self.eat_kw(Keyword::Into) {
                clause.into = Some(self.expect_ident("a variable name after INTO")?);
            }
            if self.at_kw(Keyword::With) {
                clause.count_into = Some(self.with_count_into()?);
            }
        }
        Ok(clause)
    }

    fn with_count_into(&mut self) -> Result<Ident, SyntaxError> {
        self.expect_kw(Keyword::With, "WITH")?;
        self.expect_kw(Keyword::Count, "COUNT")?;
        self.expect_kw(Keyword::Into, "INTO")?;
        self.expect_ident("a variable name after INTO")
    }

    fn aggregate_list(&mut self) -> Result<Vec<Aggregate>, SyntaxError> {
        let mut aggregates = Vec::new();
        loop {
            let name = self.expect_ident("an aggregate variable")?;
            self.expect(TokenKind::Assign, "'='")?;
            if !self.call_follows() {
                return Err(self.unexpected("a function call"));
            }
            let call = self.ns_call()?;
            aggregates.push(Aggregate { name, call });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        Ok(aggregates)
    }

    fn waitfor(&mut self) -> Result<WaitForExpr, SyntaxError> {
        let pos = self.peek().pos;
        self.expect_kw(Keyword::Waitfor, "WAITFOR")?;
        self.expect_kw(Keyword::Event, "EVENT")?;
        let event = self.postfix_expr()?;
        self.expect_kw(Keyword::In, "IN")?;
        let source = self.postfix_expr()?;
        let timeout = if self.eat_kw(Keyword::Timeout) {
            Some(self.postfix_expr()?)
        } else {
            None
        };
        Ok(WaitForExpr {
            event,
            source,
            timeout,
            pos,
        })
    }

    // ── Expressions ──────────────────────────────────────────────────────

    fn expr(&mut self) -> Result<Expr, SyntaxError> {
        self.ternary()
    }

    fn ternary(&mut self) -> Result<Expr, SyntaxError> {
        let cond = self.or_expr()?;
        if !self.eat(&TokenKind::Question) {
            return Ok(cond);
        }
        let pos = cond.pos();
        let then = if self.at(&TokenKind::Colon) {
            None
        } else {
            Some(Box::new(self.expr()?))
        };
        self.expect(TokenKind::Colon, "':'")?;
        let otherwise = Box::new(self.expr()?);
        Ok(Expr::Ternary {
            cond: Box::new(cond),
            then,
            otherwise,
            pos,
        })
    }

    fn or_expr(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.and_expr()?;
        while self.at(&TokenKind::OrOr) || self.at_kw(Keyword::Or) {
            self.bump();
            let right = self.and_expr()?;
            left = binary(BinaryOp::Or, left, right);
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.not_expr()?;
        while self.at(&TokenKind::AndAnd) || self.at_kw(Keyword::And) {
            self.bump();
            let right = self.not_expr()?;
            left = binary(BinaryOp::And, left, right);
        }
        Ok(left)
    }

    fn not_expr(&mut self) -> Result<Expr, SyntaxError> {
        // A NOT here is prefix negation unless it spells NOT IN / NOT LIKE,
        // which belong to the comparison below.
        let prefix_not = self.at(&TokenKind::Bang)
            || (self.at_kw(Keyword::Not)
                && !matches!(
                    self.peek2_kind(),
                    TokenKind::Keyword(Keyword::In) | TokenKind::Keyword(Keyword::Like)
                ));
        if prefix_not {
            let pos = self.peek().pos;
            self.bump();
            let operand = Box::new(self.not_expr()?);
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand,
                pos,
            });
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, SyntaxError> {
        let left = self.range_expr()?;
        let op = match &self.peek().kind {
            TokenKind::Eq => BinaryOp::Eq,
            TokenKind::Ne => BinaryOp::Ne,
            TokenKind::Lt => BinaryOp::Lt,
            TokenKind::Gt => BinaryOp::Gt,
            TokenKind::Le => BinaryOp::Le,
            TokenKind::Ge => BinaryOp::Ge,
            TokenKind::RegexMatch => BinaryOp::RegexMatch,
            TokenKind::RegexNotMatch => BinaryOp::RegexNotMatch,
            TokenKind::Keyword(Keyword::In) => BinaryOp::In,
            TokenKind::Keyword(Keyword::Like) => BinaryOp::Like,
            TokenKind::Keyword(Keyword::Not) => {
                self.bump();
                if self.eat_kw(Keyword::In) {
                    BinaryOp::NotIn
                } else if self.eat_kw(Keyword::Like) {
                    BinaryOp::NotLike
                } else {
                    return Err(self.unexpected("IN or LIKE after NOT"));
                }
                // Operator tokens already consumed.
            }
            _ => return Ok(left),
        };
        if !matches!(op, BinaryOp::NotIn | BinaryOp::NotLike) {
            self.bump();
        }
        let right = self.range_expr()?;
        Ok(binary(op, left, right))
    }

    fn range_expr(&mut self) -> Result<Expr, SyntaxError> {
        let start = self.additive()?;
        if !self.eat(&TokenKind::DotDot) {
            return Ok(start);
        }
        let pos = start.pos();
        let end = self.additive()?;
        Ok(Expr::Range {
            start: Box::new(start),
            end: Box::new(end),
            pos,
        })
    }

    fn additive(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.multiplicative()?;
        loop {
            let op = match &self.peek().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.bump();
            let right = self.multiplicative()?;
            left = binary(op, left, right);
        }
    }

    fn multiplicative(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.unary()?;
        loop {
            let op = match &self.peek().kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Mod,
                _ => return Ok(left),
            };
            self.bump();
            let right = self.unary()?;
            left = binary(op, left, right);
        }
    }

    fn unary(&mut self) -> Result<Expr, SyntaxError> {
        let op = match &self.peek().kind {
            TokenKind::Minus => UnaryOp::Minus,
            TokenKind::Plus => UnaryOp::Plus,
            _ => return self.postfix_expr(),
        };
        let pos = self.peek().pos;
        self.bump();
        let operand = Box::new(self.unary()?);
        Ok(Expr::Unary { op, operand, pos })
    }

    fn postfix_expr(&mut self) -> Result<Expr, SyntaxError> {
        let mut expr = self.primary()?;
        loop {
            if self.eat(&TokenKind::Dot) {
                let prop = self.expect_ident("a property name")?;
                let pos = expr.pos();
                expr = Expr::Member {
                    target: Box::new(expr),
                    key: MemberKey::Name(prop.name),
                    pos,
                };
            } else if self.eat(&TokenKind::LBracket) {
                let key = self.expr()?;
                self.expect(TokenKind::RBracket, "']'")?;
                let pos = expr.pos();
                expr = Expr::Member {
                    target: Box::new(expr),
                    key: MemberKey::Computed(Box::new(key)),
                    pos,
                };
            } else {
                return Ok(expr);
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, SyntaxError> {
        let token = self.peek().clone();
        let pos = token.pos;
        match token.kind {
            TokenKind::Keyword(Keyword::None) | TokenKind::Keyword(Keyword::Null) => {
                self.bump();
                Ok(Expr::None(pos))
            }
            TokenKind::Keyword(Keyword::True) => {
                self.bump();
                Ok(Expr::Bool(true, pos))
            }
            TokenKind::Keyword(Keyword::False) => {
                self.bump();
                Ok(Expr::Bool(false, pos))
            }
            TokenKind::Int(i) => {
                self.bump();
                Ok(Expr::Int(i, pos))
            }
            TokenKind::Float(x) => {
                self.bump();
                Ok(Expr::Float(x, pos))
            }
            TokenKind::Str(s) => {
                self.bump();
                Ok(Expr::String(s, pos))
            }
            TokenKind::At => {
                self.bump();
                let name = self.expect_ident("a parameter name")?;
                Ok(Expr::Param {
                    name: name.name,
                    pos,
                })
            }
            TokenKind::LBracket => self.array_literal(pos),
            TokenKind::LBrace => self.object_literal(pos),
            TokenKind::Ident(name) => {
                if self.call_follows() {
                    Ok(Expr::Call(self.ns_call()?))
                } else {
                    self.bump();
                    Ok(Expr::Var(Ident { name, pos }))
                }
            }
            TokenKind::LParen => {
                self.bump();
                let inner = if self.at_kw(Keyword::For) {
                    Expr::For(Box::new(self.for_expr()?))
                } else if self.at_kw(Keyword::Waitfor) {
                    Expr::WaitFor(Box::new(self.waitfor()?))
                } else {
                    self.expr()?
                };
                self.expect(TokenKind::RParen, "')'")?;
                Ok(inner)
            }
            _ => Err(self.unexpected("an expression")),
        }
    }

    fn ns_call(&mut self) -> Result<CallExpr, SyntaxError> {
        let first = self.expect_ident("a function name")?;
        let pos = first.pos;
        let mut function = first.name;
        while self.eat(&TokenKind::ColonColon) {
            let segment = self.expect_ident("a name after '::'")?;
            function.push_str("::");
            function.push_str(&segment.name);
        }
        self.expect(TokenKind::LParen, "'('")?;
        let mut args = Vec::new();
        if !self.at(&TokenKind::RParen) {
            loop {
                args.push(self.expr()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "')'")?;
        Ok(CallExpr {
            function,
            args,
            pos,
        })
    }

    fn array_literal(&mut self, pos: Pos) -> Result<Expr, SyntaxError> {
        self.expect(TokenKind::LBracket, "'['")?;
        let mut items = Vec::new();
        while !self.at(&TokenKind::RBracket) {
            items.push(self.expr()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RBracket, "']'")?;
        Ok(Expr::Array { items, pos })
    }

    fn object_literal(&mut self, pos: Pos) -> Result<Expr, SyntaxError> {
        self.expect(TokenKind::LBrace, "'{'")?;
        let mut entries = Vec::new();
        while !self.at(&TokenKind::RBrace) {
            entries.push(self.object_prop()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RBrace, "'}'")?;
        Ok(Expr::Object { entries, pos })
    }

    fn object_prop(&mut self) -> Result<(PropKey, Expr), SyntaxError> {
        match self.peek().kind.clone() {
            TokenKind::Str(key) => {
                self.bump();
                self.expect(TokenKind::Colon, "':'")?;
                Ok((PropKey::Name(key), self.expr()?))
            }
            TokenKind::LBracket => {
                self.bump();
                let key = self.expr()?;
                self.expect(TokenKind::RBracket, "']'")?;
                self.expect(TokenKind::Colon, "':'")?;
                Ok((PropKey::Computed(key), self.expr()?))
            }
            TokenKind::Ident(name) => {
                let pos = self.peek().pos;
                self.bump();
                if self.eat(&TokenKind::Colon) {
                    Ok((PropKey::Name(name), self.expr()?))
                } else {
                    // Shorthand `{x}` binds the property to the variable x.
                    let value = Expr::Var(Ident {
                        name: name.clone(),
                        pos,
                    });
                    Ok((PropKey::Name(name), value))
                }
            }
            _ => Err(self.unexpected("an object property")),
        }
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    let pos = left.pos();
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
        pos,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_let_then_return() {
        let ast = parse("LET x = 1 RETURN x").unwrap();
        assert_eq!(ast.statements.len(), 1);
        match &ast.statements[0] {
            Stmt::Let { name, value, .. } => {
                assert_eq!(name.name, "x");
                assert!(matches!(value, Expr::Int(1, _)));
            }
            other => panic!("expected LET, got {other:?}"),
        }
        assert!(matches!(
            ast.result,
            ResultExpr::Return {
                value: Expr::Var(_),
                ..
            }
        ));
    }

    #[test]
    fn test_precedence_mul_over_add() {
        let ast = parse("RETURN 1 + 2 * 2").unwrap();
        let ResultExpr::Return { value, .. } = ast.result else {
            panic!("expected RETURN");
        };
        match value {
            Expr::Binary {
                op: BinaryOp::Add,
                right,
                ..
            } => assert!(matches!(
                *right,
                Expr::Binary {
                    op: BinaryOp::Mul,
                    ..
                }
            )),
            other => panic!("expected Add at the top, got {other:?}"),
        }
    }

    #[test]
    fn test_ternary() {
        let ast = parse("RETURN TRUE ? 1 : 2").unwrap();
        let ResultExpr::Return { value, .. } = ast.result else {
            panic!()
        };
        assert!(matches!(value, Expr::Ternary { then: Some(_), .. }));
    }

    #[test]
    fn test_elvis_parses_without_then_arm() {
        let ast = parse("RETURN 0 ?: 2").unwrap();
        let ResultExpr::Return { value, .. } = ast.result else {
            panic!()
        };
        assert!(matches!(value, Expr::Ternary { then: None, .. }));
    }

    #[test]
    fn test_not_in_is_one_operator() {
        let ast = parse("RETURN 1 NOT IN [1]").unwrap();
        let ResultExpr::Return { value, .. } = ast.result else {
            panic!()
        };
        assert!(matches!(
            value,
            Expr::Binary {
                op: BinaryOp::NotIn,
                ..
            }
        ));

        // Plain NOT stays prefix negation.
        let ast = parse("RETURN NOT TRUE").unwrap();
        let ResultExpr::Return { value, .. } = ast.result else {
            panic!()
        };
        assert!(matches!(
            value,
            Expr::Unary {
                op: UnaryOp::Not,
                ..
            }
        ));
    }

    #[test]
    fn test_range_operator() {
        let ast = parse("FOR i IN 1..3 RETURN i").unwrap();
        let ResultExpr::For(f) = ast.result else {
            panic!()
        };
        assert!(matches!(f.source, ForSource::Iterable(Expr::Range { .. })));
    }

    #[test]
    fn test_for_with_clauses() {
        let ast = parse(
            "FOR u, k IN users \
               LET n = u.name \
               FILTER n != NONE \
               SORT n DESC \
               LIMIT 2, 5 \
               RETURN n",
        )
        .unwrap();
        let ResultExpr::For(f) = ast.result else {
            panic!()
        };
        assert_eq!(f.value_var.name, "u");
        assert_eq!(f.key_var.as_ref().map(|k| k.name.as_str()), Some("k"));
        assert_eq!(f.body.len(), 4);
        assert!(matches!(
            &f.body[3],
            ForItem::Clause(Clause::Limit {
                offset: Some(_),
                ..
            })
        ));
    }

    #[test]
    fn test_collect_variants() {
        let ast = parse("FOR u IN users COLLECT c = u.city INTO members WITH COUNT INTO n RETURN n")
            .unwrap();
        let ResultExpr::For(f) = ast.result else {
            panic!()
        };
        let ForItem::Clause(Clause::Collect(collect)) = &f.body[0] else {
            panic!("expected COLLECT clause");
        };
        assert_eq!(collect.groups.len(), 1);
        assert_eq!(collect.into.as_ref().map(|i| i.name.as_str()), Some("members"));
        assert_eq!(collect.count_into.as_ref().map(|i| i.name.as_str()), Some("n"));

        let ast = parse("FOR u IN users COLLECT AGGREGATE total = MATH::SUM(u.age) RETURN total")
            .unwrap();
        let ResultExpr::For(f) = ast.result else {
            panic!()
        };
        let ForItem::Clause(Clause::Collect(collect)) = &f.body[0] else {
            panic!("expected COLLECT clause");
        };
        assert!(collect.groups.is_empty());
        assert_eq!(collect.aggregates.len(), 1);
        assert_eq!(collect.aggregates[0].call.function, "MATH::SUM");
    }

    #[test]
    fn test_clause_after_collect_rejected() {
        let err = parse("FOR u IN users COLLECT c = u.city FILTER c RETURN c").unwrap_err();
        assert!(err.message.contains("cannot follow COLLECT"));
    }

    #[test]
    fn test_waitfor_event_in_does_not_bind_membership() {
        let ast = parse(r#"LET res = (WAITFOR EVENT "event" IN obj TIMEOUT 100) RETURN res"#)
            .unwrap();
        let Stmt::Let { value, .. } = &ast.statements[0] else {
            panic!()
        };
        let Expr::WaitFor(w) = value else {
            panic!("expected WAITFOR, got {value:?}");
        };
        assert!(matches!(w.event, Expr::String(_, _)));
        assert!(matches!(w.source, Expr::Var(_)));
        assert!(matches!(w.timeout, Some(Expr::Int(100, _))));
    }

    #[test]
    fn test_waitfor_statement_form() {
        let ast = parse(r#"WAITFOR EVENT "ready" IN page RETURN TRUE"#).unwrap();
        assert_eq!(ast.statements.len(), 1);
        assert!(matches!(&ast.statements[0], Stmt::Expr(Expr::WaitFor(_))));
    }

    #[test]
    fn test_object_literal_forms() {
        let ast = parse(r#"LET v = 1 RETURN {a: v, "b": 2, [CONCAT("c", "")]: 3, v}"#).unwrap();
        let ResultExpr::Return { value, .. } = ast.result else {
            panic!()
        };
        let Expr::Object { entries, .. } = value else {
            panic!("expected object literal");
        };
        assert_eq!(entries.len(), 4);
        assert!(matches!(&entries[2].0, PropKey::Computed(_)));
        assert!(matches!(&entries[3].1, Expr::Var(_)));
    }

    #[test]
    fn test_nested_for_result() {
        let ast = parse("FOR arr IN pages FOR item IN arr RETURN item").unwrap();
        let ResultExpr::For(outer) = ast.result else {
            panic!()
        };
        assert!(matches!(outer.result, ResultExpr::For(_)));
    }

    #[test]
    fn test_trailing_tokens_rejected() {
        let err = parse("RETURN 1 2").unwrap_err();
        assert!(err.message.contains("expected end of input"));
    }

    #[test]
    fn test_missing_result_rejected() {
        let err = parse("LET x = 1").unwrap_err();
        assert!(err.message.contains("expected a statement"));
    }
}
