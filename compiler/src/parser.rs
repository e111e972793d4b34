// Parser for raster scripts.
//
// Splits the framed token stream into top-level statements, then parses each
// one with chumsky combinators. A statement that fails to parse is reported
// and dropped; parsing resumes with the next statement.
//
// Preconditions: `source` is the exact text the tokens were lexed from.
// Postconditions: returns the statements that parsed; every lex or syntax
//                 problem is appended to `diags`.
// Failure modes: syntax errors produce `E0002` diagnostics; parsing continues.
// Side effects: none.

use chumsky::error::RichReason;
use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;
use chumsky::span::SimpleSpan;

use crate::ast::*;
use crate::diag::{codes, Diagnostics};
use crate::dialect::Dialect;
use crate::lexer::{self, Token};

/// Lex and parse a script for `dialect`.
pub fn parse(source: &str, dialect: Dialect, diags: &mut Diagnostics) -> Script {
    let lex_result = lexer::lex(source, dialect);
    for e in &lex_result.errors {
        diags.error(e.code, (e.span.start..e.span.end).into(), e.message.clone());
    }

    let tokens: Vec<(Token, SimpleSpan)> = lex_result
        .tokens
        .into_iter()
        .map(|(tok, span)| (tok, (span.start..span.end).into()))
        .collect();

    let chunks = split_statements(&tokens);
    let mut statements = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        if chunk.iter().all(|(t, _)| t.is_terminator()) {
            continue;
        }
        let mut chunk = chunk.to_vec();
        if dialect.eof_terminates() && !is_closed(&chunk) {
            if let Some(&(_, last)) = chunk.last() {
                chunk.push((Token::Newline, (last.end..last.end).into()));
            }
        }
        if let Some(stmt) = parse_statement(source, chunk, diags) {
            statements.push(stmt);
        }
    }

    tracing::debug!(
        tokens = tokens.len(),
        statements = statements.len(),
        "parsed script"
    );

    Script {
        statements,
        span: (0..source.len()).into(),
    }
}

// ── Statement splitting ──
//
// A top-level statement ends at a terminator or a closing brace outside any
// braces, unless the next significant token is `else`. Parentheses are not
// tracked: a stray `;` inside an unclosed group still ends the statement.

fn split_statements(tokens: &[(Token, SimpleSpan)]) -> Vec<&[(Token, SimpleSpan)]> {
    let mut chunks = Vec::new();
    let mut depth: usize = 0;
    let mut start = 0;

    for (i, (tok, _)) in tokens.iter().enumerate() {
        let ends_here = match tok {
            Token::LBrace => {
                depth += 1;
                false
            }
            Token::RBrace => {
                depth = depth.saturating_sub(1);
                depth == 0
            }
            t => t.is_terminator() && depth == 0,
        };
        if ends_here && !followed_by_else(tokens, i) {
            chunks.push(&tokens[start..=i]);
            start = i + 1;
        }
    }
    if start < tokens.len() {
        chunks.push(&tokens[start..]);
    }
    chunks
}

fn followed_by_else(tokens: &[(Token, SimpleSpan)], i: usize) -> bool {
    tokens[i + 1..]
        .iter()
        .find(|(t, _)| *t != Token::Newline)
        .is_some_and(|(t, _)| *t == Token::Else)
}

/// Whether a chunk already ends with a terminator or a closing brace.
fn is_closed(chunk: &[(Token, SimpleSpan)]) -> bool {
    chunk
        .last()
        .is_some_and(|(t, _)| t.is_terminator() || *t == Token::RBrace)
}

fn parse_statement(
    source: &str,
    chunk: Vec<(Token, SimpleSpan)>,
    diags: &mut Diagnostics,
) -> Option<Statement> {
    let eoi: SimpleSpan = chunk
        .last()
        .map(|(_, s)| s.end..s.end)
        .unwrap_or(0..0)
        .into();
    let stream = Stream::from_iter(chunk.into_iter()).map(eoi, |(t, s): (_, _)| (t, s));

    let parser = statement_parser(source);
    let (stmt, errors) = parser.parse(stream).into_output_errors();

    // Only the first error of a statement is meaningful once it has failed.
    if let Some(err) = errors.first() {
        diags.error(codes::E0002, *err.span(), syntax_message(source, err));
        return None;
    }
    stmt
}

fn syntax_message(source: &str, err: &Rich<'_, Token, SimpleSpan>) -> String {
    if let RichReason::Custom(msg) = err.reason() {
        return msg.clone();
    }
    let span = err.span();
    match err.found() {
        None => "unexpected end of statement".to_string(),
        Some(Token::Newline) => "unexpected end of line".to_string(),
        Some(_) => {
            let text = source.get(span.start..span.end).unwrap_or_default();
            format!("unexpected '{text}'")
        }
    }
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr {
        span: join(lhs.span, rhs.span),
        kind: ExprKind::Binary(op, Box::new(lhs), Box::new(rhs)),
    }
}

// ── Grammar ──
//
// All grammar rules are built inside `statement_parser` so that the `source`
// reference is captured once and shared by all combinators.

fn statement_parser<'tokens, 'src: 'tokens, I>(
    source: &'src str,
) -> impl Parser<'tokens, I, Statement, extra::Err<Rich<'tokens, Token, SimpleSpan>>> + 'src
where
    'tokens: 'src,
    I: ValueInput<'tokens, Token = Token, Span = SimpleSpan>,
{
    // ── Identifier ──

    let ident = just(Token::Ident).map_with(move |_, e| {
        let span: SimpleSpan = e.span();
        Ident {
            name: source[span.start..span.end].to_string(),
            span,
        }
    });

    // ── Expressions ──

    let expr = recursive(|expr| {
        let number = select! { Token::Number(n) => n }.map_with(|n, e| Expr {
            kind: ExprKind::Number(n),
            span: e.span(),
        });

        let call = ident
            .clone()
            .then(
                expr.clone()
                    .separated_by(just(Token::Comma))
                    .collect::<Vec<_>>()
                    .delimited_by(just(Token::LParen), just(Token::RParen)),
            )
            .map_with(|(name, args), e| Expr {
                kind: ExprKind::Call { name, args },
                span: e.span(),
            });

        let coord = just(Token::Dollar)
            .or_not()
            .then(expr.clone())
            .map_with(|(dollar, value), e| Coord {
                relative: dollar.is_some(),
                value,
                span: e.span(),
            });

        let selector = coord
            .separated_by(just(Token::Comma))
            .at_least(1)
            .collect::<Vec<_>>()
            .delimited_by(just(Token::LBracket), just(Token::RBracket))
            .map_with(|coords, e| Selector {
                coords,
                span: e.span(),
            });

        let image_read = ident
            .clone()
            .then(selector.repeated().at_least(1).at_most(2).collect::<Vec<_>>())
            .map_with(|(image, selectors), e| Expr {
                kind: ExprKind::ImageRead { image, selectors },
                span: e.span(),
            });

        let name = ident.clone().map(|id| Expr {
            span: id.span,
            kind: ExprKind::Name(id),
        });

        let list = expr
            .clone()
            .separated_by(just(Token::Comma))
            .collect::<Vec<_>>()
            .delimited_by(just(Token::LBracket), just(Token::RBracket))
            .map_with(|items, e| Expr {
                kind: ExprKind::List(items),
                span: e.span(),
            });

        let paren = expr
            .clone()
            .delimited_by(just(Token::LParen), just(Token::RParen))
            .map_with(|inner: Expr, e| Expr {
                kind: inner.kind,
                span: e.span(),
            });

        let atom = choice((number, call, image_read, name, list, paren)).boxed();

        // `^` binds tighter than unary minus and is right-associative.
        let unary = recursive(|unary| {
            let power = atom
                .clone()
                .then(just(Token::Caret).ignore_then(unary).or_not())
                .map(|(base, exponent): (Expr, Option<Expr>)| match exponent {
                    Some(exponent) => binary(BinaryOp::Pow, base, exponent),
                    None => base,
                });

            let prefix = select! {
                Token::Minus => UnaryOp::Neg,
                Token::Plus => UnaryOp::Plus,
                Token::Bang => UnaryOp::Not,
            }
            .map_with(|op, e| (op, e.span()));

            prefix
                .repeated()
                .foldr(power, |(op, span): (UnaryOp, SimpleSpan), rhs: Expr| Expr {
                    span: join(span, rhs.span),
                    kind: ExprKind::Unary(op, Box::new(rhs)),
                })
        })
        .boxed();

        let product_op = select! {
            Token::Star => BinaryOp::Mul,
            Token::Slash => BinaryOp::Div,
            Token::Percent => BinaryOp::Mod,
        };
        let product = unary
            .clone()
            .foldl(product_op.then(unary).repeated(), |lhs, (op, rhs)| {
                binary(op, lhs, rhs)
            })
            .boxed();

        let sum_op = select! {
            Token::Plus => BinaryOp::Add,
            Token::Minus => BinaryOp::Sub,
        };
        let sum = product
            .clone()
            .foldl(sum_op.then(product).repeated(), |lhs, (op, rhs)| {
                binary(op, lhs, rhs)
            })
            .boxed();

        let relation_op = select! {
            Token::Lt => BinaryOp::Lt,
            Token::Le => BinaryOp::Le,
            Token::Gt => BinaryOp::Gt,
            Token::Ge => BinaryOp::Ge,
        };
        let relation = sum
            .clone()
            .foldl(relation_op.then(sum).repeated(), |lhs, (op, rhs)| {
                binary(op, lhs, rhs)
            })
            .boxed();

        let equality_op = select! {
            Token::EqEq => BinaryOp::Eq,
            Token::NotEq => BinaryOp::Ne,
        };
        let equality = relation
            .clone()
            .foldl(equality_op.then(relation).repeated(), |lhs, (op, rhs)| {
                binary(op, lhs, rhs)
            })
            .boxed();

        let and = equality
            .clone()
            .foldl(
                just(Token::AndAnd).to(BinaryOp::And).then(equality).repeated(),
                |lhs, (op, rhs)| binary(op, lhs, rhs),
            )
            .boxed();

        let xor = and
            .clone()
            .foldl(
                just(Token::Xor).to(BinaryOp::Xor).then(and).repeated(),
                |lhs, (op, rhs)| binary(op, lhs, rhs),
            )
            .boxed();

        let or = xor
            .clone()
            .foldl(
                just(Token::OrOr).to(BinaryOp::Or).then(xor).repeated(),
                |lhs, (op, rhs)| binary(op, lhs, rhs),
            )
            .boxed();

        or.then(
            just(Token::Question)
                .ignore_then(expr.clone())
                .then_ignore(just(Token::Colon))
                .then(expr)
                .or_not(),
        )
        .map(|(cond, branches): (Expr, Option<(Expr, Expr)>)| match branches {
            Some((then_value, else_value)) => Expr {
                span: join(cond.span, else_value.span),
                kind: ExprKind::Conditional {
                    cond: Box::new(cond),
                    then_value: Box::new(then_value),
                    else_value: Box::new(else_value),
                },
            },
            None => cond,
        })
    });

    // ── Statements ──

    let term = just(Token::Semi).or(just(Token::Newline)).ignored();

    let assign_op = select! {
        Token::Assign => AssignOp::Set,
        Token::PlusAssign => AssignOp::Add,
        Token::MinusAssign => AssignOp::Sub,
        Token::StarAssign => AssignOp::Mul,
        Token::SlashAssign => AssignOp::Div,
        Token::PercentAssign => AssignOp::Mod,
    };

    let paren_cond = expr
        .clone()
        .delimited_by(just(Token::LParen), just(Token::RParen));

    let stmt = recursive(|stmt| {
        let assign = ident
            .clone()
            .then(assign_op)
            .then(expr.clone())
            .then_ignore(term.clone())
            .map(|((target, op), value)| StatementKind::Assign(Assign { target, op, value }));

        let else_branch = just(Token::Newline)
            .repeated()
            .ignore_then(just(Token::Else))
            .ignore_then(stmt.clone())
            .or_not();

        let if_stmt = just(Token::If)
            .ignore_then(paren_cond.clone())
            .then(stmt.clone())
            .then(else_branch)
            .map(|((cond, then_branch), else_branch)| {
                StatementKind::If(IfStmt {
                    cond,
                    then_branch: Box::new(then_branch),
                    else_branch: else_branch.map(Box::new),
                })
            });

        let while_stmt = just(Token::While)
            .ignore_then(paren_cond.clone())
            .then(stmt.clone())
            .map(|(cond, body)| {
                StatementKind::While(CondLoop {
                    cond,
                    body: Box::new(body),
                })
            });

        let until_stmt = just(Token::Until)
            .ignore_then(paren_cond.clone())
            .then(stmt.clone())
            .map(|(cond, body)| {
                StatementKind::Until(CondLoop {
                    cond,
                    body: Box::new(body),
                })
            });

        let foreach_source = expr
            .clone()
            .then(just(Token::Colon).ignore_then(expr.clone()).or_not())
            .map(|(first, upper)| match upper {
                Some(upper) => ForeachSource::Range(first, upper),
                None => ForeachSource::List(first),
            });

        let foreach = just(Token::Foreach)
            .ignore_then(
                ident
                    .clone()
                    .then_ignore(just(Token::In))
                    .then(foreach_source)
                    .delimited_by(just(Token::LParen), just(Token::RParen)),
            )
            .then(stmt.clone())
            .map(|((var, source), body)| {
                StatementKind::Foreach(Foreach {
                    var,
                    source,
                    body: Box::new(body),
                })
            });

        let breakif = just(Token::BreakIf)
            .ignore_then(paren_cond.clone())
            .then_ignore(term.clone())
            .map(StatementKind::BreakIf);

        let brk = just(Token::Break)
            .then_ignore(term.clone())
            .to(StatementKind::Break);

        let block = stmt
            .map(Some)
            .or(term.clone().to(None))
            .repeated()
            .collect::<Vec<_>>()
            .delimited_by(just(Token::LBrace), just(Token::RBrace))
            .map(|items: Vec<Option<Statement>>| {
                StatementKind::Block(items.into_iter().flatten().collect())
            });

        choice((
            assign, if_stmt, while_stmt, until_stmt, foreach, breakif, brk, block,
        ))
        .map_with(|kind, e| Statement {
            kind,
            span: e.span(),
        })
    });

    // ── Top-level blocks ──

    let image_role = just(Token::Read)
        .to(ImageRole::Source)
        .or(just(Token::Write).to(ImageRole::Destination));

    let image_decl = ident
        .clone()
        .then_ignore(just(Token::Assign))
        .then(image_role)
        .then_ignore(term.clone())
        .map_with(|(name, role), e| Some(ImageDecl {
            name,
            role,
            span: e.span(),
        }));

    let images_block = just(Token::Images)
        .ignore_then(
            image_decl
                .or(term.clone().to(None))
                .repeated()
                .collect::<Vec<_>>()
                .delimited_by(just(Token::LBrace), just(Token::RBrace)),
        )
        .map(|items: Vec<Option<ImageDecl>>| {
            StatementKind::Images(items.into_iter().flatten().collect())
        });

    let named_value = ident
        .clone()
        .then_ignore(just(Token::Assign))
        .then(expr)
        .then_ignore(term.clone())
        .map(|(name, value)| Some(NamedValue { name, value }));

    let named_block = named_value
        .or(term.to(None))
        .repeated()
        .collect::<Vec<_>>()
        .delimited_by(just(Token::LBrace), just(Token::RBrace))
        .map(|items: Vec<Option<NamedValue>>| items.into_iter().flatten().collect::<Vec<_>>());

    let init_block = just(Token::Init)
        .ignore_then(named_block.clone())
        .map(StatementKind::Init);

    let options_block = just(Token::Options)
        .ignore_then(named_block)
        .map(StatementKind::Options);

    choice((images_block, init_block, options_block))
        .map_with(|kind, e| Statement {
            kind,
            span: e.span(),
        })
        .or(stmt)
        .then_ignore(end())
}

// ── Tests ──
