// ABOUTME: Reader module turning Quill source text into S-expressions using nom combinators

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, digit1, hex_digit1, oct_digit1, one_of},
    combinator::{opt, recognize},
    IResult, Parser,
};

use crate::ast::{Ast, LiteralValue, Position};
use crate::error::Diagnostic;
use std::cell::RefCell;
use std::sync::Arc;

// ============================================================================
// Thread-Local Reader Context
// ============================================================================
//
// All nom parsers here receive plain `&str` suffixes of the original source.
// Positions are recovered by comparing the suffix length against the full
// text stored in this context, so the token parsers stay ordinary nom
// combinators without a custom input type.

thread_local! {
    static READER_CTX: RefCell<Option<ReaderContext>> = const { RefCell::new(None) };
}

struct ReaderContext {
    file: Arc<str>,
    total_len: usize,
    /// Byte offset of the first character of each line
    line_starts: Vec<usize>,
    /// Owned copy of the text, for char-accurate column computation
    text: String,
}

fn install_context(text: &str, file: &str) {
    let mut line_starts = vec![0usize];
    for (i, b) in text.bytes().enumerate() {
        if b == b'\n' {
            line_starts.push(i + 1);
        }
    }
    READER_CTX.with(|ctx| {
        *ctx.borrow_mut() = Some(ReaderContext {
            file: Arc::from(file),
            total_len: text.len(),
            line_starts,
            text: text.to_string(),
        });
    });
}

fn clear_context() {
    READER_CTX.with(|ctx| *ctx.borrow_mut() = None);
}

/// Position of the next character of `input` in the original source
fn position_of(input: &str) -> Position {
    READER_CTX.with(|ctx| {
        let ctx = ctx.borrow();
        let ctx = ctx.as_ref().expect("reader context installed by read_program");
        let offset = ctx.total_len - input.len();
        let line_idx = match ctx.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        let line_start = ctx.line_starts[line_idx];
        let column = ctx.text[line_start..offset].chars().count() as u32 + 1;
        Position::new(ctx.file.clone(), line_idx as u32 + 1, column)
    })
}

/// Result type for the structural layer, carrying position-bearing failures
type ReadResult<'a, T> = Result<(&'a str, T), Diagnostic>;

// ============================================================================
// Whitespace and Comments
// ============================================================================

fn is_closer(c: char) -> bool {
    c == ')' || c == ']' || c == '}'
}

/// Skip whitespace, line comments, and elided commas.
///
/// A comma directly followed by whitespace, a closer, or end of input is
/// whitespace (so `(import [a, b])` reads naturally); any other comma is
/// the unquote prefix and is left for `read_expr`.
fn skip_ws(mut input: &str) -> &str {
    loop {
        let start = input;
        input = input.trim_start_matches([' ', '\t', '\r', '\n']);
        if let Some(rest) = input.strip_prefix(';') {
            input = match rest.find('\n') {
                Some(i) => &rest[i..],
                None => &rest[rest.len()..],
            };
            continue;
        }
        if let Some(rest) = input.strip_prefix(',') {
            let next = rest.chars().next();
            if next.is_none() || next.is_some_and(|c| c.is_whitespace() || is_closer(c)) {
                input = rest;
                continue;
            }
        }
        if start == input {
            return input;
        }
    }
}

// ============================================================================
// Token Parsers (nom layer)
// ============================================================================

fn is_symbol_continue(c: char) -> bool {
    c.is_alphanumeric()
        || matches!(
            c,
            '-' | '_' | '?' | '!' | '<' | '>' | '=' | '+' | '*' | '/' | '%' | '.' | ':' | '&' | '|'
        )
}

/// Parse a bare symbol.
///
/// First character is a letter or one of the operator characters; the
/// continuation set additionally allows digits and dots (interop chains).
/// `true`, `false`, and `nil` are folded into literals here.
fn parse_symbol(input: &str) -> IResult<&str, Ast> {
    let pos_input = input;
    let (input, first) = one_of(
        "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ_+-*/%<>=!?&|.:",
    )(input)?;
    let (input, rest) =
        take_while::<_, _, nom::error::Error<_>>(is_symbol_continue)(input).unwrap_or((input, ""));

    let mut name = String::new();
    name.push(first);
    name.push_str(rest);

    let pos = position_of(pos_input);
    let node = match name.as_str() {
        "true" => Ast::literal(LiteralValue::Bool(true), pos),
        "false" => Ast::literal(LiteralValue::Bool(false), pos),
        "nil" | "null" => Ast::literal(LiteralValue::Nil, pos),
        _ => Ast::symbol(name, pos),
    };
    Ok((input, node))
}

fn parse_hex(input: &str) -> IResult<&str, LiteralValue> {
    let (input, digits) = recognize((opt(char('-')), tag("0x"), hex_digit1)).parse(input)?;
    let negative = digits.starts_with('-');
    let body = digits.trim_start_matches('-').trim_start_matches("0x");
    let mut value = i64::from_str_radix(body, 16).map(|v| v as f64).unwrap_or(f64::NAN);
    if negative {
        value = -value;
    }
    Ok((input, LiteralValue::Number(value)))
}

fn parse_octal(input: &str) -> IResult<&str, LiteralValue> {
    let (input, digits) = recognize((opt(char('-')), tag("0o"), oct_digit1)).parse(input)?;
    let negative = digits.starts_with('-');
    let body = digits.trim_start_matches('-').trim_start_matches("0o");
    let mut value = i64::from_str_radix(body, 8).map(|v| v as f64).unwrap_or(f64::NAN);
    if negative {
        value = -value;
    }
    Ok((input, LiteralValue::Number(value)))
}

fn parse_binary(input: &str) -> IResult<&str, LiteralValue> {
    let (input, digits) =
        recognize((opt(char('-')), tag("0b"), take_while1(|c| c == '0' || c == '1')))
            .parse(input)?;
    let negative = digits.starts_with('-');
    let body = digits.trim_start_matches('-').trim_start_matches("0b");
    let mut value = i64::from_str_radix(body, 2).map(|v| v as f64).unwrap_or(f64::NAN);
    if negative {
        value = -value;
    }
    Ok((input, LiteralValue::Number(value)))
}

fn parse_bigint(input: &str) -> IResult<&str, LiteralValue> {
    let (input, digits) = recognize((opt(char('-')), digit1, char('n'))).parse(input)?;
    Ok((
        input,
        LiteralValue::BigInt(digits.trim_end_matches('n').to_string()),
    ))
}

/// Decimal numbers: 42, -42, 3.14, .5, -.5, 1e9, 2.5e-3
fn parse_decimal(input: &str) -> IResult<&str, LiteralValue> {
    let (input, text) = recognize((
        opt(char('-')),
        alt((
            recognize((digit1, opt((char('.'), opt(digit1))))),
            recognize((char('.'), digit1)),
        )),
        opt((one_of("eE"), opt(one_of("+-")), digit1)),
    ))
    .parse(input)?;
    match text.parse::<f64>() {
        Ok(n) => Ok((input, LiteralValue::Number(n))),
        Err(_) => Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Float,
        ))),
    }
}

fn parse_number(input: &str) -> IResult<&str, LiteralValue> {
    alt((parse_hex, parse_octal, parse_binary, parse_bigint, parse_decimal)).parse(input)
}

// ============================================================================
// Strings and Template Interpolation
// ============================================================================

/// Parse a string literal, handling escapes and `${…}` interpolation.
///
/// A plain string yields a literal node; a string containing interpolation
/// yields `(template "part" expr "part" …)`, always starting and ending
/// with a (possibly empty) text part.
fn read_string(input: &str) -> ReadResult<'_, Ast> {
    let open_pos = position_of(input);
    let mut rest = match input.strip_prefix('"') {
        Some(r) => r,
        None => {
            return Err(Diagnostic::parse("expected string", open_pos));
        }
    };

    let mut parts: Vec<Ast> = Vec::new();
    let mut current = String::new();

    loop {
        let mut chars = rest.char_indices();
        let (idx, c) = match chars.next() {
            Some(pair) => pair,
            None => {
                return Err(Diagnostic::parse("unterminated string", open_pos));
            }
        };
        match c {
            '"' => {
                rest = &rest[idx + 1..];
                break;
            }
            '\\' => {
                let escape_pos = position_of(rest);
                let (_, esc) = chars.next().ok_or_else(|| {
                    Diagnostic::parse("unterminated string", open_pos.clone())
                })?;
                let consumed;
                match esc {
                    'n' => {
                        current.push('\n');
                        consumed = 2;
                    }
                    't' => {
                        current.push('\t');
                        consumed = 2;
                    }
                    'r' => {
                        current.push('\r');
                        consumed = 2;
                    }
                    '0' => {
                        current.push('\0');
                        consumed = 2;
                    }
                    '\\' => {
                        current.push('\\');
                        consumed = 2;
                    }
                    '"' => {
                        current.push('"');
                        consumed = 2;
                    }
                    '$' => {
                        current.push('$');
                        consumed = 2;
                    }
                    'u' => {
                        let after = &rest[idx + 2..];
                        let body = after.strip_prefix('{').ok_or_else(|| {
                            Diagnostic::parse("illegal escape: expected \\u{…}", escape_pos.clone())
                        })?;
                        let close = body.find('}').ok_or_else(|| {
                            Diagnostic::parse("illegal escape: unterminated \\u{…}", escape_pos.clone())
                        })?;
                        let code = u32::from_str_radix(&body[..close], 16).map_err(|_| {
                            Diagnostic::parse("illegal escape: bad unicode scalar", escape_pos.clone())
                        })?;
                        let ch = char::from_u32(code).ok_or_else(|| {
                            Diagnostic::parse("illegal escape: bad unicode scalar", escape_pos.clone())
                        })?;
                        current.push(ch);
                        consumed = 2 + 1 + close + 1;
                    }
                    other => {
                        return Err(Diagnostic::parse(
                            format!("illegal escape: \\{}", other),
                            escape_pos,
                        ));
                    }
                }
                rest = &rest[idx + consumed..];
            }
            '$' if rest[idx + 1..].starts_with('{') => {
                let inner = &rest[idx + 2..];
                parts.push(Ast::literal(
                    LiteralValue::Str(std::mem::take(&mut current)),
                    open_pos.clone(),
                ));
                let (after_expr, expr) = read_expr(skip_ws(inner))?;
                let after_expr = skip_ws(after_expr);
                rest = after_expr.strip_prefix('}').ok_or_else(|| {
                    Diagnostic::parse("unterminated interpolation in string", position_of(after_expr))
                })?;
                parts.push(expr);
            }
            _ => {
                current.push(c);
                rest = &rest[idx + c.len_utf8()..];
            }
        }
    }

    if parts.is_empty() {
        return Ok((rest, Ast::literal(LiteralValue::Str(current), open_pos)));
    }

    parts.push(Ast::literal(LiteralValue::Str(current), open_pos.clone()));
    let mut items = vec![Ast::symbol("template", open_pos.clone())];
    items.extend(parts);
    Ok((rest, Ast::list(items, open_pos)))
}

// ============================================================================
// Structural Layer
// ============================================================================

/// Read a delimited sequence up to `closer`, verifying the closing token
fn read_seq<'a>(mut input: &'a str, opener_pos: &Position, closer: char) -> ReadResult<'a, Vec<Ast>> {
    let mut items = Vec::new();
    loop {
        input = skip_ws(input);
        match input.chars().next() {
            None => {
                return Err(Diagnostic::parse(
                    format!("unbalanced delimiter: missing '{}'", closer),
                    opener_pos.clone(),
                ));
            }
            Some(c) if c == closer => {
                return Ok((&input[1..], items));
            }
            Some(c) if is_closer(c) => {
                return Err(Diagnostic::parse(
                    format!("mismatched delimiter: expected '{}', found '{}'", closer, c),
                    position_of(input),
                ));
            }
            Some(_) => {
                let (rest, expr) = read_expr(input)?;
                items.push(expr);
                input = rest;
            }
        }
    }
}

/// Wrap `inner` in a single-head form such as `(quote inner)`
fn read_prefixed<'a>(input: &'a str, skip: usize, head: &str) -> ReadResult<'a, Ast> {
    let pos = position_of(input);
    let (rest, expr) = read_expr(skip_ws(&input[skip..]))?;
    Ok((
        rest,
        Ast::list(vec![Ast::symbol(head, pos.clone()), expr], pos),
    ))
}

/// Read one expression. Callers are expected to have skipped whitespace.
fn read_expr(input: &str) -> ReadResult<'_, Ast> {
    let pos = position_of(input);

    if let Some(c) = input.chars().next() {
        match c {
            '\'' => return read_prefixed(input, 1, "quote"),
            '`' => return read_prefixed(input, 1, "quasiquote"),
            ',' | '~' => {
                if input[1..].starts_with('@') {
                    return read_prefixed(input, 2, "unquote-splicing");
                }
                return read_prefixed(input, 1, "unquote");
            }
            '(' => {
                let (rest, items) = read_seq(&input[1..], &pos, ')')?;
                return Ok((rest, Ast::list(items, pos)));
            }
            '[' => {
                let (rest, items) = read_seq(&input[1..], &pos, ']')?;
                return Ok((rest, Ast::vector(items, pos)));
            }
            '{' => {
                // Map syntax normalizes to a hash-map form; the AST stays
                // four-variant.
                let (rest, items) = read_seq(&input[1..], &pos, '}')?;
                let mut list = vec![Ast::symbol("hash-map", pos.clone())];
                list.extend(items);
                return Ok((rest, Ast::list(list, pos)));
            }
            ')' | ']' | '}' => {
                return Err(Diagnostic::parse(
                    format!("unexpected '{}'", c),
                    pos,
                ));
            }
            '"' => return read_string(input),
            _ => {}
        }
    } else {
        return Err(Diagnostic::parse("unexpected end of input", pos));
    }

    // Spread prefix binds tighter than symbols so `...x` reads as a form
    if let Some(rest) = input.strip_prefix("...") {
        if rest.chars().next().is_some_and(|c| !c.is_whitespace() && !is_closer(c)) {
            let (after, expr) = read_expr(rest)?;
            return Ok((
                after,
                Ast::list(vec![Ast::symbol("...", pos.clone()), expr], pos),
            ));
        }
    }

    if let Ok((rest, value)) = parse_number(input) {
        // A number must stand alone; `42abc` is an invalid literal, not a
        // symbol.
        if rest.chars().next().is_some_and(|c| is_symbol_continue(c) && c != '.') {
            return Err(Diagnostic::parse("invalid number literal", pos));
        }
        return Ok((rest, Ast::literal(value, pos)));
    }

    match parse_symbol(input) {
        Ok((rest, node)) => Ok((rest, node)),
        Err(_) => Err(Diagnostic::parse(
            format!("unexpected character '{}'", input.chars().next().unwrap_or(' ')),
            pos,
        )),
    }
}

// ============================================================================
// Entry Points
// ============================================================================

/// Parse a whole source file into its top-level forms.
///
/// Strips a UTF-8 BOM, ignores a first-line shebang, and guarantees every
/// returned node carries a position in `file`.
pub fn read_program(text: &str, file: &str) -> Result<Vec<Ast>, Diagnostic> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    install_context(text, file);

    let result = (|| {
        let mut input = text;
        if input.starts_with("#!") {
            input = match input.find('\n') {
                Some(i) => &input[i..],
                None => &input[input.len()..],
            };
        }

        let mut forms = Vec::new();
        loop {
            input = skip_ws(input);
            if input.is_empty() {
                return Ok(forms);
            }
            let (rest, expr) = read_expr(input)?;
            forms.push(expr);
            input = rest;
        }
    })();

    clear_context();
    result
}

/// Parse exactly one expression; trailing input is a parse error
pub fn read_one(text: &str, file: &str) -> Result<Ast, Diagnostic> {
    let mut forms = read_program(text, file)?;
    match forms.len() {
        1 => Ok(forms.remove(0)),
        0 => Err(Diagnostic::parse(
            "expected an expression",
            Position::new(Arc::from(file), 1, 1),
        )),
        _ => Err(Diagnostic::parse(
            "unexpected trailing input",
            forms[1].pos().clone(),
        )),
    }
}
