//! Operator-precedence expression evaluator (spec §4.2).
//!
//! Works directly over the token byte stream produced by `token.rs`.
//! There is no intermediate AST. Precedence, loosest to tightest:
//! `OR` > `AND` > `NOT` > comparison > `+`/`-` > `*`/`/` > unary sign >
//! `^` (right-associative). Two-byte comparisons (`<=`, `>=`, `<>`) are
//! recognized by a one-token lookahead rather than tokenized as a
//! combined byte (spec §9's "reference choice is pairwise lookahead").

use crate::array::ArrayTable;
use crate::error::BasicError;
use crate::memory::MemoryImage;
use crate::screen::Screen;
use crate::strheap::{self, StringDescriptor};
use crate::token::*;
use crate::value::Value;
use crate::vars::{canonical_name, ScalarTable, Slot};

/// A user function defined by `DEF FN` (spec §4.6): a single parameter
/// and a body expression, evaluated in the caller's variable scope with
/// the parameter temporarily rebound.
#[derive(Debug, Clone)]
pub struct UserFunction {
    pub param: String,
    pub body: Vec<u8>,
}

#[derive(Default)]
pub struct FunctionTable {
    functions: std::collections::HashMap<String, UserFunction>,
}

impl FunctionTable {
    pub fn new() -> Self {
        FunctionTable {
            functions: std::collections::HashMap::new(),
        }
    }

    pub fn define(&mut self, name: &str, func: UserFunction) {
        self.functions.insert(canonical_name(name), func);
    }

    pub fn get(&self, name: &str) -> Option<&UserFunction> {
        self.functions.get(&canonical_name(name))
    }

    pub fn clear(&mut self) {
        self.functions.clear();
    }
}

/// Everything the evaluator needs mutable access to. Borrowed as
/// separate fields (not one `&mut Interpreter`) so the caller can still
/// hold other parts of the interpreter live across the call.
pub struct EvalContext<'a> {
    pub image: &'a mut MemoryImage,
    pub scalars: &'a mut ScalarTable,
    pub arrays: &'a mut ArrayTable,
    pub functions: &'a FunctionTable,
    pub rng_state: &'a mut u64,
    /// `TAB(`/`SPC(` are only legal directly inside a `PRINT` list
    /// (spec §4.6); everywhere else they're a syntax error.
    pub in_print: bool,
    /// Lets `POS(x)` read the screen's current cursor column (spec §4.2).
    pub screen: &'a Screen,
    /// How many nested `FN` calls are currently being evaluated (spec
    /// §4.7: recursion is permitted only "to the runtime-stack limit").
    /// Reset to `0` by the caller before each top-level `evaluate()`;
    /// `parse_user_function_call` increments/decrements it around the
    /// body's own recursive evaluation.
    pub fn_depth: usize,
}

type EvalResult = Result<(Value, usize), BasicError>;

/// Arithmetic that escapes finite `f64` range reports `OVERFLOW` (spec
/// §7) instead of silently carrying `inf`/`-inf`/`NaN` through the rest
/// of the expression.
fn checked(n: f64) -> Result<f64, BasicError> {
    if n.is_finite() {
        Ok(n)
    } else {
        Err(BasicError::Overflow)
    }
}

pub fn evaluate(bytes: &[u8], pos: usize, ctx: &mut EvalContext) -> EvalResult {
    parse_or(bytes, pos, ctx)
}

pub(crate) fn skip_spaces(bytes: &[u8], mut pos: usize) -> usize {
    while bytes.get(pos) == Some(&b' ') {
        pos += 1;
    }
    pos
}

fn parse_or(bytes: &[u8], pos: usize, ctx: &mut EvalContext) -> EvalResult {
    let (mut lhs, mut pos) = parse_and(bytes, pos, ctx)?;
    loop {
        let p = skip_spaces(bytes, pos);
        if bytes.get(p) == Some(&TOK_OR) {
            let (rhs, next) = parse_and(bytes, p + 1, ctx)?;
            lhs = Value::Number(bitwise(lhs.as_number()?, rhs.as_number()?, |a, b| a | b)?);
            pos = next;
        } else {
            return Ok((lhs, pos));
        }
    }
}

fn parse_and(bytes: &[u8], pos: usize, ctx: &mut EvalContext) -> EvalResult {
    let (mut lhs, mut pos) = parse_not(bytes, pos, ctx)?;
    loop {
        let p = skip_spaces(bytes, pos);
        if bytes.get(p) == Some(&TOK_AND) {
            let (rhs, next) = parse_not(bytes, p + 1, ctx)?;
            lhs = Value::Number(bitwise(lhs.as_number()?, rhs.as_number()?, |a, b| a & b)?);
            pos = next;
        } else {
            return Ok((lhs, pos));
        }
    }
}

/// 16-bit two's-complement bitwise op, per spec §9's Open Question
/// resolution: operands narrow the same way `POKE`/array subscripts do
/// (`ILLEGAL QUANTITY` on overflow, not `OVERFLOW`).
fn bitwise(a: f64, b: f64, op: impl Fn(i16, i16) -> i16) -> Result<f64, BasicError> {
    let a = Value::Number(a).as_i16()?;
    let b = Value::Number(b).as_i16()?;
    Ok(op(a, b) as f64)
}

fn parse_not(bytes: &[u8], pos: usize, ctx: &mut EvalContext) -> EvalResult {
    let p = skip_spaces(bytes, pos);
    if bytes.get(p) == Some(&TOK_NOT) {
        let (v, next) = parse_not(bytes, p + 1, ctx)?;
        let n = v.as_i16()?;
        return Ok((Value::Number(!n as f64), next));
    }
    parse_comparison(bytes, pos, ctx)
}

#[derive(Clone, Copy)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

fn comparison_op(bytes: &[u8], pos: usize) -> Option<(CmpOp, usize)> {
    match (bytes.get(pos), bytes.get(pos + 1)) {
        (Some(&TOK_LT), Some(&TOK_EQ)) => Some((CmpOp::Le, 2)),
        (Some(&TOK_GT), Some(&TOK_EQ)) => Some((CmpOp::Ge, 2)),
        (Some(&TOK_LT), Some(&TOK_GT)) => Some((CmpOp::Ne, 2)),
        (Some(&TOK_EQ), _) => Some((CmpOp::Eq, 1)),
        (Some(&TOK_LT), _) => Some((CmpOp::Lt, 1)),
        (Some(&TOK_GT), _) => Some((CmpOp::Gt, 1)),
        _ => None,
    }
}

fn parse_comparison(bytes: &[u8], pos: usize, ctx: &mut EvalContext) -> EvalResult {
    let (mut lhs, mut pos) = parse_addition(bytes, pos, ctx)?;
    loop {
        let p = skip_spaces(bytes, pos);
        match comparison_op(bytes, p) {
            Some((op, len)) => {
                let (rhs, next) = parse_addition(bytes, p + len, ctx)?;
                lhs = Value::Number(compare(&lhs, &rhs, op)?);
                pos = next;
            }
            None => return Ok((lhs, pos)),
        }
    }
}

/// Comparisons yield `1.0` for true, `0.0` for false (spec §4.2, unlike
/// the real ROM's `-1`/`0`).
fn compare(lhs: &Value, rhs: &Value, op: CmpOp) -> Result<f64, BasicError> {
    let flag = match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => match op {
            CmpOp::Eq => a == b,
            CmpOp::Ne => a != b,
            CmpOp::Lt => a < b,
            CmpOp::Le => a <= b,
            CmpOp::Gt => a > b,
            CmpOp::Ge => a >= b,
        },
        (Value::Str(a), Value::Str(b)) => match op {
            CmpOp::Eq => a == b,
            CmpOp::Ne => a != b,
            CmpOp::Lt => a < b,
            CmpOp::Le => a <= b,
            CmpOp::Gt => a > b,
            CmpOp::Ge => a >= b,
        },
        _ => return Err(BasicError::TypeMismatch),
    };
    Ok(if flag { 1.0 } else { 0.0 })
}

fn parse_addition(bytes: &[u8], pos: usize, ctx: &mut EvalContext) -> EvalResult {
    let (mut lhs, mut pos) = parse_multiplication(bytes, pos, ctx)?;
    loop {
        let p = skip_spaces(bytes, pos);
        match bytes.get(p) {
            Some(&TOK_PLUS) => {
                let (rhs, next) = parse_multiplication(bytes, p + 1, ctx)?;
                lhs = add(lhs, rhs, ctx)?;
                pos = next;
            }
            Some(&TOK_MINUS) => {
                let (rhs, next) = parse_multiplication(bytes, p + 1, ctx)?;
                lhs = Value::Number(checked(lhs.as_number()? - rhs.as_number()?)?);
                pos = next;
            }
            _ => return Ok((lhs, pos)),
        }
    }
}

/// `+` is overloaded: numeric addition, or string concatenation if both
/// sides are strings (spec §4.2). Concatenation allocates on the heap.
fn add(lhs: Value, rhs: Value, ctx: &mut EvalContext) -> Result<Value, BasicError> {
    match (&lhs, &rhs) {
        (Value::Number(a), Value::Number(b)) => Ok(Value::Number(checked(a + b)?)),
        (Value::Str(a), Value::Str(b)) => {
            let mut combined = String::with_capacity(a.len() + b.len());
            combined.push_str(a);
            combined.push_str(b);
            if combined.len() > crate::value::MAX_STRING_LEN {
                return Err(BasicError::StringTooLong);
            }
            let desc = alloc_in(ctx, combined.as_bytes())?;
            Ok(Value::Str(String::from_utf8_lossy(desc.read(ctx.image)).into_owned()))
        }
        _ => Err(BasicError::TypeMismatch),
    }
}

fn alloc_in(ctx: &mut EvalContext, bytes: &[u8]) -> Result<StringDescriptor, BasicError> {
    let mut scalar_live = ctx.scalars.live_string_descriptors();
    let mut array_live = ctx.arrays.live_string_descriptors();
    let mut live: Vec<&mut StringDescriptor> = Vec::with_capacity(scalar_live.len() + array_live.len());
    live.append(&mut scalar_live);
    live.append(&mut array_live);
    strheap::alloc(ctx.image, bytes, &mut live)
}

fn parse_multiplication(bytes: &[u8], pos: usize, ctx: &mut EvalContext) -> EvalResult {
    let (mut lhs, mut pos) = parse_unary(bytes, pos, ctx)?;
    loop {
        let p = skip_spaces(bytes, pos);
        match bytes.get(p) {
            Some(&TOK_STAR) => {
                let (rhs, next) = parse_unary(bytes, p + 1, ctx)?;
                lhs = Value::Number(checked(lhs.as_number()? * rhs.as_number()?)?);
                pos = next;
            }
            Some(&TOK_SLASH) => {
                let (rhs, next) = parse_unary(bytes, p + 1, ctx)?;
                let divisor = rhs.as_number()?;
                if divisor == 0.0 {
                    return Err(BasicError::DivisionByZero);
                }
                lhs = Value::Number(checked(lhs.as_number()? / divisor)?);
                pos = next;
            }
            _ => return Ok((lhs, pos)),
        }
    }
}

fn parse_unary(bytes: &[u8], pos: usize, ctx: &mut EvalContext) -> EvalResult {
    let p = skip_spaces(bytes, pos);
    match bytes.get(p) {
        Some(&TOK_MINUS) => {
            let (v, next) = parse_unary(bytes, p + 1, ctx)?;
            Ok((Value::Number(-v.as_number()?), next))
        }
        Some(&TOK_PLUS) => parse_unary(bytes, p + 1, ctx),
        _ => parse_power(bytes, pos, ctx),
    }
}

/// `^` is right-associative, so the exponent recurses back into
/// `parse_unary` rather than `parse_power` (letting `2^-3` parse).
fn parse_power(bytes: &[u8], pos: usize, ctx: &mut EvalContext) -> EvalResult {
    let (lhs, pos) = parse_primary(bytes, pos, ctx)?;
    let p = skip_spaces(bytes, pos);
    if bytes.get(p) == Some(&TOK_CARET) {
        let (rhs, next) = parse_unary(bytes, p + 1, ctx)?;
        let base = lhs.as_number()?;
        let exponent = rhs.as_number()?;
        if base == 0.0 && exponent < 0.0 {
            return Err(BasicError::IllegalQuantity);
        }
        Ok((Value::Number(checked(base.powf(exponent))?), next))
    } else {
        Ok((lhs, pos))
    }
}

fn expect(bytes: &[u8], pos: usize, b: u8) -> Result<usize, BasicError> {
    let p = skip_spaces(bytes, pos);
    if bytes.get(p) == Some(&b) {
        Ok(p + 1)
    } else {
        Err(BasicError::SyntaxError)
    }
}

fn read_number(bytes: &[u8], pos: usize) -> Result<(f64, usize), BasicError> {
    let start = pos;
    let mut i = pos;
    while bytes.get(i).map_or(false, |b| b.is_ascii_digit()) {
        i += 1;
    }
    if bytes.get(i) == Some(&b'.') {
        i += 1;
        while bytes.get(i).map_or(false, |b| b.is_ascii_digit()) {
            i += 1;
        }
    }
    if matches!(bytes.get(i), Some(b'E') | Some(b'e')) {
        let mut j = i + 1;
        if matches!(bytes.get(j), Some(b'+') | Some(b'-')) {
            j += 1;
        }
        if bytes.get(j).map_or(false, |b| b.is_ascii_digit()) {
            while bytes.get(j).map_or(false, |b| b.is_ascii_digit()) {
                j += 1;
            }
            i = j;
        }
    }
    if i == start {
        return Err(BasicError::SyntaxError);
    }
    let text = std::str::from_utf8(&bytes[start..i]).map_err(|_| BasicError::SyntaxError)?;
    let n: f64 = text.parse().map_err(|_| BasicError::SyntaxError)?;
    Ok((n, i))
}

pub(crate) fn read_string_literal(bytes: &[u8], pos: usize) -> Result<(String, usize), BasicError> {
    if bytes.get(pos) != Some(&QUOTE) {
        return Err(BasicError::SyntaxError);
    }
    let mut i = pos + 1;
    let start = i;
    while bytes.get(i).is_some() && bytes[i] != QUOTE {
        i += 1;
    }
    let text = String::from_utf8_lossy(&bytes[start..i]).into_owned();
    let end = if bytes.get(i) == Some(&QUOTE) { i + 1 } else { i };
    Ok((text, end))
}

/// `NAME`, `NAME$`, or a reserved-word function/array access starting
/// at `pos`. Identifiers are not tokenized, so they're scanned raw.
/// Read the `FN` function key: a single letter plus optional `$` (spec
/// §4.7), tokenized directly adjacent to the `FN` token (`FNA`) or after
/// a space (`FN A`) -- never a multi-character name.
pub(crate) fn read_fn_name(bytes: &[u8], pos: usize) -> Option<(String, usize)> {
    let pos = skip_spaces(bytes, pos);
    let &b = bytes.get(pos)?;
    if !b.is_ascii_alphabetic() {
        return None;
    }
    let mut i = pos + 1;
    let mut name = String::new();
    name.push((b as char).to_ascii_uppercase());
    if bytes.get(i) == Some(&b'$') {
        name.push('$');
        i += 1;
    }
    Some((name, i))
}

pub(crate) fn read_identifier(bytes: &[u8], pos: usize) -> Option<(String, usize)> {
    let mut i = pos;
    if !bytes.get(i).map_or(false, |b| b.is_ascii_alphabetic()) {
        return None;
    }
    i += 1;
    while bytes.get(i).map_or(false, |b| b.is_ascii_alphanumeric()) {
        i += 1;
    }
    if bytes.get(i) == Some(&b'$') {
        i += 1;
    }
    let name: String = bytes[pos..i].iter().map(|&b| (b as char).to_ascii_uppercase()).collect();
    Some((name, i))
}

/// Parse a parenthesized, comma-separated argument list.
fn parse_arglist(bytes: &[u8], pos: usize, ctx: &mut EvalContext) -> Result<(Vec<Value>, usize), BasicError> {
    let mut pos = expect(bytes, pos, b'(')?;
    let mut args = Vec::new();
    loop {
        let (v, next) = evaluate(bytes, pos, ctx)?;
        args.push(v);
        pos = skip_spaces(bytes, next);
        match bytes.get(pos) {
            Some(&b',') => pos += 1,
            Some(&b')') => {
                pos += 1;
                break;
            }
            _ => return Err(BasicError::SyntaxError),
        }
    }
    Ok((args, pos))
}

fn parse_primary(bytes: &[u8], pos: usize, ctx: &mut EvalContext) -> EvalResult {
    let pos = skip_spaces(bytes, pos);
    match bytes.get(pos) {
        Some(&b'(') => {
            let (v, next) = evaluate(bytes, pos + 1, ctx)?;
            let next = expect(bytes, next, b')')?;
            Ok((v, next))
        }
        Some(&QUOTE) => {
            let (text, next) = read_string_literal(bytes, pos)?;
            Ok((Value::Str(text), next))
        }
        Some(&b) if b.is_ascii_digit() || b == b'.' => {
            let (n, next) = read_number(bytes, pos)?;
            Ok((Value::Number(n), next))
        }
        Some(&TOK_TAB) => {
            if !ctx.in_print {
                return Err(BasicError::SyntaxError);
            }
            let (v, next) = evaluate(bytes, pos + 1, ctx)?;
            let next = expect(bytes, next, b')')?;
            Ok((Value::Tab(v.as_i16()?), next))
        }
        Some(&TOK_SPC) => {
            if !ctx.in_print {
                return Err(BasicError::SyntaxError);
            }
            let (v, next) = evaluate(bytes, pos + 1, ctx)?;
            let next = expect(bytes, next, b')')?;
            Ok((Value::Spc(v.as_i16()?), next))
        }
        Some(&TOK_FN) => parse_user_function_call(bytes, pos + 1, ctx),
        Some(&tok) if is_builtin_function_token(tok) => parse_builtin_call(bytes, pos, ctx),
        Some(&b) if b.is_ascii_alphabetic() => parse_variable_or_array(bytes, pos, ctx),
        _ => Err(BasicError::SyntaxError),
    }
}

fn parse_variable_or_array(bytes: &[u8], pos: usize, ctx: &mut EvalContext) -> EvalResult {
    let (name, next) = read_identifier(bytes, pos).ok_or(BasicError::SyntaxError)?;
    let p = skip_spaces(bytes, next);
    if bytes.get(p) == Some(&b'(') {
        let (args, after) = parse_arglist(bytes, p, ctx)?;
        let is_string = name.ends_with('$');
        let mut subs = Vec::with_capacity(args.len());
        for a in &args {
            subs.push(a.as_index()?);
        }
        let slot = ctx.arrays.get_slot(&name, &subs, is_string)?;
        let value = match slot {
            Slot::Number(n) => Value::Number(n),
            Slot::Str(desc) => Value::Str(String::from_utf8_lossy(desc.read(ctx.image)).into_owned()),
        };
        Ok((value, after))
    } else {
        Ok((ctx.scalars.get(&name, ctx.image), next))
    }
}

fn parse_user_function_call(bytes: &[u8], pos: usize, ctx: &mut EvalContext) -> EvalResult {
    let (fn_name, next) = read_fn_name(bytes, pos).ok_or(BasicError::SyntaxError)?;
    let func = ctx
        .functions
        .get(&fn_name)
        .cloned()
        .ok_or(BasicError::UndefinedFunction)?;
    let (mut args, after) = parse_arglist(bytes, next, ctx)?;
    if args.len() != 1 {
        return Err(BasicError::SyntaxError);
    }
    let arg = args.remove(0);

    // `FN` calls recurse through the full evaluator (a function body can
    // reference itself or another `FN`), so this is ordinary native Rust
    // recursion with no bound of its own. Cap it at the same depth the
    // `FOR`/`GOSUB` stack uses (spec §4.7's "runtime-stack limit") so a
    // self-referential definition reports `OUT OF MEMORY` instead of
    // overflowing the real process stack.
    if ctx.fn_depth >= crate::stack::MAX_DEPTH {
        return Err(BasicError::OutOfMemory);
    }

    // Save the parameter's current binding, bind the argument, evaluate
    // the body, then restore regardless of whether evaluation succeeded
    // (spec §9's RAII-style save/restore for `DEF FN` scope).
    let saved = ctx.scalars.get(&func.param, ctx.image);
    let bind_result = match &arg {
        Value::Number(n) => ctx.scalars.set_number(&func.param, *n),
        Value::Str(s) => {
            let desc = alloc_in(ctx, s.as_bytes())?;
            ctx.scalars.set_string(&func.param, desc)
        }
        _ => Err(BasicError::TypeMismatch),
    };
    ctx.fn_depth += 1;
    let result = bind_result.and_then(|_| evaluate(&func.body, 0, ctx).map(|(v, _)| v));
    ctx.fn_depth -= 1;

    let restore: Result<(), BasicError> = match &saved {
        Value::Number(n) => ctx.scalars.set_number(&func.param, *n),
        Value::Str(s) => {
            let desc = alloc_in(ctx, s.as_bytes())?;
            ctx.scalars.set_string(&func.param, desc)
        }
        _ => Ok(()),
    };
    restore?;

    Ok((result?, after))
}

fn is_builtin_function_token(tok: u8) -> bool {
    matches!(
        tok,
        t if t == TOK_SGN
            || t == TOK_INT
            || t == TOK_ABS
            || t == TOK_FRE
            || t == TOK_POS
            || t == TOK_SQR
            || t == TOK_RND
            || t == TOK_LOG
            || t == TOK_EXP
            || t == TOK_COS
            || t == TOK_SIN
            || t == TOK_TAN
            || t == TOK_ATN
            || t == TOK_PEEK
            || t == TOK_LEN
            || t == TOK_STR
            || t == TOK_VAL
            || t == TOK_ASC
            || t == TOK_CHR
            || t == TOK_LEFT
            || t == TOK_RIGHT
            || t == TOK_MID
    )
}

fn parse_builtin_call(bytes: &[u8], pos: usize, ctx: &mut EvalContext) -> EvalResult {
    let tok = bytes[pos];
    // FRE and POS accept a dummy argument in real BASIC too; treat them
    // uniformly with the rest rather than special-casing zero args.
    let (args, after) = parse_arglist(bytes, pos + 1, ctx)?;
    let value = call_builtin(tok, &args, ctx)?;
    Ok((value, after))
}

fn call_builtin(tok: u8, args: &[Value], ctx: &mut EvalContext) -> Result<Value, BasicError> {
    macro_rules! num_arg {
        ($i:expr) => {
            args.get($i).ok_or(BasicError::SyntaxError)?.as_number()?
        };
    }
    macro_rules! str_arg {
        ($i:expr) => {
            args.get($i).ok_or(BasicError::SyntaxError)?.as_str()?
        };
    }

    Ok(match tok {
        t if t == TOK_ABS => Value::Number(num_arg!(0).abs()),
        t if t == TOK_INT => Value::Number(num_arg!(0).floor()),
        t if t == TOK_SGN => Value::Number(num_arg!(0).signum_basic()),
        t if t == TOK_SQR => {
            let n = num_arg!(0);
            if n < 0.0 {
                return Err(BasicError::IllegalQuantity);
            }
            Value::Number(n.sqrt())
        }
        t if t == TOK_SIN => Value::Number(num_arg!(0).sin()),
        t if t == TOK_COS => Value::Number(num_arg!(0).cos()),
        t if t == TOK_TAN => Value::Number(num_arg!(0).tan()),
        t if t == TOK_ATN => Value::Number(num_arg!(0).atan()),
        t if t == TOK_LOG => {
            let n = num_arg!(0);
            if n <= 0.0 {
                return Err(BasicError::IllegalQuantity);
            }
            Value::Number(n.ln())
        }
        t if t == TOK_EXP => Value::Number(checked(num_arg!(0).exp())?),
        t if t == TOK_RND => Value::Number(next_random(ctx.rng_state, num_arg!(0))),
        t if t == TOK_FRE => Value::Number((ctx.image.strend() as f64 - ctx.image.fretop() as f64).abs()),
        t if t == TOK_POS => Value::Number(ctx.screen.column() as f64),
        t if t == TOK_LEN => Value::Number(str_arg!(0).len() as f64),
        t if t == TOK_ASC => {
            let s = str_arg!(0);
            let b = s.as_bytes().first().ok_or(BasicError::IllegalQuantity)?;
            Value::Number(*b as f64)
        }
        t if t == TOK_CHR => {
            let n = args.get(0).ok_or(BasicError::SyntaxError)?.as_i16()?;
            if !(0..=255).contains(&n) {
                return Err(BasicError::IllegalQuantity);
            }
            let desc = alloc_in(ctx, &[n as u8])?;
            Value::Str(String::from_utf8_lossy(desc.read(ctx.image)).into_owned())
        }
        t if t == TOK_STR => {
            let n = num_arg!(0);
            let text = crate::value::format_number(n);
            let desc = alloc_in(ctx, text.as_bytes())?;
            Value::Str(String::from_utf8_lossy(desc.read(ctx.image)).into_owned())
        }
        t if t == TOK_VAL => Value::Number(crate::value::parse_numeric_prefix(str_arg!(0))),
        t if t == TOK_PEEK => {
            let addr = args.get(0).ok_or(BasicError::SyntaxError)?.as_index()?;
            Value::Number(ctx.image.peek(addr) as f64)
        }
        t if t == TOK_LEFT => {
            let s = str_arg!(0);
            let n = args.get(1).ok_or(BasicError::SyntaxError)?.as_index()? as usize;
            let n = n.min(s.len());
            let desc = alloc_in(ctx, s.as_bytes()[..n].as_ref())?;
            Value::Str(String::from_utf8_lossy(desc.read(ctx.image)).into_owned())
        }
        t if t == TOK_RIGHT => {
            let s = str_arg!(0);
            let n = args.get(1).ok_or(BasicError::SyntaxError)?.as_index()? as usize;
            let n = n.min(s.len());
            let start = s.len() - n;
            let desc = alloc_in(ctx, s.as_bytes()[start..].as_ref())?;
            Value::Str(String::from_utf8_lossy(desc.read(ctx.image)).into_owned())
        }
        t if t == TOK_MID => {
            let s = str_arg!(0);
            let start = args.get(1).ok_or(BasicError::SyntaxError)?.as_index()? as usize;
            let start = start.saturating_sub(1).min(s.len());
            let len = match args.get(2) {
                Some(v) => v.as_index()? as usize,
                None => s.len() - start,
            };
            let end = (start + len).min(s.len());
            let desc = alloc_in(ctx, s.as_bytes()[start..end].as_ref())?;
            Value::Str(String::from_utf8_lossy(desc.read(ctx.image)).into_owned())
        }
        _ => return Err(BasicError::SyntaxError),
    })
}

trait SignumBasic {
    fn signum_basic(self) -> f64;
}

impl SignumBasic for f64 {
    fn signum_basic(self) -> f64 {
        if self > 0.0 {
            1.0
        } else if self < 0.0 {
            -1.0
        } else {
            0.0
        }
    }
}

/// A small xorshift PRNG standing in for the teacher's `rand`-crate RNG:
/// `RND` needs an externally observable, single `u64` seed word so the
/// interpreter can snapshot/restore it (e.g. across `SAVE`), which
/// `rand::ThreadRng` doesn't support. `seed<=0` reseeds from the current
/// state instead of drawing a new value, matching the reference
/// dialect's `RND(0)`/`RND(negative)` behavior (spec §4.2).
fn next_random(state: &mut u64, seed: f64) -> f64 {
    if seed < 0.0 {
        *state = (seed.to_bits()) ^ 0x9E3779B97F4A7C15;
    }
    *state ^= *state << 13;
    *state ^= *state >> 7;
    *state ^= *state << 17;
    ((*state >> 11) as f64) / ((1u64 << 53) as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::tokenize;

    fn fresh() -> (MemoryImage, ScalarTable, ArrayTable, FunctionTable, u64) {
        (
            MemoryImage::new(0xFFFF),
            ScalarTable::new(),
            ArrayTable::new(),
            FunctionTable::new(),
            0x1234_5678,
        )
    }

    fn eval_str(src: &str) -> Value {
        let (mut image, mut scalars, mut arrays, functions, mut rng) = fresh();
        let screen = crate::screen::Screen::new();
        let tokens = tokenize(src);
        let mut ctx = EvalContext {
            image: &mut image,
            scalars: &mut scalars,
            arrays: &mut arrays,
            functions: &functions,
            rng_state: &mut rng,
            in_print: false,
            screen: &screen,
            fn_depth: 0,
        };
        evaluate(&tokens, 0, &mut ctx).unwrap().0
    }

    #[test]
    fn arithmetic_respects_precedence() {
        assert_eq!(eval_str("2+3*4"), Value::Number(14.0));
        assert_eq!(eval_str("(2+3)*4"), Value::Number(20.0));
    }

    #[test]
    fn exponent_is_right_associative() {
        assert_eq!(eval_str("2^3^2"), Value::Number(512.0));
    }

    #[test]
    fn comparisons_produce_basic_booleans() {
        assert_eq!(eval_str("1<2"), Value::Number(1.0));
        assert_eq!(eval_str("1>2"), Value::Number(0.0));
    }

    #[test]
    fn two_byte_comparison_is_recognized_via_lookahead() {
        assert_eq!(eval_str("3<=3"), Value::Number(1.0));
        assert_eq!(eval_str("3<>3"), Value::Number(0.0));
    }

    #[test]
    fn string_concatenation_allocates_on_the_heap() {
        assert_eq!(eval_str("\"FOO\"+\"BAR\""), Value::Str("FOOBAR".to_string()));
    }

    #[test]
    fn mixed_type_addition_is_type_mismatch() {
        let (mut image, mut scalars, mut arrays, functions, mut rng) = fresh();
        let screen = crate::screen::Screen::new();
        let tokens = tokenize("1+\"A\"");
        let mut ctx = EvalContext {
            image: &mut image,
            scalars: &mut scalars,
            arrays: &mut arrays,
            functions: &functions,
            rng_state: &mut rng,
            in_print: false,
            screen: &screen,
            fn_depth: 0,
        };
        assert_eq!(evaluate(&tokens, 0, &mut ctx).unwrap_err(), BasicError::TypeMismatch);
    }

    #[test]
    fn zero_to_a_negative_power_is_illegal_quantity() {
        let (mut image, mut scalars, mut arrays, functions, mut rng) = fresh();
        let screen = crate::screen::Screen::new();
        let tokens = tokenize("0^-1");
        let mut ctx = EvalContext {
            image: &mut image,
            scalars: &mut scalars,
            arrays: &mut arrays,
            functions: &functions,
            rng_state: &mut rng,
            in_print: false,
            screen: &screen,
            fn_depth: 0,
        };
        assert_eq!(evaluate(&tokens, 0, &mut ctx).unwrap_err(), BasicError::IllegalQuantity);
    }

    #[test]
    fn division_by_zero_errors() {
        let (mut image, mut scalars, mut arrays, functions, mut rng) = fresh();
        let screen = crate::screen::Screen::new();
        let tokens = tokenize("1/0");
        let mut ctx = EvalContext {
            image: &mut image,
            scalars: &mut scalars,
            arrays: &mut arrays,
            functions: &functions,
            rng_state: &mut rng,
            in_print: false,
            screen: &screen,
            fn_depth: 0,
        };
        assert_eq!(evaluate(&tokens, 0, &mut ctx).unwrap_err(), BasicError::DivisionByZero);
    }

    #[test]
    fn result_exceeding_finite_range_is_overflow() {
        let (mut image, mut scalars, mut arrays, functions, mut rng) = fresh();
        let screen = crate::screen::Screen::new();
        let tokens = tokenize("1E300*1E300");
        let mut ctx = EvalContext {
            image: &mut image,
            scalars: &mut scalars,
            arrays: &mut arrays,
            functions: &functions,
            rng_state: &mut rng,
            in_print: false,
            screen: &screen,
            fn_depth: 0,
        };
        assert_eq!(evaluate(&tokens, 0, &mut ctx).unwrap_err(), BasicError::Overflow);
    }

    #[test]
    fn builtin_functions_evaluate() {
        assert_eq!(eval_str("LEN(\"HELLO\")"), Value::Number(5.0));
        assert_eq!(eval_str("ABS(-5)"), Value::Number(5.0));
        assert_eq!(eval_str("LEFT$(\"HELLO\",2)"), Value::Str("HE".to_string()));
        assert_eq!(eval_str("MID$(\"HELLO\",2,3)"), Value::Str("ELL".to_string()));
    }

    #[test]
    fn tab_pseudo_function_fails_outside_print_context() {
        let (mut image, mut scalars, mut arrays, functions, mut rng) = fresh();
        let screen = crate::screen::Screen::new();
        let tokens = tokenize("TAB(5)");
        let mut ctx = EvalContext {
            image: &mut image,
            scalars: &mut scalars,
            arrays: &mut arrays,
            functions: &functions,
            rng_state: &mut rng,
            in_print: false,
            screen: &screen,
            fn_depth: 0,
        };
        assert_eq!(evaluate(&tokens, 0, &mut ctx).unwrap_err(), BasicError::SyntaxError);
    }
}
