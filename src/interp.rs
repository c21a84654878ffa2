//! The statement dispatcher (spec §4.6): ties `token.rs`, `eval.rs`,
//! `vars.rs`, `array.rs`, `strheap.rs`, `program.rs`, `stack.rs`, and
//! `screen.rs` together into one runnable interpreter.
//!
//! Grounded on the teacher's original `basic-emulator` dispatcher shape:
//! one `Interpreter` struct holding every table plus a `step()` entry
//! point the host drives statement-by-statement, with `INPUT` and an
//! external break signal as the two points execution can suspend
//! across `step()` calls (spec §5). Unlike the teacher, there is no
//! separate AST: each statement is parsed and executed directly off the
//! token byte stream, in lock-step with `eval.rs`.

use std::collections::VecDeque;

use crate::array::ArrayTable;
use crate::error::{BasicError, RuntimeError};
use crate::eval::{self, EvalContext, FunctionTable, UserFunction};
use crate::memory::MemoryImage;
use crate::program::Program;
use crate::screen::Screen;
use crate::stack::{ForFrame, RuntimeStack};
use crate::strheap::StringDescriptor;
use crate::token::*;
use crate::trace::ExecutionTracer;
use crate::value::Value;
use crate::vars::ScalarTable;

/// Host-provided line input for `INPUT`/`GET` (spec §5's suspension
/// points). A batch harness supplies a fixed queue; the CLI binary
/// wires this to stdin/keyboard events instead.
pub trait InputSource {
    /// One line of typed text for `INPUT` (no trailing newline), or
    /// `None` on EOF.
    fn read_line(&mut self) -> Option<String>;
    /// A single pending character for `GET`, polled without blocking;
    /// `None` if nothing is waiting.
    fn poll_char(&mut self) -> Option<char> {
        None
    }
}

/// No input ever arrives; `INPUT` against this immediately abandons
/// (suits scripts that never call it).
#[derive(Default)]
pub struct NoInput;

impl InputSource for NoInput {
    fn read_line(&mut self) -> Option<String> {
        None
    }
}

/// A fixed, pre-supplied queue of lines. What the tests below (and any
/// non-interactive embedding) drive `INPUT` with.
#[derive(Default)]
pub struct QueueInput {
    lines: VecDeque<String>,
}

impl QueueInput {
    pub fn new(lines: impl IntoIterator<Item = String>) -> Self {
        QueueInput {
            lines: lines.into_iter().collect(),
        }
    }
}

impl InputSource for QueueInput {
    fn read_line(&mut self) -> Option<String> {
        self.lines.pop_front()
    }
}

/// An asynchronous break signal (spec §5: checked between statements,
/// not just at I/O). The CLI binary backs this with a flag set from a
/// key-press handler; `NeverBreak` is the default for batch use.
pub trait BreakSignal {
    fn is_set(&self) -> bool;
    /// Clear the flag once the interpreter has reported the break, so
    /// the next `step()` (e.g. after `CONT`) doesn't immediately break
    /// again. A no-op for sources that are already self-clearing.
    fn reset(&mut self) {}
}

pub struct NeverBreak;

impl BreakSignal for NeverBreak {
    fn is_set(&self) -> bool {
        false
    }
}

#[derive(Clone)]
struct DataCursor {
    line: Option<u16>,
    offset: usize,
    in_list: bool,
}

impl Default for DataCursor {
    fn default() -> Self {
        DataCursor {
            line: None,
            offset: 0,
            in_list: false,
        }
    }
}

fn find_data_token(tokens: &[u8], start: usize) -> Option<usize> {
    tokens[start..].iter().position(|&b| b == TOK_DATA).map(|i| start + i + 1)
}

/// The end of one `DATA` item: the next unquoted comma or colon, or
/// end of line.
fn data_item_end(tokens: &[u8], start: usize) -> usize {
    let mut i = start;
    let mut in_quotes = false;
    while i < tokens.len() {
        let b = tokens[i];
        if b == QUOTE {
            in_quotes = !in_quotes;
        } else if !in_quotes && (b == b',' || b == COLON) {
            break;
        }
        i += 1;
    }
    i
}

fn parse_data_item(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    let trimmed = text.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        trimmed[1..trimmed.len() - 1].to_string()
    } else {
        trimmed.to_string()
    }
}

/// A raw colon outside quotes, or end of tokens: where a statement's
/// own grammar (`DATA`'s tail, `DEF FN`'s body) stops without the
/// dispatcher parsing it token by token.
fn find_statement_end(tokens: &[u8], pos: usize) -> usize {
    let mut i = pos;
    let mut in_quotes = false;
    while i < tokens.len() {
        let b = tokens[i];
        if b == QUOTE {
            in_quotes = !in_quotes;
        } else if !in_quotes && b == COLON {
            break;
        }
        i += 1;
    }
    i
}

fn expect_byte(tokens: &[u8], pos: usize, b: u8) -> Result<usize, BasicError> {
    let p = eval::skip_spaces(tokens, pos);
    if tokens.get(p) == Some(&b) {
        Ok(p + 1)
    } else {
        Err(BasicError::SyntaxError)
    }
}

fn split_input_fields(text: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for ch in text.chars() {
        if ch == '"' {
            in_quotes = !in_quotes;
            continue;
        }
        if ch == ',' && !in_quotes {
            fields.push(std::mem::take(&mut current));
            continue;
        }
        current.push(ch);
    }
    fields.push(current);
    fields
}

fn statement_label(tokens: &[u8], pos: usize) -> String {
    let p = eval::skip_spaces(tokens, pos);
    match tokens.get(p) {
        Some(&b) if b >= TOKEN_BASE => crate::token::detokenize(&[b]),
        Some(_) => "LET".to_string(),
        None => "END-OF-LINE".to_string(),
    }
}

/// What a subscripted or bare variable name resolves to for assignment.
enum LValue {
    Scalar(String),
    Array(String, Vec<u16>),
}

/// Control transfer out of one statement (spec §4.6's dispatch table).
enum Flow {
    /// Continue; `usize` is the offset right after this statement's own
    /// tokens (before any colon is consumed).
    Next(usize),
    Jump { line: u16, offset: usize },
    /// `IF` with a false condition: skip to the next program line,
    /// ignoring any further `:`-separated statements on this one.
    EndOfLine,
    Stop(usize),
    End,
    Input {
        prompt: String,
        vars: Vec<String>,
        resume_after: usize,
    },
}

#[derive(Clone)]
struct PendingInput {
    prompt: String,
    vars: Vec<String>,
    resume_line: u16,
    resume_offset: usize,
}

/// What a `step()` call did.
pub enum StepOutcome {
    Continue,
    WaitingForInput,
    Ended,
    Stopped(u16),
    Errored(RuntimeError),
}

/// What a whole typed line (possibly driving many `step()`s) did.
pub enum LineOutcome {
    Ok,
    Stopped(u16),
    Error(RuntimeError),
}

pub struct InterpreterConfig {
    pub memsiz: u16,
    pub screen_width: usize,
    pub screen_height: usize,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        InterpreterConfig {
            memsiz: 0xFFFF,
            screen_width: crate::screen::DEFAULT_WIDTH,
            screen_height: crate::screen::DEFAULT_HEIGHT,
        }
    }
}

/// The whole runtime: memory image, variable/array/function tables,
/// stored program, runtime stack, screen, and the direct/program-mode
/// position the dispatcher is currently at.
///
/// `pos_line == 0` is the sentinel for direct mode (line numbers start
/// at 1), matching how the teacher's `Interpreter` tracked a single
/// "current line" rather than separate direct/program cursors.
pub struct Interpreter {
    image: MemoryImage,
    scalars: ScalarTable,
    arrays: ArrayTable,
    functions: FunctionTable,
    program: Program,
    stack: RuntimeStack,
    rng_state: u64,
    screen: Screen,
    tracer: ExecutionTracer,
    data_cursor: DataCursor,
    config: InterpreterConfig,
    pos_line: u16,
    pos_offset: usize,
    direct_tokens: Vec<u8>,
    pending_input: Option<PendingInput>,
    cont_point: Option<(u16, usize)>,
    input: Box<dyn InputSource>,
    breaker: Box<dyn BreakSignal>,
}

impl Interpreter {
    pub fn new(config: InterpreterConfig) -> Self {
        let screen = Screen::with_size(config.screen_width, config.screen_height);
        let image = MemoryImage::new(config.memsiz);
        Interpreter {
            image,
            scalars: ScalarTable::new(),
            arrays: ArrayTable::new(),
            functions: FunctionTable::new(),
            program: Program::new(),
            stack: RuntimeStack::new(),
            rng_state: 0x2545_F491_4F6C_DD1D,
            screen,
            tracer: ExecutionTracer::new(),
            data_cursor: DataCursor::default(),
            config,
            pos_line: 0,
            pos_offset: 0,
            direct_tokens: Vec::new(),
            pending_input: None,
            cont_point: None,
            input: Box::new(NoInput),
            breaker: Box::new(NeverBreak),
        }
    }

    pub fn with_input(mut self, input: Box<dyn InputSource>) -> Self {
        self.input = input;
        self
    }

    pub fn with_break_signal(mut self, breaker: Box<dyn BreakSignal>) -> Self {
        self.breaker = breaker;
        self
    }

    pub fn screen(&self) -> &Screen {
        &self.screen
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn tracer_mut(&mut self) -> &mut ExecutionTracer {
        &mut self.tracer
    }

    pub fn is_waiting_for_input(&self) -> bool {
        self.pending_input.is_some()
    }

    pub fn pending_prompt(&self) -> Option<&str> {
        self.pending_input.as_ref().map(|p| p.prompt.as_str())
    }

    /// Type one line at the `READY.` prompt: either stores/edits a
    /// program line (if it starts with a line number) or executes it
    /// immediately in direct mode, blocking on `self.input` for any
    /// `INPUT` it hits along the way.
    pub fn execute_line(&mut self, source: &str) -> LineOutcome {
        let trimmed = source.trim_end();
        let leading = trimmed.trim_start();
        if leading.chars().next().map_or(false, |c| c.is_ascii_digit()) {
            let (number, rest) = split_line_number(leading);
            let tokens = crate::token::tokenize(rest.trim_start());
            self.program.set_line(number, tokens);
            return LineOutcome::Ok;
        }

        self.direct_tokens = crate::token::tokenize(trimmed);
        self.pos_line = 0;
        self.pos_offset = 0;
        self.run_to_suspension()
    }

    /// Resume a program already positioned mid-run (e.g. by a host that
    /// drove `step()`/`provide_input()` directly instead of going
    /// through `execute_line`).
    pub fn run(&mut self) -> LineOutcome {
        self.run_to_suspension()
    }

    /// Prime direct mode with one line of source without driving it to
    /// completion. Lets an interactive host (the CLI binary's event
    /// loop) call `step()` itself instead of blocking inside
    /// `execute_line` on every `INPUT`/`GET`.
    pub fn prime_direct(&mut self, source: &str) {
        self.direct_tokens = crate::token::tokenize(source.trim_end());
        self.pos_line = 0;
        self.pos_offset = 0;
    }

    fn run_to_suspension(&mut self) -> LineOutcome {
        loop {
            match self.step() {
                StepOutcome::Continue => continue,
                StepOutcome::Ended => return LineOutcome::Ok,
                StepOutcome::Stopped(line) => return LineOutcome::Stopped(line),
                StepOutcome::Errored(e) => return LineOutcome::Error(e),
                StepOutcome::WaitingForInput => match self.input.read_line() {
                    Some(text) => {
                        if let Err(e) = self.provide_input(text) {
                            return LineOutcome::Error(e);
                        }
                    }
                    None => {
                        self.pending_input = None;
                        return LineOutcome::Ok;
                    }
                },
            }
        }
    }

    /// Advance execution by exactly one statement. Public so an
    /// interactive host (the CLI binary's ratatui loop) can drive it
    /// without blocking on `INPUT`.
    pub fn step(&mut self) -> StepOutcome {
        // Checked before the `INPUT` suspension too: a break while
        // waiting for input discards the partial input and returns to
        // direct mode rather than completing the read (spec §5).
        if self.breaker.is_set() {
            self.breaker.reset();
            let line = self.pos_line;
            self.pending_input = None;
            self.cont_point = Some((line, self.pos_offset));
            self.stack.clear();
            self.pos_line = 0;
            let reported = if line == 0 { None } else { Some(line) };
            return StepOutcome::Errored(RuntimeError::new(BasicError::Break, reported));
        }
        if self.pending_input.is_some() {
            return StepOutcome::WaitingForInput;
        }

        let line = self.pos_line;
        let tokens: Vec<u8> = if line == 0 {
            self.direct_tokens.clone()
        } else {
            match self.program.get_line(line) {
                Some(t) => t.to_vec(),
                None => {
                    self.pos_line = 0;
                    return StepOutcome::Ended;
                }
            }
        };

        if self.pos_offset >= tokens.len() {
            if line == 0 {
                return StepOutcome::Ended;
            }
            return match self.program.next_line(line) {
                Some(n) => {
                    self.pos_line = n;
                    self.pos_offset = 0;
                    StepOutcome::Continue
                }
                None => {
                    self.pos_line = 0;
                    StepOutcome::Ended
                }
            };
        }

        let reported_line = if line == 0 { None } else { Some(line) };
        let label = if self.tracer.enabled {
            Some(statement_label(&tokens, self.pos_offset))
        } else {
            None
        };
        let result = self.exec_statement(&tokens, line, self.pos_offset);
        if let Some(label) = label {
            let snapshot = self.scalars.snapshot(&self.image);
            self.tracer.record_statement(line, self.pos_offset, &label, &snapshot);
        }

        match result {
            Ok(Flow::Next(after)) => {
                self.pos_offset = advance_past_colon(&tokens, after);
                if self.pos_offset >= tokens.len() {
                    if line == 0 {
                        StepOutcome::Ended
                    } else {
                        match self.program.next_line(line) {
                            Some(n) => {
                                self.pos_line = n;
                                self.pos_offset = 0;
                                StepOutcome::Continue
                            }
                            None => {
                                self.pos_line = 0;
                                StepOutcome::Ended
                            }
                        }
                    }
                } else {
                    StepOutcome::Continue
                }
            }
            Ok(Flow::EndOfLine) => {
                if line == 0 {
                    StepOutcome::Ended
                } else {
                    match self.program.next_line(line) {
                        Some(n) => {
                            self.pos_line = n;
                            self.pos_offset = 0;
                            StepOutcome::Continue
                        }
                        None => {
                            self.pos_line = 0;
                            StepOutcome::Ended
                        }
                    }
                }
            }
            Ok(Flow::Jump { line: l, offset }) => {
                self.pos_line = l;
                self.pos_offset = offset;
                StepOutcome::Continue
            }
            Ok(Flow::Stop(after)) => {
                self.cont_point = Some((line, after));
                self.pos_line = 0;
                StepOutcome::Stopped(line)
            }
            Ok(Flow::End) => {
                self.pos_line = 0;
                StepOutcome::Ended
            }
            Ok(Flow::Input { prompt, vars, resume_after }) => {
                self.screen.print(&prompt);
                self.pending_input = Some(PendingInput {
                    prompt,
                    vars,
                    resume_line: line,
                    resume_offset: resume_after,
                });
                StepOutcome::WaitingForInput
            }
            Err(e) => {
                self.stack.clear();
                self.pos_line = 0;
                StepOutcome::Errored(RuntimeError::new(e, reported_line))
            }
        }
    }

    /// Complete a pending `INPUT` with one line of text typed by the
    /// user. Re-prompts with `?REDO FROM START` on a count or numeric
    /// mismatch rather than resuming (spec §4.6); the caller just calls
    /// this again with the next line typed.
    pub fn provide_input(&mut self, text: String) -> Result<(), RuntimeError> {
        let pending = match self.pending_input.clone() {
            Some(p) => p,
            None => return Ok(()),
        };
        let fields = split_input_fields(&text);
        if fields.len() < pending.vars.len() {
            self.screen.println("?REDO FROM START");
            self.screen.print(&pending.prompt);
            return Ok(());
        }

        let mut parsed: Vec<(String, Value)> = Vec::with_capacity(pending.vars.len());
        for (name, field) in pending.vars.iter().zip(fields.iter()) {
            let field = field.trim();
            if name.ends_with('$') {
                parsed.push((name.clone(), Value::Str(field.to_string())));
            } else {
                match field.parse::<f64>() {
                    Ok(n) => parsed.push((name.clone(), Value::Number(n))),
                    Err(_) => {
                        self.screen.println("?REDO FROM START");
                        self.screen.print(&pending.prompt);
                        return Ok(());
                    }
                }
            }
        }

        for (name, value) in parsed {
            let result = match value {
                Value::Number(n) => self.scalars.set_number(&name, n),
                Value::Str(s) => match self.alloc_string(s.as_bytes()) {
                    Ok(desc) => self.scalars.set_string(&name, desc),
                    Err(e) => Err(e),
                },
                _ => unreachable!("INPUT only ever parses Number/Str"),
            };
            if let Err(e) = result {
                self.pending_input = None;
                let reported = if pending.resume_line == 0 { None } else { Some(pending.resume_line) };
                return Err(RuntimeError::new(e, reported));
            }
        }

        self.pos_line = pending.resume_line;
        self.pos_offset = pending.resume_offset;
        self.pending_input = None;
        Ok(())
    }

    fn alloc_string(&mut self, bytes: &[u8]) -> Result<StringDescriptor, BasicError> {
        let mut scalar_live = self.scalars.live_string_descriptors();
        let mut array_live = self.arrays.live_string_descriptors();
        let mut live: Vec<&mut StringDescriptor> = Vec::with_capacity(scalar_live.len() + array_live.len());
        live.append(&mut scalar_live);
        live.append(&mut array_live);
        crate::strheap::alloc(&mut self.image, bytes, &mut live)
    }

    fn eval_at(&mut self, tokens: &[u8], pos: usize, in_print: bool) -> Result<(Value, usize), BasicError> {
        let mut ctx = EvalContext {
            image: &mut self.image,
            scalars: &mut self.scalars,
            arrays: &mut self.arrays,
            functions: &self.functions,
            rng_state: &mut self.rng_state,
            in_print,
            screen: &self.screen,
            fn_depth: 0,
        };
        eval::evaluate(tokens, pos, &mut ctx)
    }

    /// Reset scalars, arrays, user functions, the runtime stack, and the
    /// memory pointers. What both `RUN` and `CLR` do (spec §4.6). Does
    /// not touch the stored program.
    fn do_clr(&mut self) {
        self.scalars.clear();
        self.arrays.clear();
        self.functions.clear();
        self.stack.clear();
        self.image.reset(self.config.memsiz);
        self.data_cursor = DataCursor {
            line: self.program.first_line(),
            offset: 0,
            in_list: false,
        };
        self.cont_point = None;
        self.pending_input = None;
    }

    /// `NEW`: clear the stored program too.
    fn do_new(&mut self) {
        self.program.clear();
        self.do_clr();
    }

    fn advance_data_cursor(&mut self) -> Result<String, BasicError> {
        loop {
            let line_no = match self.data_cursor.line {
                Some(n) => n,
                None => return Err(BasicError::OutOfData),
            };
            let tokens = match self.program.get_line(line_no) {
                Some(t) => t.to_vec(),
                None => {
                    self.data_cursor.line = self.program.next_line(line_no);
                    self.data_cursor.offset = 0;
                    self.data_cursor.in_list = false;
                    continue;
                }
            };

            if !self.data_cursor.in_list {
                match find_data_token(&tokens, self.data_cursor.offset) {
                    Some(pos) => {
                        self.data_cursor.offset = pos;
                        self.data_cursor.in_list = true;
                    }
                    None => {
                        match self.program.next_line(line_no) {
                            Some(n) => {
                                self.data_cursor.line = Some(n);
                                self.data_cursor.offset = 0;
                            }
                            None => {
                                self.data_cursor.line = None;
                                return Err(BasicError::OutOfData);
                            }
                        }
                        continue;
                    }
                }
            }

            if self.data_cursor.offset >= tokens.len() {
                self.data_cursor.in_list = false;
                match self.program.next_line(line_no) {
                    Some(n) => {
                        self.data_cursor.line = Some(n);
                        self.data_cursor.offset = 0;
                    }
                    None => {
                        self.data_cursor.line = None;
                        return Err(BasicError::OutOfData);
                    }
                }
                continue;
            }

            let end = data_item_end(&tokens, self.data_cursor.offset);
            let item = parse_data_item(&tokens[self.data_cursor.offset..end]);

            let mut next = end;
            if tokens.get(next) == Some(&b',') {
                next += 1;
            } else {
                self.data_cursor.in_list = false;
                if tokens.get(next) == Some(&COLON) {
                    next += 1;
                }
            }
            self.data_cursor.offset = next;
            return Ok(item);
        }
    }

    fn parse_lvalue(&mut self, tokens: &[u8], pos: usize) -> Result<(LValue, usize), BasicError> {
        let (name, next) = eval::read_identifier(tokens, pos).ok_or(BasicError::SyntaxError)?;
        let p = eval::skip_spaces(tokens, next);
        if tokens.get(p) == Some(&b'(') {
            let mut idx = p + 1;
            let mut subs = Vec::new();
            loop {
                let (v, after) = self.eval_at(tokens, idx, false)?;
                subs.push(v.as_index()?);
                idx = eval::skip_spaces(tokens, after);
                if tokens.get(idx) == Some(&b',') {
                    idx += 1;
                    continue;
                }
                break;
            }
            idx = expect_byte(tokens, idx, b')')?;
            Ok((LValue::Array(name, subs), idx))
        } else {
            Ok((LValue::Scalar(name), next))
        }
    }

    fn store_value(&mut self, lvalue: LValue, value: Value) -> Result<(), BasicError> {
        match lvalue {
            LValue::Scalar(name) => match value {
                Value::Number(n) => self.scalars.set_number(&name, n),
                Value::Str(s) => {
                    let desc = self.alloc_string(s.as_bytes())?;
                    self.scalars.set_string(&name, desc)
                }
                _ => Err(BasicError::TypeMismatch),
            },
            LValue::Array(name, subs) => {
                let is_string = name.ends_with('$');
                match value {
                    Value::Number(n) if !is_string => self.arrays.set_number(&name, &subs, n),
                    Value::Str(s) if is_string => {
                        let desc = self.alloc_string(s.as_bytes())?;
                        self.arrays.set_string(&name, &subs, desc)
                    }
                    _ => Err(BasicError::TypeMismatch),
                }
            }
        }
    }

    /// Skip forward (possibly across several program lines) past the
    /// `NEXT` that matches a `FOR` whose loop terminates on entry (spec
    /// §4.5's zero-iteration edge case), counting nested `FOR`/`NEXT`
    /// pairs so an inner loop's `NEXT` doesn't match early.
    fn skip_for_body(&self, start_line: u16, start_offset: usize) -> Result<(u16, usize), BasicError> {
        let mut depth: i32 = 0;
        let mut line = start_line;
        let mut offset = start_offset;
        loop {
            let tokens = self.program.get_line(line).ok_or(BasicError::NextWithoutFor)?.to_vec();
            while offset < tokens.len() {
                match tokens[offset] {
                    TOK_FOR => {
                        depth += 1;
                        offset += 1;
                    }
                    TOK_NEXT => {
                        if depth == 0 {
                            let mut p = eval::skip_spaces(&tokens, offset + 1);
                            if let Some((_, next)) = eval::read_identifier(&tokens, p) {
                                p = next;
                            }
                            return Ok((line, p));
                        }
                        depth -= 1;
                        offset += 1;
                    }
                    _ => offset += 1,
                }
            }
            match self.program.next_line(line) {
                Some(n) => {
                    line = n;
                    offset = 0;
                }
                None => return Err(BasicError::NextWithoutFor),
            }
        }
    }

    fn exec_statement(&mut self, tokens: &[u8], line: u16, pos: usize) -> Result<Flow, BasicError> {
        let pos = eval::skip_spaces(tokens, pos);
        match tokens.get(pos).copied() {
            None | Some(COLON) => Ok(Flow::Next(pos)),
            Some(TOK_PRINT) => self.exec_print(tokens, pos + 1),
            Some(TOK_LET) => self.exec_let(tokens, pos + 1),
            Some(TOK_IF) => self.exec_if(tokens, line, pos + 1),
            Some(TOK_GOTO) => {
                let (val, _next) = self.eval_at(tokens, pos + 1, false)?;
                let target = self.program.resolve(val.as_index()?)?;
                Ok(Flow::Jump { line: target, offset: 0 })
            }
            Some(TOK_GOSUB) => self.exec_gosub(tokens, line, pos + 1),
            Some(TOK_RETURN) => self.exec_return(),
            Some(TOK_FOR) => self.exec_for(tokens, line, pos + 1),
            Some(TOK_NEXT) => self.exec_next(tokens, pos + 1),
            Some(TOK_DIM) => self.exec_dim(tokens, pos + 1),
            Some(TOK_DATA) => Ok(Flow::Next(find_statement_end(tokens, pos + 1))),
            Some(TOK_READ) => self.exec_read(tokens, pos + 1),
            Some(TOK_RESTORE) => self.exec_restore(tokens, pos + 1),
            Some(TOK_ON) => self.exec_on(tokens, line, pos + 1),
            Some(TOK_DEF) => self.exec_def(tokens, pos + 1),
            Some(TOK_INPUT) => self.exec_input(tokens, pos + 1),
            Some(TOK_GET) => self.exec_get(tokens, pos + 1),
            Some(TOK_POKE) => self.exec_poke(tokens, pos + 1),
            Some(TOK_REM) => Ok(Flow::Next(tokens.len())),
            Some(TOK_STOP) => Ok(Flow::Stop(pos + 1)),
            Some(TOK_END) => Ok(Flow::End),
            Some(TOK_CONT) => match self.cont_point.take() {
                Some((l, o)) => Ok(Flow::Jump { line: l, offset: o }),
                None => Err(BasicError::SyntaxError),
            },
            Some(TOK_NEW) => {
                self.do_new();
                Ok(Flow::End)
            }
            Some(TOK_CLR) => {
                self.do_clr();
                Ok(Flow::Next(pos + 1))
            }
            Some(TOK_LIST) => self.exec_list(tokens, pos + 1),
            Some(TOK_RUN) => self.exec_run(tokens, pos + 1),
            Some(TOK_SAVE) => self.exec_save(tokens, pos + 1),
            Some(TOK_LOAD) => self.exec_load(tokens, pos + 1),
            Some(b) if b.is_ascii_alphabetic() => self.exec_let(tokens, pos),
            _ => Err(BasicError::SyntaxError),
        }
    }

    fn exec_print(&mut self, tokens: &[u8], pos: usize) -> Result<Flow, BasicError> {
        let mut pos = pos;
        let mut pending_space = false;
        loop {
            pos = eval::skip_spaces(tokens, pos);
            match tokens.get(pos).copied() {
                None | Some(COLON) => {
                    self.screen.println("");
                    return Ok(Flow::Next(pos));
                }
                Some(b';') => {
                    pos += 1;
                    let p2 = eval::skip_spaces(tokens, pos);
                    if tokens.get(p2).is_none() || tokens.get(p2) == Some(&COLON) {
                        return Ok(Flow::Next(p2));
                    }
                    pos = p2;
                }
                Some(b',') => {
                    pos += 1;
                    if pending_space {
                        self.screen.print(" ");
                        pending_space = false;
                    }
                    let p2 = eval::skip_spaces(tokens, pos);
                    if tokens.get(p2).is_none() || tokens.get(p2) == Some(&COLON) {
                        return Ok(Flow::Next(p2));
                    }
                    let col = self.screen.column();
                    let next_zone = (col / 10 + 1) * 10;
                    self.screen.tab_to(next_zone);
                    pos = p2;
                }
                _ => {
                    if pending_space {
                        self.screen.print(" ");
                        pending_space = false;
                    }
                    let (value, next) = self.eval_at(tokens, pos, true)?;
                    pos = next;
                    match value {
                        Value::Tab(n) => self.screen.tab_to(n.max(0) as usize),
                        Value::Spc(n) => self.screen.print(&" ".repeat(n.max(0) as usize)),
                        Value::Number(_) => {
                            self.screen.print(&value.to_display_string()?);
                            pending_space = true;
                        }
                        Value::Str(s) => self.screen.print(&s),
                    }
                }
            }
        }
    }

    fn exec_let(&mut self, tokens: &[u8], pos: usize) -> Result<Flow, BasicError> {
        let (lvalue, next) = self.parse_lvalue(tokens, pos)?;
        let p = expect_byte(tokens, next, TOK_EQ)?;
        let (value, after) = self.eval_at(tokens, p, false)?;
        self.store_value(lvalue, value)?;
        Ok(Flow::Next(after))
    }

    fn exec_if(&mut self, tokens: &[u8], line: u16, pos: usize) -> Result<Flow, BasicError> {
        let (cond, next) = self.eval_at(tokens, pos, false)?;
        let p = expect_byte(tokens, next, TOK_THEN)?;
        let truthy = cond.is_truthy();
        let p2 = eval::skip_spaces(tokens, p);
        if tokens.get(p2).map_or(false, |b| b.is_ascii_digit()) {
            if truthy {
                let (target_val, _after) = self.eval_at(tokens, p2, false)?;
                let resolved = self.program.resolve(target_val.as_index()?)?;
                Ok(Flow::Jump { line: resolved, offset: 0 })
            } else {
                Ok(Flow::EndOfLine)
            }
        } else if truthy {
            Ok(Flow::Jump { line, offset: p2 })
        } else {
            Ok(Flow::EndOfLine)
        }
    }

    fn exec_gosub(&mut self, tokens: &[u8], line: u16, pos: usize) -> Result<Flow, BasicError> {
        let (val, next) = self.eval_at(tokens, pos, false)?;
        let target = self.program.resolve(val.as_index()?)?;
        self.stack.push_gosub(line, next)?;
        Ok(Flow::Jump { line: target, offset: 0 })
    }

    fn exec_return(&mut self) -> Result<Flow, BasicError> {
        let frame = self.stack.pop_gosub()?;
        Ok(Flow::Jump {
            line: frame.resume_line,
            offset: frame.resume_offset,
        })
    }

    fn exec_for(&mut self, tokens: &[u8], line: u16, pos: usize) -> Result<Flow, BasicError> {
        let (name, next) = eval::read_identifier(tokens, pos).ok_or(BasicError::SyntaxError)?;
        if name.ends_with('$') {
            return Err(BasicError::TypeMismatch);
        }
        let p = expect_byte(tokens, next, TOK_EQ)?;
        let (start_val, p) = self.eval_at(tokens, p, false)?;
        let start = start_val.as_number()?;
        let p = expect_byte(tokens, p, TOK_TO)?;
        let (limit_val, p) = self.eval_at(tokens, p, false)?;
        let limit = limit_val.as_number()?;
        let p2 = eval::skip_spaces(tokens, p);
        let (step, after) = if tokens.get(p2) == Some(&TOK_STEP) {
            let (step_val, a) = self.eval_at(tokens, p2 + 1, false)?;
            (step_val.as_number()?, a)
        } else {
            (1.0, p2)
        };

        self.scalars.set_number(&name, start)?;
        let terminates_immediately = if step >= 0.0 { start > limit } else { start < limit };
        if terminates_immediately {
            let (skip_line, skip_offset) = self.skip_for_body(line, after)?;
            return Ok(Flow::Jump { line: skip_line, offset: skip_offset });
        }

        self.stack.push_for(ForFrame {
            var_name: crate::vars::canonical_name(&name),
            step,
            limit,
            resume_line: line,
            resume_offset: after,
        })?;
        Ok(Flow::Next(after))
    }

    fn exec_next(&mut self, tokens: &[u8], pos: usize) -> Result<Flow, BasicError> {
        let p = eval::skip_spaces(tokens, pos);
        let (name_opt, after) = match eval::read_identifier(tokens, p) {
            Some((n, next)) => (Some(n), next),
            None => (None, p),
        };
        let frame = self.stack.find_for(name_opt.as_deref())?.clone();
        let current = self.scalars.get(&frame.var_name, &self.image).as_number()?;
        let new_value = current + frame.step;
        let continues = if frame.step >= 0.0 {
            new_value <= frame.limit
        } else {
            new_value >= frame.limit
        };
        if continues {
            self.scalars.set_number(&frame.var_name, new_value)?;
            Ok(Flow::Jump {
                line: frame.resume_line,
                offset: frame.resume_offset,
            })
        } else {
            self.stack.pop_for();
            Ok(Flow::Next(after))
        }
    }

    fn exec_on(&mut self, tokens: &[u8], line: u16, pos: usize) -> Result<Flow, BasicError> {
        let (val, next) = self.eval_at(tokens, pos, false)?;
        let idx = val.as_i16()?;
        let p = eval::skip_spaces(tokens, next);
        let (is_gosub, mut p) = if tokens.get(p) == Some(&TOK_GOSUB) {
            (true, p + 1)
        } else if tokens.get(p) == Some(&TOK_GOTO) {
            (false, p + 1)
        } else {
            return Err(BasicError::SyntaxError);
        };

        let mut targets = Vec::new();
        loop {
            p = eval::skip_spaces(tokens, p);
            let (t, after) = self.eval_at(tokens, p, false)?;
            targets.push(t.as_index()?);
            p = eval::skip_spaces(tokens, after);
            if tokens.get(p) == Some(&b',') {
                p += 1;
                continue;
            }
            break;
        }

        if idx >= 1 && (idx as usize) <= targets.len() {
            let target_line = self.program.resolve(targets[idx as usize - 1])?;
            if is_gosub {
                self.stack.push_gosub(line, p)?;
            }
            Ok(Flow::Jump { line: target_line, offset: 0 })
        } else {
            Ok(Flow::Next(p))
        }
    }

    fn exec_def(&mut self, tokens: &[u8], pos: usize) -> Result<Flow, BasicError> {
        let p = expect_byte(tokens, pos, TOK_FN)?;
        let (fname, next) = eval::read_fn_name(tokens, p).ok_or(BasicError::SyntaxError)?;
        let p = expect_byte(tokens, next, b'(')?;
        let (param, next2) = eval::read_identifier(tokens, p).ok_or(BasicError::SyntaxError)?;
        let p = expect_byte(tokens, next2, b')')?;
        let p = expect_byte(tokens, p, TOK_EQ)?;
        let body_end = find_statement_end(tokens, p);
        let body = tokens[p..body_end].to_vec();
        self.functions.define(&fname, UserFunction { param, body });
        Ok(Flow::Next(body_end))
    }

    fn exec_dim(&mut self, tokens: &[u8], pos: usize) -> Result<Flow, BasicError> {
        let mut p = pos;
        loop {
            p = eval::skip_spaces(tokens, p);
            let (name, next) = eval::read_identifier(tokens, p).ok_or(BasicError::SyntaxError)?;
            let is_string = name.ends_with('$');
            let mut idx = expect_byte(tokens, next, b'(')?;
            let mut dims = Vec::new();
            loop {
                let (v, after) = self.eval_at(tokens, idx, false)?;
                dims.push(v.as_index()?);
                idx = eval::skip_spaces(tokens, after);
                if tokens.get(idx) == Some(&b',') {
                    idx += 1;
                    continue;
                }
                break;
            }
            idx = expect_byte(tokens, idx, b')')?;
            self.arrays.dim(&name, dims, is_string)?;
            p = eval::skip_spaces(tokens, idx);
            if tokens.get(p) == Some(&b',') {
                p += 1;
                continue;
            }
            break;
        }
        Ok(Flow::Next(p))
    }

    fn exec_read(&mut self, tokens: &[u8], pos: usize) -> Result<Flow, BasicError> {
        let mut p = pos;
        loop {
            p = eval::skip_spaces(tokens, p);
            let (lvalue, next) = self.parse_lvalue(tokens, p)?;
            let literal = self.advance_data_cursor()?;
            let is_string = match &lvalue {
                LValue::Scalar(n) => n.ends_with('$'),
                LValue::Array(n, _) => n.ends_with('$'),
            };
            let value = if is_string {
                Value::Str(literal)
            } else {
                Value::Number(crate::value::parse_numeric_prefix(&literal))
            };
            self.store_value(lvalue, value)?;
            p = eval::skip_spaces(tokens, next);
            if tokens.get(p) == Some(&b',') {
                p += 1;
                continue;
            }
            break;
        }
        Ok(Flow::Next(p))
    }

    fn exec_restore(&mut self, tokens: &[u8], pos: usize) -> Result<Flow, BasicError> {
        let p = eval::skip_spaces(tokens, pos);
        if tokens.get(p).is_none() || tokens.get(p) == Some(&COLON) {
            self.data_cursor = DataCursor {
                line: self.program.first_line(),
                offset: 0,
                in_list: false,
            };
            return Ok(Flow::Next(p));
        }
        let (val, next) = self.eval_at(tokens, p, false)?;
        let resolved = self.program.resolve(val.as_index()?)?;
        self.data_cursor = DataCursor {
            line: Some(resolved),
            offset: 0,
            in_list: false,
        };
        Ok(Flow::Next(next))
    }

    fn exec_input(&mut self, tokens: &[u8], pos: usize) -> Result<Flow, BasicError> {
        let mut p = eval::skip_spaces(tokens, pos);
        let mut prompt = String::from("? ");
        if tokens.get(p) == Some(&QUOTE) {
            let (text, next) = eval::read_string_literal(tokens, p)?;
            let p2 = eval::skip_spaces(tokens, next);
            if tokens.get(p2) == Some(&b';') {
                prompt = text;
                p = p2 + 1;
            } else {
                return Err(BasicError::SyntaxError);
            }
        }

        let mut vars = Vec::new();
        loop {
            p = eval::skip_spaces(tokens, p);
            let (name, next) = eval::read_identifier(tokens, p).ok_or(BasicError::SyntaxError)?;
            vars.push(name);
            p = eval::skip_spaces(tokens, next);
            if tokens.get(p) == Some(&b',') {
                p += 1;
                continue;
            }
            break;
        }

        Ok(Flow::Input {
            prompt,
            vars,
            resume_after: p,
        })
    }

    fn exec_get(&mut self, tokens: &[u8], pos: usize) -> Result<Flow, BasicError> {
        let p = eval::skip_spaces(tokens, pos);
        let (name, next) = eval::read_identifier(tokens, p).ok_or(BasicError::SyntaxError)?;
        match self.input.poll_char() {
            Some(ch) => {
                if name.ends_with('$') {
                    let desc = self.alloc_string(ch.to_string().as_bytes())?;
                    self.scalars.set_string(&name, desc)?;
                } else {
                    self.scalars.set_number(&name, ch as u32 as f64)?;
                }
            }
            None => {
                if name.ends_with('$') {
                    self.scalars.set_string(&name, StringDescriptor::EMPTY)?;
                } else {
                    self.scalars.set_number(&name, 0.0)?;
                }
            }
        }
        Ok(Flow::Next(next))
    }

    fn exec_poke(&mut self, tokens: &[u8], pos: usize) -> Result<Flow, BasicError> {
        let (addr_val, next) = self.eval_at(tokens, pos, false)?;
        let addr = addr_val.as_index()?;
        let p = expect_byte(tokens, next, b',')?;
        let (val_val, after) = self.eval_at(tokens, p, false)?;
        let byte = val_val.as_i16()?;
        if !(0..=255).contains(&byte) {
            return Err(BasicError::IllegalQuantity);
        }
        self.image.poke(addr, byte as u8);
        match addr {
            crate::memory::BORDER_COLOR_ADDR => self.screen.set_border_color(byte as u8),
            crate::memory::BACKGROUND_COLOR_ADDR => self.screen.set_background_color(byte as u8),
            _ => {}
        }
        Ok(Flow::Next(after))
    }

    fn exec_list(&mut self, tokens: &[u8], pos: usize) -> Result<Flow, BasicError> {
        let p = eval::skip_spaces(tokens, pos);
        let (from, to, next) = if tokens.get(p).is_none() || tokens.get(p) == Some(&COLON) {
            (None, None, p)
        } else {
            let (start_val, after) = self.eval_at(tokens, p, false)?;
            let start = start_val.as_index()?;
            let p2 = eval::skip_spaces(tokens, after);
            if tokens.get(p2) == Some(&TOK_MINUS) {
                let p3 = eval::skip_spaces(tokens, p2 + 1);
                if tokens.get(p3).is_none() || tokens.get(p3) == Some(&COLON) {
                    (Some(start), None, p3)
                } else {
                    let (end_val, after2) = self.eval_at(tokens, p3, false)?;
                    (Some(start), Some(end_val.as_index()?), after2)
                }
            } else {
                (Some(start), Some(start), p2)
            }
        };

        let lines: Vec<(u16, Vec<u8>)> = self
            .program
            .iter()
            .filter(|(num, _)| from.map_or(true, |f| *num >= f) && to.map_or(true, |t| *num <= t))
            .map(|(num, body)| (num, body.to_vec()))
            .collect();
        for (num, body) in lines {
            let text = crate::token::detokenize(&body);
            self.screen.println(&format!("{} {}", num, text));
        }
        Ok(Flow::Next(next))
    }

    fn exec_run(&mut self, tokens: &[u8], pos: usize) -> Result<Flow, BasicError> {
        let p = eval::skip_spaces(tokens, pos);
        self.do_clr();
        if tokens.get(p).is_none() || tokens.get(p) == Some(&COLON) {
            match self.program.first_line() {
                Some(n) => Ok(Flow::Jump { line: n, offset: 0 }),
                None => Ok(Flow::End),
            }
        } else {
            let (val, _next) = self.eval_at(tokens, p, false)?;
            let target = self.program.resolve(val.as_index()?)?;
            Ok(Flow::Jump { line: target, offset: 0 })
        }
    }

    fn exec_save(&mut self, tokens: &[u8], pos: usize) -> Result<Flow, BasicError> {
        let p = eval::skip_spaces(tokens, pos);
        let (filename, next) = eval::read_string_literal(tokens, p)?;
        if let Err(e) = crate::prg::save_to_file(&self.program, &filename) {
            self.screen.println(&format!("?SAVE ERROR: {}", e));
        }
        Ok(Flow::Next(next))
    }

    fn exec_load(&mut self, tokens: &[u8], pos: usize) -> Result<Flow, BasicError> {
        let p = eval::skip_spaces(tokens, pos);
        let (filename, next) = eval::read_string_literal(tokens, p)?;
        match crate::prg::load_from_file(&filename) {
            Ok(program) => {
                self.do_new();
                self.program = program;
                self.data_cursor = DataCursor {
                    line: self.program.first_line(),
                    offset: 0,
                    in_list: false,
                };
                Ok(Flow::End)
            }
            Err(e) => {
                self.screen.println(&format!("?LOAD ERROR: {}", e));
                Ok(Flow::Next(next))
            }
        }
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new(InterpreterConfig::default())
    }
}

fn advance_past_colon(tokens: &[u8], pos: usize) -> usize {
    let p = eval::skip_spaces(tokens, pos);
    if tokens.get(p) == Some(&COLON) {
        p + 1
    } else {
        p
    }
}

fn split_line_number(s: &str) -> (u16, &str) {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let number: u16 = s[..end].parse().unwrap_or(0);
    (number, &s[end..])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_lines(source: &[&str]) -> Interpreter {
        let mut interp = Interpreter::default();
        for line in source {
            interp.execute_line(line);
        }
        interp
    }

    /// `Screen::get_content` pads every row out to the full screen
    /// width; strip that padding so assertions can compare against the
    /// text actually written, one logical line at a time.
    fn trimmed_lines(interp: &Interpreter) -> String {
        interp
            .screen()
            .get_content()
            .lines()
            .map(|l| l.trim_end())
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn print_statement_writes_to_the_screen() {
        let interp = run_lines(&["10 PRINT \"HELLO\"", "RUN"]);
        assert!(trimmed_lines(&interp).starts_with("HELLO"));
    }

    #[test]
    fn for_next_loop_accumulates_and_prints_each_iteration() {
        let interp = run_lines(&["10 FOR I=1 TO 3", "20 PRINT I", "30 NEXT I", "RUN"]);
        assert!(trimmed_lines(&interp).starts_with(" 1\n 2\n 3"));
    }

    #[test]
    fn for_loop_that_never_executes_skips_straight_past_next() {
        let interp = run_lines(&[
            "10 FOR I=5 TO 1",
            "20 PRINT \"INSIDE\"",
            "30 NEXT I",
            "40 PRINT \"AFTER\"",
            "RUN",
        ]);
        assert!(trimmed_lines(&interp).starts_with("AFTER"));
    }

    #[test]
    fn data_read_restore_round_trips_values() {
        let interp = run_lines(&[
            "10 DATA 1,2,\"X\",4",
            "20 READ A,B,C$,D",
            "30 PRINT A;B;C$;D",
            "40 RESTORE",
            "50 READ E",
            "60 PRINT E",
            "RUN",
        ]);
        assert!(trimmed_lines(&interp).starts_with(" 1  2 X 4\n 1"));
    }

    #[test]
    fn def_fn_evaluates_with_the_caller_scope_restored() {
        let interp = run_lines(&[
            "10 DEF FN S(X)=X*X",
            "20 X=9",
            "30 PRINT FN S(3)",
            "40 PRINT X",
            "RUN",
        ]);
        assert!(trimmed_lines(&interp).starts_with(" 9\n 9"));
    }

    #[test]
    fn def_fn_with_no_space_before_the_letter_matches_scenario_four() {
        // Spec §8 scenario 4: the function key is a single letter spelled
        // directly against FN, with no space (`FNA`, not `FN A`).
        let interp = run_lines(&[
            "10 DEF FNA(X)=X*X+1",
            "20 PRINT FNA(3); FNA(5)",
            "RUN",
        ]);
        assert!(trimmed_lines(&interp).starts_with(" 10  26"));
    }

    #[test]
    fn self_referential_def_fn_is_out_of_memory_not_a_crash() {
        let mut interp = Interpreter::default();
        interp.execute_line("10 DEF FN A(X)=FN A(X)+1");
        interp.execute_line("20 PRINT FN A(1)");
        match interp.execute_line("RUN") {
            LineOutcome::Error(e) => assert_eq!(e.kind, BasicError::OutOfMemory),
            _ => panic!("expected an out-of-memory error"),
        }
    }

    #[test]
    fn division_by_zero_reports_the_offending_line_and_halts() {
        let mut interp = Interpreter::default();
        interp.execute_line("10 PRINT 1/0");
        match interp.execute_line("RUN") {
            LineOutcome::Error(e) => {
                assert_eq!(e.kind, BasicError::DivisionByZero);
                assert_eq!(e.line, Some(10));
            }
            _ => panic!("expected a division-by-zero error"),
        }
    }

    #[test]
    fn gosub_return_resumes_after_the_call() {
        let interp = run_lines(&[
            "10 GOSUB 100",
            "20 PRINT \"BACK\"",
            "30 END",
            "100 PRINT \"SUB\"",
            "110 RETURN",
            "RUN",
        ]);
        assert!(trimmed_lines(&interp).starts_with("SUB\nBACK"));
    }

    #[test]
    fn input_statement_suspends_until_a_line_is_provided() {
        let mut interp = Interpreter::default();
        interp.execute_line("10 INPUT A");
        interp.execute_line("20 PRINT A*2");
        interp.prime_direct("RUN");
        let outcome = interp.run_to_suspension();
        assert!(matches!(outcome, LineOutcome::Ok) == false || interp.is_waiting_for_input());
        assert!(interp.is_waiting_for_input());
        interp.provide_input("21".to_string()).unwrap();
        let outcome = interp.run();
        assert!(matches!(outcome, LineOutcome::Ok));
        assert!(interp.screen().get_content().starts_with(" 42"));
    }

    #[test]
    fn array_subscript_out_of_range_errors() {
        let mut interp = Interpreter::default();
        interp.execute_line("10 DIM A(5)");
        interp.execute_line("20 A(10)=1");
        match interp.execute_line("RUN") {
            LineOutcome::Error(e) => assert_eq!(e.kind, BasicError::SubscriptOutOfRange),
            _ => panic!("expected a subscript error"),
        }
    }

    #[test]
    fn stop_then_cont_resumes_after_the_stop() {
        let interp = {
            let mut interp = Interpreter::default();
            interp.execute_line("10 PRINT \"A\"");
            interp.execute_line("20 STOP");
            interp.execute_line("30 PRINT \"B\"");
            match interp.execute_line("RUN") {
                LineOutcome::Stopped(line) => assert_eq!(line, 20),
                _ => panic!("expected STOP to halt the run"),
            }
            interp.execute_line("CONT");
            interp
        };
        assert!(interp.screen().get_content().starts_with("A\nB"));
    }

    struct SharedFlagBreak(std::rc::Rc<std::cell::Cell<bool>>);

    impl BreakSignal for SharedFlagBreak {
        fn is_set(&self) -> bool {
            self.0.get()
        }
        fn reset(&mut self) {
            self.0.set(false);
        }
    }

    #[test]
    fn break_during_input_discards_the_prompt_and_returns_to_direct_mode() {
        let flag = std::rc::Rc::new(std::cell::Cell::new(false));
        let mut interp =
            Interpreter::default().with_break_signal(Box::new(SharedFlagBreak(flag.clone())));
        interp.execute_line("10 INPUT A");
        interp.execute_line("20 PRINT A");
        interp.prime_direct("RUN");
        let outcome = interp.run_to_suspension();
        assert!(matches!(outcome, LineOutcome::Ok));
        assert!(interp.is_waiting_for_input());

        // Flip the break flag behind the interpreter's back, the way an
        // external interrupt handler would, then resume.
        flag.set(true);
        let outcome = interp.run();
        match outcome {
            LineOutcome::Error(e) => assert_eq!(e.kind, BasicError::Break),
            _ => panic!("expected BREAK to interrupt the pending INPUT"),
        }
        assert!(!interp.is_waiting_for_input());
        assert!(!flag.get(), "breaker should self-clear after being reported");
    }
}
