//! Core of a re-implementation of Microsoft 6502 BASIC (the C64 dialect):
//! tokenizer/detokenizer, operator-precedence expression evaluator, and
//! statement dispatcher over a simulated 64 KiB memory image.
//!
//! The external REPL shell, `SAVE`/`LOAD` filesystem access, and
//! PETSCII<->ASCII mapping beyond what `CHR$`/`PRINT` need are out of
//! scope for the core; `src/bin/basic.rs` is a thin terminal frontend
//! that exercises it end to end.

pub mod array;
pub mod error;
pub mod eval;
pub mod interp;
pub mod memory;
pub mod prg;
pub mod program;
pub mod screen;
pub mod stack;
pub mod strheap;
pub mod token;
pub mod trace;
pub mod value;
pub mod vars;

pub use error::{BasicError, RuntimeError};
pub use interp::{
    BreakSignal, InputSource, Interpreter, InterpreterConfig, LineOutcome, NeverBreak, NoInput,
    QueueInput, StepOutcome,
};
pub use value::Value;
