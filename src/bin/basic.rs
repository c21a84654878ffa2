//! Thin terminal frontend for `basic64`: loads a `.bas` source file (or,
//! with `--prg`, a tokenized C64 `.prg` image), then drives the
//! interpreter inside a ratatui/crossterm screen until the program ends
//! or the user presses Esc.
//!
//! Grounded on the teacher's `basic-emulator/src/main.rs` event loop
//! shape (raw-mode terminal, poll-for-Esc, `step()` per tick), adapted
//! to the new `Interpreter`'s line-based `INPUT` (`provide_input`) and
//! non-blocking `GET` (`InputSource::poll_char`) instead of the
//! teacher's char-by-char `handle_input_*` methods.

use std::collections::VecDeque;
use std::env;
use std::fs;
use std::io;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossterm::{
    event::{self, poll, DisableMouseCapture, EnableMouseCapture, Event, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};

use basic64::{BreakSignal, InputSource, Interpreter, InterpreterConfig, StepOutcome};

/// Characters typed while the interpreter is *not* waiting on `INPUT`
/// are queued here for `GET` to poll non-blockingly.
#[derive(Clone, Default)]
struct KeyQueue(Arc<Mutex<VecDeque<char>>>);

impl KeyQueue {
    fn push(&self, c: char) {
        self.0.lock().unwrap().push_back(c);
    }
}

impl InputSource for KeyQueue {
    // `INPUT` is driven directly by the event loop via `provide_input`;
    // this source only ever services `GET`.
    fn read_line(&mut self) -> Option<String> {
        None
    }

    fn poll_char(&mut self) -> Option<char> {
        self.0.lock().unwrap().pop_front()
    }
}

#[derive(Clone, Default)]
struct EscBreak(Arc<AtomicBool>);

impl EscBreak {
    fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

impl BreakSignal for EscBreak {
    fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn reset(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

fn main() {
    let args: Vec<String> = env::args().collect();

    let mut prg_mode = false;
    let mut filename = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--prg" => prg_mode = true,
            arg if !arg.starts_with("--") => filename = Some(arg.to_string()),
            _ => {
                eprintln!("Unknown option: {}", args[i]);
                print_usage(&args[0]);
                process::exit(1);
            }
        }
        i += 1;
    }

    let filename = filename.unwrap_or_else(|| {
        print_usage(&args[0]);
        process::exit(1);
    });

    let mut interpreter = Interpreter::new(InterpreterConfig::default());

    if prg_mode {
        let program = basic64::prg::load_from_file(&filename).unwrap_or_else(|e| {
            eprintln!("Error reading PRG file {}: {}", filename, e);
            process::exit(1);
        });
        for (number, tokens) in program.iter() {
            let text = basic64::token::detokenize(tokens);
            interpreter.execute_line(&format!("{} {}", number, text));
        }
    } else {
        let source = fs::read_to_string(&filename).unwrap_or_else(|e| {
            eprintln!("Error reading file {}: {}", filename, e);
            process::exit(1);
        });
        for line in source.lines() {
            if line.trim().is_empty() {
                continue;
            }
            interpreter.execute_line(line);
        }
    }

    let keys = KeyQueue::default();
    let breaker = EscBreak::default();
    let mut interpreter = interpreter
        .with_input(Box::new(keys.clone()))
        .with_break_signal(Box::new(breaker.clone()));

    interpreter.prime_direct("RUN");

    if let Err(e) = run_terminal(&mut interpreter, &keys, &breaker) {
        eprintln!("Terminal error: {}", e);
        process::exit(1);
    }
}

fn run_terminal(
    interpreter: &mut Interpreter,
    keys: &KeyQueue,
    breaker: &EscBreak,
) -> io::Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_interpreter(&mut terminal, interpreter, keys, breaker);

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    result
}

fn run_interpreter(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    interpreter: &mut Interpreter,
    keys: &KeyQueue,
    breaker: &EscBreak,
) -> io::Result<()> {
    let mut input_buffer = String::new();

    loop {
        terminal.draw(|f| interpreter.screen().draw(f))?;

        if interpreter.is_waiting_for_input() {
            if let Event::Key(key) = event::read()? {
                match key.code {
                    KeyCode::Char(c) => {
                        input_buffer.push(c);
                    }
                    KeyCode::Backspace => {
                        input_buffer.pop();
                    }
                    KeyCode::Enter => {
                        let line = std::mem::take(&mut input_buffer);
                        // A bad numeric INPUT re-prompts on the next loop
                        // tick rather than erroring the whole program.
                        let _ = interpreter.provide_input(line);
                    }
                    KeyCode::Esc => return Ok(()),
                    _ => {}
                }
            }
            continue;
        }

        if poll(Duration::from_millis(0))? {
            if let Event::Key(key) = event::read()? {
                match key.code {
                    KeyCode::Esc => {
                        breaker.set();
                    }
                    KeyCode::Char(c) => keys.push(c),
                    _ => {}
                }
            }
        }

        match interpreter.step() {
            StepOutcome::Continue => {
                std::thread::sleep(Duration::from_micros(100));
            }
            StepOutcome::WaitingForInput => {
                // Loop back around; the next iteration reads the prompt.
            }
            StepOutcome::Ended | StepOutcome::Stopped(_) => {
                event::read()?;
                return Ok(());
            }
            StepOutcome::Errored(e) => {
                interpreter.screen().print(&format!("\n{}", e));
                terminal.draw(|f| interpreter.screen().draw(f))?;
                event::read()?;
                return Ok(());
            }
        }
    }
}

fn print_usage(program_name: &str) {
    eprintln!("Usage: {} [--prg] <program.bas|program.prg>", program_name);
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --prg    Load a tokenized Commodore 64 PRG file instead of plain text BASIC");
    eprintln!();
    eprintln!("Examples:");
    eprintln!("  {} program.bas           # Load plain text BASIC file", program_name);
    eprintln!("  {} --prg program.prg     # Load tokenized PRG file", program_name);
}
