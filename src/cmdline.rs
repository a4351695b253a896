use crate::config::{self, Config, USAGE};
use crate::interpreter::{self, Interpreter};
use crate::reader;
use ansi_term::Colour::Red;
use linefeed::{DefaultTerminal, Interface, ReadResult, Terminal};
use std::fmt;
use std::path::{Path, PathBuf};

const PROMPT: &str = "mlisp> ";
const CONTINUATION_PROMPT: &str = "  ...> ";

#[derive(Debug)]
pub enum Error {
    Config(config::Error),
    Io(std::io::Error),
    Interpreter(interpreter::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(e) => write!(f, "{}\n{}", e, USAGE),
            Error::Io(e) => write!(f, "terminal error: {}", e),
            Error::Interpreter(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for Error {}

impl From<config::Error> for Error {
    fn from(e: config::Error) -> Self {
        Error::Config(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<interpreter::Error> for Error {
    fn from(e: interpreter::Error) -> Self {
        Error::Interpreter(e)
    }
}

/// Formats an error for stderr, in red when stderr is a terminal.
pub fn report(error: &dyn fmt::Display) -> String {
    let text = format!("error: {}", error);
    match atty::is(atty::Stream::Stderr) {
        true => Red.paint(text).to_string(),
        false => text,
    }
}

pub fn setup(load_history: bool) -> std::io::Result<Interface<DefaultTerminal>> {
    let interface = linefeed::Interface::new("mlisp")?;
    interface.set_prompt(PROMPT)?;
    if let Some(path) = history_path().filter(|_| load_history) {
        interface.load_history(path).ok();
    };
    Ok(interface)
}

fn history_path() -> Option<PathBuf> {
    dirs::data_dir().map(|path| path.join(".mlisp_history"))
}

pub fn save_history<T: Terminal>(interface: &Interface<T>) -> std::io::Result<()> {
    match history_path() {
        Some(path) => interface.save_history(path),
        None => Ok(()),
    }
}

/// Whether `source` stops partway through a form.
fn needs_more_input(source: &str) -> bool {
    match reader::read_all(source) {
        Err(e) => e.is_incomplete(),
        Ok(_) => false,
    }
}

/// Reads lines until they make up complete forms, then evaluates them.
/// Errors are reported and the loop carries on.
pub fn repl<T: Terminal>(interface: &Interface<T>, interpreter: &Interpreter) -> std::io::Result<()> {
    let mut pending = String::new();
    loop {
        interface.set_prompt(match pending.is_empty() {
            true => PROMPT,
            false => CONTINUATION_PROMPT,
        })?;
        match interface.read_line() {
            Ok(ReadResult::Eof) => break,
            Ok(ReadResult::Signal(sig)) => {
                pending.clear();
                writeln!(interface, "Received signal {:?}", sig)?;
            }
            Ok(ReadResult::Input(line)) => {
                pending.push_str(&line);
                pending.push('\n');
                if needs_more_input(&pending) {
                    continue;
                }
                let source = std::mem::take(&mut pending);
                interface.add_history_unique(source.trim_end().to_string());
                match interpreter.eval_str(&source) {
                    Ok(value) => writeln!(interface, "{}", value)?,
                    Err(e) => eprintln!("{}", report(&e)),
                }
            }
            Err(e) => {
                eprintln!("{}", report(&e));
                break;
            }
        }
    }
    Ok(())
}

/// Entry point shared by the binary: `args` includes the program name.
/// With files, runs each and stops at the first error; otherwise starts
/// the REPL.
pub fn launch(args: Vec<String>) -> Result<(), Error> {
    if args.iter().skip(1).any(|arg| arg == "-h" || arg == "--help") {
        println!("{}", USAGE);
        return Ok(());
    }
    let invocation = Config::from_args(args.into_iter().skip(1))?;
    log::info!("starting with {:?}", invocation.config);
    let history = invocation.config.history;
    let interpreter = Interpreter::new(invocation.config)?;

    if !invocation.files.is_empty() {
        for file in &invocation.files {
            interpreter.eval_file(Path::new(file))?;
        }
        return Ok(());
    }

    let interface = setup(history)?;
    repl(&interface, &interpreter)?;
    if history {
        save_history(&interface)?;
    }
    Ok(())
}
