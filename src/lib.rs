//! MLisp: a small lexically scoped Lisp with macros and modules.

#[macro_use]
extern crate lazy_static;

pub mod ast;
pub mod closure;
pub mod cmdline;
pub mod config;
pub mod core;
pub mod environment;
pub mod evaluator;
pub mod interpreter;
pub mod macros;
pub mod modules;
pub mod printer;
pub mod reader;
mod special_forms;
mod strings;
mod tokens;
pub mod types;

pub use config::Config;
pub use interpreter::Interpreter;
pub use types::Value;
