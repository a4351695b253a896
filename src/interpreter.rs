use crate::config::Config;
use crate::environment::Environment;
use crate::evaluator::{self, eval_toplevel, Context};
use crate::types::Value;
use crate::{ast, core, reader};
use std::fmt;
use std::path::Path;
use std::rc::Rc;

const PRELUDE: &str = r#"
(defmacro when (test &rest body) `(if ,test (begin ,@body) nil))
(defmacro unless (test &rest body) `(if ,test nil (begin ,@body)))
(defmacro cond (&rest clauses)
  (if (null? clauses)
      nil
      (let ((clause (car clauses)))
        (if (eq? (car clause) 'else)
            `(begin ,@(cdr clause))
            `(if ,(car clause)
                 (begin ,@(cdr clause))
                 (cond ,@(cdr clauses)))))))

(defun cadr (x) (car (cdr x)))
(defun cddr (x) (cdr (cdr x)))
(defun caddr (x) (car (cddr x)))

(defun filter (keep? xs)
  (cond ((null? xs) nil)
        ((keep? (car xs)) (cons (car xs) (filter keep? (cdr xs))))
        (else (filter keep? (cdr xs)))))

(defun foldl (f acc xs)
  (if (null? xs) acc (foldl f (f acc (car xs)) (cdr xs))))
"#;

#[derive(Debug)]
pub enum Error {
    Read(reader::Error),
    Eval(evaluator::Error),
    Io { path: String, source: std::io::Error },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Read(e) => write!(f, "read error: {}", e),
            Error::Eval(e) => write!(f, "{}", e),
            Error::Io { path, source } => write!(f, "cannot read {}: {}", path, source),
        }
    }
}

impl std::error::Error for Error {}

impl From<reader::Error> for Error {
    fn from(e: reader::Error) -> Self {
        Error::Read(e)
    }
}

impl From<evaluator::Error> for Error {
    fn from(e: evaluator::Error) -> Self {
        Error::Eval(e)
    }
}

impl From<ast::BuildError> for Error {
    fn from(e: ast::BuildError) -> Self {
        Error::Eval(e.into())
    }
}

/// A root environment holding the primitives and prelude, plus the context
/// every evaluation runs with.
pub struct Interpreter {
    ctx: Context,
}

impl Interpreter {
    pub fn new(config: Config) -> Result<Self, Error> {
        let root = Environment::create(None);
        core::install(&root);
        let interpreter = Interpreter {
            ctx: Context::new(&config, root),
        };
        interpreter.eval_str(PRELUDE)?;
        log::debug!(
            "interpreter ready with {:?} closures and {} root bindings",
            config.closure_strategy,
            interpreter.env().names().len()
        );
        Ok(interpreter)
    }

    pub fn env(&self) -> &Rc<Environment> {
        &self.ctx.root
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Evaluates every form in `src` in order against the root environment,
    /// yielding the last value (`()` for no forms).
    pub fn eval_str(&self, src: &str) -> Result<Value, Error> {
        let forms = reader::read_all(src)?;
        let mut env = self.ctx.root.clone();
        let mut last = Value::Nil;
        for form in &forms {
            let expr = ast::build(form)?;
            let (value, next) = eval_toplevel(&expr, &env, &self.ctx)?;
            last = value;
            env = next;
        }
        Ok(last)
    }

    pub fn eval_file(&self, path: &Path) -> Result<Value, Error> {
        log::info!("running {}", path.display());
        let src = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.display().to_string(),
            source,
        })?;
        self.eval_str(&src)
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Interpreter::new(Config::default()).expect("the prelude evaluates")
    }
}
