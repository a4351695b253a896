use crate::ast::{BuildError, BuildResult, Expr};
use crate::closure::{self, ClosureStrategy};
use crate::config::Config;
use crate::environment::Environment;
use crate::modules::ModuleLoader;
use crate::types::{ArityMismatch, Closure, PrimitiveFn, TypeMismatch, Value};
use crate::{macros, special_forms};
use itertools::Itertools;
use std::fmt;
use std::rc::Rc;

pub type Result<T = Value> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    NameNotFound(String),
    UnspecifiedValue(String),
    ArityMismatch(ArityMismatch),
    NotAMacro(String),
    NotAModule(String),
    ModuleLoadError { path: String, reason: String },
    TypeError(String),
    ExpansionLimit { name: String, limit: usize },
    Syntax(BuildError),
    Primitive { name: &'static str, reason: String },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NameNotFound(name) => write!(f, "'{}' not found", name),
            Error::UnspecifiedValue(name) => {
                write!(f, "'{}' was read before its value was assigned", name)
            }
            Error::ArityMismatch(e) => write!(f, "{}", e),
            Error::NotAMacro(name) => write!(f, "'{}' is not a macro", name),
            Error::NotAModule(name) => write!(f, "'{}' is not a module", name),
            Error::ModuleLoadError { path, reason } => {
                write!(f, "cannot load module {}: {}", path, reason)
            }
            Error::TypeError(context) => write!(f, "type error: {}", context),
            Error::ExpansionLimit { name, limit } => write!(
                f,
                "expanding macro {} did not settle after {} steps",
                name, limit
            ),
            Error::Syntax(e) => write!(f, "syntax error: {}", e),
            Error::Primitive { name, reason } => write!(f, "{}: {}", name, reason),
        }
    }
}

impl std::error::Error for Error {}

impl From<TypeMismatch> for Error {
    fn from(t: TypeMismatch) -> Self {
        Self::TypeError(t.to_string())
    }
}

impl From<BuildError> for Error {
    fn from(e: BuildError) -> Self {
        Self::Syntax(e)
    }
}

/// Everything evaluation needs besides the expression and its environment.
pub struct Context {
    pub closure_strategy: ClosureStrategy,
    pub max_expansion_depth: usize,
    pub loader: ModuleLoader,
    /// The environment holding the primitives; files are loaded beneath it.
    pub root: Rc<Environment>,
}

impl Context {
    pub fn new(config: &Config, root: Rc<Environment>) -> Self {
        Context {
            closure_strategy: config.closure_strategy,
            max_expansion_depth: config.max_expansion_depth,
            loader: ModuleLoader::new(config.search_paths.clone()),
            root,
        }
    }
}

pub fn eval(expr: &Expr, env: &Rc<Environment>, ctx: &Context) -> Result {
    log::trace!("eval {}", expr);
    match expr {
        Expr::Literal(value) => eval_literal(value, env, ctx),
        Expr::Var(name) => match env.lookup(name)? {
            Value::Unspecified => Err(Error::UnspecifiedValue(name.clone())),
            value => Ok(value),
        },
        Expr::If(condition, then, otherwise) => {
            special_forms::apply_if(condition, then, otherwise, env, ctx)
        }
        Expr::And(exprs) => special_forms::apply_and(exprs, env, ctx),
        Expr::Or(exprs) => special_forms::apply_or(exprs, env, ctx),
        Expr::Begin(exprs) => special_forms::apply_begin(exprs, env, ctx),
        Expr::Call {
            callee,
            args,
            forms,
        } => eval_call(callee, args, forms, env, ctx),
        Expr::Let(kind, bindings, body) => special_forms::apply_let(*kind, bindings, body, env, ctx),
        Expr::Lambda(name, params, body) => {
            let closure = closure::make_closure(name.clone(), params, body, env, ctx.closure_strategy);
            Ok(Value::Closure(Rc::new(closure)))
        }
        Expr::Defexpr(definition) => special_forms::apply_def(definition, env, ctx),
        Expr::Module {
            name,
            exports,
            body,
        } => ctx
            .loader
            .define(name, exports, body, env, ctx)
            .map(Value::Module),
        Expr::Import(target, spec) => {
            let module = ctx.loader.resolve(target, env, ctx)?;
            ctx.loader.import(&module, spec, env)
        }
        Expr::Macroexpand(form) => macros::macroexpand(form, env, ctx),
    }
}

/// Evaluates one top-level form, handing back the environment the next form
/// should run in.
pub fn eval_toplevel(
    expr: &Expr,
    env: &Rc<Environment>,
    ctx: &Context,
) -> Result<(Value, Rc<Environment>)> {
    let value = eval(expr, env, ctx)?;
    Ok((value, env.clone()))
}

/// Builds and evaluates an S-expression, as unquotes and macro bodies need.
pub fn eval_sexp(sexp: &Value, env: &Rc<Environment>, ctx: &Context) -> Result {
    let expr = crate::ast::build(sexp)?;
    eval(&expr, env, ctx)
}

fn eval_literal(value: &Value, env: &Rc<Environment>, ctx: &Context) -> Result {
    match value {
        Value::Quote(inner) => Ok((**inner).clone()),
        Value::Quasiquote(template) => macros::quasiquote(template, env, ctx),
        Value::Unquote(_) | Value::UnquoteSplicing(_) => Err(Error::TypeError(format!(
            "{} outside of quasiquote",
            value.type_name()
        ))),
        _ => Ok(value.clone()),
    }
}

fn eval_call(
    callee: &Expr,
    args: &BuildResult<Vec<Expr>>,
    forms: &[Value],
    env: &Rc<Environment>,
    ctx: &Context,
) -> Result {
    if let Some((name, mac)) = macros::macro_at(callee, env) {
        let expansion = macros::expand(&name, &mac, forms, env, ctx)?;
        log::trace!("{} expanded to {}", name, expansion);
        return eval(&expansion, env, ctx);
    }
    let args = args.as_ref().map_err(|e| Error::Syntax(e.clone()))?;
    let function = eval(callee, env, ctx)?;
    let args = evaluate_sequence(args, env, ctx)?;
    apply(&function, args, ctx)
}

pub fn evaluate_sequence(exprs: &[Expr], env: &Rc<Environment>, ctx: &Context) -> Result<Vec<Value>> {
    exprs.iter().map(|expr| eval(expr, env, ctx)).collect()
}

pub fn apply(callable: &Value, args: Vec<Value>, ctx: &Context) -> Result {
    match callable {
        Value::Primitive(f) => call_primitive(f, &args, ctx),
        Value::Closure(f) => call_closure(f, args, ctx),
        Value::Macro(m) => Err(Error::TypeError(format!(
            "macro {} cannot be applied as a function",
            m.name
        ))),
        other => Err(Error::TypeError(format!(
            "cannot apply {} of type {}",
            other,
            other.type_name()
        ))),
    }
}

pub(crate) fn pretty_print_args(args: &[Value]) -> String {
    match args.len() {
        0 => "no args".into(),
        1 => args[0].to_string(),
        _ => format!("\n\t{}", args.iter().join("\n\t")),
    }
}

pub fn call_primitive(func: &PrimitiveFn, args: &[Value], ctx: &Context) -> Result {
    func.arity.validate_for(args.len(), func.name)?;
    log::trace!("call {} with {}", func.name, pretty_print_args(args));
    let result = (func.fn_ptr)(args, ctx);
    match &result {
        Ok(val) => log::trace!("call to {} resulted in {}", func.name, val),
        Err(e) => log::trace!("call to {} failed: {}", func.name, e),
    }
    result
}

fn call_closure(func: &Closure, args: Vec<Value>, ctx: &Context) -> Result {
    log::trace!("call {} with {}", func.display_name(), pretty_print_args(&args));
    let env = closure::call_frame(func);
    closure::bind_arguments(&func.params, args, &env, func.display_name())?;
    eval(&func.body, &env, ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::Interpreter;

    fn run(src: &str) -> Result {
        let interpreter = Interpreter::default();
        match interpreter.eval_str(src) {
            Ok(value) => Ok(value),
            Err(crate::interpreter::Error::Eval(e)) => Err(e),
            Err(e) => panic!("read failure: {}", e),
        }
    }

    #[test]
    fn literals_evaluate_to_themselves() {
        assert_eq!(run("42").unwrap(), Value::Int(42));
        assert_eq!(run("\"hi\"").unwrap(), Value::string("hi"));
        assert_eq!(run("'sym").unwrap(), Value::symbol("sym"));
    }

    #[test]
    fn only_false_selects_the_else_branch() {
        assert_eq!(run("(if '() 1 2)").unwrap(), Value::Int(1));
        assert_eq!(run("(if #f 1 2)").unwrap(), Value::Int(2));
        assert_eq!(run("(if #f 1)").unwrap(), Value::Nil);
    }

    #[test]
    fn and_or_short_circuit() {
        assert_eq!(run("(and 1 #f (undefined))").unwrap(), Value::Bool(false));
        assert_eq!(run("(or #f 2 (undefined))").unwrap(), Value::Int(2));
        assert_eq!(run("(and)").unwrap(), Value::Bool(true));
        assert_eq!(run("(or)").unwrap(), Value::Bool(false));
    }

    #[test]
    fn arguments_evaluate_left_to_right() {
        assert!(matches!(run("(list (car 1) missing)"), Err(Error::TypeError(_))));
        assert!(matches!(run("(list missing (car 1))"), Err(Error::NameNotFound(_))));
    }

    #[test]
    fn applying_a_non_function_is_a_type_error() {
        assert!(matches!(run("(1 2)"), Err(Error::TypeError(_))));
        assert!(matches!(run("(\"f\")"), Err(Error::TypeError(_))));
    }

    #[test]
    fn let_is_parallel_let_star_is_sequential() {
        assert_eq!(run("(define x 1) (let ((x 2) (y x)) y)").unwrap(), Value::Int(1));
        assert_eq!(run("(define x 1) (let* ((x 2) (y x)) y)").unwrap(), Value::Int(2));
    }

    #[test]
    fn letrec_reads_before_assignment_are_reported() {
        assert!(matches!(
            run("(letrec ((a b) (b 1)) a)"),
            Err(Error::UnspecifiedValue(name)) if name == "b"
        ));
    }

    #[test]
    fn unquote_outside_quasiquote_is_rejected() {
        assert!(matches!(run(",x"), Err(Error::TypeError(_))));
    }

    #[test]
    fn toplevel_threads_the_same_environment() {
        let interpreter = Interpreter::default();
        let env = interpreter.env().clone();
        let expr = crate::ast::build(&crate::reader::read_str("(define z 5)").unwrap()).unwrap();
        let (value, next) = eval_toplevel(&expr, &env, interpreter.context()).unwrap();
        assert_eq!(value, Value::Int(5));
        assert!(Rc::ptr_eq(&env, &next));
        assert_eq!(next.lookup("z").unwrap(), Value::Int(5));
    }
}
