//! Expression trees and the builder turning read S-expressions into them.
//!
//! `build` recognises the special forms and validates their shape once, so
//! the evaluator can dispatch without re-checking. A call keeps its argument
//! forms as read, because a macro receives them as data and they need not be
//! valid expressions. `Expr::to_sexp` renders a tree back for display.

use crate::types::{BadParameters, ParamSpec, Value};
use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LetKind {
    Let,
    LetStar,
    LetRec,
}

impl LetKind {
    pub fn keyword(self) -> &'static str {
        match self {
            LetKind::Let => "let",
            LetKind::LetStar => "let*",
            LetKind::LetRec => "letrec",
        }
    }
}

#[derive(Debug, Clone)]
pub enum Defexpr {
    Setq(String, Box<Expr>),
    Defun(String, ParamSpec, Rc<Expr>),
    Defmacro(String, ParamSpec, Rc<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ModuleRef {
    Name(String),
    Path(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImportSpec {
    All,
    Only(Vec<String>),
    Alias(String),
}

#[derive(Debug, Clone)]
pub enum Expr {
    Literal(Value),
    Var(String),
    If(Box<Expr>, Box<Expr>, Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Begin(Vec<Expr>),
    /// `args` is only needed when the call is an application; `forms` is
    /// what a macro sees.
    Call {
        callee: Box<Expr>,
        args: BuildResult<Vec<Expr>>,
        forms: Vec<Value>,
    },
    Let(LetKind, Vec<(String, Expr)>, Box<Expr>),
    Lambda(Option<String>, ParamSpec, Rc<Expr>),
    Defexpr(Defexpr),
    Module {
        name: String,
        exports: Vec<String>,
        body: Vec<Expr>,
    },
    Import(ModuleRef, ImportSpec),
    Macroexpand(Value),
}

#[derive(Debug, Clone, PartialEq)]
pub enum BuildError {
    ImproperList(Value),
    WrongArgCount(&'static str, usize),
    ExpectedSymbol(&'static str, Value),
    BadBinding(&'static str, Value),
    BadParameters(&'static str, BadParameters),
    BadExports(Value),
    BadImport(Value),
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildError::ImproperList(v) => write!(f, "cannot evaluate improper list {}", v),
            BuildError::WrongArgCount(form, n) => {
                write!(f, "{}: wrong number of parts ({})", form, n)
            }
            BuildError::ExpectedSymbol(form, v) => write!(f, "{}: expected a symbol, got {}", form, v),
            BuildError::BadBinding(form, v) => write!(f, "{}: malformed binding {}", form, v),
            BuildError::BadParameters(form, e) => write!(f, "{}: {}", form, e),
            BuildError::BadExports(v) => write!(f, "module: malformed export list {}", v),
            BuildError::BadImport(v) => write!(f, "import: malformed import {}", v),
        }
    }
}

pub type BuildResult<T = Expr> = std::result::Result<T, BuildError>;

pub fn build(sexp: &Value) -> BuildResult {
    match sexp {
        Value::Symbol(s) => Ok(Expr::Var(s.0.clone())),
        Value::Pair(pair) => {
            let items = sexp
                .to_vec()
                .ok_or_else(|| BuildError::ImproperList(sexp.clone()))?;
            match &pair.car {
                Value::Symbol(head) => build_form(head.as_ref(), &items),
                _ => build_call(&items),
            }
        }
        _ => Ok(Expr::Literal(sexp.clone())),
    }
}

pub fn build_all(sexps: &[Value]) -> BuildResult<Vec<Expr>> {
    sexps.iter().map(build).collect()
}

fn build_form(head: &str, items: &[Value]) -> BuildResult {
    let args = &items[1..];
    match head {
        "quote" => wrapper("quote", args, Value::Quote),
        "quasiquote" => wrapper("quasiquote", args, Value::Quasiquote),
        "unquote" => wrapper("unquote", args, Value::Unquote),
        "unquote-splicing" => wrapper("unquote-splicing", args, Value::UnquoteSplicing),
        "if" => build_if(args),
        "and" => Ok(Expr::And(build_all(args)?)),
        "or" => Ok(Expr::Or(build_all(args)?)),
        "begin" => Ok(Expr::Begin(build_all(args)?)),
        "lambda" => build_lambda(args),
        "let" => build_let(LetKind::Let, args),
        "let*" => build_let(LetKind::LetStar, args),
        "letrec" => build_let(LetKind::LetRec, args),
        "define" => build_setq("define", args),
        "setq" => build_setq("setq", args),
        "defun" => build_definition("defun", args),
        "defmacro" => build_definition("defmacro", args),
        "module" => build_module(args),
        "import" => build_import(args),
        "macroexpand" => match args {
            [form] => Ok(Expr::Macroexpand(form.clone())),
            _ => Err(BuildError::WrongArgCount("macroexpand", args.len())),
        },
        _ => build_call(items),
    }
}

fn wrapper(form: &'static str, args: &[Value], wrap: fn(Rc<Value>) -> Value) -> BuildResult {
    match args {
        [inner] => Ok(Expr::Literal(wrap(Rc::new(inner.clone())))),
        _ => Err(BuildError::WrongArgCount(form, args.len())),
    }
}

fn build_call(items: &[Value]) -> BuildResult {
    let callee = build(&items[0])?;
    let forms = items[1..].to_vec();
    Ok(Expr::Call {
        callee: Box::new(callee),
        args: build_all(&forms),
        forms,
    })
}

fn build_if(args: &[Value]) -> BuildResult {
    let (condition, then, otherwise) = match args {
        [c, t] => (c, t, None),
        [c, t, f] => (c, t, Some(f)),
        _ => return Err(BuildError::WrongArgCount("if", args.len())),
    };
    let otherwise = match otherwise {
        Some(f) => build(f)?,
        None => Expr::Literal(Value::Nil),
    };
    Ok(Expr::If(
        Box::new(build(condition)?),
        Box::new(build(then)?),
        Box::new(otherwise),
    ))
}

fn build_body(form: &'static str, forms: &[Value]) -> BuildResult {
    match forms {
        [] => Err(BuildError::WrongArgCount(form, 0)),
        [single] => build(single),
        _ => Ok(Expr::Begin(build_all(forms)?)),
    }
}

fn symbol_name(form: &'static str, value: &Value) -> BuildResult<String> {
    match value {
        Value::Symbol(s) => Ok(s.0.clone()),
        _ => Err(BuildError::ExpectedSymbol(form, value.clone())),
    }
}

fn build_params(form: &'static str, list: &Value) -> BuildResult<ParamSpec> {
    let items = list
        .to_vec()
        .ok_or_else(|| BuildError::BadParameters(form, BadParameters::NotASymbol(list.to_string())))?;
    let names = items
        .iter()
        .map(|p| match p {
            Value::Symbol(s) => Ok(s.0.clone()),
            _ => Err(BuildError::BadParameters(form, BadParameters::NotASymbol(p.to_string()))),
        })
        .collect::<BuildResult<Vec<_>>>()?;
    ParamSpec::new(names).map_err(|e| BuildError::BadParameters(form, e))
}

fn build_lambda(args: &[Value]) -> BuildResult {
    if args.len() < 2 {
        return Err(BuildError::WrongArgCount("lambda", args.len()));
    }
    let params = build_params("lambda", &args[0])?;
    let body = build_body("lambda", &args[1..])?;
    Ok(Expr::Lambda(None, params, Rc::new(body)))
}

fn build_let(kind: LetKind, args: &[Value]) -> BuildResult {
    let form = kind.keyword();
    if args.len() < 2 {
        return Err(BuildError::WrongArgCount(form, args.len()));
    }
    let bindings = args[0]
        .to_vec()
        .ok_or_else(|| BuildError::BadBinding(form, args[0].clone()))?;
    let bindings = bindings
        .iter()
        .map(|binding| match binding.to_vec().as_deref() {
            Some([Value::Symbol(name), init]) => Ok((name.0.clone(), build(init)?)),
            _ => Err(BuildError::BadBinding(form, binding.clone())),
        })
        .collect::<BuildResult<Vec<_>>>()?;
    let body = build_body(form, &args[1..])?;
    Ok(Expr::Let(kind, bindings, Box::new(body)))
}

fn build_setq(form: &'static str, args: &[Value]) -> BuildResult {
    match args {
        [name, value] => Ok(Expr::Defexpr(Defexpr::Setq(
            symbol_name(form, name)?,
            Box::new(build(value)?),
        ))),
        _ => Err(BuildError::WrongArgCount(form, args.len())),
    }
}

fn build_definition(form: &'static str, args: &[Value]) -> BuildResult {
    if args.len() < 3 {
        return Err(BuildError::WrongArgCount(form, args.len()));
    }
    let name = symbol_name(form, &args[0])?;
    let params = build_params(form, &args[1])?;
    let body = Rc::new(build_body(form, &args[2..])?);
    let definition = match form {
        "defun" => Defexpr::Defun(name, params, body),
        _ => Defexpr::Defmacro(name, params, body),
    };
    Ok(Expr::Defexpr(definition))
}

fn build_module(args: &[Value]) -> BuildResult {
    if args.len() < 2 {
        return Err(BuildError::WrongArgCount("module", args.len()));
    }
    let name = symbol_name("module", &args[0])?;
    let exports = match args[1].to_vec().as_deref() {
        Some([Value::Symbol(head), names @ ..]) if head.as_ref() == "export" => names
            .iter()
            .map(|n| symbol_name("export", n))
            .collect::<BuildResult<Vec<_>>>()?,
        _ => return Err(BuildError::BadExports(args[1].clone())),
    };
    Ok(Expr::Module {
        name,
        exports,
        body: build_all(&args[2..])?,
    })
}

fn build_import(args: &[Value]) -> BuildResult {
    let target = match args.first() {
        Some(Value::Symbol(s)) => ModuleRef::Name(s.0.clone()),
        Some(Value::String(path)) => ModuleRef::Path(path.clone()),
        _ => return Err(BuildError::BadImport(Value::list(args.to_vec()))),
    };
    let spec = match &args[1..] {
        [] => ImportSpec::All,
        [Value::Symbol(kw), Value::Symbol(alias)] if kw.as_ref() == ":as" => {
            ImportSpec::Alias(alias.0.clone())
        }
        [names] => match names.to_vec() {
            Some(names) => ImportSpec::Only(
                names
                    .iter()
                    .map(|n| symbol_name("import", n))
                    .collect::<BuildResult<Vec<_>>>()?,
            ),
            None => return Err(BuildError::BadImport(names.clone())),
        },
        _ => return Err(BuildError::BadImport(Value::list(args.to_vec()))),
    };
    Ok(Expr::Import(target, spec))
}

fn symbol(name: &str) -> Value {
    Value::symbol(name)
}

fn params_sexp(params: &ParamSpec) -> Value {
    let mut items: Vec<Value> = params.fixed.iter().map(|p| symbol(p)).collect();
    if let Some(rest) = &params.rest {
        items.push(symbol(crate::types::REST_MARKER));
        items.push(symbol(rest));
    }
    Value::list(items)
}

/// The forms making up a body: a `Begin` is flattened back into its parts.
fn body_sexps(body: &Expr) -> Vec<Value> {
    match body {
        Expr::Begin(forms) if !forms.is_empty() => forms.iter().map(Expr::to_sexp).collect(),
        other => vec![other.to_sexp()],
    }
}

fn form(head: &str, mut rest: Vec<Value>) -> Value {
    rest.insert(0, symbol(head));
    Value::list(rest)
}

impl Expr {
    /// An S-expression that builds back to an equivalent expression. Sugar
    /// is normalised: a missing `else` comes back as `()` and `setq` as
    /// `define`.
    pub fn to_sexp(&self) -> Value {
        match self {
            Expr::Literal(v) => v.clone(),
            Expr::Var(name) => symbol(name),
            Expr::If(c, t, f) => form("if", vec![c.to_sexp(), t.to_sexp(), f.to_sexp()]),
            Expr::And(xs) => form("and", xs.iter().map(Expr::to_sexp).collect()),
            Expr::Or(xs) => form("or", xs.iter().map(Expr::to_sexp).collect()),
            Expr::Begin(xs) => form("begin", xs.iter().map(Expr::to_sexp).collect()),
            Expr::Call { callee, forms, .. } => {
                let mut items = vec![callee.to_sexp()];
                items.extend(forms.iter().cloned());
                Value::list(items)
            }
            Expr::Let(kind, bindings, body) => {
                let bindings = bindings
                    .iter()
                    .map(|(name, init)| Value::list(vec![symbol(name), init.to_sexp()]))
                    .collect();
                let mut parts = vec![Value::list(bindings)];
                parts.extend(body_sexps(body));
                form(kind.keyword(), parts)
            }
            Expr::Lambda(_, params, body) => {
                let mut parts = vec![params_sexp(params)];
                parts.extend(body_sexps(body));
                form("lambda", parts)
            }
            Expr::Defexpr(Defexpr::Setq(name, value)) => {
                form("define", vec![symbol(name), value.to_sexp()])
            }
            Expr::Defexpr(Defexpr::Defun(name, params, body)) => {
                let mut parts = vec![symbol(name), params_sexp(params)];
                parts.extend(body_sexps(body));
                form("defun", parts)
            }
            Expr::Defexpr(Defexpr::Defmacro(name, params, body)) => {
                let mut parts = vec![symbol(name), params_sexp(params)];
                parts.extend(body_sexps(body));
                form("defmacro", parts)
            }
            Expr::Module {
                name,
                exports,
                body,
            } => {
                let exports = form("export", exports.iter().map(|e| symbol(e)).collect());
                let mut parts = vec![symbol(name), exports];
                parts.extend(body.iter().map(Expr::to_sexp));
                form("module", parts)
            }
            Expr::Import(target, spec) => {
                let mut parts = vec![match target {
                    ModuleRef::Name(n) => symbol(n),
                    ModuleRef::Path(p) => Value::string(p),
                }];
                match spec {
                    ImportSpec::All => {}
                    ImportSpec::Only(names) => {
                        parts.push(Value::list(names.iter().map(|n| symbol(n)).collect()))
                    }
                    ImportSpec::Alias(alias) => {
                        parts.push(symbol(":as"));
                        parts.push(symbol(alias));
                    }
                }
                form("import", parts)
            }
            Expr::Macroexpand(sexp) => form("macroexpand", vec![sexp.clone()]),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_sexp())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::read_str;

    fn parse(src: &str) -> BuildResult {
        build(&read_str(src).unwrap())
    }

    #[test]
    fn symbols_become_variables() {
        assert!(matches!(parse("x"), Ok(Expr::Var(name)) if name == "x"));
        assert!(matches!(parse("42"), Ok(Expr::Literal(Value::Int(42)))));
    }

    #[test]
    fn special_forms_are_recognised() {
        assert!(matches!(parse("(if a b)"), Ok(Expr::If(..))));
        assert!(matches!(parse("(letrec ((f 1)) f)"), Ok(Expr::Let(LetKind::LetRec, _, _))));
        assert!(matches!(
            parse("(defun f (x) x)"),
            Ok(Expr::Defexpr(Defexpr::Defun(..)))
        ));
        assert!(matches!(parse("'x"), Ok(Expr::Literal(Value::Quote(_)))));
        assert!(matches!(
            parse("(f 1 2)"),
            Ok(Expr::Call { args: Ok(args), .. }) if args.len() == 2
        ));
    }

    #[test]
    fn lambda_bodies_with_several_forms_become_begin() {
        match parse("(lambda (x) (print x) x)") {
            Ok(Expr::Lambda(None, params, body)) => {
                assert_eq!(params.fixed, vec!["x".to_string()]);
                assert!(matches!(&*body, Expr::Begin(forms) if forms.len() == 2));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn malformed_forms_are_rejected() {
        assert!(matches!(parse("(if)"), Err(BuildError::WrongArgCount("if", 0))));
        assert!(matches!(parse("(let (x) x)"), Err(BuildError::BadBinding(..))));
        assert!(matches!(
            parse("(lambda (x x) x)"),
            Err(BuildError::BadParameters(_, BadParameters::Duplicate(_)))
        ));
        assert!(matches!(parse("(define 1 2)"), Err(BuildError::ExpectedSymbol(..))));
        assert!(matches!(parse("(f . x)"), Err(BuildError::ImproperList(_))));
    }

    #[test]
    fn call_arguments_keep_their_source_forms() {
        match parse("(f (if) (a . b) (setq x 1))") {
            Ok(Expr::Call { args, forms, .. }) => {
                assert!(matches!(args, Err(BuildError::WrongArgCount("if", 0))));
                assert_eq!(forms, read_str("((if) (a . b) (setq x 1))").unwrap().to_vec().unwrap());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn imports_take_three_shapes() {
        assert!(matches!(
            parse("(import m)"),
            Ok(Expr::Import(ModuleRef::Name(_), ImportSpec::All))
        ));
        assert!(matches!(
            parse("(import m (a b))"),
            Ok(Expr::Import(_, ImportSpec::Only(names))) if names.len() == 2
        ));
        assert!(matches!(
            parse("(import m :as n)"),
            Ok(Expr::Import(_, ImportSpec::Alias(alias))) if alias == "n"
        ));
        assert!(matches!(
            parse("(import \"lib/m.mlisp\")"),
            Ok(Expr::Import(ModuleRef::Path(_), ImportSpec::All))
        ));
    }

    #[test]
    fn to_sexp_rebuilds_the_source() {
        for src in &[
            "(defun f (a &rest b) (g a) b)",
            "(let* ((x 1) (y x)) (+ x y))",
            "(module m (export y) (define y 10))",
            "(import m :as n)",
            "(if a b c)",
            "`(1 ,x ,@ys)",
        ] {
            let sexp = read_str(src).unwrap();
            assert_eq!(parse(src).unwrap().to_sexp(), sexp, "{}", src);
        }
    }
}
