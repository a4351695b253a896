//! Macro expansion and quasiquote templates.
//!
//! Hygiene is purely syntactic: every symbol `gensym` hands out during a run
//! is textually unique, so macro authors gensym any name that must not be
//! captured by, or capture, names at the call site.

use crate::ast::{self, Expr};
use crate::closure;
use crate::environment::Environment;
use crate::evaluator::{eval, eval_sexp, Context, Error, Result};
use crate::types::{Macro, Value};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

pub const DEFAULT_GENSYM_PREFIX: &str = "g";

/// Source of fresh symbol names. Monotonic, and safe to share between
/// threads should evaluation ever become parallel.
pub struct GensymCounter {
    next: AtomicU64,
}

impl GensymCounter {
    pub const fn new() -> Self {
        GensymCounter {
            next: AtomicU64::new(0),
        }
    }

    pub fn fresh(&self, prefix: &str) -> String {
        let n = self.next.fetch_add(1, Ordering::SeqCst);
        format!("{}__{}", prefix, n)
    }

    pub fn reset(&self) {
        self.next.store(0, Ordering::SeqCst);
    }
}

impl Default for GensymCounter {
    fn default() -> Self {
        Self::new()
    }
}

static GENSYM: GensymCounter = GensymCounter::new();

pub fn gensym(prefix: &str) -> Value {
    Value::symbol(&GENSYM.fresh(prefix))
}

/// The macro `callee` names in `env`, if any.
pub fn macro_at(callee: &Expr, env: &Environment) -> Option<(String, Rc<Macro>)> {
    match callee {
        Expr::Var(name) => match env.lookup(name) {
            Ok(Value::Macro(m)) => Some((name.clone(), m)),
            _ => None,
        },
        _ => None,
    }
}

/// Splits `(name args...)` when `name` is bound to a macro.
fn macro_form(sexp: &Value, env: &Environment) -> Option<(String, Rc<Macro>, Vec<Value>)> {
    let mut items = sexp.to_vec()?;
    let name = match items.first()? {
        Value::Symbol(s) => s.0.clone(),
        _ => return None,
    };
    match env.lookup(&name) {
        Ok(Value::Macro(m)) => {
            items.remove(0);
            Some((name, m, items))
        }
        _ => None,
    }
}

/// Runs the macro body once against unevaluated arguments.
fn expand_once(name: &str, mac: &Macro, args: Vec<Value>, ctx: &Context) -> Result {
    log::trace!("expand {} with {}", name, crate::evaluator::pretty_print_args(&args));
    let env = Environment::extend(&mac.env);
    closure::bind_arguments(&mac.params, args, &env, name)?;
    match eval(&mac.body, &env, ctx)? {
        Value::Quote(inner) => Ok((*inner).clone()),
        other => Ok(other),
    }
}

/// Expands until the result no longer starts with a macro, giving up after
/// `ctx.max_expansion_depth` steps.
fn expand_sexp(
    name: &str,
    mac: &Macro,
    args: Vec<Value>,
    env: &Environment,
    ctx: &Context,
) -> Result {
    let mut expansion = expand_once(name, mac, args, ctx)?;
    let mut steps = 1;
    while let Some((next_name, next_mac, next_args)) = macro_form(&expansion, env) {
        if steps >= ctx.max_expansion_depth {
            return Err(Error::ExpansionLimit {
                name: name.to_string(),
                limit: ctx.max_expansion_depth,
            });
        }
        expansion = expand_once(&next_name, &next_mac, next_args, ctx)?;
        steps += 1;
    }
    Ok(expansion)
}

/// Rewrites a call of `mac` into the expression to evaluate in its place.
/// `args` are the argument forms exactly as read.
pub fn expand(
    name: &str,
    mac: &Macro,
    args: &[Value],
    env: &Environment,
    ctx: &Context,
) -> Result<Expr> {
    let expansion = expand_sexp(name, mac, args.to_vec(), env, ctx)?;
    Ok(ast::build(&expansion)?)
}

/// `(macroexpand (m args...))`: the expansion as data, unevaluated.
pub fn macroexpand(form: &Value, env: &Environment, ctx: &Context) -> Result {
    match macro_form(form, env) {
        Some((name, mac, args)) => expand_sexp(&name, &mac, args, env, ctx),
        None => {
            let head = form
                .to_vec()
                .and_then(|items| items.first().cloned())
                .unwrap_or_else(|| form.clone());
            Err(Error::NotAMacro(head.to_string()))
        }
    }
}

pub fn quasiquote(template: &Value, env: &Rc<Environment>, ctx: &Context) -> Result {
    instantiate(template, 0, env, ctx)
}

/// `depth` counts the quasiquotes enclosing `template` beyond the one being
/// evaluated. Unquotes only evaluate at depth zero; deeper ones are rebuilt.
fn instantiate(template: &Value, depth: usize, env: &Rc<Environment>, ctx: &Context) -> Result {
    match template {
        Value::Unquote(inner) => match depth {
            0 => eval_sexp(inner, env, ctx),
            _ => Ok(Value::Unquote(Rc::new(instantiate(inner, depth - 1, env, ctx)?))),
        },
        Value::UnquoteSplicing(inner) => match depth {
            0 => Err(Error::TypeError(
                "unquote-splicing outside of a list".to_string(),
            )),
            _ => Ok(Value::UnquoteSplicing(Rc::new(instantiate(
                inner,
                depth - 1,
                env,
                ctx,
            )?))),
        },
        Value::Quasiquote(inner) => Ok(Value::Quasiquote(Rc::new(instantiate(
            inner,
            depth + 1,
            env,
            ctx,
        )?))),
        Value::Quote(inner) => Ok(Value::Quote(Rc::new(instantiate(inner, depth, env, ctx)?))),
        Value::Pair(_) => instantiate_list(template, depth, env, ctx),
        _ => Ok(template.clone()),
    }
}

fn instantiate_list(template: &Value, depth: usize, env: &Rc<Environment>, ctx: &Context) -> Result {
    let mut elements = Vec::new();
    let mut current = template;
    let tail = loop {
        match current {
            Value::Pair(pair) => {
                match &pair.car {
                    Value::UnquoteSplicing(inner) if depth == 0 => {
                        let spliced = eval_sexp(inner, env, ctx)?;
                        let items = spliced.to_vec().ok_or_else(|| {
                            Error::TypeError(format!(
                                "unquote-splicing expects a proper list, got {}",
                                spliced
                            ))
                        })?;
                        elements.extend(items);
                    }
                    car => elements.push(instantiate(car, depth, env, ctx)?),
                }
                current = &pair.cdr;
            }
            Value::Nil => break Value::Nil,
            other => break instantiate(other, depth, env, ctx)?,
        }
    };
    Ok(Value::list_with_tail(elements, tail))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::{self, Interpreter};
    use crate::reader::read_str;
    use std::collections::HashSet;

    fn run(interpreter: &Interpreter, src: &str) -> Result {
        match interpreter.eval_str(src) {
            Ok(v) => Ok(v),
            Err(interpreter::Error::Eval(e)) => Err(e),
            Err(e) => panic!("{}", e),
        }
    }

    fn value(src: &str) -> Value {
        read_str(src).unwrap()
    }

    #[test]
    fn counter_is_monotonic_and_resettable() {
        let counter = GensymCounter::new();
        assert_eq!(counter.fresh("t"), "t__0");
        assert_eq!(counter.fresh("t"), "t__1");
        counter.reset();
        assert_eq!(counter.fresh("u"), "u__0");
    }

    #[test]
    fn gensym_never_repeats() {
        let names: HashSet<String> = (0..1000).map(|_| gensym("x").to_string()).collect();
        assert_eq!(names.len(), 1000);
    }

    #[test]
    fn quasiquote_substitutes_at_depth_zero() {
        let i = Interpreter::default();
        assert_eq!(run(&i, "`(1 ,(+ 1 1) 3)").unwrap(), value("(1 2 3)"));
        assert_eq!(run(&i, "(define xs '(2 3)) `(1 ,@xs 4)").unwrap(), value("(1 2 3 4)"));
        assert_eq!(run(&i, "`(1 . ,(+ 1 1))").unwrap(), value("(1 . 2)"));
        assert_eq!(run(&i, "`sym").unwrap(), value("sym"));
    }

    #[test]
    fn nested_quasiquote_only_consumes_the_innermost_unquote() {
        let i = Interpreter::default();
        let result = run(&i, "(define x 42) ``(1 ,,x)").unwrap();
        assert_eq!(result, value("`(1 ,42)"));
        assert_eq!(result.to_string(), "`(1 ,42)");
        let untouched = run(&i, "``(1 ,x)").unwrap();
        assert_eq!(untouched, value("`(1 ,x)"));
    }

    #[test]
    fn splicing_requires_a_proper_list() {
        let i = Interpreter::default();
        assert!(matches!(run(&i, "`(1 ,@2)"), Err(Error::TypeError(_))));
        assert!(matches!(run(&i, "`,@'(1)"), Err(Error::TypeError(_))));
    }

    #[test]
    fn rest_macro_binds_surplus_arguments() {
        let i = Interpreter::default();
        run(&i, "(defmacro list-all (&rest args) `(list ,@args))").unwrap();
        assert_eq!(run(&i, "(list-all 1 2 3)").unwrap(), value("(1 2 3)"));
        assert_eq!(run(&i, "(list-all)").unwrap(), Value::Nil);
    }

    #[test]
    fn macro_arity_is_checked() {
        let i = Interpreter::default();
        run(&i, "(defmacro one-plus (a &rest more) `(list ',a ',more))").unwrap();
        assert!(matches!(run(&i, "(one-plus)"), Err(Error::ArityMismatch(_))));
        assert_eq!(run(&i, "(one-plus x)").unwrap(), value("(x ())"));
    }

    #[test]
    fn arguments_reach_the_macro_unevaluated() {
        let i = Interpreter::default();
        run(&i, "(defmacro quote-it (x) `(quote ,x))").unwrap();
        assert_eq!(run(&i, "(quote-it (undefined 1 2))").unwrap(), value("(undefined 1 2)"));
    }

    #[test]
    fn macros_see_their_arguments_exactly_as_written() {
        let i = Interpreter::default();
        run(&i, "(defmacro form-of (f) `(quote ,f))").unwrap();
        for src in &["(if a b)", "(setq x 1)", "(a . b)", "(if)", "(lambda (x) (begin a b))"] {
            let call = format!("(form-of {})", src);
            assert_eq!(run(&i, &call).unwrap(), value(src), "{}", src);
        }
    }

    #[test]
    fn malformed_arguments_still_fail_ordinary_calls() {
        let i = Interpreter::default();
        assert!(matches!(run(&i, "(list (if))"), Err(Error::Syntax(_))));
    }

    #[test]
    fn expansion_may_produce_further_macro_calls() {
        let i = Interpreter::default();
        run(&i, "(defmacro twice (x) `(+ ,x ,x))").unwrap();
        run(&i, "(defmacro quad (x) `(twice (twice ,x)))").unwrap();
        assert_eq!(run(&i, "(quad 3)").unwrap(), Value::Int(12));
        assert_eq!(run(&i, "(macroexpand (quad 3))").unwrap(), value("(+ (twice 3) (twice 3))"));
    }

    #[test]
    fn one_quote_layer_is_stripped_from_the_result() {
        let i = Interpreter::default();
        run(&i, "(defmacro three () ''(+ 1 2))").unwrap();
        assert_eq!(run(&i, "(three)").unwrap(), Value::Int(3));
    }

    #[test]
    fn runaway_expansion_is_stopped() {
        let i = Interpreter::default();
        run(&i, "(defmacro forever () '(forever))").unwrap();
        assert!(matches!(run(&i, "(forever)"), Err(Error::ExpansionLimit { .. })));
    }

    #[test]
    fn macroexpand_rejects_non_macros() {
        let i = Interpreter::default();
        assert!(matches!(
            run(&i, "(macroexpand (car '(1)))"),
            Err(Error::NotAMacro(name)) if name == "car"
        ));
    }

    #[test]
    fn gensym_keeps_macro_temporaries_apart_from_call_site_names() {
        let i = Interpreter::default();
        run(
            &i,
            "(defmacro swap-into (a b)
               (let ((tmp (gensym \"tmp\")))
                 `(let ((,tmp ,a)) (list ,b ,tmp))))",
        )
        .unwrap();
        for _ in 0..1000 {
            assert_eq!(
                run(&i, "(let ((tmp 1) (other 2)) (swap-into tmp other))").unwrap(),
                value("(2 1)")
            );
        }
    }
}
