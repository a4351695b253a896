//! Building function values.
//!
//! An optimized closure keeps a capture table holding the slots of those free
//! variables bound in the defining frame itself, plus the defining environment
//! as a fallback for every other name. A legacy closure keeps only the
//! defining environment.

use crate::ast::{self, Defexpr, Expr, LetKind};
use crate::environment::Environment;
use crate::evaluator::Result;
use crate::types::{Closure, ClosureData, ParamSpec, Value};
use std::collections::BTreeSet;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClosureStrategy {
    Legacy,
    Optimized,
}

impl Default for ClosureStrategy {
    fn default() -> Self {
        ClosureStrategy::Optimized
    }
}

/// Variables referenced in `body` that neither `params` nor any binding
/// form inside `body` introduces. `own_name` is treated as bound so a
/// definition can refer to itself.
pub fn free_variables(params: &ParamSpec, body: &Expr, own_name: Option<&str>) -> BTreeSet<String> {
    let mut walker = FreeVariables::default();
    walker.bound.extend(params.names().cloned());
    walker.bound.extend(own_name.map(String::from));
    walker.walk(body);
    walker.free
}

#[derive(Default)]
struct FreeVariables {
    bound: Vec<String>,
    free: BTreeSet<String>,
}

impl FreeVariables {
    fn is_bound(&self, name: &str) -> bool {
        self.bound.iter().any(|b| b == name)
    }

    fn reference(&mut self, name: &str) {
        if self.is_bound(name) {
            return;
        }
        // `m.y` depends on whatever `m` is bound to.
        let root = match name.find('.') {
            Some(dot) if dot > 0 && dot + 1 < name.len() => &name[..dot],
            _ => name,
        };
        if !self.is_bound(root) {
            self.free.insert(root.to_string());
        }
    }

    fn scoped<I, F>(&mut self, names: I, f: F)
    where
        I: IntoIterator<Item = String>,
        F: FnOnce(&mut Self),
    {
        let mark = self.bound.len();
        self.bound.extend(names);
        f(self);
        self.bound.truncate(mark);
    }

    fn walk_all(&mut self, exprs: &[Expr]) {
        for expr in exprs {
            self.walk(expr);
        }
    }

    fn walk(&mut self, expr: &Expr) {
        match expr {
            Expr::Literal(Value::Quasiquote(template)) => self.walk_template(template, 0),
            Expr::Literal(_) => {}
            Expr::Var(name) => self.reference(name),
            Expr::If(c, t, f) => {
                self.walk(c);
                self.walk(t);
                self.walk(f);
            }
            Expr::And(xs) | Expr::Or(xs) | Expr::Begin(xs) => self.walk_all(xs),
            Expr::Call { callee, args, forms } => {
                self.walk(callee);
                match args {
                    Ok(args) => self.walk_all(args),
                    Err(_) => {
                        for form in forms {
                            self.walk_symbols(form);
                        }
                    }
                }
            }
            Expr::Let(kind, bindings, body) => {
                let names = bindings.iter().map(|(name, _)| name.clone());
                match kind {
                    LetKind::Let => {
                        for (_, init) in bindings {
                            self.walk(init);
                        }
                        self.scoped(names, |w| w.walk(body));
                    }
                    LetKind::LetStar => {
                        let mark = self.bound.len();
                        for (name, init) in bindings {
                            self.walk(init);
                            self.bound.push(name.clone());
                        }
                        self.walk(body);
                        self.bound.truncate(mark);
                    }
                    LetKind::LetRec => self.scoped(names, |w| {
                        for (_, init) in bindings {
                            w.walk(init);
                        }
                        w.walk(body);
                    }),
                }
            }
            Expr::Lambda(name, params, body) => {
                let names = params.names().cloned().chain(name.clone());
                self.scoped(names, |w| w.walk(body));
            }
            Expr::Defexpr(Defexpr::Setq(_, value)) => self.walk(value),
            Expr::Defexpr(Defexpr::Defun(name, params, body))
            | Expr::Defexpr(Defexpr::Defmacro(name, params, body)) => {
                let names = params.names().cloned().chain(Some(name.clone()));
                self.scoped(names, |w| w.walk(body));
            }
            Expr::Module { body, .. } => self.walk_all(body),
            Expr::Import(..) => {}
            Expr::Macroexpand(form) => {
                if let Some(Value::Symbol(head)) = form.to_vec().and_then(|v| v.first().cloned()) {
                    self.reference(head.as_ref());
                }
            }
        }
    }

    /// Only the depth-zero unquotes of a template are evaluated.
    fn walk_template(&mut self, template: &Value, depth: usize) {
        match template {
            Value::Unquote(inner) | Value::UnquoteSplicing(inner) => match depth {
                0 => self.walk_sexp(inner),
                _ => self.walk_template(inner, depth - 1),
            },
            Value::Quasiquote(inner) => self.walk_template(inner, depth + 1),
            Value::Quote(inner) => self.walk_template(inner, depth),
            Value::Pair(pair) => {
                self.walk_template(&pair.car, depth);
                self.walk_template(&pair.cdr, depth);
            }
            _ => {}
        }
    }

    fn walk_sexp(&mut self, sexp: &Value) {
        match ast::build(sexp) {
            Ok(expr) => self.walk(&expr),
            Err(_) => self.walk_symbols(sexp),
        }
    }

    fn walk_symbols(&mut self, sexp: &Value) {
        match sexp {
            Value::Symbol(s) => self.reference(s.as_ref()),
            Value::Pair(pair) => {
                self.walk_symbols(&pair.car);
                self.walk_symbols(&pair.cdr);
            }
            _ => {}
        }
    }
}

pub fn make_closure(
    name: Option<String>,
    params: &ParamSpec,
    body: &Rc<Expr>,
    env: &Rc<Environment>,
    strategy: ClosureStrategy,
) -> Closure {
    let data = match strategy {
        ClosureStrategy::Legacy => ClosureData::Legacy(env.clone()),
        ClosureStrategy::Optimized => {
            let captured: Vec<_> = free_variables(params, body, name.as_deref())
                .into_iter()
                .filter_map(|free| env.lookup_local_slot(&free).map(|slot| (free, slot)))
                .collect();
            ClosureData::Optimized {
                captured,
                parent: env.clone(),
            }
        }
    };
    let closure = Closure {
        name,
        params: params.clone(),
        body: body.clone(),
        data,
    };
    log::trace!("built {:?}", closure);
    closure
}

/// The environment a call to `closure` binds its parameters in. For an
/// optimized closure the captured slots sit between the parameters and the
/// fallback chain, so lookups hit them before walking the defining scopes.
pub fn call_frame(closure: &Closure) -> Rc<Environment> {
    match &closure.data {
        ClosureData::Legacy(env) => Environment::extend(env),
        ClosureData::Optimized { captured, parent } => {
            let captures = Environment::extend(parent);
            for (name, slot) in captured {
                captures.bind_local(name.clone(), slot.clone());
            }
            Environment::extend(&captures)
        }
    }
}

/// Binds fixed parameters positionally and collects any surplus into the
/// rest parameter.
pub fn bind_arguments(params: &ParamSpec, mut args: Vec<Value>, env: &Environment, name: &str) -> Result<()> {
    params.arity().validate_for(args.len(), name)?;
    let surplus = args.split_off(params.fixed.len());
    env.bind_list(&params.fixed, args)?;
    if let Some(rest) = &params.rest {
        env.bind(rest.clone(), Value::list(surplus));
    }
    Ok(())
}
