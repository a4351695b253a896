use crate::ast::{Defexpr, Expr, LetKind};
use crate::environment::{empty_slot, Environment};
use crate::evaluator::{eval, Context, Result};
use crate::types::{truthy, Macro, Value};
use std::rc::Rc;

pub fn apply_if(
    condition: &Expr,
    then: &Expr,
    otherwise: &Expr,
    env: &Rc<Environment>,
    ctx: &Context,
) -> Result {
    match truthy(&eval(condition, env, ctx)?) {
        true => eval(then, env, ctx),
        false => eval(otherwise, env, ctx),
    }
}

/// Stops at the first false value; otherwise yields the last value.
pub fn apply_and(exprs: &[Expr], env: &Rc<Environment>, ctx: &Context) -> Result {
    let mut last = Value::Bool(true);
    for expr in exprs {
        last = eval(expr, env, ctx)?;
        if !truthy(&last) {
            break;
        }
    }
    Ok(last)
}

/// Yields the first true value, or false if there is none.
pub fn apply_or(exprs: &[Expr], env: &Rc<Environment>, ctx: &Context) -> Result {
    for expr in exprs {
        let value = eval(expr, env, ctx)?;
        if truthy(&value) {
            return Ok(value);
        }
    }
    Ok(Value::Bool(false))
}

pub fn apply_begin(exprs: &[Expr], env: &Rc<Environment>, ctx: &Context) -> Result {
    let mut last = Value::Nil;
    for expr in exprs {
        last = eval(expr, env, ctx)?;
    }
    Ok(last)
}

pub fn apply_let(
    kind: LetKind,
    bindings: &[(String, Expr)],
    body: &Expr,
    env: &Rc<Environment>,
    ctx: &Context,
) -> Result {
    let body_env = match kind {
        LetKind::Let => make_let_environment(bindings, env, ctx)?,
        LetKind::LetStar => make_let_star_environment(bindings, env, ctx)?,
        LetKind::LetRec => make_letrec_environment(bindings, env, ctx)?,
    };
    eval(body, &body_env, ctx)
}

fn make_let_environment(
    bindings: &[(String, Expr)],
    parent: &Rc<Environment>,
    ctx: &Context,
) -> Result<Rc<Environment>> {
    // Every initializer sees the outer scope only.
    let values = bindings
        .iter()
        .map(|(_, init)| eval(init, parent, ctx))
        .collect::<Result<Vec<_>>>()?;
    let names: Vec<String> = bindings.iter().map(|(name, _)| name.clone()).collect();
    let child = Environment::extend(parent);
    child.bind_list(&names, values)?;
    Ok(child)
}

fn make_let_star_environment(
    bindings: &[(String, Expr)],
    parent: &Rc<Environment>,
    ctx: &Context,
) -> Result<Rc<Environment>> {
    let mut current = Environment::extend(parent);
    for (index, (name, init)) in bindings.iter().enumerate() {
        let value = eval(init, &current, ctx)?;
        if index > 0 {
            current = Environment::extend(&current);
        }
        current.bind(name.clone(), value);
    }
    Ok(current)
}

fn make_letrec_environment(
    bindings: &[(String, Expr)],
    parent: &Rc<Environment>,
    ctx: &Context,
) -> Result<Rc<Environment>> {
    let child = Environment::extend(parent);
    let names: Vec<String> = bindings.iter().map(|(name, _)| name.clone()).collect();
    let slots: Vec<_> = names.iter().map(|_| empty_slot()).collect();
    child.bind_local_list(&names, slots.clone())?;
    for ((_, init), slot) in bindings.iter().zip(slots) {
        let value = eval(init, &child, ctx)?;
        slot.replace(Some(value));
    }
    Ok(child)
}

pub fn apply_def(definition: &Defexpr, env: &Rc<Environment>, ctx: &Context) -> Result {
    match definition {
        Defexpr::Setq(name, value) => {
            let value = eval(value, env, ctx)?;
            log::debug!("define {} as {}", name, value);
            env.bind(name.clone(), value.clone());
            Ok(value)
        }
        Defexpr::Defun(name, params, body) => {
            // (setq name (letrec ((name (lambda params body))) name))
            let lambda = Expr::Lambda(Some(name.clone()), params.clone(), body.clone());
            let binding = [(name.clone(), lambda)];
            let function = apply_let(LetKind::LetRec, &binding, &Expr::Var(name.clone()), env, ctx)?;
            log::debug!("defun {} {}", name, params);
            env.bind(name.clone(), function);
            Ok(Value::symbol(name))
        }
        Defexpr::Defmacro(name, params, body) => {
            let mac = Macro {
                name: name.clone(),
                params: params.clone(),
                body: body.clone(),
                env: env.clone(),
            };
            log::debug!("defmacro {} {}", name, params);
            env.bind(name.clone(), Value::Macro(Rc::new(mac)));
            Ok(Value::symbol(name))
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::interpreter::Interpreter;
    use crate::types::Value;

    fn run(src: &str) -> Value {
        Interpreter::default()
            .eval_str(src)
            .unwrap_or_else(|e| panic!("{} failed: {}", src, e))
    }

    #[test]
    fn letrec_supports_mutual_recursion() {
        let src = "(letrec ((f (lambda (n) (if (= n 0) 1 (* n (g (- n 1))))))
                            (g (lambda (n) (f n))))
                     (f 5))";
        assert_eq!(run(src), Value::Int(120));
    }

    #[test]
    fn defun_can_recurse() {
        let src = "(defun fact (n) (if (= n 0) 1 (* n (fact (- n 1))))) (fact 10)";
        assert_eq!(run(src), Value::Int(3_628_800));
    }

    #[test]
    fn definitions_yield_their_names() {
        assert_eq!(run("(defun f (x) x)"), Value::symbol("f"));
        assert_eq!(run("(defmacro m (x) x)"), Value::symbol("m"));
        assert_eq!(run("(define x 3)"), Value::Int(3));
    }

    #[test]
    fn begin_yields_the_last_value() {
        assert_eq!(run("(begin 1 2 3)"), Value::Int(3));
        assert_eq!(run("(begin)"), Value::Nil);
    }

    #[test]
    fn let_star_bindings_see_earlier_ones() {
        assert_eq!(run("(let* ((a 1) (b (+ a 1)) (c (* b 10))) c)"), Value::Int(20));
    }
}
