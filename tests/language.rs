use mlisp::closure::{free_variables, ClosureStrategy};
use mlisp::evaluator::Error;
use mlisp::interpreter;
use mlisp::{Config, Interpreter, Value};
use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;

fn interpreter_with(strategy: ClosureStrategy) -> Interpreter {
    Interpreter::new(Config {
        closure_strategy: strategy,
        ..Config::default()
    })
    .unwrap()
}

fn run(i: &Interpreter, src: &str) -> Result<Value, Error> {
    match i.eval_str(src) {
        Ok(v) => Ok(v),
        Err(interpreter::Error::Eval(e)) => Err(e),
        Err(e) => panic!("{} failed to read: {}", src, e),
    }
}

fn show(i: &Interpreter, src: &str) -> String {
    run(i, src)
        .unwrap_or_else(|e| panic!("{} failed: {}", src, e))
        .to_string()
}

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("mlisp-{}-{}", name, std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    dir
}

const STRATEGIES: [ClosureStrategy; 2] = [ClosureStrategy::Legacy, ClosureStrategy::Optimized];

#[test]
fn closures_outlive_their_defining_call() {
    for strategy in STRATEGIES {
        let i = interpreter_with(strategy);
        run(&i, "(defun make-adder (n) (lambda (x) (+ x n)))").unwrap();
        run(&i, "(define add5 (make-adder 5))").unwrap();
        run(&i, "(define n 100)").unwrap();
        assert_eq!(show(&i, "(add5 1)"), "6", "{:?}", strategy);
    }
}

#[test]
fn callers_cannot_rebind_a_closures_free_variables() {
    for strategy in STRATEGIES {
        let i = interpreter_with(strategy);
        run(&i, "(define x 1) (defun get-x () x)").unwrap();
        assert_eq!(show(&i, "(let ((x 2)) (get-x))"), "1", "{:?}", strategy);
        assert_eq!(
            show(&i, "(defun call-with-x (x f) (f)) (call-with-x 3 get-x)"),
            "1",
            "{:?}",
            strategy
        );
    }
}

#[test]
fn redefining_a_global_is_seen_by_earlier_closures() {
    for strategy in STRATEGIES {
        let i = interpreter_with(strategy);
        run(&i, "(define limit 1) (defun over? (x) (> x limit))").unwrap();
        assert_eq!(show(&i, "(over? 5)"), "#t");
        run(&i, "(define limit 10)").unwrap();
        assert_eq!(show(&i, "(over? 5)"), "#f", "{:?}", strategy);
    }
}

#[test]
fn definitions_inside_a_body_stay_local() {
    for strategy in STRATEGIES {
        let i = interpreter_with(strategy);
        run(&i, "(define total 0)").unwrap();
        run(&i, "(defun shadow (v) (define total v) total)").unwrap();
        assert_eq!(show(&i, "(shadow 7)"), "7");
        assert_eq!(show(&i, "total"), "0", "{:?}", strategy);
    }
}

#[test]
fn mutually_recursive_letrec() {
    let i = Interpreter::default();
    let src = "(letrec ((f (lambda (n) (if (= n 0) 1 (* n (g (- n 1))))))
                        (g (lambda (n) (f n))))
                 (f 5))";
    assert_eq!(show(&i, src), "120");
}

#[test]
fn rest_parameter_macro() {
    let i = Interpreter::default();
    run(&i, "(defmacro list-all (&rest args) `(list ,@args))").unwrap();
    assert_eq!(show(&i, "(list-all 1 2 3)"), "(1 2 3)");
    assert_eq!(show(&i, "(list-all)"), "()");
}

#[test]
fn quasiquote_depths() {
    let i = Interpreter::default();
    assert_eq!(show(&i, "`(1 ,(+ 1 1) 3)"), "(1 2 3)");
    assert_eq!(show(&i, "(define x 42) ``(1 ,,x)"), "`(1 ,42)");
}

#[test]
fn gensym_names_are_unique_across_expansions() {
    let i = Interpreter::default();
    run(&i, "(defmacro fresh () `(quote ,(gensym)))").unwrap();
    let names: BTreeSet<String> = (0..1000).map(|_| show(&i, "(fresh)")).collect();
    assert_eq!(names.len(), 1000);
}

#[test]
fn arity_is_enforced_for_closures_and_macros() {
    let i = Interpreter::default();
    assert!(matches!(run(&i, "((lambda (a b) a) 1)"), Err(Error::ArityMismatch(_))));
    assert!(matches!(run(&i, "((lambda (a b) a) 1 2 3)"), Err(Error::ArityMismatch(_))));
    assert_eq!(show(&i, "((lambda (a &rest more) more) 1 2 3)"), "(2 3)");
    run(&i, "(defmacro at-least-two (a b &rest more) `(list ,a ,b))").unwrap();
    match run(&i, "(at-least-two 1)") {
        Err(Error::ArityMismatch(m)) => {
            assert_eq!(m.name, "at-least-two");
            assert_eq!(m.got, 1);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn module_exports_are_reachable_by_dotted_name() {
    let i = Interpreter::default();
    run(&i, "(module m (export y) (define y 10))").unwrap();
    assert_eq!(show(&i, "m.y"), "10");
}

#[test]
fn capture_table_is_bounded_by_free_and_visible_names() {
    let i = Interpreter::default();
    run(&i, "(define y 3) (define unused 4)").unwrap();
    let value = run(&i, "(lambda (x) (list x y not-yet-defined))").unwrap();
    let closure = value.as_closure().unwrap();
    let captured: BTreeSet<String> = closure
        .data
        .captured_names()
        .into_iter()
        .map(String::from)
        .collect();
    let free = free_variables(&closure.params, &closure.body, None);
    let visible: BTreeSet<String> = i.env().visible_names().into_iter().collect();
    assert!(captured.is_subset(&free));
    assert!(free.iter().filter(|n| visible.contains(*n)).all(|n| captured.contains(n)));
    assert!(captured.is_subset(&visible));
    assert!(captured.contains("y"));
    assert!(!captured.contains("unused"));
}

#[test]
fn both_closure_strategies_agree() {
    let programs = [
        "(defun compose (f g) (lambda (x) (f (g x)))) ((compose car cdr) '(1 2 3))",
        "(let ((a 1)) (let ((f (lambda () a))) (let ((a 2)) (f))))",
        "(defun counter-from (n) (lambda () n)) (map (lambda (f) (f)) (list (counter-from 1) (counter-from 2)))",
        "(letrec ((even? (lambda (n) (if (= n 0) #t (odd? (- n 1))))) (odd? (lambda (n) (if (= n 0) #f (even? (- n 1)))))) (even? 10))",
        "(defun late () later) (define later 5) (late)",
        "(module util (export twice) (defun twice (f x) (f (f x)))) (util.twice (lambda (n) (* n 3)) 2)",
        "(defmacro my-or2 (a b) (let ((t (gensym))) `(let ((,t ,a)) (if ,t ,t ,b)))) (let ((t 5)) (my-or2 #f t))",
        "(foldl (lambda (acc x) (+ acc x)) 0 (filter (lambda (x) (> x 2)) '(1 2 3 4)))",
        "(module m (export g) (defun g () (car '(5))) (define car (lambda (x) 99))) (m.g)",
        "(define k 1) (defun outer () (define f (lambda () k)) (define k 2) (f)) (outer)",
        "(define n 5) (module q (export f) (defun f () n) (define n 6)) (q.f)",
    ];
    for program in programs.iter() {
        let legacy = show(&interpreter_with(ClosureStrategy::Legacy), program);
        let optimized = show(&interpreter_with(ClosureStrategy::Optimized), program);
        assert_eq!(legacy, optimized, "{}", program);
    }
}

#[test]
fn expansion_depth_is_configurable() {
    let i = Interpreter::new(Config {
        max_expansion_depth: 3,
        ..Config::default()
    })
    .unwrap();
    run(
        &i,
        "(defmacro m0 () 0) (defmacro m1 () '(m0)) (defmacro m2 () '(m1)) (defmacro m3 () '(m2))",
    )
    .unwrap();
    assert_eq!(show(&i, "(m2)"), "0");
    assert!(matches!(
        run(&i, "(m3)"),
        Err(Error::ExpansionLimit { limit: 3, .. })
    ));
}

#[test]
fn modules_load_from_the_search_path_once() {
    let dir = scratch_dir("search");
    fs::write(
        dir.join("geometry.mlisp"),
        "(module geometry (export area) (defun area (w h) (* w h)) (define secret 1))",
    )
    .unwrap();
    fs::write(dir.join("helpers.mlisp"), "(define helper 7) (defun triple (x) (* 3 x))").unwrap();

    let i = Interpreter::new(Config {
        search_paths: vec![dir.clone()],
        ..Config::default()
    })
    .unwrap();

    run(&i, "(import geometry)").unwrap();
    assert_eq!(show(&i, "(area 2 3)"), "6");
    assert!(matches!(run(&i, "secret"), Err(Error::NameNotFound(_))));
    assert_eq!(show(&i, "(eq? (import geometry) (import geometry))"), "#t");

    run(&i, "(import \"helpers.mlisp\" (triple))").unwrap();
    assert_eq!(show(&i, "(triple 2)"), "6");
    assert!(matches!(run(&i, "helper"), Err(Error::NameNotFound(_))));
    assert_eq!(show(&i, "(eq? (import helpers :as h) (import \"helpers.mlisp\"))"), "#t");
    assert_eq!(show(&i, "h.helper"), "7");

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn circular_and_missing_imports_fail() {
    let dir = scratch_dir("cycle");
    fs::write(dir.join("ping.mlisp"), "(import pong)").unwrap();
    fs::write(dir.join("pong.mlisp"), "(import ping)").unwrap();
    let i = Interpreter::new(Config {
        search_paths: vec![dir.clone()],
        ..Config::default()
    })
    .unwrap();
    assert!(matches!(
        run(&i, "(import ping)"),
        Err(Error::ModuleLoadError { reason, .. }) if reason == "circular import"
    ));
    assert!(matches!(run(&i, "(import nowhere)"), Err(Error::ModuleLoadError { .. })));
    fs::remove_dir_all(&dir).ok();
}

#[test]
fn errors_propagate_out_of_nested_calls() {
    let i = Interpreter::default();
    run(&i, "(defun deep (n) (if (= n 0) (missing-function) (deep (- n 1))))").unwrap();
    assert!(matches!(
        run(&i, "(deep 50)"),
        Err(Error::NameNotFound(name)) if name == "missing-function"
    ));
    assert!(matches!(run(&i, "(macroexpand (deep 1))"), Err(Error::NotAMacro(_))));
}
