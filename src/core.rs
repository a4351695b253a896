use crate::environment::Environment;
use crate::evaluator::{self, Context, Error};
use crate::macros::{gensym, DEFAULT_GENSYM_PREFIX};
use crate::printer::{self, PrintMode};
use crate::types::{callable, truthy, Arity, MInt, PrimitiveFn, Record, Value};
use itertools::Itertools;
use std::collections::HashMap;
use std::io::Write;
use std::rc::Rc;

fn failure(name: &'static str, reason: impl ToString) -> Error {
    Error::Primitive {
        name,
        reason: reason.to_string(),
    }
}

#[derive(Clone, Copy)]
enum Number {
    Int(MInt),
    Float(f64),
}

fn grab_numbers(args: &[Value]) -> evaluator::Result<Vec<Number>> {
    args.iter()
        .map(|arg| match arg {
            Value::Int(x) => Ok(Number::Int(*x)),
            Value::Float(x) => Ok(Number::Float(*x)),
            other => Err(Error::TypeError(format!(
                "expected a number, got {} of type {}",
                other,
                other.type_name()
            ))),
        })
        .collect()
}

fn as_f64(n: Number) -> f64 {
    match n {
        Number::Int(x) => x as f64,
        Number::Float(x) => x,
    }
}

/// Folds with integer arithmetic until a float turns up, then continues in
/// floating point.
fn fold_numbers(
    init: Number,
    rest: &[Number],
    int_op: fn(MInt, MInt) -> MInt,
    float_op: fn(f64, f64) -> f64,
) -> Value {
    let result = rest.iter().fold(init, |acc, &x| match (acc, x) {
        (Number::Int(a), Number::Int(b)) => Number::Int(int_op(a, b)),
        (a, b) => Number::Float(float_op(as_f64(a), as_f64(b))),
    });
    match result {
        Number::Int(x) => Value::Int(x),
        Number::Float(x) => Value::Float(x),
    }
}

const SUM: PrimitiveFn = PrimitiveFn {
    name: "+",
    fn_ptr: sum_,
    arity: Arity::at_least(0),
};

fn sum_(args: &[Value], _ctx: &Context) -> evaluator::Result {
    let numbers = grab_numbers(args)?;
    Ok(fold_numbers(Number::Int(0), &numbers, MInt::wrapping_add, |a, b| a + b))
}

const SUB: PrimitiveFn = PrimitiveFn {
    name: "-",
    fn_ptr: sub_,
    arity: Arity::at_least(1),
};

fn sub_(args: &[Value], _ctx: &Context) -> evaluator::Result {
    match grab_numbers(args)?.as_slice() {
        [Number::Int(x)] => Ok(Value::Int(x.wrapping_neg())),
        [Number::Float(x)] => Ok(Value::Float(-x)),
        [first, rest @ ..] => Ok(fold_numbers(*first, rest, MInt::wrapping_sub, |a, b| a - b)),
        [] => unreachable!("arity checked by call_primitive"),
    }
}

const MUL: PrimitiveFn = PrimitiveFn {
    name: "*",
    fn_ptr: mul_,
    arity: Arity::at_least(0),
};

fn mul_(args: &[Value], _ctx: &Context) -> evaluator::Result {
    let numbers = grab_numbers(args)?;
    Ok(fold_numbers(Number::Int(1), &numbers, MInt::wrapping_mul, |a, b| a * b))
}

const DIV: PrimitiveFn = PrimitiveFn {
    name: "/",
    fn_ptr: div_,
    arity: Arity::exactly(2),
};

fn div_(args: &[Value], _ctx: &Context) -> evaluator::Result {
    match grab_numbers(args)?.as_slice() {
        [_, Number::Int(0)] => Err(failure(DIV.name, "division by zero")),
        [_, Number::Float(y)] if *y == 0.0 => Err(failure(DIV.name, "division by zero")),
        [Number::Int(x), Number::Int(y)] => Ok(Value::Int(x.wrapping_div(*y))),
        [x, y] => Ok(Value::Float(as_f64(*x) / as_f64(*y))),
        _ => unreachable!("arity checked by call_primitive"),
    }
}

const MOD: PrimitiveFn = PrimitiveFn {
    name: "mod",
    fn_ptr: mod_,
    arity: Arity::exactly(2),
};

fn mod_(args: &[Value], _ctx: &Context) -> evaluator::Result {
    let x = args[0].as_int()?;
    match args[1].as_int()? {
        0 => Err(failure(MOD.name, "division by zero")),
        y => Ok(Value::Int(x.wrapping_rem_euclid(y))),
    }
}

fn comparison_(
    args: &[Value],
    int_comp: fn(&MInt, &MInt) -> bool,
    float_comp: fn(&f64, &f64) -> bool,
) -> evaluator::Result {
    match grab_numbers(args)?.as_slice() {
        [Number::Int(x), Number::Int(y)] => Ok(Value::Bool(int_comp(x, y))),
        [x, y] => Ok(Value::Bool(float_comp(&as_f64(*x), &as_f64(*y)))),
        _ => unreachable!("arity checked by call_primitive"),
    }
}

macro_rules! comparison_primitive {
    ($SYMBOL:tt, $NAME:ident) => {
        paste::item! {
            const $NAME: PrimitiveFn = PrimitiveFn {
                name: stringify!($SYMBOL),
                fn_ptr: |args: &[Value], _ctx: &Context| {
                    comparison_(args, MInt:: [<$NAME:lower>], f64:: [<$NAME:lower>])
                },
                arity: Arity::exactly(2),
            };
        }
    };
}

comparison_primitive!(<, LT);
comparison_primitive!(<=, LE);
comparison_primitive!(>, GT);
comparison_primitive!(>=, GE);

const EQUAL: PrimitiveFn = PrimitiveFn {
    name: "=",
    fn_ptr: |args, _| Ok(Value::Bool(args[0] == args[1])),
    arity: Arity::exactly(2),
};

const IDENTICAL: PrimitiveFn = PrimitiveFn {
    name: "eq?",
    fn_ptr: identical_,
    arity: Arity::exactly(2),
};

/// Pairs, strings and records compare by identity; atoms by value.
fn identical_(args: &[Value], _ctx: &Context) -> evaluator::Result {
    let same = match (&args[0], &args[1]) {
        (Value::Pair(x), Value::Pair(y)) => Rc::ptr_eq(x, y),
        (Value::Record(x), Value::Record(y)) => Rc::ptr_eq(x, y),
        (Value::String(_), Value::String(_)) => false,
        (x, y) => x == y,
    };
    Ok(Value::Bool(same))
}

const NOT: PrimitiveFn = PrimitiveFn {
    name: "not",
    fn_ptr: |args, _| Ok(Value::Bool(!truthy(&args[0]))),
    arity: Arity::exactly(1),
};

const CONS: PrimitiveFn = PrimitiveFn {
    name: "cons",
    fn_ptr: |args, _| Ok(Value::cons(args[0].clone(), args[1].clone())),
    arity: Arity::exactly(2),
};

const CAR: PrimitiveFn = PrimitiveFn {
    name: "car",
    fn_ptr: |args, _| Ok(args[0].as_pair()?.car.clone()),
    arity: Arity::exactly(1),
};

const CDR: PrimitiveFn = PrimitiveFn {
    name: "cdr",
    fn_ptr: |args, _| Ok(args[0].as_pair()?.cdr.clone()),
    arity: Arity::exactly(1),
};

const LIST: PrimitiveFn = PrimitiveFn {
    name: "list",
    fn_ptr: |args, _| Ok(Value::list(args.to_vec())),
    arity: Arity::at_least(0),
};

const LIST_TEST: PrimitiveFn = PrimitiveFn {
    name: "list?",
    fn_ptr: |args, _| Ok(Value::Bool(args[0].is_list())),
    arity: Arity::exactly(1),
};

const PAIR_TEST: PrimitiveFn = PrimitiveFn {
    name: "pair?",
    fn_ptr: |args, _| Ok(Value::Bool(matches!(args[0], Value::Pair(_)))),
    arity: Arity::exactly(1),
};

const NULL_TEST: PrimitiveFn = PrimitiveFn {
    name: "null?",
    fn_ptr: |args, _| Ok(Value::Bool(args[0].is_nil())),
    arity: Arity::exactly(1),
};

const LENGTH: PrimitiveFn = PrimitiveFn {
    name: "length",
    fn_ptr: length_,
    arity: Arity::exactly(1),
};

fn length_(args: &[Value], _ctx: &Context) -> evaluator::Result {
    let length = match &args[0] {
        Value::String(s) => s.chars().count(),
        other => other.as_list()?.len(),
    };
    Ok(Value::Int(length as MInt))
}

const APPEND: PrimitiveFn = PrimitiveFn {
    name: "append",
    fn_ptr: append_,
    arity: Arity::at_least(0),
};

/// Every argument but the last must be a proper list; the last becomes the
/// tail as is.
fn append_(args: &[Value], _ctx: &Context) -> evaluator::Result {
    let (last, init) = match args.split_last() {
        Some(split) => split,
        None => return Ok(Value::Nil),
    };
    let mut elements = Vec::new();
    for arg in init {
        elements.extend(arg.as_list()?);
    }
    Ok(Value::list_with_tail(elements, last.clone()))
}

const REVERSE: PrimitiveFn = PrimitiveFn {
    name: "reverse",
    fn_ptr: reverse_,
    arity: Arity::exactly(1),
};

fn reverse_(args: &[Value], _ctx: &Context) -> evaluator::Result {
    let mut elements = args[0].as_list()?;
    elements.reverse();
    Ok(Value::list(elements))
}

const NTH: PrimitiveFn = PrimitiveFn {
    name: "nth",
    fn_ptr: nth_,
    arity: Arity::exactly(2),
};

fn nth_(args: &[Value], _ctx: &Context) -> evaluator::Result {
    let elements = args[0].as_list()?;
    let orig_index = args[1].as_int()?;
    usize::try_from(orig_index)
        .ok()
        .and_then(|index| elements.get(index).cloned())
        .ok_or_else(|| {
            failure(
                NTH.name,
                format!("index {} outside 0..{}", orig_index, elements.len()),
            )
        })
}

const APPLY: PrimitiveFn = PrimitiveFn {
    name: "apply",
    fn_ptr: apply_,
    arity: Arity::at_least(2),
};

fn apply_(args: &[Value], ctx: &Context) -> evaluator::Result {
    let mut concatenated = args[1..args.len() - 1].to_vec();
    concatenated.extend(args[args.len() - 1].as_list()?);
    evaluator::apply(&args[0], concatenated, ctx)
}

const MAP: PrimitiveFn = PrimitiveFn {
    name: "map",
    fn_ptr: map_,
    arity: Arity::exactly(2),
};

fn map_(args: &[Value], ctx: &Context) -> evaluator::Result {
    let result: evaluator::Result<Vec<_>> = args[1]
        .as_list()?
        .into_iter()
        .map(|element| evaluator::apply(&args[0], vec![element], ctx))
        .collect();
    Ok(Value::list(result?))
}

macro_rules! type_predicate {
    ($SYMBOL:expr, $NAME:ident, $test:expr) => {
        const $NAME: PrimitiveFn = PrimitiveFn {
            name: $SYMBOL,
            fn_ptr: |args, _| Ok(Value::Bool($test(&args[0]))),
            arity: Arity::exactly(1),
        };
    };
}

type_predicate!("symbol?", SYMBOL_TEST, |v: &Value| matches!(v, Value::Symbol(_)));
type_predicate!("number?", NUMBER_TEST, |v: &Value| matches!(v, Value::Int(_) | Value::Float(_)));
type_predicate!("string?", STRING_TEST, |v: &Value| matches!(v, Value::String(_)));
type_predicate!("bool?", BOOL_TEST, |v: &Value| matches!(v, Value::Bool(_)));
type_predicate!("procedure?", PROCEDURE_TEST, callable);
type_predicate!("record?", RECORD_TEST, |v: &Value| matches!(v, Value::Record(_)));

const TYPE_OF: PrimitiveFn = PrimitiveFn {
    name: "type-of",
    fn_ptr: |args, _| Ok(Value::symbol(args[0].type_name())),
    arity: Arity::exactly(1),
};

const SYMBOL_TO_STRING: PrimitiveFn = PrimitiveFn {
    name: "symbol->string",
    fn_ptr: |args, _| Ok(Value::string(args[0].as_symbol()?.as_ref())),
    arity: Arity::exactly(1),
};

const STRING_TO_SYMBOL: PrimitiveFn = PrimitiveFn {
    name: "string->symbol",
    fn_ptr: |args, _| Ok(Value::symbol(args[0].as_str()?)),
    arity: Arity::exactly(1),
};

const STRING_APPEND: PrimitiveFn = PrimitiveFn {
    name: "string-append",
    fn_ptr: string_append_,
    arity: Arity::at_least(0),
};

fn string_append_(args: &[Value], _ctx: &Context) -> evaluator::Result {
    let parts: Result<Vec<&str>, _> = args.iter().map(Value::as_str).collect();
    Ok(Value::String(parts?.concat()))
}

const STRING_LENGTH: PrimitiveFn = PrimitiveFn {
    name: "string-length",
    fn_ptr: |args, _| Ok(Value::Int(args[0].as_str()?.chars().count() as MInt)),
    arity: Arity::exactly(1),
};

const NUMBER_TO_STRING: PrimitiveFn = PrimitiveFn {
    name: "number->string",
    fn_ptr: number_to_string_,
    arity: Arity::exactly(1),
};

fn number_to_string_(args: &[Value], _ctx: &Context) -> evaluator::Result {
    grab_numbers(args)?;
    Ok(Value::String(args[0].to_string()))
}

const RECORD: PrimitiveFn = PrimitiveFn {
    name: "record",
    fn_ptr: record_,
    arity: Arity::at_least(1),
};

/// `(record name field value ...)`
fn record_(args: &[Value], _ctx: &Context) -> evaluator::Result {
    let name = args[0].as_name()?.to_string();
    let rest = &args[1..];
    if rest.len() % 2 == 1 {
        return Err(failure(RECORD.name, "every field needs a value"));
    }
    let mut fields: Vec<(String, Value)> = Vec::with_capacity(rest.len() / 2);
    for (field, value) in rest.iter().tuples() {
        let field = field.as_name()?;
        if fields.iter().any(|(existing, _)| existing == field) {
            return Err(failure(RECORD.name, format!("field {} given twice", field)));
        }
        fields.push((field.to_string(), value.clone()));
    }
    Ok(Value::Record(Rc::new(Record { name, fields })))
}

const RECORD_GET: PrimitiveFn = PrimitiveFn {
    name: "record-get",
    fn_ptr: record_get_,
    arity: Arity::exactly(2),
};

fn record_get_(args: &[Value], _ctx: &Context) -> evaluator::Result {
    let record = args[0].as_record()?;
    let field = args[1].as_name()?;
    record.get(field).cloned().ok_or_else(|| {
        failure(
            RECORD_GET.name,
            format!("record {} has no field {}", record.name, field),
        )
    })
}

const RECORD_SET: PrimitiveFn = PrimitiveFn {
    name: "record-set",
    fn_ptr: record_set_,
    arity: Arity::exactly(3),
};

/// Records are immutable: this returns an updated copy.
fn record_set_(args: &[Value], _ctx: &Context) -> evaluator::Result {
    let mut record = args[0].as_record()?.clone();
    let field = args[1].as_name()?;
    match record.fields.iter_mut().find(|(name, _)| name == field) {
        Some((_, value)) => *value = args[2].clone(),
        None => record.fields.push((field.to_string(), args[2].clone())),
    }
    Ok(Value::Record(Rc::new(record)))
}

const RECORD_FIELDS: PrimitiveFn = PrimitiveFn {
    name: "record-fields",
    fn_ptr: |args, _| {
        let record = args[0].as_record()?;
        Ok(Value::list(
            record.fields.iter().map(|(name, _)| Value::symbol(name)).collect(),
        ))
    },
    arity: Arity::exactly(1),
};

const GENSYM: PrimitiveFn = PrimitiveFn {
    name: "gensym",
    fn_ptr: gensym_,
    arity: Arity::Between(0..=1),
};

fn gensym_(args: &[Value], _ctx: &Context) -> evaluator::Result {
    let prefix = match args.first() {
        Some(prefix) => prefix.as_name()?,
        None => DEFAULT_GENSYM_PREFIX,
    };
    Ok(gensym(prefix))
}

fn print_internal(args: &[Value], mode: PrintMode, sep: &str, end: &str) -> evaluator::Result {
    let text = args.iter().map(|arg| printer::pr_str(arg, mode)).join(sep);
    let mut stdout = std::io::stdout();
    write!(stdout, "{}{}", text, end)
        .and_then(|_| stdout.flush())
        .map_err(|e| failure("print", e))?;
    Ok(Value::Nil)
}

const PRINT: PrimitiveFn = PrimitiveFn {
    name: "print",
    fn_ptr: |args, _| print_internal(args, PrintMode::ReadableRepresentation, " ", "\n"),
    arity: Arity::at_least(0),
};

const PRINTLN: PrimitiveFn = PrimitiveFn {
    name: "println",
    fn_ptr: |args, _| print_internal(args, PrintMode::Directly, " ", "\n"),
    arity: Arity::at_least(0),
};

const DISPLAY: PrimitiveFn = PrimitiveFn {
    name: "display",
    fn_ptr: |args, _| print_internal(args, PrintMode::Directly, " ", ""),
    arity: Arity::at_least(0),
};

const NEWLINE: PrimitiveFn = PrimitiveFn {
    name: "newline",
    fn_ptr: |_, _| print_internal(&[], PrintMode::Directly, "", "\n"),
    arity: Arity::exactly(0),
};

const ERROR: PrimitiveFn = PrimitiveFn {
    name: "error",
    fn_ptr: |args, _| {
        let message = args
            .iter()
            .map(|arg| printer::pr_str(arg, PrintMode::Directly))
            .join(" ");
        Err(failure("error", message))
    },
    arity: Arity::at_least(1),
};

static PRIMITIVES: &[PrimitiveFn] = &[
    // Arithmetic
    SUM,
    SUB,
    MUL,
    DIV,
    MOD,
    // Comparisons
    EQUAL,
    LT,
    LE,
    GT,
    GE,
    IDENTICAL,
    NOT,
    // Working with lists
    CONS,
    CAR,
    CDR,
    LIST,
    LIST_TEST,
    PAIR_TEST,
    NULL_TEST,
    LENGTH,
    APPEND,
    REVERSE,
    NTH,
    APPLY,
    MAP,
    // Casting and testing
    SYMBOL_TEST,
    NUMBER_TEST,
    STRING_TEST,
    BOOL_TEST,
    PROCEDURE_TEST,
    RECORD_TEST,
    TYPE_OF,
    SYMBOL_TO_STRING,
    STRING_TO_SYMBOL,
    STRING_APPEND,
    STRING_LENGTH,
    NUMBER_TO_STRING,
    // Records
    RECORD,
    RECORD_GET,
    RECORD_SET,
    RECORD_FIELDS,
    // Macros
    GENSYM,
    // Output
    PRINT,
    PRINTLN,
    DISPLAY,
    NEWLINE,
    ERROR,
];

type Namespace = HashMap<&'static str, &'static PrimitiveFn>;
lazy_static! {
    pub static ref CORE: Namespace = PRIMITIVES.iter().map(|func| (func.name, func)).collect();
}

/// Binds every primitive in `env`.
pub fn install(env: &Environment) {
    for (&name, &func) in CORE.iter() {
        env.bind(name, Value::Primitive(func));
    }
    log::debug!("installed {} primitives", CORE.len());
}
