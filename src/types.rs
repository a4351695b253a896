use crate::ast::Expr;
use crate::environment::{Environment, Slot};
use crate::evaluator::{self, Context, Error};
use derive_more::Deref;
use itertools::Itertools;
use std::collections::HashSet;
use std::fmt;
use std::fmt::Formatter;
use std::ops::{RangeFrom, RangeInclusive};
use std::rc::Rc;

pub type MInt = i64;

/// Marker introducing the rest parameter in a parameter list.
pub const REST_MARKER: &str = "&rest";

#[derive(Deref, Debug, PartialEq, Eq, Hash, Clone)]
pub struct Symbol(pub String);

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Arity {
    Between(RangeInclusive<usize>),
    AtLeast(RangeFrom<usize>),
}

/// Raised whenever a callable receives a number of arguments outside its arity.
#[derive(Debug, Clone, PartialEq)]
pub struct ArityMismatch {
    pub name: String,
    pub expected: Arity,
    pub got: usize,
}

impl fmt::Display for ArityMismatch {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "when evaluating {} expected {} arguments, but received {}",
            self.name, self.expected, self.got
        )
    }
}

impl Arity {
    pub const fn exactly(n: usize) -> Self {
        Self::Between(n..=n)
    }

    pub const fn at_least(n: usize) -> Self {
        Self::AtLeast(n..)
    }

    pub fn contains(&self, n: usize) -> bool {
        match self {
            Self::Between(range) => range.contains(&n),
            Self::AtLeast(range) => range.contains(&n),
        }
    }

    pub fn validate_for(&self, n: usize, name: &str) -> Result<(), Error> {
        match self.contains(n) {
            true => Ok(()),
            false => Err(Error::ArityMismatch(ArityMismatch {
                name: name.to_string(),
                expected: self.clone(),
                got: n,
            })),
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Between(r) => {
                if r.start() == r.end() {
                    write!(f, "exactly {}", r.start())
                } else {
                    write!(f, "from {} to {}", r.start(), r.end())
                }
            }
            Arity::AtLeast(r) => write!(f, "at least {}", r.start),
        }
    }
}

pub type NativeFn = fn(&[Value], &Context) -> evaluator::Result;

pub struct PrimitiveFn {
    pub name: &'static str,
    pub arity: Arity,
    pub fn_ptr: NativeFn,
}

impl fmt::Debug for PrimitiveFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "primitive function #<{}>", self.name)
    }
}

/// Fixed parameters plus an optional trailing rest parameter.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct ParamSpec {
    pub fixed: Vec<String>,
    pub rest: Option<String>,
}

impl fmt::Display for ParamSpec {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "({}", self.fixed.iter().join(" "))?;
        if let Some(rest) = &self.rest {
            if !self.fixed.is_empty() {
                write!(f, " ")?;
            }
            write!(f, "{} {}", REST_MARKER, rest)?;
        }
        write!(f, ")")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BadParameters {
    NotASymbol(String),
    Duplicate(String),
    TooManyRestMarkers(usize),
    RestMarkerNotPenultimate,
}

impl fmt::Display for BadParameters {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            BadParameters::NotASymbol(p) => write!(f, "parameter {} is not a symbol", p),
            BadParameters::Duplicate(p) => write!(f, "parameter {} appears more than once", p),
            BadParameters::TooManyRestMarkers(n) => {
                write!(f, "{} appears {} times, at most once allowed", REST_MARKER, n)
            }
            BadParameters::RestMarkerNotPenultimate => {
                write!(f, "{} must be followed by exactly one name", REST_MARKER)
            }
        }
    }
}

impl ParamSpec {
    pub fn new(mut names: Vec<String>) -> Result<Self, BadParameters> {
        let is_marker = |s: &String| s == REST_MARKER;
        let marker_count = names.iter().filter(|s| is_marker(s)).count();
        let rest = match marker_count {
            0 => None,
            1 => {
                if names.len() < 2 || !is_marker(&names[names.len() - 2]) {
                    return Err(BadParameters::RestMarkerNotPenultimate);
                }
                let rest = names.pop();
                let _marker = names.pop();
                rest
            }
            n => return Err(BadParameters::TooManyRestMarkers(n)),
        };

        let mut seen = HashSet::new();
        for name in names.iter().chain(rest.iter()) {
            if !seen.insert(name.as_str()) {
                return Err(BadParameters::Duplicate(name.clone()));
            }
        }
        Ok(ParamSpec { fixed: names, rest })
    }

    pub fn arity(&self) -> Arity {
        match self.rest {
            None => Arity::exactly(self.fixed.len()),
            Some(_) => Arity::at_least(self.fixed.len()),
        }
    }

    /// Every name this spec binds, fixed parameters first.
    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.fixed.iter().chain(self.rest.iter())
    }
}

/// How a closure reaches the bindings it was created under.
#[derive(Clone)]
pub enum ClosureData {
    /// The whole defining environment is retained.
    Legacy(Rc<Environment>),
    /// Only the slots of free variables bound in the defining frame are
    /// retained; anything else is resolved through `parent`.
    Optimized {
        captured: Vec<(String, Slot)>,
        parent: Rc<Environment>,
    },
}

impl ClosureData {
    pub fn captured_names(&self) -> Vec<&str> {
        match self {
            ClosureData::Legacy(_) => Vec::new(),
            ClosureData::Optimized { captured, .. } => {
                captured.iter().map(|(name, _)| name.as_str()).collect()
            }
        }
    }
}

#[derive(Clone)]
pub struct Closure {
    pub name: Option<String>,
    pub params: ParamSpec,
    pub body: Rc<Expr>,
    pub data: ClosureData,
}

impl Closure {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("lambda")
    }
}

impl fmt::Debug for Closure {
    // Not derived: the environment may well contain this closure.
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Closure{{name: {:?}, params: {}, captured: {:?}}}",
            self.name,
            self.params,
            self.data.captured_names()
        )
    }
}

#[derive(Clone)]
pub struct Macro {
    pub name: String,
    pub params: ParamSpec,
    pub body: Rc<Expr>,
    pub env: Rc<Environment>,
}

impl fmt::Debug for Macro {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Macro{{name: {}, params: {}}}", self.name, self.params)
    }
}

pub struct Module {
    pub name: String,
    pub env: Rc<Environment>,
    pub exports: Vec<String>,
}

impl Module {
    pub fn exports(&self, name: &str) -> bool {
        self.exports.iter().any(|e| e == name)
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Module{{name: {}, exports: {:?}}}", self.name, self.exports)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub name: String,
    pub fields: Vec<(String, Value)>,
}

impl Record {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value)
    }
}

#[derive(Debug, Clone)]
pub struct Pair {
    pub car: Value,
    pub cdr: Value,
}

#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Unspecified,
    Int(MInt),
    Float(f64),
    Bool(bool),
    Symbol(Symbol),
    String(String),
    Pair(Rc<Pair>),
    Record(Rc<Record>),
    Primitive(&'static PrimitiveFn),
    Quote(Rc<Value>),
    Quasiquote(Rc<Value>),
    Unquote(Rc<Value>),
    UnquoteSplicing(Rc<Value>),
    Closure(Rc<Closure>),
    Macro(Rc<Macro>),
    Module(Rc<Module>),
}

pub fn truthy(value: &Value) -> bool {
    !matches!(value, Value::Bool(false))
}

pub fn callable(value: &Value) -> bool {
    use Value::*;
    match value {
        Primitive(_) | Closure(_) => true,
        Nil | Unspecified | Int(_) | Float(_) | Bool(_) | Symbol(_) | String(_) | Pair(_)
        | Record(_) | Quote(_) | Quasiquote(_) | Unquote(_) | UnquoteSplicing(_) | Macro(_)
        | Module(_) => false,
    }
}

/// A value had the wrong shape for the operation applied to it.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeMismatch {
    pub expected: &'static str,
    pub got: &'static str,
}

impl fmt::Display for TypeMismatch {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "expected {}, got {}", self.expected, self.got)
    }
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        use Value::*;
        match self {
            Nil => "nil",
            Unspecified => "unspecified",
            Int(_) => "int",
            Float(_) => "float",
            Bool(_) => "bool",
            Symbol(_) => "symbol",
            String(_) => "string",
            Pair(_) => "pair",
            Record(_) => "record",
            Primitive(_) => "primitive",
            Quote(_) => "quote",
            Quasiquote(_) => "quasiquote",
            Unquote(_) => "unquote",
            UnquoteSplicing(_) => "unquote-splicing",
            Closure(_) => "closure",
            Macro(_) => "macro",
            Module(_) => "module",
        }
    }

    fn mismatch(&self, expected: &'static str) -> TypeMismatch {
        TypeMismatch {
            expected,
            got: self.type_name(),
        }
    }

    pub fn symbol(name: &str) -> Self {
        Value::Symbol(Symbol(name.to_string()))
    }

    pub fn string(s: &str) -> Self {
        Value::String(s.to_string())
    }

    pub fn cons(car: Value, cdr: Value) -> Self {
        Value::Pair(Rc::new(Pair { car, cdr }))
    }

    /// Builds a proper list.
    pub fn list(elements: Vec<Value>) -> Self {
        Self::list_with_tail(elements, Value::Nil)
    }

    /// Builds a list ending in `tail` instead of `Nil`.
    pub fn list_with_tail(elements: Vec<Value>, tail: Value) -> Self {
        elements
            .into_iter()
            .rev()
            .fold(tail, |acc, element| Value::cons(element, acc))
    }

    /// The elements of a proper list, or `None` for anything else.
    pub fn to_vec(&self) -> Option<Vec<Value>> {
        let mut out = Vec::new();
        let mut current = self;
        loop {
            match current {
                Value::Nil => return Some(out),
                Value::Pair(pair) => {
                    out.push(pair.car.clone());
                    current = &pair.cdr;
                }
                _ => return None,
            }
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn is_list(&self) -> bool {
        self.to_vec().is_some()
    }

    pub fn as_int(&self) -> Result<MInt, TypeMismatch> {
        match self {
            Value::Int(x) => Ok(*x),
            _ => Err(self.mismatch("an integer")),
        }
    }

    pub fn as_symbol(&self) -> Result<&Symbol, TypeMismatch> {
        match self {
            Value::Symbol(s) => Ok(s),
            _ => Err(self.mismatch("a symbol")),
        }
    }

    pub fn as_str(&self) -> Result<&str, TypeMismatch> {
        match self {
            Value::String(s) => Ok(s),
            _ => Err(self.mismatch("a string")),
        }
    }

    /// Accepts strings and symbols alike, for primitives taking a name.
    pub fn as_name(&self) -> Result<&str, TypeMismatch> {
        match self {
            Value::String(s) => Ok(s),
            Value::Symbol(s) => Ok(s.as_ref()),
            _ => Err(self.mismatch("a string or symbol")),
        }
    }

    pub fn as_pair(&self) -> Result<&Pair, TypeMismatch> {
        match self {
            Value::Pair(p) => Ok(p),
            _ => Err(self.mismatch("a pair")),
        }
    }

    pub fn as_list(&self) -> Result<Vec<Value>, TypeMismatch> {
        self.to_vec().ok_or_else(|| self.mismatch("a proper list"))
    }

    pub fn as_record(&self) -> Result<&Record, TypeMismatch> {
        match self {
            Value::Record(r) => Ok(r),
            _ => Err(self.mismatch("a record")),
        }
    }

    pub fn as_closure(&self) -> Result<&Closure, TypeMismatch> {
        match self {
            Value::Closure(c) => Ok(c),
            _ => Err(self.mismatch("a closure")),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        use Value::*;
        match (self, other) {
            (Nil, Nil) | (Unspecified, Unspecified) => true,
            (Int(x), Int(y)) => x == y,
            (Float(x), Float(y)) => x == y,
            (Int(x), Float(y)) | (Float(y), Int(x)) => (*x as f64) == *y,
            (Bool(x), Bool(y)) => x == y,
            (Symbol(x), Symbol(y)) => x == y,
            (String(x), String(y)) => x == y,
            (Pair(x), Pair(y)) => x.car == y.car && x.cdr == y.cdr,
            (Record(x), Record(y)) => x == y,
            (Primitive(x), Primitive(y)) => x.name == y.name,
            (Quote(x), Quote(y))
            | (Quasiquote(x), Quasiquote(y))
            | (Unquote(x), Unquote(y))
            | (UnquoteSplicing(x), UnquoteSplicing(y)) => x == y,
            (Closure(x), Closure(y)) => Rc::ptr_eq(x, y),
            (Macro(x), Macro(y)) => Rc::ptr_eq(x, y),
            (Module(x), Module(y)) => Rc::ptr_eq(x, y),
            _ => false,
        }
    }
}
