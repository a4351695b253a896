use crate::strings::string_repr;
use crate::types::Value;
use std::fmt::{self, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrintMode {
    /// Strings are quoted and escaped so the output reads back.
    ReadableRepresentation,
    /// Strings are written as their raw contents.
    Directly,
}

pub fn pr_str(value: &Value, mode: PrintMode) -> String {
    let mut output = String::new();
    // Writing into a String cannot fail.
    let _ = write_value(&mut output, value, mode);
    output
}

fn write_float(out: &mut impl Write, x: f64) -> fmt::Result {
    match x.is_finite() && x.fract() == 0.0 {
        true => write!(out, "{:.1}", x),
        false => write!(out, "{}", x),
    }
}

fn write_list(out: &mut impl Write, value: &Value, mode: PrintMode) -> fmt::Result {
    out.write_char('(')?;
    let mut current = value;
    let mut first = true;
    loop {
        match current {
            Value::Pair(pair) => {
                if !first {
                    out.write_char(' ')?;
                }
                write_value(out, &pair.car, mode)?;
                first = false;
                current = &pair.cdr;
            }
            Value::Nil => break,
            tail => {
                out.write_str(" . ")?;
                write_value(out, tail, mode)?;
                break;
            }
        }
    }
    out.write_char(')')
}

fn write_value(out: &mut impl Write, value: &Value, mode: PrintMode) -> fmt::Result {
    use Value::*;
    match value {
        Nil => out.write_str("()"),
        Unspecified => out.write_str("#<unspecified>"),
        Int(x) => write!(out, "{}", x),
        Float(x) => write_float(out, *x),
        Bool(true) => out.write_str("#t"),
        Bool(false) => out.write_str("#f"),
        Symbol(s) => out.write_str(s.as_ref()),
        String(s) => match mode {
            PrintMode::ReadableRepresentation => out.write_str(&string_repr(s)),
            PrintMode::Directly => out.write_str(s),
        },
        Pair(_) => write_list(out, value, mode),
        Record(r) => {
            write!(out, "#<record {}", r.name)?;
            for (field, v) in &r.fields {
                write!(out, " {}=", field)?;
                write_value(out, v, mode)?;
            }
            out.write_char('>')
        }
        Primitive(p) => write!(out, "#<primitive {}>", p.name),
        Quote(x) => {
            out.write_char('\'')?;
            write_value(out, x, mode)
        }
        Quasiquote(x) => {
            out.write_char('`')?;
            write_value(out, x, mode)
        }
        Unquote(x) => {
            out.write_char(',')?;
            write_value(out, x, mode)
        }
        UnquoteSplicing(x) => {
            out.write_str(",@")?;
            write_value(out, x, mode)
        }
        Closure(c) => write!(out, "#<closure {}>", c.display_name()),
        Macro(m) => write!(out, "#<macro {}>", m.name),
        Module(m) => write!(out, "#<module {}>", m.name),
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_value(f, self, PrintMode::ReadableRepresentation)
    }
}
