//! Helper functions callable from message templates.
//!
//! Names follow the sprig library familiar from Go templates. Arithmetic
//! stays integral when every operand is an integer and otherwise works in
//! floating point, so `add .lat 0.001` does what it looks like.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::TemplateError;
use crate::template::Value;

type Call = fn(&[Value]) -> Result<Value, String>;

/// Upper bound on the output of `repeat`.
const MAX_REPEAT_BYTES: usize = 10 * 1024 * 1024;

/// A resolved helper function.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Func {
    name: &'static str,
    call: Call,
}

impl Func {
    pub(crate) fn call(&self, args: &[Value]) -> Result<Value, TemplateError> {
        (self.call)(args).map_err(|message| TemplateError::function(self.name, message))
    }
}

const FUNCS: &[(&str, Call)] = &[
    ("print", print),
    ("printf", printf),
    ("upper", upper),
    ("lower", lower),
    ("trim", trim),
    ("title", title),
    ("quote", quote),
    ("squote", squote),
    ("repeat", repeat),
    ("replace", replace),
    ("default", default),
    ("toString", to_string),
    ("toJson", to_json),
    ("int", int),
    ("float64", float64),
    ("add", add),
    ("sub", sub),
    ("mul", mul),
    ("div", div),
    ("mod", modulo),
    ("max", max),
    ("min", min),
    ("round", round),
    ("floor", floor),
    ("ceil", ceil),
    ("abs", abs),
    ("randInt", rand_int),
    ("epoch", epoch),
];

pub(crate) fn lookup(name: &str) -> Option<Func> {
    FUNCS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|&(name, call)| Func { name, call })
}

// ---- argument handling ----

fn arity(args: &[Value], want: usize) -> Result<(), String> {
    if args.len() == want {
        Ok(())
    } else {
        Err(format!("wrong number of args: want {want} got {}", args.len()))
    }
}

fn at_least(args: &[Value], want: usize) -> Result<(), String> {
    if args.len() >= want {
        Ok(())
    } else {
        Err(format!("wrong number of args: want at least {want} got {}", args.len()))
    }
}

#[derive(Debug, Clone, Copy)]
enum Num {
    I(i64),
    F(f64),
}

impl Num {
    fn float(self) -> f64 {
        match self {
            Self::I(i) => i as f64,
            Self::F(x) => x,
        }
    }

    fn value(self) -> Value {
        match self {
            Self::I(i) => Value::Int(i),
            Self::F(x) => Value::Float(x),
        }
    }
}

fn num(v: &Value) -> Result<Num, String> {
    match v {
        Value::Int(i) => Ok(Num::I(*i)),
        Value::Float(x) => Ok(Num::F(*x)),
        Value::Str(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .map(Num::I)
                .or_else(|_| s.parse::<f64>().map(Num::F))
                .map_err(|_| format!("cannot convert {s:?} to a number"))
        }
        Value::Bool(_) => Err("cannot use bool as a number".to_string()),
    }
}

fn float(v: &Value) -> Result<f64, String> {
    num(v).map(Num::float)
}

fn integer(v: &Value) -> Result<i64, String> {
    match num(v)? {
        Num::I(i) => Ok(i),
        Num::F(x) => Ok(x.trunc() as i64),
    }
}

fn arith(args: &[Value], int_op: fn(i64, i64) -> Option<i64>, float_op: fn(f64, f64) -> f64) -> Result<Value, String> {
    at_least(args, 2)?;
    let mut acc = num(&args[0])?;
    for arg in &args[1..] {
        acc = match (acc, num(arg)?) {
            (Num::I(a), Num::I(b)) => {
                Num::I(int_op(a, b).ok_or("integer overflow or division by zero")?)
            }
            (a, b) => Num::F(float_op(a.float(), b.float())),
        };
    }
    Ok(acc.value())
}

// ---- formatting ----

/// Format a float the way Go's `%v` does: shortest representation, switching
/// to exponent form outside [1e-4, 1e6).
pub(crate) fn format_float(x: f64) -> String {
    if x.is_nan() {
        return "NaN".to_string();
    }
    if x.is_infinite() {
        return if x > 0.0 { "+Inf" } else { "-Inf" }.to_string();
    }
    let abs = x.abs();
    if abs != 0.0 && !(1e-4..1e6).contains(&abs) {
        go_exponent(&format!("{x:e}"))
    } else {
        format!("{x}")
    }
}

/// Rust writes `1.5e-7`, Go writes `1.5e-07`.
fn go_exponent(s: &str) -> String {
    match s.split_once('e') {
        Some((mantissa, exp)) => {
            let (sign, digits) = match exp.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exp),
            };
            format!("{mantissa}e{sign}{digits:0>2}")
        }
        None => s.to_string(),
    }
}

/// `%.Ng`: N significant digits, exponent form when the exponent is below -4
/// or at least N. Trailing zeros are dropped.
fn format_general(x: f64, precision: usize) -> String {
    if !x.is_finite() {
        return format_float(x);
    }
    let sci = format!("{:.*e}", precision - 1, x);
    let Some((mantissa, exp)) = sci.split_once('e') else {
        return sci;
    };
    let exp: i32 = exp.parse().unwrap_or(0);
    if exp < -4 || exp >= precision as i32 {
        let mantissa = strip_zeros(mantissa);
        return go_exponent(&format!("{mantissa}e{exp}"));
    }
    let decimals = usize::try_from(precision as i32 - 1 - exp).unwrap_or(0);
    strip_zeros(&format!("{x:.decimals$}")).to_string()
}

fn strip_zeros(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

#[derive(Debug, Default)]
struct Spec {
    minus: bool,
    plus: bool,
    zero: bool,
    space: bool,
    width: Option<usize>,
    precision: Option<usize>,
}

fn take_number(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Option<usize> {
    let mut n: Option<usize> = None;
    while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
        n = Some(n.unwrap_or(0).saturating_mul(10).saturating_add(d as usize));
        chars.next();
    }
    n
}

/// A subset of Go's fmt verbs: `%v %s %d %f %e %g %q %x %X %t %%`.
pub(crate) fn sprintf(format: &str, args: &[Value]) -> String {
    let mut out = String::new();
    let mut args = args.iter();
    let mut chars = format.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let mut spec = Spec::default();
        while let Some(&flag) = chars.peek() {
            match flag {
                '-' => spec.minus = true,
                '+' => spec.plus = true,
                '0' => spec.zero = true,
                ' ' => spec.space = true,
                _ => break,
            }
            chars.next();
        }
        spec.width = take_number(&mut chars);
        if chars.peek() == Some(&'.') {
            chars.next();
            spec.precision = Some(take_number(&mut chars).unwrap_or(0));
        }
        let Some(verb) = chars.next() else {
            out.push_str("%!(NOVERB)");
            break;
        };
        if verb == '%' {
            out.push('%');
            continue;
        }
        match args.next() {
            Some(arg) => out.push_str(&format_verb(verb, &spec, arg)),
            None => out.push_str(&format!("%!{verb}(MISSING)")),
        }
    }

    let extra: Vec<String> = args.map(|a| format!("{}={a}", a.type_name())).collect();
    if !extra.is_empty() {
        out.push_str(&format!("%!(EXTRA {})", extra.join(", ")));
    }
    out
}

fn format_verb(verb: char, spec: &Spec, arg: &Value) -> String {
    let precision = spec.precision;
    let (body, numeric) = match (verb, arg) {
        ('v', Value::Float(_) | Value::Int(_)) => (arg.to_string(), true),
        ('v', _) => (arg.to_string(), false),
        ('s', Value::Str(s)) => match precision {
            Some(p) => (s.chars().take(p).collect(), false),
            None => (s.clone(), false),
        },
        ('d', Value::Int(i)) => (i.to_string(), true),
        ('f' | 'F', Value::Float(x)) => (format!("{:.*}", precision.unwrap_or(6), x), true),
        ('e', Value::Float(x)) => (go_exponent(&format!("{:.*e}", precision.unwrap_or(6), x)), true),
        ('g', Value::Float(x)) => match precision {
            Some(p) => (format_general(*x, p.max(1)), true),
            None => (format_float(*x), true),
        },
        ('q', Value::Str(s)) => (format!("{s:?}"), false),
        ('x', Value::Int(i)) if *i < 0 => (format!("-{:x}", i.unsigned_abs()), true),
        ('x', Value::Int(i)) => (format!("{i:x}"), true),
        ('X', Value::Int(i)) if *i < 0 => (format!("-{:X}", i.unsigned_abs()), true),
        ('X', Value::Int(i)) => (format!("{i:X}"), true),
        ('x', Value::Str(s)) => (s.bytes().map(|b| format!("{b:02x}")).collect(), false),
        ('t', Value::Bool(b)) => (b.to_string(), false),
        _ => return format!("%!{verb}({}={arg})", arg.type_name()),
    };
    pad(body, spec, numeric)
}

fn pad(mut body: String, spec: &Spec, numeric: bool) -> String {
    if numeric && !body.starts_with('-') {
        if spec.plus {
            body.insert(0, '+');
        } else if spec.space {
            body.insert(0, ' ');
        }
    }
    let len = body.chars().count();
    let Some(width) = spec.width.filter(|w| *w > len) else {
        return body;
    };
    let fill = width - len;
    if spec.minus {
        body.push_str(&" ".repeat(fill));
        body
    } else if spec.zero && numeric {
        let sign = body.starts_with(['-', '+', ' ']) as usize;
        body.insert_str(sign, &"0".repeat(fill));
        body
    } else {
        format!("{}{body}", " ".repeat(fill))
    }
}

// ---- helpers ----

fn print(args: &[Value]) -> Result<Value, String> {
    let mut out = String::new();
    for (i, arg) in args.iter().enumerate() {
        let is_str = |v: &Value| matches!(v, Value::Str(_));
        if i > 0 && !is_str(arg) && !is_str(&args[i - 1]) {
            out.push(' ');
        }
        out.push_str(&arg.to_string());
    }
    Ok(Value::Str(out))
}

fn printf(args: &[Value]) -> Result<Value, String> {
    at_least(args, 1)?;
    match &args[0] {
        Value::Str(format) => Ok(Value::Str(sprintf(format, &args[1..]))),
        other => Err(format!("format must be a string, got {}", other.type_name())),
    }
}

fn upper(args: &[Value]) -> Result<Value, String> {
    arity(args, 1)?;
    Ok(Value::Str(args[0].to_string().to_uppercase()))
}

fn lower(args: &[Value]) -> Result<Value, String> {
    arity(args, 1)?;
    Ok(Value::Str(args[0].to_string().to_lowercase()))
}

fn trim(args: &[Value]) -> Result<Value, String> {
    arity(args, 1)?;
    Ok(Value::Str(args[0].to_string().trim().to_string()))
}

fn title(args: &[Value]) -> Result<Value, String> {
    arity(args, 1)?;
    let mut out = String::new();
    let mut at_word_start = true;
    for c in args[0].to_string().chars() {
        if at_word_start {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        at_word_start = is_word_separator(c);
    }
    Ok(Value::Str(out))
}

/// Word boundaries as Go's `strings.Title` sees them.
fn is_word_separator(c: char) -> bool {
    if c.is_ascii() {
        !(c.is_ascii_alphanumeric() || c == '_')
    } else {
        c.is_whitespace()
    }
}

fn quote(args: &[Value]) -> Result<Value, String> {
    let quoted: Vec<String> = args.iter().map(|a| format!("{:?}", a.to_string())).collect();
    Ok(Value::Str(quoted.join(" ")))
}

fn squote(args: &[Value]) -> Result<Value, String> {
    let quoted: Vec<String> = args.iter().map(|a| format!("'{a}'")).collect();
    Ok(Value::Str(quoted.join(" ")))
}

fn repeat(args: &[Value]) -> Result<Value, String> {
    arity(args, 2)?;
    let count = usize::try_from(integer(&args[0])?).map_err(|_| "negative repeat count")?;
    let text = args[1].to_string();
    match text.len().checked_mul(count) {
        Some(total) if total <= MAX_REPEAT_BYTES => Ok(Value::Str(text.repeat(count))),
        _ => Err(format!("repeat count {count} exceeds {MAX_REPEAT_BYTES} byte limit")),
    }
}

fn replace(args: &[Value]) -> Result<Value, String> {
    arity(args, 3)?;
    let (old, new) = (args[0].to_string(), args[1].to_string());
    Ok(Value::Str(args[2].to_string().replace(&old, &new)))
}

fn default(args: &[Value]) -> Result<Value, String> {
    at_least(args, 1)?;
    let given = args.get(1).filter(|v| match v {
        Value::Str(s) => !s.is_empty(),
        Value::Int(i) => *i != 0,
        Value::Float(x) => *x != 0.0,
        Value::Bool(b) => *b,
    });
    Ok(given.unwrap_or(&args[0]).clone())
}

fn to_string(args: &[Value]) -> Result<Value, String> {
    arity(args, 1)?;
    Ok(Value::Str(args[0].to_string()))
}

fn to_json(args: &[Value]) -> Result<Value, String> {
    arity(args, 1)?;
    serde_json::to_string(&args[0])
        .map(Value::Str)
        .map_err(|e| e.to_string())
}

fn int(args: &[Value]) -> Result<Value, String> {
    arity(args, 1)?;
    integer(&args[0]).map(Value::Int)
}

fn float64(args: &[Value]) -> Result<Value, String> {
    arity(args, 1)?;
    float(&args[0]).map(Value::Float)
}

fn add(args: &[Value]) -> Result<Value, String> {
    arith(args, i64::checked_add, |a, b| a + b)
}

fn sub(args: &[Value]) -> Result<Value, String> {
    arith(args, i64::checked_sub, |a, b| a - b)
}

fn mul(args: &[Value]) -> Result<Value, String> {
    arith(args, i64::checked_mul, |a, b| a * b)
}

fn div(args: &[Value]) -> Result<Value, String> {
    arith(args, i64::checked_div, |a, b| a / b)
}

fn modulo(args: &[Value]) -> Result<Value, String> {
    arity(args, 2)?;
    integer(&args[0])?
        .checked_rem(integer(&args[1])?)
        .map(Value::Int)
        .ok_or_else(|| "integer divide by zero".to_string())
}

fn extreme(args: &[Value], pick_first: fn(f64, f64) -> bool) -> Result<Value, String> {
    at_least(args, 1)?;
    let mut best = num(&args[0])?;
    for arg in &args[1..] {
        let candidate = num(arg)?;
        if pick_first(candidate.float(), best.float()) {
            best = candidate;
        }
    }
    Ok(best.value())
}

fn max(args: &[Value]) -> Result<Value, String> {
    extreme(args, |a, b| a > b)
}

fn min(args: &[Value]) -> Result<Value, String> {
    extreme(args, |a, b| a < b)
}

fn round(args: &[Value]) -> Result<Value, String> {
    if args.is_empty() || args.len() > 2 {
        return Err(format!("wrong number of args: want 1 or 2 got {}", args.len()));
    }
    let x = float(&args[0])?;
    let places = match args.get(1) {
        Some(p) => i32::try_from(integer(p)?).map_err(|_| "precision out of range")?,
        None => 0,
    };
    let scale = 10f64.powi(places);
    Ok(Value::Float((x * scale).round() / scale))
}

fn floor(args: &[Value]) -> Result<Value, String> {
    arity(args, 1)?;
    Ok(Value::Float(float(&args[0])?.floor()))
}

fn ceil(args: &[Value]) -> Result<Value, String> {
    arity(args, 1)?;
    Ok(Value::Float(float(&args[0])?.ceil()))
}

fn abs(args: &[Value]) -> Result<Value, String> {
    arity(args, 1)?;
    match num(&args[0])? {
        Num::I(i) => i.checked_abs().map(Value::Int).ok_or_else(|| "integer overflow".to_string()),
        Num::F(x) => Ok(Value::Float(x.abs())),
    }
}

fn rand_int(args: &[Value]) -> Result<Value, String> {
    arity(args, 2)?;
    let (lo, hi) = (integer(&args[0])?, integer(&args[1])?);
    if lo >= hi {
        return Err(format!("empty range {lo}..{hi}"));
    }
    Ok(Value::Int(rand::random_range(lo..hi)))
}

fn epoch(args: &[Value]) -> Result<Value, String> {
    arity(args, 0)?;
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| e.to_string())?
        .as_secs();
    Ok(Value::from(secs))
}
