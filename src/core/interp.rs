//! Purpose: Confine the embedded jq-dialect engine behind host-typed calls.
//! Exports: `Program`, `compile` (crate-internal only).
//! Role: The one module permitted to name `jaq_core`/`jaq_std` items.
//! Invariants: Interpreter types never cross this module's boundary.
//! Invariants: Integer JSON values survive evaluation as integers.
//! Invariants: Results with no JSON representation are `Convert` errors, not panics.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use jaq_core::load::{Arena, File, Loader};
use jaq_core::{Compiler, Ctx, Error as JaqError, Native, RcIter};
use serde_json::Value;

use crate::core::error::{Error, ErrorKind};

/// A compiled expression, ready to run against host JSON inputs.
#[derive(Clone)]
pub(crate) struct Program {
    expr: String,
    filter: jaq_core::Filter<Native<Val>>,
}

impl fmt::Debug for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Program").field("expr", &self.expr).finish()
    }
}

/// Compile `expr` with `prelude` (zero or more `def ..;` declarations)
/// prepended. Parse and compile failures are usage errors.
pub(crate) fn compile(prelude: &str, expr: &str) -> Result<Program, Error> {
    let arena = Arena::default();
    let loader = Loader::new(std::iter::empty());

    let code = if prelude.is_empty() {
        expr.to_string()
    } else {
        format!("{prelude}\n{expr}")
    };
    let program = File {
        code: code.as_str(),
        path: (),
    };
    let modules = loader
        .load(&arena, program)
        .map_err(|errs| compile_error(expr, errs))?;

    let filter = Compiler::default()
        .with_funs(jaq_std::base_funs::<Val>())
        .compile(modules)
        .map_err(|errs| compile_error(expr, errs))?;

    Ok(Program {
        expr: expr.to_string(),
        filter,
    })
}

impl Program {
    /// Run the program once against `input` and collect every produced value.
    /// Runtime failures inside the engine are `Eval` errors.
    pub(crate) fn run(&self, input: &Value) -> Result<Vec<Value>, Error> {
        let input = Val::from_json(input);
        let inputs = RcIter::new(core::iter::empty::<Result<Val, String>>());
        let out = self.filter.run((Ctx::new([], &inputs), input));

        let mut results = Vec::new();
        for item in out {
            match item {
                Ok(val) => {
                    let json = val
                        .into_json()
                        .map_err(|err| err.with_expr(self.expr.clone()))?;
                    results.push(json);
                }
                Err(_runtime_err) => {
                    return Err(Error::new(ErrorKind::Eval)
                        .with_message("expression failed inside the embedded engine")
                        .with_expr(self.expr.clone()));
                }
            }
        }

        Ok(results)
    }
}

fn compile_error<E: fmt::Debug>(expr: &str, err: E) -> Error {
    Error::new(ErrorKind::Usage)
        .with_message("invalid expression")
        .with_expr(expr)
        .with_hint(format!(
            "Failed to parse/compile `{expr}`.\nDetails: {err:?}\nExample: .data.count + 1"
        ))
}

/// Bridge value type the engine computes over. Not exported; the host side
/// of every conversion is `serde_json::Value`.
#[derive(Clone, Debug)]
enum Val {
    Null,
    Bool(bool),
    Int(i64),
    Num(f64),
    Str(String),
    Arr(Vec<Val>),
    Obj(BTreeMap<String, Val>),
}

impl Val {
    fn kind_rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Bool(_) => 1,
            Self::Int(_) | Self::Num(_) => 2,
            Self::Str(_) => 3,
            Self::Arr(_) => 4,
            Self::Obj(_) => 5,
        }
    }

    fn as_f64_opt(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Num(n) => Some(*n),
            _ => None,
        }
    }

    fn as_index_opt(&self) -> Option<isize> {
        match self {
            Self::Int(i) => isize::try_from(*i).ok(),
            Self::Num(n) if n.is_finite() && n.fract() == 0.0 => Some(*n as isize),
            _ => None,
        }
    }

    fn as_str_opt(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => n
                .as_i64()
                .map(Self::Int)
                .or_else(|| n.as_f64().map(Self::Num))
                .unwrap_or(Self::Num(0.0)),
            Value::String(s) => Self::Str(s.clone()),
            Value::Array(a) => Self::Arr(a.iter().map(Self::from_json).collect()),
            Value::Object(o) => Self::Obj(
                o.iter()
                    .map(|(k, v)| (k.clone(), Self::from_json(v)))
                    .collect(),
            ),
        }
    }

    fn into_json(self) -> Result<Value, Error> {
        match self {
            Self::Null => Ok(Value::Null),
            Self::Bool(b) => Ok(Value::Bool(b)),
            Self::Int(i) => Ok(Value::from(i)),
            Self::Num(n) => serde_json::Number::from_f64(n)
                .map(Value::Number)
                .ok_or_else(|| {
                    Error::new(ErrorKind::Convert)
                        .with_message(format!("result `{n}` has no JSON representation"))
                }),
            Self::Str(s) => Ok(Value::String(s)),
            Self::Arr(a) => a
                .into_iter()
                .map(Self::into_json)
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Self::Obj(o) => {
                let mut map = serde_json::Map::new();
                for (k, v) in o {
                    map.insert(k, v.into_json()?);
                }
                Ok(Value::Object(map))
            }
        }
    }
}

// Display is required by the engine's value trait; it only feeds error text.
impl fmt::Display for Val {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Num(n) => write!(f, "{n}"),
            Self::Str(s) => match serde_json::to_string(s) {
                Ok(encoded) => write!(f, "{encoded}"),
                Err(_) => write!(f, "\"<invalid string>\""),
            },
            Self::Arr(a) => {
                write!(f, "[")?;
                for (idx, item) in a.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Self::Obj(o) => {
                write!(f, "{{")?;
                for (idx, (k, v)) in o.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ",")?;
                    }
                    let k = serde_json::to_string(k).unwrap_or_else(|_| "\"<key>\"".to_string());
                    write!(f, "{k}:{v}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<bool> for Val {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<isize> for Val {
    fn from(value: isize) -> Self {
        Self::Int(value as i64)
    }
}

impl From<f64> for Val {
    fn from(value: f64) -> Self {
        Self::Num(value)
    }
}

impl From<String> for Val {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl FromIterator<Self> for Val {
    fn from_iter<T: IntoIterator<Item = Self>>(iter: T) -> Self {
        Self::Arr(iter.into_iter().collect())
    }
}

impl PartialEq for Val {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Arr(a), Self::Arr(b)) => a == b,
            (Self::Obj(a), Self::Obj(b)) => a == b,
            (a, b) => match (a.as_f64_opt(), b.as_f64_opt()) {
                // Int(1) and Num(1.0) compare equal, like JSON numbers do.
                (Some(a), Some(b)) => a.to_bits() == b.to_bits(),
                _ => false,
            },
        }
    }
}

impl Eq for Val {}

impl PartialOrd for Val {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Val {
    fn cmp(&self, other: &Self) -> Ordering {
        let ka = self.kind_rank();
        let kb = other.kind_rank();
        if ka != kb {
            return ka.cmp(&kb);
        }
        match (self, other) {
            (Self::Null, Self::Null) => Ordering::Equal,
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Str(a), Self::Str(b)) => a.cmp(b),
            (Self::Arr(a), Self::Arr(b)) => a.cmp(b),
            (Self::Obj(a), Self::Obj(b)) => a.cmp(b),
            (a, b) => match (a.as_f64_opt(), b.as_f64_opt()) {
                (Some(a), Some(b)) => a.total_cmp(&b),
                _ => Ordering::Equal,
            },
        }
    }
}

impl std::ops::Add for Val {
    type Output = Result<Self, JaqError<Self>>;

    fn add(self, rhs: Self) -> Self::Output {
        use jaq_core::ops::Math;
        match (self, rhs) {
            (Self::Int(a), Self::Int(b)) => Ok(a
                .checked_add(b)
                .map(Self::Int)
                .unwrap_or(Self::Num(a as f64 + b as f64))),
            (Self::Str(a), Self::Str(b)) => Ok(Self::Str(format!("{a}{b}"))),
            (Self::Arr(mut a), Self::Arr(b)) => {
                a.extend(b);
                Ok(Self::Arr(a))
            }
            (l, r) => match (l.as_f64_opt(), r.as_f64_opt()) {
                (Some(a), Some(b)) => Ok(Self::Num(a + b)),
                _ => Err(JaqError::math(l, Math::Add, r)),
            },
        }
    }
}

impl std::ops::Sub for Val {
    type Output = Result<Self, JaqError<Self>>;

    fn sub(self, rhs: Self) -> Self::Output {
        use jaq_core::ops::Math;
        match (self, rhs) {
            (Self::Int(a), Self::Int(b)) => Ok(a
                .checked_sub(b)
                .map(Self::Int)
                .unwrap_or(Self::Num(a as f64 - b as f64))),
            (l, r) => match (l.as_f64_opt(), r.as_f64_opt()) {
                (Some(a), Some(b)) => Ok(Self::Num(a - b)),
                _ => Err(JaqError::math(l, Math::Sub, r)),
            },
        }
    }
}

impl std::ops::Mul for Val {
    type Output = Result<Self, JaqError<Self>>;

    fn mul(self, rhs: Self) -> Self::Output {
        use jaq_core::ops::Math;
        match (self, rhs) {
            (Self::Int(a), Self::Int(b)) => Ok(a
                .checked_mul(b)
                .map(Self::Int)
                .unwrap_or(Self::Num(a as f64 * b as f64))),
            (l, r) => match (l.as_f64_opt(), r.as_f64_opt()) {
                (Some(a), Some(b)) => Ok(Self::Num(a * b)),
                _ => Err(JaqError::math(l, Math::Mul, r)),
            },
        }
    }
}

impl std::ops::Div for Val {
    type Output = Result<Self, JaqError<Self>>;

    fn div(self, rhs: Self) -> Self::Output {
        use jaq_core::ops::Math;
        match (self, rhs) {
            (Self::Int(a), Self::Int(b)) => {
                if b == 0 {
                    return Err(JaqError::math(Self::Int(a), Math::Div, Self::Int(b)));
                }
                if a % b == 0 {
                    Ok(Self::Int(a / b))
                } else {
                    Ok(Self::Num(a as f64 / b as f64))
                }
            }
            (l, r) => match (l.as_f64_opt(), r.as_f64_opt()) {
                (Some(a), Some(b)) => Ok(Self::Num(a / b)),
                _ => Err(JaqError::math(l, Math::Div, r)),
            },
        }
    }
}

impl std::ops::Rem for Val {
    type Output = Result<Self, JaqError<Self>>;

    fn rem(self, rhs: Self) -> Self::Output {
        use jaq_core::ops::Math;
        match (self, rhs) {
            (Self::Int(a), Self::Int(b)) => a
                .checked_rem(b)
                .map(Self::Int)
                .ok_or_else(|| JaqError::math(Self::Int(a), Math::Rem, Self::Int(b))),
            (l, r) => match (l.as_f64_opt(), r.as_f64_opt()) {
                (Some(a), Some(b)) => Ok(Self::Num(a % b)),
                _ => Err(JaqError::math(l, Math::Rem, r)),
            },
        }
    }
}

impl std::ops::Neg for Val {
    type Output = Result<Self, JaqError<Self>>;

    fn neg(self) -> Self::Output {
        match self {
            Self::Int(a) => Ok(a
                .checked_neg()
                .map(Self::Int)
                .unwrap_or(Self::Num(-(a as f64)))),
            Self::Num(a) => Ok(Self::Num(-a)),
            other => Err(JaqError::typ(other, "number")),
        }
    }
}

impl jaq_core::ValT for Val {
    fn from_num(n: &str) -> Result<Self, JaqError<Self>> {
        if let Ok(int) = n.parse::<i64>() {
            return Ok(Self::Int(int));
        }
        let parsed = n.parse::<f64>().map_err(JaqError::str)?;
        Ok(Self::Num(parsed))
    }

    fn from_map<I: IntoIterator<Item = (Self, Self)>>(iter: I) -> Result<Self, JaqError<Self>> {
        let mut map = BTreeMap::new();
        for (k, v) in iter {
            let Some(key) = k.as_str_opt() else {
                return Err(JaqError::typ(k, "string"));
            };
            map.insert(key.to_string(), v);
        }
        Ok(Self::Obj(map))
    }

    fn values(self) -> Box<dyn Iterator<Item = Result<Self, JaqError<Self>>>> {
        match self {
            Self::Arr(values) => Box::new(values.into_iter().map(Ok)),
            Self::Obj(values) => Box::new(values.into_values().map(Ok)),
            other => Box::new(std::iter::once(Err(JaqError::typ(other, "iterable")))),
        }
    }

    fn index(self, index: &Self) -> Result<Self, JaqError<Self>> {
        match (self, index) {
            (Self::Obj(mut obj), Self::Str(key)) => obj
                .remove(key)
                .ok_or_else(|| JaqError::index(Self::Obj(obj), Self::Str(key.clone()))),
            (Self::Arr(arr), idx) if idx.as_index_opt().is_some() => {
                let n = idx.as_index_opt().unwrap_or(0);
                let len = arr.len() as isize;
                let n = if n < 0 { len + n } else { n };
                let n = usize::try_from(n).map_err(JaqError::str)?;
                arr.get(n)
                    .cloned()
                    .ok_or_else(|| JaqError::index(Self::Arr(arr), idx.clone()))
            }
            (l, r) => Err(JaqError::index(l, r.clone())),
        }
    }

    fn range(self, range: jaq_core::val::Range<&Self>) -> Result<Self, JaqError<Self>> {
        let to_index = |v: &Self| -> Result<isize, JaqError<Self>> {
            v.as_index_opt()
                .ok_or_else(|| JaqError::typ(v.clone(), "integer"))
        };
        match self {
            Self::Arr(arr) => {
                let len = arr.len() as isize;
                let start = range.start.map(to_index).transpose()?.unwrap_or(0);
                let end = range.end.map(to_index).transpose()?.unwrap_or(len);
                let norm = |idx: isize| if idx < 0 { len + idx } else { idx };
                let start = norm(start).clamp(0, len) as usize;
                let end = norm(end).clamp(0, len) as usize;
                let slice = if end >= start {
                    arr[start..end].to_vec()
                } else {
                    Vec::new()
                };
                Ok(Self::Arr(slice))
            }
            other => Err(JaqError::typ(other, "array")),
        }
    }

    fn map_values<'a, I: Iterator<Item = jaq_core::ValX<'a, Self>>>(
        self,
        opt: jaq_core::path::Opt,
        f: impl Fn(Self) -> I,
    ) -> jaq_core::ValX<'a, Self> {
        match self {
            Self::Arr(values) => {
                let mut out = Vec::with_capacity(values.len());
                for value in values {
                    let mut iter = f(value);
                    match iter.next() {
                        Some(Ok(v)) => out.push(v),
                        Some(Err(e)) => return Err(e),
                        None => out.push(Self::Null),
                    }
                }
                Ok(Self::Arr(out))
            }
            Self::Obj(values) => {
                let mut out = BTreeMap::new();
                for (k, v) in values {
                    let mut iter = f(v);
                    match iter.next() {
                        Some(Ok(v)) => {
                            out.insert(k, v);
                        }
                        Some(Err(e)) => return Err(e),
                        None => {
                            out.insert(k, Self::Null);
                        }
                    }
                }
                Ok(Self::Obj(out))
            }
            other => match opt {
                jaq_core::path::Opt::Optional => Ok(other),
                jaq_core::path::Opt::Essential => Err(JaqError::typ(other, "iterable").into()),
            },
        }
    }

    fn map_index<'a, I: Iterator<Item = jaq_core::ValX<'a, Self>>>(
        self,
        index: &Self,
        opt: jaq_core::path::Opt,
        f: impl Fn(Self) -> I,
    ) -> jaq_core::ValX<'a, Self> {
        match self {
            Self::Obj(mut obj) => {
                let Some(key) = index.as_str_opt() else {
                    return Err(JaqError::typ(index.clone(), "string").into());
                };
                match obj.remove(key) {
                    Some(value) => {
                        let mut iter = f(value);
                        let next = match iter.next() {
                            Some(Ok(v)) => v,
                            Some(Err(e)) => return Err(e),
                            None => Self::Null,
                        };
                        obj.insert(key.to_string(), next);
                        Ok(Self::Obj(obj))
                    }
                    None => match opt {
                        jaq_core::path::Opt::Optional => Ok(Self::Obj(obj)),
                        jaq_core::path::Opt::Essential => {
                            Err(JaqError::index(Self::Obj(obj), index.clone()).into())
                        }
                    },
                }
            }
            other => match opt {
                jaq_core::path::Opt::Optional => Ok(other),
                jaq_core::path::Opt::Essential => Err(JaqError::index(other, index.clone()).into()),
            },
        }
    }

    fn map_range<'a, I: Iterator<Item = jaq_core::ValX<'a, Self>>>(
        self,
        range: jaq_core::val::Range<&Self>,
        opt: jaq_core::path::Opt,
        f: impl Fn(Self) -> I,
    ) -> jaq_core::ValX<'a, Self> {
        match self {
            Self::Arr(arr) => {
                let slice = Self::Arr(arr).range(range)?;
                let mut iter = f(slice);
                match iter.next() {
                    Some(Ok(v)) => Ok(v),
                    Some(Err(e)) => Err(e),
                    None => Ok(Self::Null),
                }
            }
            other => match opt {
                jaq_core::path::Opt::Optional => Ok(other),
                jaq_core::path::Opt::Essential => Err(JaqError::typ(other, "array").into()),
            },
        }
    }

    fn as_bool(&self) -> bool {
        !matches!(self, Self::Null | Self::Bool(false))
    }

    fn as_str(&self) -> Option<&str> {
        self.as_str_opt()
    }
}

impl jaq_std::ValT for Val {
    fn into_seq<S: FromIterator<Self>>(self) -> Result<S, Self> {
        match self {
            Self::Arr(values) => Ok(values.into_iter().collect()),
            other => Err(other),
        }
    }

    fn as_isize(&self) -> Option<isize> {
        self.as_index_opt()
    }

    fn as_f64(&self) -> Result<f64, JaqError<Self>> {
        self.as_f64_opt()
            .ok_or_else(|| JaqError::typ(self.clone(), "number"))
    }
}
