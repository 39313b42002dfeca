#![forbid(unsafe_code)]

//! Dynamic model values.
//!
//! A [`Value`] is what scopes store and what expressions produce. Scalars are
//! immutable; [`Array`] and [`Object`] are shared, interior-mutable handles so
//! host code can mutate a collection in place and every holder observes the
//! change (collection watchers rely on this).
//!
//! # Invariants
//!
//! 1. Cloning a `Value` never deep-copies: collections and functions share
//!    their backing storage with the original.
//! 2. `strict_eq` compares collections and functions by identity, never by
//!    content.
//! 3. `same_value` agrees with `strict_eq` except that `NaN` equals itself.
//!
//! # Failure Modes
//!
//! - Reading a member of `undefined` or `null` returns
//!   [`EvalError::NullMember`]; every other receiver yields a value.
//! - A collection that contains itself renders its inner occurrence as
//!   empty text in `Display`, `null` in [`Value::to_json`], and `[Circular]`
//!   in `Debug`.

use std::cell::{Ref, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::error::EvalError;

/// Signature of callables stored in model state.
pub type NativeFn = dyn Fn(&[Value]) -> Value;

/// A dynamically typed model value.
#[derive(Clone, Default)]
pub enum Value {
    /// "No value". Produced by missing names and failed evaluations.
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Array(Array),
    Object(Object),
    Function(Function),
}

// ---------------------------------------------------------------------------
// Array
// ---------------------------------------------------------------------------

/// Shared, mutable list of values.
#[derive(Clone, Default)]
pub struct Array(Rc<RefCell<Vec<Value>>>);

impl Array {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_vec(items: Vec<Value>) -> Self {
        Self(Rc::new(RefCell::new(items)))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    /// Element at `index`, if present.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<Value> {
        self.0.borrow().get(index).cloned()
    }

    pub fn push(&self, value: impl Into<Value>) {
        self.0.borrow_mut().push(value.into());
    }

    /// Replace the element at `index`, padding with `undefined` when the
    /// index lies past the end.
    pub fn set(&self, index: usize, value: impl Into<Value>) {
        let mut items = self.0.borrow_mut();
        if index >= items.len() {
            items.resize(index + 1, Value::Undefined);
        }
        items[index] = value.into();
    }

    pub fn remove(&self, index: usize) -> Option<Value> {
        let mut items = self.0.borrow_mut();
        (index < items.len()).then(|| items.remove(index))
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }

    /// Copy of the current elements.
    #[must_use]
    pub fn to_vec(&self) -> Vec<Value> {
        self.0.borrow().clone()
    }

    /// Borrow the elements. Do not hold the guard across calls that may
    /// mutate this array.
    #[must_use]
    pub fn borrow(&self) -> Ref<'_, Vec<Value>> {
        self.0.borrow()
    }

    /// Whether both handles point at the same storage.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match Visit::enter(&self.0) {
            Some(_visit) => f.debug_list().entries(self.0.borrow().iter()).finish(),
            None => f.write_str("[Circular]"),
        }
    }
}

// ---------------------------------------------------------------------------
// Object
// ---------------------------------------------------------------------------

/// Shared, mutable string-keyed record. Members iterate in key order.
#[derive(Clone, Default)]
pub struct Object(Rc<RefCell<BTreeMap<String, Value>>>);

impl Object {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_map(members: BTreeMap<String, Value>) -> Self {
        Self(Rc::new(RefCell::new(members)))
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.0.borrow().get(key).cloned()
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.borrow_mut().insert(key.into(), value.into());
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.0.borrow_mut().remove(key)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.borrow().contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.0.borrow().keys().cloned().collect()
    }

    /// Copy of the current members.
    #[must_use]
    pub fn to_map(&self) -> BTreeMap<String, Value> {
        self.0.borrow().clone()
    }

    /// Borrow the members. Do not hold the guard across calls that may
    /// mutate this object.
    #[must_use]
    pub fn borrow(&self) -> Ref<'_, BTreeMap<String, Value>> {
        self.0.borrow()
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match Visit::enter(&self.0) {
            Some(_visit) => f.debug_map().entries(self.0.borrow().iter()).finish(),
            None => f.write_str("[Circular]"),
        }
    }
}

// ---------------------------------------------------------------------------
// Function
// ---------------------------------------------------------------------------

/// A host callable reachable from expressions, e.g. `showUser(user)`.
#[derive(Clone)]
pub struct Function(Rc<NativeFn>);

impl Function {
    pub fn new(f: impl Fn(&[Value]) -> Value + 'static) -> Self {
        Self(Rc::new(f))
    }

    pub fn call(&self, args: &[Value]) -> Value {
        (self.0)(args)
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Function")
    }
}

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

impl Value {
    /// Build an object value from key/value pairs.
    pub fn object<K, V, I>(members: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let map = members
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Value::Object(Object::from_map(map))
    }

    /// Build an array value.
    pub fn array<V, I>(items: I) -> Self
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        Value::Array(Array::from_vec(items.into_iter().map(Into::into).collect()))
    }

    /// Wrap a host callable.
    pub fn function(f: impl Fn(&[Value]) -> Value + 'static) -> Self {
        Value::Function(Function::new(f))
    }

    #[must_use]
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// `undefined` or `null`.
    #[must_use]
    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    /// Whether this is an array or an object.
    #[must_use]
    pub fn is_collection(&self) -> bool {
        matches!(self, Value::Array(_) | Value::Object(_))
    }

    /// JavaScript truthiness: `undefined`, `null`, `false`, `0`, `NaN` and
    /// `""` are falsy, everything else is truthy.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Array(_) | Value::Object(_) | Value::Function(_) => true,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(&**s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_function(&self) -> Option<&Function> {
        match self {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }

    /// Short type label used in diagnostics.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Function(_) => "function",
        }
    }

    /// Numeric coercion. Collections and functions coerce to `NaN`.
    #[must_use]
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Number(n) => *n,
            Value::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    0.0
                } else {
                    match trimmed {
                        "Infinity" | "+Infinity" => f64::INFINITY,
                        "-Infinity" => f64::NEG_INFINITY,
                        _ => trimmed.parse::<f64>().unwrap_or(f64::NAN),
                    }
                }
            }
            Value::Array(_) | Value::Object(_) | Value::Function(_) => f64::NAN,
        }
    }

    /// The `===` operator.
    #[must_use]
    pub fn strict_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a.ptr_eq(b),
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// The `==` operator: `null == undefined`, and numbers, strings and
    /// booleans compare numerically across types.
    #[must_use]
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (a, b) if a.is_nullish() && b.is_nullish() => true,
            (a, b) if a.is_nullish() || b.is_nullish() => false,
            (Value::Number(_) | Value::String(_) | Value::Bool(_), Value::Bool(_))
            | (Value::Bool(_), Value::Number(_) | Value::String(_))
            | (Value::Number(_), Value::String(_))
            | (Value::String(_), Value::Number(_)) => self.to_number() == other.to_number(),
            _ => self.strict_eq(other),
        }
    }

    /// Strict equality where `NaN` equals itself. Change detection uses this
    /// so an unchanged `NaN` does not count as a change.
    #[must_use]
    pub fn same_value(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) if a.is_nan() && b.is_nan() => true,
            _ => self.strict_eq(other),
        }
    }

    /// Read a named member: object keys, `length` of arrays and strings, and
    /// numeric indices. Other primitives have no members and yield
    /// `undefined`.
    pub fn member(&self, name: &str) -> Result<Value, EvalError> {
        match self {
            Value::Undefined | Value::Null => Err(EvalError::NullMember {
                property: name.to_owned(),
                receiver: self.type_name(),
            }),
            Value::Object(o) => Ok(o.get(name).unwrap_or_default()),
            Value::Array(a) => Ok(match name {
                "length" => Value::from(a.len()),
                _ => parse_index(name)
                    .and_then(|i| a.get(i))
                    .unwrap_or_default(),
            }),
            Value::String(s) => Ok(match name {
                "length" => Value::from(s.encode_utf16().count()),
                _ => parse_index(name)
                    .and_then(|i| s.chars().nth(i))
                    .map(|c| Value::from(c.to_string()))
                    .unwrap_or_default(),
            }),
            Value::Bool(_) | Value::Number(_) | Value::Function(_) => Ok(Value::Undefined),
        }
    }

    /// Computed member access (`target[key]`).
    pub fn index(&self, key: &Value) -> Result<Value, EvalError> {
        match (self, key) {
            (Value::Array(a), Value::Number(n)) => Ok(number_index(*n)
                .and_then(|i| a.get(i))
                .unwrap_or_default()),
            _ => self.member(&key.to_string()),
        }
    }

    /// Convert to JSON. Functions and `undefined` become `null`, as do
    /// non-finite numbers. Integral numbers render without a fraction.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Value::Undefined | Value::Null | Value::Function(_) => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 9.0e15 {
                    Json::from(*n as i64)
                } else {
                    serde_json::Number::from_f64(*n).map_or(Json::Null, Json::Number)
                }
            }
            Value::String(s) => Json::String(s.to_string()),
            Value::Array(a) => match Visit::enter(&a.0) {
                Some(_visit) => Json::Array(a.borrow().iter().map(Value::to_json).collect()),
                None => Json::Null,
            },
            Value::Object(o) => match Visit::enter(&o.0) {
                Some(_visit) => Json::Object(
                    o.borrow()
                        .iter()
                        .map(|(k, v)| (k.clone(), v.to_json()))
                        .collect(),
                ),
                None => Json::Null,
            },
        }
    }
}

fn parse_index(name: &str) -> Option<usize> {
    if name.is_empty() || (name.len() > 1 && name.starts_with('0')) {
        return None;
    }
    name.parse().ok()
}

fn number_index(n: f64) -> Option<usize> {
    (n >= 0.0 && n.fract() == 0.0 && n < usize::MAX as f64).then_some(n as usize)
}

/// Equality is [`Value::same_value`]: identity for collections and
/// functions, `NaN` equal to itself.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.same_value(other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("Undefined"),
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Number(n) => write!(f, "Number({n})"),
            Value::String(s) => write!(f, "String({s:?})"),
            Value::Array(a) => write!(f, "Array({a:?})"),
            Value::Object(o) => write!(f, "Object({o:?})"),
            Value::Function(_) => f.write_str("Function"),
        }
    }
}

/// Renders the way a binding would show the value as text.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => format_number(*n, f),
            Value::String(s) => f.write_str(s),
            Value::Array(a) => {
                let Some(_visit) = Visit::enter(&a.0) else {
                    return Ok(());
                };
                for (i, item) in a.borrow().iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    if !item.is_nullish() {
                        write!(f, "{item}")?;
                    }
                }
                Ok(())
            }
            Value::Object(_) => f.write_str("[object Object]"),
            Value::Function(_) => f.write_str("function"),
        }
    }
}

fn format_number(n: f64, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if n.is_nan() {
        f.write_str("NaN")
    } else if n.is_infinite() {
        f.write_str(if n > 0.0 { "Infinity" } else { "-Infinity" })
    } else if n == 0.0 {
        f.write_str("0")
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        write!(f, "{}", n as i128)
    } else {
        write!(f, "{n}")
    }
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(Array::from_vec(items))
    }
}

impl From<Array> for Value {
    fn from(a: Array) -> Self {
        Value::Array(a)
    }
}

impl From<Object> for Value {
    fn from(o: Object) -> Self {
        Value::Object(o)
    }
}

impl From<Function> for Value {
    fn from(f: Function) -> Self {
        Value::Function(f)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        use serde_json::Value as Json;
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(b),
            Json::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            Json::String(s) => Value::from(s),
            Json::Array(items) => Value::array(items.into_iter().map(Value::from)),
            Json::Object(members) => {
                Value::object(members.into_iter().map(|(k, v)| (k, Value::from(v))))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Cycle guard
// ---------------------------------------------------------------------------

thread_local! {
    /// Collections being rendered on this thread, outermost first.
    static VISITING: RefCell<Vec<*const ()>> = const { RefCell::new(Vec::new()) };
}

/// Marks one collection as being rendered until dropped.
struct Visit(*const ());

impl Visit {
    /// `None` when the collection is already being rendered further up the
    /// stack.
    fn enter<T>(storage: &Rc<T>) -> Option<Self> {
        let ptr = Rc::as_ptr(storage).cast::<()>();
        VISITING.with(|visiting| {
            let mut visiting = visiting.borrow_mut();
            if visiting.contains(&ptr) {
                return None;
            }
            visiting.push(ptr);
            Some(Self(ptr))
        })
    }
}

impl Drop for Visit {
    fn drop(&mut self) {
        let _ = VISITING.try_with(|visiting| {
            let mut visiting = visiting.borrow_mut();
            if let Some(at) = visiting.iter().rposition(|ptr| *ptr == self.0) {
                visiting.remove(at);
            }
        });
    }
}
