//! Dynamic values produced by expression evaluation.
//!
//! Composite values are shared, mutable references so that a lens can
//! mutate a nested container in place and replay the change upwards. Object
//! keys are kept in a `BTreeMap`, which makes serialisation canonical.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::component::ComponentId;
use crate::error::RuntimeError;

#[derive(Clone)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Array),
    Object(Object),
    /// Reference to a live component, as bound to the context parameter.
    Component(ComponentId),
}

#[derive(Clone, Default)]
pub struct Object(Rc<RefCell<BTreeMap<String, Value>>>);

#[derive(Clone, Default)]
pub struct Array(Rc<RefCell<Vec<Value>>>);

impl Object {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries<I: IntoIterator<Item = (String, Value)>>(entries: I) -> Self {
        Object(Rc::new(RefCell::new(entries.into_iter().collect())))
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.0.borrow().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.borrow().contains_key(name)
    }

    pub fn set(&self, name: impl Into<String>, value: Value) {
        self.0.borrow_mut().insert(name.into(), value);
    }

    pub fn remove(&self, name: &str) -> Option<Value> {
        self.0.borrow_mut().remove(name)
    }

    pub fn keys(&self) -> Vec<String> {
        self.0.borrow().keys().cloned().collect()
    }

    /// Snapshot of the entries. Values are shared, not copied.
    pub fn entries(&self) -> Vec<(String, Value)> {
        self.0
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    pub fn ptr_eq(&self, other: &Object) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn identity(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }
}

impl Array {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_items<I: IntoIterator<Item = Value>>(items: I) -> Self {
        Array(Rc::new(RefCell::new(items.into_iter().collect())))
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.0.borrow().get(index).cloned()
    }

    /// Assign at `index`, appending when `index == len()`. Returns `false`
    /// and leaves the array untouched for any index past the end.
    pub fn set(&self, index: usize, value: Value) -> bool {
        let mut items = self.0.borrow_mut();
        match index.cmp(&items.len()) {
            std::cmp::Ordering::Less => items[index] = value,
            std::cmp::Ordering::Equal => items.push(value),
            std::cmp::Ordering::Greater => return false,
        }
        true
    }

    pub fn push(&self, value: Value) {
        self.0.borrow_mut().push(value);
    }

    pub fn items(&self) -> Vec<Value> {
        self.0.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    pub fn ptr_eq(&self, other: &Array) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn identity(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// STRUCTURE
// ═══════════════════════════════════════════════════════════════════════════════

impl Value {
    pub fn object<I: IntoIterator<Item = (K, Value)>, K: Into<String>>(entries: I) -> Value {
        Value::Object(Object::from_entries(
            entries.into_iter().map(|(k, v)| (k.into(), v)),
        ))
    }

    pub fn array<I: IntoIterator<Item = Value>>(items: I) -> Value {
        Value::Array(Array::from_items(items))
    }

    pub fn is_composite(&self) -> bool {
        matches!(self, Value::Object(_) | Value::Array(_))
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Reference identity of a composite value.
    pub(crate) fn identity(&self) -> Option<usize> {
        match self {
            Value::Object(object) => Some(object.identity()),
            Value::Array(array) => Some(array.identity()),
            _ => None,
        }
    }

    fn children(&self) -> Vec<Value> {
        match self {
            Value::Object(object) => object.entries().into_iter().map(|(_, v)| v).collect(),
            Value::Array(array) => array.items(),
            _ => Vec::new(),
        }
    }

    /// True when the value reaches itself through its own containers.
    pub fn has_cycle(&self) -> bool {
        cycle_from(self, &mut Vec::new())
    }

    /// Structural copy with fresh containers. A container that is reached
    /// again while it is still being copied is shared instead of copied.
    pub fn deep_clone(&self) -> Value {
        clone_from(self, &mut Vec::new())
    }

    /// Read a property the way a lens sees it: object keys, array indices
    /// and `length`. Everything else reads as `undefined`.
    pub fn property(&self, name: &str) -> Value {
        match self {
            Value::Object(object) => object.get(name).unwrap_or(Value::Undefined),
            Value::Array(array) => {
                if name == "length" {
                    Value::Number(array.len() as f64)
                } else {
                    parse_index(name)
                        .and_then(|i| array.get(i))
                        .unwrap_or(Value::Undefined)
                }
            }
            _ => Value::Undefined,
        }
    }
}

pub(crate) fn parse_index(name: &str) -> Option<usize> {
    if name.is_empty() || (name.len() > 1 && name.starts_with('0')) {
        return None;
    }
    name.parse::<usize>().ok()
}

fn cycle_from(value: &Value, stack: &mut Vec<usize>) -> bool {
    let Some(id) = value.identity() else {
        return false;
    };
    if stack.contains(&id) {
        return true;
    }
    stack.push(id);
    let found = value.children().iter().any(|child| cycle_from(child, stack));
    stack.pop();
    found
}

fn clone_from(value: &Value, stack: &mut Vec<usize>) -> Value {
    let Some(id) = value.identity() else {
        return value.clone();
    };
    if stack.contains(&id) {
        return value.clone();
    }
    stack.push(id);
    let copy = match value {
        Value::Object(object) => Value::Object(Object::from_entries(
            object
                .entries()
                .into_iter()
                .map(|(k, v)| (k, clone_from(&v, stack))),
        )),
        Value::Array(array) => Value::Array(Array::from_items(
            array.items().iter().map(|v| clone_from(v, stack)),
        )),
        other => other.clone(),
    };
    stack.pop();
    copy
}

/// Structural equality. Composites compare by content; pairs already under
/// comparison are assumed equal so cyclic values terminate.
impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        deep_eq(self, other, &mut Vec::new())
    }
}

fn deep_eq(a: &Value, b: &Value, seen: &mut Vec<(usize, usize)>) -> bool {
    match (a, b) {
        (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => x == y,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Component(x), Value::Component(y)) => x == y,
        (Value::Array(x), Value::Array(y)) => {
            if x.ptr_eq(y) {
                return true;
            }
            let pair = (x.identity(), y.identity());
            if seen.contains(&pair) {
                return true;
            }
            let (left, right) = (x.items(), y.items());
            if left.len() != right.len() {
                return false;
            }
            seen.push(pair);
            let equal = left.iter().zip(right.iter()).all(|(l, r)| deep_eq(l, r, seen));
            seen.pop();
            equal
        }
        (Value::Object(x), Value::Object(y)) => {
            if x.ptr_eq(y) {
                return true;
            }
            let pair = (x.identity(), y.identity());
            if seen.contains(&pair) {
                return true;
            }
            let (left, right) = (x.entries(), y.entries());
            if left.len() != right.len() {
                return false;
            }
            seen.push(pair);
            let equal = left
                .iter()
                .zip(right.iter())
                .all(|((lk, lv), (rk, rv))| lk == rk && deep_eq(lv, rv, seen));
            seen.pop();
            equal
        }
        _ => false,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONVERSIONS
// ═══════════════════════════════════════════════════════════════════════════════

impl Value {
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Array(_) | Value::Object(_) | Value::Component(_) => true,
        }
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Null | Value::Array(_) | Value::Object(_) | Value::Component(_) => "object",
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Number(n) => *n,
            Value::String(s) => string_to_number(s),
            Value::Array(_) => string_to_number(&self.to_js_string()),
            Value::Object(_) | Value::Component(_) => f64::NAN,
        }
    }

    /// String conversion as the expression language performs it.
    pub fn to_js_string(&self) -> String {
        join_string(self, &mut Vec::new())
    }

    /// Text written into an expression element: nullish renders empty,
    /// composites render as JSON.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Undefined | Value::Null => String::new(),
            Value::String(s) => s.clone(),
            Value::Array(_) | Value::Object(_) => self.to_json_lossy().to_string(),
            other => other.to_js_string(),
        }
    }

    /// JSON form. Object entries holding `undefined` are skipped, array
    /// holes become `null`, components serialise as empty objects.
    pub fn to_json(&self) -> Result<serde_json::Value, RuntimeError> {
        json_from(self, &mut Vec::new(), false)
    }

    /// Like [`Value::to_json`] but a cyclic reference becomes `null`.
    pub fn to_json_lossy(&self) -> serde_json::Value {
        json_from(self, &mut Vec::new(), true).unwrap_or(serde_json::Value::Null)
    }

    /// Source text that evaluates back to an equal value.
    pub fn to_source(&self) -> Result<String, RuntimeError> {
        let mut out = String::new();
        write_source(self, &mut out, &mut Vec::new())?;
        Ok(out)
    }
}

fn string_to_number(s: &str) -> f64 {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    match trimmed {
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        _ => {
            if let Some(hex) = trimmed
                .strip_prefix("0x")
                .or_else(|| trimmed.strip_prefix("0X"))
            {
                return u64::from_str_radix(hex, 16)
                    .map(|n| n as f64)
                    .unwrap_or(f64::NAN);
            }
            if trimmed.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') {
                return f64::NAN;
            }
            trimmed.parse::<f64>().unwrap_or(f64::NAN)
        }
    }
}

pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 {
            "Infinity".to_string()
        } else {
            "-Infinity".to_string()
        }
    } else if n == 0.0 {
        "0".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{:.0}", n)
    } else {
        n.to_string()
    }
}

fn join_string(value: &Value, stack: &mut Vec<usize>) -> String {
    match value {
        Value::Undefined => "undefined".to_string(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => format_number(*n),
        Value::String(s) => s.clone(),
        Value::Object(_) => "[object Object]".to_string(),
        Value::Component(_) => "[object HTMLElement]".to_string(),
        Value::Array(array) => {
            let id = array.identity();
            if stack.contains(&id) {
                return String::new();
            }
            stack.push(id);
            let parts: Vec<String> = array
                .items()
                .iter()
                .map(|item| match item {
                    Value::Undefined | Value::Null => String::new(),
                    other => join_string(other, stack),
                })
                .collect();
            stack.pop();
            parts.join(",")
        }
    }
}

fn number_to_json(n: f64) -> serde_json::Value {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 9.0e15 {
        serde_json::Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)
    }
}

fn json_from(
    value: &Value,
    stack: &mut Vec<usize>,
    lossy: bool,
) -> Result<serde_json::Value, RuntimeError> {
    if let Some(id) = value.identity() {
        if stack.contains(&id) {
            if lossy {
                return Ok(serde_json::Value::Null);
            }
            return Err(RuntimeError::CycleDetected {
                at: "value".to_string(),
            });
        }
        stack.push(id);
    }
    let json = match value {
        Value::Undefined | Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Number(n) => number_to_json(*n),
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Component(_) => serde_json::Value::Object(serde_json::Map::new()),
        Value::Array(array) => {
            let mut items = Vec::with_capacity(array.len());
            for item in array.items() {
                items.push(json_from(&item, stack, lossy)?);
            }
            serde_json::Value::Array(items)
        }
        Value::Object(object) => {
            let mut map = serde_json::Map::new();
            for (key, entry) in object.entries() {
                if matches!(entry, Value::Undefined) {
                    continue;
                }
                map.insert(key, json_from(&entry, stack, lossy)?);
            }
            serde_json::Value::Object(map)
        }
    };
    if value.identity().is_some() {
        stack.pop();
    }
    Ok(json)
}

fn quote(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

fn write_source(value: &Value, out: &mut String, stack: &mut Vec<usize>) -> Result<(), RuntimeError> {
    if let Some(id) = value.identity() {
        if stack.contains(&id) {
            return Err(RuntimeError::CycleDetected {
                at: "value".to_string(),
            });
        }
        stack.push(id);
    }
    match value {
        Value::Undefined | Value::Component(_) => out.push_str("undefined"),
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => {
            if *n < 0.0 || (*n == 0.0 && n.is_sign_negative()) {
                out.push('(');
                out.push_str(&format_number(*n));
                out.push(')');
            } else {
                out.push_str(&format_number(*n));
            }
        }
        Value::String(s) => out.push_str(&quote(s)),
        Value::Array(array) => {
            out.push('[');
            for (i, item) in array.items().iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_source(item, out, stack)?;
            }
            out.push(']');
        }
        Value::Object(object) => {
            out.push('{');
            for (i, (key, entry)) in object.entries().iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                out.push_str(&quote(key));
                out.push_str(": ");
                write_source(entry, out, stack)?;
            }
            out.push('}');
        }
    }
    if value.identity().is_some() {
        stack.pop();
    }
    Ok(())
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(Array::from_items(items.into_iter().map(Value::from)))
            }
            serde_json::Value::Object(map) => Value::Object(Object::from_entries(
                map.into_iter().map(|(k, v)| (k, Value::from(v))),
            )),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DEBUG
// ═══════════════════════════════════════════════════════════════════════════════

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        debug_value(self, f, &mut Vec::new())
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        debug_value(&Value::Object(self.clone()), f, &mut Vec::new())
    }
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        debug_value(&Value::Array(self.clone()), f, &mut Vec::new())
    }
}

fn debug_value(value: &Value, f: &mut fmt::Formatter<'_>, stack: &mut Vec<usize>) -> fmt::Result {
    if let Some(id) = value.identity() {
        if stack.contains(&id) {
            return write!(f, "[Circular]");
        }
        stack.push(id);
    }
    match value {
        Value::Undefined => write!(f, "undefined")?,
        Value::Null => write!(f, "null")?,
        Value::Bool(b) => write!(f, "{}", b)?,
        Value::Number(n) => write!(f, "{}", format_number(*n))?,
        Value::String(s) => write!(f, "{:?}", s)?,
        Value::Component(id) => write!(f, "<component {}>", id)?,
        Value::Array(array) => {
            write!(f, "[")?;
            for (i, item) in array.items().iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                debug_value(item, f, stack)?;
            }
            write!(f, "]")?;
        }
        Value::Object(object) => {
            write!(f, "{{")?;
            for (i, (key, entry)) in object.entries().iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}: ", key)?;
                debug_value(entry, f, stack)?;
            }
            write!(f, "}}")?;
        }
    }
    if value.identity().is_some() {
        stack.pop();
    }
    Ok(())
}
