//! Mutation-Tracking Lens
//!
//! A [`Lens`] views one composite value reached from a component's `props`
//! or `key`, together with the access path from the component to it.
//! Writing through a lens mutates the viewed container in place, then walks
//! the path back up, re-assigning each container into its parent. The last
//! step assigns the root value to the component through the same setter an
//! external write uses, so the override store, the `props-data` mirror and
//! propagation behave identically either way.
//!
//! ## Key Invariants
//!
//! 1. Wrapping a value that contains a cycle fails with
//!    [`RuntimeError::CycleDetected`]; so does descending into a container
//!    already on the path, or past the configured depth.
//! 2. Scalars are handed out as plain values, never as lenses.
//! 3. The path of a lens always starts at a component.
//! 4. Array writes land on an existing element or append one; any index
//!    further out is an [`RuntimeError::InvalidIndex`].

use tracing::trace;

use crate::component::{ComponentId, PropsAttribute};
use crate::error::RuntimeError;
use crate::runtime::Runtime;
use crate::value::{parse_index, Array, Object, Value};

#[derive(Debug, Clone)]
pub enum Container {
    Component(ComponentId),
    Object(Object),
    Array(Array),
}

impl Container {
    fn identity(&self) -> Option<usize> {
        match self {
            Container::Component(_) => None,
            Container::Object(object) => Some(object.identity()),
            Container::Array(array) => Some(array.identity()),
        }
    }
}

/// One edge of an access path: `name` read from `container`.
#[derive(Debug, Clone)]
pub struct PathStep {
    pub container: Container,
    pub name: String,
}

#[derive(Debug, Clone, Default)]
pub struct AccessPath {
    steps: Vec<PathStep>,
}

impl AccessPath {
    pub fn root(component: ComponentId, attribute: PropsAttribute) -> Self {
        Self {
            steps: vec![PathStep {
                container: Container::Component(component),
                name: attribute.name().to_string(),
            }],
        }
    }

    pub fn extend(&self, container: Container, name: &str) -> Self {
        let mut steps = self.steps.clone();
        steps.push(PathStep {
            container,
            name: name.to_string(),
        });
        Self { steps }
    }

    pub fn steps(&self) -> &[PathStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn component(&self) -> Option<ComponentId> {
        match self.steps.first().map(|s| &s.container) {
            Some(Container::Component(id)) => Some(*id),
            _ => None,
        }
    }

    fn contains(&self, identity: usize) -> bool {
        self.steps
            .iter()
            .any(|s| s.container.identity() == Some(identity))
    }

    /// Dotted form such as `props.a.b`.
    pub fn display(&self) -> String {
        self.steps
            .iter()
            .map(|s| s.name.as_str())
            .collect::<Vec<_>>()
            .join(".")
    }
}

/// Result of reading through a lens.
#[derive(Debug, Clone)]
pub enum Entry {
    Nested(Lens),
    Scalar(Value),
}

impl Entry {
    pub fn value(&self) -> Value {
        match self {
            Entry::Nested(lens) => lens.value().clone(),
            Entry::Scalar(value) => value.clone(),
        }
    }

    pub fn into_lens(self) -> Option<Lens> {
        match self {
            Entry::Nested(lens) => Some(lens),
            Entry::Scalar(_) => None,
        }
    }
}

#[derive(Clone)]
pub struct Lens {
    runtime: Runtime,
    path: AccessPath,
    value: Value,
}

impl std::fmt::Debug for Lens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lens")
            .field("path", &self.path.display())
            .field("value", &self.value)
            .finish()
    }
}

impl Lens {
    pub fn wrap(runtime: &Runtime, value: Value, path: AccessPath) -> Result<Lens, RuntimeError> {
        if path.component().is_none() {
            return Err(RuntimeError::DetachedPath);
        }
        if value.has_cycle() {
            return Err(RuntimeError::CycleDetected { at: path.display() });
        }
        if path.len() > runtime.options().max_path_depth {
            return Err(RuntimeError::CycleDetected { at: path.display() });
        }
        Ok(Lens {
            runtime: runtime.clone(),
            path,
            value,
        })
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    pub fn path(&self) -> &AccessPath {
        &self.path
    }

    fn container(&self) -> Option<Container> {
        match &self.value {
            Value::Object(object) => Some(Container::Object(object.clone())),
            Value::Array(array) => Some(Container::Array(array.clone())),
            _ => None,
        }
    }

    pub fn get(&self, name: &str) -> Result<Entry, RuntimeError> {
        let child = self.value.property(name);
        let (Some(identity), Some(container)) = (child.identity(), self.container()) else {
            return Ok(Entry::Scalar(child));
        };
        let path = self.path.extend(container, name);
        if self.path.contains(identity) || self.value.identity() == Some(identity) {
            return Err(RuntimeError::CycleDetected { at: path.display() });
        }
        if path.len() > self.runtime.options().max_path_depth {
            return Err(RuntimeError::CycleDetected { at: path.display() });
        }
        Ok(Entry::Nested(Lens {
            runtime: self.runtime.clone(),
            path,
            value: child,
        }))
    }

    /// Follow several property names at once.
    pub fn resolve(&self, names: &[&str]) -> Result<Entry, RuntimeError> {
        let mut current = Entry::Nested(self.clone());
        for name in names {
            current = match current {
                Entry::Nested(lens) => lens.get(name)?,
                Entry::Scalar(_) => Entry::Scalar(Value::Undefined),
            };
        }
        Ok(current)
    }

    /// Assign `value` to `name` on the viewed container and commit.
    pub fn set(&self, name: &str, value: Value) -> Result<(), RuntimeError> {
        self.write(name, Some(value))
    }

    /// Remove `name` from the viewed object and commit. On an array the
    /// element becomes `undefined`.
    pub fn remove(&self, name: &str) -> Result<(), RuntimeError> {
        self.write(name, None)
    }

    fn write(&self, name: &str, value: Option<Value>) -> Result<(), RuntimeError> {
        let at = self.path.display();
        let removed = match (&self.value, value) {
            (Value::Object(object), Some(value)) => {
                object.set(name, value);
                None
            }
            (Value::Object(object), None) => {
                object.remove(name);
                self.removal_path(name)
            }
            (Value::Array(array), value) => {
                let written = parse_index(name)
                    .map_or(false, |i| array.set(i, value.unwrap_or(Value::Undefined)));
                if !written {
                    return Err(RuntimeError::InvalidIndex {
                        at,
                        name: name.to_string(),
                    });
                }
                None
            }
            _ => {
                return Err(RuntimeError::NotComposite {
                    at,
                    name: name.to_string(),
                })
            }
        };
        trace!(path = %at, name, "lens write");
        self.commit(removed)
    }

    /// Names from the attribute root down to `name`, when every container
    /// on the way is an object. Removals inside arrays need no record since
    /// arrays are always stored whole.
    fn removal_path(&self, name: &str) -> Option<Vec<String>> {
        let mut path = Vec::with_capacity(self.path.len());
        for step in self.path.steps().iter().skip(1) {
            if !matches!(step.container, Container::Object(_)) {
                return None;
            }
            path.push(step.name.clone());
        }
        path.push(name.to_string());
        Some(path)
    }

    /// Replay the path from this lens back to the component.
    fn commit(&self, removed: Option<Vec<String>>) -> Result<(), RuntimeError> {
        let mut child = self.value.clone();
        for step in self.path.steps().iter().rev() {
            match &step.container {
                Container::Object(parent) => {
                    parent.set(step.name.clone(), child);
                    child = Value::Object(parent.clone());
                }
                Container::Array(parent) => {
                    if !parse_index(&step.name).map_or(false, |i| parent.set(i, child)) {
                        return Err(RuntimeError::InvalidIndex {
                            at: self.path.display(),
                            name: step.name.clone(),
                        });
                    }
                    child = Value::Array(parent.clone());
                }
                Container::Component(id) => {
                    let attribute = PropsAttribute::from_name(&step.name)
                        .ok_or_else(|| RuntimeError::UnknownAttribute(step.name.clone()))?;
                    if let Some(path) = removed {
                        self.runtime.record_removal(*id, attribute, path)?;
                    }
                    return match attribute {
                        PropsAttribute::Props => self.runtime.set_props(*id, child),
                        PropsAttribute::Key => self.runtime.set_key(*id, child),
                    };
                }
            }
        }
        Err(RuntimeError::DetachedPath)
    }
}
