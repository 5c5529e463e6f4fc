//! Component records and lifecycle types.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::cache::ExpressionCache;
use crate::dom::NodeId;
use crate::error::{MountError, RuntimeError};
use crate::lens::Lens;
use crate::runtime::Runtime;
use crate::store::{OverrideStore, Tombstones};
use crate::value::Value;

/// A component is identified by its host element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(pub(crate) NodeId);

impl ComponentId {
    pub fn element(self) -> NodeId {
        self.0
    }
}

impl From<NodeId> for ComponentId {
    fn from(node: NodeId) -> Self {
        ComponentId(node)
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Mount lifecycle.
///
/// ```text
/// Unmounted -> FetchingFragment -> PopulatingScope -> Activating -> Ready
/// Unmounted -> Activating            (no fragment locator)
/// FetchingFragment -> Failed         (fetch error or removal)
/// Ready <-> Propagating
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountState {
    Unmounted,
    FetchingFragment,
    PopulatingScope,
    Activating,
    Ready,
    Propagating,
    Failed,
}

impl MountState {
    /// Between connection and readiness.
    pub fn is_in_flight(self) -> bool {
        matches!(
            self,
            MountState::FetchingFragment | MountState::PopulatingScope | MountState::Activating
        )
    }

    pub fn is_ready(self) -> bool {
        matches!(self, MountState::Ready | MountState::Propagating)
    }
}

/// The observed attribute write that triggered a propagation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeChange {
    pub name: String,
    pub old: Option<String>,
    pub new: Option<String>,
}

impl AttributeChange {
    pub fn new(name: &str, old: Option<String>, new: Option<String>) -> Self {
        Self {
            name: name.to_string(),
            old,
            new,
        }
    }
}

pub type ConnectHook = Rc<dyn Fn(&Runtime, ComponentId)>;
pub type MountHook = Rc<dyn Fn(&MountContext, Result<(), &MountError>)>;
pub type ChangeHook = Rc<dyn Fn(&Runtime, ComponentId, &AttributeChange)>;
pub type ReactHook = Rc<dyn Fn(&Runtime, ComponentId, &Value, &Value)>;

/// Hooks and fields a behaviour script attaches to its component.
#[derive(Clone, Default)]
pub struct ComponentSetup {
    /// Called synchronously on every connect, before any fetch.
    pub on_connect: Option<ConnectHook>,
    pub on_mount: Option<MountHook>,
    pub on_attribute_changed: Option<ChangeHook>,
    pub on_react: Option<ReactHook>,
    /// Readable from expressions as properties of the component.
    pub fields: BTreeMap<String, Value>,
}

impl ComponentSetup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_connect<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Runtime, ComponentId) + 'static,
    {
        self.on_connect = Some(Rc::new(hook));
        self
    }

    pub fn on_mount<F>(mut self, hook: F) -> Self
    where
        F: Fn(&MountContext, Result<(), &MountError>) + 'static,
    {
        self.on_mount = Some(Rc::new(hook));
        self
    }

    pub fn on_attribute_changed<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Runtime, ComponentId, &AttributeChange) + 'static,
    {
        self.on_attribute_changed = Some(Rc::new(hook));
        self
    }

    pub fn on_react<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Runtime, ComponentId, &Value, &Value) + 'static,
    {
        self.on_react = Some(Rc::new(hook));
        self
    }

    pub fn field(mut self, name: &str, value: Value) -> Self {
        self.fields.insert(name.to_string(), value);
        self
    }

    /// Later hooks replace earlier ones; fields accumulate.
    pub(crate) fn absorb(&mut self, other: ComponentSetup) {
        if other.on_connect.is_some() {
            self.on_connect = other.on_connect;
        }
        if other.on_mount.is_some() {
            self.on_mount = other.on_mount;
        }
        if other.on_attribute_changed.is_some() {
            self.on_attribute_changed = other.on_attribute_changed;
        }
        if other.on_react.is_some() {
            self.on_react = other.on_react;
        }
        self.fields.extend(other.fields);
    }
}

impl fmt::Debug for ComponentSetup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentSetup")
            .field("on_connect", &self.on_connect.is_some())
            .field("on_mount", &self.on_mount.is_some())
            .field("on_attribute_changed", &self.on_attribute_changed.is_some())
            .field("on_react", &self.on_react.is_some())
            .field("fields", &self.fields)
            .finish()
    }
}

/// What a behaviour script sees while its component activates.
pub struct MountContext {
    runtime: Runtime,
    component: ComponentId,
    previous: Option<ComponentId>,
}

impl MountContext {
    pub(crate) fn new(runtime: Runtime, component: ComponentId, previous: Option<ComponentId>) -> Self {
        Self {
            runtime,
            component,
            previous,
        }
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn component(&self) -> ComponentId {
        self.component
    }

    /// The component that was mounting when this one started, if any.
    pub fn previous(&self) -> Option<ComponentId> {
        self.previous
    }

    pub fn setup(&self, setup: ComponentSetup) {
        self.runtime.setup(self.component, setup);
    }

    pub fn props(&self) -> Result<Lens, RuntimeError> {
        self.runtime.props(self.component)
    }
}

/// The two props-like attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropsAttribute {
    Props,
    Key,
}

impl PropsAttribute {
    pub fn name(self) -> &'static str {
        match self {
            PropsAttribute::Props => "props",
            PropsAttribute::Key => "key",
        }
    }

    /// Attribute mirroring the override store.
    pub fn data_name(self) -> &'static str {
        match self {
            PropsAttribute::Props => "props-data",
            PropsAttribute::Key => "key-data",
        }
    }

    /// Text used when the attribute is absent.
    pub fn default_text(self) -> &'static str {
        match self {
            PropsAttribute::Props => "{}",
            PropsAttribute::Key => "null",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "props" => Some(PropsAttribute::Props),
            "key" => Some(PropsAttribute::Key),
            _ => None,
        }
    }
}

pub(crate) struct ComponentRecord {
    pub state: MountState,
    pub props_cache: ExpressionCache,
    pub key_cache: ExpressionCache,
    pub props_overrides: OverrideStore,
    pub key_override: Option<Value>,
    pub key_removed: Tombstones,
    pub setup: ComponentSetup,
    /// Last change observed before the component became ready.
    pub pending_change: Option<AttributeChange>,
    /// Change observed while a pass was running on this component.
    pub rerun: Option<AttributeChange>,
}

impl ComponentRecord {
    pub fn new() -> Self {
        Self {
            state: MountState::Unmounted,
            props_cache: ExpressionCache::new(),
            key_cache: ExpressionCache::new(),
            props_overrides: OverrideStore::new(),
            key_override: None,
            key_removed: Tombstones::new(),
            setup: ComponentSetup::default(),
            pending_change: None,
            rerun: None,
        }
    }

    pub fn cache_mut(&mut self, attribute: PropsAttribute) -> &mut ExpressionCache {
        match attribute {
            PropsAttribute::Props => &mut self.props_cache,
            PropsAttribute::Key => &mut self.key_cache,
        }
    }

    pub fn cache(&self, attribute: PropsAttribute) -> &ExpressionCache {
        match attribute {
            PropsAttribute::Props => &self.props_cache,
            PropsAttribute::Key => &self.key_cache,
        }
    }
}
