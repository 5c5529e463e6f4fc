//! The component runtime.
//!
//! [`Runtime`] owns the host document together with every piece of state
//! the components need: per-component records, the owner side-table, the
//! expression slots and the mount stack. It is a cheap, cloneable handle;
//! all clones share the same state. Everything runs on one thread, inside a
//! `tokio::task::LocalSet` whenever mounting is involved.
//!
//! No `RefCell` borrow is held while evaluating an expression or calling
//! into behaviour code, so hooks may call back into the runtime freely.

use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::cache::ExpressionCache;
use crate::component::{
    AttributeChange, ComponentId, ComponentRecord, ComponentSetup, MountState, PropsAttribute,
};
use crate::dom::{Document, NodeId, SlotContent};
use crate::error::RuntimeError;
use crate::eval::{evaluate_compiled, EvalError, PropertyHost};
use crate::fetch::{FragmentFetcher, StaticFetcher};
use crate::lens::{AccessPath, Lens};
use crate::options::RuntimeOptions;
use crate::script::{NullScriptHost, ScriptHost};
use crate::store::{merge, OverrideStore};
use crate::value::Value;

/// Attributes whose writes start a propagation pass.
const OBSERVED_ATTRIBUTES: [&str; 4] = ["props", "key", "props-data", "key-data"];

pub(crate) struct ExpressionSlot {
    /// Source text captured from the element before its first render.
    pub source: String,
    pub cache: ExpressionCache,
    pub renders: u32,
}

pub(crate) struct RuntimeInner {
    pub document: RefCell<Document>,
    pub components: RefCell<HashMap<ComponentId, ComponentRecord>>,
    pub owners: RefCell<HashMap<NodeId, ComponentId>>,
    pub expressions: RefCell<HashMap<NodeId, ExpressionSlot>>,
    pub evaluating: RefCell<Vec<(ComponentId, PropsAttribute)>>,
    pub mount_stack: RefCell<Vec<ComponentId>>,
    pub fetcher: Rc<dyn FragmentFetcher>,
    pub scripts: Rc<dyn ScriptHost>,
    pub options: RuntimeOptions,
}

#[derive(Clone)]
pub struct Runtime {
    pub(crate) inner: Rc<RuntimeInner>,
}

pub struct RuntimeBuilder {
    document: Document,
    fetcher: Rc<dyn FragmentFetcher>,
    scripts: Rc<dyn ScriptHost>,
    options: RuntimeOptions,
}

impl RuntimeBuilder {
    pub fn fetcher(mut self, fetcher: impl FragmentFetcher + 'static) -> Self {
        self.fetcher = Rc::new(fetcher);
        self
    }

    pub fn scripts(mut self, scripts: impl ScriptHost + 'static) -> Self {
        self.scripts = Rc::new(scripts);
        self
    }

    pub fn options(mut self, options: RuntimeOptions) -> Self {
        self.options = options;
        self
    }

    pub fn build(self) -> Runtime {
        Runtime {
            inner: Rc::new(RuntimeInner {
                document: RefCell::new(self.document),
                components: RefCell::new(HashMap::new()),
                owners: RefCell::new(HashMap::new()),
                expressions: RefCell::new(HashMap::new()),
                evaluating: RefCell::new(Vec::new()),
                mount_stack: RefCell::new(Vec::new()),
                fetcher: self.fetcher,
                scripts: self.scripts,
                options: self.options,
            }),
        }
    }
}

/// Marks an attribute of a component as under evaluation.
struct EvaluationGuard<'r> {
    runtime: &'r Runtime,
}

impl<'r> EvaluationGuard<'r> {
    fn enter(runtime: &'r Runtime, id: ComponentId, attribute: PropsAttribute) -> Self {
        runtime.inner.evaluating.borrow_mut().push((id, attribute));
        Self { runtime }
    }
}

impl Drop for EvaluationGuard<'_> {
    fn drop(&mut self) {
        self.runtime.inner.evaluating.borrow_mut().pop();
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// HANDLE & RECORDS
// ═══════════════════════════════════════════════════════════════════════════════

impl Runtime {
    pub fn builder(document: Document) -> RuntimeBuilder {
        RuntimeBuilder {
            document,
            fetcher: Rc::new(StaticFetcher::new()),
            scripts: Rc::new(NullScriptHost),
            options: RuntimeOptions::default(),
        }
    }

    pub fn new(document: Document) -> Runtime {
        Self::builder(document).build()
    }

    pub fn options(&self) -> &RuntimeOptions {
        &self.inner.options
    }

    /// Shared view of the document. Drop it before calling back into the
    /// runtime.
    pub fn document(&self) -> Ref<'_, Document> {
        self.inner.document.borrow()
    }

    /// Direct document access for host-side edits that must not be observed.
    pub fn document_mut(&self) -> RefMut<'_, Document> {
        self.inner.document.borrow_mut()
    }

    /// The registered component hosted by `element`.
    pub fn component(&self, element: NodeId) -> Option<ComponentId> {
        let id = ComponentId(element);
        self.inner
            .components
            .borrow()
            .contains_key(&id)
            .then_some(id)
    }

    pub fn state(&self, id: ComponentId) -> Option<MountState> {
        self.inner.components.borrow().get(&id).map(|r| r.state)
    }

    pub fn owner_of(&self, node: NodeId) -> Option<ComponentId> {
        self.inner.owners.borrow().get(&node).copied()
    }

    /// The component whose behaviour scripts are running right now.
    pub fn current_mount(&self) -> Option<ComponentId> {
        self.inner.mount_stack.borrow().last().copied()
    }

    /// Attach hooks and fields to a component, registering it if needed.
    pub fn setup(&self, id: ComponentId, setup: ComponentSetup) {
        self.inner
            .components
            .borrow_mut()
            .entry(id)
            .or_insert_with(ComponentRecord::new)
            .setup
            .absorb(setup);
    }

    pub(crate) fn with_record<R>(
        &self,
        id: ComponentId,
        f: impl FnOnce(&ComponentRecord) -> R,
    ) -> Result<R, RuntimeError> {
        let components = self.inner.components.borrow();
        let record = components
            .get(&id)
            .ok_or(RuntimeError::UnknownComponent(id.element()))?;
        Ok(f(record))
    }

    pub(crate) fn with_record_mut<R>(
        &self,
        id: ComponentId,
        f: impl FnOnce(&mut ComponentRecord) -> R,
    ) -> Result<R, RuntimeError> {
        let mut components = self.inner.components.borrow_mut();
        let record = components
            .get_mut(&id)
            .ok_or(RuntimeError::UnknownComponent(id.element()))?;
        Ok(f(record))
    }

    pub(crate) fn transition(&self, id: ComponentId, state: MountState) {
        if let Ok(previous) = self.with_record_mut(id, |r| std::mem::replace(&mut r.state, state)) {
            trace!(component = %id, from = ?previous, to = ?state, "state transition");
        }
    }

    /// Number of compilations of the given attribute so far.
    pub fn compilations(&self, id: ComponentId, attribute: PropsAttribute) -> Result<usize, RuntimeError> {
        self.with_record(id, |r| r.cache(attribute).compilations())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ATTRIBUTES
// ═══════════════════════════════════════════════════════════════════════════════

impl Runtime {
    /// Host attribute write. Observed attributes of registered components
    /// start a propagation pass, even when the text is unchanged.
    pub fn set_attribute(&self, node: NodeId, name: &str, value: &str) {
        let old = self.inner.document.borrow_mut().set_attribute(node, name, value);
        self.attribute_written(node, name, old, Some(value.to_string()));
    }

    pub fn remove_attribute(&self, node: NodeId, name: &str) {
        let old = self.inner.document.borrow_mut().remove_attribute(node, name);
        self.attribute_written(node, name, old, None);
    }

    fn attribute_written(&self, node: NodeId, name: &str, old: Option<String>, new: Option<String>) {
        let Some(id) = self.component(node) else {
            return;
        };
        let name = name.to_ascii_lowercase();
        if let Some(attribute) = PropsAttribute::from_name(&name) {
            if old != new {
                let _ = self.with_record_mut(id, |r| r.cache_mut(attribute).invalidate());
            }
        }
        if OBSERVED_ATTRIBUTES.contains(&name.as_str()) {
            self.attribute_changed(id, AttributeChange::new(&name, old, new));
        }
    }

    /// Trimmed attribute text, or the attribute's default when absent.
    pub(crate) fn attribute_text(&self, id: ComponentId, attribute: PropsAttribute) -> String {
        self.document()
            .attribute(id.element(), attribute.name())
            .map(|t| t.trim().to_string())
            .unwrap_or_else(|| attribute.default_text().to_string())
    }

    fn is_literal(&self, id: ComponentId) -> bool {
        self.document()
            .has_attribute(id.element(), &self.inner.options.literal_attribute)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PROPS & KEY
// ═══════════════════════════════════════════════════════════════════════════════

impl Runtime {
    /// Evaluate the attribute expression alone, without overrides.
    pub(crate) fn evaluate_raw(&self, id: ComponentId, attribute: PropsAttribute) -> Result<Value, RuntimeError> {
        let text = self.attribute_text(id, attribute);
        if self.is_literal(id) {
            return Ok(Value::String(text));
        }

        let parameter = self.inner.options.context_parameter.clone();
        let compiled = self.with_record_mut(id, |r| r.cache_mut(attribute).get_or_compile(&text, &parameter))?;
        let context = self
            .owner_of(id.element())
            .map(Value::Component)
            .unwrap_or(Value::Undefined);

        let _guard = EvaluationGuard::enter(self, id, attribute);
        Ok(evaluate_compiled(
            &compiled,
            &text,
            &context,
            self,
            self.inner.options.fallback,
        ))
    }

    /// Current props: the expression value merged with the override store.
    pub fn props_value(&self, id: ComponentId) -> Result<Value, RuntimeError> {
        let base = self.evaluate_raw(id, PropsAttribute::Props)?;
        if self.is_literal(id) {
            return Ok(base);
        }
        self.with_record(id, |r| r.props_overrides.overlay(base))
    }

    pub fn key_value(&self, id: ComponentId) -> Result<Value, RuntimeError> {
        let base = self.evaluate_raw(id, PropsAttribute::Key)?;
        if self.is_literal(id) {
            return Ok(base);
        }
        let (over, removed) = self.with_record(id, |r| (r.key_override.clone(), r.key_removed.clone()))?;
        let merged = match over {
            Some(over) => merge(&base, &over),
            None if removed.is_empty() => return Ok(base),
            None => base.deep_clone(),
        };
        removed.apply(&merged);
        Ok(merged)
    }

    pub(crate) fn attribute_value(&self, id: ComponentId, attribute: PropsAttribute) -> Result<Value, RuntimeError> {
        match attribute {
            PropsAttribute::Props => self.props_value(id),
            PropsAttribute::Key => self.key_value(id),
        }
    }

    /// Lens over the current props.
    pub fn props(&self, id: ComponentId) -> Result<Lens, RuntimeError> {
        let value = self.props_value(id)?;
        Lens::wrap(self, value, AccessPath::root(id, PropsAttribute::Props))
    }

    /// Lens over the current key.
    pub fn key(&self, id: ComponentId) -> Result<Lens, RuntimeError> {
        let value = self.key_value(id)?;
        Lens::wrap(self, value, AccessPath::root(id, PropsAttribute::Key))
    }

    pub fn props_overrides(&self, id: ComponentId) -> Result<OverrideStore, RuntimeError> {
        self.with_record(id, |r| r.props_overrides.clone())
    }

    pub fn key_override(&self, id: ComponentId) -> Result<Option<Value>, RuntimeError> {
        self.with_record(id, |r| r.key_override.clone())
    }

    /// Assign props.
    ///
    /// An object records each top-level entry that is already overridden or
    /// that differs from the raw expression value, then mirrors the store
    /// into `props-data`. Any other value rewrites the `props` text, or
    /// re-sets the existing text when it already evaluates to that value.
    pub fn set_props(&self, id: ComponentId, value: Value) -> Result<(), RuntimeError> {
        if value.has_cycle() {
            return Err(RuntimeError::CycleDetected {
                at: "props".to_string(),
            });
        }
        let object = match value {
            Value::Object(object) => object,
            other => return self.set_text_value(id, PropsAttribute::Props, other),
        };

        let base = self.evaluate_raw(id, PropsAttribute::Props)?;
        let serialized = self.with_record_mut(id, |record| {
            for (name, entry) in object.entries() {
                let from_expression = base.as_object().and_then(|b| b.get(&name));
                let matches_expression = from_expression.map_or(false, |e| e == entry);
                let overrides = &record.props_overrides;
                if overrides.contains(&name) || overrides.has_removals_under(&name) || !matches_expression {
                    record.props_overrides.set(name, entry.deep_clone());
                }
            }
            record.props_overrides.to_serialized_form()
        })?;
        debug!(component = %id, overrides = %serialized, "props assigned");
        self.set_attribute(id.element(), PropsAttribute::Props.data_name(), &serialized);
        Ok(())
    }

    /// Remember that `path` was removed below the given attribute's root.
    /// The setter call that follows mirrors and propagates the removal.
    pub(crate) fn record_removal(
        &self,
        id: ComponentId,
        attribute: PropsAttribute,
        path: Vec<String>,
    ) -> Result<(), RuntimeError> {
        trace!(component = %id, path = %path.join("."), "recording removal");
        self.with_record_mut(id, |record| match attribute {
            PropsAttribute::Props => record.props_overrides.remove_path(path),
            PropsAttribute::Key => record.key_removed.insert(path),
        })
    }

    /// Replace the props expression text.
    pub fn set_props_text(&self, id: ComponentId, text: &str) -> Result<(), RuntimeError> {
        self.with_record(id, |_| ())?;
        self.set_attribute(id.element(), PropsAttribute::Props.name(), text);
        Ok(())
    }

    /// Assign the key. Composites become the key override, mirrored into
    /// `key-data`; other values follow the props text rules.
    pub fn set_key(&self, id: ComponentId, value: Value) -> Result<(), RuntimeError> {
        if value.has_cycle() {
            return Err(RuntimeError::CycleDetected {
                at: "key".to_string(),
            });
        }
        if !value.is_composite() {
            return self.set_text_value(id, PropsAttribute::Key, value);
        }

        let base = self.evaluate_raw(id, PropsAttribute::Key)?;
        let serialized = self.with_record_mut(id, |record| {
            if record.key_override.is_some() || !record.key_removed.is_empty() || base != value {
                record.key_removed.clear_written(&[], &value);
                record.key_override = Some(value.deep_clone());
            }
            record
                .key_override
                .as_ref()
                .map(|v| v.to_json_lossy().to_string())
                .unwrap_or_else(|| "null".to_string())
        })?;
        debug!(component = %id, key = %serialized, "key assigned");
        self.set_attribute(id.element(), PropsAttribute::Key.data_name(), &serialized);
        Ok(())
    }

    pub fn set_key_text(&self, id: ComponentId, text: &str) -> Result<(), RuntimeError> {
        self.with_record(id, |_| ())?;
        self.set_attribute(id.element(), PropsAttribute::Key.name(), text);
        Ok(())
    }

    fn set_text_value(&self, id: ComponentId, attribute: PropsAttribute, value: Value) -> Result<(), RuntimeError> {
        let current = self.attribute_value(id, attribute)?;
        let text = if current == value {
            self.attribute_text(id, attribute)
        } else {
            value.to_source()?
        };
        self.set_attribute(id.element(), attribute.name(), &text);
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// EXPRESSION ELEMENTS
// ═══════════════════════════════════════════════════════════════════════════════

impl Runtime {
    /// Evaluate an expression element against its owner and replace its
    /// content with the result.
    pub fn render_expression(&self, node: NodeId) {
        let captured = self.inner.expressions.borrow().get(&node).map(|s| s.source.clone());
        let source = match captured {
            Some(source) => source,
            None => {
                let text = self.document().text_content(node);
                self.inner.expressions.borrow_mut().insert(
                    node,
                    ExpressionSlot {
                        source: text.clone(),
                        cache: ExpressionCache::new(),
                        renders: 0,
                    },
                );
                text
            }
        };

        let parameter = self.inner.options.context_parameter.clone();
        let compiled = match self.inner.expressions.borrow_mut().get_mut(&node) {
            Some(slot) => slot.cache.get_or_compile(source.trim(), &parameter),
            None => return,
        };
        let context = self
            .owner_of(node)
            .map(Value::Component)
            .unwrap_or(Value::Undefined);

        let value = evaluate_compiled(&compiled, &source, &context, self, self.inner.options.fallback);
        self.document_mut()
            .set_text_content(node, &value.to_display_string());
        if let Some(slot) = self.inner.expressions.borrow_mut().get_mut(&node) {
            slot.renders += 1;
        }
        trace!(node = %node, "rendered expression");
    }

    /// How many times an expression element has been rendered.
    pub fn expression_renders(&self, node: NodeId) -> u32 {
        self.inner
            .expressions
            .borrow()
            .get(&node)
            .map(|s| s.renders)
            .unwrap_or(0)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// HOST OPERATIONS
// ═══════════════════════════════════════════════════════════════════════════════

impl Runtime {
    /// Fill a slot in a component's light tree. New content is owned by the
    /// component.
    pub fn fill_slot(&self, id: ComponentId, name: &str, contents: Vec<SlotContent>) -> Result<(), RuntimeError> {
        self.with_record(id, |_| ())?;
        self.document_mut().fill_slot(id.element(), name, contents);
        self.tag_light_tree(id);
        Ok(())
    }

    /// Remove a node from the document and release the owner links, slots
    /// and settled component records below it.
    pub fn remove(&self, node: NodeId) {
        self.document_mut().remove(node);
        let doc = self.document();
        self.inner.owners.borrow_mut().retain(|n, _| doc.is_connected(*n));
        self.inner
            .expressions
            .borrow_mut()
            .retain(|n, _| doc.is_connected(*n));
        self.inner
            .components
            .borrow_mut()
            .retain(|id, r| doc.is_connected(id.element()) || r.state.is_in_flight());
    }
}

impl PropertyHost for Runtime {
    fn component_property(&self, component: ComponentId, name: &str) -> Result<Value, EvalError> {
        if let Some(attribute) = PropsAttribute::from_name(name) {
            if self.inner.evaluating.borrow().contains(&(component, attribute)) {
                return Err(EvalError::Reentrant {
                    component,
                    attribute: name.to_string(),
                });
            }
            return self
                .attribute_value(component, attribute)
                .map_err(|e| EvalError::Type {
                    message: e.to_string(),
                });
        }
        match name {
            "ready" => Ok(Value::Bool(
                self.state(component).map_or(false, MountState::is_ready),
            )),
            "tagName" => Ok(self
                .document()
                .tag(component.element())
                .map(|t| Value::String(t.to_ascii_uppercase()))
                .unwrap_or(Value::Undefined)),
            _ => Ok(self
                .with_record(component, |r| r.setup.fields.get(name).cloned())
                .ok()
                .flatten()
                .unwrap_or(Value::Undefined)),
        }
    }
}
