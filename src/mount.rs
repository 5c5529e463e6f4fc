//! Component Lifecycle Controller
//!
//! Mounting is asynchronous only while a fragment is fetched. Once the
//! markup is in hand, population, activation, owner tagging and the first
//! propagation pass run to completion without yielding.
//!
//! ## Key Invariants
//!
//! 1. Behaviour scripts of a component run exactly once per mount, and
//!    [`Runtime::current_mount`] names that component while they run.
//! 2. No expression inside an isolated scope is evaluated before the scope
//!    is populated, activated and owner-tagged.
//! 3. An attribute change observed before readiness is queued; the latest
//!    one drives the first pass.

use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, trace, warn};

use crate::component::{AttributeChange, ComponentId, ComponentRecord, MountContext, MountState, PropsAttribute};
use crate::dom::NodeId;
use crate::error::{MountError, RuntimeError};
use crate::runtime::Runtime;
use crate::visitor::{walk_children, OwnedNodes, OwnedTreeVisitor, Tree};

/// Pushes a component onto the mount stack and pops it when dropped.
pub(crate) struct MountGuard {
    runtime: Runtime,
    pub previous: Option<ComponentId>,
}

impl MountGuard {
    pub(crate) fn enter(runtime: &Runtime, id: ComponentId) -> Self {
        let previous = runtime.current_mount();
        runtime.inner.mount_stack.borrow_mut().push(id);
        Self {
            runtime: runtime.clone(),
            previous,
        }
    }
}

impl Drop for MountGuard {
    fn drop(&mut self) {
        self.runtime.inner.mount_stack.borrow_mut().pop();
    }
}

impl Runtime {
    /// Connect every component element at or below `root` and schedule the
    /// first run of every expression element. Must be called from within a
    /// `tokio::task::LocalSet`.
    pub fn upgrade(&self, root: NodeId) -> Vec<JoinHandle<Result<(), MountError>>> {
        let (components, expressions) = {
            let doc = self.document();
            let options = self.options();
            let mut nodes = vec![root];
            nodes.extend(doc.descendants(root, true));
            let of_tag = |tag: &str| -> Vec<NodeId> {
                nodes
                    .iter()
                    .copied()
                    .filter(|n| doc.tag(*n) == Some(tag))
                    .collect()
            };
            (of_tag(&options.component_tag), of_tag(&options.expression_tag))
        };
        for expression in expressions {
            self.schedule_first_run(expression);
        }
        components.into_iter().map(|c| self.connect(c)).collect()
    }

    /// Start mounting the component hosted by `element`. Connecting an
    /// element whose mount is in flight or complete starts nothing new, but
    /// the connect hook runs on every call. Must be called from within a
    /// `tokio::task::LocalSet`.
    pub fn connect(&self, element: NodeId) -> JoinHandle<Result<(), MountError>> {
        let id = ComponentId(element);
        let locator = self.fragment_locator(element);
        let first_state = if locator.is_some() {
            MountState::FetchingFragment
        } else {
            MountState::Activating
        };
        let fresh = {
            let mut components = self.inner.components.borrow_mut();
            let record = components.entry(id).or_insert_with(ComponentRecord::new);
            match record.state {
                MountState::Unmounted | MountState::Failed => {
                    record.state = first_state;
                    true
                }
                _ => false,
            }
        };
        if fresh {
            self.tag_light_tree(id);
        }
        let on_connect = self
            .with_record(id, |r| r.setup.on_connect.clone())
            .ok()
            .flatten();
        if let Some(hook) = on_connect {
            hook(self, id);
        }

        let runtime = self.clone();
        tokio::task::spawn_local(async move {
            if !fresh {
                trace!(component = %id, "already connected");
                return Ok(());
            }
            runtime.mount(id, locator).await
        })
    }

    fn fragment_locator(&self, element: NodeId) -> Option<String> {
        let doc = self.document();
        let locator = self
            .options()
            .source_attributes
            .iter()
            .find_map(|name| doc.attribute(element, name))
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string);
        locator
    }

    #[instrument(skip(self, locator), fields(component = %id))]
    async fn mount(&self, id: ComponentId, locator: Option<String>) -> Result<(), MountError> {
        let result = self.mount_sequence(id, locator).await;
        if let Err(error) = &result {
            warn!(error = %error, "mount failed");
            self.transition(id, MountState::Failed);
            self.call_mount_hook(id, Err(error));
            if matches!(error, MountError::Detached(_)) {
                self.inner.components.borrow_mut().remove(&id);
            }
        }
        result
    }

    async fn mount_sequence(&self, id: ComponentId, locator: Option<String>) -> Result<(), MountError> {
        let scope = match locator {
            Some(locator) => {
                debug!(locator = %locator, "fetching fragment");
                let fetcher = self.inner.fetcher.clone();
                let markup = fetcher
                    .fetch(&locator)
                    .await
                    .map_err(|source| MountError::Fetch {
                        locator: locator.clone(),
                        source,
                    })?;
                self.ensure_connected(id)?;

                self.transition(id, MountState::PopulatingScope);
                let scope = {
                    let mut doc = self.document_mut();
                    let scope = doc
                        .attach_scope(id.element())
                        .ok_or(RuntimeError::UnknownComponent(id.element()))?;
                    doc.replace_children_with_markup(scope, &markup);
                    scope
                };
                self.transition(id, MountState::Activating);
                Some(scope)
            }
            None => {
                self.ensure_connected(id)?;
                None
            }
        };

        self.activate_scripts(id, scope);
        self.tag_owners(id);
        if let Some(scope) = scope {
            // Nested mounts run as their own tasks.
            drop(self.upgrade(scope));
        }

        self.transition(id, MountState::Ready);
        info!("component ready");
        self.call_mount_hook(id, Ok(()));

        let pending = self.with_record_mut(id, |r| r.pending_change.take())?;
        let change = pending.unwrap_or_else(|| {
            AttributeChange::new(
                PropsAttribute::Props.name(),
                None,
                Some(self.attribute_text(id, PropsAttribute::Props)),
            )
        });
        self.propagate(id, change);
        Ok(())
    }

    fn ensure_connected(&self, id: ComponentId) -> Result<(), MountError> {
        if self.document().is_connected(id.element()) && self.state(id).is_some() {
            Ok(())
        } else {
            Err(MountError::Detached(id))
        }
    }

    /// Replace every inert script of the scope (or of the light tree when
    /// there is no scope) with an executable copy and run it.
    fn activate_scripts(&self, id: ComponentId, scope: Option<NodeId>) {
        let scripts: Vec<NodeId> = {
            let doc = self.document();
            let tree = Tree::new(&doc, self.options());
            let mut owned = OwnedNodes::default();
            match scope {
                Some(scope) => owned.visit_scope_root(&tree, scope),
                None => walk_children(&mut owned, &tree, id.element()),
            }
            owned
                .nodes
                .into_iter()
                .filter(|n| doc.tag(*n) == Some("script") && doc.is_inert(*n))
                .collect()
        };
        if scripts.is_empty() {
            return;
        }

        let guard = MountGuard::enter(self, id);
        for inert in scripts {
            let source = {
                let mut doc = self.document_mut();
                let source = doc.text_content(inert);
                let executable = doc.create_element("script");
                for (name, value) in doc.attributes(inert).to_vec() {
                    doc.set_attribute(executable, &name, &value);
                }
                doc.set_text_content(executable, &source);
                doc.replace_node(inert, executable);
                source
            };
            let context = MountContext::new(self.clone(), id, guard.previous);
            if let Err(error) = self.inner.scripts.run(&source, &context) {
                warn!(component = %id, error = %error, "behaviour script failed");
            }
        }
        drop(guard);
    }

    /// Record `id` as the owner of every node in its owned tree.
    fn tag_owners(&self, id: ComponentId) {
        let nodes = {
            let doc = self.document();
            let mut owned = OwnedNodes::default();
            owned.visit_owner(&Tree::new(&doc, self.options()), id.element());
            owned.nodes
        };
        let mut owners = self.inner.owners.borrow_mut();
        for node in nodes {
            owners.insert(node, id);
        }
    }

    /// Owner-tag the light tree only, ahead of the mount.
    pub(crate) fn tag_light_tree(&self, id: ComponentId) {
        let nodes = {
            let doc = self.document();
            let mut owned = OwnedNodes::default();
            walk_children(&mut owned, &Tree::new(&doc, self.options()), id.element());
            owned.nodes
        };
        let mut owners = self.inner.owners.borrow_mut();
        for node in nodes {
            owners.insert(node, id);
        }
    }

    fn call_mount_hook(&self, id: ComponentId, result: Result<(), &MountError>) {
        let hook = self
            .with_record(id, |r| r.setup.on_mount.clone())
            .ok()
            .flatten();
        if let Some(hook) = hook {
            let context = MountContext::new(self.clone(), id, self.current_mount());
            hook(&context, result);
        }
    }

    /// Render an expression element on a later turn unless a propagation
    /// pass has rendered it by then.
    fn schedule_first_run(&self, node: NodeId) {
        let runtime = self.clone();
        tokio::task::spawn_local(async move {
            tokio::task::yield_now().await;
            let connected = runtime.document().is_connected(node);
            if connected && runtime.expression_renders(node) == 0 {
                runtime.render_expression(node);
            }
        });
    }
}
