//! Propagation Pass
//!
//! Triggered by every observed attribute write on a ready component. One
//! pass, in order:
//!
//! 1. renders every expression element of the component's owned tree,
//! 2. re-derives the props of every directly nested component by assigning
//!    its current props back to it, which starts that component's own pass,
//! 3. calls the component's attribute-changed hook.
//!
//! A change made to the same component while its pass runs is coalesced
//! into a single re-run after the pass.

use tracing::{debug, instrument, trace, warn};

use crate::component::{AttributeChange, ComponentId, MountState};
use crate::error::RuntimeError;
use crate::runtime::Runtime;
use crate::script::Reaction;
use crate::value::Value;
use crate::visitor::{OwnedTreeVisitor, PassTargets, Tree};

impl Runtime {
    pub(crate) fn attribute_changed(&self, id: ComponentId, change: AttributeChange) {
        let Some(state) = self.state(id) else {
            return;
        };
        match state {
            MountState::Ready => self.propagate(id, change),
            MountState::Propagating => {
                debug!(component = %id, attribute = %change.name, "change during pass, re-running after");
                let _ = self.with_record_mut(id, |r| r.rerun = Some(change));
            }
            _ => {
                trace!(component = %id, attribute = %change.name, "queued until ready");
                let _ = self.with_record_mut(id, |r| r.pending_change = Some(change));
            }
        }
    }

    #[instrument(skip(self, change), fields(component = %id, attribute = %change.name))]
    pub(crate) fn propagate(&self, id: ComponentId, change: AttributeChange) {
        self.transition(id, MountState::Propagating);
        self.run_pass(id, &change);

        if let Some(next) = self.take_rerun(id) {
            self.run_pass(id, &next);
            if let Some(dropped) = self.take_rerun(id) {
                warn!(attribute = %dropped.name, "dropping change made during re-run");
            }
        }

        if self.state(id) == Some(MountState::Propagating) {
            self.transition(id, MountState::Ready);
        }
    }

    fn take_rerun(&self, id: ComponentId) -> Option<AttributeChange> {
        self.with_record_mut(id, |r| r.rerun.take()).ok().flatten()
    }

    fn run_pass(&self, id: ComponentId, change: &AttributeChange) {
        let targets = {
            let doc = self.document();
            let mut targets = PassTargets::default();
            targets.visit_owner(&Tree::new(&doc, self.options()), id.element());
            targets
        };

        for expression in &targets.expressions {
            self.render_expression(*expression);
        }

        for element in targets.components {
            let Some(child) = self.component(element) else {
                continue;
            };
            if let Err(error) = self.rederive(child) {
                warn!(child = %child, error = %error, "failed to re-derive nested props");
            }
        }

        let hook = self
            .with_record(id, |r| r.setup.on_attribute_changed.clone())
            .ok()
            .flatten();
        if let Some(hook) = hook {
            hook(self, id, change);
        }
    }

    fn rederive(&self, child: ComponentId) -> Result<(), RuntimeError> {
        let current = self.props_value(child)?;
        self.set_props(child, current)
    }

    /// Deliver `data` to every mounted component's react hook and every
    /// element carrying inline reaction code. Returns how many were reached.
    pub fn broadcast(&self, data: &Value, recipient: &Value) -> usize {
        let (consumers, inline) = {
            let doc = self.document();
            let options = self.options();
            let nodes = doc.descendants(doc.root(), true);
            let consumers: Vec<_> = nodes
                .iter()
                .copied()
                .filter(|n| doc.tag(*n) == Some(options.component_tag.as_str()))
                .collect();
            let inline: Vec<_> = nodes
                .iter()
                .filter_map(|n| {
                    doc.attribute(*n, &options.reaction_attribute)
                        .map(|code| (*n, code.to_string()))
                })
                .collect();
            (consumers, inline)
        };

        let mut reached = 0;
        for element in consumers {
            let Some(id) = self.component(element) else {
                continue;
            };
            if !self.state(id).map_or(false, MountState::is_ready) {
                continue;
            }
            let hook = self
                .with_record(id, |r| r.setup.on_react.clone())
                .ok()
                .flatten();
            if let Some(hook) = hook {
                hook(self, id, data, recipient);
                reached += 1;
            }
        }

        for (consumer, code) in inline {
            let reaction = Reaction {
                runtime: self,
                consumer,
                data,
                recipient,
            };
            match self.inner.scripts.react_inline(&code, &reaction) {
                Ok(()) => reached += 1,
                Err(error) => warn!(node = %consumer, error = %error, "inline reaction failed"),
            }
        }

        debug!(reached, "broadcast delivered");
        reached
    }
}
