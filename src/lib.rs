//! # Hearsay Runtime Ground Truth
//!
//! A component runtime for a host document. Component elements carry their
//! inputs as expression text in `props` and `key` attributes; expression
//! elements render the value of the text they contain. Both evaluate
//! against the owning component, bound to the `component` parameter.
//!
//! ## Runtime Invariants
//!
//! 1. **Closed Expressions**: Expression text may only reference the
//!    context parameter and `undefined`/`NaN`/`Infinity`. Anything that
//!    fails to compile or evaluate yields the text itself.
//!
//! 2. **Override Wins**: Values written through a component's props setter
//!    or lens live in its override store and win over the attribute
//!    expression at every nesting level. The store is mirrored to
//!    `props-data`.
//!
//! 3. **One Write Path**: A lens write replays its access path to the
//!    component and ends in the same setter an external write uses.
//!
//! 4. **Mount Order**: fetch, populate the isolated scope, activate
//!    behaviour scripts, tag owners, become ready, then run the first
//!    propagation pass. Nothing in the scope is evaluated earlier.
//!
//! 5. **Propagation Completeness**: Every observed attribute write on a
//!    ready component re-renders its expression elements, re-derives each
//!    directly nested component exactly once and then calls its hook.
//!
//! 6. **Cycle Guard**: A lens never wraps a value that reaches itself.
//!
//! ## Threading
//!
//! Single-threaded. Mounting spawns local tasks and must run inside a
//! `tokio::task::LocalSet`.

mod cache;
mod component;
mod dom;
mod error;
mod eval;
mod expr;
mod fetch;
mod lens;
mod mount;
mod options;
mod propagate;
mod runtime;
mod scope;
mod script;
mod store;
mod value;
mod visitor;

#[cfg(test)]
mod expression_tests;
#[cfg(test)]
mod lens_tests;

pub use cache::ExpressionCache;
pub use component::{
    AttributeChange, ComponentId, ComponentSetup, MountContext, MountState, PropsAttribute,
};
pub use dom::{Document, NodeId, NodeKind, SlotContent};
pub use error::{MountError, RuntimeError};
pub use eval::{evaluate, fallback_value, EvalError, NoHost, PropertyHost};
pub use expr::{compile, Expr};
pub use fetch::{DirectoryFetcher, FetchError, FragmentFetcher, StaticFetcher};
pub use lens::{AccessPath, Container, Entry, Lens, PathStep};
pub use options::{FallbackMode, RuntimeOptions};
pub use runtime::{Runtime, RuntimeBuilder};
pub use script::{NullScriptHost, Reaction, ScriptError, ScriptHost, ScriptRegistry};
pub use store::{merge, OverrideStore};
pub use value::{Array, Object, Value};
pub use visitor::{OwnedTreeVisitor, Tree};
