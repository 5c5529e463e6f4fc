//! Behaviour scripts.
//!
//! The runtime never interprets script text itself. Script elements found
//! in a fragment are handed to a [`ScriptHost`] during activation, and
//! inline reaction code is handed to it during a broadcast.

use regex::Regex;
use std::collections::HashMap;
use std::rc::Rc;
use thiserror::Error;
use tracing::debug;

use crate::component::MountContext;
use crate::dom::NodeId;
use crate::runtime::Runtime;
use crate::value::Value;

lazy_static::lazy_static! {
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScriptError {
    #[error("no behaviour registered for script `{0}`")]
    Unregistered(String),

    #[error("script failed: {0}")]
    Failed(String),
}

/// A broadcast delivered to an element carrying inline reaction code.
pub struct Reaction<'a> {
    pub runtime: &'a Runtime,
    pub consumer: NodeId,
    pub data: &'a Value,
    pub recipient: &'a Value,
}

pub trait ScriptHost {
    /// Run a behaviour script during component activation.
    fn run(&self, source: &str, context: &MountContext) -> Result<(), ScriptError>;

    /// Run inline reaction code for a broadcast.
    fn react_inline(&self, code: &str, reaction: &Reaction<'_>) -> Result<(), ScriptError>;
}

/// Ignores every script.
pub struct NullScriptHost;

impl ScriptHost for NullScriptHost {
    fn run(&self, source: &str, context: &MountContext) -> Result<(), ScriptError> {
        debug!(component = %context.component(), len = source.len(), "ignoring behaviour script");
        Ok(())
    }

    fn react_inline(&self, _code: &str, _reaction: &Reaction<'_>) -> Result<(), ScriptError> {
        Ok(())
    }
}

pub type Behaviour = Rc<dyn Fn(&MountContext) -> Result<(), ScriptError>>;
pub type InlineReaction = Rc<dyn Fn(&Reaction<'_>) -> Result<(), ScriptError>>;

/// Script host that maps script text to native closures. Text is matched
/// after trimming and collapsing whitespace runs.
#[derive(Clone, Default)]
pub struct ScriptRegistry {
    behaviours: HashMap<String, Behaviour>,
    reactions: HashMap<String, InlineReaction>,
}

pub fn normalize_source(source: &str) -> String {
    WHITESPACE.replace_all(source.trim(), " ").into_owned()
}

impl ScriptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn behaviour<F>(mut self, source: &str, behaviour: F) -> Self
    where
        F: Fn(&MountContext) -> Result<(), ScriptError> + 'static,
    {
        self.behaviours
            .insert(normalize_source(source), Rc::new(behaviour));
        self
    }

    pub fn reaction<F>(mut self, code: &str, reaction: F) -> Self
    where
        F: Fn(&Reaction<'_>) -> Result<(), ScriptError> + 'static,
    {
        self.reactions.insert(normalize_source(code), Rc::new(reaction));
        self
    }
}

impl ScriptHost for ScriptRegistry {
    fn run(&self, source: &str, context: &MountContext) -> Result<(), ScriptError> {
        let key = normalize_source(source);
        if key.is_empty() {
            return Ok(());
        }
        match self.behaviours.get(&key) {
            Some(behaviour) => behaviour(context),
            None => Err(ScriptError::Unregistered(key)),
        }
    }

    fn react_inline(&self, code: &str, reaction: &Reaction<'_>) -> Result<(), ScriptError> {
        let key = normalize_source(code);
        match self.reactions.get(&key) {
            Some(handler) => handler(reaction),
            None => Err(ScriptError::Unregistered(key)),
        }
    }
}
