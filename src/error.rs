use thiserror::Error;

use crate::component::ComponentId;
use crate::dom::NodeId;
use crate::fetch::FetchError;

/// Failures of runtime operations invoked by the host or by behaviour code.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("element {0} is not a registered component")]
    UnknownComponent(NodeId),

    #[error("cycle detected at {at}")]
    CycleDetected { at: String },

    #[error("cannot assign '{name}' on a non-composite value at {at}")]
    NotComposite { at: String, name: String },

    #[error("'{name}' is not a valid array index at {at}")]
    InvalidIndex { at: String, name: String },

    #[error("'{0}' is not a props-like attribute")]
    UnknownAttribute(String),

    #[error("access path is not rooted at a component")]
    DetachedPath,
}

/// Failures of the asynchronous mount sequence. Delivered to the mount hook
/// and returned from the mount task.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MountError {
    #[error("failed to fetch fragment '{locator}': {source}")]
    Fetch {
        locator: String,
        #[source]
        source: FetchError,
    },

    #[error("component {0} was removed before mounting finished")]
    Detached(ComponentId),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}
