//! Runtime configuration.
//!
//! Every name the runtime recognises in host markup is configurable. The
//! defaults match the markup used throughout the crate docs and tests.

use serde::{Deserialize, Serialize};

/// What an expression that fails to compile or evaluate yields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FallbackMode {
    /// The raw expression text.
    #[default]
    Literal,
    /// The expression text JSON-escaped, without surrounding quotes.
    Escaped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RuntimeOptions {
    /// Tag name of component elements.
    pub component_tag: String,
    /// Tag name of expression elements.
    pub expression_tag: String,
    /// Attributes naming a component's fragment locator, checked in order.
    pub source_attributes: Vec<String>,
    /// Presence of this attribute switches props/key to literal mode.
    pub literal_attribute: String,
    /// Attribute holding inline reaction code for broadcasts.
    pub reaction_attribute: String,
    /// Identifier bound to the owning component inside expressions.
    pub context_parameter: String,
    pub fallback: FallbackMode,
    /// Upper bound on the length of a lens access path.
    pub max_path_depth: usize,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        RuntimeOptions {
            component_tag: "data-consumer".to_string(),
            expression_tag: "data-expr".to_string(),
            source_attributes: vec!["source".to_string(), "struct".to_string()],
            literal_attribute: "literal".to_string(),
            reaction_attribute: "data-consumer".to_string(),
            context_parameter: "component".to_string(),
            fallback: FallbackMode::Literal,
            max_path_depth: 64,
        }
    }
}

impl RuntimeOptions {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let options =
            RuntimeOptions::from_json(r#"{"componentTag": "x-view", "fallback": "escaped"}"#)
                .unwrap();
        assert_eq!(options.component_tag, "x-view");
        assert_eq!(options.fallback, FallbackMode::Escaped);
        assert_eq!(options.expression_tag, "data-expr");
        assert_eq!(options.context_parameter, "component");
        assert_eq!(options.max_path_depth, 64);
    }

    #[test]
    fn test_unknown_fallback_is_rejected() {
        assert!(RuntimeOptions::from_json(r#"{"fallback": "shout"}"#).is_err());
    }
}
