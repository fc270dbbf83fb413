use serde::{Deserialize, Serialize};

/// Render configuration. Deserializable from the JSON the native bridge
/// receives; every field has a default.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RenderOptions {
    /// Prefix of every generated scope class.
    pub class_prefix: String,
    /// Length of the random token following the prefix.
    pub token_length: usize,
    /// Marker inserted between a script declaration name and its token.
    pub script_marker: String,
    /// Maximum component nesting depth before the render aborts.
    pub max_depth: usize,
    /// Seed for the scope-class generator; `None` draws from OS entropy.
    pub seed: Option<u64>,
    /// Emit `x-text` / `:attr` / `x-data` / `x-init` live bindings.
    pub client_bindings: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            class_prefix: "plenti-".to_string(),
            token_length: 6,
            script_marker: "_plenti_".to_string(),
            max_depth: 32,
            seed: None,
            client_bindings: true,
        }
    }
}

impl RenderOptions {
    pub fn seeded(seed: u64) -> Self {
        Self {
            seed: Some(seed),
            ..Self::default()
        }
    }
}
