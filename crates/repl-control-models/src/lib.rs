//! On-disk configuration schema for the REPL.
//!
//! Every field is optional: a config file only overrides what it names, the
//! binary fills the rest from flags and built-in defaults.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub loader: LoaderSection,
    #[serde(default)]
    pub inference: InferenceSection,
    #[serde(default)]
    pub app: AppSection,
}

/// Where the model and tokenizer live.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoaderSection {
    pub tokenizer: Option<String>,
    pub weights: Option<String>,
    /// `<size>-it` or `<size>-pt`, e.g. `4b-it`.
    pub model: Option<String>,
    pub hf_repo: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InferenceSection {
    pub max_tokens: Option<usize>,
    pub max_generated_tokens: Option<usize>,
    pub temperature: Option<f32>,
    pub top_k: Option<usize>,
    pub deterministic: Option<bool>,
    pub multiturn: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppSection {
    pub num_threads: Option<usize>,
    pub verbosity: Option<u8>,
}

impl ConfigFile {
    /// Overlays `other` on top of `self`; fields set in `other` win.
    pub fn merged_with(mut self, other: ConfigFile) -> ConfigFile {
        macro_rules! overlay {
            ($section:ident: $($field:ident),+) => {
                $(
                    if other.$section.$field.is_some() {
                        self.$section.$field = other.$section.$field;
                    }
                )+
            };
        }

        overlay!(loader: tokenizer, weights, model, hf_repo);
        overlay!(
            inference: max_tokens,
            max_generated_tokens,
            temperature,
            top_k,
            deterministic,
            multiturn
        );
        overlay!(app: num_threads, verbosity);
        self
    }
}
