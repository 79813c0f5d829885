mod lifecycle;
pub mod sampling;
mod tokenizer;

use candle_core::Device;

use crate::backend::RuntimeModel;

pub use lifecycle::LoadedEngine;
pub use tokenizer::{SpecialTokens, TextTokenizer, TokenDecoder};

/// Quantized Gemma behind the [`crate::generation::Generator`] seam.
pub struct LLMEngine {
    pub(super) model: RuntimeModel,
    pub(super) device: Device,
    pub(super) special: SpecialTokens,
}
