use anyhow::{Error as E, Result};
use candle_core::{DType, Device, Tensor};
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

use crate::backend::RuntimeModel;
use crate::config::LoaderArgs;
use crate::errors::SessionError;
use crate::generation::{GenerationRequest, Generator};
use crate::threading::ThreadPools;

use super::sampling::sample_top_k;
use super::tokenizer::{
    fetch_tokenizer, resolve_special_tokens, resolve_tokenizer_path, SpecialTokens,
};
use super::LLMEngine;

/// The generator and the tokenizer are handed out separately: the session
/// loop decodes tokens while the generator is mutably borrowed.
pub struct LoadedEngine {
    pub generator: LLMEngine,
    pub tokenizer: Tokenizer,
    pub special: SpecialTokens,
}

impl LLMEngine {
    pub fn load(loader: &LoaderArgs, pools: &ThreadPools) -> Result<LoadedEngine> {
        info!("Loading model {} from {}", loader.model.label(), loader.weights.display());

        let device = Device::Cpu;
        let model = pools
            .primary
            .install(|| RuntimeModel::load_from_gguf(&loader.weights, &device))?;

        info!("Weights loaded. Loading tokenizer...");

        let tokenizer_path = match resolve_tokenizer_path(&loader.tokenizer, &loader.weights) {
            Some(path) => path,
            None => match loader.hf_repo.as_deref() {
                Some(repo) => fetch_tokenizer(repo)?,
                None => {
                    return Err(E::msg(format!(
                        "Tokenizer not found at {} (fail-fast policy).",
                        loader.tokenizer.display()
                    )))
                }
            },
        };
        info!("Using tokenizer at {:?}", tokenizer_path);
        let tokenizer = Tokenizer::from_file(tokenizer_path).map_err(E::msg)?;

        let special = resolve_special_tokens(&tokenizer).map_err(E::msg)?;
        special
            .check_turn_markers(loader.model.training)
            .map_err(E::msg)?;
        info!(
            "Special tokens -> BOS: {}, EOS: {}, start_of_turn: {:?}, end_of_turn: {:?}",
            special.bos, special.eos, special.start_of_turn, special.end_of_turn
        );

        Ok(LoadedEngine {
            generator: LLMEngine {
                model,
                device,
                special,
            },
            tokenizer,
            special,
        })
    }

    fn forward_on(
        &mut self,
        pools: &ThreadPools,
        tokens: &[u32],
        position: usize,
    ) -> Result<Vec<f32>> {
        let device = &self.device;
        let model = &mut self.model;
        pools.primary.install(|| {
            let input = Tensor::new(tokens, device)?.unsqueeze(0)?;
            let logits = model.forward(&input, position)?;
            let logits = logits.squeeze(0)?;
            let logits = if logits.rank() == 1 {
                logits
            } else {
                let rows = logits.dim(0)?;
                logits.get(rows - 1)?
            };
            Ok(logits.to_dtype(DType::F32)?.to_vec1::<f32>()?)
        })
    }

    fn run(&mut self, request: &mut GenerationRequest<'_>) -> Result<()> {
        let prompt = request.prompt;
        if prompt.is_empty() {
            return Err(E::msg("empty prompt"));
        }
        let settings = request.settings;
        let pools = request.pools;
        let eos = self.special.eos;
        if request.start_pos + prompt.len() > settings.max_tokens {
            return Err(E::msg(format!(
                "prompt of {} tokens at position {} overruns max_tokens ({})",
                prompt.len(),
                request.start_pos,
                settings.max_tokens
            )));
        }

        debug!("prefill {} tokens at position {}", prompt.len(), request.start_pos);
        let mut logits = self.forward_on(pools, prompt, request.start_pos)?;

        // The sink counts prompt tokens too; their return value is ignored.
        for &token in prompt {
            request.emit(token, 0.0)?;
        }

        let mut pos = request.start_pos + prompt.len();
        for _ in 0..settings.max_generated_tokens {
            if pos >= settings.max_tokens {
                break;
            }

            let accept = request.accept_token;
            let rng = request.rng.rng_mut();
            let sampled = pools.inner.install(|| {
                sample_top_k(&logits, settings.top_k, settings.temperature, rng, accept)
            });
            let (mut token, score) = match sampled {
                Some(s) => s,
                None => {
                    warn!("accept filter rejected every token, ending turn");
                    (eos, 0.0)
                }
            };

            if !request.emit(token, score)? {
                token = eos;
            }
            if token == eos {
                break;
            }

            logits = self.forward_on(pools, &[token], pos)?;
            pos += 1;
        }

        Ok(())
    }
}

impl Generator for LLMEngine {
    fn generate(&mut self, mut request: GenerationRequest<'_>) -> Result<(), SessionError> {
        self.run(&mut request).map_err(|e| match e.downcast::<SessionError>() {
            Ok(session_err) => session_err,
            Err(other) => SessionError::Generation(format!("{:#}", other)),
        })
    }
}
