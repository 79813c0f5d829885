use anyhow::{Error as E, Result};
use candle_core::quantized::gguf_file;
use candle_core::{Device, Tensor};
use candle_transformers::models::quantized_gemma3;
use std::path::Path;

pub struct RuntimeModel {
    weights: quantized_gemma3::ModelWeights,
}

impl RuntimeModel {
    pub fn load_from_gguf(path: &Path, device: &Device) -> Result<Self> {
        let mut file = std::fs::File::open(path)
            .map_err(|e| E::msg(format!("Failed to open model file {}: {}", path.display(), e)))?;
        let content = gguf_file::Content::read(&mut file)
            .map_err(|e| E::msg(format!("Not a readable GGUF file: {}", e)))?;

        match quantized_gemma3::ModelWeights::from_gguf(content, &mut file, device) {
            Ok(weights) => Ok(Self { weights }),
            Err(e) => {
                let msg = format!("{}", e);
                if msg.contains("cannot find") && msg.contains("gemma3") {
                    Err(E::msg(format!(
                        "Gemma load failed: {}. The GGUF metadata is not a Gemma 3 export; convert the checkpoint with gemma3 architecture metadata.",
                        msg
                    )))
                } else {
                    Err(E::msg(msg))
                }
            }
        }
    }

    /// Logits for the last position of `input_tensor`, which starts at
    /// absolute `position`. Position zero drops the KV cache.
    pub fn forward(&mut self, input_tensor: &Tensor, position: usize) -> Result<Tensor> {
        Ok(self.weights.forward(input_tensor, position)?)
    }
}
