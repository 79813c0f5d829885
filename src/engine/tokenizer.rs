use std::path::{Path, PathBuf};

use tokenizers::{
    DecodeStream, Decoder, Model, Normalizer, PostProcessor, PreTokenizer, Tokenizer,
};
use tracing::info;

use crate::errors::SessionError;
use crate::prompting::ModelTraining;

/// Text <-> token ids. Failures here mean the tokenizer and model disagree,
/// so callers treat them as fatal.
pub trait TextTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<u32>, SessionError>;

    /// A fresh incremental decoder, one per turn.
    fn stream_decoder(&self) -> Box<dyn TokenDecoder + '_>;
}

/// Turns a token stream back into text. A token that ends partway through a
/// multi-byte character yields `None`; the completed text arrives with the
/// token that finishes it.
pub trait TokenDecoder {
    fn step(&mut self, token: u32) -> Result<Option<String>, SessionError>;
}

impl TextTokenizer for Tokenizer {
    fn encode(&self, text: &str) -> Result<Vec<u32>, SessionError> {
        // BOS placement belongs to the prompt builder, not the tokenizer.
        (**self).encode(text, false)
            .map(|enc| enc.get_ids().to_vec())
            .map_err(|e| SessionError::Encode(e.to_string()))
    }

    fn stream_decoder(&self) -> Box<dyn TokenDecoder + '_> {
        Box::new(self.decode_stream(true))
    }
}

impl<M, N, PT, PP, D> TokenDecoder for DecodeStream<'_, M, N, PT, PP, D>
where
    M: Model,
    N: Normalizer,
    PT: PreTokenizer,
    PP: PostProcessor,
    D: Decoder,
{
    fn step(&mut self, token: u32) -> Result<Option<String>, SessionError> {
        DecodeStream::step(self, token).map_err(|e| SessionError::Decode {
            token,
            detail: e.to_string(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecialTokens {
    pub bos: u32,
    pub eos: u32,
    pub start_of_turn: Option<u32>,
    pub end_of_turn: Option<u32>,
}

impl SpecialTokens {
    /// Instruction-tuned prompts spell the turn markers out as text, so the
    /// tokenizer has to map each one to a single id.
    pub fn check_turn_markers(&self, training: ModelTraining) -> Result<(), String> {
        if training == ModelTraining::Pretrained {
            return Ok(());
        }
        match (self.start_of_turn, self.end_of_turn) {
            (Some(_), Some(_)) => Ok(()),
            _ => Err(
                "Tokenizer/model incompatibility: instruction-tuned Gemma requires \
                 <start_of_turn> and <end_of_turn>."
                    .to_string(),
            ),
        }
    }
}

pub(crate) fn resolve_tokenizer_path(
    tokenizer_hint: &Path,
    weights_path: &Path,
) -> Option<PathBuf> {
    if tokenizer_hint.exists() {
        return Some(tokenizer_hint.to_path_buf());
    }

    let parent_dir = weights_path.parent().unwrap_or(Path::new("."));
    let local_tok_path = parent_dir.join("tokenizer.json");
    if local_tok_path.exists() {
        return Some(local_tok_path);
    }

    let root_tok_path = Path::new("tokenizer.json");
    if root_tok_path.exists() {
        return Some(root_tok_path.to_path_buf());
    }

    None
}

pub(crate) fn fetch_tokenizer(repo: &str) -> anyhow::Result<PathBuf> {
    info!("tokenizer.json not found locally, fetching from {}", repo);
    let api = hf_hub::api::sync::Api::new()?;
    let path = api.model(repo.to_string()).get("tokenizer.json")?;
    Ok(path)
}

pub(crate) fn resolve_special_tokens(tokenizer: &Tokenizer) -> Result<SpecialTokens, String> {
    let bos = tokenizer
        .token_to_id("<bos>")
        .ok_or_else(|| "Tokenizer/model incompatibility: Gemma requires <bos>.".to_string())?;
    let eos = tokenizer
        .token_to_id("<eos>")
        .ok_or_else(|| "Tokenizer/model incompatibility: Gemma requires <eos>.".to_string())?;

    Ok(SpecialTokens {
        bos,
        eos,
        start_of_turn: tokenizer.token_to_id("<start_of_turn>"),
        end_of_turn: tokenizer.token_to_id("<end_of_turn>"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::byte_fallback_tokenizer;
    use std::fs;
    use std::time::{SystemTime, UNIX_EPOCH};

    #[test]
    fn split_multibyte_char_is_streamed_whole() {
        let tokenizer = byte_fallback_tokenizer();
        let ids = TextTokenizer::encode(&tokenizer, "\u{20ac}").expect("encode");
        assert_eq!(ids, vec![0, 1, 2]);

        let mut decoder = tokenizer.stream_decoder();
        assert_eq!(decoder.step(0).unwrap(), None);
        assert_eq!(decoder.step(1).unwrap(), None);
        assert_eq!(decoder.step(2).unwrap().as_deref(), Some("\u{20ac}"));
        assert_eq!(decoder.step(3).unwrap().as_deref(), Some("a"));
    }

    #[test]
    fn turn_markers_required_for_instruction_tuned() {
        let mut special = SpecialTokens {
            bos: 2,
            eos: 1,
            start_of_turn: Some(106),
            end_of_turn: Some(107),
        };
        assert!(special
            .check_turn_markers(ModelTraining::InstructionTuned)
            .is_ok());

        special.end_of_turn = None;
        assert!(special
            .check_turn_markers(ModelTraining::InstructionTuned)
            .is_err());
        assert!(special.check_turn_markers(ModelTraining::Pretrained).is_ok());
    }

    #[test]
    fn explicit_tokenizer_path_wins() {
        let base = mk_temp_dir("textgen_tok_explicit");
        fs::create_dir_all(&base).expect("create base");
        let explicit = base.join("custom.json");
        fs::write(&explicit, b"{}").expect("write tokenizer stub");
        fs::write(base.join("tokenizer.json"), b"{}").expect("write sibling stub");

        let resolved = resolve_tokenizer_path(&explicit, &base.join("model.gguf"));
        assert_eq!(resolved, Some(explicit));

        let _ = fs::remove_dir_all(base);
    }

    #[test]
    fn falls_back_to_tokenizer_next_to_weights() {
        let base = mk_temp_dir("textgen_tok_sibling");
        fs::create_dir_all(&base).expect("create base");
        fs::write(base.join("tokenizer.json"), b"{}").expect("write sibling stub");

        let resolved = resolve_tokenizer_path(&base.join("missing.json"), &base.join("model.gguf"))
            .expect("sibling tokenizer");
        assert!(resolved.ends_with("tokenizer.json"));
        assert!(resolved.starts_with(&base));

        let _ = fs::remove_dir_all(base);
    }

    fn mk_temp_dir(prefix: &str) -> PathBuf {
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time ok")
            .as_nanos();
        std::env::temp_dir().join(format!("{}_{}_{}", prefix, std::process::id(), ts))
    }
}
