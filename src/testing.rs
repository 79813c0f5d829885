//! Scripted stand-ins for the tokenizer and the model.

use tokenizers::Tokenizer;

use crate::engine::{TextTokenizer, TokenDecoder};
use crate::errors::SessionError;
use crate::generation::{GenerationRequest, Generator};

pub const EOS: u32 = 1;
pub const BOS: u32 = 2;

/// ASCII bytes map to themselves; a few ids above 255 are multi-char pieces.
pub struct FakeTokenizer;

impl TextTokenizer for FakeTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<u32>, SessionError> {
        text.chars()
            .map(|c| {
                if c.is_ascii() && c as u32 > 2 {
                    Ok(c as u32)
                } else {
                    Err(SessionError::Encode(format!("unsupported char {:?}", c)))
                }
            })
            .collect()
    }

    fn stream_decoder(&self) -> Box<dyn TokenDecoder + '_> {
        Box::new(FakeDecoder { tokenizer: self })
    }
}

impl FakeTokenizer {
    pub fn decode(&self, token: u32) -> Result<String, SessionError> {
        match token {
            BOS => Ok(String::new()),
            3..=255 => Ok(char::from(token as u8).to_string()),
            300 => Ok(" Hello".to_string()),
            301 => Ok(" world".to_string()),
            302 => Ok(" \n\tanswer".to_string()),
            _ => Err(SessionError::Decode {
                token,
                detail: "unknown id".to_string(),
            }),
        }
    }
}

/// Every fake token is a whole piece of text.
pub struct FakeDecoder<'t> {
    tokenizer: &'t FakeTokenizer,
}

impl TokenDecoder for FakeDecoder<'_> {
    fn step(&mut self, token: u32) -> Result<Option<String>, SessionError> {
        self.tokenizer.decode(token).map(Some)
    }
}

/// Gemma-style byte fallback: the euro sign has no piece of its own and encodes
/// to its three UTF-8 bytes, ids 0, 1 and 2.
const BYTE_FALLBACK_TOKENIZER_JSON: &str = r#"{
  "version": "1.0",
  "truncation": null,
  "padding": null,
  "added_tokens": [],
  "normalizer": null,
  "pre_tokenizer": null,
  "post_processor": null,
  "decoder": {
    "type": "Sequence",
    "decoders": [
      { "type": "Replace", "pattern": { "String": "▁" }, "content": " " },
      { "type": "ByteFallback" },
      { "type": "Fuse" }
    ]
  },
  "model": {
    "type": "BPE",
    "dropout": null,
    "unk_token": null,
    "continuing_subword_prefix": null,
    "end_of_word_suffix": null,
    "fuse_unk": false,
    "byte_fallback": true,
    "vocab": { "<0xE2>": 0, "<0x82>": 1, "<0xAC>": 2, "a": 3, "▁": 4 },
    "merges": []
  }
}"#;

pub fn byte_fallback_tokenizer() -> Tokenizer {
    Tokenizer::from_bytes(BYTE_FALLBACK_TOKENIZER_JSON.as_bytes()).expect("inline tokenizer")
}

/// Plays back the same response every turn and records what it was asked.
pub struct ScriptedGenerator {
    pub response: Vec<u32>,
    /// Draw response tokens from the session RNG instead of `response`.
    pub sample_from_rng: bool,
    pub calls: usize,
    pub prompts: Vec<Vec<u32>>,
    pub start_positions: Vec<usize>,
    /// Response tokens actually emitted, one entry per call.
    pub emitted: Vec<Vec<u32>>,
}

impl ScriptedGenerator {
    pub fn new(response: Vec<u32>) -> Self {
        Self {
            response,
            sample_from_rng: false,
            calls: 0,
            prompts: Vec::new(),
            start_positions: Vec::new(),
            emitted: Vec::new(),
        }
    }

    pub fn random(len: usize) -> Self {
        let mut g = Self::new(vec![0; len]);
        g.sample_from_rng = true;
        g
    }
}

impl Generator for ScriptedGenerator {
    fn generate(&mut self, mut request: GenerationRequest<'_>) -> Result<(), SessionError> {
        self.calls += 1;
        self.prompts.push(request.prompt.to_vec());
        self.start_positions.push(request.start_pos);

        for &token in request.prompt {
            request.emit(token, 0.0)?;
        }
        let mut emitted = Vec::new();
        for &scripted in &self.response {
            let token = if self.sample_from_rng {
                300 + request.rng.next_u32() % 3
            } else {
                scripted
            };
            emitted.push(token);
            if !request.emit(token, 1.0)? || token == EOS {
                break;
            }
        }
        self.emitted.push(emitted);
        Ok(())
    }
}
