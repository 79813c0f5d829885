use crate::errors::ConfigError;

pub const START_OF_TURN_USER: &str = "<start_of_turn>user\n";
pub const END_OF_TURN: &str = "<end_of_turn>\n";
pub const START_OF_TURN_MODEL: &str = "<start_of_turn>model\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelTraining {
    /// Expects `<start_of_turn>` / `<end_of_turn>` delimiters.
    InstructionTuned,
    Pretrained,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelSize {
    Gemma1B,
    Gemma4B,
    Gemma12B,
    Gemma27B,
}

impl ModelSize {
    pub fn seq_len(self) -> usize {
        match self {
            ModelSize::Gemma1B => 32_768,
            ModelSize::Gemma4B | ModelSize::Gemma12B | ModelSize::Gemma27B => 131_072,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ModelSize::Gemma1B => "1b",
            ModelSize::Gemma4B => "4b",
            ModelSize::Gemma12B => "12b",
            ModelSize::Gemma27B => "27b",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelVariant {
    pub size: ModelSize,
    pub training: ModelTraining,
}

impl ModelVariant {
    /// Parses the `--model` value, e.g. `4b-it` or `27b-pt`.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let lowered = raw.trim().to_lowercase();
        let (size, training) = lowered
            .rsplit_once('-')
            .ok_or_else(|| ConfigError::UnknownModel(raw.to_string()))?;

        let size = match size {
            "1b" => ModelSize::Gemma1B,
            "4b" => ModelSize::Gemma4B,
            "12b" => ModelSize::Gemma12B,
            "27b" => ModelSize::Gemma27B,
            _ => return Err(ConfigError::UnknownModel(raw.to_string())),
        };
        let training = match training {
            "it" => ModelTraining::InstructionTuned,
            "pt" => ModelTraining::Pretrained,
            _ => return Err(ConfigError::UnknownModel(raw.to_string())),
        };

        Ok(Self { size, training })
    }

    pub fn label(&self) -> String {
        let suffix = match self.training {
            ModelTraining::InstructionTuned => "it",
            ModelTraining::Pretrained => "pt",
        };
        format!("{}-{}", self.size.label(), suffix)
    }
}

/// One turn's prompt: the templated text and the token ids handed to the
/// generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub templated: String,
    pub tokens: Vec<u32>,
}

#[derive(Debug, Clone, Copy)]
pub struct PromptBuilder {
    training: ModelTraining,
    bos_token_id: u32,
}

impl PromptBuilder {
    pub fn new(training: ModelTraining, bos_token_id: u32) -> Self {
        Self {
            training,
            bos_token_id,
        }
    }

    /// Wraps the user text in turn delimiters for instruction-tuned models.
    /// A continuation turn first closes the previous model turn.
    pub fn template(&self, text: &str, abs_pos: usize) -> String {
        match self.training {
            ModelTraining::InstructionTuned => {
                let wrapped = format!(
                    "{}{}{}{}",
                    START_OF_TURN_USER, text, END_OF_TURN, START_OF_TURN_MODEL
                );
                if abs_pos > 0 {
                    format!("{}{}", END_OF_TURN, wrapped)
                } else {
                    wrapped
                }
            }
            ModelTraining::Pretrained => text.to_string(),
        }
    }

    /// BOS goes on the encoded sequence, and only when the session (or the
    /// context after a reset) starts at position zero.
    pub fn finish_tokens(&self, mut tokens: Vec<u32>, abs_pos: usize) -> Vec<u32> {
        if abs_pos == 0 {
            tokens.insert(0, self.bos_token_id);
        }
        tokens
    }

    pub fn build<F, E>(&self, raw: &str, abs_pos: usize, encode: F) -> Result<Prompt, E>
    where
        F: FnOnce(&str) -> Result<Vec<u32>, E>,
    {
        let templated = self.template(raw, abs_pos);
        let encoded = encode(&templated)?;
        let tokens = self.finish_tokens(encoded, abs_pos);
        Ok(Prompt {
            templated,
            tokens,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOS: u32 = 2;

    fn bytes_encode(text: &str) -> Result<Vec<u32>, ()> {
        Ok(text.bytes().map(|b| b as u32 + 1000).collect())
    }

    #[test]
    fn first_instruction_turn_is_wrapped_without_leading_end_marker() {
        let builder = PromptBuilder::new(ModelTraining::InstructionTuned, BOS);
        let text = builder.template("hello", 0);
        assert_eq!(
            text,
            "<start_of_turn>user\nhello<end_of_turn>\n<start_of_turn>model\n"
        );
        assert!(!text.starts_with(END_OF_TURN));
    }

    #[test]
    fn continuation_turn_closes_previous_model_turn() {
        let builder = PromptBuilder::new(ModelTraining::InstructionTuned, BOS);
        let text = builder.template("again", 17);
        assert!(text.starts_with("<end_of_turn>\n<start_of_turn>user\nagain"));
    }

    #[test]
    fn pretrained_prompt_only_gets_bos() {
        let builder = PromptBuilder::new(ModelTraining::Pretrained, BOS);
        let prompt = builder.build("The sky is", 0, bytes_encode).unwrap();

        assert_eq!(prompt.templated, "The sky is");
        assert!(!prompt.templated.contains("<start_of_turn>"));
        assert!(!prompt.templated.contains("<end_of_turn>"));
        assert_eq!(prompt.tokens[0], BOS);
        assert_eq!(prompt.tokens.len(), "The sky is".len() + 1);
    }

    #[test]
    fn bos_is_inserted_only_at_position_zero() {
        let builder = PromptBuilder::new(ModelTraining::InstructionTuned, BOS);

        let first = builder.build("hi", 0, bytes_encode).unwrap();
        assert_eq!(first.tokens.iter().filter(|t| **t == BOS).count(), 1);
        assert_eq!(first.tokens[0], BOS);

        let later = builder.build("hi", 40, bytes_encode).unwrap();
        assert!(!later.tokens.contains(&BOS));
    }

    #[test]
    fn encode_errors_propagate() {
        let builder = PromptBuilder::new(ModelTraining::Pretrained, BOS);
        let res: Result<Prompt, &str> = builder.build("x", 0, |_| Err("broken"));
        assert_eq!(res.unwrap_err(), "broken");
    }

    #[test]
    fn model_flag_parsing() {
        let v = ModelVariant::parse("4b-it").unwrap();
        assert_eq!(v.size, ModelSize::Gemma4B);
        assert_eq!(v.training, ModelTraining::InstructionTuned);
        assert_eq!(v.label(), "4b-it");

        let v = ModelVariant::parse("27B-PT").unwrap();
        assert_eq!(v.training, ModelTraining::Pretrained);

        assert!(ModelVariant::parse("7b-it").is_err());
        assert!(ModelVariant::parse("4b").is_err());
        assert!(ModelVariant::parse("4b-chat").is_err());
    }
}
