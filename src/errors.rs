use thiserror::Error;

/// Rejected configuration, reported before the session starts.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing --{0} flag")]
    Missing(&'static str),

    #[error("Invalid --model '{0}': expected <size>-it or <size>-pt with size one of 1b, 4b, 12b, 27b")]
    UnknownModel(String),

    #[error("max_tokens ({max_tokens}) is larger than the maximum sequence length ({seq_len})")]
    MaxTokensTooLarge { max_tokens: usize, seq_len: usize },

    #[error("max_generated_tokens ({generated}) is larger than max_tokens ({max_tokens})")]
    GeneratedExceedsBudget { generated: usize, max_tokens: usize },

    #[error("{0}")]
    OutOfRange(String),

    #[error("Failed to read config file {path}: {detail}")]
    File { path: String, detail: String },
}

/// Errors crossing the session-loop boundary. Everything except I/O on the
/// console is an invariant violation and ends the process.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Invalid args: {0}")]
    Config(#[from] ConfigError),

    #[error("Tokenizer failed to encode prompt: {0}")]
    Encode(String),

    #[error("Tokenizer failed to decode token {token}: {detail}")]
    Decode { token: u32, detail: String },

    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Model load failed: {0}")]
    ModelLoad(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SessionError {
    /// Configuration failures get the usage text printed before exiting.
    pub fn wants_help(&self) -> bool {
        matches!(self, SessionError::Config(_))
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_request_help_and_others_do_not() {
        let cfg: SessionError = ConfigError::Missing("model").into();
        assert!(cfg.wants_help());
        assert_eq!(cfg.to_string(), "Invalid args: Missing --model flag");

        let decode = SessionError::Decode {
            token: 7,
            detail: "bad piece".to_string(),
        };
        assert!(!decode.wants_help());
        assert!(decode.to_string().contains("token 7"));
    }
}
