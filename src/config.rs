use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use clap::Parser;
use repl_control_models::{AppSection, ConfigFile, InferenceSection, LoaderSection};

use crate::errors::ConfigError;
use crate::prompting::ModelVariant;

pub const DEFAULT_MAX_TOKENS: usize = 3072;
pub const DEFAULT_MAX_GENERATED_TOKENS: usize = 2048;
pub const DEFAULT_TEMPERATURE: f32 = 1.0;
pub const DEFAULT_TOP_K: usize = 1;
pub const DEFAULT_VERBOSITY: u8 = 1;
const MAX_DEFAULT_THREADS: usize = 18;

#[derive(Parser, Debug, Default, Clone)]
#[command(
    name = "textgen_repl",
    about = "Interactive text generation with a local quantized Gemma model",
    after_help = "Enter an instruction and press enter (%Q quits, %C clears the context)."
)]
pub struct Cli {
    /// TOML file with [loader], [inference] and [app] sections; flags win.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Path to tokenizer.json.
    #[arg(long, help_heading = "Model Loading Arguments")]
    pub tokenizer: Option<String>,

    /// Path to the GGUF weights.
    #[arg(long = "compressed_weights", alias = "weights", help_heading = "Model Loading Arguments")]
    pub weights: Option<String>,

    /// Model variant: 1b-it, 1b-pt, 4b-it, 4b-pt, 12b-it, 12b-pt, 27b-it, 27b-pt.
    #[arg(long, help_heading = "Model Loading Arguments")]
    pub model: Option<String>,

    /// HuggingFace repo to fetch tokenizer.json from when it is missing locally.
    #[arg(long = "hf_repo", help_heading = "Model Loading Arguments")]
    pub hf_repo: Option<String>,

    /// Maximum number of tokens in the session before the REPL exits.
    #[arg(long = "max_tokens", help_heading = "Inference Arguments")]
    pub max_tokens: Option<usize>,

    /// Maximum number of tokens generated per turn.
    #[arg(long = "max_generated_tokens", help_heading = "Inference Arguments")]
    pub max_generated_tokens: Option<usize>,

    #[arg(long, help_heading = "Inference Arguments")]
    pub temperature: Option<f32>,

    #[arg(long = "top_k", help_heading = "Inference Arguments")]
    pub top_k: Option<usize>,

    /// Fixed-seed sampling for reproducible output.
    #[arg(
        long,
        num_args = 0..=1,
        default_missing_value = "true",
        help_heading = "Inference Arguments"
    )]
    pub deterministic: Option<bool>,

    /// Keep the conversation context across turns.
    #[arg(
        long,
        num_args = 0..=1,
        default_missing_value = "true",
        help_heading = "Inference Arguments"
    )]
    pub multiturn: Option<bool>,

    /// Number of generation worker threads.
    #[arg(long = "num_threads", help_heading = "Application Arguments")]
    pub num_threads: Option<usize>,

    /// 0 = generated text only, 1 = prompts and banner, 2 = timing and config.
    #[arg(long, help_heading = "Application Arguments")]
    pub verbosity: Option<u8>,
}

impl Cli {
    fn as_overlay(&self) -> ConfigFile {
        ConfigFile {
            loader: LoaderSection {
                tokenizer: self.tokenizer.clone(),
                weights: self.weights.clone(),
                model: self.model.clone(),
                hf_repo: self.hf_repo.clone(),
            },
            inference: InferenceSection {
                max_tokens: self.max_tokens,
                max_generated_tokens: self.max_generated_tokens,
                temperature: self.temperature,
                top_k: self.top_k,
                deterministic: self.deterministic,
                multiturn: self.multiturn,
            },
            app: AppSection {
                num_threads: self.num_threads,
                verbosity: self.verbosity,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoaderArgs {
    pub tokenizer: PathBuf,
    pub weights: PathBuf,
    pub model: ModelVariant,
    pub hf_repo: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InferenceArgs {
    pub max_tokens: usize,
    pub max_generated_tokens: usize,
    pub temperature: f32,
    pub top_k: usize,
    pub deterministic: bool,
    pub multiturn: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppArgs {
    pub num_threads: usize,
    pub verbosity: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub loader: LoaderArgs,
    pub inference: InferenceArgs,
    pub app: AppArgs,
}

impl Settings {
    pub fn resolve(cli: &Cli) -> Result<Self, ConfigError> {
        let file = match &cli.config {
            Some(path) => load_config_file(path)?,
            None => ConfigFile::default(),
        };
        Self::from_config(file.merged_with(cli.as_overlay()))
    }

    pub fn from_config(cfg: ConfigFile) -> Result<Self, ConfigError> {
        let loader = LoaderArgs::validate(cfg.loader)?;
        let inference = InferenceArgs::validate(cfg.inference, &loader.model)?;
        let app = AppArgs::validate(cfg.app)?;
        Ok(Self {
            loader,
            inference,
            app,
        })
    }

    pub fn print(&self, verbosity: u8, out: &mut dyn Write) -> io::Result<()> {
        let inference = &self.inference;
        config_row(out, "Tokenizer", self.loader.tokenizer.display())?;
        config_row(out, "Weights", self.loader.weights.display())?;
        config_row(out, "Model", self.loader.model.label())?;
        config_row(out, "Max tokens", inference.max_tokens)?;
        config_row(out, "Max generated tokens", inference.max_generated_tokens)?;
        config_row(out, "Temperature", inference.temperature)?;
        config_row(out, "Top-k", inference.top_k)?;
        config_row(out, "Deterministic", inference.deterministic)?;
        config_row(out, "Multiturn", inference.multiturn)?;
        config_row(out, "Number of threads", self.app.num_threads)?;
        config_row(out, "Verbosity", self.app.verbosity)?;

        if verbosity >= 2 {
            let now = chrono::Local::now();
            config_row(out, "Date & Time", now.format("%a %b %e %H:%M:%S %Y"))?;
            config_row(out, "Hardware concurrency", hardware_concurrency())?;
            config_row(out, "Context length", self.loader.model.size.seq_len())?;
            config_row(out, "Weight format", "GGUF (quantized)")?;
        }
        Ok(())
    }
}

impl LoaderArgs {
    fn validate(section: LoaderSection) -> Result<Self, ConfigError> {
        let model = section.model.ok_or(ConfigError::Missing("model"))?;
        let tokenizer = section.tokenizer.ok_or(ConfigError::Missing("tokenizer"))?;
        let weights = section
            .weights
            .ok_or(ConfigError::Missing("compressed_weights"))?;

        Ok(Self {
            tokenizer: PathBuf::from(tokenizer),
            weights: PathBuf::from(weights),
            model: ModelVariant::parse(&model)?,
            hf_repo: section.hf_repo,
        })
    }
}

impl InferenceArgs {
    fn validate(section: InferenceSection, model: &ModelVariant) -> Result<Self, ConfigError> {
        let args = Self {
            max_tokens: section.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            max_generated_tokens: section
                .max_generated_tokens
                .unwrap_or(DEFAULT_MAX_GENERATED_TOKENS),
            temperature: section.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            top_k: section.top_k.unwrap_or(DEFAULT_TOP_K),
            deterministic: section.deterministic.unwrap_or(false),
            multiturn: section.multiturn.unwrap_or(false),
        };

        let seq_len = model.size.seq_len();
        if args.max_tokens > seq_len {
            return Err(ConfigError::MaxTokensTooLarge {
                max_tokens: args.max_tokens,
                seq_len,
            });
        }
        if args.max_generated_tokens > args.max_tokens {
            return Err(ConfigError::GeneratedExceedsBudget {
                generated: args.max_generated_tokens,
                max_tokens: args.max_tokens,
            });
        }
        if args.max_generated_tokens == 0 {
            return Err(ConfigError::OutOfRange(
                "max_generated_tokens must be > 0".to_string(),
            ));
        }
        if !(args.temperature > 0.0) {
            return Err(ConfigError::OutOfRange(format!(
                "temperature must be > 0, got {}",
                args.temperature
            )));
        }
        if args.top_k == 0 {
            return Err(ConfigError::OutOfRange("top_k must be >= 1".to_string()));
        }

        Ok(args)
    }
}

impl AppArgs {
    fn validate(section: AppSection) -> Result<Self, ConfigError> {
        let args = Self {
            num_threads: section.num_threads.unwrap_or_else(default_num_threads),
            verbosity: section.verbosity.unwrap_or(DEFAULT_VERBOSITY),
        };
        if args.num_threads == 0 {
            return Err(ConfigError::OutOfRange("num_threads must be >= 1".to_string()));
        }
        if args.verbosity > 2 {
            return Err(ConfigError::OutOfRange(format!(
                "verbosity must be 0, 1 or 2, got {}",
                args.verbosity
            )));
        }
        Ok(args)
    }
}

fn load_config_file(path: &Path) -> Result<ConfigFile, ConfigError> {
    let file_err = |detail: String| ConfigError::File {
        path: path.display().to_string(),
        detail,
    };
    let raw = fs::read_to_string(path).map_err(|e| file_err(e.to_string()))?;
    toml::from_str(&raw).map_err(|e| file_err(e.to_string()))
}

fn config_row(out: &mut dyn Write, label: &str, value: impl fmt::Display) -> io::Result<()> {
    writeln!(out, "{:<30}: {}", label, value)
}

pub fn hardware_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

pub fn default_num_threads() -> usize {
    hardware_concurrency()
        .saturating_sub(2)
        .clamp(1, MAX_DEFAULT_THREADS)
}
