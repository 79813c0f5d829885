use std::io::{BufRead, Write};
use std::time::Instant;

use tracing::{debug, warn};

use crate::config::InferenceArgs;
use crate::engine::TextTokenizer;
use crate::errors::Result;
use crate::generation::{accept_all, AcceptToken, GenerationRequest, Generator};
use crate::prompting::PromptBuilder;
use crate::protocol::ConsoleCommand;
use crate::rng::RngController;
use crate::session::{Session, TerminationReason, TurnState};
use crate::stream::{always_continue, ContinuePolicy, StreamSink};
use crate::threading::ThreadPools;

/// Drives turns until the user quits, input ends or the token budget runs
/// out. One generation is in flight at a time, on the calling thread.
pub struct SessionLoop<'p, G, T> {
    generator: G,
    tokenizer: T,
    pools: &'p ThreadPools,
    settings: &'p InferenceArgs,
    builder: PromptBuilder,
    eos_token_id: u32,
    verbosity: u8,
    accept_token: AcceptToken<'p>,
    policy: ContinuePolicy<'p>,
    session: Session,
    rng: RngController,
    state: TurnState,
}

impl<'p, G: Generator, T: TextTokenizer> SessionLoop<'p, G, T> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        generator: G,
        tokenizer: T,
        pools: &'p ThreadPools,
        settings: &'p InferenceArgs,
        builder: PromptBuilder,
        eos_token_id: u32,
        verbosity: u8,
    ) -> Self {
        Self {
            generator,
            tokenizer,
            pools,
            settings,
            builder,
            eos_token_id,
            verbosity,
            accept_token: &accept_all,
            policy: &always_continue,
            session: Session::new(settings.multiturn, settings.deterministic),
            rng: RngController::new(settings.deterministic),
            state: TurnState::AwaitingInput,
        }
    }

    pub fn with_accept_token(mut self, accept_token: AcceptToken<'p>) -> Self {
        self.accept_token = accept_token;
        self
    }

    pub fn with_continue_policy(mut self, policy: ContinuePolicy<'p>) -> Self {
        self.policy = policy;
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    pub fn run<R, W, E>(
        &mut self,
        mut input: R,
        out: &mut W,
        err: &mut E,
    ) -> Result<TerminationReason>
    where
        R: BufRead,
        W: Write,
        E: Write,
    {
        loop {
            if self.session.budget_exhausted(self.settings.max_tokens) {
                self.state = TurnState::Terminated;
                writeln!(
                    out,
                    "max_tokens ({}) exceeded. Use a larger value if desired using the --max_tokens command line flag.",
                    self.settings.max_tokens
                )?;
                out.flush()?;
                return Ok(TerminationReason::BudgetExhausted);
            }

            self.state = TurnState::AwaitingInput;
            if self.verbosity >= 1 {
                write!(out, "> ")?;
                out.flush()?;
            }

            let mut line = String::new();
            let read = match input.read_line(&mut line) {
                Ok(0) => None,
                Ok(_) => Some(line.as_str()),
                Err(e) => {
                    warn!("console read failed: {}", e);
                    None
                }
            };
            let end_of_input = read.is_none();

            match ConsoleCommand::parse(read) {
                ConsoleCommand::Quit => {
                    self.state = TurnState::Terminated;
                    return Ok(if end_of_input {
                        TerminationReason::EndOfInput
                    } else {
                        TerminationReason::QuitCommand
                    });
                }
                ConsoleCommand::ResetContext => {
                    debug!("context reset at abs_pos={}", self.session.abs_pos);
                    self.session.reset_context();
                }
                ConsoleCommand::Prompt(text) => self.run_turn(&text, out, err)?,
            }
        }
    }

    fn run_turn<W: Write, E: Write>(
        &mut self,
        text: &str,
        out: &mut W,
        err: &mut E,
    ) -> Result<()> {
        self.state = TurnState::Prefilling;
        let start_pos = self.session.abs_pos;
        let prompt = self
            .builder
            .build(text, start_pos, |t| self.tokenizer.encode(t))?;

        if prompt.tokens.is_empty() {
            debug!("empty prompt, nothing to generate");
            self.state = TurnState::TurnComplete;
            return Ok(());
        }
        debug!("prompt at abs_pos={}: {:?}", start_pos, prompt.templated);

        let remaining = self.settings.max_tokens.saturating_sub(start_pos);
        if prompt.tokens.len() > remaining {
            warn!(
                "prompt of {} tokens exceeds the {} remaining, skipped",
                prompt.tokens.len(),
                remaining
            );
            writeln!(
                err,
                "\n[ Prompt too long: {} tokens, {} of max_tokens ({}) left. Shorten it or use %C to clear the context. ]",
                prompt.tokens.len(),
                remaining,
                self.settings.max_tokens
            )?;
            err.flush()?;
            self.state = TurnState::TurnComplete;
            return Ok(());
        }

        self.session.begin_turn(prompt.tokens.len());
        write!(err, "\n[ Reading prompt ] ")?;
        err.flush()?;

        let started = Instant::now();
        {
            let mut sink = StreamSink::new(
                &mut self.session,
                &self.tokenizer,
                out,
                err,
                self.eos_token_id,
                self.verbosity,
            )
            .with_policy(self.policy)
            .with_state(&mut self.state);

            self.generator.generate(GenerationRequest {
                prompt: &prompt.tokens,
                start_pos,
                pools: self.pools,
                settings: self.settings,
                accept_token: self.accept_token,
                rng: &mut self.rng,
                stream: &mut sink,
            })?;
        }
        self.state = TurnState::TurnComplete;

        let elapsed = started.elapsed().as_secs_f64();
        let tok_sec = if elapsed > 0.0 {
            self.session.current_pos as f64 / elapsed
        } else {
            0.0
        };
        debug!(
            "turn done: {} tokens in {:.3}s, abs_pos={}",
            self.session.current_pos, elapsed, self.session.abs_pos
        );
        if self.verbosity >= 2 {
            writeln!(
                out,
                "{} tokens ({} total tokens)",
                self.session.current_pos, self.session.abs_pos
            )?;
            writeln!(out, "{:.2} tokens / sec", tok_sec)?;
        }
        write!(out, "\n\n")?;
        out.flush()?;
        Ok(())
    }
}
