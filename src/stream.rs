use std::io::Write;

use crate::engine::{TextTokenizer, TokenDecoder};
use crate::errors::SessionError;
use crate::generation::{StreamEvent, TokenSink};
use crate::rng::RngController;
use crate::session::{Session, TurnState};

/// Decides, per token, whether generation goes on.
pub type ContinuePolicy<'a> = &'a dyn Fn(&StreamEvent) -> bool;

pub fn always_continue(_event: &StreamEvent) -> bool {
    true
}

/// Per-token callback for one turn: advances the session counters and
/// writes decoded response text as soon as it arrives.
pub struct StreamSink<'s> {
    session: &'s mut Session,
    decoder: Box<dyn TokenDecoder + 's>,
    out: &'s mut dyn Write,
    progress: &'s mut dyn Write,
    eos_token_id: u32,
    verbosity: u8,
    policy: ContinuePolicy<'s>,
    state: Option<&'s mut TurnState>,
    /// Set at the first response token, cleared by the first text chunk.
    trim_pending: bool,
}

impl<'s> StreamSink<'s> {
    pub fn new(
        session: &'s mut Session,
        tokenizer: &'s dyn TextTokenizer,
        out: &'s mut dyn Write,
        progress: &'s mut dyn Write,
        eos_token_id: u32,
        verbosity: u8,
    ) -> Self {
        Self {
            session,
            decoder: tokenizer.stream_decoder(),
            out,
            progress,
            eos_token_id,
            verbosity,
            policy: &always_continue,
            state: None,
            trim_pending: false,
        }
    }

    /// Mirror the turn phase into `state` as tokens arrive.
    pub fn with_state(mut self, state: &'s mut TurnState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn with_policy(mut self, policy: ContinuePolicy<'s>) -> Self {
        self.policy = policy;
        self
    }

    fn end_of_sequence(&mut self, rng: &mut RngController) -> Result<(), SessionError> {
        if !self.session.multiturn {
            self.session.reset_context();
            if self.session.deterministic {
                rng.reseed_fixed();
            }
        }
        if self.verbosity >= 2 {
            writeln!(self.out, "\n[ End ]")?;
            self.out.flush()?;
        }
        Ok(())
    }

    fn response_text(&mut self, token: u32) -> Result<(), SessionError> {
        if self.session.is_first_response_token() {
            self.trim_pending = true;
            if self.verbosity >= 1 {
                write!(self.out, "\n\n")?;
            }
        }
        let mut text = match self.decoder.step(token)? {
            Some(text) => text,
            None => return Ok(()),
        };
        if self.trim_pending && !text.is_empty() {
            self.trim_pending = false;
            text = text.trim_start_matches([' ', '\t', '\n']).to_string();
        }
        write!(self.out, "{}", text)?;
        self.out.flush()?;
        Ok(())
    }
}

impl TokenSink for StreamSink<'_> {
    fn on_token(
        &mut self,
        event: StreamEvent,
        rng: &mut RngController,
    ) -> Result<bool, SessionError> {
        self.session.advance();
        if let Some(state) = self.state.as_deref_mut() {
            *state = self.session.phase();
        }

        if self.session.in_prefill() {
            write!(self.progress, ".")?;
            self.progress.flush()?;
        } else if event.token == self.eos_token_id {
            self.end_of_sequence(rng)?;
        } else {
            self.response_text(event.token)?;
        }

        Ok((self.policy)(&event))
    }
}
