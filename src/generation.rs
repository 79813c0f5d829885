//! The seam between the session loop and whatever produces tokens.
//!
//! A [`Generator`] runs one turn synchronously. For every token it sees,
//! prompt tokens included, it calls the request's [`TokenSink`] in order,
//! lending it the session RNG for the duration of the call.

use crate::config::InferenceArgs;
use crate::errors::SessionError;
use crate::rng::RngController;
use crate::threading::ThreadPools;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamEvent {
    pub token: u32,
    /// Probability of the sampled token; 0.0 while echoing the prompt.
    pub score: f32,
}

pub trait TokenSink {
    /// `Ok(false)` asks the generator to stop as if it had produced EOS.
    fn on_token(&mut self, event: StreamEvent, rng: &mut RngController)
        -> Result<bool, SessionError>;
}

pub type AcceptToken<'a> = &'a (dyn Fn(u32) -> bool + Sync);

pub fn accept_all(_token: u32) -> bool {
    true
}

pub struct GenerationRequest<'a> {
    pub prompt: &'a [u32],
    /// Absolute position of `prompt[0]` in the model context.
    pub start_pos: usize,
    pub pools: &'a ThreadPools,
    pub settings: &'a InferenceArgs,
    /// Sampling never picks a token this rejects.
    pub accept_token: AcceptToken<'a>,
    pub rng: &'a mut RngController,
    pub stream: &'a mut dyn TokenSink,
}

impl GenerationRequest<'_> {
    pub fn emit(&mut self, token: u32, score: f32) -> Result<bool, SessionError> {
        self.stream.on_token(StreamEvent { token, score }, self.rng)
    }
}

pub trait Generator {
    fn generate(&mut self, request: GenerationRequest<'_>) -> Result<(), SessionError>;
}
