#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    AwaitingInput,
    Prefilling,
    Streaming,
    TurnComplete,
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    QuitCommand,
    EndOfInput,
    BudgetExhausted,
}

/// Position bookkeeping for the whole process. Only the session loop and the
/// stream sink it lends it to ever write here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Tokens across all turns since the last reset.
    pub abs_pos: usize,
    /// Tokens seen in the current turn.
    pub current_pos: usize,
    /// Prompt length of the current turn, fixed before generation starts.
    pub prompt_size: usize,
    pub multiturn: bool,
    pub deterministic: bool,
}

impl Session {
    pub fn new(multiturn: bool, deterministic: bool) -> Self {
        Session {
            abs_pos: 0,
            current_pos: 0,
            prompt_size: 0,
            multiturn,
            deterministic,
        }
    }

    pub fn begin_turn(&mut self, prompt_size: usize) {
        self.current_pos = 0;
        self.prompt_size = prompt_size;
    }

    pub fn advance(&mut self) {
        self.abs_pos += 1;
        self.current_pos += 1;
    }

    pub fn reset_context(&mut self) {
        self.abs_pos = 0;
    }

    pub fn in_prefill(&self) -> bool {
        self.current_pos < self.prompt_size
    }

    pub fn is_first_response_token(&self) -> bool {
        self.current_pos == self.prompt_size + 1
    }

    pub fn phase(&self) -> TurnState {
        if self.current_pos <= self.prompt_size {
            TurnState::Prefilling
        } else {
            TurnState::Streaming
        }
    }

    pub fn budget_exhausted(&self, max_tokens: usize) -> bool {
        self.abs_pos >= max_tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_follows_prompt_boundary() {
        let mut s = Session::new(false, false);
        s.begin_turn(3);
        assert_eq!(s.phase(), TurnState::Prefilling);

        for _ in 0..3 {
            s.advance();
        }
        assert_eq!(s.phase(), TurnState::Prefilling);
        assert!(!s.in_prefill());

        s.advance();
        assert_eq!(s.phase(), TurnState::Streaming);
        assert!(s.is_first_response_token());
        assert_eq!(s.abs_pos, 4);
    }

    #[test]
    fn begin_turn_keeps_absolute_position() {
        let mut s = Session::new(true, false);
        s.begin_turn(2);
        s.advance();
        s.advance();
        s.begin_turn(5);
        assert_eq!(s.current_pos, 0);
        assert_eq!(s.abs_pos, 2);
        assert!(!s.budget_exhausted(3));
        s.advance();
        assert!(s.budget_exhausted(3));
    }
}
