use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use tracing::debug;

pub const DETERMINISTIC_SEED: u64 = 42;

/// The session's only random source. Sampling draws from it; the stream sink
/// may reseed it at end-of-sequence.
pub struct RngController {
    rng: StdRng,
}

impl RngController {
    pub fn new(deterministic: bool) -> Self {
        let rng = if deterministic {
            StdRng::seed_from_u64(DETERMINISTIC_SEED)
        } else {
            StdRng::seed_from_u64(entropy_seed())
        };
        Self { rng }
    }

    /// Back to the fixed seed. Never called for entropy-seeded sessions.
    pub fn reseed_fixed(&mut self) {
        debug!("reseeding rng with {}", DETERMINISTIC_SEED);
        self.rng = StdRng::seed_from_u64(DETERMINISTIC_SEED);
    }

    pub fn rng_mut(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    pub fn next_u32(&mut self) -> u32 {
        self.rng.next_u32()
    }
}

fn entropy_seed() -> u64 {
    let mut buf = [0u8; 8];
    match getrandom::getrandom(&mut buf) {
        Ok(()) => u64::from_le_bytes(buf),
        Err(e) => {
            tracing::warn!("OS entropy unavailable ({}), falling back to clock seed", e);
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or(DETERMINISTIC_SEED)
        }
    }
}
