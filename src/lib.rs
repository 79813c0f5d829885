pub mod backend;
pub mod config;
pub mod engine;
pub mod errors;
pub mod generation;
pub mod prompting;
pub mod protocol;
pub mod repl;
pub mod rng;
pub mod session;
pub mod stream;
pub mod threading;

#[cfg(test)]
mod testing;
