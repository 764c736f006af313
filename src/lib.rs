//! A small proof checker. Theorems are sequences of steps, each justified by
//! instantiating an axiom or an already verified theorem.

pub mod config;
pub mod elab;
pub mod kernel;
pub mod lex;
pub mod parse;
pub mod system;

pub use config::Config;
pub use system::{list_systems, System, VerifiedSet, VerifyAllReport};
