//! Question detection for Hush.
//!
//! Filters conversational filler and classifies transcribed speech fragments
//! as questions or statements using an ordered cascade of token heuristics.

pub mod classifier;
pub mod noise;

pub use classifier::{QuestionClassifier, Tier};
pub use noise::NoiseFilter;
