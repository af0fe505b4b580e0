//! Clients for external collaborators and the work built on them

pub mod converter;
pub mod illustrator;
pub mod image_generator;
pub mod speech;

pub use converter::{DocumentConverter, PandocConverter};
pub use image_generator::{HttpImageGenerator, ImageGenerator};
pub use speech::{HttpSpeechSynthesizer, SpeechSynthesizer};
