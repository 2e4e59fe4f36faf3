mod client;
pub mod schema;

pub use client::{CapturedImage, FoodRecognizer, GeminiRecognizer, RecognitionFailed};

#[cfg(test)]
pub(crate) use client::scripted::ScriptedRecognizer;
