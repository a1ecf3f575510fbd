pub mod deepgram;
pub mod whisper;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::provider::{ProviderKind, ProviderTranscript};

pub use deepgram::DeepgramNormalizer;
pub use whisper::WhisperNormalizer;

/// Provider-independent speech-to-text result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimpleTranscript {
    pub transcript_text: String,
    pub words: Vec<SimpleWord>,
    pub utterances: Vec<SimpleUtterance>,
}

impl SimpleTranscript {
    pub fn is_empty(&self) -> bool {
        self.transcript_text.trim().is_empty() && self.words.is_empty() && self.utterances.is_empty()
    }

    /// `None` when there is nothing to keep.
    pub fn non_empty(self) -> Option<Self> {
        if self.is_empty() {
            None
        } else {
            Some(self)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimpleWord {
    pub word: String,
    pub start: f64,
    pub end: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimpleUtterance {
    pub start: f64,
    pub end: f64,
    pub transcript: String,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum NormalizationError {
    #[error("{provider} response has no results")]
    MissingResults { provider: ProviderKind },

    #[error("{provider} response has no utterances")]
    MissingUtterances { provider: ProviderKind },

    #[error("{provider} response has no segments")]
    MissingSegments { provider: ProviderKind },

    #[error("cannot normalize {actual} response with the {expected} normalizer")]
    ProviderMismatch {
        expected: ProviderKind,
        actual: ProviderKind,
    },
}

/// Converts one provider's native STT response into a [`SimpleTranscript`].
///
/// `Ok(None)` is the "no speech detected" outcome and is not an error.
pub trait TranscriptNormalizer: Send + Sync {
    fn provider(&self) -> ProviderKind;

    fn normalize(
        &self,
        transcript: &ProviderTranscript,
    ) -> Result<Option<SimpleTranscript>, NormalizationError>;

    fn check_provider(&self, transcript: &ProviderTranscript) -> Result<(), NormalizationError> {
        if transcript.provider != self.provider() {
            return Err(NormalizationError::ProviderMismatch {
                expected: self.provider(),
                actual: transcript.provider,
            });
        }
        Ok(())
    }
}

pub fn normalizer_for(kind: ProviderKind) -> Box<dyn TranscriptNormalizer> {
    match kind {
        ProviderKind::Deepgram => Box::new(DeepgramNormalizer),
        ProviderKind::OpenAi => Box::new(WhisperNormalizer),
    }
}

// lenient accessors, anything missing or mistyped reads as empty
fn str_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn secs_field(value: &Value, key: &str) -> f64 {
    value.get(key).and_then(Value::as_f64).unwrap_or(0.0)
}

fn time_range(value: &Value) -> (f64, f64) {
    let start = secs_field(value, "start");
    let end = secs_field(value, "end");
    (start, end.max(start))
}

fn array_field<'a>(value: &'a Value, key: &str) -> &'a [Value] {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}
