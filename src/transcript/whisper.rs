use serde_json::Value;

use super::{
    array_field, str_field, time_range, NormalizationError, SimpleTranscript, SimpleUtterance,
    SimpleWord, TranscriptNormalizer,
};
use crate::provider::{ProviderKind, ProviderTranscript};

/// Normalizes OpenAI-compatible `verbose_json` transcriptions. Segments play
/// the role of utterances.
#[derive(Debug, Clone, Copy, Default)]
pub struct WhisperNormalizer;

impl TranscriptNormalizer for WhisperNormalizer {
    fn provider(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    fn normalize(
        &self,
        transcript: &ProviderTranscript,
    ) -> Result<Option<SimpleTranscript>, NormalizationError> {
        self.check_provider(transcript)?;
        let body = &transcript.body;

        let segments = body
            .get("segments")
            .and_then(Value::as_array)
            .ok_or(NormalizationError::MissingSegments {
                provider: ProviderKind::OpenAi,
            })?;

        // word granularity is reported at the top level, some servers nest it per segment
        let top_level = array_field(body, "words");
        let words: Vec<SimpleWord> = if top_level.is_empty() {
            segments
                .iter()
                .flat_map(|s| array_field(s, "words"))
                .map(to_word)
                .collect()
        } else {
            top_level.iter().map(to_word).collect()
        };

        let utterances = segments
            .iter()
            .map(|s| {
                let (start, end) = time_range(s);
                SimpleUtterance {
                    start,
                    end,
                    transcript: str_field(s, "text").trim().to_string(),
                }
            })
            .collect();

        Ok(SimpleTranscript {
            transcript_text: str_field(body, "text").trim().to_string(),
            words,
            utterances,
        }
        .non_empty())
    }
}

fn to_word(value: &Value) -> SimpleWord {
    let (start, end) = time_range(value);
    SimpleWord {
        word: str_field(value, "word").trim().to_string(),
        start,
        end,
    }
}
