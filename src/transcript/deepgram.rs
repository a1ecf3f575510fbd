use serde_json::Value;

use super::{
    array_field, str_field, time_range, NormalizationError, SimpleTranscript, SimpleUtterance,
    SimpleWord, TranscriptNormalizer,
};
use crate::provider::{ProviderKind, ProviderTranscript};

/// Normalizes `/v1/listen` responses requested with `utterances=true`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeepgramNormalizer;

impl TranscriptNormalizer for DeepgramNormalizer {
    fn provider(&self) -> ProviderKind {
        ProviderKind::Deepgram
    }

    fn normalize(
        &self,
        transcript: &ProviderTranscript,
    ) -> Result<Option<SimpleTranscript>, NormalizationError> {
        self.check_provider(transcript)?;

        let results = transcript
            .body
            .get("results")
            .filter(|r| r.is_object())
            .ok_or(NormalizationError::MissingResults {
                provider: ProviderKind::Deepgram,
            })?;

        // an empty list is fine, a missing one is not
        let utterances = results
            .get("utterances")
            .and_then(Value::as_array)
            .ok_or(NormalizationError::MissingUtterances {
                provider: ProviderKind::Deepgram,
            })?;

        // only the first channel is used
        let transcript_text = results
            .get("channels")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("alternatives"))
            .and_then(|a| a.get(0))
            .map(|alt| str_field(alt, "transcript"))
            .unwrap_or_default();

        let words = utterances
            .iter()
            .flat_map(|u| array_field(u, "words"))
            .map(|w| {
                let (start, end) = time_range(w);
                SimpleWord {
                    word: display_word(w),
                    start,
                    end,
                }
            })
            .collect();

        let utterances = utterances
            .iter()
            .map(|u| {
                let (start, end) = time_range(u);
                SimpleUtterance {
                    start,
                    end,
                    transcript: str_field(u, "transcript"),
                }
            })
            .collect();

        Ok(SimpleTranscript {
            transcript_text,
            words,
            utterances,
        }
        .non_empty())
    }
}

fn display_word(word: &Value) -> String {
    let punctuated = str_field(word, "punctuated_word");
    if punctuated.is_empty() {
        str_field(word, "word")
    } else {
        punctuated
    }
}
