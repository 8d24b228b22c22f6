//! Text-to-speech for AI speeches.
//!
//! A speech is split at sentence punctuation and each piece is synthesised
//! in order. Audio goes out as base64 chunks numbered from zero. Streaming
//! runs on its own task and never holds up the game; failures are logged
//! and the remaining chunks are still attempted.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::TtsSection;
use crate::errors::TtsError;
use crate::game::PlayerId;

const SEPARATORS: &[char] = &[
    '。', '！', '？', '；', '：', ',', '.', '!', '?', ';', ':', '\n',
];

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, player_id: PlayerId, text: &str) -> Result<Vec<u8>, TtsError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AudioChunk {
    pub player_id: PlayerId,
    pub sequence: u32,
    pub audio_base64: String,
}

/// Split at sentence punctuation, keeping the punctuation with its
/// sentence. Pieces of a single character are dropped.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for ch in text.trim().chars() {
        current.push(ch);
        if SEPARATORS.contains(&ch) {
            let piece = current.trim();
            if !piece.is_empty() {
                chunks.push(piece.to_string());
            }
            current.clear();
        }
    }
    let rest = current.trim();
    if !rest.is_empty() {
        chunks.push(rest.to_string());
    }

    chunks.retain(|chunk| chunk.chars().count() > 1);
    chunks
}

/// OpenAI-style `audio/speech` endpoint.
pub struct HttpSynthesizer {
    client: reqwest::Client,
    api_url: String,
    model: String,
    api_key: Option<String>,
    voices: HashMap<PlayerId, String>,
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
    response_format: &'static str,
}

impl HttpSynthesizer {
    pub fn new(
        section: &TtsSection,
        voices: HashMap<PlayerId, String>,
        api_key: Option<String>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to build TTS HTTP client")?;
        Ok(Self {
            client,
            api_url: section.api_url.clone(),
            model: section.model.clone(),
            api_key,
            voices,
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for HttpSynthesizer {
    async fn synthesize(&self, player_id: PlayerId, text: &str) -> Result<Vec<u8>, TtsError> {
        let voice = self
            .voices
            .get(&player_id)
            .ok_or(TtsError::NoVoice(player_id))?;

        let mut request = self.client.post(&self.api_url).json(&SpeechRequest {
            model: &self.model,
            voice,
            input: text,
            response_format: "mp3",
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(TtsError::Status(response.status().as_u16()));
        }
        Ok(response.bytes().await?.to_vec())
    }
}

/// Synthesise `text` in the background and hand each chunk to `sink`.
pub fn spawn_stream<F>(
    synth: Arc<dyn SpeechSynthesizer>,
    player_id: PlayerId,
    text: String,
    token: CancellationToken,
    sink: F,
) -> JoinHandle<()>
where
    F: Fn(AudioChunk) + Send + 'static,
{
    tokio::spawn(async move {
        let pieces = split_sentences(&text);
        debug!(player = player_id, chunks = pieces.len(), "Streaming speech audio");

        let mut sequence = 0;
        for piece in pieces {
            let audio = tokio::select! {
                _ = token.cancelled() => return,
                audio = synth.synthesize(player_id, &piece) => audio,
            };
            match audio {
                Ok(bytes) if !bytes.is_empty() => {
                    sink(AudioChunk {
                        player_id,
                        sequence,
                        audio_base64: STANDARD.encode(bytes),
                    });
                    sequence += 1;
                }
                Ok(_) => debug!(player = player_id, "Empty audio chunk skipped"),
                Err(TtsError::NoVoice(id)) => {
                    warn!(player = id, "No voice configured, skipping speech audio");
                    return;
                }
                Err(err) => warn!(player = player_id, error = %err, "Speech synthesis failed"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn splits_at_punctuation_and_keeps_it() {
        assert_eq!(
            split_sentences("I suspect Ash. Why? Because he hesitated; clearly"),
            vec!["I suspect Ash.", "Why?", "Because he hesitated;", "clearly"]
        );
    }

    #[test]
    fn splits_full_width_punctuation() {
        assert_eq!(split_sentences("我是好人。你呢？"), vec!["我是好人。", "你呢？"]);
    }

    #[test]
    fn drops_single_character_pieces() {
        assert_eq!(split_sentences("Yes. . ! ok"), vec!["Yes.", "ok"]);
        assert!(split_sentences("   ").is_empty());
    }

    struct EchoSynth {
        fail_on: Option<String>,
    }

    #[async_trait]
    impl SpeechSynthesizer for EchoSynth {
        async fn synthesize(&self, player_id: PlayerId, text: &str) -> Result<Vec<u8>, TtsError> {
            if self.fail_on.as_deref() == Some(text) {
                return Err(TtsError::Status(500));
            }
            if player_id == 99 {
                return Err(TtsError::NoVoice(player_id));
            }
            Ok(text.as_bytes().to_vec())
        }
    }

    fn collect(
        synth: EchoSynth,
        player_id: PlayerId,
        text: &str,
    ) -> (Arc<Mutex<Vec<AudioChunk>>>, JoinHandle<()>) {
        let chunks = Arc::new(Mutex::new(Vec::new()));
        let sink = chunks.clone();
        let handle = spawn_stream(
            Arc::new(synth),
            player_id,
            text.to_string(),
            CancellationToken::new(),
            move |chunk| sink.lock().unwrap().push(chunk),
        );
        (chunks, handle)
    }

    #[tokio::test]
    async fn chunks_are_sequenced_and_encoded() {
        let (chunks, handle) = collect(EchoSynth { fail_on: None }, 3, "Hello there. Bye!");
        handle.await.unwrap();

        let chunks = chunks.lock().unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].sequence, 0);
        assert_eq!(chunks[1].sequence, 1);
        assert_eq!(STANDARD.decode(&chunks[0].audio_base64).unwrap(), b"Hello there.");
    }

    #[tokio::test]
    async fn failed_chunk_does_not_stop_the_rest() {
        let (chunks, handle) = collect(
            EchoSynth {
                fail_on: Some("Two.".into()),
            },
            3,
            "One. Two. Three.",
        );
        handle.await.unwrap();

        let chunks = chunks.lock().unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].sequence, 1);
        assert_eq!(STANDARD.decode(&chunks[1].audio_base64).unwrap(), b"Three.");
    }

    #[tokio::test]
    async fn missing_voice_stops_quietly() {
        let (chunks, handle) = collect(EchoSynth { fail_on: None }, 99, "One. Two.");
        handle.await.unwrap();
        assert!(chunks.lock().unwrap().is_empty());
    }
}
