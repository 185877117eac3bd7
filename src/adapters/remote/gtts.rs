//! Speech via the Google Translate TTS endpoint.
//!
//! The endpoint accepts at most 100 characters per request, so the text is
//! split on word boundaries and the returned MP3 frames are appended in order.

use crate::domain::jobs::SpeechOptions;
use crate::error::PortError;
use crate::ports::speech::SpeechPort;
use async_trait::async_trait;
use reqwest::Client;
use std::path::Path;
use tracing::{debug, error, instrument};

const MAX_CHUNK_CHARS: usize = 100;
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko)";

#[derive(Debug, Clone)]
pub struct GttsSpeech {
    client: Client,
}

impl GttsSpeech {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    async fn fetch_chunk(
        &self,
        chunk: &str,
        index: usize,
        total: usize,
        options: &SpeechOptions,
    ) -> Result<Vec<u8>, PortError> {
        let url = format!("https://translate.google.{}/translate_tts", options.tld);
        let speed = if options.slow { "0.3" } else { "1" };
        let (idx, total, textlen) = (
            index.to_string(),
            total.to_string(),
            chunk.chars().count().to_string(),
        );
        let response = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .query(&[
                ("ie", "UTF-8"),
                ("client", "tw-ob"),
                ("tl", options.lang.as_str()),
                ("q", chunk),
                ("ttsspeed", speed),
                ("idx", idx.as_str()),
                ("total", total.as_str()),
                ("textlen", textlen.as_str()),
            ])
            .send()
            .await
            .map_err(|e| {
                error!(error = ?e, "Failed to send request to TTS endpoint");
                format!("speech request failed: {}", e)
            })?;

        if !response.status().is_success() {
            let status = response.status();
            error!(status = %status, chunk = index, "TTS endpoint returned error");
            return Err(format!("speech endpoint returned {}", status).into());
        }
        Ok(response.bytes().await?.to_vec())
    }
}

impl Default for GttsSpeech {
    fn default() -> Self {
        Self::new()
    }
}

/// Split `text` into pieces of at most `max` characters, preferring to break
/// after sentence punctuation, then on spaces. Words longer than `max` are cut.
pub fn chunk_text(text: &str, max: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let mut word = word.to_string();
        while word.chars().count() > max {
            flush(&mut chunks, &mut current);
            let head: String = word.chars().take(max).collect();
            word = word.chars().skip(max).collect();
            chunks.push(head);
        }
        let needed = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        if needed > max {
            flush(&mut chunks, &mut current);
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&word);
        if word.ends_with(['.', '!', '?', ';']) {
            flush(&mut chunks, &mut current);
        }
    }
    flush(&mut chunks, &mut current);
    chunks
}

fn flush(chunks: &mut Vec<String>, current: &mut String) {
    if !current.is_empty() {
        chunks.push(std::mem::take(current));
    }
}

#[async_trait]
impl SpeechPort for GttsSpeech {
    #[instrument(skip(self, text, options), fields(lang = %options.lang, output = %output.display()))]
    async fn synthesize(
        &self,
        text: &str,
        options: &SpeechOptions,
        output: &Path,
    ) -> Result<(), PortError> {
        let chunks = chunk_text(text, MAX_CHUNK_CHARS);
        if chunks.is_empty() {
            return Err("no text to synthesize".into());
        }

        let mut audio = Vec::new();
        for (index, chunk) in chunks.iter().enumerate() {
            audio.extend(self.fetch_chunk(chunk, index, chunks.len(), options).await?);
        }
        if audio.is_empty() {
            return Err("speech endpoint returned no audio".into());
        }
        debug!(chunks = chunks.len(), bytes = audio.len(), "synthesized speech");
        tokio::fs::write(output, audio).await?;
        Ok(())
    }
}
