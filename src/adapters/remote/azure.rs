//! Speech via the Azure Cognitive Services text-to-speech REST API.

use crate::domain::jobs::SpeechOptions;
use crate::error::PortError;
use crate::ports::speech::SpeechPort;
use async_trait::async_trait;
use reqwest::Client;
use std::path::Path;
use tracing::{debug, error, instrument};

const OUTPUT_FORMAT: &str = "audio-24khz-48kbitrate-mono-mp3";
const USER_AGENT: &str = "explainer";

/// Azure neural voices; `SpeechOptions::voice` picks the voice.
#[derive(Debug, Clone)]
pub struct AzureSpeech {
    client: Client,
    key: String,
    region: String,
}

impl AzureSpeech {
    pub fn new(key: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            key: key.into(),
            region: region.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "https://{}.tts.speech.microsoft.com/cognitiveservices/v1",
            self.region
        )
    }
}

/// Locale of a voice name such as `en-US-AriaNeural`, falling back to `lang`.
fn voice_locale<'a>(voice: &'a str, lang: &'a str) -> &'a str {
    let mut dashes = voice.match_indices('-').map(|(i, _)| i);
    match (dashes.next(), dashes.next()) {
        (Some(_), Some(end)) => &voice[..end],
        _ => lang,
    }
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

pub fn ssml(text: &str, options: &SpeechOptions) -> String {
    let voice = escape_xml(&options.voice);
    let locale = escape_xml(voice_locale(&options.voice, &options.lang));
    let mut spoken = escape_xml(text.trim());
    if options.slow {
        spoken = format!("<prosody rate='-30%'>{}</prosody>", spoken);
    }
    format!(
        "<speak version='1.0' xmlns='http://www.w3.org/2001/10/synthesis' xml:lang='{}'><voice name='{}'>{}</voice></speak>",
        locale, voice, spoken
    )
}

#[async_trait]
impl SpeechPort for AzureSpeech {
    #[instrument(skip(self, text, options), fields(voice = %options.voice, output = %output.display()))]
    async fn synthesize(
        &self,
        text: &str,
        options: &SpeechOptions,
        output: &Path,
    ) -> Result<(), PortError> {
        if self.key.is_empty() || self.region.is_empty() {
            return Err("AZURE_SPEECH_KEY or AZURE_SPEECH_REGION is not set".into());
        }
        if text.trim().is_empty() {
            return Err("no text to synthesize".into());
        }

        let response = self
            .client
            .post(self.endpoint())
            .header("Ocp-Apim-Subscription-Key", &self.key)
            .header(reqwest::header::CONTENT_TYPE, "application/ssml+xml")
            .header("X-Microsoft-OutputFormat", OUTPUT_FORMAT)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .body(ssml(text, options))
            .send()
            .await
            .map_err(|e| {
                error!(error = ?e, "Failed to send request to Azure Speech");
                format!("speech request failed: {}", e)
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, "Azure Speech returned error");
            return Err(format!("speech endpoint returned {}: {}", status, body).into());
        }

        let audio = response.bytes().await?;
        if audio.is_empty() {
            return Err("speech endpoint returned no audio".into());
        }
        debug!(bytes = audio.len(), "synthesized speech");
        tokio::fs::write(output, &audio).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ssml_names_voice_and_its_locale() {
        let options = SpeechOptions {
            voice: "de-DE-KatjaNeural".to_string(),
            ..SpeechOptions::default()
        };
        let body = ssml("  Hallo Welt ", &options);
        assert!(body.contains("xml:lang='de-DE'"));
        assert!(body.contains("<voice name='de-DE-KatjaNeural'>Hallo Welt</voice>"));
        assert!(!body.contains("prosody"));
    }

    #[test]
    fn ssml_escapes_markup_in_text() {
        let body = ssml("R&D <fast> \"quotes\" it's", &SpeechOptions::default());
        assert!(body.contains("R&amp;D &lt;fast&gt; &quot;quotes&quot; it&apos;s"));
        assert!(!body.contains("<fast>"));
    }

    #[test]
    fn voice_without_locale_falls_back_to_lang() {
        assert_eq!(voice_locale("Aria", "fr"), "fr");
        assert_eq!(voice_locale("en-GB-SoniaNeural", "en"), "en-GB");
    }

    #[test]
    fn slow_speech_lowers_rate() {
        let options = SpeechOptions {
            slow: true,
            ..SpeechOptions::default()
        };
        assert!(ssml("slow", &options).contains("<prosody rate='-30%'>slow</prosody>"));
    }

    #[tokio::test]
    async fn missing_credentials_fail_before_any_request() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("a.mp3");
        let err = AzureSpeech::new("", "westeurope")
            .synthesize("hello", &SpeechOptions::default(), &output)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("AZURE_SPEECH_KEY"));
        assert!(!output.exists());
    }
}
