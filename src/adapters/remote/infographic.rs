//! Renderer backed by an infographic HTML service and a headless Chromium.
//!
//! The service turns the image prompt into a self-contained HTML document,
//! which is kept next to the raster and screenshotted at 1920x1080.

use crate::error::PortError;
use crate::ports::renderer::RendererPort;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command as TokioCommand;
use tracing::{debug, error, instrument};

pub const DEFAULT_INFOGRAPHIC_API_URL: &str = "https://dev.slidexy.net/api/infographic";
const VIEWPORT: &str = "1920,1080";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InfographicRequest<'a> {
    prompt: &'a str,
    use_references: bool,
}

#[derive(Debug, Deserialize)]
struct InfographicResponse {
    #[serde(default)]
    success: bool,
    infographic: Option<Infographic>,
}

#[derive(Debug, Deserialize)]
struct Infographic {
    html: String,
}

#[derive(Debug, Clone)]
pub struct InfographicRenderer {
    client: Client,
    api_url: String,
    chromium: String,
}

impl InfographicRenderer {
    pub fn new(api_url: impl Into<String>, chromium: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_url: api_url.into(),
            chromium: chromium.into(),
        }
    }

    async fn fetch_html(&self, image_prompt: &str) -> Result<String, PortError> {
        let response = self
            .client
            .post(&self.api_url)
            .json(&InfographicRequest {
                prompt: image_prompt,
                use_references: true,
            })
            .send()
            .await
            .map_err(|e| {
                error!(error = ?e, "Failed to send request to infographic API");
                format!("infographic request failed: {}", e)
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, "Infographic API returned error");
            return Err(format!("infographic API returned {}", status).into());
        }

        let body: InfographicResponse = response
            .json()
            .await
            .map_err(|e| format!("unexpected infographic response: {}", e))?;
        match body.infographic {
            Some(infographic) if body.success && !infographic.html.trim().is_empty() => {
                Ok(infographic.html)
            }
            _ => Err("infographic API reported no infographic".into()),
        }
    }

    async fn screenshot(&self, source: &Path, output: &Path) -> Result<(), PortError> {
        let source = tokio::fs::canonicalize(source).await?;
        let output_arg = format!("--screenshot={}", output.display());
        let result = TokioCommand::new(&self.chromium)
            .arg("--headless")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--hide-scrollbars")
            .arg(format!("--window-size={}", VIEWPORT))
            .arg(output_arg)
            .arg(format!("file://{}", source.display()))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| format!("could not run `{}`: {}", self.chromium, e))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(format!(
                "chromium exited with {:?}: {}",
                result.status.code(),
                stderr.trim()
            )
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl RendererPort for InfographicRenderer {
    #[instrument(skip(self, image_prompt), fields(output = %output.display()))]
    async fn render(
        &self,
        image_prompt: &str,
        source: &Path,
        output: &Path,
    ) -> Result<(), PortError> {
        let html = self.fetch_html(image_prompt).await?;
        tokio::fs::write(source, html).await?;
        debug!(source = %source.display(), "saved infographic html");

        self.screenshot(source, output).await?;
        match tokio::fs::metadata(output).await {
            Ok(meta) if meta.len() > 0 => Ok(()),
            _ => Err(format!("renderer produced no image at `{}`", output.display()).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_uses_camel_case() {
        let json = serde_json::to_value(InfographicRequest {
            prompt: "p",
            use_references: true,
        })
        .unwrap();
        assert_eq!(json["useReferences"], true);
    }

    #[test]
    fn response_without_infographic_is_tolerated() {
        let body: InfographicResponse = serde_json::from_str(r#"{"success": false}"#).unwrap();
        assert!(!body.success);
        assert!(body.infographic.is_none());
    }
}
