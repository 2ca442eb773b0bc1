//! Image generation side workflow
//!
//! Image creation does not go through the conversation socket. The prompt
//! is submitted with a `HEAD` request whose redirect `Location` carries the
//! job id; the result page is then polled until it has content:
//!
//! ```text
//! SUBMITTED --(Location has &id=...)--> POLLING --(content-length > 1)--> READY
//!     |                                    |
//!     +--(no job id)--> REJECTED           +--(max_polls reached)--> EXHAUSTED
//! ```
//!
//! REJECTED surfaces as [`RelayError::NotAuthenticated`], EXHAUSTED as
//! [`RelayError::PollExhausted`]. No partial result is ever returned.

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use reqwest::redirect::Policy;
use reqwest::Client;

use crate::config::{ImageConfig, UpstreamConfig};
use crate::error::{Result, RelayError};

const REFERER: &str = "https://www.bing.com/search?q=Bing+AI&showconv=1";

fn job_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"&id=([^&]+)$").expect("valid job id pattern"))
}

fn image_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"<img class="mimg"[^>]*?\ssrc="([^"]+)""#).expect("valid image pattern")
    })
}

/// One submitted image generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageJob {
    /// Prompt the images were requested for
    pub prompt: String,
    /// Id of the embedding iframe, echoed to the upstream
    pub iframe_id: String,
    /// Job id taken from the submit redirect
    pub result_id: String,
    /// Polls made so far
    pub attempts: u32,
}

/// Submits image prompts and polls for their results.
#[derive(Debug, Clone)]
pub struct ImageGenerator {
    client: Client,
    headers: Vec<(String, String)>,
    base_url: String,
    max_polls: u32,
    poll_interval: Duration,
}

impl ImageGenerator {
    /// Create a generator
    ///
    /// # Arguments
    ///
    /// * `config` - Polling limits and the image origin
    /// * `upstream` - Cookie and headers shared with the conversation
    ///
    /// # Errors
    ///
    /// Returns error if HTTP client initialization fails
    pub fn new(config: &ImageConfig, upstream: &UpstreamConfig) -> Result<Self> {
        // The submit step reads the redirect itself.
        let client = Client::builder()
            .redirect(Policy::none())
            .timeout(upstream.request_timeout())
            .user_agent(upstream.user_agent.as_str())
            .build()
            .map_err(|e| RelayError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            headers: upstream.header_pairs(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            max_polls: config.max_polls,
            poll_interval: config.poll_interval(),
        })
    }

    /// Generate images and render them as markdown
    ///
    /// # Returns
    ///
    /// Space-separated `![prompt](url)` references in document order
    ///
    /// # Errors
    ///
    /// [`RelayError::NotAuthenticated`] or [`RelayError::PollExhausted`]
    pub async fn generate(&self, prompt: &str, iframe_id: &str) -> Result<String> {
        let mut job = self.submit(prompt, iframe_id).await?;
        self.poll(&mut job).await
    }

    /// Submit a prompt and extract the job id from the redirect
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::NotAuthenticated`] when the redirect does not
    /// carry a job id (usually a missing or expired login cookie).
    pub async fn submit(&self, prompt: &str, iframe_id: &str) -> Result<ImageJob> {
        let url = format!("{}/images/create", self.base_url);
        let mut request = self
            .client
            .head(&url)
            .query(&[
                ("partner", "sydney"),
                ("showselective", "1"),
                ("sude", "1"),
                ("kseed", "8500"),
                ("SFX", "4"),
                ("q", prompt),
                ("iframeid", iframe_id),
            ])
            .header("Referer", REFERER)
            .header("Sec-Fetch-Dest", "iframe");
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| RelayError::Upstream(format!("Image submit failed: {}", e)))?;

        let location = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();

        let Some(result_id) = job_id_pattern()
            .captures(location)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
        else {
            tracing::warn!("Image submit returned {} without a job id", response.status());
            return Err(RelayError::NotAuthenticated(
                "not logged in or login expired".to_string(),
            )
            .into());
        };

        tracing::debug!("Image job {} submitted", result_id);

        Ok(ImageJob {
            prompt: prompt.to_string(),
            iframe_id: iframe_id.to_string(),
            result_id,
            attempts: 0,
        })
    }

    /// Poll a submitted job until its result page has content
    ///
    /// Each attempt waits `poll_interval` first. A response whose length
    /// exceeds one byte is the result.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::PollExhausted`] after `max_polls` attempts.
    pub async fn poll(&self, job: &mut ImageJob) -> Result<String> {
        let url = format!(
            "{}/images/create/async/results/{}",
            self.base_url, job.result_id
        );

        while job.attempts < self.max_polls {
            tokio::time::sleep(self.poll_interval).await;
            job.attempts += 1;

            let mut request = self.client.get(&url).query(&[
                ("q", job.prompt.as_str()),
                ("partner", "sydney"),
                ("showselective", "1"),
                ("IID", "images.as"),
            ]);
            for (name, value) in &self.headers {
                request = request.header(name.as_str(), value.as_str());
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => {
                    tracing::debug!("Image poll {} failed: {}", job.attempts, e);
                    continue;
                }
            };

            let declared = response.content_length();
            if declared.is_some_and(|len| len <= 1) {
                tracing::debug!("Image poll {}/{}: not ready", job.attempts, self.max_polls);
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            if body.len() <= 1 {
                tracing::debug!("Image poll {}/{}: not ready", job.attempts, self.max_polls);
                continue;
            }

            tracing::info!("Image job {} ready after {} polls", job.result_id, job.attempts);
            return Ok(render_images(&job.prompt, &body));
        }

        Err(RelayError::PollExhausted {
            attempts: job.attempts,
        }
        .into())
    }
}

/// Image URLs found in result markup, in document order.
pub fn extract_image_urls(markup: &str) -> Vec<String> {
    image_pattern()
        .captures_iter(markup)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().replace("&amp;", "&"))
        .collect()
}

/// Render result markup as markdown image references.
///
/// # Examples
///
/// ```
/// use hubrelay::image::render_images;
///
/// let html = r#"<img class="mimg" alt="x" src="https://th.example/1?w=1&amp;h=2">"#;
/// assert_eq!(render_images("fox", html), "![fox](https://th.example/1?w=1&h=2)");
/// ```
pub fn render_images(prompt: &str, markup: &str) -> String {
    extract_image_urls(markup)
        .iter()
        .map(|url| format!("![{}]({})", prompt, url))
        .collect::<Vec<_>>()
        .join(" ")
}
