use async_trait::async_trait;
use reqwest::Client as HttpClient;
use reqwest::header::LOCATION;
use reqwest::redirect::Policy;
use url::Url;

use crate::config::FetchConfig;

const MAX_REDIRECTS: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Invalid image URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),
    #[error("Image host not allowed: {0}")]
    HostNotAllowed(String),
    #[error("Image download failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Image host responded with status {0}")]
    UpstreamStatus(u16),
    #[error("Image host redirected without a usable Location")]
    BadRedirect,
    #[error("Too many redirects fetching image")]
    TooManyRedirects,
    #[error("Image exceeds the {limit} byte limit")]
    TooLarge { limit: usize },
    #[error("Downloaded content is not a recognized image")]
    NotAnImage,
}

/// Source of raw image bytes for a caller-supplied URL.
#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

#[derive(Clone)]
pub struct HttpImageFetcher {
    http_client: HttpClient,
    max_image_bytes: usize,
    allowed_hosts: Vec<String>,
}

impl HttpImageFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        // Redirects are followed in `fetch` so every hop goes through the host policy.
        let http_client = HttpClient::builder()
            .timeout(config.timeout)
            .redirect(Policy::none())
            .build()?;
        Ok(Self {
            http_client,
            max_image_bytes: config.max_image_bytes,
            allowed_hosts: config.allowed_hosts.clone(),
        })
    }

    /// Parses the URL and applies the scheme and host policy.
    pub fn validate_url(&self, raw: &str) -> Result<Url, FetchError> {
        let url = Url::parse(raw.trim())?;
        self.check_policy(&url)?;
        Ok(url)
    }

    fn check_policy(&self, url: &Url) -> Result<(), FetchError> {
        match url.scheme() {
            "http" | "https" => {}
            other => return Err(FetchError::UnsupportedScheme(other.to_string())),
        }

        let host = url
            .host_str()
            .ok_or(FetchError::InvalidUrl(url::ParseError::EmptyHost))?
            .to_ascii_lowercase();
        if !self.allowed_hosts.is_empty() && !self.allowed_hosts.iter().any(|h| *h == host) {
            return Err(FetchError::HostNotAllowed(host));
        }
        Ok(())
    }

    /// Resolves a redirect `Location` against the current URL and re-applies the policy.
    fn redirect_target(&self, current: &Url, location: Option<&str>) -> Result<Url, FetchError> {
        let location = location.ok_or(FetchError::BadRedirect)?;
        let next = current
            .join(location)
            .map_err(|_| FetchError::BadRedirect)?;
        self.check_policy(&next)?;
        Ok(next)
    }

    fn check_size(&self, len: usize) -> Result<(), FetchError> {
        if len > self.max_image_bytes {
            return Err(FetchError::TooLarge {
                limit: self.max_image_bytes,
            });
        }
        Ok(())
    }
}

/// Rejects payloads whose magic bytes match no known image format.
pub fn ensure_image(bytes: &[u8]) -> Result<image::ImageFormat, FetchError> {
    image::guess_format(bytes).map_err(|_| FetchError::NotAnImage)
}

#[async_trait]
impl ImageSource for HttpImageFetcher {
    async fn fetch(&self, raw_url: &str) -> Result<Vec<u8>, FetchError> {
        let mut url = self.validate_url(raw_url)?;
        let mut redirects = 0;
        let mut response = loop {
            log::debug!("Fetching image from {}", url);
            let response = self.http_client.get(url.clone()).send().await?;
            if !response.status().is_redirection() {
                break response;
            }
            redirects += 1;
            if redirects > MAX_REDIRECTS {
                return Err(FetchError::TooManyRedirects);
            }
            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|value| value.to_str().ok());
            url = self.redirect_target(&url, location)?;
        };

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::UpstreamStatus(status.as_u16()));
        }

        if let Some(len) = response.content_length() {
            self.check_size(len as usize)?;
        }

        let mut image_data = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            self.check_size(image_data.len() + chunk.len())?;
            image_data.extend_from_slice(&chunk);
        }

        let format = ensure_image(&image_data)?;
        log::debug!("Fetched {} bytes of {:?}", image_data.len(), format);
        Ok(image_data)
    }
}
