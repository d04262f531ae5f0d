use crate::config::PreloadConfig;
use crate::error::{AppError, AppResult, PlaybackError};
use reqwest::header::ACCEPT;
use tokio_util::sync::CancellationToken;
use url::Url;

const SEGMENT_EXTENSIONS: &[&str] = &[".ts", ".m4s", ".mp4", ".aac"];

/// Advisory segment count for a manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManifestEstimate {
    pub segments: u32,
    /// No segment-like entries were found and the configured default was used.
    pub fallback: bool,
}

/// What a single pass over a manifest document found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestScan {
    Media { segments: u32 },
    Master { first_variant: Option<String> },
    Unrecognized,
}

pub fn scan_manifest(body: &str) -> ManifestScan {
    let mut extinf = 0u32;
    let mut segment_uris = 0u32;
    let mut is_master = false;
    let mut awaiting_variant = false;
    let mut first_variant: Option<String> = None;

    for line in body.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if line.starts_with("#EXTINF") {
            extinf += 1;
        } else if line.starts_with("#EXT-X-STREAM-INF") {
            is_master = true;
            awaiting_variant = true;
        } else if !line.starts_with('#') {
            if awaiting_variant {
                first_variant.get_or_insert_with(|| line.to_string());
                awaiting_variant = false;
            }
            if looks_like_segment(line) {
                segment_uris += 1;
            }
        }
    }

    if extinf > 0 {
        ManifestScan::Media { segments: extinf }
    } else if segment_uris > 0 {
        ManifestScan::Media {
            segments: segment_uris,
        }
    } else if is_master {
        ManifestScan::Master { first_variant }
    } else {
        ManifestScan::Unrecognized
    }
}

fn looks_like_segment(uri: &str) -> bool {
    let path = uri.split('?').next().unwrap_or(uri).to_ascii_lowercase();
    SEGMENT_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

/// Fetches a manifest and estimates how many segments it references.
///
/// Only used when no full streaming engine is available; the estimate drives
/// progress reporting and nothing else.
#[derive(Clone)]
pub struct ManifestProbe {
    http: reqwest::Client,
    accept: String,
    default_estimate: u32,
    follow_variants: bool,
}

impl ManifestProbe {
    pub fn new(config: &PreloadConfig) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .build()?;
        Ok(Self::with_client(http, config))
    }

    pub fn with_client(http: reqwest::Client, config: &PreloadConfig) -> Self {
        Self {
            http,
            accept: config.manifest_accept.clone(),
            default_estimate: config.default_segment_estimate.max(1),
            follow_variants: config.follow_variants,
        }
    }

    /// Resolves to [`AppError::Cancelled`] as soon as `cancel` fires; callers
    /// treat that as silence, not as a failure.
    pub async fn probe(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> AppResult<ManifestEstimate> {
        let body = self.fetch(url, cancel).await?;

        let variant = match scan_manifest(&body) {
            ManifestScan::Media { segments } => {
                return Ok(ManifestEstimate {
                    segments,
                    fallback: false,
                })
            }
            ManifestScan::Master {
                first_variant: Some(variant),
            } if self.follow_variants => variant,
            _ => return Ok(self.fallback(url)),
        };

        let variant_url = match Url::parse(url).and_then(|base| base.join(&variant)) {
            Ok(resolved) => resolved,
            Err(e) => {
                log::warn!("Cannot resolve variant {} against {}: {}", variant, url, e);
                return Ok(self.fallback(url));
            }
        };

        log::debug!("Master playlist, probing first variant {}", variant_url);
        let body = self.fetch(variant_url.as_str(), cancel).await?;
        match scan_manifest(&body) {
            ManifestScan::Media { segments } => Ok(ManifestEstimate {
                segments,
                fallback: false,
            }),
            _ => Ok(self.fallback(variant_url.as_str())),
        }
    }

    async fn fetch(&self, url: &str, cancel: &CancellationToken) -> AppResult<String> {
        let request = self
            .http
            .get(url)
            .header(ACCEPT, self.accept.as_str())
            .send();

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(AppError::Cancelled),
            response = request => response.map_err(|e| {
                AppError::from(PlaybackError::ManifestUnreachable(e.to_string()))
            })?,
        };

        let status = response.status();
        if !status.is_success() {
            log::error!("Manifest fetch failed ({}): {}", status, url);
            return Err(PlaybackError::ManifestUnreachable(format!(
                "Failed to fetch manifest: HTTP {}",
                status.as_u16()
            ))
            .into());
        }

        tokio::select! {
            _ = cancel.cancelled() => Err(AppError::Cancelled),
            body = response.text() => body.map_err(|e| {
                AppError::from(PlaybackError::ManifestUnreachable(e.to_string()))
            }),
        }
    }

    fn fallback(&self, url: &str) -> ManifestEstimate {
        let unparseable = PlaybackError::ManifestUnparseable(format!(
            "no segment entries in {}",
            url
        ));
        log::warn!(
            "{}; assuming {} segments",
            unparseable,
            self.default_estimate
        );
        ManifestEstimate {
            segments: self.default_estimate,
            fallback: true,
        }
    }
}
