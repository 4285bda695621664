use std::time::{Duration, SystemTime, UNIX_EPOCH};

use reqwest::blocking::multipart::{Form, Part};
use serde::Deserialize;

use crate::signature::{sign_request, IDENTIFY_URI};
use crate::types::{RecognizeError, TrackMatch};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct AcrCloudConfig {
    pub access_key: String,
    pub access_secret: String,
    pub host: String,
}

/// Single-attempt identification client. Retry and backoff policy live in
/// the trigger loop's failure accounting, not here.
pub struct AcrCloudClient {
    config: AcrCloudConfig,
    endpoint: String,
    http: reqwest::blocking::Client,
}

impl AcrCloudClient {
    pub fn new(config: AcrCloudConfig) -> Result<Self, RecognizeError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        let endpoint = format!("https://{}/v1/identify", config.host);
        Ok(Self {
            config,
            endpoint,
            http,
        })
    }

    /// Submit one audio clip. `Ok(None)` means the service answered but found
    /// no match; transport and parse failures are errors. Callers treat both
    /// the same way.
    pub fn identify(&self, audio: &[u8]) -> Result<Option<TrackMatch>, RecognizeError> {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let signature = sign_request(
            "POST",
            IDENTIFY_URI,
            &self.config.access_key,
            &self.config.access_secret,
            timestamp,
        );

        let sample = Part::bytes(audio.to_vec())
            .file_name("sample.wav")
            .mime_str("audio/wav")?;
        let form = Form::new()
            .part("sample", sample)
            .text("access_key", self.config.access_key.clone())
            .text("sample_bytes", audio.len().to_string())
            .text("timestamp", timestamp.to_string())
            .text("signature", signature)
            .text("data_type", "audio")
            .text("signature_version", "1")
            // Disables the service's hum-detection path; we always send
            // recorded room audio.
            .text("audio_format", "recorded");

        tracing::debug!(bytes = audio.len(), "Submitting sample for identification");
        let response = self
            .http
            .post(&self.endpoint)
            .multipart(form)
            .send()?
            .error_for_status()?;
        let body: serde_json::Value = response.json()?;

        parse_response(body)
    }
}

#[derive(Deserialize)]
struct IdentifyResponse {
    status: ResponseStatus,
    metadata: Option<ResponseMetadata>,
}

#[derive(Deserialize)]
struct ResponseStatus {
    code: i64,
    #[serde(default)]
    msg: String,
}

#[derive(Deserialize)]
struct ResponseMetadata {
    #[serde(default)]
    music: Vec<MusicEntry>,
}

#[derive(Deserialize)]
struct MusicEntry {
    title: Option<String>,
    #[serde(default)]
    artists: Vec<ArtistEntry>,
    album: Option<AlbumEntry>,
    duration_ms: Option<u64>,
    external_metadata: Option<ExternalMetadata>,
}

#[derive(Deserialize)]
struct ArtistEntry {
    name: Option<String>,
}

#[derive(Deserialize)]
struct AlbumEntry {
    name: Option<String>,
}

#[derive(Deserialize)]
struct ExternalMetadata {
    spotify: Option<SpotifyEntry>,
}

#[derive(Deserialize)]
struct SpotifyEntry {
    track: Option<SpotifyTrack>,
}

#[derive(Deserialize)]
struct SpotifyTrack {
    id: Option<String>,
}

/// Interpret a service response. Non-zero status codes and empty music lists
/// are explicit no-matches; a body that does not fit the wire shape at all
/// is an error.
pub fn parse_response(body: serde_json::Value) -> Result<Option<TrackMatch>, RecognizeError> {
    let parsed: IdentifyResponse = serde_json::from_value(body.clone())
        .map_err(|e| RecognizeError::MalformedResponse(e.to_string()))?;

    if parsed.status.code != 0 {
        tracing::debug!(
            code = parsed.status.code,
            msg = %parsed.status.msg,
            "Service reported no result"
        );
        return Ok(None);
    }

    let Some(music) = parsed.metadata.and_then(|m| m.music.into_iter().next()) else {
        tracing::debug!("Response carried no music metadata");
        return Ok(None);
    };

    let title = music.title.unwrap_or_else(|| "Unknown".to_string());
    let artist = music
        .artists
        .into_iter()
        .next()
        .and_then(|a| a.name)
        .unwrap_or_else(|| "Unknown".to_string());
    let album = music.album.and_then(|a| a.name);
    let external_id = music
        .external_metadata
        .and_then(|m| m.spotify)
        .and_then(|s| s.track)
        .and_then(|t| t.id);

    tracing::info!(title = %title, artist = %artist, "Track identified");

    Ok(Some(TrackMatch {
        title,
        artist,
        album,
        duration_ms: music.duration_ms,
        external_id,
        raw_response: Some(body),
    }))
}
