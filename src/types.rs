//! Core types for the photo gallery and its cloud mirror

use std::path::Path;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, SecondsFormat, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{GalleryError, Result};

/// Envelope format version written into remote records
pub const ENVELOPE_VERSION: &str = "2.0";

/// MIME type assumed when a stored photo does not carry one
pub const DEFAULT_MIME_TYPE: &str = "image/jpeg";

/// Image types accepted into the library
pub const SUPPORTED_IMAGE_TYPES: [&str; 4] = ["image/jpeg", "image/png", "image/webp", "image/gif"];

/// Largest image file accepted into the library (50 MB)
pub const MAX_FILE_BYTES: u64 = 50 * 1024 * 1024;

/// Where a photo's payload lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageLocation {
    #[default]
    Local,
}

/// A photo in the local library
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Photo {
    pub id: String,
    pub name: String,
    /// Encoded image payload (usually a base64 data URI)
    pub data: String,
    #[serde(rename = "type")]
    pub mime_type: String,
    pub original_size: u64,
    pub compressed_size: u64,
    /// compressed / original, always within [0, 1]
    pub compression_ratio: f64,
    pub upload_date: DateTime<Utc>,
    #[serde(default)]
    pub storage: StorageLocation,
}

impl Photo {
    /// Generate a local photo id: millisecond timestamp plus a random base-36 suffix.
    ///
    /// Unique enough within one library; not globally unique.
    pub fn generate_id() -> String {
        const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
        let mut rng = rand::thread_rng();
        let suffix: String = (0..9)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect();
        format!("{}{}", Utc::now().timestamp_millis(), suffix)
    }

    /// Build a photo from an image file without re-encoding it.
    ///
    /// Downscaling belongs to the image codec; here compressed and original
    /// sizes are equal and the ratio is 1.
    pub fn from_file(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        let mime_type = content_type_from_extension(extension);
        if !SUPPORTED_IMAGE_TYPES.contains(&mime_type) {
            return Err(GalleryError::InvalidFile(format!(
                "{} is not a JPEG, PNG, WebP or GIF image",
                path.display()
            )));
        }

        let file_size = std::fs::metadata(path)?.len();
        if file_size > MAX_FILE_BYTES {
            return Err(GalleryError::InvalidFile(format!(
                "{} is {}, the limit is {}",
                path.display(),
                format_file_size(file_size),
                format_file_size(MAX_FILE_BYTES)
            )));
        }
        let bytes = std::fs::read(path)?;

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "photo".to_string());
        let size = bytes.len() as u64;

        Ok(Self {
            id: Self::generate_id(),
            name,
            data: format!("data:{};base64,{}", mime_type, BASE64.encode(&bytes)),
            mime_type: mime_type.to_string(),
            original_size: size,
            compressed_size: size,
            compression_ratio: 1.0,
            upload_date: Utc::now(),
            storage: StorageLocation::Local,
        })
    }
}

/// Size-capped, string-coerced subset of a [`Photo`] stored remotely
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoLite {
    pub id: String,
    pub name: String,
    pub data: String,
    #[serde(rename = "type")]
    pub mime_type: String,
    pub size: u64,
    pub upload_date: String,
}

impl PhotoLite {
    /// Project a photo onto the remote shape, truncating the payload to
    /// `max_payload_chars` characters when a cap is set.
    ///
    /// Returns `None` for photos without a usable id.
    pub fn from_photo(photo: &Photo, max_payload_chars: Option<usize>) -> Option<Self> {
        let id = photo.id.trim();
        if id.is_empty() {
            return None;
        }
        let data = match max_payload_chars {
            Some(cap) => truncate_chars(&photo.data, cap),
            None => photo.data.as_str(),
        };
        Some(Self {
            id: id.to_string(),
            name: photo.name.clone(),
            data: data.to_string(),
            mime_type: photo.mime_type.clone(),
            size: photo.compressed_size,
            upload_date: photo
                .upload_date
                .to_rfc3339_opts(SecondsFormat::Millis, true),
        })
    }
}

/// Truncate to at most `max_chars` characters, never splitting a code point
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Bytes an encoded base64 payload decodes to (approximately)
pub fn estimate_payload_bytes(data: &str) -> u64 {
    let encoded = data.split_once(',').map(|(_, b)| b).unwrap_or(data);
    (encoded.len() as u64 * 3) / 4
}

fn coerce_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn coerce_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite() && *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite() && *f >= 0.0).map(|f| f as u64),
        _ => None,
    }
}

fn coerce_f64(value: &Value) -> Option<f64> {
    let f = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    f.is_finite().then_some(f)
}

fn ratio(compressed: u64, original: u64) -> f64 {
    if original == 0 {
        1.0
    } else {
        (compressed as f64 / original as f64).clamp(0.0, 1.0)
    }
}

/// The one place stored or fetched photo data is turned into a [`Photo`].
///
/// Accepts both the full local shape and the remote [`PhotoLite`] shape,
/// coerces numbers and strings, and fills defaults. Entries that are not
/// objects or lack an id are rejected.
pub fn normalize_photo(value: &Value) -> Option<Photo> {
    let obj = value.as_object()?;

    let id = obj
        .get("id")
        .and_then(coerce_string)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())?;
    let name = obj
        .get("name")
        .and_then(coerce_string)
        .unwrap_or_else(|| format!("photo-{}", id));
    let data = obj.get("data").and_then(coerce_string).unwrap_or_default();
    let mime_type = obj
        .get("type")
        .and_then(coerce_string)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string());

    let size = obj.get("size").and_then(coerce_u64);
    let compressed_size = obj
        .get("compressedSize")
        .and_then(coerce_u64)
        .or(size)
        .unwrap_or_else(|| estimate_payload_bytes(&data));
    let original_size = obj
        .get("originalSize")
        .and_then(coerce_u64)
        .or(size)
        .unwrap_or(compressed_size);
    let compression_ratio = obj
        .get("compressionRatio")
        .and_then(coerce_f64)
        .map(|r| r.clamp(0.0, 1.0))
        .unwrap_or_else(|| ratio(compressed_size, original_size));

    let upload_date = obj
        .get("uploadDate")
        .and_then(|v| v.as_str())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    Some(Photo {
        id,
        name,
        data,
        mime_type,
        original_size,
        compressed_size,
        compression_ratio,
        upload_date,
        storage: StorageLocation::Local,
    })
}

/// JSON body written into the remote record
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub photos: Vec<PhotoLite>,
    pub count: usize,
    pub last_updated: String,
    pub version: String,
}

impl Envelope {
    pub fn new(photos: Vec<PhotoLite>) -> Self {
        Self {
            count: photos.len(),
            photos,
            last_updated: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            version: ENVELOPE_VERSION.to_string(),
        }
    }

    /// Serialize and return the body together with its byte length
    pub fn to_body(&self) -> Result<(String, usize)> {
        let body = serde_json::to_string(self)?;
        let len = body.len();
        Ok((body, len))
    }

    /// Parse a record body written by any envelope version.
    ///
    /// Missing `photos` means an empty set; entries that fail
    /// normalization are dropped.
    pub fn parse(body: &str) -> Result<ParsedEnvelope> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct RawEnvelope {
            #[serde(default)]
            photos: Option<Vec<Value>>,
            #[serde(default, alias = "totalCount")]
            count: Option<Value>,
            #[serde(default, alias = "timestamp")]
            last_updated: Option<String>,
            #[serde(default)]
            version: Option<Value>,
        }

        let raw: RawEnvelope = serde_json::from_str(body)
            .map_err(|e| GalleryError::Parse(format!("record body is not a valid envelope: {}", e)))?;

        let photos: Vec<Photo> = raw
            .photos
            .unwrap_or_default()
            .iter()
            .filter_map(normalize_photo)
            .collect();
        let declared_count = raw.count.as_ref().and_then(coerce_u64).map(|c| c as usize);

        Ok(ParsedEnvelope {
            declared_count,
            last_updated: raw.last_updated,
            version: raw.version.as_ref().and_then(coerce_string),
            photos,
        })
    }
}

/// Result of parsing a record body
#[derive(Debug, Clone)]
pub struct ParsedEnvelope {
    pub photos: Vec<Photo>,
    pub declared_count: Option<usize>,
    pub last_updated: Option<String>,
    pub version: Option<String>,
}

/// Configuration for the sync engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Base URL of the document store API
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Name of the remote container (repository)
    #[serde(default = "default_container_name")]
    pub container_name: String,
    #[serde(default = "default_container_description")]
    pub container_description: String,
    /// Reserved title of the record holding the envelope
    #[serde(default = "default_record_title")]
    pub record_title: String,
    /// Label attached to newly created records
    #[serde(default = "default_record_label")]
    pub record_label: String,
    /// Path of the placeholder document written into a new container
    #[serde(default = "default_placeholder_path")]
    pub placeholder_path: String,
    /// Per-photo payload cap in characters (`None` = uncapped, size-checked only)
    #[serde(default = "default_max_payload_chars")]
    pub max_payload_chars: Option<usize>,
    /// Hard ceiling on the serialized envelope
    #[serde(default = "default_max_envelope_bytes")]
    pub max_envelope_bytes: usize,
    /// Records per page when searching
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    /// Maximum pages walked when searching
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    /// Pre-pull snapshots kept locally; older ones are pruned
    #[serde(default = "default_max_backups")]
    pub max_backups: usize,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_api_base_url() -> String {
    "https://api.github.com".to_string()
}

fn default_container_name() -> String {
    "photo-gallery-storage".to_string()
}

fn default_container_description() -> String {
    "Cloud storage for the photo gallery".to_string()
}

fn default_record_title() -> String {
    "Photo Storage Data".to_string()
}

fn default_record_label() -> String {
    "photo-storage".to_string()
}

fn default_placeholder_path() -> String {
    "photos/README.md".to_string()
}

fn default_max_payload_chars() -> Option<usize> {
    Some(1000)
}

fn default_max_envelope_bytes() -> usize {
    900_000
}

fn default_per_page() -> u32 {
    100
}

fn default_max_pages() -> u32 {
    10
}

fn default_max_backups() -> usize {
    crate::storage::DEFAULT_MAX_BACKUPS
}

fn default_user_agent() -> String {
    format!("gallery-sync/{}", crate::VERSION)
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            container_name: default_container_name(),
            container_description: default_container_description(),
            record_title: default_record_title(),
            record_label: default_record_label(),
            placeholder_path: default_placeholder_path(),
            max_payload_chars: default_max_payload_chars(),
            max_envelope_bytes: default_max_envelope_bytes(),
            per_page: default_per_page(),
            max_pages: default_max_pages(),
            max_backups: default_max_backups(),
            user_agent: default_user_agent(),
        }
    }
}

impl SyncConfig {
    /// Defaults overridden by environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("GALLERY_SYNC_API_URL") {
            config.api_base_url = url;
        }
        if let Ok(name) = std::env::var("GALLERY_SYNC_CONTAINER") {
            config.container_name = name;
        }
        if let Ok(chars) = std::env::var("GALLERY_SYNC_MAX_PAYLOAD_CHARS") {
            let chars: usize = chars.parse().map_err(|_| {
                GalleryError::Config(format!("GALLERY_SYNC_MAX_PAYLOAD_CHARS is not a number: {}", chars))
            })?;
            config.max_payload_chars = (chars > 0).then_some(chars);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.container_name.trim().is_empty() {
            return Err(GalleryError::Config("container name is empty".to_string()));
        }
        if self.record_title.trim().is_empty() {
            return Err(GalleryError::Config("record title is empty".to_string()));
        }
        if self.per_page == 0 || self.max_pages == 0 {
            return Err(GalleryError::Config(
                "per_page and max_pages must be positive".to_string(),
            ));
        }
        if self.max_backups == 0 {
            return Err(GalleryError::Config(
                "max_backups must keep at least one snapshot".to_string(),
            ));
        }
        Ok(())
    }
}

/// Snapshot of the sync engine's state
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncStatus {
    pub connected: bool,
    pub storage_ready: bool,
    pub owner: Option<String>,
    pub last_sync: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Bytes used locally and mirrored remotely
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageUsage {
    pub local_bytes: u64,
    pub cloud_bytes: u64,
}

/// Format a byte count as "1.5 KB"-style text
pub fn format_file_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    let mut exponent = 0;
    let mut value = bytes as f64;
    while value >= 1024.0 && exponent < UNITS.len() - 1 {
        value /= 1024.0;
        exponent += 1;
    }
    let rounded = (value * 100.0).round() / 100.0;
    format!("{} {}", rounded, UNITS[exponent])
}

/// Detect content type from file extension
pub fn content_type_from_extension(ext: &str) -> &'static str {
    match ext.to_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}
