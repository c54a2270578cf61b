use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Media type of every camera capture.
pub const JPEG_MIME: &str = "image/jpeg";

/// A transport-ready image payload: a media type plus a bare base64 body
/// (no `data:` prefix).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    mime_type: String,
    body: String,
}

impl EncodedImage {
    pub(crate) fn from_bytes(mime_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            mime_type: mime_type.into(),
            body: STANDARD.encode(bytes),
        }
    }

    /// Build a payload from a `data:<mime>;base64,<body>` URI.
    ///
    /// Returns `None` when the input is not a base64 data URI or the body
    /// does not decode.
    pub fn from_data_uri(uri: &str) -> Option<Self> {
        let rest = uri.strip_prefix("data:")?;
        let (mime_type, body) = rest.split_once(";base64,")?;
        if mime_type.is_empty() || mime_type.contains(';') {
            return None;
        }
        STANDARD.decode(body).ok()?;
        Some(Self {
            mime_type: mime_type.to_string(),
            body: body.to_string(),
        })
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// The stripped base64 body, ready for JSON transport.
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Re-attach the data URI prefix, e.g. for rendering a preview.
    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.body)
    }

    /// Raw image bytes.
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(&self.body)
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

/// A registered face, as listed by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceRecord {
    pub name: String,
    /// Server-assigned creation time.
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub created_at: DateTime<Utc>,
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}")))
}

/// Parse an RFC 3339 timestamp, or a naive ISO-8601 one taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    raw.parse::<NaiveDateTime>().ok().map(|naive| naive.and_utc())
}

/// Outcome of one recognition round-trip.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionResult {
    pub name: String,
    /// Server-computed confidence in [0, 100].
    pub match_ratio: f64,
}

impl RecognitionResult {
    pub fn match_level(&self) -> MatchLevel {
        MatchLevel::from_ratio(self.match_ratio)
    }
}

/// Display bucket for a match ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchLevel {
    Poor,
    Fair,
    Good,
    Excellent,
}

impl MatchLevel {
    pub fn from_ratio(ratio: f64) -> Self {
        if ratio >= 80.0 {
            Self::Excellent
        } else if ratio >= 60.0 {
            Self::Good
        } else if ratio >= 40.0 {
            Self::Fair
        } else {
            Self::Poor
        }
    }

    /// Good or better.
    pub fn is_reliable(self) -> bool {
        self >= Self::Good
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Poor => "poor",
            Self::Fair => "fair",
            Self::Good => "good",
            Self::Excellent => "excellent",
        }
    }
}

impl std::fmt::Display for MatchLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_from_data_uri() {
        let img = EncodedImage::from_data_uri("data:image/png;base64,aGVsbG8=").unwrap();
        assert_eq!(img.mime_type(), "image/png");
        assert_eq!(img.body(), "aGVsbG8=");
        assert_eq!(img.decode().unwrap(), b"hello");
        assert_eq!(img.to_data_uri(), "data:image/png;base64,aGVsbG8=");
    }

    #[test]
    fn test_from_data_uri_rejects_plain_base64() {
        assert!(EncodedImage::from_data_uri("aGVsbG8=").is_none());
        assert!(EncodedImage::from_data_uri("data:;base64,aGVsbG8=").is_none());
        assert!(EncodedImage::from_data_uri("data:image/png;base64,***").is_none());
    }

    #[test]
    fn test_face_record_naive_timestamp() {
        let json = r#"{"name":"Ann","created_at":"2024-03-01T12:30:45.123456"}"#;
        let record: FaceRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.name, "Ann");
        assert_eq!(record.created_at.year(), 2024);
        assert_eq!(record.created_at.hour(), 12);
    }

    #[test]
    fn test_face_record_rfc3339_timestamp() {
        let json = r#"{"name":"Bo","created_at":"2024-03-01T12:30:45+02:00"}"#;
        let record: FaceRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.created_at.hour(), 10);
    }

    #[test]
    fn test_face_record_bad_timestamp() {
        let json = r#"{"name":"Bo","created_at":"yesterday"}"#;
        assert!(serde_json::from_str::<FaceRecord>(json).is_err());
    }

    #[test]
    fn test_match_levels() {
        assert_eq!(MatchLevel::from_ratio(95.0), MatchLevel::Excellent);
        assert_eq!(MatchLevel::from_ratio(80.0), MatchLevel::Excellent);
        assert_eq!(MatchLevel::from_ratio(60.0), MatchLevel::Good);
        assert_eq!(MatchLevel::from_ratio(59.9), MatchLevel::Fair);
        assert_eq!(MatchLevel::from_ratio(12.0), MatchLevel::Poor);
        assert!(MatchLevel::Good.is_reliable());
        assert!(!MatchLevel::Fair.is_reliable());
    }
}
