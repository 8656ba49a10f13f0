use serde::{Deserialize, Serialize};

use crate::error::CatalogError;

/// Category assigned when none is given.
pub const DEFAULT_CATEGORY: &str = "Other";

/// One catalog entry.  `id` is identity; uniqueness inside a catalog is
/// enforced on the case-insensitive `stream_url`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationRecord {
    pub id: String,
    pub display_name: String,
    pub stream_url: String,
    #[serde(default)]
    pub logo_ref: String,
    #[serde(default = "default_category")]
    pub category: String,
}

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

/// Generate a fresh opaque station id.
pub fn new_station_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl StationRecord {
    /// Lower-cased stream URL used as the dedup key.
    pub fn url_key(&self) -> String {
        url_key(&self.stream_url)
    }
}

pub(crate) fn url_key(url: &str) -> String {
    url.to_lowercase()
}

/// A station as entered by the user, before it has an id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStation {
    pub display_name: String,
    pub stream_url: String,
    #[serde(default)]
    pub logo_ref: String,
    #[serde(default)]
    pub category: String,
}

impl NewStation {
    pub fn new(display_name: impl Into<String>, stream_url: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            stream_url: stream_url.into(),
            ..Self::default()
        }
    }

    pub fn with_logo(mut self, logo_ref: impl Into<String>) -> Self {
        self.logo_ref = logo_ref.into();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    /// Trim every field and check the manual-entry rules: name and URL
    /// present, URL absolute http(s).
    pub(crate) fn validated(&self) -> Result<NewStation, CatalogError> {
        let display_name = self.display_name.trim();
        let stream_url = self.stream_url.trim();

        if display_name.is_empty() {
            return Err(CatalogError::Invalid("Station name is required"));
        }
        if stream_url.is_empty() {
            return Err(CatalogError::Invalid("Stream URL is required"));
        }
        if !is_http_url(stream_url) {
            return Err(CatalogError::Invalid(
                "URL must start with http:// or https://",
            ));
        }

        let category = match self.category.trim() {
            "" => DEFAULT_CATEGORY.to_string(),
            c => c.to_string(),
        };

        Ok(NewStation {
            display_name: display_name.to_string(),
            stream_url: stream_url.to_string(),
            logo_ref: self.logo_ref.trim().to_string(),
            category,
        })
    }

    pub(crate) fn into_record(self, id: String) -> StationRecord {
        StationRecord {
            id,
            display_name: self.display_name,
            stream_url: self.stream_url,
            logo_ref: self.logo_ref,
            category: self.category,
        }
    }
}

fn is_http_url(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    let rest = lower
        .strip_prefix("http://")
        .or_else(|| lower.strip_prefix("https://"));
    match rest {
        // Host part must be present.
        Some(rest) => !rest.is_empty() && !rest.starts_with('/'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validated_trims_and_defaults_category() {
        let s = NewStation::new("  Jazz FM ", " https://jazz.example/stream ")
            .validated()
            .unwrap();
        assert_eq!(s.display_name, "Jazz FM");
        assert_eq!(s.stream_url, "https://jazz.example/stream");
        assert_eq!(s.category, DEFAULT_CATEGORY);
    }

    #[test]
    fn test_validated_rejects_missing_fields_and_bad_scheme() {
        assert!(matches!(
            NewStation::new("", "https://a.example").validated(),
            Err(CatalogError::Invalid(_))
        ));
        assert!(matches!(
            NewStation::new("A", "   ").validated(),
            Err(CatalogError::Invalid(_))
        ));
        assert!(matches!(
            NewStation::new("A", "ftp://a.example/live").validated(),
            Err(CatalogError::Invalid(_))
        ));
        assert!(matches!(
            NewStation::new("A", "https://").validated(),
            Err(CatalogError::Invalid(_))
        ));
        assert!(NewStation::new("A", "HTTP://a.example/live").validated().is_ok());
    }

    #[test]
    fn test_record_json_uses_camel_case() {
        let rec = NewStation::new("A", "http://a.example")
            .with_logo("a.svg")
            .with_category("Rock")
            .into_record("id-1".into());
        let json = serde_json::to_string(&rec).unwrap();
        assert!(json.contains("\"displayName\":\"A\""));
        assert!(json.contains("\"streamUrl\":\"http://a.example\""));
        assert!(json.contains("\"logoRef\":\"a.svg\""));
    }

    #[test]
    fn test_record_json_missing_optional_fields() {
        let rec: StationRecord =
            serde_json::from_str(r#"{"id":"x","displayName":"A","streamUrl":"http://a"}"#)
                .unwrap();
        assert_eq!(rec.logo_ref, "");
        assert_eq!(rec.category, DEFAULT_CATEGORY);
    }
}
