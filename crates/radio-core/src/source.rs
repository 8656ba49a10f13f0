//! Where the default station list comes from, and where exports go.

use std::future::Future;
use std::path::PathBuf;

use tracing::{debug, info};

use crate::error::{ExportError, SourceError};

/// Station list compiled into the binary.
pub const BUNDLED_STATIONS: &str = include_str!("../assets/stations.csv");

/// Provider of the default station list text.
pub trait DefaultSource: Send + Sync {
    fn fetch(&self) -> impl Future<Output = Result<String, SourceError>> + Send;
}

/// The list shipped with the binary.  Never fails.
#[derive(Debug, Clone, Default)]
pub struct BundledSource;

impl DefaultSource for BundledSource {
    async fn fetch(&self) -> Result<String, SourceError> {
        Ok(BUNDLED_STATIONS.to_string())
    }
}

/// A fixed in-memory text, handy for embedding callers and tests.
#[derive(Debug, Clone)]
pub struct StaticSource(pub String);

impl DefaultSource for StaticSource {
    async fn fetch(&self) -> Result<String, SourceError> {
        Ok(self.0.clone())
    }
}

#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl DefaultSource for FileSource {
    async fn fetch(&self) -> Result<String, SourceError> {
        debug!("source: reading {}", self.path.display());
        Ok(tokio::fs::read_to_string(&self.path).await?)
    }
}

#[derive(Debug, Clone)]
pub struct HttpSource {
    url: String,
    client: reqwest::Client,
}

impl HttpSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }
}

impl DefaultSource for HttpSource {
    async fn fetch(&self) -> Result<String, SourceError> {
        info!("source: fetching {}", self.url);
        let response = self.client.get(&self.url).send().await?;
        if !response.status().is_success() {
            return Err(SourceError::Status(response.status().as_u16()));
        }
        Ok(response.text().await?)
    }
}

/// Source selected by the `stations.default_source` config value.
#[derive(Debug, Clone)]
pub enum ConfiguredSource {
    Bundled(BundledSource),
    File(FileSource),
    Http(HttpSource),
}

impl ConfiguredSource {
    /// `"bundled"` (or empty) → compiled-in list; `http(s)://…` → HTTP;
    /// anything else is a file path.
    pub fn from_setting(setting: &str) -> Self {
        let setting = setting.trim();
        if setting.is_empty() || setting.eq_ignore_ascii_case("bundled") {
            Self::Bundled(BundledSource)
        } else if setting.starts_with("http://") || setting.starts_with("https://") {
            Self::Http(HttpSource::new(setting))
        } else {
            Self::File(FileSource::new(setting))
        }
    }
}

impl DefaultSource for ConfiguredSource {
    async fn fetch(&self) -> Result<String, SourceError> {
        match self {
            Self::Bundled(s) => s.fetch().await,
            Self::File(s) => s.fetch().await,
            Self::Http(s) => s.fetch().await,
        }
    }
}

// ── export ────────────────────────────────────────────────────────────────────

/// Receives an exported station list; the "save as file" side of export.
pub trait ExportSink: Send + Sync {
    fn save(&self, filename: &str, contents: &str) -> Result<(), ExportError>;
}

/// Writes exports into a directory.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl ExportSink for DirectorySink {
    fn save(&self, filename: &str, contents: &str) -> Result<(), ExportError> {
        let path = self.dir.join(filename);
        let wrap = |source| ExportError {
            filename: path.display().to_string(),
            source,
        };
        std::fs::create_dir_all(&self.dir).map_err(wrap)?;
        std::fs::write(&path, contents).map_err(wrap)?;
        info!("export: wrote {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;

    #[test]
    fn test_bundled_list_decodes() {
        let stations = codec::decode(BUNDLED_STATIONS);
        assert!(!stations.is_empty());
        assert!(stations
            .iter()
            .all(|s| s.stream_url.starts_with("http://") || s.stream_url.starts_with("https://")));
    }

    #[test]
    fn test_from_setting() {
        assert!(matches!(
            ConfiguredSource::from_setting(""),
            ConfiguredSource::Bundled(_)
        ));
        assert!(matches!(
            ConfiguredSource::from_setting("Bundled"),
            ConfiguredSource::Bundled(_)
        ));
        assert!(matches!(
            ConfiguredSource::from_setting("https://example.com/stations.csv"),
            ConfiguredSource::Http(_)
        ));
        assert!(matches!(
            ConfiguredSource::from_setting("/etc/radio/stations.csv"),
            ConfiguredSource::File(_)
        ));
    }

    #[tokio::test]
    async fn test_file_source_missing_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileSource::new(dir.path().join("absent.csv"));
        assert!(matches!(source.fetch().await, Err(SourceError::Io(_))));
    }

    #[test]
    fn test_directory_sink_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DirectorySink::new(dir.path().join("exports"));
        sink.save(codec::EXPORT_FILENAME, "x").unwrap();
        let written =
            std::fs::read_to_string(dir.path().join("exports").join(codec::EXPORT_FILENAME))
                .unwrap();
        assert_eq!(written, "x");
    }
}
