//! Station catalog: the ordered, persisted station list.
//!
//! Invariant: no two records share a case-insensitive `stream_url`.  `add`,
//! `edit`, `import` and `reset` all preserve it; a snapshot adopted from
//! storage is trusted as-is.
//!
//! Every mutation builds the next sequence, writes the full snapshot to the
//! store, and only then swaps it in.  A failed write therefore leaves the
//! catalog exactly as it was.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::codec;
use crate::error::CatalogError;
use crate::source::{DefaultSource, ExportSink};
use crate::station::{new_station_id, url_key, NewStation, StationRecord};
use crate::storage::{load_json, save_json, SharedStore, STATIONS_KEY};

/// Outcome of a bulk import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub imported_count: usize,
    pub skipped_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Next,
    Prev,
}

pub struct Catalog {
    store: SharedStore,
    stations: Vec<StationRecord>,
    load_error: Option<String>,
}

impl Catalog {
    pub fn new(store: SharedStore) -> Self {
        Self {
            store,
            stations: Vec::new(),
            load_error: None,
        }
    }

    pub fn stations(&self) -> &[StationRecord] {
        &self.stations
    }

    pub fn get(&self, id: &str) -> Option<&StationRecord> {
        self.stations.iter().find(|s| s.id == id)
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    pub fn load_error(&self) -> Option<&str> {
        self.load_error.as_deref()
    }

    /// The station adjacent to `id` in catalog order.  No wrap-around.
    /// An `id` no longer in the catalog sits before the first station, so
    /// `Next` from it yields the first one and `Prev` yields nothing.
    pub fn neighbour(&self, id: &str, direction: Direction) -> Option<&StationRecord> {
        let idx = self.stations.iter().position(|s| s.id == id);
        match (direction, idx) {
            (Direction::Next, Some(i)) => self.stations.get(i + 1),
            (Direction::Next, None) => self.stations.first(),
            (Direction::Prev, Some(i)) => i.checked_sub(1).and_then(|i| self.stations.get(i)),
            (Direction::Prev, None) => None,
        }
    }

    /// Hydrate from storage, or from the default list on first run.
    pub async fn load<S: DefaultSource>(&mut self, source: &S) {
        if let Some(stored) = load_json::<Vec<StationRecord>>(&*self.store, STATIONS_KEY) {
            info!("catalog: restored {} stations from storage", stored.len());
            self.stations = stored;
            self.load_error = None;
            return;
        }

        match source.fetch().await {
            Ok(text) => {
                let defaults = codec::decode(&text);
                info!("catalog: seeded {} default stations", defaults.len());
                if let Err(e) = save_json(&*self.store, STATIONS_KEY, &defaults) {
                    warn!("catalog: could not persist default stations: {}", e);
                }
                self.stations = defaults;
                self.load_error = None;
            }
            Err(e) => {
                warn!("catalog: default stations unavailable: {}", e);
                self.load_error = Some(format!("Failed to load stations: {}", e));
            }
        }
    }

    pub fn add(&mut self, candidate: &NewStation) -> Result<StationRecord, CatalogError> {
        let candidate = candidate.validated()?;
        let key = url_key(&candidate.stream_url);
        if self.stations.iter().any(|s| s.url_key() == key) {
            return Err(CatalogError::Duplicate(candidate.stream_url));
        }

        let record = candidate.into_record(new_station_id());
        let mut next = self.stations.clone();
        next.push(record.clone());
        self.commit(next)?;
        info!("catalog: added '{}' ({})", record.display_name, record.id);
        Ok(record)
    }

    /// Replace the record with `id` in place.  The replacement must pass the
    /// same checks as `add`, and may not take another record's URL.
    pub fn edit(&mut self, id: &str, candidate: &NewStation) -> Result<StationRecord, CatalogError> {
        let idx = self
            .stations
            .iter()
            .position(|s| s.id == id)
            .ok_or_else(|| CatalogError::NotFound(id.to_string()))?;

        let candidate = candidate.validated()?;
        let key = url_key(&candidate.stream_url);
        if self
            .stations
            .iter()
            .any(|s| s.id != id && s.url_key() == key)
        {
            return Err(CatalogError::Duplicate(candidate.stream_url));
        }

        let record = candidate.into_record(id.to_string());
        let mut next = self.stations.clone();
        next[idx] = record.clone();
        self.commit(next)?;
        info!("catalog: edited '{}' ({})", record.display_name, record.id);
        Ok(record)
    }

    /// Remove the record with `id`.  Returns whether one was removed.
    pub fn delete(&mut self, id: &str) -> Result<bool, CatalogError> {
        if !self.stations.iter().any(|s| s.id == id) {
            debug!("catalog: delete of unknown id {}", id);
            return Ok(false);
        }
        let next: Vec<StationRecord> = self
            .stations
            .iter()
            .filter(|s| s.id != id)
            .cloned()
            .collect();
        self.commit(next)?;
        info!("catalog: deleted {}", id);
        Ok(true)
    }

    /// Encoded form of the whole catalog.
    pub fn encoded(&self) -> String {
        codec::encode(&self.stations)
    }

    /// Encode the catalog and hand it to `sink` under the default filename.
    pub fn export(&self, sink: &dyn ExportSink) -> Result<String, CatalogError> {
        let text = self.encoded();
        sink.save(codec::EXPORT_FILENAME, &text)?;
        info!("catalog: exported {} stations", self.stations.len());
        Ok(text)
    }

    /// Merge stations from `raw`.  Candidates whose URL is already present,
    /// either in the catalog or earlier in the same batch, are skipped.
    pub fn import(&mut self, raw: &str) -> Result<ImportSummary, CatalogError> {
        let decoded = codec::decode(raw);
        if decoded.is_empty() {
            return Err(CatalogError::NoValidStations);
        }

        let mut seen: HashSet<String> = self.stations.iter().map(|s| s.url_key()).collect();
        let mut accepted = Vec::new();
        let mut summary = ImportSummary::default();

        for candidate in decoded {
            if seen.insert(candidate.url_key()) {
                accepted.push(candidate);
                summary.imported_count += 1;
            } else {
                debug!("catalog: import skipped duplicate {}", candidate.stream_url);
                summary.skipped_count += 1;
            }
        }

        if !accepted.is_empty() {
            let mut next = self.stations.clone();
            next.extend(accepted);
            self.commit(next)?;
        }
        info!(
            "catalog: import added {} skipped {}",
            summary.imported_count, summary.skipped_count
        );
        Ok(summary)
    }

    /// Read a user-supplied file and import it.
    pub async fn import_file(&mut self, path: &Path) -> Result<ImportSummary, CatalogError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(CatalogError::Read)?;
        self.import(&raw)
    }

    /// Replace the catalog with the default list.  With `keep_custom`, every
    /// existing record whose URL is not among the defaults is kept after them.
    /// Returns the resulting station count.
    pub async fn reset<S: DefaultSource>(
        &mut self,
        source: &S,
        keep_custom: bool,
    ) -> Result<usize, CatalogError> {
        let text = source
            .fetch()
            .await
            .map_err(CatalogError::DefaultsUnavailable)?;
        let defaults = codec::decode(&text);
        if defaults.is_empty() {
            return Err(CatalogError::DefaultsEmpty);
        }

        let mut next = defaults;
        if keep_custom {
            let default_keys: HashSet<String> = next.iter().map(|s| s.url_key()).collect();
            let custom: Vec<StationRecord> = self
                .stations
                .iter()
                .filter(|s| !default_keys.contains(&s.url_key()))
                .cloned()
                .collect();
            debug!("catalog: reset keeps {} custom stations", custom.len());
            next.extend(custom);
        }

        self.commit(next)?;
        self.load_error = None;
        info!(
            "catalog: reset to defaults (keep_custom={}), {} stations",
            keep_custom,
            self.stations.len()
        );
        Ok(self.stations.len())
    }

    fn commit(&mut self, next: Vec<StationRecord>) -> Result<(), CatalogError> {
        save_json(&*self.store, STATIONS_KEY, &next)?;
        self.stations = next;
        Ok(())
    }
}
