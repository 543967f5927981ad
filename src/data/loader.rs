use std::fs;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Duration;

use geojson::FeatureCollection;
use tracing::{debug, info};

use super::{parse_feature_collection, DatasetKind, LoadError};

/// Where raw dataset bytes come from
pub trait DatasetSource: Send + Sync {
    fn fetch(&self, path: &str) -> Result<Vec<u8>, LoadError>;
}

/// Reads dataset files relative to a data directory
#[derive(Debug, Clone)]
pub struct FsSource {
    root: PathBuf,
}

impl FsSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl DatasetSource for FsSource {
    fn fetch(&self, path: &str) -> Result<Vec<u8>, LoadError> {
        fs::read(self.root.join(path)).map_err(|source| LoadError::Io {
            path: path.to_string(),
            source,
        })
    }
}

/// Identifies one load request. Only the latest ticket per kind is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadTicket {
    pub kind: DatasetKind,
    pub generation: u64,
    /// Resolution the cells were requested for
    pub resolution: Option<u8>,
}

/// A finished fetch-and-parse, successful or not
#[derive(Debug)]
pub struct LoadOutcome {
    pub ticket: LoadTicket,
    pub path: String,
    pub result: Result<FeatureCollection, LoadError>,
}

/// Runs dataset fetches on the rayon pool and hands results back over a channel.
///
/// Requests are never cancelled. Results are applied on the UI thread, one at a
/// time, so the store never sees concurrent mutation.
pub struct DatasetLoader {
    source: Arc<dyn DatasetSource>,
    tx: Sender<LoadOutcome>,
    rx: Receiver<LoadOutcome>,
    in_flight: usize,
}

impl DatasetLoader {
    pub fn new(source: Arc<dyn DatasetSource>) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            source,
            tx,
            rx,
            in_flight: 0,
        }
    }

    /// Start fetching `path` in the background
    pub fn request(&mut self, ticket: LoadTicket, path: String) {
        info!(kind = %ticket.kind, generation = ticket.generation, path = %path, "loading dataset");
        let source = Arc::clone(&self.source);
        let tx = self.tx.clone();
        self.in_flight += 1;

        rayon::spawn(move || {
            let result = source
                .fetch(&path)
                .and_then(|bytes| parse_feature_collection(&path, bytes));
            // The receiver only goes away when the app shuts down
            if tx.send(LoadOutcome { ticket, path, result }).is_err() {
                debug!("loader channel closed before outcome was delivered");
            }
        });
    }

    /// Completed loads, without blocking
    pub fn drain(&mut self) -> Vec<LoadOutcome> {
        let outcomes: Vec<LoadOutcome> = self.rx.try_iter().collect();
        self.in_flight = self.in_flight.saturating_sub(outcomes.len());
        outcomes
    }

    /// Wait up to `timeout` for the next completed load
    pub fn recv_timeout(&mut self, timeout: Duration) -> Option<LoadOutcome> {
        match self.rx.recv_timeout(timeout) {
            Ok(outcome) => {
                self.in_flight = self.in_flight.saturating_sub(1);
                Some(outcome)
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Number of requests still running
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MemorySource(HashMap<String, String>);

    impl DatasetSource for MemorySource {
        fn fetch(&self, path: &str) -> Result<Vec<u8>, LoadError> {
            self.0
                .get(path)
                .map(|s| s.as_bytes().to_vec())
                .ok_or_else(|| LoadError::Io {
                    path: path.to_string(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
                })
        }
    }

    fn ticket(kind: DatasetKind, generation: u64) -> LoadTicket {
        LoadTicket {
            kind,
            generation,
            resolution: None,
        }
    }

    #[test]
    fn test_request_delivers_outcome() {
        let mut files = HashMap::new();
        files.insert(
            "stations.geojson".to_string(),
            r#"{"type": "FeatureCollection", "features": []}"#.to_string(),
        );
        let mut loader = DatasetLoader::new(Arc::new(MemorySource(files)));
        loader.request(ticket(DatasetKind::Stations, 1), "stations.geojson".into());
        assert_eq!(loader.in_flight(), 1);

        let outcome = loader.recv_timeout(Duration::from_secs(5)).expect("outcome");
        assert_eq!(outcome.ticket, ticket(DatasetKind::Stations, 1));
        assert!(outcome.result.unwrap().features.is_empty());
        assert_eq!(loader.in_flight(), 0);
    }

    #[test]
    fn test_missing_file_is_an_error_outcome() {
        let mut loader = DatasetLoader::new(Arc::new(MemorySource(HashMap::new())));
        loader.request(ticket(DatasetKind::Lines, 3), "lines.geojson".into());
        let outcome = loader.recv_timeout(Duration::from_secs(5)).expect("outcome");
        assert!(matches!(outcome.result, Err(LoadError::Io { .. })));
    }

    #[test]
    fn test_fs_source_missing_file() {
        let source = FsSource::new("/definitely/not/a/real/dir");
        assert!(matches!(source.fetch("x.geojson"), Err(LoadError::Io { .. })));
    }
}
