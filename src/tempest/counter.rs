// Tempest - Weather metrics exporter for Prometheus
//
// Copyright 2023 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use std::error::Error;
use std::fmt::{self, Formatter};
use std::fs;
use std::io;
use std::num::ParseIntError;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Name of the counter tracking attempted weather API calls.
pub const CALLS_COUNTER: &str = "weather_n_calls";

/// Error reading or writing a persisted counter value.
#[derive(Debug)]
pub enum StorageError {
    Io(PathBuf, io::Error),
    Parse(PathBuf, ParseIntError),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Io(path, e) => write!(f, "{}: {}", path.display(), e),
            StorageError::Parse(path, e) => write!(f, "invalid counter value in {}: {}", path.display(), e),
        }
    }
}

impl Error for StorageError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            StorageError::Io(_, ref e) => Some(e),
            StorageError::Parse(_, ref e) => Some(e),
        }
    }
}

/// File-backed storage for named counters.
///
/// Each counter is a single file in the storage directory, named after the
/// counter and holding its decimal value as the entire contents. Values are
/// rewritten wholesale on every update so a crash leaves either the old or
/// the new value, never a journal to replay.
#[derive(Debug)]
pub struct CounterStore {
    dir: PathBuf,
}

impl CounterStore {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        CounterStore { dir: dir.into() }
    }

    /// Read the persisted value of the named counter, initializing it to 0
    /// (and creating the file) if no value has been persisted yet.
    pub fn load(&self, name: &str) -> Result<u64, StorageError> {
        let path = self.path(name);
        if !path.exists() {
            fs::write(&path, "0").map_err(|e| StorageError::Io(path.clone(), e))?;
            return Ok(0);
        }

        let contents = fs::read_to_string(&path).map_err(|e| StorageError::Io(path.clone(), e))?;
        contents.trim().parse().map_err(|e| StorageError::Parse(path, e))
    }

    /// Overwrite the persisted value of the named counter.
    pub fn store(&self, name: &str, value: u64) -> Result<(), StorageError> {
        let path = self.path(name);
        fs::write(&path, value.to_string()).map_err(|e| StorageError::Io(path, e))
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}

/// A single named counter coupled with its backing store.
///
/// The value is loaded from storage once, at startup, and persisted
/// synchronously on every increment so that the value on disk reflects the
/// count handed back to the caller before any crash. A failed write is
/// logged but does not stop the in-memory value from advancing: losing
/// exact durability on a transient write failure is preferable to stalling
/// metrics collection.
#[derive(Debug)]
pub struct CallCounter {
    name: String,
    value: u64,
    store: CounterStore,
}

/// Handle used to share a `CallCounter` between the refresh loop and the
/// provider client.
pub type SharedCounter = Arc<Mutex<CallCounter>>;

impl CallCounter {
    /// Load the named counter from storage. Fails if the storage directory
    /// is unusable or holds a corrupt value, which is fatal at startup.
    pub fn load(store: CounterStore, name: &str) -> Result<Self, StorageError> {
        let value = store.load(name)?;
        Ok(CallCounter {
            name: name.to_owned(),
            value,
            store,
        })
    }

    /// Advance the counter by one and persist the new value, returning it.
    pub fn increment(&mut self) -> u64 {
        self.value += 1;
        if let Err(e) = self.store.store(&self.name, self.value) {
            tracing::error!(message = "unable to persist counter", counter = %self.name, error = %e);
        }
        self.value
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> u64 {
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::{CallCounter, CounterStore, StorageError, CALLS_COUNTER};
    use std::fs;

    #[test]
    fn test_load_missing_initializes_to_zero() {
        let dir = tempfile::tempdir().unwrap();
        let store = CounterStore::new(dir.path());

        assert_eq!(0, store.load(CALLS_COUNTER).unwrap());
        // The zero must have been persisted, not just returned
        assert_eq!("0", fs::read_to_string(dir.path().join(CALLS_COUNTER)).unwrap());
    }

    #[test]
    fn test_store_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = CounterStore::new(dir.path());

        for value in [0, 1, 7, 12_345, u64::MAX] {
            store.store(CALLS_COUNTER, value).unwrap();
            assert_eq!(value, store.load(CALLS_COUNTER).unwrap());
        }
    }

    #[test]
    fn test_load_corrupt_value() {
        let dir = tempfile::tempdir().unwrap();
        let store = CounterStore::new(dir.path());
        fs::write(dir.path().join(CALLS_COUNTER), "not-a-number").unwrap();

        let res = store.load(CALLS_COUNTER);
        assert!(matches!(res.unwrap_err(), StorageError::Parse(_, _)));
    }

    #[test]
    fn test_load_unusable_directory() {
        let res = CounterStore::new("/nonexistent/tempest-counters").load(CALLS_COUNTER);
        assert!(matches!(res.unwrap_err(), StorageError::Io(_, _)));
    }

    #[test]
    fn test_increment_persists() {
        let dir = tempfile::tempdir().unwrap();

        let mut counter = CallCounter::load(CounterStore::new(dir.path()), CALLS_COUNTER).unwrap();
        assert_eq!(1, counter.increment());
        assert_eq!(2, counter.increment());
        assert_eq!(3, counter.increment());

        // A fresh load sees the persisted value, as it would after a restart
        let reloaded = CallCounter::load(CounterStore::new(dir.path()), CALLS_COUNTER).unwrap();
        assert_eq!(3, reloaded.value());
    }

    #[test]
    fn test_increment_survives_store_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut counter = CallCounter::load(CounterStore::new(dir.path()), CALLS_COUNTER).unwrap();
        assert_eq!(1, counter.increment());

        // Removing the backing directory makes every write fail but the
        // in-memory value keeps advancing.
        drop(dir);
        assert_eq!(2, counter.increment());
        assert_eq!(3, counter.increment());
        assert_eq!(3, counter.value());
    }
}
