use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use align_stack_features::Features;
use parking_lot::Mutex;

/// Detected features keyed by source path and sensitivity.
///
/// Lets an align call reuse the work of a previous one on the same files.
/// Entries are never mutated once inserted and never evicted; file contents
/// are not part of the key, so callers that rewrite inputs in place must
/// [`clear`](Self::clear) it.
#[derive(Default)]
pub struct FeatureCache {
    entries: Mutex<HashMap<(PathBuf, u32), Arc<Features>>>,
}

impl FeatureCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(path: &Path, sensitivity: f32) -> (PathBuf, u32) {
        (path.to_path_buf(), sensitivity.to_bits())
    }

    pub fn get(&self, path: &Path, sensitivity: f32) -> Option<Arc<Features>> {
        self.entries.lock().get(&Self::key(path, sensitivity)).cloned()
    }

    /// Insert unless another worker got there first; returns the stored entry.
    pub fn insert(&self, path: &Path, sensitivity: f32, features: Features) -> Arc<Features> {
        self.entries
            .lock()
            .entry(Self::key(path, sensitivity))
            .or_insert_with(|| Arc::new(features))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}
