use std::sync::{Arc, RwLock};

use crate::index::CodeIndex;

/// The index currently being served.
///
/// Readers take an `Arc` to an immutable snapshot and keep it for as long
/// as they need; a rebuild publishes a new snapshot by swapping the
/// pointer. A published [`CodeIndex`] is never mutated.
#[derive(Debug, Clone, Default)]
pub struct SharedIndex {
    current: Arc<RwLock<Arc<CodeIndex>>>,
}

impl SharedIndex {
    pub fn new(index: CodeIndex) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(index))),
        }
    }

    /// The latest published snapshot.
    pub fn snapshot(&self) -> Arc<CodeIndex> {
        // A poisoned lock still holds a complete snapshot: the only write
        // is a pointer assignment.
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Publish `index`, returning the snapshot it replaced.
    pub fn replace(&self, index: CodeIndex) -> Arc<CodeIndex> {
        let next = Arc::new(index);
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        std::mem::replace(&mut *guard, next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{index::IndexEntry, period::Period};

    fn index_with(code: &str) -> CodeIndex {
        let mut index = CodeIndex::new();
        index.insert(IndexEntry {
            document_id: "a.pdf".into(),
            link: "/static/pdfs/a.pdf".into(),
            code: code.into(),
            pages: vec![1],
            occurrences: 1,
            period: Period::new(2024, 1).unwrap(),
        });
        index
    }

    #[test]
    fn readers_keep_their_snapshot_across_a_swap() {
        let shared = SharedIndex::new(index_with("old"));
        let held = shared.snapshot();

        let previous = shared.replace(index_with("new"));

        assert!(held.get("old").is_some());
        assert!(Arc::ptr_eq(&held, &previous));
        assert!(shared.snapshot().get("new").is_some());
        assert!(shared.snapshot().get("old").is_none());
    }

    #[test]
    fn clones_share_the_same_slot() {
        let shared = SharedIndex::default();
        let other = shared.clone();
        other.replace(index_with("abc"));
        assert_eq!(shared.snapshot().code_count(), 1);
    }
}
