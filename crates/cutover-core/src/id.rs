//! Identifier generation.
//!
//! Both managers receive an [`IdGenerator`] so that record identifiers stay
//! unique across concurrent callers and process restarts.

use crate::store::current_timestamp;
use std::sync::atomic::{AtomicU64, Ordering};

/// Source of globally unique record identifiers.
pub trait IdGenerator: Send + Sync {
    /// Produce a fresh identifier.
    fn generate(&self) -> String;
}

/// Random UUID v4 identifiers.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn generate(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// Monotonic identifiers of the form `<node>-<epoch>-<counter>`.
///
/// The epoch is the generator's creation time, so two generators with the
/// same node name started at different times never collide.
#[derive(Debug)]
pub struct SequentialIdGenerator {
    node: String,
    epoch: u64,
    counter: AtomicU64,
}

impl SequentialIdGenerator {
    /// Create a generator for the given node name.
    pub fn new(node: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            epoch: current_timestamp(),
            counter: AtomicU64::new(0),
        }
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn generate(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{}-{:x}-{:08x}", self.node, self.epoch, n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_uuid_generator_unique() {
        let gen = UuidGenerator;
        let a = gen.generate();
        let b = gen.generate();
        assert_ne!(a, b);
        assert_eq!(a.len(), 36);
    }

    #[test]
    fn test_sequential_generator_concurrent() {
        let gen = Arc::new(SequentialIdGenerator::new("node1"));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let gen = Arc::clone(&gen);
            handles.push(std::thread::spawn(move || {
                (0..250).map(|_| gen.generate()).collect::<Vec<_>>()
            }));
        }

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(id.starts_with("node1-"));
                assert!(seen.insert(id), "duplicate id generated");
            }
        }
        assert_eq!(seen.len(), 1000);
    }
}
