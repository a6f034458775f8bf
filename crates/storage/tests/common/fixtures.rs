use bytes::Bytes;
use std::path::Path;
use std::sync::Arc;
use strata_storage::providers::{EmptyProvider, FileSystemProvider};
use strata_storage::{ChainBuilder, ProviderRegistry};

/// Generate deterministic test data using a seeded pseudo-random generator
/// Same seed produces same output (reproducible tests)
#[allow(dead_code)]
pub fn seeded_bytes(seed: u64, len: usize) -> Bytes {
    let mut data = vec![0u8; len];
    let mut state = seed;

    // Simple LCG (Linear Congruential Generator)
    for chunk in data.chunks_mut(8) {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let bytes = state.to_le_bytes();
        for (i, byte) in chunk.iter_mut().enumerate() {
            *byte = bytes[i % 8];
        }
    }

    Bytes::from(data)
}

/// A filesystem provider terminated by an empty provider.
#[allow(dead_code)]
pub async fn filestore(dir: &Path, id: &str) -> Arc<FileSystemProvider> {
    Arc::new(
        FileSystemProvider::new(id, dir.join(id), Arc::new(EmptyProvider::new("end")))
            .await
            .unwrap(),
    )
}

/// A builder rooted in `dir` with the built-in registry.
#[allow(dead_code)]
pub fn builder(dir: &Path) -> ChainBuilder {
    ChainBuilder::new(ProviderRegistry::builtin())
        .with_base_dir(dir)
        .with_spool_dir(dir.join("spool"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_bytes_deterministic() {
        let data1 = seeded_bytes(42, 1000);
        let data2 = seeded_bytes(42, 1000);
        assert_eq!(data1, data2);

        let data3 = seeded_bytes(43, 1000);
        assert_ne!(data1, data3);
    }
}
