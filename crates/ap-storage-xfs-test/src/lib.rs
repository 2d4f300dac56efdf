//! End-to-end tests for the ap-storage-xfs-* crates.
