//! End-to-end tests for building, persisting and querying snapshots.
