//! Storage ports and in-memory adapters.

mod memory;
mod ports;

pub use memory::{InMemoryChunkStore, InMemoryGraphStore, InMemoryIrStore};
pub use ports::{Chunk, ChunkStore, GraphStore, IrStore, SnapshotInfo};
