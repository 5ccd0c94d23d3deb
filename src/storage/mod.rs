pub mod backend;
pub mod collection;
pub mod compression;
pub mod disk;
pub mod indexes;
pub mod memory;

pub use backend::{
    Document, DocumentBackend, Filter, FindOptions, IndexDirection, IndexKey, IndexSpec, ScoredDocument,
    SortKey, SumAggregate, ID_FIELD,
};
pub use disk::DiskStorage;
pub use indexes::{ensure_indexes, ProvisionReport, FILE_INDEXES, STATS_INDEXES, VERSION_INDEXES};
pub use memory::MemoryBackend;
