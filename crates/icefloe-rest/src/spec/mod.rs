//! Table-metadata document types.
//!
//! These mirror the Iceberg table-metadata JSON model, but keep the id
//! fields that the catalog stores in dedicated columns optional: stored
//! blobs may predate id assignment, and the read path repairs them from
//! the authoritative columns.

mod partition;
mod schema;
mod snapshot;
mod sorting;
mod statistics;
mod table_metadata;

pub use partition::{PartitionField, PartitionSpec};
pub use schema::{Schema, StructField};
pub use snapshot::{Operation, RefType, Snapshot, SnapshotReference, Summary};
pub use sorting::{NullOrder, SortDirection, SortField, SortOrder};
pub use statistics::{BlobMetadata, PartitionStatisticsFile, StatisticsFile};
pub use table_metadata::{TableMetadata, DEFAULT_FORMAT_VERSION};
