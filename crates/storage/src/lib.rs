//! Storage layer for labcore
//!
//! - `record`: keys and values of the record families
//! - `sharded`: ordered, family-sharded record store
//! - `partitioned`: time-partitioned event storage
//! - `traits`: the Storage trait consumed by transaction validation

#![warn(missing_docs)]

pub mod partitioned;
pub mod record;
pub mod sharded;
pub mod traits;

pub use partitioned::{EventPosition, Partition, PartitionDrop, PartitionKey, PartitionedLog};
pub use record::{Family, Record, RecordKey, VersionedRecord};
pub use sharded::{Shard, ShardedStore};
pub use traits::{KeyRange, Storage};
