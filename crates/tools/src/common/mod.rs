pub mod io;
pub mod progress;
pub mod shards;

pub use io::{OutputFile, open_reader, remove_if_exists};
pub use shards::{DEFAULT_SHARD_EXTENSION, ShardError, find_shards};
