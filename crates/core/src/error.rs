use thiserror::Error;

/// Invalid length / thread-count input to the range partitioner.
///
/// Raised synchronously at submission; a task that fails partitioning never
/// reaches the pool.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PartitionError {
    #[error("input length must not be negative (got {0})")]
    NegativeLength(i64),

    #[error("thread count must be between 1 and 65536 (got {0})")]
    InvalidThreadCount(i64),

    #[error("input length {0} does not fit the partition index space")]
    LengthOverflow(usize),
}

#[derive(Error, Debug)]
pub enum WheelhouseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Partition error: {0}")]
    Partition(#[from] PartitionError),

    #[error("unknown {kind} tag: {value}")]
    UnknownTag { kind: &'static str, value: String },

    #[error("runtime is not running")]
    RuntimeStopped,

    #[error("unit spawn failed: {0}")]
    Spawn(String),

    #[error("{0}")]
    Other(String),
}
