use cpu_profiler_common::SamplingType;
use std::path::PathBuf;

/// Misuse of the sampling API on one thread.
///
/// These never escape the public API: they are logged and the offending call is
/// ignored or recovered from.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UsageError {
    #[error("begin_thread called on a thread that is already being sampled")]
    ThreadAlreadyActive,
    #[error("end_thread called on a thread that isn't being sampled")]
    ThreadNotActive,
    #[error("end_thread called with {count} sample(s) still open, sampling data will not be valid")]
    UnclosedSamples { count: usize },
    #[error("mismatched end of {sampling_type} sample, no sample is open")]
    NoOpenSample { sampling_type: SamplingType },
    #[error("mismatched end of sample, expected the {expected} end call but got the {found} one")]
    SamplingTypeMismatch {
        expected: SamplingType,
        found: SamplingType,
    },
    #[error("mismatched end of sample, expected \"{expected}\" but got \"{found}\"")]
    NameMismatch { expected: String, found: String },
    #[error("profiler thread state is already borrowed on this thread")]
    ThreadStateBusy,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read profiler config {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse profiler config")]
    Parse(#[from] serde_json::Error),
    #[error("invalid profiler config: {0}")]
    Invalid(String),
}
