//! Error types for monitor sources.

use thiserror::Error;

/// Failure of a single monitor source.
///
/// The collector logs these and treats the source as having contributed
/// nothing; they never abort fusion.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read monitor source {source_name}: {error}")]
    Io {
        source_name: String,
        #[source]
        error: std::io::Error,
    },
    #[error("monitor source {0} is unavailable: {1}")]
    Unavailable(String, String),
    #[error("report sink closed")]
    SinkClosed,
}
