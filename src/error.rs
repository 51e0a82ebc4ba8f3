use std::path::PathBuf;

/// Errors surfaced at the configuration boundary.
///
/// Encoding never fails (a bad value degrades to an inline description) and
/// the rotating writer speaks [`std::io::Error`] as an [`std::io::Write`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid log level `{0}`")]
    InvalidLevel(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
