use std::net::SocketAddr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to {what}: {source}")]
    Resource {
        what: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to connect to {addr}: {source}")]
    Connection {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("control connection closed by peer")]
    ConnectionLost,

    #[error("failed to spawn {program}: {source}")]
    Process {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("screen saver helper closed its output")]
    PeerClosed,

    #[error("screen saver helper sent a line longer than {limit} bytes")]
    Protocol { limit: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn resource(what: &'static str, source: impl Into<std::io::Error>) -> Self {
        Error::Resource {
            what,
            source: source.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
