use std::io;
use thiserror::Error;

use crate::packet::CodecError;
use crate::Family;

/// Failures of a probe session
///
/// Only `Codec` is tolerated inside a running session, where the offending datagram is dropped.
/// `Closed` marks an intentional shutdown of the transport and is never reported as a failure.
/// Every other variant ends the process with a non-zero status.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("{0}")]
    Usage(#[from] clap::Error),

    #[error("could not resolve {host}: {source}")]
    Resolution {
        host: String,
        #[source]
        source: io::Error,
    },

    #[error("{host} has no {family} address")]
    NoAddress { host: String, family: Family },

    #[error("transport error: {0}")]
    Transport(#[source] io::Error),

    #[error("could not configure socket: {0}")]
    Config(#[source] io::Error),

    #[error("transport closed")]
    Closed,

    #[error("malformed datagram: {0}")]
    Codec(#[from] CodecError),

    #[error("could not write report: {0}")]
    Output(#[source] io::Error),

    #[error("receiver loop stopped unexpectedly")]
    ListenerStopped,
}

impl ProbeError {
    /// Return `true` if this error stands for the intentional closing of the transport
    pub fn is_closed(&self) -> bool {
        matches!(self, ProbeError::Closed)
    }

    /// Exit status reported to the shell
    ///
    /// Usage errors exit with 1, the same status `clap::Error::exit` uses.
    pub fn exit_code(&self) -> i32 {
        match self {
            ProbeError::Closed => 0,
            ProbeError::Resolution { .. } | ProbeError::NoAddress { .. } => 68,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_is_not_a_failure() {
        assert!(ProbeError::Closed.is_closed());
        assert_eq!(ProbeError::Closed.exit_code(), 0);
        assert!(!ProbeError::ListenerStopped.is_closed());
        assert_ne!(ProbeError::ListenerStopped.exit_code(), 0);
    }

    #[test]
    fn usage_error_matches_clap_status() {
        let err = ProbeError::Usage(clap::Error::with_description(
            "bad value",
            clap::ErrorKind::InvalidValue,
        ));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn resolution_error_names_host() {
        let err = ProbeError::Resolution {
            host: "nowhere.invalid".to_string(),
            source: io::Error::new(io::ErrorKind::NotFound, "no such host"),
        };
        assert!(err.to_string().contains("nowhere.invalid"));
        assert_ne!(err.exit_code(), 0);
    }

    #[test]
    fn codec_error_converts() {
        let err: ProbeError = CodecError::Truncated { needed: 4, actual: 1 }.into();
        assert!(matches!(err, ProbeError::Codec(_)));
    }
}
