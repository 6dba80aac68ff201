use core::fmt;
use std::error::Error as StdError;

use lryao_core::{
    bucket::BucketError, bundle::BundleError, circuit::CircuitError, difference::DifferenceError,
    evaluation::EvaluationError, matrix::MatrixError, selection::SelectionError, CheatError,
};

use crate::ot::OTError;

type BoxError = Box<dyn StdError + Send + Sync + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ErrorKind {
    Io,
    Cheat,
    Core,
    Ot,
    State,
    Config,
    Input,
}

macro_rules! party_error {
    ($name:ident, $party:literal) => {
        #[doc = concat!($party, " error.")]
        #[derive(Debug, thiserror::Error)]
        pub struct $name {
            kind: ErrorKind,
            source: Option<BoxError>,
        }

        impl $name {
            fn new<E>(kind: ErrorKind, source: E) -> Self
            where
                E: Into<BoxError>,
            {
                Self {
                    kind,
                    source: Some(source.into()),
                }
            }

            pub(crate) fn state<E>(err: E) -> Self
            where
                E: Into<BoxError>,
            {
                Self::new(ErrorKind::State, err)
            }

            pub(crate) fn config<E>(err: E) -> Self
            where
                E: Into<BoxError>,
            {
                Self::new(ErrorKind::Config, err)
            }

            pub(crate) fn input<E>(err: E) -> Self
            where
                E: Into<BoxError>,
            {
                Self::new(ErrorKind::Input, err)
            }

            /// Returns `true` if the error was caused by the peer deviating from the protocol.
            pub fn is_cheat(&self) -> bool {
                self.kind == ErrorKind::Cheat
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(concat!($party, " error: "))?;

                match self.kind {
                    ErrorKind::Io => f.write_str("io error")?,
                    ErrorKind::Cheat => f.write_str("cheat detected")?,
                    ErrorKind::Core => f.write_str("core error")?,
                    ErrorKind::Ot => f.write_str("ot error")?,
                    ErrorKind::State => f.write_str("state error")?,
                    ErrorKind::Config => f.write_str("config error")?,
                    ErrorKind::Input => f.write_str("invalid input")?,
                }

                if let Some(source) = &self.source {
                    write!(f, " caused by: {}", source)?;
                }

                Ok(())
            }
        }

        impl From<std::io::Error> for $name {
            fn from(err: std::io::Error) -> Self {
                // A message of the wrong type or shape is the peer's fault.
                let kind = match err.kind() {
                    std::io::ErrorKind::InvalidData => ErrorKind::Cheat,
                    _ => ErrorKind::Io,
                };

                Self::new(kind, err)
            }
        }

        impl From<CheatError> for $name {
            fn from(err: CheatError) -> Self {
                tracing::warn!(reason = err.reason(), "cheat detected");
                Self::new(ErrorKind::Cheat, err)
            }
        }

        impl From<DifferenceError> for $name {
            fn from(err: DifferenceError) -> Self {
                match err {
                    DifferenceError::Cheat(err) => err.into(),
                    err => Self::new(ErrorKind::Core, err),
                }
            }
        }

        impl From<EvaluationError> for $name {
            fn from(err: EvaluationError) -> Self {
                match err {
                    EvaluationError::Cheat(err) => err.into(),
                    err => Self::new(ErrorKind::Core, err),
                }
            }
        }

        impl From<BucketError> for $name {
            fn from(err: BucketError) -> Self {
                Self::new(ErrorKind::Core, err)
            }
        }

        impl From<BundleError> for $name {
            fn from(err: BundleError) -> Self {
                Self::new(ErrorKind::Core, err)
            }
        }

        impl From<MatrixError> for $name {
            fn from(err: MatrixError) -> Self {
                Self::new(ErrorKind::Core, err)
            }
        }

        impl From<SelectionError> for $name {
            fn from(err: SelectionError) -> Self {
                Self::new(ErrorKind::Core, err)
            }
        }

        impl From<CircuitError> for $name {
            fn from(err: CircuitError) -> Self {
                Self::new(ErrorKind::Core, err)
            }
        }

        impl From<OTError> for $name {
            fn from(err: OTError) -> Self {
                match err {
                    OTError::IOError(err) => err.into(),
                    err => Self::new(ErrorKind::Ot, err),
                }
            }
        }
    };
}

party_error!(P1Error, "P1");
party_error!(P2Error, "P2");

/// A protocol error.
#[derive(Debug, thiserror::Error)]
#[allow(missing_docs)]
pub enum ProtocolError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("cheat detected: {0}")]
    Cheat(BoxError),
    #[error("core error: {0}")]
    Core(BoxError),
    #[error(transparent)]
    Ot(#[from] OTError),
}

impl ProtocolError {
    /// Returns `true` if the error was caused by a party deviating from the protocol.
    pub fn is_cheat(&self) -> bool {
        matches!(self, ProtocolError::Cheat(_))
    }
}

impl From<P1Error> for ProtocolError {
    fn from(err: P1Error) -> Self {
        if err.is_cheat() {
            ProtocolError::Cheat(Box::new(err))
        } else {
            ProtocolError::Core(Box::new(err))
        }
    }
}

impl From<P2Error> for ProtocolError {
    fn from(err: P2Error) -> Self {
        if err.is_cheat() {
            ProtocolError::Cheat(Box::new(err))
        } else {
            ProtocolError::Core(Box::new(err))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    #[test]
    fn test_invalid_data_is_cheat() {
        let err = P2Error::from(io::Error::new(io::ErrorKind::InvalidData, "unexpected type"));
        assert!(err.is_cheat());

        let err = P2Error::from(io::Error::new(io::ErrorKind::BrokenPipe, "closed"));
        assert!(!err.is_cheat());
    }

    #[test]
    fn test_cheat_propagates() {
        let err = P1Error::from(DifferenceError::Cheat(CheatError::new("decommitment of k failed!")));
        assert!(err.is_cheat());
        assert!(err.to_string().contains("decommitment of k failed!"));

        let err = ProtocolError::from(err);
        assert!(err.is_cheat());
    }
}
