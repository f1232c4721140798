mod ext;
mod macros;

use crate::prelude::*;
use crate::shrink::{EncodeError, FailureReason};
use crate::util::DynError;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing_error::SpanTrace;

pub(crate) use ext::*;
pub(crate) use macros::*;

pub type Result<T = (), E = Error> = std::result::Result<T, E>;

/// Describes any possible error that may happen in the application lifetime.
#[derive(Clone)]
pub struct Error {
    imp: Arc<ErrorImp>,
}

struct ErrorImp {
    /// Small identifier used for debugging purposes.
    /// It is mentioned in the chat when the error happens.
    /// This way we as developers can copy it and lookup the logs using this id.
    id: String,
    kind: ErrorKind,

    // Participates only in debug impl
    spantrace: SpanTrace,
}

#[derive(Error, Debug)]
pub(crate) enum ErrorKind {
    #[error(transparent)]
    Tg {
        #[from]
        source: teloxide::RequestError,
    },

    #[error(transparent)]
    Media {
        #[from]
        source: crate::tg::MediaError,
    },

    #[error(transparent)]
    Encode {
        #[from]
        source: EncodeError,
    },

    #[error(transparent)]
    Hosting {
        #[from]
        source: crate::hosting::HostingError,
    },

    #[error(transparent)]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Unrecoverable kind of error, that is not supposed to happen, but when
    /// it happens we can't do anything reasonable about it, so no structural
    /// error handling is possible, this error is just propagated to the top.
    #[error("FATAL: {message}")]
    Fatal {
        message: String,
        source: Option<Box<DynError>>,
    },
}

impl Error {
    pub(crate) fn id(&self) -> &str {
        &self.imp.id
    }

    pub(crate) fn kind(&self) -> &ErrorKind {
        &self.imp.kind
    }

    /// Errors caused by the input the user sent us. There is nothing to
    /// investigate on our side when these happen.
    pub(crate) fn is_user_error(&self) -> bool {
        match self.kind() {
            ErrorKind::Media { source } => source.is_user_error(),
            ErrorKind::Encode { source } => matches!(
                source.reason(),
                FailureReason::InvalidInput | FailureReason::BudgetUnattainable
            ),
            ErrorKind::Tg { .. }
            | ErrorKind::Hosting { .. }
            | ErrorKind::Io { .. }
            | ErrorKind::Fatal { .. } => false,
        }
    }

    /// Returns the classification of the re-encoding failure if this error
    /// originates from the re-encoder.
    pub(crate) fn encode_failure(&self) -> Option<FailureReason> {
        match self.kind() {
            ErrorKind::Encode { source } => Some(source.reason()),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error (id: {}): {}", self.imp.id, self.imp.kind)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.imp.kind.source()
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)?;
        fmt::Display::fmt(&self.imp.spantrace, f)
    }
}

impl<T: Into<ErrorKind>> From<T> for Error {
    #[track_caller]
    fn from(kind: T) -> Self {
        let imp = ErrorImp {
            kind: kind.into(),
            id: nanoid::nanoid!(6),
            spantrace: SpanTrace::capture(),
        };

        let err = Self { imp: Arc::new(imp) };

        trace!(err = tracing_err(&err), "Created an error");

        err
    }
}
