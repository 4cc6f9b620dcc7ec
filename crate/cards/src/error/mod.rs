use thiserror::Error;

pub(crate) mod result;

#[derive(Error, Debug)]
pub enum CardsError {
    #[error("{0}")]
    Default(String),

    #[error("Certificate Not Found: {0}")]
    CertificateNotFound(String),

    #[error("OpenSSL Error: {0}")]
    OpenSsl(String),

    #[error("Unknown Card Handle: {0}")]
    UnknownCardHandle(String),
}

impl From<openssl::error::ErrorStack> for CardsError {
    fn from(e: openssl::error::ErrorStack) -> Self {
        Self::OpenSsl(format!("Error: {e}. Details: {e:?}"))
    }
}

/// Return early with an error if a condition is not satisfied.
///
/// This macro is equivalent to `if !$cond { return Err(From::from($err)); }`.
#[macro_export]
macro_rules! cards_ensure {
    ($cond:expr, $msg:literal $(,)?) => {
        if !$cond {
            return ::core::result::Result::Err($crate::cards_error!($msg));
        }
    };
    ($cond:expr, $err:expr $(,)?) => {
        if !$cond {
            return ::core::result::Result::Err($err);
        }
    };
    ($cond:expr, $fmt:expr, $($arg:tt)*) => {
        if !$cond {
            return ::core::result::Result::Err($crate::cards_error!($fmt, $($arg)*));
        }
    };
}

/// Construct a cards error from a string.
#[macro_export]
macro_rules! cards_error {
    ($msg:literal) => {
        $crate::CardsError::Default(::core::format_args!($msg).to_string())
    };
    ($err:expr $(,)?) => ({
        $crate::CardsError::Default($err.to_string())
    });
    ($fmt:expr, $($arg:tt)*) => {
        $crate::CardsError::Default(::core::format_args!($fmt, $($arg)*).to_string())
    };
}
