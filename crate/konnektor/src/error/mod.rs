use soft_konnektor_cards::CardsError;
use thiserror::Error;

pub(crate) mod result;

// The taxonomy mirrors the fault vocabulary of the real device protocol;
// every library-level failure is folded into one of these before it
// crosses the service boundary.
#[derive(Error, Debug)]
pub enum KonnektorError {
    #[error("{0}")]
    Default(String),

    #[error("Certificate error: {0}")]
    Certificate(String),

    #[error("Certificate Not Found: {0}")]
    CertificateNotFound(String),

    #[error("Encoding Error: {0}")]
    Encoding(String),

    #[error("Malformed Signature: {0}")]
    MalformedSignature(String),

    #[error("OpenSSL Error: {0}")]
    OpenSsl(String),

    #[error("Revocation Source Unavailable: {0}")]
    RevocationSourceUnavailable(String),

    #[error("Unknown Card Handle: {0}")]
    UnknownCardHandle(String),

    #[error("Not Supported: operation {0} is not implemented by this simulator")]
    Unsupported(String),

    #[error("Unsupported Cryptosystem: {0}")]
    UnsupportedCryptosystem(String),
}

impl From<CardsError> for KonnektorError {
    fn from(e: CardsError) -> Self {
        match e {
            CardsError::UnknownCardHandle(m) => Self::UnknownCardHandle(m),
            CardsError::CertificateNotFound(m) => Self::CertificateNotFound(m),
            e => Self::Default(e.to_string()),
        }
    }
}

impl From<openssl::error::ErrorStack> for KonnektorError {
    fn from(e: openssl::error::ErrorStack) -> Self {
        Self::OpenSsl(format!("Error: {e}. Details: {e:?}"))
    }
}

impl From<der::Error> for KonnektorError {
    fn from(e: der::Error) -> Self {
        Self::Encoding(e.to_string())
    }
}

/// Return early with an error if a condition is not satisfied.
///
/// This macro is equivalent to `if !$cond { return Err(From::from($err)); }`.
#[macro_export]
macro_rules! kon_ensure {
    ($cond:expr, $msg:literal $(,)?) => {
        if !$cond {
            return ::core::result::Result::Err($crate::kon_error!($msg));
        }
    };
    ($cond:expr, $err:expr $(,)?) => {
        if !$cond {
            return ::core::result::Result::Err($err);
        }
    };
    ($cond:expr, $fmt:expr, $($arg:tt)*) => {
        if !$cond {
            return ::core::result::Result::Err($crate::kon_error!($fmt, $($arg)*));
        }
    };
}

/// Construct a Konnektor error from a string.
#[macro_export]
macro_rules! kon_error {
    ($msg:literal) => {
        $crate::KonnektorError::Default(::core::format_args!($msg).to_string())
    };
    ($err:expr $(,)?) => ({
        $crate::KonnektorError::Default($err.to_string())
    });
    ($fmt:expr, $($arg:tt)*) => {
        $crate::KonnektorError::Default(::core::format_args!($fmt, $($arg)*).to_string())
    };
}

/// Return early with an error.
#[macro_export]
macro_rules! kon_bail {
    ($msg:literal) => {
        return ::core::result::Result::Err($crate::kon_error!($msg))
    };
    ($err:expr $(,)?) => {
        return ::core::result::Result::Err($err)
    };
    ($fmt:expr, $($arg:tt)*) => {
        return ::core::result::Result::Err($crate::kon_error!($fmt, $($arg)*))
    };
}

#[expect(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::KonnektorError;

    #[test]
    fn test_konnektor_error_interpolation() {
        let var = 42;
        let err = kon_error!("interpolate {var}");
        assert_eq!("interpolate 42", err.to_string());

        let err = bail();
        assert_eq!("interpolate 43", err.unwrap_err().to_string());

        let err = ensure();
        assert_eq!("interpolate 44", err.unwrap_err().to_string());
    }

    fn bail() -> Result<(), KonnektorError> {
        let var = 43;
        kon_bail!("interpolate {var}");
    }

    fn ensure() -> Result<(), KonnektorError> {
        let var = 44;
        kon_ensure!(false, "interpolate {var}");
        Ok(())
    }
}
