use std::fmt::Display;

use crate::error::KonnektorError;

pub(crate) type KonnektorResult<R> = Result<R, KonnektorError>;

pub trait KonnektorResultHelper<T> {
    fn context(self, context: &str) -> KonnektorResult<T>;
    fn with_context<D, O>(self, op: O) -> KonnektorResult<T>
    where
        D: Display + Send + Sync + 'static,
        O: FnOnce() -> D;
}

impl<T, E> KonnektorResultHelper<T> for Result<T, E>
where
    E: std::error::Error,
{
    fn context(self, context: &str) -> KonnektorResult<T> {
        self.map_err(|e| KonnektorError::Default(format!("{context}: {e}")))
    }

    fn with_context<D, O>(self, op: O) -> KonnektorResult<T>
    where
        D: Display + Send + Sync + 'static,
        O: FnOnce() -> D,
    {
        self.map_err(|e| KonnektorError::Default(format!("{}: {e}", op())))
    }
}

impl<T> KonnektorResultHelper<T> for Option<T> {
    fn context(self, context: &str) -> KonnektorResult<T> {
        self.ok_or_else(|| KonnektorError::Default(context.to_owned()))
    }

    fn with_context<D, O>(self, op: O) -> KonnektorResult<T>
    where
        D: Display + Send + Sync + 'static,
        O: FnOnce() -> D,
    {
        self.ok_or_else(|| KonnektorError::Default(format!("{}", op())))
    }
}
