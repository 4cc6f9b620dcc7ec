use std::fmt::Display;

use crate::error::CardsError;

pub(crate) type CardsResult<R> = Result<R, CardsError>;

pub trait CardsResultHelper<T> {
    fn context(self, context: &str) -> CardsResult<T>;
    fn with_context<D, O>(self, op: O) -> CardsResult<T>
    where
        D: Display + Send + Sync + 'static,
        O: FnOnce() -> D;
}

impl<T, E> CardsResultHelper<T> for Result<T, E>
where
    E: std::error::Error,
{
    fn context(self, context: &str) -> CardsResult<T> {
        self.map_err(|e| CardsError::Default(format!("{context}: {e}")))
    }

    fn with_context<D, O>(self, op: O) -> CardsResult<T>
    where
        D: Display + Send + Sync + 'static,
        O: FnOnce() -> D,
    {
        self.map_err(|e| CardsError::Default(format!("{}: {e}", op())))
    }
}

impl<T> CardsResultHelper<T> for Option<T> {
    fn context(self, context: &str) -> CardsResult<T> {
        self.ok_or_else(|| CardsError::Default(context.to_owned()))
    }

    fn with_context<D, O>(self, op: O) -> CardsResult<T>
    where
        D: Display + Send + Sync + 'static,
        O: FnOnce() -> D,
    {
        self.ok_or_else(|| CardsError::Default(format!("{}", op())))
    }
}
