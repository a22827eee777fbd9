// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::fmt::Display;

use fvm_ipld_encoding::RawBytes;
use fvm_shared::error::ExitCode;
use thiserror::Error;

/// The error type returned by actor method calls.
///
/// Aborting a method with an `ActorError` discards every state change made by the
/// enclosing message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("ActorError(exit_code: {exit_code:?}, msg: {msg})")]
pub struct ActorError {
    /// The exit code for this invocation.
    exit_code: ExitCode,
    /// Message for debugging purposes.
    msg: String,
    /// Optional exit data.
    data: RawBytes,
}

impl ActorError {
    /// Creates a new ActorError without checking the code is a user exit code.
    pub fn unchecked(code: ExitCode, msg: String) -> Self {
        Self { exit_code: code, msg, data: RawBytes::default() }
    }

    pub fn illegal_argument(msg: String) -> Self {
        Self::unchecked(ExitCode::USR_ILLEGAL_ARGUMENT, msg)
    }
    pub fn not_found(msg: String) -> Self {
        Self::unchecked(ExitCode::USR_NOT_FOUND, msg)
    }
    pub fn forbidden(msg: String) -> Self {
        Self::unchecked(ExitCode::USR_FORBIDDEN, msg)
    }
    pub fn insufficient_funds(msg: String) -> Self {
        Self::unchecked(ExitCode::USR_INSUFFICIENT_FUNDS, msg)
    }
    pub fn illegal_state(msg: String) -> Self {
        Self::unchecked(ExitCode::USR_ILLEGAL_STATE, msg)
    }
    pub fn serialization(msg: String) -> Self {
        Self::unchecked(ExitCode::USR_SERIALIZATION, msg)
    }
    pub fn unhandled_message(msg: String) -> Self {
        Self::unchecked(ExitCode::USR_UNHANDLED_MESSAGE, msg)
    }
    pub fn assertion_failed(msg: String) -> Self {
        Self::unchecked(ExitCode::USR_ASSERTION_FAILED, msg)
    }

    /// Returns the exit code of the error.
    pub fn exit_code(&self) -> ExitCode {
        self.exit_code
    }

    /// Error message of the actor error.
    pub fn msg(&self) -> &str {
        &self.msg
    }

    /// Returns the optional data that might be associated with the error.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Prefix error message with a string message.
    pub fn wrap(mut self, msg: impl AsRef<str>) -> Self {
        self.msg = format!("{}: {}", msg.as_ref(), self.msg);
        self
    }
}

/// Converts a raw encoding error into an ErrSerialization.
impl From<fvm_ipld_encoding::Error> for ActorError {
    fn from(e: fvm_ipld_encoding::Error) -> Self {
        Self::serialization(e.to_string())
    }
}

/// Convenience macro for generating Actor Errors
#[macro_export]
macro_rules! actor_error {
    // Error with only one stringable expression
    ( $code:ident; $msg:expr ) => { $crate::ActorError::$code($msg.to_string()) };

    // String with positional arguments
    ( $code:ident; $msg:literal $(, $ex:expr)+ ) => {
        $crate::ActorError::$code(format!($msg, $($ex,)*))
    };

    // Error with only one stringable expression, with comma separator
    ( $code:ident, $msg:expr ) => { $crate::actor_error!($code; $msg) };

    // String with positional arguments, with comma separator
    ( $code:ident, $msg:literal $(, $ex:expr)+ ) => {
        $crate::actor_error!($code; $msg $(, $ex)*)
    };
}

// Adds context to an actor error's descriptive message.
pub trait ActorContext<T> {
    fn context<C>(self, context: C) -> Result<T, ActorError>
    where
        C: Display + 'static;

    fn with_context<C, F>(self, f: F) -> Result<T, ActorError>
    where
        C: Display + 'static,
        F: FnOnce() -> C;
}

impl<T> ActorContext<T> for Result<T, ActorError> {
    fn context<C>(self, context: C) -> Result<T, ActorError>
    where
        C: Display + 'static,
    {
        self.map_err(|err| err.wrap(context.to_string()))
    }

    fn with_context<C, F>(self, f: F) -> Result<T, ActorError>
    where
        C: Display + 'static,
        F: FnOnce() -> C,
    {
        self.map_err(|err| err.wrap(f().to_string()))
    }
}

// Adapts a target into an actor error.
pub trait AsActorError<T>: Sized {
    fn exit_code(self, code: ExitCode) -> Result<T, ActorError>;

    fn context_code<C>(self, code: ExitCode, context: C) -> Result<T, ActorError>
    where
        C: Display + 'static;

    fn with_context_code<C, F>(self, code: ExitCode, f: F) -> Result<T, ActorError>
    where
        C: Display + 'static,
        F: FnOnce() -> C;
}

impl<T, E: Display> AsActorError<T> for Result<T, E> {
    fn exit_code(self, code: ExitCode) -> Result<T, ActorError> {
        self.map_err(|err| ActorError::unchecked(code, err.to_string()))
    }

    fn context_code<C>(self, code: ExitCode, context: C) -> Result<T, ActorError>
    where
        C: Display + 'static,
    {
        self.map_err(|err| ActorError::unchecked(code, format!("{}: {}", context, err)))
    }

    fn with_context_code<C, F>(self, code: ExitCode, f: F) -> Result<T, ActorError>
    where
        C: Display + 'static,
        F: FnOnce() -> C,
    {
        self.map_err(|err| ActorError::unchecked(code, format!("{}: {}", f(), err)))
    }
}

impl<T> AsActorError<T> for Option<T> {
    fn exit_code(self, code: ExitCode) -> Result<T, ActorError> {
        self.ok_or_else(|| ActorError::unchecked(code, "None".to_string()))
    }

    fn context_code<C>(self, code: ExitCode, context: C) -> Result<T, ActorError>
    where
        C: Display + 'static,
    {
        self.ok_or_else(|| ActorError::unchecked(code, context.to_string()))
    }

    fn with_context_code<C, F>(self, code: ExitCode, f: F) -> Result<T, ActorError>
    where
        C: Display + 'static,
        F: FnOnce() -> C,
    {
        self.ok_or_else(|| ActorError::unchecked(code, f().to_string()))
    }
}
