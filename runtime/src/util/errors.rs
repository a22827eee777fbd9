// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::{ActorError, AsActorError};
use fvm_shared::error::ExitCode;
use std::fmt::Display;

/// Shorthands for the exit codes most state accessors report.
pub trait AsActorErrors<T>: Sized {
    fn or_illegal_state<C>(self, context: C) -> Result<T, ActorError>
    where
        C: Display + 'static;

    fn or_with_illegal_state<C, F>(self, f: F) -> Result<T, ActorError>
    where
        C: Display + 'static,
        F: FnOnce() -> C;

    fn or_illegal_argument<C>(self, context: C) -> Result<T, ActorError>
    where
        C: Display + 'static;
}

impl<T, E: Display> AsActorErrors<T> for Result<T, E> {
    fn or_illegal_state<C>(self, context: C) -> Result<T, ActorError>
    where
        C: Display + 'static,
    {
        self.context_code(ExitCode::USR_ILLEGAL_STATE, context)
    }

    fn or_with_illegal_state<C, F>(self, f: F) -> Result<T, ActorError>
    where
        C: Display + 'static,
        F: FnOnce() -> C,
    {
        self.with_context_code(ExitCode::USR_ILLEGAL_STATE, f)
    }

    fn or_illegal_argument<C>(self, context: C) -> Result<T, ActorError>
    where
        C: Display + 'static,
    {
        self.context_code(ExitCode::USR_ILLEGAL_ARGUMENT, context)
    }
}
