// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use itertools::Itertools;
use std::{cell::RefCell, fmt::Display, rc::Rc};

use regex::Regex;

/// Collects invariant violations found while walking actor state.
/// Accumulators derived with `with_prefix` share the parent's message list.
#[derive(Debug, Default)]
pub struct MessageAccumulator {
    msgs: Rc<RefCell<Vec<String>>>,
    prefix: String,
}

impl MessageAccumulator {
    /// Returns an accumulator writing to the same messages, prefixing each new one.
    pub fn with_prefix<S: AsRef<str>>(&self, prefix: S) -> Self {
        MessageAccumulator { msgs: self.msgs.clone(), prefix: self.prefix.clone() + prefix.as_ref() }
    }

    pub fn is_empty(&self) -> bool {
        self.msgs.borrow().is_empty()
    }

    pub fn messages(&self) -> Vec<String> {
        self.msgs.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.msgs.borrow().len()
    }

    pub fn add<S: AsRef<str>>(&self, msg: S) {
        self.msgs.borrow_mut().push(format!("{}{}", self.prefix, msg.as_ref()));
    }

    /// Adds a message if predicate is false.
    pub fn require<S: AsRef<str>>(&self, predicate: bool, msg: S) {
        if !predicate {
            self.add(msg);
        }
    }

    /// Adds a message if result is `Err`, returning the success value otherwise.
    pub fn require_no_error<V, E: Display, S: AsRef<str>>(
        &self,
        result: Result<V, E>,
        msg: S,
    ) -> Option<V> {
        match result {
            Ok(v) => Some(v),
            Err(e) => {
                self.add(format!("{}: {e}", msg.as_ref()));
                None
            }
        }
    }

    /// Panics listing every message if any were accumulated.
    #[track_caller]
    pub fn assert_empty(&self) {
        assert!(self.is_empty(), "{}", self.messages().join("\n"))
    }

    /// Asserts the accumulated messages match the patterns, in order.
    #[track_caller]
    pub fn assert_expected(&self, expected_patterns: &[Regex]) {
        let messages = self.messages();
        assert_eq!(
            messages.len(),
            expected_patterns.len(),
            "unexpected accumulator messages.\nactual: {}\nexpected: {}",
            messages.join("\n"),
            expected_patterns.iter().map(|regex| regex.as_str()).join("\n")
        );
        for (message, pattern) in messages.iter().zip(expected_patterns) {
            assert!(
                pattern.is_match(message),
                "message does not match. actual: {}, expected: {}",
                message,
                pattern.as_str()
            );
        }
    }
}
