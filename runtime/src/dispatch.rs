// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use castaway::cast;
use std::marker::PhantomData;

use fvm_ipld_encoding::ipld_block::IpldBlock;
use serde::{Deserialize, Serialize};

use crate::ActorError;

/// Implements `ActorCode::invoke_method` from a table of method variants to handlers:
///
/// ```ignore
/// #[derive(FromPrimitive)]
/// #[repr(u64)]
/// enum Method {
///     Constructor = 1,
///     CronTick = 7,
/// }
/// impl ActorCode for Actor {
///     type Methods = Method;
///     fn name() -> &'static str { "StorageMarket" }
///     actor_dispatch! {
///         Constructor => constructor,
///         CronTick => cron_tick,
///     }
/// }
/// ```
#[macro_export]
macro_rules! actor_dispatch {
    ($($(#[$m:meta])* $($method:ident)|+ => $func:ident,)*) => {
        fn invoke_method<RT>(
            rt: &mut RT,
            method: fvm_shared::MethodNum,
            args: Option<fvm_ipld_encoding::ipld_block::IpldBlock>,
        ) -> Result<Option<fvm_ipld_encoding::ipld_block::IpldBlock>, $crate::ActorError>
        where
            RT: $crate::runtime::Runtime,
            RT::Blockstore: Clone,
        {
            match <Self::Methods as num_traits::FromPrimitive>::from_u64(method) {
                $($(#[$m])*
                  Some($(Self::Methods::$method)|+) => $crate::dispatch(rt, Self::$func, &args),)*
                None => Err($crate::actor_error!(unhandled_message; "invalid method: {}", method)),
            }
        }
    };
}

pub trait Dispatch<'de, RT> {
    fn call(
        self,
        rt: &mut RT,
        args: &'de Option<IpldBlock>,
    ) -> Result<Option<IpldBlock>, ActorError>;
}

pub struct Dispatcher<F, A> {
    func: F,
    _marker: PhantomData<fn(A)>,
}

impl<F, A> Dispatcher<F, A> {
    const fn new(f: F) -> Self {
        Dispatcher { func: f, _marker: PhantomData }
    }
}

/// Dispatch an actor method, deserializing the input and re-serializing the output.
///
/// Methods taking no parameters must be invoked without any, and methods returning
/// `()` produce no return block.
#[doc(hidden)]
pub fn dispatch<'de, F, A, RT>(
    rt: &mut RT,
    func: F,
    arg: &'de Option<IpldBlock>,
) -> Result<Option<IpldBlock>, ActorError>
where
    Dispatcher<F, A>: Dispatch<'de, RT>,
{
    Dispatcher::new(func).call(rt, arg)
}

/// Convert the passed value into an IPLD Block, or None if it's `()`.
fn maybe_into_block<T: Serialize>(v: T) -> Result<Option<IpldBlock>, ActorError> {
    if cast!(&v, &()).is_ok() {
        Ok(None)
    } else {
        Ok(IpldBlock::serialize_cbor(&v)?)
    }
}

impl<'de, F, R, RT> Dispatch<'de, RT> for Dispatcher<F, ()>
where
    F: FnOnce(&mut RT) -> Result<R, ActorError>,
    R: Serialize,
{
    fn call(
        self,
        rt: &mut RT,
        args: &'de Option<IpldBlock>,
    ) -> Result<Option<IpldBlock>, ActorError> {
        match args {
            None => maybe_into_block((self.func)(rt)?),
            Some(_) => Err(ActorError::illegal_argument("method expects no arguments".into())),
        }
    }
}

impl<'de, F, A, R, RT> Dispatch<'de, RT> for Dispatcher<F, (A,)>
where
    F: FnOnce(&mut RT, A) -> Result<R, ActorError>,
    A: Deserialize<'de>,
    R: Serialize,
{
    fn call(
        self,
        rt: &mut RT,
        args: &'de Option<IpldBlock>,
    ) -> Result<Option<IpldBlock>, ActorError> {
        match args {
            None => Err(ActorError::illegal_argument("method expects arguments".into())),
            Some(arg) => maybe_into_block((self.func)(rt, arg.deserialize()?)?),
        }
    }
}

#[test]
fn test_dispatch() {
    use crate::ActorError;
    use fvm_ipld_encoding::ipld_block::IpldBlock;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize)]
    struct QuotaArgs {
        quota: i64,
    }

    struct CountingRuntime {
        calls: u32,
    }

    fn with_arg(rt: &mut CountingRuntime, args: QuotaArgs) -> Result<(), ActorError> {
        rt.calls += 1;
        assert_eq!(args.quota, 10);
        Ok(())
    }

    fn with_arg_ret(rt: &mut CountingRuntime, args: QuotaArgs) -> Result<QuotaArgs, ActorError> {
        rt.calls += 1;
        Ok(args)
    }

    fn without_arg(rt: &mut CountingRuntime) -> Result<(), ActorError> {
        rt.calls += 1;
        Ok(())
    }

    let mut rt = CountingRuntime { calls: 0 };
    let arg = IpldBlock::serialize_cbor(&QuotaArgs { quota: 10 })
        .expect("failed to serialize arguments");

    // Correct dispatch
    assert!(dispatch(&mut rt, with_arg, &arg).expect("failed to dispatch").is_none());
    assert!(dispatch(&mut rt, without_arg, &None).expect("failed to dispatch").is_none());
    assert_eq!(dispatch(&mut rt, with_arg_ret, &arg).expect("failed to dispatch"), arg);
    assert_eq!(rt.calls, 3);

    // Incorrect dispatch
    let _ = dispatch(&mut rt, with_arg, &None).expect_err("should have required an argument");
    let _ = dispatch(&mut rt, without_arg, &arg).expect_err("should have rejected an argument");
    assert_eq!(rt.calls, 3);
}
