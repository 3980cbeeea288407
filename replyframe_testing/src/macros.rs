//! Assertion macros for awaiting exchange futures in tests.
//!
//! Failures panic with the call site and the error's `Display` output, which
//! for `ExchangeError` names the destination and correlation key involved.

#[doc(hidden)]
#[macro_export]
macro_rules! __await_or_panic {
    ($what:literal, $fut:expr) => {
        match $fut.await {
            Ok(value) => value,
            Err(err) => ::std::panic!("{} failed at {}:{}: {err}", $what, file!(), line!()),
        }
    };
    ($fut:expr, $msg:expr) => {
        match $fut.await {
            Ok(value) => value,
            Err(err) => ::std::panic!("{} at {}:{}: {err}", $msg, file!(), line!()),
        }
    };
}

/// Await a send future and panic with the call site on failure.
#[macro_export]
macro_rules! send_expect {
    ($fut:expr) => {
        $crate::__await_or_panic!("send", $fut)
    };
    ($fut:expr, $msg:expr) => {
        $crate::__await_or_panic!($fut, $msg)
    };
}

/// Await a receive future and panic with the call site on failure.
#[macro_export]
macro_rules! recv_expect {
    ($fut:expr) => {
        $crate::__await_or_panic!("recv", $fut)
    };
    ($fut:expr, $msg:expr) => {
        $crate::__await_or_panic!($fut, $msg)
    };
}

/// Await a future that must fail with a deadline-driven `ExchangeError`,
/// returning the error.
#[macro_export]
macro_rules! timeout_expect {
    ($fut:expr) => {
        match $fut.await {
            Err(err) if err.is_timeout() => err,
            Err(err) => ::std::panic!("expected a timeout at {}:{}, got: {err}", file!(), line!()),
            Ok(_) => ::std::panic!("expected a timeout at {}:{}, got a value", file!(), line!()),
        }
    };
}
