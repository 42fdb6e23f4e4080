//! Default retry classifier
//!
//! Separates transient failures (network hiccups, server overload, rate
//! limiting) from permanent ones (client errors, cancellation). Each rule is
//! matched against the whole `source()` chain before the next rule is tried,
//! so a wrapped error is classified by its root cause.

use std::error::Error;
use std::io;

use codex_async_utils::CancelErr;

use crate::http::{HttpError, is_temporary_status};

/// Decide whether `err` is worth another attempt.
///
/// Rules, first match wins:
/// 1. no error: `false`
/// 2. cancellation or deadline: `false`
/// 3. network timeout: `true`
/// 4. network operation failure: `true`
/// 5. transport failure without a response: `true`
/// 6. HTTP status error: `true` only for 5xx and 429
/// 7. anything else: `false`
///
/// 408 is deliberately not treated as retryable on its own; only
/// [`HttpError::is_temporary`] gates HTTP errors.
pub fn is_retryable(err: Option<&(dyn Error + 'static)>) -> bool {
    let Some(err) = err else {
        return false;
    };

    if chain(err).any(is_cancellation) {
        return false;
    }
    if chain(err).any(is_network_timeout) {
        return true;
    }
    if chain(err).any(is_network_op_error) {
        return true;
    }
    if chain(err).any(is_transport_error) {
        return true;
    }
    if let Some(temporary) = chain(err).find_map(http_temporary) {
        return temporary;
    }
    false
}

/// [`is_retryable`] for a concrete error value.
pub fn is_retryable_error<E>(err: &E) -> bool
where
    E: Error + 'static,
{
    let err: &(dyn Error + 'static) = err;
    is_retryable(Some(err))
}

fn chain<'a>(err: &'a (dyn Error + 'static)) -> impl Iterator<Item = &'a (dyn Error + 'static)> {
    std::iter::successors(Some(err), |current| next_in_chain(*current))
}

// io::Error::source() skips over a custom payload, so step into it directly.
fn next_in_chain<'a>(err: &'a (dyn Error + 'static)) -> Option<&'a (dyn Error + 'static)> {
    if let Some(inner) = err.downcast_ref::<io::Error>().and_then(io::Error::get_ref) {
        let inner: &(dyn Error + 'static) = inner;
        return Some(inner);
    }
    err.source()
}

fn is_cancellation(err: &(dyn Error + 'static)) -> bool {
    err.is::<CancelErr>() || err.is::<tokio::time::error::Elapsed>()
}

fn is_network_timeout(err: &(dyn Error + 'static)) -> bool {
    if let Some(io_err) = err.downcast_ref::<io::Error>() {
        return io_err.kind() == io::ErrorKind::TimedOut;
    }
    if let Some(req_err) = err.downcast_ref::<reqwest::Error>() {
        return req_err.is_timeout();
    }
    false
}

fn is_network_op_error(err: &(dyn Error + 'static)) -> bool {
    use io::ErrorKind;

    let Some(io_err) = err.downcast_ref::<io::Error>() else {
        return false;
    };
    matches!(
        io_err.kind(),
        ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotConnected
            | ErrorKind::AddrInUse
            | ErrorKind::AddrNotAvailable
            | ErrorKind::BrokenPipe
            | ErrorKind::HostUnreachable
            | ErrorKind::NetworkUnreachable
            | ErrorKind::NetworkDown
    )
}

// A reqwest error with a status is an HTTP answer, not a transport failure.
fn is_transport_error(err: &(dyn Error + 'static)) -> bool {
    err.downcast_ref::<reqwest::Error>()
        .is_some_and(|req_err| req_err.status().is_none())
}

fn http_temporary(err: &(dyn Error + 'static)) -> Option<bool> {
    if let Some(http_err) = err.downcast_ref::<HttpError>() {
        return Some(http_err.is_temporary());
    }
    err.downcast_ref::<reqwest::Error>()
        .and_then(reqwest::Error::status)
        .map(|status| is_temporary_status(status.as_u16()))
}
