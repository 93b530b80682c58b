//! Hostname resolution on the reactor threads.
//!
//! The system resolver is a blocking call; running it on a reactor thread
//! keeps fiber workers responsive and turns the lookup into an ordinary
//! promise the calling fiber awaits. If the awaiting fiber goes away, the
//! lookup still finishes on the reactor thread and its result is dropped.

use std::net::ToSocketAddrs;

use crate::error::{Error, ErrorKind, Result};
use crate::promise;
use crate::reactor::Reactor;

use super::ip::AnyEndpoint;

/// Resolves `host:port` to endpoints of either family.
///
/// # Errors
///
/// Fails with [`ErrorKind::Io`] when the lookup fails and
/// [`ErrorKind::InvalidArgument`] when the name resolves to nothing.
pub async fn resolve(host: &str, port: u16) -> Result<Vec<AnyEndpoint>> {
    let query = (host.to_string(), port);
    let (promise, future) = promise::pair();
    Reactor::global().spawn_job(move || {
        let result = query
            .to_socket_addrs()
            .map_err(Error::from)
            .map(|addrs| addrs.map(AnyEndpoint::from).collect::<Vec<_>>())
            .and_then(|endpoints| {
                if endpoints.is_empty() {
                    Err(Error::with_context(
                        ErrorKind::InvalidArgument,
                        format!("{}:{} resolved to no endpoints", query.0, query.1),
                    ))
                } else {
                    Ok(endpoints)
                }
            });
        promise.complete_result(result);
    });
    future.await
}
