//! The per-candidate create → bind → connect pipeline.

use std::io;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::{TcpSocket, TcpStream};
use tracing::{trace, warn};

use crate::error::{AttemptError, AttemptRecord};
use crate::types::{AddrCandidate, LocalAddrCandidate, SocketFactory};

/// Realize one candidate: create a socket, optionally bind it to a
/// matching local address, connect, and hand ownership of the connected
/// stream back to the caller.
///
/// Every failure along the way is pushed onto the returned [`AttemptRecord`]
/// before this function returns `Err`; whichever error actually terminated
/// the attempt is always the last entry. The socket, if one was created, is
/// dropped (closing it) on every path except the successful return — Rust's
/// ownership model makes this automatic rather than something this function
/// has to arrange.
pub async fn attempt(
    candidate: &AddrCandidate,
    local_candidates: Option<&[LocalAddrCandidate]>,
    socket_factory: Option<&SocketFactory>,
) -> Result<TcpStream, AttemptRecord> {
    let mut record = AttemptRecord::new();

    let socket = match create_socket(candidate, socket_factory) {
        Ok(socket) => socket,
        Err(e) => {
            record.push(AttemptError::Create(e));
            return Err(record);
        }
    };

    let socket = match bind_local(socket, candidate, local_candidates, &mut record) {
        Ok(socket) => socket,
        Err(()) => return Err(record),
    };

    trace!(addr = %candidate.sockaddr, "connecting");
    match socket.connect(candidate.sockaddr).await {
        Ok(stream) => Ok(stream),
        Err(e) => {
            record.push(AttemptError::Connect(e));
            Err(record)
        }
    }
}

fn create_socket(
    candidate: &AddrCandidate,
    socket_factory: Option<&SocketFactory>,
) -> io::Result<TcpSocket> {
    if let Some(factory) = socket_factory {
        return factory(candidate);
    }
    default_socket(candidate)
}

/// The non-blocking stream socket this engine creates when the caller
/// hasn't supplied a [`SocketFactory`].
fn default_socket(candidate: &AddrCandidate) -> io::Result<TcpSocket> {
    let domain = Domain::for_address(candidate.sockaddr);
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_nonblocking(true)?;

    #[cfg(unix)]
    let socket = unsafe {
        // Safety: `into_raw_fd` gives up ownership of the fd, so the
        // socket2::Socket above never closes it; `from_raw_fd` takes
        // ownership of exactly that fd and nothing double-closes.
        use std::os::unix::io::{FromRawFd, IntoRawFd};
        TcpSocket::from_raw_fd(socket.into_raw_fd())
    };

    Ok(socket)
}

/// Try every local candidate whose family matches `candidate`, binding to
/// the first that succeeds. Returns `Err(())` once `record` has been given
/// the terminal error for this attempt.
fn bind_local(
    socket: TcpSocket,
    candidate: &AddrCandidate,
    local_candidates: Option<&[LocalAddrCandidate]>,
    record: &mut AttemptRecord,
) -> Result<TcpSocket, ()> {
    let Some(locals) = local_candidates else {
        return Ok(socket);
    };

    let mut matched_any = false;
    for local in locals.iter().filter(|l| l.family == candidate.family) {
        matched_any = true;
        match socket.bind(local.sockaddr) {
            Ok(()) => return Ok(socket),
            Err(e) => {
                warn!(addr = %local.sockaddr, error = %e, "bind failed, trying next local address");
                record.push(AttemptError::Bind {
                    addr: format!("{:?}", local.sockaddr),
                    message: e.to_string().to_lowercase(),
                    code: e.raw_os_error(),
                });
            }
        }
    }

    if !matched_any {
        record.push(AttemptError::NoMatchingLocalAddress {
            family: candidate.family,
        });
    }
    Err(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
    use std::sync::Arc;

    use tokio::net::TcpListener;

    fn loopback_candidate(port: u16) -> AddrCandidate {
        AddrCandidate::new(SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, port)))
    }

    #[tokio::test]
    async fn connects_to_a_listening_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let candidate = AddrCandidate::new(addr);

        let (client, _server) = tokio::join!(attempt(&candidate, None, None), listener.accept());
        client.expect("connect should succeed");
    }

    #[tokio::test]
    async fn connect_failure_is_recorded() {
        // Bind then drop immediately: nothing is listening on this port.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let candidate = AddrCandidate::new(addr);
        let record = attempt(&candidate, None, None).await.unwrap_err();
        assert!(matches!(record.errors.last(), Some(AttemptError::Connect(_))));
    }

    #[tokio::test]
    async fn local_bind_family_mismatch_fails_without_connecting() {
        let candidate = loopback_candidate(1);
        let local_v6 = AddrCandidate::new(SocketAddr::V6(std::net::SocketAddrV6::new(
            std::net::Ipv6Addr::LOCALHOST,
            0,
            0,
            0,
        )));

        let record = attempt(&candidate, Some(&[local_v6]), None).await.unwrap_err();
        assert!(matches!(
            record.errors.last(),
            Some(AttemptError::NoMatchingLocalAddress { .. })
        ));
    }

    #[tokio::test]
    async fn socket_factory_error_is_treated_like_create_error() {
        let candidate = loopback_candidate(1);
        let factory: SocketFactory = Arc::new(|_: &AddrCandidate| {
            Err(io::Error::other("err1"))
        });

        let record = attempt(&candidate, None, Some(&factory)).await.unwrap_err();
        match record.errors.last() {
            Some(AttemptError::Create(e)) => assert!(e.to_string().contains("err1")),
            other => panic!("expected Create error, got {other:?}"),
        }
    }
}
