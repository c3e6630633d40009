//! RFC 8305 Happy Eyeballs v2 TCP connection establishment engine.
//!
//! This crate implements the connection-establishment core only: given a
//! list of resolved candidate addresses, it races (or sequentially tries)
//! TCP connect attempts against them and returns the first connected
//! socket. DNS resolution, TLS, HTTP, and retry-after-failure policy all
//! live above this crate.
//!
//! The entry point is [`start_connection`]; [`ConnectOptions`] configures
//! staggering, interleaving, local bind addresses, error-reporting
//! granularity, and socket creation.

pub mod addr;
pub mod attempt;
pub mod connect;
pub mod error;
pub mod race;
pub mod types;

pub use addr::{pop_addr_infos_interleave, remove_addr_infos};
pub use connect::{start_connection, ConnectOptions};
pub use error::{AddrError, AttemptError, AttemptRecord, ConnectError};
pub use types::{AddrCandidate, AddressFamily, LocalAddrCandidate, SocketFactory, SocketKind, TransportProtocol};

use std::net::SocketAddr;

/// Promote a single resolved socket address into the one-element candidate
/// list [`start_connection`] expects, the way a caller dialing a
/// pre-resolved address (no hostname, no DNS answer) would. `None` in,
/// `None` out.
pub fn addr_to_addr_infos(sockaddr: Option<SocketAddr>) -> Option<Vec<AddrCandidate>> {
    sockaddr.map(|addr| addr::promote(Some(addr)))
}
