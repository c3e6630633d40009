//! Address candidate types shared by every module in this crate.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpSocket;

/// Address family of a candidate, mirrored from the `sockaddr` it carries.
///
/// Kept as its own field (rather than derived ad hoc from `sockaddr`) so the
/// rest of the crate reads the same way the resolver tuple this type stands
/// in for would: family, type, protocol, name, address.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressFamily {
    Inet,
    Inet6,
}

impl AddressFamily {
    fn of(addr: &SocketAddr) -> Self {
        match addr {
            SocketAddr::V4(_) => AddressFamily::Inet,
            SocketAddr::V6(_) => AddressFamily::Inet6,
        }
    }
}

impl std::fmt::Debug for AddressFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AddressFamily::Inet => write!(f, "AF_INET"),
            AddressFamily::Inet6 => write!(f, "AF_INET6"),
        }
    }
}

/// Socket type of a candidate. Only `Stream` is meaningful to this engine,
/// but the field is kept so `AddrCandidate` stays a faithful 5-tuple.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SocketKind {
    Stream,
}

/// Transport protocol of a candidate. Only `Tcp` is meaningful here.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransportProtocol {
    Tcp,
}

/// A single resolved connection target: family, socket type, protocol,
/// an opaque canonical name, and the address to connect to.
///
/// Immutable once constructed; cheap to clone (the only heap allocation is
/// `canonical_name`, usually empty).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddrCandidate {
    pub family: AddressFamily,
    pub socket_type: SocketKind,
    pub protocol: TransportProtocol,
    pub canonical_name: String,
    pub sockaddr: SocketAddr,
}

impl AddrCandidate {
    /// Build a candidate for `sockaddr`, defaulting socket type/protocol to
    /// `STREAM`/`TCP` and `canonical_name` to empty, the same defaults
    /// [`crate::addr::promote`] uses.
    pub fn new(sockaddr: SocketAddr) -> Self {
        AddrCandidate {
            family: AddressFamily::of(&sockaddr),
            socket_type: SocketKind::Stream,
            protocol: TransportProtocol::Tcp,
            canonical_name: String::new(),
            sockaddr,
        }
    }

    /// Build a candidate carrying a canonical name, as a DNS resolver would
    /// attach to its answers.
    pub fn with_canonical_name(sockaddr: SocketAddr, canonical_name: impl Into<String>) -> Self {
        AddrCandidate {
            canonical_name: canonical_name.into(),
            ..AddrCandidate::new(sockaddr)
        }
    }
}

/// Same shape as [`AddrCandidate`]; used only to select a local bind address.
/// A local candidate is only tried when its `family` matches the outbound
/// candidate's family.
pub type LocalAddrCandidate = AddrCandidate;

/// Caller-supplied override for raw socket creation (`AttemptDriver` step 1).
///
/// The factory replaces the OS `socket()` call only; the bind and connect
/// steps still run on whatever [`TcpSocket`] it returns. A returned error is
/// treated exactly like a native socket-creation failure.
pub type SocketFactory = Arc<dyn Fn(&AddrCandidate) -> std::io::Result<TcpSocket> + Send + Sync>;
