//! Orchestrates a full connection attempt across a candidate list: decides
//! between sequential and staggered-race strategies and aggregates the
//! result.

use std::time::Duration;

use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::addr::interleave;
use crate::attempt::attempt;
use crate::error::{aggregate, AttemptRecord, ConnectError};
use crate::race::race;
use crate::types::{AddrCandidate, LocalAddrCandidate, SocketFactory};

/// Knobs recognized by [`start_connection`]. Constructed with [`Default`]
/// and adjusted with the `set_*` mutators, mirroring how this crate's
/// teacher shapes its own connector configuration.
#[derive(Clone, Default)]
pub struct ConnectOptions {
    happy_eyeballs_delay: Option<Duration>,
    interleave: Option<usize>,
    local_addr_infos: Option<Vec<LocalAddrCandidate>>,
    all_errors: bool,
    socket_factory: Option<SocketFactory>,
}

impl ConnectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stagger between consecutive attempt starts. `None` (the default)
    /// disables racing entirely: candidates are tried strictly in order.
    pub fn set_happy_eyeballs_delay(mut self, delay: Option<Duration>) -> Self {
        self.happy_eyeballs_delay = delay;
        self
    }

    /// Number of addresses of the first-seen family emitted before
    /// round-robin interleaving begins. Defaults to `1` once racing is
    /// enabled unless set explicitly.
    pub fn set_interleave(mut self, interleave: Option<usize>) -> Self {
        self.interleave = interleave;
        self
    }

    /// Candidate local bind addresses; only family-matching ones are tried
    /// per attempt.
    pub fn set_local_addr_infos(mut self, local_addr_infos: Option<Vec<LocalAddrCandidate>>) -> Self {
        self.local_addr_infos = local_addr_infos;
        self
    }

    /// If true, a total failure is reported as a grouped carrier holding
    /// every attempt's terminal error, unmerged.
    pub fn set_all_errors(mut self, all_errors: bool) -> Self {
        self.all_errors = all_errors;
        self
    }

    /// Override raw socket creation; see [`SocketFactory`].
    pub fn set_socket_factory(mut self, socket_factory: Option<SocketFactory>) -> Self {
        self.socket_factory = socket_factory;
        self
    }
}

/// Connect to the first candidate in `addr_infos` that succeeds, racing or
/// trying sequentially depending on `options`.
///
/// Returns `Err(ConnectError::NoAddresses)` if `addr_infos` is empty.
pub async fn start_connection(
    addr_infos: &[AddrCandidate],
    mut options: ConnectOptions,
) -> Result<TcpStream, ConnectError> {
    if addr_infos.is_empty() {
        return Err(ConnectError::NoAddresses);
    }

    if options.happy_eyeballs_delay.is_some() && options.interleave.is_none() {
        options.interleave = Some(1);
    }

    let ordered: Vec<AddrCandidate> = match options.interleave {
        Some(n) if n > 0 => interleave(addr_infos, n),
        _ => addr_infos.to_vec(),
    };

    let sequential = options.happy_eyeballs_delay.is_none() || ordered.len() == 1;

    if sequential {
        return connect_sequential(&ordered, &options).await;
    }

    connect_staggered(&ordered, &options).await
}

async fn connect_sequential(
    ordered: &[AddrCandidate],
    options: &ConnectOptions,
) -> Result<TcpStream, ConnectError> {
    let mut errors = Vec::new();
    for candidate in ordered {
        debug!(addr = %candidate.sockaddr, "sequential attempt");
        match attempt(
            candidate,
            options.local_addr_infos.as_deref(),
            options.socket_factory.as_ref(),
        )
        .await
        {
            Ok(stream) => {
                info!(addr = %candidate.sockaddr, "connected");
                return Ok(stream);
            }
            Err(record) => errors.extend(record.errors),
        }
    }
    Err(aggregate(errors, options.all_errors))
}

async fn connect_staggered(
    ordered: &[AddrCandidate],
    options: &ConnectOptions,
) -> Result<TcpStream, ConnectError> {
    let candidates = ordered.to_vec();
    let local_addr_infos = options.local_addr_infos.clone();
    let socket_factory = options.socket_factory.clone();

    let factories = candidates
        .into_iter()
        .map(|candidate| {
            let local_addr_infos = local_addr_infos.clone();
            let socket_factory = socket_factory.clone();
            move || async move {
                attempt(&candidate, local_addr_infos.as_deref(), socket_factory.as_ref()).await
            }
        })
        .collect::<Vec<_>>();

    let outcome = race::<_, _, TcpStream, AttemptRecord>(factories, options.happy_eyeballs_delay).await;

    if let Some(stream) = outcome.winner {
        info!(index = outcome.winner_index, "connected");
        return Ok(stream);
    }

    let errors = outcome
        .exceptions
        .into_iter()
        .flatten()
        .flat_map(|record| record.errors)
        .collect();
    Err(aggregate(errors, options.all_errors))
}
