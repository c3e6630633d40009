//! Pure, no-I/O helpers for reordering and filtering candidate lists.

use std::collections::HashMap;
use std::net::SocketAddr;

use crate::error::AddrError;
use crate::types::{AddrCandidate, AddressFamily};

/// Reorder `addrs` so families alternate, family order preserved by
/// first appearance and relative order preserved within each family.
///
/// `first_family_count` lets the first-seen family get a head start: up to
/// `first_family_count - 1` of its addresses are emitted before round-robin
/// begins. `0` is a no-op (input returned as-is); `1` is a pure round-robin.
///
/// The result is always a permutation of `addrs`.
pub fn interleave(addrs: &[AddrCandidate], first_family_count: usize) -> Vec<AddrCandidate> {
    if first_family_count == 0 {
        return addrs.to_vec();
    }

    let mut family_order: Vec<AddressFamily> = Vec::new();
    let mut by_family: HashMap<AddressFamily, Vec<AddrCandidate>> = HashMap::new();
    for addr in addrs {
        by_family
            .entry(addr.family)
            .or_insert_with(|| {
                family_order.push(addr.family);
                Vec::new()
            })
            .push(addr.clone());
    }

    let mut groups: Vec<Vec<AddrCandidate>> = family_order
        .into_iter()
        .map(|f| by_family.remove(&f).expect("family just inserted"))
        .collect();

    let mut reordered = Vec::with_capacity(addrs.len());
    if first_family_count > 1 && !groups.is_empty() {
        let head_len = (first_family_count - 1).min(groups[0].len());
        reordered.extend(groups[0].drain(..head_len));
    }

    loop {
        let mut any = false;
        for group in &mut groups {
            if !group.is_empty() {
                reordered.push(group.remove(0));
                any = true;
            }
        }
        if !any {
            break;
        }
    }

    reordered
}

/// Remove up to `interleave` entries per family from the head of `addrs`,
/// in place. Keeps relative order of what's removed and of what remains.
///
/// Unlike [`interleave`], this mutates and discards the removed entries;
/// callers use it to mark a batch as "already tried" before retrying the
/// remainder later.
pub fn pop_addr_infos_interleave(addr_infos: &mut Vec<AddrCandidate>, interleave: usize) {
    let mut seen: HashMap<AddressFamily, usize> = HashMap::new();
    let mut kept = Vec::with_capacity(addr_infos.len());
    for addr in addr_infos.drain(..) {
        let count = seen.entry(addr.family).or_insert(0);
        if *count < interleave {
            *count += 1;
        } else {
            kept.push(addr);
        }
    }
    *addr_infos = kept;
}

/// Remove every entry whose `sockaddr` equals `addr`.
///
/// Fast path: exact equality, including IPv6 flow-info/scope-id. If nothing
/// matched, slow path: compare by `(ip, port)` only, ignoring flow-info and
/// scope-id, in case the caller's `addr` was built without them.
///
/// Returns [`AddrError::NotFound`] if neither pass removes anything.
pub fn remove_addr_infos(addr_infos: &mut Vec<AddrCandidate>, addr: SocketAddr) -> Result<(), AddrError> {
    let before = addr_infos.len();
    addr_infos.retain(|a| a.sockaddr != addr);
    if addr_infos.len() < before {
        return Ok(());
    }

    let ip = addr.ip();
    let port = addr.port();
    let before = addr_infos.len();
    addr_infos.retain(|a| !(a.sockaddr.ip() == ip && a.sockaddr.port() == port));
    if addr_infos.len() < before {
        return Ok(());
    }

    Err(AddrError::NotFound)
}

/// Promote a bare socket address to a one-element candidate list, the way a
/// caller would when it already knows the exact address to dial (no DNS
/// name to carry). Returns an empty list when `addr` is absent.
pub fn promote(addr: Option<SocketAddr>) -> Vec<AddrCandidate> {
    match addr {
        Some(sockaddr) => vec![AddrCandidate::new(sockaddr)],
        None => Vec::new(),
    }
}
