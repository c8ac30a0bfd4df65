//! `IngressFilter`: the pre-router gate. The caller identifier is handed
//! in already extracted (header parsing, TLS, network-edge allow-listing
//! are someone else's job); this only decides allow/deny against a small
//! configured list of addresses and CIDR ranges.

use ipnet::IpNet;
use std::net::IpAddr;
use std::str::FromStr;

enum AllowEntry {
    Exact(IpAddr),
    Range(IpNet),
}

/// An empty allow-list means allow everyone. Matching is a linear scan;
/// the list is expected to be small (tens of entries, not thousands).
pub struct IngressFilter {
    entries: Vec<AllowEntry>,
}

impl IngressFilter {
    pub fn new(allow_list: &[String]) -> Self {
        let entries = allow_list
            .iter()
            .filter_map(|raw| {
                if let Ok(net) = IpNet::from_str(raw) {
                    Some(AllowEntry::Range(net))
                } else if let Ok(addr) = IpAddr::from_str(raw) {
                    Some(AllowEntry::Exact(addr))
                } else {
                    tracing::warn!(entry = raw, "ignoring unparseable allow-list entry");
                    None
                }
            })
            .collect();
        Self { entries }
    }

    pub fn allows(&self, client: IpAddr) -> bool {
        if self.entries.is_empty() {
            return true;
        }
        self.entries.iter().any(|entry| match entry {
            AllowEntry::Exact(addr) => *addr == client,
            AllowEntry::Range(net) => net.contains(&client),
        })
    }
}
