//! Rack resolution, run off a dedicated worker thread: the underlying
//! resolver may block and is known to swallow thread interrupts, so a
//! batch of lookups is always performed on a fresh, short-lived
//! `std::thread` and joined — never inline on the caller's thread — so
//! the caller (the allocator's reconciliation loop) stays cancelable.

use crate::error::{AllocatorError, Result};
use crate::types::{Host, Rack};
use std::collections::HashMap;
use std::sync::Arc;

pub trait RackResolver: Send + Sync {
    fn resolve_rack(&self, host: &Host) -> Rack;
}

/// Resolver backed by a static host→rack table, with a fallback rack for
/// unknown hosts. Stands in for a real topology script / DNS-based
/// resolver, which is out of scope here.
pub struct StaticRackResolver {
    table: HashMap<Host, Rack>,
    default_rack: Rack,
}

impl StaticRackResolver {
    pub fn new(table: HashMap<Host, Rack>, default_rack: impl Into<Rack>) -> Self {
        Self {
            table,
            default_rack: default_rack.into(),
        }
    }
}

impl RackResolver for StaticRackResolver {
    fn resolve_rack(&self, host: &Host) -> Rack {
        self.table
            .get(host)
            .cloned()
            .unwrap_or_else(|| self.default_rack.clone())
    }
}

/// Resolve racks for a batch of hosts on a fresh worker thread, joining
/// before returning. A panic inside the resolver surfaces as
/// [`AllocatorError::RackResolution`] after the join, rather than being
/// silently swallowed the way a long-lived resolver thread might.
pub fn resolve_racks(resolver: Arc<dyn RackResolver>, hosts: Vec<Host>) -> Result<HashMap<Host, Rack>> {
    let handle = std::thread::Builder::new()
        .name("rack-resolver".to_string())
        .spawn(move || {
            hosts
                .into_iter()
                .map(|host| {
                    let rack = resolver.resolve_rack(&host);
                    (host, rack)
                })
                .collect::<HashMap<_, _>>()
        })
        .map_err(|e| AllocatorError::RackResolution(e.to_string()))?;

    handle
        .join()
        .map_err(|_| AllocatorError::RackResolution("rack resolver worker panicked".to_string()))
}
