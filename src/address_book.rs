//! Static and dynamic address allocation.
//!
//! The [`AddressBook`] owns every allocation decision. It keeps two indices
//! over the same records, one by IPv4 address and one by normalized
//! hardware address, and guards both with a single lock so that lookup,
//! eviction and allocation happen in one critical section.
//!
//! # Allocation Policy
//!
//! - Static reservations come from `host` blocks with both `hardware ethernet`
//!   and `fixed-address`. They never expire.
//! - A static reservation only blocks dynamic allocation of its address once
//!   its owner has been served at least once ("soft reservation"). Until then
//!   a dynamic client may be handed the same address if the ranges overlap.
//! - Dynamic addresses are scanned first-fit: subnets in configuration order,
//!   addresses in ascending order within each range.
//! - Dynamic leases last [`LEASE_DURATION_SECONDS`] and are renewed on every
//!   lookup. Expiry is evaluated lazily, whenever a key is touched.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};

/// Lifetime of a dynamic lease (1 hour).
pub const LEASE_DURATION_SECONDS: i64 = 3600;

/// Normalizes a hardware address key: trimmed, lower case, `-` replaced by `:`.
pub fn normalize_hardware_address(hardware: &str) -> String {
    hardware.trim().to_lowercase().replace('-', ":")
}

/// Parses a six-octet Ethernet address and returns its canonical key
/// (`00:11:22:33:44:55`), or `None` if it is malformed.
fn canonical_hardware_address(hardware: &str) -> Option<String> {
    let normalized = normalize_hardware_address(hardware);
    let octets = normalized
        .split(':')
        .map(|part| {
            if part.is_empty() || part.len() > 2 {
                None
            } else {
                u8::from_str_radix(part, 16).ok()
            }
        })
        .collect::<Option<Vec<u8>>>()?;

    if octets.len() != 6 {
        return None;
    }

    Some(
        octets
            .iter()
            .map(|byte| format!("{:02x}", byte))
            .collect::<Vec<_>>()
            .join(":"),
    )
}

/// How an address came to be allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationKind {
    /// Configured reservation. `active` becomes true once the owner has been
    /// served and never reverts.
    Static { active: bool },
    /// Leased from a dynamic range until `expires_at`.
    Dynamic { expires_at: DateTime<Utc> },
}

/// A single address binding, reachable from both indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationRecord {
    pub address: Ipv4Addr,
    pub hardware_address: String,
    /// Index into [`Config::subnets`]; `None` for globally declared hosts.
    pub subnet: Option<usize>,
    pub kind: AllocationKind,
}

impl AllocationRecord {
    pub fn is_static(&self) -> bool {
        matches!(self.kind, AllocationKind::Static { .. })
    }

    /// Returns true for a dynamic lease whose expiry is at or before `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.kind {
            AllocationKind::Static { .. } => false,
            AllocationKind::Dynamic { expires_at } => expires_at <= now,
        }
    }

    /// Records a successful lookup: activates a static reservation or renews
    /// an unexpired lease. Returns false if the lease has expired.
    fn refresh(&mut self, now: DateTime<Utc>) -> bool {
        match &mut self.kind {
            AllocationKind::Static { active } => {
                *active = true;
                true
            }
            AllocationKind::Dynamic { expires_at } if *expires_at > now => {
                *expires_at = now + lease_duration();
                true
            }
            AllocationKind::Dynamic { .. } => false,
        }
    }
}

/// Result of a successful resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assignment {
    pub address: Ipv4Addr,
    /// Index into [`Config::subnets`] of the subnet the address belongs to.
    pub subnet: Option<usize>,
}

impl From<&AllocationRecord> for Assignment {
    fn from(record: &AllocationRecord) -> Self {
        Self {
            address: record.address,
            subnet: record.subnet,
        }
    }
}

/// A usable dynamic range, resolved once from the configuration.
#[derive(Debug, Clone, Copy)]
struct DynamicRange {
    subnet: usize,
    start: u32,
    end: u32,
}

/// The two indices.
///
/// Records are owned by hardware key. `by_address` names the current
/// occupant of each address. The only record missing from `by_address` is an
/// inactive static reservation whose address a dynamic client took before
/// the owner's first request; `reservations` remembers it so the slot can be
/// handed back when that lease goes away.
#[derive(Debug, Default)]
struct AddressTable {
    by_hardware: HashMap<String, AllocationRecord>,
    by_address: HashMap<u32, String>,
    reservations: HashMap<u32, String>,
}

impl AddressTable {
    fn initialize_static(&mut self, config: &Config) -> usize {
        for (subnet, host) in config.all_hosts() {
            if !host.is_reservation() {
                continue;
            }

            let Ok(address) = host.fixed_address.trim().parse::<Ipv4Addr>() else {
                warn!(
                    "Skipping host {}: invalid fixed-address '{}'",
                    host.name, host.fixed_address
                );
                continue;
            };

            let Some(hardware_address) = canonical_hardware_address(&host.hardware) else {
                warn!(
                    "Skipping host {}: invalid hardware address '{}'",
                    host.name, host.hardware
                );
                continue;
            };

            self.reserve(
                &host.name,
                AllocationRecord {
                    address,
                    hardware_address,
                    subnet,
                    kind: AllocationKind::Static { active: false },
                },
            );
        }

        self.reservations.len()
    }

    /// Adds a static reservation. A later host with the same hardware
    /// address or the same fixed address replaces the earlier one.
    fn reserve(&mut self, name: &str, record: AllocationRecord) {
        let address = u32::from(record.address);
        let key = record.hardware_address.clone();

        if let Some(previous) = self.by_hardware.remove(&key) {
            warn!(
                "Host {} overrides earlier reservation {} for {}",
                name, previous.address, previous.hardware_address
            );
            let previous_address = u32::from(previous.address);
            self.by_address.remove(&previous_address);
            self.reservations.remove(&previous_address);
        }

        if let Some(owner) = self.reservations.remove(&address) {
            warn!(
                "Host {} takes over address {} from {}",
                name, record.address, owner
            );
            self.by_hardware.remove(&owner);
        }

        self.reservations.insert(address, key.clone());
        self.by_address.insert(address, key.clone());
        self.by_hardware.insert(key, record);
    }

    fn occupant(&self, address: u32) -> Option<&AllocationRecord> {
        let key = self.by_address.get(&address)?;
        self.by_hardware.get(key)
    }

    /// Removes a dynamic lease from both indices. If the address belongs to
    /// a static reservation, the slot goes back to its owner.
    fn evict(&mut self, hardware_address: &str) -> Option<AllocationRecord> {
        let record = self.by_hardware.remove(hardware_address)?;
        let address = u32::from(record.address);

        if self.by_address.get(&address).map(String::as_str) == Some(hardware_address) {
            self.by_address.remove(&address);
            if let Some(owner) = self.reservations.get(&address) {
                self.by_address.insert(address, owner.clone());
            }
        }

        Some(record)
    }

    /// Makes the static owner of `address` its occupant again, revoking any
    /// dynamic lease that was handed the address before the owner showed up.
    fn claim(&mut self, address: u32, hardware_address: &str) {
        let Some(previous) = self
            .by_address
            .insert(address, hardware_address.to_string())
        else {
            return;
        };

        if previous != hardware_address
            && let Some(revoked) = self.by_hardware.remove(&previous)
        {
            warn!(
                "Revoking dynamic lease {} of {}: address is reserved for {}",
                revoked.address, revoked.hardware_address, hardware_address
            );
        }
    }

    fn is_occupied(&mut self, address: u32, now: DateTime<Utc>) -> bool {
        let expired_key = match self.occupant(address) {
            None => return false,
            Some(record) => match record.kind {
                AllocationKind::Static { active } => return active,
                AllocationKind::Dynamic { expires_at } if expires_at > now => return true,
                AllocationKind::Dynamic { .. } => record.hardware_address.clone(),
            },
        };

        if let Some(evicted) = self.evict(&expired_key) {
            debug!(
                "Lease {} for {} expired",
                evicted.address, evicted.hardware_address
            );
        }

        // Any reservation handed the slot back is inactive.
        false
    }

    fn resolve(
        &mut self,
        hardware_address: &str,
        ranges: &[DynamicRange],
        now: DateTime<Utc>,
    ) -> Result<Assignment> {
        if let Some(record) = self.by_hardware.get_mut(hardware_address) {
            let is_static = record.is_static();
            if record.refresh(now) {
                let assignment = Assignment::from(&*record);
                if is_static {
                    self.claim(u32::from(assignment.address), hardware_address);
                }
                return Ok(assignment);
            }
        }

        if let Some(expired) = self.evict(hardware_address) {
            debug!(
                "Lease {} for {} expired, reallocating",
                expired.address, expired.hardware_address
            );
        }

        self.allocate_dynamic(hardware_address, ranges, now)
    }

    fn allocate_dynamic(
        &mut self,
        hardware_address: &str,
        ranges: &[DynamicRange],
        now: DateTime<Utc>,
    ) -> Result<Assignment> {
        match self.by_hardware.get(hardware_address) {
            Some(record) if record.is_static() => return Ok(Assignment::from(record)),
            Some(_) => {
                self.evict(hardware_address);
            }
            None => {}
        }

        if ranges.is_empty() {
            return Err(Error::UnknownClient(hardware_address.to_string()));
        }

        for range in ranges {
            for address in range.start..=range.end {
                if self.is_occupied(address, now) {
                    continue;
                }

                let record = AllocationRecord {
                    address: Ipv4Addr::from(address),
                    hardware_address: hardware_address.to_string(),
                    subnet: Some(range.subnet),
                    kind: AllocationKind::Dynamic {
                        expires_at: now + lease_duration(),
                    },
                };

                if let Some(owner) = self.reservations.get(&address) {
                    warn!(
                        "Address {} is reserved for {} but handed to {} before its owner's first request",
                        record.address, owner, hardware_address
                    );
                }

                let assignment = Assignment::from(&record);
                self.by_address
                    .insert(address, hardware_address.to_string());
                self.by_hardware
                    .insert(hardware_address.to_string(), record);
                return Ok(assignment);
            }
        }

        Err(Error::PoolExhausted(hardware_address.to_string()))
    }
}

fn lease_duration() -> TimeDelta {
    TimeDelta::seconds(LEASE_DURATION_SECONDS)
}

/// Thread-safe allocation engine.
///
/// Constructed once from the frozen [`Config`] and shared by handle with the
/// request processor and listener.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use bootpd::{AddressBook, Config};
///
/// # async fn example() -> bootpd::Result<()> {
/// let config = Arc::new(Config::parse(
///     "subnet 10.0.0.0 netmask 255.255.255.0 {\n  range 10.0.0.10 10.0.0.20;\n}\n",
/// ));
/// let book = AddressBook::new(config);
///
/// let assignment = book.resolve("00:11:22:33:44:55").await?;
/// assert_eq!(assignment.address, std::net::Ipv4Addr::new(10, 0, 0, 10));
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct AddressBook {
    config: Arc<Config>,
    ranges: Vec<DynamicRange>,
    table: Mutex<AddressTable>,
}

impl AddressBook {
    /// Creates an address book and loads static reservations from `config`.
    ///
    /// Hosts with a malformed fixed address or hardware address are skipped
    /// with a warning. Subnets whose range is incomplete, unparseable or
    /// inverted contribute no dynamic addresses.
    pub fn new(config: Arc<Config>) -> Self {
        let ranges = Self::dynamic_ranges(&config);

        let mut table = AddressTable::default();
        let count = table.initialize_static(&config);

        info!(
            "Loaded {} static reservation(s), {} dynamic range(s)",
            count,
            ranges.len()
        );

        Self {
            config,
            ranges,
            table: Mutex::new(table),
        }
    }

    fn dynamic_ranges(config: &Config) -> Vec<DynamicRange> {
        let mut ranges = Vec::new();

        for (index, subnet) in config.subnets.iter().enumerate() {
            if subnet.range_start.is_empty() && subnet.range_end.is_empty() {
                continue;
            }

            let Some((start, end)) = subnet.dynamic_range() else {
                warn!(
                    "Subnet {}: ignoring unusable range '{}' - '{}'",
                    subnet.network, subnet.range_start, subnet.range_end
                );
                continue;
            };

            if u32::from(start) > u32::from(end) {
                warn!(
                    "Subnet {}: range start {} is after range end {}",
                    subnet.network, start, end
                );
                continue;
            }

            if !subnet.network.is_empty() && !(subnet.contains(start) && subnet.contains(end)) {
                warn!(
                    "Subnet {}/{}: range {} - {} lies outside the subnet",
                    subnet.network, subnet.netmask, start, end
                );
            }

            ranges.push(DynamicRange {
                subnet: index,
                start: u32::from(start),
                end: u32::from(end),
            });
        }

        ranges
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Resolves the address for a client.
    ///
    /// # Resolution Order
    ///
    /// 1. Static reservation for this hardware address (marks it active)
    /// 2. Existing unexpired dynamic lease (renewed for another lease period)
    /// 3. First free address from the dynamic ranges
    ///
    /// An expired lease found in step 2 is evicted before step 3.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownClient`] if no subnet declares a usable range,
    /// or [`Error::PoolExhausted`] if every range is fully occupied.
    pub async fn resolve(&self, hardware_address: &str) -> Result<Assignment> {
        let key = normalize_hardware_address(hardware_address);
        let mut table = self.table.lock().await;
        table.resolve(&key, &self.ranges, Utc::now())
    }

    /// Allocates a fresh dynamic address for a client.
    ///
    /// A static client gets its reservation back unchanged. Any lease the
    /// client already holds is dropped first, so the scan may move it. Use
    /// [`resolve`](Self::resolve) for normal lookups.
    ///
    /// # Errors
    ///
    /// Same as [`resolve`](Self::resolve).
    pub async fn allocate_dynamic(&self, hardware_address: &str) -> Result<Assignment> {
        let key = normalize_hardware_address(hardware_address);
        let mut table = self.table.lock().await;
        table.allocate_dynamic(&key, &self.ranges, Utc::now())
    }

    /// Returns true if `address` is unavailable for dynamic allocation.
    ///
    /// Expired dynamic leases are evicted as a side effect.
    pub async fn is_occupied(&self, address: Ipv4Addr) -> bool {
        let mut table = self.table.lock().await;
        table.is_occupied(u32::from(address), Utc::now())
    }

    /// Returns the record currently held by `hardware_address`, if any.
    pub async fn get(&self, hardware_address: &str) -> Option<AllocationRecord> {
        let key = normalize_hardware_address(hardware_address);
        let table = self.table.lock().await;
        table.by_hardware.get(&key).cloned()
    }

    /// Returns a snapshot of all records ordered by address.
    pub async fn allocations(&self) -> Vec<AllocationRecord> {
        let table = self.table.lock().await;
        let mut records: Vec<AllocationRecord> = table.by_hardware.values().cloned().collect();
        records.sort_by_key(|record| u32::from(record.address));
        records
    }
}
