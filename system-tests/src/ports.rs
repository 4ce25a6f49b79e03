// system-tests/src/ports.rs
// ============================================================================
// Module: Port Allocator
// Description: Random base port and the five role ports derived from it.
// Purpose: Give each suite a block of five sequential loopback ports.
// Dependencies: rand, serde
// ============================================================================

//! ## Overview
//! A [`PortPlan`] is a base port `P0`; role ports are `P0 + offset` for the
//! offsets defined by [`ServerRole::port_offset`]. [`PortAllocator::allocate`]
//! picks a base uniformly from the configured range without checking
//! availability. [`PortAllocator::allocate_checked`] additionally probes the
//! five ports and retries with a fresh base when any is already taken.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::Ipv4Addr;
use std::net::TcpListener;
use std::ops::RangeInclusive;

use rand::Rng;
use serde::Serialize;

use crate::error::HarnessError;
use crate::roles::ServerRole;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default base-port range.
pub const DEFAULT_PORT_RANGE: RangeInclusive<u16> = 30000 ..= 45000;

/// Highest base port that leaves room for all five role ports.
pub const MAX_BASE_PORT: u16 = u16::MAX - 4;

/// Bases tried by [`PortAllocator::allocate_checked`] before giving up.
pub const MAX_CHECKED_ATTEMPTS: u32 = 16;

// ============================================================================
// SECTION: Port Plan
// ============================================================================

/// Base port for a suite; role ports derive from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PortPlan {
    /// Base port `P0`.
    base: u16,
}

impl PortPlan {
    /// Creates a plan from a base port.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::PortPlan`] when the base is zero or leaves no
    /// room for five sequential ports.
    pub fn from_base(base: u16) -> Result<Self, HarnessError> {
        if base == 0 || base > MAX_BASE_PORT {
            return Err(HarnessError::PortPlan(format!(
                "base port {base} must be within 1..={MAX_BASE_PORT}"
            )));
        }
        Ok(Self {
            base,
        })
    }

    /// Returns the base port.
    #[must_use]
    pub const fn base(self) -> u16 {
        self.base
    }

    /// Returns the port assigned to `role`.
    #[must_use]
    pub const fn port(self, role: ServerRole) -> u16 {
        self.base.saturating_add(role.port_offset())
    }

    /// Returns every role with its port, in offset order.
    #[must_use]
    pub fn ports(self) -> [(ServerRole, u16); 5] {
        ServerRole::ALL.map(|role| (role, self.port(role)))
    }

    /// Returns true when every role port can be bound on loopback right now.
    #[must_use]
    pub fn all_bindable(self) -> bool {
        self.ports().iter().all(|(_, port)| TcpListener::bind((Ipv4Addr::LOCALHOST, *port)).is_ok())
    }
}

// ============================================================================
// SECTION: Allocator
// ============================================================================

/// Picks base ports from a range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortAllocator {
    /// Candidate base ports, already clamped to [`MAX_BASE_PORT`].
    range: RangeInclusive<u16>,
}

impl Default for PortAllocator {
    fn default() -> Self {
        Self {
            range: DEFAULT_PORT_RANGE,
        }
    }
}

impl PortAllocator {
    /// Creates an allocator for `range`, clamping its end to [`MAX_BASE_PORT`].
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Config`] when the range is inverted, starts at
    /// zero, or is empty after clamping.
    pub fn new(range: RangeInclusive<u16>) -> Result<Self, HarnessError> {
        let (start, end) = range.into_inner();
        if start == 0 {
            return Err(HarnessError::Config("port range must start above 0".to_string()));
        }
        let clamped_end = end.min(MAX_BASE_PORT);
        if start > clamped_end {
            return Err(HarnessError::Config(format!(
                "port range {start}-{end} leaves no base port at or below {MAX_BASE_PORT}"
            )));
        }
        Ok(Self {
            range: start ..= clamped_end,
        })
    }

    /// Returns the candidate base range.
    #[must_use]
    pub const fn range(&self) -> &RangeInclusive<u16> {
        &self.range
    }

    /// Picks a random base without checking availability.
    #[must_use]
    pub fn allocate(&self) -> PortPlan {
        let base = rand::thread_rng().gen_range(self.range.clone());
        PortPlan {
            base,
        }
    }

    /// Picks a random base whose five ports are currently bindable.
    ///
    /// Availability can still change before the helpers bind; readiness
    /// probing reports that case.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::PortPlan`] after [`MAX_CHECKED_ATTEMPTS`]
    /// bases were all partially occupied.
    pub fn allocate_checked(&self) -> Result<PortPlan, HarnessError> {
        for _ in 0 .. MAX_CHECKED_ATTEMPTS {
            let plan = self.allocate();
            if plan.all_bindable() {
                return Ok(plan);
            }
        }
        Err(HarnessError::PortPlan(format!(
            "no free block of five ports found in {}-{} after {MAX_CHECKED_ATTEMPTS} attempts",
            self.range.start(),
            self.range.end()
        )))
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
