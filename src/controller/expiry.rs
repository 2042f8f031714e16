//! Idle expiration of learned addresses and their flow rules

use super::{FlowMatch, ForwardingPlane, SwitchState};
use std::time::{Duration, Instant};
use tracing::debug;

/// Default interval between expiration sweeps
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Result of sweeping one switch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepOutcome {
    pub evicted: usize,
    /// Rules actually withdrawn from the switch
    pub rules_withdrawn: usize,
}

/// Evicts learned entries (and the rules resolving to them) once idle for
/// longer than the configured expiration time. A zero expiration time
/// disables eviction; entries then live as long as their switch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpirationTimer {
    idle_timeout: Option<Duration>,
}

impl ExpirationTimer {
    pub fn new(expiration_time: Duration) -> Self {
        Self {
            idle_timeout: (!expiration_time.is_zero()).then_some(expiration_time),
        }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.idle_timeout.is_some()
    }

    /// Configured idle timeout, `None` when expiration is disabled
    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout
    }

    /// Expiration time as configured (zero when disabled)
    pub fn expiration_time(&self) -> Duration {
        self.idle_timeout.unwrap_or(Duration::ZERO)
    }

    /// Sweep one switch, withdrawing the rule towards every evicted entry.
    pub fn sweep<P: ForwardingPlane + ?Sized>(
        &self,
        switch: &mut SwitchState,
        plane: &mut P,
        now: Instant,
    ) -> SweepOutcome {
        let Some(idle) = self.idle_timeout else {
            return SweepOutcome::default();
        };

        let evicted = switch.macs.expire(now, idle);
        let mut rules_withdrawn = 0;
        for &(vlan, mac) in &evicted {
            if switch.flows.remove(plane, &FlowMatch { vlan, dst_mac: mac }) {
                rules_withdrawn += 1;
            }
        }

        if !evicted.is_empty() {
            debug!(
                "Expired {} entries and withdrew {} rules on switch {}",
                evicted.len(),
                rules_withdrawn,
                switch.id()
            );
        }
        SweepOutcome {
            evicted: evicted.len(),
            rules_withdrawn,
        }
    }
}
