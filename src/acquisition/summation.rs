//! Splitting a requested time resolution into device-side and host-side
//! co-adding.
use super::error::ConfigError;

/// How many exposures the spectrometer co-adds on board per capture, and how
/// many such captures the host sums into one reported spectrum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SummationPlan {
    pub scans_on_device: u32,
    pub groups_on_host: u32,
}

impl Default for SummationPlan {
    fn default() -> Self {
        Self::single()
    }
}

impl SummationPlan {
    pub const fn new(scans_on_device: u32, groups_on_host: u32) -> Self {
        Self {
            scans_on_device,
            groups_on_host,
        }
    }

    /// One exposure, reported directly
    pub const fn single() -> Self {
        Self::new(1, 1)
    }

    /// The number of exposures that make up one reported spectrum
    pub fn total_scans(&self) -> u32 {
        self.scans_on_device.saturating_mul(self.groups_on_host)
    }

    /// The time spent exposing for one reported spectrum, in milliseconds
    pub fn duration_ms(&self, exposure_ms: u32) -> u64 {
        self.total_scans() as u64 * exposure_ms as u64
    }

    /// Cap the device-side count at `max_scans`, keeping the host-side count
    pub fn capped(self, max_scans: u32) -> Self {
        Self::new(self.scans_on_device.min(max_scans.max(1)), self.groups_on_host)
    }
}

/// Compute the [`SummationPlan`] for `exposure_ms` that reaches
/// `requested_resolution_ms` with the fewest exposures.
///
/// Among all `(scans_on_device, groups_on_host)` with
/// `scans_on_device <= max_scans_per_capture` whose product times the exposure
/// reaches the requested resolution, the one with the smallest product is
/// chosen. Equal products favor co-adding on the device.
pub fn plan(
    exposure_ms: u32,
    requested_resolution_ms: u32,
    max_scans_per_capture: u32,
) -> Result<SummationPlan, ConfigError> {
    if exposure_ms == 0 {
        return Err(ConfigError::NonPositiveExposure);
    }
    if max_scans_per_capture == 0 {
        return Err(ConfigError::InvalidMaxScans);
    }
    let needed = requested_resolution_ms.div_ceil(exposure_ms).max(1);
    if needed <= max_scans_per_capture {
        return Ok(SummationPlan::new(needed, 1));
    }

    // The smallest reachable total is `needed` itself, so pick the largest
    // device-side count that divides it.
    let scans = (1..=max_scans_per_capture.min(needed))
        .rev()
        .find(|s| needed % s == 0)
        .unwrap_or(1);
    Ok(SummationPlan::new(scans, needed / scans))
}

#[cfg(test)]
mod test {
    use super::*;

    fn brute_force_total(exposure: u32, resolution: u32, max_scans: u32) -> u64 {
        let needed = resolution.div_ceil(exposure).max(1) as u64;
        let mut best = u64::MAX;
        for s in 1..=max_scans as u64 {
            let g = needed.div_ceil(s);
            best = best.min(s * g);
        }
        best
    }

    #[test]
    fn test_fits_on_device() {
        assert_eq!(plan(100, 1000, 15).unwrap(), SummationPlan::new(10, 1));
        assert_eq!(plan(300, 1000, 15).unwrap(), SummationPlan::new(4, 1));
        assert_eq!(plan(5000, 1000, 15).unwrap(), SummationPlan::new(1, 1));
        assert_eq!(plan(10, 0, 15).unwrap(), SummationPlan::single());
    }

    #[test]
    fn test_split_prefers_device() {
        // 32 exposures needed, max 15 per capture: 11 * 3 = 33 would use
        // fewer groups, but 8 * 4 = 32 is exact.
        let p = plan(10, 320, 15).unwrap();
        assert_eq!(p.total_scans(), 32);
        assert_eq!(p, SummationPlan::new(8, 4));

        // 30 exposures: 15 * 2 is exact and has the most device-side scans
        assert_eq!(plan(10, 300, 15).unwrap(), SummationPlan::new(15, 2));

        // 31 is prime and above the cap, only host-side summation reaches
        // it exactly
        assert_eq!(plan(10, 310, 15).unwrap(), SummationPlan::new(1, 31));
    }

    #[test]
    fn test_plan_bounds_and_minimality() {
        for exposure in [1u32, 3, 7, 20, 99, 250] {
            for resolution in [1u32, 10, 59, 100, 333, 1000, 2500, 7919] {
                for max_scans in [1u32, 2, 5, 15, 100] {
                    let p = plan(exposure, resolution, max_scans).unwrap();
                    assert!(p.scans_on_device >= 1 && p.scans_on_device <= max_scans);
                    assert!(p.groups_on_host >= 1);
                    assert!(p.duration_ms(exposure) >= resolution as u64);
                    assert_eq!(
                        p.total_scans() as u64,
                        brute_force_total(exposure, resolution, max_scans),
                        "exposure={exposure} resolution={resolution} max={max_scans}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_invalid() {
        assert_eq!(plan(0, 1000, 15), Err(ConfigError::NonPositiveExposure));
        assert_eq!(plan(10, 1000, 0), Err(ConfigError::InvalidMaxScans));
    }
}
