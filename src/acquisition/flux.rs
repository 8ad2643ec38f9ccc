//! Integrating column densities along a traverse into a flux.
use log::trace;

use crate::spectrum::GpsFix;

use super::config::WindField;

/// Mean Earth radius in meters
pub const EARTH_RADIUS: f64 = 6_371_000.0;

/// Great-circle distance between two fixes in meters
pub fn haversine_distance(from: &GpsFix, to: &GpsFix) -> f64 {
    let (lat1, lat2) = (from.latitude.to_radians(), to.latitude.to_radians());
    let dlat = lat2 - lat1;
    let dlon = (to.longitude - from.longitude).to_radians();
    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS * a.sqrt().asin()
}

/// Initial bearing from `from` towards `to`, in radians clockwise from north
pub fn bearing(from: &GpsFix, to: &GpsFix) -> f64 {
    let (lat1, lat2) = (from.latitude.to_radians(), to.latitude.to_radians());
    let dlon = (to.longitude - from.longitude).to_radians();
    let y = dlon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();
    y.atan2(x)
}

/// The flux through the segment between two positioned columns
pub fn segment_flux(
    wind: &WindField,
    from: (f64, &GpsFix),
    to: (f64, &GpsFix),
) -> f64 {
    let distance = haversine_distance(from.1, to.1);
    if distance == 0.0 {
        return 0.0;
    }
    let mean_column = (from.0 + to.0) / 2.0;
    let angle = wind.direction.to_radians() - bearing(from.1, to.1);
    mean_column * wind.speed * distance * angle.sin()
}

/// Accumulates the flux of a traverse one evaluated spectrum at a time.
///
/// Columns without a position are counted but add nothing; the next
/// positioned column is joined to the last positioned one.
#[derive(Debug, Clone, PartialEq)]
pub struct FluxAccumulator {
    wind: WindField,
    last_positioned: Option<(f64, GpsFix)>,
    results: usize,
    flux: f64,
}

impl FluxAccumulator {
    pub fn new(wind: WindField) -> Self {
        Self {
            wind,
            last_positioned: None,
            results: 0,
            flux: 0.0,
        }
    }

    pub fn wind(&self) -> &WindField {
        &self.wind
    }

    /// The number of columns pushed so far
    pub fn len(&self) -> usize {
        self.results
    }

    pub fn is_empty(&self) -> bool {
        self.results == 0
    }

    /// Add a column and return the running flux once at least two columns
    /// have been pushed
    pub fn push(&mut self, column: f64, position: Option<GpsFix>) -> Option<f64> {
        self.results += 1;
        if let Some(fix) = position.filter(|p| !p.is_null()) {
            if let Some((last_column, last_fix)) = &self.last_positioned {
                let contribution =
                    segment_flux(&self.wind, (*last_column, last_fix), (column, &fix));
                trace!("Segment flux {contribution:.3}");
                self.flux += contribution;
            }
            self.last_positioned = Some((column, fix));
        }
        self.current()
    }

    pub fn current(&self) -> Option<f64> {
        (self.results > 1).then_some(self.flux)
    }

    pub fn reset(&mut self) {
        self.last_positioned = None;
        self.results = 0;
        self.flux = 0.0;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_haversine() {
        let a = GpsFix::new(0.0, 0.0, 0.0);
        let b = GpsFix::new(0.0, 1.0, 0.0);
        let d = haversine_distance(&a, &b);
        assert!((d - 111_194.9).abs() < 1.0, "{d}");
        assert!((bearing(&a, &b) - std::f64::consts::FRAC_PI_2).abs() < 1e-9);
        let north = GpsFix::new(1.0, 0.0, 0.0);
        assert!(bearing(&a, &north).abs() < 1e-9);
    }

    #[test]
    fn test_two_result_rule() {
        let mut acc = FluxAccumulator::new(WindField {
            speed: 2.0,
            direction: 0.0,
        });
        assert_eq!(acc.push(10.0, Some(GpsFix::new(0.0, 0.0, 0.0))), None);
        let flux = acc.push(30.0, Some(GpsFix::new(0.0, 0.001, 0.0))).unwrap();
        // Driving east with the wind from the north: sin(0 - pi/2) = -1
        let expected = -20.0 * 2.0 * haversine_distance(
            &GpsFix::new(0.0, 0.0, 0.0),
            &GpsFix::new(0.0, 0.001, 0.0),
        );
        assert!((flux - expected).abs() < 1e-6, "{flux} != {expected}");
        assert_eq!(acc.len(), 2);
    }

    #[test]
    fn test_unpositioned_columns() {
        let mut acc = FluxAccumulator::new(WindField::default());
        assert_eq!(acc.push(10.0, None), None);
        assert_eq!(acc.push(10.0, None), Some(0.0));
        assert_eq!(acc.push(10.0, Some(GpsFix::new(0.0, 0.0, 0.0))), Some(0.0));
        let flux = acc.push(10.0, Some(GpsFix::new(0.0, 0.001, 0.0))).unwrap();
        assert!(flux != 0.0);
        acc.reset();
        assert!(acc.is_empty());
        assert_eq!(acc.current(), None);
    }
}
