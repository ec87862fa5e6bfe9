//! Proximity engine
//!
//! Pure recomputation of marker visibility from the user's position. Runs on
//! every location sample; nothing here is stateful.

use crate::geo::Coordinate;
use serde::{Deserialize, Serialize};

/// How landmarks are revealed on the map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExplorerMode {
    /// Landmarks fade in as the user approaches
    #[default]
    Explorer,
    /// Every landmark visible, distance ignored
    Atlas,
}

impl std::fmt::Display for ExplorerMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExplorerMode::Explorer => write!(f, "explorer"),
            ExplorerMode::Atlas => write!(f, "atlas"),
        }
    }
}

impl std::str::FromStr for ExplorerMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "explorer" => Ok(ExplorerMode::Explorer),
            "atlas" => Ok(ExplorerMode::Atlas),
            other => Err(format!("unknown mode: {}", other)),
        }
    }
}

/// Distance thresholds and fog parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProximityConfig {
    /// Beyond this distance an undiscovered landmark is not rendered
    pub discovery_radius_m: f64,
    /// Within this distance a landmark is fully clear and tappable
    pub interaction_radius_m: f64,
    pub min_opacity: f64,
    pub max_blur_px: f64,
}

impl Default for ProximityConfig {
    fn default() -> Self {
        Self {
            discovery_radius_m: 150.0,
            interaction_radius_m: 40.0,
            min_opacity: 0.25,
            max_blur_px: 8.0,
        }
    }
}

/// Derived per-landmark render state
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarkerVisibility {
    /// Meters from the user, `None` while location is unknown
    pub distance_m: Option<f64>,
    pub opacity: f64,
    pub blur_px: f64,
    pub visible: bool,
}

impl MarkerVisibility {
    fn clear(distance_m: Option<f64>) -> Self {
        Self {
            distance_m,
            opacity: 1.0,
            blur_px: 0.0,
            visible: true,
        }
    }

    fn hidden(distance_m: Option<f64>) -> Self {
        Self {
            distance_m,
            opacity: 0.0,
            blur_px: 0.0,
            visible: false,
        }
    }
}

/// Compute how a landmark at `landmark` should be drawn
pub fn compute_visibility(
    landmark: &Coordinate,
    discovered: bool,
    user: Option<&Coordinate>,
    mode: ExplorerMode,
    config: &ProximityConfig,
) -> MarkerVisibility {
    let distance_m = user.map(|u| u.distance_to(landmark));

    if mode == ExplorerMode::Atlas {
        return MarkerVisibility::clear(distance_m);
    }

    let Some(d) = distance_m else {
        return MarkerVisibility::hidden(None);
    };

    if discovered {
        return MarkerVisibility::clear(distance_m);
    }
    if d > config.discovery_radius_m {
        return MarkerVisibility::hidden(distance_m);
    }

    let span = config.discovery_radius_m - config.interaction_radius_m;
    let frac = ((d - config.interaction_radius_m) / span).clamp(0.0, 1.0);

    MarkerVisibility {
        distance_m,
        opacity: (1.0 - frac * (1.0 - config.min_opacity)).clamp(config.min_opacity, 1.0),
        blur_px: (frac * config.max_blur_px).clamp(0.0, config.max_blur_px),
        visible: true,
    }
}

/// Whether a tap on the landmark opens a session
///
/// Atlas mode lets any landmark be opened; explorer mode requires the user to
/// be within the interaction radius unless the landmark was discovered earlier.
pub fn can_interact(
    distance_m: Option<f64>,
    discovered: bool,
    mode: ExplorerMode,
    config: &ProximityConfig,
) -> bool {
    if discovered || mode == ExplorerMode::Atlas {
        return true;
    }
    matches!(distance_m, Some(d) if d <= config.interaction_radius_m)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Point `meters` due north of `origin`
    fn north_of(origin: &Coordinate, meters: f64) -> Coordinate {
        let dlat = (meters / crate::geo::EARTH_RADIUS_M).to_degrees();
        Coordinate {
            lat: origin.lat + dlat,
            lng: origin.lng,
        }
    }

    fn widener() -> Coordinate {
        Coordinate { lat: 42.3734, lng: -71.1147 }
    }

    fn explorer_at(meters: f64, discovered: bool) -> MarkerVisibility {
        let landmark = widener();
        let user = north_of(&landmark, meters);
        compute_visibility(
            &landmark,
            discovered,
            Some(&user),
            ExplorerMode::Explorer,
            &ProximityConfig::default(),
        )
    }

    #[test]
    fn test_inside_interaction_radius_is_clear() {
        for d in [0.0, 10.0, 25.0, 39.9] {
            let v = explorer_at(d, false);
            assert!(v.visible);
            assert_eq!(v.opacity, 1.0, "distance {}", d);
            assert_eq!(v.blur_px, 0.0, "distance {}", d);
        }
    }

    #[test]
    fn test_beyond_discovery_radius_is_hidden() {
        for d in [150.5, 200.0, 5_000.0] {
            assert!(!explorer_at(d, false).visible, "distance {}", d);
        }
    }

    #[test]
    fn test_discovered_is_clear_at_any_distance() {
        for d in [0.0, 100.0, 150.5, 5_000.0] {
            let v = explorer_at(d, true);
            assert!(v.visible);
            assert_eq!(v.opacity, 1.0);
            assert_eq!(v.blur_px, 0.0);
        }
    }

    #[test]
    fn test_fog_is_monotonic_between_radii() {
        let cfg = ProximityConfig::default();
        let mut last = explorer_at(cfg.interaction_radius_m, false);
        let mut d = cfg.interaction_radius_m;
        while d < cfg.discovery_radius_m - 1.0 {
            d += 1.0;
            let v = explorer_at(d, false);
            assert!(v.visible, "distance {}", d);
            assert!(v.opacity <= last.opacity + 1e-9, "opacity rose at {}", d);
            assert!(v.blur_px >= last.blur_px - 1e-9, "blur fell at {}", d);
            assert!(v.opacity >= cfg.min_opacity && v.opacity <= 1.0);
            assert!(v.blur_px >= 0.0 && v.blur_px <= cfg.max_blur_px);
            last = v;
        }
    }

    #[test]
    fn test_fog_midpoint() {
        let cfg = ProximityConfig::default();
        let landmark = widener();
        let mid = (cfg.discovery_radius_m + cfg.interaction_radius_m) / 2.0;
        let user = north_of(&landmark, mid);
        let v = compute_visibility(&landmark, false, Some(&user), ExplorerMode::Explorer, &cfg);
        assert!((v.opacity - 0.625).abs() < 0.01, "got {}", v.opacity);
        assert!((v.blur_px - 4.0).abs() < 0.05, "got {}", v.blur_px);
    }

    #[test]
    fn test_unknown_location_hides_even_discovered() {
        let landmark = widener();
        let cfg = ProximityConfig::default();
        for discovered in [false, true] {
            let v = compute_visibility(&landmark, discovered, None, ExplorerMode::Explorer, &cfg);
            assert!(!v.visible);
            assert_eq!(v.distance_m, None);
        }
    }

    #[test]
    fn test_atlas_mode_ignores_distance() {
        let landmark = widener();
        let cfg = ProximityConfig::default();
        let far = north_of(&landmark, 10_000.0);
        for user in [None, Some(&far)] {
            let v = compute_visibility(&landmark, false, user, ExplorerMode::Atlas, &cfg);
            assert!(v.visible);
            assert_eq!(v.opacity, 1.0);
            assert_eq!(v.blur_px, 0.0);
        }
    }

    #[test]
    fn test_interaction_gate() {
        let cfg = ProximityConfig::default();
        assert!(can_interact(Some(40.0), false, ExplorerMode::Explorer, &cfg));
        assert!(!can_interact(Some(40.1), false, ExplorerMode::Explorer, &cfg));
        assert!(!can_interact(None, false, ExplorerMode::Explorer, &cfg));
        assert!(can_interact(Some(900.0), true, ExplorerMode::Explorer, &cfg));
        assert!(can_interact(None, false, ExplorerMode::Atlas, &cfg));
    }

    #[test]
    fn test_mode_parse_and_display() {
        assert_eq!("Atlas".parse::<ExplorerMode>(), Ok(ExplorerMode::Atlas));
        assert_eq!(" explorer ".parse::<ExplorerMode>(), Ok(ExplorerMode::Explorer));
        assert!("fog".parse::<ExplorerMode>().is_err());
        assert_eq!(ExplorerMode::Atlas.to_string(), "atlas");
    }
}
