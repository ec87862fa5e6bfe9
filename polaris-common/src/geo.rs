//! Geographic math
//!
//! Great-circle distance between WGS-84 coordinates and the slippy-map
//! (Web Mercator) tile numbering used by the map tile provider.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Mean Earth radius in meters (IUGG)
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Highest latitude representable in Web Mercator
const MAX_MERCATOR_LAT: f64 = 85.051_128_78;

/// WGS-84 coordinate in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    /// Create a coordinate, rejecting out-of-range or non-finite values
    pub fn new(lat: f64, lng: f64) -> Result<Self> {
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(Error::InvalidInput(format!("latitude out of range: {}", lat)));
        }
        if !lng.is_finite() || !(-180.0..=180.0).contains(&lng) {
            return Err(Error::InvalidInput(format!("longitude out of range: {}", lng)));
        }
        Ok(Self { lat, lng })
    }

    /// Haversine distance to `other` in meters
    pub fn distance_to(&self, other: &Coordinate) -> f64 {
        haversine_distance_m(self, other)
    }
}

/// Great-circle distance in meters using the haversine formula
pub fn haversine_distance_m(a: &Coordinate, b: &Coordinate) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_M * c
}

/// Slippy-map tile address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileCoord {
    pub z: u8,
    pub x: u32,
    pub y: u32,
}

impl TileCoord {
    /// Create a tile address, checking x/y against the zoom level's grid size
    pub fn new(z: u8, x: u32, y: u32) -> Result<Self> {
        if z > 30 {
            return Err(Error::InvalidInput(format!("zoom level too large: {}", z)));
        }
        let n = 1u64 << z;
        if u64::from(x) >= n || u64::from(y) >= n {
            return Err(Error::InvalidInput(format!(
                "tile {}/{}/{} outside the {}x{} grid",
                z, x, y, n, n
            )));
        }
        Ok(Self { z, x, y })
    }

    /// Tile containing `coord` at `zoom`
    pub fn containing(coord: &Coordinate, zoom: u8) -> Self {
        let n = (1u64 << zoom) as f64;
        let lat = coord.lat.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT);
        let lat_rad = lat.to_radians();

        let x = ((coord.lng + 180.0) / 360.0 * n).floor();
        let y = ((1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0 * n).floor();

        let max = n - 1.0;
        Self {
            z: zoom,
            x: x.clamp(0.0, max) as u32,
            y: y.clamp(0.0, max) as u32,
        }
    }
}

impl std::fmt::Display for TileCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

/// Geographic bounding box
///
/// Corner order is not trusted: `normalized()` sorts the edges so callers may
/// pass the corners in either order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

impl BoundingBox {
    /// Box spanning two arbitrary corners
    pub fn from_corners(a: Coordinate, b: Coordinate) -> Self {
        Self {
            north: a.lat,
            south: b.lat,
            east: b.lng,
            west: a.lng,
        }
        .normalized()
    }

    /// Copy with north >= south and east >= west
    pub fn normalized(&self) -> Self {
        Self {
            north: self.north.max(self.south),
            south: self.north.min(self.south),
            east: self.east.max(self.west),
            west: self.east.min(self.west),
        }
    }

    /// Whether `coord` lies inside the box (edges inclusive)
    pub fn contains(&self, coord: &Coordinate) -> bool {
        let b = self.normalized();
        (b.south..=b.north).contains(&coord.lat) && (b.west..=b.east).contains(&coord.lng)
    }

    /// North-west and south-east corner tiles at `zoom`
    fn tile_corners(&self, zoom: u8) -> (TileCoord, TileCoord) {
        let b = self.normalized();
        // Tile rows grow southward, so the north edge has the smaller y
        (
            TileCoord::containing(&Coordinate { lat: b.north, lng: b.west }, zoom),
            TileCoord::containing(&Coordinate { lat: b.south, lng: b.east }, zoom),
        )
    }

    /// Whether `tile` intersects the box
    pub fn covers_tile(&self, tile: &TileCoord) -> bool {
        let (north_west, south_east) = self.tile_corners(tile.z);
        (north_west.x..=south_east.x).contains(&tile.x)
            && (north_west.y..=south_east.y).contains(&tile.y)
    }

    /// Every tile intersecting the box at `zoom`, row-major by x then y
    pub fn tiles(&self, zoom: u8) -> Vec<TileCoord> {
        let (north_west, south_east) = self.tile_corners(zoom);

        let mut tiles = Vec::new();
        for x in north_west.x..=south_east.x {
            for y in north_west.y..=south_east.y {
                tiles.push(TileCoord { z: zoom, x, y });
            }
        }
        tiles
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn harvard_yard() -> Coordinate {
        Coordinate { lat: 42.3744, lng: -71.1167 }
    }

    #[test]
    fn test_distance_to_self_is_zero() {
        let p = harvard_yard();
        assert_eq!(p.distance_to(&p), 0.0);
    }

    #[test]
    fn test_distance_is_symmetric() {
        let a = harvard_yard();
        let b = Coordinate { lat: 42.3734, lng: -71.1147 };
        assert!((a.distance_to(&b) - b.distance_to(&a)).abs() < 1e-9);
    }

    #[test]
    fn test_distance_known_value() {
        // One degree of latitude is ~111.195 km on the mean sphere
        let a = Coordinate { lat: 0.0, lng: 0.0 };
        let b = Coordinate { lat: 1.0, lng: 0.0 };
        let d = a.distance_to(&b);
        assert!((d - 111_194.93).abs() < 1.0, "got {}", d);
    }

    #[test]
    fn test_distance_short_campus_hop() {
        // John Harvard Statue to Widener Library, roughly 200 m
        let d = harvard_yard().distance_to(&Coordinate { lat: 42.3734, lng: -71.1147 });
        assert!(d > 150.0 && d < 250.0, "got {}", d);
    }

    #[test]
    fn test_coordinate_validation() {
        assert!(Coordinate::new(42.0, -71.0).is_ok());
        assert!(Coordinate::new(91.0, 0.0).is_err());
        assert!(Coordinate::new(0.0, -181.0).is_err());
        assert!(Coordinate::new(f64::NAN, 0.0).is_err());
    }

    #[test]
    fn test_tile_containing_origin() {
        let tile = TileCoord::containing(&Coordinate { lat: 0.0, lng: 0.0 }, 1);
        assert_eq!(tile, TileCoord { z: 1, x: 1, y: 1 });
    }

    #[test]
    fn test_tile_containing_harvard_z16() {
        let tile = TileCoord::containing(&harvard_yard(), 16);
        assert_eq!(tile.x, 19821);
        assert_eq!(tile.y, 24236);
    }

    #[test]
    fn test_tile_new_rejects_outside_grid() {
        assert!(TileCoord::new(2, 3, 3).is_ok());
        assert!(TileCoord::new(2, 4, 0).is_err());
        assert!(TileCoord::new(2, 0, 4).is_err());
    }

    #[test]
    fn test_bounding_box_corner_order_irrelevant() {
        let a = Coordinate { lat: 42.346177, lng: -71.135884 };
        let b = Coordinate { lat: 42.392885, lng: -71.109761 };
        let one = BoundingBox::from_corners(a, b);
        let two = BoundingBox::from_corners(b, a);
        assert_eq!(one, two);
        assert_eq!(one.tiles(15), two.tiles(15));
    }

    #[test]
    fn test_bounding_box_tiles_cover_corners() {
        let a = Coordinate { lat: 42.346177, lng: -71.135884 };
        let b = Coordinate { lat: 42.392885, lng: -71.109761 };
        let bounds = BoundingBox::from_corners(a, b);
        let tiles = bounds.tiles(14);
        assert!(!tiles.is_empty());
        assert!(tiles.contains(&TileCoord::containing(&a, 14)));
        assert!(tiles.contains(&TileCoord::containing(&b, 14)));
    }

    #[test]
    fn test_bounding_box_tile_count_grows_with_zoom() {
        let bounds = BoundingBox::from_corners(
            Coordinate { lat: 42.346177, lng: -71.135884 },
            Coordinate { lat: 42.392885, lng: -71.109761 },
        );
        assert!(bounds.tiles(16).len() > bounds.tiles(14).len());
    }

    #[test]
    fn test_bounding_box_covers_exactly_its_tiles() {
        let bounds = BoundingBox::from_corners(
            Coordinate { lat: 42.346177, lng: -71.135884 },
            Coordinate { lat: 42.392885, lng: -71.109761 },
        );
        for tile in bounds.tiles(15) {
            assert!(bounds.covers_tile(&tile), "{}", tile);
        }
        assert!(bounds.covers_tile(&TileCoord::containing(&harvard_yard(), 18)));
        assert!(!bounds.covers_tile(&TileCoord { z: 14, x: 0, y: 0 }));

        let (north_west, south_east) = bounds.tile_corners(16);
        assert!(!bounds.covers_tile(&TileCoord { z: 16, x: north_west.x - 1, y: north_west.y }));
        assert!(!bounds.covers_tile(&TileCoord { z: 16, x: south_east.x, y: south_east.y + 1 }));
    }

    #[test]
    fn test_bounding_box_contains() {
        let bounds = BoundingBox::from_corners(
            Coordinate { lat: 42.346177, lng: -71.135884 },
            Coordinate { lat: 42.392885, lng: -71.109761 },
        );
        assert!(bounds.contains(&harvard_yard()));
        assert!(!bounds.contains(&Coordinate { lat: 40.0, lng: -71.12 }));
    }
}
