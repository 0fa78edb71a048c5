//! Grid → geographic reprojection.
//!
//! British National Grid eastings/northings are inverted through the
//! OSGB36 transverse Mercator on the Airy 1830 ellipsoid, then shifted to
//! WGS84 with the standard 7-parameter Helmert transform (accurate to a few
//! metres, well inside Voronoi cell sizes).

use geo::Coord;
use glam::{DVec2, DVec3};
use serde::{Deserialize, Serialize};

/// How cell vertices are mapped to output coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Projection {
    /// OSGB36 grid metres → WGS84 longitude/latitude degrees.
    #[default]
    BritishNationalGrid,
    /// Coordinates pass through unchanged.
    Identity,
}

impl Projection {
    /// Project one grid point. Output is `x = longitude, y = latitude` for
    /// geographic projections.
    pub fn project(self, p: DVec2) -> Coord<f64> {
        match self {
            Projection::Identity => Coord { x: p.x, y: p.y },
            Projection::BritishNationalGrid => {
                let (lat, lon) = osgb36_from_grid(p.x, p.y);
                let (lat, lon) = osgb36_to_wgs84(lat, lon);
                Coord {
                    x: lon.to_degrees(),
                    y: lat.to_degrees(),
                }
            }
        }
    }

    pub fn project_ring(self, ring: &[DVec2]) -> Vec<Coord<f64>> {
        ring.iter().map(|&p| self.project(p)).collect()
    }
}

struct Ellipsoid {
    a: f64,
    b: f64,
}

impl Ellipsoid {
    fn e2(&self) -> f64 {
        1.0 - (self.b * self.b) / (self.a * self.a)
    }
}

const AIRY_1830: Ellipsoid = Ellipsoid {
    a: 6_377_563.396,
    b: 6_356_256.909,
};

const WGS84: Ellipsoid = Ellipsoid {
    a: 6_378_137.0,
    b: 6_356_752.3142,
};

// National Grid true origin and scale.
const F0: f64 = 0.999_601_271_7;
const LAT0_DEG: f64 = 49.0;
const LON0_DEG: f64 = -2.0;
const E0: f64 = 400_000.0;
const N0: f64 = -100_000.0;

// OSGB36 → WGS84 Helmert parameters.
const TX: f64 = 446.448;
const TY: f64 = -125.157;
const TZ: f64 = 542.060;
const SCALE_PPM: f64 = -20.4894;
const RX_SEC: f64 = 0.1502;
const RY_SEC: f64 = 0.2470;
const RZ_SEC: f64 = 0.8421;

/// Meridional arc from the true origin latitude to `lat` (radians).
fn meridional_arc(lat: f64) -> f64 {
    let Ellipsoid { a, b } = AIRY_1830;
    let n = (a - b) / (a + b);
    let (n2, n3) = (n * n, n * n * n);
    let lat0 = LAT0_DEG.to_radians();
    let d = lat - lat0;
    let s = lat + lat0;
    b * F0
        * ((1.0 + n + 1.25 * n2 + 1.25 * n3) * d
            - (3.0 * n + 3.0 * n2 + 21.0 / 8.0 * n3) * d.sin() * s.cos()
            + (15.0 / 8.0 * n2 + 15.0 / 8.0 * n3) * (2.0 * d).sin() * (2.0 * s).cos()
            - 35.0 / 24.0 * n3 * (3.0 * d).sin() * (3.0 * s).cos())
}

/// Inverse transverse Mercator: grid metres → OSGB36 (lat, lon) radians.
pub(crate) fn osgb36_from_grid(e: f64, n: f64) -> (f64, f64) {
    let a = AIRY_1830.a;
    let e2 = AIRY_1830.e2();
    let lat0 = LAT0_DEG.to_radians();
    let lon0 = LON0_DEG.to_radians();

    let mut lat = (n - N0) / (a * F0) + lat0;
    let mut m = meridional_arc(lat);
    // Converges to sub-millimetre in a handful of iterations.
    for _ in 0..32 {
        if (n - N0 - m).abs() < 1e-5 {
            break;
        }
        lat += (n - N0 - m) / (a * F0);
        m = meridional_arc(lat);
    }

    let (sin, cos) = lat.sin_cos();
    let nu = a * F0 / (1.0 - e2 * sin * sin).sqrt();
    let rho = a * F0 * (1.0 - e2) / (1.0 - e2 * sin * sin).powf(1.5);
    let eta2 = nu / rho - 1.0;

    let tan = lat.tan();
    let (t2, t4, t6) = (tan * tan, tan.powi(4), tan.powi(6));
    let sec = 1.0 / cos;

    let vii = tan / (2.0 * rho * nu);
    let viii = tan / (24.0 * rho * nu.powi(3)) * (5.0 + 3.0 * t2 + eta2 - 9.0 * t2 * eta2);
    let ix = tan / (720.0 * rho * nu.powi(5)) * (61.0 + 90.0 * t2 + 45.0 * t4);
    let x = sec / nu;
    let xi = sec / (6.0 * nu.powi(3)) * (nu / rho + 2.0 * t2);
    let xii = sec / (120.0 * nu.powi(5)) * (5.0 + 28.0 * t2 + 24.0 * t4);
    let xiia = sec / (5040.0 * nu.powi(7)) * (61.0 + 662.0 * t2 + 1320.0 * t4 + 720.0 * t6);

    let de = e - E0;
    let lat_out = lat - vii * de.powi(2) + viii * de.powi(4) - ix * de.powi(6);
    let lon_out = lon0 + x * de - xi * de.powi(3) + xii * de.powi(5) - xiia * de.powi(7);
    (lat_out, lon_out)
}

fn to_cartesian(lat: f64, lon: f64, ellipsoid: &Ellipsoid) -> DVec3 {
    let e2 = ellipsoid.e2();
    let (sin_lat, cos_lat) = lat.sin_cos();
    let (sin_lon, cos_lon) = lon.sin_cos();
    let nu = ellipsoid.a / (1.0 - e2 * sin_lat * sin_lat).sqrt();
    DVec3::new(
        nu * cos_lat * cos_lon,
        nu * cos_lat * sin_lon,
        nu * (1.0 - e2) * sin_lat,
    )
}

fn from_cartesian(p: DVec3, ellipsoid: &Ellipsoid) -> (f64, f64) {
    let e2 = ellipsoid.e2();
    let horizontal = (p.x * p.x + p.y * p.y).sqrt();
    let mut lat = p.z.atan2(horizontal * (1.0 - e2));
    for _ in 0..10 {
        let sin = lat.sin();
        let nu = ellipsoid.a / (1.0 - e2 * sin * sin).sqrt();
        let next = (p.z + e2 * nu * sin).atan2(horizontal);
        if (next - lat).abs() < 1e-12 {
            lat = next;
            break;
        }
        lat = next;
    }
    (lat, p.y.atan2(p.x))
}

fn helmert(p: DVec3) -> DVec3 {
    let s = SCALE_PPM * 1e-6;
    let sec = std::f64::consts::PI / (180.0 * 3600.0);
    let (rx, ry, rz) = (RX_SEC * sec, RY_SEC * sec, RZ_SEC * sec);
    DVec3::new(
        TX + (1.0 + s) * p.x - rz * p.y + ry * p.z,
        TY + rz * p.x + (1.0 + s) * p.y - rx * p.z,
        TZ - ry * p.x + rx * p.y + (1.0 + s) * p.z,
    )
}

/// OSGB36 (lat, lon) radians → WGS84 (lat, lon) radians.
fn osgb36_to_wgs84(lat: f64, lon: f64) -> (f64, f64) {
    from_cartesian(helmert(to_cartesian(lat, lon, &AIRY_1830)), &WGS84)
}
