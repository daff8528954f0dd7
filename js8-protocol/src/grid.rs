/// Number of distinct packed four-character grids (180 × 180 two-degree by
/// one-degree squares). Packed values below this are valid.
pub const NBASEGRID: u16 = 180 * 180;

/// Sentinel returned when a grid cannot be packed.
pub const NMAXGRID: u16 = (1 << 15) - 1;

/// Check whether `grid` is a well-formed 4 or 6 character locator.
pub fn is_grid(grid: &str) -> bool {
    let b = grid.as_bytes();
    if b.len() != 4 && b.len() != 6 {
        return false;
    }
    let field = |c: u8| (b'A'..=b'R').contains(&c.to_ascii_uppercase());
    let square = |c: u8| c.is_ascii_digit();
    let sub = |c: u8| (b'A'..=b'X').contains(&c.to_ascii_uppercase());

    field(b[0]) && field(b[1]) && square(b[2]) && square(b[3]) && (b.len() == 4 || (sub(b[4]) && sub(b[5])))
}

/// Centre of a grid square as `(latitude, longitude)` in decimal degrees,
/// north and east positive.
pub fn grid_to_deg(grid: &str) -> Option<(f64, f64)> {
    if !is_grid(grid) {
        return None;
    }
    let b: Vec<u8> = grid.bytes().map(|c| c.to_ascii_uppercase()).collect();

    let mut lon = (b[0] - b'A') as f64 * 20.0 - 180.0 + (b[2] - b'0') as f64 * 2.0;
    let mut lat = (b[1] - b'A') as f64 * 10.0 - 90.0 + (b[3] - b'0') as f64;

    if b.len() == 6 {
        lon += (b[4] - b'A') as f64 * (2.0 / 24.0) + 1.0 / 24.0;
        lat += (b[5] - b'A') as f64 * (1.0 / 24.0) + 0.5 / 24.0;
    } else {
        lon += 1.0;
        lat += 0.5;
    }
    Some((lat, lon))
}

/// Four-character grid square containing the coordinate.
pub fn deg_to_grid(lat: f64, lon: f64) -> String {
    let lon = (lon + 180.0).clamp(0.0, 359.999_999);
    let lat = (lat + 90.0).clamp(0.0, 179.999_999);

    let field_lon = (lon / 20.0).floor() as u8;
    let field_lat = (lat / 10.0).floor() as u8;
    let square_lon = ((lon % 20.0) / 2.0).floor() as u8;
    let square_lat = (lat % 10.0).floor() as u8;

    [
        (b'A' + field_lon) as char,
        (b'A' + field_lat) as char,
        (b'0' + square_lon) as char,
        (b'0' + square_lat) as char,
    ]
    .iter()
    .collect()
}

/// Pack the first four characters of a grid into 15 bits.
///
/// Grids shorter than four characters (or malformed) pack to [`NMAXGRID`].
pub fn pack_grid(grid: &str) -> u16 {
    let grid = grid.trim();
    if grid.len() < 4 {
        return NMAXGRID;
    }
    let Some((lat, lon)) = grid.get(..4).and_then(grid_to_deg) else {
        return NMAXGRID;
    };

    let lon_index = ((lon + 180.0) / 2.0).floor() as u16;
    let lat_index = (lat + 90.0).floor() as u16;
    lon_index * 180 + lat_index
}

/// Inverse of [`pack_grid`]. Returns `None` for values at or above [`NBASEGRID`].
pub fn unpack_grid(packed: u16) -> Option<String> {
    if packed >= NBASEGRID {
        return None;
    }
    let lon = (packed / 180) as f64 * 2.0 - 180.0 + 1.0;
    let lat = (packed % 180) as f64 - 90.0 + 0.5;
    Some(deg_to_grid(lat, lon))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_grid() {
        assert!(is_grid("FN31"));
        assert!(is_grid("FN31pr"));
        assert!(is_grid("em12"));
        assert!(!is_grid("FN3"));
        assert!(!is_grid("ZZ99"));
        assert!(!is_grid("FN3X"));
    }

    #[test]
    fn test_grid_to_deg_center() {
        let (lat, lon) = grid_to_deg("FN31").unwrap();
        assert!((lat - 41.5).abs() < 1e-9);
        assert!((lon - -73.0).abs() < 1e-9);
    }

    #[test]
    fn test_grid_roundtrip() {
        for g in ["FN31", "EM12", "AA00", "RR99", "JO62", "QF56", "IO91"] {
            let (lat, lon) = grid_to_deg(g).unwrap();
            assert_eq!(deg_to_grid(lat, lon), g);
        }
    }

    #[test]
    fn test_six_char_grid_stays_in_square() {
        let (lat, lon) = grid_to_deg("FN31pr").unwrap();
        assert_eq!(deg_to_grid(lat, lon), "FN31");
    }

    #[test]
    fn test_pack_grid_roundtrip() {
        for g in ["FN31", "EM12", "AA00", "RR99", "JO62"] {
            let packed = pack_grid(g);
            assert!(packed < NBASEGRID);
            assert_eq!(unpack_grid(packed).as_deref(), Some(g));
        }
    }

    #[test]
    fn test_pack_grid_short_is_sentinel() {
        assert_eq!(pack_grid("FN"), NMAXGRID);
        assert_eq!(pack_grid(""), NMAXGRID);
        assert_eq!(pack_grid("  "), NMAXGRID);
        assert_eq!(unpack_grid(NMAXGRID), None);
    }
}
