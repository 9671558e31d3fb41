//! Compact Position Reporting solver.
//!
//! An airborne position is broadcast alternately in two 17-bit "even"
//! and "odd" encodings; one half alone is ambiguous, a pair received
//! close together pins the aircraft to a unique latitude/longitude.

/// Always-nonnegative modulo.
fn cpr_mod(a: i64, b: i64) -> i64 {
    let res = a % b;
    if res < 0 {
        res + b
    } else {
        res
    }
}

/// Number of longitude zones at a latitude.
///
/// Step table on |lat| from 1090-WP-9-14; above 87 degrees there is a
/// single zone.
fn cpr_nl(lat: f64) -> i64 {
    let lat = lat.abs();

    if lat < 10.47047130 {
        59
    } else if lat < 14.82817437 {
        58
    } else if lat < 18.18626357 {
        57
    } else if lat < 21.02939493 {
        56
    } else if lat < 23.54504487 {
        55
    } else if lat < 25.82924707 {
        54
    } else if lat < 27.93898710 {
        53
    } else if lat < 29.91135686 {
        52
    } else if lat < 31.77209708 {
        51
    } else if lat < 33.53993436 {
        50
    } else if lat < 35.22899598 {
        49
    } else if lat < 36.85025108 {
        48
    } else if lat < 38.41241892 {
        47
    } else if lat < 39.92256684 {
        46
    } else if lat < 41.38651832 {
        45
    } else if lat < 42.80914012 {
        44
    } else if lat < 44.19454951 {
        43
    } else if lat < 45.54626723 {
        42
    } else if lat < 46.86733252 {
        41
    } else if lat < 48.16039128 {
        40
    } else if lat < 49.42776439 {
        39
    } else if lat < 50.67150166 {
        38
    } else if lat < 51.89342469 {
        37
    } else if lat < 53.09516153 {
        36
    } else if lat < 54.27817472 {
        35
    } else if lat < 55.44378444 {
        34
    } else if lat < 56.59318756 {
        33
    } else if lat < 57.72747354 {
        32
    } else if lat < 58.84763776 {
        31
    } else if lat < 59.95459277 {
        30
    } else if lat < 61.04917774 {
        29
    } else if lat < 62.13216659 {
        28
    } else if lat < 63.20427479 {
        27
    } else if lat < 64.26616523 {
        26
    } else if lat < 65.31845310 {
        25
    } else if lat < 66.36171008 {
        24
    } else if lat < 67.39646774 {
        23
    } else if lat < 68.42322022 {
        22
    } else if lat < 69.44242631 {
        21
    } else if lat < 70.45451075 {
        20
    } else if lat < 71.45986473 {
        19
    } else if lat < 72.45884545 {
        18
    } else if lat < 73.45177442 {
        17
    } else if lat < 74.43893416 {
        16
    } else if lat < 75.42056257 {
        15
    } else if lat < 76.39684391 {
        14
    } else if lat < 77.36789461 {
        13
    } else if lat < 78.33374083 {
        12
    } else if lat < 79.29428225 {
        11
    } else if lat < 80.24923213 {
        10
    } else if lat < 81.19801349 {
        9
    } else if lat < 82.13956981 {
        8
    } else if lat < 83.07199445 {
        7
    } else if lat < 83.99173563 {
        6
    } else if lat < 84.89166191 {
        5
    } else if lat < 85.75541621 {
        4
    } else if lat < 86.53536998 {
        3
    } else if lat < 87.00000000 {
        2
    } else {
        1
    }
}

/// Zone count for one parity, never below 1.
fn cpr_n(lat: f64, odd: bool) -> i64 {
    let n = cpr_nl(lat) - if odd { 1 } else { 0 };
    n.max(1)
}

/// Longitude zone width in degrees for one parity.
fn cpr_dlon(lat: f64, odd: bool) -> f64 {
    360.0 / cpr_n(lat, odd) as f64
}

/// Resolve an even/odd pair of 17-bit raw positions.
///
/// `odd_is_fresher` selects which half anchors the solution; callers
/// pass the half received last. Returns `None` when the two halves sit
/// in different latitude zones, in which case the caller keeps its
/// previous position and waits for the next pair.
pub fn resolve(
    even: (u32, u32),
    odd: (u32, u32),
    odd_is_fresher: bool,
) -> Option<(f64, f64)> {
    const DLAT_EVEN: f64 = 360.0 / 60.0;
    const DLAT_ODD: f64 = 360.0 / 59.0;
    const CPR_MAX: f64 = 131072.0; // 2^17

    let lat0 = even.0 as f64;
    let lon0 = even.1 as f64;
    let lat1 = odd.0 as f64;
    let lon1 = odd.1 as f64;

    // Latitude index j.
    let j = ((59.0 * lat0 - 60.0 * lat1) / CPR_MAX + 0.5).floor() as i64;

    let mut rlat0 = DLAT_EVEN * (cpr_mod(j, 60) as f64 + lat0 / CPR_MAX);
    let mut rlat1 = DLAT_ODD * (cpr_mod(j, 59) as f64 + lat1 / CPR_MAX);

    if rlat0 >= 270.0 {
        rlat0 -= 360.0;
    }
    if rlat1 >= 270.0 {
        rlat1 -= 360.0;
    }

    // Both halves must agree on the longitude zone count.
    if cpr_nl(rlat0) != cpr_nl(rlat1) {
        return None;
    }

    let (rlat, cpr_lon, odd_anchor) = if odd_is_fresher {
        (rlat1, lon1, true)
    } else {
        (rlat0, lon0, false)
    };

    let nl = cpr_nl(rlat);
    let ni = cpr_n(rlat, odd_anchor);
    let m = ((lon0 * (nl - 1) as f64 - lon1 * nl as f64) / CPR_MAX + 0.5).floor() as i64;

    let mut lon = cpr_dlon(rlat, odd_anchor) * (cpr_mod(m, ni) as f64 + cpr_lon / CPR_MAX);
    if lon > 180.0 {
        lon -= 360.0;
    }

    Some((rlat, lon))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Raw halves from the canonical airborne position pair
    // *8D40621D58C382D690C8AC2863A7; / *8D40621D58C386435CC412692AD6;
    const EVEN: (u32, u32) = (93000, 51372);
    const ODD: (u32, u32) = (74158, 50194);

    #[test]
    fn resolves_even_anchored_pair() {
        let (lat, lon) = resolve(EVEN, ODD, false).unwrap();
        assert!((lat - 52.2572).abs() < 0.0001, "lat {}", lat);
        assert!((lon - 3.91937).abs() < 0.0001, "lon {}", lon);
    }

    #[test]
    fn resolves_odd_anchored_pair() {
        let (lat, lon) = resolve(EVEN, ODD, true).unwrap();
        assert!((lat - 52.26578).abs() < 0.0001, "lat {}", lat);
        // Odd anchor lands in the same zone, one zone-width convention
        // apart in longitude.
        assert!((lon - 3.93904).abs() < 0.001, "lon {}", lon);
    }

    #[test]
    fn rejects_zone_mismatch() {
        // These halves resolve to 53.09509 (even) and 53.09566 (odd),
        // straddling the 36/35-zone breakpoint at 53.09516153.
        let even = (111303, 51372);
        let odd = (91981, 50194);
        assert_eq!(resolve(even, odd, true), None);
        assert_eq!(resolve(even, odd, false), None);
    }

    #[test]
    fn modulo_is_never_negative() {
        for a in [-120i64, -61, -1, 0, 1, 59, 121] {
            for b in [59i64, 60] {
                let m = cpr_mod(a, b);
                assert!((0..b).contains(&m), "mod({}, {}) = {}", a, b, m);
            }
        }
    }

    #[test]
    fn nl_table_breakpoints() {
        assert_eq!(cpr_nl(0.0), 59);
        assert_eq!(cpr_nl(-10.0), 59);
        assert_eq!(cpr_nl(10.47047130), 58);
        assert_eq!(cpr_nl(45.0), 42);
        assert_eq!(cpr_nl(52.2572), 36);
        assert_eq!(cpr_nl(-52.2572), 36);
        assert_eq!(cpr_nl(86.99), 2);
        assert_eq!(cpr_nl(87.5), 1);
    }

    #[test]
    fn zone_count_floors_at_one() {
        assert_eq!(cpr_n(88.0, true), 1);
        assert_eq!(cpr_n(88.0, false), 1);
        assert_eq!(cpr_n(0.0, true), 58);
    }
}
