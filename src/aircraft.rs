//! The sky: every aircraft currently being tracked, keyed by address.
//!
//! Decoded messages are folded into per-aircraft state; entries age out
//! after a minute without traffic. Position is committed only once an
//! even/odd CPR pair lands close enough together to resolve.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::cpr;
use crate::decoder::{AltitudeUnit, DecodedMessage};

/// Aircraft lifetime after the last received message.
pub const AIRCRAFT_TTL: Duration = Duration::from_secs(60);

/// Maximum spacing between the CPR halves of a resolvable pair.
const CPR_PAIR_WINDOW: Duration = Duration::from_secs(10);

/// One received CPR half.
#[derive(Debug, Clone, Copy)]
struct CprHalf {
    lat: u32,
    lon: u32,
    at: Instant,
}

/// State accumulated for one aircraft.
#[derive(Debug, Clone)]
pub struct Aircraft {
    /// ICAO 24-bit address.
    pub addr: u32,
    /// Address as six uppercase hex nibbles.
    pub hex_addr: String,
    /// Callsign as decoded, trailing spaces retained.
    pub callsign: String,
    pub altitude: i32,
    pub unit: AltitudeUnit,
    /// Ground speed in knots.
    pub speed: u16,
    /// Track in degrees.
    pub track: u16,
    /// Resolved position in degrees, once an even/odd pair matched.
    pub position: Option<(f64, f64)>,
    pub seen: Instant,
    pub messages: u64,
    even: Option<CprHalf>,
    odd: Option<CprHalf>,
}

impl Aircraft {
    fn new(addr: u32) -> Self {
        Self {
            addr,
            hex_addr: format!("{:06X}", addr),
            callsign: String::new(),
            altitude: 0,
            unit: AltitudeUnit::Feet,
            speed: 0,
            track: 0,
            position: None,
            seen: Instant::now(),
            messages: 0,
            even: None,
            odd: None,
        }
    }

    /// Resolve position if both halves are present and close in time.
    fn update_position(&mut self) {
        let (even, odd) = match (self.even, self.odd) {
            (Some(e), Some(o)) => (e, o),
            _ => return,
        };

        let spacing = if even.at > odd.at {
            even.at - odd.at
        } else {
            odd.at - even.at
        };
        if spacing > CPR_PAIR_WINDOW {
            return;
        }

        let odd_is_fresher = odd.at >= even.at;
        if let Some(position) = cpr::resolve(
            (even.lat, even.lon),
            (odd.lat, odd.lon),
            odd_is_fresher,
        ) {
            self.position = Some(position);
        }
    }
}

/// All tracked aircraft. Shared behind a lock; snapshots are deep
/// copies so rendering never holds it.
pub struct Sky {
    aircraft: HashMap<u32, Aircraft>,
    ttl: Duration,
}

impl Sky {
    pub fn new() -> Self {
        Self::with_ttl(AIRCRAFT_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            aircraft: HashMap::new(),
            ttl,
        }
    }

    /// Fold one decoded message into the fleet view.
    ///
    /// Messages that failed validation are dropped silently.
    pub fn apply(&mut self, mm: &DecodedMessage) -> Option<&Aircraft> {
        if !mm.crc_ok {
            return None;
        }

        let aircraft = self
            .aircraft
            .entry(mm.icao)
            .or_insert_with(|| Aircraft::new(mm.icao));
        aircraft.seen = Instant::now();
        aircraft.messages += 1;

        match mm.df {
            0 | 4 | 20 => {
                aircraft.altitude = mm.altitude;
                aircraft.unit = mm.unit;
            }
            17 => {
                if (1..=4).contains(&mm.me_type) {
                    aircraft.callsign = mm.callsign.clone();
                } else if (9..=18).contains(&mm.me_type) {
                    aircraft.altitude = mm.altitude;
                    aircraft.unit = mm.unit;

                    let half = CprHalf {
                        lat: mm.raw_latitude,
                        lon: mm.raw_longitude,
                        at: Instant::now(),
                    };
                    if mm.cpr_odd {
                        aircraft.odd = Some(half);
                    } else {
                        aircraft.even = Some(half);
                    }
                    aircraft.update_position();
                } else if mm.me_type == 19 && (mm.me_sub == 1 || mm.me_sub == 2) {
                    aircraft.speed = mm.ground_speed;
                    aircraft.track = (mm.heading.round() as u16) % 360;
                }
            }
            _ => {}
        }

        self.aircraft.get(&mm.icao)
    }

    pub fn get(&self, addr: u32) -> Option<&Aircraft> {
        self.aircraft.get(&addr)
    }

    /// Deep copy of every tracked aircraft.
    pub fn snapshot(&self) -> Vec<Aircraft> {
        self.aircraft.values().cloned().collect()
    }

    pub fn count(&self) -> usize {
        self.aircraft.len()
    }

    /// Drop aircraft not heard from within the TTL.
    pub fn prune(&mut self) {
        let ttl = self.ttl;
        self.aircraft.retain(|_, a| a.seen.elapsed() <= ttl);
    }
}

impl Default for Sky {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crc;
    use crate::decoder::{Decoder, LONG_FRAME_BITS, LONG_FRAME_BYTES};
    use std::thread::sleep;

    fn frame(hex: &str) -> [u8; LONG_FRAME_BYTES] {
        let mut out = [0u8; LONG_FRAME_BYTES];
        for (i, chunk) in hex.as_bytes().chunks(2).enumerate() {
            let hi = (chunk[0] as char).to_digit(16).unwrap() as u8;
            let lo = (chunk[1] as char).to_digit(16).unwrap() as u8;
            out[i] = (hi << 4) | lo;
        }
        out
    }

    /// Build a parity-correct DF 17 airborne position frame.
    fn position_frame(icao: u32, odd: bool, lat: u32, lon: u32) -> [u8; LONG_FRAME_BYTES] {
        let mut msg = [0u8; LONG_FRAME_BYTES];
        msg[0] = (17 << 3) | 5;
        msg[1] = (icao >> 16) as u8;
        msg[2] = (icao >> 8) as u8;
        msg[3] = icao as u8;
        msg[4] = 11 << 3;
        msg[5] = 0xC3; // 25 ft steps, Q=1
        msg[6] = (0x08 << 4) | ((odd as u8) << 2) | ((lat >> 15) & 0x03) as u8;
        msg[7] = (lat >> 7) as u8;
        msg[8] = (((lat & 0x7F) << 1) as u8) | ((lon >> 16) & 0x01) as u8;
        msg[9] = (lon >> 8) as u8;
        msg[10] = lon as u8;

        let crc = crc::checksum(&msg, LONG_FRAME_BITS);
        msg[11] = (crc >> 16) as u8;
        msg[12] = (crc >> 8) as u8;
        msg[13] = crc as u8;
        msg
    }

    #[test]
    fn invalid_messages_are_dropped() {
        let decoder = Decoder::new();
        let mut sky = Sky::new();

        let mut corrupted = frame("8D4840D6202CC371C32CE0576098");
        corrupted[2] ^= 0x10;
        corrupted[9] ^= 0x01;

        let mm = decoder.decode(&corrupted);
        assert!(!mm.crc_ok);
        assert!(sky.apply(&mm).is_none());
        assert_eq!(sky.count(), 0);
    }

    #[test]
    fn tracks_identification_and_velocity() {
        let decoder = Decoder::new();
        let mut sky = Sky::new();

        sky.apply(&decoder.decode(&frame("8D4840D6202CC371C32CE0576098")));
        let ac = sky.get(0x4840D6).unwrap();
        assert_eq!(ac.hex_addr, "4840D6");
        assert_eq!(ac.callsign, "KLM1023 ");
        assert_eq!(ac.messages, 1);

        sky.apply(&decoder.decode(&frame("8D485020994409940838175B284F")));
        let ac = sky.get(0x485020).unwrap();
        assert_eq!(ac.speed, 159);
        assert_eq!(ac.track, 183);

        assert_eq!(sky.count(), 2);
    }

    #[test]
    fn resolves_position_from_fresh_pair() {
        let decoder = Decoder::new();
        let mut sky = Sky::new();

        // Odd half first, then even: the even half anchors.
        sky.apply(&decoder.decode(&frame("8D40621D58C386435CC412692AD6")));
        assert_eq!(sky.get(0x40621D).unwrap().position, None);

        sky.apply(&decoder.decode(&frame("8D40621D58C382D690C8AC2863A7")));
        let ac = sky.get(0x40621D).unwrap();
        assert_eq!(ac.altitude, 38000);

        let (lat, lon) = ac.position.expect("pair should resolve");
        assert!((lat - 52.2572).abs() < 0.001, "lat {}", lat);
        assert!((lon - 3.9192).abs() < 0.001, "lon {}", lon);
    }

    #[test]
    fn single_half_never_resolves() {
        let decoder = Decoder::new();
        let mut sky = Sky::new();

        for _ in 0..3 {
            sky.apply(&decoder.decode(&frame("8D40621D58C382D690C8AC2863A7")));
        }
        assert_eq!(sky.get(0x40621D).unwrap().position, None);
    }

    #[test]
    fn zone_mismatch_keeps_previous_position() {
        let decoder = Decoder::new();
        let mut sky = Sky::new();

        // These halves resolve to latitudes on opposite sides of the
        // 36/35-zone breakpoint, so the pair must be rejected.
        sky.apply(&decoder.decode(&position_frame(0x123456, false, 111303, 51372)));
        sky.apply(&decoder.decode(&position_frame(0x123456, true, 91981, 50194)));
        assert_eq!(sky.get(0x123456).unwrap().position, None);
    }

    #[test]
    fn stale_half_blocks_resolution() {
        let decoder = Decoder::new();
        let mut sky = Sky::new();

        sky.apply(&decoder.decode(&frame("8D40621D58C382D690C8AC2863A7")));

        // Age the even half past the pairing window.
        let aircraft = sky.aircraft.get_mut(&0x40621D).unwrap();
        let even = aircraft.even.as_mut().unwrap();
        even.at = Instant::now() - Duration::from_secs(11);

        sky.apply(&decoder.decode(&frame("8D40621D58C386435CC412692AD6")));
        assert_eq!(sky.get(0x40621D).unwrap().position, None);
    }

    #[test]
    fn prune_keeps_fresh_and_drops_stale() {
        let decoder = Decoder::new();
        let mut sky = Sky::with_ttl(Duration::from_millis(100));

        sky.apply(&decoder.decode(&frame("8D4840D6202CC371C32CE0576098")));
        sky.prune();
        assert_eq!(sky.count(), 1);

        sleep(Duration::from_millis(150));
        sky.apply(&decoder.decode(&frame("8D485020994409940838175B284F")));
        sky.prune();

        assert_eq!(sky.count(), 1);
        assert!(sky.get(0x485020).is_some());
        assert!(sky.get(0x4840D6).is_none());
    }

    #[test]
    fn snapshot_is_detached() {
        let decoder = Decoder::new();
        let mut sky = Sky::new();
        sky.apply(&decoder.decode(&frame("8D4840D6202CC371C32CE0576098")));

        let snapshot = sky.snapshot();
        assert_eq!(snapshot.len(), 1);

        sky.apply(&decoder.decode(&frame("8D4840D6202CC371C32CE0576098")));
        assert_eq!(snapshot[0].messages, 1);
        assert_eq!(sky.get(0x4840D6).unwrap().messages, 2);
    }
}
