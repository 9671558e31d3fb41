//! Mode S message decoder.
//!
//! Turns a raw frame into a [`DecodedMessage`]: parity check and repair,
//! address validation, then per-Downlink-Format field extraction. The
//! decoder owns the recently-seen address cache; beyond inserting into
//! it on clean DF 11/17/18 receptions, decoding is pure.

use std::fmt;

use crate::config::Config;
use crate::crc;
use crate::icao::IcaoCache;

pub const LONG_FRAME_BITS: usize = 112;
pub const SHORT_FRAME_BITS: usize = 56;
pub const LONG_FRAME_BYTES: usize = LONG_FRAME_BITS / 8;
pub const SHORT_FRAME_BYTES: usize = SHORT_FRAME_BITS / 8;

/// AIS charset for flight identification, 6 bits per character.
/// Out-of-set codes decode to `?` and stay that way downstream.
const AIS_CHARSET: &[u8; 64] =
    b"?ABCDEFGHIJKLMNOPQRSTUVWXYZ????? ???????????????0123456789??????";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AltitudeUnit {
    Feet,
    Meters,
}

impl fmt::Display for AltitudeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AltitudeUnit::Feet => write!(f, "feet"),
            AltitudeUnit::Meters => write!(f, "meters"),
        }
    }
}

/// Message length in bits for a Downlink Format.
pub fn frame_len_by_df(df: u8) -> usize {
    match df {
        16 | 17 | 19 | 20 | 21 => LONG_FRAME_BITS,
        _ => SHORT_FRAME_BITS,
    }
}

/// One decoded Mode S message.
#[derive(Debug, Clone)]
pub struct DecodedMessage {
    /// Frame bytes, possibly after bit repair.
    pub raw: [u8; LONG_FRAME_BYTES],
    /// 56 or 112, derived from `df`.
    pub bits: usize,
    /// Downlink Format, top 5 bits of byte 0.
    pub df: u8,
    /// Trailing CRC as received (after repair, the repaired value).
    pub crc: u32,
    /// Parity verified, possibly after repair or address recovery.
    pub crc_ok: bool,
    /// First repaired bit position, if any.
    pub error_bit: Option<usize>,
    /// Second repaired bit position (two-bit repair only).
    pub error_bit2: Option<usize>,
    /// 24-bit ICAO address.
    pub icao: u32,
    /// Capability, DF 11/17/18.
    pub ca: u8,
    /// Flight status, DF 4/5/20/21.
    pub fs: u8,
    /// Downlink request, DF 4/5/20/21.
    pub dr: u8,
    /// Utility message, DF 4/5/20/21.
    pub um: u8,
    /// Mode A squawk as four decimal digits, DF 5/21.
    pub identity: u16,
    pub altitude: i32,
    pub unit: AltitudeUnit,
    /// Extended squitter type, DF 17.
    pub me_type: u8,
    /// Extended squitter subtype, DF 17.
    pub me_sub: u8,
    /// ME 1-4: category, `me_type - 1`.
    pub aircraft_category: u8,
    /// ME 1-4: eight AIS characters, trailing spaces retained.
    pub callsign: String,
    /// ME 9-18: CPR format, false = even, true = odd.
    pub cpr_odd: bool,
    /// ME 9-18: UTC-synchronized timing.
    pub utc_sync: bool,
    /// ME 9-18: 17-bit raw CPR latitude.
    pub raw_latitude: u32,
    /// ME 9-18: 17-bit raw CPR longitude.
    pub raw_longitude: u32,
    /// ME 19 sub 1-2: 0 = East, 1 = West.
    pub ew_dir: u8,
    /// ME 19 sub 1-2: E/W component as encoded (speed + 1).
    pub ew_velocity: u16,
    /// ME 19 sub 1-2: 0 = North, 1 = South.
    pub ns_dir: u8,
    /// ME 19 sub 1-2: N/S component as encoded (speed + 1).
    pub ns_velocity: u16,
    pub vert_rate_source: u8,
    pub vert_rate_sign: u8,
    /// Raw 9-bit vertical rate field; physical rate is (n - 1) × 64 ft/min.
    pub vert_rate: u16,
    /// Knots, computed from the velocity components.
    pub ground_speed: u16,
    /// Degrees in [0, 360), 0 at north, clockwise.
    pub heading: f64,
    /// ME 19 sub 3-4: heading field marked valid.
    pub heading_valid: bool,
}

impl Default for DecodedMessage {
    fn default() -> Self {
        Self {
            raw: [0; LONG_FRAME_BYTES],
            bits: 0,
            df: 0,
            crc: 0,
            crc_ok: false,
            error_bit: None,
            error_bit2: None,
            icao: 0,
            ca: 0,
            fs: 0,
            dr: 0,
            um: 0,
            identity: 0,
            altitude: 0,
            unit: AltitudeUnit::Feet,
            me_type: 0,
            me_sub: 0,
            aircraft_category: 0,
            callsign: String::new(),
            cpr_odd: false,
            utc_sync: false,
            raw_latitude: 0,
            raw_longitude: 0,
            ew_dir: 0,
            ew_velocity: 0,
            ns_dir: 0,
            ns_velocity: 0,
            vert_rate_source: 0,
            vert_rate_sign: 0,
            vert_rate: 0,
            ground_speed: 0,
            heading: 0.0,
            heading_valid: false,
        }
    }
}

impl DecodedMessage {
    /// Address as six uppercase hex nibbles.
    pub fn hex_addr(&self) -> String {
        format!("{:06X}", self.icao)
    }

    /// Raw frame as a source-format line, `*<hex>;`.
    pub fn to_raw_line(&self) -> String {
        let mut s = String::with_capacity(self.bits / 4 + 2);
        s.push('*');
        for byte in &self.raw[..self.bits / 8] {
            s.push_str(&format!("{:02X}", byte));
        }
        s.push(';');
        s
    }
}

/// Decoder configuration plus the address cache it maintains.
pub struct Decoder {
    /// Attempt single-bit repair on DF 11/17.
    pub fix_errors: bool,
    /// Attempt two-bit repair on DF 17 after single-bit has failed.
    pub aggressive: bool,
    cache: IcaoCache,
}

impl Decoder {
    pub fn new() -> Self {
        Self {
            fix_errors: true,
            aggressive: false,
            cache: IcaoCache::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            fix_errors: config.fix_errors,
            aggressive: config.aggressive,
            cache: IcaoCache::new(),
        }
    }

    pub fn cache(&self) -> &IcaoCache {
        &self.cache
    }

    /// Decode one raw frame.
    ///
    /// `raw` carries up to 14 bytes; short formats only use the first 7
    /// and trailing bytes are ignored.
    pub fn decode(&self, raw: &[u8]) -> DecodedMessage {
        let mut mm = DecodedMessage::default();

        let len = raw.len().min(LONG_FRAME_BYTES);
        mm.raw[..len].copy_from_slice(&raw[..len]);

        mm.df = mm.raw[0] >> 3;
        mm.bits = frame_len_by_df(mm.df);

        mm.crc = crc::extract_trailing_crc(&mm.raw, mm.bits);
        mm.crc_ok = crc::checksum(&mm.raw, mm.bits) == mm.crc;

        // Repair is only worth trying on formats whose trailing CRC is
        // pure; two-bit search runs only after the single-bit scan came
        // up empty.
        if !mm.crc_ok && self.fix_errors && (mm.df == 11 || mm.df == 17) {
            if let Some(bit) = crc::fix_single_bit(&mut mm.raw, mm.bits) {
                mm.error_bit = Some(bit);
                mm.crc = crc::extract_trailing_crc(&mm.raw, mm.bits);
                mm.crc_ok = true;
            } else if self.aggressive && mm.df == 17 {
                if let Some((j, i)) = crc::fix_two_bits(&mut mm.raw, mm.bits) {
                    mm.error_bit = Some(j);
                    mm.error_bit2 = Some(i);
                    mm.crc = crc::extract_trailing_crc(&mm.raw, mm.bits);
                    mm.crc_ok = true;
                }
            }
        }

        mm.ca = mm.raw[0] & 0x07;
        mm.me_type = mm.raw[4] >> 3;
        mm.me_sub = mm.raw[4] & 0x07;

        if matches!(mm.df, 4 | 5 | 20 | 21) {
            mm.fs = mm.raw[0] & 0x07;
            mm.dr = (mm.raw[1] >> 3) & 0x1F;
            mm.um = ((mm.raw[1] & 0x07) << 3) | (mm.raw[2] >> 5);
            mm.identity = decode_squawk(&mm.raw);
        }

        match mm.df {
            // Trailing CRC is pure; the address is right there in the
            // frame. Only a clean, unrepaired reception may seed the
            // cache.
            11 | 17 | 18 => {
                mm.icao = ((mm.raw[1] as u32) << 16)
                    | ((mm.raw[2] as u32) << 8)
                    | (mm.raw[3] as u32);
                if mm.crc_ok && mm.error_bit.is_none() {
                    self.cache.insert(mm.icao);
                }
            }
            // Trailing CRC is XORed with the transmitter address; undo
            // the XOR and accept the frame only if the recovered address
            // was recently seen on a verifiable format.
            0 | 4 | 5 | 16 | 20 | 21 | 24 => {
                match self.recover_ap_address(&mm.raw, mm.bits) {
                    Some(addr) => {
                        mm.icao = addr;
                        mm.crc_ok = true;
                    }
                    None => mm.crc_ok = false,
                }
            }
            // No way to validate the remaining formats.
            _ => mm.crc_ok = false,
        }

        if matches!(mm.df, 0 | 4 | 16 | 20) {
            let (altitude, unit) = decode_ac13(&mm.raw);
            mm.altitude = altitude;
            mm.unit = unit;
        }

        if mm.df == 17 {
            self.decode_extended_squitter(&mut mm);
        }

        mm
    }

    /// Recover the address of an AP-XOR frame via the cache.
    ///
    /// (ADDR ^ CRC) ^ CRC = ADDR, so XORing the computed checksum into
    /// the trailing field yields a candidate address; a cache hit means
    /// the parity checks out for a transmitter we already trust.
    fn recover_ap_address(&self, frame: &[u8], bits: usize) -> Option<u32> {
        let addr = crc::checksum(frame, bits) ^ crc::extract_trailing_crc(frame, bits);
        if self.cache.contains(addr) {
            Some(addr)
        } else {
            None
        }
    }

    fn decode_extended_squitter(&self, mm: &mut DecodedMessage) {
        if (1..=4).contains(&mm.me_type) {
            // Aircraft identification and category.
            mm.aircraft_category = mm.me_type - 1;

            let msg = &mm.raw;
            let codes = [
                msg[5] >> 2,
                ((msg[5] & 0x03) << 4) | (msg[6] >> 4),
                ((msg[6] & 0x0F) << 2) | (msg[7] >> 6),
                msg[7] & 0x3F,
                msg[8] >> 2,
                ((msg[8] & 0x03) << 4) | (msg[9] >> 4),
                ((msg[9] & 0x0F) << 2) | (msg[10] >> 6),
                msg[10] & 0x3F,
            ];
            // Trailing spaces stay; rendering trims them.
            mm.callsign = codes
                .iter()
                .map(|&c| AIS_CHARSET[c as usize] as char)
                .collect();
        } else if (9..=18).contains(&mm.me_type) {
            // Airborne position.
            mm.cpr_odd = mm.raw[6] & 0x04 != 0;
            mm.utc_sync = mm.raw[6] & 0x08 != 0;
            let (altitude, unit) = decode_ac12(&mm.raw);
            mm.altitude = altitude;
            mm.unit = unit;

            mm.raw_latitude = (((mm.raw[6] & 0x03) as u32) << 15)
                | ((mm.raw[7] as u32) << 7)
                | ((mm.raw[8] >> 1) as u32);
            mm.raw_longitude = (((mm.raw[8] & 0x01) as u32) << 16)
                | ((mm.raw[9] as u32) << 8)
                | (mm.raw[10] as u32);
        } else if mm.me_type == 19 && (1..=4).contains(&mm.me_sub) {
            // Airborne velocity.
            if mm.me_sub == 1 || mm.me_sub == 2 {
                mm.ew_dir = (mm.raw[5] & 0x04) >> 2;
                mm.ew_velocity = (((mm.raw[5] & 0x03) as u16) << 8) | (mm.raw[6] as u16);
                mm.ns_dir = (mm.raw[7] & 0x80) >> 7;
                mm.ns_velocity =
                    (((mm.raw[7] & 0x7F) as u16) << 3) | (((mm.raw[8] & 0xE0) >> 5) as u16);
                mm.vert_rate_source = (mm.raw[8] & 0x10) >> 4;
                mm.vert_rate_sign = (mm.raw[8] & 0x08) >> 3;
                mm.vert_rate =
                    (((mm.raw[8] & 0x07) as u16) << 6) | (((mm.raw[9] & 0xFC) >> 2) as u16);

                // The encoded components carry speed + 1; zero means no
                // information.
                let ew = mm.ew_velocity.saturating_sub(1) as f64;
                let ns = mm.ns_velocity.saturating_sub(1) as f64;
                mm.ground_speed = (ew * ew + ns * ns).sqrt().round() as u16;

                if mm.ground_speed > 0 {
                    let ew = if mm.ew_dir != 0 { -ew } else { ew };
                    let ns = if mm.ns_dir != 0 { -ns } else { ns };
                    // atan2(ew, ns): 0 degrees at north, clockwise.
                    let mut heading = ew.atan2(ns).to_degrees();
                    if heading < 0.0 {
                        heading += 360.0;
                    }
                    mm.heading = heading;
                }
            } else {
                mm.heading_valid = mm.raw[5] & 0x04 != 0;
                mm.heading = (360.0 / 128.0)
                    * ((((mm.raw[5] & 0x03) as u16) << 5) | ((mm.raw[6] >> 3) as u16)) as f64;
            }
        }
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Mode A squawk from the interleaved Gillham layout
/// `C1 A1 C2 A2 C4 A4 0 B1 D1 B2 D2 B4 D4` (message bits 20-32), as the
/// decimal rendering of four octal digits.
fn decode_squawk(msg: &[u8]) -> u16 {
    let a = ((msg[3] & 0x80) >> 5) | (msg[2] & 0x02) | ((msg[2] & 0x08) >> 3);
    let b = ((msg[3] & 0x02) << 1) | ((msg[3] & 0x08) >> 2) | ((msg[3] & 0x20) >> 5);
    let c = ((msg[2] & 0x01) << 2) | ((msg[2] & 0x04) >> 1) | ((msg[2] & 0x10) >> 4);
    let d = ((msg[3] & 0x01) << 2) | ((msg[3] & 0x04) >> 1) | ((msg[3] & 0x10) >> 4);
    (a as u16) * 1000 + (b as u16) * 100 + (c as u16) * 10 + (d as u16)
}

/// 13-bit AC altitude field (DF 0/4/16/20), spanning bytes 2-3.
fn decode_ac13(msg: &[u8]) -> (i32, AltitudeUnit) {
    let m_bit = msg[3] & 0x40 != 0;
    let q_bit = msg[3] & 0x10 != 0;

    if m_bit {
        // TODO: metric altitude encoding.
        return (0, AltitudeUnit::Meters);
    }
    if q_bit {
        // 11-bit N with the Q and M bits squeezed out, 25 ft steps.
        let n = (((msg[2] & 0x1F) as i32) << 6)
            | (((msg[3] & 0x80) >> 2) as i32)
            | (((msg[3] & 0x20) >> 1) as i32)
            | ((msg[3] & 0x0F) as i32);
        (n * 25 - 1000, AltitudeUnit::Feet)
    } else {
        // TODO: Gillham-coded altitude when Q=0.
        (0, AltitudeUnit::Feet)
    }
}

/// 12-bit AC altitude field (DF 17 airborne position), bytes 5-6.
fn decode_ac12(msg: &[u8]) -> (i32, AltitudeUnit) {
    let q_bit = msg[5] & 0x01 != 0;
    if q_bit {
        let n = (((msg[5] >> 1) as i32) << 4) | (((msg[6] & 0xF0) >> 4) as i32);
        (n * 25 - 1000, AltitudeUnit::Feet)
    } else {
        (0, AltitudeUnit::Feet)
    }
}

fn capability_str(ca: u8) -> &'static str {
    match ca {
        0 => "Level 1 (Surveillance Only)",
        1 => "Level 2 (DF0,4,5,11)",
        2 => "Level 3 (DF0,4,5,11,20,21)",
        3 => "Level 4 (DF0,4,5,11,20,21,24)",
        4 => "Level 2+3+4 (DF0,4,5,11,20,21,24,code7 - is on ground)",
        5 => "Level 2+3+4 (DF0,4,5,11,20,21,24,code7 - is airborne)",
        6 => "Level 2+3+4 (DF0,4,5,11,20,21,24,code7)",
        _ => "Unknown",
    }
}

fn flight_status_str(fs: u8) -> &'static str {
    match fs {
        0 => "Normal, Airborne",
        1 => "Normal, On the ground",
        2 => "ALERT, Airborne",
        3 => "ALERT, On the ground",
        4 => "ALERT & Special Position Identification",
        5 => "Special Position Identification",
        _ => "Not assigned",
    }
}

fn me_description(me_type: u8, me_sub: u8) -> &'static str {
    match me_type {
        1..=4 => "Aircraft Identification and Category",
        5..=8 => "Surface Position",
        9..=18 => "Airborne Position (Baro Altitude)",
        19 if (1..=4).contains(&me_sub) => "Airborne Velocity",
        20..=22 => "Airborne Position (GNSS Height)",
        23 if me_sub == 0 => "Test Message",
        28 if me_sub == 1 => "Aircraft Status (Emergency)",
        28 if me_sub == 2 => "Aircraft Status (1090ES TCAS RA)",
        29 if me_sub <= 1 => "Target State and Status",
        31 if me_sub <= 1 => "Aircraft Operational Status",
        _ => "Unknown",
    }
}

impl fmt::Display for DecodedMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.to_raw_line())?;
        writeln!(
            f,
            "CRC: {:06x} ({})",
            self.crc,
            if self.crc_ok { "ok" } else { "wrong" }
        )?;
        match (self.error_bit, self.error_bit2) {
            (Some(j), Some(i)) => writeln!(f, "Two bit errors fixed, bits {} and {}", j, i)?,
            (Some(j), None) => writeln!(f, "Single bit error fixed, bit {}", j)?,
            _ => {}
        }

        match self.df {
            0 | 16 => {
                let name = if self.df == 0 { "Short" } else { "Long" };
                writeln!(f, "DF {}: {} Air-Air Surveillance.", self.df, name)?;
                writeln!(f, "  Altitude       : {} {}", self.altitude, self.unit)?;
                writeln!(f, "  ICAO Address   : {}", self.hex_addr())?;
            }
            4 | 20 => {
                let name = if self.df == 4 { "Surveillance" } else { "Comm-B" };
                writeln!(f, "DF {}: {}, Altitude Reply.", self.df, name)?;
                writeln!(f, "  Flight Status  : {}", flight_status_str(self.fs))?;
                writeln!(f, "  DR             : {}", self.dr)?;
                writeln!(f, "  UM             : {}", self.um)?;
                writeln!(f, "  Altitude       : {} {}", self.altitude, self.unit)?;
                writeln!(f, "  ICAO Address   : {}", self.hex_addr())?;
            }
            5 | 21 => {
                let name = if self.df == 5 { "Surveillance" } else { "Comm-B" };
                writeln!(f, "DF {}: {}, Identity Reply.", self.df, name)?;
                writeln!(f, "  Flight Status  : {}", flight_status_str(self.fs))?;
                writeln!(f, "  DR             : {}", self.dr)?;
                writeln!(f, "  UM             : {}", self.um)?;
                writeln!(f, "  Squawk         : {:04}", self.identity)?;
                writeln!(f, "  ICAO Address   : {}", self.hex_addr())?;
            }
            11 => {
                writeln!(f, "DF 11: All Call Reply.")?;
                writeln!(f, "  Capability  : {}", capability_str(self.ca))?;
                writeln!(f, "  ICAO Address: {}", self.hex_addr())?;
            }
            17 => {
                writeln!(f, "DF 17: ADS-B message.")?;
                writeln!(f, "  Capability     : {} ({})", self.ca, capability_str(self.ca))?;
                writeln!(f, "  ICAO Address   : {}", self.hex_addr())?;
                writeln!(f, "  Squitter  Type : {}", self.me_type)?;
                writeln!(f, "  Squitter  Sub  : {}", self.me_sub)?;
                writeln!(
                    f,
                    "  Squitter  Name : {}",
                    me_description(self.me_type, self.me_sub)
                )?;

                if (1..=4).contains(&self.me_type) {
                    let categories = ["D", "C", "B", "A"];
                    writeln!(
                        f,
                        "    Aircraft Type  : Type {}",
                        categories
                            .get(self.aircraft_category as usize)
                            .unwrap_or(&"?")
                    )?;
                    writeln!(f, "    Identification : {}", self.callsign.trim_end())?;
                } else if (9..=18).contains(&self.me_type) {
                    writeln!(f, "    F flag   : {}", if self.cpr_odd { "odd" } else { "even" })?;
                    writeln!(f, "    T flag   : {}", if self.utc_sync { "UTC" } else { "non-UTC" })?;
                    writeln!(f, "    Altitude : {} feet", self.altitude)?;
                    writeln!(f, "    Latitude : {} (not decoded)", self.raw_latitude)?;
                    writeln!(f, "    Longitude: {} (not decoded)", self.raw_longitude)?;
                } else if self.me_type == 19 && (self.me_sub == 1 || self.me_sub == 2) {
                    writeln!(f, "    EW direction      : {}", self.ew_dir)?;
                    writeln!(f, "    EW velocity       : {}", self.ew_velocity)?;
                    writeln!(f, "    NS direction      : {}", self.ns_dir)?;
                    writeln!(f, "    NS velocity       : {}", self.ns_velocity)?;
                    writeln!(f, "    Vertical rate src : {}", self.vert_rate_source)?;
                    writeln!(f, "    Vertical rate sign: {}", self.vert_rate_sign)?;
                    writeln!(f, "    Vertical rate     : {}", self.vert_rate)?;
                    writeln!(f, "    Speed             : {} kt", self.ground_speed)?;
                    writeln!(f, "    Heading           : {:.1}", self.heading)?;
                } else if self.me_type == 19 && (self.me_sub == 3 || self.me_sub == 4) {
                    writeln!(f, "    Heading status: {}", self.heading_valid)?;
                    writeln!(f, "    Heading: {:.1}", self.heading)?;
                } else {
                    writeln!(
                        f,
                        "    Unrecognized ME type: {} subtype: {}",
                        self.me_type, self.me_sub
                    )?;
                }
            }
            _ => {
                writeln!(f, "DF {} (decoding not fully implemented)", self.df)?;
            }
        }

        Ok(())
    }
}
