//! MAC address handling.
//!
//! Wire format is 6 raw bytes in big-endian octet order; the textual form is
//! lowercase colon-separated hex (`aa:bb:cc:dd:ee:ff`) for logging and
//! configuration.

use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CoreError;

/// A 6-octet link-layer address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MacAddr([u8; 6]);

impl MacAddr {
    /// The all-ones broadcast address.
    pub const BROADCAST: MacAddr = MacAddr([0xff; 6]);

    pub const fn new(octets: [u8; 6]) -> Self {
        MacAddr(octets)
    }

    /// Parses the first 6 bytes of a raw frame as the destination address.
    pub fn from_frame(frame: &[u8]) -> Option<MacAddr> {
        let octets: [u8; 6] = frame.get(..6)?.try_into().ok()?;
        Some(MacAddr(octets))
    }

    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    /// Returns the address incremented by `step`, carrying into higher
    /// octets and wrapping at `ff:ff:ff:ff:ff:ff`.
    pub fn wrapping_add(&self, step: u64) -> MacAddr {
        let mut value: u64 = 0;
        for &octet in &self.0 {
            value = (value << 8) | u64::from(octet);
        }
        value = value.wrapping_add(step) & 0xffff_ffff_ffff;
        let bytes = value.to_be_bytes();
        MacAddr([bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7]])
    }

    /// The next address in allocation order.
    pub fn next(&self) -> MacAddr {
        self.wrapping_add(1)
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

impl fmt::Debug for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MacAddr({})", self)
    }
}

impl FromStr for MacAddr {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0u8; 6];
        let mut count = 0;
        for part in s.split(':') {
            if count == 6 {
                return Err(CoreError::invalid_argument(format!("bad MAC: {s}")));
            }
            // from_str_radix alone also accepts signs, so check digits first.
            if part.len() != 2 || !part.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(CoreError::invalid_argument(format!("bad MAC: {s}")));
            }
            let byte = u8::from_str_radix(part, 16)
                .map_err(|_| CoreError::invalid_argument(format!("bad MAC: {s}")))?;
            octets[count] = byte;
            count += 1;
        }
        if count != 6 {
            return Err(CoreError::invalid_argument(format!("bad MAC: {s}")));
        }
        Ok(MacAddr(octets))
    }
}

impl Serialize for MacAddr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MacAddr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parses_and_formats_roundtrip() {
        let mac: MacAddr = "aa:bb:cc:dd:ee:0f".parse().unwrap();
        assert_eq!(mac.octets(), [0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0x0f]);
        assert_eq!(mac.to_string(), "aa:bb:cc:dd:ee:0f");
    }

    #[test]
    fn rejects_malformed_strings() {
        for bad in [
            "",
            "aa:bb:cc",
            "aa:bb:cc:dd:ee:ff:00",
            "zz:bb:cc:dd:ee:ff",
            "aabbccddeeff",
            "aa:bb:cc:dd:ee:+f",
        ] {
            assert!(bad.parse::<MacAddr>().is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn increments_with_carry() {
        let mac: MacAddr = "aa:aa:aa:aa:aa:ff".parse().unwrap();
        assert_eq!(mac.next().to_string(), "aa:aa:aa:aa:ab:00");
        let top: MacAddr = "ff:ff:ff:ff:ff:ff".parse().unwrap();
        assert_eq!(top.next().to_string(), "00:00:00:00:00:00");
    }

    #[test]
    fn broadcast_detection() {
        assert!(MacAddr::BROADCAST.is_broadcast());
        assert!(!"aa:aa:aa:aa:aa:a1".parse::<MacAddr>().unwrap().is_broadcast());
    }

    #[test]
    fn frame_prefix_extraction() {
        let frame = [1u8, 2, 3, 4, 5, 6, 0xde, 0xad];
        assert_eq!(
            MacAddr::from_frame(&frame).unwrap().octets(),
            [1, 2, 3, 4, 5, 6]
        );
        assert!(MacAddr::from_frame(&[1, 2, 3]).is_none());
    }

    proptest! {
        #[test]
        fn display_parse_roundtrip(octets in proptest::array::uniform6(0u8..)) {
            let mac = MacAddr::new(octets);
            let parsed: MacAddr = mac.to_string().parse().unwrap();
            prop_assert_eq!(mac, parsed);
        }

        #[test]
        fn wrapping_add_is_additive(octets in proptest::array::uniform6(0u8..), a in 0u64..1000, b in 0u64..1000) {
            let mac = MacAddr::new(octets);
            prop_assert_eq!(mac.wrapping_add(a).wrapping_add(b), mac.wrapping_add(a + b));
        }
    }
}
