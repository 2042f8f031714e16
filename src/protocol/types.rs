//! Link-layer types shared by the controller

use std::fmt;
use std::str::FromStr;

/// MAC address (6 bytes)
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    pub const BROADCAST: MacAddr = MacAddr([0xff; 6]);
    pub const ZERO: MacAddr = MacAddr([0; 6]);

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    /// Group bit set (includes broadcast)
    pub fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }

    pub fn is_unicast(&self) -> bool {
        !self.is_multicast()
    }

    /// Whether frames from this address may populate a learning table.
    pub fn is_learnable(&self) -> bool {
        self.is_unicast() && *self != Self::ZERO
    }
}

impl fmt::Debug for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            a, b, c, d, e, g
        )
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Error returned when a MAC address string cannot be parsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseMacAddrError(String);

impl fmt::Display for ParseMacAddrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid MAC address '{}'", self.0)
    }
}

impl std::error::Error for ParseMacAddrError {}

impl FromStr for MacAddr {
    type Err = ParseMacAddrError;

    /// Accepts "00:11:22:33:44:55", "00-11-22-33-44-55" or "001122334455".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseMacAddrError(s.to_string());

        let digits: String = if s.contains(':') || s.contains('-') {
            let groups: Vec<&str> = s.split([':', '-']).collect();
            if groups.len() != 6 || groups.iter().any(|g| g.len() != 2) {
                return Err(err());
            }
            groups.concat()
        } else {
            s.to_string()
        };

        if digits.len() != 12 || !digits.is_ascii() {
            return Err(err());
        }

        let mut bytes = [0u8; 6];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&digits[i * 2..i * 2 + 2], 16).map_err(|_| err())?;
        }
        Ok(MacAddr(bytes))
    }
}

/// EtherType values the controller needs to recognise
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum EtherType {
    Ipv4 = 0x0800,
    Arp = 0x0806,
    Vlan = 0x8100,
    Ipv6 = 0x86DD,
}

/// Ordinary VLAN identifier in the range 1-4094
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VlanId(u16);

impl VlanId {
    pub const MIN: u16 = 1;
    pub const MAX: u16 = 4094;
    /// Wire/config value reserved for trunk ports.
    pub const TRUNK_SENTINEL: u16 = 4095;

    /// VLAN used for every frame when VLAN enforcement is off
    pub const DEFAULT: VlanId = VlanId(1);

    pub fn new(id: u16) -> Option<Self> {
        (Self::MIN..=Self::MAX).contains(&id).then_some(VlanId(id))
    }

    pub fn get(self) -> u16 {
        self.0
    }
}

impl fmt::Display for VlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// VLAN tag (802.1Q)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VlanTag {
    /// Priority Code Point (3 bits)
    pub pcp: u8,
    /// Drop Eligible Indicator (1 bit)
    pub dei: bool,
    /// VLAN ID (12 bits, 0-4095)
    pub vid: u16,
}

impl VlanTag {
    pub fn new(vid: u16) -> Self {
        Self {
            pcp: 0,
            dei: false,
            vid: vid & 0x0FFF,
        }
    }

    /// Priority-tagged frames (VID 0) carry no VLAN membership.
    pub fn is_priority_only(&self) -> bool {
        self.vid == 0
    }

    /// The tagged VLAN, if the VID names an ordinary VLAN
    pub fn vlan_id(&self) -> Option<VlanId> {
        VlanId::new(self.vid)
    }

    pub fn to_bytes(&self) -> [u8; 2] {
        let tci =
            ((self.pcp as u16 & 0x07) << 13) | ((self.dei as u16) << 12) | (self.vid & 0x0FFF);
        tci.to_be_bytes()
    }

    pub fn from_bytes(bytes: [u8; 2]) -> Self {
        let tci = u16::from_be_bytes(bytes);
        Self {
            pcp: ((tci >> 13) & 0x07) as u8,
            dei: (tci >> 12) & 0x01 != 0,
            vid: tci & 0x0FFF,
        }
    }
}
