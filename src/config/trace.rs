//! Recorded packet-in traces (trace.toml)
//!
//! A trace is a time-ordered list of events captured from switches:
//!
//! ```toml
//! [[events]]
//! kind = "packet_in"
//! at = 0.5
//! switch = 1
//! port = 1
//! frame = "ffffffffffff00000000000a0800..."
//!
//! [[events]]
//! kind = "packet_in"
//! at = 1.0
//! switch = 1
//! port = 2
//! src = "00:00:00:00:00:0b"
//! dst = "00:00:00:00:00:0a"
//! vlan = 10
//! ```
//!
//! `at` is seconds from the start of the trace. A packet-in either carries the
//! raw frame as hex or the addresses to synthesize one from.

use crate::controller::{PortId, SwitchId};
use crate::protocol::ethernet::FrameBuilder;
use crate::protocol::{EtherType, MacAddr, VlanTag};
use crate::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Trace {
    #[serde(default)]
    pub events: Vec<TraceEvent>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TraceEvent {
    PacketIn {
        at: f64,
        switch: u64,
        port: PortId,
        frame: Option<String>,
        src: Option<String>,
        dst: Option<String>,
        vlan: Option<u16>,
    },
    SetVlan {
        at: f64,
        switch: u64,
        port: PortId,
        vlan: u16,
    },
    Sweep {
        at: f64,
    },
}

/// Load a trace from a TOML file
pub fn load_trace<P: AsRef<Path>>(path: P) -> Result<Trace> {
    let content = std::fs::read_to_string(path)?;
    parse_trace(&content)
}

pub fn parse_trace(content: &str) -> Result<Trace> {
    let trace: Trace = toml::from_str(content).map_err(|e| Error::Parse(e.to_string()))?;
    for event in &trace.events {
        let at = event.at();
        if !at.is_finite() || at < 0.0 {
            return Err(Error::Parse(format!("event time {} is not a valid offset", at)));
        }
    }
    Ok(trace)
}

impl TraceEvent {
    /// Seconds from trace start
    pub fn at(&self) -> f64 {
        match self {
            TraceEvent::PacketIn { at, .. }
            | TraceEvent::SetVlan { at, .. }
            | TraceEvent::Sweep { at } => *at,
        }
    }

    pub fn offset(&self) -> Duration {
        Duration::try_from_secs_f64(self.at()).unwrap_or(Duration::ZERO)
    }

    pub fn switch(&self) -> Option<SwitchId> {
        match self {
            TraceEvent::PacketIn { switch, .. } | TraceEvent::SetVlan { switch, .. } => {
                Some(SwitchId(*switch))
            }
            TraceEvent::Sweep { .. } => None,
        }
    }

    /// Frame bytes of a packet-in event
    pub fn frame(&self) -> Result<Vec<u8>> {
        let TraceEvent::PacketIn {
            frame,
            src,
            dst,
            vlan,
            ..
        } = self
        else {
            return Err(Error::Parse("not a packet-in event".into()));
        };

        if let Some(hex) = frame {
            return decode_hex(hex);
        }

        let (Some(src), Some(dst)) = (src, dst) else {
            return Err(Error::Parse(
                "packet_in needs either frame or both src and dst".into(),
            ));
        };
        let src: MacAddr = src.parse().map_err(|e| Error::Parse(format!("{}", e)))?;
        let dst: MacAddr = dst.parse().map_err(|e| Error::Parse(format!("{}", e)))?;

        let mut builder = FrameBuilder::new().dst_mac(dst).src_mac(src);
        if let Some(vid) = vlan {
            builder = builder.vlan_tag(VlanTag::new(*vid));
        }
        Ok(builder
            .ethertype(EtherType::Ipv4 as u16)
            .payload(&[0u8; 46])
            .build())
    }
}

fn decode_hex(s: &str) -> Result<Vec<u8>> {
    let digits: Vec<u8> = s
        .bytes()
        .filter(|b| !b.is_ascii_whitespace() && *b != b':')
        .collect();
    if digits.len() % 2 != 0 {
        return Err(Error::Parse("odd number of hex digits in frame".into()));
    }

    digits
        .chunks(2)
        .map(|pair| {
            let text = std::str::from_utf8(pair)
                .map_err(|_| Error::Parse("non-ASCII frame data".into()))?;
            u8::from_str_radix(text, 16)
                .map_err(|_| Error::Parse(format!("invalid hex byte '{}'", text)))
        })
        .collect()
}
