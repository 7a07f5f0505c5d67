use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use vcucan_broadcast::ComposerConfig;
use vcucan_frame::ids::{DEFAULT_DRS_ID, DEFAULT_INVERTER_BASE, MAX_OFFSET};
use vcucan_frame::{DictionaryConfig, FrameId, MAX_STANDARD_ID};
use vcucan_transport::{TransportConfig, DEFAULT_RX_POOL_CAPACITY};

use crate::error::{Result, VcuError};
use crate::vcu::TELEMETRY_POINTS;

/// Channels the [`crate::Vcu`] registers itself: counter and error mask in the
/// status segment, then one per telemetry point.
const BUILTIN_CHANNELS: usize = 2 + TELEMETRY_POINTS.len();

/// Everything the VCU stack needs, fixed at initialization.
///
/// Loaded from JSON. Missing fields take their defaults, unknown fields are
/// rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VcuConfig {
    /// Identifier of the first inverter broadcast message.
    pub inverter_base_id: u32,
    /// Identifier of the DRS position message.
    pub drs_id: u32,
    pub transport: TransportSection,
    pub broadcast: BroadcastSection,
    pub inverter: InverterSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransportSection {
    /// `None` uses every hardware mailbox.
    pub mailbox_count: Option<usize>,
    /// `None` blocks until a mailbox frees up.
    pub transmit_timeout_ms: Option<u64>,
    pub rx_pool_capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BroadcastSection {
    pub period_ms: u64,
    /// Identifier of the status segment (rolling counter and module errors).
    pub status_id: u32,
    /// Identifier of the inverter telemetry segment.
    pub telemetry_id: u32,
    pub segment_capacity: usize,
    pub channel_capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InverterSection {
    /// Longest gap between inverter broadcasts before `INVERTER_TIMEOUT` is raised.
    pub broadcast_timeout_ms: u64,
}

impl Default for VcuConfig {
    fn default() -> Self {
        Self {
            inverter_base_id: DEFAULT_INVERTER_BASE,
            drs_id: DEFAULT_DRS_ID,
            transport: TransportSection::default(),
            broadcast: BroadcastSection::default(),
            inverter: InverterSection::default(),
        }
    }
}

impl Default for TransportSection {
    fn default() -> Self {
        Self {
            mailbox_count: None,
            transmit_timeout_ms: Some(10),
            rx_pool_capacity: DEFAULT_RX_POOL_CAPACITY,
        }
    }
}

impl Default for BroadcastSection {
    fn default() -> Self {
        let composer = ComposerConfig::default();
        Self {
            period_ms: 100,
            status_id: 0x100,
            telemetry_id: 0x101,
            segment_capacity: composer.segment_capacity,
            channel_capacity: composer.channel_capacity,
        }
    }
}

impl Default for InverterSection {
    fn default() -> Self {
        Self {
            broadcast_timeout_ms: 500,
        }
    }
}

impl VcuConfig {
    /// Parse and validate a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse, and validate a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| VcuError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Reject configurations that cannot produce a working stack.
    ///
    /// Dictionary conflicts (a DRS id inside the inverter block, for example)
    /// are caught later when the dictionary is built.
    pub fn validate(&self) -> Result<()> {
        let last = self.inverter_base_id.checked_add(MAX_OFFSET);
        if last.is_none_or(|last| last > MAX_STANDARD_ID) {
            return Err(invalid(format!(
                "inverter_base_id 0x{:X} leaves no room for the inverter block (needs 0x{:X} more ids)",
                self.inverter_base_id, MAX_OFFSET
            )));
        }
        standard_id("drs_id", self.drs_id)?;
        standard_id("broadcast.status_id", self.broadcast.status_id)?;
        standard_id("broadcast.telemetry_id", self.broadcast.telemetry_id)?;
        if self.broadcast.status_id == self.broadcast.telemetry_id {
            return Err(invalid(
                "broadcast.status_id and broadcast.telemetry_id must differ",
            ));
        }

        if self.broadcast.period_ms == 0 {
            return Err(invalid("broadcast.period_ms must be at least 1"));
        }
        if self.broadcast.segment_capacity < 2 {
            return Err(invalid(format!(
                "broadcast.segment_capacity {} is below the 2 built-in segments",
                self.broadcast.segment_capacity
            )));
        }
        if self.broadcast.channel_capacity < BUILTIN_CHANNELS {
            return Err(invalid(format!(
                "broadcast.channel_capacity {} is below the {BUILTIN_CHANNELS} built-in channels",
                self.broadcast.channel_capacity
            )));
        }

        if self.transport.mailbox_count == Some(0) {
            return Err(invalid("transport.mailbox_count must be at least 1"));
        }
        if self.transport.rx_pool_capacity == 0 {
            return Err(invalid("transport.rx_pool_capacity must be at least 1"));
        }
        if self.inverter.broadcast_timeout_ms == 0 {
            return Err(invalid("inverter.broadcast_timeout_ms must be at least 1"));
        }
        Ok(())
    }

    pub fn dictionary_config(&self) -> DictionaryConfig {
        DictionaryConfig {
            inverter_base_id: self.inverter_base_id,
            drs_id: self.drs_id,
        }
    }

    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            mailbox_count: self.transport.mailbox_count,
            transmit_timeout: self.transport.transmit_timeout_ms.map(Duration::from_millis),
            rx_pool_capacity: self.transport.rx_pool_capacity,
        }
    }

    pub fn composer_config(&self) -> ComposerConfig {
        ComposerConfig {
            period: Duration::from_millis(self.broadcast.period_ms),
            segment_capacity: self.broadcast.segment_capacity,
            channel_capacity: self.broadcast.channel_capacity,
        }
    }

    /// Identifier of inverter message `offset` (see [`vcucan_frame::ids`]).
    pub fn inverter_id(&self, offset: u32) -> Result<FrameId> {
        let raw = self.inverter_base_id.checked_add(offset).ok_or_else(|| {
            invalid(format!(
                "inverter offset 0x{offset:X} overflows inverter_base_id 0x{:X}",
                self.inverter_base_id
            ))
        })?;
        Ok(FrameId::standard(raw)?)
    }

    pub fn status_id(&self) -> Result<FrameId> {
        Ok(FrameId::standard(self.broadcast.status_id)?)
    }

    pub fn telemetry_id(&self) -> Result<FrameId> {
        Ok(FrameId::standard(self.broadcast.telemetry_id)?)
    }

    pub fn inverter_timeout(&self) -> Duration {
        Duration::from_millis(self.inverter.broadcast_timeout_ms)
    }
}

fn invalid(message: impl Into<String>) -> VcuError {
    VcuError::Config(message.into())
}

fn standard_id(field: &str, id: u32) -> Result<()> {
    if id > MAX_STANDARD_ID {
        return Err(invalid(format!(
            "{field} 0x{id:X} is not a standard identifier"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = VcuConfig::default();
        config.validate().unwrap();
        assert_eq!(config.dictionary_config(), DictionaryConfig::default());
        assert_eq!(config.transport_config(), TransportConfig::default());
        assert_eq!(config.composer_config(), ComposerConfig::default());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = VcuConfig::from_json(
            r#"{
                "inverter_base_id": 160,
                "broadcast": { "period_ms": 50 },
                "transport": { "mailbox_count": 2, "transmit_timeout_ms": null }
            }"#,
        )
        .unwrap();

        assert_eq!(config.broadcast.period_ms, 50);
        assert_eq!(config.broadcast.status_id, 0x100);
        assert_eq!(config.transport.mailbox_count, Some(2));
        assert_eq!(config.transport_config().transmit_timeout, None);
        assert_eq!(config.inverter, InverterSection::default());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = VcuConfig::from_json(r#"{ "broadcast": { "perid_ms": 50 } }"#).unwrap_err();
        assert!(matches!(err, VcuError::Json(_)));
    }

    #[test]
    fn validation_failures() {
        let cases: [(&str, fn(&mut VcuConfig)); 10] = [
            ("inverter block", |c| c.inverter_base_id = 0x7F0),
            ("inverter base overflow", |c| c.inverter_base_id = u32::MAX),
            ("drs id", |c| c.drs_id = 0x800),
            ("same segment ids", |c| c.broadcast.telemetry_id = c.broadcast.status_id),
            ("zero period", |c| c.broadcast.period_ms = 0),
            ("segment capacity", |c| c.broadcast.segment_capacity = 1),
            ("channel capacity", |c| c.broadcast.channel_capacity = 5),
            ("zero mailboxes", |c| c.transport.mailbox_count = Some(0)),
            ("zero rx pool", |c| c.transport.rx_pool_capacity = 0),
            ("zero timeout", |c| c.inverter.broadcast_timeout_ms = 0),
        ];
        for (name, mutate) in cases {
            let mut config = VcuConfig::default();
            mutate(&mut config);
            assert!(
                matches!(config.validate(), Err(VcuError::Config(_))),
                "{name} should be rejected"
            );
        }
    }

    #[test]
    fn huge_inverter_base_is_a_config_error() {
        let err = VcuConfig::from_json(r#"{ "inverter_base_id": 4294967295 }"#).unwrap_err();
        assert!(matches!(err, VcuError::Config(_)), "{err}");

        let config = VcuConfig {
            inverter_base_id: u32::MAX,
            ..VcuConfig::default()
        };
        assert!(matches!(config.inverter_id(1), Err(VcuError::Config(_))));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = VcuConfig::from_file("/nonexistent/vcucan.json").unwrap_err();
        match err {
            VcuError::Io { path, .. } => assert!(path.ends_with("vcucan.json")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn serializes_every_field() {
        let json = serde_json::to_value(VcuConfig::default()).unwrap();
        assert_eq!(json["inverter_base_id"], 0xA0);
        assert_eq!(json["broadcast"]["telemetry_id"], 0x101);
        assert_eq!(json["inverter"]["broadcast_timeout_ms"], 500);
        assert!(json["transport"]["mailbox_count"].is_null());
    }
}
