use std::collections::HashMap;

use vcucan_state::{PointId, Subsystem};

use crate::error::{DictionaryError, FrameError, Result};
use crate::frame::{FrameId, MAX_DATA_LEN};
use crate::ids::{self, DEFAULT_DRS_ID, DEFAULT_INVERTER_BASE};

/// A byte range of a frame decoded into one state point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentDescriptor {
    pub point: PointId,
    pub start: u8,
    pub size: u8,
}

impl SegmentDescriptor {
    pub const fn new(point: PointId, start: u8, size: u8) -> Self {
        Self { point, start, size }
    }

    /// One past the last byte this segment covers.
    pub fn end(&self) -> usize {
        self.start as usize + self.size as usize
    }

    fn overlaps(&self, other: &SegmentDescriptor) -> bool {
        (self.start as usize) < other.end() && (other.start as usize) < self.end()
    }
}

/// How an entry's bytes are turned into point values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecodeStrategy {
    /// Each segment is a little-endian unsigned word.
    LittleEndianSegments,
    /// Two little-endian 32-bit halves, three 10-bit fields each.
    AnalogInputs,
    /// Bit-field layout of the inverter's Internal_States message.
    InternalStates,
    /// Two big-endian 32-bit words.
    Diagnostic,
}

const ANALOG_POINTS: &[PointId] = &[
    PointId::AnalogInput1,
    PointId::AnalogInput2,
    PointId::AnalogInput3,
    PointId::AnalogInput4,
    PointId::AnalogInput5,
    PointId::AnalogInput6,
];

const INTERNAL_STATE_POINTS: &[PointId] = &[
    PointId::VsmState,
    PointId::InverterState,
    PointId::RelayState,
    PointId::InverterRunMode,
    PointId::ActiveDischargeState,
    PointId::InverterCommandMode,
    PointId::InverterEnableState,
    PointId::InverterEnableLockout,
    PointId::DirectionCommand,
    PointId::BmsActive,
    PointId::BmsLimitingTorque,
];

const DIAGNOSTIC_POINTS: &[PointId] = &[PointId::DiagnosticDataLo, PointId::DiagnosticDataHi];

impl DecodeStrategy {
    pub fn name(self) -> &'static str {
        match self {
            DecodeStrategy::LittleEndianSegments => "le-segments",
            DecodeStrategy::AnalogInputs => "analog-inputs",
            DecodeStrategy::InternalStates => "internal-states",
            DecodeStrategy::Diagnostic => "diagnostic",
        }
    }

    /// Points written by a fixed-layout strategy. Empty for segment-driven decoding.
    pub fn fixed_points(self) -> &'static [PointId] {
        match self {
            DecodeStrategy::LittleEndianSegments => &[],
            DecodeStrategy::AnalogInputs => ANALOG_POINTS,
            DecodeStrategy::InternalStates => INTERNAL_STATE_POINTS,
            DecodeStrategy::Diagnostic => DIAGNOSTIC_POINTS,
        }
    }

    fn is_fixed_layout(self) -> bool {
        self != DecodeStrategy::LittleEndianSegments
    }
}

/// One incoming message the codec knows how to decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DictionaryEntry {
    pub id: FrameId,
    pub name: &'static str,
    pub owner: Subsystem,
    pub segments: Vec<SegmentDescriptor>,
    pub strategy: DecodeStrategy,
}

impl DictionaryEntry {
    /// An entry decoded segment by segment as little-endian words.
    pub fn segments(
        id: FrameId,
        name: &'static str,
        owner: Subsystem,
        segments: impl Into<Vec<SegmentDescriptor>>,
    ) -> Self {
        Self {
            id,
            name,
            owner,
            segments: segments.into(),
            strategy: DecodeStrategy::LittleEndianSegments,
        }
    }

    /// An entry with a fixed bit layout.
    pub fn fixed(id: FrameId, name: &'static str, owner: Subsystem, strategy: DecodeStrategy) -> Self {
        Self {
            id,
            name,
            owner,
            segments: Vec::new(),
            strategy,
        }
    }

    /// Minimum frame length needed to decode this entry.
    pub fn required_len(&self) -> usize {
        if self.strategy.is_fixed_layout() {
            MAX_DATA_LEN
        } else {
            self.segments.iter().map(SegmentDescriptor::end).max().unwrap_or(0)
        }
    }

    /// Every point a successful decode writes, in write order.
    pub fn points(&self) -> Vec<PointId> {
        if self.strategy.is_fixed_layout() {
            self.strategy.fixed_points().to_vec()
        } else {
            self.segments.iter().map(|segment| segment.point).collect()
        }
    }

    fn validate(&self) -> std::result::Result<(), DictionaryError> {
        if self.strategy.is_fixed_layout() && !self.segments.is_empty() {
            return Err(DictionaryError::InvalidLayout {
                entry: self.name,
                reason: "fixed-layout strategy cannot carry segments",
            });
        }
        if !self.strategy.is_fixed_layout() && self.segments.is_empty() {
            return Err(DictionaryError::InvalidLayout {
                entry: self.name,
                reason: "segment strategy needs at least one segment",
            });
        }

        for (i, segment) in self.segments.iter().enumerate() {
            if !(1..=4).contains(&segment.size) || segment.end() > MAX_DATA_LEN {
                return Err(DictionaryError::SegmentOutOfBounds {
                    entry: self.name,
                    point: segment.point,
                    start: segment.start,
                    size: segment.size,
                });
            }
            if let Some(other) = self.segments[..i].iter().find(|s| s.overlaps(segment)) {
                return Err(DictionaryError::OverlappingSegments {
                    entry: self.name,
                    first: other.point,
                    second: segment.point,
                });
            }
        }

        for point in self.points() {
            if point.owner() != self.owner {
                return Err(DictionaryError::ForeignPoint {
                    entry: self.name,
                    entry_owner: self.owner,
                    point,
                    owner: point.owner(),
                });
            }
        }
        Ok(())
    }
}

/// Identifier layout of the standard dictionary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DictionaryConfig {
    /// Base identifier of the inverter message block. Default: `0xA0`.
    pub inverter_base_id: u32,
    /// Identifier of the DRS position message. Default: `0xFF`.
    pub drs_id: u32,
}

impl Default for DictionaryConfig {
    fn default() -> Self {
        Self {
            inverter_base_id: DEFAULT_INVERTER_BASE,
            drs_id: DEFAULT_DRS_ID,
        }
    }
}

/// Collects entries and validates them into a [`Dictionary`].
#[derive(Debug, Default)]
pub struct DictionaryBuilder {
    entries: Vec<DictionaryEntry>,
}

impl DictionaryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry. Entries keep their insertion order.
    pub fn entry(mut self, entry: DictionaryEntry) -> Self {
        self.entries.push(entry);
        self
    }

    /// Validate every entry and build the lookup index.
    pub fn build(self) -> std::result::Result<Dictionary, DictionaryError> {
        let mut index = HashMap::with_capacity(self.entries.len());
        for (position, entry) in self.entries.iter().enumerate() {
            entry.validate()?;
            if let Some(&existing) = index.get(&entry.id) {
                let existing: &DictionaryEntry = &self.entries[existing];
                return Err(DictionaryError::DuplicateId {
                    id: entry.id,
                    first: existing.name,
                    second: entry.name,
                });
            }
            index.insert(entry.id, position);
        }
        Ok(Dictionary {
            entries: self.entries,
            index,
        })
    }
}

/// Ordered, validated set of incoming messages.
///
/// Immutable once built; lookups go through a hash index so an unknown
/// identifier simply misses.
#[derive(Debug, Clone)]
pub struct Dictionary {
    entries: Vec<DictionaryEntry>,
    index: HashMap<FrameId, usize>,
}

impl Dictionary {
    pub fn builder() -> DictionaryBuilder {
        DictionaryBuilder::new()
    }

    /// The vehicle dictionary: PM100 broadcasts plus the DRS input.
    pub fn standard(config: &DictionaryConfig) -> Result<Self> {
        let base = config.inverter_base_id;
        let inverter = |offset: u32| {
            base.checked_add(offset)
                .ok_or(FrameError::InvalidId {
                    id: base,
                    extended: false,
                })
                .and_then(FrameId::standard)
        };
        let quad = |points: [PointId; 4]| -> Vec<SegmentDescriptor> {
            points
                .iter()
                .enumerate()
                .map(|(i, &point)| SegmentDescriptor::new(point, (i * 2) as u8, 2))
                .collect()
        };
        let owner = Subsystem::Inverter;

        let mut builder = Dictionary::builder();
        for (offset, points) in [
            (
                ids::TEMP_1,
                [
                    PointId::ModuleATemp,
                    PointId::ModuleBTemp,
                    PointId::ModuleCTemp,
                    PointId::GateDriverTemp,
                ],
            ),
            (
                ids::TEMP_2,
                [
                    PointId::ControlBoardTemp,
                    PointId::Rtd1Temp,
                    PointId::Rtd2Temp,
                    PointId::Rtd3Temp,
                ],
            ),
            (
                ids::TEMP_3_TORQUE_SHUDDER,
                [
                    PointId::CoolantTemp,
                    PointId::HotSpotTemp,
                    PointId::MotorTemp,
                    PointId::TorqueShudder,
                ],
            ),
        ] {
            builder = builder.entry(DictionaryEntry::segments(
                inverter(offset)?,
                ids::message_name(offset),
                owner,
                quad(points),
            ));
        }

        builder = builder
            .entry(DictionaryEntry::fixed(
                inverter(ids::ANALOG_INPUT_VOLTAGES)?,
                ids::message_name(ids::ANALOG_INPUT_VOLTAGES),
                owner,
                DecodeStrategy::AnalogInputs,
            ))
            .entry(DictionaryEntry::segments(
                inverter(ids::DIGITAL_INPUT_STATUS)?,
                ids::message_name(ids::DIGITAL_INPUT_STATUS),
                owner,
                [
                    PointId::DigitalInput1,
                    PointId::DigitalInput2,
                    PointId::DigitalInput3,
                    PointId::DigitalInput4,
                    PointId::DigitalInput5,
                    PointId::DigitalInput6,
                    PointId::DigitalInput7,
                    PointId::DigitalInput8,
                ]
                .iter()
                .enumerate()
                .map(|(i, &point)| SegmentDescriptor::new(point, i as u8, 1))
                .collect::<Vec<_>>(),
            ));

        for (offset, points) in [
            (
                ids::MOTOR_POSITION_INFO,
                [
                    PointId::MotorAngle,
                    PointId::MotorSpeed,
                    PointId::ElectricalOutputFrequency,
                    PointId::DeltaResolverFiltered,
                ],
            ),
            (
                ids::CURRENT_INFO,
                [
                    PointId::PhaseACurrent,
                    PointId::PhaseBCurrent,
                    PointId::PhaseCCurrent,
                    PointId::DcBusCurrent,
                ],
            ),
            (
                ids::VOLTAGE_INFO,
                [
                    PointId::DcBusVoltage,
                    PointId::OutputVoltage,
                    PointId::VabVdVoltage,
                    PointId::VbcVqVoltage,
                ],
            ),
            (
                ids::FLUX_INFO,
                [
                    PointId::FluxCommand,
                    PointId::FluxFeedback,
                    PointId::IdFeedback,
                    PointId::IqFeedback,
                ],
            ),
            (
                ids::INTERNAL_VOLTAGES,
                [
                    PointId::ReferenceVoltage1V5,
                    PointId::ReferenceVoltage2V5,
                    PointId::ReferenceVoltage5V,
                    PointId::ReferenceVoltage12V,
                ],
            ),
        ] {
            builder = builder.entry(DictionaryEntry::segments(
                inverter(offset)?,
                ids::message_name(offset),
                owner,
                quad(points),
            ));
        }

        builder = builder
            .entry(DictionaryEntry::fixed(
                inverter(ids::INTERNAL_STATES)?,
                ids::message_name(ids::INTERNAL_STATES),
                owner,
                DecodeStrategy::InternalStates,
            ))
            .entry(DictionaryEntry::segments(
                inverter(ids::FAULT_CODES)?,
                ids::message_name(ids::FAULT_CODES),
                owner,
                quad([
                    PointId::PostFaultLo,
                    PointId::PostFaultHi,
                    PointId::RunFaultLo,
                    PointId::RunFaultHi,
                ]),
            ))
            .entry(DictionaryEntry::segments(
                inverter(ids::TORQUE_TIMER_INFO)?,
                ids::message_name(ids::TORQUE_TIMER_INFO),
                owner,
                [
                    SegmentDescriptor::new(PointId::CommandedTorque, 0, 2),
                    SegmentDescriptor::new(PointId::TorqueFeedback, 2, 2),
                    SegmentDescriptor::new(PointId::PowerOnTimer, 4, 4),
                ],
            ))
            .entry(DictionaryEntry::segments(
                inverter(ids::MODULATION_FLUX_WEAKENING)?,
                ids::message_name(ids::MODULATION_FLUX_WEAKENING),
                owner,
                quad([
                    PointId::ModulationIndex,
                    PointId::FluxWeakeningOutput,
                    PointId::IdCommand,
                    PointId::IqCommand,
                ]),
            ))
            .entry(DictionaryEntry::segments(
                inverter(ids::FIRMWARE_INFO)?,
                ids::message_name(ids::FIRMWARE_INFO),
                owner,
                quad([
                    PointId::EepromVersion,
                    PointId::SoftwareVersion,
                    PointId::DateCodeMd,
                    PointId::DateCodeYy,
                ]),
            ))
            .entry(DictionaryEntry::fixed(
                inverter(ids::DIAGNOSTIC_DATA)?,
                ids::message_name(ids::DIAGNOSTIC_DATA),
                owner,
                DecodeStrategy::Diagnostic,
            ))
            .entry(DictionaryEntry::segments(
                inverter(ids::HIGH_SPEED_MESSAGE)?,
                ids::message_name(ids::HIGH_SPEED_MESSAGE),
                owner,
                quad([
                    PointId::FastCommandedTorque,
                    PointId::FastTorqueFeedback,
                    PointId::FastMotorSpeed,
                    PointId::FastDcBusVoltage,
                ]),
            ))
            .entry(DictionaryEntry::segments(
                inverter(ids::PARAMETER_RESPONSE)?,
                ids::message_name(ids::PARAMETER_RESPONSE),
                owner,
                [
                    SegmentDescriptor::new(PointId::ParameterResponseAddress, 0, 2),
                    SegmentDescriptor::new(PointId::ParameterResponseWriteSuccess, 2, 1),
                    SegmentDescriptor::new(PointId::ParameterResponseData, 4, 2),
                ],
            ))
            .entry(DictionaryEntry::segments(
                FrameId::standard(config.drs_id)?,
                "DRS_Input",
                Subsystem::Drs,
                [SegmentDescriptor::new(PointId::DrsPosition, 0, 4)],
            ));

        Ok(builder.build()?)
    }

    /// Entry registered for `id`, if any.
    pub fn lookup(&self, id: FrameId) -> Option<&DictionaryEntry> {
        self.index.get(&id).map(|&position| &self.entries[position])
    }

    /// Entries in registration order.
    pub fn entries(&self) -> &[DictionaryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn std_id(raw: u32) -> FrameId {
        FrameId::standard(raw).unwrap()
    }

    #[test]
    fn standard_dictionary_is_valid() {
        let dictionary = Dictionary::standard(&DictionaryConfig::default()).unwrap();
        assert_eq!(dictionary.len(), 19);

        let temp1 = dictionary.lookup(std_id(0xA0)).unwrap();
        assert_eq!(temp1.name, "Temp_1");
        assert_eq!(temp1.required_len(), 8);

        let drs = dictionary.lookup(std_id(0xFF)).unwrap();
        assert_eq!(drs.owner, Subsystem::Drs);
        assert_eq!(drs.points(), vec![PointId::DrsPosition]);

        let response = dictionary.lookup(std_id(0xC2)).unwrap();
        assert_eq!(response.name, "Parameter_Response");
        assert_eq!(response.required_len(), 6);
    }

    #[test]
    fn standard_dictionary_follows_configured_base() {
        let config = DictionaryConfig {
            inverter_base_id: 0x200,
            drs_id: 0x300,
        };
        let dictionary = Dictionary::standard(&config).unwrap();
        assert!(dictionary.lookup(std_id(0xA0)).is_none());
        assert_eq!(dictionary.lookup(std_id(0x20A)).unwrap().name, "Internal_States");
        assert_eq!(dictionary.lookup(std_id(0x300)).unwrap().name, "DRS_Input");
    }

    #[test]
    fn drs_id_colliding_with_inverter_block_is_rejected() {
        let config = DictionaryConfig {
            inverter_base_id: 0xA0,
            drs_id: 0xA5,
        };
        let err = Dictionary::standard(&config).unwrap_err();
        assert!(matches!(
            err,
            crate::FrameError::Dictionary(DictionaryError::DuplicateId { .. })
        ));
    }

    #[test]
    fn base_past_standard_range_is_rejected() {
        let config = DictionaryConfig {
            inverter_base_id: 0x7F0,
            drs_id: 0x100,
        };
        assert!(matches!(
            Dictionary::standard(&config),
            Err(crate::FrameError::InvalidId { .. })
        ));
    }

    #[test]
    fn base_at_u32_max_is_rejected_without_overflow() {
        let config = DictionaryConfig {
            inverter_base_id: u32::MAX,
            drs_id: 0x100,
        };
        assert!(matches!(
            Dictionary::standard(&config),
            Err(crate::FrameError::InvalidId { id: u32::MAX, .. })
        ));
    }

    #[test]
    fn segments_within_every_entry_are_disjoint() {
        let dictionary = Dictionary::standard(&DictionaryConfig::default()).unwrap();
        for entry in dictionary.entries() {
            let mut covered = [false; MAX_DATA_LEN];
            for segment in &entry.segments {
                for byte in &mut covered[segment.start as usize..segment.end()] {
                    assert!(!*byte, "{} has overlapping segments", entry.name);
                    *byte = true;
                }
            }
        }
    }

    #[test]
    fn overlapping_segments_are_rejected() {
        let err = Dictionary::builder()
            .entry(DictionaryEntry::segments(
                std_id(0x100),
                "Bad",
                Subsystem::Inverter,
                [
                    SegmentDescriptor::new(PointId::MotorAngle, 0, 2),
                    SegmentDescriptor::new(PointId::MotorSpeed, 1, 2),
                ],
            ))
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            DictionaryError::OverlappingSegments {
                entry: "Bad",
                first: PointId::MotorAngle,
                second: PointId::MotorSpeed,
            }
        );
    }

    #[test]
    fn out_of_bounds_segments_are_rejected() {
        for (start, size) in [(7, 2), (0, 0), (0, 5)] {
            let result = Dictionary::builder()
                .entry(DictionaryEntry::segments(
                    std_id(0x100),
                    "Bad",
                    Subsystem::Inverter,
                    [SegmentDescriptor::new(PointId::MotorAngle, start, size)],
                ))
                .build();
            assert!(
                matches!(result, Err(DictionaryError::SegmentOutOfBounds { .. })),
                "start {start} size {size}"
            );
        }
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let entry = |name| {
            DictionaryEntry::segments(
                std_id(0x100),
                name,
                Subsystem::Inverter,
                [SegmentDescriptor::new(PointId::MotorAngle, 0, 2)],
            )
        };
        let err = Dictionary::builder()
            .entry(entry("First"))
            .entry(entry("Second"))
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            DictionaryError::DuplicateId {
                first: "First",
                second: "Second",
                ..
            }
        ));
    }

    #[test]
    fn same_raw_id_of_both_kinds_is_allowed() {
        let dictionary = Dictionary::builder()
            .entry(DictionaryEntry::segments(
                std_id(0x100),
                "Std",
                Subsystem::Drs,
                [SegmentDescriptor::new(PointId::DrsPosition, 0, 4)],
            ))
            .entry(DictionaryEntry::segments(
                FrameId::extended(0x100).unwrap(),
                "Ext",
                Subsystem::Drs,
                [SegmentDescriptor::new(PointId::DrsPosition, 0, 4)],
            ))
            .build()
            .unwrap();
        assert_eq!(dictionary.len(), 2);
    }

    #[test]
    fn foreign_points_are_rejected() {
        let err = Dictionary::builder()
            .entry(DictionaryEntry::segments(
                std_id(0x100),
                "Mixed",
                Subsystem::Drs,
                [SegmentDescriptor::new(PointId::MotorSpeed, 0, 2)],
            ))
            .build()
            .unwrap_err();
        assert!(matches!(err, DictionaryError::ForeignPoint { .. }));

        let err = Dictionary::builder()
            .entry(DictionaryEntry::fixed(
                std_id(0x100),
                "Analog",
                Subsystem::Drs,
                DecodeStrategy::AnalogInputs,
            ))
            .build()
            .unwrap_err();
        assert!(matches!(err, DictionaryError::ForeignPoint { .. }));
    }

    #[test]
    fn layout_mismatch_is_rejected() {
        let err = Dictionary::builder()
            .entry(DictionaryEntry::segments(
                std_id(0x100),
                "Empty",
                Subsystem::Inverter,
                Vec::new(),
            ))
            .build()
            .unwrap_err();
        assert!(matches!(err, DictionaryError::InvalidLayout { .. }));
    }
}
