//! State point and subsystem identifiers.
//!
//! Point IDs are stable: the declaration order below is the storage index and
//! the order used by snapshots and CLI output.

use std::fmt;
use std::str::FromStr;

use crate::error::StateError;

/// A subsystem that owns (and alone may write) a group of state points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Subsystem {
    /// PM100 motor inverter broadcasts.
    Inverter,
    /// Drag reduction system (aero actuator) input from the dash.
    Drs,
}

impl Subsystem {
    pub const ALL: [Subsystem; 2] = [Subsystem::Inverter, Subsystem::Drs];
    pub const COUNT: usize = Self::ALL.len();

    /// Storage index of this subsystem.
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Lower-case name used in logs and CLI output.
    pub const fn name(self) -> &'static str {
        match self {
            Subsystem::Inverter => "inverter",
            Subsystem::Drs => "drs",
        }
    }

    /// Points owned by this subsystem, in storage order.
    pub fn points(self) -> impl Iterator<Item = PointId> {
        PointId::ALL
            .iter()
            .copied()
            .filter(move |point| point.owner() == self)
    }
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Subsystem {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Subsystem::ALL
            .iter()
            .copied()
            .find(|subsystem| subsystem.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| StateError::UnknownSubsystem(s.to_string()))
    }
}

macro_rules! define_points {
    ($( $(#[$doc:meta])* $variant:ident = $name:literal => $owner:ident, )*) => {
        /// Identifier of one cell in the device state table.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(u16)]
        pub enum PointId {
            $( $(#[$doc])* $variant, )*
        }

        impl PointId {
            /// Every point, in storage order.
            pub const ALL: &'static [PointId] = &[ $( PointId::$variant, )* ];

            /// Snake-case name used in logs and CLI output.
            pub const fn name(self) -> &'static str {
                match self {
                    $( PointId::$variant => $name, )*
                }
            }

            /// The only subsystem allowed to write this point.
            pub const fn owner(self) -> Subsystem {
                match self {
                    $( PointId::$variant => Subsystem::$owner, )*
                }
            }
        }
    };
}

define_points! {
    // Temperatures #1
    ModuleATemp = "module_a_temp" => Inverter,
    ModuleBTemp = "module_b_temp" => Inverter,
    ModuleCTemp = "module_c_temp" => Inverter,
    GateDriverTemp = "gate_driver_temp" => Inverter,
    // Temperatures #2
    ControlBoardTemp = "control_board_temp" => Inverter,
    Rtd1Temp = "rtd_1_temp" => Inverter,
    Rtd2Temp = "rtd_2_temp" => Inverter,
    Rtd3Temp = "rtd_3_temp" => Inverter,
    // Temperatures #3 and torque shudder
    CoolantTemp = "coolant_temp" => Inverter,
    HotSpotTemp = "hot_spot_temp" => Inverter,
    MotorTemp = "motor_temp" => Inverter,
    TorqueShudder = "torque_shudder" => Inverter,
    // Analog input voltages, 10 bits each
    AnalogInput1 = "analog_input_1" => Inverter,
    AnalogInput2 = "analog_input_2" => Inverter,
    AnalogInput3 = "analog_input_3" => Inverter,
    AnalogInput4 = "analog_input_4" => Inverter,
    AnalogInput5 = "analog_input_5" => Inverter,
    AnalogInput6 = "analog_input_6" => Inverter,
    // Digital input status
    DigitalInput1 = "digital_input_1" => Inverter,
    DigitalInput2 = "digital_input_2" => Inverter,
    DigitalInput3 = "digital_input_3" => Inverter,
    DigitalInput4 = "digital_input_4" => Inverter,
    DigitalInput5 = "digital_input_5" => Inverter,
    DigitalInput6 = "digital_input_6" => Inverter,
    DigitalInput7 = "digital_input_7" => Inverter,
    DigitalInput8 = "digital_input_8" => Inverter,
    // Motor position information
    MotorAngle = "motor_angle" => Inverter,
    MotorSpeed = "motor_speed" => Inverter,
    ElectricalOutputFrequency = "electrical_output_frequency" => Inverter,
    DeltaResolverFiltered = "delta_resolver_filtered" => Inverter,
    // Current information
    PhaseACurrent = "phase_a_current" => Inverter,
    PhaseBCurrent = "phase_b_current" => Inverter,
    PhaseCCurrent = "phase_c_current" => Inverter,
    DcBusCurrent = "dc_bus_current" => Inverter,
    // Voltage information
    DcBusVoltage = "dc_bus_voltage" => Inverter,
    OutputVoltage = "output_voltage" => Inverter,
    VabVdVoltage = "vab_vd_voltage" => Inverter,
    VbcVqVoltage = "vbc_vq_voltage" => Inverter,
    // Flux information
    FluxCommand = "flux_command" => Inverter,
    FluxFeedback = "flux_feedback" => Inverter,
    IdFeedback = "id_feedback" => Inverter,
    IqFeedback = "iq_feedback" => Inverter,
    // Internal voltages
    ReferenceVoltage1V5 = "reference_voltage_1v5" => Inverter,
    ReferenceVoltage2V5 = "reference_voltage_2v5" => Inverter,
    ReferenceVoltage5V = "reference_voltage_5v" => Inverter,
    ReferenceVoltage12V = "reference_voltage_12v" => Inverter,
    // Internal states (bit-field decoded)
    VsmState = "vsm_state" => Inverter,
    InverterState = "inverter_state" => Inverter,
    RelayState = "relay_state" => Inverter,
    InverterRunMode = "inverter_run_mode" => Inverter,
    ActiveDischargeState = "active_discharge_state" => Inverter,
    InverterCommandMode = "inverter_command_mode" => Inverter,
    InverterEnableState = "inverter_enable_state" => Inverter,
    /// Set while the inverter refuses enable commands until a disable is seen.
    InverterEnableLockout = "inverter_enable_lockout" => Inverter,
    DirectionCommand = "direction_command" => Inverter,
    BmsActive = "bms_active" => Inverter,
    BmsLimitingTorque = "bms_limiting_torque" => Inverter,
    // Fault codes
    PostFaultLo = "post_fault_lo" => Inverter,
    PostFaultHi = "post_fault_hi" => Inverter,
    RunFaultLo = "run_fault_lo" => Inverter,
    RunFaultHi = "run_fault_hi" => Inverter,
    // Torque and timer information
    CommandedTorque = "commanded_torque" => Inverter,
    TorqueFeedback = "torque_feedback" => Inverter,
    PowerOnTimer = "power_on_timer" => Inverter,
    // Modulation index and flux weakening output
    ModulationIndex = "modulation_index" => Inverter,
    FluxWeakeningOutput = "flux_weakening_output" => Inverter,
    IdCommand = "id_command" => Inverter,
    IqCommand = "iq_command" => Inverter,
    // Firmware information
    EepromVersion = "eeprom_version" => Inverter,
    SoftwareVersion = "software_version" => Inverter,
    DateCodeMd = "date_code_md" => Inverter,
    DateCodeYy = "date_code_yy" => Inverter,
    // Diagnostic data, big-endian words
    DiagnosticDataLo = "diagnostic_data_lo" => Inverter,
    DiagnosticDataHi = "diagnostic_data_hi" => Inverter,
    // High speed message
    FastCommandedTorque = "fast_commanded_torque" => Inverter,
    FastTorqueFeedback = "fast_torque_feedback" => Inverter,
    FastMotorSpeed = "fast_motor_speed" => Inverter,
    FastDcBusVoltage = "fast_dc_bus_voltage" => Inverter,
    // Parameter read/write response
    ParameterResponseAddress = "parameter_response_address" => Inverter,
    ParameterResponseWriteSuccess = "parameter_response_write_success" => Inverter,
    ParameterResponseData = "parameter_response_data" => Inverter,
    /// Raw DRS position word sent by the dash.
    DrsPosition = "drs_position" => Drs,
}

impl PointId {
    pub const COUNT: usize = Self::ALL.len();

    /// Storage index of this point.
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Look a point up by its storage index.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

impl fmt::Display for PointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PointId {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PointId::ALL
            .iter()
            .copied()
            .find(|point| point.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| StateError::UnknownPoint(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn storage_index_matches_declaration_order() {
        for (i, point) in PointId::ALL.iter().enumerate() {
            assert_eq!(point.index(), i);
            assert_eq!(PointId::from_index(i), Some(*point));
        }
        assert_eq!(PointId::from_index(PointId::COUNT), None);
    }

    #[test]
    fn names_are_unique() {
        let names: HashSet<_> = PointId::ALL.iter().map(|p| p.name()).collect();
        assert_eq!(names.len(), PointId::COUNT);
    }

    #[test]
    fn parses_point_names() {
        assert_eq!(
            "module_a_temp".parse::<PointId>().unwrap(),
            PointId::ModuleATemp
        );
        assert_eq!(
            "DRS_POSITION".parse::<PointId>().unwrap(),
            PointId::DrsPosition
        );
        assert!(matches!(
            "nope".parse::<PointId>(),
            Err(StateError::UnknownPoint(_))
        ));
    }

    #[test]
    fn every_point_has_an_owner() {
        let inverter = Subsystem::Inverter.points().count();
        let drs = Subsystem::Drs.points().count();
        assert_eq!(inverter + drs, PointId::COUNT);
        assert_eq!(drs, 1);
        assert_eq!(PointId::DrsPosition.owner(), Subsystem::Drs);
    }

    #[test]
    fn parses_subsystem_names() {
        assert_eq!("inverter".parse::<Subsystem>().unwrap(), Subsystem::Inverter);
        assert_eq!("DRS".parse::<Subsystem>().unwrap(), Subsystem::Drs);
        assert!("bms".parse::<Subsystem>().is_err());
    }
}
