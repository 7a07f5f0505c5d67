//! Inverter message identifiers.
//!
//! PM100 identifiers are offsets from a configurable base (`0xA0` by default);
//! the inverter broadcasts `0x00..=0x10` and answers parameter requests on `0x22`.

pub const DEFAULT_INVERTER_BASE: u32 = 0xA0;
pub const DEFAULT_DRS_ID: u32 = 0xFF;

pub const TEMP_1: u32 = 0x00;
pub const TEMP_2: u32 = 0x01;
pub const TEMP_3_TORQUE_SHUDDER: u32 = 0x02;
pub const ANALOG_INPUT_VOLTAGES: u32 = 0x03;
pub const DIGITAL_INPUT_STATUS: u32 = 0x04;
pub const MOTOR_POSITION_INFO: u32 = 0x05;
pub const CURRENT_INFO: u32 = 0x06;
pub const VOLTAGE_INFO: u32 = 0x07;
pub const FLUX_INFO: u32 = 0x08;
pub const INTERNAL_VOLTAGES: u32 = 0x09;
pub const INTERNAL_STATES: u32 = 0x0A;
pub const FAULT_CODES: u32 = 0x0B;
pub const TORQUE_TIMER_INFO: u32 = 0x0C;
pub const MODULATION_FLUX_WEAKENING: u32 = 0x0D;
pub const FIRMWARE_INFO: u32 = 0x0E;
pub const DIAGNOSTIC_DATA: u32 = 0x0F;
pub const HIGH_SPEED_MESSAGE: u32 = 0x10;

/// Outgoing command message.
pub const COMMAND: u32 = 0x20;
/// Outgoing parameter read/write request.
pub const PARAMETER_REQUEST: u32 = 0x21;
/// Inverter reply to a parameter request.
pub const PARAMETER_RESPONSE: u32 = 0x22;

/// Largest inverter offset in use.
pub const MAX_OFFSET: u32 = PARAMETER_RESPONSE;

/// Returns the message name for an inverter offset.
pub fn message_name(offset: u32) -> &'static str {
    match offset {
        TEMP_1 => "Temp_1",
        TEMP_2 => "Temp_2",
        TEMP_3_TORQUE_SHUDDER => "Temp_3_Torq_Shud",
        ANALOG_INPUT_VOLTAGES => "Analog_Input_Volt",
        DIGITAL_INPUT_STATUS => "Digital_Input_Status",
        MOTOR_POSITION_INFO => "Motor_Position_Info",
        CURRENT_INFO => "Current_Info",
        VOLTAGE_INFO => "Volt_Info",
        FLUX_INFO => "Flux_Info",
        INTERNAL_VOLTAGES => "Internal_Volt",
        INTERNAL_STATES => "Internal_States",
        FAULT_CODES => "Fault_Codes",
        TORQUE_TIMER_INFO => "Torque_Timer_Info",
        MODULATION_FLUX_WEAKENING => "Mod_Idx_FluxWeak",
        FIRMWARE_INFO => "Firm_Info",
        DIAGNOSTIC_DATA => "Diagnostic",
        HIGH_SPEED_MESSAGE => "High_Speed_Message",
        COMMAND => "Command",
        PARAMETER_REQUEST => "Parameter_Request",
        PARAMETER_RESPONSE => "Parameter_Response",
        _ => "UNKNOWN",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names() {
        assert_eq!(message_name(TEMP_1), "Temp_1");
        assert_eq!(message_name(INTERNAL_STATES), "Internal_States");
        assert_eq!(message_name(0x30), "UNKNOWN");
    }
}
