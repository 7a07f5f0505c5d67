//! Outgoing inverter command frames.
//!
//! Both commands are fixed 8-byte templates with fields overwritten at fixed
//! offsets. Multi-byte fields are little-endian.

use bytes::{Buf, BufMut};

use crate::error::{FrameError, Result};
use crate::frame::{Frame, FrameId, MAX_DATA_LEN};

const ENABLE: u8 = 1 << 0;
const DISCHARGE: u8 = 1 << 1;
const SPEED_MODE: u8 = 1 << 2;

/// Commanded rotation direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Direction {
    #[default]
    Reverse = 0,
    Forward = 1,
}

impl TryFrom<u8> for Direction {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Direction::Reverse),
            1 => Ok(Direction::Forward),
            other => Err(FrameError::InvalidField {
                field: "direction",
                value: u32::from(other),
            }),
        }
    }
}

/// The inverter command message (`base + 0x20`).
///
/// ```text
/// [0..2] torque command, Nm x 10   [4] direction
/// [2..4] speed command, rpm        [5] bit0 enable, bit1 discharge, bit2 speed mode
///                                  [6..8] torque limit, Nm x 10 (0 = EEPROM default)
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InverterCommand {
    pub torque: i16,
    pub speed: i16,
    pub direction: Direction,
    pub enable: bool,
    pub discharge: bool,
    pub speed_mode: bool,
    pub torque_limit: i16,
}

impl InverterCommand {
    /// Torque-mode request, driving forward with the inverter enabled.
    pub fn torque_request(torque: i16) -> Self {
        Self {
            torque,
            direction: Direction::Forward,
            enable: true,
            ..Self::default()
        }
    }

    /// Speed-mode request, driving forward with the inverter enabled.
    pub fn speed_request(speed: i16) -> Self {
        Self {
            speed,
            direction: Direction::Forward,
            enable: true,
            speed_mode: true,
            ..Self::default()
        }
    }

    /// All-zero command. Also clears the inverter's enable lockout.
    pub fn disable() -> Self {
        Self::default()
    }

    /// Write the 8-byte payload.
    pub fn encode(&self) -> [u8; MAX_DATA_LEN] {
        let mut data = [0u8; MAX_DATA_LEN];
        let mut buf = &mut data[..];
        buf.put_i16_le(self.torque);
        buf.put_i16_le(self.speed);
        buf.put_u8(self.direction as u8);
        let mut flags = 0;
        if self.enable {
            flags |= ENABLE;
        }
        if self.discharge {
            flags |= DISCHARGE;
        }
        if self.speed_mode {
            flags |= SPEED_MODE;
        }
        buf.put_u8(flags);
        buf.put_i16_le(self.torque_limit);
        data
    }

    /// Build the command frame for identifier `id`.
    pub fn to_frame(&self, id: FrameId) -> Result<Frame> {
        Frame::new(id, &self.encode())
    }

    /// Re-slice a command frame at the encoder's offsets.
    pub fn from_frame(frame: &Frame) -> Result<Self> {
        let mut buf = full_payload(frame)?;
        let torque = buf.get_i16_le();
        let speed = buf.get_i16_le();
        let direction = Direction::try_from(buf.get_u8())?;
        let flags = buf.get_u8();
        let torque_limit = buf.get_i16_le();
        Ok(Self {
            torque,
            speed,
            direction,
            enable: flags & ENABLE != 0,
            discharge: flags & DISCHARGE != 0,
            speed_mode: flags & SPEED_MODE != 0,
            torque_limit,
        })
    }
}

/// A parameter read or write request (`base + 0x21`).
///
/// ```text
/// [0..2] parameter address   [2] 1 = write, 0 = read
/// [4..6] data (writes only)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParameterRequest {
    pub address: u16,
    pub write: bool,
    pub data: u16,
}

impl ParameterRequest {
    pub fn read(address: u16) -> Self {
        Self {
            address,
            write: false,
            data: 0,
        }
    }

    pub fn write(address: u16, data: u16) -> Self {
        Self {
            address,
            write: true,
            data,
        }
    }

    pub fn encode(&self) -> [u8; MAX_DATA_LEN] {
        let mut data = [0u8; MAX_DATA_LEN];
        let mut buf = &mut data[..];
        buf.put_u16_le(self.address);
        buf.put_u8(u8::from(self.write));
        buf.put_u8(0);
        buf.put_u16_le(self.data);
        data
    }

    pub fn to_frame(&self, id: FrameId) -> Result<Frame> {
        Frame::new(id, &self.encode())
    }

    pub fn from_frame(frame: &Frame) -> Result<Self> {
        let mut buf = full_payload(frame)?;
        let address = buf.get_u16_le();
        let write = match buf.get_u8() {
            0 => false,
            1 => true,
            other => {
                return Err(FrameError::InvalidField {
                    field: "read/write flag",
                    value: u32::from(other),
                })
            }
        };
        buf.advance(1);
        let data = buf.get_u16_le();
        Ok(Self {
            address,
            write,
            data,
        })
    }
}

fn full_payload(frame: &Frame) -> Result<&[u8]> {
    if frame.len() < MAX_DATA_LEN {
        return Err(FrameError::TooShort {
            needed: MAX_DATA_LEN,
            actual: frame.len(),
        });
    }
    Ok(frame.data())
}
