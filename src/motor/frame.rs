// Command frame codec for the CAN wheel motor controllers
//
// Every message is exactly 8 bytes:
// [station_no, command, subcommand, b0, b1, b2, b3, 0xFF]
// The speed payload is a little-endian two's-complement i32 (rpm).

use std::fmt;

/// Length of every command frame
pub const FRAME_LEN: usize = 8;

/// Last byte of every frame
pub const TERMINATOR: u8 = 0xFF;

/// Command byte (second byte of the frame)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Heartbeat = 0x08,
    Speed = 0x20,
    Enable = 0x25,
    Stop = 0x26,
}

impl Command {
    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x08 => Some(Self::Heartbeat),
            0x20 => Some(Self::Speed),
            0x25 => Some(Self::Enable),
            0x26 => Some(Self::Stop),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    #[error("Speed {value} rpm does not fit in a signed 32-bit payload")]
    OutOfRange { value: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("Frame must be 8 bytes, got {len}")]
    BadLength { len: usize },

    #[error("Frame terminator must be 0xFF, got 0x{byte:02X}")]
    BadTerminator { byte: u8 },

    #[error("Unknown command byte 0x{byte:02X}")]
    UnknownCommand { byte: u8 },
}

/// One 8-byte command frame addressed to a single station
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    bytes: [u8; FRAME_LEN],
    command: Command,
}

impl Frame {
    fn build(station_no: u8, command: Command, subcommand: u8, payload: [u8; 4]) -> Self {
        let [b0, b1, b2, b3] = payload;
        Self {
            bytes: [
                station_no,
                command as u8,
                subcommand,
                b0,
                b1,
                b2,
                b3,
                TERMINATOR,
            ],
            command,
        }
    }

    pub fn station_no(&self) -> u8 {
        self.bytes[0]
    }

    pub fn command(&self) -> Command {
        self.command
    }

    pub fn subcommand(&self) -> u8 {
        self.bytes[2]
    }

    pub fn payload(&self) -> [u8; 4] {
        [self.bytes[3], self.bytes[4], self.bytes[5], self.bytes[6]]
    }

    /// Speed carried by a speed frame, `None` for every other command
    pub fn speed_rpm(&self) -> Option<i32> {
        match self.command() {
            Command::Speed => Some(i32::from_le_bytes(self.payload())),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> &[u8; FRAME_LEN] {
        &self.bytes
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.bytes.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{:02X}", byte)?;
        }
        Ok(())
    }
}

/// Encode a speed command.
///
/// Clamping to the vehicle's speed limit is the caller's job; this only
/// rejects values that cannot be represented in the 32-bit payload.
pub fn encode_speed(station_no: u8, rpm: i64) -> Result<Frame, EncodeError> {
    let rpm = i32::try_from(rpm).map_err(|_| EncodeError::OutOfRange { value: rpm })?;
    Ok(Frame::build(station_no, Command::Speed, 0x00, rpm.to_le_bytes()))
}

/// Keep-alive frame, must be repeated while the node is enabled
pub fn encode_heartbeat(station_no: u8) -> Frame {
    Frame::build(station_no, Command::Heartbeat, 0x00, [0; 4])
}

pub fn encode_enable(station_no: u8, enable: bool) -> Frame {
    Frame::build(station_no, Command::Enable, u8::from(enable), [0; 4])
}

pub fn encode_stop(station_no: u8) -> Frame {
    Frame::build(station_no, Command::Stop, 0x00, [0; 4])
}

/// Parse raw bytes back into a frame (loopback and replay)
pub fn decode(bytes: &[u8]) -> Result<Frame, DecodeError> {
    let bytes: [u8; FRAME_LEN] = bytes
        .try_into()
        .map_err(|_| DecodeError::BadLength { len: bytes.len() })?;

    if bytes[FRAME_LEN - 1] != TERMINATOR {
        return Err(DecodeError::BadTerminator {
            byte: bytes[FRAME_LEN - 1],
        });
    }
    let command =
        Command::from_byte(bytes[1]).ok_or(DecodeError::UnknownCommand { byte: bytes[1] })?;

    Ok(Frame { bytes, command })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speed_frame_layout() {
        // 300 rpm = 0x0000012C little-endian
        let frame = encode_speed(1, 300).unwrap();
        assert_eq!(
            frame.as_bytes(),
            &[0x01, 0x20, 0x00, 0x2C, 0x01, 0x00, 0x00, 0xFF]
        );

        // -300 rpm in two's complement
        let frame = encode_speed(3, -300).unwrap();
        assert_eq!(
            frame.as_bytes(),
            &[0x03, 0x20, 0x00, 0xD4, 0xFE, 0xFF, 0xFF, 0xFF]
        );
    }

    #[test]
    fn test_fixed_frames() {
        assert_eq!(
            encode_heartbeat(2).as_bytes(),
            &[0x02, 0x08, 0, 0, 0, 0, 0, 0xFF]
        );
        assert_eq!(
            encode_enable(4, true).as_bytes(),
            &[0x04, 0x25, 0x01, 0, 0, 0, 0, 0xFF]
        );
        assert_eq!(
            encode_enable(4, false).as_bytes(),
            &[0x04, 0x25, 0x00, 0, 0, 0, 0, 0xFF]
        );
        assert_eq!(
            encode_stop(1).as_bytes(),
            &[0x01, 0x26, 0, 0, 0, 0, 0, 0xFF]
        );
    }

    #[test]
    fn test_speed_round_trip_extremes() {
        let values = [i32::MIN, -5000, -1, 0, 1, 5000, i32::MAX];
        for station_no in 1..=4u8 {
            for &rpm in &values {
                let frame = encode_speed(station_no, rpm as i64).unwrap();
                let decoded = decode(frame.as_bytes()).unwrap();
                assert_eq!(decoded.station_no(), station_no);
                assert_eq!(decoded.command(), Command::Speed);
                assert_eq!(decoded.speed_rpm(), Some(rpm));
            }
        }
    }

    #[test]
    fn test_speed_out_of_range() {
        let too_big = i32::MAX as i64 + 1;
        assert_eq!(
            encode_speed(1, too_big),
            Err(EncodeError::OutOfRange { value: too_big })
        );
        assert!(encode_speed(1, i32::MIN as i64 - 1).is_err());
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(
            decode(&[0x01, 0x08, 0, 0, 0, 0, 0xFF]),
            Err(DecodeError::BadLength { len: 7 })
        );
        assert_eq!(
            decode(&[0x01, 0x08, 0, 0, 0, 0, 0, 0x00]),
            Err(DecodeError::BadTerminator { byte: 0x00 })
        );
        assert_eq!(
            decode(&[0x01, 0x99, 0, 0, 0, 0, 0, 0xFF]),
            Err(DecodeError::UnknownCommand { byte: 0x99 })
        );
    }

    #[test]
    fn test_non_speed_frames_have_no_speed() {
        assert_eq!(encode_heartbeat(1).speed_rpm(), None);
        assert_eq!(encode_stop(1).speed_rpm(), None);
    }

    #[test]
    fn test_display_hex() {
        assert_eq!(encode_heartbeat(1).to_string(), "01 08 00 00 00 00 00 FF");
    }
}
