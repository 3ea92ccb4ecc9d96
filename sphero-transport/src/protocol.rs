//! Protocol constants for the Sphero API v2 packet format

/// Frame delimiters and escape handling
pub mod framing {
    /// Start of packet marker
    pub const START_OF_PACKET: u8 = 0x8D;
    /// End of packet marker
    pub const END_OF_PACKET: u8 = 0xD8;
    /// Escape byte; the next byte is a masked reserved value
    pub const ESCAPE: u8 = 0xAB;
    /// `START_OF_PACKET & !ESCAPE_MASK`
    pub const ESCAPED_START_OF_PACKET: u8 = 0x05;
    /// `END_OF_PACKET & !ESCAPE_MASK`
    pub const ESCAPED_END_OF_PACKET: u8 = 0x50;
    /// `ESCAPE & !ESCAPE_MASK`
    pub const ESCAPED_ESCAPE: u8 = 0x23;
    /// Bits cleared on escape and restored on unescape
    pub const ESCAPE_MASK: u8 = 0x88;

    /// Upper bound on the unescaped body of one frame (header, payload, checksum).
    /// The decoder resets when a frame grows past it.
    pub const MAX_FRAME_LEN: usize = 256;

    /// Returns true for bytes that must be escaped inside a frame
    pub fn is_reserved(byte: u8) -> bool {
        matches!(byte, START_OF_PACKET | END_OF_PACKET | ESCAPE)
    }
}

/// Bits of the packet flags byte
pub mod flags {
    /// Packet is a response to a command
    pub const IS_RESPONSE: u8 = 0x01;
    /// Sender wants a response
    pub const REQUESTS_RESPONSE: u8 = 0x02;
    /// Sender only wants a response on error
    pub const REQUESTS_ONLY_ERROR_RESPONSE: u8 = 0x04;
    /// Packet resets the toy's inactivity (auto-sleep) timer
    pub const RESETS_INACTIVITY_TIMEOUT: u8 = 0x08;
    /// A target id byte follows the flags
    pub const HAS_TARGET_ID: u8 = 0x10;
    /// A source id byte follows the flags (after the target id, if any)
    pub const HAS_SOURCE_ID: u8 = 0x20;

    /// Flags used on every outgoing command
    pub const COMMAND: u8 = REQUESTS_RESPONSE | RESETS_INACTIVITY_TIMEOUT;
}

/// Logical sub-devices inside the toy
pub mod device {
    pub const API_PROCESSOR: u8 = 0x10;
    pub const SYSTEM_INFO: u8 = 0x11;
    pub const POWER: u8 = 0x13;
    pub const DRIVING: u8 = 0x16;

    /// Get human-readable name for a device id
    pub fn name(device_id: u8) -> &'static str {
        match device_id {
            API_PROCESSOR => "API_PROCESSOR",
            SYSTEM_INFO => "SYSTEM_INFO",
            POWER => "POWER",
            DRIVING => "DRIVING",
            _ => "UNKNOWN",
        }
    }
}

/// API processor commands
pub mod api_processor {
    pub const ECHO: u8 = 0x00;
}

/// System info commands
pub mod system_info {
    pub const MAIN_APP_VERSION: u8 = 0x00;
    pub const BOOTLOADER_VERSION: u8 = 0x01;
}

/// Power commands
pub mod power {
    pub const DEEP_SLEEP: u8 = 0x00;
    pub const SLEEP: u8 = 0x01;
    pub const BATTERY_VOLTAGE: u8 = 0x03;
    pub const WAKE: u8 = 0x0D;
}

/// Driving commands
pub mod driving {
    pub const DRIVE_WITH_HEADING: u8 = 0x07;
}

/// Response error codes (first payload byte of a response packet)
pub mod error_code {
    pub const SUCCESS: u8 = 0x00;
    pub const BAD_DEVICE_ID: u8 = 0x01;
    pub const BAD_COMMAND_ID: u8 = 0x02;
    pub const NOT_YET_IMPLEMENTED: u8 = 0x03;
    pub const COMMAND_IS_RESTRICTED: u8 = 0x04;
    pub const BAD_DATA_LENGTH: u8 = 0x05;
    pub const COMMAND_FAILED: u8 = 0x06;
    pub const BAD_PARAMETER_VALUE: u8 = 0x07;
    pub const BUSY: u8 = 0x08;
    pub const BAD_TARGET_ID: u8 = 0x09;
    pub const TARGET_UNAVAILABLE: u8 = 0x0A;

    pub fn name(code: u8) -> &'static str {
        match code {
            SUCCESS => "SUCCESS",
            BAD_DEVICE_ID => "BAD_DEVICE_ID",
            BAD_COMMAND_ID => "BAD_COMMAND_ID",
            NOT_YET_IMPLEMENTED => "NOT_YET_IMPLEMENTED",
            COMMAND_IS_RESTRICTED => "COMMAND_IS_RESTRICTED",
            BAD_DATA_LENGTH => "BAD_DATA_LENGTH",
            COMMAND_FAILED => "COMMAND_FAILED",
            BAD_PARAMETER_VALUE => "BAD_PARAMETER_VALUE",
            BUSY => "BUSY",
            BAD_TARGET_ID => "BAD_TARGET_ID",
            TARGET_UNAVAILABLE => "TARGET_UNAVAILABLE",
            _ => "UNKNOWN",
        }
    }
}

/// GATT identifiers, in simple (undashed, lowercase) UUID form
pub mod gatt {
    /// API v2 control service
    pub const API_V2_SERVICE: &str = "00010001574f4f2053706865726f2121";
    /// Nordic DFU service
    pub const NORDIC_DFU_SERVICE: &str = "00020001574f4f2053706865726f2121";

    /// Command/response characteristic
    pub const API_V2_CHARACTERISTIC: &str = "00010002574f4f2053706865726f2121";
    /// DFU control point; must be acknowledged or it blocks the control channel
    pub const DFU_CONTROL_CHARACTERISTIC: &str = "00020002574f4f2053706865726f2121";
    pub const DFU_INFO_CHARACTERISTIC: &str = "00020004574f4f2053706865726f2121";
    /// Receives the unlock string before the toy accepts commands
    pub const ANTI_DOS_CHARACTERISTIC: &str = "00020005574f4f2053706865726f2121";
}

/// Startup handshake values
pub mod handshake {
    /// Written as ASCII to the anti-DoS characteristic
    pub const UNLOCK_CODE: &str = "usetheforce...band";
    /// Written back to the DFU control characteristic on every notification
    pub const DFU_ACK: u8 = 0x30;
}

/// Timing constants
pub mod timing {
    /// Time a dispatched command may wait for its response
    pub const COMMAND_TIMEOUT_MS: u64 = 5000;
    /// Advertisement scan window
    pub const SCAN_WINDOW_MS: u64 = 5000;
}

#[cfg(test)]
mod tests {
    use super::framing::*;

    #[test]
    fn escaped_values_are_masked_markers() {
        assert_eq!(START_OF_PACKET & !ESCAPE_MASK, ESCAPED_START_OF_PACKET);
        assert_eq!(END_OF_PACKET & !ESCAPE_MASK, ESCAPED_END_OF_PACKET);
        assert_eq!(ESCAPE & !ESCAPE_MASK, ESCAPED_ESCAPE);
        assert_eq!(ESCAPED_ESCAPE | ESCAPE_MASK, ESCAPE);
    }

    #[test]
    fn reserved_bytes() {
        assert!(is_reserved(0x8D));
        assert!(is_reserved(0xD8));
        assert!(is_reserved(0xAB));
        assert!(!is_reserved(0x05));
    }
}
