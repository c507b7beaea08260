use uuid::Uuid;

/**
 * How long (milliseconds) to wait after the transport reports a disconnect during a release
 * before the session is considered idle again. Absorbs transport teardown races.
 */
pub const RELEASE_SETTLE_DELAY: u64 = 600;

/**
 * Delay (milliseconds) between two consecutive frames of a paced print job.
 */
pub const FRAME_PACING_DELAY: u64 = 1000;

/**
 * How often (milliseconds) to check whether a connected peripheral is still connected.
 */
pub const POLL_DELAY: u64 = 500;

/**
 * How long (milliseconds) to scan for peripherals before answering a discovery request.
 */
pub const SCAN_WINDOW: u64 = 3000;

/**
 * How long (milliseconds) a write to a characteristic may take.
 */
pub const WRITE_DEADLINE: u64 = 2000;

/**
 * How long (milliseconds) checking if the peripheral is still connected may take
 */
pub const IS_CONNECTED_DEADLINE: u64 = 2000;

/**
 * Largest number of bytes written to the characteristic in one go.
 */
pub const WRITE_CHUNK_SIZE: usize = 180;

/**
 * The UUID of the GATT service most BLE receipt printers expose for raw printing.
 */
pub const PRINTER_SERVICE: &str = "000018f0-0000-1000-8000-00805f9b34fb";

/**
 * The UUID of the characteristic raw command bytes are written to.
 */
pub const PRINTER_WRITE_CHARACTERISTIC: &str = "00002af1-0000-1000-8000-00805f9b34fb";

/**
 * Upper bound for the number of frames of a fake print job.
 */
pub const MAX_FAKE_PRINT_FRAMES: u8 = 12;

pub const DEFAULT_FAKE_PRINT_FRAMES: u8 = 3;

pub fn make_printer_service_uuid() -> Uuid {
    Uuid::from_u128(0x000018f0_0000_1000_8000_00805f9b34fb)
}

pub fn make_printer_write_uuid() -> Uuid {
    Uuid::from_u128(0x00002af1_0000_1000_8000_00805f9b34fb)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuid_constants_match_their_text_form() {
        assert_eq!(make_printer_service_uuid().to_string(), PRINTER_SERVICE);
        assert_eq!(make_printer_write_uuid().to_string(), PRINTER_WRITE_CHARACTERISTIC);
    }
}
