use std::time::Duration;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::device::constants::{
    make_printer_service_uuid, make_printer_write_uuid, DEFAULT_FAKE_PRINT_FRAMES, FRAME_PACING_DELAY,
    MAX_FAKE_PRINT_FRAMES, RELEASE_SETTLE_DELAY, WRITE_CHUNK_SIZE,
};
use crate::device::types::DeviceAddress;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Claim this device directly instead of taking the first one discovered.
    pub device_address: Option<String>,
    pub service_uuid: Uuid,
    pub write_characteristic_uuid: Uuid,
    pub release_settle_ms: u64,
    pub frame_pacing_ms: u64,
    pub fake_print_frames: u8,
    pub write_chunk_size: usize,
}

impl Config {
    pub fn device_address(&self) -> Option<DeviceAddress> {
        self.device_address.as_deref().map(DeviceAddress::new)
    }

    pub fn release_settle(&self) -> Duration {
        Duration::from_millis(self.release_settle_ms)
    }

    pub fn frame_pacing(&self) -> Duration {
        Duration::from_millis(self.frame_pacing_ms)
    }

    /// Brings out of range values back within their limits.
    pub fn normalize(&mut self) {
        self.fake_print_frames = self.fake_print_frames.clamp(1, MAX_FAKE_PRINT_FRAMES);
        if self.write_chunk_size == 0 {
            self.write_chunk_size = WRITE_CHUNK_SIZE;
        }
        if let Some(address) = &self.device_address {
            if address.trim().is_empty() {
                self.device_address = None;
            }
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            device_address: None,
            service_uuid: make_printer_service_uuid(),
            write_characteristic_uuid: make_printer_write_uuid(),
            release_settle_ms: RELEASE_SETTLE_DELAY,
            frame_pacing_ms: FRAME_PACING_DELAY,
            fake_print_frames: DEFAULT_FAKE_PRINT_FRAMES,
            write_chunk_size: WRITE_CHUNK_SIZE,
        }
    }
}
