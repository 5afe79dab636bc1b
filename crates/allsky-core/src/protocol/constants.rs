//! Protocol constants for the AllSky 340 camera serial protocol.

// ============================================================================
// Opcodes (Host -> Camera)
// ============================================================================

/// Link test. Camera answers with the checksum echo followed by `'O'`.
pub const OP_TEST: u8 = b'E';
/// Firmware version query.
pub const OP_FIRMWARE_VERSION: u8 = b'V';
/// Serial number query.
pub const OP_SERIAL_NUMBER: u8 = b'r';
/// Heater control (+1 byte: 0 off, 1 on).
pub const OP_HEATER: u8 = b'g';
/// Chopper control (+1 byte: 0 off, 1 on).
pub const OP_CHOPPER: u8 = b'U';
/// Move shutter to open (leaves the motor energized).
pub const OP_OPEN_SHUTTER: u8 = b'O';
/// Move shutter to closed (leaves the motor energized).
pub const OP_CLOSE_SHUTTER: u8 = b'C';
/// De-energize the shutter motor. Also the per-block transfer acknowledgment.
pub const OP_DE_ENERGIZE: u8 = b'K';
/// Abort an exposure while no transfer is running.
pub const OP_ABORT: u8 = b'A';
/// Define subframe, or stop an image transfer. Same byte, two commands.
pub const OP_SUBFRAME_OR_STOP: u8 = b'S';
/// Start exposure (+3 bytes exposure ticks BE, +1 frame code, +1 image code).
pub const OP_TAKE_IMAGE: u8 = b'T';
/// Start image transfer.
pub const OP_TRANSFER_IMAGE: u8 = b'X';

/// Raw block acknowledgment byte sent during image transfer.
pub const BLOCK_ACK: u8 = b'K';

// ============================================================================
// Responses (Camera -> Host)
// ============================================================================

/// Payload expected in reply to [`OP_TEST`].
pub const TEST_REPLY: u8 = b'O';
/// Exposure in progress marker.
pub const MARKER_EXPOSING: u8 = b'E';
/// Exposure complete marker.
pub const MARKER_EXPOSURE_DONE: u8 = b'D';

/// Reply lengths, including the leading checksum echo byte.
pub const TEST_REPLY_LEN: usize = 2;
pub const FIRMWARE_REPLY_LEN: usize = 3;
pub const SERIAL_REPLY_LEN: usize = 11;

// ============================================================================
// Exposure
// ============================================================================

/// Exposure ticks per second (one tick is 100 µs).
pub const EXPOSURE_TICKS_PER_SECOND: f64 = 10_000.0;
/// Largest exposure the camera accepts, in ticks (~655.36 s).
pub const MAX_EXPOSURE_TICKS: u32 = 0x63FFFF;
/// Period between two `'E'` markers, in milliseconds.
pub const EXPOSING_MARKER_PERIOD_MS: u64 = 160;

// ============================================================================
// Frame geometry
// ============================================================================

pub const FULL_WIDTH: u32 = 640;
pub const FULL_HEIGHT: u32 = 480;
pub const FULL_BLOCKS: u32 = 4096;
pub const FULL_FRAME_CODE: u8 = 0;

pub const CROP_WIDTH: u32 = 512;
pub const CROP_HEIGHT: u32 = 480;
pub const CROP_BLOCKS: u32 = 4096;
pub const CROP_FRAME_CODE: u8 = 1;

pub const BINNED_WIDTH: u32 = 320;
pub const BINNED_HEIGHT: u32 = 240;
pub const BINNED_BLOCKS: u32 = 1024;
pub const BINNED_FRAME_CODE: u8 = 2;

pub const CUSTOM_FRAME_CODE: u8 = 255;
/// Largest subframe edge, in pixels.
pub const MAX_SUBFRAME_SIZE: u32 = 127;

pub const DARK_IMAGE_CODE: u8 = 0;
pub const LIGHT_IMAGE_CODE: u8 = 1;
/// Light minus dark, only available binned.
pub const AUTO_IMAGE_CODE: u8 = 2;

/// Bytes per pixel in transferred image data.
pub const BYTES_PER_PIXEL: usize = 2;

// ============================================================================
// Link defaults
// ============================================================================

pub const DEFAULT_DEVICE: &str = "/dev/ttyUSB0";
pub const DEFAULT_BAUD_RATE: u32 = 115_200;
pub const SUPPORTED_BAUD_RATES: &[u32] = &[115_200, 230_400, 460_800];
/// Delay between a shutter move and the de-energize command.
pub const SHUTTER_SETTLE_MS: u64 = 100;
