//! Fixed protocol constants that should NOT be changed.
//!
//! These values are defined by the SlimProto wire protocol and the server's
//! JSON-RPC endpoint. Changing them breaks interoperability with the server.

// ─────────────────────────────────────────────────────────────────────────────
// Framing
// ─────────────────────────────────────────────────────────────────────────────

/// Length of a frame header: 4-byte ASCII tag + 4-byte big-endian length.
pub const FRAME_HEADER_LEN: usize = 8;

/// Largest payload length accepted from the server (bytes).
///
/// Real command payloads are a few hundred bytes at most; anything larger
/// means the stream is out of sync.
pub const MAX_FRAME_PAYLOAD: usize = 1024 * 1024;

/// Minimum length of a `strm` payload (fixed header before the request line).
pub const STRM_FIXED_LEN: usize = 24;

/// Length of the round-trip diagnostic extension appended to `STAT` frames.
pub const STAT_EXTENSION_LEN: usize = 16;

// ─────────────────────────────────────────────────────────────────────────────
// Command tags (server → client)
// ─────────────────────────────────────────────────────────────────────────────

pub const TAG_STRM: [u8; 4] = *b"strm";
pub const TAG_AUDG: [u8; 4] = *b"audg";
pub const TAG_SETD: [u8; 4] = *b"setd";
pub const TAG_AUDE: [u8; 4] = *b"aude";
pub const TAG_VERS: [u8; 4] = *b"vers";
pub const TAG_VFDC: [u8; 4] = *b"vfdc";
pub const TAG_GRFE: [u8; 4] = *b"grfe";
pub const TAG_GRFB: [u8; 4] = *b"grfb";

// ─────────────────────────────────────────────────────────────────────────────
// Message tags (client → server)
// ─────────────────────────────────────────────────────────────────────────────

pub const TAG_HELO: [u8; 4] = *b"HELO";
pub const TAG_STAT: [u8; 4] = *b"STAT";
pub const TAG_SETD_REPLY: [u8; 4] = *b"SETD";
pub const TAG_BYE: [u8; 4] = *b"BYE!";

/// `setd` / `SETD` id for the player name.
pub const SETD_PLAYER_NAME: u8 = 0;

// ─────────────────────────────────────────────────────────────────────────────
// Ports and endpoints
// ─────────────────────────────────────────────────────────────────────────────

/// Default SlimProto TCP port.
pub const DEFAULT_SLIMPROTO_PORT: u16 = 3483;

/// Default HTTP port of the server (streams and JSON-RPC).
pub const DEFAULT_HTTP_PORT: u16 = 9000;

/// Path of the JSON-RPC endpoint on the server's HTTP port.
pub const JSONRPC_PATH: &str = "/jsonrpc.js";

/// JSON-RPC method name understood by the server.
pub const JSONRPC_METHOD: &str = "slim.request";

/// Player preference holding the resume-after-reconnect mode (0, 1, 2).
pub const RESUME_PREF_NAME: &str = "playerResumeMode";

// ─────────────────────────────────────────────────────────────────────────────
// Player identity
// ─────────────────────────────────────────────────────────────────────────────

/// Device id announced in `HELO` (12 = software player).
pub const DEFAULT_DEVICE_ID: u8 = 12;

/// Firmware revision announced in `HELO`.
pub const FIRMWARE_REVISION: u8 = 0;

/// Model string advertised in the capability list.
pub const MODEL_NAME: &str = "slimlink";

/// Highest sample rate advertised in the capability list.
pub const MAX_SAMPLE_RATE: u32 = 48_000;

// ─────────────────────────────────────────────────────────────────────────────
// Session timing
// ─────────────────────────────────────────────────────────────────────────────

/// Protection window after a user-requested next/previous (seconds).
pub const MANUAL_SKIP_WINDOW_SECS: u64 = 5;

/// A commanded start this far below the last known position is an anomaly.
pub const START_REGRESSION_TOLERANCE_SECS: f64 = 5.0;

/// Saved positions older than this are never trusted (seconds).
pub const SAVED_POSITION_MAX_AGE_SECS: u64 = 10 * 60;

/// Maximum disagreement between a save and authoritative server time (seconds).
pub const SAVED_POSITION_MAX_DRIFT_SECS: f64 = 10.0;

// ─────────────────────────────────────────────────────────────────────────────
// Health monitoring
// ─────────────────────────────────────────────────────────────────────────────

/// Health check period while in the foreground (seconds).
pub const HEALTH_CHECK_FOREGROUND_SECS: u64 = 15;

/// Health check period while in the background (seconds).
pub const HEALTH_CHECK_BACKGROUND_SECS: u64 = 30;

/// A connection with no inbound frame for this long is considered dead (seconds).
pub const HEARTBEAT_TIMEOUT_SECS: u64 = 30;

/// Safety margin subtracted from host-granted background time (seconds).
pub const BACKGROUND_EXPIRY_MARGIN_SECS: u64 = 5;

// ─────────────────────────────────────────────────────────────────────────────
// Channels
// ─────────────────────────────────────────────────────────────────────────────

/// Capacity of the manager's inbound event queue.
pub const EVENT_QUEUE_CAPACITY: usize = 256;

/// Capacity of the event broadcast channel for observers.
pub const EVENT_CHANNEL_CAPACITY: usize = 100;

/// Read buffer reserved per socket read.
pub const READ_CHUNK_SIZE: usize = 4096;
