//! Shared constants for end-to-end tests
//!
//! When the seeded test data changes, update only this file.

// ============================================================================
// Seeded Audio Files
// ============================================================================

/// Tone in the data directory, "tone.wav"
pub const TONE_FILE: &str = "tone.wav";

/// Tone with a space in its name, exercising percent-encoded URLs
pub const CHIME_FILE: &str = "soft chime.wav";

/// Bundled asset in the assets directory
pub const BUNDLED_FILE: &str = "bundled.wav";

/// File with an audio extension that is not decodable
pub const BROKEN_FILE: &str = "broken.mp3";

/// Sample rate of every generated WAV fixture
pub const FIXTURE_SAMPLE_RATE: u32 = 22_050;

/// Duration of every generated WAV fixture, in samples
pub const FIXTURE_SAMPLES: usize = 22_050;

// ============================================================================
// Seeded Documents
// ============================================================================

/// Document referencing seeded audio through placeholder URLs
pub const SCENES_RESOURCE: &str = "scenes";

/// Document that is not valid JSON
pub const CORRUPT_RESOURCE: &str = "corrupt";

// ============================================================================
// Test Configuration
// ============================================================================

/// Number of points in served waveform curves
pub const TEST_WAVEFORM_POINTS: usize = 32;

/// Maximum time to wait for the server to become ready, in milliseconds
pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;

/// Interval between readiness polls, in milliseconds
pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 10;

/// Timeout applied to every test request, in seconds
pub const REQUEST_TIMEOUT_SECS: u64 = 30;
