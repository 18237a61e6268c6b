//! FFmpeg progress parsing.

use serde::{Deserialize, Serialize};

/// Progress information from FFmpeg's `-progress` output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FfmpegProgress {
    /// Output time in milliseconds
    pub out_time_ms: i64,
    /// Bytes written to the output so far
    pub total_size: u64,
    /// Output bitrate in kbit/s
    pub bitrate_kbps: f64,
    /// Encoding speed (e.g., 1.5 = 1.5x realtime)
    pub speed: f64,
    /// Whether encoding is complete
    pub is_complete: bool,
}

impl FfmpegProgress {
    /// Fold one `key=value` line into the current state.
    ///
    /// Returns a snapshot when a `progress=` line closes a block.
    pub fn apply_line(&mut self, line: &str) -> Option<FfmpegProgress> {
        let (key, value) = line.trim().split_once('=')?;

        match key {
            "out_time_ms" | "out_time_us" => {
                // FFmpeg reports microseconds under both keys
                if let Ok(us) = value.parse::<i64>() {
                    self.out_time_ms = us / 1000;
                }
            }
            "total_size" => {
                if let Ok(size) = value.parse() {
                    self.total_size = size;
                }
            }
            "bitrate" => {
                // Format: "128.0kbits/s" or "N/A"
                if let Some(rate) = value.trim().strip_suffix("kbits/s") {
                    if let Ok(rate) = rate.trim().parse() {
                        self.bitrate_kbps = rate;
                    }
                }
            }
            "speed" => {
                // Format: "1.5x" or "N/A"
                if let Some(speed) = value.trim().strip_suffix('x') {
                    if let Ok(speed) = speed.parse() {
                        self.speed = speed;
                    }
                }
            }
            "progress" => {
                // "continue" or "end"
                if value == "end" {
                    self.is_complete = true;
                }
                return Some(self.clone());
            }
            _ => {}
        }

        None
    }

    /// Output position in seconds.
    pub fn out_time_secs(&self) -> f64 {
        self.out_time_ms as f64 / 1000.0
    }
}

/// Whether a stderr line belongs to the `-progress` key/value protocol.
pub fn is_progress_line(line: &str) -> bool {
    const KEYS: &[&str] = &[
        "bitrate",
        "total_size",
        "out_time_us",
        "out_time_ms",
        "out_time",
        "dup_frames",
        "drop_frames",
        "speed",
        "progress",
        "frame",
        "fps",
        "stream_0_0_q",
    ];

    line.split_once('=')
        .map(|(key, _)| KEYS.contains(&key.trim()))
        .unwrap_or(false)
}
