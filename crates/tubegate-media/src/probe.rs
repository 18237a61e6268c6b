//! Lightweight checks on encoded audio.

/// Whether a buffer starts like an MP3 stream.
///
/// Accepts an ID3v2 tag or an MPEG audio frame sync (11 set bits).
pub fn looks_like_mp3(bytes: &[u8]) -> bool {
    match bytes {
        [b'I', b'D', b'3', ..] => true,
        [0xFF, second, ..] => second & 0xE0 == 0xE0,
        _ => false,
    }
}
