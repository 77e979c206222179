use std::time::SystemTime;

/// Wall-clock unix timestamp in whole seconds. The bridge stamps capture
/// responses and scene-history entries with this so a client can line them
/// up with its own logs; everything duration-like runs on the engine clock
/// instead.
#[inline]
pub fn timestamp_secs() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .expect("System clock predates the epoch")
        .as_secs()
}
