//! Server message ids.
//!
//! ULIDs: 48 bits of milliseconds followed by 80 random bits, written as 26
//! Crockford base32 characters, so ids sort by creation time.

use rand::Rng;

const CROCKFORD: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";

pub fn generate() -> String {
    let now_ms = chrono::Utc::now().timestamp_millis().max(0) as u64;
    let mut rng = rand::thread_rng();
    let random: u128 = rng.r#gen::<u128>() & ((1u128 << 80) - 1);
    encode(now_ms, random)
}

fn encode(timestamp_ms: u64, random: u128) -> String {
    let mut out = [0u8; 26];

    let mut ts = timestamp_ms;
    for slot in out[..10].iter_mut().rev() {
        *slot = CROCKFORD[(ts & 0x1F) as usize];
        ts >>= 5;
    }

    let mut r = random;
    for slot in out[10..].iter_mut().rev() {
        *slot = CROCKFORD[(r & 0x1F) as usize];
        r >>= 5;
    }

    out.iter().map(|&b| b as char).collect()
}
