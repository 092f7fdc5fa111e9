//! Identifier generation: incident IDs, cluster IDs, trace IDs.
//!
//! All three are total, pure-ish functions (time and a per-thread RNG
//! are the only inputs beyond the cluster fingerprint). None can fail.

use rand::Rng;

const BASE36_DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

fn base36_encode(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut buf = Vec::new();
    while value > 0 {
        buf.push(BASE36_DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    buf.reverse();
    String::from_utf8(buf).expect("base36 alphabet is ASCII")
}

/// `"inc_" + base36(unix_seconds) + base36(u24 random)`.
///
/// The time-ordered prefix lets callers range-query incidents
/// lexicographically by creation order.
pub fn incident_id() -> String {
    let unix_seconds = chrono::Utc::now().timestamp().max(0) as u64;
    let random_part: u32 = rand::rng().random_range(0..=0xFF_FFFFu32);
    format!(
        "inc_{}{}",
        base36_encode(unix_seconds),
        base36_encode(random_part as u64)
    )
}

/// MurmurHash3 (x86, 32-bit) with a fixed seed, used to derive
/// deterministic cluster IDs from a fingerprint.
fn murmur3_32(key: &[u8], seed: u32) -> u32 {
    const C1: u32 = 0xcc9e_2d51;
    const C2: u32 = 0x1b87_3593;

    let mut h1 = seed;
    let chunks = key.chunks_exact(4);
    let tail = chunks.remainder();

    for chunk in chunks {
        let mut k1 = u32::from_le_bytes(chunk.try_into().expect("chunk is 4 bytes"));
        k1 = k1.wrapping_mul(C1);
        k1 = k1.rotate_left(15);
        k1 = k1.wrapping_mul(C2);
        h1 ^= k1;
        h1 = h1.rotate_left(13);
        h1 = h1.wrapping_mul(5).wrapping_add(0xe654_6b64);
    }

    let mut k1 = 0u32;
    for (i, &byte) in tail.iter().enumerate().rev() {
        k1 ^= (byte as u32) << (8 * i);
    }
    if !tail.is_empty() {
        k1 = k1.wrapping_mul(C1);
        k1 = k1.rotate_left(15);
        k1 = k1.wrapping_mul(C2);
        h1 ^= k1;
    }

    h1 ^= key.len() as u32;
    h1 ^= h1 >> 16;
    h1 = h1.wrapping_mul(0x85eb_ca6b);
    h1 ^= h1 >> 13;
    h1 = h1.wrapping_mul(0xc2b2_ae35);
    h1 ^= h1 >> 16;
    h1
}

const CLUSTER_ID_SEED: u32 = 0x5a5a_5a5a;

/// `"clu_" + hex8(murmur3_32(fingerprint))`. Deterministic: identical
/// fingerprints always yield identical cluster IDs (see the windowed
/// identity caveat in DESIGN.md).
pub fn cluster_id(fingerprint: &str) -> String {
    let hash = murmur3_32(fingerprint.as_bytes(), CLUSTER_ID_SEED);
    format!("clu_{:08x}", hash)
}

/// 16 lowercase hex characters from 64 random bits.
pub fn trace_id() -> String {
    let bits: u64 = rand::rng().random();
    format!("{:016x}", bits)
}
