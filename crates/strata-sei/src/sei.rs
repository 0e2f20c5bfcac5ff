//! # SEI NAL Unit Encoder
//!
//! Builds "user data unregistered" SEI NAL units that carry opaque
//! application payloads inside an H.264 elementary stream.
//!
//! ## Layout (before emulation prevention)
//!
//! ```text
//! +-------------+-----+-----+-------------+-----------+---------+------+
//! | 00 00 00 01 | 06  | 05  | size (FF*n) | UUID (16) | payload | 0x80 |
//! +-------------+-----+-----+-------------+-----------+---------+------+
//!   start code   NAL   SEI    payload size  tag         opaque    RBSP
//!                type  type   of UUID+data                        stop bit
//! ```
//!
//! The size field emits one `0xFF` per full 255 and a final remainder byte.
//! Everything after the start code is then emulation-prevented so that no
//! `00 00 0x` (x ≤ 3) sequence appears inside the unit.
//!
//! The extraction side ([`extract_user_data`]) reverses this for observers
//! that want the payloads back out of a frame.

use bytes::{BufMut, Bytes};

use crate::error::{try_buffer, SeiError};
use crate::nal::{AnnexBUnits, NAL_TYPE_SEI, START_CODE};

// ─── Constants ───────────────────────────────────────────────────────────────

/// UUID tagging every SEI unit produced by Strata:
/// `3f8a2b1c-4d5e-6f70-8192-a3b4c5d6e7f8`.
pub const STRATA_SEI_UUID: [u8; 16] = [
    0x3F, 0x8A, 0x2B, 0x1C, 0x4D, 0x5E, 0x6F, 0x70, 0x81, 0x92, 0xA3, 0xB4, 0xC5, 0xD6, 0xE7, 0xF8,
];

/// SEI payload type "user data unregistered".
pub const SEI_TYPE_USER_DATA_UNREGISTERED: u8 = 5;

/// `rbsp_stop_one_bit` followed by alignment zeros.
pub const RBSP_TRAILING_BITS: u8 = 0x80;

/// Emulation prevention byte.
pub const EMULATION_PREVENTION_BYTE: u8 = 0x03;

const UUID_LEN: usize = 16;

// ─── Size field ──────────────────────────────────────────────────────────────

/// Number of bytes the SEI size field needs for `size`.
#[inline]
pub fn size_field_len(size: usize) -> usize {
    size / 255 + 1
}

fn put_size_field(buf: &mut impl BufMut, mut size: usize) {
    while size >= 255 {
        buf.put_u8(0xFF);
        size -= 255;
    }
    buf.put_u8(size as u8);
}

/// Length of the unit for `payload_len` bytes of payload, before emulation
/// prevention.
pub fn raw_unit_len(payload_len: usize) -> usize {
    START_CODE.len() + 2 + size_field_len(payload_len + UUID_LEN) + UUID_LEN + payload_len + 1
}

// ─── Encoding ────────────────────────────────────────────────────────────────

/// Encode `payload` as a complete, emulation-prevented SEI NAL unit tagged
/// with `uuid`, starting with a 4-byte start code.
pub fn encode_user_data_unregistered(uuid: &[u8; 16], payload: &[u8]) -> Result<Bytes, SeiError> {
    let raw_len = raw_unit_len(payload.len());
    let mut raw = try_buffer(raw_len)?;

    raw.put_slice(&START_CODE);
    raw.put_u8(NAL_TYPE_SEI);
    raw.put_u8(SEI_TYPE_USER_DATA_UNREGISTERED);
    put_size_field(&mut raw, payload.len() + UUID_LEN);
    raw.put_slice(uuid);
    raw.put_slice(payload);
    raw.put_u8(RBSP_TRAILING_BITS);
    debug_assert_eq!(raw.len(), raw_len);

    let unit = apply_emulation_prevention(&raw)?;
    tracing::trace!(
        payload_len = payload.len(),
        raw_len,
        unit_len = unit.len(),
        "encoded SEI unit"
    );
    Ok(Bytes::from(unit))
}

/// Insert emulation prevention bytes into a NAL unit.
///
/// The leading start code (first 4 bytes) is copied unchanged. After it,
/// a `0x03` is emitted before any byte in `00..=03` whose two preceding
/// output bytes are both zero.
pub fn apply_emulation_prevention(nal: &[u8]) -> Result<Vec<u8>, SeiError> {
    let head = nal.len().min(START_CODE.len());
    let body = &nal[head..];
    let mut out = try_buffer(nal.len() + body.len() / 2)?;
    out.extend_from_slice(&nal[..head]);

    for &byte in body {
        let n = out.len();
        if n >= 2 && out[n - 2] == 0x00 && out[n - 1] == 0x00 && byte <= 0x03 {
            out.push(EMULATION_PREVENTION_BYTE);
        }
        out.push(byte);
    }
    Ok(out)
}

/// Remove emulation prevention bytes from a NAL unit body (no start code).
pub fn strip_emulation_prevention(ebsp: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(ebsp.len());
    let mut zeros = 0usize;
    for &byte in ebsp {
        if zeros >= 2 && byte == EMULATION_PREVENTION_BYTE {
            zeros = 0;
            continue;
        }
        zeros = if byte == 0x00 { zeros + 1 } else { 0 };
        out.push(byte);
    }
    out
}

// ─── Extraction ──────────────────────────────────────────────────────────────

/// Return every user-data-unregistered payload tagged with `uuid` found in
/// the SEI NAL units of `frame`, in stream order.
///
/// Malformed SEI units are skipped, never reported.
pub fn extract_user_data(frame: &[u8], uuid: &[u8; 16]) -> Vec<Bytes> {
    let units: Vec<_> = AnnexBUnits::new(frame).collect();
    let mut found = Vec::new();

    for (idx, unit) in units.iter().enumerate() {
        if unit.info.nal_type != NAL_TYPE_SEI {
            continue;
        }
        let end = units.get(idx + 1).map_or(frame.len(), |next| next.offset);
        let body = &frame[unit.header_offset() + 1..end];
        let rbsp = strip_emulation_prevention(body);

        for (payload_type, message) in SeiMessages::new(&rbsp) {
            if payload_type == SEI_TYPE_USER_DATA_UNREGISTERED as usize
                && message.len() >= UUID_LEN
                && message[..UUID_LEN] == uuid[..]
            {
                found.push(Bytes::copy_from_slice(&message[UUID_LEN..]));
            }
        }
    }
    found
}

/// Iterator over `(payload_type, payload)` pairs of one SEI RBSP.
struct SeiMessages<'a> {
    rbsp: &'a [u8],
    pos: usize,
}

impl<'a> SeiMessages<'a> {
    fn new(rbsp: &'a [u8]) -> Self {
        Self { rbsp, pos: 0 }
    }

    fn read_ff_coded(&mut self) -> Option<usize> {
        let mut value = 0usize;
        loop {
            let byte = *self.rbsp.get(self.pos)?;
            self.pos += 1;
            value += byte as usize;
            if byte != 0xFF {
                return Some(value);
            }
        }
    }
}

impl<'a> Iterator for SeiMessages<'a> {
    type Item = (usize, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        // Only the stop bit (and trailing zeros) left.
        if matches!(self.rbsp.get(self.pos), None | Some(&RBSP_TRAILING_BITS)) {
            return None;
        }
        let payload_type = self.read_ff_coded()?;
        let size = self.read_ff_coded()?;
        let start = self.pos;
        let end = start.checked_add(size)?;
        let payload = self.rbsp.get(start..end)?;
        self.pos = end;
        Some((payload_type, payload))
    }
}
