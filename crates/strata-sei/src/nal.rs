//! # NAL Unit Parser
//!
//! Locates and identifies H.264 (AVC) NAL units inside Annex B access units.
//!
//! Only the one-byte NAL header is interpreted:
//! `forbidden(1) | nal_ref_idc(2) | nal_type(5)`. Slice data is never decoded.

/// Coded slice of a non-IDR picture.
pub const NAL_TYPE_SLICE: u8 = 1;
/// Coded slice of an IDR picture.
pub const NAL_TYPE_IDR: u8 = 5;
/// Supplemental enhancement information.
pub const NAL_TYPE_SEI: u8 = 6;
/// Sequence parameter set.
pub const NAL_TYPE_SPS: u8 = 7;
/// Picture parameter set.
pub const NAL_TYPE_PPS: u8 = 8;

/// 4-byte Annex B start code, as emitted in front of generated NAL units.
pub const START_CODE: [u8; 4] = [0x00, 0x00, 0x00, 0x01];

/// Parsed NAL header info.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NalInfo {
    /// The raw NAL unit type number.
    pub nal_type: u8,
}

impl NalInfo {
    /// Slice types 1 to 5: where picture data starts.
    pub fn is_slice(&self) -> bool {
        (NAL_TYPE_SLICE..=NAL_TYPE_IDR).contains(&self.nal_type)
    }

    /// IDR, SPS, or PPS: marks the access unit as a keyframe.
    pub fn marks_keyframe(&self) -> bool {
        matches!(self.nal_type, NAL_TYPE_IDR | NAL_TYPE_SPS | NAL_TYPE_PPS)
    }
}

/// Parse the NAL unit header at the start of `payload`.
///
/// Returns `None` if the payload is empty.
pub fn parse_nal(payload: &[u8]) -> Option<NalInfo> {
    let header = *payload.first()?;
    Some(NalInfo {
        nal_type: header & 0x1F,
    })
}

/// A NAL unit located inside an Annex B buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NalUnit {
    /// Byte offset of the start code.
    pub offset: usize,
    /// Length of the start code (3 or 4).
    pub start_code_len: usize,
    pub info: NalInfo,
}

impl NalUnit {
    /// Offset of the NAL header byte.
    pub fn header_offset(&self) -> usize {
        self.offset + self.start_code_len
    }
}

/// Iterator over the NAL units of an Annex B buffer, in stream order.
///
/// Start codes are `00 00 01` or `00 00 00 01`. A start code counts only
/// when a header byte follows it.
pub struct AnnexBUnits<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> AnnexBUnits<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }
}

impl Iterator for AnnexBUnits<'_> {
    type Item = NalUnit;

    fn next(&mut self) -> Option<NalUnit> {
        let data = self.data;
        while self.pos + 3 < data.len() {
            let i = self.pos;
            if data[i] != 0x00 || data[i + 1] != 0x00 {
                self.pos += 1;
                continue;
            }

            let start_code_len = if data[i + 2] == 0x01 {
                3
            } else if data[i + 2] == 0x00 && data[i + 3] == 0x01 && i + 4 < data.len() {
                4
            } else {
                self.pos += 1;
                continue;
            };

            let header = i + start_code_len;
            self.pos = header;
            if let Some(info) = parse_nal(&data[header..]) {
                return Some(NalUnit {
                    offset: i,
                    start_code_len,
                    info,
                });
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ─── Header parsing ─────────────────────────────────────────────────

    #[test]
    fn h264_sps() {
        let info = parse_nal(&[0x67]).unwrap(); // ref_idc=3, type=7
        assert_eq!(info.nal_type, NAL_TYPE_SPS);
        assert!(info.marks_keyframe());
        assert!(!info.is_slice());
    }

    #[test]
    fn h264_pps() {
        let info = parse_nal(&[0x68]).unwrap();
        assert_eq!(info.nal_type, NAL_TYPE_PPS);
        assert!(info.marks_keyframe());
        assert!(!info.is_slice());
    }

    #[test]
    fn h264_idr() {
        let info = parse_nal(&[0x65]).unwrap();
        assert_eq!(info.nal_type, NAL_TYPE_IDR);
        assert!(info.is_slice());
        assert!(info.marks_keyframe());
    }

    #[test]
    fn h264_p_slice_reference() {
        let info = parse_nal(&[0x41]).unwrap(); // ref_idc=2, type=1
        assert_eq!(info.nal_type, NAL_TYPE_SLICE);
        assert!(info.is_slice());
        assert!(!info.marks_keyframe());
    }

    #[test]
    fn h264_b_slice_non_reference() {
        let info = parse_nal(&[0x01]).unwrap();
        assert_eq!(info.nal_type, NAL_TYPE_SLICE);
        assert!(info.is_slice());
    }

    #[test]
    fn h264_forbidden_and_ref_bits_ignored() {
        let info = parse_nal(&[0xE5]).unwrap();
        assert_eq!(info.nal_type, NAL_TYPE_IDR);
        assert!(!parse_nal(&[0x09]).unwrap().is_slice()); // AU delimiter
    }

    #[test]
    fn h264_sei() {
        let info = parse_nal(&[0x06]).unwrap();
        assert_eq!(info.nal_type, NAL_TYPE_SEI);
        assert!(!info.is_slice());
        assert!(!info.marks_keyframe());
    }

    #[test]
    fn h264_empty_payload() {
        assert!(parse_nal(&[]).is_none());
    }

    // ─── Annex B Scanning ───────────────────────────────────────────────

    #[test]
    fn annex_b_finds_multiple_nals() {
        let data = [
            0x00, 0x00, 0x01, 0x67, 0xAA, // SPS
            0x00, 0x00, 0x01, 0x68, 0xBB, // PPS
            0x00, 0x00, 0x01, 0x65, 0xCC, 0xDD, // IDR
        ];
        let nals: Vec<_> = AnnexBUnits::new(&data).collect();
        assert_eq!(nals.len(), 3);
        assert_eq!(nals[0].offset, 0);
        assert_eq!(nals[1].offset, 5);
        assert_eq!(nals[2].offset, 10);
        assert_eq!(nals[2].info.nal_type, NAL_TYPE_IDR);
        assert!(nals.iter().all(|n| n.start_code_len == 3));
    }

    #[test]
    fn annex_b_four_byte_start_code() {
        let data = [0x00, 0x00, 0x00, 0x01, 0x67, 0xAA];
        let nals: Vec<_> = AnnexBUnits::new(&data).collect();
        assert_eq!(nals.len(), 1);
        assert_eq!(nals[0].offset, 0);
        assert_eq!(nals[0].start_code_len, 4);
        assert_eq!(nals[0].header_offset(), 4);
    }

    #[test]
    fn annex_b_mixed_start_codes() {
        let data = [
            0x00, 0x00, 0x00, 0x01, 0x67, 0x42, // SPS, 4-byte
            0x00, 0x00, 0x01, 0x41, 0x9A, // P slice, 3-byte
        ];
        let nals: Vec<_> = AnnexBUnits::new(&data).collect();
        assert_eq!(nals.len(), 2);
        assert_eq!((nals[0].offset, nals[0].start_code_len), (0, 4));
        assert_eq!((nals[1].offset, nals[1].start_code_len), (6, 3));
    }

    #[test]
    fn annex_b_trailing_start_code_without_header() {
        let data = [0x00, 0x00, 0x01, 0x65, 0x00, 0x00, 0x01];
        let nals: Vec<_> = AnnexBUnits::new(&data).collect();
        assert_eq!(nals.len(), 1);
    }

    #[test]
    fn annex_b_empty() {
        assert_eq!(AnnexBUnits::new(&[]).count(), 0);
        assert_eq!(AnnexBUnits::new(&[0x00, 0x00, 0x01]).count(), 0);
    }
}
