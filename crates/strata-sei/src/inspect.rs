//! # Frame Inspector
//!
//! Frame-level questions answered from NAL headers alone: is this access
//! unit a keyframe, and where does its picture data begin.

use crate::nal::AnnexBUnits;

/// Whether the frame carries an IDR slice, SPS, or PPS.
pub fn is_keyframe(frame: &[u8]) -> bool {
    AnnexBUnits::new(frame).any(|unit| unit.info.marks_keyframe())
}

/// Offset of the start code of the first slice NAL unit (types 1–5).
///
/// `None` means the frame has no slice; callers prepend at offset 0.
pub fn find_insert_offset(frame: &[u8]) -> Option<usize> {
    AnnexBUnits::new(frame)
        .find(|unit| unit.info.is_slice())
        .map(|unit| unit.offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEYFRAME: [u8; 28] = [
        0x00, 0x00, 0x00, 0x01, 0x67, 0x42, 0x00, 0x1E, // SPS
        0x00, 0x00, 0x00, 0x01, 0x68, 0xCE, 0x3C, 0x80, // PPS
        0x00, 0x00, 0x00, 0x01, 0x65, 0x88, 0x84, 0x00, // IDR
        0xFF, 0xFF, 0xFF, 0xFF,
    ];

    const P_FRAME: [u8; 9] = [0x00, 0x00, 0x00, 0x01, 0x41, 0x9A, 0x02, 0x03, 0x04];

    #[test]
    fn keyframe_detected_from_sps() {
        assert!(is_keyframe(&KEYFRAME));
    }

    #[test]
    fn lone_pps_counts_as_keyframe() {
        assert!(is_keyframe(&[0x00, 0x00, 0x01, 0x68, 0xCE]));
    }

    #[test]
    fn p_frame_is_not_keyframe() {
        assert!(!is_keyframe(&P_FRAME));
    }

    #[test]
    fn garbage_is_not_keyframe() {
        assert!(!is_keyframe(&[]));
        assert!(!is_keyframe(&[0x65, 0x67, 0x68]));
        assert!(!is_keyframe(&[0xFF; 64]));
    }

    #[test]
    fn insert_offset_is_idr_start_code() {
        assert_eq!(find_insert_offset(&KEYFRAME), Some(16));
    }

    #[test]
    fn insert_offset_for_p_slice() {
        assert_eq!(find_insert_offset(&P_FRAME), Some(0));
    }

    #[test]
    fn insert_offset_skips_sei_and_parameter_sets() {
        let data = [
            0x00, 0x00, 0x01, 0x06, 0x05, 0x01, 0x80, // SEI
            0x00, 0x00, 0x01, 0x67, 0x42, // SPS
            0x00, 0x00, 0x01, 0x21, 0x9A, // non-ref slice, 3-byte
        ];
        assert_eq!(find_insert_offset(&data), Some(12));
    }

    #[test]
    fn no_slice_means_not_found() {
        let sps_only = [0x00, 0x00, 0x00, 0x01, 0x67, 0x42, 0x00, 0x1E];
        assert_eq!(find_insert_offset(&sps_only), None);
        assert_eq!(find_insert_offset(&[]), None);
    }
}
