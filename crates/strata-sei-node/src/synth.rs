//! Synthetic H.264 access units for driving the injector without an encoder.
//!
//! Frames are structurally valid Annex B (correct start codes and NAL
//! headers) but the slice bodies are filler. Filler bytes never drop below
//! 0x10, so no start code can appear inside a slice.

/// Baseline profile SPS, level 3.0.
const SPS: [u8; 8] = [0x00, 0x00, 0x00, 0x01, 0x67, 0x42, 0x00, 0x1E];
const PPS: [u8; 8] = [0x00, 0x00, 0x00, 0x01, 0x68, 0xCE, 0x3C, 0x80];
const IDR_HEADER: [u8; 5] = [0x00, 0x00, 0x00, 0x01, 0x65];
const NON_IDR_HEADER: [u8; 5] = [0x00, 0x00, 0x00, 0x01, 0x41];

/// The fixed SPS/PPS/IDR frame used by `test-hook`.
pub fn test_keyframe() -> Vec<u8> {
    let mut frame = Vec::with_capacity(28);
    frame.extend_from_slice(&SPS);
    frame.extend_from_slice(&PPS);
    frame.extend_from_slice(&IDR_HEADER);
    frame.extend_from_slice(&[0x88, 0x84, 0x00, 0xFF, 0xFF, 0xFF, 0xFF]);
    frame
}

/// Generates a GOP-structured stream: a keyframe every `gop` frames, inter
/// frames in between.
pub struct FrameSynth {
    gop: u64,
    index: u64,
    idr_size: usize,
    p_size: usize,
}

impl FrameSynth {
    pub fn new(gop: u64) -> Self {
        FrameSynth {
            gop: gop.max(1),
            index: 0,
            idr_size: 12_000,
            p_size: 1_500,
        }
    }

    pub fn is_next_keyframe(&self) -> bool {
        self.index % self.gop == 0
    }

    /// Produce the next access unit.
    pub fn next_frame(&mut self) -> Vec<u8> {
        let keyframe = self.is_next_keyframe();
        let body_len = if keyframe { self.idr_size } else { self.p_size };
        let mut frame = Vec::with_capacity(SPS.len() + PPS.len() + IDR_HEADER.len() + body_len);

        if keyframe {
            frame.extend_from_slice(&SPS);
            frame.extend_from_slice(&PPS);
            frame.extend_from_slice(&IDR_HEADER);
        } else {
            frame.extend_from_slice(&NON_IDR_HEADER);
        }
        let seed = self.index as usize;
        frame.extend((0..body_len).map(|i| ((i + seed) % 0xEF) as u8 + 0x10));

        self.index += 1;
        frame
    }
}
