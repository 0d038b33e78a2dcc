//! NAL unit framing helpers shared by the H.264 and HEVC decoders.

/// H.264 `nal_unit_type` of a sequence parameter set.
pub const H264_NAL_SPS: u8 = 7;
/// H.264 `nal_unit_type` of a picture parameter set.
pub const H264_NAL_PPS: u8 = 8;

/// HEVC `nal_unit_type` values carried in `hvcC` arrays.
pub const HEVC_NAL_VPS: u8 = 32;
pub const HEVC_NAL_SPS: u8 = 33;
pub const HEVC_NAL_PPS: u8 = 34;
pub const HEVC_NAL_PREFIX_SEI: u8 = 39;

/// Low five bits of an H.264 NAL header byte.
pub fn h264_nal_type(header: u8) -> u8 {
    header & 0x1F
}

/// Six-bit type field of the first HEVC NAL header byte.
pub fn hevc_nal_type(header: u8) -> u8 {
    (header >> 1) & 0x3F
}

/// Strip a leading Annex-B start code (`00 00 01` or `00 00 00 01`).
pub fn strip_start_code(data: &[u8]) -> &[u8] {
    if data.starts_with(&[0, 0, 0, 1]) {
        &data[4..]
    } else if data.starts_with(&[0, 0, 1]) {
        &data[3..]
    } else {
        data
    }
}

/// Split an Annex-B byte stream on start codes.
///
/// Returns the NAL units without their start codes. Input with no start
/// code at all comes back as a single unit.
pub fn split_annex_b(data: &[u8]) -> Vec<&[u8]> {
    let mut starts = Vec::new();
    let mut i = 0;

    while i + 2 < data.len() {
        if data[i] == 0 && data[i + 1] == 0 && data[i + 2] == 1 {
            starts.push((i, i + 3));
            i += 3;
        } else {
            i += 1;
        }
    }

    if starts.is_empty() {
        return if data.is_empty() { Vec::new() } else { vec![data] };
    }

    let mut units = Vec::with_capacity(starts.len());
    for (idx, &(_, payload_start)) in starts.iter().enumerate() {
        let mut end = starts
            .get(idx + 1)
            .map(|&(code_start, _)| code_start)
            .unwrap_or(data.len());
        // a four-byte start code leaves its leading zero on the previous unit
        if idx + 1 < starts.len() && end > payload_start && data[end - 1] == 0 {
            end -= 1;
        }
        if payload_start < end {
            units.push(&data[payload_start..end]);
        }
    }
    units
}

/// Convert EBSP to RBSP by dropping emulation-prevention bytes
/// (`00 00 03` becomes `00 00`).
pub fn remove_emulation_prevention(data: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(data.len());
    let mut zeros = 0usize;

    for &byte in data {
        if zeros >= 2 && byte == 3 {
            zeros = 0;
            continue;
        }
        zeros = if byte == 0 { zeros + 1 } else { 0 };
        result.push(byte);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_start_code() {
        assert_eq!(strip_start_code(&[0, 0, 1, 0x67]), &[0x67]);
        assert_eq!(strip_start_code(&[0, 0, 0, 1, 0x67]), &[0x67]);
        assert_eq!(strip_start_code(&[0x67, 0x64]), &[0x67, 0x64]);
    }

    #[test]
    fn test_remove_emulation_prevention() {
        let input = vec![0x00, 0x00, 0x03, 0x01, 0x00, 0x00, 0x03, 0x02];
        let output = remove_emulation_prevention(&input);
        assert_eq!(output, vec![0x00, 0x00, 0x01, 0x00, 0x00, 0x02]);
    }

    #[test]
    fn test_emulation_prevention_needs_two_zeros() {
        let input = vec![0x00, 0x03, 0x00, 0x00, 0x00, 0x03];
        let output = remove_emulation_prevention(&input);
        assert_eq!(output, vec![0x00, 0x03, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_split_annex_b() {
        let stream = [0, 0, 0, 1, 0x67, 0x64, 0, 0, 1, 0x68, 0xEE, 0, 0, 0, 1, 0x65];
        let units = split_annex_b(&stream);
        assert_eq!(units, vec![&[0x67, 0x64][..], &[0x68, 0xEE][..], &[0x65][..]]);
    }

    #[test]
    fn test_nal_types() {
        assert_eq!(h264_nal_type(0x67), H264_NAL_SPS);
        assert_eq!(hevc_nal_type(0x40), HEVC_NAL_VPS);
        assert_eq!(hevc_nal_type(0x42), HEVC_NAL_SPS);
    }
}
