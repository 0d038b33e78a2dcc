//! Synthetic fixture builders shared by the integration tests.
#![allow(dead_code)]

use std::io::Write;
use std::path::PathBuf;

use tempfile::TempDir;

// ---------------------------------------------------------------------------
// ISOBMFF
// ---------------------------------------------------------------------------

pub fn mp4_box(kind: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = ((payload.len() + 8) as u32).to_be_bytes().to_vec();
    out.extend_from_slice(kind);
    out.extend_from_slice(payload);
    out
}

pub fn ftyp(major: &[u8; 4]) -> Vec<u8> {
    let mut payload = major.to_vec();
    payload.extend_from_slice(&0u32.to_be_bytes());
    payload.extend_from_slice(b"isom");
    payload.extend_from_slice(major);
    mp4_box(b"ftyp", &payload)
}

pub fn mvhd(timescale: u32, duration: u32) -> Vec<u8> {
    let mut p = vec![0u8; 4];
    p.extend_from_slice(&[0; 8]);
    p.extend_from_slice(&timescale.to_be_bytes());
    p.extend_from_slice(&duration.to_be_bytes());
    p.extend_from_slice(&0x0001_0000u32.to_be_bytes());
    p.extend_from_slice(&0x0100u16.to_be_bytes());
    p.extend_from_slice(&[0; 70]);
    p.extend_from_slice(&2u32.to_be_bytes());
    mp4_box(b"mvhd", &p)
}

pub fn tkhd(track_id: u32, width: u16, height: u16) -> Vec<u8> {
    let mut p = vec![0, 0, 0, 3];
    p.extend_from_slice(&[0; 8]);
    p.extend_from_slice(&track_id.to_be_bytes());
    p.extend_from_slice(&[0; 4]);
    p.extend_from_slice(&0u32.to_be_bytes());
    p.extend_from_slice(&[0; 8]);
    p.extend_from_slice(&[0; 6]);
    p.extend_from_slice(&[0; 38]);
    p.extend_from_slice(&((width as u32) << 16).to_be_bytes());
    p.extend_from_slice(&((height as u32) << 16).to_be_bytes());
    mp4_box(b"tkhd", &p)
}

pub fn mdhd(timescale: u32, duration: u32) -> Vec<u8> {
    let mut p = vec![0u8; 4];
    p.extend_from_slice(&[0; 8]);
    p.extend_from_slice(&timescale.to_be_bytes());
    p.extend_from_slice(&duration.to_be_bytes());
    // "und"
    p.extend_from_slice(&0x55C4u16.to_be_bytes());
    p.extend_from_slice(&[0; 2]);
    mp4_box(b"mdhd", &p)
}

pub fn hdlr(handler: &[u8; 4], name: &str) -> Vec<u8> {
    let mut p = vec![0u8; 8];
    p.extend_from_slice(handler);
    p.extend_from_slice(&[0; 12]);
    p.extend_from_slice(name.as_bytes());
    p.push(0);
    mp4_box(b"hdlr", &p)
}

pub fn stts(count: u32, delta: u32) -> Vec<u8> {
    let mut p = vec![0u8; 4];
    p.extend_from_slice(&1u32.to_be_bytes());
    p.extend_from_slice(&count.to_be_bytes());
    p.extend_from_slice(&delta.to_be_bytes());
    mp4_box(b"stts", &p)
}

/// `ftyp` + `moov` with one 640x360 video track at 25 fps + `mdat`.
pub fn sample_mp4() -> Vec<u8> {
    let stbl = mp4_box(b"stbl", &stts(50, 512));
    let minf = mp4_box(b"minf", &stbl);
    let mdia = mp4_box(
        b"mdia",
        &[mdhd(12800, 25600), hdlr(b"vide", "VideoHandler"), minf].concat(),
    );
    let trak = mp4_box(b"trak", &[tkhd(1, 640, 360), mdia].concat());
    let moov = mp4_box(b"moov", &[mvhd(1000, 2000), trak].concat());
    [ftyp(b"mp42"), moov, mp4_box(b"mdat", &[0u8; 64])].concat()
}

// ---------------------------------------------------------------------------
// EBML / Matroska
// ---------------------------------------------------------------------------

pub fn ebml_element(id: u32, payload: &[u8]) -> Vec<u8> {
    let id_bytes = id.to_be_bytes();
    let mut out = id_bytes[(id.leading_zeros() / 8) as usize..].to_vec();
    if payload.len() < 127 {
        out.push(0x80 | payload.len() as u8);
    } else {
        out.push(0x01);
        out.extend_from_slice(&(payload.len() as u64).to_be_bytes()[1..]);
    }
    out.extend_from_slice(payload);
    out
}

/// EBML header + Segment with Info and one VP9 video track.
pub fn sample_webm() -> Vec<u8> {
    let header = ebml_element(
        0x1A45DFA3,
        &[ebml_element(0x4286, &[1]), ebml_element(0x4282, b"webm")].concat(),
    );
    let info = ebml_element(
        0x1549A966,
        &[
            ebml_element(0x2AD7B1, &[0x0F, 0x42, 0x40]),
            ebml_element(0x4489, &2000.0f64.to_be_bytes()),
            ebml_element(0x4D80, b"metascope-tests"),
        ]
        .concat(),
    );
    let video = ebml_element(
        0xE0,
        &[ebml_element(0xB0, &[0x01, 0x40]), ebml_element(0xBA, &[0xF0])].concat(),
    );
    let track = ebml_element(
        0xAE,
        &[
            ebml_element(0xD7, &[1]),
            ebml_element(0x83, &[1]),
            ebml_element(0x86, b"V_VP9"),
            video,
        ]
        .concat(),
    );
    let tracks = ebml_element(0x1654AE6B, &track);
    [header, ebml_element(0x18538067, &[info, tracks].concat())].concat()
}

// ---------------------------------------------------------------------------
// RIFF
// ---------------------------------------------------------------------------

pub fn riff_chunk(id: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = id.to_vec();
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
    if payload.len() % 2 == 1 {
        out.push(0);
    }
    out
}

pub fn riff(form: &[u8; 4], chunks: &[Vec<u8>]) -> Vec<u8> {
    let mut payload = form.to_vec();
    for chunk in chunks {
        payload.extend_from_slice(chunk);
    }
    riff_chunk(b"RIFF", &payload)
}

pub fn riff_list(list_type: &[u8; 4], chunks: &[Vec<u8>]) -> Vec<u8> {
    let mut payload = list_type.to_vec();
    for chunk in chunks {
        payload.extend_from_slice(chunk);
    }
    riff_chunk(b"LIST", &payload)
}

/// AVI with an `avih` for 320x240 at 30 fps and one `vids` stream.
pub fn sample_avi() -> Vec<u8> {
    let mut avih = Vec::new();
    for v in [33_333u32, 0, 0, 0x10, 90, 0, 1, 0, 320, 240, 0, 0, 0, 0] {
        avih.extend_from_slice(&v.to_le_bytes());
    }

    let mut strh = b"vidsH264".to_vec();
    strh.extend_from_slice(&[0; 8]);
    for v in [0u32, 1, 30, 0, 90, 0] {
        strh.extend_from_slice(&v.to_le_bytes());
    }
    strh.extend_from_slice(&(-1i32).to_le_bytes());
    strh.extend_from_slice(&[0; 12]);

    let mut strf = 40u32.to_le_bytes().to_vec();
    strf.extend_from_slice(&320i32.to_le_bytes());
    strf.extend_from_slice(&240i32.to_le_bytes());
    strf.extend_from_slice(&1u16.to_le_bytes());
    strf.extend_from_slice(&24u16.to_le_bytes());
    strf.extend_from_slice(b"H264");
    strf.extend_from_slice(&[0; 20]);

    riff(
        b"AVI ",
        &[
            riff_list(
                b"hdrl",
                &[
                    riff_chunk(b"avih", &avih),
                    riff_list(b"strl", &[riff_chunk(b"strh", &strh), riff_chunk(b"strf", &strf)]),
                ],
            ),
            riff_list(b"INFO", &[riff_chunk(b"INAM", b"Sample\0")]),
            riff_list(b"movi", &[riff_chunk(b"00dc", &[0; 16])]),
        ],
    )
}

/// Extended WebP: `VP8X` canvas 64x32 with alpha, `ALPH`, `VP8 `.
pub fn sample_webp() -> Vec<u8> {
    let mut vp8x = vec![0x10, 0, 0, 0];
    vp8x.extend_from_slice(&63u32.to_le_bytes()[..3]);
    vp8x.extend_from_slice(&31u32.to_le_bytes()[..3]);

    let mut vp8 = vec![0x10, 0x00, 0x00, 0x9D, 0x01, 0x2A];
    vp8.extend_from_slice(&64u16.to_le_bytes());
    vp8.extend_from_slice(&32u16.to_le_bytes());

    riff(
        b"WEBP",
        &[
            riff_chunk(b"VP8X", &vp8x),
            riff_chunk(b"ALPH", &[0x01, 0xAA]),
            riff_chunk(b"VP8 ", &vp8),
        ],
    )
}

// ---------------------------------------------------------------------------
// PNG / GIF
// ---------------------------------------------------------------------------

pub const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

pub fn png_chunk(kind: &[u8; 4], data: &[u8]) -> Vec<u8> {
    let mut out = (data.len() as u32).to_be_bytes().to_vec();
    out.extend_from_slice(kind);
    out.extend_from_slice(data);
    out.extend_from_slice(&[0; 4]);
    out
}

pub fn ihdr(width: u32, height: u32) -> Vec<u8> {
    let mut data = width.to_be_bytes().to_vec();
    data.extend_from_slice(&height.to_be_bytes());
    data.extend_from_slice(&[8, 2, 0, 0, 0]);
    png_chunk(b"IHDR", &data)
}

/// 100x100 RGB PNG with one `tEXt` chunk.
pub fn sample_png() -> Vec<u8> {
    [
        PNG_SIGNATURE.to_vec(),
        ihdr(100, 100),
        png_chunk(b"tEXt", b"Software\0metascope"),
        png_chunk(b"IDAT", &[0x78, 0x9C, 0x03, 0x00]),
        png_chunk(b"IEND", &[]),
    ]
    .concat()
}

/// 200x200 GIF89a with one image and a trailer.
pub fn sample_gif() -> Vec<u8> {
    let mut out = b"GIF89a".to_vec();
    out.extend_from_slice(&200u16.to_le_bytes());
    out.extend_from_slice(&200u16.to_le_bytes());
    out.extend_from_slice(&[0, 0, 0]);
    out.push(0x2C);
    out.extend_from_slice(&[0, 0, 0, 0]);
    out.extend_from_slice(&200u16.to_le_bytes());
    out.extend_from_slice(&200u16.to_le_bytes());
    out.push(0);
    out.extend_from_slice(&[2, 2, 0x4C, 0x01, 0]);
    out.push(0x3B);
    out
}

// ---------------------------------------------------------------------------
// Codec buffers
// ---------------------------------------------------------------------------

/// Only the SPS header bytes: profile_idc, constraint flags, level_idc.
pub fn sps_header(profile_idc: u8, constraints: u8, level_idc: u8) -> Vec<u8> {
    vec![0x67, profile_idc, constraints, level_idc]
}

// ---------------------------------------------------------------------------
// Files
// ---------------------------------------------------------------------------

/// Write `data` into a fresh temp dir, returning the dir guard and path.
pub fn write_fixture(name: &str, data: &[u8]) -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(data).unwrap();
    (dir, path)
}
