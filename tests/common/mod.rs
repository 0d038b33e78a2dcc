//! Small synthetic files for the CLI tests.
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

fn png_chunk(kind: &[u8; 4], data: &[u8]) -> Vec<u8> {
    let mut out = (data.len() as u32).to_be_bytes().to_vec();
    out.extend_from_slice(kind);
    out.extend_from_slice(data);
    out.extend_from_slice(&[0; 4]);
    out
}

/// 100x100 RGB PNG with a `tEXt` title.
pub fn png() -> Vec<u8> {
    let mut ihdr = 100u32.to_be_bytes().to_vec();
    ihdr.extend_from_slice(&100u32.to_be_bytes());
    ihdr.extend_from_slice(&[8, 2, 0, 0, 0]);

    let mut out = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    out.extend(png_chunk(b"IHDR", &ihdr));
    out.extend(png_chunk(b"tEXt", b"Title\0Test pattern"));
    out.extend(png_chunk(b"IEND", &[]));
    out
}

/// 200x200 GIF89a with one image.
pub fn gif() -> Vec<u8> {
    let mut out = b"GIF89a".to_vec();
    out.extend_from_slice(&[200, 0, 200, 0, 0, 0, 0]);
    out.push(0x2C);
    out.extend_from_slice(&[0, 0, 0, 0, 200, 0, 200, 0, 0]);
    out.extend_from_slice(&[2, 2, 0x4C, 0x01, 0]);
    out.push(0x3B);
    out
}

/// Minimal `ftyp` box, enough for detection and a brand.
pub fn mp4() -> Vec<u8> {
    let mut out = 24u32.to_be_bytes().to_vec();
    out.extend_from_slice(b"ftypisom");
    out.extend_from_slice(&0x200u32.to_be_bytes());
    out.extend_from_slice(b"isommp41");
    out
}

pub fn write(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, data).unwrap();
    path
}
