/*
 * Copyright (C) 2025 Fastly, Inc.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use miniz_oxide::inflate;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const GZIP_HEADER_SIZE: usize = 10;
const GZIP_TRAILER_SIZE: usize = 8;

// RFC 1952 member header flags
const FHCRC: u8 = 0x02;
const FEXTRA: u8 = 0x04;
const FNAME: u8 = 0x08;
const FCOMMENT: u8 = 0x10;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("truncated header")]
    TruncatedHeader,

    #[error("unknown compression format")]
    UnknownFormat,

    #[error("inflate failed: {0}")]
    Inflate(inflate::DecompressError),

    #[error("decoded length does not match trailer")]
    LengthMismatch,
}

fn skip_zero_terminated(src: &[u8], pos: usize) -> Result<usize, DecodeError> {
    let rest = src.get(pos..).ok_or(DecodeError::TruncatedHeader)?;

    match rest.iter().position(|&b| b == 0) {
        Some(end) => Ok(pos + end + 1),
        None => Err(DecodeError::TruncatedHeader),
    }
}

// returns the deflate stream (and trailer) following the member header
fn gzip_deflate_stream(src: &[u8]) -> Result<&[u8], DecodeError> {
    if src.len() < GZIP_HEADER_SIZE {
        return Err(DecodeError::TruncatedHeader);
    }

    // deflate is the only defined compression method
    if src[2] != 8 {
        return Err(DecodeError::UnknownFormat);
    }

    let flags = src[3];
    let mut pos = GZIP_HEADER_SIZE;

    if flags & FEXTRA != 0 {
        let len_bytes = src
            .get(pos..(pos + 2))
            .ok_or(DecodeError::TruncatedHeader)?;
        let len = u16::from_le_bytes([len_bytes[0], len_bytes[1]]) as usize;

        pos += 2 + len;
    }

    if flags & FNAME != 0 {
        pos = skip_zero_terminated(src, pos)?;
    }

    if flags & FCOMMENT != 0 {
        pos = skip_zero_terminated(src, pos)?;
    }

    if flags & FHCRC != 0 {
        pos += 2;
    }

    src.get(pos..).ok_or(DecodeError::TruncatedHeader)
}

/// Decompresses a complete gzip or zlib stream.
///
/// The format is auto-detected: input starting with the gzip magic is
/// treated as a gzip member, anything else is tried as a zlib stream.
/// For gzip, the ISIZE trailer field is verified when present; the CRC32
/// field is not checked.
pub fn unzip(src: &[u8]) -> Result<Vec<u8>, DecodeError> {
    if src.starts_with(&GZIP_MAGIC) {
        let stream = gzip_deflate_stream(src)?;

        let out = inflate::decompress_to_vec(stream).map_err(DecodeError::Inflate)?;

        if stream.len() >= GZIP_TRAILER_SIZE {
            let isize_bytes = &stream[(stream.len() - 4)..];
            let expected = u32::from_le_bytes([
                isize_bytes[0],
                isize_bytes[1],
                isize_bytes[2],
                isize_bytes[3],
            ]);

            if out.len() as u32 != expected {
                return Err(DecodeError::LengthMismatch);
            }
        }

        Ok(out)
    } else {
        inflate::decompress_to_vec_zlib(src).map_err(DecodeError::Inflate)
    }
}

#[cfg(test)]
pub(crate) fn gzip_fixture(data: &[u8]) -> Vec<u8> {
    let deflated = miniz_oxide::deflate::compress_to_vec(data, 6);

    let mut out = vec![0x1f, 0x8b, 8, 0, 0, 0, 0, 0, 0, 0xff];
    out.extend_from_slice(&deflated);

    // crc32 is not checked by unzip
    out.extend_from_slice(&[0, 0, 0, 0]);
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use miniz_oxide::deflate;

    #[test]
    fn test_gzip() {
        let data = b"hello world hello world hello world";

        let out = unzip(&gzip_fixture(data)).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_gzip_optional_fields() {
        let data = b"optional fields";
        let deflated = deflate::compress_to_vec(data, 6);

        // FEXTRA + FNAME + FCOMMENT + FHCRC all present
        let mut src = vec![0x1f, 0x8b, 8, FEXTRA | FNAME | FCOMMENT | FHCRC, 0, 0, 0, 0, 0, 0xff];
        src.extend_from_slice(&[3, 0, b'x', b'y', b'z']);
        src.extend_from_slice(b"name\0");
        src.extend_from_slice(b"comment\0");
        src.extend_from_slice(&[0xab, 0xcd]);
        src.extend_from_slice(&deflated);
        src.extend_from_slice(&[0, 0, 0, 0]);
        src.extend_from_slice(&(data.len() as u32).to_le_bytes());

        let out = unzip(&src).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_zlib_fallback() {
        let data = b"zlib stream";
        let src = deflate::compress_to_vec_zlib(data, 6);

        let out = unzip(&src).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_garbage() {
        assert!(unzip(b"not compressed data").is_err());
    }

    #[test]
    fn test_truncated() {
        let data = b"truncate me please, thanks";

        let full = gzip_fixture(data);
        assert!(unzip(&full[..5]).is_err());
    }

    #[test]
    fn test_length_mismatch() {
        let data = b"mismatched length";

        let mut src = gzip_fixture(data);
        let len = src.len();
        src[len - 4..].copy_from_slice(&999u32.to_le_bytes());

        match unzip(&src) {
            Err(DecodeError::LengthMismatch) => {}
            _ => panic!("expected length mismatch"),
        }
    }
}
