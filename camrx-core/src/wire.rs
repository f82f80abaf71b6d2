//! Big-endian field access for camrx datagrams.
//!
//! Every multi-byte field on the wire is big-endian. Readers convert with
//! `from_be_bytes`, so the result is the same on little- and big-endian
//! hosts. Writers are the mirror image and are used by
//! [`FrameSender`](crate::sender::FrameSender) and the packet encoders.

use crate::error::CamrxError;

/// Borrow `N` bytes of `buf` starting at `offset`.
fn field<const N: usize>(buf: &[u8], offset: usize) -> Result<[u8; N], CamrxError> {
    let out_of_range = || CamrxError::OutOfRange {
        offset,
        width: N,
        len: buf.len(),
    };
    let end = offset.checked_add(N).ok_or_else(out_of_range)?;
    let bytes = buf.get(offset..end).ok_or_else(out_of_range)?;
    // The slice is exactly N long, so the conversion cannot fail.
    bytes.try_into().map_err(|_| out_of_range())
}

/// Read a big-endian `u32` at `offset`.
pub fn read_u32(buf: &[u8], offset: usize) -> Result<u32, CamrxError> {
    field::<4>(buf, offset).map(u32::from_be_bytes)
}

/// Read a big-endian `i32` at `offset`.
pub fn read_i32(buf: &[u8], offset: usize) -> Result<i32, CamrxError> {
    field::<4>(buf, offset).map(i32::from_be_bytes)
}

/// Read a big-endian IEEE-754 `f32` at `offset`.
pub fn read_f32(buf: &[u8], offset: usize) -> Result<f32, CamrxError> {
    field::<4>(buf, offset).map(f32::from_be_bytes)
}

/// Read a big-endian IEEE-754 `f64` at `offset`.
pub fn read_f64(buf: &[u8], offset: usize) -> Result<f64, CamrxError> {
    field::<8>(buf, offset).map(f64::from_be_bytes)
}

/// Read `N` consecutive big-endian `f32` values starting at `offset`.
pub fn read_f32_array<const N: usize>(buf: &[u8], offset: usize) -> Result<[f32; N], CamrxError> {
    let mut out = [0.0f32; N];
    for (i, v) in out.iter_mut().enumerate() {
        *v = read_f32(buf, offset + i * 4)?;
    }
    Ok(out)
}

pub fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_be_bytes());
}

pub fn put_i32(out: &mut Vec<u8>, value: i32) {
    out.extend_from_slice(&value.to_be_bytes());
}

pub fn put_f32(out: &mut Vec<u8>, value: f32) {
    out.extend_from_slice(&value.to_be_bytes());
}

pub fn put_f64(out: &mut Vec<u8>, value: f64) {
    out.extend_from_slice(&value.to_be_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_big_endian_integers() {
        let buf = [0x00, 0x00, 0x01, 0x02, 0xFF, 0xFF, 0xFF, 0xFE];
        assert_eq!(read_u32(&buf, 0).unwrap(), 0x0102);
        assert_eq!(read_i32(&buf, 4).unwrap(), -2);
        assert_eq!(read_u32(&buf, 4).unwrap(), 0xFFFF_FFFE);
    }

    #[test]
    fn reads_big_endian_floats() {
        // 1.5f32 = 0x3FC00000, -2.0f64 = 0xC000000000000000
        let buf = [
            0x3F, 0xC0, 0x00, 0x00, 0xC0, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        ];
        assert_eq!(read_f32(&buf, 0).unwrap(), 1.5);
        assert_eq!(read_f64(&buf, 4).unwrap(), -2.0);
    }

    #[test]
    fn unaligned_offset() {
        let buf = [0xAA, 0x00, 0x00, 0x00, 0x07];
        assert_eq!(read_u32(&buf, 1).unwrap(), 7);
    }

    #[test]
    fn out_of_range_reports_position() {
        let buf = [0u8; 6];
        match read_u32(&buf, 3) {
            Err(CamrxError::OutOfRange { offset, width, len }) => {
                assert_eq!((offset, width, len), (3, 4, 6));
            }
            other => panic!("expected OutOfRange, got {other:?}"),
        }
        assert!(read_f64(&buf, 0).is_err());
        assert!(read_u32(&buf, usize::MAX).is_err());
    }

    #[test]
    fn exact_fit_is_in_range() {
        let buf = [0u8; 8];
        assert!(read_f64(&buf, 0).is_ok());
        assert!(read_u32(&buf, 4).is_ok());
        assert!(read_u32(&buf, 5).is_err());
    }

    #[test]
    fn writers_match_readers() {
        let mut out = Vec::new();
        put_u32(&mut out, 1);
        put_i32(&mut out, -3);
        put_f32(&mut out, 0.25);
        put_f64(&mut out, 250.0);
        assert_eq!(&out[..4], &[0, 0, 0, 1]);
        assert_eq!(read_i32(&out, 4).unwrap(), -3);
        assert_eq!(read_f32(&out, 8).unwrap(), 0.25);
        assert_eq!(read_f64(&out, 12).unwrap(), 250.0);
    }

    #[test]
    fn float_array() {
        let mut out = Vec::new();
        for v in [1.0f32, 2.0, 3.0] {
            put_f32(&mut out, v);
        }
        let arr: [f32; 3] = read_f32_array(&out, 0).unwrap();
        assert_eq!(arr, [1.0, 2.0, 3.0]);
        assert!(read_f32_array::<4>(&out, 0).is_err());
    }
}
