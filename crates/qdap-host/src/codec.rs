// SPDX-License-Identifier: Apache-2.0
//! The two-phase property-query codec.
//!
//! Every variable-length value that crosses the plugin boundary — device,
//! site, operation and job properties, as well as job result channels — is
//! transferred with the same protocol:
//!
//! 1. **Size probe**: call with `size = 0` and a null buffer. A conformant
//!    backend writes only the true byte size into `size_ret` and returns
//!    success without touching any buffer.
//! 2. **Fill**: call again with a host-allocated buffer of exactly that
//!    size. The backend copies exactly the true size of bytes. A fill with
//!    `size` smaller than the true size must be rejected with
//!    invalid-argument and no partial write.
//!
//! This module centralizes that discipline in [`read_two_phase`] so every
//! call site gets the same probe-then-allocate-then-fill sequence and the
//! same bounds behaviour, instead of re-deriving it per property. Callers
//! that already know an upper bound can skip the probe via [`fill_into`].
//!
//! Decode helpers for the wire representations (NUL-terminated C strings,
//! native-endian scalars, opaque token arrays) live here too.

use std::ffi::c_void;
use std::os::raw::c_int;

use crate::error::{QdapError, Result, check};

/// Shape of a boundary query call, with the session/handle/key arguments
/// already bound. The three remaining parameters are `(size, value, size_ret)`.
pub(crate) type QueryCall<'a> = dyn FnMut(usize, *mut c_void, *mut usize) -> c_int + 'a;

/// Probe the true size of a value without reading it.
pub(crate) fn probe(call: &mut QueryCall<'_>, op: &'static str) -> Result<usize> {
    let mut size: usize = 0;
    let ret = call(0, std::ptr::null_mut(), &mut size);
    check(ret, op)?;
    Ok(size)
}

/// Fill a caller-supplied buffer. Returns the number of bytes the backend
/// reported as the true value size.
///
/// The backend contract allows `buf` to be larger than the value; passing a
/// buffer smaller than the true size yields `InvalidArgument` from a
/// conformant backend, with no partial write.
pub(crate) fn fill_into(
    call: &mut QueryCall<'_>,
    buf: &mut [u8],
    op: &'static str,
) -> Result<usize> {
    let mut size_ret: usize = 0;
    let ptr = if buf.is_empty() {
        std::ptr::null_mut()
    } else {
        buf.as_mut_ptr().cast::<c_void>()
    };
    let ret = call(buf.len(), ptr, &mut size_ret);
    check(ret, op)?;
    Ok(size_ret)
}

/// Run the full probe-then-allocate-then-fill sequence and return the value
/// bytes. A zero-length value (e.g. an empty token array) returns an empty
/// vector without a second boundary call.
pub(crate) fn read_two_phase(call: &mut QueryCall<'_>, op: &'static str) -> Result<Vec<u8>> {
    let size = probe(call, op)?;
    if size == 0 {
        return Ok(Vec::new());
    }

    let mut buf = vec![0u8; size];
    let written = fill_into(call, &mut buf, op)?;
    if written != size {
        return Err(QdapError::DecodeError(format!(
            "'{op}' probe reported {size} bytes but fill wrote {written}"
        )));
    }
    Ok(buf)
}

// ---------------------------------------------------------------------------
// Wire-format decoders
// ---------------------------------------------------------------------------

/// Decode a NUL-terminated C string property value.
pub(crate) fn decode_cstring(buf: &[u8], op: &'static str) -> Result<String> {
    let s = std::ffi::CStr::from_bytes_until_nul(buf)
        .map_err(|_| QdapError::DecodeError(format!("'{op}': missing NUL terminator")))?
        .to_str()
        .map_err(|e| QdapError::DecodeError(format!("'{op}': invalid UTF-8: {e}")))?
        .to_string();
    Ok(s)
}

/// Decode a buffer of consecutive NUL-terminated strings.
pub(crate) fn decode_cstring_list(buf: &[u8], op: &'static str) -> Result<Vec<String>> {
    let mut out = Vec::new();
    let mut rest = buf;
    while !rest.is_empty() {
        let nul = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| QdapError::DecodeError(format!("'{op}': unterminated string")))?;
        let s = std::str::from_utf8(&rest[..nul])
            .map_err(|e| QdapError::DecodeError(format!("'{op}': invalid UTF-8: {e}")))?;
        out.push(s.to_string());
        rest = &rest[nul + 1..];
    }
    Ok(out)
}

macro_rules! decode_scalar {
    ($name:ident, $ty:ty) => {
        pub(crate) fn $name(buf: &[u8], op: &'static str) -> Result<$ty> {
            const N: usize = std::mem::size_of::<$ty>();
            if buf.len() < N {
                return Err(QdapError::DecodeError(format!(
                    "'{op}': expected {N} bytes for {}, got {}",
                    stringify!($ty),
                    buf.len()
                )));
            }
            let bytes: [u8; N] = buf[..N].try_into().expect("length checked above");
            Ok(<$ty>::from_ne_bytes(bytes))
        }
    };
}

decode_scalar!(decode_usize, usize);
decode_scalar!(decode_u64, u64);
decode_scalar!(decode_f64, f64);
decode_scalar!(decode_i32, i32);

/// Decode a flat array of opaque pointer-sized tokens.
pub(crate) fn decode_tokens(buf: &[u8], op: &'static str) -> Result<Vec<usize>> {
    let word = std::mem::size_of::<usize>();
    if buf.len() % word != 0 {
        return Err(QdapError::DecodeError(format!(
            "'{op}': buffer length {} not a multiple of token size {word}",
            buf.len()
        )));
    }
    Ok(buf
        .chunks_exact(word)
        .map(|c| usize::from_ne_bytes(c.try_into().expect("chunk is word-sized")))
        .collect())
}

/// Decode a flat sequence of token pairs `[a0, b0, a1, b1, ...]`.
pub(crate) fn decode_token_pairs(buf: &[u8], op: &'static str) -> Result<Vec<(usize, usize)>> {
    let tokens = decode_tokens(buf, op)?;
    if tokens.len() % 2 != 0 {
        return Err(QdapError::DecodeError(format!(
            "'{op}': odd token count {} in pair sequence",
            tokens.len()
        )));
    }
    Ok(tokens.chunks_exact(2).map(|p| (p[0], p[1])).collect())
}

/// Decode an array of `i32` codes (e.g. the supported-program-format list).
pub(crate) fn decode_i32_array(buf: &[u8], op: &'static str) -> Result<Vec<i32>> {
    if buf.len() % 4 != 0 {
        return Err(QdapError::DecodeError(format!(
            "'{op}': buffer length {} not a multiple of 4",
            buf.len()
        )));
    }
    Ok(buf
        .chunks_exact(4)
        .map(|c| i32::from_ne_bytes(c.try_into().expect("chunk is 4 bytes")))
        .collect())
}
