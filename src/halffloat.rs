/*
Copyright 2024 oceanbin developers

This file is part of oceanbin.

oceanbin is a free software: you can redistribute it and/or modify
it under the terms of the GNU General Public License as published by
the Free Software Foundation; either version 3 of the License, or
(at your option) any later version.

oceanbin is distributed in the hope that it will be useful,
but WITHOUT ANY WARRANTY; without even the implied warranty of
MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
GNU General Public License for more details.

You should have received a copy of the GNU General Public License
along with oceanbin. If not, see https://www.gnu.org/licenses/.
*/

//! Module with conversions between IEEE 754 half-precision
//! codes and single-precision floats.
//!
//! Half-precision is used purely as storage compression of daily
//! fields: codes are decoded to `f32` right after reading and all
//! computations are done in full precision.
//!
//! The bit-level conversion in [`decode`] does not depend on any
//! platform half-float support. With the `native-half` feature the
//! slice conversion uses the `half` crate instead, which is tested to
//! be bit-identical for all 65536 codes.

const SIGN_MASK: u32 = 0x8000;
const EXPONENT_MASK: u32 = 0x1F;
const FRACTION_MASK: u32 = 0x3FF;

const F32_INFINITY: u32 = 0x7F80_0000;
const F32_QUIET_NAN: u32 = 0x7FC0_0000;

/// Difference between single and half precision exponent biases.
const BIAS_DIFFERENCE: u32 = 127 - 15;

/// Decodes one half-precision code to `f32`.
///
/// Every code maps to a defined value: subnormals are normalised
/// into the `f32` exponent range, exponent 31 gives signed infinity
/// or a quiet NaN carrying the code fraction in its top bits.
pub fn decode(code: u16) -> f32 {
    let code = u32::from(code);

    let sign = (code & SIGN_MASK) << 16;
    let exponent = (code >> 10) & EXPONENT_MASK;
    let fraction = code & FRACTION_MASK;

    let bits = match (exponent, fraction) {
        (0, 0) => sign,
        (0, _) => {
            // shift leading fraction bit into the implicit position
            let shift = fraction.leading_zeros() - 21;
            let fraction = (fraction << shift) & FRACTION_MASK;
            let exponent = BIAS_DIFFERENCE + 1 - shift;

            sign | (exponent << 23) | (fraction << 13)
        }
        (EXPONENT_MASK, 0) => sign | F32_INFINITY,
        (EXPONENT_MASK, _) => sign | F32_QUIET_NAN | (fraction << 13),
        _ => sign | ((exponent + BIAS_DIFFERENCE) << 23) | (fraction << 13),
    };

    f32::from_bits(bits)
}

/// Encodes `f32` to the nearest half-precision code,
/// with ties rounded to even.
///
/// Values beyond the half-precision range become signed infinity,
/// values below half of the smallest subnormal become signed zero.
pub fn encode(value: f32) -> u16 {
    let bits = value.to_bits();

    let sign = (bits >> 16) & SIGN_MASK;
    let exponent = ((bits >> 23) & 0xFF) as i32;
    let mantissa = bits & 0x007F_FFFF;

    if exponent == 0xFF {
        if mantissa == 0 {
            return (sign | 0x7C00) as u16;
        }

        return (sign | 0x7E00 | (mantissa >> 13)) as u16;
    }

    let half_exponent = exponent - BIAS_DIFFERENCE as i32;

    if half_exponent >= EXPONENT_MASK as i32 {
        return (sign | 0x7C00) as u16;
    }

    if half_exponent <= 0 {
        if half_exponent < -10 {
            return sign as u16;
        }

        let mantissa = mantissa | 0x0080_0000;
        let shift = (14 - half_exponent) as u32;

        let code = round_to_nearest_even(mantissa >> shift, mantissa, shift);

        // a carry out of the fraction lands on the smallest normal
        return (sign | code) as u16;
    }

    let code = ((half_exponent as u32) << 10) | (mantissa >> 13);
    let code = round_to_nearest_even(code, mantissa, 13);

    // a carry into exponent 31 correctly yields infinity
    (sign | code) as u16
}

fn round_to_nearest_even(truncated: u32, mantissa: u32, shift: u32) -> u32 {
    let halfway = 1 << (shift - 1);
    let remainder = mantissa & ((1 << shift) - 1);

    if remainder > halfway || (remainder == halfway && truncated & 1 == 1) {
        truncated + 1
    } else {
        truncated
    }
}

/// Decodes a buffer of half-precision codes.
#[cfg(not(feature = "native-half"))]
pub fn decode_slice(codes: &[u16]) -> Vec<f32> {
    codes.iter().map(|&code| decode(code)).collect()
}

/// Decodes a buffer of half-precision codes.
#[cfg(feature = "native-half")]
pub fn decode_slice(codes: &[u16]) -> Vec<f32> {
    codes.iter().map(|&code| decode_native(code)).collect()
}

/// Decodes one code with the `half` crate conversion,
/// which uses hardware instructions when available.
#[cfg(feature = "native-half")]
pub fn decode_native(code: u16) -> f32 {
    half::f16::from_bits(code).to_f32()
}

/// Encodes a buffer of floats to half-precision codes.
pub fn encode_slice(values: &[f32]) -> Vec<u16> {
    values.iter().map(|&value| encode(value)).collect()
}

/// Largest absolute difference between finite `values`
/// and their encoded `codes` after decoding.
///
/// NaN cells (land) are skipped. A finite value that
/// overflowed to infinity gives an infinite error.
pub fn quantization_error(values: &[f32], codes: &[u16]) -> f32 {
    values
        .iter()
        .zip(codes)
        .filter(|(value, _)| value.is_finite())
        .map(|(&value, &code)| (f64::from(decode(code)) - f64::from(value)).abs() as f32)
        .fold(0.0, f32::max)
}
