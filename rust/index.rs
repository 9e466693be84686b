//! Exact integer index arithmetic shared by the scalar and packed kernels.
//!
//! Everything here works on signed [`Coord`] values: crop and padding offsets
//! make intermediate coordinates negative before they are range-checked, so
//! division and remainder follow floor semantics rather than truncation.

/// Integer type of every coordinate, extent, stride and linear index.
///
/// Wide enough for `max(shape) ^ rank` on any tensor that fits in memory.
pub type Coord = i64;

/// Floor division.
///
/// For a positive divisor this rounds toward negative infinity, so
/// `floor_div(-1, 2) == -1` where `-1 / 2 == 0`.
///
/// # Panics
///
/// Panics if `b` is zero.
#[inline(always)]
pub fn floor_div(a: Coord, b: Coord) -> Coord {
    a.div_euclid(b)
}

/// Floor modulo, always in `[0, b)` for a positive divisor.
///
/// # Panics
///
/// Panics if `b` is zero.
#[inline(always)]
pub fn floor_mod(a: Coord, b: Coord) -> Coord {
    a.rem_euclid(b)
}

/// Row-major strides of `shape`, in elements.
///
/// The last stride is 1 and `strides[i] == strides[i + 1] * shape[i + 1]`.
pub fn row_major_strides<const N: usize>(shape: &[Coord; N]) -> [Coord; N] {
    let mut strides = [0; N];
    let mut stride = 1;
    for i in (0..N).rev() {
        strides[i] = stride;
        stride *= shape[i];
    }
    strides
}

/// Linear offset of a multi-index under the given strides.
#[inline]
pub fn linear_index<const N: usize>(index: &[Coord; N], strides: &[Coord; N]) -> Coord {
    index.iter().zip(strides).map(|(&i, &s)| i * s).sum()
}

/// Mixed-radix decomposition of `linear` against `shape`, innermost digit last.
///
/// The leading digit is reduced modulo its extent as well, so an index past
/// the end of the shape wraps instead of producing an out-of-range digit.
pub fn multi_index<const N: usize>(mut linear: Coord, shape: &[Coord; N]) -> [Coord; N] {
    let mut index = [0; N];
    for i in (0..N).rev() {
        index[i] = floor_mod(linear, shape[i]);
        linear = floor_div(linear, shape[i]);
    }
    index
}
