//! Conversion between f32 and the 16-bit truncated encoding used for
//! bandwidth-sensitive cached reductions.
//!
//! The encoding keeps the high 16 bits of the IEEE-754 bit pattern (sign,
//! exponent, top mantissa bits) and discards the low 16 mantissa bits. It is
//! a cheap, rounding-free narrowing, *not* IEEE half precision and not bf16
//! rounding either; downstream numerics depend on this exact truncation.

/// Truncate an f32 to its high 16 bits.
#[inline]
pub fn encode_half(v: f32) -> u16 {
    (v.to_bits() >> 16) as u16
}

/// Expand a 16-bit half word back to f32 by zero-filling the low mantissa.
#[inline]
pub fn decode_half(h: u16) -> f32 {
    f32::from_bits((h as u32) << 16)
}

/// In-place conversion of a stage-in buffer: packs `buf.len()` half words
/// into the front of the buffer, front to back.
///
/// Half word `i` lands in the bytes of float `i / 2`, which has already been
/// read by the time it is overwritten, so the forward pass never clobbers an
/// unread element.
pub fn encode_slice_in_place(buf: &mut [f32]) {
    let base = buf.as_mut_ptr();
    let words = base as *mut u16;
    for i in 0..buf.len() {
        let h = encode_half(unsafe { base.add(i).read() });
        unsafe { words.add(i).write_unaligned(h) };
    }
}

/// Decode `out.len()` half words packed in the front of `packed` into `out`.
///
/// # Panics
/// Panics if `packed` does not hold at least `out.len()` half words.
pub fn decode_packed(packed: &[f32], out: &mut [f32]) {
    assert!(
        packed.len() * 2 >= out.len(),
        "packed buffer holds {} half words, need {}",
        packed.len() * 2,
        out.len()
    );
    let words = packed.as_ptr() as *const u16;
    for (i, slot) in out.iter_mut().enumerate() {
        *slot = decode_half(unsafe { words.add(i).read_unaligned() });
    }
}
