//! Position-dependent XOR obfuscation over the post-header byte range
//! (`spec.md` §4.1).
//!
//! The transform is applied to the archive's single obfuscated region,
//! which begins at absolute file offset `0x14`. It is its own inverse, so
//! the same function serves both the parser (decrypt) and the assembler
//! (encrypt) — this mirrors the original engine's `fcn.004bdd70`, which
//! uses one routine for both directions.

/// Absolute file offset at which the obfuscated byte range begins. Every
/// offset stored in the archive is measured from the start of the file,
/// not from this point; translating between the two is centralized in
/// [`crate::archive`].
pub(crate) const OBFUSCATED_REGION_START: usize = 0x14;

/// Derives the effective key `K'` from the raw header key byte `K`
/// (`spec.md` §4.1). A key byte of `0` means "no obfuscation" and is
/// handled by the caller before this function is ever consulted.
#[must_use]
pub(crate) fn effective_key(key_byte: u8) -> u8 {
    (((key_byte >> 6) | (key_byte << 2)) & 0xFF) ^ 0xFF
}

/// Translates an absolute file offset into a position in the buffer that
/// begins at [`OBFUSCATED_REGION_START`]. The single accessor the design
/// note in `spec.md` §9 calls for; every other module reaches offsets
/// through this pair of functions rather than repeating the subtraction.
#[must_use]
pub(crate) fn offset_to_buffer_pos(offset: u32) -> usize {
    offset as usize - OBFUSCATED_REGION_START
}

#[must_use]
pub(crate) fn buffer_pos_to_offset(pos: usize) -> u32 {
    (pos + OBFUSCATED_REGION_START) as u32
}

/// Applies the obfuscation transform to `buffer` in place. `buffer` must
/// be the byte range starting at absolute file offset
/// [`OBFUSCATED_REGION_START`] — position `i` in `buffer` corresponds to
/// absolute file offset `i + OBFUSCATED_REGION_START`, and the position
/// byte `(i + 0x14) & 0xFF` used by the transform is always computed from
/// that absolute offset, never from a local subrange origin.
///
/// The transform is an involution: calling it twice on the same key
/// reproduces the original bytes.
pub(crate) fn transform(buffer: &mut [u8], key_byte: u8) {
    if key_byte == 0 {
        return;
    }
    let key = effective_key(key_byte);
    for (i, byte) in buffer.iter_mut().enumerate() {
        let position_byte = ((i + OBFUSCATED_REGION_START) & 0xFF) as u8;
        *byte = !(position_byte ^ key ^ *byte);
    }
}
