/*! Carrying 8 bit data through SysEx payloads.
  *
  * Each group of up to 7 data bytes is preceded by one byte holding their top bits:
  * bit `i` of that byte is bit 7 of the group's `i`-th byte. The group bytes follow
  * with their top bit cleared. */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SevenBitError {
	BufferTooSmall,
	/** Packed data must not contain bytes with the top bit set. */
	NotSevenBit(u8),
}

/** Size of `len` data bytes once packed. */
pub const fn packed_len(len: usize) -> usize {
	len + (len + 6) / 7
}

/** Size of `len` packed bytes once unpacked. Includes a trailing group without data. */
pub const fn unpacked_len(len: usize) -> usize {
	len - (len + 7) / 8
}

/** Returns the number of bytes written to `output`. */
pub fn pack_7bit(input: &[u8], output: &mut [u8]) -> Result<usize, SevenBitError> {
	if output.len() < packed_len(input.len()) {
		return Err(SevenBitError::BufferTooSmall);
	}

	let mut written = 0;
	for group in input.chunks(7) {
		let mut msbs = 0;
		for (i, byte) in group.iter().enumerate() {
			msbs |= (byte >> 7) << i;
			output[written + 1 + i] = byte & 0x7F;
		}
		output[written] = msbs;
		written += 1 + group.len();
	}
	return Ok(written);
}

/** Returns the number of bytes written to `output`. */
pub fn unpack_7bit(input: &[u8], output: &mut [u8]) -> Result<usize, SevenBitError> {
	if let Some(byte) = input.iter().find(|byte| **byte >= 0x80) {
		return Err(SevenBitError::NotSevenBit(*byte));
	}
	if output.len() < unpacked_len(input.len()) {
		return Err(SevenBitError::BufferTooSmall);
	}

	let mut written = 0;
	for group in input.chunks(8) {
		let msbs = group[0];
		for (i, byte) in group[1..].iter().enumerate() {
			output[written] = byte | ((msbs >> i) & 1) << 7;
			written += 1;
		}
	}
	return Ok(written);
}
