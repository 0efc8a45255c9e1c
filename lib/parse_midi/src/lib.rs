#![no_std]

/*! Conversion between serial MIDI bytes and 4-byte USB-MIDI event packets.
  *
  * A packet is `[cable << 4 | code_index, byte0, byte1, byte2]`. The code index
  * number (the low nibble of the first byte) decides how many of the three data
  * bytes carry MIDI data, see [`payload_length`]. */

/** Number of meaningful data bytes, indexed by the packet's code index number.
  *
  * Channel voice packets (0x8..=0xE) expose their status and first data byte to
  * the byte stream; only SysEx and system common packets are forwarded in full. */
pub const PAYLOAD_LENGTH: [u8; 16] = [0, 0, 2, 3, 3, 1, 2, 3, 2, 2, 2, 2, 2, 2, 2, 1];

pub const CIN_SYSTEM_COMMON_2: u8 = 0x2;
pub const CIN_SYSTEM_COMMON_3: u8 = 0x3;
pub const CIN_SYSEX_CONTINUE: u8 = 0x4;
pub const CIN_SYSEX_END_1: u8 = 0x5;
pub const CIN_SYSEX_END_2: u8 = 0x6;
pub const CIN_SYSEX_END_3: u8 = 0x7;
pub const CIN_SINGLE_BYTE: u8 = 0xF;

pub fn is_realtime(byte: u8) -> bool {
	return byte & 0xF8 == 0xF8;
}
fn is_system_common(byte: u8) -> bool {
	return byte & 0xF8 == 0xF0 && byte != 0xF0;
}
fn is_start_of_sysex(byte: u8) -> bool {
	return byte == 0xF0;
}
fn is_channel(byte: u8) -> bool {
	return is_status(byte) && byte & 0xF0 != 0xF0;
}
pub fn is_status(byte: u8) -> bool {
	return byte & 0x80 != 0;
}

/** Total length of a message (status included) started by `status`. */
fn message_length(status: u8) -> u8 {
	match status {
		0x80..=0xBF | 0xE0..=0xEF => 3,
		0xC0..=0xDF => 2,
		0xF0 => 3, // sysex is chopped into 3 byte chunks
		0xF1 | 0xF3 => 2,
		0xF2 | 0xF4 | 0xF5 => 3, // F4 and F5 are undefined, treat them like song position
		_ => 1,
	}
}

fn code_index(status: u8, datalen: u8, sysex_ends: bool) -> Option<u8> {
	if is_start_of_sysex(status) {
		match (sysex_ends, datalen) {
			(true, 1) => Some(CIN_SYSEX_END_1),
			(true, 2) => Some(CIN_SYSEX_END_2),
			(true, 3) => Some(CIN_SYSEX_END_3),
			(false, 3) => Some(CIN_SYSEX_CONTINUE),
			_ => None
		}
	}
	else if is_system_common(status) {
		match datalen {
			1 => Some(CIN_SYSEX_END_1),
			2 => Some(CIN_SYSTEM_COMMON_2),
			3 => Some(CIN_SYSTEM_COMMON_3),
			_ => None
		}
	}
	else if is_realtime(status) {
		Some(CIN_SINGLE_BYTE)
	}
	else if is_channel(status) {
		Some(status >> 4)
	}
	else {
		None
	}
}

/** Number of data bytes carried by a packet whose first byte is `firstbyte`. */
pub fn payload_length(firstbyte: u8) -> u8 {
	return PAYLOAD_LENGTH[(firstbyte & 0x0F) as usize];
}

/** A virtual MIDI port multiplexed over one USB endpoint (0..=15). */
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, PartialOrd, Ord, Hash)]
pub struct Cable(u8);

impl Cable {
	pub const COUNT: usize = 16;

	/** Only the low nibble is kept. */
	pub const fn new(index: u8) -> Cable {
		Cable(index & 0x0F)
	}

	pub const fn index(&self) -> u8 {
		self.0
	}
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct UsbMidiPacket([u8; 4]);

impl UsbMidiPacket {
	pub const fn from_bytes(bytes: [u8; 4]) -> UsbMidiPacket {
		UsbMidiPacket(bytes)
	}

	pub fn new(cable: Cable, code_index: u8, data: [u8; 3]) -> UsbMidiPacket {
		UsbMidiPacket([(cable.index() << 4) | (code_index & 0x0F), data[0], data[1], data[2]])
	}

	/** A single byte packet, as used for realtime messages. */
	pub fn single_byte(cable: Cable, byte: u8) -> UsbMidiPacket {
		UsbMidiPacket::new(cable, CIN_SINGLE_BYTE, [byte, 0, 0])
	}

	/** The packet as one 32 bit word, byte 0 being the least significant one. */
	pub fn from_u32(word: u32) -> UsbMidiPacket {
		UsbMidiPacket(word.to_le_bytes())
	}

	pub fn to_u32(&self) -> u32 {
		u32::from_le_bytes(self.0)
	}

	pub fn cable(&self) -> Cable {
		Cable::new(self.0[0] >> 4)
	}

	pub fn with_cable(mut self, cable: Cable) -> UsbMidiPacket {
		self.0[0] = (cable.index() << 4) | (self.0[0] & 0x0F);
		self
	}

	pub fn code_index(&self) -> u8 {
		self.0[0] & 0x0F
	}

	pub fn bytes(&self) -> [u8; 4] {
		self.0
	}

	pub fn data(&self) -> [u8; 3] {
		[self.0[1], self.0[2], self.0[3]]
	}

	/** The valid data bytes, in stream order. */
	pub fn payload(&self) -> &[u8] {
		&self.0[1..1 + payload_length(self.0[0]) as usize]
	}

	pub fn is_realtime(&self) -> bool {
		self.code_index() == CIN_SINGLE_BYTE && is_realtime(self.0[1])
	}

	pub fn is_sysex(&self) -> bool {
		match self.code_index() {
			CIN_SYSEX_CONTINUE | CIN_SYSEX_END_2 | CIN_SYSEX_END_3 => true,
			CIN_SYSEX_END_1 => self.0[1] == 0xF7,
			_ => false
		}
	}
}

impl From<[u8; 4]> for UsbMidiPacket {
	fn from(bytes: [u8; 4]) -> UsbMidiPacket {
		UsbMidiPacket(bytes)
	}
}

impl From<UsbMidiPacket> for [u8; 4] {
	fn from(packet: UsbMidiPacket) -> [u8; 4] {
		packet.0
	}
}

/** Turns a serial MIDI byte stream into USB-MIDI packets for one cable.
  *
  * Handles running status, SysEx chunking (start/continue packets of three bytes,
  * end packets of one to three) and realtime bytes, which are passed through
  * immediately without disturbing a message in progress. */
pub struct UsbPacketizer {
	cable: Cable,
	status: u8,
	data: [u8; 3],
	datalen: u8
}

impl Default for UsbPacketizer {
	fn default() -> UsbPacketizer {
		UsbPacketizer::new(Cable::new(0))
	}
}

impl UsbPacketizer {
	pub fn new(cable: Cable) -> UsbPacketizer {
		UsbPacketizer {
			cable,
			status: 0,
			data: [0; 3],
			datalen: 0
		}
	}

	pub fn cable(&self) -> Cable {
		self.cable
	}

	/** Forgets any partially collected message. */
	pub fn reset(&mut self) {
		self.status = 0;
		self.data = [0; 3];
		self.datalen = 0;
	}

	fn packet(&self, code_index: u8) -> UsbMidiPacket {
		UsbMidiPacket::new(self.cable, code_index, self.data)
	}

	pub fn push(&mut self, byte: u8) -> Option<UsbMidiPacket> {
		let mut result = None;

		if is_status(byte) {
			if is_realtime(byte) {
				return Some(UsbMidiPacket::single_byte(self.cable, byte));
			}
			if byte == 0xF6 { // tune request stands alone and does not end a sysex
				return Some(UsbMidiPacket::new(self.cable, CIN_SYSEX_END_1, [byte, 0, 0]));
			}

			if self.status == 0xF0 { // a sysex has ended
				// insert end-of-sysex, regardless of whether this was an EOX or a different status byte
				self.data[self.datalen as usize] = 0xF7;
				self.datalen += 1;
				result = code_index(0xF0, self.datalen, true).map(|cin| self.packet(cin));
			}

			self.status = byte;
			self.data = [byte, 0, 0];
			self.datalen = 1;

			if byte == 0xF7 { // "end-of-sysex" is not a valid running status
				self.reset();
				return result;
			}
		}
		else {
			if self.status == 0 { // no status seen yet
				return None;
			}
			if self.datalen == 0 && self.status != 0xF0 { // running status
				self.data[0] = self.status;
				self.datalen = 1;
			}
			self.data[self.datalen as usize] = byte;
			self.datalen += 1;
		}

		if self.datalen >= message_length(self.status) {
			result = code_index(self.status, self.datalen, false).map(|cin| self.packet(cin));
			self.datalen = 0;
			self.data = [0; 3];
			if !is_channel(self.status) && self.status != 0xF0 {
				self.status = 0; // system common messages do not establish running status
			}
		}
		return result;
	}
}
