use crate::transport::{MidiEndpoint, PacketSink, SendError};
use parse_midi::UsbMidiPacket;
use std::collections::VecDeque;
use std::vec::Vec;
use usb_device::UsbError;

#[derive(Default)]
pub struct MockEndpoint {
	pub written: Vec<[u8; 4]>,
	pub transfers: usize,
	pub write_attempts: usize,
	pub would_block: bool,
	/** Makes every write fail with `InvalidState`. */
	pub fail: bool,
	incoming: VecDeque<Vec<u8>>,
}

impl MockEndpoint {
	/** Queues one OUT transfer. */
	pub fn queue_incoming(&mut self, packets: &[UsbMidiPacket]) {
		self.incoming.push_back(packets.iter().flat_map(|p| p.bytes()).collect());
	}

	/** OUT transfers the transport has not read yet. */
	pub fn unread_transfers(&self) -> usize {
		self.incoming.len()
	}
}

impl MidiEndpoint for MockEndpoint {
	fn write_packets(&mut self, data: &[u8]) -> Result<usize, UsbError> {
		self.write_attempts += 1;
		if self.fail {
			return Err(UsbError::InvalidState);
		}
		if self.would_block {
			return Err(UsbError::WouldBlock);
		}
		for chunk in data.chunks_exact(4) {
			self.written.push([chunk[0], chunk[1], chunk[2], chunk[3]]);
		}
		self.transfers += 1;
		Ok(data.len())
	}

	fn read_packets(&mut self, buffer: &mut [u8]) -> Result<usize, UsbError> {
		match self.incoming.pop_front() {
			Some(data) => {
				if data.len() > buffer.len() {
					return Err(UsbError::BufferOverflow);
				}
				buffer[..data.len()].copy_from_slice(&data);
				Ok(data.len())
			}
			None => Err(UsbError::WouldBlock),
		}
	}
}

/** Collects every packet handed to it. */
#[derive(Default)]
pub struct RecordingSink {
	pub packets: Vec<UsbMidiPacket>,
}

impl RecordingSink {
	/** The serial byte stream the packets stand for. */
	pub fn bytes(&self) -> Vec<u8> {
		self.packets.iter().flat_map(|p| p.payload().to_vec()).collect()
	}
}

impl PacketSink for RecordingSink {
	fn send_packet(&mut self, packet: UsbMidiPacket) -> Result<(), SendError> {
		self.packets.push(packet);
		Ok(())
	}
}
