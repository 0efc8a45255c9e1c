use super::config::{SysexConfig, SysexHeader};
use crate::transport::{PacketSink, SendError};
use crate::debugln::debugln;
use parse_midi::{Cable, UsbMidiPacket, UsbPacketizer, CIN_SYSEX_END_1};
use spin::Mutex;

pub const CMD_DISACK: u8 = 0x0E;
pub const CMD_ACK: u8 = 0x0F;

/** Reason codes carried by a Disacknowledge reply. */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisackReason {
	LessBytesThanExpected,
	WrongChecksum,
	BankNotAvailable,
	ParameterNotAvailable,
	InvalidCommand,
	NoRamAccess,
	BufferTooSmall,
	WrongType,
}

impl DisackReason {
	pub fn code(self) -> u8 {
		match self {
			DisackReason::LessBytesThanExpected => 0x01,
			DisackReason::WrongChecksum => 0x03,
			DisackReason::BankNotAvailable => 0x0A,
			DisackReason::ParameterNotAvailable => 0x0B,
			DisackReason::InvalidCommand => 0x0C,
			DisackReason::NoRamAccess => 0x10,
			DisackReason::BufferTooSmall => 0x11,
			DisackReason::WrongType => 0x12,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeError {
	/** The command or a payload byte had its top bit set. Nothing was sent. */
	NotSevenBit(u8),
	/** The sink refused a packet. A frame that had already started was closed with a lone F7. */
	Send(SendError),
}

impl From<SendError> for EncodeError {
	fn from(error: SendError) -> EncodeError {
		EncodeError::Send(error)
	}
}

/** Frames commands as `<header> <device id> <command> <payload...> F7`. */
#[derive(Debug, Clone, Copy)]
pub struct SysexEncoder {
	header: SysexHeader,
	device_id: u8,
}

impl SysexEncoder {
	pub fn new(config: &SysexConfig) -> SysexEncoder {
		SysexEncoder {
			header: config.header,
			device_id: config.device_id(),
		}
	}

	pub fn device_id(&self) -> u8 {
		self.device_id
	}

	/** The serial byte sequence of one frame. Does not validate. */
	pub fn frame<'a>(&'a self, command: u8, payload: &'a [u8]) -> impl Iterator<Item = u8> + 'a {
		self.header.as_slice().iter().copied()
			.chain(core::iter::once(self.device_id))
			.chain(core::iter::once(command))
			.chain(payload.iter().copied())
			.chain(core::iter::once(0xF7))
	}

	/** Packetizes one frame for `cable` and hands the packets to `sink` in order.
	  *
	  * The exclusive borrow of `sink` is what keeps the frame contiguous; callers sharing
	  * a sink between tasks go through [`SysexEncoder::send_shared`]. If the sink fails
	  * after part of the frame went out, one attempt is made to terminate it with F7. */
	pub fn send(&self, sink: &mut dyn PacketSink, cable: Cable, command: u8, payload: &[u8]) -> Result<(), EncodeError> {
		if command >= 0x80 {
			return Err(EncodeError::NotSevenBit(command));
		}
		if let Some(byte) = payload.iter().find(|byte| **byte >= 0x80) {
			return Err(EncodeError::NotSevenBit(*byte));
		}

		let mut packetizer = UsbPacketizer::new(cable);
		let mut started = false;
		for byte in self.frame(command, payload) {
			if let Some(packet) = packetizer.push(byte) {
				if let Err(error) = sink.send_packet(packet) {
					if started {
						debugln!("sysex: send failed mid-frame on cable {}, closing it", cable.index());
						sink.send_packet(UsbMidiPacket::new(cable, CIN_SYSEX_END_1, [0xF7, 0, 0])).ok();
					}
					return Err(error.into());
				}
				started = true;
			}
		}
		Ok(())
	}

	pub fn send_ack(&self, sink: &mut dyn PacketSink, cable: Cable, arg: u8) -> Result<(), EncodeError> {
		self.send(sink, cable, CMD_ACK, &[arg])
	}

	pub fn send_disack(&self, sink: &mut dyn PacketSink, cable: Cable, reason: DisackReason) -> Result<(), EncodeError> {
		self.send(sink, cable, CMD_DISACK, &[reason.code()])
	}

	/** Like [`SysexEncoder::send`], holding the sink's lock for the whole frame. */
	pub fn send_shared<S: PacketSink>(&self, sink: &SharedSink<S>, cable: Cable, command: u8, payload: &[u8]) -> Result<(), EncodeError> {
		sink.lock(|sink| self.send(sink, cable, command, payload))
	}
}

/** A packet sink shared between tasks. Frames sent through it never interleave.
  *
  * This is a spinlock and never masks interrupts, so it must not be taken from an
  * interrupt handler that may have preempted a holder. */
pub struct SharedSink<S> {
	inner: Mutex<S>,
}

impl<S> SharedSink<S> {
	pub const fn new(sink: S) -> SharedSink<S> {
		SharedSink { inner: Mutex::new(sink) }
	}

	pub fn lock<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
		let mut guard = self.inner.lock();
		f(&mut *guard)
	}

	pub fn into_inner(self) -> S {
		self.inner.into_inner()
	}
}

/** Reply channel handed to command handlers, bound to the port the command came from. */
pub struct Responder<'a> {
	encoder: &'a SysexEncoder,
	sink: &'a mut dyn PacketSink,
	cable: Cable,
}

impl<'a> Responder<'a> {
	pub fn new(encoder: &'a SysexEncoder, sink: &'a mut dyn PacketSink, cable: Cable) -> Responder<'a> {
		Responder { encoder, sink, cable }
	}

	pub fn cable(&self) -> Cable {
		self.cable
	}

	pub fn send(&mut self, command: u8, payload: &[u8]) -> Result<(), EncodeError> {
		self.encoder.send(self.sink, self.cable, command, payload)
	}

	pub fn ack(&mut self, arg: u8) -> Result<(), EncodeError> {
		self.encoder.send_ack(self.sink, self.cable, arg)
	}

	pub fn disack(&mut self, reason: DisackReason) -> Result<(), EncodeError> {
		self.encoder.send_disack(self.sink, self.cable, reason)
	}
}
