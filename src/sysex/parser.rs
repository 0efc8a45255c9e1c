use super::commands::{CmdState, SysexHandler};
use super::config::SysexConfig;
use super::encoder::{Responder, SysexEncoder};
use crate::debugln::{debugln, verboseln};
use crate::transport::PacketSink;
use parse_midi::{is_realtime, Cable, UsbMidiPacket};

/** Where a port stands in recognizing a frame. */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
	AwaitHeader,
	/** This many header bytes have matched so far. */
	InHeader(u8),
	/** Header and device id matched. */
	InMessage { command_received: bool },
}

#[derive(Debug, Clone, Copy, Default)]
struct PortState {
	my_sysex: bool,
	cmd: bool,
	ctr: u8,
	activity: u32,
}

impl PortState {
	fn in_progress(&self) -> bool {
		self.my_sysex || self.ctr > 0
	}

	fn reset(&mut self) {
		*self = PortState { activity: self.activity, ..PortState::default() };
	}
}

/** Recognizes `<header> <device id> <command> <payload...> F7` frames in a serial
  * byte stream and hands the command part to a [`SysexHandler`].
  *
  * `PORTS` state slots are kept, one per cable starting at cable 0; bytes from
  * cables without a slot are ignored. With a single slot all cables share it: once a
  * cable has matched a full header it owns the parser until its message ends, and
  * bytes from other cables are dropped meanwhile.
  *
  * Matching is strictly positional. A byte that does not fit the header at the
  * current position resets the port and is not looked at again, so a sequence that
  * partially matched stays out of sync until the next `F0`. */
pub struct SysexParser<const PORTS: usize = 16> {
	config: SysexConfig,
	encoder: SysexEncoder,
	states: [PortState; PORTS],
	locked: Option<Cable>,
}

impl<const PORTS: usize> SysexParser<PORTS> {
	pub fn new(config: SysexConfig) -> SysexParser<PORTS> {
		SysexParser {
			encoder: SysexEncoder::new(&config),
			config,
			states: [PortState::default(); PORTS],
			locked: None,
		}
	}

	pub fn config(&self) -> &SysexConfig {
		&self.config
	}

	/** Encoder framing with this parser's header and device id. */
	pub fn encoder(&self) -> &SysexEncoder {
		&self.encoder
	}

	fn slot(&self, cable: Cable) -> Option<usize> {
		if let Some(owner) = self.locked {
			if owner != cable {
				return None;
			}
		}
		if PORTS == 1 {
			return Some(0);
		}
		let index = cable.index() as usize;
		if index < PORTS {
			Some(index)
		} else {
			None
		}
	}

	fn reset_slot(&mut self, slot: usize) {
		self.states[slot].reset();
		if PORTS == 1 {
			self.locked = None;
		}
	}

	/** Feeds one byte received on `cable`. Replies (acknowledges, disacknowledges) go to `sink`. */
	pub fn feed<H: SysexHandler + ?Sized>(&mut self, cable: Cable, byte: u8, handler: &mut H, sink: &mut dyn PacketSink) {
		if is_realtime(byte) {
			return;
		}
		let slot = match self.slot(cable) {
			Some(slot) => slot,
			None => return,
		};

		let state = &mut self.states[slot];
		state.activity = state.activity.wrapping_add(1);

		if !state.my_sysex {
			let header = self.config.header.as_slice();
			let position = state.ctr as usize;
			let matched = if position < header.len() {
				byte == header[position]
			} else {
				self.config.matches_device_id(byte)
			};

			if !matched {
				if state.ctr > 0 {
					verboseln!("sysex: header mismatch at {} on cable {}: {:02X}", position, cable.index(), byte);
				}
				state.reset();
			}
			else if position < header.len() {
				state.ctr += 1;
			}
			else {
				state.my_sysex = true;
				state.ctr = 0;
				if PORTS == 1 {
					self.locked = Some(cable);
				}
			}
			return;
		}

		if byte >= 0x80 {
			let command_received = state.cmd;
			self.reset_slot(slot);

			if byte == 0xF7 {
				if command_received {
					self.dispatch(slot, cable, CmdState::End, byte, handler, sink);
				}
			}
			else if command_received {
				debugln!("sysex: message on cable {} cut short by {:02X}", cable.index(), byte);
				handler.aborted(cable);
			}
			return;
		}

		let cmd_state = if state.cmd {
			CmdState::Continue
		} else {
			state.cmd = true;
			CmdState::Begin
		};
		self.dispatch(slot, cable, cmd_state, byte, handler, sink);
	}

	fn dispatch<H: SysexHandler + ?Sized>(&mut self, slot: usize, cable: Cable, state: CmdState, byte: u8, handler: &mut H, sink: &mut dyn PacketSink) {
		let mut reply = Responder::new(&self.encoder, sink, cable);
		if let Err(reason) = handler.command(cable, state, byte, &mut reply) {
			debugln!("sysex: command on cable {} rejected: {:?}", cable.index(), reason);
			reply.disack(reason).ok();
			self.reset_slot(slot);
		}
	}

	/** Feeds the valid bytes of a received packet, tagged with the packet's cable. */
	pub fn feed_packet<H: SysexHandler + ?Sized>(&mut self, packet: UsbMidiPacket, handler: &mut H, sink: &mut dyn PacketSink) {
		for byte in packet.payload() {
			self.feed(packet.cable(), *byte, handler, sink);
		}
	}

	/** Drops whatever `cable` has in progress, as a header mismatch would. Handlers
	  * hear about it through [`SysexHandler::aborted`] if a command had begun. */
	pub fn abort<H: SysexHandler + ?Sized>(&mut self, cable: Cable, handler: &mut H) {
		let slot = match self.slot(cable) {
			Some(slot) => slot,
			None => return,
		};
		let state = self.states[slot];
		if !state.in_progress() {
			return;
		}

		debugln!("sysex: aborting cable {}", cable.index());
		self.reset_slot(slot);
		if state.cmd {
			handler.aborted(cable);
		}
	}

	pub fn state(&self, cable: Cable) -> ParserState {
		let state = match self.slot(cable) {
			Some(slot) => self.states[slot],
			None => return ParserState::AwaitHeader,
		};

		if state.my_sysex {
			ParserState::InMessage { command_received: state.cmd }
		}
		else if state.ctr > 0 {
			ParserState::InHeader(state.ctr)
		}
		else {
			ParserState::AwaitHeader
		}
	}

	pub fn in_progress(&self, cable: Cable) -> bool {
		match self.slot(cable) {
			Some(slot) => self.states[slot].in_progress(),
			None => false,
		}
	}

	/** Wrapping count of the bytes the port has seen. Realtime bytes do not count. */
	pub fn activity(&self, cable: Cable) -> Option<u32> {
		self.slot(cable).map(|slot| self.states[slot].activity)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::sysex::commands::PayloadCollector;
	use crate::sysex::config::{DeviceIdMatch, BROADCAST_DEVICE_ID};
	use crate::sysex::encoder::DisackReason;
	use crate::testing::RecordingSink;
	use rand_core::RngCore;
	use std::vec::Vec;

	const ID: u8 = 0x17;

	#[derive(Default)]
	struct Recorder {
		calls: Vec<(Cable, CmdState, u8)>,
		aborts: Vec<Cable>,
		reject: Option<u8>,
	}

	impl SysexHandler for Recorder {
		fn command(&mut self, cable: Cable, state: CmdState, byte: u8, _reply: &mut Responder) -> Result<(), DisackReason> {
			if state == CmdState::Begin && Some(byte) == self.reject {
				return Err(DisackReason::InvalidCommand);
			}
			self.calls.push((cable, state, byte));
			Ok(())
		}

		fn aborted(&mut self, cable: Cable) {
			self.aborts.push(cable);
		}
	}

	fn frame(command: u8, payload: &[u8]) -> Vec<u8> {
		let mut frame = std::vec![0xF0, 0x00, 0x00, 0x7E, ID, command];
		frame.extend_from_slice(payload);
		frame.push(0xF7);
		frame
	}

	fn feed_all<const P: usize>(parser: &mut SysexParser<P>, cable: Cable, input: &[u8], handler: &mut dyn SysexHandler, sink: &mut RecordingSink) {
		for byte in input {
			parser.feed(cable, *byte, &mut *handler, sink);
		}
	}

	fn parser() -> SysexParser {
		SysexParser::new(SysexConfig::new(ID))
	}

	#[test]
	fn dispatches_begin_continue_end() {
		let mut parser = parser();
		let mut recorder = Recorder::default();
		let mut sink = RecordingSink::default();
		let cable = Cable::new(0);

		feed_all(&mut parser, cable, &frame(0x01, &[0x10, 0x11]), &mut recorder, &mut sink);

		assert_eq!(recorder.calls, [
			(cable, CmdState::Begin, 0x01),
			(cable, CmdState::Continue, 0x10),
			(cable, CmdState::Continue, 0x11),
			(cable, CmdState::End, 0xF7),
		]);
		assert_eq!(parser.state(cable), ParserState::AwaitHeader);
		assert!(sink.packets.is_empty());
	}

	#[test]
	fn tracks_header_progress() {
		let mut parser = parser();
		let mut recorder = Recorder::default();
		let mut sink = RecordingSink::default();
		let cable = Cable::new(0);

		feed_all(&mut parser, cable, &[0xF0, 0x00], &mut recorder, &mut sink);
		assert_eq!(parser.state(cable), ParserState::InHeader(2));
		feed_all(&mut parser, cable, &[0x00, 0x7E, ID], &mut recorder, &mut sink);
		assert_eq!(parser.state(cable), ParserState::InMessage { command_received: false });
		feed_all(&mut parser, cable, &[0x05], &mut recorder, &mut sink);
		assert_eq!(parser.state(cable), ParserState::InMessage { command_received: true });
	}

	#[test]
	fn early_terminator_is_an_empty_command() {
		let mut parser = parser();
		let mut collector = PayloadCollector::<4>::new();
		let mut sink = RecordingSink::default();

		feed_all(&mut parser, Cable::new(0), &frame(0x09, &[]), &mut collector, &mut sink);

		let completed = collector.take().unwrap();
		assert_eq!(completed.command, 0x09);
		assert!(completed.payload.is_empty());
	}

	#[test]
	fn terminator_without_command_dispatches_nothing() {
		let mut parser = parser();
		let mut recorder = Recorder::default();
		let mut sink = RecordingSink::default();

		feed_all(&mut parser, Cable::new(0), &[0xF0, 0x00, 0x00, 0x7E, ID, 0xF7], &mut recorder, &mut sink);
		assert!(recorder.calls.is_empty());
		assert!(recorder.aborts.is_empty());
		assert_eq!(parser.state(Cable::new(0)), ParserState::AwaitHeader);
	}

	#[test]
	fn ignores_other_device_ids() {
		let mut parser = parser();
		let mut collector = PayloadCollector::<8>::new();
		let mut sink = RecordingSink::default();

		let mut input = std::vec![0xF0, 0x00, 0x00, 0x7E, ID + 1, 0x01, 0x02, 0xF7];
		input.extend(frame(0x03, &[0x04]));
		feed_all(&mut parser, Cable::new(0), &input, &mut collector, &mut sink);

		assert_eq!(collector.completed(), 1);
		let completed = collector.take().unwrap();
		assert_eq!(completed.command, 0x03);
		assert_eq!(&completed.payload[..], &[0x04]);
	}

	#[test]
	fn realtime_bytes_are_transparent_anywhere() {
		let valid = frame(0x02, &[0x21, 0x22, 0x23]);
		for position in 0..=valid.len() {
			for realtime in 0xF8..=0xFF {
				let mut input = valid.clone();
				input.insert(position, realtime);

				let mut parser = parser();
				let mut collector = PayloadCollector::<8>::new();
				let mut sink = RecordingSink::default();
				feed_all(&mut parser, Cable::new(0), &input, &mut collector, &mut sink);

				assert_eq!(collector.completed(), 1, "{:02X} at {}", realtime, position);
				let completed = collector.take().unwrap();
				assert_eq!(completed.command, 0x02);
				assert_eq!(&completed.payload[..], &[0x21, 0x22, 0x23], "{:02X} at {}", realtime, position);
			}
		}
	}

	#[test]
	fn foreign_status_aborts_the_message() {
		let mut parser = parser();
		let mut recorder = Recorder::default();
		let mut sink = RecordingSink::default();
		let cable = Cable::new(4);

		feed_all(&mut parser, cable, &[0xF0, 0x00, 0x00, 0x7E, ID, 0x01, 0x10, 0x90, 0x40, 0x7F, 0xF7], &mut recorder, &mut sink);

		assert_eq!(recorder.calls.len(), 2);
		assert!(!recorder.calls.iter().any(|(_, state, _)| *state == CmdState::End));
		assert_eq!(recorder.aborts, [cable]);
		assert_eq!(parser.state(cable), ParserState::AwaitHeader);
	}

	#[test]
	fn abort_resets_and_notifies() {
		let mut parser = parser();
		let mut recorder = Recorder::default();
		let mut sink = RecordingSink::default();
		let cable = Cable::new(1);

		feed_all(&mut parser, cable, &[0xF0, 0x00, 0x00], &mut recorder, &mut sink);
		parser.abort(cable, &mut recorder);
		assert_eq!(parser.state(cable), ParserState::AwaitHeader);
		assert!(recorder.aborts.is_empty());

		feed_all(&mut parser, cable, &[0xF0, 0x00, 0x00, 0x7E, ID, 0x01, 0x02], &mut recorder, &mut sink);
		parser.abort(cable, &mut recorder);
		assert_eq!(recorder.aborts, [cable]);

		// the rest of the interrupted frame is noise now
		feed_all(&mut parser, cable, &[0x03, 0xF7], &mut recorder, &mut sink);
		assert_eq!(recorder.calls.len(), 2);
	}

	#[test]
	fn rejected_command_gets_a_disack() {
		let mut parser = parser();
		let mut recorder = Recorder { reject: Some(0x55), ..Recorder::default() };
		let mut sink = RecordingSink::default();

		feed_all(&mut parser, Cable::new(2), &frame(0x55, &[0x01, 0x02]), &mut recorder, &mut sink);

		assert_eq!(sink.bytes(), [0xF0, 0x00, 0x00, 0x7E, ID, 0x0E, 0x0C, 0xF7]);
		assert!(sink.packets.iter().all(|p| p.cable() == Cable::new(2)));
		assert!(recorder.calls.is_empty());
		assert_eq!(parser.state(Cable::new(2)), ParserState::AwaitHeader);
	}

	#[test]
	fn broadcast_id_follows_policy() {
		let mut broadcast = frame(0x01, &[]);
		broadcast[4] = BROADCAST_DEVICE_ID;

		let mut strict = parser();
		let mut collector = PayloadCollector::<4>::new();
		let mut sink = RecordingSink::default();
		feed_all(&mut strict, Cable::new(0), &broadcast, &mut collector, &mut sink);
		assert_eq!(collector.completed(), 0);

		let mut open: SysexParser = SysexParser::new(SysexConfig::new(ID).with_device_id_match(DeviceIdMatch::AcceptBroadcast));
		feed_all(&mut open, Cable::new(0), &broadcast, &mut collector, &mut sink);
		feed_all(&mut open, Cable::new(0), &frame(0x01, &[]), &mut collector, &mut sink);
		assert_eq!(collector.completed(), 2);
	}

	#[test]
	fn ports_are_independent() {
		let mut parser = parser();
		let mut recorder = Recorder::default();
		let mut sink = RecordingSink::default();
		let a = frame(0x01, &[0x0A]);
		let b = frame(0x02, &[0x0B]);

		for (x, y) in a.iter().zip(b.iter()) {
			parser.feed(Cable::new(0), *x, &mut recorder, &mut sink);
			parser.feed(Cable::new(9), *y, &mut recorder, &mut sink);
		}

		let ends: Vec<Cable> = recorder.calls.iter()
			.filter(|(_, state, _)| *state == CmdState::End)
			.map(|(cable, _, _)| *cable)
			.collect();
		assert_eq!(ends, [Cable::new(0), Cable::new(9)]);
	}

	#[test]
	fn cables_without_a_slot_are_ignored() {
		let mut parser: SysexParser<4> = SysexParser::new(SysexConfig::new(ID));
		let mut recorder = Recorder::default();
		let mut sink = RecordingSink::default();

		feed_all(&mut parser, Cable::new(4), &frame(0x01, &[]), &mut recorder, &mut sink);
		assert!(recorder.calls.is_empty());
		assert_eq!(parser.activity(Cable::new(4)), None);
		feed_all(&mut parser, Cable::new(3), &frame(0x01, &[]), &mut recorder, &mut sink);
		assert_eq!(recorder.calls.len(), 2);
	}

	#[test]
	fn single_slot_is_owned_until_the_message_ends() {
		let mut parser: SysexParser<1> = SysexParser::new(SysexConfig::new(ID));
		let mut collector = PayloadCollector::<8>::new();
		let mut sink = RecordingSink::default();
		let owner = Cable::new(3);
		let other = Cable::new(5);

		feed_all(&mut parser, owner, &[0xF0, 0x00, 0x00, 0x7E, ID, 0x01], &mut collector, &mut sink);
		feed_all(&mut parser, other, &frame(0x02, &[0x22]), &mut collector, &mut sink);
		assert!(!parser.in_progress(other));
		feed_all(&mut parser, owner, &[0x11, 0xF7], &mut collector, &mut sink);

		assert_eq!(collector.completed(), 1);
		let completed = collector.take().unwrap();
		assert_eq!((completed.cable, completed.command), (owner, 0x01));
		assert_eq!(&completed.payload[..], &[0x11]);

		feed_all(&mut parser, other, &frame(0x02, &[0x22]), &mut collector, &mut sink);
		assert_eq!(collector.take().map(|c| c.cable), Some(other));
	}

	#[test]
	fn feeds_packets_by_their_byte_count() {
		let mut parser = parser();
		let mut collector = PayloadCollector::<8>::new();
		let mut sink = RecordingSink::default();

		let packets = [
			UsbMidiPacket::from_bytes([0x14, 0xF0, 0x00, 0x00]),
			UsbMidiPacket::from_bytes([0x14, 0x7E, ID, 0x06]),
			// the unused bytes of an end packet must not reach the parser
			UsbMidiPacket::from_bytes([0x16, 0x01, 0xF7, 0x55]),
		];
		for packet in packets {
			parser.feed_packet(packet, &mut collector, &mut sink);
		}

		let completed = collector.take().unwrap();
		assert_eq!(completed.cable, Cable::new(1));
		assert_eq!(completed.command, 0x06);
		assert_eq!(&completed.payload[..], &[0x01]);
	}

	#[test]
	fn activity_counts_non_realtime_bytes() {
		let mut parser = parser();
		let mut recorder = Recorder::default();
		let mut sink = RecordingSink::default();

		feed_all(&mut parser, Cable::new(0), &[0xF0, 0xF8, 0x00, 0xFE], &mut recorder, &mut sink);
		assert_eq!(parser.activity(Cable::new(0)), Some(2));
		assert_eq!(parser.activity(Cable::new(1)), Some(0));
	}

	#[test]
	fn withstands_garbage_input() {
		let mut rng = rand_pcg::Pcg32::new(0xcafef00dd15ea5e5, 0xa02bdbf7bb3c0a7);
		let mut parser = parser();
		let mut collector = PayloadCollector::<16>::new();
		let mut sink = RecordingSink::default();
		let cable = Cable::new(0);

		for round in 0..2000 {
			for _ in 0..64 {
				let byte = rng.next_u32() as u8;
				parser.feed(cable, byte, &mut collector, &mut sink);
			}
			// any non-realtime status byte other than F0 ends whatever was going on
			parser.feed(cable, 0xF7, &mut collector, &mut sink);
			assert_eq!(parser.state(cable), ParserState::AwaitHeader);

			let payload = [(round & 0x7F) as u8, 0x11];
			feed_all(&mut parser, cable, &frame(0x01, &payload), &mut collector, &mut sink);
			let completed = collector.take().unwrap();
			assert_eq!(completed.command, 0x01);
			assert_eq!(&completed.payload[..], &payload);
		}
	}
}
