use super::encoder::{DisackReason, Responder};
use crate::debugln::debugln;
use heapless::Vec;
use parse_midi::Cable;

/** Position of a byte within the command part of a frame. */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmdState {
	/** The byte is the command byte. */
	Begin,
	/** The byte is a payload byte. */
	Continue,
	/** The byte is the terminating `F7`. */
	End,
}

/** Receives the command part of matching frames, one byte at a time.
  *
  * Returning an error makes the parser answer with a Disacknowledge carrying the
  * reason and drop the rest of the frame. */
pub trait SysexHandler {
	fn command(&mut self, cable: Cable, state: CmdState, byte: u8, reply: &mut Responder) -> Result<(), DisackReason>;

	/** A message that had begun was discarded before its `F7`. */
	fn aborted(&mut self, _cable: Cable) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableFull;

/** Routes each frame to the handler registered for its command byte. */
pub struct CommandTable<'a, const N: usize> {
	routes: Vec<(u8, &'a mut dyn SysexHandler), N>,
	active: [Option<usize>; Cable::COUNT],
}

impl<'a, const N: usize> Default for CommandTable<'a, N> {
	fn default() -> CommandTable<'a, N> {
		CommandTable::new()
	}
}

impl<'a, const N: usize> CommandTable<'a, N> {
	pub fn new() -> CommandTable<'a, N> {
		CommandTable {
			routes: Vec::new(),
			active: [None; Cable::COUNT],
		}
	}

	/** A later registration for the same command byte is never reached. */
	pub fn add(&mut self, command: u8, handler: &'a mut dyn SysexHandler) -> Result<(), TableFull> {
		self.routes.push((command, handler)).map_err(|_| TableFull)
	}
}

impl<const N: usize> SysexHandler for CommandTable<'_, N> {
	fn command(&mut self, cable: Cable, state: CmdState, byte: u8, reply: &mut Responder) -> Result<(), DisackReason> {
		let slot = cable.index() as usize;

		if state == CmdState::Begin {
			self.active[slot] = self.routes.iter().position(|(command, _)| *command == byte);
			if self.active[slot].is_none() {
				debugln!("sysex: unknown command {:02X} on cable {}", byte, cable.index());
				return Err(DisackReason::InvalidCommand);
			}
		}

		let index = match self.active[slot] {
			Some(index) => index,
			None => return Ok(()),
		};
		if state == CmdState::End {
			self.active[slot] = None;
		}

		let result = self.routes[index].1.command(cable, state, byte, reply);
		if result.is_err() {
			self.active[slot] = None;
		}
		result
	}

	fn aborted(&mut self, cable: Cable) {
		if let Some(index) = self.active[cable.index() as usize].take() {
			self.routes[index].1.aborted(cable);
		}
	}
}

/** Acknowledges every command it receives once its frame is complete. */
#[derive(Debug, Default)]
pub struct PingHandler {
	pings: u32,
}

impl PingHandler {
	pub fn pings(&self) -> u32 {
		self.pings
	}
}

impl SysexHandler for PingHandler {
	fn command(&mut self, _cable: Cable, state: CmdState, _byte: u8, reply: &mut Responder) -> Result<(), DisackReason> {
		if state == CmdState::End {
			self.pings = self.pings.wrapping_add(1);
			reply.ack(0x00).ok();
		}
		Ok(())
	}
}

/** Button/LED matrix dimensions announced by a remote unit. */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
	pub rows: u8,
	pub columns: u8,
	pub colours: u8,
}

#[derive(Debug, Clone, Copy, Default)]
struct LayoutProgress {
	bytes: [u8; 3],
	received: u8,
}

/** Collects `<rows> <columns> <colours>` records. Extra payload bytes are ignored. */
#[derive(Debug, Default)]
pub struct LayoutHandler {
	progress: [LayoutProgress; Cable::COUNT],
	layout: Option<(Cable, Layout)>,
}

impl LayoutHandler {
	pub fn layout(&self) -> Option<(Cable, Layout)> {
		self.layout
	}

	pub fn take_layout(&mut self) -> Option<(Cable, Layout)> {
		self.layout.take()
	}
}

impl SysexHandler for LayoutHandler {
	fn command(&mut self, cable: Cable, state: CmdState, byte: u8, reply: &mut Responder) -> Result<(), DisackReason> {
		let progress = &mut self.progress[cable.index() as usize];
		match state {
			CmdState::Begin => {
				*progress = LayoutProgress::default();
			}
			CmdState::Continue => {
				if (progress.received as usize) < progress.bytes.len() {
					progress.bytes[progress.received as usize] = byte;
					progress.received += 1;
				}
			}
			CmdState::End => {
				if (progress.received as usize) < progress.bytes.len() {
					return Err(DisackReason::LessBytesThanExpected);
				}
				let [rows, columns, colours] = progress.bytes;
				self.layout = Some((cable, Layout { rows, columns, colours }));
				reply.ack(0x00).ok();
			}
		}
		Ok(())
	}

	fn aborted(&mut self, cable: Cable) {
		self.progress[cable.index() as usize] = LayoutProgress::default();
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedCommand<const N: usize> {
	pub cable: Cable,
	pub command: u8,
	pub payload: Vec<u8, N>,
}

/** Accumulates the payload of one command at a time.
  *
  * A command beginning on another cable replaces the one in progress. */
#[derive(Debug, Default)]
pub struct PayloadCollector<const N: usize> {
	cable: Option<Cable>,
	command: u8,
	payload: Vec<u8, N>,
	last: Option<CompletedCommand<N>>,
	completed: usize,
}

impl<const N: usize> PayloadCollector<N> {
	pub fn new() -> PayloadCollector<N> {
		PayloadCollector {
			cable: None,
			command: 0,
			payload: Vec::new(),
			last: None,
			completed: 0,
		}
	}

	/** The most recent complete command, if not taken yet. */
	pub fn take(&mut self) -> Option<CompletedCommand<N>> {
		self.last.take()
	}

	/** Number of commands completed so far. */
	pub fn completed(&self) -> usize {
		self.completed
	}
}

impl<const N: usize> SysexHandler for PayloadCollector<N> {
	fn command(&mut self, cable: Cable, state: CmdState, byte: u8, _reply: &mut Responder) -> Result<(), DisackReason> {
		if state == CmdState::Begin {
			self.cable = Some(cable);
			self.command = byte;
			self.payload.clear();
			return Ok(());
		}
		if self.cable != Some(cable) {
			return Ok(());
		}

		match state {
			CmdState::Continue => {
				if self.payload.push(byte).is_err() {
					self.cable = None;
					return Err(DisackReason::BufferTooSmall);
				}
			}
			CmdState::End => {
				self.cable = None;
				self.last = Some(CompletedCommand {
					cable,
					command: self.command,
					payload: core::mem::take(&mut self.payload),
				});
				self.completed += 1;
			}
			CmdState::Begin => {}
		}
		Ok(())
	}

	fn aborted(&mut self, cable: Cable) {
		if self.cable == Some(cable) {
			self.cable = None;
		}
	}
}
