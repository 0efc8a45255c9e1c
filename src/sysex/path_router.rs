/*! Hierarchical routing for commands whose payload starts with an address such as
  * `/seq/track/mute`, terminated by a zero byte.
  *
  * The tree is static; each leaf names the index of a handler attached to the
  * router. Once a leaf is reached the handler sees the command as if it had been
  * routed to it directly: `Begin` with the command byte, `Continue` for every
  * byte after the terminator, then `End`. */

use super::commands::{CmdState, SysexHandler, TableFull};
use super::encoder::{DisackReason, Responder};
use crate::debugln::debugln;
use heapless::Vec;
use parse_midi::Cable;

pub const MAX_SEGMENT_LEN: usize = 16;

#[derive(Debug, Clone, Copy)]
pub enum PathNode<'a> {
	Branch(&'a str, &'a [PathNode<'a>]),
	Leaf(&'a str, usize),
}

impl<'a> PathNode<'a> {
	fn segment(&self) -> &'a str {
		match self {
			PathNode::Branch(segment, _) => *segment,
			PathNode::Leaf(segment, _) => *segment,
		}
	}
}

enum Route<'a> {
	Idle,
	Walking { command: u8, level: &'a [PathNode<'a>], segment: Vec<u8, MAX_SEGMENT_LEN> },
	Routed(usize),
}

pub struct PathRouter<'a, const N: usize> {
	tree: &'a [PathNode<'a>],
	leaves: Vec<&'a mut dyn SysexHandler, N>,
	routes: [Route<'a>; Cable::COUNT],
}

impl<'a, const N: usize> PathRouter<'a, N> {
	pub fn new(tree: &'a [PathNode<'a>]) -> PathRouter<'a, N> {
		PathRouter {
			tree,
			leaves: Vec::new(),
			routes: core::array::from_fn(|_| Route::Idle),
		}
	}

	/** Handlers are numbered in the order they are attached, starting at 0. */
	pub fn attach(&mut self, handler: &'a mut dyn SysexHandler) -> Result<usize, TableFull> {
		let index = self.leaves.len();
		self.leaves.push(handler).map_err(|_| TableFull)?;
		Ok(index)
	}

	/** Looks up `segment` on `level`; `leaf` selects what kind of node must be found. */
	fn lookup(level: &'a [PathNode<'a>], segment: &[u8], leaf: bool) -> Option<PathNode<'a>> {
		level.iter()
			.find(|node| node.segment().as_bytes() == segment && matches!(node, PathNode::Leaf(..)) == leaf)
			.copied()
	}

	fn walk(&mut self, cable: Cable, byte: u8, reply: &mut Responder) -> Result<(), DisackReason> {
		let slot = cable.index() as usize;
		let (command, level, segment) = match &mut self.routes[slot] {
			Route::Walking { command, level, segment } => (*command, *level, segment),
			_ => return Ok(()),
		};

		match byte {
			b'/' => {
				if segment.is_empty() {
					return Ok(()); // leading or doubled separator
				}
				match Self::lookup(level, segment, false) {
					Some(PathNode::Branch(_, children)) => {
						self.routes[slot] = Route::Walking { command, level: children, segment: Vec::new() };
						Ok(())
					}
					_ => Err(DisackReason::InvalidCommand),
				}
			}
			0x00 => {
				let index = match Self::lookup(level, segment, true) {
					Some(PathNode::Leaf(_, index)) if index < self.leaves.len() => index,
					_ => return Err(DisackReason::InvalidCommand),
				};
				self.routes[slot] = Route::Routed(index);
				self.leaves[index].command(cable, CmdState::Begin, command, reply)
			}
			_ => segment.push(byte).map_err(|_| DisackReason::InvalidCommand),
		}
	}
}

impl<const N: usize> SysexHandler for PathRouter<'_, N> {
	fn command(&mut self, cable: Cable, state: CmdState, byte: u8, reply: &mut Responder) -> Result<(), DisackReason> {
		let slot = cable.index() as usize;

		let result = match (state, &self.routes[slot]) {
			(CmdState::Begin, _) => {
				self.routes[slot] = Route::Walking { command: byte, level: self.tree, segment: Vec::new() };
				Ok(())
			}
			(CmdState::Continue, Route::Walking { .. }) => self.walk(cable, byte, reply),
			(CmdState::Continue, Route::Routed(index)) => {
				let index = *index;
				self.leaves[index].command(cable, state, byte, reply)
			}
			(CmdState::End, Route::Walking { .. }) => Err(DisackReason::LessBytesThanExpected),
			(CmdState::End, Route::Routed(index)) => {
				let index = *index;
				self.routes[slot] = Route::Idle;
				self.leaves[index].command(cable, state, byte, reply)
			}
			(_, Route::Idle) => Ok(()),
		};

		if let Err(reason) = result {
			debugln!("sysex: path routing on cable {} failed: {:?}", cable.index(), reason);
			self.routes[slot] = Route::Idle;
		}
		result
	}

	fn aborted(&mut self, cable: Cable) {
		let slot = cable.index() as usize;
		if let Route::Routed(index) = self.routes[slot] {
			self.leaves[index].aborted(cable);
		}
		self.routes[slot] = Route::Idle;
	}
}
