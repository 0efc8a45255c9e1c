use super::commands::SysexHandler;
use super::parser::SysexParser;
use crate::debugln::debugln;
use parse_midi::Cable;

pub const DEFAULT_TIMEOUT_MS: u16 = 1000;

/** Aborts frames whose sender went quiet, e.g. because the cable was pulled mid-message.
  *
  * Call [`SysexWatchdog::tick`] periodically with the time elapsed since the last call. */
pub struct SysexWatchdog {
	timeout_ms: u16,
	last_activity: [Option<u32>; Cable::COUNT],
	idle_ms: [u16; Cable::COUNT],
}

impl Default for SysexWatchdog {
	fn default() -> SysexWatchdog {
		SysexWatchdog::new(DEFAULT_TIMEOUT_MS)
	}
}

impl SysexWatchdog {
	pub const fn new(timeout_ms: u16) -> SysexWatchdog {
		SysexWatchdog {
			timeout_ms,
			last_activity: [None; Cable::COUNT],
			idle_ms: [0; Cable::COUNT],
		}
	}

	pub fn tick<H: SysexHandler + ?Sized, const PORTS: usize>(&mut self, elapsed_ms: u16, parser: &mut SysexParser<PORTS>, handler: &mut H) {
		for index in 0..Cable::COUNT {
			let cable = Cable::new(index as u8);
			let activity = parser.activity(cable);

			if !parser.in_progress(cable) || activity != self.last_activity[index] {
				self.last_activity[index] = activity;
				self.idle_ms[index] = 0;
				continue;
			}

			self.idle_ms[index] = self.idle_ms[index].saturating_add(elapsed_ms);
			if self.idle_ms[index] >= self.timeout_ms {
				debugln!("sysex: timeout on cable {}", index);
				parser.abort(cable, handler);
				self.idle_ms[index] = 0;
			}
		}
	}
}
