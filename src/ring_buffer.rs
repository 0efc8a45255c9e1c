use core::cell::RefCell;
use critical_section::Mutex;
use parse_midi::UsbMidiPacket;

struct Ring<const N: usize> {
	packets: [UsbMidiPacket; N],
	head: usize,
	tail: usize,
	count: usize
}

/** Fixed capacity FIFO of USB-MIDI packets.
  *
  * Every update of head, tail and count happens inside a critical section, so one
  * side may live in an interrupt handler while the other one runs in a task.
  * The full condition is `len() == N`; all N slots are usable. */
pub struct PacketRingBuffer<const N: usize> {
	inner: Mutex<RefCell<Ring<N>>>
}

impl<const N: usize> Default for PacketRingBuffer<N> {
	fn default() -> PacketRingBuffer<N> {
		PacketRingBuffer::new()
	}
}

impl<const N: usize> PacketRingBuffer<N> {
	pub const fn new() -> PacketRingBuffer<N> {
		PacketRingBuffer {
			inner: Mutex::new(RefCell::new(Ring {
				packets: [UsbMidiPacket::from_bytes([0; 4]); N],
				head: 0,
				tail: 0,
				count: 0
			}))
		}
	}

	pub const fn capacity(&self) -> usize {
		N
	}

	/** Appends `packet`, or hands it back if the buffer is full. */
	pub fn push(&self, packet: UsbMidiPacket) -> Result<(), UsbMidiPacket> {
		critical_section::with(|cs| {
			let mut ring = self.inner.borrow_ref_mut(cs);
			if ring.count >= N {
				return Err(packet);
			}
			let head = ring.head;
			ring.packets[head] = packet;
			ring.head = (head + 1) % N;
			ring.count += 1;
			Ok(())
		})
	}

	/** Removes the oldest packet. Also returns how many packets are still buffered. */
	pub fn pop(&self) -> Option<(UsbMidiPacket, usize)> {
		critical_section::with(|cs| {
			let mut ring = self.inner.borrow_ref_mut(cs);
			if ring.count == 0 {
				return None;
			}
			let tail = ring.tail;
			let packet = ring.packets[tail];
			ring.tail = (tail + 1) % N;
			ring.count -= 1;
			Some((packet, ring.count))
		})
	}

	/** Copies the oldest packets into `out` without removing them and returns how many were copied. */
	pub fn peek_into(&self, out: &mut [UsbMidiPacket]) -> usize {
		critical_section::with(|cs| {
			let ring = self.inner.borrow_ref(cs);
			let n = core::cmp::min(ring.count, out.len());
			for (i, slot) in out[..n].iter_mut().enumerate() {
				*slot = ring.packets[(ring.tail + i) % N];
			}
			n
		})
	}

	/** Drops up to `n` of the oldest packets. */
	pub fn discard(&self, n: usize) {
		critical_section::with(|cs| {
			let mut ring = self.inner.borrow_ref_mut(cs);
			let n = core::cmp::min(n, ring.count);
			ring.tail = (ring.tail + n) % N;
			ring.count -= n;
		})
	}

	pub fn clear(&self) {
		critical_section::with(|cs| {
			let mut ring = self.inner.borrow_ref_mut(cs);
			ring.head = 0;
			ring.tail = 0;
			ring.count = 0;
		})
	}

	pub fn len(&self) -> usize {
		critical_section::with(|cs| self.inner.borrow_ref(cs).count)
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn is_full(&self) -> bool {
		self.len() >= N
	}

	pub fn free(&self) -> usize {
		N - self.len()
	}
}
