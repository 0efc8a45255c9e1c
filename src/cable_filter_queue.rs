use crate::transport::RxHook;
use core::sync::atomic::AtomicU16;
use core::sync::atomic::Ordering::Relaxed;
use heapless::spsc::{Consumer, Producer, Queue};
use parse_midi::{Cable, UsbMidiPacket};

/** Diverts received packets of selected cables into a separate queue.
  *
  * The producer half is the transport's RX hook and runs in interrupt context; the
  * consumer half belongs to whatever task parses those cables (typically SysEx). */
pub struct CableFilterQueue<const N: usize> {
	queue: Queue<UsbMidiPacket, N>,
	filter: AtomicU16
}

impl<const N: usize> CableFilterQueue<N> {
	/** Bit `n` of `filter_mask` selects cable `n`. */
	pub const fn new(filter_mask: u16) -> CableFilterQueue<N> {
		CableFilterQueue {
			queue: Queue::new(),
			filter: AtomicU16::new(filter_mask)
		}
	}

	pub fn split(&mut self) -> (CableFilterProducer<N>, CableFilterConsumer<N>) {
		let (producer, consumer) = self.queue.split();

		let producer = CableFilterProducer { producer, filter: &self.filter };
		let consumer = CableFilterConsumer { consumer, filter: &self.filter };

		(producer, consumer)
	}
}

pub struct CableFilterConsumer<'a, const N: usize> {
	consumer: Consumer<'a, UsbMidiPacket, N>,
	filter: &'a AtomicU16
}

pub struct CableFilterProducer<'a, const N: usize> {
	producer: Producer<'a, UsbMidiPacket, N>,
	filter: &'a AtomicU16
}

impl<const N: usize> CableFilterProducer<'_, N> {
	pub fn selects(&self, cable: Cable) -> bool {
		self.filter.load(Relaxed) & (1 << cable.index()) != 0
	}
}

impl<const N: usize> RxHook for CableFilterProducer<'_, N> {
	/** Selected packets are claimed as long as there is room; on overflow they fall
	  * through to the transport's own RX ring. */
	fn claim(&mut self, packet: UsbMidiPacket) -> bool {
		if !self.selects(packet.cable()) {
			return false;
		}
		self.producer.enqueue(packet).is_ok()
	}
}

impl<const N: usize> CableFilterConsumer<'_, N> {
	pub fn dequeue(&mut self) -> Option<UsbMidiPacket> {
		self.consumer.dequeue()
	}

	pub fn set_filter(&mut self, filter_mask: u16) {
		self.filter.store(filter_mask, Relaxed);
	}

	pub fn filter(&self) -> u16 {
		self.filter.load(Relaxed)
	}
}
