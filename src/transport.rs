/*! Moves USB-MIDI packets between the ring buffers and a bulk endpoint pair.
  *
  * Outbound packets are queued by [`UsbMidiTransport::send`] and written to the IN
  * endpoint either from the IN-complete callback or from the periodic tick. Inbound
  * transfers are copied into the RX ring on the OUT callback, unless the RX hook
  * claims them first. */

use crate::debugln::*;
use crate::ring_buffer::PacketRingBuffer;
use parse_midi::UsbMidiPacket;
use usb_device::UsbError;

/** A 64 byte bulk transfer holds this many packets. */
pub const MAX_PACKETS_PER_TRANSFER: usize = 16;

/** Attempts of `send_blocking` before it gives up on a host that does not read. */
pub const BLOCKING_SEND_RETRIES: u16 = 10000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
	/** The TX ring is full. Retry later. */
	Busy,
	/** No USB session, or the hardware reported an error. */
	Disconnected,
}

impl From<UsbError> for SendError {
	fn from(error: UsbError) -> SendError {
		match error {
			UsbError::WouldBlock => SendError::Busy,
			_ => SendError::Disconnected,
		}
	}
}

/** Anything that accepts outbound packets. */
pub trait PacketSink {
	fn send_packet(&mut self, packet: UsbMidiPacket) -> Result<(), SendError>;
}

/** The hardware side: a pair of bulk endpoints carrying whole packets. */
pub trait MidiEndpoint {
	/** Starts an IN transfer of `data` (a multiple of 4 bytes). */
	fn write_packets(&mut self, data: &[u8]) -> Result<usize, UsbError>;

	/** Reads the pending OUT transfer into `buffer`. */
	fn read_packets(&mut self, buffer: &mut [u8]) -> Result<usize, UsbError>;
}

/** Gets to see every received packet before it is buffered. */
pub trait RxHook {
	/** Returns `true` if the packet has been taken care of and must not be buffered. */
	fn claim(&mut self, packet: UsbMidiPacket) -> bool;
}

/** Claims nothing. */
pub struct NoHook;

impl RxHook for NoHook {
	fn claim(&mut self, _packet: UsbMidiPacket) -> bool {
		false
	}
}

pub struct UsbMidiTransport<E, H, const RX: usize = 64, const TX: usize = 64> {
	endpoint: E,
	hook: H,
	rx: PacketRingBuffer<RX>,
	tx: PacketRingBuffer<TX>,
	transfer_possible: bool,
	tx_busy: bool,
	rx_pending: bool,
	slow_host_ctr: u16,
}

impl<E: MidiEndpoint, const RX: usize, const TX: usize> UsbMidiTransport<E, NoHook, RX, TX> {
	pub fn new(endpoint: E) -> UsbMidiTransport<E, NoHook, RX, TX> {
		UsbMidiTransport::with_hook(endpoint, NoHook)
	}
}

impl<E: MidiEndpoint, H: RxHook, const RX: usize, const TX: usize> UsbMidiTransport<E, H, RX, TX> {
	/** The endpoint is only read once a whole transfer fits into the RX ring. */
	const RX_HOLDS_A_TRANSFER: () = assert!(RX >= MAX_PACKETS_PER_TRANSFER, "RX must hold at least MAX_PACKETS_PER_TRANSFER packets");

	/** Starts out disconnected. `RX` must be at least `MAX_PACKETS_PER_TRANSFER`,
	  * smaller rings are rejected at compile time. */
	pub fn with_hook(endpoint: E, hook: H) -> UsbMidiTransport<E, H, RX, TX> {
		let () = Self::RX_HOLDS_A_TRANSFER;
		UsbMidiTransport {
			endpoint,
			hook,
			rx: PacketRingBuffer::new(),
			tx: PacketRingBuffer::new(),
			transfer_possible: false,
			tx_busy: true,
			rx_pending: false,
			slow_host_ctr: 0,
		}
	}

	pub fn endpoint(&self) -> &E {
		&self.endpoint
	}

	pub fn endpoint_mut(&mut self) -> &mut E {
		&mut self.endpoint
	}

	pub fn hook_mut(&mut self) -> &mut H {
		&mut self.hook
	}

	pub fn is_connected(&self) -> bool {
		self.transfer_possible
	}

	pub fn rx_len(&self) -> usize {
		self.rx.len()
	}

	pub fn tx_len(&self) -> usize {
		self.tx.len()
	}

	/** Both rings are emptied on every change; stale data is never delivered. */
	pub fn set_connected(&mut self, connected: bool) {
		debugln!("usb midi {}", if connected { "connected" } else { "disconnected" });
		self.rx.clear();
		self.tx.clear();
		self.rx_pending = false;
		self.transfer_possible = connected;
		self.tx_busy = !connected;
	}

	/** Calls `set_connected` only if the state actually changed. */
	pub fn update_connection(&mut self, connected: bool) {
		if connected != self.transfer_possible {
			self.set_connected(connected);
		}
	}

	/** Queues a packet without waiting. A full TX ring is flushed to the hardware
	  * before `Busy` is reported, so a caller spinning on `send` makes progress. */
	pub fn send(&mut self, packet: UsbMidiPacket) -> Result<(), SendError> {
		if !self.transfer_possible {
			return Err(SendError::Disconnected);
		}

		if self.tx.is_full() {
			self.flush_tx().map_err(|_| SendError::Disconnected)?;
			return Err(SendError::Busy);
		}

		self.tx.push(packet).map_err(|_| SendError::Busy)
	}

	/** Retries `send` while the ring is full. Once a host has let the retry limit run
	  * out, later calls give up after a single attempt until a packet got through. */
	pub fn send_blocking(&mut self, packet: UsbMidiPacket) -> Result<(), SendError> {
		loop {
			match self.send(packet) {
				Err(SendError::Busy) => {
					self.slow_host_ctr = self.slow_host_ctr.saturating_add(1);
					if self.slow_host_ctr >= BLOCKING_SEND_RETRIES {
						verboseln!("usb midi tx timeout");
						return Err(SendError::Busy);
					}
				}
				Ok(()) => {
					self.slow_host_ctr = 0;
					return Ok(());
				}
				Err(error) => return Err(error),
			}
		}
	}

	/** Takes the oldest received packet, together with the number still buffered. */
	pub fn receive(&mut self) -> Option<(UsbMidiPacket, usize)> {
		if self.rx_pending {
			self.fill_rx();
		}
		self.rx.pop()
	}

	/** IN transfer finished (interrupt context). */
	pub fn on_hardware_tx_complete(&mut self) {
		if self.transfer_possible {
			self.tx_busy = false;
		}
		self.flush_tx().ok();
	}

	/** OUT transfer arrived (interrupt context). */
	pub fn on_hardware_rx_complete(&mut self) {
		self.rx_pending = true;
		self.fill_rx();
	}

	/** To be called every millisecond. */
	pub fn periodic_tick(&mut self) {
		if !self.transfer_possible {
			return;
		}
		if self.rx_pending {
			self.fill_rx();
		}
		self.flush_tx().ok();
	}

	/** Starts an IN transfer with as many queued packets as fit, unless one is in flight. */
	pub fn flush_tx(&mut self) -> Result<(), UsbError> {
		if !self.transfer_possible || self.tx_busy || self.tx.is_empty() {
			return Ok(());
		}

		let mut packets = [UsbMidiPacket::default(); MAX_PACKETS_PER_TRANSFER];
		let count = self.tx.peek_into(&mut packets);
		let mut buffer = [0u8; MAX_PACKETS_PER_TRANSFER * 4];
		for (chunk, packet) in buffer.chunks_exact_mut(4).zip(packets[..count].iter()) {
			chunk.copy_from_slice(&packet.bytes());
		}

		match self.endpoint.write_packets(&buffer[..count * 4]) {
			Ok(written) => {
				self.tx.discard(written / 4);
				self.tx_busy = true;
				verboseln!("usb midi tx {} packets", written / 4);
				Ok(())
			}
			Err(UsbError::WouldBlock) => Ok(()),
			Err(error) => {
				debugln!("usb midi tx error: {:?}", error);
				Err(error)
			}
		}
	}

	fn fill_rx(&mut self) {
		let mut buffer = [0u8; MAX_PACKETS_PER_TRANSFER * 4];

		if !self.transfer_possible {
			// an unread OUT transfer keeps the endpoint NAKing, so drain it
			self.endpoint.read_packets(&mut buffer).ok();
			self.rx_pending = false;
			return;
		}

		// leave the data in the endpoint until a whole transfer fits
		if self.rx.free() < MAX_PACKETS_PER_TRANSFER {
			return;
		}

		match self.endpoint.read_packets(&mut buffer) {
			Ok(len) => {
				self.rx_pending = false;
				for chunk in buffer[..len].chunks_exact(4) {
					let packet = UsbMidiPacket::from_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
					if packet.code_index() == 0 && packet.data() == [0, 0, 0] {
						continue; // padding
					}
					if self.hook.claim(packet) {
						continue;
					}
					if self.rx.push(packet).is_err() {
						debugln!("usb midi rx overflow, dropped {:02X?}", packet.bytes());
					}
				}
			}
			Err(UsbError::WouldBlock) => {
				self.rx_pending = false;
			}
			Err(error) => {
				debugln!("usb midi rx error: {:?}", error);
				self.rx_pending = false;
			}
		}
	}
}

impl<E: MidiEndpoint, H: RxHook, const RX: usize, const TX: usize> PacketSink for UsbMidiTransport<E, H, RX, TX> {
	fn send_packet(&mut self, packet: UsbMidiPacket) -> Result<(), SendError> {
		self.send_blocking(packet)
	}
}
