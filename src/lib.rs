/*! USB-MIDI packet transport with application-defined SysEx command handling.
  *
  * Received packets flow from the USB OUT endpoint through [`transport::UsbMidiTransport`]
  * into an RX ring (or, for claimed cables, a [`cable_filter_queue::CableFilterQueue`]),
  * and their bytes into a [`sysex::SysexParser`]. Replies and other outgoing frames are
  * packetized by the [`sysex::SysexEncoder`] and queued on the TX ring.
  *
  * A firmware typically wires it up like this:
  *
  * ```ignore
  * let mut transport = UsbMidiTransport::<_, _>::with_hook(MidiStreamingEndpoints::new(&bus, 1), producer);
  * // in the USB interrupt
  * usb_dev.poll(&mut [&mut transport]);
  * transport.update_connection(usb_dev.state() == UsbDeviceState::Configured);
  * // every millisecond
  * transport.periodic_tick();
  * watchdog.tick(1, &mut parser, &mut handlers);
  * // in the SysEx task
  * while let Some(packet) = consumer.dequeue() {
  * 	parser.feed_packet(packet, &mut handlers, &mut transport);
  * }
  * ``` */

#![cfg_attr(not(test), no_std)]

mod debugln;

pub mod cable_filter_queue;
pub mod ring_buffer;
pub mod sysex;
pub mod transport;
pub mod usb_class;

#[cfg(test)]
mod testing;

pub use parse_midi::{payload_length, Cable, UsbMidiPacket, UsbPacketizer, PAYLOAD_LENGTH};

pub use cable_filter_queue::{CableFilterConsumer, CableFilterProducer, CableFilterQueue};
pub use ring_buffer::PacketRingBuffer;
pub use transport::{MidiEndpoint, NoHook, PacketSink, RxHook, SendError, UsbMidiTransport};
pub use usb_class::MidiStreamingEndpoints;
