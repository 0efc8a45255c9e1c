/*! USB Audio / MIDI Streaming class on top of `usb-device`.
  *
  * The transport itself is the class: `usb_dev.poll(&mut [&mut transport])` routes the
  * endpoint callbacks of the bus straight into the transport's completion handlers. */

use crate::transport::{MidiEndpoint, RxHook, UsbMidiTransport};
use usb_device::class_prelude::*;
use usb_device::Result;

pub const USB_CLASS_AUDIO: u8 = 0x01;
const USB_SUBCLASS_AUDIOCONTROL: u8 = 0x01;
const USB_SUBCLASS_MIDISTREAMING: u8 = 0x03;

const CS_INTERFACE: u8 = 0x24;
const CS_ENDPOINT: u8 = 0x25;

const AC_HEADER: u8 = 0x01;
const MS_HEADER: u8 = 0x01;
const MS_GENERAL: u8 = 0x01;
const MIDI_IN_JACK: u8 = 0x02;
const MIDI_OUT_JACK: u8 = 0x03;
const JACK_EMBEDDED: u8 = 0x01;

const IN_JACK_LEN: u16 = 6;
const OUT_JACK_LEN: u16 = 9;
const MS_HEADER_LEN: u16 = 7;

const MAX_PACKET_SIZE: u16 = 64;

/** Bulk endpoint pair plus the interface numbers of the audio function. */
pub struct MidiStreamingEndpoints<'a, B: UsbBus> {
	audio_if: InterfaceNumber,
	midi_if: InterfaceNumber,
	out_ep: EndpointOut<'a, B>,
	in_ep: EndpointIn<'a, B>,
	cables: u8,
}

impl<'a, B: UsbBus> MidiStreamingEndpoints<'a, B> {
	/** `cables` is clamped to 1..=16; each one gets an embedded IN and OUT jack. */
	pub fn new(alloc: &'a UsbBusAllocator<B>, cables: u8) -> MidiStreamingEndpoints<'a, B> {
		MidiStreamingEndpoints {
			audio_if: alloc.interface(),
			midi_if: alloc.interface(),
			out_ep: alloc.bulk(MAX_PACKET_SIZE),
			in_ep: alloc.bulk(MAX_PACKET_SIZE),
			cables: cables.max(1).min(16),
		}
	}

	pub fn cables(&self) -> u8 {
		self.cables
	}

	fn write_descriptors(&self, writer: &mut DescriptorWriter) -> Result<()> {
		writer.interface(self.audio_if, USB_CLASS_AUDIO, USB_SUBCLASS_AUDIOCONTROL, 0x00)?;
		writer.write(CS_INTERFACE, &[
			AC_HEADER,
			0x00, 0x01, // bcdADC 1.00
			0x09, 0x00, // total length of the class specific descriptors
			0x01, // one streaming interface
			u8::from(self.midi_if),
		])?;

		writer.interface(self.midi_if, USB_CLASS_AUDIO, USB_SUBCLASS_MIDISTREAMING, 0x00)?;
		streaming_descriptors(self.cables, |kind, data| writer.write(kind, data))?;

		let (jacks, len) = endpoint_jacks(self.cables, in_jack_id);
		writer.endpoint(&self.out_ep)?;
		writer.write(CS_ENDPOINT, &jacks[..len])?;

		let (jacks, len) = endpoint_jacks(self.cables, out_jack_id);
		writer.endpoint(&self.in_ep)?;
		writer.write(CS_ENDPOINT, &jacks[..len])?;

		Ok(())
	}
}

fn in_jack_id(cable: u8) -> u8 {
	2 * cable + 1
}

fn out_jack_id(cable: u8) -> u8 {
	2 * cable + 2
}

/** Emits the MS header and the jack pair of every cable as `(descriptor type, body)`.
  * The header's wTotalLength covers all of them, including their length and type bytes. */
fn streaming_descriptors(cables: u8, mut emit: impl FnMut(u8, &[u8]) -> Result<()>) -> Result<()> {
	let total = MS_HEADER_LEN + cables as u16 * (IN_JACK_LEN + OUT_JACK_LEN);
	emit(CS_INTERFACE, &[
		MS_HEADER,
		0x00, 0x01, // bcdMSC 1.00
		(total & 0xFF) as u8, (total >> 8) as u8,
	])?;

	for cable in 0..cables {
		emit(CS_INTERFACE, &[MIDI_IN_JACK, JACK_EMBEDDED, in_jack_id(cable), 0x00])?;
		emit(CS_INTERFACE, &[
			MIDI_OUT_JACK, JACK_EMBEDDED, out_jack_id(cable),
			0x01, // one input pin
			in_jack_id(cable), 0x01, // connected to pin 1 of the IN jack
			0x00,
		])?;
	}
	Ok(())
}

/** Body of the class specific endpoint descriptor listing the jack of every cable. */
fn endpoint_jacks(cables: u8, jack_id: fn(u8) -> u8) -> ([u8; 2 + 16], usize) {
	let mut jacks = [0u8; 2 + 16];
	jacks[0] = MS_GENERAL;
	jacks[1] = cables;
	for cable in 0..cables {
		jacks[2 + cable as usize] = jack_id(cable);
	}
	(jacks, 2 + cables as usize)
}

impl<B: UsbBus> MidiEndpoint for MidiStreamingEndpoints<'_, B> {
	fn write_packets(&mut self, data: &[u8]) -> Result<usize> {
		self.in_ep.write(data)
	}

	fn read_packets(&mut self, buffer: &mut [u8]) -> Result<usize> {
		self.out_ep.read(buffer)
	}
}

impl<B: UsbBus, H: RxHook, const RX: usize, const TX: usize> UsbClass<B>
	for UsbMidiTransport<MidiStreamingEndpoints<'_, B>, H, RX, TX>
{
	fn get_configuration_descriptors(&self, writer: &mut DescriptorWriter) -> Result<()> {
		self.endpoint().write_descriptors(writer)
	}

	fn reset(&mut self) {
		self.set_connected(false);
	}

	fn endpoint_out(&mut self, addr: EndpointAddress) {
		if addr == self.endpoint().out_ep.address() {
			self.on_hardware_rx_complete();
		}
	}

	fn endpoint_in_complete(&mut self, addr: EndpointAddress) {
		if addr == self.endpoint().in_ep.address() {
			self.on_hardware_tx_complete();
		}
	}
}
