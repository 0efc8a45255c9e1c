/** `F0 00 00 7E`: start of sysex and the manufacturer id reserved for private use. */
pub const DEFAULT_HEADER: [u8; 4] = [0xF0, 0x00, 0x00, 0x7E];

/** Device id some applications use to address every unit on the bus. */
pub const BROADCAST_DEVICE_ID: u8 = 0x7F;

pub const MAX_HEADER_LEN: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
	/** The header must start with `F0`, carry only 7 bit bytes after it and be 1..=7 bytes long. */
	InvalidHeader,
}

/** The fixed bytes preceding the device id in every frame. */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SysexHeader {
	bytes: [u8; MAX_HEADER_LEN],
	len: u8
}

impl Default for SysexHeader {
	fn default() -> SysexHeader {
		SysexHeader::new()
	}
}

impl SysexHeader {
	pub const fn new() -> SysexHeader {
		SysexHeader {
			bytes: [DEFAULT_HEADER[0], DEFAULT_HEADER[1], DEFAULT_HEADER[2], DEFAULT_HEADER[3], 0, 0, 0],
			len: DEFAULT_HEADER.len() as u8
		}
	}

	pub fn from_slice(header: &[u8]) -> Result<SysexHeader, ConfigError> {
		if header.is_empty() || header.len() > MAX_HEADER_LEN || header[0] != 0xF0 {
			return Err(ConfigError::InvalidHeader);
		}
		if header[1..].iter().any(|byte| *byte >= 0x80) {
			return Err(ConfigError::InvalidHeader);
		}

		let mut bytes = [0; MAX_HEADER_LEN];
		bytes[..header.len()].copy_from_slice(header);
		Ok(SysexHeader { bytes, len: header.len() as u8 })
	}

	pub fn as_slice(&self) -> &[u8] {
		&self.bytes[..self.len as usize]
	}

	pub fn len(&self) -> usize {
		self.len as usize
	}
}

/** How the byte after the header is compared against the own device id. */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceIdMatch {
	/** Only the own id matches. */
	Strict,
	/** The own id and [`BROADCAST_DEVICE_ID`] match. */
	AcceptBroadcast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SysexConfig {
	pub header: SysexHeader,
	device_id: u8,
	pub device_id_match: DeviceIdMatch,
}

impl Default for SysexConfig {
	fn default() -> SysexConfig {
		SysexConfig::new(0)
	}
}

impl SysexConfig {
	/** Default header, strict device id matching. Only the low 7 bits of `device_id` are used. */
	pub const fn new(device_id: u8) -> SysexConfig {
		SysexConfig {
			header: SysexHeader::new(),
			device_id: device_id & 0x7F,
			device_id_match: DeviceIdMatch::Strict,
		}
	}

	pub fn with_header(mut self, header: SysexHeader) -> SysexConfig {
		self.header = header;
		self
	}

	pub fn with_device_id_match(mut self, policy: DeviceIdMatch) -> SysexConfig {
		self.device_id_match = policy;
		self
	}

	pub fn device_id(&self) -> u8 {
		self.device_id
	}

	pub fn matches_device_id(&self, byte: u8) -> bool {
		match self.device_id_match {
			DeviceIdMatch::Strict => byte == self.device_id,
			DeviceIdMatch::AcceptBroadcast => byte == self.device_id || byte == BROADCAST_DEVICE_ID,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn header_validation() {
		assert_eq!(SysexHeader::new().as_slice(), &DEFAULT_HEADER);
		assert!(SysexHeader::from_slice(&[0xF0, 0x00, 0x00, 0x7E, 0x4E]).is_ok());
		assert_eq!(SysexHeader::from_slice(&[]), Err(ConfigError::InvalidHeader));
		assert_eq!(SysexHeader::from_slice(&[0x00, 0x00]), Err(ConfigError::InvalidHeader));
		assert_eq!(SysexHeader::from_slice(&[0xF0, 0x80]), Err(ConfigError::InvalidHeader));
		assert_eq!(SysexHeader::from_slice(&[0xF0; 8]), Err(ConfigError::InvalidHeader));
	}

	#[test]
	fn broadcast_only_when_enabled() {
		let strict = SysexConfig::new(0x05);
		assert!(strict.matches_device_id(0x05));
		assert!(!strict.matches_device_id(BROADCAST_DEVICE_ID));

		let broadcast = strict.with_device_id_match(DeviceIdMatch::AcceptBroadcast);
		assert!(broadcast.matches_device_id(0x05));
		assert!(broadcast.matches_device_id(BROADCAST_DEVICE_ID));
		assert!(!broadcast.matches_device_id(0x06));

		assert_eq!(SysexConfig::new(0x85).device_id(), 0x05);
	}
}
