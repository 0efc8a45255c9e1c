macro_rules! debugln {
	($($arg:tt)*) => {{
		if cfg!(feature = "debugprint_basic") {
			log::debug!($($arg)*);
		}
	}}
}

macro_rules! verboseln {
	($($arg:tt)*) => {{
		if cfg!(feature = "debugprint_verbose") {
			log::trace!($($arg)*);
		}
	}}
}

pub(crate) use debugln;
pub(crate) use verboseln;
