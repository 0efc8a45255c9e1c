/*! Application-defined SysEx commands: `<header> <device id> <command> <payload...> F7`. */

pub mod commands;
pub mod config;
pub mod encoder;
pub mod parser;
pub mod path_router;
pub mod sevenbit;
pub mod watchdog;

pub use commands::{CmdState, CommandTable, CompletedCommand, Layout, LayoutHandler, PayloadCollector, PingHandler, SysexHandler, TableFull};
pub use config::{ConfigError, DeviceIdMatch, SysexConfig, SysexHeader, BROADCAST_DEVICE_ID, DEFAULT_HEADER};
pub use encoder::{DisackReason, EncodeError, Responder, SharedSink, SysexEncoder, CMD_ACK, CMD_DISACK};
pub use parser::{ParserState, SysexParser};
pub use path_router::{PathNode, PathRouter};
pub use sevenbit::{pack_7bit, packed_len, unpack_7bit, unpacked_len, SevenBitError};
pub use watchdog::SysexWatchdog;
