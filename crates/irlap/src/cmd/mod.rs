use clap::{Args, Subcommand};
use std::path::PathBuf;

use irlap_frame::{Station, BROADCAST, CBROADCAST, FINAL_SLOT};

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod decode;
#[cfg(unix)]
pub mod listen;
pub mod version;
pub mod xid;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Classify hex-encoded link frames.
    Decode(DecodeArgs),
    /// Build a discovery (XID) frame and print it.
    Xid(XidArgs),
    /// Bind a datagram socket and print every frame received.
    #[cfg(unix)]
    Listen(ListenArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Decode(args) => decode::run(args, format),
        Command::Xid(args) => xid::run(args, format),
        #[cfg(unix)]
        Command::Listen(args) => listen::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// The local addressing received frames are checked against.
#[derive(Args, Debug, Clone, Copy)]
pub struct StationArgs {
    /// Our connection address (hex with 0x prefix, or decimal).
    #[arg(long, value_parser = parse_u8, default_value = "0xfe")]
    pub caddr: u8,
    /// Our device address (hex with 0x prefix, or decimal).
    #[arg(long, value_parser = parse_u32, default_value = "0xffffffff")]
    pub saddr: u32,
}

impl Default for StationArgs {
    fn default() -> Self {
        Self {
            caddr: CBROADCAST,
            saddr: BROADCAST,
        }
    }
}

impl StationArgs {
    pub fn station(&self) -> Station {
        Station {
            caddr: self.caddr & CBROADCAST,
            saddr: self.saddr,
        }
    }
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Frames as hex strings. Read one per line from stdin when omitted.
    pub frames: Vec<String>,
    #[command(flatten)]
    pub station: StationArgs,
}

#[derive(Args, Debug)]
pub struct XidArgs {
    /// Our device address.
    #[arg(long, value_parser = parse_u32)]
    pub saddr: u32,
    /// Peer device address (responses only).
    #[arg(long, value_parser = parse_u32, default_value = "0xffffffff")]
    pub daddr: u32,
    /// Number of discovery slots (1, 6, 8 or 16).
    #[arg(long, default_value_t = 6)]
    pub slots: u8,
    /// Slot number; 0xff marks the final command, which carries our identity.
    #[arg(long, value_parser = parse_u8, default_value_t = FINAL_SLOT)]
    pub slot: u8,
    /// Build a response instead of a command.
    #[arg(long)]
    pub response: bool,
    /// Nickname advertised in the information block.
    #[arg(long, default_value = "")]
    pub nickname: String,
    /// Service hint bytes as hex (one byte, or two when the first has 0x80 set).
    #[arg(long, default_value = "00")]
    pub hints: String,
    /// Character set of the nickname.
    #[arg(long, value_parser = parse_u8, default_value = "0")]
    pub charset: u8,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Socket path to bind.
    pub path: PathBuf,
    #[command(flatten)]
    pub station: StationArgs,
    /// Exit after receiving N frames.
    #[arg(long)]
    pub count: Option<usize>,
    /// Skip frames that produce no event.
    #[arg(long)]
    pub events_only: bool,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn parse_u8(input: &str) -> Result<u8, String> {
    let value = parse_u32(input)?;
    u8::try_from(value).map_err(|_| format!("{input} does not fit in one byte"))
}

pub fn parse_u32(input: &str) -> Result<u32, String> {
    let input = input.trim();
    let parsed = match input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
    {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => input.parse(),
    };
    parsed.map_err(|err| format!("invalid address {input:?}: {err}"))
}

/// Decode a hex frame, tolerating whitespace, `:` separators and a `0x` prefix.
pub fn parse_hex_frame(input: &str) -> Result<Vec<u8>, String> {
    let cleaned: String = input
        .trim()
        .trim_start_matches("0x")
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect();
    hex::decode(&cleaned).map_err(|err| format!("invalid hex frame {input:?}: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_and_decimal_addresses() {
        assert_eq!(parse_u32("0xAABBCCDD"), Ok(0xAABBCCDD));
        assert_eq!(parse_u32("42"), Ok(42));
        assert_eq!(parse_u8("0xfe"), Ok(0xFE));
        assert!(parse_u8("0x100").is_err());
        assert!(parse_u32("zz").is_err());
    }

    #[test]
    fn hex_frames_tolerate_separators() {
        assert_eq!(parse_hex_frame("43 b4:68 69"), Ok(vec![0x43, 0xB4, 0x68, 0x69]));
        assert_eq!(parse_hex_frame("0x0f1f"), Ok(vec![0x0F, 0x1F]));
        assert!(parse_hex_frame("abc").is_err());
    }

    #[test]
    fn station_masks_command_bit() {
        let args = StationArgs {
            caddr: 0x43,
            ..StationArgs::default()
        };
        assert_eq!(args.station().caddr, 0x42);
        assert_eq!(args.station().saddr, BROADCAST);
    }
}
