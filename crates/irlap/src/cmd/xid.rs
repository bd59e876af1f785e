use irlap_frame::discovery::HINT_EXTENSION;
use irlap_frame::{Discovery, LinkConfig, LinkContext};
use irlap_transport::RecordingSink;

use crate::cmd::{parse_hex_frame, XidArgs};
use crate::exit::{frame_error, CliError, CliResult, INTERNAL, SUCCESS, USAGE};
use crate::output::{print_built, OutputFormat};

pub fn run(args: XidArgs, format: OutputFormat) -> CliResult<i32> {
    let hints = parse_hints(&args.hints)?;
    let discovery = Discovery::new(args.saddr, args.nickname.as_bytes())
        .with_hints(hints)
        .with_charset(args.charset)
        .with_daddr(args.daddr);

    let mut link = LinkContext::new(args.saddr, &LinkConfig::default(), RecordingSink::new())
        .map_err(|err| frame_error("link setup failed", err))?;
    link.set_daddr(args.daddr);
    link.send_discovery_xid(args.slots, args.slot, !args.response, &discovery)
        .map_err(|err| frame_error("building discovery frame failed", err))?;

    let frame = link
        .sink()
        .last()
        .ok_or_else(|| CliError::new(INTERNAL, "no frame was built"))?;
    print_built(frame, format);
    Ok(SUCCESS)
}

fn parse_hints(input: &str) -> CliResult<[u8; 2]> {
    let bytes = parse_hex_frame(input).map_err(|msg| CliError::new(USAGE, msg))?;
    match bytes.as_slice() {
        [hint] if hint & HINT_EXTENSION == 0 => Ok([*hint, 0]),
        [first, second] if first & HINT_EXTENSION != 0 => Ok([*first, *second]),
        _ => Err(CliError::new(
            USAGE,
            format!("--hints {input:?}: give one byte, or two when the first has 0x80 set"),
        )),
    }
}
