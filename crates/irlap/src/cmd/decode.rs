use std::io::{self, BufRead};

use bytes::Bytes;
use irlap_frame::{decode_frame, Station};
use tracing::{debug, warn};

use crate::cmd::{parse_hex_frame, DecodeArgs};
use crate::exit::{io_error, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{print_decoded, print_unparsed, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let station = args.station.station();
    let mut dropped = 0usize;

    if args.frames.is_empty() {
        for line in io::stdin().lock().lines() {
            let line = line.map_err(|err| io_error("failed reading stdin", err))?;
            if line.trim().is_empty() || line.trim_start().starts_with('#') {
                continue;
            }
            dropped += decode_one(&line, &station, format);
        }
    } else {
        for input in &args.frames {
            dropped += decode_one(input, &station, format);
        }
    }

    if dropped > 0 {
        debug!(dropped, "some frames produced no event");
        return Ok(DATA_INVALID);
    }
    Ok(SUCCESS)
}

/// Returns 1 when the input was dropped, including input that is not hex.
fn decode_one(input: &str, station: &Station, format: OutputFormat) -> usize {
    let raw = match parse_hex_frame(input) {
        Ok(raw) => raw,
        Err(reason) => {
            warn!(%reason, "skipping unreadable input");
            print_unparsed(input, reason, format);
            return 1;
        }
    };
    let frame = Bytes::from(raw);
    let result = decode_frame(&frame, station);
    print_decoded(&frame, &result, format);
    usize::from(result.is_err())
}
