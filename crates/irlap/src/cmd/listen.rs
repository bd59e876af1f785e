use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use irlap_frame::decode_frame;
use irlap_transport::{DatagramTransport, TransportError};
use tracing::info;

use crate::cmd::ListenArgs;
use crate::exit::{transport_error, CliError, CliResult, SUCCESS};
use crate::output::{print_decoded, OutputFormat};

/// How often the receive loop wakes up to check for Ctrl-C.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let transport =
        DatagramTransport::bind(&args.path).map_err(|err| transport_error("bind failed", err))?;
    transport
        .set_read_timeout(Some(POLL_INTERVAL))
        .map_err(|err| transport_error("socket setup failed", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let station = args.station.station();
    info!(
        path = %args.path.display(),
        caddr = format_args!("{:#04x}", station.caddr),
        saddr = format_args!("{:#010x}", station.saddr),
        "listening for link frames"
    );

    let mut printed = 0usize;
    while running.load(Ordering::SeqCst) {
        let frame = match transport.recv_frame() {
            Ok(frame) => frame,
            Err(TransportError::Io(err)) if is_poll_timeout(&err) => continue,
            Err(err) => return Err(transport_error("receive failed", err)),
        };

        let result = decode_frame(&frame, &station);
        if args.events_only && result.is_err() {
            continue;
        }
        print_decoded(&frame, &result, format);
        printed = printed.saturating_add(1);

        if let Some(count) = args.count {
            if printed >= count {
                return Ok(SUCCESS);
            }
        }
    }

    Ok(SUCCESS)
}

fn is_poll_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| {
        CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}
