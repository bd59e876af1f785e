use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use irlap_frame::{FrameError, LinkEvent, StationPair};
use irlap_transport::TxFrame;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize, Debug, Default)]
struct DiscoveryOutput {
    daddr: String,
    hints: String,
    charset: u8,
    nickname: String,
}

/// One received frame: the event it produced, or why it was dropped.
#[derive(Serialize, Debug, Default)]
struct FrameOutput {
    event: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
    frame_len: usize,
    frame: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    caddr: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    command: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pf: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    nr: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ns: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    destination: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ncaddr: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    slots: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    slot: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frmr_causes: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    discovery: Option<DiscoveryOutput>,
    timestamp: String,
}

impl FrameOutput {
    fn event(frame: &[u8], event: &LinkEvent) -> Self {
        let mut out = Self {
            event: event.name(),
            frame_len: frame.len(),
            frame: hex::encode(frame),
            timestamp: now_unix_seconds(),
            ..Self::default()
        };

        if let Some(info) = event.info() {
            out.caddr = Some(info.caddr);
            out.command = Some(info.command);
            out.pf = Some(info.pf);
            out.nr = info.nr;
            out.ns = info.ns;
            if let Some(StationPair {
                source,
                destination,
            }) = info.stations
            {
                out.source = Some(station_hex(source));
                out.destination = Some(station_hex(destination));
            }
        }

        match event {
            LinkEvent::SnrmCmd(Some(snrm)) => out.ncaddr = Some(snrm.ncaddr),
            LinkEvent::DiscoveryXidCmd(xid) => {
                out.slots = Some(xid.slots);
                out.slot = Some(xid.slot);
            }
            LinkEvent::FrmrRsp(frmr) => out.frmr_causes = Some(frmr.causes.bits()),
            _ => {}
        }

        out.payload = event.payload().map(|payload| payload_preview(payload));
        out.discovery = event.discovery().map(|discovery| DiscoveryOutput {
            daddr: station_hex(discovery.daddr),
            hints: hex::encode(discovery.hints),
            charset: discovery.charset,
            nickname: discovery.nickname_lossy().into_owned(),
        });
        out
    }

    fn dropped(frame: &[u8], err: &FrameError) -> Self {
        Self {
            event: "dropped",
            reason: Some(err.to_string()),
            frame_len: frame.len(),
            frame: hex::encode(frame),
            timestamp: now_unix_seconds(),
            ..Self::default()
        }
    }

    /// Input that never became a frame.
    fn unparsed(input: &str, reason: String) -> Self {
        Self {
            event: "dropped",
            reason: Some(reason),
            frame: input.trim().to_string(),
            timestamp: now_unix_seconds(),
            ..Self::default()
        }
    }

    fn stations(&self) -> String {
        match (&self.source, &self.destination) {
            (Some(source), Some(destination)) => format!("{source} -> {destination}"),
            _ => "-".to_string(),
        }
    }

    fn detail(&self) -> String {
        if let Some(reason) = &self.reason {
            return reason.clone();
        }
        if let Some(discovery) = &self.discovery {
            return format!("nickname={} hints={}", discovery.nickname, discovery.hints);
        }
        if let Some(payload) = &self.payload {
            return payload.clone();
        }
        if let Some(ncaddr) = self.ncaddr {
            return format!("ncaddr={ncaddr:#04x}");
        }
        if let Some(causes) = self.frmr_causes {
            return format!("causes={causes:#06b}");
        }
        String::new()
    }
}

/// Print the outcome of classifying one received frame.
pub fn print_decoded(frame: &[u8], result: &Result<LinkEvent, FrameError>, format: OutputFormat) {
    let out = match result {
        Ok(event) => FrameOutput::event(frame, event),
        Err(err) => FrameOutput::dropped(frame, err),
    };

    if let OutputFormat::Raw = format {
        if let Ok(event) = result {
            if let Some(payload) = event.payload() {
                print_raw(payload);
            }
        }
        return;
    }
    print_frame_output(&out, format);
}

/// Print an input line that could not be read as a frame.
pub fn print_unparsed(input: &str, reason: String, format: OutputFormat) {
    if let OutputFormat::Raw = format {
        return;
    }
    print_frame_output(&FrameOutput::unparsed(input, reason), format);
}

fn print_frame_output(out: &FrameOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["EVENT", "CADDR", "NR", "NS", "PF", "STATIONS", "DETAIL"])
                .add_row(vec![
                    out.event.to_string(),
                    optional(out.caddr.map(|caddr| format!("{caddr:#04x}"))),
                    optional(out.nr),
                    optional(out.ns),
                    optional(out.pf),
                    out.stations(),
                    out.detail(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "{} len={} caddr={} nr={} ns={} pf={} stations={} {}",
                out.event,
                out.frame_len,
                optional(out.caddr.map(|caddr| format!("{caddr:#04x}"))),
                optional(out.nr),
                optional(out.ns),
                optional(out.pf),
                out.stations(),
                out.detail()
            );
        }
        OutputFormat::Raw => {}
    }
}

#[derive(Serialize)]
struct BuiltOutput {
    frame_len: usize,
    frame: String,
    mtt: u32,
    xbofs: u32,
    xbofs_delay: u32,
}

/// Print a frame built locally, with its transmit metadata.
pub fn print_built(frame: &TxFrame, format: OutputFormat) {
    let out = BuiltOutput {
        frame_len: frame.len(),
        frame: hex::encode(&frame.data),
        mtt: frame.meta.mtt,
        xbofs: frame.meta.xbofs,
        xbofs_delay: frame.meta.xbofs_delay,
    };

    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["FRAME", "LEN", "XBOFS"])
                .add_row(vec![
                    out.frame.clone(),
                    out.frame_len.to_string(),
                    out.xbofs.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!("{}", out.frame),
        OutputFormat::Raw => print_raw(&frame.data),
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn station_hex(addr: u32) -> String {
    format!("{addr:#010x}")
}

fn optional<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use irlap_frame::{decode_frame, Station};

    use super::*;

    const STATION: Station = Station {
        caddr: 0x42,
        saddr: 0xAABBCCDD,
    };

    #[test]
    fn event_output_carries_sequence_fields() {
        let frame = Bytes::from_static(&[0x43, 0xB4, b'h', b'i']);
        let event = decode_frame(&frame, &STATION).unwrap();
        let out = FrameOutput::event(&frame, &event);

        assert_eq!(out.event, "i_cmd");
        assert_eq!(out.ns, Some(2));
        assert_eq!(out.nr, Some(5));
        assert_eq!(out.pf, Some(true));
        assert_eq!(out.payload.as_deref(), Some("hi"));
        assert_eq!(out.frame, "43b46869");
    }

    #[test]
    fn dropped_output_names_reason() {
        let frame = Bytes::from_static(&[0x10, 0x01]);
        let err = decode_frame(&frame, &STATION).unwrap_err();
        let out = FrameOutput::dropped(&frame, &err);

        assert_eq!(out.event, "dropped");
        assert!(out.detail().contains("wrong connection address"));
        let json = serde_json::to_value(&out).unwrap();
        assert!(json.get("nr").is_none());
        assert_eq!(json["frame"], "1001");
    }

    #[test]
    fn unparsed_output_keeps_input_text() {
        let out = FrameOutput::unparsed(" zz ", "invalid hex frame \"zz\"".to_string());
        assert_eq!(out.event, "dropped");
        assert_eq!(out.frame, "zz");
        assert_eq!(out.frame_len, 0);
        assert!(out.detail().starts_with("invalid hex frame"));
    }
}
