#![cfg(unix)]

use std::time::Duration;

use bytes::Bytes;
use irlap_frame::{
    Discovery, LapState, LinkConfig, LinkContext, LinkEvent, Outbound, Role, StaticParams,
    StationPair, SupervisoryKind, FINAL_SLOT,
};
use irlap_transport::DatagramTransport;

const PRIMARY: u32 = 0x0A0A_0A0A;
const SECONDARY: u32 = 0x0B0B_0B0B;

type Link = LinkContext<DatagramTransport>;

fn links(window_size: u8) -> (Link, Link) {
    let (left, right) = DatagramTransport::pair().expect("socket pair should open");
    for side in [&left, &right] {
        side.set_read_timeout(Some(Duration::from_secs(2)))
            .expect("read timeout should apply");
    }
    let config = LinkConfig {
        window_size,
        ..LinkConfig::default()
    };
    let primary = LinkContext::new(PRIMARY, &config, left).expect("primary should build");
    let secondary = LinkContext::new(SECONDARY, &config, right).expect("secondary should build");
    (primary, secondary)
}

/// Receive the next frame on `at`'s socket and classify it.
fn next_event(at: &Link) -> Option<LinkEvent> {
    let frame = at.sink().recv_frame().expect("a frame should arrive");
    at.receive(&frame)
}

fn connect(primary: &mut Link, secondary: &mut Link) {
    primary.set_daddr(SECONDARY);
    primary.set_caddr(0x24);
    let params = StaticParams(Bytes::from_static(&[0x01, 0x01, 0x02]));
    primary.send_snrm(Some(&params)).expect("SNRM should send");

    let Some(LinkEvent::SnrmCmd(Some(snrm))) = next_event(secondary) else {
        panic!("secondary should see a decodable SNRM");
    };
    assert_eq!(snrm.ncaddr, 0x24);
    assert_eq!(snrm.info.stations, Some(StationPair::new(PRIMARY, SECONDARY)));
    assert_eq!(snrm.params.as_ref(), &[0x01, 0x01, 0x02]);

    secondary.set_caddr(snrm.ncaddr);
    secondary.set_daddr(PRIMARY);
    secondary.set_role(Role::Secondary);
    secondary.set_state(LapState::NrmS);
    secondary.send_ua(None).expect("UA should send");

    let Some(LinkEvent::UaRsp { info, params }) = next_event(primary) else {
        panic!("primary should see UA");
    };
    assert_eq!(info.stations, Some(StationPair::new(SECONDARY, PRIMARY)));
    assert!(params.is_empty());
    primary.set_role(Role::Primary);
    primary.set_state(LapState::XmitP);
}

#[test]
fn discovery_round_learns_peer() {
    let (mut primary, mut secondary) = links(1);
    let me = Discovery::new(PRIMARY, "alpha");

    primary
        .send_discovery_xid(6, 0, true, &me)
        .expect("discovery command should send");
    let Some(LinkEvent::DiscoveryXidCmd(cmd)) = next_event(&secondary) else {
        panic!("secondary should see the discovery command");
    };
    assert_eq!((cmd.slots, cmd.slot), (6, 0));
    assert!(cmd.discovery.is_none());

    let reply = Discovery::new(SECONDARY, "bravo")
        .with_hints([0x84, 0x04])
        .with_daddr(PRIMARY);
    secondary
        .send_discovery_xid(cmd.slots, 3, false, &reply)
        .expect("discovery response should send");
    let Some(LinkEvent::DiscoveryXidRsp(rsp)) = next_event(&primary) else {
        panic!("primary should see the discovery response");
    };
    assert_eq!(rsp.discovery.daddr, SECONDARY);
    assert_eq!(rsp.discovery.saddr, PRIMARY);
    assert_eq!(rsp.discovery.hints, [0x84, 0x04]);
    assert_eq!(rsp.discovery.nickname_lossy(), "bravo");

    primary
        .send_discovery_xid(6, FINAL_SLOT, true, &me)
        .expect("final discovery command should send");
    let event = next_event(&secondary).expect("final command should produce an event");
    let found = event.discovery().expect("final command carries information");
    assert_eq!(found.nickname, b"alpha");
    assert_eq!(found.daddr, PRIMARY);
}

#[test]
fn connect_then_recover_from_reject() {
    let (mut primary, mut secondary) = links(3);
    connect(&mut primary, &mut secondary);

    for (index, payload) in [&b"zero"[..], &b"one"[..], &b"two"[..]].into_iter().enumerate() {
        primary
            .send_data(Outbound::Reliable(Bytes::from_static(payload)), index < 2)
            .expect("I frame should send");
    }
    assert_eq!(primary.state(), LapState::NrmP);
    assert_eq!(primary.queue().len(), 3);

    // Secondary accepts frame 0, "loses" frame 1, and rejects frame 2.
    let Some(LinkEvent::I { info, payload }) = next_event(&secondary) else {
        panic!("expected I frame 0");
    };
    assert_eq!((info.ns, info.pf), (Some(0), false));
    assert_eq!(payload.as_ref(), b"zero");
    secondary.set_vr(1);

    let _lost = secondary.sink().recv_frame().expect("frame 1 should arrive");

    let Some(LinkEvent::I { info, .. }) = next_event(&secondary) else {
        panic!("expected I frame 2");
    };
    assert_eq!((info.ns, info.pf), (Some(2), true));
    secondary
        .send_supervisory(SupervisoryKind::Rej, false)
        .expect("REJ should send");

    let Some(LinkEvent::Rej(rej)) = next_event(&primary) else {
        panic!("primary should see REJ");
    };
    assert_eq!(rej.nr, Some(1));
    assert_eq!(primary.acknowledge(1), 1);
    primary
        .resend_rejected_frames(true)
        .expect("resend should succeed");

    for (expected_ns, expected_pf, expected) in [(1, false, &b"one"[..]), (2, true, &b"two"[..])] {
        let Some(LinkEvent::I { info, payload }) = next_event(&secondary) else {
            panic!("expected resent I frame");
        };
        assert_eq!(info.ns, Some(expected_ns));
        assert_eq!(info.pf, expected_pf);
        assert!(info.command);
        assert_eq!(payload.as_ref(), expected);
    }
    secondary.set_vr(3);
    secondary.send_rr(false).expect("RR should send");

    let Some(LinkEvent::Rr(rr)) = next_event(&primary) else {
        panic!("primary should see RR");
    };
    assert_eq!(rr.nr, Some(3));
    assert!(!rr.command);
    assert_eq!(primary.acknowledge(3), 2);
    assert!(primary.queue().is_empty());
    assert_eq!(primary.window(), 3);
}

#[test]
fn secondary_answers_with_final_and_disconnects() {
    let (mut primary, mut secondary) = links(2);
    connect(&mut primary, &mut secondary);

    primary
        .send_data(Outbound::Unreliable(Bytes::from_static(b"hello")), false)
        .expect("UI frame should send");
    let Some(LinkEvent::Ui { info, payload }) = next_event(&secondary) else {
        panic!("secondary should see UI");
    };
    assert!(info.pf);
    assert_eq!(payload.as_ref(), b"hello");

    secondary
        .send_data(Outbound::Reliable(Bytes::from_static(b"reply")), false)
        .expect("final I frame should send");
    let Some(LinkEvent::I { info, .. }) = next_event(&primary) else {
        panic!("primary should see the reply");
    };
    assert!(info.pf);
    assert!(!info.command);

    secondary.send_rd().expect("RD should send");
    assert!(matches!(next_event(&primary), Some(LinkEvent::RdRsp(_))));

    primary.send_disc().expect("DISC should send");
    assert!(matches!(next_event(&secondary), Some(LinkEvent::DiscCmd(_))));
}

#[test]
fn frames_for_other_connections_are_ignored() {
    let (mut primary, mut secondary) = links(1);
    connect(&mut primary, &mut secondary);

    secondary.set_caddr(0x30);
    primary.send_rr(true).expect("RR should send");
    assert!(next_event(&secondary).is_none());
}
