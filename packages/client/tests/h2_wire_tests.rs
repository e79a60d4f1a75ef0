//! HTTP/2 wire-level properties: preface frame ordering and header-block
//! round trips.

use bytes::BytesMut;
use guise_client::fingerprint::h2::SettingId;
use guise_client::fingerprint::profiles;
use guise_client::protocols::h2::frames::{self, Frame};
use guise_client::protocols::h2::hpack;

fn frames_of(bytes: &[u8]) -> Vec<Frame> {
    let mut buf = BytesMut::from(bytes);
    let mut out = Vec::new();
    while let Some(frame) = frames::parse(&mut buf, 1 << 24).unwrap() {
        out.push(frame);
    }
    out
}

#[test]
fn chrome_preface_is_settings_then_window_update() {
    let plan = frames::connection_preface(&profiles::chrome().h2);
    assert!(plan.starts_with(frames::PREFACE));

    let frames = frames_of(&plan[frames::PREFACE.len()..]);
    match &frames[0] {
        Frame::Settings { ack, settings } => {
            assert!(!ack);
            let ids: Vec<u16> = settings.iter().map(|(id, _)| *id).collect();
            assert_eq!(
                ids,
                vec![
                    SettingId::HeaderTableSize.code(),
                    SettingId::EnablePush.code(),
                    SettingId::InitialWindowSize.code(),
                    SettingId::MaxHeaderListSize.code(),
                ]
            );
        }
        other => panic!("first frame must be SETTINGS, got {other:?}"),
    }
    assert!(matches!(
        frames[1],
        Frame::WindowUpdate {
            stream_id: 0,
            increment: 15_663_105
        }
    ));
    assert_eq!(frames.len(), 2, "chrome emits no PRIORITY pre-frames");
}

#[test]
fn firefox_preface_carries_priority_tree() {
    let plan = frames::connection_preface(&profiles::firefox().h2);
    let frames = frames_of(&plan[frames::PREFACE.len()..]);

    let priorities: Vec<(u32, u32, u8)> = frames
        .iter()
        .skip(2)
        .map(|frame| match frame {
            Frame::Priority { stream_id, priority } => {
                (*stream_id, priority.depends_on, priority.weight)
            }
            other => panic!("expected PRIORITY, got {other:?}"),
        })
        .collect();
    assert_eq!(
        priorities,
        vec![
            (3, 0, 200),
            (5, 0, 100),
            (7, 0, 0),
            (9, 7, 0),
            (11, 3, 0),
            (13, 0, 240),
        ]
    );
}

#[test]
fn ordered_headers_survive_hpack() {
    let fields = vec![
        (":method".to_string(), "GET".to_string()),
        (":path".to_string(), "/".to_string()),
        (":authority".to_string(), "example.com".to_string()),
        (":scheme".to_string(), "https".to_string()),
        ("accept".to_string(), "text/html".to_string()),
        ("x-first".to_string(), "1".to_string()),
        ("x-second".to_string(), "2".to_string()),
        ("accept".to_string(), "application/json".to_string()),
    ];
    let block = hpack::encode_block(&fields);
    let decoded = hpack::Decoder::new(4096).decode(&block).unwrap();
    assert_eq!(decoded, fields);
}

#[test]
fn zero_window_delta_suppresses_the_frame() {
    let mut settings = profiles::chrome().h2;
    settings.connection_flow = 0;
    let plan = frames::connection_preface(&settings);
    let frames = frames_of(&plan[frames::PREFACE.len()..]);
    assert!(frames
        .iter()
        .all(|f| !matches!(f, Frame::WindowUpdate { .. })));
}
