//! Criterion benchmarks for the management frame codec.
//!
//! Measures encode and decode latency for the frames the MLME builds on its
//! hot paths (authentication, association, deauthentication, beacons from
//! neighbours) plus shared-key WEP.
//!
//! Run with:
//! ```bash
//! cargo bench --package wlan-mlme-core --bench codec_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use wlan_mlme_core::protocol::frames::{
    AssocRequest, AssocResponse, AuthAlgorithm, Authentication, BeaconBody, CapabilityInfo, Disconnect,
    MgmtBody, MgmtFrame, ReasonCode, StatusCode,
};
use wlan_mlme_core::protocol::ie::{ErpInfo, HtCapabilities, HtOperation, VhtCapabilities};
use wlan_mlme_core::protocol::{decode_frame, encode_frame, wep, MacAddr};

const AP: MacAddr = MacAddr([0xaa, 0xbb, 0xcc, 0x00, 0x00, 0x01]);
const STA: MacAddr = MacAddr([0x02, 0x00, 0x00, 0x00, 0x00, 0x07]);

// ── Frame fixtures ────────────────────────────────────────────────────────────

fn rates() -> Vec<u8> {
    vec![0x82, 0x84, 0x8b, 0x96, 0x0c, 0x12, 0x18, 0x24, 0x30, 0x48, 0x60, 0x6c]
}

fn make_auth1() -> MgmtFrame {
    MgmtFrame::new(
        AP,
        STA,
        AP,
        MgmtBody::Authentication(Authentication::new(AuthAlgorithm::OpenSystem, 1, StatusCode::SUCCESS)),
    )
}

fn make_assoc_request() -> MgmtFrame {
    MgmtFrame::new(
        AP,
        STA,
        AP,
        MgmtBody::AssocRequest(AssocRequest {
            capability: CapabilityInfo(CapabilityInfo::ESS | CapabilityInfo::QOS),
            listen_interval: 10,
            ssid: b"bench-net".to_vec(),
            rates: rates(),
            ht_cap: Some(HtCapabilities::default()),
            vht_cap: Some(VhtCapabilities::default()),
            rsn: Some(vec![0x01, 0x00, 0x00, 0x0f, 0xac, 0x04]),
            ..Default::default()
        }),
    )
}

fn make_assoc_response() -> MgmtFrame {
    MgmtFrame::new(
        STA,
        AP,
        AP,
        MgmtBody::AssocResponse(AssocResponse {
            capability: CapabilityInfo(CapabilityInfo::ESS),
            status: StatusCode::SUCCESS,
            aid: 1,
            rates: rates(),
            ht_cap: Some(HtCapabilities::default()),
            ht_op: Some(HtOperation::default()),
            erp: Some(ErpInfo(0)),
            ..Default::default()
        }),
    )
}

fn make_beacon() -> MgmtFrame {
    MgmtFrame::new(
        MacAddr::BROADCAST,
        AP,
        AP,
        MgmtBody::Beacon(BeaconBody {
            timestamp: 123_456_789,
            beacon_interval: 100,
            capability: CapabilityInfo(CapabilityInfo::ESS),
            ssid: b"bench-net".to_vec(),
            rates: rates(),
            channel: Some(6),
            erp: Some(ErpInfo(0)),
            ht_cap: Some(HtCapabilities::default()),
            ht_op: Some(HtOperation::default()),
            ..Default::default()
        }),
    )
}

fn make_deauth() -> MgmtFrame {
    MgmtFrame::new(AP, STA, AP, MgmtBody::Deauthentication(Disconnect::new(ReasonCode::LEAVING_NETWORK_DEAUTH)))
}

fn fixtures() -> Vec<(&'static str, MgmtFrame)> {
    vec![
        ("Auth1", make_auth1()),
        ("AssocRequest", make_assoc_request()),
        ("AssocResponse", make_assoc_response()),
        ("Beacon", make_beacon()),
        ("Deauth", make_deauth()),
    ]
}

// ── Benchmark groups ──────────────────────────────────────────────────────────

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_frame");
    for (name, frame) in fixtures() {
        group.bench_with_input(BenchmarkId::new("frame", name), &frame, |b, frame| {
            b.iter(|| encode_frame(black_box(frame)).expect("encode must succeed"))
        });
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_frame");
    for (name, frame) in fixtures() {
        let bytes = encode_frame(&frame).expect("encode must succeed for benchmark setup");
        group.bench_with_input(BenchmarkId::new("frame", name), &bytes, |b, bytes| {
            b.iter(|| decode_frame(black_box(bytes)).expect("decode must succeed"))
        });
    }
    group.finish();
}

/// Shared-key frame 3: 128-byte challenge, encrypt then decrypt.
fn bench_wep(c: &mut Criterion) {
    let key = [0x11u8; 13];
    let plaintext: Vec<u8> = (0..136).map(|i| i as u8).collect();
    let mut group = c.benchmark_group("wep");
    group.bench_function("encrypt_decrypt_auth3", |b| {
        b.iter(|| {
            let body = wep::encrypt(black_box(&key), 0, [1, 2, 3], black_box(&plaintext)).unwrap();
            wep::decrypt(black_box(&key), black_box(&body)).unwrap()
        })
    });
    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode, bench_wep);
criterion_main!(benches);
