//! Codec benchmarks for chatbridge-protocol.

use chatbridge_protocol::{codec, ChannelRecord, Frame, MessageRecord, Notification, Reply};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

fn message(index: u64) -> MessageRecord {
    MessageRecord {
        sid: format!("IM{index:032x}"),
        channel_sid: "CH00000000000000000000000000000001".into(),
        body: "x".repeat(64),
        timestamp: 1_700_000_000_000 + index,
        author: "alice".into(),
        index,
    }
}

fn bench_encode_notification(c: &mut Criterion) {
    let frame = Frame::notification(Notification::MessageAdded(message(1)));

    let mut group = c.benchmark_group("encode");
    group.bench_function("message_added", |b| {
        b.iter(|| codec::encode(black_box(&frame)))
    });
    group.finish();
}

fn bench_decode_page(c: &mut Criterion) {
    let page: Vec<MessageRecord> = (0..300).map(message).collect();
    let frame = Frame::response(1, Reply::Messages(page));
    let encoded = codec::encode(&frame).unwrap();

    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Bytes(encoded.len() as u64));
    group.bench_function("full_page_300", |b| {
        b.iter(|| codec::decode(black_box(&encoded)))
    });
    group.finish();
}

fn bench_roundtrip_channel_list(c: &mut Criterion) {
    let channels = (0..50)
        .map(|i| ChannelRecord {
            sid: format!("CH{i:032x}"),
            unique_name: Some(format!("channel-{i}")),
            friendly_name: Some(format!("Channel {i}")),
            members: vec!["alice".into(), "bob".into(), "carol".into()],
        })
        .collect();
    let frame = Frame::response(2, Reply::Channels(channels));

    c.bench_function("roundtrip_channels_50", |b| {
        b.iter(|| {
            let encoded = codec::encode(black_box(&frame)).unwrap();
            codec::decode(black_box(&encoded)).unwrap()
        })
    });
}

criterion_group!(
    benches,
    bench_encode_notification,
    bench_decode_page,
    bench_roundtrip_channel_list
);
criterion_main!(benches);
