use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;

use goatherd::enums::{RecordClass, RecordType};
use goatherd::message::{Message, Question, ResourceRecord};
use goatherd::name::{name_from_bytes, DnsName};
use goatherd::rdata::RecordData;

fn criterion_benchmark(c: &mut Criterion) {
    let input = [7, 101, 120, 97, 109, 112, 108, 101, 3, 99, 111, 109, 0].to_vec();
    c.bench_function("name_from_bytes", |b| {
        b.iter(|| name_from_bytes(black_box(&input), 0))
    });

    let mut message = Message::default();
    let qname = DnsName::try_from("bench.example.goat").expect("name should parse");
    message.questions.push(Question::new(qname.clone(), RecordType::A));
    for _ in 0..4 {
        message.answers.push(ResourceRecord::new(
            qname.clone(),
            RecordType::A,
            RecordClass::Internet,
            300,
            RecordData::A {
                address: "192.0.2.1".parse().expect("address should parse"),
            },
        ));
    }
    let encoded = message
        .as_bytes(true)
        .expect("bench message should encode");
    c.bench_function("message_from_bytes", |b| {
        b.iter(|| Message::from_bytes(black_box(&encoded)))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
