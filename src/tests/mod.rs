mod e2e_test;

use packed_struct::prelude::*;

use crate::enums::{OpCode, PacketType, Rcode, RecordClass, RecordType};
use crate::error::GoatHerdError;
use crate::message::{Message, Question, ResourceRecord};
use crate::name::{name_as_bytes, name_from_bytes, DnsName, NameCompressor};
use crate::rdata::{DnsCharString, RecordData};
use crate::Header;

fn name(input: &str) -> DnsName {
    DnsName::try_from(input).expect("test name should parse")
}

#[test]
fn test_header_wire_format() {
    // RD|standard query with one question
    let header = Header {
        id: 0x1234,
        qr: PacketType::Query,
        opcode: OpCode::Query,
        authoritative: false,
        truncated: false,
        recursion_desired: true,
        recursion_available: false,
        z: false,
        ad: false,
        cd: false,
        rcode: Rcode::NoError,
        qdcount: 1,
        ancount: 0,
        nscount: 0,
        arcount: 0,
    };
    let packed = header.pack().expect("header should pack");
    assert_eq!(
        packed,
        [0x12, 0x34, 0x01, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]
    );
    assert_eq!(Header::unpack(&packed).expect("header should unpack"), header);
}

#[test]
fn test_name_to_bytes() {
    let mut buf = vec![];
    name_as_bytes(&name("cheese.world"), &mut buf, None).expect("name should encode");
    assert_eq!(buf, [6, 99, 104, 101, 101, 115, 101, 5, 119, 111, 114, 108, 100, 0]);
}

#[test]
fn test_name_roundtrip() {
    for input in ["example.com", "a.b.c.d.e", "com", "_goat._tcp.local"] {
        let original = name(input);
        let mut buf = vec![];
        name_as_bytes(&original, &mut buf, None).expect("name should encode");
        let (parsed, next) = name_from_bytes(&buf, 0).expect("name should parse");
        assert_eq!(parsed, original);
        assert_eq!(next, buf.len());
        assert_eq!(parsed.to_string(), input);
    }
}

#[test]
fn test_name_roundtrip_compressed() {
    let original = name("b.example.com");
    let mut buf = vec![];
    let mut compressor = NameCompressor::new();
    name_as_bytes(&name("a.example.com"), &mut buf, Some(&mut compressor))
        .expect("name should encode");
    let second_start = buf.len();
    name_as_bytes(&original, &mut buf, Some(&mut compressor)).expect("name should encode");

    let (parsed, next) = name_from_bytes(&buf, second_start).expect("name should parse");
    assert_eq!(parsed, original);
    assert_eq!(next, buf.len());
}

#[test]
fn test_name_limits() {
    let long_label = "a".repeat(64);
    assert!(DnsName::try_from(long_label.as_str()).is_err());
    assert!(DnsName::try_from("").is_err());

    // 5 x (62 + separator) puts the encoded form over 255
    let long_name = vec!["b".repeat(62); 5].join(".");
    assert!(DnsName::try_from(long_name.as_str()).is_err());

    let just_fits = "c".repeat(63);
    assert!(DnsName::try_from(just_fits.as_str()).is_ok());
}

#[test]
fn test_compression_shared_suffix() {
    // second name collapses to one label and a pointer at offset 2,
    // where "example.com" starts inside the first name
    let mut buf = vec![];
    let mut compressor = NameCompressor::new();
    name_as_bytes(&name("a.example.com"), &mut buf, Some(&mut compressor))
        .expect("name should encode");
    let second_start = buf.len();
    name_as_bytes(&name("b.example.com"), &mut buf, Some(&mut compressor))
        .expect("name should encode");

    assert_eq!(&buf[second_start..], &[1, b'b', 0xC0, 0x02]);
}

#[test]
fn test_compressed_questions_match_uncompressed() {
    let mut message = Message::default();
    message
        .questions
        .push(Question::new(name("a.example.com"), RecordType::A));
    message
        .questions
        .push(Question::new(name("b.example.com"), RecordType::A));
    message.header.qdcount = 2;

    let compressed = message.as_bytes(true).expect("message should encode");
    let plain = message.as_bytes(false).expect("message should encode");
    assert!(compressed.len() < plain.len());

    let from_compressed = Message::from_bytes(&compressed).expect("message should parse");
    let from_plain = Message::from_bytes(&plain).expect("message should parse");
    assert_eq!(from_compressed.questions, from_plain.questions);
}

#[test]
fn test_pointer_cycle_fails() {
    // label then a pointer straight back to it - the bounds have to kill this
    let buf = [1, b'a', 0xC0, 0x00];
    assert!(name_from_bytes(&buf, 0).is_err());
}

#[test]
fn test_forward_pointer_fails() {
    let buf = [0, 0, 0xC0, 0x08, 0, 0, 0, 0, 0, 0];
    assert!(name_from_bytes(&buf, 2).is_err());
}

#[test]
fn test_reserved_label_types_fail() {
    assert!(name_from_bytes(&[0x40, 0x01, 0x00], 0).is_err());
    assert!(name_from_bytes(&[0x80, 0x01, 0x00], 0).is_err());
}

#[test]
fn test_truncated_name_fails() {
    // claims 5 bytes of label, buffer runs out
    assert!(name_from_bytes(&[5, b'a', b'b'], 0).is_err());
    // never terminates
    assert!(name_from_bytes(&[1, b'a'], 0).is_err());
}

#[test]
fn test_class_and_flush_flag_roundtrip() {
    for class in [1u16, 3, 4] {
        for flush in [false, true] {
            let mut message = Message::default();
            message.answers.push(ResourceRecord {
                name: name("flags.example.goat"),
                rrtype: 999,
                class: RecordClass::from(class),
                cache_flush: flush,
                ttl: 60,
                rdata: RecordData::Other {
                    rdata: vec![0xde, 0xad],
                },
            });

            let buf = message.as_bytes(false).expect("message should encode");
            let parsed = Message::from_bytes(&buf).expect("message should parse");
            assert_eq!(parsed.answers[0].class, RecordClass::from(class));
            assert_eq!(parsed.answers[0].cache_flush, flush);
        }
    }
}

#[test]
fn test_unicast_response_flag_roundtrip() {
    let mut question = Question::new(name("_goat._tcp.local"), RecordType::PTR);
    question.unicast_response = true;

    let mut message = Message::default();
    message.questions.push(question.clone());
    let buf = message.as_bytes(false).expect("message should encode");

    // top bit of the class word on the wire, bit off the class itself
    let parsed = Message::from_bytes(&buf).expect("message should parse");
    assert_eq!(parsed.questions[0], question);
    assert_eq!(parsed.questions[0].qclass, RecordClass::Internet);
}

#[test]
fn test_message_roundtrip_all_types() {
    let mut message = Message::default();
    message.header.id = 0xbeef;
    message.header.qr = PacketType::Answer;
    message
        .questions
        .push(Question::new(name("host.example.goat"), RecordType::ANY));
    message.answers.push(ResourceRecord::new(
        name("host.example.goat"),
        RecordType::A,
        RecordClass::Internet,
        300,
        RecordData::A {
            address: "192.0.2.7".parse().expect("address should parse"),
        },
    ));
    message.answers.push(ResourceRecord::new(
        name("host.example.goat"),
        RecordType::AAAA,
        RecordClass::Internet,
        300,
        RecordData::AAAA {
            address: "2001:db8::7".parse().expect("address should parse"),
        },
    ));
    message.answers.push(ResourceRecord::new(
        name("host.example.goat"),
        RecordType::TXT,
        RecordClass::Internet,
        300,
        RecordData::TXT {
            txtdata: DnsCharString::from("name=Billy"),
            key: "name".to_string(),
            value: "Billy".to_string(),
        },
    ));
    message.authorities.push(ResourceRecord::new(
        name("_goat._tcp.local"),
        RecordType::PTR,
        RecordClass::Internet,
        10,
        RecordData::PTR {
            ptrdname: name("billy._goat._tcp.local"),
        },
    ));
    message.additionals.push(ResourceRecord::new(
        name("billy._goat._tcp.local"),
        RecordType::SRV,
        RecordClass::Internet,
        120,
        RecordData::SRV {
            priority: 0,
            weight: 5,
            port: 8053,
            target: name("host.example.goat"),
        },
    ));
    // counts the way the encoder will write them
    message.header.qdcount = 1;
    message.header.ancount = 3;
    message.header.nscount = 1;
    message.header.arcount = 1;

    for compress in [false, true] {
        let buf = message.as_bytes(compress).expect("message should encode");
        let parsed = Message::from_bytes(&buf).expect("message should parse");
        assert_eq!(parsed, message);
    }
}

#[test]
fn test_aaaa_parse() {
    let buf = [
        0x20, 0x01, 0x0D, 0xB8, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x01,
    ];
    let parsed = RecordData::from_bytes(28, &buf, 0, 16).expect("AAAA should parse");
    assert_eq!(
        parsed,
        RecordData::AAAA {
            address: "2001:db8::1".parse().expect("address should parse"),
        }
    );
}

#[test]
fn test_a_record_wrong_length() {
    let res = RecordData::from_bytes(1, &[1, 2, 3], 0, 3);
    assert!(matches!(res, Err(GoatHerdError::Unsupported(_))));
}

#[test]
fn test_unknown_rrtype_survives_roundtrip() {
    let mut message = Message::default();
    message.answers.push(ResourceRecord {
        name: name("odd.example.goat"),
        rrtype: 999,
        class: RecordClass::Internet,
        cache_flush: false,
        ttl: 30,
        rdata: RecordData::Other {
            rdata: vec![1, 2, 3, 4, 5],
        },
    });
    // a second record after the unknown one proves the reader advanced correctly
    message.answers.push(ResourceRecord::new(
        name("odd.example.goat"),
        RecordType::A,
        RecordClass::Internet,
        30,
        RecordData::A {
            address: "192.0.2.1".parse().expect("address should parse"),
        },
    ));
    message.header.ancount = 2;

    let buf = message.as_bytes(false).expect("message should encode");
    let parsed = Message::from_bytes(&buf).expect("message should parse");
    assert_eq!(parsed.answers[0].rrtype, 999);
    assert_eq!(
        parsed.answers[0].rdata,
        RecordData::Other {
            rdata: vec![1, 2, 3, 4, 5]
        }
    );
    assert_eq!(parsed.answers[1], message.answers[1]);
}

#[test]
fn test_every_record_type_conversion_roundtrips() {
    for rrtype in enum_iterator::all::<RecordType>() {
        if rrtype == RecordType::InvalidType {
            continue;
        }
        assert_eq!(RecordType::from(&(rrtype as u16)), rrtype);
        let label: &'static str = rrtype.into();
        assert_eq!(RecordType::from(label), rrtype);
    }
}

#[test]
fn test_every_known_qtype_roundtrips_in_a_question() {
    for qtype in enum_iterator::all::<RecordType>() {
        if qtype == RecordType::InvalidType {
            continue;
        }
        let mut message = Message::default();
        message
            .questions
            .push(Question::new(name("types.example.goat"), qtype));

        let buf = message.as_bytes(false).expect("question should encode");
        let parsed = Message::from_bytes(&buf).expect("question should parse");
        assert_eq!(parsed.questions[0].qtype, qtype);
    }
}

#[test]
fn test_unknown_question_type_fails() {
    // hand-build a question with an unassigned QTYPE
    let mut buf = vec![];
    let header = Header {
        qdcount: 1,
        ..Header::default()
    };
    buf.extend(header.pack().expect("header should pack"));
    name_as_bytes(&name("odd.example.goat"), &mut buf, None).expect("name should encode");
    buf.extend(999u16.to_be_bytes());
    buf.extend(1u16.to_be_bytes());

    assert!(Message::from_bytes(&buf).is_err());
}

#[test]
fn test_short_buffer_fails() {
    assert!(Message::from_bytes(&[0x12, 0x34, 0x01]).is_err());

    // header promises a question that isn't there
    let header = Header {
        qdcount: 1,
        ..Header::default()
    };
    let buf = header.pack().expect("header should pack");
    assert!(Message::from_bytes(&buf).is_err());
}
