//! Decoder fixture and writer round-trip scenarios for the CBOR codec.

use tree_gen::cbor::{Reader, Writer};

/// Known-good CBOR covering every supported kind and integer width.
const TEST_CBOR: &[u8] = &[
    0x89, // array(9)
    0xF6, // null
    0xF4, // false
    0xF5, // true
    0x8B, // array(11)
    0x00, // unsigned(0)
    0x01, // unsigned(1)
    0x17, // unsigned(23)
    0x18, 0x18, // unsigned(24)
    0x18, 0xFF, // unsigned(255)
    0x19, 0x01, 0x00, // unsigned(256)
    0x19, 0xFF, 0xFF, // unsigned(65535)
    0x1A, 0x00, 0x01, 0x00, 0x00, // unsigned(65536)
    0x1A, 0xFF, 0xFF, 0xFF, 0xFF, // unsigned(4294967295)
    0x1B, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, // unsigned(4294967296)
    0x1B, 0x7F, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, // unsigned(2^63-1)
    0x9F, // array(*)
    0x20, // negative(0)
    0x37, // negative(23)
    0x38, 0x18, // negative(24)
    0x38, 0xFF, // negative(255)
    0x39, 0x01, 0x00, // negative(256)
    0x39, 0xFF, 0xFF, // negative(65535)
    0x3A, 0x00, 0x01, 0x00, 0x00, // negative(65536)
    0x3A, 0xFF, 0xFF, 0xFF, 0xFF, // negative(4294967295)
    0x3B, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, // negative(4294967296)
    0x3B, 0x7F, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, // negative(2^63-1)
    0xFF, // break
    0xFB, 0x40, 0x09, 0x21, 0xFB, 0x54, 0x44, 0x2E, 0xEA, // double(3.14159265359)
    0x65, b'h', b'e', b'l', b'l', b'o', // text(5) "hello"
    0x45, b'w', b'o', b'r', b'l', b'd', // bytes(5) "world"
    0xA2, // map(2)
    0x61, b'a', 0x61, b'b', // "a": "b"
    0x61, b'c', 0x61, b'd', // "c": "d"
];

#[test]
fn reader_decodes_the_fixture() {
    let reader = Reader::new(TEST_CBOR.to_vec()).expect("fixture is valid CBOR");
    assert!(reader.is_array());
    let items = reader.as_array().unwrap();
    assert_eq!(items.len(), 9);

    assert!(items[0].is_null());
    items[0].as_null().unwrap();
    assert!(items[1].is_bool());
    assert!(!items[1].as_bool().unwrap());
    assert!(items[2].is_bool());
    assert!(items[2].as_bool().unwrap());

    assert!(items[3].is_array());
    let unsigned = items[3].as_array().unwrap();
    assert_eq!(unsigned.len(), 11);
    let expected: [i64; 11] = [
        0,
        1,
        23,
        24,
        255,
        256,
        65535,
        65536,
        4294967295,
        4294967296,
        9223372036854775807,
    ];
    for (item, want) in unsigned.iter().zip(expected) {
        assert!(item.is_int());
        assert_eq!(item.as_int().unwrap(), want);
    }

    let negative = items[4].as_array().unwrap();
    assert_eq!(negative.len(), 10);
    let expected: [i64; 10] = [
        -1,
        -24,
        -25,
        -256,
        -257,
        -65536,
        -65537,
        -4294967296,
        -4294967297,
        i64::MIN,
    ];
    for (item, want) in negative.iter().zip(expected) {
        assert!(item.is_int());
        assert_eq!(item.as_int().unwrap(), want);
    }

    assert!(items[5].is_float());
    assert_eq!(items[5].as_float().unwrap(), 3.14159265359);
    assert!(items[6].is_string());
    assert_eq!(items[6].as_string().unwrap(), "hello");
    assert!(items[7].is_binary());
    assert_eq!(items[7].as_binary().unwrap(), b"world");

    assert!(items[8].is_map());
    let map = items[8].as_map().unwrap();
    assert_eq!(map.len(), 2);
    assert_eq!(map.get("a").unwrap().as_string().unwrap(), "b");
    assert_eq!(map.get("c").unwrap().as_string().unwrap(), "d");
}

#[test]
fn reader_rejects_unsigned_two_to_the_63() {
    let reader = Reader::new(vec![0x1B, 0x80, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00])
        .expect("valid CBOR structure");
    let err = reader.as_int().expect_err("out of int64 range");
    assert_eq!(err.to_string(), "CBOR integer out of int64 range");
}

#[test]
fn writer_output_reads_back_exactly() {
    let ints: [i64; 10] = [
        0x3,
        0x34,
        0x3456,
        0x3456789A,
        0x3456789ABCDEF012,
        -0x3,
        -0x34,
        -0x3456,
        -0x3456789A,
        -0x3456789ABCDEF012,
    ];

    let mut writer = Writer::new();
    {
        let mut outer = writer.start().unwrap();
        outer.append_null("null").unwrap();
        outer.append_bool("false", false).unwrap();
        outer.append_bool("true", true).unwrap();
        let mut int_array = outer.append_array("int-array").unwrap();
        for value in ints {
            int_array.append_int(value).unwrap();
        }
        int_array.close().unwrap();
        outer.append_float("pi", 3.14159265359).unwrap();
        outer.append_string("string", "hello").unwrap();
        outer.append_binary("binary", b"world").unwrap();
        outer.close().unwrap();
    }
    let encoded = writer.into_bytes();

    let reader = Reader::new(encoded).expect("writer output is valid CBOR");
    let map = reader.as_map().unwrap();
    assert_eq!(map.len(), 7);
    map.get("null").unwrap().as_null().unwrap();
    assert!(!map.get("false").unwrap().as_bool().unwrap());
    assert!(map.get("true").unwrap().as_bool().unwrap());
    let int_array = map.get("int-array").unwrap().as_array().unwrap();
    assert_eq!(int_array.len(), 10);
    for (item, want) in int_array.iter().zip(ints) {
        assert_eq!(item.as_int().unwrap(), want);
    }
    assert_eq!(map.get("pi").unwrap().as_float().unwrap(), 3.14159265359);
    assert_eq!(map.get("string").unwrap().as_string().unwrap(), "hello");
    assert_eq!(map.get("binary").unwrap().as_binary().unwrap(), b"world");
}

#[test]
fn scalar_roundtrip_through_map_values() {
    // A spread of values per kind, written and read back unchanged.
    let doubles = [0.0, -0.0, 1.5, -2.25, 1.0e300, f64::MIN_POSITIVE];
    let strings = ["", "a", "snowman \u{2603}", "multi\nline"];

    let mut writer = Writer::new();
    {
        let mut map = writer.start().unwrap();
        let mut array = map.append_array("doubles").unwrap();
        for value in doubles {
            array.append_float(value).unwrap();
        }
        array.close().unwrap();
        let mut array = map.append_array("strings").unwrap();
        for value in strings {
            array.append_string(value).unwrap();
        }
        array.close().unwrap();
        map.close().unwrap();
    }

    let reader = Reader::new(writer.into_bytes()).unwrap();
    let map = reader.as_map().unwrap();
    let got = map.get("doubles").unwrap().as_array().unwrap();
    for (item, want) in got.iter().zip(doubles) {
        assert_eq!(item.as_float().unwrap().to_bits(), want.to_bits());
    }
    let got = map.get("strings").unwrap().as_array().unwrap();
    for (item, want) in got.iter().zip(strings) {
        assert_eq!(item.as_string().unwrap(), want);
    }
}
