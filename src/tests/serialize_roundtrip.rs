//! Serialize/deserialize recursive Fibonacci round-trip.

use crate::serialize::{deserialize_program, serialize_program, ByteReader, ByteWriter};
use crate::tests::fibonacci::{self, FibSet};

#[test]
fn fibonacci_survives_a_serialize_deserialize_round_trip() {
    let (program, _) = fibonacci::build();

    let mut writer = ByteWriter::new();
    assert!(serialize_program(&program, &mut writer));
    let bytes = writer.into_bytes();

    drop(program);

    let mut reader = ByteReader::new(&bytes);
    let restored = deserialize_program::<FibSet>(&mut reader).unwrap();
    let fib_id = restored.id_of("fib").unwrap();

    assert_eq!(fibonacci::invoke(&restored, fib_id, 15), 610);
}
