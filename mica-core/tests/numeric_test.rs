// mica-core - Numeric conversion property tests
// Copyright (c) 2025 Tom Waddington. MIT licensed.

use mica_core::{number_to_string, string_to_number, MicaVal};
use proptest::prelude::*;

proptest! {
    // The shortest round-trip format must actually round-trip.
    #[test]
    fn number_to_string_round_trips(v in proptest::num::f64::NORMAL | proptest::num::f64::ZERO) {
        let text = number_to_string(v);
        let back = string_to_number(&text);
        if v == 0.0 {
            prop_assert_eq!(back, 0.0);
        } else {
            prop_assert_eq!(back, v);
        }
    }

    // String parsing never panics and yields NaN or a number.
    #[test]
    fn string_parsing_is_total(s in ".*") {
        let _ = string_to_number(&s);
    }

    // Integers up to 2^53 are exact.
    #[test]
    fn integers_are_exact(n in -(1i64 << 53)..(1i64 << 53)) {
        let v = n as f64;
        prop_assert!(MicaVal::Number(v).is_integer());
        prop_assert_eq!(string_to_number(&number_to_string(v)), v);
    }
}

#[test]
fn test_special_values() {
    assert_eq!(number_to_string(f64::NAN), "NaN");
    assert_eq!(number_to_string(f64::INFINITY), "Infinity");
    assert!(string_to_number("Infinity").is_nan(), "no textual infinity parsing");
    assert_eq!(MicaVal::Number(f64::NAN).to_int32(), 0);
    assert!(!MicaVal::Number(f64::NAN).is_integer());
    assert!(!MicaVal::Number(f64::INFINITY).is_integer());
}

#[test]
fn test_to_int32_saturates() {
    assert_eq!(MicaVal::Number(1e12).to_int32(), i32::MAX);
    assert_eq!(MicaVal::Number(-1e12).to_int32(), i32::MIN);
    assert_eq!(MicaVal::Number(-7.9).to_int32(), -7);
}
