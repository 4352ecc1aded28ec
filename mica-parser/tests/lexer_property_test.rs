// mica-parser - Lexer property tests
// Copyright (c) 2025 Tom Waddington. MIT licensed.

use mica_parser::{Lexer, TokenKind};
use proptest::prelude::*;

proptest! {
    // The lexer is total: any input yields tokens or an error, never a
    // panic, and a successful stream always ends with Eof.
    #[test]
    fn lexing_never_panics(s in ".*") {
        if let Ok(tokens) = Lexer::new(&s).tokenize() {
            prop_assert!(!tokens.is_empty());
            prop_assert_eq!(&tokens.last().unwrap().kind, &TokenKind::Eof);
        }
    }

    // Identifier-shaped inputs lex to a single identifier or keyword.
    #[test]
    fn identifiers_lex_whole(s in "[a-zA-Z_][a-zA-Z0-9_]{0,20}") {
        let tokens = Lexer::new(&s).tokenize().unwrap();
        prop_assert_eq!(tokens.len(), 2);
    }

    // Decimal integers survive the octal special case.
    #[test]
    fn decimal_integers_lex_exact(n in 0u64..1_000_000u64) {
        let text = n.to_string();
        let tokens = Lexer::new(&text).tokenize().unwrap();
        match &tokens[0].kind {
            TokenKind::Number(v) => {
                // A leading zero with octal digits reads as base 8; plain
                // decimals (no leading zero) are exact.
                if !text.starts_with('0') || text.len() == 1 {
                    prop_assert_eq!(*v, n as f64);
                }
            }
            other => prop_assert!(false, "expected a number, got {:?}", other),
        }
    }
}
