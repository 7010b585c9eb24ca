//! Property-based tests for argument parsing, call validation and chunking.

use std::collections::BTreeSet;

use proptest::prelude::*;
use serde_json::{Map, Value};

use callwise_core::arguments::{parse_argument_str, parse_arguments};
use callwise_core::function::{FunctionCallDirective, Functions, PropertySchema, compose_function};
use callwise_core::tokens::{chunk_prompt, count_tokens};
use callwise_core::types::FunctionCallPayload;
use callwise_core::validate::validate_function_call;

const MODEL: &str = "gpt-3.5-turbo-0613";

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

fn arb_json() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        "[a-zA-Z0-9 ]{0,12}".prop_map(Value::String),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                .prop_map(|entries| Value::Object(entries.into_iter().collect::<Map<_, _>>())),
        ]
    })
}

fn arb_object() -> impl Strategy<Value = Value> {
    prop::collection::btree_map("[a-z]{1,6}", arb_json(), 0..5)
        .prop_map(|entries| Value::Object(entries.into_iter().collect()))
}

const KEYS: [&str; 5] = ["lyrics", "title", "mood", "tempo", "key"];

fn arb_key_set() -> impl Strategy<Value = BTreeSet<&'static str>> {
    prop::collection::btree_set(prop::sample::select(KEYS.to_vec()), 0..=KEYS.len())
}

const WORDS: [&str; 10] = ["the", "time", "song", "about", "rust", "model", "token", "budget", "write", "fast"];

fn arb_text() -> impl Strategy<Value = String> {
    let sentence = (
        prop::collection::vec(prop::sample::select(WORDS.to_vec()), 1..12),
        prop::sample::select(vec![".", "!", "?"]),
    )
        .prop_map(|(words, end)| format!("{}{end}", words.join(" ")));
    prop::collection::vec(sentence, 0..8).prop_map(|sentences| sentences.join(" "))
}

// ---------------------------------------------------------------------------
// Property: structured payloads pass through unchanged
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn structured_payloads_are_returned_unchanged(value in arb_object()) {
        prop_assert_eq!(parse_arguments(&value), Some(value.clone()));
    }

    #[test]
    fn json_text_parses_to_its_value(value in arb_json()) {
        let encoded = serde_json::to_string(&value).expect("serialize");
        prop_assert_eq!(parse_argument_str(&encoded), Some(value));
    }

    #[test]
    fn parsing_is_idempotent(raw in ".{0,40}") {
        let once = parse_argument_str(&raw);
        if let Some(value) = once.as_ref().filter(|v| v.is_object() || v.is_array()) {
            let reparsed = parse_arguments(value);
            prop_assert_eq!(reparsed.as_ref(), Some(value));
        }
    }
}

// ---------------------------------------------------------------------------
// Property: a call is valid exactly when it supplies every required key
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn validity_is_required_subset_containment(required in arb_key_set(), supplied in arb_key_set()) {
        let schema = compose_function(
            "write_song",
            "Write a song",
            KEYS.iter().map(|key| (*key, PropertySchema::string(*key))),
            required.iter().copied(),
        )
        .expect("every required key is declared");
        let functions = Functions::from(schema);

        let arguments: Map<String, Value> = supplied
            .iter()
            .map(|key| ((*key).to_string(), Value::String("x".into())))
            .collect();
        let call = FunctionCallPayload::new("write_song", Value::Object(arguments).to_string());

        let verdict = validate_function_call(
            Some(&call),
            &functions,
            &FunctionCallDirective::named("write_song"),
            false,
        );
        prop_assert_eq!(verdict.is_ok(), required.is_subset(&supplied));
    }
}

// ---------------------------------------------------------------------------
// Property: chunks respect the budget and lose no text
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn chunks_respect_budget(text in arb_text(), budget in 1usize..24) {
        let chunks = chunk_prompt(&text, budget, MODEL).expect("chunk");
        for chunk in &chunks {
            prop_assert!(!chunk.trim().is_empty());
            let tokens = count_tokens(chunk, MODEL).expect("count");
            prop_assert!(tokens <= budget, "{chunk:?} has {tokens} tokens, budget {budget}");
        }

        let squash = |s: &str| s.split_whitespace().collect::<String>();
        prop_assert_eq!(squash(&chunks.concat()), squash(&text));
    }
}
