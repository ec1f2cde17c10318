use cardstream::partial::parse_partial;
use serde_json::Value;

const DOCUMENTS: &[&str] = &[
    r#"{"title":"Acme","sections":[{"title":"Info","type":"metrics","fields":[{"label":"A","value":"1"}]}]}"#,
    r#"{"title":"Q3 \"review\"","sections":[{"type":"timeline","items":[{"title":"Kickoff","value":"2024-01-02"},{"title":"Ship","value":null}]},{"type":"contact","fields":[{"label":"Phone","value":"+1 555"},{"label":"Tags","value":["a","b"]}]}],"actions":[{"label":"Open","type":"link","url":"https://example.com"}]}"#,
    r#"{"n":-12.5e3,"flags":[true,false,null],"nested":{"deep":{"deeper":[1,[2,[3,{}]]]}},"empty":[]}"#,
    r#"{"unicode":"héllo wörld 😀","escaped":"line\nbreak\ttab é 😀","slash":"a\/b"}"#,
    "{\n  \"pretty\": [\n    {\"k\": 1},\n    {\"k\": 2}\n  ]\n}\n",
];

/// `partial` could still grow into `full`: object keys are a subset, arrays
/// are no longer, and every scalar that arrived is already final.
fn is_prefix_shape(partial: &Value, full: &Value) -> bool {
    match (partial, full) {
        (Value::Object(part), Value::Object(whole)) => part.iter().all(|(key, value)| {
            whole
                .get(key)
                .is_some_and(|target| is_prefix_shape(value, target))
        }),
        (Value::Array(part), Value::Array(whole)) => {
            part.len() <= whole.len()
                && part
                    .iter()
                    .zip(whole)
                    .all(|(value, target)| is_prefix_shape(value, target))
        }
        (part, whole) => part == whole,
    }
}

fn char_boundaries(text: &str) -> impl Iterator<Item = usize> + '_ {
    text.char_indices()
        .map(|(index, _)| index)
        .chain(std::iter::once(text.len()))
}

#[test]
fn every_truncation_parses_to_a_prefix_shape() {
    for doc in DOCUMENTS {
        let full: Value = serde_json::from_str(doc).unwrap();
        for k in char_boundaries(doc) {
            let parsed = parse_partial(&doc[..k])
                .unwrap_or_else(|err| panic!("prefix {k} of {doc} failed: {err}"));
            assert!(
                is_prefix_shape(&parsed.value, &full),
                "prefix {k} of {doc} produced {}",
                parsed.value
            );
        }
    }
}

#[test]
fn longer_prefixes_never_lose_data() {
    for doc in DOCUMENTS {
        let mut previous = parse_partial("").unwrap().value;
        for k in char_boundaries(doc) {
            let current = parse_partial(&doc[..k]).unwrap().value;
            assert!(
                is_prefix_shape(&previous, &current),
                "prefix {k} of {doc}: {previous} is not contained in {current}"
            );
            previous = current;
        }
    }
}

#[test]
fn complete_documents_match_serde_json() {
    for doc in DOCUMENTS {
        let expected: Value = serde_json::from_str(doc).unwrap();
        let parsed = parse_partial(doc).unwrap();
        assert!(parsed.is_complete, "{doc} should be complete");
        assert_eq!(parsed.value, expected);
        assert!(parsed.open_path.is_empty());

        // Re-parsing the same input gives the same answer.
        assert_eq!(parse_partial(doc).unwrap(), parsed);
    }
}

#[test]
fn only_the_final_prefix_is_complete() {
    let doc = DOCUMENTS[0];
    let complete: Vec<usize> = char_boundaries(doc)
        .filter(|&k| parse_partial(&doc[..k]).unwrap().is_complete)
        .collect();
    assert_eq!(complete, vec![doc.len()]);
}

#[test]
fn corruption_after_a_valid_prefix_is_reported_at_its_offset() {
    let doc = r#"{"title":"Acme","sections":[{"title":"In\xfo"}]}"#;
    let err = parse_partial(doc).unwrap_err();
    // Offset of the bad escape character itself.
    assert_eq!(err.offset, doc.find("\\x").unwrap() + 1);
    // Everything before it still parses.
    assert!(parse_partial(&doc[..err.offset]).is_ok());
}
