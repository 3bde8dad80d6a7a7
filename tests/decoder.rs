//! Chunking-independence properties of the line protocol decoder.

use astrochat::decoder::{LineProtocolDecoder, decode_event_line};
use proptest::prelude::*;

fn decode_all(chunks: &[&[u8]]) -> Vec<String> {
    let mut decoder = LineProtocolDecoder::new();
    let mut lines = Vec::new();
    for chunk in chunks {
        lines.extend(decoder.push(chunk));
    }
    lines.extend(decoder.finish());
    lines
}

/// Split `bytes` at the given cut points (sorted, deduplicated).
fn split_at(bytes: &[u8], cuts: &[usize]) -> Vec<Vec<u8>> {
    let mut points: Vec<usize> = cuts.iter().map(|&c| c % (bytes.len() + 1)).collect();
    points.sort_unstable();
    points.dedup();
    let mut chunks = Vec::new();
    let mut start = 0;
    for point in points {
        chunks.push(bytes[start..point].to_vec());
        start = point;
    }
    chunks.push(bytes[start..].to_vec());
    chunks
}

proptest! {
    #[test]
    fn any_chunking_yields_the_same_lines(
        lines in proptest::collection::vec("[^\\r\\n]{0,40}", 0..8),
        cuts in proptest::collection::vec(0usize..4096, 0..12),
    ) {
        let input = lines.iter().map(|l| format!("{l}\n")).collect::<String>();
        let bytes = input.as_bytes();

        let whole = decode_all(&[bytes]);
        prop_assert_eq!(&whole, &lines);

        let chunks = split_at(bytes, &cuts);
        let refs: Vec<&[u8]> = chunks.iter().map(Vec::as_slice).collect();
        prop_assert_eq!(decode_all(&refs), lines);
    }

    #[test]
    fn multibyte_text_survives_arbitrary_cut_points(
        text in "[あ-ん🚀-🛸a-z ]{1,24}",
        cuts in proptest::collection::vec(0usize..512, 1..8),
    ) {
        let event = format!(
            "data: {}\n",
            serde_json::json!({
                "candidates": [{ "content": { "parts": [{ "text": text }] } }]
            })
        );
        let chunks = split_at(event.as_bytes(), &cuts);
        let refs: Vec<&[u8]> = chunks.iter().map(Vec::as_slice).collect();

        let lines = decode_all(&refs);
        prop_assert_eq!(lines.len(), 1);
        prop_assert_eq!(decode_event_line(&lines[0]), Some(text));
    }
}

#[test]
fn decoded_stream_concatenation_matches_event_texts() {
    let body = concat!(
        "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"one \"}]}}]}\n",
        ": comment\n",
        "\n",
        "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"two \"}]}}]}\n",
        "data: {broken\n",
        "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"three\"}]}}]}\n",
        "data: [DONE]\n",
    );

    let mut decoder = LineProtocolDecoder::new();
    let mut out = String::new();
    for line in decoder.push(body.as_bytes()) {
        if let Some(text) = decode_event_line(&line) {
            out.push_str(&text);
        }
    }
    assert!(decoder.finish().is_none());
    assert_eq!(out, "one two three");
}
