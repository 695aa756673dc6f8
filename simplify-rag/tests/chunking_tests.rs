//! Property tests for the boundary-aware text chunker.

use proptest::prelude::*;
use simplify_rag::chunking::TextChunker;

/// Chunk parameters with `overlap < size`.
fn arb_params() -> impl Strategy<Value = (usize, usize)> {
    (1usize..80).prop_flat_map(|size| (Just(size), 0..size))
}

/// Text mixing words, sentence ends, newlines and non-ASCII characters.
fn arb_text() -> impl Strategy<Value = String> {
    proptest::collection::vec(
        prop_oneof![
            "[a-z]{1,12}",
            Just(" ".to_string()),
            Just(". ".to_string()),
            Just("\n".to_string()),
            Just("é".to_string()),
            Just("日本".to_string()),
        ],
        0..120,
    )
    .prop_map(|parts| parts.concat())
}

/// *For any* text and valid parameters, chunks cover the text without gaps,
/// consecutive chunks share exactly `overlap` characters, no chunk exceeds
/// `chunk_size`, and each chunk's text is the slice its offsets name.
mod prop_chunk_coverage {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn chunks_cover_text_with_exact_overlap(
            text in arb_text(),
            (size, overlap) in arb_params(),
        ) {
            let chunker = TextChunker::new(size, overlap).unwrap();
            let chunks = chunker.chunk("doc", &text);
            let chars: Vec<char> = text.chars().collect();

            if chars.is_empty() {
                prop_assert!(chunks.is_empty());
                return Ok(());
            }

            prop_assert_eq!(chunks[0].start, 0);
            prop_assert_eq!(chunks.last().unwrap().end, chars.len());

            let mut rebuilt = String::new();
            for (n, chunk) in chunks.iter().enumerate() {
                prop_assert!(chunk.end > chunk.start);
                prop_assert!(chunk.end - chunk.start <= size);
                prop_assert_eq!(&chunk.id, &format!("doc_{n}"));

                let slice: String = chars[chunk.start..chunk.end].iter().collect();
                prop_assert_eq!(&chunk.text, &slice);

                let fresh = if n == 0 { 0 } else { overlap };
                rebuilt.extend(chunk.text.chars().skip(fresh));
            }
            prop_assert_eq!(rebuilt, text.clone());

            for pair in chunks.windows(2) {
                prop_assert_eq!(pair[1].start, pair[0].end - overlap);
                prop_assert!(pair[1].start > pair[0].start);
            }
        }

        #[test]
        fn chunking_is_deterministic(
            text in arb_text(),
            (size, overlap) in arb_params(),
        ) {
            let chunker = TextChunker::new(size, overlap).unwrap();
            prop_assert_eq!(chunker.chunk("doc", &text), chunker.chunk("doc", &text));
        }

        #[test]
        fn text_within_size_is_one_chunk(
            text in "[a-z .]{1,40}",
            overlap in 0usize..10,
        ) {
            let size = text.chars().count().max(overlap + 1);
            let chunks = TextChunker::new(size, overlap).unwrap().chunk("doc", &text);
            prop_assert_eq!(chunks.len(), 1);
            prop_assert_eq!(&chunks[0].text, &text);
        }
    }
}

#[test]
fn long_text_respects_default_sizes() {
    let sentence = "Retrieval grounds answers in the source documents. ";
    let text = sentence.repeat(100);
    let chunker = TextChunker::new(1000, 150).unwrap();
    let chunks = chunker.chunk("long.txt", &text);

    assert!(chunks.len() > 5);
    for chunk in &chunks[..chunks.len() - 1] {
        // every interior cut lands after a sentence end
        assert!(chunk.text.ends_with(". "), "cut mid-sentence: {:?}", chunk.text);
    }
}
