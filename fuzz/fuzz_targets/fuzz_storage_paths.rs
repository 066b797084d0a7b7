//! Fuzz target for path normalization and key encoding.
//!
//! Checks that:
//! 1. No input causes a panic
//! 2. Encoded keys always decode back to the input
//! 3. Keys accepted by validation never contain `..` segments
//!
//! Run with: `cargo +nightly fuzz run fuzz_storage_paths`

#![no_main]

use arbitrary::Arbitrary;
use blobgate::storage::codec::{self, PathCodec};
use blobgate::storage::validation::{validate_container, validate_key};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
struct PathInput {
    container: String,
    key: String,
}

fuzz_target!(|input: PathInput| {
    let folder = codec::normalize_folder(&input.key);
    assert!(folder.is_empty() || folder.ends_with('/'));
    assert!(!folder.contains("//"));

    if let Some(file) = codec::normalize_file(&input.key) {
        assert!(!file.starts_with('/') && !file.ends_with('/'));
    }
    let _ = codec::parent_folder(&input.key);
    let _ = codec::short_name(&input.key);
    let _ = codec::ancestors(&folder);

    if validate_container(&input.container).is_ok() {
        for codec in [PathCodec::plain(), PathCodec::prefixed(), PathCodec::escaped()] {
            let raw = codec.encode_key(&input.container, &input.key);
            assert_eq!(
                codec.decode_key(&input.container, &raw).as_deref(),
                Some(input.key.as_str())
            );
        }
    }

    if validate_key(&input.key).is_ok() {
        assert!(!input.key.split('/').any(|segment| segment == ".."));
    }
});
