#![no_main]
use libfuzzer_sys::fuzz_target;

const MAX_INPUT_LENGTH: usize = 500;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        // the sanitizer's guarantees are stated for ASCII input
        if input.is_ascii() && input.len() <= MAX_INPUT_LENGTH {
            lookup_sql::fuzz_helper::sanitize(input);
        }
    }
});
