#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Malformed query strings must parse to something, never panic
    let _ = sheaf::query::parse_query(data);
});
