//! Statement splitter fuzzer.
//!
//! Splitting never panics, and rejoining the statements with `;` splits back
//! into the same number of statements.

use honggfuzz::fuzz;
use sqlite_shell::testing::check_split;

fn main() {
    loop {
        fuzz!(|data: &[u8]| {
            if let Ok(text) = core::str::from_utf8(data) {
                check_split(text);
            }
        });
    }
}
