#![no_main]
use libfuzzer_sys::fuzz_target;

use arbitrary::Arbitrary;

#[derive(Debug)]
pub struct ExprInput {
    pub expr: String,
}

impl<'a> Arbitrary<'a> for ExprInput {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        let expr = random_expr_string(u)?;
        Ok(ExprInput { expr })
    }
}

const MAX_EXPR_LENGTH: usize = 2000;

const SEEDS: [&str; 6] = [
    "name?=",
    "authors__books[on:id=author_id]__title?like:",
    "price?between:",
    "created_at?date:",
    "total?E>=",
    "flags?b^",
];

// Starts from a plausible prefix most of the time so the fuzzer gets past
//  the path and operator parsers
fn random_expr_string(u: &mut arbitrary::Unstructured) -> arbitrary::Result<String> {
    let seeded: bool = u.arbitrary()?;
    let prefix = if seeded { *u.choose(&SEEDS)? } else { "" };
    let s: String = u.arbitrary()?;
    Ok(prefix.chars().chain(s.chars()).take(MAX_EXPR_LENGTH).collect())
}

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = arbitrary::Unstructured::new(data).arbitrary::<ExprInput>() {
        lookup_sql::fuzz_helper::compile_expr(&input.expr);
    }
});
