//! Shared test utilities for datakit.

pub mod fixtures;
pub mod logging;

/// One row of a table-driven test.
#[derive(Debug, Clone)]
pub struct Case<I, E> {
    pub name: &'static str,
    pub input: I,
    pub expected: E,
}

impl<I, E> Case<I, E> {
    pub const fn new(name: &'static str, input: I, expected: E) -> Self {
        Self {
            name,
            input,
            expected,
        }
    }
}

/// Run every case through `check`, naming the failing case on mismatch.
pub fn check_cases<I, E, F>(cases: Vec<Case<I, E>>, check: F)
where
    I: std::fmt::Debug,
    E: std::fmt::Debug + PartialEq,
    F: Fn(I) -> E,
{
    for case in cases {
        println!("[CASE] {}: {:?}", case.name, case.input);
        let actual = check(case.input);
        assert_eq!(actual, case.expected, "case '{}' failed", case.name);
    }
}
