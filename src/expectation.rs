// src/expectation.rs

//! Test outcome expectations.

use std::fmt;
use std::str::FromStr;

/// An outcome a test case may be expected to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Expectation {
    Pass,
    Fail,
    Crash,
    Timeout,
    CompileTimeError,
    RuntimeError,
    StaticWarning,
    SyntaxError,
    Skip,
    SkipByDesign,
    Slow,
    ExtraSlow,
}

impl Expectation {
    const ALL: [Expectation; 12] = [
        Expectation::Pass,
        Expectation::Fail,
        Expectation::Crash,
        Expectation::Timeout,
        Expectation::CompileTimeError,
        Expectation::RuntimeError,
        Expectation::StaticWarning,
        Expectation::SyntaxError,
        Expectation::Skip,
        Expectation::SkipByDesign,
        Expectation::Slow,
        Expectation::ExtraSlow,
    ];

    const fn bit(self) -> u16 {
        1 << (self as u16)
    }
}

impl FromStr for Expectation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pass" => Ok(Expectation::Pass),
            "fail" => Ok(Expectation::Fail),
            "crash" => Ok(Expectation::Crash),
            "timeout" => Ok(Expectation::Timeout),
            "compiletimeerror" | "compile-time-error" => Ok(Expectation::CompileTimeError),
            "runtimeerror" | "runtime-error" => Ok(Expectation::RuntimeError),
            "staticwarning" | "static-warning" => Ok(Expectation::StaticWarning),
            "syntaxerror" | "syntax-error" => Ok(Expectation::SyntaxError),
            "skip" => Ok(Expectation::Skip),
            "skipbydesign" | "skip-by-design" => Ok(Expectation::SkipByDesign),
            "slow" => Ok(Expectation::Slow),
            "extraslow" | "extra-slow" => Ok(Expectation::ExtraSlow),
            other => Err(format!("unknown expectation: {other}")),
        }
    }
}

/// A set of [`Expectation`]s stored as a bitmask.
///
/// Used both for the expected outcomes of a test case and for the intrinsic
/// expectations derived from source test metadata.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ExpectationSet(u16);

impl ExpectationSet {
    pub const EMPTY: ExpectationSet = ExpectationSet(0);

    pub fn of(expectations: &[Expectation]) -> Self {
        let mut set = Self::EMPTY;
        for e in expectations {
            set.insert(*e);
        }
        set
    }

    pub fn insert(&mut self, expectation: Expectation) {
        self.0 |= expectation.bit();
    }

    pub fn contains(self, expectation: Expectation) -> bool {
        self.0 & expectation.bit() != 0
    }

    pub fn union(self, other: ExpectationSet) -> ExpectationSet {
        ExpectationSet(self.0 | other.0)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = Expectation> {
        Expectation::ALL
            .into_iter()
            .filter(move |e| self.contains(*e))
    }
}

impl FromIterator<Expectation> for ExpectationSet {
    fn from_iter<I: IntoIterator<Item = Expectation>>(iter: I) -> Self {
        let mut set = Self::EMPTY;
        for e in iter {
            set.insert(e);
        }
        set
    }
}

impl fmt::Debug for ExpectationSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}
