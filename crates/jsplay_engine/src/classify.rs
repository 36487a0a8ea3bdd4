//! Non-Determinism Classifier.
//!
//! Flags snippets whose output may differ between two runs of identical
//! text. Matching is textual and deliberately conservative: a false
//! positive only costs a re-run.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum NonDeterminism {
    Time,
    Randomness,
    Network,
    Interactive,
    Storage,
    Timers,
    ConsoleClear,
}

impl NonDeterminism {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Time => "time",
            Self::Randomness => "randomness",
            Self::Network => "network",
            Self::Interactive => "interactive",
            Self::Storage => "storage",
            Self::Timers => "timers",
            Self::ConsoleClear => "console-clear",
        }
    }
}

impl std::fmt::Display for NonDeterminism {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

static PATTERNS: LazyLock<Vec<(NonDeterminism, Regex)>> = LazyLock::new(|| {
    [
        (NonDeterminism::Time, r"\bDate\s*\("),
        (NonDeterminism::Time, r"\bnew\s+Date\b"),
        (NonDeterminism::Time, r"\bDate\.now\s*\("),
        (NonDeterminism::Time, r"\bperformance\.now\s*\("),
        (NonDeterminism::Randomness, r"\bMath\.random\s*\("),
        (NonDeterminism::Randomness, r"\bcrypto\.getRandomValues\b"),
        (NonDeterminism::Randomness, r"\bcrypto\.randomUUID\b"),
        (NonDeterminism::Network, r"\bfetch\s*\("),
        (NonDeterminism::Network, r"\bXMLHttpRequest\b"),
        (NonDeterminism::Network, r"\baxios\s*[.(]"),
        (NonDeterminism::Interactive, r"\bprompt\s*\("),
        (NonDeterminism::Interactive, r"\bconfirm\s*\("),
        (NonDeterminism::Interactive, r"\balert\s*\("),
        (NonDeterminism::Storage, r"\blocalStorage\s*\."),
        (NonDeterminism::Storage, r"\bsessionStorage\s*\."),
        (NonDeterminism::Storage, r"\bindexedDB\b"),
        (NonDeterminism::Timers, r"\bsetTimeout\b"),
        (NonDeterminism::Timers, r"\bsetInterval\b"),
        (NonDeterminism::ConsoleClear, r"\bconsole\.clear\s*\("),
    ]
    .into_iter()
    .map(|(category, pattern)| {
        (
            category,
            Regex::new(pattern).expect("invalid non-determinism pattern"),
        )
    })
    .collect()
});

/// Categories of non-deterministic constructs found in `code`, in
/// declaration order and without duplicates
pub fn classify(code: &str) -> Vec<NonDeterminism> {
    let mut found = PATTERNS
        .iter()
        .filter(|(_, pattern)| pattern.is_match(code))
        .map(|(category, _)| *category)
        .collect::<Vec<_>>();
    found.dedup();
    found
}

pub fn has_non_deterministic_construct(code: &str) -> bool {
    PATTERNS.iter().any(|(_, pattern)| pattern.is_match(code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic_code() {
        let code = "const xs = [3, 1, 2].sort();\nconsole.log(xs.map((x) => x * 2));";
        assert!(!has_non_deterministic_construct(code));
        assert!(classify(code).is_empty());
    }

    #[test]
    fn test_time_and_randomness() {
        assert!(has_non_deterministic_construct("console.log(Date.now())"));
        assert!(has_non_deterministic_construct("const d = new Date;"));
        assert!(has_non_deterministic_construct("console.log(Math.random())"));
        assert_eq!(
            classify("Math.random() + performance.now() + Date.now()"),
            [NonDeterminism::Time, NonDeterminism::Randomness]
        );
    }

    #[test]
    fn test_every_category() {
        let cases = [
            ("await fetch('https://x.dev')", NonDeterminism::Network),
            ("new XMLHttpRequest()", NonDeterminism::Network),
            ("axios.get(url)", NonDeterminism::Network),
            ("const name = prompt('name?')", NonDeterminism::Interactive),
            ("localStorage.getItem('k')", NonDeterminism::Storage),
            ("indexedDB.open('db')", NonDeterminism::Storage),
            ("setTimeout(run, 10)", NonDeterminism::Timers),
            ("clearInterval(setInterval(run, 10))", NonDeterminism::Timers),
            ("console.clear()", NonDeterminism::ConsoleClear),
            ("crypto.randomUUID()", NonDeterminism::Randomness),
        ];
        for (code, expected) in cases {
            assert_eq!(classify(code), [expected], "classifying {code:?}");
        }
    }

    #[test]
    fn test_word_boundaries() {
        assert!(!has_non_deterministic_construct("update(record)"));
        assert!(!has_non_deterministic_construct("const prefetch = 1; refetch(x)"));
        assert!(!has_non_deterministic_construct("const validDate = isDate(x)"));
    }
}
