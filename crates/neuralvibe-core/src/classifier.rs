//! Keyword-based domain classification
//!
//! Scores free text against a weighted keyword table per domain and reports
//! the best-scoring domain when the match is meaningful. Pure string scanning,
//! no model call.

use std::fmt;

use serde::Serialize;
use tracing::debug;

/// Coarse topical category of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Coding,
    Math,
    Creative,
    Analytical,
    Scientific,
    Philosophical,
    Business,
    Educational,
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Coding => "coding",
            Self::Math => "math",
            Self::Creative => "creative",
            Self::Analytical => "analytical",
            Self::Scientific => "scientific",
            Self::Philosophical => "philosophical",
            Self::Business => "business",
            Self::Educational => "educational",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keyword list for one domain
#[derive(Debug, Clone, Copy)]
pub struct DomainKeywords {
    pub domain: Domain,
    pub keywords: &'static [&'static str],
}

/// Declaration order doubles as the tie-break order.
pub static DOMAIN_KEYWORDS: [DomainKeywords; 8] = [
    DomainKeywords {
        domain: Domain::Coding,
        keywords: &[
            "code", "programming", "javascript", "python", "algorithm", "function", "class",
            "api", "debug", "syntax", "compiler", "runtime", "library", "framework", "git",
            "repository",
        ],
    },
    DomainKeywords {
        domain: Domain::Math,
        keywords: &[
            "math", "equation", "algebra", "calculus", "geometry", "theorem", "numeric",
            "polynomial", "linear", "matrix", "vector", "derivative", "integral", "statistics",
            "probability",
        ],
    },
    DomainKeywords {
        domain: Domain::Creative,
        keywords: &[
            "story", "poem", "creative", "imagine", "fiction", "narrative", "character", "plot",
            "write", "novel", "fantasy", "create", "design", "artistic", "aesthetic",
        ],
    },
    DomainKeywords {
        domain: Domain::Analytical,
        keywords: &[
            "analyze", "research", "study", "comparison", "evaluation", "assessment", "report",
            "review", "examine", "investigate", "critique", "assess", "interpret", "breakdown",
        ],
    },
    DomainKeywords {
        domain: Domain::Scientific,
        keywords: &[
            "science", "physics", "chemistry", "biology", "scientific", "experiment",
            "hypothesis", "theory", "molecule", "reaction", "cell", "organism", "data",
            "observation",
        ],
    },
    DomainKeywords {
        domain: Domain::Philosophical,
        keywords: &[
            "philosophy", "ethics", "moral", "existence", "consciousness", "meaning", "purpose",
            "reasoning", "logic", "argument", "debate", "perspective", "worldview",
        ],
    },
    DomainKeywords {
        domain: Domain::Business,
        keywords: &[
            "business", "marketing", "finance", "strategy", "management", "startup",
            "entrepreneur", "revenue", "customer", "product", "service", "market",
            "competition", "analysis",
        ],
    },
    DomainKeywords {
        domain: Domain::Educational,
        keywords: &[
            "teach", "learn", "explain", "education", "concept", "understand", "student",
            "knowledge", "curriculum", "lesson", "subject", "topic", "comprehend", "clarify",
        ],
    },
];

/// Keywords that count 1.5x
pub const STRONG_KEYWORDS: [&str; 7] = [
    "code",
    "programming",
    "algorithm",
    "math",
    "equation",
    "scientific",
    "analysis",
];

pub const STRONG_WEIGHT: f64 = 1.5;
/// Added to the coding score when the text looks like source code
pub const CODE_SYNTAX_BONUS: f64 = 5.0;
/// A domain is only reported when its score is strictly above this
pub const MIN_SCORE: f64 = 1.0;

/// Detect the topical domain of `text`, if any.
///
/// Exact ties go to the domain declared first in [`DOMAIN_KEYWORDS`].
pub fn classify(text: &str) -> Option<Domain> {
    let mut best: Option<Domain> = None;
    let mut max_score = 0.0;

    for (domain, score) in scores(text) {
        if score > max_score {
            max_score = score;
            best = Some(domain);
        }
    }

    let detected = if max_score > MIN_SCORE { best } else { None };
    debug!("Classified text as {:?} (score {})", detected, max_score);
    detected
}

/// Score of every domain, in declaration order
pub fn scores(text: &str) -> Vec<(Domain, f64)> {
    let lower = text.to_lowercase();

    DOMAIN_KEYWORDS
        .iter()
        .map(|entry| {
            let mut score: f64 = entry
                .keywords
                .iter()
                .map(|kw| count_whole_word(&lower, kw) as f64 * keyword_weight(kw))
                .sum();
            if entry.domain == Domain::Coding && has_code_syntax(text) {
                score += CODE_SYNTAX_BONUS;
            }
            (entry.domain, score)
        })
        .collect()
}

fn keyword_weight(keyword: &str) -> f64 {
    if STRONG_KEYWORDS.contains(&keyword) {
        STRONG_WEIGHT
    } else {
        1.0
    }
}

/// Fenced block, a brace pair, or the literal `function` / `class ` tokens.
/// Case-sensitive on the original text.
fn has_code_syntax(text: &str) -> bool {
    text.contains("```")
        || (text.contains('{') && text.contains('}'))
        || text.contains("function")
        || text.contains("class ")
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Non-overlapping occurrences of `word` in `haystack` that stand on word
/// boundaries. `haystack` is expected to be lower-cased already.
pub fn count_whole_word(haystack: &str, word: &str) -> usize {
    if word.is_empty() {
        return 0;
    }
    haystack
        .match_indices(word)
        .filter(|(start, matched)| {
            let before = haystack[..*start].chars().next_back();
            let after = haystack[start + matched.len()..].chars().next();
            !before.is_some_and(is_word_char) && !after.is_some_and(is_word_char)
        })
        .count()
}
