//! Provider selection policy
//!
//! An ordered list of rules evaluated short-circuit: the first rule whose
//! predicate holds and whose picker finds an available provider decides.
//! The policy is a pure function of the conversation and the available set.

use tracing::{debug, info};

use crate::classifier::{self, Domain};
use crate::error::RouterError;
use crate::types::{AvailableProviders, Message, ProviderId, Role, RoutingDecision};

/// Global preference order for cold start and fallback
pub const PREFERENCE_ORDER: [ProviderId; 5] = [
    ProviderId::OpenAi,
    ProviderId::Claude,
    ProviderId::Groq,
    ProviderId::DeepSeek,
    ProviderId::Gemini,
];

/// Picked for long or explicitly complex questions
pub const NUANCED_PROVIDER: ProviderId = ProviderId::Claude;
/// Picked for messages that contain code
pub const CODE_PROVIDER: ProviderId = ProviderId::OpenAi;
/// Picked to continue a thread whose last answer was rich
pub const GENERAL_PROVIDER: ProviderId = ProviderId::OpenAi;

pub const COMPLEXITY_INDICATORS: [&str; 11] = [
    "detailed",
    "comprehensive",
    "in-depth",
    "thorough",
    "elaborate",
    "nuanced",
    "complex",
    "sophisticated",
    "advanced",
    "intricate",
    "technical",
];

/// Messages longer than this (in chars) count as complex
pub const LONG_PROMPT_CHARS: usize = 300;
/// Assistant replies longer than this with structure count as high quality
pub const HIGH_QUALITY_CHARS: usize = 500;
pub const MEDIUM_QUALITY_CHARS: usize = 200;

/// Ordered provider preference per domain
pub fn domain_preferences(domain: Domain) -> &'static [ProviderId] {
    use ProviderId::*;
    match domain {
        Domain::Coding => &[OpenAi, Groq, DeepSeek],
        Domain::Math => &[Claude, OpenAi, DeepSeek],
        Domain::Creative => &[OpenAi, Claude, Groq],
        Domain::Analytical => &[Claude, OpenAi, DeepSeek],
        Domain::Scientific => &[DeepSeek, Claude, OpenAi],
        Domain::Philosophical => &[Claude, OpenAi, Gemini],
        Domain::Business => &[OpenAi, Claude, Groq],
        Domain::Educational => &[OpenAi, DeepSeek, Gemini],
    }
}

/// Rough quality grade of an assistant reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ResponseQuality {
    Low,
    Medium,
    High,
}

/// Grade a previous assistant reply by length, structure and code content
pub fn assess_response_quality(response: &str) -> ResponseQuality {
    let length = response.chars().count();
    let has_structure =
        response.contains("\n\n") || response.contains('#') || response.contains('*');
    let has_technical_content = response.contains("```")
        || response.contains("function")
        || response.contains("class");

    if (length > HIGH_QUALITY_CHARS && has_structure) || has_technical_content {
        ResponseQuality::High
    } else if length > MEDIUM_QUALITY_CHARS {
        ResponseQuality::Medium
    } else {
        ResponseQuality::Low
    }
}

/// Complexity phrases (case-insensitive substring) or a long prompt
pub fn is_complex(text: &str) -> bool {
    let lower = text.to_lowercase();
    COMPLEXITY_INDICATORS.iter().any(|i| lower.contains(i))
        || text.chars().count() > LONG_PROMPT_CHARS
}

/// Fenced block, `function`, `class`, or both braces. Case-sensitive.
pub fn looks_like_code(text: &str) -> bool {
    text.contains("```")
        || text.contains("function")
        || text.contains("class")
        || (text.contains('{') && text.contains('}'))
}

/// Everything the rules look at, computed once per decision
#[derive(Debug, Clone)]
pub struct Signals<'a> {
    pub message_count: usize,
    pub user_turns: usize,
    /// Text of the most recent user message, empty when there is none
    pub latest_user: &'a str,
    pub domain: Option<Domain>,
    pub last_assistant_quality: Option<ResponseQuality>,
}

impl<'a> Signals<'a> {
    pub fn from_conversation(conversation: &'a [Message]) -> Self {
        let latest_user = conversation
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("");

        let last_assistant_quality = conversation
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(|m| assess_response_quality(&m.content));

        Self {
            message_count: conversation.len(),
            user_turns: conversation.iter().filter(|m| m.role == Role::User).count(),
            latest_user,
            domain: classifier::classify(latest_user),
            last_assistant_quality,
        }
    }
}

/// One routing rule: `applies` gates it, `pick` chooses from the available
/// set, `reason` explains the choice.
#[derive(Clone, Copy)]
pub struct Rule {
    pub name: &'static str,
    applies: fn(&Signals<'_>) -> bool,
    pick: fn(&Signals<'_>, &AvailableProviders) -> Option<ProviderId>,
    reason: fn(&Signals<'_>) -> String,
}

impl Rule {
    /// Decision of this rule alone, if it fires
    pub fn evaluate(
        &self,
        signals: &Signals<'_>,
        available: &AvailableProviders,
    ) -> Option<RoutingDecision> {
        if !(self.applies)(signals) {
            return None;
        }
        let provider = (self.pick)(signals, available)?;
        Some(RoutingDecision {
            provider,
            reason: (self.reason)(signals),
        })
    }
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule").field("name", &self.name).finish()
    }
}

fn pick_preferred(_: &Signals<'_>, available: &AvailableProviders) -> Option<ProviderId> {
    available.first_in(&PREFERENCE_ORDER)
}

fn pick_if_available(provider: ProviderId, available: &AvailableProviders) -> Option<ProviderId> {
    available.contains(provider).then_some(provider)
}

/// The rules, highest priority first
pub static RULES: [Rule; 6] = [
    Rule {
        name: "cold_start",
        applies: |s| s.message_count <= 1,
        pick: pick_preferred,
        reason: |_| "initial conversation".to_string(),
    },
    Rule {
        name: "complexity",
        applies: |s| is_complex(s.latest_user),
        pick: |_, a| pick_if_available(NUANCED_PROVIDER, a),
        reason: |_| "complex question requiring nuanced response".to_string(),
    },
    Rule {
        name: "code_pattern",
        applies: |s| looks_like_code(s.latest_user),
        pick: |_, a| pick_if_available(CODE_PROVIDER, a),
        reason: |_| "code-focused request".to_string(),
    },
    Rule {
        name: "domain",
        applies: |s| s.domain.is_some(),
        pick: |s, a| s.domain.and_then(|d| a.first_in(domain_preferences(d))),
        reason: |s| match s.domain {
            Some(d) => format!("best for {} content", d),
            None => String::new(),
        },
    },
    Rule {
        name: "continuity",
        applies: |s| {
            s.user_turns > 2
                && s.message_count > 3
                && s.last_assistant_quality == Some(ResponseQuality::High)
        },
        pick: |_, a| pick_if_available(GENERAL_PROVIDER, a),
        reason: |_| "continuing high-quality conversation thread".to_string(),
    },
    Rule {
        name: "fallback",
        applies: |_| true,
        pick: pick_preferred,
        reason: |_| "default selection based on availability".to_string(),
    },
];

/// Choose the provider for the next reply.
///
/// # Errors
///
/// [`RouterError::EmptyProviderSet`] when `available` is empty.
pub fn select_provider(
    conversation: &[Message],
    available: &AvailableProviders,
) -> Result<RoutingDecision, RouterError> {
    if available.is_empty() {
        return Err(RouterError::EmptyProviderSet);
    }

    let signals = Signals::from_conversation(conversation);
    for rule in &RULES {
        if let Some(decision) = rule.evaluate(&signals, available) {
            info!(
                "Routing to {} via {} rule: {}",
                decision.provider, rule.name, decision.reason
            );
            return Ok(decision);
        }
        debug!("Rule {} did not fire", rule.name);
    }

    // The fallback rule always fires on a non-empty set; keep the contract anyway.
    Err(RouterError::EmptyProviderSet)
}
