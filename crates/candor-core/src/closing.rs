//! Detects agent replies that close the interview ("thank you for your time today", ...).

use once_cell::sync::Lazy;
use regex::Regex;

/// Phrases that end an interview with near certainty.
const HIGH_CONFIDENCE_PHRASES: &[&str] = &[
    "thank you for your time today",
    "we'll be in touch soon",
    "we will be in touch soon",
    "that concludes our interview",
    "interview is complete",
    "interview is finished",
    "interview is over",
    "i have all the information i need",
    "have a great day",
];

const CLOSING_PHRASES: &[&str] = &[
    "thank you for your time",
    "thank you for taking the time",
    "thank you for coming in today",
    "thank you for meeting with me today",
    "thank you for speaking with me today",
    "thank you for your responses",
    "thank you for sharing",
    "we'll be in touch",
    "we will be in touch",
    "we'll get back to you",
    "we will get back to you",
    "we'll contact you",
    "we will contact you",
    "we'll reach out to you",
    "we will reach out to you",
    "next steps",
    "have a wonderful day",
    "have a good day",
    "have a nice day",
    "take care",
    "goodbye",
    "that wraps up our interview",
    "this concludes our interview",
    "this wraps up our interview",
    "that's all for today",
    "that's all for now",
    "we'll let you know",
    "we will let you know",
    "we'll notify you",
    "we will notify you",
    "i have everything i need",
    "i have enough information",
    "i have sufficient information",
    "i've gathered all the information",
    "i have gathered all the information",
];

static CLOSING_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"thank you.*time.*today",
        r"we.*be in touch.*soon",
        r"have a .*day",
        r"that.*concludes.*interview",
        r"interview.*(complete|finished|over)",
        r"i have.*information.*need",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

/// Show the "interview is ending" prompt at or above this confidence.
pub const PROMPT_THRESHOLD: f32 = 0.6;
/// Finish the session automatically at or above this confidence.
pub const AUTO_FINISH_THRESHOLD: f32 = 0.8;

#[derive(Debug, Clone, PartialEq)]
pub struct ClosingSignal {
    pub confidence: f32,
    pub phrase: String,
}

impl ClosingSignal {
    pub fn should_prompt(&self) -> bool {
        self.confidence >= PROMPT_THRESHOLD
    }

    pub fn should_auto_finish(&self) -> bool {
        self.confidence >= AUTO_FINISH_THRESHOLD
    }
}

/// Returns a signal when the reply reads like the interviewer wrapping up.
pub fn detect_closing(reply: &str) -> Option<ClosingSignal> {
    let text = reply.trim().to_lowercase();
    if text.is_empty() {
        return None;
    }

    if let Some(p) = HIGH_CONFIDENCE_PHRASES.iter().find(|p| text.contains(*p)) {
        return Some(ClosingSignal {
            confidence: 0.9,
            phrase: p.to_string(),
        });
    }

    let matched: Vec<&str> = CLOSING_PHRASES
        .iter()
        .copied()
        .filter(|p| text.contains(p))
        .collect();
    match matched.len() {
        0 => {}
        1 => {
            return Some(ClosingSignal {
                confidence: 0.7,
                phrase: matched[0].to_string(),
            })
        }
        _ => {
            return Some(ClosingSignal {
                confidence: 0.8,
                phrase: matched.join(", "),
            })
        }
    }

    if CLOSING_PATTERNS.iter().any(|re| re.is_match(&text)) {
        return Some(ClosingSignal {
            confidence: 0.6,
            phrase: "pattern match".to_string(),
        });
    }
    None
}
