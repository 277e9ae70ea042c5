// packages/sdk/src/capture/redaction.rs
//! PII redaction
//!
//! Regex scrubbing of credit-card-, email-, and phone-like substrings,
//! message and stack truncation, and defensive sanitization of free-form
//! context values before they enter the pipeline.

use regex::Regex;
use serde_json::Value;

/// Replacement token for card-like digit runs.
pub const CARD_TOKEN: &str = "[REDACTED_CARD]";

/// Replacement token for email-like substrings.
pub const EMAIL_TOKEN: &str = "[REDACTED_EMAIL]";

/// Replacement token for phone-like substrings.
pub const PHONE_TOKEN: &str = "[REDACTED_PHONE]";

/// Maximum characters kept of a message or scrubbed context string.
pub const MAX_MESSAGE_CHARS: usize = 1_000;

/// Maximum characters kept of a stack trace.
pub const MAX_STACK_CHARS: usize = 2_000;

/// Maximum stack frames kept.
pub const MAX_STACK_FRAMES: usize = 10;

/// Maximum nesting depth kept in context values.
const MAX_CONTEXT_DEPTH: usize = 8;

/// Regex-based PII scrubber.
pub struct Redactor {
    card: Regex,
    email: Regex,
    phone: Regex,
    origin: Regex,
}

impl Redactor {
    pub fn new() -> Self {
        Self {
            // 13-16 digits, optionally separated by spaces or dashes
            card: Regex::new(r"\b(?:\d[ -]?){12,15}\d\b").expect("static pattern"),
            email: Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}")
                .expect("static pattern"),
            // 7+ digit runs with optional +country and separators
            phone: Regex::new(r"\+?\d{1,3}[ -]?\(?\d{2,4}\)?[ -]?\d{3,4}[ -]?\d{3,4}")
                .expect("static pattern"),
            origin: Regex::new(r"https?://[^/\s)]+").expect("static pattern"),
        }
    }

    /// Replace PII-like substrings with constant tokens.
    ///
    /// Cards are matched before phones: a card number would otherwise also
    /// satisfy the looser phone pattern.
    pub fn scrub(&self, text: &str) -> String {
        let text = self.card.replace_all(text, CARD_TOKEN);
        let text = self.email.replace_all(&text, EMAIL_TOKEN);
        self.phone.replace_all(&text, PHONE_TOKEN).into_owned()
    }

    /// Scrub and truncate an error message.
    pub fn scrub_message(&self, message: &str) -> String {
        truncate_chars(&self.scrub(message), MAX_MESSAGE_CHARS)
    }

    /// Trim a stack trace: first frames only, origins stripped to
    /// path-relative, bounded length.
    pub fn scrub_stack(&self, stack: &str) -> String {
        let trimmed: Vec<&str> = stack.lines().take(MAX_STACK_FRAMES).collect();
        let joined = trimmed.join("\n");
        let stripped = self.origin.replace_all(&joined, "");
        truncate_chars(&stripped, MAX_STACK_CHARS)
    }

    /// Sanitize a context value: scrub every string, cap nesting depth.
    ///
    /// The value is rebuilt rather than mutated, which also drops anything
    /// a lossy producer managed to smuggle past serialization.
    pub fn sanitize_context(&self, value: &Value) -> Value {
        self.sanitize_at(value, 0)
    }

    fn sanitize_at(&self, value: &Value, depth: usize) -> Value {
        if depth > MAX_CONTEXT_DEPTH {
            return Value::Null;
        }
        match value {
            Value::String(s) => Value::String(truncate_chars(&self.scrub(s), MAX_MESSAGE_CHARS)),
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.sanitize_at(item, depth + 1))
                    .collect(),
            ),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.sanitize_at(v, depth + 1)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

impl Default for Redactor {
    fn default() -> Self {
        Self::new()
    }
}

/// Truncate to at most `max` characters, on a char boundary.
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        text.chars().take(max).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_card_scrubbing() {
        let redactor = Redactor::new();
        let scrubbed = redactor.scrub("paid with 4111 1111 1111 1111 today");
        assert_eq!(scrubbed, format!("paid with {} today", CARD_TOKEN));
        assert!(!scrubbed.contains("4111"));
    }

    #[test]
    fn test_email_scrubbing() {
        let redactor = Redactor::new();
        let scrubbed = redactor.scrub("user jane.doe+test@corp.example failed login");
        assert!(scrubbed.contains(EMAIL_TOKEN));
        assert!(!scrubbed.contains('@'));
    }

    #[test]
    fn test_phone_scrubbing() {
        let redactor = Redactor::new();
        let scrubbed = redactor.scrub("call +1 (555) 123-4567 now");
        assert!(scrubbed.contains(PHONE_TOKEN));
        assert!(!scrubbed.contains("555"));
    }

    #[test]
    fn test_message_truncated_to_exact_limit() {
        let redactor = Redactor::new();
        let long = "x".repeat(1_500);
        let scrubbed = redactor.scrub_message(&long);
        assert_eq!(scrubbed.chars().count(), 1_000);
    }

    #[test]
    fn test_stack_frame_and_origin_trimming() {
        let redactor = Redactor::new();
        let stack: String = (0..25)
            .map(|i| format!("  at handler{} (https://cdn.example/static/app.js:{}:5)\n", i, i))
            .collect();

        let scrubbed = redactor.scrub_stack(&stack);
        assert_eq!(scrubbed.lines().count(), 10);
        assert!(!scrubbed.contains("https://"));
        assert!(scrubbed.contains("/static/app.js"));
    }

    #[test]
    fn test_context_sanitization() {
        let redactor = Redactor::new();
        let context = serde_json::json!({
            "note": "card 4111-1111-1111-1111",
            "nested": {"email": "a@b.example"},
            "count": 3,
        });

        let sanitized = redactor.sanitize_context(&context);
        assert_eq!(
            sanitized["note"],
            Value::String(format!("card {}", CARD_TOKEN))
        );
        assert_eq!(sanitized["nested"]["email"], Value::String(EMAIL_TOKEN.to_string()));
        assert_eq!(sanitized["count"], 3);
    }

    #[test]
    fn test_context_depth_cap() {
        let redactor = Redactor::new();
        let mut value = serde_json::json!("leaf");
        for _ in 0..12 {
            value = serde_json::json!({ "inner": value });
        }

        let sanitized = redactor.sanitize_context(&value);
        // Deeply nested leaves are dropped, not kept verbatim
        assert!(serde_json::to_string(&sanitized).unwrap().contains("null"));
    }
}
