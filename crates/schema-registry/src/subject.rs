//! Topic-name subject naming strategy.

/// Which half of a record a schema describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubjectRole {
    Key,
    Value,
}

impl SubjectRole {
    fn suffix(&self) -> &'static str {
        match self {
            SubjectRole::Key => "key",
            SubjectRole::Value => "value",
        }
    }
}

/// Subject for `topic` under the topic-name strategy, e.g. `orders-value`.
///
/// With a registry context the subject is qualified as `:.<context>:orders-value`.
pub fn topic_subject(topic: &str, role: SubjectRole, context: Option<&str>) -> String {
    let subject = format!("{topic}-{}", role.suffix());
    match context.map(str::trim).filter(|c| !c.is_empty()) {
        Some(context) => format!("{}{subject}", context_prefix(context)),
        None => subject,
    }
}

/// Subject prefix that scopes lookups to a registry context.
pub fn context_prefix(context: &str) -> String {
    let context = context.trim_start_matches('.');
    format!(":.{context}:")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_subject() {
        assert_eq!(topic_subject("orders", SubjectRole::Value, None), "orders-value");
        assert_eq!(topic_subject("orders", SubjectRole::Key, None), "orders-key");
    }

    #[test]
    fn test_topic_subject_with_context() {
        assert_eq!(
            topic_subject("orders", SubjectRole::Value, Some("staging")),
            ":.staging:orders-value"
        );
        assert_eq!(
            topic_subject("orders", SubjectRole::Key, Some(".staging")),
            ":.staging:orders-key"
        );
    }

    #[test]
    fn test_blank_context_is_ignored() {
        assert_eq!(
            topic_subject("orders", SubjectRole::Value, Some("  ")),
            "orders-value"
        );
    }
}
