//! Topic construction for the unit agent
//!
//! Full data topics are `base/kind`; orders for a unit arrive on `base/kind/command`.

/// Suffix appended to a data topic for inbound control messages
pub const COMMAND_SUFFIX: &str = "command";

/// Join topic segments with `/`, dropping empty segments and stray separators
pub fn join_topic(segments: &[&str]) -> String {
    segments
        .iter()
        .flat_map(|segment| segment.split('/'))
        .filter(|level| !level.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Topic construction functions
pub struct TopicBuilder;

impl TopicBuilder {
    /// Build data topic: `{base}/{kind}`
    pub fn data_topic(base: &str, kind: &str) -> String {
        join_topic(&[base, kind])
    }

    /// Build command topic: `{base}/{kind}/command`
    pub fn command_topic(base: &str, kind: &str) -> String {
        join_topic(&[base, kind, COMMAND_SUFFIX])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn join_topic_has_no_empty_levels(a in "[a-z/]{0,12}", b in "[a-z/]{0,12}") {
            let result = join_topic(&[&a, &b]);
            prop_assert!(!result.contains("//"), "No consecutive slashes allowed: {}", result);
            prop_assert!(!result.starts_with('/'), "No leading slash: {}", result);
            prop_assert!(!result.ends_with('/'), "No trailing slash: {}", result);
        }

        #[test]
        fn join_topic_is_idempotent(a in "[a-z0-9/]{0,16}") {
            let first = join_topic(&[&a]);
            let second = join_topic(&[&first]);
            prop_assert_eq!(first, second);
        }
    }

    #[test]
    fn test_topic_construction() {
        assert_eq!(
            TopicBuilder::data_topic("1R1/014", "temperature"),
            "1R1/014/temperature"
        );
        assert_eq!(
            TopicBuilder::command_topic("1R1/014", "shutter"),
            "1R1/014/shutter/command"
        );
    }

    #[test]
    fn test_join_topic_normalizes_separators() {
        assert_eq!(join_topic(&["1R1/014/", "/temperature"]), "1R1/014/temperature");
        assert_eq!(join_topic(&["//room//", "temp/"]), "room/temp");
        assert_eq!(join_topic(&["", "temp"]), "temp");
        assert_eq!(join_topic(&[]), "");
    }
}
