//! MQTT topic layout for the bridge
//!
//! Commands arrive on `ninjaCape/output/<deviceId>` and device state leaves on
//! `ninjaCape/input/<deviceId>_<groupId>`.

/// Root of every topic the bridge touches
pub const TOPIC_ROOT: &str = "ninjaCape";
/// Prefix of command topics, including the trailing separator
pub const OUTPUT_PREFIX: &str = "ninjaCape/output/";
/// Prefix of device state topics, including the trailing separator
pub const INPUT_PREFIX: &str = "ninjaCape/input/";
/// Subscription filter covering all device commands
pub const OUTPUT_FILTER: &str = "ninjaCape/output/#";

/// Build the state topic for a device: `ninjaCape/input/<deviceId>_<groupId>`
pub fn input_topic(device_id: i64, group_id: &str) -> String {
    format!("{INPUT_PREFIX}{device_id}_{group_id}")
}

/// Build the command topic for a device: `ninjaCape/output/<deviceId>`
pub fn output_topic(device_id: i64) -> String {
    format!("{OUTPUT_PREFIX}{device_id}")
}

/// Extract the device segment of a command topic
///
/// Returns the third path segment, or `None` if the topic is not under
/// `ninjaCape/output/` or the segment is empty.
pub fn output_device_segment(topic: &str) -> Option<&str> {
    let mut parts = topic.split('/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(TOPIC_ROOT), Some("output"), Some(device)) if !device.is_empty() => Some(device),
        _ => None,
    }
}

/// Match an MQTT topic against a subscription filter with `+` and `#` wildcards
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');

    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => continue,
            (Some(f), Some(t)) if f == t => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_topic() {
        assert_eq!(input_topic(1007, "0"), "ninjaCape/input/1007_0");
        assert_eq!(input_topic(11, "0101"), "ninjaCape/input/11_0101");
    }

    #[test]
    fn test_output_topic() {
        assert_eq!(output_topic(1007), "ninjaCape/output/1007");
    }

    #[test]
    fn test_output_device_segment() {
        assert_eq!(output_device_segment("ninjaCape/output/1007"), Some("1007"));
        assert_eq!(
            output_device_segment("ninjaCape/output/1007/extra"),
            Some("1007")
        );
        assert_eq!(output_device_segment("ninjaCape/output/"), None);
        assert_eq!(output_device_segment("ninjaCape/output"), None);
        assert_eq!(output_device_segment("ninjaCape/input/1007"), None);
        assert_eq!(output_device_segment("other/output/1007"), None);
    }

    #[test]
    fn test_topic_matches_multi_level_wildcard() {
        assert!(topic_matches(OUTPUT_FILTER, "ninjaCape/output/1007"));
        assert!(topic_matches(OUTPUT_FILTER, "ninjaCape/output/1007/x"));
        // `#` also matches the parent level
        assert!(topic_matches(OUTPUT_FILTER, "ninjaCape/output"));
        assert!(!topic_matches(OUTPUT_FILTER, "ninjaCape/input/1007_0"));
    }

    #[test]
    fn test_topic_matches_single_level_wildcard() {
        assert!(topic_matches("ninjaCape/+/1007", "ninjaCape/output/1007"));
        assert!(!topic_matches("ninjaCape/+/1007", "ninjaCape/output/1008"));
        assert!(!topic_matches("ninjaCape/+", "ninjaCape/output/1007"));
    }

    #[test]
    fn test_topic_matches_exact() {
        assert!(topic_matches("a/b/c", "a/b/c"));
        assert!(!topic_matches("a/b/c", "a/b"));
        assert!(!topic_matches("a/b", "a/b/c"));
    }
}
