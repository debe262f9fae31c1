/// Utility functions for the prometheus-source controller

/// Kubernetes object names (DNS-1123 labels) are capped at 63 characters.
pub const MAX_NAME_LENGTH: usize = 63;

/// Generate the name of an object owned by a source (adapter Deployment, EventType).
///
/// The name is `prometheussource-<source>-<uid prefix>`; the source name is
/// truncated so the result always fits in a DNS-1123 label while the uid
/// prefix keeps it unique.
pub fn child_name(source_name: &str, uid: &str) -> String {
    let prefix = "prometheussource-";
    let suffix: String = uid.chars().filter(|c| *c != '-').take(8).collect();
    let budget = MAX_NAME_LENGTH - prefix.len() - suffix.len() - 1;

    let mut name: String = source_name.chars().take(budget).collect();
    while name.ends_with('-') {
        name.pop();
    }

    format!("{}{}-{}", prefix, name, suffix)
}

/// Label value naming a source. Object names may be longer than a label
/// value allows, so long names are cut and suffixed with the uid prefix.
pub fn label_value(source_name: &str, uid: &str) -> String {
    if source_name.len() <= MAX_NAME_LENGTH {
        return source_name.to_string();
    }
    let suffix: String = uid.chars().filter(|c| *c != '-').take(8).collect();
    let budget = MAX_NAME_LENGTH - suffix.len() - 1;

    let mut value: String = source_name.chars().take(budget).collect();
    while value.ends_with(|c: char| !c.is_ascii_alphanumeric()) {
        value.pop();
    }
    if suffix.is_empty() {
        return value;
    }
    format!("{}-{}", value, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_name_generation() {
        let uid = "a1b2c3d4-e5f6-7890-abcd-ef1234567890";
        assert_eq!(child_name("cpu", uid), "prometheussource-cpu-a1b2c3d4");
    }

    #[test]
    fn test_child_name_is_truncated() {
        let uid = "a1b2c3d4-e5f6-7890-abcd-ef1234567890";
        let long = "x".repeat(100);
        let name = child_name(&long, uid);
        assert_eq!(name.len(), MAX_NAME_LENGTH);
        assert!(name.ends_with("-a1b2c3d4"));
    }

    #[test]
    fn test_child_name_never_has_double_dash() {
        let uid = "a1b2c3d4-e5f6-7890-abcd-ef1234567890";
        let name = child_name(&format!("{}-tail", "y".repeat(36)), uid);
        assert!(!name.contains("--"));
    }

    #[test]
    fn test_label_value_keeps_short_names() {
        assert_eq!(label_value("cpu", "a1b2c3d4-e5f6"), "cpu");
    }

    #[test]
    fn test_label_value_fits_label_limit() {
        let uid = "a1b2c3d4-e5f6-7890-abcd-ef1234567890";
        let long = format!("{}.{}", "a".repeat(53), "b".repeat(100));
        let value = label_value(&long, uid);
        assert!(value.len() <= MAX_NAME_LENGTH);
        assert_eq!(value, format!("{}-a1b2c3d4", "a".repeat(53)));
    }
}
