use regex::Regex;
use std::sync::LazyLock;

static PARTITION_NAME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<tid>-?\d+)(?:!(?P<cut>[^-]*))?(?:-(?P<ring>.+))?$").unwrap()
});

static CAPTURE_DIR_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-(?P<pid>\d+)$").unwrap());

static THREAD_FILE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:(?P<pid>-?\d+),)?(?P<tid>-?\d+)$").unwrap());

/// What a partition file stem (`<tid>[!<cut>][-<ring>]`) encodes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionName {
    pub thread_id: i64,
    pub cut: Option<String>,
    pub ring: Option<String>,
}

pub fn parse_partition_name(stem: &str) -> Option<PartitionName> {
    let caps = PARTITION_NAME_REGEX.captures(stem)?;
    let thread_id = caps.name("tid")?.as_str().parse().ok()?;
    let cut = caps
        .name("cut")
        .map(|m| m.as_str().to_string())
        .filter(|s| !s.is_empty());
    let ring = caps.name("ring").map(|m| m.as_str().to_string());
    Some(PartitionName {
        thread_id,
        cut,
        ring,
    })
}

/// Process id encoded in a capture directory name (`<anything>-<pid>`)
pub fn parse_capture_pid(dir_name: &str) -> Option<i64> {
    CAPTURE_DIR_REGEX
        .captures(dir_name)
        .and_then(|caps| caps.name("pid"))
        .and_then(|m| m.as_str().parse().ok())
}

/// Thread id of a thread-name file stem, either `<tid>` or `<pid>,<tid>`
pub fn parse_thread_file(stem: &str) -> Option<i64> {
    THREAD_FILE_REGEX
        .captures(stem)
        .and_then(|caps| caps.name("tid"))
        .and_then(|m| m.as_str().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_partition_name() {
        let name = parse_partition_name("1234").unwrap();
        assert_eq!(name.thread_id, 1234);
        assert_eq!(name.cut, None);
        assert_eq!(name.ring, None);
    }

    #[test]
    fn test_partition_name_with_cut_and_ring() {
        let name = parse_partition_name("77!warmup-3").unwrap();
        assert_eq!(name.thread_id, 77);
        assert_eq!(name.cut.as_deref(), Some("warmup"));
        assert_eq!(name.ring.as_deref(), Some("3"));

        let name = parse_partition_name("77-0").unwrap();
        assert_eq!(name.cut, None);
        assert_eq!(name.ring.as_deref(), Some("0"));
    }

    #[test]
    fn test_rejects_non_numeric_partition() {
        assert!(parse_partition_name("notes").is_none());
    }

    #[test]
    fn test_capture_pid() {
        assert_eq!(parse_capture_pid("trace-4242"), Some(4242));
        assert_eq!(parse_capture_pid("my-app-run-17"), Some(17));
        assert_eq!(parse_capture_pid("trace"), None);
    }

    #[test]
    fn test_thread_file() {
        assert_eq!(parse_thread_file("12"), Some(12));
        assert_eq!(parse_thread_file("4242,12"), Some(12));
        assert_eq!(parse_thread_file("x,12"), None);
    }
}
