//! Proxy status codes and their labels.

/// Labels indexed by status code.
pub const STATUS_STR: [&str; 5] = ["idle", "working", "closed", "online", "offline"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i64)]
pub enum ProxyStatus {
    Idle = 0,
    Working = 1,
    Closed = 2,
    Online = 3,
    Offline = 4,
}

impl ProxyStatus {
    pub fn code(self) -> i64 {
        self as i64
    }

    pub fn as_str(self) -> &'static str {
        STATUS_STR[self as usize]
    }
}

impl std::fmt::Display for ProxyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Look up the label for a status code. `None` for codes outside the table.
pub fn status_label(code: i64) -> Option<&'static str> {
    usize::try_from(code)
        .ok()
        .and_then(|i| STATUS_STR.get(i))
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_codes() {
        assert_eq!(status_label(0), Some("idle"));
        assert_eq!(status_label(ProxyStatus::Online.code()), Some("online"));
        assert_eq!(status_label(4), Some("offline"));
    }

    #[test]
    fn test_out_of_range() {
        assert_eq!(status_label(-1), None);
        assert_eq!(status_label(5), None);
        assert_eq!(status_label(i64::MAX), None);
    }

    #[test]
    fn test_enum_matches_table() {
        for s in [
            ProxyStatus::Idle,
            ProxyStatus::Working,
            ProxyStatus::Closed,
            ProxyStatus::Online,
            ProxyStatus::Offline,
        ] {
            assert_eq!(status_label(s.code()), Some(s.as_str()));
        }
    }
}
