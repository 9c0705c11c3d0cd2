use crate::ProtoError;
use std::fmt;

pub const ACCOUNTS_PREFIX: &str = "/org/freedesktop/Accounts/";
pub const GROUP_STEM: &str = "Group";
pub const USER_STEM: &str = "User";

/// Object path of an exported entity, e.g. `/org/freedesktop/Accounts/Group100`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectPath(String);

impl ObjectPath {
    pub fn for_group(gid: u32) -> Self {
        Self(format!("{ACCOUNTS_PREFIX}{GROUP_STEM}{gid}"))
    }

    pub fn for_user(uid: u32) -> Self {
        Self(format!("{ACCOUNTS_PREFIX}{USER_STEM}{uid}"))
    }

    /// Accepts any absolute path made of non-empty segments.
    pub fn parse(s: &str) -> Result<Self, ProtoError> {
        let valid = s.starts_with('/')
            && s.len() > 1
            && s[1..].split('/').all(|seg| {
                !seg.is_empty() && seg.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
            });
        if !valid {
            return Err(ProtoError::InvalidObjectPath(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn group_id(&self) -> Option<u32> {
        self.numeric_suffix(GROUP_STEM)
    }

    pub fn user_id(&self) -> Option<u32> {
        self.numeric_suffix(USER_STEM)
    }

    fn numeric_suffix(&self, stem: &str) -> Option<u32> {
        let tail = self.0.strip_prefix(ACCOUNTS_PREFIX)?.strip_prefix(stem)?;
        if tail.is_empty() || !tail.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        // decimal, no leading zeros
        if tail.len() > 1 && tail.starts_with('0') {
            return None;
        }
        tail.parse().ok()
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ObjectPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_path_is_function_of_gid() {
        let p = ObjectPath::for_group(100);
        assert_eq!(p.as_str(), "/org/freedesktop/Accounts/Group100");
        assert_eq!(p.group_id(), Some(100));
        assert_eq!(p.user_id(), None);
    }

    #[test]
    fn test_rejects_leading_zero_and_garbage() {
        let p = ObjectPath::parse("/org/freedesktop/Accounts/Group0100").unwrap();
        assert_eq!(p.group_id(), None);
        let zero = ObjectPath::parse("/org/freedesktop/Accounts/Group0").unwrap();
        assert_eq!(zero.group_id(), Some(0));
        assert!(ObjectPath::parse("relative/Group1").is_err());
        assert!(ObjectPath::parse("/double//slash").is_err());
        assert!(ObjectPath::parse("/").is_err());
    }
}
