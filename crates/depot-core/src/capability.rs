//! Operation flags declared by storage services.
//!
//! Every service advertises the subset of operations it actually implements
//! as a bitmask. A method may exist on a service without its flag being set;
//! the flag, not the method, decides whether the facade dispatches the call.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign, Not};

use serde::{Deserialize, Serialize};

/// Set of operations supported by a storage or one of its services.
///
/// Combine flags with `|` and test them with [`Capability::supports`]:
///
/// ```
/// use depot_core::Capability;
///
/// let read_and_write = Capability::STREAM | Capability::CREATE;
/// assert!(read_and_write.supports(Capability::STREAM));
/// assert!(!read_and_write.supports(Capability::REMOVE));
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capability(u32);

impl Capability {
    pub const NONE: Capability = Capability(0);

    /// Create a file as an atomic object.
    pub const CREATE: Capability = Capability(1 << 0);
    /// Return file content as a stream of bytes.
    pub const STREAM: Capability = Capability(1 << 1);
    /// Return a specific range of bytes from the file.
    pub const RANGE: Capability = Capability(1 << 2);
    /// Check if a file exists.
    pub const EXISTS: Capability = Capability(1 << 3);
    /// Remove a file from the storage.
    pub const REMOVE: Capability = Capability(1 << 4);
    /// Move a file to a different location inside the same storage.
    pub const MOVE: Capability = Capability(1 << 5);
    /// Make a copy of a file inside the same storage.
    pub const COPY: Capability = Capability(1 << 6);
    /// Combine multiple files into a new one in the same storage.
    pub const COMPOSE: Capability = Capability(1 << 7);
    /// Add content to an existing file.
    pub const APPEND: Capability = Capability(1 << 8);
    /// Return file details from the storage, as if the file was uploaded just now.
    pub const ANALYZE: Capability = Capability(1 << 9);
    /// Iterate over all files in the storage.
    pub const SCAN: Capability = Capability(1 << 10);
    /// Make a signed URL for a given action.
    pub const SIGNED: Capability = Capability(1 << 11);
    /// Make a permanent download link.
    pub const LINK_PERMANENT: Capability = Capability(1 << 12);
    /// Make an expiring download link.
    pub const LINK_TEMPORAL: Capability = Capability(1 << 13);
    /// Make a one-time download link.
    pub const LINK_ONE_TIME: Capability = Capability(1 << 14);
    /// Create a file in stages: initialize, upload (repeatable), complete.
    pub const MULTIPART: Capability = Capability(1 << 15);
    /// Multipart upload whose partial state survives process restarts.
    pub const RESUMABLE: Capability = Capability(1 << 16);

    const NAMES: &'static [(Capability, &'static str)] = &[
        (Capability::CREATE, "CREATE"),
        (Capability::STREAM, "STREAM"),
        (Capability::RANGE, "RANGE"),
        (Capability::EXISTS, "EXISTS"),
        (Capability::REMOVE, "REMOVE"),
        (Capability::MOVE, "MOVE"),
        (Capability::COPY, "COPY"),
        (Capability::COMPOSE, "COMPOSE"),
        (Capability::APPEND, "APPEND"),
        (Capability::ANALYZE, "ANALYZE"),
        (Capability::SCAN, "SCAN"),
        (Capability::SIGNED, "SIGNED"),
        (Capability::LINK_PERMANENT, "LINK_PERMANENT"),
        (Capability::LINK_TEMPORAL, "LINK_TEMPORAL"),
        (Capability::LINK_ONE_TIME, "LINK_ONE_TIME"),
        (Capability::MULTIPART, "MULTIPART"),
        (Capability::RESUMABLE, "RESUMABLE"),
    ];

    /// Check whether every flag of `mask` is present in the set.
    pub fn supports(self, mask: Capability) -> bool {
        self.0 & mask.0 == mask.0
    }

    /// Return a copy of the set with the given flags removed.
    pub fn exclude(self, mask: Capability) -> Capability {
        Capability(self.0 & !mask.0)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Resolve a flag from its name, case-insensitively.
    ///
    /// This is how `disabled_capabilities` names from settings are parsed.
    pub fn from_name(name: &str) -> Option<Capability> {
        Self::NAMES
            .iter()
            .find(|(_, n)| n.eq_ignore_ascii_case(name))
            .map(|(flag, _)| *flag)
    }

    /// Iterate over the names of all flags present in the set.
    pub fn names(self) -> impl Iterator<Item = &'static str> {
        Self::NAMES
            .iter()
            .filter(move |(flag, _)| self.supports(*flag))
            .map(|(_, name)| *name)
    }
}

impl BitOr for Capability {
    type Output = Capability;

    fn bitor(self, rhs: Capability) -> Capability {
        Capability(self.0 | rhs.0)
    }
}

impl BitOrAssign for Capability {
    fn bitor_assign(&mut self, rhs: Capability) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for Capability {
    type Output = Capability;

    fn bitand(self, rhs: Capability) -> Capability {
        Capability(self.0 & rhs.0)
    }
}

impl Not for Capability {
    type Output = Capability;

    fn not(self) -> Capability {
        Capability(!self.0)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "NONE");
        }
        let mut first = true;
        for name in self.names() {
            if !first {
                write!(f, "|")?;
            }
            write!(f, "{}", name)?;
            first = false;
        }
        Ok(())
    }
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Capability({})", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supports_requires_all_bits() {
        let set = Capability::CREATE | Capability::STREAM;
        assert!(set.supports(Capability::CREATE));
        assert!(set.supports(Capability::CREATE | Capability::STREAM));
        assert!(!set.supports(Capability::CREATE | Capability::REMOVE));
    }

    #[test]
    fn test_exclude_removes_bits() {
        let set = Capability::CREATE | Capability::REMOVE | Capability::SCAN;
        let restricted = set.exclude(Capability::REMOVE);
        assert!(restricted.supports(Capability::CREATE));
        assert!(!restricted.supports(Capability::REMOVE));
        assert!(restricted.supports(Capability::SCAN));
    }

    #[test]
    fn test_from_name_is_case_insensitive() {
        assert_eq!(Capability::from_name("create"), Some(Capability::CREATE));
        assert_eq!(Capability::from_name("REMOVE"), Some(Capability::REMOVE));
        assert_eq!(
            Capability::from_name("link_temporal"),
            Some(Capability::LINK_TEMPORAL)
        );
        assert_eq!(Capability::from_name("teleport"), None);
    }

    #[test]
    fn test_display_lists_flag_names() {
        let set = Capability::CREATE | Capability::MULTIPART;
        assert_eq!(set.to_string(), "CREATE|MULTIPART");
        assert_eq!(Capability::NONE.to_string(), "NONE");
    }

    #[test]
    fn test_empty_set_supports_nothing_but_none() {
        assert!(Capability::NONE.supports(Capability::NONE));
        assert!(!Capability::NONE.supports(Capability::CREATE));
    }
}
