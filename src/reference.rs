use std::fmt::{Display, Formatter};
use std::ops::Neg;

/// Handle to a node owned by a [`RegionManager`][crate::region::RegionManager].
///
/// The sign encodes a complemented edge: `-r` denotes the negation of `r`
/// without allocating a new node.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Region(i32);

impl Region {
    pub(crate) const fn new(index: u32) -> Self {
        Self(index as i32)
    }

    pub const fn is_negated(self) -> bool {
        self.0 < 0
    }

    pub const fn negate(self) -> Self {
        Self(-self.0)
    }

    /// Index of the underlying node in the manager's node table.
    pub const fn index(self) -> usize {
        self.0.unsigned_abs() as usize
    }

    /// The non-complemented version of this handle.
    pub const fn regular(self) -> Self {
        Self(self.0.abs())
    }

    pub(crate) const fn raw(self) -> i32 {
        self.0
    }
}

impl Neg for Region {
    type Output = Self;

    fn neg(self) -> Self::Output {
        self.negate()
    }
}

impl Display for Region {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}r{}", if self.is_negated() { "~" } else { "" }, self.index())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    #[test]
    fn test_negation_is_involutive() {
        let r = Region::new(5);
        assert!(!r.is_negated());
        assert!((-r).is_negated());
        assert_eq!(-(-r), r);
        assert_eq!((-r).index(), 5);
        assert_eq!((-r).regular(), r);
    }

    #[test]
    fn test_display() {
        let r = Region::new(3);
        assert_eq!(r.to_string(), "r3");
        assert_eq!((-r).to_string(), "~r3");
    }
}
