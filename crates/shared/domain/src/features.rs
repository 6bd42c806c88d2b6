use crate::constants::{AUDIT, CHANGE, DOCUMENTS, PARTS};
use bitflags::bitflags;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

bitflags! {
    /// Feature slices enabled at runtime.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct FeatureSet: u32 {
        const DOCUMENTS = 1 << 0;
        const PARTS = 1 << 1;
        const CHANGE = 1 << 2;
        const AUDIT = 1 << 3;

        const ALL = Self::DOCUMENTS.bits() | Self::PARTS.bits() | Self::CHANGE.bits() | Self::AUDIT.bits();
    }
}

impl FeatureSet {
    /// Union of the named features. Unknown names are ignored.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names.into_iter().fold(Self::empty(), |set, name| set | Self::from(name.as_ref()))
    }
}

impl From<&str> for FeatureSet {
    fn from(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            DOCUMENTS => Self::DOCUMENTS,
            PARTS => Self::PARTS,
            CHANGE => Self::CHANGE,
            AUDIT => Self::AUDIT,
            "all" | "*" => Self::ALL,
            _ => Self::empty(),
        }
    }
}

impl Serialize for FeatureSet {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u32(self.bits())
    }
}

impl<'de> Deserialize<'de> for FeatureSet {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bits = u32::deserialize(deserializer)?;
        Ok(Self::from_bits_truncate(bits))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_combine() {
        let set = FeatureSet::from_names(["documents", "Change", "bogus"]);
        assert_eq!(set, FeatureSet::DOCUMENTS | FeatureSet::CHANGE);
        assert_eq!(FeatureSet::from_names(["all"]), FeatureSet::ALL);
        assert!(FeatureSet::from_names(Vec::<String>::new()).is_empty());
    }
}
