//! Named parameters interpolated into a remote build submission.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

/// Immutable `KEY -> value` mapping for one build invocation.
///
/// Keys are kept sorted, so two sets holding the same pairs compare equal and
/// serialize identically regardless of insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubstitutionSet {
    values: BTreeMap<String, String>,
}

impl SubstitutionSet {
    pub fn builder() -> SubstitutionSetBuilder {
        SubstitutionSetBuilder::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Format expected by `gcloud builds submit`: `_FOO=bar,_BAZ=qux`.
    pub fn to_arg(&self) -> String {
        self.iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Parse a `K=V,K=V` argument back into a set.
    #[cfg(test)]
    pub fn parse_arg(arg: &str) -> Option<Self> {
        let mut values = BTreeMap::new();
        for pair in arg.split(',').filter(|p| !p.is_empty()) {
            let (k, v) = pair.split_once('=')?;
            values.insert(k.to_string(), v.to_string());
        }
        Some(Self { values })
    }
}

impl fmt::Display for SubstitutionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_arg())
    }
}

/// Collects pairs for a [`SubstitutionSet`]; the set is frozen by `build`.
#[derive(Debug, Default)]
pub struct SubstitutionSetBuilder {
    values: BTreeMap<String, String>,
}

impl SubstitutionSetBuilder {
    pub fn set(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.values.insert(key.into(), value.to_string());
        self
    }

    pub fn build(self) -> SubstitutionSet {
        SubstitutionSet {
            values: self.values,
        }
    }
}

/// Replace every non-word character in a branch name with `_`.
pub fn sanitize_branch_tag(branch: &str) -> String {
    static NON_WORD: OnceLock<Regex> = OnceLock::new();
    NON_WORD
        .get_or_init(|| Regex::new(r"\W").expect("static regex"))
        .replace_all(branch, "_")
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insertion_order_does_not_matter() {
        let ab = SubstitutionSet::builder().set("A", 1).set("B", 2).build();
        let ba = SubstitutionSet::builder().set("B", 2).set("A", 1).build();
        assert_eq!(ab, ba);
        assert_eq!(ab.to_arg(), ba.to_arg());
        assert_eq!(ab.to_arg(), "A=1,B=2");
    }

    #[test]
    fn test_parse_arg_accepts_any_order() {
        let forward = SubstitutionSet::parse_arg("A=1,B=2").unwrap();
        let reverse = SubstitutionSet::parse_arg("B=2,A=1").unwrap();
        assert_eq!(forward, reverse);
        assert_eq!(forward.get("B"), Some("2"));
        assert!(SubstitutionSet::parse_arg("no-equals-sign").is_none());
    }

    #[test]
    fn test_sanitize_branch_tag() {
        assert_eq!(sanitize_branch_tag("feature/x-1"), "feature_x_1");
        assert_eq!(sanitize_branch_tag("release-1.20.x"), "release_1_20_x");
        assert_eq!(sanitize_branch_tag("master"), "master");
    }

    #[test]
    fn test_empty_set() {
        let set = SubstitutionSet::default();
        assert!(set.is_empty());
        assert_eq!(set.to_arg(), "");
    }
}
