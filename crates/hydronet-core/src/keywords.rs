//! Validated keyword tags attached to a device.

use std::collections::BTreeSet;
use std::fmt;

use crate::device::is_identifier;
use crate::error::{Error, Result};

/// Set of keywords used to describe and search for devices.
///
/// Every keyword must be a valid identifier. The set remembers the name of
/// its owning device so that validation errors can point to it; a detached
/// set reports its owner as `?`.
#[derive(Clone, Default)]
pub struct Keywords {
    device: Option<String>,
    names: BTreeSet<String>,
}

impl Keywords {
    /// Create an empty, detached keyword set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a detached keyword set from the given names.
    pub fn from_names<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut keywords = Self::new();
        keywords.update(names)?;
        Ok(keywords)
    }

    pub(crate) fn for_device(device: &str) -> Self {
        Self {
            device: Some(device.to_owned()),
            names: BTreeSet::new(),
        }
    }

    pub(crate) fn set_device(&mut self, device: &str) {
        self.device = Some(device.to_owned());
    }

    /// Name of the owning device, or `?` when detached.
    pub fn device(&self) -> &str {
        self.device.as_deref().unwrap_or("?")
    }

    /// Check that `keyword` could be added to a device named `device`.
    pub(crate) fn validate(device: &str, keyword: &str) -> Result<()> {
        if is_identifier(keyword) {
            Ok(())
        } else {
            Err(Error::InvalidKeyword {
                keyword: keyword.to_owned(),
                device: device.to_owned(),
            })
        }
    }

    /// Add a single keyword.
    pub fn add(&mut self, keyword: &str) -> Result<()> {
        Self::validate(self.device(), keyword)?;
        self.names.insert(keyword.to_owned());
        Ok(())
    }

    /// Add several keywords at once.
    ///
    /// Either all keywords are added or, if any of them is invalid, none.
    pub fn update<I, S>(&mut self, keywords: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keywords: Vec<String> = keywords
            .into_iter()
            .map(|k| k.as_ref().to_owned())
            .collect();
        for keyword in &keywords {
            Self::validate(self.device(), keyword)?;
        }
        self.names.extend(keywords);
        Ok(())
    }

    /// Remove a keyword, returning whether it was present.
    pub fn remove(&mut self, keyword: &str) -> bool {
        self.names.remove(keyword)
    }

    /// Remove all keywords.
    pub fn clear(&mut self) {
        self.names.clear();
    }

    /// Check whether the exact keyword is present.
    pub fn has(&self, keyword: &str) -> bool {
        self.names.contains(keyword)
    }

    /// All keywords starting with `prefix`, sorted.
    pub fn startswith(&self, prefix: &str) -> Vec<String> {
        self.matching(|k| k.starts_with(prefix))
    }

    /// All keywords ending with `suffix`, sorted.
    pub fn endswith(&self, suffix: &str) -> Vec<String> {
        self.matching(|k| k.ends_with(suffix))
    }

    /// All keywords containing `pattern`, sorted.
    pub fn contains(&self, pattern: &str) -> Vec<String> {
        self.matching(|k| k.contains(pattern))
    }

    fn matching(&self, predicate: impl Fn(&str) -> bool) -> Vec<String> {
        // BTreeSet iteration is already sorted.
        self.names
            .iter()
            .filter(|k| predicate(k))
            .cloned()
            .collect()
    }

    /// Iterate over the keywords in alphabetical order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl PartialEq for Keywords {
    fn eq(&self, other: &Self) -> bool {
        self.names == other.names
    }
}

impl Eq for Keywords {}

impl fmt::Display for Keywords {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Keywords([")?;
        for (i, keyword) in self.names.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "\"{}\"", keyword)?;
        }
        write!(f, "])")
    }
}

impl fmt::Debug for Keywords {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
