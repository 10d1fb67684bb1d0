//! FeedId - cheap-to-clone source feed identifier
//!
//! Every `ContentRef` carries its feed, and content refs are cloned into
//! history records, dedup keys and log fields, so the feed name is an
//! `Arc<str>`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Borrow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::Arc;

use crate::link::normalize_link;

/// Source feed identifier (normalized channel username).
///
/// # Examples
/// ```
/// use contracts::FeedId;
///
/// let feed: FeedId = "https://t.me/news_feed".into();
/// assert_eq!(feed, "news_feed");
/// let copy = feed.clone();
/// assert_eq!(feed.as_str().as_ptr(), copy.as_str().as_ptr());
/// ```
#[derive(Clone, Default)]
pub struct FeedId(Arc<str>);

impl FeedId {
    /// Create a feed id, normalizing links like `https://t.me/name` or `@name`.
    #[inline]
    pub fn new(s: &str) -> Self {
        Self(Arc::from(normalize_link(s)))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Deref for FeedId {
    type Target = str;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for FeedId {
    #[inline]
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for FeedId {
    #[inline]
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for FeedId {
    #[inline]
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for FeedId {
    #[inline]
    fn from(s: String) -> Self {
        Self::new(&s)
    }
}

impl fmt::Display for FeedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for FeedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FeedId({:?})", self.0)
    }
}

impl PartialEq for FeedId {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0 == other.0
    }
}

impl Eq for FeedId {}

impl PartialEq<str> for FeedId {
    #[inline]
    fn eq(&self, other: &str) -> bool {
        self.0.as_ref() == other
    }
}

impl PartialEq<&str> for FeedId {
    #[inline]
    fn eq(&self, other: &&str) -> bool {
        self.0.as_ref() == *other
    }
}

// Same hash as str so HashMap<FeedId, _> can be queried with &str
impl Hash for FeedId {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state)
    }
}

impl Serialize for FeedId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for FeedId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from(s))
    }
}
