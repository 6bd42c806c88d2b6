//! Identity of masters and iterations.

use crate::constants::{DOCUMENTS_TABLE, PARTS_TABLE};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;
use strum_macros::{AsRefStr, Display, EnumString};

const MAX_ID_LEN: usize = 255;

#[plm_derive::plm_error]
pub enum KeyError {
    #[error("Invalid key{}: {message}", format_context(.context))]
    Invalid { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

fn invalid(message: impl Into<Cow<'static, str>>, context: &'static str) -> KeyError {
    KeyError::Invalid { message: message.into(), context: Some(context.into()) }
}

/// The two versioned entity kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[cfg_attr(feature = "server", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum EntityKind {
    Document,
    Part,
}

impl EntityKind {
    /// Table holding masters of this kind.
    #[must_use]
    pub const fn table(self) -> &'static str {
        match self {
            Self::Document => DOCUMENTS_TABLE,
            Self::Part => PARTS_TABLE,
        }
    }

    /// Plural path segment used in routes and blob keys.
    #[must_use]
    pub const fn collection(self) -> &'static str {
        match self {
            Self::Document => "documents",
            Self::Part => "parts",
        }
    }
}

/// Checks a document/part id, workspace id or attachment name.
///
/// # Errors
/// [`KeyError::Invalid`] when empty, padded, too long, `.`/`..`, or containing a path
/// separator or control character.
pub fn validate_id(id: &str, what: &'static str) -> Result<(), KeyError> {
    if id.is_empty() {
        return Err(invalid("must not be empty", what));
    }
    if id.trim() != id {
        return Err(invalid(format!("'{id}' has leading or trailing whitespace"), what));
    }
    if id.len() > MAX_ID_LEN {
        return Err(invalid(format!("longer than {MAX_ID_LEN} bytes"), what));
    }
    if id == "." || id == ".." {
        return Err(invalid(format!("'{id}' is reserved"), what));
    }
    if id.chars().any(|c| c == '/' || c == '\\' || c.is_control()) {
        return Err(invalid(format!("'{}' contains a separator or control character", id.escape_debug()), what));
    }
    Ok(())
}

/// Alphabetic revision label: `A`, `B`, …, `Z`, `AA`, `AB`, …
///
/// Labels order like base-26 numbers, so `Z < AA`.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "server", derive(utoipa::ToSchema), schema(value_type = String, example = "A"))]
#[serde(try_from = "String", into = "String")]
pub struct Version(String);

impl Version {
    #[must_use]
    pub fn first() -> Self {
        Self("A".to_owned())
    }

    /// # Errors
    /// [`KeyError::Invalid`] unless the label is non-empty uppercase ASCII letters.
    pub fn parse(raw: &str) -> Result<Self, KeyError> {
        if raw.is_empty() {
            return Err(invalid("empty version", "version"));
        }
        if !raw.bytes().all(|b| b.is_ascii_uppercase()) {
            return Err(invalid(format!("'{}' is not an uppercase letter label", raw.escape_debug()), "version"));
        }
        Ok(Self(raw.to_owned()))
    }

    /// The following label (`A → B`, `Z → AA`, `AZ → BA`).
    #[must_use]
    pub fn next(&self) -> Self {
        let mut bytes = self.0.clone().into_bytes();
        for byte in bytes.iter_mut().rev() {
            if *byte == b'Z' {
                *byte = b'A';
            } else {
                *byte += 1;
                return Self(String::from_utf8_lossy(&bytes).into_owned());
            }
        }
        bytes.insert(0, b'A');
        Self(String::from_utf8_lossy(&bytes).into_owned())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Version {
    fn default() -> Self {
        Self::first()
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.len().cmp(&other.0.len()).then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl TryFrom<String> for Version {
    type Error = KeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Version> for String {
    fn from(value: Version) -> Self {
        value.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Version({})", self.0)
    }
}

/// `(workspace, id, version)`; unique per workspace and entity kind.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "server", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct MasterKey {
    pub workspace_id: String,
    pub id: String,
    pub version: Version,
}

impl MasterKey {
    /// # Errors
    /// [`KeyError::Invalid`] for a bad workspace or id.
    pub fn new(workspace_id: impl Into<String>, id: impl Into<String>, version: Version) -> Result<Self, KeyError> {
        let key = Self { workspace_id: workspace_id.into(), id: id.into(), version };
        validate_id(&key.workspace_id, "workspace")?;
        validate_id(&key.id, "id")?;
        Ok(key)
    }

    /// Parses the `{id}-{version}` path segment, splitting on the last `-` so ids may
    /// contain dashes themselves.
    ///
    /// # Errors
    /// [`KeyError::Invalid`] when the segment has no `-`, or either side is invalid.
    pub fn from_segment(workspace_id: &str, segment: &str) -> Result<Self, KeyError> {
        let Some((id, version)) = segment.rsplit_once('-') else {
            return Err(invalid(format!("'{segment}' is not of the form {{id}}-{{version}}"), "key"));
        };
        if id.is_empty() {
            return Err(invalid(format!("'{segment}' has an empty id"), "key"));
        }
        Self::new(workspace_id, id, Version::parse(version)?)
    }

    /// The `{id}-{version}` path segment.
    #[must_use]
    pub fn segment(&self) -> String {
        format!("{}-{}", self.id, self.version)
    }

    /// Reference-index target naming this master, e.g. `document:acme/SPEC-A`.
    #[must_use]
    pub fn reference(&self, kind: EntityKind) -> String {
        format!("{kind}:{}/{}", self.workspace_id, self.segment())
    }

    /// Same id, another version.
    #[must_use]
    pub fn with_version(&self, version: Version) -> Self {
        Self { workspace_id: self.workspace_id.clone(), id: self.id.clone(), version }
    }

    #[must_use]
    pub fn same_lineage(&self, other: &Self) -> bool {
        self.workspace_id == other.workspace_id && self.id == other.id
    }
}

impl fmt::Display for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}-{}", self.workspace_id, self.id, self.version)
    }
}

/// One iteration of a master; numbers start at 1.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "server", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct IterationKey {
    pub master: MasterKey,
    pub iteration: u32,
}

impl IterationKey {
    #[must_use]
    pub const fn new(master: MasterKey, iteration: u32) -> Self {
        Self { master, iteration }
    }
}

impl fmt::Display for IterationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.master, self.iteration)
    }
}
