use std::cmp::Ordering;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Serialize, Serializer};

/// An IDE build number such as `IU-172.3317.76` or `172.3317`.
///
/// Ordering is by build components; a longer version is newer than its
/// prefix (`172.3317.1 > 172.3317`), and `SNAPSHOT`/`*` components sort after
/// every number. The product code only breaks ties.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct IdeVersion {
    product_code: Option<String>,
    components: Vec<u32>,
    /// A trailing `SNAPSHOT` or `*` component.
    snapshot: bool,
}

/// One build component for ordering; a wildcard sorts after every number.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Component {
    Number(u32),
    Wildcard,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid IDE version {input:?}: {reason}")]
pub struct ParseIdeVersionError {
    input: String,
    reason: &'static str,
}

impl IdeVersion {
    pub fn product_code(&self) -> Option<&str> {
        self.product_code.as_deref()
    }

    /// The numeric components; a trailing wildcard is reported by [`Self::is_snapshot`].
    pub fn components(&self) -> &[u32] {
        &self.components
    }

    pub fn baseline(&self) -> u32 {
        self.components[0]
    }

    pub fn is_snapshot(&self) -> bool {
        self.snapshot
    }

    fn build_components(&self) -> impl Iterator<Item = Component> + '_ {
        self.components
            .iter()
            .map(|&number| Component::Number(number))
            .chain(self.snapshot.then_some(Component::Wildcard))
    }

    /// Compares build numbers only, ignoring product codes.
    pub fn compare_build(&self, other: &IdeVersion) -> Ordering {
        self.build_components().cmp(other.build_components())
    }

    /// Whether this build lies in `[since, until]`, bounds included.
    pub fn is_in_range(&self, since: &IdeVersion, until: &IdeVersion) -> bool {
        self.compare_build(since) != Ordering::Less && self.compare_build(until) != Ordering::Greater
    }

    /// Reads `build.txt` from an IDE installation directory.
    pub fn read_build_txt(ide_dir: &Path) -> std::io::Result<Option<IdeVersion>> {
        let path = ide_dir.join("build.txt");
        match std::fs::read_to_string(&path) {
            Ok(text) => Ok(text.trim().parse().ok()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }
}

impl FromStr for IdeVersion {
    type Err = ParseIdeVersionError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let error = |reason| ParseIdeVersionError {
            input: input.to_string(),
            reason,
        };
        let trimmed = input.trim();
        let (product_code, build) = match trimmed.split_once('-') {
            Some((code, build)) if !code.is_empty() && code.chars().all(|c| c.is_ascii_alphabetic()) => {
                (Some(code.to_string()), build)
            }
            Some(_) => return Err(error("malformed product code")),
            None => (None, trimmed),
        };
        if build.is_empty() {
            return Err(error("missing build number"));
        }

        let mut parts: Vec<&str> = build.split('.').collect();
        let snapshot = parts.len() > 1 && matches!(parts.last(), Some(&("SNAPSHOT" | "*")));
        if snapshot {
            parts.pop();
        }
        let components = parts
            .iter()
            .map(|part| part.parse::<u32>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| error("build components must be numbers"))?;

        Ok(IdeVersion {
            product_code,
            components,
            snapshot,
        })
    }
}

impl Ord for IdeVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare_build(other)
            .then_with(|| self.product_code.cmp(&other.product_code))
    }
}

impl PartialOrd for IdeVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for IdeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(code) = &self.product_code {
            write!(f, "{code}-")?;
        }
        for (idx, component) in self.components.iter().enumerate() {
            if idx > 0 {
                f.write_str(".")?;
            }
            write!(f, "{component}")?;
        }
        if self.snapshot {
            f.write_str(".SNAPSHOT")?;
        }
        Ok(())
    }
}

impl Serialize for IdeVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
