use std::fmt;
use std::str::FromStr;
use serde::{Serialize, Deserialize};
use crate::error::StructuralError;

/// Dot-separated, root-relative, sibling-index path such as `0.1.2`.
/// Ordering compares segments numerically, so `0.2` sorts before `0.10`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BlockPath(Vec<u32>);

impl BlockPath {
    pub fn root(index: u32) -> Self {
        BlockPath(vec![index])
    }

    pub fn child(&self, index: u32) -> Self {
        let mut segments = self.0.clone();
        segments.push(index);
        BlockPath(segments)
    }

    /// The path with its last segment dropped; `None` for a root block.
    pub fn parent(&self) -> Option<BlockPath> {
        match self.0.len() {
            0 | 1 => None,
            n => Some(BlockPath(self.0[..n - 1].to_vec())),
        }
    }
}

impl FromStr for BlockPath {
    type Err = StructuralError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = |reason: &str| StructuralError::MalformedPath {
            path: s.to_string(),
            reason: reason.to_string(),
        };

        if s.is_empty() {
            return Err(malformed("empty path"));
        }

        s.split('.')
            .map(|segment| {
                if segment.is_empty() {
                    return Err(malformed("empty segment"));
                }
                if !segment.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(malformed("segments must be non-negative integers"));
                }
                segment
                    .parse::<u32>()
                    .map_err(|_| malformed("segment out of range"))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(BlockPath)
    }
}

impl TryFrom<String> for BlockPath {
    type Error = StructuralError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BlockPath> for String {
    fn from(path: BlockPath) -> Self {
        path.to_string()
    }
}

impl fmt::Display for BlockPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{}", segment)?;
        }
        Ok(())
    }
}
