//! Label-orientation detection for directory-labelled binary datasets.
//!
//! A directory-based dataset loader assigns label 0 to the first class
//! subdirectory and label 1 to the second, ordered lexically by name. If the
//! positive class sorts first, the trained model's sigmoid output means
//! P(negative) and every score has to be reflected before use.

use crate::types::{ClassNames, Orientation};
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OrientationError {
    #[error("dataset unavailable: {path}: {source}")]
    DatasetUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Class subdirectory names in the order the loader assigns label indices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassOrdering {
    classes: Vec<String>,
}

impl ClassOrdering {
    /// Build an ordering from names already in label order.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            classes: names.into_iter().map(Into::into).collect(),
        }
    }

    /// List the immediate subdirectories of `root` in lexical order.
    ///
    /// Only fails if `root` cannot be read. A root with the wrong number of
    /// subdirectories still yields an ordering; it just classifies as
    /// [`Orientation::Unknown`].
    pub fn scan(root: &Path) -> Result<Self, OrientationError> {
        let unavailable = |source| OrientationError::DatasetUnavailable {
            path: root.to_path_buf(),
            source,
        };

        let mut classes = Vec::new();
        for entry in std::fs::read_dir(root).map_err(unavailable)? {
            let entry = entry.map_err(unavailable)?;
            // Follows symlinks, as the training loader does.
            if !entry.path().is_dir() {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) => classes.push(name),
                Err(raw) => {
                    tracing::warn!(name = ?raw, "skipping non-UTF-8 class directory");
                }
            }
        }
        classes.sort();

        tracing::debug!(root = %root.display(), ?classes, "scanned class directories");
        Ok(Self { classes })
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    /// Compare the ordering against the expected `[negative, positive]` pair.
    pub fn orientation(&self, names: &ClassNames) -> Orientation {
        match self.classes.as_slice() {
            [first, second] if *first == names.negative && *second == names.positive => {
                Orientation::Normal
            }
            [first, second] if *first == names.positive && *second == names.negative => {
                Orientation::Inverted
            }
            _ => Orientation::Unknown,
        }
    }
}

/// Scan `root` and report how its labels are oriented.
pub fn resolve_orientation(root: &Path, names: &ClassNames) -> Result<Orientation, OrientationError> {
    let ordering = ClassOrdering::scan(root)?;
    let orientation = ordering.orientation(names);

    match orientation {
        Orientation::Normal => tracing::info!(
            negative = %names.negative,
            positive = %names.positive,
            "labels in expected order"
        ),
        Orientation::Inverted => tracing::warn!(
            positive = %names.positive,
            negative = %names.negative,
            "labels inverted: positive class was trained as index 0"
        ),
        Orientation::Unknown => tracing::warn!(
            classes = ?ordering.classes(),
            "unexpected class directories, scores will not be corrected"
        ),
    }

    Ok(orientation)
}
