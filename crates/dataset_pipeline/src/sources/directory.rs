use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::category::CategoryResolver;
use crate::config::DirectoryConfig;
use crate::source::{RawLabel, RawRow, RowFields, RowSource};

/// One file under a category folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    #[serde(rename = "Path")]
    pub path: PathBuf,
    #[serde(rename = "Category")]
    pub category: i64,
}

/// Files laid out as `<parent>/<category>/<file>`.
///
/// Rows carry the file path as their only field, so processors receive
/// paths and do their own loading. The category is resolved from the folder
/// name at scan time.
///
/// # Example
/// ```ignore
/// let source = DirectorySource::new(
///     DirectoryConfig::new("./data/pets").extensions(&["jpg", "png"]),
/// )?;
/// ```
#[derive(Debug)]
pub struct DirectorySource {
    config: DirectoryConfig,
}

impl DirectorySource {
    pub fn new(config: DirectoryConfig) -> Result<Self> {
        // Early validation: ensure the directory exists and is indeed a directory.
        let metadata = fs::metadata(&config.parent_dir).with_context(|| {
            format!(
                "Failed to access directory: {}",
                config.parent_dir.display()
            )
        })?;
        if !metadata.is_dir() {
            bail!("Path is not a directory: {}", config.parent_dir.display());
        }
        Ok(Self { config })
    }

    /// Immediate children of `dir`, sorted by name, that satisfy `keep`.
    fn children(dir: &Path, keep: impl Fn(&fs::Metadata, &Path) -> bool) -> Result<Vec<PathBuf>> {
        let mut children = Vec::new();
        for entry in WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry.with_context(|| {
                format!("Failed to read directory entry in {}", dir.display())
            })?;
            if entry.path_is_symlink() {
                continue;
            }
            let metadata = entry
                .metadata()
                .with_context(|| format!("Failed to get metadata for: {}", entry.path().display()))?;
            if keep(&metadata, entry.path()) {
                children.push(entry.into_path());
            }
        }
        Ok(children)
    }

    fn extension_matches(&self, path: &Path) -> bool {
        if self.config.extensions.is_empty() {
            return true;
        }
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| self.config.extensions.contains(&e.to_lowercase()))
    }
}

impl RowSource for DirectorySource {
    type Entry = DirectoryEntry;

    const INDEX_FIELD: &'static str = "Images";

    fn describe(&self) -> String {
        self.config.parent_dir.display().to_string()
    }

    fn scan(
        &self,
        resolver: &mut CategoryResolver,
        _ignore_parse_errors: bool,
    ) -> Result<Vec<DirectoryEntry>> {
        let folders = Self::children(&self.config.parent_dir, |metadata, _| metadata.is_dir())?;

        let mut categories = Vec::new();
        for folder in folders {
            let name = folder
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let files = Self::children(&folder, |metadata, path| {
                metadata.is_file() && self.extension_matches(path)
            })?;
            if files.is_empty() {
                continue;
            }
            resolver.resolve(&name);
            categories.push((name, files));
        }

        // Ids are final only once every folder name has been seen.
        let mut entries = Vec::new();
        for (name, files) in categories {
            let category = resolver.strategy().resolve(&name)?;
            for path in files {
                resolver.record(category);
                entries.push(DirectoryEntry { path, category });
            }
        }
        Ok(entries)
    }

    fn read_row(&self, entry: &DirectoryEntry) -> Result<RawRow> {
        Ok(RawRow {
            fields: RowFields::Text(vec![entry.path.to_string_lossy().into_owned()]),
            label: RawLabel::Class(entry.category),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::tempdir;

    #[test]
    fn test_scan_assigns_folder_categories() -> Result<()> {
        let dir = tempdir()?;
        let d = dir.path();
        for (folder, files) in [("dogs", 1), ("cats", 2)] {
            fs::create_dir(d.join(folder))?;
            for i in 0..files {
                File::create(d.join(folder).join(format!("{}.JPG", i)))?;
            }
        }
        File::create(d.join("cats").join("notes.txt"))?;
        File::create(d.join("stray.jpg"))?;

        let source = DirectorySource::new(DirectoryConfig::new(d).extensions(&["jpg"]))?;
        let mut resolver = CategoryResolver::default();
        let entries = source.scan(&mut resolver, false)?;

        // Folders are visited in name order, so "cats" gets id 0.
        let categories: Vec<i64> = entries.iter().map(|e| e.category).collect();
        assert_eq!(categories, vec![0, 0, 1]);
        assert_eq!(resolver.stats().counts.get(&0), Some(&2));
        assert_eq!(resolver.stats().counts.get(&1), Some(&1));

        let row = source.read_row(&entries[2])?;
        assert_eq!(row.label, RawLabel::Class(1));
        match row.fields {
            RowFields::Text(fields) => assert!(fields[0].ends_with("0.JPG")),
            other => panic!("unexpected fields {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn test_numeric_folder_names() -> Result<()> {
        let dir = tempdir()?;
        for folder in ["0", "1"] {
            fs::create_dir(dir.path().join(folder))?;
            File::create(dir.path().join(folder).join("x.png"))?;
        }
        let source = DirectorySource::new(DirectoryConfig::new(dir.path()))?;
        let mut resolver = CategoryResolver::default();
        let entries = source.scan(&mut resolver, false)?;
        assert_eq!(entries[1].category, 1);
        assert!(resolver.strategy().vocabulary().is_none());
        Ok(())
    }

    #[test]
    fn test_numeric_and_named_folders_share_one_vocabulary() -> Result<()> {
        let dir = tempdir()?;
        for (folder, files) in [("3", 2), ("ants", 1)] {
            fs::create_dir(dir.path().join(folder))?;
            for i in 0..files {
                File::create(dir.path().join(folder).join(format!("{}.png", i)))?;
            }
        }
        let source = DirectorySource::new(DirectoryConfig::new(dir.path()))?;
        let mut resolver = CategoryResolver::default();
        let entries = source.scan(&mut resolver, false)?;

        let categories: Vec<i64> = entries.iter().map(|e| e.category).collect();
        assert_eq!(categories, vec![0, 0, 1]);
        assert_eq!(resolver.stats().counts.get(&0), Some(&2));
        assert_eq!(resolver.strategy().resolve("3")?, 0);
        Ok(())
    }

    #[test]
    fn test_not_a_directory() -> Result<()> {
        let dir = tempdir()?;
        let file = dir.path().join("file.txt");
        File::create(&file)?;
        assert!(DirectorySource::new(DirectoryConfig::new(&file)).is_err());
        assert!(DirectorySource::new(DirectoryConfig::new(dir.path().join("nope"))).is_err());
        Ok(())
    }
}
