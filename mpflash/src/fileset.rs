//! The set of directories and files to put on a device.

use crate::patch::ConstantsPatch;

/// A constants file rewritten locally before it is copied.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct Constants {
    /// Device path.
    pub path: String,
    /// Unpatched source.
    pub template: String,
    /// Rewrites to apply.
    pub patch: ConstantsPatch,
}

impl Constants {
    /// A template at device `path` rewritten by `patch`.
    pub fn new(
        path: impl Into<String>,
        template: impl Into<String>,
        patch: ConstantsPatch,
    ) -> Self {
        Self {
            path: path.into(),
            template: template.into(),
            patch,
        }
    }
}

/// Directories and files to deploy, in order.
///
/// Directories must be listed parents first. Files keep insertion order;
/// inserting an existing path replaces its content in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fileset {
    /// Directories, parents first once completed.
    dirs: Vec<String>,
    /// Device path and content of each plain file.
    files: Vec<(String, Vec<u8>)>,
    /// Template patched at deploy time.
    constants: Option<Constants>,
}

impl Fileset {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a directory to create. Duplicates are ignored.
    pub fn add_dir(&mut self, dir: impl Into<String>) -> &mut Self {
        let dir = dir.into();
        if !self.dirs.contains(&dir) {
            self.dirs.push(dir);
        }
        self
    }

    /// Adds or replaces a file.
    pub fn insert(&mut self, path: impl Into<String>, content: impl Into<Vec<u8>>) -> &mut Self {
        let path = path.into();
        let content = content.into();
        match self.files.iter_mut().find(|(p, _)| *p == path) {
            Some(slot) => slot.1 = content,
            None => self.files.push((path, content)),
        }
        self
    }

    /// Sets the constants file patched at deploy time.
    pub fn set_constants(&mut self, constants: Constants) -> &mut Self {
        self.constants = Some(constants);
        self
    }

    /// Adds the parent directories of every file that are not listed yet,
    /// then orders all directories shallowest first. Directories of equal
    /// depth keep their relative order.
    pub fn add_parent_dirs(&mut self) -> &mut Self {
        let mut missing: Vec<String> = Vec::new();
        let paths = self
            .files
            .iter()
            .map(|(p, _)| p.as_str())
            .chain(self.constants.as_ref().map(|c| c.path.as_str()));
        for path in paths {
            let mut end = 0;
            while let Some(i) = path[end..].find('/') {
                end += i;
                let dir = &path[..end];
                if !dir.is_empty()
                    && !self.dirs.iter().any(|d| d == dir)
                    && !missing.iter().any(|d| d == dir)
                {
                    missing.push(dir.to_owned());
                }
                end += 1;
            }
        }
        self.dirs.extend(missing);
        self.dirs.sort_by_key(|d| d.matches('/').count());
        self
    }

    /// Directories to create, in order.
    pub fn dirs(&self) -> &[String] {
        &self.dirs
    }

    /// Files to copy, in order.
    pub fn files(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.files.iter().map(|(p, c)| (p.as_str(), c.as_slice()))
    }

    /// The constants file, if any.
    pub const fn constants(&self) -> Option<&Constants> {
        self.constants.as_ref()
    }

    /// Number of plain files (the constants file excluded).
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether there are no plain files.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
