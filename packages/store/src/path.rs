//! Path type addressing objects and indices in the storage tree.

use std::fmt;

/// Errors related to path parsing and validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    /// A path component is empty or contains forbidden characters.
    InvalidComponent {
        component: String,
        position: usize,
        message: String,
    },
    /// The path string is invalid as a whole.
    InvalidPath { message: String },
}

impl fmt::Display for PathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathError::InvalidComponent {
                component,
                position,
                message,
            } => {
                write!(
                    f,
                    "invalid path component '{}' at position {}: {}",
                    component, position, message
                )
            }
            PathError::InvalidPath { message } => {
                write!(f, "invalid path: {}", message)
            }
        }
    }
}

impl std::error::Error for PathError {}

/// A location in the storage tree.
///
/// A path is an ordered sequence of name components plus an index flag. An
/// index path denotes a directory-like container; a non-index path denotes a
/// leaf object or binary. The root is the empty index path.
///
/// Names are case-sensitive and may contain dots (`demo.zip`), but never the
/// `/` separator and never the traversal names `.` and `..`.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Path {
    components: Vec<String>,
    index: bool,
}

impl Path {
    /// The root path (empty index path).
    pub fn root() -> Self {
        Path {
            components: Vec::new(),
            index: true,
        }
    }

    /// Parse a path string.
    ///
    /// # Path Syntax
    ///
    /// - Components are separated by `/`
    /// - Empty components are ignored (normalizes `//` and a leading `/`)
    /// - A trailing `/` (or the empty string) marks an index path
    ///
    /// # Examples
    ///
    /// ```rust
    /// use stratum_store::Path;
    ///
    /// let obj = Path::parse("role/admin").unwrap();
    /// assert!(!obj.is_index());
    ///
    /// let idx = Path::parse("/role/").unwrap();
    /// assert!(idx.is_index());
    /// assert_eq!(idx.len(), 1);
    /// ```
    pub fn parse(s: &str) -> Result<Self, PathError> {
        let index = s.is_empty() || s.ends_with('/');
        let components: Vec<String> = s
            .split('/')
            .filter(|c| !c.is_empty())
            .map(|c| c.to_string())
            .collect();

        for (i, component) in components.iter().enumerate() {
            Self::validate_component(component, i)?;
        }

        Ok(Path { components, index })
    }

    /// Try to create a path from components, validating each.
    pub fn try_from_components(components: Vec<String>, index: bool) -> Result<Self, PathError> {
        for (i, component) in components.iter().enumerate() {
            Self::validate_component(component, i)?;
        }
        Ok(Path { components, index })
    }

    fn validate_component(component: &str, position: usize) -> Result<(), PathError> {
        if component.is_empty() {
            return Err(PathError::InvalidComponent {
                component: component.to_string(),
                position,
                message: "empty component".to_string(),
            });
        }
        if component == "." || component == ".." {
            return Err(PathError::InvalidComponent {
                component: component.to_string(),
                position,
                message: "traversal name".to_string(),
            });
        }
        if component.contains('/') {
            return Err(PathError::InvalidComponent {
                component: component.to_string(),
                position,
                message: "contains separator".to_string(),
            });
        }
        Ok(())
    }

    /// Check if this is the root path.
    pub fn is_root(&self) -> bool {
        self.components.is_empty() && self.index
    }

    /// Check if this path denotes an index (container).
    pub fn is_index(&self) -> bool {
        self.index
    }

    /// Check if this path denotes a leaf object.
    pub fn is_object(&self) -> bool {
        !self.index
    }

    /// Get the number of name components.
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Check if the component list is empty.
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Iterate over name components.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.components.iter().map(String::as_str)
    }

    /// Get the name component at position `i`.
    pub fn name(&self, i: usize) -> Option<&str> {
        self.components.get(i).map(String::as_str)
    }

    /// Get the last name component.
    pub fn last_name(&self) -> Option<&str> {
        self.components.last().map(String::as_str)
    }

    /// The parent index path. The root is its own parent.
    #[must_use]
    pub fn parent(&self) -> Path {
        if self.components.is_empty() {
            return Path::root();
        }
        Path {
            components: self.components[..self.components.len() - 1].to_vec(),
            index: true,
        }
    }

    /// A direct child of this path.
    ///
    /// The name is taken as-is; callers must not pass names containing the
    /// separator.
    #[must_use]
    pub fn child(&self, name: &str, index: bool) -> Path {
        let mut components = self.components.clone();
        components.push(name.to_string());
        Path { components, index }
    }

    /// The path formed by appending `other` below this path.
    ///
    /// Appending the root path is an identity operation.
    #[must_use]
    pub fn descendant(&self, other: &Path) -> Path {
        if other.components.is_empty() {
            return self.clone();
        }
        let mut components = self.components.clone();
        components.extend(other.components.iter().cloned());
        Path {
            components,
            index: other.index,
        }
    }

    /// Check if this path is equal to or located under `prefix`.
    ///
    /// A path can only descend through an index, so a strict prefix must be
    /// an index path; an equal-length prefix must match the index flag.
    pub fn starts_with(&self, prefix: &Path) -> bool {
        if prefix.components.len() > self.components.len() {
            return false;
        }
        if prefix.components[..] != self.components[..prefix.components.len()] {
            return false;
        }
        if prefix.components.len() == self.components.len() {
            prefix.index == self.index
        } else {
            prefix.index
        }
    }

    /// Strip a prefix, returning the remainder relative to it.
    ///
    /// Returns `None` if `self` does not start with `prefix`.
    #[must_use]
    pub fn strip_prefix(&self, prefix: &Path) -> Option<Path> {
        if !self.starts_with(prefix) {
            return None;
        }
        Some(Path {
            components: self.components[prefix.components.len()..].to_vec(),
            index: self.index,
        })
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.components.join("/"))?;
        if self.index && !self.components.is_empty() {
            write!(f, "/")?;
        }
        Ok(())
    }
}

/// Macro for creating paths from literals.
///
/// # Example
///
/// ```rust
/// use stratum_store::path;
///
/// let p = path!("role/admin");
/// assert_eq!(p.len(), 2);
/// assert!(!p.is_index());
/// ```
#[macro_export]
macro_rules! path {
    ($s:expr) => {
        $crate::Path::parse($s).expect("invalid path literal")
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_basic_paths() {
        assert_eq!(Path::parse("").unwrap(), Path::root());
        assert_eq!(Path::parse("/").unwrap(), Path::root());
        assert!(Path::root().is_root());
        assert!(Path::root().is_empty());
        assert_eq!(Path::parse("foo").unwrap().len(), 1);
        assert_eq!(Path::parse("foo/bar").unwrap().len(), 2);
        assert!(Path::parse("foo/bar").unwrap().is_object());
        assert!(Path::parse("foo/bar/").unwrap().is_index());
    }

    #[test]
    fn normalize_slashes() {
        assert_eq!(
            Path::parse("foo//bar").unwrap(),
            Path::parse("foo/bar").unwrap()
        );
        assert_eq!(
            Path::parse("/foo/bar").unwrap(),
            Path::parse("foo/bar").unwrap()
        );
    }

    #[test]
    fn index_flag_distinguishes_paths() {
        assert_ne!(path!("role"), path!("role/"));
    }

    #[test]
    fn dotted_names_allowed() {
        let p = path!("files/logo.png");
        assert_eq!(p.last_name(), Some("logo.png"));
    }

    #[test]
    fn traversal_names_rejected() {
        assert!(Path::parse("foo/../bar").is_err());
        assert!(Path::parse("./foo").is_err());
    }

    #[test]
    fn parent_works() {
        assert_eq!(path!("a/b/c").parent(), path!("a/b/"));
        assert_eq!(path!("a/").parent(), Path::root());
        assert_eq!(Path::root().parent(), Path::root());
    }

    #[test]
    fn child_works() {
        assert_eq!(path!("role/").child("admin", false), path!("role/admin"));
        assert_eq!(Path::root().child("role", true), path!("role/"));
    }

    #[test]
    fn descendant_works() {
        assert_eq!(path!("a/").descendant(&path!("b/c")), path!("a/b/c"));
        assert_eq!(path!("a/").descendant(&Path::root()), path!("a/"));
        assert_eq!(Path::root().descendant(&path!("x")), path!("x"));
    }

    #[test]
    fn starts_with_works() {
        let p = path!("foo/bar/baz");
        assert!(p.starts_with(&Path::root()));
        assert!(p.starts_with(&path!("foo/")));
        assert!(p.starts_with(&path!("foo/bar/")));
        assert!(p.starts_with(&path!("foo/bar/baz")));
        // A leaf is not a valid strict prefix.
        assert!(!p.starts_with(&path!("foo")));
        assert!(!p.starts_with(&path!("foo/bar/baz/")));
        assert!(!p.starts_with(&path!("bar/")));
    }

    #[test]
    fn strip_prefix_works() {
        let p = path!("foo/bar/baz");
        assert_eq!(p.strip_prefix(&path!("foo/")), Some(path!("bar/baz")));
        assert_eq!(p.strip_prefix(&path!("foo/bar/")), Some(path!("baz")));
        assert_eq!(p.strip_prefix(&path!("other/")), None);
        let idx = path!("foo/bar/");
        assert_eq!(idx.strip_prefix(&path!("foo/")), Some(path!("bar/")));
    }

    #[test]
    fn name_accessors() {
        let p = path!("a/b/c");
        assert_eq!(p.name(0), Some("a"));
        assert_eq!(p.name(2), Some("c"));
        assert_eq!(p.name(3), None);
        assert_eq!(p.last_name(), Some("c"));
        assert_eq!(Path::root().last_name(), None);
    }

    #[test]
    fn display_impl() {
        assert_eq!(format!("{}", Path::root()), "/");
        assert_eq!(format!("{}", path!("foo/bar")), "/foo/bar");
        assert_eq!(format!("{}", path!("foo/bar/")), "/foo/bar/");
    }

    #[test]
    fn display_roundtrips() {
        for s in ["/", "/role/admin", "/role/", "/storage/plugin/demo/"] {
            let p = Path::parse(s).unwrap();
            assert_eq!(Path::parse(&p.to_string()).unwrap(), p);
        }
    }

    #[test]
    fn ordering_is_depth_first() {
        let mut paths = vec![path!("b"), path!("a/c"), path!("a/b")];
        paths.sort();
        assert_eq!(paths, vec![path!("a/b"), path!("a/c"), path!("b")]);
    }

    #[test]
    fn path_hash() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(path!("foo"));
        set.insert(path!("foo/"));
        set.insert(path!("foo"));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn path_error_display() {
        let err = Path::parse("a/../b").unwrap_err();
        let display = format!("{}", err);
        assert!(display.contains("traversal"));
    }
}
