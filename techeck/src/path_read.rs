use crate::error::Error;
use std::path::{self, Path};

/// Module path and contents of a source file.
pub struct PathRead {
    pub path: Vec<String>,
    pub text: String,
}

impl PathRead {
    /// Read a file, using the file path without extension as module path.
    pub fn from_path(file: &Path) -> Result<Self, Error> {
        let path = module_path(file).ok_or(Error::Module)?;
        let text = std::fs::read_to_string(file)?;
        Ok(Self { path, text })
    }
}

/// Return the module path corresponding to a file path.
pub fn module_path(path: &Path) -> Option<Vec<String>> {
    let components: Vec<_> = path
        .parent()
        .map(|p| p.components().collect())
        .unwrap_or_default();
    let mpath: Option<Vec<_>> = components
        .into_iter()
        .filter(|component| !matches!(component, path::Component::CurDir))
        .map(|component| match component {
            path::Component::Normal(name) => Some(name),
            _ => None,
        })
        .collect();
    let mut mpath = mpath?;
    mpath.push(path.file_stem()?);
    mpath
        .iter()
        .map(|s| Some(String::from(s.to_str()?)))
        .collect()
}

#[test]
fn module_paths() {
    let path = |s: &str| module_path(Path::new(s));
    assert_eq!(path("Data/Nat.te"), Some(vec!["Data".into(), "Nat".into()]));
    assert_eq!(path("./Main.te"), Some(vec!["Main".into()]));
    assert_eq!(path("../Main.te"), None);
    assert_eq!(path("/abs/Main.te"), None);
}
