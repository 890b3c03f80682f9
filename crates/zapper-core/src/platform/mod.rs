use std::path::{Component, Path, PathBuf};

/// Strip the drive prefix (Windows) and the root so an absolute path can be
/// re-rooted under another directory.
pub fn get_path_without_root(path: &Path) -> PathBuf {
    let mut result_path = PathBuf::new();
    for component in path
        .components()
        .skip_while(|comp| matches!(comp, Component::Prefix(_) | Component::RootDir))
    {
        result_path.push(component.as_os_str());
    }
    result_path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(not(target_os = "windows"))]
    #[test]
    fn test_get_path_without_root() {
        let stripped = get_path_without_root(Path::new("/home/user/photos/a.jpg"));
        assert_eq!(stripped, PathBuf::from("home/user/photos/a.jpg"));
    }

    #[test]
    fn test_relative_path_is_unchanged() {
        let stripped = get_path_without_root(Path::new("photos/a.jpg"));
        assert_eq!(stripped, PathBuf::from("photos/a.jpg"));
    }
}
