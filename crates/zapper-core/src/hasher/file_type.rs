use crate::config::TypeDetectorKind;
use crate::error::Error;
use std::path::Path;
use std::process::Command;

const FALLBACK_MIME_TYPE: &str = "application/octet-stream";

/// Determines the MIME type of a file on disk.
pub trait TypeDetector: Send + Sync {
    fn detect(&self, path: &Path) -> Result<String, Error>;
}

/// Asks the `file` utility, which inspects content.
pub struct FileCommandDetector;

impl TypeDetector for FileCommandDetector {
    fn detect(&self, path: &Path) -> Result<String, Error> {
        let output = Command::new("file")
            .arg("-b")
            .arg("--mime-type")
            .arg(path)
            .output()
            .map_err(|e| Error::TypeDetection(format!("could not run `file`: {}", e)))?;
        if !output.status.success() {
            return Err(Error::TypeDetection(format!(
                "`file` failed on {}: {}",
                path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        let mime = stdout.lines().next().unwrap_or("").trim();
        if mime.is_empty() {
            return Err(Error::TypeDetection(format!(
                "no type reported for {}",
                path.display()
            )));
        }
        Ok(mime.to_string())
    }
}

/// Guesses from the extension alone.
pub struct ExtensionDetector;

impl TypeDetector for ExtensionDetector {
    fn detect(&self, path: &Path) -> Result<String, Error> {
        Ok(mime_guess::from_path(path)
            .first_raw()
            .unwrap_or(FALLBACK_MIME_TYPE)
            .to_string())
    }
}

pub fn detector_for(kind: TypeDetectorKind) -> Box<dyn TypeDetector> {
    match kind {
        TypeDetectorKind::File => Box::new(FileCommandDetector),
        TypeDetectorKind::Extension => Box::new(ExtensionDetector),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_detector() {
        let detector = ExtensionDetector;
        assert_eq!(detector.detect(Path::new("a/photo.png")).unwrap(), "image/png");
        assert_eq!(detector.detect(Path::new("notes.txt")).unwrap(), "text/plain");
        assert_eq!(
            detector.detect(Path::new("no_extension")).unwrap(),
            FALLBACK_MIME_TYPE
        );
    }
}
