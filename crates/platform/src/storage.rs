use std::path::{Component, Path};

/// Blob storage for user uploads.
#[async_trait::async_trait]
pub trait FileStorage: Send + Sync {
    /// Stores `bytes` under `relative_path` and returns the stored reference.
    async fn upload_file(&self, bytes: Vec<u8>, relative_path: &str) -> anyhow::Result<String>;

    /// Publicly reachable URL for a stored reference.
    fn public_url(&self, reference: &str) -> String;
}

/// Rejects absolute paths and any `..` component.
pub fn validate_relative_path(relative_path: &str) -> anyhow::Result<()> {
    if relative_path.trim().is_empty() {
        anyhow::bail!("upload path must not be empty");
    }
    let path = Path::new(relative_path);
    if path.is_absolute() || relative_path.starts_with('/') || relative_path.starts_with('\\') {
        anyhow::bail!("upload path must be relative: {}", relative_path);
    }
    if path.components().any(|c| !matches!(c, Component::Normal(_) | Component::CurDir)) {
        anyhow::bail!("upload path must not leave the storage root: {}", relative_path);
    }
    Ok(())
}

/// Lower-cased extension of an uploaded file name, limited to common image types.
pub fn image_extension(file_name: &str) -> Option<&'static str> {
    let ext = Path::new(file_name).extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some("jpg"),
        "png" => Some("png"),
        "gif" => Some("gif"),
        "webp" => Some("webp"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths() {
        assert!(validate_relative_path("avatars/1_100.png").is_ok());
        assert!(validate_relative_path("./projects/a.png").is_ok());
        assert!(validate_relative_path("../etc/passwd").is_err());
        assert!(validate_relative_path("avatars/../../x").is_err());
        assert!(validate_relative_path("/etc/passwd").is_err());
        assert!(validate_relative_path("").is_err());
    }

    #[test]
    fn image_extensions() {
        assert_eq!(image_extension("me.JPEG"), Some("jpg"));
        assert_eq!(image_extension("me.png"), Some("png"));
        assert_eq!(image_extension("script.sh"), None);
        assert_eq!(image_extension("noext"), None);
    }
}
