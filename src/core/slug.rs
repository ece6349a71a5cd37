// Filesystem-safe slugs for collection and cluster names.
use crate::core::error::{Error, ErrorKind};

/// Lowercases `name` and folds every run of characters outside `[a-z0-9_]` into
/// a single `-`, trimming separators at both ends.
pub fn slugify(name: &str) -> Result<String, Error> {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() || ch == '_' {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    if slug.is_empty() {
        return Err(Error::new(ErrorKind::Usage)
            .with_message(format!("name {name:?} has no slug characters"))
            .with_hint("Use names containing letters, digits, or underscores."));
    }
    Ok(slug)
}
