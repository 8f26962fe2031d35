//! Maps caller-supplied resource names onto declared resource definitions.
//!
//! Both sides of the lookup go through the same normalization, so
//! `"Blog Post"`, `"blog-post"` and `"blog_posts"` all address the same
//! declared resource.

use crate::models::resource::{ResourceDef, ResourceSpec};

/// Fallback key when normalization produces nothing usable.
pub const DEFAULT_KEY: &str = "items";

/// Lower-case, collapse runs of non-alphanumerics into a single `_`,
/// trim separators, then pluralize by appending `s` unless the slug
/// already ends in one.
pub fn normalize_key(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
        } else if !slug.ends_with('_') {
            slug.push('_');
        }
    }
    let slug = slug.trim_matches('_').to_string();
    if slug.is_empty() {
        return DEFAULT_KEY.to_string();
    }
    if slug.ends_with('s') {
        slug
    } else {
        format!("{}s", slug)
    }
}

/// Find the declared resource matching `requested`, returning the
/// definition together with its normalized key.
pub fn find_resource<'a>(
    spec: &'a ResourceSpec,
    requested: &str,
) -> Option<(&'a ResourceDef, String)> {
    let wanted = normalize_key(requested);
    spec.resources
        .iter()
        .find(|r| normalize_key(&r.name) == wanted)
        .map(|r| (r, wanted))
}
