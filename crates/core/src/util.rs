use std::path::{Component, Path, PathBuf};

/// Join two paths, only including the normal components.
pub fn join_normalized(base: impl AsRef<Path>, path: impl AsRef<Path>) -> PathBuf {
    let mut out = base.as_ref().to_path_buf();
    out.extend(path.as_ref().components().filter(|v| matches!(v, Component::Normal(_))));
    out
}

/// Remove every occurrence of `needle` from `text`, including occurrences formed by a removal.
pub fn strip_all(text: &str, needle: &str) -> String {
    let mut out = text.to_string();
    if needle.is_empty() {
        return out;
    }
    while out.contains(needle) {
        out = out.replace(needle, "");
    }
    out
}
