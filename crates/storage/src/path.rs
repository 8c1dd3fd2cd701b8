//! Remote path composition.
//!
//! Remote locations are built by plain concatenation:
//! `storage_root + base_path + relative_dir + filename`.
//!
//! > **Note:** Nothing here normalizes, escapes or rejects path segments. A
//! >           `..` in a relative directory goes to the server verbatim, and
//! >           a missing trailing `/` fuses two segments. Callers must hand
//! >           in sanitized segments.

/// Remote absolute path of an object key (or directory) under the storage root.
///
/// # Examples
///
/// ```
/// use stash_storage::path::{absolute_path, object_key};
///
/// let key = object_key("bucket/", "2023/", "a.png");
/// assert_eq!(absolute_path("/data/", &key), "/data/bucket/2023/a.png");
/// ```
pub fn absolute_path(storage_root: &str, relative: &str) -> String {
    let mut path = String::with_capacity(storage_root.len() + relative.len());
    path.push_str(storage_root);
    path.push_str(relative);
    path
}

/// Object key of a file: `base_path + relative_dir + filename`.
///
/// The object key is also what gets appended to the configured domain to
/// form the file's public URL.
pub fn object_key(base_path: &str, relative_dir: &str, filename: &str) -> String {
    [base_path, relative_dir, filename].concat()
}

/// Every directory from the top down to `path`, for recursive creation.
///
/// `/data/bucket/2023/` yields `/data`, `/data/bucket` and `/data/bucket/2023`.
pub(crate) fn dir_prefixes(path: &str) -> Vec<&str> {
    let trimmed = path.trim_end_matches('/');
    let mut prefixes: Vec<&str> =
        trimmed.match_indices('/').filter(|(i, _)| *i > 0).map(|(i, _)| &trimmed[..i]).collect();
    if !trimmed.is_empty() {
        prefixes.push(trimmed);
    }
    prefixes
}
