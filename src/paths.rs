use crate::error::{Error, Result};

/// Normalize a repository path: strip leading/trailing slashes, reject `..`
/// segments, and collapse repeated slashes and `.` segments.
///
/// An empty or slash-only input returns an empty string (root).
///
/// # Errors
/// Returns [`Error::InvalidPath`] if the path contains `..` segments, or
/// consists only of `.` segments.
pub fn normalize_path(path: &str) -> Result<String> {
    if path.is_empty() {
        return Ok(String::new());
    }

    let mut segments: Vec<&str> = Vec::new();
    for seg in path.split('/') {
        if seg.is_empty() || seg == "." {
            continue;
        }
        if seg == ".." {
            return Err(Error::invalid_path(format!(
                "path segment '{}' is not allowed: {}",
                seg, path,
            )));
        }
        segments.push(seg);
    }

    if segments.is_empty() {
        if path.bytes().all(|b| b == b'/') {
            return Ok(String::new());
        }
        return Err(Error::invalid_path("path must not be empty"));
    }

    Ok(segments.join("/"))
}

/// Normalize a path that must name something below the root.
///
/// # Errors
/// Returns [`Error::InvalidPath`] for the root path or anything
/// [`normalize_path`] rejects.
pub fn normalize_file_path(path: &str) -> Result<String> {
    let norm = normalize_path(path)?;
    if norm.is_empty() {
        return Err(Error::invalid_path(format!(
            "path must name a file, not the repository root: {:?}",
            path
        )));
    }
    Ok(norm)
}

/// Validate a branch name.
///
/// Rejects spaces, control characters, `..`, `@{`, a leading `-`, trailing
/// `.` or `/`, and the `.lock` suffix, per git's `check-ref-format` rules.
///
/// # Errors
/// Returns [`Error::InvalidRefName`] if the name violates any rule.
pub fn validate_branch_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::invalid_ref_name("branch name must not be empty"));
    }

    for ch in name.chars() {
        if ch.is_control() {
            return Err(Error::invalid_ref_name(format!(
                "branch name contains a control character: {:?}",
                name,
            )));
        }
        match ch {
            ':' | ' ' | '\\' | '^' | '~' | '?' | '*' | '[' => {
                return Err(Error::invalid_ref_name(format!(
                    "branch name contains invalid character {:?}: {}",
                    ch, name,
                )));
            }
            _ => {}
        }
    }

    if name.contains("..") {
        return Err(Error::invalid_ref_name(format!(
            "branch name must not contain '..': {}",
            name
        )));
    }

    if name.contains("@{") {
        return Err(Error::invalid_ref_name(format!(
            "branch name must not contain '@{{': {}",
            name
        )));
    }

    if name.starts_with('-') || name.starts_with('/') || name.ends_with('/') || name.contains("//") {
        return Err(Error::invalid_ref_name(format!(
            "branch name has an empty or dash-led component: {}",
            name
        )));
    }

    if name.ends_with('.') {
        return Err(Error::invalid_ref_name(format!(
            "branch name must not end with '.': {}",
            name
        )));
    }

    if name.ends_with(".lock") {
        return Err(Error::invalid_ref_name(format!(
            "branch name must not end with '.lock': {}",
            name
        )));
    }

    Ok(())
}

/// Full ref name for a branch.
pub fn branch_ref(branch: &str) -> String {
    format!("refs/heads/{}", branch)
}

/// Directory part of a normalized path (`""` at the root).
pub fn parent_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(i) => &path[..i],
        None => "",
    }
}

/// Last segment of a normalized path.
pub fn basename(path: &str) -> &str {
    match path.rfind('/') {
        Some(i) => &path[i + 1..],
        None => path,
    }
}

/// Join a directory and a relative path; an empty `dir` means the root.
pub fn join(dir: &str, rel: &str) -> String {
    if dir.is_empty() {
        rel.to_string()
    } else {
        format!("{}/{}", dir, rel)
    }
}

/// Every proper ancestor directory of `path`, shallowest first.
///
/// `"a/b/c.txt"` yields `["a", "a/b"]`.
pub fn ancestors(path: &str) -> Vec<&str> {
    path.match_indices('/').map(|(i, _)| &path[..i]).collect()
}

/// Format a commit message from an operation and optional user message.
///
/// If `message` is `Some` and not blank, it is used directly; otherwise
/// `fallback` becomes the message.
pub fn format_commit_message(fallback: &str, message: Option<&str>) -> String {
    match message {
        Some(msg) if !msg.trim().is_empty() => msg.to_string(),
        _ => fallback.to_string(),
    }
}

/// `"Move files: a → b, c → d, e → f and 2 more"`.
pub fn summarize_moves(moves: &[(String, String)]) -> String {
    let shown: Vec<String> = moves
        .iter()
        .take(3)
        .map(|(from, to)| format!("{} → {}", from, to))
        .collect();
    let mut summary = format!("Move files: {}", shown.join(", "));
    if moves.len() > 3 {
        summary.push_str(&format!(" and {} more", moves.len() - 3));
    }
    summary
}
