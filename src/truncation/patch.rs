//! Head/tail truncation of a single unified-diff patch

/// Marker line that replaces the dropped middle of a patch
pub fn omission_marker(omitted: usize) -> String {
    format!("... [{} lines omitted] ...", omitted)
}

/// Keep the first `keep_start` and last `keep_end` lines of `patch`,
/// replacing everything in between with a single omission marker.
///
/// Patches that already fit in the window are returned unchanged, as are
/// patches only one line longer than it: the marker would take the place of
/// the single dropped line. A trailing newline on the input is preserved on
/// the output.
pub fn truncate_patch(patch: &str, keep_start: usize, keep_end: usize) -> String {
    if patch.is_empty() {
        return String::new();
    }

    let (body, trailing_newline) = match patch.strip_suffix('\n') {
        Some(body) => (body, true),
        None => (patch, false),
    };
    let lines: Vec<&str> = body.split('\n').collect();
    let total = lines.len();
    let window = keep_start.saturating_add(keep_end);
    if total <= window.saturating_add(1) {
        return patch.to_string();
    }

    let omitted = total - window;
    let mut out = String::with_capacity(patch.len().min(window * 80 + 64));
    for line in &lines[..keep_start] {
        out.push_str(line);
        out.push('\n');
    }
    out.push_str(&omission_marker(omitted));
    for line in &lines[total - keep_end..] {
        out.push('\n');
        out.push_str(line);
    }
    if trailing_newline {
        out.push('\n');
    }
    out
}
