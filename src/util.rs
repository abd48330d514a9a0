//! Small utility helpers used across modules.

/// Render a cooldown as `"{h}h {m}m {s}s"`, the way the wheel shows it.
pub fn format_countdown(total_seconds: i64) -> String {
  let secs = total_seconds.max(0);
  format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
}

/// Make an id safe as a key-value path segment: `.`, `#`, `$`, `[`, `]` become `_`.
pub fn sanitize_key(key: &str) -> String {
  key.chars()
    .map(|c| if matches!(c, '.' | '#' | '$' | '[' | ']') { '_' } else { c })
    .collect()
}

/// Log-safe truncation for large strings.
/// Avoids spamming logs with huge response payloads.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max {
    return s.to_string();
  }
  let mut cut = max;
  while !s.is_char_boundary(cut) { cut -= 1; }
  format!("{}… ({} bytes total)", &s[..cut], s.len())
}
