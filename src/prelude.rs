//! Built-in preamble source (spec §4.0), prepended to every compilation
//! unless `--no-prelude` is passed. Declares the primitive operators as
//! ordinary top-level functions so a user program can see, shadow, or
//! extend them rather than having them synthesized invisibly by the
//! semantic analyzer.

/// Source text for every built-in the semantic analyzer would otherwise
/// inject directly into the root scope. Kept as plain source (not a
/// hard-coded symbol table) so the front end has exactly one entry point.
pub const SOURCE: &str = r#"
fn not(x: Bool): Bool { if x { false } else { true } }
"#;

/// Number of lines contributed by [`SOURCE`], used to translate spans
/// produced while compiling prelude-prefixed source back into user-visible
/// line numbers when `--no-prelude` is absent.
#[must_use] pub fn line_count() -> u32 {
  SOURCE.lines().count() as u32
}

/// Prepend the prelude to `source` unless the caller has opted out. Purely
/// textual concatenation — span bookkeeping for diagnostics is handled by
/// the caller subtracting [`line_count`] from reported line numbers when the
/// prelude is present, matching the original preamble-file convention of
/// compiling it as one synthetic leading file.
#[must_use] pub fn prepend(source: &str, enabled: bool) -> String {
  if enabled { format!("{SOURCE}\n{source}") } else { source.to_owned() }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn prepend_adds_prelude_by_default() {
    let combined = prepend("fn main() {}", true);
    assert!(combined.contains("fn not"));
    assert!(combined.contains("fn main"));
  }

  #[test]
  fn no_prelude_leaves_source_untouched() {
    let combined = prepend("fn main() {}", false);
    assert_eq!(combined, "fn main() {}");
  }
}
