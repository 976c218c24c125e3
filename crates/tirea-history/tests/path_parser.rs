//! Path expression parsing.

use tirea_history::{parse_path, path, try_parse_path, HistoryError, Path, Seg, Target};

// ============================================================================
// Grammar
// ============================================================================

#[test]
fn test_dot_and_bracket_mix() {
    assert_eq!(parse_path("state.nested.items[2].prop"), path!("state", "nested", "items", 2, "prop"));
    assert_eq!(parse_path("a[0][1]"), path!("a", 0, 1));
    assert_eq!(parse_path("[0]"), path!(0));
    assert_eq!(parse_path("[1][2].x"), path!(1, 2, "x"));
}

#[test]
fn test_negative_indices() {
    let p = parse_path("list[-1].name");
    assert_eq!(p[1], Seg::Index(-1));
    assert_eq!(p.len(), 3);
}

#[test]
fn test_only_brackets_produce_indices() {
    let dotted = parse_path("a.1.b");
    let bracketed = parse_path("a[1].b");
    assert_eq!(dotted[1], Seg::key("1"));
    assert_eq!(bracketed[1], Seg::index(1));
    assert_ne!(dotted, bracketed);
}

#[test]
fn test_empty_named_segments() {
    assert_eq!(parse_path("a.[0]"), path!("a", "", 0));
    assert_eq!(parse_path("a..b"), path!("a", "", "b"));
}

#[test]
fn test_escaped_specials() {
    assert_eq!(parse_path(r"file\.name.ext"), path!("file.name", "ext"));
    assert_eq!(parse_path(r"open\[bracket.x"), path!("open[bracket", "x"));
    // The `]` closing an escaped `[` belongs to the key.
    assert_eq!(parse_path(r"a\[0]"), path!("a[0]"));
    assert_eq!(parse_path(r"state.a\[0][1].b"), path!("state", "a[0]", 1, "b"));
    // Other backslashes are kept as written.
    assert_eq!(parse_path(r"a\nb"), path!(r"a\nb"));
}

// ============================================================================
// Invalid input
// ============================================================================

#[test]
fn test_invalid_paths_yield_empty_sentinel() {
    for bad in ["a[1.5]", "a[b]", "a[]", "a[", "a[0", "a]b", "a[0]b", "a[-]", "a[0.1]", r"a\[0]]"] {
        assert_eq!(parse_path(bad), Path::root(), "{bad} should be rejected");
    }
}

#[test]
fn test_try_parse_reports_invalid_path() {
    let err = try_parse_path("a[1.5]").unwrap_err();
    assert!(matches!(err, HistoryError::InvalidPath { ref path } if path == "a[1.5]"));
    assert!(err.to_string().contains("Invalid state path"));
}

#[test]
fn test_empty_expression_is_root() {
    assert!(try_parse_path("").unwrap().is_empty());
    assert!(Target::from("").resolve().unwrap().is_empty());
}

// ============================================================================
// Purity and caching
// ============================================================================

#[test]
fn test_reparse_is_identical() {
    for expr in ["a.b[0]", r"x\.y[-2]", "q..r", "[3]"] {
        assert_eq!(parse_path(expr), parse_path(expr));
    }
}

#[test]
fn test_cached_result_is_independent_copy() {
    let mut first = parse_path("cached.copy[1]");
    first.push(Seg::key("extra"));
    assert_eq!(parse_path("cached.copy[1]"), path!("cached", "copy", 1));
}

#[test]
fn test_target_from_segments_skips_parser() {
    let target = Target::from(path!("a.b", "[0]"));
    assert_eq!(target.resolve().unwrap(), path!("a.b", "[0]"));
}
