use crate::config::BuildConfig;

#[test]
fn test_default_simplifies_quietly() {
    let config = BuildConfig::default();
    assert!(config.simplify);
    assert!(!config.trace_ir);
}

#[test]
fn test_builder_defaults_match_default() {
    assert_eq!(BuildConfig::builder().build(), BuildConfig::default());
}

#[test]
fn test_builder_overrides() {
    let config = BuildConfig::builder().trace_ir(true).simplify(false).build();
    assert!(config.trace_ir);
    assert!(!config.simplify);
}
