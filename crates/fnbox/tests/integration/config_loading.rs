use std::io::Write;

use fnbox::config::Config;
use fnbox::types::RuntimeMode;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_example_config() {
    let file = write_config(fnbox::EXAMPLE_CONFIG);
    let config = Config::from_file(file.path()).expect("Failed to load config");

    assert!(config.languages.contains_key("python"));
    assert!(config.languages.contains_key("javascript"));
    assert!(config.functions.contains_key("hello"));
    assert_eq!(config.runtimes.sandboxed, "runsc");
}

#[test]
fn test_load_minimal_config() {
    let file = write_config(
        r#"
        [languages.sh]
        name = "POSIX shell"
        extension = "sh"
        image = "alpine:3"
        run = ["sh", "{source}"]
        inline = ["sh", "-c", "{code}"]
        "#,
    );
    let config = Config::from_file(file.path()).expect("Failed to load config");

    assert_eq!(config.languages.len(), 1);
    assert!(config.profile(RuntimeMode::ColdStandard, "sh").is_ok());
    assert!(config.profile(RuntimeMode::Warm, "sh").is_err());
}

#[test]
fn test_load_invalid_missing_placeholder() {
    let file = write_config(
        r#"
        [languages.sh]
        name = "POSIX shell"
        extension = "sh"
        image = "alpine:3"
        run = ["sh", "main.sh"]
        inline = ["sh", "-c", "{code}"]
        "#,
    );
    assert!(Config::from_file(file.path()).is_err());
}

#[test]
fn test_load_invalid_function_language() {
    let file = write_config(
        r#"
        [functions.orphan]
        language = "cobol"
        "#,
    );
    assert!(Config::from_file(file.path()).is_err());
}

#[test]
fn test_load_nonexistent_file() {
    assert!(Config::from_file("/nonexistent/fnbox.toml").is_err());
}
