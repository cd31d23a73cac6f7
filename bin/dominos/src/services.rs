use std::path::Path;

use anyhow::{bail, Context as _};
use dominos_core::{GenericError, Service};

/// Loads service definitions from the given file.
///
/// The format is chosen by file extension: `.json` for JSON, `.yaml` or `.yml` for YAML. Either way, the file must hold
/// a list of services.
///
/// # Errors
///
/// If the file cannot be read, has an unsupported extension, or does not hold a valid list of services, an error is
/// returned.
pub fn load_services(path: &Path) -> Result<Vec<Service>, GenericError> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read service definitions from '{}'.", path.display()))?;

    let services: Vec<Service> = match extension.as_str() {
        "json" => serde_json::from_str(&raw).context("Failed to parse service definitions as JSON.")?,
        "yaml" | "yml" => serde_yaml::from_str(&raw).context("Failed to parse service definitions as YAML.")?,
        _ => bail!(
            "Unsupported service definitions file '{}': expected a .json, .yaml, or .yml extension.",
            path.display()
        ),
    };

    Ok(services)
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use super::*;

    fn write_temp(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(suffix)
            .tempfile()
            .expect("should create temp file");
        file.write_all(contents.as_bytes()).expect("should write temp file");
        file
    }

    #[test]
    fn loads_json() {
        let file = write_temp(
            ".json",
            r#"[
                { "name": "db", "health": 0.9, "depends_on": [], "failure_check_reason": "disk full" },
                { "name": "api", "health": 0.8, "depends_on": ["db"] }
            ]"#,
        );

        let services = load_services(file.path()).expect("should load");
        assert_eq!(services.len(), 2);
        assert_eq!(services[0].reason.as_deref(), Some("disk full"));
        assert_eq!(services[1].depends_on, ["db"]);
    }

    #[test]
    fn loads_yaml() {
        let file = write_temp(
            ".yml",
            "- name: db\n  health: 0.9\n- name: api\n  health: 0.8\n  depends_on: [db]\n  reason: slow queries\n",
        );

        let services = load_services(file.path()).expect("should load");
        assert_eq!(services.len(), 2);
        assert!(services[0].depends_on.is_empty());
        assert_eq!(services[1].reason.as_deref(), Some("slow queries"));
    }

    #[test]
    fn loads_bundled_sample() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("sample/services.json");

        let services = load_services(&path).expect("sample should load");
        assert!(services.iter().any(|service| service.name == "postgres"));
    }

    #[test]
    fn rejects_unknown_extension() {
        let file = write_temp(".toml", "name = 'db'");
        let error = load_services(file.path()).expect_err("should be rejected");
        assert!(error.to_string().contains("Unsupported service definitions file"));
    }

    #[test]
    fn rejects_malformed_input() {
        let file = write_temp(".json", r#"{ "name": "db" }"#);
        assert!(load_services(file.path()).is_err());
    }
}
