use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::generator::GeneratorKind;
use crate::{CoreError, DocumentRef};

/// On-disk TOML configuration structure.
/// All fields are optional so partial configs work (merge with defaults).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub model: Option<ModelConfig>,
    pub output: Option<OutputConfig>,
    pub pdf: Option<PdfConfig>,
    pub documents: Option<Vec<DocumentRef>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelConfig {
    pub backend: Option<GeneratorKind>,
    pub model: Option<String>,
    pub endpoint: Option<String>,
    pub api_token: Option<String>,
    pub max_length: Option<u32>,
    pub timeout_secs: Option<u64>,
    pub max_retries: Option<u32>,
    pub max_input_chars: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    pub path: Option<String>,
    pub lenient: Option<bool>,
}

/// Header/footer bands to drop during extraction, as fractions of page height.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PdfConfig {
    pub header_exclusion: Option<f32>,
    pub footer_exclusion: Option<f32>,
}

/// Name of the per-project config file looked up in the working directory.
pub const LOCAL_CONFIG_NAME: &str = ".finrecord.toml";

/// Platform config directory path: `<config_dir>/finrecord/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("finrecord").join("config.toml"))
}

/// Load config by cascading CWD `.finrecord.toml` over platform config.
/// CWD values override platform values.
pub fn load_config() -> ConfigFile {
    let platform = config_path().and_then(|p| load_from_path(&p));
    let cwd = load_from_path(Path::new(LOCAL_CONFIG_NAME));

    match (platform, cwd) {
        (None, None) => ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(c)) => c,
        (Some(p), Some(c)) => merge(p, c),
    }
}

/// Load a config from a specific path. Returns `None` if the file doesn't
/// exist or can't be parsed.
pub fn load_from_path(path: &Path) -> Option<ConfigFile> {
    match try_load_from_path(path) {
        Ok(config) => Some(config),
        Err(CoreError::Io(_)) => None,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable config file");
            None
        }
    }
}

/// Load a config that the user asked for explicitly; errors are reported.
///
/// Relative document paths are resolved against the config file's directory.
pub fn try_load_from_path(path: &Path) -> Result<ConfigFile, CoreError> {
    let content = std::fs::read_to_string(path)?;
    let mut config: ConfigFile = toml::from_str(&content)
        .map_err(|e| CoreError::Config(format!("{}: {}", path.display(), e)))?;

    if let Some(base) = path.parent()
        && let Some(ref mut docs) = config.documents
    {
        for doc in docs.iter_mut() {
            if doc.path.is_relative() {
                doc.path = base.join(&doc.path);
            }
        }
    }
    Ok(config)
}

/// Merge two configs: `overlay` values take precedence over `base`.
///
/// The document list is replaced as a whole, never concatenated.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    let base_model = base.model.unwrap_or_default();
    let overlay_model = overlay.model.unwrap_or_default();
    let base_output = base.output.unwrap_or_default();
    let overlay_output = overlay.output.unwrap_or_default();
    let base_pdf = base.pdf.unwrap_or_default();
    let overlay_pdf = overlay.pdf.unwrap_or_default();

    ConfigFile {
        model: Some(ModelConfig {
            backend: overlay_model.backend.or(base_model.backend),
            model: overlay_model.model.or(base_model.model),
            endpoint: overlay_model.endpoint.or(base_model.endpoint),
            api_token: overlay_model.api_token.or(base_model.api_token),
            max_length: overlay_model.max_length.or(base_model.max_length),
            timeout_secs: overlay_model.timeout_secs.or(base_model.timeout_secs),
            max_retries: overlay_model.max_retries.or(base_model.max_retries),
            max_input_chars: overlay_model.max_input_chars.or(base_model.max_input_chars),
        }),
        output: Some(OutputConfig {
            path: overlay_output.path.or(base_output.path),
            lenient: overlay_output.lenient.or(base_output.lenient),
        }),
        pdf: Some(PdfConfig {
            header_exclusion: overlay_pdf.header_exclusion.or(base_pdf.header_exclusion),
            footer_exclusion: overlay_pdf.footer_exclusion.or(base_pdf.footer_exclusion),
        }),
        documents: overlay.documents.or(base.documents),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[model]
backend = "ollama"
model = "llama3.2"
max_length = 256

[output]
path = "out/results.json"

[pdf]
footer_exclusion = 0.05

[[documents]]
label = "Eveready"
path = "1_FinancialResults_05022025142214.pdf"

[[documents]]
label = "Amara Raja"
path = "/data/Amaar raja Earnings Summary.pdf"
"#;

    #[test]
    fn parses_sections_and_documents_in_order() {
        let parsed: ConfigFile = toml::from_str(SAMPLE).unwrap();
        let model = parsed.model.unwrap();
        assert_eq!(model.backend, Some(GeneratorKind::Ollama));
        assert_eq!(model.max_length, Some(256));
        let pdf = parsed.pdf.unwrap();
        assert_eq!(pdf.header_exclusion, None);
        assert_eq!(pdf.footer_exclusion, Some(0.05));
        let docs = parsed.documents.unwrap();
        let labels: Vec<_> = docs.iter().map(|d| d.label.as_str()).collect();
        assert_eq!(labels, vec!["Eveready", "Amara Raja"]);
    }

    #[test]
    fn relative_document_paths_resolved_against_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("finrecord.toml");
        std::fs::write(&path, SAMPLE).unwrap();

        let config = try_load_from_path(&path).unwrap();
        let docs = config.documents.unwrap();
        assert_eq!(
            docs[0].path,
            dir.path().join("1_FinancialResults_05022025142214.pdf")
        );
        assert_eq!(
            docs[1].path,
            PathBuf::from("/data/Amaar raja Earnings Summary.pdf")
        );
    }

    #[test]
    fn invalid_toml_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[model\nbackend = ").unwrap();
        assert!(matches!(
            try_load_from_path(&path),
            Err(CoreError::Config(_))
        ));
        assert!(load_from_path(&path).is_none());
    }

    #[test]
    fn unknown_backend_rejected() {
        let result: Result<ConfigFile, _> = toml::from_str("[model]\nbackend = \"gpt\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn missing_file_loads_as_none() {
        assert!(load_from_path(Path::new("/nonexistent/finrecord.toml")).is_none());
    }

    #[test]
    fn merge_overlay_wins() {
        let base = ConfigFile {
            model: Some(ModelConfig {
                model: Some("google/flan-t5-base".into()),
                max_length: Some(512),
                ..Default::default()
            }),
            ..Default::default()
        };
        let overlay = ConfigFile {
            model: Some(ModelConfig {
                model: Some("google/flan-t5-large".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let merged = merge(base, overlay).model.unwrap();
        assert_eq!(merged.model.as_deref(), Some("google/flan-t5-large"));
        assert_eq!(merged.max_length, Some(512));
    }

    #[test]
    fn merge_replaces_document_list() {
        let base = ConfigFile {
            documents: Some(vec![
                DocumentRef::new("A", "a.pdf"),
                DocumentRef::new("B", "b.pdf"),
            ]),
            ..Default::default()
        };
        let overlay = ConfigFile {
            documents: Some(vec![DocumentRef::new("C", "c.pdf")]),
            ..Default::default()
        };
        let docs = merge(base, overlay).documents.unwrap();
        assert_eq!(docs, vec![DocumentRef::new("C", "c.pdf")]);
    }

    #[test]
    fn merge_pdf_bands_field_by_field() {
        let base = ConfigFile {
            pdf: Some(PdfConfig {
                header_exclusion: Some(0.04),
                footer_exclusion: Some(0.05),
            }),
            ..Default::default()
        };
        let overlay = ConfigFile {
            pdf: Some(PdfConfig {
                footer_exclusion: Some(0.0),
                ..Default::default()
            }),
            ..Default::default()
        };
        let pdf = merge(base, overlay).pdf.unwrap();
        assert_eq!(pdf.header_exclusion, Some(0.04));
        assert_eq!(pdf.footer_exclusion, Some(0.0));
    }

    #[test]
    fn merge_base_preserved_when_overlay_absent() {
        let base = ConfigFile {
            output: Some(OutputConfig {
                path: Some("/base/out.json".into()),
                lenient: Some(true),
            }),
            ..Default::default()
        };
        let merged = merge(base, ConfigFile::default());
        let output = merged.output.unwrap();
        assert_eq!(output.path.as_deref(), Some("/base/out.json"));
        assert_eq!(output.lenient, Some(true));
    }
}
