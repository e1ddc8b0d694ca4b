use std::path::{Path, PathBuf};
use std::str::FromStr;

use clap::Args;
use finrecord_core::config_file::{self, ConfigFile};
use finrecord_core::{
    Config, DEFAULT_OUTPUT_PATH, DocumentRef, GeneratorConfig, GeneratorKind, SchemaMode,
    validate_documents,
};
use finrecord_pdf_mupdf::MupdfBackend;

/// Flags of the `run` subcommand.
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Document to process as LABEL=PATH (repeatable; replaces the config file list)
    #[arg(long = "doc", value_name = "LABEL=PATH")]
    pub docs: Vec<DocumentRef>,

    /// Output JSON file [default: extracted_financial_data.json]
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Config file to use instead of ./.finrecord.toml
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Inference backend: huggingface or ollama
    #[arg(long)]
    pub backend: Option<GeneratorKind>,

    /// Model name
    #[arg(long)]
    pub model: Option<String>,

    /// Inference endpoint base URL
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Maximum generated length in tokens
    #[arg(long)]
    pub max_length: Option<u32>,

    /// Per-call timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Retries after a transient model failure
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Truncate document text to this many characters before prompting
    #[arg(long)]
    pub max_input_chars: Option<usize>,

    /// Drop text in the top fraction of each page (0.0 disables)
    #[arg(long, value_name = "FRACTION")]
    pub header_exclusion: Option<f32>,

    /// Drop text in the bottom fraction of each page (0.0 disables)
    #[arg(long, value_name = "FRACTION")]
    pub footer_exclusion: Option<f32>,

    /// Accept any valid JSON from the model, even without the expected keys
    #[arg(long)]
    pub lenient: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Dry run: extract text and report prompt sizes without calling the model
    #[arg(long)]
    pub dry_run: bool,
}

/// Everything a run needs, after precedence has been applied.
#[derive(Debug)]
pub struct Settings {
    pub documents: Vec<DocumentRef>,
    pub generator: GeneratorConfig,
    pub config: Config,
    /// Header band as a fraction of page height; `0.0` keeps everything.
    pub header_exclusion: f32,
    /// Footer band as a fraction of page height; `0.0` keeps everything.
    pub footer_exclusion: f32,
}

impl Settings {
    pub fn pdf_backend(&self) -> MupdfBackend {
        MupdfBackend::new()
            .with_header_exclusion(self.header_exclusion)
            .with_footer_exclusion(self.footer_exclusion)
    }
}

/// Load the config file cascade. An explicit `--config` file replaces the
/// CWD file and must exist.
pub fn load_file_config(explicit: Option<&Path>) -> anyhow::Result<ConfigFile> {
    let Some(path) = explicit else {
        return Ok(config_file::load_config());
    };
    let overlay = config_file::try_load_from_path(path)
        .map_err(|e| anyhow::anyhow!("failed to load config {}: {}", path.display(), e))?;
    let platform = config_file::config_path().and_then(|p| config_file::load_from_path(&p));
    Ok(match platform {
        Some(base) => config_file::merge(base, overlay),
        None => overlay,
    })
}

fn env_parse<T: FromStr>(env: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    let raw = env(name)?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(var = name, value = %raw, "ignoring unparseable environment variable");
            None
        }
    }
}

/// Resolve configuration: CLI flags > env vars > config file > defaults.
pub fn resolve(
    args: &RunArgs,
    file: ConfigFile,
    env: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<Settings> {
    let model_cfg = file.model.unwrap_or_default();
    let output_cfg = file.output.unwrap_or_default();
    let pdf_cfg = file.pdf.unwrap_or_default();

    let documents = if !args.docs.is_empty() {
        args.docs.clone()
    } else {
        file.documents.unwrap_or_default()
    };
    if documents.is_empty() {
        anyhow::bail!(
            "No documents to process. Pass --doc LABEL=PATH or add [[documents]] to a config file."
        );
    }
    validate_documents(&documents)?;

    let kind = args
        .backend
        .or_else(|| env_parse(&env, "FINRECORD_BACKEND"))
        .or(model_cfg.backend)
        .unwrap_or_default();

    let generator = GeneratorConfig {
        kind,
        model: args
            .model
            .clone()
            .or_else(|| env("FINRECORD_MODEL"))
            .or(model_cfg.model),
        endpoint: args
            .endpoint
            .clone()
            .or_else(|| env("FINRECORD_ENDPOINT"))
            .or(model_cfg.endpoint),
        api_token: env("HF_TOKEN").or(model_cfg.api_token),
    };

    let defaults = Config::default();
    let config = Config {
        max_length: args
            .max_length
            .or_else(|| env_parse(&env, "FINRECORD_MAX_LENGTH"))
            .or(model_cfg.max_length)
            .unwrap_or(defaults.max_length),
        timeout_secs: args
            .timeout
            .or_else(|| env_parse(&env, "FINRECORD_TIMEOUT"))
            .or(model_cfg.timeout_secs)
            .unwrap_or(defaults.timeout_secs),
        max_retries: args
            .max_retries
            .or(model_cfg.max_retries)
            .unwrap_or(defaults.max_retries),
        max_input_chars: args.max_input_chars.or(model_cfg.max_input_chars),
        schema_mode: if args.lenient || output_cfg.lenient.unwrap_or(false) {
            SchemaMode::Lenient
        } else {
            SchemaMode::Strict
        },
        output_path: args
            .output
            .clone()
            .or(output_cfg.path.map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_PATH)),
    };

    if config.max_length == 0 {
        anyhow::bail!("max_length must be greater than zero");
    }

    let header_exclusion = args
        .header_exclusion
        .or(pdf_cfg.header_exclusion)
        .unwrap_or(0.0);
    let footer_exclusion = args
        .footer_exclusion
        .or(pdf_cfg.footer_exclusion)
        .unwrap_or(0.0);
    for (name, ratio) in [
        ("header_exclusion", header_exclusion),
        ("footer_exclusion", footer_exclusion),
    ] {
        if !(0.0..0.5).contains(&ratio) {
            anyhow::bail!("{} must be in [0.0, 0.5), got {}", name, ratio);
        }
    }

    tracing::debug!(?generator, ?config, documents = documents.len(), "resolved settings");
    Ok(Settings {
        documents,
        generator,
        config,
        header_exclusion,
        footer_exclusion,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use finrecord_core::config_file::{ModelConfig, OutputConfig, PdfConfig};
    use std::collections::HashMap;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    fn one_doc() -> RunArgs {
        RunArgs {
            docs: vec![DocumentRef::new("Eveready", "eveready.pdf")],
            ..Default::default()
        }
    }

    fn file_with_model(model: ModelConfig) -> ConfigFile {
        ConfigFile {
            model: Some(model),
            ..Default::default()
        }
    }

    #[test]
    fn defaults_when_nothing_set() {
        let s = resolve(&one_doc(), ConfigFile::default(), no_env).unwrap();
        assert_eq!(s.generator.kind, GeneratorKind::HuggingFace);
        assert_eq!(s.generator.model, None);
        assert_eq!(s.config.max_length, 512);
        assert_eq!(s.config.timeout_secs, 120);
        assert_eq!(s.config.max_retries, 1);
        assert_eq!(s.config.max_input_chars, None);
        assert_eq!(s.config.schema_mode, SchemaMode::Strict);
        assert_eq!(s.config.output_path, PathBuf::from(DEFAULT_OUTPUT_PATH));
    }

    #[test]
    fn cli_beats_env_beats_file() {
        let file = file_with_model(ModelConfig {
            model: Some("file-model".into()),
            max_length: Some(128),
            timeout_secs: Some(30),
            ..Default::default()
        });
        let env = env_from(&[
            ("FINRECORD_MODEL", "env-model"),
            ("FINRECORD_MAX_LENGTH", "256"),
        ]);
        let args = RunArgs {
            model: Some("cli-model".into()),
            ..one_doc()
        };

        let s = resolve(&args, file, env).unwrap();
        assert_eq!(s.generator.model.as_deref(), Some("cli-model"));
        assert_eq!(s.config.max_length, 256);
        assert_eq!(s.config.timeout_secs, 30);
    }

    #[test]
    fn unparseable_env_falls_through() {
        let file = file_with_model(ModelConfig {
            max_length: Some(128),
            ..Default::default()
        });
        let env = env_from(&[("FINRECORD_MAX_LENGTH", "lots")]);
        let s = resolve(&one_doc(), file, env).unwrap();
        assert_eq!(s.config.max_length, 128);
    }

    #[test]
    fn backend_from_env() {
        let env = env_from(&[("FINRECORD_BACKEND", "ollama")]);
        let s = resolve(&one_doc(), ConfigFile::default(), env).unwrap();
        assert_eq!(s.generator.kind, GeneratorKind::Ollama);
    }

    #[test]
    fn token_from_env_over_file() {
        let file = file_with_model(ModelConfig {
            api_token: Some("file-token".into()),
            ..Default::default()
        });
        let env = env_from(&[("HF_TOKEN", "env-token")]);
        let s = resolve(&one_doc(), file, env).unwrap();
        assert_eq!(s.generator.api_token.as_deref(), Some("env-token"));
    }

    #[test]
    fn cli_documents_replace_file_documents() {
        let file = ConfigFile {
            documents: Some(vec![
                DocumentRef::new("A", "a.pdf"),
                DocumentRef::new("B", "b.pdf"),
            ]),
            ..Default::default()
        };
        let s = resolve(&one_doc(), file.clone(), no_env).unwrap();
        assert_eq!(s.documents, vec![DocumentRef::new("Eveready", "eveready.pdf")]);

        let s = resolve(&RunArgs::default(), file, no_env).unwrap();
        assert_eq!(s.documents.len(), 2);
    }

    #[test]
    fn no_documents_is_an_error() {
        assert!(resolve(&RunArgs::default(), ConfigFile::default(), no_env).is_err());
    }

    #[test]
    fn lenient_from_file_or_flag() {
        let file = ConfigFile {
            output: Some(OutputConfig {
                path: Some("custom.json".into()),
                lenient: Some(true),
            }),
            ..Default::default()
        };
        let s = resolve(&one_doc(), file, no_env).unwrap();
        assert_eq!(s.config.schema_mode, SchemaMode::Lenient);
        assert_eq!(s.config.output_path, PathBuf::from("custom.json"));

        let args = RunArgs {
            lenient: true,
            ..one_doc()
        };
        let s = resolve(&args, ConfigFile::default(), no_env).unwrap();
        assert_eq!(s.config.schema_mode, SchemaMode::Lenient);
    }

    #[test]
    fn pdf_bands_off_by_default() {
        let s = resolve(&one_doc(), ConfigFile::default(), no_env).unwrap();
        assert_eq!(s.header_exclusion, 0.0);
        assert_eq!(s.footer_exclusion, 0.0);
    }

    #[test]
    fn pdf_bands_from_file_and_flags() {
        let file = ConfigFile {
            pdf: Some(PdfConfig {
                header_exclusion: Some(0.04),
                footer_exclusion: Some(0.05),
            }),
            ..Default::default()
        };
        let args = RunArgs {
            footer_exclusion: Some(0.1),
            ..one_doc()
        };
        let s = resolve(&args, file, no_env).unwrap();
        assert_eq!(s.header_exclusion, 0.04);
        assert_eq!(s.footer_exclusion, 0.1);
    }

    #[test]
    fn out_of_range_band_rejected() {
        let args = RunArgs {
            header_exclusion: Some(0.9),
            ..one_doc()
        };
        assert!(resolve(&args, ConfigFile::default(), no_env).is_err());
        let args = RunArgs {
            footer_exclusion: Some(-0.1),
            ..one_doc()
        };
        assert!(resolve(&args, ConfigFile::default(), no_env).is_err());
    }

    #[test]
    fn explicit_config_supplies_documents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("finrecord.toml");
        std::fs::write(
            &path,
            "[model]\nmax_retries = 3\n\n[[documents]]\nlabel = \"Eveready\"\npath = \"q3.pdf\"\n",
        )
        .unwrap();

        let file = load_file_config(Some(&path)).unwrap();
        let s = resolve(&RunArgs::default(), file, no_env).unwrap();
        assert_eq!(s.documents, vec![DocumentRef::new("Eveready", dir.path().join("q3.pdf"))]);
        assert_eq!(s.config.max_retries, 3);
    }

    #[test]
    fn explicit_missing_config_is_error() {
        assert!(load_file_config(Some(Path::new("/nonexistent/finrecord.toml"))).is_err());
    }
}
