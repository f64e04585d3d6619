//! ggml Whisper model catalog.
//!
//! Both local backends run whisper.cpp-format models, so one catalog
//! serves the subprocess command and the in-process model alike.

const HF_BASE: &str = "https://huggingface.co/ggerganov/whisper.cpp/resolve/main";

/// Metadata for a downloadable model file.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInfo {
    /// Model identifier (e.g., "tiny.en", "base", "large-v3-turbo")
    pub name: &'static str,
    /// Approximate file size in megabytes
    pub size_mb: u32,
    /// SHA-1 of the ggml file as published by whisper.cpp
    pub sha1: &'static str,
    /// Whether this model supports English only
    pub english_only: bool,
}

impl ModelInfo {
    /// File name on disk and on HuggingFace.
    pub fn file_name(&self) -> String {
        format!("ggml-{}.bin", self.name)
    }

    pub fn url(&self) -> String {
        format!("{HF_BASE}/{}", self.file_name())
    }
}

pub const MODELS: &[ModelInfo] = &[
    ModelInfo {
        name: "tiny.en",
        size_mb: 75,
        sha1: "c78c86eb1a8faa21b369bcd33207cc90d64ae9df",
        english_only: true,
    },
    ModelInfo {
        name: "tiny",
        size_mb: 75,
        sha1: "bd577a113a864445d4c299885e0cb97d4ba92b5f",
        english_only: false,
    },
    ModelInfo {
        name: "base.en",
        size_mb: 142,
        sha1: "137c40403d78fd54d454da0f9bd998f78703390c",
        english_only: true,
    },
    ModelInfo {
        name: "base",
        size_mb: 142,
        sha1: "465707469ff3a37a2b9b8d8f89f2f99de7299dac",
        english_only: false,
    },
    ModelInfo {
        name: "small.en",
        size_mb: 466,
        sha1: "db8a495a91d927739e50b3fc1cc4c6b8f6c2d022",
        english_only: true,
    },
    ModelInfo {
        name: "small",
        size_mb: 466,
        sha1: "55356645c2b361a969dfd0ef2c5a50d530afd8d5",
        english_only: false,
    },
    ModelInfo {
        name: "medium.en",
        size_mb: 1533,
        sha1: "8c30f0e44ce9560643ebd10bbe50cd20eafd3723",
        english_only: true,
    },
    ModelInfo {
        name: "medium",
        size_mb: 1533,
        sha1: "fd9727b6e1217c2f614f9b698455c4ffd82463b4",
        english_only: false,
    },
    ModelInfo {
        name: "large-v3",
        size_mb: 3095,
        sha1: "ad82bf6a9043ceed055076d0fd39f5f186ff8062",
        english_only: false,
    },
    ModelInfo {
        name: "large-v3-turbo",
        size_mb: 1624,
        sha1: "4af2b29d7ec73d781377bfd1758ca957a807e941",
        english_only: false,
    },
];

/// Short names accepted in config and on the command line.
const ALIASES: &[(&str, &str)] = &[("large", "large-v3-turbo"), ("turbo", "large-v3-turbo")];

/// Resolve an alias to its catalog name; unknown names pass through unchanged.
pub fn resolve_name(name: &str) -> &str {
    ALIASES
        .iter()
        .find(|(alias, _)| *alias == name)
        .map_or(name, |(_, target)| *target)
}

/// Find a model by name or alias.
pub fn get_model(name: &str) -> Option<&'static ModelInfo> {
    let name = resolve_name(name);
    MODELS.iter().find(|m| m.name == name)
}

pub fn list_models() -> &'static [ModelInfo] {
    MODELS
}

/// The default model (`base.en`), a good balance of speed and accuracy for English.
pub fn default_model() -> &'static ModelInfo {
    get_model(crate::defaults::DEFAULT_MODEL).unwrap_or(&MODELS[2])
}
