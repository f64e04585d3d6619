//! Builds the backend chain from configuration.

use crate::audio::normalize::SignalNormalizer;
use crate::config::Config;
use crate::defaults;
use crate::error::{ParlanceError, Result};
use crate::models::download::resolve_model_path;
use crate::pipeline::orchestrator::FallbackOrchestrator;
use crate::stt::assembler::TranscriptAssembler;
use crate::stt::backend::TranscriptionBackend;
use crate::stt::in_process::InProcessModelBackend;
use crate::stt::remote::{RemoteApiBackend, RemoteApiConfig};
use crate::stt::subprocess::{SubprocessModelBackend, SubprocessModelConfig};
use crate::stt::whisper::{WhisperConfig, WhisperModelLoader};
use std::sync::Arc;

/// Create an orchestrator with one backend per id in `pipeline.backends`.
///
/// Backends are constructed eagerly but never contacted here; a backend that
/// cannot work (no API key, missing model) reports itself unavailable when tried.
pub fn build_orchestrator(config: &Config) -> Result<FallbackOrchestrator> {
    config.validate()?;

    let assembler = TranscriptAssembler::new(config.audio.seconds_per_word);
    let normalizer = SignalNormalizer::new(config.audio.sample_rate, config.audio.channels)?;

    let backends = config
        .pipeline
        .backends
        .iter()
        .map(|id| build_backend(id, config, assembler))
        .collect::<Result<Vec<_>>>()?;

    tracing::debug!(
        backends = ?config.pipeline.backends,
        max_bytes = config.audio.max_upload_bytes,
        "Backend chain configured"
    );

    Ok(FallbackOrchestrator::new(backends, normalizer)
        .with_max_bytes(config.audio.max_upload_bytes)
        .with_grace(config.pipeline.grace()))
}

fn build_backend(
    id: &str,
    config: &Config,
    assembler: TranscriptAssembler,
) -> Result<Arc<dyn TranscriptionBackend>> {
    match id {
        "remote" => {
            let remote = &config.remote;
            let backend = RemoteApiBackend::new(RemoteApiConfig {
                endpoint: remote.endpoint.clone(),
                api_key: remote.api_key.clone(),
                model: remote.model.clone(),
                language: remote
                    .language
                    .clone()
                    .filter(|l| !l.is_empty() && l != defaults::AUTO_LANGUAGE),
                timeout: remote.timeout(),
            })?
            .with_id(id)
            .with_assembler(assembler);
            Ok(Arc::new(backend))
        }
        "subprocess" => {
            let sub = &config.subprocess;
            let model = (!sub.model.is_empty()).then(|| resolve_model_path(&sub.model));
            let backend = SubprocessModelBackend::new(SubprocessModelConfig {
                command: sub.command.clone(),
                args: sub.args.clone(),
                model,
                language: sub.language.clone(),
                timeout: sub.timeout(),
            })
            .with_id(id)
            .with_assembler(assembler);
            Ok(Arc::new(backend))
        }
        "in-process" => {
            let local = &config.in_process;
            let loader = WhisperModelLoader::new(WhisperConfig {
                model: local.model.clone(),
                language: local.language.clone(),
                threads: local.threads,
                auto_download: local.auto_download,
            });
            let backend = InProcessModelBackend::new(Arc::new(loader))
                .with_id(id)
                .with_timeout(local.timeout())
                .with_assembler(assembler);
            Ok(Arc::new(backend))
        }
        other => Err(ParlanceError::ConfigInvalidValue {
            key: "pipeline.backends".to_string(),
            message: format!("unknown backend '{other}'"),
        }),
    }
}
