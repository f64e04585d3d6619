//! Local model inference through an external command (whisper.cpp by default).

use crate::audio::wav::write_pcm_wav;
use crate::defaults;
use crate::error::{ParlanceError, Result};
use crate::process::runner::{CommandSpec, ProcessOutput, SubprocessRunner};
use crate::process::workspace::TempWorkspace;
use crate::stt::assembler::TranscriptAssembler;
use crate::stt::backend::{BackendInput, BackendKind, InputFormat, TranscriptionBackend};
use crate::stt::transcript::Transcript;
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// whisper.cpp `whisper-cli` arguments: JSON output written next to `{output_dir}/out`.
pub const DEFAULT_ARGS: &[&str] = &[
    "-m",
    "{model}",
    "-f",
    "{input}",
    "-l",
    "{language}",
    "-oj",
    "-of",
    "{output_dir}/out",
    "-np",
];

/// File the default arguments make whisper.cpp write.
const OUTPUT_FILE: &str = "out.json";

#[derive(Debug, Clone, PartialEq)]
pub struct SubprocessModelConfig {
    pub command: String,
    /// Arguments with `{input}`, `{output_dir}`, `{model}` and `{language}` placeholders.
    pub args: Vec<String>,
    pub model: Option<PathBuf>,
    pub language: String,
    pub timeout: Duration,
}

impl Default for SubprocessModelConfig {
    fn default() -> Self {
        Self {
            command: defaults::SUBPROCESS_COMMAND.to_string(),
            args: DEFAULT_ARGS.iter().map(|a| a.to_string()).collect(),
            model: None,
            language: defaults::DEFAULT_LANGUAGE.to_string(),
            timeout: defaults::SUBPROCESS_TIMEOUT,
        }
    }
}

pub struct SubprocessModelBackend {
    id: String,
    config: SubprocessModelConfig,
    runner: SubprocessRunner,
    assembler: TranscriptAssembler,
}

impl SubprocessModelBackend {
    pub fn new(config: SubprocessModelConfig) -> Self {
        Self {
            id: "subprocess".to_string(),
            config,
            runner: SubprocessRunner::new(),
            assembler: TranscriptAssembler::default(),
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = id.to_string();
        self
    }

    pub fn with_assembler(mut self, assembler: TranscriptAssembler) -> Self {
        self.assembler = assembler;
        self
    }

    pub fn config(&self) -> &SubprocessModelConfig {
        &self.config
    }

    fn needs_model(&self) -> bool {
        self.config.args.iter().any(|a| a.contains("{model}"))
    }

    fn check_model(&self) -> Result<Option<&Path>> {
        if !self.needs_model() {
            return Ok(self.config.model.as_deref());
        }
        match self.config.model.as_deref() {
            Some(path) if path.is_file() => Ok(Some(path)),
            Some(path) => Err(ParlanceError::unavailable(
                &self.id,
                format!("model file not found: {}", path.display()),
            )),
            None => Err(ParlanceError::unavailable(&self.id, "no model configured")),
        }
    }

    fn command_for(&self, input: &Path, output_dir: &Path, model: Option<&Path>) -> CommandSpec {
        let input = input.display().to_string();
        let output_dir = output_dir.display().to_string();
        let model = model.map(|m| m.display().to_string()).unwrap_or_default();

        let args = self.config.args.iter().map(|arg| {
            arg.replace("{input}", &input)
                .replace("{output_dir}", &output_dir)
                .replace("{model}", &model)
                .replace("{language}", &self.config.language)
        });
        CommandSpec::new(&self.config.command).args(args)
    }

    fn parse_output(&self, workspace: &TempWorkspace, output: ProcessOutput) -> Result<Value> {
        let output = output.into_success()?;

        if let Some(value) = parse_json_output(&output.stdout_text()) {
            return Ok(value);
        }

        let file = workspace.file(OUTPUT_FILE);
        if file.is_file() {
            let contents = std::fs::read_to_string(&file)?;
            return serde_json::from_str(&contents).map_err(|e| {
                ParlanceError::bad_output(&self.id, format!("invalid JSON in {OUTPUT_FILE}: {e}"))
            });
        }

        let stdout = output.stdout_text();
        Err(ParlanceError::bad_output(
            &self.id,
            format!(
                "no JSON on stdout or in {OUTPUT_FILE} (stdout: {:?})",
                stdout.chars().take(200).collect::<String>()
            ),
        ))
    }

    /// Re-attribute runner errors to this backend.
    fn classify(&self, err: ParlanceError) -> ParlanceError {
        match err {
            ParlanceError::Timeout { elapsed_ms, stderr, .. } => ParlanceError::Timeout {
                backend: self.id.clone(),
                elapsed_ms,
                stderr,
            },
            e @ (ParlanceError::ToolNotFound { .. } | ParlanceError::Spawn { .. }) => {
                ParlanceError::unavailable(&self.id, e.to_string())
            }
            e @ ParlanceError::ProcessFailed { .. } => {
                ParlanceError::bad_output(&self.id, e.to_string())
            }
            ParlanceError::Io(e) => ParlanceError::unavailable(&self.id, format!("workspace: {e}")),
            other => other,
        }
    }
}

/// JSON from stdout: the whole output, else the last line that parses.
pub fn parse_json_output(stdout: &str) -> Option<Value> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(value) = serde_json::from_str::<Value>(trimmed)
        && (value.is_object() || value.is_array())
    {
        return Some(value);
    }
    trimmed
        .lines()
        .rev()
        .filter_map(|line| serde_json::from_str::<Value>(line.trim()).ok())
        .find(|value| value.is_object())
}

#[async_trait]
impl TranscriptionBackend for SubprocessModelBackend {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> BackendKind {
        BackendKind::LocalSubprocess
    }

    fn input_format(&self) -> InputFormat {
        InputFormat::Pcm
    }

    fn timeout(&self) -> Duration {
        self.config.timeout
    }

    async fn transcribe(&self, input: BackendInput) -> Result<Transcript> {
        let model = self.check_model()?.map(Path::to_path_buf);

        let raw = self
            .runner
            .run_scoped(
                "parlance-stt-",
                self.config.timeout,
                |workspace| {
                    let input_path = match &input {
                        BackendInput::Pcm(pcm) => {
                            let path = workspace.file("input.wav");
                            write_pcm_wav(&path, pcm)?;
                            path
                        }
                        BackendInput::Raw(asset) => asset.write_to(workspace.path())?,
                    };
                    Ok(self
                        .command_for(&input_path, workspace.path(), model.as_deref())
                        .working_dir(workspace.path()))
                },
                |workspace, output| self.parse_output(workspace, output),
            )
            .await
            .map_err(|e| self.classify(e))?;

        let transcript = self
            .assembler
            .assemble(&raw, BackendKind::LocalSubprocess)
            .map_err(|e| match e {
                ParlanceError::BadOutput { message, .. } => {
                    ParlanceError::bad_output(&self.id, message)
                }
                other => other,
            })?;

        tracing::info!(
            backend = %self.id,
            chars = transcript.text.len(),
            segments = transcript.segments.len(),
            "Subprocess transcription completed"
        );
        Ok(transcript)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::normalize::PcmBuffer;
    use std::sync::Arc;

    fn pcm_input() -> BackendInput {
        BackendInput::Pcm(Arc::new(PcmBuffer::new(vec![0.0; 1600], 16000)))
    }

    fn script_backend(script: &str, timeout: Duration) -> SubprocessModelBackend {
        SubprocessModelBackend::new(SubprocessModelConfig {
            command: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            model: None,
            language: "en".to_string(),
            timeout,
        })
    }

    #[test]
    fn parse_json_output_whole_blob() {
        let value = parse_json_output("{\n  \"text\": \"hi\"\n}\n").unwrap();
        assert_eq!(value["text"], "hi");
    }

    #[test]
    fn parse_json_output_last_line() {
        let stdout = "loading model\n{\"progress\": 50}\n{\"text\": \"done\"}\n";
        let value = parse_json_output(stdout).unwrap();
        assert_eq!(value["text"], "done");
    }

    #[test]
    fn parse_json_output_none_for_plain_text() {
        assert!(parse_json_output("just words\n").is_none());
        assert!(parse_json_output("").is_none());
    }

    #[test]
    fn placeholders_are_expanded() {
        let backend = SubprocessModelBackend::new(SubprocessModelConfig::default());
        let spec = backend.command_for(
            Path::new("/tmp/ws/input.wav"),
            Path::new("/tmp/ws"),
            Some(Path::new("/models/ggml-base.en.bin")),
        );
        assert_eq!(spec.program, "whisper-cli");
        assert_eq!(
            spec.args,
            vec![
                "-m",
                "/models/ggml-base.en.bin",
                "-f",
                "/tmp/ws/input.wav",
                "-l",
                "en",
                "-oj",
                "-of",
                "/tmp/ws/out",
                "-np"
            ]
        );
    }

    #[tokio::test]
    async fn missing_model_is_unavailable() {
        let backend = SubprocessModelBackend::new(SubprocessModelConfig {
            model: Some(PathBuf::from("/nonexistent/ggml-model.bin")),
            ..SubprocessModelConfig::default()
        });
        let err = backend.transcribe(pcm_input()).await.unwrap_err();
        assert!(matches!(err, ParlanceError::Unavailable { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn missing_executable_is_unavailable() {
        let backend = SubprocessModelBackend::new(SubprocessModelConfig {
            command: "parlance-no-such-whisper".to_string(),
            args: vec!["{input}".to_string()],
            ..SubprocessModelConfig::default()
        });
        let err = backend.transcribe(pcm_input()).await.unwrap_err();
        match err {
            ParlanceError::Unavailable { backend, message } => {
                assert_eq!(backend, "subprocess");
                assert!(message.contains("parlance-no-such-whisper"));
            }
            other => panic!("Expected Unavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn json_on_stdout_is_assembled() {
        let backend = script_backend(
            r#"test -s input.wav && echo '{"text": "from stdout", "segments": [{"text": "from stdout", "start": 0.0}]}'"#,
            Duration::from_secs(5),
        );
        let transcript = backend.transcribe(pcm_input()).await.unwrap();
        assert_eq!(transcript.text, "from stdout");
        assert_eq!(transcript.segments[0].end, 1.0);
    }

    #[tokio::test]
    async fn falls_back_to_output_file() {
        let backend = script_backend(
            r#"echo 'whisper_init: loading'; printf '{"transcription":[{"text":" Hi","offsets":{"from":0,"to":800}}]}' > out.json"#,
            Duration::from_secs(5),
        );
        let transcript = backend.transcribe(pcm_input()).await.unwrap();
        assert_eq!(transcript.text, "Hi");
        assert_eq!(transcript.segments[0].end, 0.8);
    }

    #[tokio::test]
    async fn non_zero_exit_is_bad_output_with_stderr() {
        let backend = script_backend("echo 'model corrupt' >&2; exit 2", Duration::from_secs(5));
        match backend.transcribe(pcm_input()).await.unwrap_err() {
            ParlanceError::BadOutput { backend, message } => {
                assert_eq!(backend, "subprocess");
                assert!(message.contains("model corrupt"), "{message}");
            }
            other => panic!("Expected BadOutput, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unparsable_output_is_bad_output() {
        let backend = script_backend("echo 'not json at all'", Duration::from_secs(5));
        let err = backend.transcribe(pcm_input()).await.unwrap_err();
        assert!(matches!(err, ParlanceError::BadOutput { .. }));
    }

    #[tokio::test]
    async fn slow_command_times_out() {
        let backend = script_backend("exec sleep 30", Duration::from_millis(200));
        match backend.transcribe(pcm_input()).await.unwrap_err() {
            ParlanceError::Timeout { backend, .. } => assert_eq!(backend, "subprocess"),
            other => panic!("Expected Timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn timeout_keeps_stderr_written_before_the_kill() {
        let backend = script_backend(
            "echo 'CUDA out of memory' >&2; exec sleep 30",
            Duration::from_millis(500),
        );
        let err = backend.transcribe(pcm_input()).await.unwrap_err();
        assert!(err.to_string().contains("CUDA out of memory"), "{err}");
        match err {
            ParlanceError::Timeout { backend, stderr, .. } => {
                assert_eq!(backend, "subprocess");
                assert_eq!(stderr, "CUDA out of memory");
            }
            other => panic!("Expected Timeout, got {other:?}"),
        }
    }
}
