// src/encode/strategy.rs

//! Pluggable inline argument strategies.
//!
//! In inline mode the encoder asks each configured [`InlineStrategy`] in
//! turn whether it recognises the payload. The first match decides the
//! extra argv tokens; when nothing matches the payload is passed as a single
//! JSON token.
//!
//! [`ReservedKeyStrategy`] implements the one calling convention currently
//! in use: a marker key turns the payload into a positional identifier plus
//! fixed flags, and an optional rerun key wipes the identifier's working
//! directories through a [`WorkdirCleanupHook`] before launch.
//!
//! Token building is pure. Side effects live in
//! [`InlineStrategy::before_launch`], which only the run path awaits.

use std::fmt::Debug;
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;
use std::sync::Arc;

use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::errors::{DispatchError, Result};
use crate::types::{ArgumentPayload, JobId};

pub type HookFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// Turns an inline argument payload into argv tokens.
pub trait InlineStrategy: Send + Sync + Debug {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Whether this strategy handles `args`.
    fn matches(&self, args: &ArgumentPayload) -> bool;

    /// Tokens to append to the command vector. Must not touch anything
    /// outside the returned vector.
    fn encode(&self, args: &ArgumentPayload, job_id: &JobId) -> Result<Vec<String>>;

    /// Work that has to happen right before the process starts. Dry runs
    /// never call this.
    fn before_launch<'a>(&'a self, _args: &'a ArgumentPayload, _job_id: &'a JobId) -> HookFuture<'a> {
        Box::pin(async { Ok(()) })
    }
}

/// Default inline behaviour: the whole payload as one JSON token.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonInline;

impl InlineStrategy for JsonInline {
    fn name(&self) -> &str {
        "json"
    }

    fn matches(&self, _args: &ArgumentPayload) -> bool {
        true
    }

    fn encode(&self, args: &ArgumentPayload, _job_id: &JobId) -> Result<Vec<String>> {
        Ok(vec![serde_json::to_string(args)?])
    }
}

/// Out-of-band cleanup of the working directories tied to an identifier.
pub trait WorkdirCleanupHook: Send + Sync + Debug {
    fn clean<'a>(&'a self, identifier: &'a str) -> HookFuture<'a>;
}

/// Marker-key calling convention: `<id> <flag> [conditional flags...]`.
#[derive(Debug, Clone)]
pub struct ReservedKeyStrategy {
    pub marker_key: String,
    pub id_key: String,
    pub flag: String,
    /// `(key, flag)` pairs; each flag is appended when its key is present.
    pub conditional_flags: Vec<(String, String)>,
    pub rerun_key: Option<String>,
    pub(crate) hook: Option<Arc<dyn WorkdirCleanupHook>>,
}

impl Default for ReservedKeyStrategy {
    fn default() -> Self {
        Self {
            marker_key: "jira".to_string(),
            id_key: "analysis_id".to_string(),
            flag: "--saltant".to_string(),
            conditional_flags: vec![
                ("update".to_string(), "--update".to_string()),
                ("skip_missing".to_string(), "--skip_missing".to_string()),
            ],
            rerun_key: Some("rerun".to_string()),
            hook: None,
        }
    }
}

impl ReservedKeyStrategy {
    pub fn with_hook(mut self, hook: Arc<dyn WorkdirCleanupHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    pub fn has_hook(&self) -> bool {
        self.hook.is_some()
    }

    /// The positional identifier. Strings are used verbatim; any other JSON
    /// value is rendered as JSON text (`12`, `true`, `null`).
    fn identifier(&self, args: &ArgumentPayload) -> Result<String> {
        match args.get(&self.id_key) {
            Some(Value::String(s)) => Ok(s.clone()),
            Some(other) => Ok(other.to_string()),
            None => Err(DispatchError::InvalidArguments(format!(
                "'{}' is set but required key '{}' is missing",
                self.marker_key, self.id_key
            ))),
        }
    }

    fn is_rerun(&self, args: &ArgumentPayload) -> bool {
        self.rerun_key
            .as_ref()
            .is_some_and(|key| args.contains_key(key))
    }
}

impl InlineStrategy for ReservedKeyStrategy {
    fn name(&self) -> &str {
        "reserved_keys"
    }

    fn matches(&self, args: &ArgumentPayload) -> bool {
        args.contains_key(&self.marker_key)
    }

    fn encode(&self, args: &ArgumentPayload, _job_id: &JobId) -> Result<Vec<String>> {
        let mut tokens = vec![self.identifier(args)?, self.flag.clone()];
        for (key, flag) in &self.conditional_flags {
            if args.contains_key(key) {
                tokens.push(flag.clone());
            }
        }
        Ok(tokens)
    }

    fn before_launch<'a>(&'a self, args: &'a ArgumentPayload, job_id: &'a JobId) -> HookFuture<'a> {
        Box::pin(async move {
            if !self.is_rerun(args) {
                return Ok(());
            }

            let identifier = self.identifier(args)?;
            match &self.hook {
                Some(hook) => {
                    info!(job_id = %job_id, identifier = %identifier, "rerun requested; cleaning working directories");
                    hook.clean(&identifier).await
                }
                None => {
                    warn!(
                        job_id = %job_id,
                        identifier = %identifier,
                        "rerun requested but no cleanup hook configured; stale working directories are left in place"
                    );
                    Ok(())
                }
            }
        })
    }
}

/// Removes `{root}/{dir}/{prefix}{identifier}` for each configured `dir`.
///
/// With `privileged_command` set (e.g. `["sudo", "rm", "-rf"]`) each target
/// is removed by running that command with the target appended; otherwise
/// it is removed in-process. Targets that do not exist are skipped.
#[derive(Debug, Clone)]
pub struct RemoveWorkdirs {
    pub root: PathBuf,
    pub dirs: Vec<PathBuf>,
    pub prefix: String,
    pub privileged_command: Vec<String>,
}

impl RemoveWorkdirs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            dirs: vec![
                PathBuf::from("singlecelllogs/pipeline"),
                PathBuf::from("singlecelltemp/temp"),
            ],
            prefix: "analysis_".to_string(),
            privileged_command: Vec::new(),
        }
    }

    pub fn targets(&self, identifier: &str) -> Result<Vec<PathBuf>> {
        if identifier.is_empty()
            || identifier == "."
            || identifier == ".."
            || identifier.contains('/')
            || identifier.contains('\\')
        {
            return Err(DispatchError::WorkdirCleanupError(format!(
                "refusing to clean directories for identifier {identifier:?}"
            )));
        }

        let leaf = format!("{}{}", self.prefix, identifier);
        Ok(self
            .dirs
            .iter()
            .map(|dir| self.root.join(dir).join(&leaf))
            .collect())
    }

    async fn remove_privileged(&self, target: &Path) -> Result<()> {
        let (program, rest) = self
            .privileged_command
            .split_first()
            .ok_or_else(|| DispatchError::WorkdirCleanupError("empty privileged command".to_string()))?;

        let status = Command::new(program)
            .args(rest)
            .arg(target)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|e| {
                DispatchError::WorkdirCleanupError(format!("running {program} for {target:?}: {e}"))
            })?;

        if !status.success() {
            return Err(DispatchError::WorkdirCleanupError(format!(
                "{program} exited with {status} while removing {target:?}"
            )));
        }
        Ok(())
    }

    async fn remove_in_process(&self, target: &Path) -> Result<()> {
        match tokio::fs::remove_dir_all(target).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %target.display(), "working directory already absent");
                Ok(())
            }
            Err(e) => Err(DispatchError::WorkdirCleanupError(format!(
                "removing {target:?}: {e}"
            ))),
        }
    }
}

impl WorkdirCleanupHook for RemoveWorkdirs {
    fn clean<'a>(&'a self, identifier: &'a str) -> HookFuture<'a> {
        Box::pin(async move {
            for target in self.targets(identifier)? {
                debug!(path = %target.display(), "removing working directory");
                if self.privileged_command.is_empty() {
                    self.remove_in_process(&target).await?;
                } else {
                    self.remove_privileged(&target).await?;
                }
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    fn payload(value: Value) -> ArgumentPayload {
        match value {
            Value::Object(map) => map,
            _ => panic!("payload must be an object"),
        }
    }

    fn job() -> JobId {
        JobId::new("job-7").unwrap()
    }

    #[derive(Debug, Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
    }

    impl WorkdirCleanupHook for Recorder {
        fn clean<'a>(&'a self, identifier: &'a str) -> HookFuture<'a> {
            self.calls.lock().unwrap().push(identifier.to_string());
            Box::pin(async { Ok(()) })
        }
    }

    #[test]
    fn json_inline_is_a_single_token() {
        let args = payload(json!({"a": [1, 2], "b": {"c": null}}));
        let tokens = JsonInline.encode(&args, &job()).unwrap();
        assert_eq!(tokens.len(), 1);
        let decoded: ArgumentPayload = serde_json::from_str(&tokens[0]).unwrap();
        assert_eq!(decoded, args);
    }

    #[test]
    fn reserved_keys_build_positional_and_flags_in_order() {
        let strategy = ReservedKeyStrategy::default();
        let args = payload(json!({
            "jira": "SC-1",
            "analysis_id": 42,
            "skip_missing": true,
            "update": false,
        }));

        assert!(strategy.matches(&args));
        let tokens = strategy.encode(&args, &job()).unwrap();
        assert_eq!(tokens, vec!["42", "--saltant", "--update", "--skip_missing"]);
    }

    #[test]
    fn reserved_keys_use_string_ids_verbatim() {
        let strategy = ReservedKeyStrategy::default();
        let args = payload(json!({"jira": "SC-1", "analysis_id": "abc"}));
        assert_eq!(strategy.encode(&args, &job()).unwrap(), vec!["abc", "--saltant"]);
    }

    #[test]
    fn non_string_ids_render_as_json_text() {
        let strategy = ReservedKeyStrategy::default();
        for (id, expected) in [(json!(true), "true"), (json!(null), "null"), (json!(1.5), "1.5")] {
            let args = payload(json!({"jira": "SC-1", "analysis_id": id}));
            assert_eq!(strategy.encode(&args, &job()).unwrap()[0], expected);
        }
    }

    #[test]
    fn reserved_keys_require_the_identifier() {
        let strategy = ReservedKeyStrategy::default();
        let args = payload(json!({"jira": "SC-1"}));
        assert!(matches!(
            strategy.encode(&args, &job()).unwrap_err(),
            DispatchError::InvalidArguments(_)
        ));
    }

    #[test]
    fn encoding_a_rerun_has_no_side_effects() {
        let recorder = Arc::new(Recorder::default());
        let strategy = ReservedKeyStrategy::default().with_hook(recorder.clone());

        let args = payload(json!({"jira": "SC-1", "analysis_id": 9, "rerun": true}));
        assert_eq!(strategy.encode(&args, &job()).unwrap(), vec!["9", "--saltant"]);
        assert!(recorder.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn rerun_triggers_the_hook_before_launch() {
        let recorder = Arc::new(Recorder::default());
        let strategy = ReservedKeyStrategy::default().with_hook(recorder.clone());

        let args = payload(json!({"jira": "SC-1", "analysis_id": 9, "rerun": true}));
        strategy.before_launch(&args, &job()).await.unwrap();
        assert_eq!(*recorder.calls.lock().unwrap(), vec!["9".to_string()]);

        let args = payload(json!({"jira": "SC-1", "analysis_id": 10}));
        strategy.before_launch(&args, &job()).await.unwrap();
        assert_eq!(recorder.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn rerun_without_hook_is_not_an_error() {
        let strategy = ReservedKeyStrategy::default();
        let args = payload(json!({"jira": "SC-1", "analysis_id": 9, "rerun": true}));
        strategy.before_launch(&args, &job()).await.unwrap();
    }

    #[tokio::test]
    async fn remove_workdirs_deletes_prefixed_directories() {
        let root = tempfile::tempdir().unwrap();
        let hook = RemoveWorkdirs::new(root.path());

        let targets = hook.targets("5").unwrap();
        for target in &targets {
            std::fs::create_dir_all(target.join("nested")).unwrap();
        }
        let untouched = root.path().join("singlecelllogs/pipeline/analysis_6");
        std::fs::create_dir_all(&untouched).unwrap();

        hook.clean("5").await.unwrap();

        for target in &targets {
            assert!(!target.exists());
        }
        assert!(untouched.exists());

        // Already gone: still fine.
        hook.clean("5").await.unwrap();
    }

    #[test]
    fn remove_workdirs_rejects_path_like_identifiers() {
        let hook = RemoveWorkdirs::new("/srv");
        assert!(hook.targets("../etc").is_err());
        assert!(hook.targets("..").is_err());
        assert!(hook.targets("").is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn privileged_command_failure_is_reported() {
        let root = tempfile::tempdir().unwrap();
        let mut hook = RemoveWorkdirs::new(root.path());
        hook.privileged_command = vec!["false".to_string()];

        assert!(matches!(
            hook.clean("1").await.unwrap_err(),
            DispatchError::WorkdirCleanupError(_)
        ));
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "current_thread")]
    async fn privileged_removal_does_not_block_the_runtime() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::time::Duration;

        let root = tempfile::tempdir().unwrap();
        let mut hook = RemoveWorkdirs::new(root.path());
        hook.dirs = vec![PathBuf::from("only")];
        hook.privileged_command = vec!["sh".into(), "-c".into(), "sleep 0.5".into()];

        let ticks = Arc::new(AtomicUsize::new(0));
        let ticker = {
            let ticks = ticks.clone();
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    ticks.fetch_add(1, Ordering::SeqCst);
                }
            })
        };

        hook.clean("1").await.unwrap();
        ticker.abort();

        assert!(ticks.load(Ordering::SeqCst) >= 3);
    }
}
