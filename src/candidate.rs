//! # Stage: Candidate Loader
//!
//! ## Responsibility
//! Materialize a runnable agent from a source artifact.  The artifacts are
//! generated Python scripts, so the loader is the crate's plugin boundary:
//! everything behind it is untyped, untrusted text.
//!
//! A loaded candidate exposes exactly one capability:
//! `run(question) -> String`.  The production loader answers questions by
//! spawning a fresh interpreter process per call (the script's standalone
//! entry block takes the question as `argv[1]` and prints the reply).
//! Process-per-call is the isolation contract: no module registry, search
//! path, or global state survives between loads, and reloading the same
//! logical name always yields an independent instance.
//!
//! ## Guarantees
//! - Non-fatal: every load failure (unreadable artifact, syntax error,
//!   missing `run_agent` entry point) is returned as [`LoadOutcome::Failed`]
//!   with diagnostic detail, never a panic or process abort.
//! - Residue-free: the syntax probe compiles the source inside a throwaway
//!   interpreter without importing it, so no bytecode cache is written next
//!   to the artifact.
//!
//! ## NOT Responsible For
//! - Judging answers (evaluation harness) or vetting source text (gate).

use std::path::{Path, PathBuf};
use std::process::Command;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{EvolveError, Result};

/// Matches a top-level `def run_agent(` definition.
static RUN_AGENT_DEF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^def\s+run_agent\s*\(").unwrap());

/// A materialized candidate.  `run` is a best-effort boundary: well-formed
/// candidates convert their own internal errors to strings, but callers must
/// tolerate an `Err` anyway.
pub trait CandidateRunner: Send + Sync {
    fn run(&self, question: &str) -> Result<String>;
}

/// The result of one load attempt.
pub enum LoadOutcome {
    Loaded(Box<dyn CandidateRunner>),
    Failed { detail: String },
}

impl LoadOutcome {
    /// The runner, if the load succeeded.
    pub fn into_runner(self) -> Option<Box<dyn CandidateRunner>> {
        match self {
            LoadOutcome::Loaded(r) => Some(r),
            LoadOutcome::Failed { .. } => None,
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, LoadOutcome::Loaded(_))
    }
}

/// Loader seam.  The evolution loop only ever sees this trait; tests inject
/// scripted loaders, production wires in [`PythonProcessLoader`].
pub trait CandidateLoader: Send + Sync {
    /// Load the artifact at `path` under `logical_name`.  The logical name
    /// exists for diagnostics and telemetry; two loads under the same name
    /// must still produce independent instances.
    fn load(&self, path: &Path, logical_name: &str) -> LoadOutcome;
}

// ---------------------------------------------------------------------------
// PythonProcessLoader
// ---------------------------------------------------------------------------

/// Production loader for generated Python agents.
pub struct PythonProcessLoader {
    python: String,
}

impl PythonProcessLoader {
    pub fn new(python: impl Into<String>) -> Self {
        Self { python: python.into() }
    }

    /// Compile the source in a throwaway interpreter.  Catches syntax errors
    /// and nothing else; top-level runtime behavior is deliberately not
    /// executed here (the script's entry block would start answering).
    fn syntax_check(&self, path: &Path) -> std::result::Result<(), String> {
        let probe = "import sys; compile(open(sys.argv[1]).read(), sys.argv[1], 'exec')";
        let output = Command::new(&self.python)
            .arg("-c")
            .arg(probe)
            .arg(path)
            .output()
            .map_err(|e| format!("failed to spawn {}: {}", self.python, e))?;
        if output.status.success() {
            Ok(())
        } else {
            Err(String::from_utf8_lossy(&output.stderr).into_owned())
        }
    }
}

impl CandidateLoader for PythonProcessLoader {
    fn load(&self, path: &Path, logical_name: &str) -> LoadOutcome {
        let source = match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) => {
                return LoadOutcome::Failed {
                    detail: format!("cannot read artifact {}: {}", path.display(), e),
                }
            }
        };

        if !RUN_AGENT_DEF.is_match(&source) {
            return LoadOutcome::Failed {
                detail: "required capability missing: no top-level run_agent definition".into(),
            };
        }

        if let Err(detail) = self.syntax_check(path) {
            tracing::debug!(agent = logical_name, "syntax check failed");
            return LoadOutcome::Failed { detail };
        }

        LoadOutcome::Loaded(Box::new(PythonScriptRunner {
            python: self.python.clone(),
            path: path.to_path_buf(),
        }))
    }
}

/// Runs one loaded script.  Every call is a fresh process.
struct PythonScriptRunner {
    python: String,
    path: PathBuf,
}

impl CandidateRunner for PythonScriptRunner {
    fn run(&self, question: &str) -> Result<String> {
        let output = Command::new(&self.python)
            .arg(&self.path)
            .arg(question)
            .output()
            .map_err(|e| EvolveError::CandidateRun(format!("spawn failed: {}", e)))?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
        } else {
            Err(EvolveError::CandidateRun(
                String::from_utf8_lossy(&output.stderr).into_owned(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn python_available() -> bool {
        Command::new("python3").arg("--version").output().is_ok()
    }

    fn write_script(body: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::Builder::new().suffix(".py").tempfile().unwrap();
        f.write_all(body.as_bytes()).unwrap();
        f.flush().unwrap();
        f
    }

    const ECHO_AGENT: &str = r#####"
def run_agent(question: str) -> str:
    return "#### 42"

if __name__ == "__main__":
    import sys
    print(run_agent(sys.argv[1]))
"#####;

    #[test]
    fn test_load_rejects_missing_run_agent() {
        let f = write_script("def other():\n    pass\n");
        let loader = PythonProcessLoader::new("python3");
        let outcome = loader.load(f.path(), "v_test");
        assert!(!outcome.is_loaded());
    }

    #[test]
    fn test_load_rejects_unreadable_artifact() {
        let loader = PythonProcessLoader::new("python3");
        let outcome = loader.load(Path::new("/nonexistent/agent.py"), "v_test");
        match outcome {
            LoadOutcome::Failed { detail } => assert!(detail.contains("cannot read")),
            LoadOutcome::Loaded(_) => panic!("loaded a missing artifact"),
        }
    }

    #[test]
    fn test_load_rejects_syntax_error() {
        if !python_available() {
            return;
        }
        let f = write_script("def run_agent(q:\n");
        let loader = PythonProcessLoader::new("python3");
        assert!(!loader.load(f.path(), "v_test").is_loaded());
    }

    #[test]
    fn test_loaded_agent_answers() {
        if !python_available() {
            return;
        }
        let f = write_script(ECHO_AGENT);
        let loader = PythonProcessLoader::new("python3");
        let runner = loader.load(f.path(), "v_test").into_runner().unwrap();
        assert_eq!(runner.run("2 + 2?").unwrap(), "#### 42");
    }

    #[test]
    fn test_reload_yields_fresh_instance() {
        if !python_available() {
            return;
        }
        // A script that mutates module state still answers identically across
        // loads because nothing persists between processes.
        let f = write_script(
            r#####"
counter = [0]

def run_agent(question: str) -> str:
    counter[0] += 1
    return "#### " + str(counter[0])

if __name__ == "__main__":
    import sys
    print(run_agent(sys.argv[1]))
"#####,
        );
        let loader = PythonProcessLoader::new("python3");
        let a = loader.load(f.path(), "v_same").into_runner().unwrap();
        let b = loader.load(f.path(), "v_same").into_runner().unwrap();
        assert_eq!(a.run("q").unwrap(), "#### 1");
        assert_eq!(b.run("q").unwrap(), "#### 1");
    }

    #[test]
    fn test_crashing_agent_reports_error() {
        if !python_available() {
            return;
        }
        let f = write_script(
            r#"
def run_agent(question: str) -> str:
    raise RuntimeError("boom")

if __name__ == "__main__":
    import sys
    print(run_agent(sys.argv[1]))
"#,
        );
        let loader = PythonProcessLoader::new("python3");
        let runner = loader.load(f.path(), "v_test").into_runner().unwrap();
        let err = runner.run("q").unwrap_err();
        assert!(err.to_string().contains("boom"));
    }
}
