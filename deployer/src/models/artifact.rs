//! Worker script artifacts

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static ES_MODULE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*export\s+(default\b|const\b|let\b|function\b|async\b|class\b|\{)")
        .expect("es module regex")
});

static SERVICE_WORKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"addEventListener\s*\(\s*['"]fetch['"]"#).expect("service worker regex")
});

static COMMONJS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bmodule\.exports\b|\bexports\.[A-Za-z_$]|\brequire\s*\(").expect("commonjs regex")
});

/// Module format of a worker script
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptKind {
    EsModule,
    ServiceWorker,
    CommonJs,
    Unknown,
}

impl ScriptKind {
    /// Classify a script by content. ES-module markers win over the legacy
    /// `addEventListener("fetch")` form, which wins over CommonJS markers.
    pub fn detect(content: &str) -> Self {
        if ES_MODULE_RE.is_match(content) {
            ScriptKind::EsModule
        } else if SERVICE_WORKER_RE.is_match(content) {
            ScriptKind::ServiceWorker
        } else if COMMONJS_RE.is_match(content) {
            ScriptKind::CommonJs
        } else {
            ScriptKind::Unknown
        }
    }

    /// Whether the worker needs the Node.js compatibility flag
    pub fn needs_node_compat(&self) -> bool {
        !matches!(self, ScriptKind::ServiceWorker)
    }

    pub fn label(&self) -> &'static str {
        match self {
            ScriptKind::EsModule => "ES module",
            ScriptKind::ServiceWorker => "Service Worker",
            ScriptKind::CommonJs => "CommonJS",
            ScriptKind::Unknown => "unknown",
        }
    }
}

/// An entry script located in a repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptArtifact {
    entry_file: String,
    content: String,
    kind: ScriptKind,
    branch: Option<String>,
}

impl ScriptArtifact {
    /// Wrap script content, detecting its kind
    pub fn new(entry_file: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        let kind = ScriptKind::detect(&content);
        Self {
            entry_file: entry_file.into(),
            content,
            kind,
            branch: None,
        }
    }

    /// Record the branch the script was fetched from
    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    pub fn entry_file(&self) -> &str {
        &self.entry_file
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn kind(&self) -> ScriptKind {
        self.kind
    }

    pub fn branch(&self) -> Option<&str> {
        self.branch.as_deref()
    }

    /// Content size in bytes
    pub fn size(&self) -> u64 {
        self.content.len() as u64
    }
}
