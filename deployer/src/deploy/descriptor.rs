//! Deployment descriptor (wrangler.toml) synthesis
//!
//! The CLI strategy needs a descriptor whose `name` and `main` match the
//! requested worker and the located entry file. A missing descriptor is
//! generated from a template; an existing one is patched line by line so
//! everything else the repository configured survives. When the line scan is
//! fooled by table-like lines inside multi-line strings, the parsed table is
//! edited and re-serialized instead, dropping comments.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::json;
use tracing::{error, info, warn};

use crate::deploy::workspace::WorkingTree;
use crate::errors::DeployError;
use crate::models::artifact::{ScriptArtifact, ScriptKind};

pub const DESCRIPTOR_FILE: &str = "wrangler.toml";
pub const PACKAGE_MANIFEST: &str = "package.json";
pub const COMPATIBILITY_DATE: &str = "2024-01-01";
pub const NODE_COMPAT_FLAG: &str = "nodejs_compat";

static NAME_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*name\s*=").expect("name key regex"));
static MAIN_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*main\s*=").expect("main key regex"));
static ACCOUNT_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*account_id\s*=").expect("account key regex"));
static TABLE_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\[").expect("table header regex"));

/// Effective top-level descriptor values
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentDescriptor {
    pub name: String,
    pub main_file: String,
    pub account_id: Option<String>,
    pub compatibility_date: String,
    pub flags: Vec<String>,
}

impl DeploymentDescriptor {
    /// Default descriptor for an artifact
    pub fn for_artifact(
        worker_name: &str,
        artifact: &ScriptArtifact,
        account_id: Option<&str>,
    ) -> Self {
        let flags = if artifact.kind().needs_node_compat() {
            vec![NODE_COMPAT_FLAG.to_string()]
        } else {
            Vec::new()
        };

        Self {
            name: worker_name.to_string(),
            main_file: artifact.entry_file().to_string(),
            account_id: account_id.map(str::to_string),
            compatibility_date: COMPATIBILITY_DATE.to_string(),
            flags,
        }
    }

    /// Read the top-level values of a descriptor
    pub fn parse(contents: &str) -> Result<Self, DeployError> {
        let table: toml::Table = contents.parse()?;
        let string = |key: &str| table.get(key).and_then(|v| v.as_str()).map(str::to_string);

        Ok(Self {
            name: string("name").unwrap_or_default(),
            main_file: string("main").unwrap_or_default(),
            account_id: string("account_id"),
            compatibility_date: string("compatibility_date")
                .unwrap_or_else(|| COMPATIBILITY_DATE.to_string()),
            flags: table
                .get("compatibility_flags")
                .and_then(|v| v.as_array())
                .map(|flags| {
                    flags
                        .iter()
                        .filter_map(|f| f.as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default(),
        })
    }

    /// Render a fresh descriptor file for a script of the given kind
    pub fn render(&self, kind: ScriptKind) -> String {
        let mut out = String::new();
        out.push_str("# Cloudflare Workers configuration\n");
        out.push_str(&format!("# Generated by wdeploy for a {} script\n\n", kind.label()));
        out.push_str(&format!("name = {}\n", quote(&self.name)));
        out.push_str(&format!("main = {}\n", quote(&self.main_file)));
        out.push_str(&format!(
            "compatibility_date = {}\n",
            quote(&self.compatibility_date)
        ));
        if let Some(account_id) = &self.account_id {
            out.push_str(&format!("account_id = {}\n", quote(account_id)));
        }
        if !self.flags.is_empty() {
            let flags: Vec<String> = self.flags.iter().map(|f| quote(f)).collect();
            out.push_str(&format!("compatibility_flags = [{}]\n", flags.join(", ")));
        }
        out.push_str("workers_dev = true\n");

        match kind {
            ScriptKind::EsModule => out.push_str("\n[build.upload]\nformat = \"modules\"\n"),
            ScriptKind::ServiceWorker => {
                out.push_str("\n[build.upload]\nformat = \"service-worker\"\n")
            }
            ScriptKind::CommonJs | ScriptKind::Unknown => {}
        }

        out.push_str("\n[vars]\nENVIRONMENT = \"production\"\n");
        out
    }
}

fn quote(value: &str) -> String {
    toml::Value::String(value.to_string()).to_string()
}

/// What happened to the descriptor file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorAction {
    /// No descriptor existed, a default was written
    Created,
    /// The existing descriptor was patched in place
    Patched,
    /// The existing descriptor was unusable and was replaced
    Replaced,
}

/// Result of [`ConfigSynthesizer::synthesize`]
#[derive(Debug, Clone)]
pub struct Synthesis {
    pub descriptor: DeploymentDescriptor,
    pub action: DescriptorAction,
}

/// Writes the descriptor and package manifest into a working tree
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigSynthesizer;

impl ConfigSynthesizer {
    pub fn new() -> Self {
        Self
    }

    /// Make the tree's descriptor point at `worker_name` and the artifact's
    /// entry file. Never fails; write errors are logged and show up when the
    /// deploy tool runs.
    pub async fn synthesize(
        &self,
        tree: &WorkingTree,
        worker_name: &str,
        artifact: &ScriptArtifact,
        account_id: Option<&str>,
    ) -> Synthesis {
        let fresh = DeploymentDescriptor::for_artifact(worker_name, artifact, account_id);
        let file = tree.dir().file(DESCRIPTOR_FILE);

        let (contents, action) = if file.exists().await {
            let patched = match file.read_string().await {
                Ok(existing) => {
                    patch_descriptor(&existing, worker_name, artifact.entry_file(), account_id)
                }
                Err(e) => Err(e),
            };
            match patched {
                Ok(contents) => (contents, DescriptorAction::Patched),
                Err(e) => {
                    warn!("Existing {} is unusable ({}), replacing it", DESCRIPTOR_FILE, e);
                    (fresh.render(artifact.kind()), DescriptorAction::Replaced)
                }
            }
        } else {
            (fresh.render(artifact.kind()), DescriptorAction::Created)
        };

        if let Err(e) = file.write_string(&contents).await {
            error!("Failed to write {}: {}", file.path().display(), e);
        } else {
            info!("{} {:?} for {}", DESCRIPTOR_FILE, action, worker_name);
        }

        self.ensure_package_manifest(tree, worker_name, artifact.entry_file())
            .await;

        let descriptor = DeploymentDescriptor::parse(&contents).unwrap_or(fresh);
        Synthesis { descriptor, action }
    }

    /// Write a minimal package.json when the repository has none
    pub async fn ensure_package_manifest(
        &self,
        tree: &WorkingTree,
        worker_name: &str,
        entry_file: &str,
    ) {
        let file = tree.dir().file(PACKAGE_MANIFEST);
        if file.exists().await {
            return;
        }

        let manifest = json!({
            "name": worker_name,
            "version": "1.0.0",
            "private": true,
            "main": entry_file,
            "scripts": {
                "deploy": "wrangler deploy",
                "dev": "wrangler dev"
            },
            "devDependencies": {
                "wrangler": "^3.0.0"
            }
        });
        if let Err(e) = file.write_json(&manifest).await {
            error!("Failed to write {}: {}", file.path().display(), e);
        }
    }
}

/// Patch the top-level `name`, `main` and `account_id` of an existing
/// descriptor, keeping every other line as it was.
///
/// The result always parses with `name == worker_name` and
/// `main == main_file`; an existing `account_id` is kept. Fails when the input
/// is not valid TOML.
pub fn patch_descriptor(
    contents: &str,
    worker_name: &str,
    main_file: &str,
    account_id: Option<&str>,
) -> Result<String, DeployError> {
    let table: toml::Table = contents.parse()?;

    let patched = patch_lines(contents, worker_name, main_file, account_id);
    if targets(&patched, worker_name, main_file, account_id.is_some()) {
        return Ok(patched);
    }

    warn!(
        "Line patch of {} missed its top-level keys, rewriting the parsed table",
        DESCRIPTOR_FILE
    );
    let rewritten = patch_table(table, worker_name, main_file, account_id)?;
    if targets(&rewritten, worker_name, main_file, account_id.is_some()) {
        Ok(rewritten)
    } else {
        Err(DeployError::Validation(format!(
            "patched {} does not target {}",
            DESCRIPTOR_FILE, worker_name
        )))
    }
}

fn targets(contents: &str, worker_name: &str, main_file: &str, needs_account: bool) -> bool {
    DeploymentDescriptor::parse(contents)
        .map(|d| {
            d.name == worker_name
                && d.main_file == main_file
                && (!needs_account || d.account_id.is_some())
        })
        .unwrap_or(false)
}

fn patch_table(
    mut table: toml::Table,
    worker_name: &str,
    main_file: &str,
    account_id: Option<&str>,
) -> Result<String, DeployError> {
    table.insert("name".to_string(), worker_name.into());
    table.insert("main".to_string(), main_file.into());
    if let (false, Some(account_id)) = (table.contains_key("account_id"), account_id) {
        table.insert("account_id".to_string(), account_id.into());
    }
    toml::to_string(&table).map_err(|e| DeployError::Validation(e.to_string()))
}

fn patch_lines(
    contents: &str,
    worker_name: &str,
    main_file: &str,
    account_id: Option<&str>,
) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut first_table: Option<usize> = None;
    let mut has_name = false;
    let mut has_main = false;
    let mut has_account = false;

    for line in contents.lines() {
        if first_table.is_none() {
            if TABLE_HEADER.is_match(line) {
                first_table = Some(lines.len());
            } else if NAME_KEY.is_match(line) && !has_name {
                has_name = true;
                lines.push(format!("name = {}", quote(worker_name)));
                continue;
            } else if MAIN_KEY.is_match(line) && !has_main {
                has_main = true;
                lines.push(format!("main = {}", quote(main_file)));
                continue;
            } else if ACCOUNT_KEY.is_match(line) {
                has_account = true;
            }
        }
        lines.push(line.to_string());
    }

    let mut missing = Vec::new();
    if !has_name {
        missing.push(format!("name = {}", quote(worker_name)));
    }
    if !has_main {
        missing.push(format!("main = {}", quote(main_file)));
    }
    if let (false, Some(account_id)) = (has_account, account_id) {
        missing.push(format!("account_id = {}", quote(account_id)));
    }
    if !missing.is_empty() {
        let at = first_table.unwrap_or(lines.len());
        if first_table.is_some() {
            missing.push(String::new());
        }
        lines.splice(at..at, missing);
    }

    let mut patched = lines.join("\n");
    if contents.ends_with('\n') || contents.is_empty() {
        patched.push('\n');
    }
    patched
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deploy::workspace::Workspace;
    use crate::filesys::dir::Dir;

    const ACCOUNT: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn test_render_es_module() {
        let artifact = ScriptArtifact::new("index.js", "export default { fetch() {} }");
        let descriptor = DeploymentDescriptor::for_artifact("demo", &artifact, Some(ACCOUNT));
        let text = descriptor.render(artifact.kind());

        assert!(text.contains("format = \"modules\""));
        assert!(text.contains("compatibility_flags = [\"nodejs_compat\"]"));
        assert_eq!(DeploymentDescriptor::parse(&text).unwrap(), descriptor);
    }

    #[test]
    fn test_render_service_worker_has_no_flags() {
        let artifact = ScriptArtifact::new("worker.js", "addEventListener(\"fetch\", e => {})");
        let descriptor = DeploymentDescriptor::for_artifact("demo", &artifact, None);
        let text = descriptor.render(artifact.kind());

        assert!(text.contains("format = \"service-worker\""));
        assert!(!text.contains("compatibility_flags"));
        assert!(!text.contains("account_id"));
    }

    #[test]
    fn test_patch_rewrites_top_level_keys_only() {
        let existing = r#"# my worker
name = "old-name"
main = "src/old.js"
compatibility_date = "2023-05-01"

[env.staging]
name = "old-name-staging"
"#;
        let patched = patch_descriptor(existing, "demo", "index.js", Some(ACCOUNT)).unwrap();
        let descriptor = DeploymentDescriptor::parse(&patched).unwrap();

        assert_eq!(descriptor.name, "demo");
        assert_eq!(descriptor.main_file, "index.js");
        assert_eq!(descriptor.account_id.as_deref(), Some(ACCOUNT));
        assert_eq!(descriptor.compatibility_date, "2023-05-01");
        assert!(patched.starts_with("# my worker\n"));
        assert!(patched.contains("name = \"old-name-staging\""));

        let table: toml::Table = patched.parse().unwrap();
        assert!(table.get("account_id").is_some());
    }

    #[test]
    fn test_patch_inserts_missing_keys_before_tables() {
        let existing = "compatibility_date = \"2024-03-01\"\n\n[vars]\nKEY = \"v\"\n";
        let patched = patch_descriptor(existing, "demo", "worker.js", None).unwrap();
        let table: toml::Table = patched.parse().unwrap();

        assert_eq!(table["name"].as_str(), Some("demo"));
        assert_eq!(table["main"].as_str(), Some("worker.js"));
        assert!(table.get("account_id").is_none());
        assert_eq!(table["vars"]["KEY"].as_str(), Some("v"));
    }

    #[test]
    fn test_patch_keeps_existing_account() {
        let existing = "name = \"x\"\naccount_id = \"ffffffffffffffffffffffffffffffff\"\n";
        let patched = patch_descriptor(existing, "demo", "index.js", Some(ACCOUNT)).unwrap();
        assert!(patched.contains("ffffffffffffffffffffffffffffffff"));
        assert!(!patched.contains(ACCOUNT));
    }

    #[test]
    fn test_patch_ignores_brackets_inside_multiline_strings() {
        let existing = "description = \"\"\"\n[not a table]\n\"\"\"\n";
        let patched = patch_descriptor(existing, "demo", "index.js", Some(ACCOUNT)).unwrap();
        let descriptor = DeploymentDescriptor::parse(&patched).unwrap();

        assert_eq!(descriptor.name, "demo");
        assert_eq!(descriptor.main_file, "index.js");
        assert_eq!(descriptor.account_id.as_deref(), Some(ACCOUNT));
        let table: toml::Table = patched.parse().unwrap();
        assert_eq!(table["description"].as_str(), Some("[not a table]\n"));
    }

    #[test]
    fn test_patch_ignores_keys_inside_multiline_strings() {
        let existing = "notes = '''\nname = \"decoy\"\n'''\nname = \"upstream\"\n\n[vars]\nA = \"1\"\n";
        let patched = patch_descriptor(existing, "demo", "index.js", None).unwrap();
        let table: toml::Table = patched.parse().unwrap();

        assert_eq!(table["name"].as_str(), Some("demo"));
        assert_eq!(table["main"].as_str(), Some("index.js"));
        assert_eq!(table["notes"].as_str(), Some("name = \"decoy\"\n"));
        assert_eq!(table["vars"]["A"].as_str(), Some("1"));
    }

    #[test]
    fn test_patch_rejects_invalid_toml() {
        assert!(patch_descriptor("name = = broken", "demo", "index.js", None).is_err());
    }

    async fn tree(root: &std::path::Path) -> (Workspace, WorkingTree) {
        let workspace = Workspace::new(Dir::new(root));
        let tree = workspace.prepare("demo").await.unwrap();
        (workspace, tree)
    }

    #[tokio::test]
    async fn test_synthesize_without_descriptor() {
        let root = tempfile::tempdir().unwrap();
        let (_workspace, tree) = tree(root.path()).await;
        let artifact = ScriptArtifact::new("index.js", "export default {}");

        let synthesis = ConfigSynthesizer::new()
            .synthesize(&tree, "demo", &artifact, Some(ACCOUNT))
            .await;

        assert_eq!(synthesis.action, DescriptorAction::Created);
        assert_eq!(synthesis.descriptor.name, "demo");
        assert_eq!(synthesis.descriptor.main_file, "index.js");

        let manifest: serde_json::Value = tree.dir().file(PACKAGE_MANIFEST).read_json().await.unwrap();
        assert_eq!(manifest["main"], "index.js");
        assert_eq!(manifest["name"], "demo");
    }

    #[tokio::test]
    async fn test_synthesize_replaces_broken_descriptor() {
        let root = tempfile::tempdir().unwrap();
        let (_workspace, tree) = tree(root.path()).await;
        tree.dir()
            .file(DESCRIPTOR_FILE)
            .write_string("name = [unterminated")
            .await
            .unwrap();
        tree.dir()
            .file(PACKAGE_MANIFEST)
            .write_string("{\"name\": \"keep-me\"}")
            .await
            .unwrap();
        let artifact = ScriptArtifact::new("app.js", "module.exports = {}");

        let synthesis = ConfigSynthesizer::new()
            .synthesize(&tree, "demo", &artifact, None)
            .await;

        assert_eq!(synthesis.action, DescriptorAction::Replaced);
        assert_eq!(synthesis.descriptor.main_file, "app.js");
        assert_eq!(synthesis.descriptor.flags, vec![NODE_COMPAT_FLAG]);

        let manifest = tree.dir().file(PACKAGE_MANIFEST).read_string().await.unwrap();
        assert!(manifest.contains("keep-me"));
    }

    #[tokio::test]
    async fn test_synthesize_patch_targets_worker_despite_multiline_strings() {
        let root = tempfile::tempdir().unwrap();
        let (_workspace, tree) = tree(root.path()).await;
        tree.dir()
            .file(DESCRIPTOR_FILE)
            .write_string("description = \"\"\"\n[not a table]\n\"\"\"\n")
            .await
            .unwrap();
        let artifact = ScriptArtifact::new("index.js", "export default {}");

        let synthesis = ConfigSynthesizer::new()
            .synthesize(&tree, "demo", &artifact, None)
            .await;

        assert_eq!(synthesis.action, DescriptorAction::Patched);
        let written = tree.dir().file(DESCRIPTOR_FILE).read_string().await.unwrap();
        let descriptor = DeploymentDescriptor::parse(&written).unwrap();
        assert_eq!(descriptor.name, "demo");
        assert_eq!(descriptor.main_file, "index.js");
    }
}
