//! Plugins run as external executables.
//!
//! The executable gets its arguments from `argsOneLiner` and `argsFromFile`,
//! its canonical config in `STRATUM_PLUGIN_CONFIG_STRING` and the
//! kustomization root in `STRATUM_PLUGIN_CONFIG_ROOT`. A generator prints
//! a YAML stream. A transformer reads the collection on stdin, each object
//! tagged with [`ID_ANNOTATION`], and prints the objects it changed with the
//! tag intact.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use metrics::{counter, histogram};
use rustc_hash::FxHashMap;
use serde_json::Value;
use stratum_core::Error;
use stratum_resource::{ResourceCollection, ResourceFactory};
use tracing::{debug, warn};

use crate::{Configurable, Generator, PluginHelpers, Transformer};

pub const ID_ANNOTATION: &str = "config.stratum.dev/id";
pub const CONFIG_STRING_ENV: &str = "STRATUM_PLUGIN_CONFIG_STRING";
pub const CONFIG_ROOT_ENV: &str = "STRATUM_PLUGIN_CONFIG_ROOT";

const ARGS_ONE_LINER: &str = "argsOneLiner";
const ARGS_FROM_FILE: &str = "argsFromFile";

#[derive(Debug)]
pub struct ExecPlugin {
    path: PathBuf,
    cfg: Vec<u8>,
    args: Vec<String>,
    root: PathBuf,
    factory: Option<ResourceFactory>,
}

impl ExecPlugin {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), cfg: Vec::new(), args: Vec::new(), root: PathBuf::new(), factory: None }
    }

    pub fn path(&self) -> &Path { &self.path }
    pub fn args(&self) -> &[String] { &self.args }
    pub fn cfg(&self) -> &[u8] { &self.cfg }

    pub fn is_available(&self) -> bool {
        self.path.is_file()
    }

    fn factory(&self) -> Result<&ResourceFactory> {
        self.factory.as_ref().ok_or_else(|| anyhow!("exec plugin {} used before config", self.path.display()))
    }

    fn invoke(&self, input: &[u8]) -> Result<Vec<u8>> {
        let t0 = Instant::now();
        debug!(plugin = %self.path.display(), args = ?self.args, "running exec plugin");
        let mut child = Command::new(&self.path)
            .args(&self.args)
            .env(CONFIG_STRING_ENV, String::from_utf8_lossy(&self.cfg).into_owned())
            .env(CONFIG_ROOT_ENV, &self.root)
            .current_dir(if self.root.is_dir() { self.root.as_path() } else { Path::new(".") })
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::io(format!("starting plugin {}: {e}", self.path.display())))?;

        let stdin = child.stdin.take();
        let input = input.to_vec();
        let writer = std::thread::spawn(move || -> std::io::Result<()> {
            if let Some(mut s) = stdin {
                s.write_all(&input)?;
            }
            Ok(())
        });
        let output = child
            .wait_with_output()
            .map_err(|e| Error::io(format!("waiting for plugin {}: {e}", self.path.display())))?;
        if let Ok(Err(e)) = writer.join() {
            // Plugins that never read stdin close the pipe early.
            debug!(plugin = %self.path.display(), error = %e, "stdin not fully consumed");
        }

        let elapsed_ms = t0.elapsed().as_secs_f64() * 1000.0;
        counter!("plugin_exec_total", 1);
        histogram!("plugin_exec_ms", elapsed_ms);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(plugin = %self.path.display(), status = %output.status, "exec plugin failed");
            return Err(Error::io(format!(
                "plugin {} exited with {}: {}",
                self.path.display(),
                output.status,
                stderr.trim_end()
            ))
            .into());
        }
        debug!(plugin = %self.path.display(), bytes = output.stdout.len(), took_ms = elapsed_ms, "exec plugin done");
        Ok(output.stdout)
    }
}

/// `argsOneLiner` tokens, then the non-empty lines of `argsFromFile` with
/// leading spaces trimmed.
fn build_args(cfg: &Value, helpers: &PluginHelpers) -> Result<Vec<String>> {
    let mut args: Vec<String> = match cfg.get(ARGS_ONE_LINER) {
        Some(Value::String(s)) => s.split_whitespace().map(str::to_string).collect(),
        None | Some(Value::Null) => Vec::new(),
        Some(_) => return Err(Error::validation(format!("{ARGS_ONE_LINER} must be a string")).into()),
    };
    match cfg.get(ARGS_FROM_FILE) {
        Some(Value::String(file)) if !file.is_empty() => {
            let content = helpers.loader().load(file).with_context(|| format!("reading {ARGS_FROM_FILE} '{file}'"))?;
            let text = String::from_utf8_lossy(&content);
            args.extend(
                text.lines().map(|l| l.trim_start_matches(' ')).filter(|l| !l.is_empty()).map(str::to_string),
            );
        }
        None | Some(Value::Null) | Some(Value::String(_)) => {}
        Some(_) => return Err(Error::validation(format!("{ARGS_FROM_FILE} must be a string")).into()),
    }
    Ok(args)
}

impl Configurable for ExecPlugin {
    fn config(&mut self, helpers: &PluginHelpers, config: &[u8]) -> Result<()> {
        let v: Value = serde_yaml::from_slice(config)
            .map_err(Error::from)
            .with_context(|| format!("parsing config for {}", self.path.display()))?;
        self.cfg = serde_yaml::to_string(&v).map_err(Error::from)?.into_bytes();
        self.args = build_args(&v, helpers)?;
        self.root = helpers.loader().root().to_path_buf();
        self.factory = Some(helpers.factory().clone());
        Ok(())
    }
}

impl Generator for ExecPlugin {
    fn generate(&self) -> Result<ResourceCollection> {
        let out = self.invoke(&[])?;
        let c = self
            .factory()?
            .from_bytes(&out)
            .map_err(|e| Error::io(format!("malformed output from plugin {}: {e}", self.path.display())))?;
        Ok(c)
    }
}

impl Transformer for ExecPlugin {
    fn transform(&self, c: &mut ResourceCollection) -> Result<()> {
        let mut input = String::new();
        let mut by_id: FxHashMap<String, stratum_core::ResId> = FxHashMap::default();
        for r in c.iter() {
            let id = r.current_id();
            let mut tagged = r.clone();
            tagged.set_annotation(ID_ANNOTATION, &id.to_string())?;
            input.push_str("---\n");
            input.push_str(&tagged.as_yaml()?);
            by_id.insert(id.to_string(), id);
        }
        let out = self.invoke(input.as_bytes())?;
        let malformed = |msg: String| Error::io(format!("malformed output from plugin {}: {msg}", self.path.display()));
        let returned = self.factory()?.from_bytes(&out).map_err(|e| malformed(e.to_string()))?;

        for mut r in returned {
            let tag = match r.remove_annotation(ID_ANNOTATION) {
                Some(Value::String(s)) => s,
                _ => return Err(malformed(format!("{} carries no {ID_ANNOTATION} annotation", r.current_id())).into()),
            };
            let id = by_id.remove(&tag).ok_or_else(|| malformed(format!("unknown or repeated {ID_ANNOTATION} '{tag}'")))?;
            let target = c.get_by_current_id_mut(&id).ok_or_else(|| malformed(format!("'{tag}' not in the input")))?;
            target.replace_body(r.into_body());
        }
        c.check_unique_ids()?;
        Ok(())
    }
}
