//! Key/value sources for ConfigMap and Secret generators.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use stratum_core::{Error, Loader, Result, Validator};

/// Options shared by every generated object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratorOptions {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub disable_name_suffix_hash: bool,
}

impl GeneratorOptions {
    /// `self` overridden by `local`: maps are unioned, the hash flag is or'ed.
    pub fn overlaid_with(&self, local: Option<&GeneratorOptions>) -> GeneratorOptions {
        let mut out = self.clone();
        if let Some(l) = local {
            out.labels.extend(l.labels.iter().map(|(k, v)| (k.clone(), v.clone())));
            out.annotations.extend(l.annotations.iter().map(|(k, v)| (k.clone(), v.clone())));
            out.disable_name_suffix_hash |= l.disable_name_suffix_hash;
        }
        out
    }
}

/// Name, behavior and data sources of one generated object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratorArgs {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    /// `create` (default), `replace` or `merge`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub behavior: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub literals: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub envs: Vec<String>,
    /// Single env file, older spelling of `envs`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub env: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<GeneratorOptions>,
}

pub type ConfigMapArgs = GeneratorArgs;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretArgs {
    #[serde(flatten)]
    pub generator: GeneratorArgs,
    #[serde(default, rename = "type", skip_serializing_if = "String::is_empty")]
    pub secret_type: String,
}

/// A key and its raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvPair {
    pub key: String,
    pub value: Vec<u8>,
}

/// `k=v`; surrounding quotes on the value are dropped.
pub fn parse_literal(source: &str) -> Result<KvPair> {
    let (k, v) = source
        .split_once('=')
        .ok_or_else(|| Error::validation(format!("literal source '{source}' must be key=value")))?;
    if k.is_empty() {
        return Err(Error::validation(format!("literal source '{source}' has an empty key")));
    }
    Ok(KvPair { key: k.to_string(), value: unquote(v).as_bytes().to_vec() })
}

fn unquote(v: &str) -> &str {
    for q in ['"', '\''] {
        if v.len() >= 2 && v.starts_with(q) && v.ends_with(q) {
            return &v[1..v.len() - 1];
        }
    }
    v
}

/// `KEY=VALUE` lines; blanks and `#` comments are skipped.
pub fn parse_env_content(content: &str) -> Result<Vec<KvPair>> {
    let mut out = Vec::new();
    for (n, line) in content.lines().enumerate() {
        let line = line.trim_start();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (k, v) = line
            .split_once('=')
            .ok_or_else(|| Error::validation(format!("env line {}: '{}' is not KEY=VALUE", n + 1, line)))?;
        let k = k.trim_end();
        if k.is_empty() || k.contains(char::is_whitespace) {
            return Err(Error::validation(format!("env line {}: invalid key '{}'", n + 1, k)));
        }
        out.push(KvPair { key: k.to_string(), value: v.as_bytes().to_vec() });
    }
    Ok(out)
}

/// `path` keyed by its file name, or `key=path`.
pub fn parse_file_source(source: &str) -> Result<(String, String)> {
    match source.split_once('=') {
        Some((k, p)) if k.is_empty() || p.is_empty() => {
            Err(Error::validation(format!("file source '{source}' must be key=path or path")))
        }
        Some((k, p)) => Ok((k.to_string(), p.to_string())),
        None => {
            let key = source.rsplit('/').next().unwrap_or(source);
            if key.is_empty() {
                return Err(Error::validation(format!("file source '{source}' has no file name")));
            }
            Ok((key.to_string(), source.to_string()))
        }
    }
}

/// Gather every pair the sources name, in literal, env, file order.
/// Keys are validated and must be unique.
pub fn load_pairs(loader: &dyn Loader, validator: &dyn Validator, args: &GeneratorArgs) -> Result<Vec<KvPair>> {
    let mut pairs = Vec::new();
    for lit in &args.literals {
        pairs.push(parse_literal(lit)?);
    }
    let env_files = args.envs.iter().chain(std::iter::once(&args.env).filter(|e| !e.is_empty()));
    for path in env_files {
        let bytes = loader.load(path)?;
        let content = String::from_utf8(bytes).map_err(|_| Error::validation(format!("env file '{path}' is not UTF-8")))?;
        pairs.extend(parse_env_content(&content)?);
    }
    for src in &args.files {
        let (key, path) = parse_file_source(src)?;
        pairs.push(KvPair { key, value: loader.load(&path)? });
    }
    let mut seen = std::collections::BTreeSet::new();
    for p in &pairs {
        validator.validate_data_key(&p.key)?;
        if !seen.insert(p.key.as_str()) {
            return Err(Error::validation(format!("duplicate key '{}' in generator '{}'", p.key, args.name)));
        }
    }
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use stratum_core::{K8sValidator, MemoryLoader};

    #[test]
    fn literals_strip_quotes() {
        assert_eq!(parse_literal("c=\"Good Morning\"").unwrap().value, b"Good Morning");
        assert_eq!(parse_literal("d=\"false\"").unwrap().value, b"false");
        assert_eq!(parse_literal("e=a=b").unwrap().value, b"a=b");
        assert_eq!(parse_literal("f=").unwrap().value, b"");
        assert!(parse_literal("novalue").is_err());
        assert!(parse_literal("=x").is_err());
    }

    #[test]
    fn env_content_skips_comments_and_blanks() {
        let pairs = parse_env_content("# creds\nDB_USERNAME=admin\n\n  DB_PASSWORD=somepw\n").unwrap();
        let keys: Vec<_> = pairs.iter().map(|p| p.key.as_str()).collect();
        assert_eq!(keys, vec!["DB_USERNAME", "DB_PASSWORD"]);
        assert!(parse_env_content("JUSTAKEY\n").is_err());
    }

    #[test]
    fn file_sources() {
        assert_eq!(parse_file_source("conf/app-init.ini").unwrap(), ("app-init.ini".into(), "conf/app-init.ini".into()));
        assert_eq!(parse_file_source("init=conf/app.ini").unwrap(), ("init".into(), "conf/app.ini".into()));
        assert!(parse_file_source("=x").is_err());
    }

    #[test]
    fn duplicate_keys_across_sources_fail() {
        let ldr = MemoryLoader::new("/p").with_file("a.env", "A=1\n");
        let args = GeneratorArgs {
            name: "dup".into(),
            literals: vec!["A=2".into()],
            envs: vec!["a.env".into()],
            ..GeneratorArgs::default()
        };
        let err = load_pairs(&ldr, &K8sValidator::new(), &args).unwrap_err();
        assert!(err.to_string().contains("duplicate key 'A'"), "{err}");
    }

    #[test]
    fn invalid_data_key_fails() {
        let ldr = MemoryLoader::new("/p");
        let args = GeneratorArgs { literals: vec!["bad key=1".into()], ..GeneratorArgs::default() };
        assert!(load_pairs(&ldr, &K8sValidator::new(), &args).unwrap_err().is_validation());
    }

    #[test]
    fn local_options_override_global() {
        let global = GeneratorOptions { labels: [("a".into(), "1".into())].into(), ..GeneratorOptions::default() };
        let local = GeneratorOptions {
            labels: [("a".into(), "2".into())].into(),
            disable_name_suffix_hash: true,
            ..GeneratorOptions::default()
        };
        let eff = global.overlaid_with(Some(&local));
        assert_eq!(eff.labels["a"], "2");
        assert!(eff.disable_name_suffix_hash);
    }
}
