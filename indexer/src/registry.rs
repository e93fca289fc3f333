//! Witness registry read from `.json` / `.jsonl` files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use witness_index::{DomainKind, FragmentRef, Resolver, TextSource};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WitnessRecord {
    pub id: String,
    pub fragment: String,
    pub text: String,
    #[serde(default)]
    pub representative: bool,
    /// Anything other than `witness` is not a valid search result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

/// Witnesses by id. Later records replace earlier ones with the same id.
#[derive(Debug, Default)]
pub struct Registry {
    witnesses: HashMap<String, WitnessRecord>,
    order: Vec<String>,
}

impl Registry {
    /// Load every `.json` and `.jsonl` file under `path` (or `path` itself).
    pub fn load(path: &Path) -> Result<Self> {
        let mut registry = Registry::default();
        for file in registry_files(path)? {
            let before = registry.len();
            if file.extension().and_then(|s| s.to_str()) == Some("jsonl") {
                registry.read_jsonl(&file)?;
            } else {
                registry.read_json(&file)?;
            }
            tracing::debug!(file = %file.display(), records = registry.len() - before, "read registry file");
        }
        tracing::info!(witnesses = registry.len(), "loaded registry");
        Ok(registry)
    }

    fn read_jsonl(&mut self, file: &Path) -> Result<()> {
        let reader = BufReader::new(File::open(file).with_context(|| format!("opening {}", file.display()))?);
        for (n, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: WitnessRecord = serde_json::from_str(&line)
                .with_context(|| format!("{}:{}: invalid witness record", file.display(), n + 1))?;
            self.insert(record);
        }
        Ok(())
    }

    fn read_json(&mut self, file: &Path) -> Result<()> {
        let reader = BufReader::new(File::open(file).with_context(|| format!("opening {}", file.display()))?);
        let json: serde_json::Value =
            serde_json::from_reader(reader).with_context(|| format!("parsing {}", file.display()))?;
        match json {
            serde_json::Value::Array(values) => {
                for value in values {
                    self.insert(serde_json::from_value(value)?);
                }
            }
            serde_json::Value::Object(_) => self.insert(serde_json::from_value(json)?),
            _ => tracing::warn!(file = %file.display(), "skipping registry file that is neither an object nor an array"),
        }
        Ok(())
    }

    pub fn insert(&mut self, record: WitnessRecord) {
        if !self.witnesses.contains_key(&record.id) {
            self.order.push(record.id.clone());
        }
        self.witnesses.insert(record.id.clone(), record);
    }

    pub fn len(&self) -> usize {
        self.witnesses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.witnesses.is_empty()
    }

    /// Witnesses in the order they were first read.
    pub fn iter(&self) -> impl Iterator<Item = &WitnessRecord> {
        self.order.iter().filter_map(|id| self.witnesses.get(id))
    }

    /// The fragment with its representative witness, if it has one.
    pub fn fragment(&self, fragment: &str) -> Option<FragmentRef> {
        self.iter()
            .find(|w| w.fragment == fragment && w.representative)
            .map(|w| FragmentRef::new(fragment, w.id.clone()))
    }
}

fn registry_files(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
        anyhow::bail!("registry path {} does not exist", path.display());
    }
    let mut files: Vec<PathBuf> = WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .filter(|p| p.is_file())
        .filter(|p| matches!(p.extension().and_then(|s| s.to_str()), Some("json" | "jsonl")))
        .collect();
    files.sort();
    Ok(files)
}

impl Resolver for Registry {
    type Ref = WitnessRecord;

    fn resolve(&self, id: &str) -> Option<WitnessRecord> {
        self.witnesses.get(id).cloned()
    }

    fn kind_of(&self, reference: &WitnessRecord) -> DomainKind {
        match reference.kind.as_deref() {
            None | Some("witness") => DomainKind::Witness,
            Some(other) => DomainKind::Other(other.to_string()),
        }
    }
}

impl TextSource for Registry {
    fn external_id(&self, reference: &WitnessRecord) -> String {
        reference.id.clone()
    }

    fn flatten_to_text(&self, reference: &WitnessRecord) -> String {
        reference.text.clone()
    }

    fn is_representative(&self, reference: &WitnessRecord) -> bool {
        reference.representative
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn loads_json_and_jsonl_from_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("a.json"),
            r#"[{"id":"W1","fragment":"F1","text":"mar salgado","representative":true},
                {"id":"W2","fragment":"F1","text":"mar"}]"#,
        )
        .unwrap();
        fs::create_dir(dir.path().join("more")).unwrap();
        fs::write(
            dir.path().join("more/b.jsonl"),
            "{\"id\":\"N1\",\"fragment\":\"F1\",\"text\":\"nota\",\"kind\":\"annotation\"}\n\n",
        )
        .unwrap();
        fs::write(dir.path().join("ignored.txt"), "not json").unwrap();

        let registry = Registry::load(dir.path()).unwrap();
        assert_eq!(registry.len(), 3);
        let ids: Vec<&str> = registry.iter().map(|w| w.id.as_str()).collect();
        assert_eq!(ids, vec!["W1", "W2", "N1"]);
        assert_eq!(registry.fragment("F1"), Some(FragmentRef::new("F1", "W1")));
        assert_eq!(registry.fragment("F9"), None);

        let note = registry.resolve("N1").unwrap();
        assert_eq!(registry.kind_of(&note), DomainKind::Other("annotation".into()));
        let witness = registry.resolve("W2").unwrap();
        assert_eq!(registry.kind_of(&witness), DomainKind::Witness);
        assert!(!registry.is_representative(&witness));
    }

    #[test]
    fn single_object_file_and_replacement() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("one.json");
        fs::write(&path, r#"{"id":"W1","fragment":"F1","text":"first"}"#).unwrap();
        let mut registry = Registry::load(&path).unwrap();
        registry.insert(WitnessRecord {
            id: "W1".into(),
            fragment: "F1".into(),
            text: "second".into(),
            representative: true,
            kind: None,
        });
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.resolve("W1").unwrap().text, "second");
    }

    #[test]
    fn bad_records_are_reported_with_their_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.jsonl");
        fs::write(&path, "{\"id\":\"W1\",\"fragment\":\"F1\",\"text\":\"ok\"}\n{\"id\":\"W2\"}\n").unwrap();
        let err = Registry::load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("bad.jsonl:2"));
        assert!(Registry::load(&dir.path().join("missing")).is_err());
    }
}
