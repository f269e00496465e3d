//! Scope and import resolution.
//!
//! Turns parsed documents into a [`ResolvedSchema`]: a single shared
//! definition table in which every `NamedReference`/`ScopedReference` has
//! been rewritten to a `Link` index. References resolve to shared slots,
//! never to copies, so mutually recursive definitions form a graph and
//! resolution terminates.
//!
//! Imports are loaded relative to the importing file. Each file on the
//! active load stack is tracked by canonical path; importing a file that is
//! already on the stack is a cycle error. A file reachable along several
//! import routes (diamond) is resolved once and shares its table slots.

use crate::parser::{self, ParseError};
use crate::schema::{DefId, Document, Schema};
use crate::validator::{validate, ValidationError, ValidationResult, Violation};
use crate::value::Value;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// A resolution or load failure. Fail-fast: one error per resolve call.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: ParseError,
    },
    #[error("failed to load import {path}")]
    Import {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("circular import through {path}")]
    ImportCycle { path: PathBuf },
    #[error("unresolved reference \"{name}\" in {file}")]
    UnresolvedReference { name: String, file: PathBuf },
}

/// A document with every reference rewritten into the shared table.
///
/// `names` addresses local definitions by name, imported roots by their
/// alias, and imported definitions as `alias.member`.
#[derive(Clone, Debug)]
pub struct ResolvedSchema {
    pub table: Vec<Schema>,
    pub names: IndexMap<String, DefId>,
    pub root: Option<Schema>,
}

impl ResolvedSchema {
    pub fn schema(&self, name: &str) -> Option<&Schema> {
        self.names.get(name).map(|id| &self.table[id.0])
    }

    /// Validate against the root. A schema without a root line yields a
    /// single diagnostic instead of panicking.
    pub fn validate(&self, value: &Value) -> ValidationResult {
        match &self.root {
            Some(root) => validate(value, root, &self.table),
            None => ValidationResult {
                errors: vec![ValidationError {
                    path: Default::default(),
                    violation: Violation::ShapeMismatch("schema has no root".to_string()),
                }],
            },
        }
    }

    /// Validate against a named definition; `None` if the name is unknown.
    pub fn validate_named(&self, name: &str, value: &Value) -> Option<ValidationResult> {
        let id = *self.names.get(name)?;
        Some(validate(value, &Schema::Link(id), &self.table))
    }
}

// ------------------------------- Loader ------------------------------------ //

/// Explicit loader value; no global state, so independent loads stay
/// isolated and testable.
#[derive(Clone, Copy, Debug, Default)]
pub struct SchemaLoader;

impl SchemaLoader {
    pub fn new() -> Self {
        SchemaLoader
    }

    /// Read and parse one file, without following its imports.
    pub fn load_schema_at_path(&self, path: impl AsRef<Path>) -> Result<Document, LoadError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| LoadError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        parser::parse_document(&text).map_err(|e| LoadError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Load `path`, recursively load its imports, and rewrite every
    /// reference into one shared table.
    pub fn load_and_resolve(&self, path: impl AsRef<Path>) -> Result<ResolvedSchema, LoadError> {
        let mut resolve = Resolve {
            loader: *self,
            table: Vec::new(),
            done: HashMap::new(),
            visiting: Vec::new(),
        };
        let surface = resolve.file(path.as_ref())?;
        Ok(ResolvedSchema {
            table: resolve.table,
            names: surface.names,
            root: surface.root.map(Schema::Link),
        })
    }
}

/// What one resolved file exposes to its importers.
#[derive(Clone, Debug)]
struct FileSurface {
    /// Slot holding the file's root, if it has a root line.
    root: Option<DefId>,
    /// Local definitions only; importers address these as `alias.member`.
    members: IndexMap<String, DefId>,
    /// The file's full name environment (locals, aliases, `alias.member`).
    names: IndexMap<String, DefId>,
}

/// State for one `load_and_resolve` call.
struct Resolve {
    loader: SchemaLoader,
    table: Vec<Schema>,
    /// canonical path -> surface; diamond imports resolve once.
    done: HashMap<PathBuf, FileSurface>,
    /// canonical paths on the active load stack, for cycle detection.
    visiting: Vec<PathBuf>,
}

impl Resolve {
    fn file(&mut self, path: &Path) -> Result<FileSurface, LoadError> {
        let canonical = fs::canonicalize(path).map_err(|e| LoadError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        if let Some(surface) = self.done.get(&canonical) {
            return Ok(surface.clone());
        }
        if self.visiting.contains(&canonical) {
            return Err(LoadError::ImportCycle { path: canonical });
        }
        self.visiting.push(canonical.clone());
        let result = self.file_inner(path, &canonical);
        self.visiting.pop();
        let surface = result?;
        self.done.insert(canonical, surface.clone());
        Ok(surface)
    }

    fn file_inner(&mut self, path: &Path, canonical: &Path) -> Result<FileSurface, LoadError> {
        let doc = self.loader.load_schema_at_path(path)?;
        let dir = path.parent().unwrap_or(Path::new(""));

        // Imports first, so the environment can link to their slots.
        let mut names: IndexMap<String, DefId> = IndexMap::new();
        for (alias, rel) in &doc.imports {
            let target = dir.join(rel);
            let imported = match self.file(&target) {
                Err(LoadError::Io { path, source }) => {
                    return Err(LoadError::Import { path, source });
                }
                other => other?,
            };
            if let Some(root_id) = imported.root {
                names.insert(alias.clone(), root_id);
            }
            for (member, id) in &imported.members {
                names.insert(format!("{alias}.{member}"), *id);
            }
        }

        // Allocate slots up front so definitions can reference each other
        // (and themselves) in any order.
        let mut members: IndexMap<String, DefId> = IndexMap::new();
        for name in doc.definitions.keys() {
            let id = self.alloc();
            members.insert(name.clone(), id);
            names.insert(name.clone(), id);
        }
        let root_id = doc.root.as_ref().map(|_| self.alloc());

        for (name, schema) in doc.definitions {
            let id = members[&name];
            self.table[id.0] = rewrite(schema, &names, canonical)?;
        }
        if let (Some(id), Some(root)) = (root_id, doc.root) {
            self.table[id.0] = rewrite(root, &names, canonical)?;
        }

        Ok(FileSurface {
            root: root_id,
            members,
            names,
        })
    }

    fn alloc(&mut self) -> DefId {
        let id = DefId(self.table.len());
        self.table.push(Schema::Fail);
        id
    }
}

/// Rewrite every reference in `s` to a `Link` via the file's environment.
fn rewrite(
    s: Schema,
    env: &IndexMap<String, DefId>,
    file: &Path,
) -> Result<Schema, LoadError> {
    let unresolved = |name: String| LoadError::UnresolvedReference {
        name,
        file: file.to_path_buf(),
    };
    Ok(match s {
        Schema::NamedReference(name) => match env.get(&name) {
            Some(id) => Schema::Link(*id),
            None => return Err(unresolved(name)),
        },
        Schema::ScopedReference(scope, name) => {
            let key = format!("{scope}.{name}");
            match env.get(&key) {
                Some(id) => Schema::Link(*id),
                None => return Err(unresolved(key)),
            }
        }
        Schema::Tuple(items) => Schema::Tuple(
            items
                .into_iter()
                .map(|x| rewrite(x, env, file))
                .collect::<Result<_, _>>()?,
        ),
        Schema::ListOf(inner, c) => Schema::ListOf(Box::new(rewrite(*inner, env, file)?), c),
        Schema::Object { fields, rest } => Schema::Object {
            fields: fields
                .into_iter()
                .map(|mut f| {
                    f.schema = rewrite(f.schema, env, file)?;
                    Ok(f)
                })
                .collect::<Result<_, LoadError>>()?,
            rest: match rest {
                Some(inner) => Some(Box::new(rewrite(*inner, env, file)?)),
                None => None,
            },
        },
        Schema::Map(inner) => Schema::Map(Box::new(rewrite(*inner, env, file)?)),
        Schema::Alternative(branches) => Schema::Alternative(
            branches
                .into_iter()
                .map(|x| rewrite(x, env, file))
                .collect::<Result<_, _>>()?,
        ),
        Schema::Documented(doc, inner) => {
            Schema::Documented(doc, Box::new(rewrite(*inner, env, file)?))
        }
        Schema::Deprecated(inner) => Schema::Deprecated(Box::new(rewrite(*inner, env, file)?)),
        leaf => leaf,
    })
}

// -------------------------------- Tests ------------------------------------ //

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Decoder, JsonDecoder};
    use std::fs;

    fn write(dir: &Path, name: &str, text: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, text).unwrap();
        path
    }

    fn json(text: &str) -> Value {
        JsonDecoder.decode(text).unwrap()
    }

    #[test]
    fn local_references_resolve_to_links() {
        let dir = tempfile::tempdir().unwrap();
        let main = write(
            dir.path(),
            "main.rengbis",
            "item = { id: text }\n= item*\n",
        );
        let rs = SchemaLoader::new().load_and_resolve(&main).unwrap();
        assert!(rs.names.contains_key("item"));
        assert!(rs.validate(&json(r#"[{"id":"a"},{"id":"b"}]"#)).is_valid());
        assert!(!rs.validate(&json(r#"[{"id":1}]"#)).is_valid());
    }

    #[test]
    fn imports_register_alias_root_and_members() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "common.rengbis",
            "address = { city: text }\n= { version: number }\n",
        );
        let main = write(
            dir.path(),
            "main.rengbis",
            "common => import \"common.rengbis\"\n= { home: common.address, meta: common }\n",
        );
        let rs = SchemaLoader::new().load_and_resolve(&main).unwrap();
        assert!(rs.names.contains_key("common"));
        assert!(rs.names.contains_key("common.address"));
        let ok = rs.validate(&json(
            r#"{"home":{"city":"Oslo"},"meta":{"version":2}}"#,
        ));
        assert!(ok.is_valid(), "{:?}", ok.errors);
    }

    #[test]
    fn unresolved_reference_names_the_identifier_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let main = write(dir.path(), "main.rengbis", "= missing\n");
        let err = SchemaLoader::new().load_and_resolve(&main).unwrap_err();
        let LoadError::UnresolvedReference { name, file } = err else {
            panic!("expected UnresolvedReference, got {err:?}");
        };
        assert_eq!(name, "missing");
        assert!(file.ends_with("main.rengbis"));
    }

    #[test]
    fn missing_import_target_is_an_import_error() {
        let dir = tempfile::tempdir().unwrap();
        let main = write(
            dir.path(),
            "main.rengbis",
            "x => import \"nowhere.rengbis\"\n= x\n",
        );
        let err = SchemaLoader::new().load_and_resolve(&main).unwrap_err();
        assert!(matches!(err, LoadError::Import { .. }));
    }

    #[test]
    fn circular_imports_are_detected() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "a.rengbis",
            "b => import \"b.rengbis\"\n= b\n",
        );
        let main = write(
            dir.path(),
            "b.rengbis",
            "a => import \"a.rengbis\"\n= a\n",
        );
        let err = SchemaLoader::new().load_and_resolve(&main).unwrap_err();
        assert!(matches!(err, LoadError::ImportCycle { .. }));
    }

    #[test]
    fn diamond_imports_share_one_set_of_slots() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "d.rengbis", "unit = text\n= unit\n");
        write(
            dir.path(),
            "b.rengbis",
            "d => import \"d.rengbis\"\n= d.unit\n",
        );
        write(
            dir.path(),
            "c.rengbis",
            "d => import \"d.rengbis\"\n= d.unit\n",
        );
        let main = write(
            dir.path(),
            "a.rengbis",
            "b => import \"b.rengbis\"\nc => import \"c.rengbis\"\n= { left: b, right: c }\n",
        );
        let rs = SchemaLoader::new().load_and_resolve(&main).unwrap();
        // d contributes 2 slots (unit + root), b and c one root slot
        // each, a one root slot: 5 total, with d not duplicated.
        assert_eq!(rs.table.len(), 5);
        assert!(rs
            .validate(&json(r#"{"left":"x","right":"y"}"#))
            .is_valid());
    }

    #[test]
    fn mutually_recursive_definitions_resolve_and_validate() {
        let dir = tempfile::tempdir().unwrap();
        let main = write(
            dir.path(),
            "main.rengbis",
            "node = { value: number, next?: chain }\nchain = node*\n= node\n",
        );
        let rs = SchemaLoader::new().load_and_resolve(&main).unwrap();
        let ok = rs.validate(&json(
            r#"{"value":1,"next":[{"value":2,"next":[]}]}"#,
        ));
        assert!(ok.is_valid(), "{:?}", ok.errors);
        let bad = rs.validate(&json(r#"{"value":1,"next":[{"value":"x"}]}"#));
        assert_eq!(bad.errors[0].path.to_string(), "$.next[0].value");
    }

    #[test]
    fn validate_named_addresses_definitions_directly() {
        let dir = tempfile::tempdir().unwrap();
        let main = write(
            dir.path(),
            "main.rengbis",
            "age = number [ value >= 0 ]\n= { age: age }\n",
        );
        let rs = SchemaLoader::new().load_and_resolve(&main).unwrap();
        assert!(rs.validate_named("age", &json("3")).unwrap().is_valid());
        assert!(!rs.validate_named("age", &json("-1")).unwrap().is_valid());
        assert!(rs.validate_named("nope", &json("3")).is_none());
    }
}
