//! Test catalog loading, validation and serialization.
//!
//! A catalog is read once at startup from JSON or TOML and is immutable
//! afterwards. JSON catalogs may be a bare array of tests or an object with a
//! `tests` field; TOML catalogs use a `[[tests]]` array of tables.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::dispatcher::RESERVED_COMMANDS;
use crate::error::CatalogError;
use crate::model::{DiagnosticQuestion, DiagnosticTest};
use crate::scoring::{EvaluationRule, ScoreBand};

/// On-disk shape of a catalog.
#[derive(Debug, Serialize, Deserialize)]
struct CatalogFile {
    tests: Vec<RawTest>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RawTest {
    id: String,
    #[serde(alias = "testName")]
    test_name: String,
    #[serde(default)]
    questions: Vec<RawQuestion>,
    #[serde(default)]
    evaluation: Vec<ScoreBand>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RawQuestion {
    #[serde(alias = "questionText")]
    question_text: String,
    #[serde(alias = "possibleAnswers")]
    possible_answers: Vec<String>,
    #[serde(alias = "parameterName")]
    parameter_name: String,
    #[serde(alias = "answerValues", default)]
    answer_values: BTreeMap<String, i64>,
}

/// Supported catalog file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogFormat {
    Json,
    Toml,
}

impl CatalogFormat {
    /// Pick the format from a file extension.
    pub fn from_path(path: &Path) -> Result<Self, CatalogError> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Ok(CatalogFormat::Json),
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Ok(CatalogFormat::Toml),
            _ => Err(CatalogError::UnsupportedFormat(path.display().to_string())),
        }
    }
}

/// The immutable set of tests the bot can run.
#[derive(Debug, Clone)]
pub struct Catalog {
    tests: Vec<Arc<DiagnosticTest>>,
}

impl Catalog {
    /// Build a catalog, rejecting empty catalogs, duplicate ids and ids
    /// that would be shadowed by a built-in command.
    pub fn new(tests: Vec<DiagnosticTest>) -> Result<Self, CatalogError> {
        if tests.is_empty() {
            return Err(CatalogError::Empty);
        }

        let mut seen = HashSet::new();
        for test in &tests {
            if RESERVED_COMMANDS
                .iter()
                .any(|command| command.eq_ignore_ascii_case(test.id()))
            {
                return Err(CatalogError::ReservedTestId(test.id().to_string()));
            }
            if !seen.insert(test.id().to_lowercase()) {
                return Err(CatalogError::DuplicateTestId(test.id().to_string()));
            }
        }

        Ok(Self {
            tests: tests.into_iter().map(Arc::new).collect(),
        })
    }

    /// Load and validate a catalog file.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let format = CatalogFormat::from_path(path)?;
        let content = std::fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let catalog = Self::parse(&content, format)?;
        tracing::info!("loaded {} test(s) from {}", catalog.len(), path.display());
        Ok(catalog)
    }

    pub fn parse(content: &str, format: CatalogFormat) -> Result<Self, CatalogError> {
        match format {
            CatalogFormat::Json => Self::from_json_str(content),
            CatalogFormat::Toml => Self::from_toml_str(content),
        }
    }

    pub fn from_json_str(content: &str) -> Result<Self, CatalogError> {
        let root: serde_json::Value =
            serde_json::from_str(content).map_err(|e| CatalogError::Parse(e.to_string()))?;

        let tests = match root {
            serde_json::Value::Object(mut map) => map.remove("tests").ok_or_else(|| {
                CatalogError::Parse("catalog object has no `tests` field".into())
            })?,
            array @ serde_json::Value::Array(_) => array,
            _ => {
                return Err(CatalogError::Parse(
                    "expected an array of tests or an object with a `tests` field".into(),
                ))
            }
        };
        let raw: Vec<RawTest> =
            serde_json::from_value(tests).map_err(|e| CatalogError::Parse(e.to_string()))?;

        Self::from_raw(raw)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile =
            toml::from_str(content).map_err(|e| CatalogError::Parse(e.to_string()))?;
        Self::from_raw(file.tests)
    }

    fn from_raw(raw: Vec<RawTest>) -> Result<Self, CatalogError> {
        let tests = raw
            .into_iter()
            .map(|t| {
                let questions = t
                    .questions
                    .into_iter()
                    .enumerate()
                    .map(|(index, q)| {
                        let values: HashMap<String, i64> = q.answer_values.into_iter().collect();
                        DiagnosticQuestion::new(
                            q.question_text,
                            q.parameter_name,
                            q.possible_answers,
                            &values,
                        )
                        .map_err(|defect| CatalogError::question(&t.id, index + 1, defect))
                    })
                    .collect::<Result<Vec<_>, _>>()?;

                DiagnosticTest::new(
                    t.id,
                    t.test_name,
                    questions,
                    EvaluationRule::new(t.evaluation),
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(tests)
    }

    fn to_raw(&self) -> CatalogFile {
        let tests = self
            .tests
            .iter()
            .map(|t| RawTest {
                id: t.id().to_string(),
                test_name: t.name().to_string(),
                questions: t
                    .questions()
                    .iter()
                    .map(|q| RawQuestion {
                        question_text: q.prompt().to_string(),
                        possible_answers: q.labels().map(str::to_string).collect(),
                        parameter_name: q.parameter().to_string(),
                        answer_values: q
                            .answers()
                            .iter()
                            .map(|a| (a.label.clone(), a.value))
                            .collect(),
                    })
                    .collect(),
                evaluation: t.evaluation().bands().to_vec(),
            })
            .collect();
        CatalogFile { tests }
    }

    pub fn to_json_string(&self) -> Result<String, CatalogError> {
        serde_json::to_string_pretty(&self.to_raw())
            .map_err(|e| CatalogError::Serialize(e.to_string()))
    }

    pub fn to_toml_string(&self) -> Result<String, CatalogError> {
        toml::to_string(&self.to_raw()).map_err(|e| CatalogError::Serialize(e.to_string()))
    }

    /// Write the catalog in the format implied by `path`'s extension.
    pub fn save(&self, path: &Path) -> Result<(), CatalogError> {
        let content = match CatalogFormat::from_path(path)? {
            CatalogFormat::Json => self.to_json_string()?,
            CatalogFormat::Toml => self.to_toml_string()?,
        };
        std::fs::write(path, content).map_err(|source| CatalogError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn tests(&self) -> &[Arc<DiagnosticTest>] {
        &self.tests
    }

    pub fn len(&self) -> usize {
        self.tests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    /// Look up a test by id, ignoring case.
    pub fn get(&self, id: &str) -> Option<&Arc<DiagnosticTest>> {
        self.tests.iter().find(|t| t.id().eq_ignore_ascii_case(id))
    }

    /// Look up a test by id, falling back to a substring of its name.
    pub fn find(&self, query: &str) -> Option<&Arc<DiagnosticTest>> {
        let query = query.trim();
        if query.is_empty() {
            return None;
        }
        self.get(query).or_else(|| {
            let needle = query.to_lowercase();
            self.tests
                .iter()
                .find(|t| t.name().to_lowercase().contains(&needle))
        })
    }

    /// Non-fatal issues worth pointing out to whoever maintains the catalog.
    pub fn lint(&self) -> Vec<CatalogWarning> {
        let mut warnings = Vec::new();

        let mut names = HashSet::new();
        for test in &self.tests {
            if !names.insert(test.name().to_lowercase()) {
                warnings.push(CatalogWarning {
                    test_id: Some(test.id().to_string()),
                    message: format!("test name '{}' is used more than once", test.name()),
                });
            }
        }

        for test in &self.tests {
            for parameter in test.shared_parameters() {
                warnings.push(CatalogWarning {
                    test_id: Some(test.id().to_string()),
                    message: format!(
                        "parameter '{parameter}' is scored by several questions; only the last answer counts"
                    ),
                });
            }

            for band in test.unreachable_bands() {
                warnings.push(CatalogWarning {
                    test_id: Some(test.id().to_string()),
                    message: format!(
                        "band {}..={} ('{}') can never be reached",
                        band.min, band.max, band.diagnosis
                    ),
                });
            }

            if test.question_count() == 0 {
                warnings.push(CatalogWarning {
                    test_id: Some(test.id().to_string()),
                    message: "test has no questions".into(),
                });
            }
        }

        warnings
    }
}

/// A warning from catalog linting.
#[derive(Debug, Clone)]
pub struct CatalogWarning {
    /// The test ID (if applicable).
    pub test_id: Option<String>,
    /// Warning message.
    pub message: String,
}
