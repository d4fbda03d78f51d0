//! Hierarchical settings and file-content maps
//!
//! Settings are attached at every level of the installation tree and are
//! merged top-down during normalization. Keys are `/`-separated paths
//! (`profiles/default/max_memory_usage`, `config.d/storage.xml`); values are
//! scalars or lists of scalars.

mod section;

use std::collections::BTreeMap;
use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub use section::{filename_from_path, SettingsSection};

/// Merge policy for [`Settings::merge_from`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeType {
    /// Copy a key from the source only when the destination lacks it.
    /// Used for inheritance: a child keeps its own value if set.
    FillEmptyOnly,
    /// Always take the source's value for every key the source has.
    Override,
}

/// A single setting value
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Setting {
    /// Single value
    Scalar(String),
    /// Repeated value, rendered as repeated elements
    Vector(Vec<String>),
}

impl Setting {
    /// Create a scalar setting
    pub fn scalar(value: impl Into<String>) -> Self {
        Self::Scalar(value.into())
    }

    /// True for an empty scalar or an empty list
    pub fn is_empty(&self) -> bool {
        match self {
            Setting::Scalar(s) => s.is_empty(),
            Setting::Vector(v) => v.is_empty(),
        }
    }

    /// Scalar value, if this is a scalar
    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            Setting::Scalar(s) => Some(s),
            Setting::Vector(_) => None,
        }
    }

    /// All values; a scalar yields one
    pub fn values(&self) -> Vec<&str> {
        match self {
            Setting::Scalar(s) => vec![s.as_str()],
            Setting::Vector(v) => v.iter().map(String::as_str).collect(),
        }
    }
}

impl fmt::Display for Setting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Setting::Scalar(s) => f.write_str(s),
            Setting::Vector(v) => write!(f, "[{}]", v.join(",")),
        }
    }
}

impl From<&str> for Setting {
    fn from(value: &str) -> Self {
        Self::Scalar(value.to_string())
    }
}

impl From<String> for Setting {
    fn from(value: String) -> Self {
        Self::Scalar(value)
    }
}

impl Serialize for Setting {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Setting::Scalar(s) => serializer.serialize_str(s),
            Setting::Vector(v) => v.serialize(serializer),
        }
    }
}

/// Wire shapes accepted for a setting value
#[derive(Deserialize)]
#[serde(untagged)]
enum RawScalar {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl RawScalar {
    fn into_string(self) -> String {
        match self {
            RawScalar::Str(s) => s,
            RawScalar::Int(i) => i.to_string(),
            RawScalar::Float(f) => f.to_string(),
            RawScalar::Bool(b) => b.to_string(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawSetting {
    Scalar(RawScalar),
    Vector(Vec<RawScalar>),
}

impl<'de> Deserialize<'de> for Setting {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match RawSetting::deserialize(deserializer)? {
            RawSetting::Scalar(s) => Setting::Scalar(s.into_string()),
            RawSetting::Vector(v) => {
                Setting::Vector(v.into_iter().map(RawScalar::into_string).collect())
            }
        })
    }
}

/// Normalize a settings path: trim whitespace and drop empty segments
pub fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Ordered path → value mapping
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Settings(BTreeMap<String, Setting>);

impl Settings {
    /// Create an empty settings map
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if there are no entries
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Look up a setting by path
    pub fn get(&self, path: &str) -> Option<&Setting> {
        self.0.get(&normalize_path(path))
    }

    /// True if the path is set
    pub fn has(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Set a value, replacing any previous value at the same path
    pub fn set(&mut self, path: &str, setting: impl Into<Setting>) {
        self.0.insert(normalize_path(path), setting.into());
    }

    /// Builder-style [`Settings::set`]
    pub fn with(mut self, path: &str, setting: impl Into<Setting>) -> Self {
        self.set(path, setting);
        self
    }

    /// Iterate entries in path order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Setting)> {
        self.0.iter()
    }

    /// Merge `src` into `self` under the given policy.
    ///
    /// Idempotent: merging the same source twice yields the same result as
    /// merging it once.
    pub fn merge_from(&mut self, src: &Settings, merge: MergeType) {
        for (path, setting) in &src.0 {
            match merge {
                MergeType::FillEmptyOnly => {
                    self.0
                        .entry(path.clone())
                        .or_insert_with(|| setting.clone());
                }
                MergeType::Override => {
                    self.0.insert(path.clone(), setting.clone());
                }
            }
        }
    }

    /// Merge from `src` only the entries accepted by `filter`.
    ///
    /// Accepted entries fill empty slots only; the destination's own values
    /// win.
    pub fn merge_from_cb<F>(&mut self, src: &Settings, filter: F)
    where
        F: Fn(&str, &Setting) -> bool,
    {
        for (path, setting) in &src.0 {
            if filter(path, setting) && !self.0.contains_key(path) {
                self.0.insert(path.clone(), setting.clone());
            }
        }
    }

    /// Entries belonging to `section`, keyed by file name.
    ///
    /// With `include_unspecified`, entries whose path names no section are
    /// included too.
    pub fn section(
        &self,
        section: SettingsSection,
        include_unspecified: bool,
    ) -> BTreeMap<String, String> {
        let mut files = BTreeMap::new();
        for (path, setting) in &self.0 {
            let matches = match SettingsSection::from_path(path) {
                Ok(s) => s == section,
                Err(_) => include_unspecified,
            };
            if !matches {
                continue;
            }
            if let (Some(name), Some(content)) = (filename_from_path(path), setting.as_scalar()) {
                files.insert(name.to_string(), content.to_string());
            }
        }
        files
    }
}

impl FromIterator<(String, Setting)> for Settings {
    fn from_iter<T: IntoIterator<Item = (String, Setting)>>(iter: T) -> Self {
        let mut settings = Settings::new();
        for (path, setting) in iter {
            settings.set(&path, setting);
        }
        settings
    }
}

impl Serialize for Settings {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Settings {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<String, Setting>::deserialize(deserializer)?;
        Ok(raw.into_iter().collect())
    }
}

impl JsonSchema for Settings {
    fn schema_name() -> String {
        "Settings".to_string()
    }

    fn json_schema(_gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
        // Values are free-form scalars or lists; let the API server keep them
        let mut schema = schemars::schema::SchemaObject {
            instance_type: Some(schemars::schema::InstanceType::Object.into()),
            ..Default::default()
        };
        schema.extensions.insert(
            "x-kubernetes-preserve-unknown-fields".to_string(),
            serde_json::Value::Bool(true),
        );
        schemars::schema::Schema::Object(schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn settings(pairs: &[(&str, &str)]) -> Settings {
        pairs.iter().fold(Settings::new(), |s, (k, v)| s.with(k, *v))
    }

    #[rstest]
    #[case::fill_empty_only(MergeType::FillEmptyOnly, "2")]
    #[case::overriding(MergeType::Override, "20")]
    fn merge_policy_decides_conflicts(#[case] merge: MergeType, #[case] expected_b: &str) {
        let mut dst = settings(&[("a", "1"), ("b", "2")]);
        let src = settings(&[("b", "20"), ("c", "30")]);

        dst.merge_from(&src, merge);

        assert_eq!(dst.len(), 3);
        assert_eq!(dst.get("a"), Some(&Setting::scalar("1")), "destination-only key kept");
        assert_eq!(dst.get("b"), Some(&Setting::scalar(expected_b)));
        assert_eq!(dst.get("c"), Some(&Setting::scalar("30")), "absent key filled");
    }

    #[rstest]
    #[case::fill_empty_only(MergeType::FillEmptyOnly)]
    #[case::overriding(MergeType::Override)]
    fn merge_is_idempotent(#[case] merge: MergeType) {
        let base = settings(&[("a", "1")]);
        let src = settings(&[("a", "9"), ("z", "26")]);

        let mut once = base.clone();
        once.merge_from(&src, merge);
        let mut twice = once.clone();
        twice.merge_from(&src, merge);

        assert_eq!(once, twice);
    }

    #[rstest]
    #[case::fill_empty_only(MergeType::FillEmptyOnly)]
    #[case::overriding(MergeType::Override)]
    fn merging_an_empty_source_changes_nothing(#[case] merge: MergeType) {
        let mut dst = settings(&[("a", "1")]);
        dst.merge_from(&Settings::new(), merge);
        assert_eq!(dst, settings(&[("a", "1")]));
    }

    #[test]
    fn merge_from_cb_filters_by_path() {
        let mut dst = settings(&[("host/own.xml", "mine")]);
        let src = settings(&[
            ("host/own.xml", "parent"),
            ("host/extra.xml", "<x/>"),
            ("common/skip.xml", "<y/>"),
        ]);

        dst.merge_from_cb(&src, |path, _| {
            matches!(SettingsSection::from_path(path), Ok(SettingsSection::Host))
        });

        assert_eq!(dst.len(), 2);
        assert_eq!(dst.get("host/own.xml"), Some(&Setting::scalar("mine")));
        assert_eq!(dst.get("host/extra.xml"), Some(&Setting::scalar("<x/>")));
        assert!(!dst.has("common/skip.xml"));
    }

    #[test]
    fn paths_are_normalized() {
        let s = Settings::new().with("/profiles//default/ max_threads /", "8");
        assert!(s.has("profiles/default/max_threads"));
    }

    #[test]
    fn deserializes_scalars_and_lists() {
        let s: Settings = serde_json::from_value(serde_json::json!({
            "max_threads": 8,
            "compression": true,
            "ratio": 0.5,
            "name": "x",
            "networks/ip": ["::1", "127.0.0.1"]
        }))
        .unwrap();

        assert_eq!(s.get("max_threads"), Some(&Setting::scalar("8")));
        assert_eq!(s.get("compression"), Some(&Setting::scalar("true")));
        assert_eq!(s.get("ratio"), Some(&Setting::scalar("0.5")));
        assert_eq!(
            s.get("networks/ip"),
            Some(&Setting::Vector(vec!["::1".into(), "127.0.0.1".into()]))
        );
    }

    #[test]
    fn section_collects_files_by_name() {
        let files = settings(&[
            ("config.d/a.xml", "<a/>"),
            ("COMMON/b.xml", "<b/>"),
            ("users.d/u.xml", "<u/>"),
            ("plain.xml", "<p/>"),
        ]);

        let common = files.section(SettingsSection::Common, true);
        assert_eq!(common.len(), 3);
        assert_eq!(common.get("a.xml").map(String::as_str), Some("<a/>"));
        assert_eq!(common.get("plain.xml").map(String::as_str), Some("<p/>"));

        let users = files.section(SettingsSection::Users, false);
        assert_eq!(users.keys().collect::<Vec<_>>(), vec!["u.xml"]);
    }
}
