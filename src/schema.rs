//! Validation adapter.
//!
//! A [`Schema`] turns one class of raw request input into a typed value, or
//! into an ordered list of [`Issue`]s that is serialized straight into the
//! 400 response. The pipeline does not care which validation approach sits
//! behind the trait.
//!
//! Two schemas ship with the crate:
//!
//! - [`typed::<T>()`](typed) deserializes with serde. Pair-shaped input
//!   (route params, query strings, form bodies) goes through
//!   `serde_urlencoded`, so `"true"` becomes a `bool` and `"10"` a `u32`.
//!   `#[serde(default)]` handles defaulting.
//! - [`from_fn`] wraps a closure for hand-written checks.
//!
//! Either can be narrowed further with [`Schema::refine`]:
//!
//! ```rust
//! use tollgate::schema::{self, Issue, Schema};
//! # #[derive(serde::Deserialize)] struct ById { id: String }
//!
//! let by_id = schema::typed::<ById>().refine(|p| {
//!     if p.id.chars().all(|c| c.is_ascii_digit()) {
//!         Ok(())
//!     } else {
//!         Err(Issue::new("id must be numeric").at("id"))
//!     }
//! });
//! ```

use std::fmt;
use std::marker::PhantomData;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use serde_path_to_error::Segment;

// ── Raw input ─────────────────────────────────────────────────────────────────

/// Raw input as handed to a schema.
#[derive(Clone, Copy, Debug)]
pub enum Raw<'a> {
    /// Ordered `(name, value)` pairs: route params, query string, form body.
    Pairs(&'a [(String, String)]),
    /// A parsed JSON body. An empty body is `Value::Null`.
    Json(&'a Value),
}

impl Raw<'_> {
    /// JSON view of the input. Pairs become an object of strings; a repeated
    /// name keeps its last value.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Json(v) => (*v).clone(),
            Self::Pairs(pairs) => Value::Object(
                pairs.iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect::<Map<_, _>>(),
            ),
        }
    }
}

// ── Issues ────────────────────────────────────────────────────────────────────

/// One step of an issue path: an object key or an array index.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self { Self::Key(key.to_owned()) }
}

impl From<String> for PathSegment {
    fn from(key: String) -> Self { Self::Key(key) }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self { Self::Index(index) }
}

/// A single validation problem: where it is, and what is wrong.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Issue {
    pub path: Vec<PathSegment>,
    pub message: String,
}

impl Issue {
    /// An issue at the root of the input.
    pub fn new(message: impl Into<String>) -> Self {
        Self { path: Vec::new(), message: message.into() }
    }

    /// Appends one segment to the path.
    pub fn at(mut self, segment: impl Into<PathSegment>) -> Self {
        self.path.push(segment.into());
        self
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            return f.write_str(&self.message);
        }
        for (i, seg) in self.path.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            match seg {
                PathSegment::Key(k) => f.write_str(k)?,
                PathSegment::Index(n) => write!(f, "{n}")?,
            }
        }
        write!(f, ": {}", self.message)
    }
}

// ── Schema ────────────────────────────────────────────────────────────────────

/// Parses one input class into a typed value.
///
/// Schemas are attached once at startup and shared by every request, hence
/// `Send + Sync + 'static`. `validate` must not have side effects.
pub trait Schema: Send + Sync + 'static {
    type Output: Send + Sync + 'static;

    fn validate(&self, raw: Raw<'_>) -> Result<Self::Output, Vec<Issue>>;

    /// Runs `check` on the parsed value; an `Err` becomes the only issue.
    fn refine<F>(self, check: F) -> Refine<Self, F>
    where
        Self: Sized,
        F: Fn(&Self::Output) -> Result<(), Issue> + Send + Sync + 'static,
    {
        Refine { inner: self, check }
    }
}

/// Serde-backed schema. See [`typed`].
pub struct Typed<T>(PhantomData<fn() -> T>);

/// A schema that deserializes the input into `T`.
pub fn typed<T: DeserializeOwned>() -> Typed<T> {
    Typed(PhantomData)
}

impl<T> Schema for Typed<T>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    type Output = T;

    fn validate(&self, raw: Raw<'_>) -> Result<T, Vec<Issue>> {
        match raw {
            Raw::Pairs(pairs) => {
                // Re-encode so serde_urlencoded's string-to-scalar coercion applies.
                let encoded = serde_urlencoded::to_string(pairs)
                    .map_err(|e| vec![Issue::new(e.to_string())])?;
                let de = serde_urlencoded::Deserializer::new(form_urlencoded::parse(encoded.as_bytes()));
                serde_path_to_error::deserialize(de).map_err(|e| vec![issue_from_serde(e)])
            }
            Raw::Json(value) => {
                serde_path_to_error::deserialize(value).map_err(|e| vec![issue_from_serde(e)])
            }
        }
    }
}

/// Builds an issue at the path where deserialization stopped.
///
/// Missing and unknown fields fail on the enclosing struct, so serde reports
/// them as ``missing field `x` `` at the struct's path; the field name is
/// lifted out of the message and appended.
fn issue_from_serde<E: fmt::Display>(err: serde_path_to_error::Error<E>) -> Issue {
    let mut issue = Issue::new(err.inner().to_string());
    for segment in err.path().iter() {
        issue = match segment {
            Segment::Seq { index } => issue.at(*index),
            Segment::Map { key } => issue.at(key.as_str()),
            Segment::Enum { variant } => issue.at(variant.as_str()),
            _ => issue,
        };
    }

    let field = ["missing field `", "unknown field `"].iter().find_map(|prefix| {
        let rest = issue.message.strip_prefix(prefix)?;
        rest.split_once('`').map(|(name, _)| name.to_owned())
    });
    match field {
        Some(name) if issue.path.last() != Some(&PathSegment::Key(name.clone())) => issue.at(name),
        _ => issue,
    }
}

/// Closure-backed schema. See [`from_fn`].
pub struct FnSchema<F>(F);

/// A schema from a plain function.
///
/// ```rust
/// use tollgate::schema::{self, Issue, Raw};
///
/// let positive = schema::from_fn(|raw: Raw<'_>| match raw.to_json() {
///     serde_json::Value::Number(n) if n.as_u64().is_some_and(|n| n > 0) => Ok(n.as_u64()),
///     _ => Err(vec![Issue::new("expected a positive integer")]),
/// });
/// ```
pub fn from_fn<F, T>(f: F) -> FnSchema<F>
where
    F: Fn(Raw<'_>) -> Result<T, Vec<Issue>> + Send + Sync + 'static,
    T: Send + Sync + 'static,
{
    FnSchema(f)
}

impl<F, T> Schema for FnSchema<F>
where
    F: Fn(Raw<'_>) -> Result<T, Vec<Issue>> + Send + Sync + 'static,
    T: Send + Sync + 'static,
{
    type Output = T;

    fn validate(&self, raw: Raw<'_>) -> Result<T, Vec<Issue>> {
        (self.0)(raw)
    }
}

/// A schema narrowed by a post-parse check. See [`Schema::refine`].
pub struct Refine<S, F> {
    inner: S,
    check: F,
}

impl<S, F> Schema for Refine<S, F>
where
    S: Schema,
    F: Fn(&S::Output) -> Result<(), Issue> + Send + Sync + 'static,
{
    type Output = S::Output;

    fn validate(&self, raw: Raw<'_>) -> Result<S::Output, Vec<Issue>> {
        let value = self.inner.validate(raw)?;
        (self.check)(&value).map_err(|issue| vec![issue])?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Listing {
        #[serde(default)]
        archived: bool,
        limit: u32,
    }

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect()
    }

    #[test]
    fn pairs_are_coerced() {
        let raw = pairs(&[("archived", "true"), ("limit", "10")]);
        let listing = typed::<Listing>().validate(Raw::Pairs(&raw)).unwrap();
        assert_eq!(listing, Listing { archived: true, limit: 10 });
    }

    #[test]
    fn defaults_apply() {
        let raw = pairs(&[("limit", "5")]);
        let listing = typed::<Listing>().validate(Raw::Pairs(&raw)).unwrap();
        assert!(!listing.archived);
    }

    #[test]
    fn missing_field_points_at_the_field() {
        let issues = typed::<Listing>().validate(Raw::Pairs(&[])).unwrap_err();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].path, vec![PathSegment::from("limit")]);
    }

    #[test]
    fn json_input_is_not_coerced() {
        let body = json!({ "limit": "10" });
        let issues = typed::<Listing>().validate(Raw::Json(&body)).unwrap_err();
        assert!(issues[0].message.contains("invalid type"));
        assert_eq!(issues[0].path, vec![PathSegment::from("limit")]);
    }

    #[test]
    fn mistyped_pair_points_at_the_field() {
        let raw = pairs(&[("limit", "nope")]);
        let issues = typed::<Listing>().validate(Raw::Pairs(&raw)).unwrap_err();
        assert_eq!(issues, vec![Issue::new("invalid digit found in string").at("limit")]);
    }

    #[test]
    fn nested_json_paths_are_reported() {
        #[derive(Debug, Deserialize)]
        struct Order {
            #[allow(dead_code)]
            lines: Vec<Listing>,
        }

        let body = json!({ "lines": [{ "limit": 1 }, { "limit": -3 }] });
        let issues = typed::<Order>().validate(Raw::Json(&body)).unwrap_err();
        assert_eq!(issues[0].path, vec![
            PathSegment::from("lines"),
            PathSegment::from(1),
            PathSegment::from("limit"),
        ]);

        let body = json!({ "lines": [{}] });
        let issues = typed::<Order>().validate(Raw::Json(&body)).unwrap_err();
        assert_eq!(issues[0].path, vec![
            PathSegment::from("lines"),
            PathSegment::from(0),
            PathSegment::from("limit"),
        ]);
    }

    #[test]
    fn refine_rejects_after_parse() {
        let schema = typed::<Listing>().refine(|l| {
            if l.limit <= 100 { Ok(()) } else { Err(Issue::new("too large").at("limit")) }
        });
        let body = json!({ "limit": 500 });
        let issues = schema.validate(Raw::Json(&body)).unwrap_err();
        assert_eq!(issues, vec![Issue::new("too large").at("limit")]);

        let body = json!({ "limit": 50 });
        assert_eq!(schema.validate(Raw::Json(&body)).unwrap().limit, 50);
    }

    #[test]
    fn from_fn_sees_the_raw_input() {
        let schema = from_fn(|raw: Raw<'_>| {
            raw.to_json()["id"]
                .as_str()
                .map(str::to_owned)
                .ok_or_else(|| vec![Issue::new("required").at("id")])
        });
        let raw = pairs(&[("id", "a"), ("id", "b")]);
        assert_eq!(schema.validate(Raw::Pairs(&raw)).unwrap(), "b");
    }

    #[test]
    fn issues_serialize_with_mixed_paths() {
        let issue = Issue::new("bad").at("items").at(2).at("name");
        assert_eq!(
            serde_json::to_value(&issue).unwrap(),
            json!({ "path": ["items", 2, "name"], "message": "bad" }),
        );
        assert_eq!(issue.to_string(), "items.2.name: bad");
    }
}
