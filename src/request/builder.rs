//! Fluent request builder.
//!
//! Errors raised by fluent calls (a blank name, an unserializable payload)
//! are held back and returned by `build()`.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;
use tokio::io::AsyncRead;

use crate::error::{Error, Result};
use crate::media_type::MediaType;
use crate::negotiation::Marshaller;
use crate::params::container::append_values;
use crate::params::{ParamContainer, ParamKind};
use crate::request::path_query::{encode_query, expand_path, matrix_segments};
use crate::request::{Body, Fingerprint, MarshallBody, Method, RequestDescriptor, CONTENT_TYPE};

pub const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";
pub const APPLICATION_JSON: &str = "application/json";

/// Sender-level values merged into every request; explicit values win.
#[derive(Debug, Clone)]
pub struct RequestDefaults {
    pub headers: ParamContainer,
    /// Raw parameter names, sigils included.
    pub params: ParamContainer,
    pub charset: String,
    pub omit_charset: bool,
}

impl Default for RequestDefaults {
    fn default() -> Self {
        Self {
            headers: ParamContainer::new(),
            params: ParamContainer::new(),
            charset: "utf-8".to_string(),
            omit_charset: false,
        }
    }
}

type NamedValues = Vec<(String, Vec<String>)>;

/// Accumulates the parts of a request and validates them in `build()`.
#[derive(Debug)]
pub struct RequestBuilder {
    method: Method,
    path_template: String,
    query: ParamContainer,
    matrix: NamedValues,
    path_params: NamedValues,
    headers: ParamContainer,
    body: Option<Body>,
    read_timeout: Option<Duration>,
    cacheable: bool,
    defaults: Arc<RequestDefaults>,
    error: Option<Error>,
}

impl RequestBuilder {
    /// A builder without sender defaults.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self::with_defaults(method, path, Arc::new(RequestDefaults::default()))
    }

    pub fn with_defaults(
        method: Method,
        path: impl Into<String>,
        defaults: Arc<RequestDefaults>,
    ) -> Self {
        Self {
            method,
            path_template: path.into(),
            query: ParamContainer::new(),
            matrix: Vec::new(),
            path_params: Vec::new(),
            headers: ParamContainer::new(),
            body: None,
            read_timeout: None,
            cacheable: false,
            defaults,
            error: None,
        }
    }

    /// Add one value for a parameter. `{name}` targets the path, `;name` the
    /// matrix, anything else the query.
    pub fn param(self, name: &str, value: impl Into<String>) -> Self {
        self.params(name, [value.into()])
    }

    /// Add several values for a parameter; none at all marks it present
    /// without a value.
    pub fn params<I, V>(mut self, name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        let values = values.into_iter().map(Into::into).collect();
        let result = self.put_param(name, values, false);
        self.record(result)
    }

    /// Replace every value of a parameter.
    pub fn set_param<I, V>(mut self, name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        let values = values.into_iter().map(Into::into).collect();
        let result = self.put_param(name, values, true);
        self.record(result)
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        let result = self.headers.add_one(name, value).map(|_| ());
        self.record(result)
    }

    pub fn set_header(mut self, name: &str, value: impl Into<String>) -> Self {
        let result = self.headers.set(name, [value.into()]).map(|_| ());
        self.record(result)
    }

    pub fn content_type(self, value: impl Into<String>) -> Self {
        self.set_header(CONTENT_TYPE, value)
    }

    pub fn body(mut self, body: Body) -> Self {
        self.body = Some(body);
        self
    }

    pub fn text(self, text: impl Into<String>) -> Self {
        self.body(Body::Text(text.into()))
    }

    pub fn bytes(self, bytes: impl Into<Bytes>) -> Self {
        self.body(Body::Bytes(bytes.into()))
    }

    pub fn stream<S>(self, stream: S) -> Self
    where
        S: futures_util::Stream<Item = std::io::Result<Bytes>> + Send + Sync + 'static,
    {
        self.body(Body::stream(stream))
    }

    pub fn reader<R>(self, reader: R) -> Self
    where
        R: AsyncRead + Send + Sync + Unpin + 'static,
    {
        self.body(Body::reader(reader))
    }

    /// A payload serialized by whichever marshaller claims the Content-Type.
    pub fn marshall(self, payload: Value) -> Self {
        self.body(Body::marshall(payload))
    }

    /// A payload pinned to a specific marshaller.
    pub fn marshall_with(self, payload: Value, marshaller: Arc<dyn Marshaller>) -> Self {
        self.body(Body::Marshall(MarshallBody {
            payload,
            marshaller: Some(marshaller),
        }))
    }

    /// A JSON payload; sets `Content-Type: application/json` unless one is set.
    pub fn json<T: Serialize + ?Sized>(mut self, payload: &T) -> Self {
        match serde_json::to_value(payload) {
            Ok(value) => {
                self.body = Some(Body::marshall(value));
                self.default_content_type(APPLICATION_JSON)
            }
            Err(e) => self.record(Err(Error::processing(format!(
                "payload could not be serialized: {e}"
            )))),
        }
    }

    /// A form-encoded body built from name/value pairs.
    pub fn form<I, K, V>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut form = ParamContainer::new();
        for (name, value) in pairs {
            if let Err(e) = form.add_one(name.as_ref(), value) {
                return self.record(Err(e));
            }
        }
        self.body = Some(Body::Text(encode_query(&form)));
        self.default_content_type(FORM_URLENCODED)
    }

    /// Override the transport read timeout for this request.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    /// Make the request eligible for response caching.
    pub fn cached(mut self) -> Self {
        self.cacheable = true;
        self
    }

    /// Validate and resolve the request.
    pub fn build(mut self) -> Result<RequestDescriptor> {
        if let Some(err) = self.error.take() {
            return Err(err);
        }
        self.merge_defaults()?;

        let (template_path, template_query) = match self.path_template.split_once('?') {
            Some((path, query)) => (path.to_string(), query.to_string()),
            None => (self.path_template.clone(), String::new()),
        };

        let mut path_query = expand_path(&template_path, &self.path_params)?;
        path_query.push_str(&matrix_segments(&self.matrix));

        if self.body.is_some() {
            if !self.method.body_allowed() {
                return Err(Error::RequestBuild(format!(
                    "{} requests cannot carry a body",
                    self.method
                )));
            }
        } else if self.method.body_allowed() && !self.query.is_empty() {
            // Parameters of a body-carrying method without a body travel as a form.
            self.body = Some(Body::Text(encode_query(&self.query)));
            self.query = ParamContainer::new();
            self = self.default_content_type(FORM_URLENCODED);
        }

        let query = encode_query(&self.query);
        let query_parts: Vec<&str> = [template_query.as_str(), query.as_str()]
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect();
        if !query_parts.is_empty() {
            path_query.push('?');
            path_query.push_str(&query_parts.join("&"));
        }

        let charset = match self.body.as_ref().map(Body::kind) {
            Some(body_kind) => self.resolve_content_type(body_kind)?,
            None => self.defaults.charset.clone(),
        };

        let fingerprint = if self.cacheable {
            Some(Fingerprint::compute(
                self.method,
                &path_query,
                &self.headers,
                self.body.as_ref(),
            )?)
        } else {
            None
        };

        tracing::trace!(method = %self.method, path_query = %path_query, "Request built");

        Ok(RequestDescriptor {
            method: self.method,
            path_template: self.path_template,
            path_query,
            headers: self.headers,
            body: self.body,
            read_timeout: self.read_timeout,
            fingerprint,
            charset,
        })
    }

    fn record(mut self, result: Result<()>) -> Self {
        if let Err(err) = result {
            self.error.get_or_insert(err);
        }
        self
    }

    fn default_content_type(mut self, value: &str) -> Self {
        if self.headers.entry_ignore_case(CONTENT_TYPE).is_none() {
            let result = self.headers.set(CONTENT_TYPE, [value]).map(|_| ());
            return self.record(result);
        }
        self
    }

    fn put_param(&mut self, raw: &str, values: Vec<String>, replace: bool) -> Result<()> {
        if raw.trim().is_empty() {
            return Err(Error::InvalidArgument(
                "parameter name must not be blank".to_string(),
            ));
        }
        match ParamKind::classify(raw) {
            (ParamKind::Query, name) => {
                if replace {
                    self.query.set(name, values)?;
                } else {
                    self.query.add(name, values)?;
                }
            }
            (ParamKind::Matrix, name) => upsert(&mut self.matrix, name, values, replace),
            (ParamKind::Path, name) => upsert(&mut self.path_params, name, values, replace),
        }
        Ok(())
    }

    fn merge_defaults(&mut self) -> Result<()> {
        let defaults = Arc::clone(&self.defaults);
        self.headers.merge_missing_ignore_case(&defaults.headers);

        let mut query_defaults = ParamContainer::new();
        for (raw, values) in defaults.params.iter() {
            let values = values.to_vec();
            match ParamKind::classify(raw) {
                (ParamKind::Query, name) => {
                    query_defaults.set(name, values)?;
                }
                (ParamKind::Matrix, name) => {
                    if !self.matrix.iter().any(|(n, _)| n == name) {
                        self.matrix.push((name.to_string(), values));
                    }
                }
                (ParamKind::Path, name) => {
                    let wanted = self.path_template.contains(&format!("{{{name}}}"));
                    if wanted && !self.path_params.iter().any(|(n, _)| n == name) {
                        self.path_params.push((name.to_string(), values));
                    }
                }
            }
        }
        self.query.merge_missing(&query_defaults);
        Ok(())
    }

    /// Require a parseable Content-Type and append the charset; returns the
    /// charset the body is encoded with.
    fn resolve_content_type(&mut self, body_kind: &str) -> Result<String> {
        let (name, value) = match self.headers.entry_ignore_case(CONTENT_TYPE) {
            Some((name, values)) => (
                name.to_string(),
                values.first().cloned().unwrap_or_default(),
            ),
            None => {
                return Err(Error::RequestBuild(format!(
                    "{body_kind} body requires a Content-Type header"
                )))
            }
        };

        let media = MediaType::parse(&value).ok_or_else(|| {
            Error::RequestBuild(format!("unresolvable Content-Type '{value}'"))
        })?;

        if let Some(charset) = media.charset() {
            return Ok(charset.to_string());
        }
        if !self.defaults.omit_charset {
            let with_charset = format!("{value}; charset={}", self.defaults.charset);
            self.headers.set(&name, [with_charset])?;
        }
        Ok(self.defaults.charset.clone())
    }
}

/// Same placeholder rules as `ParamContainer`, keeping registration order.
fn upsert(list: &mut NamedValues, name: &str, values: Vec<String>, replace: bool) {
    let index = match list.iter().position(|(n, _)| n == name) {
        Some(index) => index,
        None => {
            list.push((name.to_string(), Vec::new()));
            list.len() - 1
        }
    };
    let slot = &mut list[index].1;
    if replace {
        slot.clear();
    }
    append_values(slot, values);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::path_query::parse_query;

    #[test]
    fn post_with_json_and_query() {
        let request = RequestBuilder::new(Method::Post, "/items")
            .header("Content-Type", "application/json")
            .text(r#"{"n":1}"#)
            .param("debug", "true")
            .build()
            .unwrap();

        assert_eq!(request.path_query(), "/items?debug=true");
        assert_eq!(request.header("content-type"), Some("application/json; charset=utf-8"));
        match request.body() {
            Some(Body::Text(text)) => assert_eq!(text, r#"{"n":1}"#),
            other => panic!("unexpected body {other:?}"),
        }
    }

    #[test]
    fn query_only_round_trips() {
        let request = RequestBuilder::new(Method::Get, "/search")
            .params("tag", ["b", "a", "b"])
            .param("q", "rust lang")
            .params("flag", Vec::<String>::new())
            .build()
            .unwrap();

        let reparsed = parse_query(request.query().unwrap(), false).unwrap();
        assert_eq!(reparsed.get("tag").unwrap(), ["b", "a", "b"]);
        assert_eq!(reparsed.get_first("q"), Some("rust lang"));
        assert_eq!(reparsed.get("flag").unwrap(), [""]);
        assert_eq!(reparsed.len(), 3);
    }

    #[test]
    fn matrix_precedes_query() {
        let request = RequestBuilder::new(Method::Get, "/cars")
            .param("page", "2")
            .param(";color", "red")
            .param(";year", "2020")
            .build()
            .unwrap();
        assert_eq!(request.path_query(), "/cars;color=red;year=2020?page=2");
    }

    #[test]
    fn placeholder_gives_way_regardless_of_sigil() {
        let request = RequestBuilder::new(Method::Get, "/x")
            .params("f", Vec::<String>::new())
            .param("f", "1")
            .params(";m", Vec::<String>::new())
            .param(";m", "1")
            .params(";bare", Vec::<String>::new())
            .build()
            .unwrap();
        assert_eq!(request.path_query(), "/x;m=1;bare?f=1");
    }

    #[test]
    fn path_param_substituted_once() {
        let request = RequestBuilder::new(Method::Get, "/users/{id}/posts")
            .param("{id}", "42")
            .build()
            .unwrap();
        assert_eq!(request.path_query(), "/users/42/posts");
        assert_eq!(request.path_template(), "/users/{id}/posts");
    }

    #[test]
    fn path_param_without_placeholder_fails() {
        let err = RequestBuilder::new(Method::Get, "/users")
            .param("{id}", "42")
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::RequestBuild(_)));
    }

    #[test]
    fn path_param_collection_fails() {
        let err = RequestBuilder::new(Method::Get, "/users/{id}")
            .params("{id}", ["1", "2"])
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::RequestBuild(_)));
    }

    #[test]
    fn unresolved_placeholder_fails() {
        assert!(RequestBuilder::new(Method::Get, "/users/{id}").build().is_err());
    }

    #[test]
    fn body_requires_content_type() {
        let err = RequestBuilder::new(Method::Put, "/x")
            .bytes(&b"raw"[..])
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::RequestBuild(_)));
    }

    #[test]
    fn body_on_get_fails() {
        let err = RequestBuilder::new(Method::Get, "/x")
            .content_type("text/plain")
            .text("nope")
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::RequestBuild(_)));
    }

    #[test]
    fn post_params_become_form_body() {
        let request = RequestBuilder::new(Method::Post, "/login")
            .param("user", "ann")
            .param("pass", "a&b")
            .build()
            .unwrap();
        assert_eq!(request.path_query(), "/login");
        assert_eq!(
            request.header(CONTENT_TYPE),
            Some("application/x-www-form-urlencoded; charset=utf-8")
        );
        match request.body() {
            Some(Body::Text(text)) => assert_eq!(text, "pass=a%26b&user=ann"),
            other => panic!("unexpected body {other:?}"),
        }
    }

    #[test]
    fn explicit_charset_and_omission() {
        let request = RequestBuilder::new(Method::Post, "/x")
            .content_type("text/plain; charset=ISO-8859-1")
            .text("hi")
            .build()
            .unwrap();
        assert_eq!(request.header(CONTENT_TYPE), Some("text/plain; charset=ISO-8859-1"));
        assert_eq!(request.charset(), "iso-8859-1");

        let defaults = Arc::new(RequestDefaults {
            omit_charset: true,
            ..RequestDefaults::default()
        });
        let request = RequestBuilder::with_defaults(Method::Post, "/x", defaults)
            .content_type("text/plain")
            .text("hi")
            .build()
            .unwrap();
        assert_eq!(request.header(CONTENT_TYPE), Some("text/plain"));
    }

    #[test]
    fn defaults_merge_with_explicit_precedence() {
        let mut defaults = RequestDefaults::default();
        defaults.headers.add_one("Accept", "application/json").unwrap();
        defaults.headers.add_one("User-Agent", "relay").unwrap();
        defaults.params.add_one("api_key", "k").unwrap();
        defaults.params.add_one("{tenant}", "acme").unwrap();
        let defaults = Arc::new(defaults);

        let request = RequestBuilder::with_defaults(Method::Get, "/t/{tenant}", defaults.clone())
            .header("accept", "text/plain")
            .param("api_key", "mine")
            .build()
            .unwrap();
        assert_eq!(request.path_query(), "/t/acme?api_key=mine");
        assert_eq!(request.header("Accept"), Some("text/plain"));
        assert_eq!(request.headers().get("Accept"), None);
        assert_eq!(request.header("User-Agent"), Some("relay"));

        // A default path parameter is ignored by templates without its placeholder.
        let request = RequestBuilder::with_defaults(Method::Get, "/plain", defaults)
            .build()
            .unwrap();
        assert_eq!(request.path_query(), "/plain?api_key=k");
    }

    #[test]
    fn identical_inputs_are_byte_identical() {
        let build = || {
            RequestBuilder::new(Method::Get, "/a/{b}")
                .param("{b}", "x y")
                .param("z", "1")
                .param(";m", "2")
                .param("a", "3")
                .header("X-One", "1")
                .cached()
                .build()
                .unwrap()
        };
        let (first, second) = (build(), build());
        assert_eq!(first.path_query(), second.path_query());
        assert_eq!(first.headers(), second.headers());
        assert_eq!(first.fingerprint(), second.fingerprint());
    }

    #[test]
    fn blank_names_surface_at_build() {
        let err = RequestBuilder::new(Method::Get, "/x").param("  ", "v").build().unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        let err = RequestBuilder::new(Method::Get, "/x").header("", "v").build().unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn cached_stream_body_fails_build() {
        let err = RequestBuilder::new(Method::Post, "/upload")
            .content_type("application/octet-stream")
            .stream(futures_util::stream::empty::<std::io::Result<Bytes>>())
            .cached()
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::RequestBuild(_)));
    }

    #[test]
    fn json_sets_content_type() {
        let request = RequestBuilder::new(Method::Post, "/items")
            .json(&serde_json::json!({"n": 1}))
            .build()
            .unwrap();
        assert_eq!(request.header(CONTENT_TYPE), Some("application/json; charset=utf-8"));
        assert!(matches!(request.body(), Some(Body::Marshall(_))));
    }
}
