//! Rebuildable API request description

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, RequestBuilder, Url};
use serde::Serialize;
use serde_json::Value;

use super::Error;

/// Page requested when paginating without explicit page
pub const DEFAULT_PAGE: u32 = 1;

/// Page size used when paginating without explicit size
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Single part of a multipart form
#[derive(Debug, Clone)]
enum FormPart {
    Text(String),
    File { file_name: String, content: Vec<u8> },
}

/// Multipart form which can be encoded any number of times
#[derive(Debug, Clone, Default)]
pub struct Multipart {
    parts: Vec<(String, FormPart)>,
}

impl Multipart {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a text field
    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push((name.into(), FormPart::Text(value.into())));
        self
    }

    /// Adds a file field
    pub fn file(
        mut self,
        name: impl Into<String>,
        file_name: impl Into<String>,
        content: impl Into<Vec<u8>>,
    ) -> Self {
        self.parts.push((
            name.into(),
            FormPart::File {
                file_name: file_name.into(),
                content: content.into(),
            },
        ));
        self
    }

    fn form(&self) -> Form {
        self.parts
            .iter()
            .fold(Form::new(), |form, (name, part)| match part {
                FormPart::Text(value) => form.text(name.clone(), value.clone()),
                FormPart::File { file_name, content } => form.part(
                    name.clone(),
                    Part::bytes(content.clone()).file_name(file_name.clone()),
                ),
            })
    }
}

#[derive(Debug, Clone)]
enum Body {
    Json(Value),
    Multipart(Multipart),
}

/// Request to be sent through the gateway
///
/// Unlike `reqwest::Request` it can be turned into an HTTP request any number of times, which is
/// what makes retrying with a refreshed token possible.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<Body>,
    headers: HeaderMap,
}

impl ApiRequest {
    /// Request with `path` resolved against the gateway base url
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: vec![],
            body: None,
            headers: HeaderMap::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Appends a query parameter
    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Appends `page` and `page_size` query parameters
    pub fn paginated(self, page: u32, page_size: u32) -> Self {
        self.query("page", page).query("page_size", page_size)
    }

    /// Sets JSON body
    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(Body::Json(body));
        self
    }

    /// Sets multipart form body
    pub fn multipart(mut self, form: Multipart) -> Self {
        self.body = Some(Body::Multipart(form));
        self
    }

    /// Sets JSON body serialized from `body`
    pub fn json(self, body: &impl Serialize) -> Result<Self, serde_json::Error> {
        Ok(self.body(serde_json::to_value(body)?))
    }

    /// Adds an extra header
    ///
    /// `Authorization` is only sent when there is no session, the stored access token replaces it
    /// otherwise.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Builds the HTTP request, attaching `access` as a bearer token if given
    pub(super) fn build(
        &self,
        client: &Client,
        base_url: &Url,
        access: Option<&str>,
    ) -> Result<RequestBuilder, Error> {
        let url = resolve(base_url, &self.path)?;

        let mut headers = self.headers.clone();
        if access.is_some() {
            headers.remove(AUTHORIZATION);
        }

        let mut builder = client.request(self.method.clone(), url).headers(headers);

        if !self.query.is_empty() {
            builder = builder.query(&self.query);
        }

        builder = match &self.body {
            Some(Body::Json(body)) => builder.json(body),
            Some(Body::Multipart(form)) => builder.multipart(form.form()),
            None => builder,
        };

        if let Some(access) = access {
            builder = builder.bearer_auth(access);
        }

        Ok(builder)
    }
}

/// Normalizes the base url so paths are always resolved below it
pub(super) fn base_url(base_url: &str) -> Result<Url, Error> {
    let mut url = Url::parse(base_url).map_err(|err| Error::InvalidUrl(err.to_string()))?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// Resolves `path` below `base_url`. Absolute urls are used as they are.
pub(super) fn resolve(base_url: &Url, path: &str) -> Result<Url, Error> {
    base_url
        .join(path.trim_start_matches('/'))
        .map_err(|err| Error::InvalidUrl(err.to_string()))
}
