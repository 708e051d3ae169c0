use crate::error::TransportError;
use bytes::Bytes;
use http::HeaderValue;
use reqwest::blocking::multipart::{Form, Part};
use std::fmt;
use std::io::Read;

const DEFAULT_FILE_CONTENT_TYPE: &str = "application/octet-stream";

/// One value in a multipart form
#[derive(Clone, Debug)]
pub enum FormValue {
    Text(String),
    File {
        filename: String,
        content_type: Option<String>,
        data: Bytes,
    },
}

/// Named multipart form field
#[derive(Clone, Debug)]
pub struct FormPart {
    pub name: String,
    pub value: FormValue,
}

/// Multipart/form-data payload
///
/// A fresh boundary is chosen each time the form is encoded, so the
/// dispatcher drops any caller-supplied `Content-Type` for this body.
#[derive(Clone, Debug, Default)]
pub struct FormData {
    parts: Vec<FormPart>,
}

impl FormData {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push(FormPart {
            name: name.into(),
            value: FormValue::Text(value.into()),
        });
        self
    }

    #[must_use]
    pub fn file(
        mut self,
        name: impl Into<String>,
        filename: impl Into<String>,
        content_type: Option<&str>,
        data: Bytes,
    ) -> Self {
        self.parts.push(FormPart {
            name: name.into(),
            value: FormValue::File {
                filename: filename.into(),
                content_type: content_type.map(str::to_owned),
                data,
            },
        });
        self
    }

    #[must_use]
    pub fn parts(&self) -> &[FormPart] {
        &self.parts
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Encode as `multipart/form-data`
    ///
    /// Returns the body together with the `Content-Type` that carries its
    /// boundary. File parts without a content type are sent as
    /// `application/octet-stream`.
    ///
    /// # Errors
    /// Returns `TransportError::Encode` if a file part's content type is not a
    /// valid MIME type.
    pub fn encode(&self) -> Result<(Bytes, HeaderValue), TransportError> {
        let mut form = Form::new();
        for part in &self.parts {
            form = match &part.value {
                FormValue::Text(text) => form.text(part.name.clone(), text.clone()),
                FormValue::File {
                    filename,
                    content_type,
                    data,
                } => {
                    let file = Part::bytes(data.to_vec())
                        .file_name(filename.clone())
                        .mime_str(content_type.as_deref().unwrap_or(DEFAULT_FILE_CONTENT_TYPE))
                        .map_err(|e| TransportError::Encode(Box::new(e)))?;
                    form.part(part.name.clone(), file)
                }
            };
        }

        let content_type =
            HeaderValue::try_from(format!("multipart/form-data; boundary={}", form.boundary()))
                .map_err(|e| TransportError::Encode(Box::new(e)))?;
        let mut body = Vec::new();
        form.into_reader()
            .read_to_end(&mut body)
            .map_err(|e| TransportError::Encode(Box::new(e)))?;
        Ok((Bytes::from(body), content_type))
    }
}

/// Request payload
///
/// `None` is the explicit "no body" sentinel: no bytes are sent and no
/// `Content-Type` is advertised.
#[derive(Clone, Default)]
#[non_exhaustive]
pub enum RequestBody {
    #[default]
    None,
    Text(String),
    Bytes(Bytes),
    Json(serde_json::Value),
    /// `application/x-www-form-urlencoded` fields
    Form(Vec<(String, String)>),
    Multipart(FormData),
}

impl RequestBody {
    #[must_use]
    pub fn json(value: serde_json::Value) -> Self {
        Self::Json(value)
    }

    #[must_use]
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    #[must_use]
    pub fn form(fields: &[(&str, &str)]) -> Self {
        Self::Form(
            fields
                .iter()
                .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                .collect(),
        )
    }

    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    #[must_use]
    pub fn is_form_data(&self) -> bool {
        matches!(self, Self::Multipart(_))
    }

    /// Serialize for the wire
    ///
    /// Returns the bytes plus the `Content-Type` this encoding implies. For
    /// multipart the content type is mandatory (it carries the boundary); for
    /// the other encodings it is only a default the caller's header overrides.
    ///
    /// # Errors
    /// Returns `TransportError::Encode` if JSON, form or multipart serialization fails.
    pub fn encode(&self) -> Result<(Bytes, Option<HeaderValue>), TransportError> {
        match self {
            Self::None => Ok((Bytes::new(), None)),
            Self::Text(text) => Ok((
                Bytes::from(text.clone()),
                Some(HeaderValue::from_static("text/plain;charset=UTF-8")),
            )),
            Self::Bytes(bytes) => Ok((bytes.clone(), None)),
            Self::Json(value) => {
                let bytes = serde_json::to_vec(value).map_err(|e| TransportError::Encode(Box::new(e)))?;
                Ok((
                    Bytes::from(bytes),
                    Some(HeaderValue::from_static("application/json")),
                ))
            }
            Self::Form(fields) => {
                let encoded = serde_urlencoded::to_string(fields)
                    .map_err(|e| TransportError::Encode(Box::new(e)))?;
                Ok((
                    Bytes::from(encoded),
                    Some(HeaderValue::from_static(
                        "application/x-www-form-urlencoded;charset=utf-8",
                    )),
                ))
            }
            Self::Multipart(form) => {
                let (bytes, content_type) = form.encode()?;
                Ok((bytes, Some(content_type)))
            }
        }
    }
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Text(text) => f.debug_tuple("Text").field(&text.len()).finish(),
            Self::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            Self::Json(_) => f.write_str("Json(..)"),
            Self::Form(fields) => f.debug_tuple("Form").field(&fields.len()).finish(),
            Self::Multipart(form) => f.debug_tuple("Multipart").field(&form.parts.len()).finish(),
        }
    }
}

impl From<FormData> for RequestBody {
    fn from(form: FormData) -> Self {
        Self::Multipart(form)
    }
}

impl From<serde_json::Value> for RequestBody {
    fn from(value: serde_json::Value) -> Self {
        Self::Json(value)
    }
}

impl From<Bytes> for RequestBody {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}
