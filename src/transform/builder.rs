//! Builds a route's [`Transformer`] from its transform configuration.
//!
//! Each config entry is a small string map whose keys select the transform
//! kind. Unknown kinds are a configuration error surfaced at apply time,
//! not at request time.

use std::collections::HashMap;

use async_trait::async_trait;
use axum::http::{HeaderName, HeaderValue};
use thiserror::Error;

use crate::transform::context::{
    RequestTransformContext, ResponseTransformContext, ResponseTrailersTransformContext,
};
use crate::transform::{
    RequestTransform, ResponseTransform, ResponseTrailersTransform, TransformError, Transformer,
};

/// Problems in a route's transform configuration.
#[derive(Debug, Error)]
pub enum TransformBuildError {
    #[error("unknown transform entry {0:?}")]
    UnknownTransform(Vec<String>),

    #[error("transform `{0}` needs a `Set` or `Append` value")]
    MissingValue(String),

    #[error("transform `{kind}` has an invalid header name `{name}`")]
    InvalidHeaderName { kind: String, name: String },

    #[error("transform `{kind}` has an invalid header value for `{name}`")]
    InvalidHeaderValue { kind: String, name: String },

    #[error("flag `{flag}` has a non-boolean value `{value}`")]
    InvalidFlag { flag: String, value: String },
}

/// Build the transformer for one route from its ordered transform entries.
pub fn build_transformer(
    entries: &[HashMap<String, String>],
) -> Result<Transformer, TransformBuildError> {
    let mut transformer = Transformer::default();

    for entry in entries {
        if let Some(value) = entry.get("RequestHeadersCopy") {
            transformer.copy_request_headers = Some(parse_flag("RequestHeadersCopy", value)?);
        } else if let Some(value) = entry.get("ResponseHeadersCopy") {
            transformer.copy_response_headers = Some(parse_flag("ResponseHeadersCopy", value)?);
        } else if let Some(value) = entry.get("ResponseTrailersCopy") {
            transformer.copy_response_trailers = Some(parse_flag("ResponseTrailersCopy", value)?);
        } else if let Some(prefix) = entry.get("PathPrefix") {
            transformer.request_transforms.push(Box::new(PathPrefixTransform {
                prefix: prefix.clone(),
            }));
        } else if let Some(name) = entry.get("RequestHeader") {
            let (value, append) = header_value("RequestHeader", name, entry)?;
            transformer.request_transforms.push(Box::new(RequestHeaderTransform {
                name: header_name("RequestHeader", name)?,
                value,
                append,
            }));
        } else if let Some(name) = entry.get("ResponseHeader") {
            let (value, append) = header_value("ResponseHeader", name, entry)?;
            transformer.response_transforms.push(Box::new(ResponseHeaderTransform {
                name: header_name("ResponseHeader", name)?,
                value,
                append,
            }));
        } else if let Some(name) = entry.get("ResponseTrailer") {
            let (value, append) = header_value("ResponseTrailer", name, entry)?;
            transformer
                .response_trailer_transforms
                .push(Box::new(ResponseTrailerTransform {
                    name: header_name("ResponseTrailer", name)?,
                    value,
                    append,
                }));
        } else {
            let mut keys: Vec<String> = entry.keys().cloned().collect();
            keys.sort();
            return Err(TransformBuildError::UnknownTransform(keys));
        }
    }

    Ok(transformer)
}

fn parse_flag(flag: &str, value: &str) -> Result<bool, TransformBuildError> {
    value.parse::<bool>().map_err(|_| TransformBuildError::InvalidFlag {
        flag: flag.to_string(),
        value: value.to_string(),
    })
}

fn header_name(kind: &str, name: &str) -> Result<HeaderName, TransformBuildError> {
    name.parse::<HeaderName>()
        .map_err(|_| TransformBuildError::InvalidHeaderName {
            kind: kind.to_string(),
            name: name.to_string(),
        })
}

fn header_value(
    kind: &str,
    name: &str,
    entry: &HashMap<String, String>,
) -> Result<(HeaderValue, bool), TransformBuildError> {
    let (raw, append) = if let Some(value) = entry.get("Set") {
        (value, false)
    } else if let Some(value) = entry.get("Append") {
        (value, true)
    } else {
        return Err(TransformBuildError::MissingValue(kind.to_string()));
    };

    let value = raw
        .parse::<HeaderValue>()
        .map_err(|_| TransformBuildError::InvalidHeaderValue {
            kind: kind.to_string(),
            name: name.to_string(),
        })?;
    Ok((value, append))
}

/// Prepends a fixed prefix to the request path.
struct PathPrefixTransform {
    prefix: String,
}

#[async_trait]
impl RequestTransform for PathPrefixTransform {
    async fn apply(&self, ctx: &mut RequestTransformContext<'_>) -> Result<(), TransformError> {
        ctx.path = format!("{}{}", self.prefix, ctx.path);
        Ok(())
    }
}

/// Sets or appends a header on the outbound request.
struct RequestHeaderTransform {
    name: HeaderName,
    value: HeaderValue,
    append: bool,
}

#[async_trait]
impl RequestTransform for RequestHeaderTransform {
    async fn apply(&self, ctx: &mut RequestTransformContext<'_>) -> Result<(), TransformError> {
        if self.append {
            ctx.outbound.headers.append(self.name.clone(), self.value.clone());
        } else {
            ctx.outbound.headers.insert(self.name.clone(), self.value.clone());
        }
        Ok(())
    }
}

/// Sets or appends a header on the client response.
struct ResponseHeaderTransform {
    name: HeaderName,
    value: HeaderValue,
    append: bool,
}

#[async_trait]
impl ResponseTransform for ResponseHeaderTransform {
    async fn apply(&self, ctx: &mut ResponseTransformContext<'_>) -> Result<(), TransformError> {
        if self.append {
            ctx.client.headers.append(self.name.clone(), self.value.clone());
        } else {
            ctx.client.headers.insert(self.name.clone(), self.value.clone());
        }
        Ok(())
    }
}

/// Sets or appends an outgoing trailer.
struct ResponseTrailerTransform {
    name: HeaderName,
    value: HeaderValue,
    append: bool,
}

#[async_trait]
impl ResponseTrailersTransform for ResponseTrailerTransform {
    async fn apply(
        &self,
        ctx: &mut ResponseTrailersTransformContext<'_>,
    ) -> Result<(), TransformError> {
        if self.append {
            ctx.trailers.append(self.name.clone(), self.value.clone());
        } else {
            ctx.trailers.insert(self.name.clone(), self.value.clone());
        }
        Ok(())
    }
}
