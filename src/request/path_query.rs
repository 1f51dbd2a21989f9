//! Path and query construction.
//!
//! # Placement
//! ```text
//! template "/users/{id}"  + {id}=7 + ;v=2 + q=a b
//!     → "/users/7;v=2?q=a%20b"
//! ```

use std::borrow::Cow;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::error::{Error, Result};
use crate::params::ParamContainer;

/// Everything except RFC 3986 unreserved characters gets encoded.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

pub fn encode_component(value: &str) -> Cow<'_, str> {
    utf8_percent_encode(value, COMPONENT).into()
}

/// Substitute `{name}` placeholders. Each path parameter needs exactly one
/// value and a matching placeholder.
pub fn expand_path(template: &str, path_params: &[(String, Vec<String>)]) -> Result<String> {
    let mut path = template.to_string();
    for (name, values) in path_params {
        let placeholder = format!("{{{name}}}");
        if !path.contains(&placeholder) {
            return Err(Error::RequestBuild(format!(
                "path parameter '{name}' has no placeholder in '{template}'"
            )));
        }
        let value = match values.as_slice() {
            [value] => value,
            _ => {
                return Err(Error::RequestBuild(format!(
                    "path parameter '{name}' requires exactly one value, got {}",
                    values.len()
                )))
            }
        };
        path = path.replace(&placeholder, &encode_component(value));
    }

    if let Some(unresolved) = find_placeholder(&path) {
        return Err(Error::RequestBuild(format!(
            "unresolved path placeholder '{unresolved}' in '{template}'"
        )));
    }
    Ok(path)
}

fn find_placeholder(path: &str) -> Option<&str> {
    let start = path.find('{')?;
    let end = path[start..].find('}')?;
    Some(&path[start..=start + end])
}

/// `;name=value` segments in registration order, one per value.
pub fn matrix_segments(matrix: &[(String, Vec<String>)]) -> String {
    let mut out = String::new();
    for (name, values) in matrix {
        for value in values {
            out.push(';');
            out.push_str(&encode_component(name));
            if !value.is_empty() {
                out.push('=');
                out.push_str(&encode_component(value));
            }
        }
    }
    out
}

/// `a=1&a=2&b` in container order; the blank placeholder emits the bare name.
pub fn encode_query(params: &ParamContainer) -> String {
    params
        .pairs()
        .map(|(name, value)| {
            if value.is_empty() {
                encode_component(name).into_owned()
            } else {
                format!("{}={}", encode_component(name), encode_component(value))
            }
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Parse a query string back into a container. With `plus_as_space` a `+`
/// decodes to a space, as form bodies use it.
pub fn parse_query(query: &str, plus_as_space: bool) -> Result<ParamContainer> {
    let mut params = ParamContainer::new();
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
        let name = decode_component(name, plus_as_space)?;
        let value = decode_component(value, plus_as_space)?;
        if value.is_empty() {
            params.add(&name, Vec::<String>::new())?;
        } else {
            params.add_one(&name, value)?;
        }
    }
    Ok(params)
}

fn decode_component(value: &str, plus_as_space: bool) -> Result<String> {
    let value: Cow<'_, str> = if plus_as_space {
        value.replace('+', " ").into()
    } else {
        value.into()
    };
    percent_decode_str(&value)
        .decode_utf8()
        .map(Cow::into_owned)
        .map_err(|e| Error::InvalidArgument(format!("invalid percent-encoding: {e}")))
}
