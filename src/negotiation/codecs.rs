//! Built-in JSON, form and text handlers.

use std::io;

use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::media_type::{decode_text, encode_text, MediaType};
use crate::negotiation::{Marshaller, Unmarshaller};
use crate::params::ParamContainer;
use crate::request::path_query::{encode_query, parse_query};
use crate::response::ResponseHead;

fn write_out(out: &mut dyn io::Write, bytes: &[u8]) -> Result<()> {
    out.write_all(bytes)
        .map_err(|e| Error::processing(format!("payload could not be written: {e}")))
}

fn response_charset(head: &ResponseHead) -> String {
    head.media_type()
        .as_ref()
        .and_then(MediaType::charset)
        .unwrap_or("utf-8")
        .to_string()
}

/// `application/json` and `*+json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Marshaller for JsonCodec {
    fn write(&self, payload: &Value, out: &mut dyn io::Write, charset: &str) -> Result<()> {
        let text = serde_json::to_string(payload)
            .map_err(|e| Error::processing(format!("JSON serialization failed: {e}")))?;
        write_out(out, &encode_text(&text, charset)?)
    }
}

impl Unmarshaller for JsonCodec {
    fn unmarshall(&self, body: &[u8], head: &ResponseHead) -> Result<Value> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        let text = decode_text(body, &response_charset(head))?;
        serde_json::from_str(&text)
            .map_err(|e| Error::processing_with(format!("invalid JSON body: {e}"), head))
    }
}

/// `application/x-www-form-urlencoded`.
///
/// Objects map to name/value pairs; arrays repeat the name, `null` emits the
/// bare name. Decoding yields strings, or arrays for repeated names.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormCodec;

impl Marshaller for FormCodec {
    fn write(&self, payload: &Value, out: &mut dyn io::Write, charset: &str) -> Result<()> {
        let Value::Object(fields) = payload else {
            return Err(Error::processing("form payload must be an object"));
        };
        let mut params = ParamContainer::new();
        for (name, value) in fields {
            match value {
                Value::Array(items) => params.add(name, items.iter().map(scalar))?,
                Value::Null => params.add(name, Vec::<String>::new())?,
                other => params.add_one(name, scalar(other))?,
            };
        }
        write_out(out, &encode_text(&encode_query(&params), charset)?)
    }
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

impl Unmarshaller for FormCodec {
    fn unmarshall(&self, body: &[u8], head: &ResponseHead) -> Result<Value> {
        let text = decode_text(body, &response_charset(head))?;
        let params = parse_query(text.trim(), true)
            .map_err(|e| Error::processing_with(format!("invalid form body: {e}"), head))?;
        let mut fields = Map::new();
        for (name, values) in params.iter() {
            let value = match values {
                [single] => Value::String(single.clone()),
                many => Value::Array(many.iter().cloned().map(Value::String).collect()),
            };
            fields.insert(name.to_string(), value);
        }
        Ok(Value::Object(fields))
    }
}

/// `text/*`. Strings are written verbatim, other values as JSON text.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextCodec;

impl Marshaller for TextCodec {
    fn write(&self, payload: &Value, out: &mut dyn io::Write, charset: &str) -> Result<()> {
        let text = match payload {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        write_out(out, &encode_text(&text, charset)?)
    }
}

impl Unmarshaller for TextCodec {
    fn unmarshall(&self, body: &[u8], head: &ResponseHead) -> Result<Value> {
        decode_text(body, &response_charset(head)).map(Value::String)
    }
}
