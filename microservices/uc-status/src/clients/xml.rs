//! SOAP envelope building and XML-to-JSON conversion
//!
//! Requests are built from JSON parameter objects and responses are turned
//! back into JSON trees so the adapters can pick fields by path. Namespace
//! prefixes are dropped on the way in; attributes are ignored.

use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde_json::{Map, Value};

use brivas_uc_health::BackendError;

const SOAP_ENV: &str = "http://schemas.xmlsoap.org/soap/envelope/";

/// Namespace an operation element lives in
#[derive(Debug, Clone)]
pub struct SoapNamespace {
    pub prefix: &'static str,
    pub uri: String,
    /// Whether child elements carry the prefix too
    pub qualified: bool,
}

/// Build a request envelope for `operation` with `params` as its children.
///
/// Objects become nested elements, arrays repeat their element, `null`
/// becomes an empty element and scalars become escaped text.
pub fn envelope(ns: &SoapNamespace, operation: &str, params: &Value) -> String {
    let mut body = String::new();
    if let Value::Object(map) = params {
        for (key, value) in map {
            write_element(&mut body, ns, key, value);
        }
    }

    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8"?>"#,
            r#"<soapenv:Envelope xmlns:soapenv="{env}" xmlns:{prefix}="{uri}">"#,
            "<soapenv:Header/><soapenv:Body>",
            "<{prefix}:{op}>{body}</{prefix}:{op}>",
            "</soapenv:Body></soapenv:Envelope>"
        ),
        env = SOAP_ENV,
        prefix = ns.prefix,
        uri = ns.uri,
        op = operation,
        body = body,
    )
}

fn write_element(out: &mut String, ns: &SoapNamespace, name: &str, value: &Value) {
    if let Value::Array(items) = value {
        for item in items {
            write_element(out, ns, name, item);
        }
        return;
    }

    let tag = if ns.qualified {
        format!("{}:{}", ns.prefix, name)
    } else {
        name.to_string()
    };

    match value {
        Value::Null => {
            out.push('<');
            out.push_str(&tag);
            out.push_str("/>");
        }
        Value::Object(map) => {
            out.push_str(&format!("<{}>", tag));
            for (key, child) in map {
                write_element(out, ns, key, child);
            }
            out.push_str(&format!("</{}>", tag));
        }
        Value::String(s) => out.push_str(&format!("<{0}>{1}</{0}>", tag, escape(s.as_str()))),
        other => out.push_str(&format!("<{0}>{1}</{0}>", tag, other)),
    }
}

struct Frame {
    name: String,
    children: Map<String, Value>,
    text: String,
}

impl Frame {
    fn new(name: String) -> Self {
        Self {
            name,
            children: Map::new(),
            text: String::new(),
        }
    }

    fn finish(self) -> (String, Value) {
        let value = if self.children.is_empty() {
            Value::String(self.text)
        } else {
            Value::Object(self.children)
        };
        (self.name, value)
    }
}

/// Repeated child names collapse into an array
fn insert_child(map: &mut Map<String, Value>, name: String, value: Value) {
    match map.get_mut(&name) {
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
        None => {
            map.insert(name, value);
        }
    }
}

fn malformed(err: impl std::fmt::Display) -> BackendError {
    BackendError::Malformed(format!("invalid XML: {}", err))
}

/// Convert an XML document into `{ "<root>": ... }`
pub fn to_json(xml: &str) -> Result<Value, BackendError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut stack: Vec<Frame> = Vec::new();
    let mut root: Option<(String, Value)> = None;

    loop {
        match reader.read_event().map_err(malformed)? {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                stack.push(Frame::new(name));
            }
            Event::Empty(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                let (name, value) = Frame::new(name).finish();
                match stack.last_mut() {
                    Some(parent) => insert_child(&mut parent.children, name, value),
                    None => root = Some((name, value)),
                }
            }
            Event::Text(t) => {
                if let Some(frame) = stack.last_mut() {
                    frame.text.push_str(&t.unescape().map_err(malformed)?);
                }
            }
            Event::CData(c) => {
                if let Some(frame) = stack.last_mut() {
                    frame.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Event::End(_) => {
                let frame = stack.pop().ok_or_else(|| malformed("unbalanced end tag"))?;
                let (name, value) = frame.finish();
                match stack.last_mut() {
                    Some(parent) => insert_child(&mut parent.children, name, value),
                    None => root = Some((name, value)),
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(malformed("document ended inside an element"));
    }
    let (name, value) = root.ok_or_else(|| malformed("empty document"))?;
    let mut map = Map::new();
    map.insert(name, value);
    Ok(Value::Object(map))
}

/// Walk nested objects by key
pub fn path<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().try_fold(value, |current, key| current.get(*key))
}

/// Treat a single element and a repeated one alike
pub fn as_list(value: Option<&Value>) -> Vec<&Value> {
    match value {
        None => Vec::new(),
        Some(Value::Array(items)) => items.iter().collect(),
        Some(Value::String(s)) if s.is_empty() => Vec::new(),
        Some(other) => vec![other],
    }
}

/// Non-empty text of a child element
pub fn text(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Content of `Envelope/Body`, or the fault it carries
pub fn soap_body(doc: Value) -> Result<Value, BackendError> {
    let body = path(&doc, &["Envelope", "Body"])
        .cloned()
        .ok_or_else(|| BackendError::Malformed("response has no SOAP body".to_string()))?;

    if let Some(fault) = body.get("Fault") {
        let reason = text(fault, "faultstring")
            .or_else(|| path(fault, &["Reason", "Text"]).and_then(Value::as_str).map(str::to_string))
            .unwrap_or_else(|| "unspecified SOAP fault".to_string());
        return Err(BackendError::Fault(reason));
    }
    Ok(body)
}
