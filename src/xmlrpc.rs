//! XML-RPC wire codec
//!
//! Requests are written with `quick-xml`, responses are read back with
//! `roxmltree`. Values travel as [`serde_json::Value`] on both sides so the
//! rest of the crate never deals with XML.

use crate::odoo_client::RpcError;
use anyhow::{Context, Result, bail};
use quick_xml::{
    Writer,
    events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event},
};
use roxmltree::{Document, Node};
use serde_json::{Map, Number, Value};
use std::io::Cursor;

type XmlWriter = Writer<Cursor<Vec<u8>>>;

/// Encode a `methodCall` document for `method` with positional `params`
pub fn encode_call(method: &str, params: &[Value]) -> Result<String> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));

    writer.write_event(Event::Decl(BytesDecl::new("1.0", None, None)))?;
    start(&mut writer, "methodCall")?;
    text_element(&mut writer, "methodName", method)?;
    start(&mut writer, "params")?;
    for param in params {
        start(&mut writer, "param")?;
        write_value(&mut writer, param)?;
        end(&mut writer, "param")?;
    }
    end(&mut writer, "params")?;
    end(&mut writer, "methodCall")?;

    String::from_utf8(writer.into_inner().into_inner()).context("failed to encode method call")
}

fn start(writer: &mut XmlWriter, tag: &str) -> Result<()> {
    writer.write_event(Event::Start(BytesStart::new(tag)))?;
    Ok(())
}

fn end(writer: &mut XmlWriter, tag: &str) -> Result<()> {
    writer.write_event(Event::End(BytesEnd::new(tag)))?;
    Ok(())
}

fn text_element(writer: &mut XmlWriter, tag: &str, text: &str) -> Result<()> {
    start(writer, tag)?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    end(writer, tag)
}

fn write_value(writer: &mut XmlWriter, value: &Value) -> Result<()> {
    start(writer, "value")?;
    match value {
        Value::Null => writer.write_event(Event::Empty(BytesStart::new("nil")))?,
        Value::Bool(b) => text_element(writer, "boolean", if *b { "1" } else { "0" })?,
        Value::Number(n) => write_number(writer, n)?,
        Value::String(s) => text_element(writer, "string", s)?,
        Value::Array(items) => {
            start(writer, "array")?;
            start(writer, "data")?;
            for item in items {
                write_value(writer, item)?;
            }
            end(writer, "data")?;
            end(writer, "array")?;
        }
        Value::Object(members) => {
            start(writer, "struct")?;
            for (name, member) in members {
                start(writer, "member")?;
                text_element(writer, "name", name)?;
                write_value(writer, member)?;
                end(writer, "member")?;
            }
            end(writer, "struct")?;
        }
    }
    end(writer, "value")
}

fn write_number(writer: &mut XmlWriter, n: &Number) -> Result<()> {
    if let Some(i) = n.as_i64() {
        if i32::try_from(i).is_ok() {
            text_element(writer, "int", &i.to_string())
        } else {
            text_element(writer, "i8", &i.to_string())
        }
    } else if n.is_f64() {
        text_element(writer, "double", &n.to_string())
    } else {
        bail!("failed to encode number {n}: out of range for XML-RPC")
    }
}

/// Decode a `methodResponse` document
///
/// A `<fault>` response is returned as [`RpcError::Fault`]; anything that is
/// not a well formed response is a [`RpcError::Protocol`] error.
pub fn decode_response(body: &str) -> Result<Value, RpcError> {
    let doc = Document::parse(body)
        .map_err(|e| RpcError::Protocol(format!("failed to parse response xml: {e}")))?;
    let root = doc.root_element();

    if root.tag_name().name() != "methodResponse" {
        return Err(RpcError::Protocol(format!(
            "expected root element 'methodResponse', found '{}'",
            root.tag_name().name()
        )));
    }

    let Some(payload) = first_element(&root) else {
        return Err(RpcError::Protocol("empty methodResponse".to_string()));
    };

    match payload.tag_name().name() {
        "params" => {
            let Some(value) = first_element(&payload)
                .and_then(|param| first_element(&param))
                .filter(|n| n.tag_name().name() == "value")
            else {
                // a response without a value only happens for void methods
                return Ok(Value::Null);
            };
            decode_value(&value)
        }
        "fault" => {
            let value = first_element(&payload)
                .ok_or_else(|| RpcError::Protocol("fault without value".to_string()))?;
            Err(fault_from_value(decode_value(&value)?))
        }
        other => Err(RpcError::Protocol(format!(
            "unexpected element '{other}' in methodResponse"
        ))),
    }
}

fn fault_from_value(value: Value) -> RpcError {
    let code = match value.get("faultCode") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };
    let message = match value.get("faultString") {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    };

    RpcError::Fault { code, message }
}

fn first_element<'a, 'input>(node: &Node<'a, 'input>) -> Option<Node<'a, 'input>> {
    node.children().find(|n| n.is_element())
}

fn text_of(node: &Node) -> String {
    node.descendants()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect()
}

fn decode_value(node: &Node) -> Result<Value, RpcError> {
    let Some(typed) = first_element(node) else {
        // untyped values are strings
        return Ok(Value::String(text_of(node)));
    };

    let text = text_of(&typed);
    let tag = typed.tag_name().name();

    match tag {
        "int" | "i4" | "i8" => text
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .map_err(|e| RpcError::Protocol(format!("invalid {tag} '{text}': {e}"))),
        "boolean" => match text.trim() {
            "1" | "true" => Ok(Value::Bool(true)),
            "0" | "false" => Ok(Value::Bool(false)),
            other => Err(RpcError::Protocol(format!("invalid boolean '{other}'"))),
        },
        "double" => text
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| RpcError::Protocol(format!("invalid double '{text}'"))),
        "string" | "dateTime.iso8601" | "base64" => Ok(Value::String(text)),
        "nil" => Ok(Value::Null),
        "array" => {
            let Some(data) = first_element(&typed) else {
                return Ok(Value::Array(Vec::new()));
            };
            data.children()
                .filter(|n| n.is_element() && n.tag_name().name() == "value")
                .map(|n| decode_value(&n))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array)
        }
        "struct" => {
            let mut members = Map::new();
            for member in typed.children().filter(|n| n.is_element()) {
                let mut name = None;
                let mut value = None;
                for part in member.children().filter(|n| n.is_element()) {
                    match part.tag_name().name() {
                        "name" => name = Some(text_of(&part)),
                        "value" => value = Some(decode_value(&part)?),
                        _ => {}
                    }
                }
                let Some(name) = name else {
                    return Err(RpcError::Protocol("struct member without name".to_string()));
                };
                members.insert(name, value.unwrap_or(Value::Null));
            }
            Ok(Value::Object(members))
        }
        other => Err(RpcError::Protocol(format!("unsupported value type '{other}'"))),
    }
}
