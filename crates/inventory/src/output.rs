// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Document serialization to JSON, XML and HTML files.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use serde_json::Value;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::document::{Format, Inventory, InventoryError, PROVIDER};

impl Inventory {
    /// Write the document to a file.
    ///
    /// `-` writes to stdout; a directory is auto-named
    /// `{deviceid}.{ext}`. Returns the written path, or None for
    /// stdout.
    pub fn save(&mut self, path: &Path) -> Result<Option<PathBuf>, InventoryError> {
        let format = self.format();
        let payload = match format {
            Format::Json => {
                let message = self.normalized(None).message();
                let mut payload = serde_json::to_string_pretty(&message)
                    .unwrap_or_else(|_| "{}".to_string());
                payload.push('\n');
                payload.into_bytes()
            }
            Format::Xml => self.xml_document()?,
            Format::Html => self.html_document().into_bytes(),
        };

        if path == Path::new("-") {
            let mut stdout = std::io::stdout().lock();
            stdout
                .write_all(&payload)
                .map_err(|e| InventoryError::Write(PathBuf::from("-"), e))?;
            return Ok(None);
        }

        let file_path = if path.is_dir() {
            path.join(format!("{}.{}", self.device_id(), format.extension()))
        } else {
            path.to_path_buf()
        };
        std::fs::write(&file_path, payload)
            .map_err(|e| InventoryError::Write(file_path.clone(), e))?;
        Ok(Some(file_path))
    }

    /// Legacy OCS request document.
    pub fn xml_document(&mut self) -> Result<Vec<u8>, InventoryError> {
        // The deprecated XML format carries ETIME under HARDWARE
        let etime = match self.content_mut().get_mut("VERSIONPROVIDER") {
            Some(Value::Object(provider)) => provider.remove("ETIME"),
            _ => None,
        };
        if let Some(etime) = etime {
            if let Some(Value::Object(hardware)) = self.content_mut().get_mut("HARDWARE") {
                hardware.insert("ETIME".into(), etime);
            }
        }

        let mut buffer = Vec::new();
        let mut writer = Writer::new_with_indent(&mut buffer, b' ', 2);
        emit(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        emit(&mut writer, Event::Start(BytesStart::new("REQUEST")))?;
        emit(&mut writer, Event::Start(BytesStart::new("CONTENT")))?;
        let mut keys: Vec<String> = self.content().keys().cloned().collect();
        keys.sort_unstable();
        for key in keys {
            if let Some(value) = self.content().get(&key) {
                write_xml_value(&mut writer, &key, value)?;
            }
        }
        emit(&mut writer, Event::End(BytesEnd::new("CONTENT")))?;
        write_xml_text(&mut writer, "DEVICEID", self.device_id())?;
        write_xml_text(&mut writer, "QUERY", "INVENTORY")?;
        emit(&mut writer, Event::End(BytesEnd::new("REQUEST")))?;
        buffer.push(b'\n');
        Ok(buffer)
    }

    /// Self-contained status page for the document.
    fn html_document(&self) -> String {
        let mut html = String::new();
        html.push_str("<!DOCTYPE html>\n<html>\n<head>\n");
        html.push_str(&format!(
            "<title>{} inventory for {}</title>\n",
            PROVIDER,
            escape_html(self.device_id())
        ));
        html.push_str(
            "<style>body{font-family:sans-serif}table{border-collapse:collapse}\
             td,th{border:1px solid #999;padding:2px 8px;text-align:left}</style>\n",
        );
        html.push_str("</head>\n<body>\n");
        html.push_str(&format!("<h1>{}</h1>\n", escape_html(self.device_id())));

        let mut keys: Vec<&String> = self.content().keys().collect();
        keys.sort_unstable();
        for key in keys {
            let Some(value) = self.content().get(key.as_str()) else {
                continue;
            };
            html.push_str(&format!("<h2>{}</h2>\n", escape_html(key)));
            match value {
                Value::Object(record) => {
                    html.push_str("<table>\n");
                    for (field, v) in record {
                        html.push_str(&format!(
                            "<tr><th>{}</th><td>{}</td></tr>\n",
                            escape_html(field),
                            escape_html(&scalar_text(v))
                        ));
                    }
                    html.push_str("</table>\n");
                }
                Value::Array(entries) => {
                    for entry in entries {
                        if let Value::Object(record) = entry {
                            html.push_str("<table>\n");
                            for (field, v) in record {
                                html.push_str(&format!(
                                    "<tr><th>{}</th><td>{}</td></tr>\n",
                                    escape_html(field),
                                    escape_html(&scalar_text(v))
                                ));
                            }
                            html.push_str("</table>\n<br/>\n");
                        }
                    }
                }
                scalar => {
                    html.push_str(&format!("<p>{}</p>\n", escape_html(&scalar_text(scalar))));
                }
            }
        }
        html.push_str("</body>\n</html>\n");
        html
    }
}

fn emit<W: Write>(writer: &mut Writer<W>, event: Event<'_>) -> Result<(), InventoryError> {
    writer
        .write_event(event)
        .map_err(|e| InventoryError::Xml(e.to_string()))
}

fn write_xml_value<W: Write>(
    writer: &mut Writer<W>,
    tag: &str,
    value: &Value,
) -> Result<(), InventoryError> {
    match value {
        Value::Object(record) => {
            emit(writer, Event::Start(BytesStart::new(tag)))?;
            let mut fields: Vec<&String> = record.keys().collect();
            fields.sort_unstable();
            for field in fields {
                if let Some(v) = record.get(field.as_str()) {
                    write_xml_value(writer, field, v)?;
                }
            }
            emit(writer, Event::End(BytesEnd::new(tag)))
        }
        Value::Array(items) => {
            for item in items {
                write_xml_value(writer, tag, item)?;
            }
            Ok(())
        }
        Value::Null => Ok(()),
        scalar => write_xml_text(writer, tag, &scalar_text(scalar)),
    }
}

fn write_xml_text<W: Write>(
    writer: &mut Writer<W>,
    tag: &str,
    text: &str,
) -> Result<(), InventoryError> {
    emit(writer, Event::Start(BytesStart::new(tag)))?;
    emit(writer, Event::Text(BytesText::new(text)))?;
    emit(writer, Event::End(BytesEnd::new(tag)))
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Parse a legacy XML request document and return its CONTENT subtree
/// as a section map. Repeated sibling elements collapse into arrays.
pub fn parse_xml_content(xml: &[u8]) -> Option<Value> {
    use quick_xml::events::Event as XmlEvent;
    use quick_xml::Reader;

    #[derive(Default)]
    struct Node {
        name: String,
        text: String,
        children: Vec<(String, Value)>,
    }

    fn collapse(node: Node) -> Value {
        if node.children.is_empty() {
            return Value::String(node.text.trim().to_string());
        }
        let mut map = serde_json::Map::new();
        for (name, value) in node.children {
            match map.get_mut(&name) {
                None => {
                    map.insert(name, value);
                }
                Some(Value::Array(items)) => items.push(value),
                Some(existing) => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, value]);
                }
            }
        }
        Value::Object(map)
    }

    let mut reader = Reader::from_reader(xml);
    let mut stack: Vec<Node> = vec![Node::default()];
    let mut buffer = Vec::new();
    loop {
        match reader.read_event_into(&mut buffer) {
            Ok(XmlEvent::Start(start)) => {
                stack.push(Node {
                    name: String::from_utf8_lossy(start.name().as_ref()).to_string(),
                    ..Node::default()
                });
            }
            Ok(XmlEvent::Text(text)) => {
                if let Some(node) = stack.last_mut() {
                    node.text.push_str(&text.unescape().ok()?);
                }
            }
            Ok(XmlEvent::Empty(empty)) => {
                let name = String::from_utf8_lossy(empty.name().as_ref()).to_string();
                if let Some(node) = stack.last_mut() {
                    node.children.push((name, Value::String(String::new())));
                }
            }
            Ok(XmlEvent::End(_)) => {
                let node = stack.pop()?;
                let name = node.name.clone();
                let value = collapse(node);
                stack.last_mut()?.children.push((name, value));
            }
            Ok(XmlEvent::Eof) => break,
            Err(_) => return None,
            _ => {}
        }
        buffer.clear();
    }

    let root = collapse(stack.pop()?);
    root.get("REQUEST")
        .and_then(|request| request.get("CONTENT"))
        .cloned()
        .or_else(|| root.get("CONTENT").cloned())
}

#[cfg(test)]
#[path = "output_tests.rs"]
mod tests;
