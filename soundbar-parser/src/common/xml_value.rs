//! Generic XML to mapping conversion.
//!
//! Device payloads nest XML documents inside attribute values and text of
//! other XML documents, several levels deep. Rather than describing every
//! level with serde structs, documents are first converted into a
//! [`serde_json::Value`] tree with these rules:
//!
//! - namespace prefixes are stripped from element and attribute names;
//! - `xmlns` declarations are dropped;
//! - attributes become plain keys of the element's mapping;
//! - repeated child elements become an array;
//! - text next to attributes or children is stored under `text`;
//! - an element with neither attributes, children nor text is `null`.
//!
//! [`expand_embedded_xml`] then walks the tree and replaces every string that
//! parses as XML with its converted form, so typed structs can be
//! deserialized from the result with `serde_json::from_value`.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_json::{Map, Value};

use crate::error::{ParseError, ParseResult};

/// Key used for text content of elements that also carry attributes or children
pub const TEXT_KEY: &str = "text";

/// Single-key wrappers removed after expansion
const COLLAPSIBLE_KEYS: [&str; 2] = ["val", "DIDL-Lite"];

const PREDEFINED_ENTITIES: [&str; 5] = ["amp;", "apos;", "lt;", "gt;", "quot;"];

struct Node {
    name: String,
    fields: Map<String, Value>,
    text: String,
}

/// Convert an XML document into a mapping keyed by its root element name.
///
/// # Example
///
/// ```
/// use soundbar_parser::common::xml_to_value;
///
/// let value = xml_to_value(r#"<Volume channel="Master" val="40"/>"#).unwrap();
/// assert_eq!(value["Volume"]["channel"], "Master");
/// assert_eq!(value["Volume"]["val"], "40");
/// ```
pub fn xml_to_value(xml: &str) -> ParseResult<Value> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut stack: Vec<Node> = Vec::new();
    let mut root: Option<(String, Value)> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => stack.push(open_node(&start)?),
            Ok(Event::Empty(start)) => {
                let node = open_node(&start)?;
                close_node(node, &mut stack, &mut root)?;
            }
            Ok(Event::End(_)) => {
                let node = stack
                    .pop()
                    .ok_or_else(|| ParseError::Xml("unexpected closing tag".to_string()))?;
                close_node(node, &mut stack, &mut root)?;
            }
            Ok(Event::Text(text)) => {
                let text = text.unescape().map_err(|e| ParseError::Xml(e.to_string()))?;
                append_text(&mut stack, &text)?;
            }
            Ok(Event::CData(cdata)) => {
                let raw = cdata.into_inner();
                append_text(&mut stack, &String::from_utf8_lossy(&raw))?;
            }
            Ok(Event::Eof) => break,
            // Declarations, comments, processing instructions and doctypes
            Ok(_) => {}
            Err(e) => {
                return Err(ParseError::Xml(format!(
                    "error at position {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
        }
    }

    if let Some(unclosed) = stack.last() {
        return Err(ParseError::Xml(format!(
            "unclosed element <{}>",
            unclosed.name
        )));
    }

    let (name, value) =
        root.ok_or_else(|| ParseError::Xml("document has no root element".to_string()))?;

    let mut document = Map::new();
    document.insert(name, value);
    Ok(Value::Object(document))
}

fn open_node(start: &BytesStart<'_>) -> ParseResult<Node> {
    let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
    let mut fields = Map::new();

    for attr in start.attributes() {
        let attr = attr.map_err(|e| ParseError::Xml(e.to_string()))?;

        let raw_key = attr.key.as_ref();
        if raw_key == b"xmlns" || raw_key.starts_with(b"xmlns:") {
            continue;
        }

        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| ParseError::Xml(e.to_string()))?;

        insert_child(&mut fields, key, Value::String(value.into_owned()));
    }

    Ok(Node {
        name,
        fields,
        text: String::new(),
    })
}

fn close_node(
    node: Node,
    stack: &mut [Node],
    root: &mut Option<(String, Value)>,
) -> ParseResult<()> {
    let Node {
        name,
        mut fields,
        text,
    } = node;

    let value = match (fields.is_empty(), text.is_empty()) {
        (true, true) => Value::Null,
        (true, false) => Value::String(text),
        (false, false) => {
            fields.insert(TEXT_KEY.to_string(), Value::String(text));
            Value::Object(fields)
        }
        (false, true) => Value::Object(fields),
    };

    match stack.last_mut() {
        Some(parent) => {
            insert_child(&mut parent.fields, name, value);
            Ok(())
        }
        None if root.is_none() => {
            *root = Some((name, value));
            Ok(())
        }
        None => Err(ParseError::Xml(format!(
            "multiple root elements, found <{}>",
            name
        ))),
    }
}

fn append_text(stack: &mut [Node], text: &str) -> ParseResult<()> {
    match stack.last_mut() {
        Some(node) => {
            node.text.push_str(text);
            Ok(())
        }
        None if text.trim().is_empty() => Ok(()),
        None => Err(ParseError::Xml("text outside the root element".to_string())),
    }
}

fn insert_child(fields: &mut Map<String, Value>, key: String, value: Value) {
    match fields.get_mut(&key) {
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
        None => {
            fields.insert(key, value);
        }
    }
}

/// Escape `&` characters that don't start a predefined entity or a
/// character reference.
///
/// Device firmware puts raw ampersands into track titles and URLs, which
/// would otherwise make the whole payload unparseable.
///
/// ```
/// use soundbar_parser::common::escape_bare_ampersands;
///
/// assert_eq!(
///     escape_bare_ampersands("<t>Simon & Garfunkel &amp; co</t>"),
///     "<t>Simon &amp; Garfunkel &amp; co</t>"
/// );
/// ```
pub fn escape_bare_ampersands(xml: &str) -> String {
    let mut escaped = String::with_capacity(xml.len());

    for (idx, ch) in xml.char_indices() {
        if ch == '&' && !starts_reference(&xml[idx + 1..]) {
            escaped.push_str("&amp;");
        } else {
            escaped.push(ch);
        }
    }

    escaped
}

fn starts_reference(rest: &str) -> bool {
    if PREDEFINED_ENTITIES
        .iter()
        .any(|entity| rest.starts_with(entity))
    {
        return true;
    }

    let Some(numeric) = rest.strip_prefix('#') else {
        return false;
    };

    let (digits, is_digit): (&str, fn(&char) -> bool) =
        match numeric.strip_prefix('x').or_else(|| numeric.strip_prefix('X')) {
            Some(hex) => (hex, char::is_ascii_hexdigit),
            None => (numeric, char::is_ascii_digit),
        };

    let len = digits.chars().take_while(is_digit).count();
    len > 0 && digits[len..].starts_with(';')
}

/// Recursively replace every string that parses as XML with its mapping.
///
/// Strings that look like XML but fail to parse are kept as they are. After
/// expansion, a mapping whose only key is `val` or `DIDL-Lite` is replaced by
/// that key's value.
///
/// ```
/// use serde_json::json;
/// use soundbar_parser::common::expand_embedded_xml;
///
/// let expanded = expand_embedded_xml(json!({
///     "LastChange": "<Event><InstanceID val=\"0\"><TransportState val=\"PLAYING\"/></InstanceID></Event>"
/// }));
///
/// assert_eq!(
///     expanded,
///     json!({"LastChange": {"Event": {"InstanceID": {"val": "0", "TransportState": "PLAYING"}}}})
/// );
/// ```
pub fn expand_embedded_xml(value: Value) -> Value {
    match value {
        Value::String(text) if text.trim_start().starts_with('<') => {
            match xml_to_value(&escape_bare_ampersands(&text)) {
                Ok(parsed) => expand_embedded_xml(parsed),
                Err(_) => Value::String(text),
            }
        }
        Value::Object(fields) => collapse(Value::Object(
            fields
                .into_iter()
                .map(|(key, value)| (key, expand_embedded_xml(value)))
                .collect(),
        )),
        Value::Array(items) => Value::Array(items.into_iter().map(expand_embedded_xml).collect()),
        other => other,
    }
}

fn collapse(value: Value) -> Value {
    match value {
        Value::Object(mut fields)
            if fields.len() == 1
                && COLLAPSIBLE_KEYS.iter().any(|key| fields.contains_key(*key)) =>
        {
            let key = fields.keys().next().cloned().unwrap_or_default();
            fields.remove(&key).unwrap_or(Value::Null)
        }
        other => other,
    }
}
