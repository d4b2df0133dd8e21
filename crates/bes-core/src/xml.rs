//! XML to JSON transformation
//!
//! Upstream BES servers answer REST queries with one of two XML document
//! schemas: `BESAPI` (resource listings, status replies) or `BES` (content
//! documents such as actions and fixlets). Both are element trees with
//! attribute-carried resource URLs, so a single generic conversion covers
//! them; the schema only decides which root element the document must have.
//!
//! Mapping rules:
//! - an element becomes a JSON object of its attributes and children
//! - attributes keep their literal names
//! - repeated child elements with the same name collapse into an array
//! - an element with neither attributes nor children becomes its text
//!   content (an empty string when it has none); mixed elements keep text
//!   under `#text`

use quick_xml::events::Event;
use quick_xml::Reader;
use serde_json::{Map, Value};

use crate::error::CoreError;

/// The two upstream document schemas
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schema {
    BesApi,
    Bes,
}

impl Schema {
    /// Select the schema for a response body. The presence of the literal
    /// token `BESAPI` anywhere in the body selects the BESAPI document
    /// schema, as upstream never embeds that token in plain BES content.
    pub fn detect(body: &str) -> Self {
        if body.contains("BESAPI") {
            Schema::BesApi
        } else {
            Schema::Bes
        }
    }

    /// The root element this schema requires
    pub fn root_name(&self) -> &'static str {
        match self {
            Schema::BesApi => "BESAPI",
            Schema::Bes => "BES",
        }
    }
}

/// In-flight element while walking the document
struct PendingElement {
    name: String,
    fields: Map<String, Value>,
    text: String,
}

impl PendingElement {
    fn finish(self) -> (String, Value) {
        let value = if self.fields.is_empty() {
            Value::String(self.text)
        } else {
            let mut fields = self.fields;
            if !self.text.is_empty() {
                fields.insert("#text".to_string(), Value::String(self.text));
            }
            Value::Object(fields)
        };
        (self.name, value)
    }
}

/// Attach a child value under `name`, collapsing repeats into an array
fn attach(fields: &mut Map<String, Value>, name: String, value: Value) {
    match fields.get_mut(&name) {
        None => {
            fields.insert(name, value);
        }
        Some(Value::Array(items)) => {
            items.push(value);
        }
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
    }
}

/// Parse an XML document into its root element name and JSON value
pub fn parse_document(body: &str) -> Result<(String, Value), CoreError> {
    let mut reader = Reader::from_str(body);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<PendingElement> = Vec::new();
    let mut root: Option<(String, Value)> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => {
                stack.push(read_element_open(&start)?);
            }
            Ok(Event::Empty(start)) => {
                let (name, value) = read_element_open(&start)?.finish();
                match stack.last_mut() {
                    Some(parent) => attach(&mut parent.fields, name, value),
                    None => root = Some((name, value)),
                }
            }
            Ok(Event::Text(text)) => {
                let text = text
                    .unescape()
                    .map_err(|e| CoreError::Parse(e.to_string()))?;
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&text);
                }
            }
            Ok(Event::CData(cdata)) => {
                if let Some(top) = stack.last_mut() {
                    top.text
                        .push_str(&String::from_utf8_lossy(cdata.as_ref()));
                }
            }
            Ok(Event::End(_)) => {
                let (name, value) = match stack.pop() {
                    Some(elem) => elem.finish(),
                    None => return Err(CoreError::Parse("unbalanced end tag".to_string())),
                };
                match stack.last_mut() {
                    Some(parent) => attach(&mut parent.fields, name, value),
                    None => root = Some((name, value)),
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {} // declarations, comments, processing instructions
            Err(e) => return Err(CoreError::Parse(e.to_string())),
        }
    }

    if !stack.is_empty() {
        return Err(CoreError::Parse("unexpected end of document".to_string()));
    }

    root.ok_or_else(|| CoreError::Parse("empty document".to_string()))
}

fn read_element_open(
    start: &quick_xml::events::BytesStart<'_>,
) -> Result<PendingElement, CoreError> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut fields = Map::new();

    for attr in start.attributes() {
        let attr = attr.map_err(|e| CoreError::Parse(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| CoreError::Parse(e.to_string()))?
            .into_owned();
        fields.insert(key, Value::String(value));
    }

    Ok(PendingElement {
        name,
        fields,
        text: String::new(),
    })
}

/// Transform an upstream XML body into its JSON representation.
///
/// The document's root element must match `schema`; the returned JSON is
/// the serialized content of the root element, mirroring how a typed
/// unmarshal of the root document would serialize.
pub fn transform(body: &str, schema: Schema) -> Result<String, CoreError> {
    let (root_name, value) = parse_document(body)?;

    if root_name != schema.root_name() {
        return Err(CoreError::Parse(format!(
            "expected {} document, found root element {}",
            schema.root_name(),
            root_name
        )));
    }

    Ok(serde_json::to_string(&value)?)
}
