//! Minimal reader for storage pool and volume XML.
//!
//! Only the mock host reads XML. The libvirt path hands documents to the
//! library untouched.

use std::collections::HashMap;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// Fields of a `<pool>` document the mock host cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PoolXml {
    pub name: String,
    pub uuid: Option<String>,
    pub kind: Option<String>,
    pub capacity: Option<u64>,
    pub allocation: Option<u64>,
    pub available: Option<u64>,
    pub target_path: Option<String>,
}

/// Fields of a `<volume>` document the mock host cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct VolumeXml {
    pub name: String,
    pub kind: Option<String>,
    pub capacity: Option<u64>,
    pub allocation: Option<u64>,
}

#[derive(Debug, Default)]
struct Field {
    text: String,
    unit: Option<String>,
}

/// Flattened document: root element, its `type` attribute, and the text of
/// every element keyed by slash-separated path below the root.
#[derive(Debug, Default)]
struct Document {
    root: String,
    root_type: Option<String>,
    fields: HashMap<String, Field>,
}

impl Document {
    fn parse(xml: &str) -> Result<Self, String> {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);

        let mut doc = Document::default();
        let mut path: Vec<String> = Vec::new();

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    doc.open(&mut path, &e)?;
                }
                Ok(Event::Empty(e)) => {
                    doc.open(&mut path, &e)?;
                    path.pop();
                }
                Ok(Event::Text(t)) => {
                    let text = t.unescape().map_err(|e| e.to_string())?;
                    if let Some(key) = Self::key(&path) {
                        doc.fields.entry(key).or_default().text = text.into_owned();
                    }
                }
                Ok(Event::End(_)) => {
                    path.pop();
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => {
                    return Err(format!(
                        "XML error at position {}: {}",
                        reader.buffer_position(),
                        e
                    ))
                }
            }
        }

        if doc.root.is_empty() {
            return Err("XML error: document has no root element".to_string());
        }

        Ok(doc)
    }

    fn open(&mut self, path: &mut Vec<String>, e: &BytesStart<'_>) -> Result<(), String> {
        let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();

        if path.is_empty() {
            if !self.root.is_empty() {
                return Err("XML error: more than one root element".to_string());
            }
            self.root = name.clone();
            self.root_type = attribute(e, "type")?;
        }

        path.push(name);

        if let Some(key) = Self::key(path) {
            let unit = attribute(e, "unit")?;
            self.fields.entry(key).or_default().unit = unit;
        }

        Ok(())
    }

    fn key(path: &[String]) -> Option<String> {
        if path.len() < 2 {
            None
        } else {
            Some(path[1..].join("/"))
        }
    }

    fn text(&self, key: &str) -> Option<String> {
        self.fields
            .get(key)
            .map(|f| f.text.clone())
            .filter(|t| !t.is_empty())
    }

    fn bytes(&self, key: &str) -> Result<Option<u64>, String> {
        let Some(field) = self.fields.get(key) else {
            return Ok(None);
        };
        if field.text.is_empty() {
            return Ok(None);
        }

        let value: u64 = field
            .text
            .parse()
            .map_err(|_| format!("XML error: invalid number '{}' in <{}>", field.text, key))?;
        let scale = unit_scale(field.unit.as_deref())
            .ok_or_else(|| format!("XML error: unknown unit in <{}>", key))?;

        value
            .checked_mul(scale)
            .map(Some)
            .ok_or_else(|| format!("XML error: value of <{}> overflows", key))
    }
}

fn attribute(e: &BytesStart<'_>, name: &str) -> Result<Option<String>, String> {
    match e.try_get_attribute(name) {
        Ok(Some(attr)) => attr
            .unescape_value()
            .map(|v| Some(v.into_owned()))
            .map_err(|e| e.to_string()),
        Ok(None) => Ok(None),
        Err(e) => Err(e.to_string()),
    }
}

/// Scale factor for libvirt's scaled integer units.
fn unit_scale(unit: Option<&str>) -> Option<u64> {
    const K: u64 = 1024;
    let scale = match unit.unwrap_or("bytes") {
        "b" | "bytes" => 1,
        "KB" => 1_000,
        "k" | "K" | "KiB" => K,
        "MB" => 1_000_000,
        "M" | "MiB" => K * K,
        "GB" => 1_000_000_000,
        "G" | "GiB" => K * K * K,
        "TB" => 1_000_000_000_000,
        "T" | "TiB" => K * K * K * K,
        _ => return None,
    };
    Some(scale)
}

impl PoolXml {
    pub fn parse(xml: &str) -> Result<Self, String> {
        let doc = Document::parse(xml)?;
        if doc.root != "pool" {
            return Err(format!("XML error: expected <pool>, found <{}>", doc.root));
        }

        let name = doc
            .text("name")
            .ok_or_else(|| "XML error: missing pool name element".to_string())?;

        Ok(Self {
            name,
            uuid: doc.text("uuid"),
            kind: doc.root_type.clone(),
            capacity: doc.bytes("capacity")?,
            allocation: doc.bytes("allocation")?,
            available: doc.bytes("available")?,
            target_path: doc.text("target/path"),
        })
    }
}

impl VolumeXml {
    pub fn parse(xml: &str) -> Result<Self, String> {
        let doc = Document::parse(xml)?;
        if doc.root != "volume" {
            return Err(format!("XML error: expected <volume>, found <{}>", doc.root));
        }

        let name = doc
            .text("name")
            .ok_or_else(|| "XML error: missing volume name element".to_string())?;

        Ok(Self {
            name,
            kind: doc.root_type.clone(),
            capacity: doc.bytes("capacity")?,
            allocation: doc.bytes("allocation")?,
        })
    }
}
