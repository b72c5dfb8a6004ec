//! Ivy XML resolution reports written by `sbt ivyReport`.

use std::path::Path;

use anyhow::{Context, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// One resolved module revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revision {
    pub organisation: String,
    pub name: String,
    pub revision: String,
}

pub fn read_report(path: &Path) -> Result<Vec<Revision>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading ivy report {}", path.display()))?;
    parse_report(&content).with_context(|| format!("parsing ivy report {}", path.display()))
}

/// Collect every non-evicted `<module><revision>` pair.
pub fn parse_report(xml: &str) -> Result<Vec<Revision>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut revisions = Vec::new();
    let mut buf = Vec::new();
    let mut module: Option<(String, String)> = None;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) | Event::Empty(ref e) => match e.name().local_name().as_ref() {
                b"module" => {
                    module = Some((attr(e, b"organisation")?, attr(e, b"name")?));
                }
                b"revision" => {
                    if let Some((organisation, name)) = &module {
                        let revision = attr(e, b"name")?;
                        let evicted = !attr(e, b"evicted")?.is_empty();
                        if !evicted && !revision.is_empty() {
                            revisions.push(Revision {
                                organisation: organisation.clone(),
                                name: name.clone(),
                                revision,
                            });
                        }
                    }
                }
                _ => {}
            },
            Event::End(ref e) if e.name().local_name().as_ref() == b"module" => module = None,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(revisions)
}

/// Attribute value, or an empty string when absent.
fn attr(e: &BytesStart<'_>, key: &[u8]) -> Result<String> {
    for a in e.attributes() {
        let a = a?;
        if a.key.local_name().as_ref() == key {
            return Ok(a.unescape_value()?.into_owned());
        }
    }
    Ok(String::new())
}
