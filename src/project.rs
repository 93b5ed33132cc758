/// Parser for the Ant build descriptor that drives a JaCoCo report run.
///
/// Structure:
///   <project name="acme-core-jacoco" default="all-report" basedir=".">
///     <taskdef uri="antlib:org.jacoco.ant" .../>
///     <property name="report_number" value="master-acme-unittest-report"/>
///     ...
///   </project>
///
/// Only the project name and its top-level `<property>` elements are kept.
use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::error::{CovcrawlError, Result};

/// Property naming the report a build publishes.
pub const REPORT_NUMBER_PROPERTY: &str = "report_number";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub name: String,
    pub properties: Vec<Property>,
}

impl Project {
    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value.as_str())
    }

    /// Name for a crawl of this project's report: the `report_number`
    /// property when present, otherwise the project name.
    pub fn report_name(&self) -> &str {
        self.property(REPORT_NUMBER_PROPERTY).unwrap_or(&self.name)
    }
}

fn get_attr(e: &BytesStart, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

/// Parse a build descriptor.
pub fn parse(input: &[u8]) -> Result<Project> {
    let mut reader = Reader::from_reader(input);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut project: Option<Project> = None;
    // Element depth below <project>; properties are only read at depth 0.
    let mut depth = 0usize;

    loop {
        let event = reader.read_event_into(&mut buf);
        let is_start_event = matches!(&event, Ok(Event::Start(_)));
        match event {
            Err(e) => {
                return Err(CovcrawlError::Xml {
                    source: e,
                    position: reader.buffer_position(),
                })
            }
            Ok(Event::Eof) => break,
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => match e.name().as_ref() {
                b"project" if project.is_none() => {
                    project = Some(Project {
                        name: get_attr(e, b"name").unwrap_or_default(),
                        properties: Vec::new(),
                    });
                }
                name => {
                    if let Some(project) = project.as_mut() {
                        if depth == 0 && name == b"property" {
                            if let (Some(name), Some(value)) =
                                (get_attr(e, b"name"), get_attr(e, b"value"))
                            {
                                project.properties.push(Property { name, value });
                            }
                        }
                        if is_start_event {
                            depth += 1;
                        }
                    }
                }
            },
            Ok(Event::End(ref e)) => {
                if e.name().as_ref() == b"project" && depth == 0 {
                    break;
                }
                depth = depth.saturating_sub(1);
            }
            _ => {}
        }
        buf.clear();
    }

    project.ok_or_else(|| CovcrawlError::Parse("missing <project> element".to_string()))
}

/// Read and parse a build descriptor from disk.
pub fn parse_file(path: &Path) -> Result<Project> {
    let content = std::fs::read(path)?;
    parse(&content)
}
