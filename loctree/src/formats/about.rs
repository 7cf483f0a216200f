//! `About/About.xml` of a generated translation mod.

use quick_xml::{
    Writer,
    events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event},
};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Metadata of a translation package.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackageMetadata {
    pub name: String,
    pub package_id: String,
    /// Supported game version, e.g. `1.5`.
    pub supported_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl PackageMetadata {
    pub fn validate(&self) -> Result<(), Error> {
        if self.name.trim().is_empty() {
            return Err(Error::invalid_request("package name must not be empty"));
        }
        if self.package_id.trim().is_empty() || self.package_id.contains(char::is_whitespace) {
            return Err(Error::invalid_request(format!(
                "invalid package id `{}`",
                self.package_id
            )));
        }
        if crate::versions::parse_version(&self.supported_version).is_none() {
            return Err(Error::invalid_request(format!(
                "invalid supported version `{}`",
                self.supported_version
            )));
        }
        Ok(())
    }
}

fn text_element<W: std::io::Write>(writer: &mut Writer<W>, name: &str, value: &str) -> Result<(), Error> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(value)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

/// Renders the `ModMetaData` document.
pub fn render(meta: &PackageMetadata) -> Result<String, Error> {
    let mut buf = Vec::new();
    let mut writer = Writer::new_with_indent(&mut buf, b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
    writer.write_event(Event::Start(BytesStart::new("ModMetaData")))?;
    text_element(&mut writer, "name", &meta.name)?;
    text_element(&mut writer, "packageId", &meta.package_id)?;
    if let Some(author) = &meta.author {
        text_element(&mut writer, "author", author)?;
    }
    writer.write_event(Event::Start(BytesStart::new("supportedVersions")))?;
    text_element(&mut writer, "li", &meta.supported_version)?;
    writer.write_event(Event::End(BytesEnd::new("supportedVersions")))?;
    let description = meta
        .description
        .clone()
        .unwrap_or_else(|| format!("Translation package: {}", meta.name));
    text_element(&mut writer, "description", &description)?;
    writer.write_event(Event::End(BytesEnd::new("ModMetaData")))?;
    buf.push(b'\n');
    String::from_utf8(buf).map_err(|e| Error::malformed("About.xml", None, e.to_string()))
}
