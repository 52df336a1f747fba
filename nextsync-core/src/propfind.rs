use quick_xml::events::Event;
use quick_xml::reader::Reader;

use crate::client::NextcloudError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DavEntry {
    pub href: String,
    pub name: String,
    pub is_collection: bool,
}

#[derive(Debug, Default)]
struct PartialEntry {
    href: String,
    displayname: String,
    is_collection: bool,
}

impl PartialEntry {
    fn finish(self) -> DavEntry {
        let from_href = self
            .href
            .split('/')
            .filter(|segment| !segment.is_empty())
            .next_back()
            .map(|segment| {
                urlencoding::decode(segment)
                    .map(|decoded| decoded.into_owned())
                    .unwrap_or_else(|_| segment.to_string())
            });
        let name = from_href.unwrap_or(self.displayname);
        DavEntry {
            href: self.href,
            name,
            is_collection: self.is_collection,
        }
    }
}

pub fn parse_multistatus(xml: &str) -> Result<Vec<DavEntry>, NextcloudError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut current: Option<PartialEntry> = None;
    let mut element: Vec<u8> = Vec::new();
    let mut in_resourcetype = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => {
                let name = start.local_name().as_ref().to_vec();
                match name.as_slice() {
                    b"response" => current = Some(PartialEntry::default()),
                    b"resourcetype" => in_resourcetype = true,
                    b"collection" if in_resourcetype => {
                        if let Some(entry) = current.as_mut() {
                            entry.is_collection = true;
                        }
                    }
                    _ => {}
                }
                element = name;
            }
            Ok(Event::Empty(empty)) => {
                if in_resourcetype && empty.local_name().as_ref() == b"collection" {
                    if let Some(entry) = current.as_mut() {
                        entry.is_collection = true;
                    }
                }
            }
            Ok(Event::Text(text)) => {
                let Some(entry) = current.as_mut() else {
                    continue;
                };
                let value = text
                    .unescape()
                    .map_err(|err| NextcloudError::Xml(err.to_string()))?;
                match element.as_slice() {
                    b"href" => entry.href = value.trim().to_string(),
                    b"displayname" => entry.displayname = value.trim().to_string(),
                    _ => {}
                }
            }
            Ok(Event::End(end)) => {
                match end.local_name().as_ref() {
                    b"response" => {
                        if let Some(entry) = current.take() {
                            entries.push(entry.finish());
                        }
                    }
                    b"resourcetype" => in_resourcetype = false,
                    _ => {}
                }
                element.clear();
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => return Err(NextcloudError::Xml(err.to_string())),
        }
    }

    Ok(entries)
}
