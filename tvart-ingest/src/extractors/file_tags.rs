//! Tags embedded in the raw image file
//!
//! PNG text chunks (`tEXt`, uncompressed `iTXt`) and XMP Dublin Core
//! elements, which JPEG, PNG and TIFF files can all carry.

use crate::extractors::gallery_page::clean_text;
use crate::types::{ExtractionContext, MetadataError, MetadataExtractor, RawFields};
use async_trait::async_trait;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";
const DUBLIN_CORE_ELEMENTS: &[&str] = &["title", "creator", "description", "rights"];

pub struct FileTagExtractor;

#[async_trait]
impl MetadataExtractor for FileTagExtractor {
    fn name(&self) -> &'static str {
        "file-tags"
    }

    async fn extract(&self, ctx: &ExtractionContext) -> Result<RawFields, MetadataError> {
        let Some(path) = &ctx.raw_path else {
            return Ok(Vec::new());
        };
        read_tags(path).await
    }
}

pub async fn read_tags(path: &Path) -> Result<RawFields, MetadataError> {
    let bytes = tokio::fs::read(path).await?;
    Ok(parse_tags(&bytes))
}

pub fn parse_tags(bytes: &[u8]) -> RawFields {
    let mut fields = Vec::new();
    if bytes.starts_with(PNG_SIGNATURE) {
        fields.extend(png_text_chunks(bytes));
    }
    fields.extend(xmp_fields(bytes));
    fields
}

fn png_text_chunks(bytes: &[u8]) -> RawFields {
    let mut fields = Vec::new();
    let mut pos = PNG_SIGNATURE.len();

    while pos + 8 <= bytes.len() {
        let len = u32::from_be_bytes([bytes[pos], bytes[pos + 1], bytes[pos + 2], bytes[pos + 3]])
            as usize;
        let kind = &bytes[pos + 4..pos + 8];
        let start = pos + 8;
        let Some(end) = start.checked_add(len).filter(|&e| e <= bytes.len()) else {
            break;
        };
        let data = &bytes[start..end];

        match kind {
            b"tEXt" => {
                if let Some((key, value)) = split_once_nul(data) {
                    fields.push((latin1(key), latin1(value)));
                }
            }
            b"iTXt" => {
                if let Some(pair) = parse_itxt(data) {
                    fields.push(pair);
                }
            }
            b"IEND" => break,
            _ => {}
        }

        // chunk data + CRC
        pos = end + 4;
    }
    fields
}

// keyword\0 compression_flag compression_method language\0 translated\0 text
fn parse_itxt(data: &[u8]) -> Option<(String, String)> {
    let (key, rest) = split_once_nul(data)?;
    let (&flag, rest) = rest.split_first()?;
    let (_method, rest) = rest.split_first()?;
    if flag != 0 {
        // compressed text is skipped
        return None;
    }
    let (_language, rest) = split_once_nul(rest)?;
    let (_translated, text) = split_once_nul(rest)?;
    Some((latin1(key), String::from_utf8_lossy(text).into_owned()))
}

fn split_once_nul(data: &[u8]) -> Option<(&[u8], &[u8])> {
    let i = data.iter().position(|&b| b == 0)?;
    Some((&data[..i], &data[i + 1..]))
}

fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

struct XmpRegexes {
    packet: Regex,
    items: Regex,
    elements: Vec<(&'static str, Regex)>,
}

fn xmp_regexes() -> Option<&'static XmpRegexes> {
    static RE: OnceLock<Option<XmpRegexes>> = OnceLock::new();
    RE.get_or_init(|| {
        let mut elements = Vec::new();
        for name in DUBLIN_CORE_ELEMENTS {
            let re = Regex::new(&format!(r"(?s)<dc:{0}[^>]*>(.*?)</dc:{0}>", name)).ok()?;
            elements.push((*name, re));
        }
        Some(XmpRegexes {
            packet: Regex::new(r"(?s)<x:xmpmeta.*?</x:xmpmeta>").ok()?,
            items: Regex::new(r"(?s)<rdf:li[^>]*>(.*?)</rdf:li>").ok()?,
            elements,
        })
    })
    .as_ref()
}

fn xmp_fields(bytes: &[u8]) -> RawFields {
    let Some(re) = xmp_regexes() else {
        return Vec::new();
    };
    let text = String::from_utf8_lossy(bytes);
    let Some(packet) = re.packet.find(&text) else {
        return Vec::new();
    };

    let mut fields = Vec::new();
    for (name, element) in &re.elements {
        let Some(caps) = element.captures(packet.as_str()) else {
            continue;
        };
        let inner = &caps[1];
        let items: Vec<String> = re
            .items
            .captures_iter(inner)
            .map(|c| clean_text(&c[1]))
            .filter(|s| !s.is_empty())
            .collect();
        let value = if items.is_empty() {
            clean_text(inner)
        } else {
            items.join("; ")
        };
        if !value.is_empty() {
            fields.push((format!("dc:{}", name), value));
        }
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(kind: &[u8], data: &[u8]) -> Vec<u8> {
        let mut out = (data.len() as u32).to_be_bytes().to_vec();
        out.extend_from_slice(kind);
        out.extend_from_slice(data);
        out.extend_from_slice(&[0, 0, 0, 0]);
        out
    }

    #[test]
    fn test_png_text_chunks() {
        let mut png = PNG_SIGNATURE.to_vec();
        png.extend(chunk(b"IHDR", &[0; 13]));
        png.extend(chunk(b"tEXt", b"Title\0Starry Night"));
        png.extend(chunk(b"iTXt", b"Author\0\0\0en\0\0Vincent van Gogh"));
        png.extend(chunk(b"iTXt", b"Comment\0\x01\0\0\0zzz"));
        png.extend(chunk(b"IEND", b""));

        let fields = parse_tags(&png);
        assert_eq!(
            fields,
            vec![
                ("Title".to_string(), "Starry Night".to_string()),
                ("Author".to_string(), "Vincent van Gogh".to_string()),
            ]
        );
    }

    #[test]
    fn test_truncated_png_does_not_panic() {
        let mut png = PNG_SIGNATURE.to_vec();
        png.extend_from_slice(&[0, 0, 1, 0, b't', b'E', b'X', b't', b'a']);
        assert!(parse_tags(&png).is_empty());
    }

    #[test]
    fn test_xmp_dublin_core() {
        let xmp = br#"....<x:xmpmeta xmlns:x="adobe:ns:meta/"><rdf:RDF><rdf:Description>
            <dc:title><rdf:Alt><rdf:li xml:lang="x-default">Irises</rdf:li></rdf:Alt></dc:title>
            <dc:creator><rdf:Seq><rdf:li>Vincent van Gogh</rdf:li></rdf:Seq></dc:creator>
            <dc:rights>Public domain</dc:rights>
            </rdf:Description></rdf:RDF></x:xmpmeta>...."#;

        let fields = parse_tags(xmp);
        assert!(fields.contains(&("dc:title".to_string(), "Irises".to_string())));
        assert!(fields.contains(&("dc:creator".to_string(), "Vincent van Gogh".to_string())));
        assert!(fields.contains(&("dc:rights".to_string(), "Public domain".to_string())));
    }
}
