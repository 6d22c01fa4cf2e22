// Copyright (C) 2025 cloudmux Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! XML bodies of the Blob service

use cloudmux_core::{CloudError, CloudResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// `List Containers` answer
#[derive(Debug, Deserialize)]
pub struct ContainerEnumeration {
    #[serde(rename = "Containers", default)]
    pub containers: ContainerList,
    #[serde(rename = "NextMarker", default)]
    pub next_marker: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ContainerList {
    #[serde(rename = "Container", default)]
    pub items: Vec<ContainerEntry>,
}

#[derive(Debug, Deserialize)]
pub struct ContainerEntry {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Properties", default)]
    pub properties: ContainerProperties,
}

#[derive(Debug, Default, Deserialize)]
pub struct ContainerProperties {
    #[serde(rename = "Last-Modified", default)]
    pub last_modified: Option<String>,
    #[serde(rename = "Etag", default)]
    pub etag: Option<String>,
}

/// `List Blobs` answer
#[derive(Debug, Deserialize)]
pub struct BlobEnumeration {
    #[serde(rename = "Blobs", default)]
    pub blobs: BlobList,
    #[serde(rename = "NextMarker", default)]
    pub next_marker: Option<String>,
}

/// Blobs and prefixes come interleaved in name order
#[derive(Debug, Default, Deserialize)]
pub struct BlobList {
    #[serde(rename = "$value", default)]
    pub entries: Vec<BlobListEntry>,
}

#[derive(Debug, Deserialize)]
pub enum BlobListEntry {
    Blob(BlobEntry),
    BlobPrefix(BlobPrefixEntry),
}

#[derive(Debug, Deserialize)]
pub struct BlobEntry {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Properties", default)]
    pub properties: BlobProperties,
    #[serde(rename = "Metadata", default)]
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct BlobPrefixEntry {
    #[serde(rename = "Name")]
    pub name: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct BlobProperties {
    #[serde(rename = "Creation-Time", default)]
    pub creation_time: Option<String>,
    #[serde(rename = "Last-Modified", default)]
    pub last_modified: Option<String>,
    #[serde(rename = "Etag", default)]
    pub etag: Option<String>,
    #[serde(rename = "Content-Length", default)]
    pub content_length: Option<u64>,
}

/// Body of `Put Block List`
#[derive(Debug, Serialize)]
#[serde(rename = "BlockList")]
pub struct BlockListRequest {
    #[serde(rename = "Latest")]
    pub latest: Vec<String>,
}

/// `Get Block List` answer
#[derive(Debug, Deserialize)]
pub struct BlockListResponse {
    #[serde(rename = "UncommittedBlocks", default)]
    pub uncommitted: BlockGroup,
}

#[derive(Debug, Default, Deserialize)]
pub struct BlockGroup {
    #[serde(rename = "Block", default)]
    pub blocks: Vec<Block>,
}

#[derive(Debug, Deserialize)]
pub struct Block {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Size")]
    pub size: u64,
}

/// Parse an XML body
pub fn from_xml<T>(body: &str, what: &str) -> CloudResult<T>
where
    T: for<'de> Deserialize<'de>,
{
    // the service prefixes bodies with a UTF-8 BOM
    let body = body.trim_start_matches('\u{feff}');
    quick_xml::de::from_str(body).map_err(|e| CloudError::parse(format!("{}: {}", what, e)))
}

/// Serialize a body with the XML declaration
pub fn to_xml<T: Serialize>(value: &T) -> CloudResult<String> {
    let body = quick_xml::se::to_string(value)
        .map_err(|e| CloudError::parse(format!("serialize request body: {}", e)))?;
    Ok(format!("<?xml version=\"1.0\" encoding=\"utf-8\"?>{}", body))
}

/// Empty strings mean "absent"
pub fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIST_BLOBS: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<EnumerationResults ServiceEndpoint="https://acct.blob.core.windows.net/" ContainerName="photos">
  <Prefix>2024/</Prefix>
  <MaxResults>3</MaxResults>
  <Delimiter>/</Delimiter>
  <Blobs>
    <Blob>
      <Name>2024/a.jpg</Name>
      <Properties>
        <Creation-Time>Mon, 27 Jan 2025 09:00:00 GMT</Creation-Time>
        <Last-Modified>Mon, 27 Jan 2025 10:00:00 GMT</Last-Modified>
        <Etag>0x8DD3ED1F5C0B2A1</Etag>
        <Content-Length>1024</Content-Length>
        <Content-Type>image/jpeg</Content-Type>
        <BlobType>BlockBlob</BlobType>
      </Properties>
      <Metadata>
        <camera>x100</camera>
      </Metadata>
    </Blob>
    <BlobPrefix>
      <Name>2024/jan/</Name>
    </BlobPrefix>
    <Blob>
      <Name>2024/z.jpg</Name>
      <Properties>
        <Last-Modified>Mon, 27 Jan 2025 11:00:00 GMT</Last-Modified>
        <Etag>0x8DD3ED1F5C0B2A2</Etag>
        <Content-Length>0</Content-Length>
      </Properties>
    </Blob>
  </Blobs>
  <NextMarker>2!12!MDAwMDA=</NextMarker>
</EnumerationResults>"#;

    #[test]
    fn test_parse_blob_listing() {
        let parsed: BlobEnumeration = from_xml(LIST_BLOBS, "list blobs").unwrap();
        assert_eq!(parsed.blobs.entries.len(), 3);
        assert_eq!(parsed.next_marker.as_deref(), Some("2!12!MDAwMDA="));

        match &parsed.blobs.entries[0] {
            BlobListEntry::Blob(blob) => {
                assert_eq!(blob.name, "2024/a.jpg");
                assert_eq!(blob.properties.content_length, Some(1024));
                assert_eq!(blob.metadata.get("camera").map(String::as_str), Some("x100"));
            }
            other => panic!("expected a blob, got {:?}", other),
        }
        assert!(matches!(
            &parsed.blobs.entries[1],
            BlobListEntry::BlobPrefix(prefix) if prefix.name == "2024/jan/"
        ));
    }

    #[test]
    fn test_parse_empty_listing() {
        let body = "\u{feff}<?xml version=\"1.0\" encoding=\"utf-8\"?>\
            <EnumerationResults ContainerName=\"c\"><Blobs /><NextMarker /></EnumerationResults>";
        let parsed: BlobEnumeration = from_xml(body, "list blobs").unwrap();
        assert!(parsed.blobs.entries.is_empty());
        assert_eq!(non_empty(parsed.next_marker), None);
    }

    #[test]
    fn test_parse_container_listing() {
        let body = r#"<EnumerationResults ServiceEndpoint="https://acct.blob.core.windows.net/">
  <Containers>
    <Container>
      <Name>logs</Name>
      <Properties>
        <Last-Modified>Mon, 27 Jan 2025 10:00:00 GMT</Last-Modified>
        <Etag>"0x8DD3ED1F5C0B2A1"</Etag>
        <PublicAccess>container</PublicAccess>
      </Properties>
    </Container>
    <Container>
      <Name>photos</Name>
      <Properties />
    </Container>
  </Containers>
  <NextMarker />
</EnumerationResults>"#;
        let parsed: ContainerEnumeration = from_xml(body, "list containers").unwrap();
        let names: Vec<_> = parsed.containers.items.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["logs", "photos"]);
        assert_eq!(
            parsed.containers.items[0].properties.etag.as_deref(),
            Some("\"0x8DD3ED1F5C0B2A1\"")
        );
    }

    #[test]
    fn test_block_list_body() {
        let body = to_xml(&BlockListRequest {
            latest: vec!["MDAwMDAx".to_string(), "MDAwMDAy".to_string()],
        })
        .unwrap();
        assert_eq!(
            body,
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>\
             <BlockList><Latest>MDAwMDAx</Latest><Latest>MDAwMDAy</Latest></BlockList>"
        );
    }

    #[test]
    fn test_parse_block_list() {
        let body = r#"<BlockList>
  <CommittedBlocks />
  <UncommittedBlocks>
    <Block><Name>MDAwMDAx</Name><Size>4</Size></Block>
    <Block><Name>MDAwMDAy</Name><Size>2</Size></Block>
  </UncommittedBlocks>
</BlockList>"#;
        let parsed: BlockListResponse = from_xml(body, "get block list").unwrap();
        assert_eq!(parsed.uncommitted.blocks.len(), 2);
        assert_eq!(parsed.uncommitted.blocks[1].size, 2);
    }
}
