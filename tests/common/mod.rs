//! Fixture builders shared by the integration tests.
#![allow(dead_code)]

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use zip::write::SimpleFileOptions;

// ============================================================================
// CHM
// ============================================================================

const CHM_BLOCK_LEN: usize = 0x1000;

fn encint(mut value: u64, out: &mut Vec<u8>) {
    let mut groups = vec![(value & 0x7F) as u8];
    value >>= 7;
    while value > 0 {
        groups.push((value & 0x7F) as u8 | 0x80);
        value >>= 7;
    }
    out.extend(groups.into_iter().rev());
}

/// `#SYSTEM` record list: `(type, value)` pairs, strings NUL-terminated.
pub fn chm_system(records: &[(u16, &[u8])]) -> Vec<u8> {
    let mut data = 3u32.to_le_bytes().to_vec();
    for (kind, value) in records {
        data.extend_from_slice(&kind.to_le_bytes());
        data.extend_from_slice(&(value.len() as u16).to_le_bytes());
        data.extend_from_slice(value);
    }
    data
}

/// A version 3 CHM with all entries stored in section 0.
pub fn build_chm(lcid: u32, entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut chunk = vec![0u8; CHM_BLOCK_LEN];
    chunk[0..4].copy_from_slice(b"PMGL");
    let mut listing = Vec::new();
    let mut content = Vec::new();
    for (name, data) in entries {
        encint(name.len() as u64, &mut listing);
        listing.extend_from_slice(name.as_bytes());
        encint(0, &mut listing);
        encint(content.len() as u64, &mut listing);
        encint(data.len() as u64, &mut listing);
        content.extend_from_slice(data);
    }
    assert!(0x14 + listing.len() <= CHM_BLOCK_LEN, "listing too large");
    chunk[0x14..0x14 + listing.len()].copy_from_slice(&listing);
    let free = (CHM_BLOCK_LEN - 0x14 - listing.len()) as u32;
    chunk[4..8].copy_from_slice(&free.to_le_bytes());

    let mut itsp = vec![0u8; 0x54];
    itsp[0..4].copy_from_slice(b"ITSP");
    itsp[4..8].copy_from_slice(&1u32.to_le_bytes());
    itsp[8..12].copy_from_slice(&0x54u32.to_le_bytes());
    itsp[0x10..0x14].copy_from_slice(&(CHM_BLOCK_LEN as u32).to_le_bytes());
    itsp[0x28..0x2C].copy_from_slice(&1u32.to_le_bytes());

    let dir_offset = 0x60u64;
    let dir_len = (itsp.len() + chunk.len()) as u64;
    let mut itsf = vec![0u8; 0x60];
    itsf[0..4].copy_from_slice(b"ITSF");
    itsf[4..8].copy_from_slice(&3u32.to_le_bytes());
    itsf[8..12].copy_from_slice(&0x60u32.to_le_bytes());
    itsf[0x14..0x18].copy_from_slice(&lcid.to_le_bytes());
    itsf[0x48..0x50].copy_from_slice(&dir_offset.to_le_bytes());
    itsf[0x50..0x58].copy_from_slice(&dir_len.to_le_bytes());
    itsf[0x58..0x60].copy_from_slice(&(dir_offset + dir_len).to_le_bytes());

    let mut file = itsf;
    file.extend_from_slice(&itsp);
    file.extend_from_slice(&chunk);
    file.extend_from_slice(&content);
    file
}

/// A sitemap `<LI>` entry.
pub fn sitemap_item(name: &str, local: &str) -> String {
    format!(
        "<LI><OBJECT type=\"text/sitemap\"><param name=\"Name\" value=\"{name}\">\
         <param name=\"Local\" value=\"{local}\"></OBJECT>\n"
    )
}

/// A small help file: home page, two chapters, a TOC with one nested
/// entry and an index with a two-target keyword.
pub fn sample_chm() -> Vec<u8> {
    let system = chm_system(&[
        (0, b"toc.hhc\0"),
        (1, b"index.hhk\0"),
        (2, b"intro.htm\0"),
        (3, b"Sample Help\0"),
        (4, &1033u32.to_le_bytes()),
        (9, b"HHA Version 4.74.8702\0"),
    ]);
    let toc = format!(
        "<HTML><BODY><UL>\n{}<UL>\n{}</UL>\n{}</UL></BODY></HTML>",
        sitemap_item("Introduction", "intro.htm"),
        sitemap_item("Setup", "intro.htm#setup"),
        sitemap_item("Usage", "usage.htm"),
    );
    let index = "<HTML><BODY><UL>\n<LI><OBJECT type=\"text/sitemap\">\
        <param name=\"Name\" value=\"install\">\
        <param name=\"Name\" value=\"Intro\"><param name=\"Local\" value=\"intro.htm\">\
        <param name=\"Name\" value=\"Usage\"><param name=\"Local\" value=\"usage.htm\">\
        </OBJECT>\n</UL></BODY></HTML>";
    build_chm(
        1033,
        &[
            ("/#SYSTEM", &system),
            ("/intro.htm", b"<html><body><h1>Intro</h1><p>Welcome.</p><h2 id=\"setup\">Setup</h2><p>Run it. <a href=\"usage.htm\">Usage</a> <a href=\"manual.pdf\">Manual</a></p></body></html>"),
            ("/usage.htm", b"<html><body><h1>Usage</h1><p>Click things.</p></body></html>"),
            ("/extra.html", b"<html><body><p>Extra page</p></body></html>"),
            ("/manual.pdf", b"%PDF-1.4 fake"),
            ("/toc.hhc", toc.as_bytes()),
            ("/index.hhk", index.as_bytes()),
        ],
    )
}

// ============================================================================
// Mobipocket
// ============================================================================

/// A PDB file with the given type/creator and records.
pub fn build_pdb(name: &str, ident: &[u8; 8], records: &[Vec<u8>]) -> Vec<u8> {
    let mut header = vec![0u8; 78];
    header[..name.len().min(31)].copy_from_slice(&name.as_bytes()[..name.len().min(31)]);
    header[60..68].copy_from_slice(ident);
    header[76..78].copy_from_slice(&(records.len() as u16).to_be_bytes());

    let mut offset = 78 + records.len() * 8 + 2;
    let mut table = Vec::new();
    for (i, record) in records.iter().enumerate() {
        table.extend_from_slice(&(offset as u32).to_be_bytes());
        table.extend_from_slice(&((i as u32) << 1).to_be_bytes());
        offset += record.len();
    }

    let mut file = header;
    file.extend_from_slice(&table);
    file.extend_from_slice(&[0, 0]);
    for record in records {
        file.extend_from_slice(record);
    }
    file
}

fn exth(records: &[(u32, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (kind, value) in records {
        body.extend_from_slice(&kind.to_be_bytes());
        body.extend_from_slice(&((value.len() + 8) as u32).to_be_bytes());
        body.extend_from_slice(value);
    }
    let mut out = b"EXTH".to_vec();
    out.extend_from_slice(&((body.len() + 12) as u32).to_be_bytes());
    out.extend_from_slice(&(records.len() as u32).to_be_bytes());
    out.extend_from_slice(&body);
    out
}

/// An uncompressed UTF-8 Mobipocket book split into 4 KiB text records.
pub fn build_mobi(title: &str, author: &str, text: &[u8]) -> Vec<u8> {
    let chunks: Vec<Vec<u8>> = text.chunks(4096).map(<[u8]>::to_vec).collect();

    let header_len = 0xE8u32;
    let mut record0 = vec![0u8; 16 + header_len as usize];
    record0[0..2].copy_from_slice(&1u16.to_be_bytes());
    record0[4..8].copy_from_slice(&(text.len() as u32).to_be_bytes());
    record0[8..10].copy_from_slice(&(chunks.len() as u16).to_be_bytes());
    record0[10..12].copy_from_slice(&4096u16.to_be_bytes());
    record0[16..20].copy_from_slice(b"MOBI");
    record0[20..24].copy_from_slice(&header_len.to_be_bytes());
    record0[28..32].copy_from_slice(&65001u32.to_be_bytes());
    record0[0x6C..0x70].copy_from_slice(&u32::MAX.to_be_bytes());
    record0[0x70..0x74].copy_from_slice(&u32::MAX.to_be_bytes());
    record0[0x80..0x84].copy_from_slice(&0x40u32.to_be_bytes());

    record0.extend_from_slice(&exth(&[(100, author.as_bytes()), (503, title.as_bytes())]));
    let title_offset = record0.len() as u32;
    record0[0x54..0x58].copy_from_slice(&title_offset.to_be_bytes());
    record0[0x58..0x5C].copy_from_slice(&(title.len() as u32).to_be_bytes());
    record0.extend_from_slice(title.as_bytes());
    record0.extend_from_slice(&[0, 0]);

    let mut records = vec![record0];
    records.extend(chunks);
    build_pdb(title, b"BOOKMOBI", &records)
}

// ============================================================================
// EPUB
// ============================================================================

pub const CONTAINER_XML: &str = r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;

pub const SAMPLE_OPF: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0" unique-identifier="id">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:title>Sample Book</dc:title>
    <dc:creator>Ann Author</dc:creator>
    <dc:publisher>Tests Ltd</dc:publisher>
    <dc:date>2020-05-01</dc:date>
  </metadata>
  <manifest>
    <item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
    <item id="c1" href="Text/ch1.xhtml" media-type="application/xhtml+xml"/>
    <item id="c2" href="Text/ch2.xhtml" media-type="application/xhtml+xml"/>
    <item id="css" href="Styles/main.css" media-type="text/css"/>
    <item id="img" href="Images/dot.gif" media-type="image/gif"/>
  </manifest>
  <spine toc="ncx">
    <itemref idref="c1"/>
    <itemref idref="c2"/>
  </spine>
</package>"#;

pub const SAMPLE_NCX: &str = r#"<?xml version="1.0"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <navMap>
    <navPoint id="n1" playOrder="1">
      <navLabel><text>Chapter One</text></navLabel>
      <content src="Text/ch1.xhtml"/>
      <navPoint id="n2" playOrder="2">
        <navLabel><text>A Section</text></navLabel>
        <content src="Text/ch1.xhtml#sec"/>
      </navPoint>
    </navPoint>
    <navPoint id="n3" playOrder="3">
      <navLabel><text>Chapter Two</text></navLabel>
      <content src="Text/ch2.xhtml"/>
    </navPoint>
  </navMap>
</ncx>"#;

/// 1x1 GIF.
pub const DOT_GIF: &[u8] = b"GIF89a\x01\x00\x01\x00\x80\x00\x00\x00\x00\x00\xff\xff\xff!\xf9\x04\x01\x00\x00\x00\x00,\x00\x00\x00\x00\x01\x00\x01\x00\x00\x02\x02D\x01\x00;";

pub fn sample_epub_files() -> Vec<(&'static str, Vec<u8>)> {
    vec![
        ("mimetype", b"application/epub+zip".to_vec()),
        ("META-INF/container.xml", CONTAINER_XML.as_bytes().to_vec()),
        ("OEBPS/content.opf", SAMPLE_OPF.as_bytes().to_vec()),
        ("OEBPS/toc.ncx", SAMPLE_NCX.as_bytes().to_vec()),
        (
            "OEBPS/Text/ch1.xhtml",
            br#"<?xml version="1.0" encoding="utf-8"?>
<html xmlns="http://www.w3.org/1999/xhtml"><head><title>One</title>
<link rel="stylesheet" type="text/css" href="../Styles/main.css"/></head>
<body><h1>Chapter One</h1><p>First words. <a href="ch2.xhtml#end">Jump</a></p>
<p><img src="../Images/dot.gif" alt="dot"/></p>
<h2 id="sec">A Section</h2><p>Section text.</p></body></html>"#
                .to_vec(),
        ),
        (
            "OEBPS/Text/ch2.xhtml",
            br#"<html><body><h1>Chapter Two</h1><p id="end">The end.</p></body></html>"#.to_vec(),
        ),
        ("OEBPS/Styles/main.css", b"h1 { font-weight: bold }".to_vec()),
        ("OEBPS/Images/dot.gif", DOT_GIF.to_vec()),
    ]
}

pub fn build_zip(files: &[(&str, Vec<u8>)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in files {
        let options = if *name == "mimetype" {
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored)
        } else {
            SimpleFileOptions::default()
        };
        writer.start_file(*name, options).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

// ============================================================================
// Files on disk
// ============================================================================

pub fn write_file(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, data).unwrap();
    path
}
